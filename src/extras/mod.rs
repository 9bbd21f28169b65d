//! Extra-section registry: the five optional tagged sections that can trail
//! the base puzzle.
//!
//! # Identity rules
//! Every section is identified by a frozen 4-character ASCII tag.  The set
//! is closed: GRBS (rebus positions), RTBL (rebus table), LTIM (timer
//! state), GEXT (per-cell status flags), RUSR (user rebus entries).  A tag
//! outside this set is rejected at load time — there is no open-ended
//! dispatch on the tag string.
//!
//! # Framing
//! On disk every section is `tag(4) + length(u16 LE) + checksum(u16 LE) +
//! payload`, where `length` counts the payload without its trailing NUL and
//! `checksum` is the rolling checksum of those counted bytes.  Decoded
//! sections keep that frame in sync with their state: every mutator
//! re-derives it, so `verify` holds at any point, not only right after
//! load.
//!
//! Grid-shaped sections carry a copied [`Geometry`] — never a reference to
//! the owning puzzle.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};
use thiserror::Error;

use crate::checksum::chksum;

// ── Tags ─────────────────────────────────────────────────────────────────────

/// Closed set of known section tags, in canonical serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionTag {
    Grbs,
    Rtbl,
    Ltim,
    Gext,
    Rusr,
}

impl SectionTag {
    /// Canonical on-disk order.
    pub const ALL: [SectionTag; 5] = [
        SectionTag::Grbs,
        SectionTag::Rtbl,
        SectionTag::Ltim,
        SectionTag::Gext,
        SectionTag::Rusr,
    ];

    /// The four tag bytes written to disk.
    pub const fn bytes(self) -> [u8; 4] {
        match self {
            SectionTag::Grbs => *b"GRBS",
            SectionTag::Rtbl => *b"RTBL",
            SectionTag::Ltim => *b"LTIM",
            SectionTag::Gext => *b"GEXT",
            SectionTag::Rusr => *b"RUSR",
        }
    }

    pub fn from_bytes(b: &[u8; 4]) -> Option<Self> {
        match b {
            b"GRBS" => Some(SectionTag::Grbs),
            b"RTBL" => Some(SectionTag::Rtbl),
            b"LTIM" => Some(SectionTag::Ltim),
            b"GEXT" => Some(SectionTag::Gext),
            b"RUSR" => Some(SectionTag::Rusr),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SectionTag::Grbs => "GRBS",
            SectionTag::Rtbl => "RTBL",
            SectionTag::Ltim => "LTIM",
            SectionTag::Gext => "GEXT",
            SectionTag::Rusr => "RUSR",
        }
    }
}

// ── Geometry ─────────────────────────────────────────────────────────────────

/// Immutable grid shape handed to sections that are one-byte-per-cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u8,
    pub height: u8,
}

impl Geometry {
    pub fn cells(self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }

    /// Row-major cell index, or `None` outside the grid.
    pub fn index_of(self, row: u8, col: u8) -> Option<usize> {
        if row < self.height && col < self.width {
            Some(usize::from(row) * usize::from(self.width) + usize::from(col))
        } else {
            None
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ExtraError {
    #[error("{tag} section length {found} does not match declared {declared}")]
    LengthMismatch {
        tag: &'static str,
        found: u16,
        declared: u16,
    },
    #[error("{tag} section checksum {computed:#06x} does not match declared {declared:#06x}")]
    ChecksumMismatch {
        tag: &'static str,
        computed: u16,
        declared: u16,
    },
    #[error("{tag} payload is malformed: {reason}")]
    MalformedPayload { tag: &'static str, reason: String },
    #[error("invalid cell status mask {0:#04x}")]
    InvalidMask(u8),
    #[error("cell ({row},{col}) is outside the {width}x{height} grid")]
    OutOfBounds {
        row: u8,
        col: u8,
        width: u8,
        height: u8,
    },
}

// ── Framing ──────────────────────────────────────────────────────────────────

/// Declared length and checksum, as stored in the section header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionFrame {
    pub length: u16,
    pub checksum: u16,
}

impl SectionFrame {
    /// Derive the frame a payload (including its trailing NUL) should carry.
    fn for_payload(payload: &[u8]) -> SectionFrame {
        let body = &payload[..payload.len().saturating_sub(1)];
        SectionFrame {
            length: body.len() as u16,
            checksum: chksum(body, 0),
        }
    }

    fn verify_against(self, tag: SectionTag, payload: &[u8]) -> Result<(), ExtraError> {
        let derived = SectionFrame::for_payload(payload);
        if derived.length != self.length {
            return Err(ExtraError::LengthMismatch {
                tag: tag.name(),
                found: derived.length,
                declared: self.length,
            });
        }
        if derived.checksum != self.checksum {
            return Err(ExtraError::ChecksumMismatch {
                tag: tag.name(),
                computed: derived.checksum,
                declared: self.checksum,
            });
        }
        Ok(())
    }
}

// ── GRBS — rebus positions ──────────────────────────────────────────────────

/// One byte per cell: 0 means no rebus, `n > 0` points at rebus table key
/// `n - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grbs {
    geom: Geometry,
    frame: SectionFrame,
    board: Vec<u8>,
}

impl Grbs {
    pub fn new_blank(geom: Geometry) -> Grbs {
        let mut g = Grbs {
            geom,
            frame: SectionFrame::default(),
            board: vec![0; geom.cells()],
        };
        g.refresh_frame();
        g
    }

    fn decode(frame: SectionFrame, payload: &[u8], geom: Geometry) -> Result<Grbs, ExtraError> {
        let body = &payload[..payload.len().saturating_sub(1)];
        if body.len() != geom.cells() {
            return Err(ExtraError::MalformedPayload {
                tag: SectionTag::Grbs.name(),
                reason: format!(
                    "board has {} cells, grid needs {}",
                    body.len(),
                    geom.cells()
                ),
            });
        }
        Ok(Grbs { geom, frame, board: body.to_vec() })
    }

    /// Raw board byte for a cell: 0 = no rebus, `n > 0` = table key `n - 1`.
    pub fn number_at(&self, row: u8, col: u8) -> Result<u8, ExtraError> {
        self.geom
            .index_of(row, col)
            .map(|i| self.board[i])
            .ok_or(self.out_of_bounds(row, col))
    }

    /// Rebus table key for a cell, `None` when the cell carries no rebus.
    pub fn table_key_at(&self, row: u8, col: u8) -> Result<Option<u8>, ExtraError> {
        Ok(match self.number_at(row, col)? {
            0 => None,
            n => Some(n - 1),
        })
    }

    /// Point a cell at rebus table key `key` (stored as `key + 1`).
    pub fn set_table_key(&mut self, row: u8, col: u8, key: u8) -> Result<(), ExtraError> {
        let idx = self
            .geom
            .index_of(row, col)
            .ok_or(self.out_of_bounds(row, col))?;
        self.board[idx] = key + 1;
        self.refresh_frame();
        Ok(())
    }

    /// Clear the rebus marker on a cell.
    pub fn clear(&mut self, row: u8, col: u8) -> Result<(), ExtraError> {
        let idx = self
            .geom
            .index_of(row, col)
            .ok_or(self.out_of_bounds(row, col))?;
        self.board[idx] = 0;
        self.refresh_frame();
        Ok(())
    }

    pub fn board(&self) -> &[u8] {
        &self.board
    }

    fn out_of_bounds(&self, row: u8, col: u8) -> ExtraError {
        ExtraError::OutOfBounds {
            row,
            col,
            width: self.geom.width,
            height: self.geom.height,
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut p = self.board.clone();
        p.push(0);
        p
    }

    fn refresh_frame(&mut self) {
        self.frame = SectionFrame::for_payload(&self.encode_payload());
    }
}

// ── RTBL — rebus table ──────────────────────────────────────────────────────

/// One rebus definition: the key referenced from GRBS (board byte minus one)
/// and the multi-character answer text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebusEntry {
    pub key: u8,
    pub value: Vec<u8>,
}

/// Text payload of `NN:value;` entries, keys zero-padded to two digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rtbl {
    frame: SectionFrame,
    entries: Vec<RebusEntry>,
}

impl Rtbl {
    pub fn new_empty() -> Rtbl {
        let mut t = Rtbl { frame: SectionFrame::default(), entries: Vec::new() };
        t.refresh_frame();
        t
    }

    fn decode(frame: SectionFrame, payload: &[u8]) -> Result<Rtbl, ExtraError> {
        let body = &payload[..payload.len().saturating_sub(1)];
        let mut end = body.len();
        while end > 0 && body[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        let text = &body[..end];
        let mut entries = Vec::new();
        for piece in text.split(|&b| b == b';') {
            if piece.is_empty() {
                continue;
            }
            let colon = piece.iter().position(|&b| b == b':').ok_or_else(|| {
                ExtraError::MalformedPayload {
                    tag: SectionTag::Rtbl.name(),
                    reason: format!("entry {:?} has no ':'", String::from_utf8_lossy(piece)),
                }
            })?;
            let key_text = String::from_utf8_lossy(&piece[..colon]);
            let key = key_text.trim().parse::<u8>().map_err(|_| {
                ExtraError::MalformedPayload {
                    tag: SectionTag::Rtbl.name(),
                    reason: format!("bad rebus key {key_text:?}"),
                }
            })?;
            entries.push(RebusEntry { key, value: piece[colon + 1..].to_vec() });
        }
        Ok(Rtbl { frame, entries })
    }

    pub fn get(&self, key: u8) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_slice())
    }

    /// Insert a new entry or update the existing one for `key`.
    pub fn set(&mut self, key: u8, value: &[u8]) {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(e) => e.value = value.to_vec(),
            None => self.entries.push(RebusEntry { key, value: value.to_vec() }),
        }
        self.refresh_frame();
    }

    pub fn entries(&self) -> &[RebusEntry] {
        &self.entries
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut p = Vec::new();
        for e in &self.entries {
            p.extend_from_slice(format!("{:02}:", e.key).as_bytes());
            p.extend_from_slice(&e.value);
            p.push(b';');
        }
        p.push(0);
        p
    }

    fn refresh_frame(&mut self) {
        self.frame = SectionFrame::for_payload(&self.encode_payload());
    }
}

// ── LTIM — timer state ──────────────────────────────────────────────────────

/// Timer *state*: elapsed seconds and a stopped flag.  Driving an actual
/// clock is the caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ltim {
    frame: SectionFrame,
    elapsed: u32,
    stopped: bool,
}

impl Ltim {
    pub fn new(elapsed: u32, stopped: bool) -> Ltim {
        let mut t = Ltim { frame: SectionFrame::default(), elapsed, stopped };
        t.refresh_frame();
        t
    }

    fn decode(frame: SectionFrame, payload: &[u8]) -> Result<Ltim, ExtraError> {
        let malformed = |reason: String| ExtraError::MalformedPayload {
            tag: SectionTag::Ltim.name(),
            reason,
        };
        let body = &payload[..payload.len().saturating_sub(1)];
        let text = String::from_utf8_lossy(body);
        let (elapsed_text, stopped_text) = text
            .split_once(',')
            .ok_or_else(|| malformed(format!("expected \"<seconds>,<flag>\", got {text:?}")))?;
        let elapsed = elapsed_text
            .trim()
            .parse::<u32>()
            .map_err(|_| malformed(format!("bad elapsed seconds {elapsed_text:?}")))?;
        let stopped = match stopped_text.trim() {
            "0" => false,
            "1" => true,
            other => return Err(malformed(format!("bad stopped flag {other:?}"))),
        };
        Ok(Ltim { frame, elapsed, stopped })
    }

    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn start(&mut self) {
        self.stopped = false;
        self.refresh_frame();
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        self.refresh_frame();
    }

    pub fn set_elapsed(&mut self, seconds: u32) {
        self.elapsed = seconds;
        self.refresh_frame();
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut p = format!("{},{}", self.elapsed, u8::from(self.stopped)).into_bytes();
        p.push(0);
        p
    }

    fn refresh_frame(&mut self) {
        self.frame = SectionFrame::for_payload(&self.encode_payload());
    }
}

// ── GEXT — per-cell status flags ────────────────────────────────────────────

/// Square was marked incorrect by an earlier check.
pub const PREV_INCORRECT: u8 = 0x10;
/// Square is currently marked incorrect.
pub const CURR_INCORRECT: u8 = 0x20;
/// Square contents were revealed.
pub const REVEALED: u8 = 0x40;
/// Square is circled.
pub const CIRCLED: u8 = 0x80;

/// One status byte per cell.
///
/// A section synthesized for a file that carried none stays flagged
/// `synthetic` until first mutated; serialization omits a synthetic section
/// so unmodified puzzles round-trip byte-exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gext {
    geom: Geometry,
    frame: SectionFrame,
    states: Vec<u8>,
    synthetic: bool,
}

impl Gext {
    /// All-zero section standing in for a file that carried no GEXT.
    pub fn synthesized(geom: Geometry) -> Gext {
        let mut g = Gext {
            geom,
            frame: SectionFrame::default(),
            states: vec![0; geom.cells()],
            synthetic: true,
        };
        g.refresh_frame();
        g
    }

    fn decode(frame: SectionFrame, payload: &[u8], geom: Geometry) -> Result<Gext, ExtraError> {
        let body = &payload[..payload.len().saturating_sub(1)];
        if body.len() != geom.cells() {
            return Err(ExtraError::MalformedPayload {
                tag: SectionTag::Gext.name(),
                reason: format!(
                    "status grid has {} cells, puzzle needs {}",
                    body.len(),
                    geom.cells()
                ),
            });
        }
        Ok(Gext {
            geom,
            frame,
            states: body.to_vec(),
            synthetic: false,
        })
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    fn check_mask(mask: u8) -> Result<(), ExtraError> {
        match mask {
            PREV_INCORRECT | CURR_INCORRECT | REVEALED | CIRCLED => Ok(()),
            other => Err(ExtraError::InvalidMask(other)),
        }
    }

    /// OR `mask` into a cell's status byte.  The incorrect/revealed flags
    /// are mutually exclusive: setting one clears the other two.  CIRCLED is
    /// independent and never auto-cleared.
    pub fn set_mask(&mut self, row: u8, col: u8, mask: u8) -> Result<(), ExtraError> {
        Self::check_mask(mask)?;
        let idx = self
            .geom
            .index_of(row, col)
            .ok_or(self.out_of_bounds(row, col))?;
        self.states[idx] |= mask;
        match mask {
            PREV_INCORRECT => self.states[idx] &= !(CURR_INCORRECT | REVEALED),
            CURR_INCORRECT => self.states[idx] &= !(PREV_INCORRECT | REVEALED),
            REVEALED => self.states[idx] &= !(PREV_INCORRECT | CURR_INCORRECT),
            _ => {}
        }
        self.synthetic = false;
        self.refresh_frame();
        Ok(())
    }

    pub fn mask_at(&self, row: u8, col: u8) -> Result<u8, ExtraError> {
        self.geom
            .index_of(row, col)
            .map(|i| self.states[i])
            .ok_or(self.out_of_bounds(row, col))
    }

    pub fn has_mask(&self, row: u8, col: u8, mask: u8) -> Result<bool, ExtraError> {
        Self::check_mask(mask)?;
        Ok(self.mask_at(row, col)? & mask != 0)
    }

    /// Reset every cell's status byte to zero.
    pub fn blank(&mut self) {
        self.states = vec![0; self.geom.cells()];
        self.refresh_frame();
    }

    pub fn states(&self) -> &[u8] {
        &self.states
    }

    fn out_of_bounds(&self, row: u8, col: u8) -> ExtraError {
        ExtraError::OutOfBounds {
            row,
            col,
            width: self.geom.width,
            height: self.geom.height,
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut p = self.states.clone();
        p.push(0);
        p
    }

    fn refresh_frame(&mut self) {
        self.frame = SectionFrame::for_payload(&self.encode_payload());
    }
}

// ── RUSR — user rebus entries ───────────────────────────────────────────────

/// User-entered rebus markers, carried opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rusr {
    frame: SectionFrame,
    raw: Vec<u8>,
}

impl Rusr {
    fn decode(frame: SectionFrame, payload: &[u8]) -> Rusr {
        let body = &payload[..payload.len().saturating_sub(1)];
        Rusr { frame, raw: body.to_vec() }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut p = self.raw.clone();
        p.push(0);
        p
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// A decoded extra section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extra {
    Grbs(Grbs),
    Rtbl(Rtbl),
    Ltim(Ltim),
    Gext(Gext),
    Rusr(Rusr),
}

impl Extra {
    /// Decode one section's payload (including its trailing NUL).
    pub fn decode(
        tag: SectionTag,
        frame: SectionFrame,
        payload: &[u8],
        geom: Geometry,
    ) -> Result<Extra, ExtraError> {
        Ok(match tag {
            SectionTag::Grbs => Extra::Grbs(Grbs::decode(frame, payload, geom)?),
            SectionTag::Rtbl => Extra::Rtbl(Rtbl::decode(frame, payload)?),
            SectionTag::Ltim => Extra::Ltim(Ltim::decode(frame, payload)?),
            SectionTag::Gext => Extra::Gext(Gext::decode(frame, payload, geom)?),
            SectionTag::Rusr => Extra::Rusr(Rusr::decode(frame, payload)),
        })
    }

    pub fn tag(&self) -> SectionTag {
        match self {
            Extra::Grbs(_) => SectionTag::Grbs,
            Extra::Rtbl(_) => SectionTag::Rtbl,
            Extra::Ltim(_) => SectionTag::Ltim,
            Extra::Gext(_) => SectionTag::Gext,
            Extra::Rusr(_) => SectionTag::Rusr,
        }
    }

    pub fn frame(&self) -> SectionFrame {
        match self {
            Extra::Grbs(s) => s.frame,
            Extra::Rtbl(s) => s.frame,
            Extra::Ltim(s) => s.frame,
            Extra::Gext(s) => s.frame,
            Extra::Rusr(s) => s.frame,
        }
    }

    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Extra::Grbs(s) => s.encode_payload(),
            Extra::Rtbl(s) => s.encode_payload(),
            Extra::Ltim(s) => s.encode_payload(),
            Extra::Gext(s) => s.encode_payload(),
            Extra::Rusr(s) => s.encode_payload(),
        }
    }

    /// Re-derive length and checksum from the decoded state and compare to
    /// the declared frame.
    pub fn verify(&self) -> Result<(), ExtraError> {
        self.frame().verify_against(self.tag(), &self.encode_payload())
    }

    /// Write `tag + length + checksum + payload`, re-deriving the frame
    /// from the current state.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let payload = self.encode_payload();
        let frame = SectionFrame::for_payload(&payload);
        writer.write_all(&self.tag().bytes())?;
        writer.write_u16::<LittleEndian>(frame.length)?;
        writer.write_u16::<LittleEndian>(frame.checksum)?;
        writer.write_all(&payload)?;
        Ok(())
    }
}
