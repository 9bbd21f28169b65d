//! The puzzle model — parse, verify, mutate, and re-serialize `.puz` files.
//!
//! # Reading
//! [`Puzzle::load`] is the normal entry point: it parses the byte buffer,
//! verifies every stored checksum and cross-reference, builds the clue map,
//! and returns the puzzle together with any non-fatal warnings.
//! [`Puzzle::parse`] alone skips verification for callers that want to
//! inspect a damaged file.
//!
//! # Round-trips
//! Parsing preserves every opaque region verbatim — leading junk before the
//! magic token, the version bytes, both reserved regions — so that
//! [`Puzzle::write_to`] reproduces a well-formed input byte for byte when
//! nothing was mutated.
//!
//! # Mutation
//! Fill, check, and reveal operate on the state grid and record their
//! outcomes through the GEXT status section.  On a scrambled puzzle the
//! per-letter operations report "unknown" (the true solution is
//! inaccessible) and only the whole-grid check is meaningful.
//!
//! # Endianness
//! All multi-byte header fields are little-endian.  No runtime negotiation
//! is ever performed.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use thiserror::Error;

use crate::checksum::{
    chksum, ChecksumKind, ChecksumValue, MASK_HIGH_MAGIC, MASK_LOW_MAGIC,
};
use crate::clues::{ClueMap, ClueRef, Direction};
use crate::extras::{
    Extra, ExtraError, Gext, Geometry, Grbs, Ltim, Rtbl, Rusr, SectionFrame, SectionTag,
    CURR_INCORRECT, PREV_INCORRECT, REVEALED,
};
use crate::scramble::{self, ScrambleError, ScrambleKey};

/// The 12 magic bytes at offset 0 of the header proper.
pub const MAGIC: &[u8; 12] = b"ACROSS&DOWN\0";
/// The searchable token (the magic without its NUL terminator).
const MAGIC_TOKEN: &[u8] = b"ACROSS&DOWN";
/// Version written into new puzzles.
pub const VERSION: &[u8; 4] = b"1.3\0";
/// Block marker in both grids.
pub const BLOCK: u8 = b'.';
/// Empty-cell marker in the state grid.
pub const EMPTY: u8 = b'-';
/// Scrambled-tag value marking a locked solution.
const SCRAMBLED_TAG: u16 = 0x0004;

// ── Errors and warnings ──────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum PuzzleError {
    #[error("not a puzzle file: magic token not found")]
    Format,
    #[error("file truncated while reading {0}")]
    Truncated(&'static str),
    #[error("{kind} checksum mismatch: computed {computed}, stored {stored}")]
    Checksum {
        kind: ChecksumKind,
        computed: ChecksumValue,
        stored: ChecksumValue,
    },
    #[error("wrong number of clues: {found} listed, {declared} declared")]
    ClueCount { found: usize, declared: u16 },
    #[error("unknown extra section tag {0:?}")]
    UnknownSection(String),
    #[error("rebus key {key} referenced at ({row},{col}) has no table entry")]
    RebusReference { key: u8, row: u8, col: u8 },
    #[error("cell ({row},{col}) is not a letter cell of the {width}x{height} grid")]
    OutOfBounds {
        row: u8,
        col: u8,
        width: u8,
        height: u8,
    },
    #[error("cannot write {0:?}: only letters A-Z are accepted")]
    InvalidLetter(char),
    #[error("puzzle is not in design mode")]
    NotEditable,
    #[error(transparent)]
    Extra(#[from] ExtraError),
    #[error(transparent)]
    Scramble(#[from] ScrambleError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Non-fatal conditions surfaced by [`Puzzle::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyWarning {
    /// The file carried no GEXT section; a blank one was synthesized.
    MissingGext,
    /// A GRBS section is present but there is no rebus table to resolve it.
    GrbsWithoutRtbl,
    /// Rebus table keys defined but never referenced from the grid.
    UnusedRebusEntries(Vec<u8>),
}

impl fmt::Display for VerifyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyWarning::MissingGext => {
                f.write_str("no GEXT section in file, synthesized a blank one")
            }
            VerifyWarning::GrbsWithoutRtbl => {
                f.write_str("GRBS section present but no RTBL table")
            }
            VerifyWarning::UnusedRebusEntries(keys) => {
                write!(f, "rebus table entries never referenced: {keys:?}")
            }
        }
    }
}

// ── Summary view ─────────────────────────────────────────────────────────────

/// One numbered clue as presented to solvers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberedClue {
    pub number: u32,
    pub clue: String,
}

/// Serializable digest of a puzzle, consumed by the CLI's JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub title: String,
    pub author: String,
    pub copyright: String,
    pub notes: String,
    pub version: String,
    pub width: u8,
    pub height: u8,
    pub n_clues: u16,
    pub scrambled: bool,
    pub across: Vec<NumberedClue>,
    pub down: Vec<NumberedClue>,
    /// Solution rows (scrambled text when the puzzle is locked).
    pub solution: Vec<String>,
    /// Current fill rows.
    pub state: Vec<String>,
}

// ── Puzzle ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Puzzle {
    // Preserved opaque regions.
    start_junk: Vec<u8>,
    file_magic: [u8; 12],
    version: [u8; 4],
    reserved_1c: [u8; 2],
    reserved_20: [u8; 12],

    // Stored checksums.
    board_checksum: u16,
    cib_checksum: u16,
    masked_low: [u8; 4],
    masked_high: [u8; 4],

    // Header fields.
    scrambled_checksum: u16,
    width: u8,
    height: u8,
    n_clues: u16,
    bitmask: u16,
    scrambled_tag: u16,

    // Grids, row-major.
    solution: Vec<u8>,
    state: Vec<u8>,

    // Text fields, raw Latin-1 bytes.
    title: Vec<u8>,
    author: Vec<u8>,
    copyright: Vec<u8>,
    clues: Vec<Vec<u8>>,
    notes: Vec<u8>,

    // Extra sections.  GEXT is always present: synthesized when the file
    // carried none.
    grbs: Option<Grbs>,
    rtbl: Option<Rtbl>,
    ltim: Option<Ltim>,
    gext: Gext,
    rusr: Option<Rusr>,

    clue_map: ClueMap,
    design_mode: bool,
}

// ── Reader helpers ───────────────────────────────────────────────────────────

fn read_u8(cur: &mut Cursor<&[u8]>, what: &'static str) -> Result<u8, PuzzleError> {
    cur.read_u8().map_err(|_| PuzzleError::Truncated(what))
}

fn read_u16(cur: &mut Cursor<&[u8]>, what: &'static str) -> Result<u16, PuzzleError> {
    cur.read_u16::<LittleEndian>()
        .map_err(|_| PuzzleError::Truncated(what))
}

fn read_array<const N: usize>(
    cur: &mut Cursor<&[u8]>,
    what: &'static str,
) -> Result<[u8; N], PuzzleError> {
    let mut buf = [0u8; N];
    cur.read_exact(&mut buf)
        .map_err(|_| PuzzleError::Truncated(what))?;
    Ok(buf)
}

fn read_vec(
    cur: &mut Cursor<&[u8]>,
    len: usize,
    what: &'static str,
) -> Result<Vec<u8>, PuzzleError> {
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf)
        .map_err(|_| PuzzleError::Truncated(what))?;
    Ok(buf)
}

/// Read bytes up to (and consuming) the next NUL.
fn read_zstring(cur: &mut Cursor<&[u8]>, what: &'static str) -> Result<Vec<u8>, PuzzleError> {
    let mut buf = Vec::new();
    loop {
        match read_u8(cur, what)? {
            0 => return Ok(buf),
            b => buf.push(b),
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl Puzzle {
    // ── Loading ──────────────────────────────────────────────────────────────

    /// Parse, verify, and index a puzzle.  Returns the puzzle and the
    /// non-fatal warnings verification surfaced.
    pub fn load(bytes: &[u8]) -> Result<(Puzzle, Vec<VerifyWarning>), PuzzleError> {
        let puzzle = Puzzle::parse(bytes)?;
        let warnings = puzzle.verify()?;
        Ok((puzzle, warnings))
    }

    /// [`Puzzle::load`] over a reader; the whole stream is buffered first.
    pub fn load_from<R: Read>(mut reader: R) -> Result<(Puzzle, Vec<VerifyWarning>), PuzzleError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Puzzle::load(&bytes)
    }

    /// Parse without verifying checksums or cross-references.
    pub fn parse(bytes: &[u8]) -> Result<Puzzle, PuzzleError> {
        let token_pos = bytes
            .windows(MAGIC_TOKEN.len())
            .position(|w| w == MAGIC_TOKEN)
            .ok_or(PuzzleError::Format)?;
        // The two overall-checksum bytes precede the token.
        if token_pos < 2 {
            return Err(PuzzleError::Format);
        }
        let start_junk = bytes[..token_pos - 2].to_vec();
        let mut cur = Cursor::new(&bytes[token_pos - 2..]);

        let board_checksum = read_u16(&mut cur, "overall checksum")?;
        let file_magic: [u8; 12] = read_array(&mut cur, "magic")?;
        let cib_checksum = read_u16(&mut cur, "CIB checksum")?;
        let masked_low: [u8; 4] = read_array(&mut cur, "masked low checksums")?;
        let masked_high: [u8; 4] = read_array(&mut cur, "masked high checksums")?;
        let version: [u8; 4] = read_array(&mut cur, "version")?;
        let reserved_1c: [u8; 2] = read_array(&mut cur, "reserved header bytes")?;
        let scrambled_checksum = read_u16(&mut cur, "scrambled checksum")?;
        let reserved_20: [u8; 12] = read_array(&mut cur, "reserved header bytes")?;
        let width = read_u8(&mut cur, "width")?;
        let height = read_u8(&mut cur, "height")?;
        let n_clues = read_u16(&mut cur, "clue count")?;
        let bitmask = read_u16(&mut cur, "bitmask")?;
        let scrambled_tag = read_u16(&mut cur, "scrambled tag")?;

        let cells = usize::from(width) * usize::from(height);
        let solution = read_vec(&mut cur, cells, "solution grid")?;
        let state = read_vec(&mut cur, cells, "state grid")?;

        let title = read_zstring(&mut cur, "title")?;
        let author = read_zstring(&mut cur, "author")?;
        let copyright = read_zstring(&mut cur, "copyright")?;
        let clues = (0..n_clues)
            .map(|_| read_zstring(&mut cur, "clue"))
            .collect::<Result<Vec<_>, _>>()?;
        let notes = read_zstring(&mut cur, "notes")?;

        let geom = Geometry { width, height };
        let mut grbs = None;
        let mut rtbl = None;
        let mut ltim = None;
        let mut gext = None;
        let mut rusr = None;

        let total = cur.get_ref().len() as u64;
        while cur.position() < total {
            let tag_bytes: [u8; 4] = read_array(&mut cur, "extra section tag")?;
            let tag = SectionTag::from_bytes(&tag_bytes).ok_or_else(|| {
                PuzzleError::UnknownSection(lossy(&tag_bytes))
            })?;
            let length = read_u16(&mut cur, "extra section length")?;
            let checksum = read_u16(&mut cur, "extra section checksum")?;
            let payload = read_vec(
                &mut cur,
                usize::from(length) + 1,
                "extra section payload",
            )?;
            let frame = SectionFrame { length, checksum };
            match Extra::decode(tag, frame, &payload, geom)? {
                Extra::Grbs(s) => grbs = Some(s),
                Extra::Rtbl(s) => rtbl = Some(s),
                Extra::Ltim(s) => ltim = Some(s),
                Extra::Gext(s) => gext = Some(s),
                Extra::Rusr(s) => rusr = Some(s),
            }
        }

        // Fill checking always writes through GEXT, so a file without one
        // gets a blank section with a finalized frame.
        let gext = gext.unwrap_or_else(|| Gext::synthesized(geom));

        let clue_map = ClueMap::build(&solution, usize::from(width), usize::from(height));

        Ok(Puzzle {
            start_junk,
            file_magic,
            version,
            reserved_1c,
            reserved_20,
            board_checksum,
            cib_checksum,
            masked_low,
            masked_high,
            scrambled_checksum,
            width,
            height,
            n_clues,
            bitmask,
            scrambled_tag,
            solution,
            state,
            title,
            author,
            copyright,
            clues,
            notes,
            grbs,
            rtbl,
            ltim,
            gext,
            rusr,
            clue_map,
            design_mode: false,
        })
    }

    // ── Verification ─────────────────────────────────────────────────────────

    /// Check structural integrity: clue count, the four stored checksums in
    /// order, extra-section self-verification, and rebus cross-references.
    /// Fails fast on the first fatal problem; non-fatal conditions come back
    /// as warnings.
    pub fn verify(&self) -> Result<Vec<VerifyWarning>, PuzzleError> {
        let mut warnings = Vec::new();

        if self.clues.len() != usize::from(self.n_clues) {
            return Err(PuzzleError::ClueCount {
                found: self.clues.len(),
                declared: self.n_clues,
            });
        }

        for kind in ChecksumKind::ALL {
            self.verify_checksum(kind)?;
        }

        for extra in self.extras() {
            extra.verify()?;
        }

        if self.gext.is_synthetic() {
            warnings.push(VerifyWarning::MissingGext);
        }

        match (&self.grbs, &self.rtbl) {
            (Some(_), None) => warnings.push(VerifyWarning::GrbsWithoutRtbl),
            (Some(grbs), Some(rtbl)) => {
                let mut used = Vec::new();
                for row in 0..self.height {
                    for col in 0..self.width {
                        if !self.is_letter(row, col) {
                            continue;
                        }
                        if let Some(key) = grbs.table_key_at(row, col)? {
                            if rtbl.get(key).is_none() {
                                return Err(PuzzleError::RebusReference { key, row, col });
                            }
                            if !used.contains(&key) {
                                used.push(key);
                            }
                        }
                    }
                }
                let unused: Vec<u8> = rtbl
                    .entries()
                    .iter()
                    .map(|e| e.key)
                    .filter(|k| !used.contains(k))
                    .collect();
                if !unused.is_empty() {
                    warnings.push(VerifyWarning::UnusedRebusEntries(unused));
                }
            }
            _ => {}
        }

        Ok(warnings)
    }

    /// Recompute one checksum and compare it to the stored value.
    pub fn verify_checksum(&self, kind: ChecksumKind) -> Result<(), PuzzleError> {
        let computed = self.compute_checksum(kind);
        let stored = self.stored_checksum(kind);
        if computed != stored {
            return Err(PuzzleError::Checksum { kind, computed, stored });
        }
        Ok(())
    }

    /// Recompute a checksum from the current fields.
    pub fn compute_checksum(&self, kind: ChecksumKind) -> ChecksumValue {
        match kind {
            ChecksumKind::Cib => ChecksumValue::Word(self.compute_cib()),
            ChecksumKind::Board => ChecksumValue::Word(self.compute_board()),
            ChecksumKind::MaskedLow => ChecksumValue::Hex(hex::encode(self.compute_masked().0)),
            ChecksumKind::MaskedHigh => ChecksumValue::Hex(hex::encode(self.compute_masked().1)),
        }
    }

    /// The checksum as stored in the header.
    pub fn stored_checksum(&self, kind: ChecksumKind) -> ChecksumValue {
        match kind {
            ChecksumKind::Cib => ChecksumValue::Word(self.cib_checksum),
            ChecksumKind::Board => ChecksumValue::Word(self.board_checksum),
            ChecksumKind::MaskedLow => ChecksumValue::Hex(hex::encode(self.masked_low)),
            ChecksumKind::MaskedHigh => ChecksumValue::Hex(hex::encode(self.masked_high)),
        }
    }

    fn compute_cib(&self) -> u16 {
        let mut packed = Vec::with_capacity(8);
        packed.push(self.width);
        packed.push(self.height);
        packed.extend_from_slice(&self.n_clues.to_le_bytes());
        packed.extend_from_slice(&self.bitmask.to_le_bytes());
        packed.extend_from_slice(&self.scrambled_tag.to_le_bytes());
        chksum(&packed, 0)
    }

    /// Fold title/author/copyright (NUL-terminated, skipped when empty),
    /// every clue (no terminator), and notes (NUL-terminated, skipped when
    /// empty) onto `seed`.
    fn fold_text(&self, seed: u16) -> u16 {
        let mut cs = seed;
        for field in [&self.title, &self.author, &self.copyright] {
            if !field.is_empty() {
                cs = chksum(field, cs);
                cs = chksum(&[0], cs);
            }
        }
        for clue in &self.clues {
            cs = chksum(clue, cs);
        }
        if !self.notes.is_empty() {
            cs = chksum(&self.notes, cs);
            cs = chksum(&[0], cs);
        }
        cs
    }

    fn compute_board(&self) -> u16 {
        let mut cs = chksum(&self.solution, self.compute_cib());
        cs = chksum(&self.state, cs);
        self.fold_text(cs)
    }

    fn compute_masked(&self) -> ([u8; 4], [u8; 4]) {
        let parts = [
            self.compute_cib(),
            chksum(&self.solution, 0),
            chksum(&self.state, 0),
            self.fold_text(0),
        ];
        let mut low = [0u8; 4];
        let mut high = [0u8; 4];
        for (i, part) in parts.into_iter().enumerate() {
            low[i] = MASK_LOW_MAGIC[i] ^ (part & 0x00ff) as u8;
            high[i] = MASK_HIGH_MAGIC[i] ^ (part >> 8) as u8;
        }
        (low, high)
    }

    /// Overwrite all four stored checksums with freshly computed values.
    pub fn refresh_checksums(&mut self) {
        self.cib_checksum = self.compute_cib();
        self.board_checksum = self.compute_board();
        let (low, high) = self.compute_masked();
        self.masked_low = low;
        self.masked_high = high;
    }

    // ── Geometry and cell queries ────────────────────────────────────────────

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn n_clues(&self) -> u16 {
        self.n_clues
    }

    /// Row-major cell index.
    pub fn rc2idx(&self, row: u8, col: u8) -> usize {
        usize::from(row) * usize::from(self.width) + usize::from(col)
    }

    /// Inverse of [`Puzzle::rc2idx`].
    pub fn idx2rc(&self, idx: usize) -> (u8, u8) {
        let w = usize::from(self.width);
        ((idx / w) as u8, (idx % w) as u8)
    }

    /// Whether the cell is inside the grid and not a block.
    pub fn is_letter(&self, row: u8, col: u8) -> bool {
        row < self.height
            && col < self.width
            && self.solution[self.rc2idx(row, col)] != BLOCK
    }

    fn letter_index(&self, row: u8, col: u8) -> Result<usize, PuzzleError> {
        if self.is_letter(row, col) {
            Ok(self.rc2idx(row, col))
        } else {
            Err(PuzzleError::OutOfBounds {
                row,
                col,
                width: self.width,
                height: self.height,
            })
        }
    }

    /// Solution letter at a cell.  On a scrambled puzzle this is the
    /// obscured letter, not the true solution.
    pub fn solution_letter_at(&self, row: u8, col: u8) -> Result<char, PuzzleError> {
        Ok(self.solution[self.letter_index(row, col)?] as char)
    }

    /// Current fill letter at a cell (`-` when empty).
    pub fn letter_at(&self, row: u8, col: u8) -> Result<char, PuzzleError> {
        Ok(self.state[self.letter_index(row, col)?] as char)
    }

    pub fn is_scrambled(&self) -> bool {
        self.scrambled_checksum > 0
    }

    pub fn is_design_mode(&self) -> bool {
        self.design_mode
    }

    // ── Text accessors ───────────────────────────────────────────────────────

    pub fn title(&self) -> String {
        lossy(&self.title)
    }

    pub fn author(&self) -> String {
        lossy(&self.author)
    }

    pub fn copyright(&self) -> String {
        lossy(&self.copyright)
    }

    pub fn notes(&self) -> String {
        lossy(&self.notes)
    }

    /// Version string from the header, e.g. `"1.3"`.
    pub fn version(&self) -> String {
        let end = self
            .version
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.version.len());
        lossy(&self.version[..end])
    }

    pub fn clue(&self, index: usize) -> Option<String> {
        self.clues.get(index).map(|c| lossy(c))
    }

    pub fn clue_map(&self) -> &ClueMap {
        &self.clue_map
    }

    pub fn across_clues(&self) -> &[ClueRef] {
        &self.clue_map.across
    }

    pub fn down_clues(&self) -> &[ClueRef] {
        &self.clue_map.down
    }

    // ── Words ────────────────────────────────────────────────────────────────

    /// The current-fill word through a cell in the given direction, letters
    /// in raster order.
    pub fn word_at(&self, row: u8, col: u8, dir: Direction) -> Result<String, PuzzleError> {
        let cells = self.word_cell_indices(row, col, dir)?;
        Ok(cells.iter().map(|&i| self.state[i] as char).collect())
    }

    /// The solution word through a cell.  Scrambled puzzles yield the
    /// obscured letters.
    pub fn solution_word_at(
        &self,
        row: u8,
        col: u8,
        dir: Direction,
    ) -> Result<String, PuzzleError> {
        let cells = self.word_cell_indices(row, col, dir)?;
        Ok(cells.iter().map(|&i| self.solution[i] as char).collect())
    }

    fn word_cell_indices(
        &self,
        row: u8,
        col: u8,
        dir: Direction,
    ) -> Result<Vec<usize>, PuzzleError> {
        let idx = self.letter_index(row, col)?;
        Ok(self.clue_map.word_cells(idx, dir))
    }

    // ── Extra-section accessors ──────────────────────────────────────────────

    pub fn grbs(&self) -> Option<&Grbs> {
        self.grbs.as_ref()
    }

    pub fn rtbl(&self) -> Option<&Rtbl> {
        self.rtbl.as_ref()
    }

    pub fn rtbl_mut(&mut self) -> Option<&mut Rtbl> {
        self.rtbl.as_mut()
    }

    pub fn timer(&self) -> Option<&Ltim> {
        self.ltim.as_ref()
    }

    pub fn timer_mut(&mut self) -> Option<&mut Ltim> {
        self.ltim.as_mut()
    }

    pub fn gext(&self) -> &Gext {
        &self.gext
    }

    pub fn gext_mut(&mut self) -> &mut Gext {
        &mut self.gext
    }

    pub fn rusr(&self) -> Option<&Rusr> {
        self.rusr.as_ref()
    }

    /// The present sections in canonical order.
    fn extras(&self) -> Vec<Extra> {
        let mut out = Vec::new();
        if let Some(s) = &self.grbs {
            out.push(Extra::Grbs(s.clone()));
        }
        if let Some(s) = &self.rtbl {
            out.push(Extra::Rtbl(s.clone()));
        }
        if let Some(s) = &self.ltim {
            out.push(Extra::Ltim(*s));
        }
        out.push(Extra::Gext(self.gext.clone()));
        if let Some(s) = &self.rusr {
            out.push(Extra::Rusr(s.clone()));
        }
        out
    }

    /// Rebus marker at a cell: 0 for no rebus and for any cell that is not
    /// a playable letter cell.
    pub fn rebus_number_at(&self, row: u8, col: u8) -> u8 {
        if !self.is_letter(row, col) {
            return 0;
        }
        match &self.grbs {
            Some(grbs) => grbs.number_at(row, col).unwrap_or(0),
            None => 0,
        }
    }

    /// The rebus answer text for a cell, when one is defined.
    pub fn rebus_at(&self, row: u8, col: u8) -> Option<String> {
        match self.rebus_number_at(row, col) {
            0 => None,
            n => self.rtbl.as_ref()?.get(n - 1).map(lossy),
        }
    }

    // ── Fill, check, reveal ──────────────────────────────────────────────────

    /// Write a letter into the state grid.  Input is case-folded; anything
    /// outside `A`-`Z` is rejected.  Overwriting a cell currently flagged
    /// incorrect demotes the flag to "previously incorrect".  Stored
    /// checksums track the edit so the puzzle stays serializable and
    /// verifiable at any point.
    pub fn set_letter_at(&mut self, row: u8, col: u8, letter: char) -> Result<(), PuzzleError> {
        let idx = self.letter_index(row, col)?;
        let upper = letter.to_ascii_uppercase();
        if !upper.is_ascii_uppercase() {
            return Err(PuzzleError::InvalidLetter(letter));
        }
        self.state[idx] = upper as u8;
        if self.gext.has_mask(row, col, CURR_INCORRECT)? {
            self.gext.set_mask(row, col, PREV_INCORRECT)?;
        }
        self.refresh_checksums();
        Ok(())
    }

    /// Check one cell against the solution.  Returns `None` ("unknown") on
    /// a scrambled puzzle; otherwise flags a mismatch as currently
    /// incorrect and reports the outcome.
    pub fn check_letter(&mut self, row: u8, col: u8) -> Result<Option<bool>, PuzzleError> {
        let idx = self.letter_index(row, col)?;
        if self.is_scrambled() {
            return Ok(None);
        }
        if self.state[idx] != self.solution[idx] {
            self.gext.set_mask(row, col, CURR_INCORRECT)?;
            Ok(Some(false))
        } else {
            Ok(Some(true))
        }
    }

    /// Check every cell of the word through `(row, col)`.  All mismatched
    /// cells are flagged; the result is whether the whole word is correct.
    pub fn check_word(
        &mut self,
        row: u8,
        col: u8,
        dir: Direction,
    ) -> Result<Option<bool>, PuzzleError> {
        let cells = self.word_cell_indices(row, col, dir)?;
        if self.is_scrambled() {
            return Ok(None);
        }
        let mut all_correct = true;
        for idx in cells {
            let (r, c) = self.idx2rc(idx);
            if let Some(ok) = self.check_letter(r, c)? {
                all_correct &= ok;
            }
        }
        Ok(Some(all_correct))
    }

    /// Check the whole grid.  On a scrambled puzzle the state grid checksum
    /// is compared to the stored scrambled checksum and no flags move;
    /// otherwise every letter cell is checked and flagged individually.
    pub fn check_all(&mut self) -> Result<bool, PuzzleError> {
        if self.is_scrambled() {
            return Ok(chksum(&self.state, 0) == self.scrambled_checksum);
        }
        let mut all_correct = true;
        for row in 0..self.height {
            for col in 0..self.width {
                if !self.is_letter(row, col) {
                    continue;
                }
                if let Some(ok) = self.check_letter(row, col)? {
                    all_correct &= ok;
                }
            }
        }
        Ok(all_correct)
    }

    /// Reveal one cell.  Disabled (returns `Ok(false)`) while scrambled.
    /// Cells already correct are left untouched.
    pub fn reveal_letter(&mut self, row: u8, col: u8) -> Result<bool, PuzzleError> {
        let idx = self.letter_index(row, col)?;
        if self.is_scrambled() {
            return Ok(false);
        }
        if self.state[idx] != self.solution[idx] {
            self.state[idx] = self.solution[idx];
            self.gext.set_mask(row, col, REVEALED)?;
            self.refresh_checksums();
        }
        Ok(true)
    }

    /// Reveal the word through `(row, col)`.  Disabled while scrambled.
    pub fn reveal_word(&mut self, row: u8, col: u8, dir: Direction) -> Result<bool, PuzzleError> {
        let cells = self.word_cell_indices(row, col, dir)?;
        if self.is_scrambled() {
            return Ok(false);
        }
        for idx in cells {
            let (r, c) = self.idx2rc(idx);
            self.reveal_letter(r, c)?;
        }
        Ok(true)
    }

    /// Reveal the whole grid.  Disabled while scrambled.
    pub fn reveal_all(&mut self) -> Result<bool, PuzzleError> {
        if self.is_scrambled() {
            return Ok(false);
        }
        for row in 0..self.height {
            for col in 0..self.width {
                if self.is_letter(row, col) {
                    self.reveal_letter(row, col)?;
                }
            }
        }
        Ok(true)
    }

    // ── Scrambling ───────────────────────────────────────────────────────────

    /// Cell indices of all letter cells in column-major order — the
    /// linearization the cipher operates on.
    fn column_major_letter_indices(&self) -> Vec<usize> {
        let mut order = Vec::new();
        for col in 0..self.width {
            for row in 0..self.height {
                if self.is_letter(row, col) {
                    order.push(self.rc2idx(row, col));
                }
            }
        }
        order
    }

    /// Obscure the solution grid with `key`.  The scrambled checksum is
    /// taken over the clear solution first so a completed state grid can
    /// still be recognized; stored checksums are refreshed afterwards.
    pub fn scramble(&mut self, key: ScrambleKey) -> Result<(), PuzzleError> {
        if self.is_scrambled() {
            return Err(ScrambleError::AlreadyScrambled.into());
        }
        let order = self.column_major_letter_indices();
        let clear: Vec<u8> = order.iter().map(|&i| self.solution[i]).collect();

        self.scrambled_checksum = chksum(&self.solution, 0);
        self.scrambled_tag = SCRAMBLED_TAG;

        let locked = scramble::scramble(&clear, key);
        for (i, &idx) in order.iter().enumerate() {
            self.solution[idx] = locked[i];
        }
        self.refresh_checksums();
        Ok(())
    }

    /// Undo [`Puzzle::scramble`].  The candidate solution is validated
    /// against the stored scrambled checksum before anything is committed;
    /// a wrong key leaves the puzzle unchanged.
    pub fn unscramble(&mut self, key: ScrambleKey) -> Result<(), PuzzleError> {
        if !self.is_scrambled() {
            return Err(ScrambleError::NotScrambled.into());
        }
        let order = self.column_major_letter_indices();
        let locked: Vec<u8> = order.iter().map(|&i| self.solution[i]).collect();
        let clear = scramble::unscramble(&locked, key);

        let mut candidate = self.solution.clone();
        for (i, &idx) in order.iter().enumerate() {
            candidate[idx] = clear[i];
        }
        let computed = chksum(&candidate, 0);
        if computed != self.scrambled_checksum {
            return Err(ScrambleError::KeyMismatch {
                computed,
                expected: self.scrambled_checksum,
            }
            .into());
        }

        self.solution = candidate;
        self.scrambled_checksum = 0;
        self.scrambled_tag = 0;
        self.refresh_checksums();
        Ok(())
    }

    // ── Serialization ────────────────────────────────────────────────────────

    /// Exact structural inverse of [`Puzzle::parse`].  Extra sections are
    /// emitted in canonical order; a synthesized GEXT that was never
    /// written to is omitted.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.start_junk)?;
        writer.write_u16::<LittleEndian>(self.board_checksum)?;
        writer.write_all(&self.file_magic)?;
        writer.write_u16::<LittleEndian>(self.cib_checksum)?;
        writer.write_all(&self.masked_low)?;
        writer.write_all(&self.masked_high)?;
        writer.write_all(&self.version)?;
        writer.write_all(&self.reserved_1c)?;
        writer.write_u16::<LittleEndian>(self.scrambled_checksum)?;
        writer.write_all(&self.reserved_20)?;
        writer.write_u8(self.width)?;
        writer.write_u8(self.height)?;
        writer.write_u16::<LittleEndian>(self.n_clues)?;
        writer.write_u16::<LittleEndian>(self.bitmask)?;
        writer.write_u16::<LittleEndian>(self.scrambled_tag)?;
        writer.write_all(&self.solution)?;
        writer.write_all(&self.state)?;

        for field in [&self.title, &self.author, &self.copyright] {
            writer.write_all(field)?;
            writer.write_u8(0)?;
        }
        for clue in &self.clues {
            writer.write_all(clue)?;
            writer.write_u8(0)?;
        }
        writer.write_all(&self.notes)?;
        writer.write_u8(0)?;

        for extra in self.extras() {
            if let Extra::Gext(g) = &extra {
                if g.is_synthetic() {
                    continue;
                }
            }
            extra.write(&mut writer)?;
        }
        Ok(())
    }

    // ── Authoring ────────────────────────────────────────────────────────────

    /// Start a new, editable puzzle: block-filled grids, empty text, a
    /// blank status section, zeroed checksums.
    pub fn new_blank(width: u8, height: u8) -> Puzzle {
        let cells = usize::from(width) * usize::from(height);
        let geom = Geometry { width, height };
        Puzzle {
            start_junk: Vec::new(),
            file_magic: *MAGIC,
            version: *VERSION,
            reserved_1c: [0; 2],
            reserved_20: [0; 12],
            board_checksum: 0,
            cib_checksum: 0,
            masked_low: [0; 4],
            masked_high: [0; 4],
            scrambled_checksum: 0,
            width,
            height,
            n_clues: 0,
            bitmask: 1,
            scrambled_tag: 0,
            solution: vec![BLOCK; cells],
            state: vec![BLOCK; cells],
            title: Vec::new(),
            author: Vec::new(),
            copyright: Vec::new(),
            clues: Vec::new(),
            notes: Vec::new(),
            grbs: None,
            rtbl: None,
            ltim: None,
            gext: Gext::synthesized(geom),
            rusr: None,
            clue_map: ClueMap::default(),
            design_mode: true,
        }
    }

    fn editable(&self) -> Result<(), PuzzleError> {
        if self.design_mode {
            Ok(())
        } else {
            Err(PuzzleError::NotEditable)
        }
    }

    /// Assign a solution letter while designing.  The state cell is
    /// un-blocked to empty so the grids stay shape-consistent.
    pub fn set_solution_letter_at(
        &mut self,
        row: u8,
        col: u8,
        letter: char,
    ) -> Result<(), PuzzleError> {
        self.editable()?;
        if row >= self.height || col >= self.width {
            return Err(PuzzleError::OutOfBounds {
                row,
                col,
                width: self.width,
                height: self.height,
            });
        }
        let upper = letter.to_ascii_uppercase();
        if !upper.is_ascii_uppercase() {
            return Err(PuzzleError::InvalidLetter(letter));
        }
        let idx = self.rc2idx(row, col);
        self.solution[idx] = upper as u8;
        if self.state[idx] == BLOCK {
            self.state[idx] = EMPTY;
        }
        Ok(())
    }

    /// Replace the clue list; the declared clue count follows.
    pub fn set_clues<S: AsRef<str>>(&mut self, clues: &[S]) -> Result<(), PuzzleError> {
        self.editable()?;
        self.clues = clues
            .iter()
            .map(|c| c.as_ref().as_bytes().to_vec())
            .collect();
        self.n_clues = self.clues.len() as u16;
        Ok(())
    }

    pub fn set_title(&mut self, title: &str) -> Result<(), PuzzleError> {
        self.editable()?;
        self.title = title.as_bytes().to_vec();
        Ok(())
    }

    pub fn set_author(&mut self, author: &str) -> Result<(), PuzzleError> {
        self.editable()?;
        self.author = author.as_bytes().to_vec();
        Ok(())
    }

    pub fn set_copyright(&mut self, copyright: &str) -> Result<(), PuzzleError> {
        self.editable()?;
        self.copyright = copyright.as_bytes().to_vec();
        Ok(())
    }

    pub fn set_notes(&mut self, notes: &str) -> Result<(), PuzzleError> {
        self.editable()?;
        self.notes = notes.as_bytes().to_vec();
        Ok(())
    }

    /// Define a rebus answer at a cell while designing, creating the GRBS
    /// and RTBL sections on first use.  Returns the table key assigned.
    pub fn set_rebus_at(&mut self, row: u8, col: u8, value: &str) -> Result<u8, PuzzleError> {
        self.editable()?;
        if row >= self.height || col >= self.width {
            return Err(PuzzleError::OutOfBounds {
                row,
                col,
                width: self.width,
                height: self.height,
            });
        }
        let geom = Geometry {
            width: self.width,
            height: self.height,
        };
        let rtbl = self.rtbl.get_or_insert_with(Rtbl::new_empty);
        let key = rtbl
            .entries()
            .iter()
            .map(|e| e.key)
            .max()
            .map_or(0, |max| max + 1);
        rtbl.set(key, value.as_bytes());
        self.grbs
            .get_or_insert_with(|| Grbs::new_blank(geom))
            .set_table_key(row, col, key)?;
        Ok(key)
    }

    /// Attach a timer section (or reset the existing one).  Timer state
    /// never participates in the puzzle checksums, so this is allowed on
    /// loaded puzzles too.
    pub fn attach_timer(&mut self, elapsed: u32, stopped: bool) {
        self.ltim = Some(Ltim::new(elapsed, stopped));
    }

    /// Rebuild the clue structure after grid edits.
    pub fn rebuild_clue_map(&mut self) {
        self.clue_map = ClueMap::build(
            &self.solution,
            usize::from(self.width),
            usize::from(self.height),
        );
    }

    /// Leave design mode: rebuild the clue map, recompute every stored
    /// checksum, and lock the authoring setters.
    pub fn finish_design(&mut self) {
        self.rebuild_clue_map();
        self.refresh_checksums();
        self.design_mode = false;
    }

    // ── Presentation ─────────────────────────────────────────────────────────

    /// Grid rows of the solution as strings.
    pub fn solution_rows(&self) -> Vec<String> {
        self.rows_of(&self.solution)
    }

    /// Grid rows of the current fill as strings.
    pub fn state_rows(&self) -> Vec<String> {
        self.rows_of(&self.state)
    }

    fn rows_of(&self, grid: &[u8]) -> Vec<String> {
        grid.chunks(usize::from(self.width).max(1))
            .map(|row| row.iter().map(|&b| b as char).collect())
            .collect()
    }

    /// Serializable digest for structured output.
    pub fn summary(&self) -> Summary {
        let numbered = |refs: &[ClueRef]| {
            refs.iter()
                .map(|r| NumberedClue {
                    number: r.number,
                    clue: self.clue(r.clue_index).unwrap_or_default(),
                })
                .collect()
        };
        Summary {
            title: self.title(),
            author: self.author(),
            copyright: self.copyright(),
            notes: self.notes(),
            version: self.version(),
            width: self.width,
            height: self.height,
            n_clues: self.n_clues,
            scrambled: self.is_scrambled(),
            across: numbered(&self.clue_map.across),
            down: numbered(&self.clue_map.down),
            solution: self.solution_rows(),
            state: self.state_rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn junk_must_leave_room_for_checksum() {
        // Magic token at offset 0 leaves no room for the overall checksum.
        assert!(matches!(
            Puzzle::parse(b"ACROSS&DOWN\0rest"),
            Err(PuzzleError::Format)
        ));
        assert!(matches!(Puzzle::parse(b"junk"), Err(PuzzleError::Format)));
    }

    #[test]
    fn truncated_header_is_named() {
        let mut bytes = vec![0u8, 0];
        bytes.extend_from_slice(b"ACROSS&DOWN\0");
        // Header stops after the magic.
        match Puzzle::parse(&bytes) {
            Err(PuzzleError::Truncated(field)) => assert_eq!(field, "CIB checksum"),
            other => panic!("expected truncation error, got {other:?}"),
        }
    }

    #[test]
    fn rc2idx_and_idx2rc_are_inverse() {
        let p = Puzzle::new_blank(7, 5);
        for idx in 0..(7 * 5) {
            let (r, c) = p.idx2rc(idx);
            assert_eq!(p.rc2idx(r, c), idx);
        }
        assert_eq!(p.rc2idx(0, 0), 0);
        assert_eq!(p.rc2idx(4, 6), 7 * 5 - 1);
    }

    #[test]
    fn new_blank_is_editable_and_block_filled() {
        let mut p = Puzzle::new_blank(4, 4);
        assert!(p.is_design_mode());
        assert!(!p.is_letter(0, 0));
        p.set_solution_letter_at(0, 0, 'a').unwrap();
        assert!(p.is_letter(0, 0));
        assert_eq!(p.solution_letter_at(0, 0).unwrap(), 'A');
        assert_eq!(p.letter_at(0, 0).unwrap(), '-');
    }

    #[test]
    fn setters_locked_outside_design_mode() {
        let mut p = Puzzle::new_blank(3, 3);
        p.set_solution_letter_at(0, 0, 'A').unwrap();
        p.set_solution_letter_at(0, 1, 'B').unwrap();
        p.finish_design();
        assert!(matches!(p.set_title("late"), Err(PuzzleError::NotEditable)));
        assert!(matches!(
            p.set_solution_letter_at(1, 1, 'Z'),
            Err(PuzzleError::NotEditable)
        ));
    }

    #[test]
    fn invalid_letter_rejected() {
        let mut p = Puzzle::new_blank(3, 3);
        p.set_solution_letter_at(1, 1, 'Q').unwrap();
        assert!(matches!(
            p.set_letter_at(1, 1, '7'),
            Err(PuzzleError::InvalidLetter('7'))
        ));
        assert!(matches!(
            p.set_letter_at(2, 2, 'A'),
            Err(PuzzleError::OutOfBounds { .. })
        ));
    }
}
