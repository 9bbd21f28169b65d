//! Solution obfuscation cipher and its inverse.
//!
//! A locked puzzle's solution grid is obscured with a 4-digit key.  The
//! cipher operates on the solution linearized column-major with blocks
//! removed.  For each key digit, left to right:
//!
//! 1. shift every character forward by the key digit at `position mod 4`,
//!    wrapping past `Z`;
//! 2. rotate the text left by the digit;
//! 3. split at the midpoint and interleave, second half first.
//!
//! The inverse applies the digits right to left, undoing each step in
//! reverse order: de-interleave, rotate right, shift back.  Callers are
//! expected to validate an unscramble against the stored scrambled
//! checksum — the key itself is never stored in the file.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrambleError {
    #[error("scramble key must be four decimal digits, got {0:?}")]
    InvalidKey(String),
    #[error("unscrambled solution checksum {computed:#06x} does not match stored {expected:#06x} — wrong key?")]
    KeyMismatch { computed: u16, expected: u16 },
    #[error("puzzle is already scrambled")]
    AlreadyScrambled,
    #[error("puzzle is not scrambled")]
    NotScrambled,
}

/// A 4-digit scramble key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrambleKey {
    digits: [u8; 4],
}

impl ScrambleKey {
    /// Build a key from a numeric form, e.g. `4919` → digits 4,9,1,9.
    pub fn new(key: u16) -> Result<ScrambleKey, ScrambleError> {
        if key > 9999 {
            return Err(ScrambleError::InvalidKey(key.to_string()));
        }
        Ok(ScrambleKey {
            digits: [
                (key / 1000 % 10) as u8,
                (key / 100 % 10) as u8,
                (key / 10 % 10) as u8,
                (key % 10) as u8,
            ],
        })
    }

    pub fn digits(&self) -> [u8; 4] {
        self.digits
    }

    fn digit(&self, i: usize) -> u8 {
        self.digits[i % 4]
    }
}

impl FromStr for ScrambleKey {
    type Err = ScrambleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(|b| b.is_ascii_digit()) {
            return Err(ScrambleError::InvalidKey(s.to_owned()));
        }
        Ok(ScrambleKey {
            digits: [
                bytes[0] - b'0',
                bytes[1] - b'0',
                bytes[2] - b'0',
                bytes[3] - b'0',
            ],
        })
    }
}

impl fmt::Display for ScrambleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            self.digits[0], self.digits[1], self.digits[2], self.digits[3]
        )
    }
}

/// Apply the forward cipher to linearized uppercase text.
pub fn scramble(text: &[u8], key: ScrambleKey) -> Vec<u8> {
    let mut cur = text.to_vec();
    for k in key.digits() {
        for (i, b) in cur.iter_mut().enumerate() {
            let shifted = *b + key.digit(i);
            *b = if shifted > b'Z' { shifted - 26 } else { shifted };
        }
        let len = cur.len();
        if len > 0 {
            cur.rotate_left(usize::from(k) % len);
        }
        cur = interleave(&cur);
    }
    cur
}

/// Undo [`scramble`] with the same key.
pub fn unscramble(text: &[u8], key: ScrambleKey) -> Vec<u8> {
    let mut cur = text.to_vec();
    for k in key.digits().into_iter().rev() {
        cur = deinterleave(&cur);
        let len = cur.len();
        if len > 0 {
            cur.rotate_right(usize::from(k) % len);
        }
        for (i, b) in cur.iter_mut().enumerate() {
            let shifted = i16::from(*b) - i16::from(key.digit(i));
            *b = if shifted < i16::from(b'A') {
                (shifted + 26) as u8
            } else {
                shifted as u8
            };
        }
    }
    cur
}

/// Merge the two halves character by character, second half leading.  With
/// an odd length the second half is one longer and supplies the tail.
fn interleave(s: &[u8]) -> Vec<u8> {
    let mid = s.len() / 2;
    let (first, second) = s.split_at(mid);
    let mut out = Vec::with_capacity(s.len());
    for (i, &b) in second.iter().enumerate() {
        out.push(b);
        if i < first.len() {
            out.push(first[i]);
        }
    }
    out
}

/// Split an interleaved text back into `first ++ second`: even positions
/// came from the second half, odd positions from the first.
fn deinterleave(s: &[u8]) -> Vec<u8> {
    let mid = s.len() / 2;
    let mut first = Vec::with_capacity(mid);
    let mut second = Vec::with_capacity(s.len() - mid);
    for (i, &b) in s.iter().enumerate() {
        if i % 2 == 0 {
            second.push(b);
        } else {
            first.push(b);
        }
    }
    first.extend_from_slice(&second);
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn key_from_number_keeps_leading_zeros() {
        let k = ScrambleKey::new(42).unwrap();
        assert_eq!(k.digits(), [0, 0, 4, 2]);
        assert_eq!(k.to_string(), "0042");
    }

    #[test]
    fn key_parsing() {
        assert_eq!(
            "4919".parse::<ScrambleKey>().unwrap().digits(),
            [4, 9, 1, 9]
        );
        assert!("49".parse::<ScrambleKey>().is_err());
        assert!("4a19".parse::<ScrambleKey>().is_err());
        assert!(ScrambleKey::new(10_000).is_err());
    }

    #[test]
    fn interleave_inverts_even_and_odd() {
        assert_eq!(deinterleave(&interleave(b"ABCDEF")), b"ABCDEF".to_vec());
        assert_eq!(deinterleave(&interleave(b"ABCDEFG")), b"ABCDEFG".to_vec());
        // Second half leads: ABCD -> C A D B.
        assert_eq!(interleave(b"ABCD"), b"CADB".to_vec());
        assert_eq!(interleave(b"ABCDE"), b"CADBE".to_vec());
    }

    #[test]
    fn scramble_changes_text_and_inverts() {
        let key = "2468".parse::<ScrambleKey>().unwrap();
        let clear = b"STUMPSTUREENPESETA";
        let locked = scramble(clear, key);
        assert_ne!(locked, clear.to_vec());
        assert_eq!(locked.len(), clear.len());
        assert!(locked.iter().all(u8::is_ascii_uppercase));
        assert_eq!(unscramble(&locked, key), clear.to_vec());
    }

    #[test]
    fn zero_digits_still_interleave() {
        let key = "0000".parse::<ScrambleKey>().unwrap();
        let clear = b"ABCDEFGH";
        let locked = scramble(clear, key);
        assert_ne!(locked, clear.to_vec());
        assert_eq!(unscramble(&locked, key), clear.to_vec());
    }

    proptest! {
        #[test]
        fn unscramble_inverts_scramble(
            text in proptest::collection::vec(b'A'..=b'Z', 0..200),
            key in 0u16..=9999,
        ) {
            let key = ScrambleKey::new(key).unwrap();
            let locked = scramble(&text, key);
            prop_assert_eq!(unscramble(&locked, key), text);
        }

        #[test]
        fn scramble_preserves_alphabet(
            text in proptest::collection::vec(b'A'..=b'Z', 1..200),
            key in 0u16..=9999,
        ) {
            let key = ScrambleKey::new(key).unwrap();
            let locked = scramble(&text, key);
            prop_assert!(locked.iter().all(u8::is_ascii_uppercase));
            prop_assert_eq!(locked.len(), text.len());
        }
    }
}
