pub mod checksum;
pub mod clues;
pub mod extras;
pub mod puzzle;
pub mod scramble;

pub use checksum::{chksum, ChecksumKind, ChecksumValue};
pub use clues::{ClueMap, ClueRef, Direction};
pub use extras::{Extra, Geometry, SectionTag};
pub use puzzle::{Puzzle, PuzzleError, VerifyWarning};
pub use scramble::{ScrambleError, ScrambleKey};
