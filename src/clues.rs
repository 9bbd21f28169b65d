//! Clue numbering — derives across/down word structure from the grid shape.
//!
//! A non-block cell starts an across answer when its left neighbor is a
//! block or the grid edge and its right neighbor is a letter cell; down
//! answers are the transposed rule.  Cells that start neither inherit the
//! answer index of the neighbor they continue.  A single shared counter
//! hands out the printed grid numbers: the first time either direction
//! starts at a cell the cell gets the next number, and a cell that starts
//! both directions gets one number serving both.
//!
//! The map is rebuilt in full whenever the block layout changes — on load
//! and after authoring edits — and is never patched incrementally.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Word orientation in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Across,
    Down,
}

impl Direction {
    pub fn name(self) -> &'static str {
        match self {
            Direction::Across => "across",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid direction {0:?}, expected \"across\" or \"down\"")]
pub struct DirectionParseError(pub String);

impl FromStr for Direction {
    type Err = DirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "across" => Ok(Direction::Across),
            "down" => Ok(Direction::Down),
            _ => Err(DirectionParseError(s.to_owned())),
        }
    }
}

/// One entry in the ordered across or down list: which clue string it uses
/// and the printed grid number it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClueRef {
    /// Index into the puzzle's flat clue list.  Clues are stored interleaved
    /// in grid order (across before down at a cell that starts both).
    pub clue_index: usize,
    /// Printed grid number, shared between directions at a cell that starts
    /// both.
    pub number: u32,
}

/// Per-cell word membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellClue {
    /// Index into [`ClueMap::across`] of the answer this cell belongs to.
    pub across: Option<usize>,
    /// Index into [`ClueMap::down`] of the answer this cell belongs to.
    pub down: Option<usize>,
    pub starts_across: bool,
    pub starts_down: bool,
}

impl CellClue {
    pub fn index(&self, dir: Direction) -> Option<usize> {
        match dir {
            Direction::Across => self.across,
            Direction::Down => self.down,
        }
    }
}

/// The full clue structure for one grid shape.
#[derive(Debug, Clone, Default)]
pub struct ClueMap {
    cells: Vec<Option<CellClue>>,
    width: usize,
    pub across: Vec<ClueRef>,
    pub down: Vec<ClueRef>,
}

impl ClueMap {
    /// Derive the clue structure from a row-major solution grid where `b'.'`
    /// marks a block.
    pub fn build(solution: &[u8], width: usize, height: usize) -> ClueMap {
        debug_assert_eq!(solution.len(), width * height);

        let is_block = |r: usize, c: usize| solution[r * width + c] == b'.';

        let mut cells: Vec<Option<CellClue>> = vec![None; width * height];
        let mut across = Vec::new();
        let mut down = Vec::new();
        let mut clue_index = 0usize;
        let mut number = 0u32;

        for r in 0..height {
            for c in 0..width {
                if is_block(r, c) {
                    continue;
                }
                let mut cell = CellClue::default();

                if c > 0 && !is_block(r, c - 1) {
                    cell.across = cells[r * width + c - 1].and_then(|left| left.across);
                } else if c + 1 < width && !is_block(r, c + 1) {
                    cell.across = Some(across.len());
                    cell.starts_across = true;
                }

                if r > 0 && !is_block(r - 1, c) {
                    cell.down = cells[(r - 1) * width + c].and_then(|up| up.down);
                } else if r + 1 < height && !is_block(r + 1, c) {
                    cell.down = Some(down.len());
                    cell.starts_down = true;
                }

                if cell.starts_across {
                    number += 1;
                    across.push(ClueRef { clue_index, number });
                    clue_index += 1;
                }
                if cell.starts_down {
                    if !cell.starts_across {
                        number += 1;
                    }
                    down.push(ClueRef { clue_index, number });
                    clue_index += 1;
                }

                cells[r * width + c] = Some(cell);
            }
        }

        ClueMap { cells, width, across, down }
    }

    /// Membership record for a cell index, `None` for block cells.
    pub fn cell(&self, idx: usize) -> Option<&CellClue> {
        self.cells.get(idx).and_then(|c| c.as_ref())
    }

    /// Membership record by coordinates.
    pub fn at(&self, r: usize, c: usize) -> Option<&CellClue> {
        self.cell(r * self.width + c)
    }

    /// Total answers derived from the grid; must equal the declared clue
    /// count on a well-formed puzzle.
    pub fn len(&self) -> usize {
        self.across.len() + self.down.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell indices, in raster order, of the word containing `idx` in the
    /// given direction.  A letter cell with no membership in that direction
    /// is its own one-cell word; block cells yield nothing.
    pub fn word_cells(&self, idx: usize, dir: Direction) -> Vec<usize> {
        let Some(cell) = self.cell(idx) else {
            return Vec::new();
        };
        match cell.index(dir) {
            Some(target) => (0..self.cells.len())
                .filter(|&i| {
                    self.cell(i).and_then(|c| c.index(dir)) == Some(target)
                })
                .collect(),
            None => vec![idx],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 4x4 with two blocks:
    //   A B C .
    //   D . E F
    //   G H I J
    //   . K L M
    const GRID: &[u8] = b"ABC.D.EFGHIJ.KLM";

    #[test]
    fn numbering_follows_grid_order() {
        let map = ClueMap::build(GRID, 4, 4);
        // Start events in raster order: (0,0) across+down share 1,
        // (0,2) down 2, (1,2) across 3, (1,3) down 4, (2,0) across 5,
        // (2,1) down 6, (3,1) across 7.
        let across_numbers: Vec<u32> = map.across.iter().map(|c| c.number).collect();
        assert_eq!(across_numbers, vec![1, 3, 5, 7]);
        let down_numbers: Vec<u32> = map.down.iter().map(|c| c.number).collect();
        assert_eq!(down_numbers, vec![1, 2, 4, 6]);
        // Clue-list indices interleave in grid order across the two lists.
        let across_indices: Vec<usize> = map.across.iter().map(|c| c.clue_index).collect();
        let down_indices: Vec<usize> = map.down.iter().map(|c| c.clue_index).collect();
        assert_eq!(across_indices, vec![0, 3, 5, 7]);
        assert_eq!(down_indices, vec![1, 2, 4, 6]);
    }

    #[test]
    fn cell_without_down_membership_is_own_word() {
        // (0,1) sits above a block with the edge overhead: across only.
        let map = ClueMap::build(GRID, 4, 4);
        let cell = map.at(0, 1).unwrap();
        assert!(cell.down.is_none());
        assert_eq!(map.word_cells(1, Direction::Down), vec![1]);
    }

    #[test]
    fn inherited_membership() {
        let map = ClueMap::build(GRID, 4, 4);
        let start = map.at(2, 0).unwrap();
        let cont = map.at(2, 3).unwrap();
        assert!(start.starts_across);
        assert!(!cont.starts_across);
        assert_eq!(start.across, cont.across);
    }

    #[test]
    fn block_cells_have_no_entry() {
        let map = ClueMap::build(GRID, 4, 4);
        assert!(map.at(0, 3).is_none());
        assert!(map.at(1, 1).is_none());
        assert!(map.at(3, 0).is_none());
        assert!(map.at(0, 0).is_some());
    }

    #[test]
    fn word_cells_raster_order() {
        let map = ClueMap::build(GRID, 4, 4);
        // Across word through (2,1) is the full third row.
        assert_eq!(map.word_cells(2 * 4 + 1, Direction::Across), vec![8, 9, 10, 11]);
        // Down word through (2,1): H (2,1) then K (3,1).
        assert_eq!(map.word_cells(2 * 4 + 1, Direction::Down), vec![9, 13]);
    }

    #[test]
    fn direction_parsing() {
        assert_eq!("across".parse::<Direction>().unwrap(), Direction::Across);
        assert_eq!("Down".parse::<Direction>().unwrap(), Direction::Down);
        assert!("diagonal".parse::<Direction>().is_err());
    }
}
