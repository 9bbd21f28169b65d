use puzrs::checksum::chksum;
use puzrs::extras::{CIRCLED, CURR_INCORRECT, PREV_INCORRECT, REVEALED};
use puzrs::puzzle::{Puzzle, PuzzleError, VerifyWarning};
use puzrs::scramble::ScrambleError;
use puzrs::{ChecksumKind, Direction, ScrambleKey};
use std::fs::File;
use tempfile::NamedTempFile;

// 6x3 fixture, fully open (no blocks):
//
//   S T U M P S
//   T U R E E N
//   P E S E T A
//
// Across answers start at (0,0)=1, (1,0)=7, (2,0)=8; every top-row cell
// starts a down answer (1-6).  9 clues total.
const ROWS: [&str; 3] = ["STUMPS", "TUREEN", "PESETA"];

const CLUES: [&str; 9] = [
    "Baffles",            // 1 Across
    "Traffic light part", // 1 Down
    "Subway token",       // 2 Down
    "Card game declare",  // 3 Down
    "Spanish aunt",       // 4 Down
    "Sizzling sound",     // 5 Down
    "Close by",           // 6 Down
    "Soup vessel",        // 7 Across
    "Old Spanish coin",   // 8 Across
];

fn fixture() -> Puzzle {
    let mut p = Puzzle::new_blank(6, 3);
    for (r, row) in ROWS.iter().enumerate() {
        for (c, ch) in row.chars().enumerate() {
            p.set_solution_letter_at(r as u8, c as u8, ch).unwrap();
        }
    }
    p.set_title("Fixture Crossing").unwrap();
    p.set_author("Integration Harness").unwrap();
    p.set_copyright("(c) 2024").unwrap();
    p.set_clues(&CLUES).unwrap();
    // Solved state: every fill letter matches the solution.
    for (r, row) in ROWS.iter().enumerate() {
        for (c, ch) in row.chars().enumerate() {
            p.set_letter_at(r as u8, c as u8, ch).unwrap();
        }
    }
    p.finish_design();
    p
}

fn fixture_bytes() -> Vec<u8> {
    let mut out = Vec::new();
    fixture().write_to(&mut out).unwrap();
    out
}

/// tag + length + checksum + payload framing for hand-built sections.
fn section(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(tag);
    out.extend_from_slice(&(body.len() as u16).to_le_bytes());
    out.extend_from_slice(&chksum(body, 0).to_le_bytes());
    out.extend_from_slice(body);
    out.push(0);
    out
}

#[test]
fn test_load_and_verify() {
    let bytes = fixture_bytes();
    let (puzzle, warnings) = Puzzle::load(&bytes).unwrap();
    assert_eq!(puzzle.title(), "Fixture Crossing");
    assert_eq!(puzzle.author(), "Integration Harness");
    assert_eq!(puzzle.version(), "1.3");
    assert_eq!(puzzle.n_clues(), 9);
    assert!(!puzzle.is_scrambled());
    // The fixture carries no GEXT section on disk.
    assert_eq!(warnings, vec![VerifyWarning::MissingGext]);
}

#[test]
fn test_load_invalid() {
    assert!(matches!(
        Puzzle::load(b"not a puzzle at all"),
        Err(PuzzleError::Format)
    ));
}

#[test]
fn test_roundtrip_is_byte_exact() {
    let bytes = fixture_bytes();
    let (puzzle, _) = Puzzle::load(&bytes).unwrap();
    let mut out = Vec::new();
    puzzle.write_to(&mut out).unwrap();
    assert_eq!(out, bytes);
}

#[test]
fn test_leading_junk_preserved() {
    let mut bytes = b"<html>junk prefix</html>".to_vec();
    bytes.extend_from_slice(&fixture_bytes());
    let (puzzle, _) = Puzzle::load(&bytes).unwrap();
    assert_eq!(puzzle.title(), "Fixture Crossing");
    let mut out = Vec::new();
    puzzle.write_to(&mut out).unwrap();
    assert_eq!(out, bytes);
}

#[test]
fn test_file_roundtrip() {
    let temp = NamedTempFile::new().unwrap();
    std::fs::write(temp.path(), fixture_bytes()).unwrap();
    let (puzzle, _) = Puzzle::load_from(File::open(temp.path()).unwrap()).unwrap();
    assert_eq!(puzzle.solution_letter_at(0, 0).unwrap(), 'S');
}

#[test]
fn test_letters_and_words() {
    let (puzzle, _) = Puzzle::load(&fixture_bytes()).unwrap();
    assert_eq!(puzzle.solution_letter_at(0, 0).unwrap(), 'S');
    assert_eq!(puzzle.letter_at(0, 0).unwrap(), 'S');
    assert_eq!(puzzle.word_at(0, 0, Direction::Across).unwrap(), "STUMPS");
    assert_eq!(puzzle.word_at(0, 0, Direction::Down).unwrap(), "STP");
    assert_eq!(
        puzzle.solution_word_at(0, 0, Direction::Across).unwrap(),
        "STUMPS"
    );
    assert_eq!(puzzle.solution_word_at(0, 0, Direction::Down).unwrap(), "STP");
    assert_eq!(puzzle.word_at(1, 3, Direction::Across).unwrap(), "TUREEN");
    assert_eq!(puzzle.word_at(1, 3, Direction::Down).unwrap(), "MEE");
}

#[test]
fn test_clue_structure() {
    let (puzzle, _) = Puzzle::load(&fixture_bytes()).unwrap();
    let across = puzzle.across_clues();
    let down = puzzle.down_clues();
    assert_eq!(across.len() + down.len(), usize::from(puzzle.n_clues()));
    let across_numbers: Vec<u32> = across.iter().map(|c| c.number).collect();
    assert_eq!(across_numbers, vec![1, 7, 8]);
    let down_numbers: Vec<u32> = down.iter().map(|c| c.number).collect();
    assert_eq!(down_numbers, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(puzzle.clue(across[0].clue_index).unwrap(), "Baffles");
    assert_eq!(puzzle.clue(across[1].clue_index).unwrap(), "Soup vessel");
    assert_eq!(puzzle.clue(down[0].clue_index).unwrap(), "Traffic light part");

    // Every cell of this open grid is a letter with a clue-map entry.
    for r in 0..puzzle.height() {
        for c in 0..puzzle.width() {
            assert!(puzzle
                .clue_map()
                .at(usize::from(r), usize::from(c))
                .is_some());
        }
    }
}

#[test]
fn test_blocked_grid_clue_map() {
    // A B .
    // . C D
    let mut p = Puzzle::new_blank(3, 2);
    p.set_solution_letter_at(0, 0, 'A').unwrap();
    p.set_solution_letter_at(0, 1, 'B').unwrap();
    p.set_solution_letter_at(1, 1, 'C').unwrap();
    p.set_solution_letter_at(1, 2, 'D').unwrap();
    p.set_clues(&["AB clue", "BC clue", "CD clue"]).unwrap();
    p.finish_design();

    let across_numbers: Vec<u32> = p.across_clues().iter().map(|c| c.number).collect();
    let down_numbers: Vec<u32> = p.down_clues().iter().map(|c| c.number).collect();
    assert_eq!(across_numbers, vec![1, 3]);
    assert_eq!(down_numbers, vec![2]);

    assert!(p.clue_map().at(0, 2).is_none());
    assert!(p.clue_map().at(1, 0).is_none());

    // (0,0) has no down answer: its down "word" is itself.
    assert_eq!(p.solution_word_at(0, 0, Direction::Down).unwrap(), "A");
    assert_eq!(p.solution_word_at(0, 1, Direction::Down).unwrap(), "BC");

    // Block cells reject letter queries.
    assert!(matches!(
        p.letter_at(1, 0),
        Err(PuzzleError::OutOfBounds { .. })
    ));
}

#[test]
fn test_corrupt_checksums_name_their_kind() {
    // Stored positions with no leading junk: board at 0, CIB at 14,
    // masked low at 16, masked high at 20.
    let cases = [
        (0usize, ChecksumKind::Board),
        (14, ChecksumKind::Cib),
        (16, ChecksumKind::MaskedLow),
        (20, ChecksumKind::MaskedHigh),
    ];
    for (offset, expected) in cases {
        let mut bytes = fixture_bytes();
        bytes[offset] ^= 0xFF;
        match Puzzle::load(&bytes) {
            Err(PuzzleError::Checksum { kind, .. }) => assert_eq!(kind, expected),
            other => panic!("expected {expected} checksum failure, got {other:?}"),
        }
    }
}

#[test]
fn test_clue_count_mismatch() {
    let mut bytes = fixture_bytes();
    // Bump the declared clue count; parsing then consumes one string too
    // many and the trailing layout no longer holds together.
    bytes[46] = 10;
    assert!(Puzzle::load(&bytes).is_err());
}

#[test]
fn test_check_and_flag_progression() {
    let (mut p, _) = Puzzle::load(&fixture_bytes()).unwrap();

    // Wrong letter: check flags it currently-incorrect.
    p.set_letter_at(0, 0, 'A').unwrap();
    assert_eq!(p.check_letter(0, 0).unwrap(), Some(false));
    assert!(p.gext().has_mask(0, 0, CURR_INCORRECT).unwrap());

    // A different wrong letter demotes the flag.
    p.set_letter_at(0, 0, 'B').unwrap();
    assert!(p.gext().has_mask(0, 0, PREV_INCORRECT).unwrap());
    assert!(!p.gext().has_mask(0, 0, CURR_INCORRECT).unwrap());

    // Revealing restores the letter and clears the incorrect flags.
    assert!(p.reveal_letter(0, 0).unwrap());
    assert_eq!(p.letter_at(0, 0).unwrap(), 'S');
    assert!(p.gext().has_mask(0, 0, REVEALED).unwrap());
    assert!(!p.gext().has_mask(0, 0, PREV_INCORRECT).unwrap());

    assert!(p.check_all().unwrap());
}

#[test]
fn test_check_word_flags_every_mismatch() {
    let (mut p, _) = Puzzle::load(&fixture_bytes()).unwrap();
    p.set_letter_at(0, 1, 'X').unwrap();
    p.set_letter_at(0, 4, 'Y').unwrap();
    assert_eq!(p.check_word(0, 0, Direction::Across).unwrap(), Some(false));
    assert!(p.gext().has_mask(0, 1, CURR_INCORRECT).unwrap());
    assert!(p.gext().has_mask(0, 4, CURR_INCORRECT).unwrap());
    assert!(!p.gext().has_mask(0, 0, CURR_INCORRECT).unwrap());
}

#[test]
fn test_mutated_puzzle_reloads_cleanly() {
    let (mut p, _) = Puzzle::load(&fixture_bytes()).unwrap();
    p.set_letter_at(2, 5, 'B').unwrap();
    p.check_letter(2, 5).unwrap();

    let mut out = Vec::new();
    p.write_to(&mut out).unwrap();
    // The GEXT section is real now and rides along with fresh checksums.
    let (reloaded, warnings) = Puzzle::load(&out).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(reloaded.letter_at(2, 5).unwrap(), 'B');
    assert!(reloaded.gext().has_mask(2, 5, CURR_INCORRECT).unwrap());
}

#[test]
fn test_reveal_word_and_all() {
    let (mut p, _) = Puzzle::load(&fixture_bytes()).unwrap();
    p.set_letter_at(1, 0, 'X').unwrap();
    p.set_letter_at(1, 5, 'X').unwrap();
    assert!(p.reveal_word(1, 0, Direction::Across).unwrap());
    assert_eq!(p.word_at(1, 0, Direction::Across).unwrap(), "TUREEN");
    assert!(p.gext().has_mask(1, 0, REVEALED).unwrap());
    // (1,1) was already correct and keeps a clean status byte.
    assert_eq!(p.gext().mask_at(1, 1).unwrap(), 0);

    p.set_letter_at(2, 0, 'X').unwrap();
    assert!(p.reveal_all().unwrap());
    assert!(p.check_all().unwrap());
}

#[test]
fn test_rebus_sections() {
    let mut bytes = fixture_bytes();
    // Cell (0,0) carries rebus table key 0; one extra unused entry.
    let mut board = vec![0u8; 18];
    board[0] = 1;
    bytes.extend_from_slice(&section(b"GRBS", &board));
    bytes.extend_from_slice(&section(b"RTBL", b"00:STOP;05:STAR;"));

    let (puzzle, warnings) = Puzzle::load(&bytes).unwrap();
    assert_eq!(puzzle.rebus_number_at(0, 0), 1);
    assert_eq!(puzzle.rebus_at(0, 0).unwrap(), "STOP");
    assert_eq!(puzzle.rebus_number_at(1, 1), 0);
    assert_eq!(puzzle.rebus_at(1, 1), None);
    // Out-of-grid cells answer 0, never an error.
    assert_eq!(puzzle.rebus_number_at(9, 9), 0);
    assert!(warnings.contains(&VerifyWarning::UnusedRebusEntries(vec![5])));

    // Sections already in canonical order round-trip byte-exact.
    let mut out = Vec::new();
    puzzle.write_to(&mut out).unwrap();
    assert_eq!(out, bytes);
}

#[test]
fn test_dangling_rebus_reference_is_fatal() {
    let mut bytes = fixture_bytes();
    let mut board = vec![0u8; 18];
    board[7] = 4; // table key 3, never defined
    bytes.extend_from_slice(&section(b"GRBS", &board));
    bytes.extend_from_slice(&section(b"RTBL", b"00:STOP;"));
    match Puzzle::load(&bytes) {
        Err(PuzzleError::RebusReference { key: 3, row: 1, col: 1 }) => {}
        other => panic!("expected dangling rebus error, got {other:?}"),
    }
}

#[test]
fn test_grbs_without_rtbl_warns() {
    let mut bytes = fixture_bytes();
    bytes.extend_from_slice(&section(b"GRBS", &[0u8; 18]));
    let (_, warnings) = Puzzle::load(&bytes).unwrap();
    assert!(warnings.contains(&VerifyWarning::GrbsWithoutRtbl));
}

#[test]
fn test_unknown_section_rejected() {
    let mut bytes = fixture_bytes();
    bytes.extend_from_slice(&section(b"XYZZ", b"payload"));
    assert!(matches!(
        Puzzle::load(&bytes),
        Err(PuzzleError::UnknownSection(_))
    ));
}

#[test]
fn test_corrupt_section_checksum_rejected() {
    let mut bytes = fixture_bytes();
    let mut ltim = section(b"LTIM", b"60,0");
    ltim[6] ^= 0xFF; // declared section checksum
    bytes.extend_from_slice(&ltim);
    assert!(Puzzle::load(&bytes).is_err());
}

#[test]
fn test_timer_section() {
    let mut bytes = fixture_bytes();
    bytes.extend_from_slice(&section(b"LTIM", b"754,1"));
    let (mut puzzle, _) = Puzzle::load(&bytes).unwrap();
    {
        let timer = puzzle.timer().unwrap();
        assert_eq!(timer.elapsed(), 754);
        assert!(timer.is_stopped());
    }
    // Round-trips before mutation.
    let mut out = Vec::new();
    puzzle.write_to(&mut out).unwrap();
    assert_eq!(out, bytes);

    // Mutators keep the section verifiable through a save/load cycle.
    let timer = puzzle.timer_mut().unwrap();
    timer.start();
    timer.set_elapsed(800);
    let mut out = Vec::new();
    puzzle.write_to(&mut out).unwrap();
    let (reloaded, _) = Puzzle::load(&out).unwrap();
    let timer = reloaded.timer().unwrap();
    assert_eq!(timer.elapsed(), 800);
    assert!(!timer.is_stopped());
}

#[test]
fn test_user_rebus_passthrough() {
    let mut bytes = fixture_bytes();
    let mut rusr = vec![0u8; 18];
    rusr[3] = b'X';
    bytes.extend_from_slice(&section(b"RUSR", &rusr));
    let (puzzle, _) = Puzzle::load(&bytes).unwrap();
    assert_eq!(puzzle.rusr().unwrap().raw(), rusr.as_slice());
    let mut out = Vec::new();
    puzzle.write_to(&mut out).unwrap();
    assert_eq!(out, bytes);
}

#[test]
fn test_circled_cells_survive_checking() {
    let (mut p, _) = Puzzle::load(&fixture_bytes()).unwrap();
    p.gext_mut().set_mask(0, 0, CIRCLED).unwrap();
    p.set_letter_at(0, 0, 'Z').unwrap();
    p.check_letter(0, 0).unwrap();
    assert!(p.gext().has_mask(0, 0, CIRCLED).unwrap());
    assert!(p.gext().has_mask(0, 0, CURR_INCORRECT).unwrap());
}

#[test]
fn test_scramble_lifecycle() {
    let key: ScrambleKey = "4919".parse().unwrap();
    let mut p = fixture();
    p.scramble(key).unwrap();
    assert!(p.is_scrambled());
    assert_ne!(p.solution_word_at(0, 0, Direction::Across).unwrap(), "STUMPS");

    // Scrambled puzzles serialize and reload as verified puzzles.
    let mut bytes = Vec::new();
    p.write_to(&mut bytes).unwrap();
    let (mut locked, _) = Puzzle::load(&bytes).unwrap();
    assert!(locked.is_scrambled());

    // Per-letter checks are unknown; reveals are disabled.
    assert_eq!(locked.check_letter(0, 0).unwrap(), None);
    assert_eq!(locked.check_word(0, 0, Direction::Across).unwrap(), None);
    assert!(!locked.reveal_letter(0, 0).unwrap());
    assert!(!locked.reveal_all().unwrap());

    // The state grid still holds the true fill, so the whole-grid check
    // passes via the scrambled checksum.
    assert!(locked.check_all().unwrap());
    locked.set_letter_at(0, 0, 'Z').unwrap();
    assert!(!locked.check_all().unwrap());
}

#[test]
fn test_unscramble_restores_solution() {
    let key: ScrambleKey = "8642".parse().unwrap();
    let mut p = fixture();
    p.scramble(key).unwrap();
    p.unscramble(key).unwrap();
    assert!(!p.is_scrambled());
    assert_eq!(p.solution_word_at(0, 0, Direction::Across).unwrap(), "STUMPS");
    assert_eq!(p.solution_word_at(0, 0, Direction::Down).unwrap(), "STP");
    assert!(p.verify().is_ok());
}

#[test]
fn test_unscramble_with_wrong_key_fails_and_preserves() {
    let mut p = fixture();
    p.scramble("4919".parse().unwrap()).unwrap();
    let locked_word = p.solution_word_at(0, 0, Direction::Across).unwrap();
    match p.unscramble("1234".parse().unwrap()) {
        Err(PuzzleError::Scramble(ScrambleError::KeyMismatch { .. })) => {}
        other => panic!("expected key mismatch, got {other:?}"),
    }
    assert!(p.is_scrambled());
    assert_eq!(
        p.solution_word_at(0, 0, Direction::Across).unwrap(),
        locked_word
    );
}

#[test]
fn test_scramble_twice_rejected() {
    let mut p = fixture();
    p.scramble("1111".parse().unwrap()).unwrap();
    assert!(matches!(
        p.scramble("2222".parse().unwrap()),
        Err(PuzzleError::Scramble(ScrambleError::AlreadyScrambled))
    ));
    p.unscramble("1111".parse().unwrap()).unwrap();
    assert!(matches!(
        p.unscramble("1111".parse().unwrap()),
        Err(PuzzleError::Scramble(ScrambleError::NotScrambled))
    ));
}

#[test]
fn test_authored_rebus_roundtrip() {
    let mut p = Puzzle::new_blank(6, 3);
    for (r, row) in ROWS.iter().enumerate() {
        for (c, ch) in row.chars().enumerate() {
            p.set_solution_letter_at(r as u8, c as u8, ch).unwrap();
        }
    }
    p.set_clues(&CLUES).unwrap();
    let first = p.set_rebus_at(0, 3, "MULTI").unwrap();
    let second = p.set_rebus_at(2, 2, "SEVEN").unwrap();
    assert_eq!(first, 0);
    assert_eq!(second, 1);
    p.finish_design();

    let mut bytes = Vec::new();
    p.write_to(&mut bytes).unwrap();
    let (reloaded, warnings) = Puzzle::load(&bytes).unwrap();
    // Both table entries are referenced, so only the GEXT note remains.
    assert_eq!(warnings, vec![VerifyWarning::MissingGext]);
    assert_eq!(reloaded.rebus_at(0, 3).unwrap(), "MULTI");
    assert_eq!(reloaded.rebus_at(2, 2).unwrap(), "SEVEN");
    assert_eq!(reloaded.rebus_at(0, 0), None);
}

#[test]
fn test_attach_timer() {
    let (mut p, _) = Puzzle::load(&fixture_bytes()).unwrap();
    assert!(p.timer().is_none());
    p.attach_timer(0, false);
    let mut bytes = Vec::new();
    p.write_to(&mut bytes).unwrap();
    let (reloaded, _) = Puzzle::load(&bytes).unwrap();
    assert_eq!(reloaded.timer().unwrap().elapsed(), 0);
    assert!(!reloaded.timer().unwrap().is_stopped());
}

#[test]
fn test_summary_numbers_clues() {
    let (puzzle, _) = Puzzle::load(&fixture_bytes()).unwrap();
    let summary = puzzle.summary();
    assert_eq!(summary.width, 6);
    assert_eq!(summary.across.len(), 3);
    assert_eq!(summary.down.len(), 6);
    assert_eq!(summary.across[0].number, 1);
    assert_eq!(summary.across[0].clue, "Baffles");
    assert_eq!(summary.down[5].number, 6);
    assert_eq!(summary.solution, vec!["STUMPS", "TUREEN", "PESETA"]);
    // JSON export stays well-formed.
    let json = serde_json::to_string(&summary).unwrap();
    assert!(json.contains("\"Baffles\""));
}
