use clap::{Parser, Subcommand};
use puzrs::puzzle::{Puzzle, VerifyWarning};
use puzrs::{ChecksumKind, Direction, ScrambleKey};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "puz", about = "The Across Lite .puz format CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show puzzle metadata
    Info {
        input: PathBuf,
        /// Emit the full summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify checksums, section integrity, and rebus cross-references
    Verify {
        input: PathBuf,
    },
    /// Print the grids and numbered clue lists
    Dump {
        input: PathBuf,
        /// Print the current fill instead of the solution
        #[arg(long)]
        state: bool,
    },
    /// Check the current fill against the solution
    Check {
        input: PathBuf,
    },
    /// Show the word through a cell
    Word {
        input: PathBuf,
        row: u8,
        col: u8,
        /// across or down
        direction: String,
    },
    /// Obscure the solution with a 4-digit key
    Scramble {
        input: PathBuf,
        #[arg(short, long)]
        key: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Restore a scrambled solution with its key
    Unscramble {
        input: PathBuf,
        #[arg(short, long)]
        key: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let puzzle = open_puzzle(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&puzzle.summary())?);
            } else {
                println!("── .puz file ───────────────────────────────────────────");
                println!("  Path       {}", input.display());
                println!("  Title      {}", puzzle.title());
                println!("  Author     {}", puzzle.author());
                println!("  Copyright  {}", puzzle.copyright());
                println!("  Version    {}", puzzle.version());
                println!("  Grid       {}x{}", puzzle.width(), puzzle.height());
                println!("  Clues      {}", puzzle.n_clues());
                println!("  Scrambled  {}", puzzle.is_scrambled());
                println!("  Rebus      {}", puzzle.rtbl().is_some());
                println!("  Timer      {}", puzzle.timer().is_some());
            }
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { input } => {
            let bytes = std::fs::read(&input)?;
            let (puzzle, warnings) = Puzzle::load(&bytes)?;
            print_warnings(&warnings);
            for kind in ChecksumKind::ALL {
                println!("  {:<12} {}", kind.name(), puzzle.stored_checksum(kind));
            }
            println!("OK: {}", input.display());
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, state } => {
            let puzzle = open_puzzle(&input)?;
            let rows = if state {
                puzzle.state_rows()
            } else {
                puzzle.solution_rows()
            };
            for row in rows {
                println!("{row}");
            }
            println!();
            println!("Across:");
            for clue in puzzle.summary().across {
                println!("  {:>3}. {}", clue.number, clue.clue);
            }
            println!("Down:");
            for clue in puzzle.summary().down {
                println!("  {:>3}. {}", clue.number, clue.clue);
            }
        }

        // ── Check ────────────────────────────────────────────────────────────
        Commands::Check { input } => {
            let mut puzzle = open_puzzle(&input)?;
            let solved = puzzle.check_all()?;
            println!("{}", if solved { "solved" } else { "not solved" });
            if !solved {
                std::process::exit(1);
            }
        }

        // ── Word ─────────────────────────────────────────────────────────────
        Commands::Word { input, row, col, direction } => {
            let puzzle = open_puzzle(&input)?;
            let dir: Direction = direction.parse()?;
            println!("{}", puzzle.word_at(row, col, dir)?);
        }

        // ── Scramble ─────────────────────────────────────────────────────────
        Commands::Scramble { input, key, output } => {
            let mut puzzle = open_puzzle(&input)?;
            let key: ScrambleKey = key.parse()?;
            puzzle.scramble(key)?;
            write_puzzle(&puzzle, &output)?;
            println!("Scrambled → {}", output.display());
        }

        // ── Unscramble ───────────────────────────────────────────────────────
        Commands::Unscramble { input, key, output } => {
            let mut puzzle = open_puzzle(&input)?;
            let key: ScrambleKey = key.parse()?;
            puzzle.unscramble(key)?;
            write_puzzle(&puzzle, &output)?;
            println!("Unscrambled → {}", output.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open_puzzle(path: &PathBuf) -> Result<Puzzle, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let (puzzle, warnings) = Puzzle::load(&bytes)?;
    print_warnings(&warnings);
    Ok(puzzle)
}

fn print_warnings(warnings: &[VerifyWarning]) {
    for w in warnings {
        eprintln!("warning: {w}");
    }
}

fn write_puzzle(puzzle: &Puzzle, path: &PathBuf) -> std::io::Result<()> {
    let mut out = Vec::new();
    puzzle.write_to(&mut out)?;
    std::fs::write(path, out)
}
