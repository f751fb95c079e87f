use clap::Parser;
use minesweeper_ai::{Agent, Cell};
use rand::Rng;
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Autonomous bot that plays a randomly generated Minesweeper board by
/// feeding its observations to the knowledge-based agent.
#[derive(Parser)]
#[command(about = "Knowledge-based Minesweeper bot")]
struct Args {
    /// Board height
    #[arg(long, default_value_t = 8)]
    height: usize,
    /// Board width
    #[arg(long, default_value_t = 8)]
    width: usize,
    /// Number of mines
    #[arg(long, default_value_t = 8)]
    mines: usize,
    /// Delay between moves in milliseconds
    #[arg(long, default_value_t = 300)]
    delay: u64,
}

/// Ground truth owned by the driver. The agent never sees this directly;
/// it only learns what `reveal` reports one cell at a time.
struct Minefield {
    height: usize,
    width: usize,
    mines: BTreeSet<Cell>,
}

impl Minefield {
    fn generate<R: Rng + ?Sized>(height: usize, width: usize, count: usize, rng: &mut R) -> Self {
        if count >= height * width {
            panic!("Total mines must be less than the number of cells on the board.");
        }
        let mut mines = BTreeSet::new();
        while mines.len() < count {
            mines.insert(Cell {
                row: rng.random_range(0..height),
                col: rng.random_range(0..width),
            });
        }
        Minefield {
            height,
            width,
            mines,
        }
    }

    fn is_mine(&self, cell: Cell) -> bool {
        self.mines.contains(&cell)
    }

    /// The number of mines within one row and column of `cell`, the cell
    /// itself excluded.
    fn nearby_mines(&self, cell: Cell) -> u8 {
        let mut count = 0;
        for dr in -1i64..=1 {
            for dc in -1i64..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let row = cell.row as i64 + dr;
                let col = cell.col as i64 + dc;
                if row >= 0
                    && row < self.height as i64
                    && col >= 0
                    && col < self.width as i64
                    && self.is_mine(Cell {
                        row: row as usize,
                        col: col as usize,
                    })
                {
                    count += 1;
                }
            }
        }
        count
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut rng = rand::rng();

    // --- 1. Initialization ---
    let field = Minefield::generate(args.height, args.width, args.mines, &mut rng);
    let mut agent = Agent::new(args.height, args.width);
    let safe_cells = args.height * args.width - args.mines;

    println!("--- Knowledge-Based Minesweeper Bot ---");
    println!("Strategy: Play deduced-safe cells, guess randomly otherwise.");
    print_board(&field, &agent);

    // --- 2. Game Loop ---
    let mut move_count = 0;
    let outcome = loop {
        if agent.moves_made().len() == safe_cells {
            break "The bot cleared the board!";
        }

        move_count += 1;
        println!("\n--- Move #{} ---", move_count);

        // --- 3. Bot's Decision Logic ---
        let cell = match agent.safe_move() {
            Some(cell) => {
                println!("Deduction found a guaranteed safe cell.");
                cell
            }
            None => match agent.random_move(&mut rng) {
                Some(cell) => {
                    println!("No safe cell is known. Guessing...");
                    cell
                }
                None => break "No cells left to reveal.",
            },
        };

        // --- 4. Execute the Chosen Move ---
        println!("Bot reveals ({}, {})...", cell.row, cell.col);
        if field.is_mine(cell) {
            break "The bot hit a mine and lost.";
        }

        agent.add_knowledge(cell, field.nearby_mines(cell))?;
        print_board(&field, &agent);

        thread::sleep(Duration::from_millis(args.delay));
    };

    // --- 5. Final Result ---
    println!("\n--- Game Over ---");
    println!("Result: {}", outcome);
    println!(
        "Moves: {}, mines identified: {} of {}",
        move_count,
        agent.mines().len(),
        args.mines
    );

    Ok(())
}

/// Renders the board as the agent sees it: revealed cells show their
/// neighbor count, deduced mines show a flag, everything else is hidden.
fn print_board(field: &Minefield, agent: &Agent) {
    print!("   ");
    for col in 0..field.width {
        print!("{:^3}", col);
    }
    println!("\n  +{}", "---".repeat(field.width));

    for row in 0..field.height {
        print!("{:^2}|", row);
        for col in 0..field.width {
            let cell = Cell { row, col };
            let display = if agent.moves_made().contains(&cell) {
                format!(" {} ", field.nearby_mines(cell))
            } else if agent.mines().contains(&cell) {
                " ⚑ ".to_string()
            } else {
                " ■ ".to_string()
            };
            print!("{}", display);
        }
        println!();
    }
}
