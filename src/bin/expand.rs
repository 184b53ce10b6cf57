use clap::Parser;
use shut_the_box::board::{BoardState, TILE_COUNT};

/// List every successor of a board for one roll total.
#[derive(Debug, Parser)]
#[command(name = "expand", about = "List the legal tile flips for a roll")]
struct Args {
    /// Board as 12 flip digits 0/1/2, tile 1 first (default: empty board)
    #[arg(long)]
    state: Option<BoardState>,

    /// Roll total to decompose
    #[arg(long)]
    roll: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.roll == 0 {
        anyhow::bail!("roll must be a positive integer");
    }
    let state = args.state.unwrap_or(BoardState::INITIAL);
    let successors = state.successors(args.roll);
    println!("{} + roll {} -> {} successor(s)", state, args.roll, successors.len());
    for next in successors {
        let picked: Vec<String> = (1..=TILE_COUNT)
            .flat_map(|tile| {
                let times = next.flip_count(tile) - state.flip_count(tile);
                std::iter::repeat(tile.to_string()).take(times as usize)
            })
            .collect();
        let marker = if next.is_won() { "  (won)" } else { "" };
        println!("  {}  [{}]{}", next, picked.join("+"), marker);
    }
    Ok(())
}
