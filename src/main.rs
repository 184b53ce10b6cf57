use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use shut_the_box::board::BoardState;
use shut_the_box::search::{
    AllGamesResult, CancelToken, GameCounter, GameCounterParallel, RollOutcome, SearchConfig,
    SearchError, SearchStats,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Parser)]
#[command(name = "shut-the-box", about = "Count every winning and losing Shut the Box play-through")]
struct Args {
    /// Start from this state (12 flip digits 0/1/2, tile 1 first) instead of the empty board
    #[arg(long)]
    state: Option<BoardState>,

    /// Use the rayon-based parallel counter
    #[arg(long)]
    parallel: bool,

    /// Worker threads for --parallel (defaults to rayon's choice)
    #[arg(long)]
    threads: Option<usize>,

    /// Disable the per-state transposition cache (exponential time)
    #[arg(long)]
    no_cache: bool,

    /// Give up after this many seconds
    #[arg(long)]
    time_limit: Option<u64>,

    /// Also print the tally split by dice total
    #[arg(long)]
    breakdown: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Suppress status line output
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let state = args.state.unwrap_or(BoardState::INITIAL);
    let cfg = SearchConfig { cache_enabled: !args.no_cache, ..Default::default() };

    // Keep stdout for the result alone so --json output stays parseable.
    if !args.quiet {
        eprintln!("Computing the result of all possible games...");
    }
    let start = Instant::now();

    // Status line: nodes visited via indicatif
    let nodes = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));
    let mut status_handle: Option<thread::JoinHandle<()>> = None;
    let mut pb_opt: Option<ProgressBar> = None;
    if !args.quiet {
        let nodes_for_status = nodes.clone();
        let stop_flag = stop.clone();
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {elapsed_precise} | States visited: {msg}")?
                .tick_chars("⠁⠃⠇⠧⠷⠿⠻⠟⠯⠷⠧⠇⠃"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        let pb_bg = pb.clone();
        status_handle = Some(thread::spawn(move || {
            let start = Instant::now();
            while !stop_flag.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(250));
                let n = nodes_for_status.load(Ordering::Relaxed);
                let elapsed = start.elapsed().as_secs_f64().max(1e-6);
                pb_bg.set_message(format!("{} | states/sec: {:.0}", n, (n as f64) / elapsed));
            }
        }));
        pb_opt = Some(pb);
    }

    let cancel = CancelToken::new();
    if let Some(secs) = args.time_limit {
        let timer_token = cancel.clone();
        let stop_flag = stop.clone();
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(secs);
            while !stop_flag.load(Ordering::Relaxed) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(50));
            }
            if !stop_flag.load(Ordering::Relaxed) {
                timer_token.cancel();
            }
        });
    }

    let outcome = if args.parallel {
        let mut counter = GameCounterParallel::with_config(cfg).with_progress(nodes.clone());
        let mut count = || -> Result<Report, SearchError> {
            if args.breakdown {
                let rows = counter.roll_breakdown_cancellable(state, &cancel)?;
                Ok(Report { result: RollOutcome::tally(state, &rows), rows: Some(rows) })
            } else {
                let result = counter.count_all_games_cancellable(state, &cancel)?;
                Ok(Report { result, rows: None })
            }
        };
        let res = match args.threads {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
                pool.install(count)
            }
            None => count(),
        };
        res.map(|report| (report, counter.last_stats()))
    } else {
        let mut counter = GameCounter::with_config(cfg).with_progress(nodes.clone());
        let res = if args.breakdown {
            counter
                .roll_breakdown_cancellable(state, &cancel)
                .map(|rows| Report { result: RollOutcome::tally(state, &rows), rows: Some(rows) })
        } else {
            counter
                .count_all_games_cancellable(state, &cancel)
                .map(|result| Report { result, rows: None })
        };
        res.map(|report| (report, counter.last_stats()))
    };

    // Stop status thread before printing
    stop.store(true, Ordering::Relaxed);
    if let Some(h) = status_handle { let _ = h.join(); }
    if let Some(pb) = pb_opt { pb.finish_and_clear(); }
    let elapsed = start.elapsed().as_secs_f64();

    let (report, stats) = outcome?;
    if args.json {
        println!("{}", render_json(state, &report)?);
    } else {
        print_result(state, report.result, stats, elapsed);
        if let Some(rows) = &report.rows {
            print_breakdown(rows);
        }
    }
    Ok(())
}

/// Tally of one run, with the per-total rows when `--breakdown` was given.
struct Report {
    result: AllGamesResult,
    rows: Option<[RollOutcome; 11]>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    state: String,
    won: u128,
    lost: u128,
    total: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    breakdown: Option<&'a [RollOutcome]>,
}

// Written straight to a string: u128 counts overflow `serde_json::Value` numbers.
fn render_json(state: BoardState, report: &Report) -> serde_json::Result<String> {
    let doc = JsonReport {
        state: state.to_string(),
        won: report.result.won,
        lost: report.result.lost,
        total: report.result.total(),
        breakdown: report.rows.as_ref().map(|rows| &rows[..]),
    };
    serde_json::to_string_pretty(&doc)
}

fn print_breakdown(rows: &[RollOutcome]) {
    println!("{:>5} {:>8} {:>10} {:>40} {:>40}", "total", "outcomes", "successors", "won", "lost");
    for row in rows {
        println!(
            "{:>5} {:>8} {:>10} {:>40} {:>40}",
            row.total, row.outcomes, row.successors, row.result.won, row.result.lost
        );
    }
}

fn print_result(state: BoardState, result: AllGamesResult, stats: SearchStats, elapsed: f64) {
    println!("{}", result);
    println!("state:      {}", state);
    println!("won:        {}", result.won);
    println!("lost:       {}", result.lost);
    println!("total:      {}", result.total());
    println!("win ratio:  {:.6e}", result.win_ratio());
    println!(
        "visited {} states ({} cache hits, {} cached) in {:.2}s",
        stats.nodes, stats.cache_hits, stats.states_cached, elapsed
    );
}
