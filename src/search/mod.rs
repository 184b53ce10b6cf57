//! Exhaustive win/loss counting over the full game tree.
//!
//! This module provides two counters:
//! - [`GameCounter`]: single-threaded depth-first count.
//! - [`GameCounterParallel`]: rayon-based count sharing a `DashMap` table.
//!
//! Both sum over every legal tile choice for every one of the 36 ordered
//! two-dice outcomes at every ply, so the result counts game paths rather
//! than distinct boards. Both produce identical totals.
//!
//! Notes
//! - `count_all_games` is a pure function of the board, so results can be
//!   memoized per state. With the cache on, memory is bounded by the number
//!   of legal states (3^12); with it off the recursion only holds the
//!   current path, but the canonical run has more than 10^32 paths and will
//!   not finish.
//! - Recursion depth never exceeds 24 plies (one flip per ply minimum).
//!
//! Quick start
//! ```
//! use shut_the_box::board::BoardState;
//! use shut_the_box::search::{AllGamesResult, GameCounter};
//!
//! let near_win: BoardState = "222222222221".parse().unwrap();
//! let mut counter = GameCounter::new();
//! // Only 6+6 finishes the game; the other 35 outcomes are dead ends.
//! assert_eq!(counter.count_all_games(near_win), AllGamesResult { won: 1, lost: 35 });
//! ```

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::board::BoardState;

mod search_par;
mod search_seq;

pub use search_par::GameCounterParallel;
pub use search_seq::GameCounter;

/// Faces on each die.
pub const DIE_SIDES: u32 = 6;

/// Every ordered outcome of two dice, as its total. A 7 appears six times, a 2 once.
pub const DICE_TOTALS: [u32; 36] = dice_table();

const fn dice_table() -> [u32; 36] {
    let mut out = [0u32; 36];
    let mut a = 0;
    while a < DIE_SIDES {
        let mut b = 0;
        while b < DIE_SIDES {
            out[(a * DIE_SIDES + b) as usize] = a + b + 2;
            b += 1;
        }
        a += 1;
    }
    out
}

/// Iterate the 36 ordered two-dice totals.
pub fn dice_totals() -> impl Iterator<Item = u32> { DICE_TOTALS.into_iter() }

/// Number of ordered two-dice outcomes that produce `total`.
pub fn outcomes_for_total(total: u32) -> u32 {
    DICE_TOTALS.iter().filter(|&&t| t == total).count() as u32
}

/// Win/loss tally for a subtree of play-throughs.
///
/// Combines by element-wise addition; `Default` is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AllGamesResult {
    pub won: u128,
    pub lost: u128,
}

impl AllGamesResult {
    /// One path that ended with every tile flipped.
    pub const WIN: AllGamesResult = AllGamesResult { won: 1, lost: 0 };
    /// One path that ended on a roll with no legal expansion.
    pub const LOSS: AllGamesResult = AllGamesResult { won: 0, lost: 1 };

    /// Total number of complete play-throughs.
    #[inline]
    pub fn total(self) -> u128 { self.won + self.lost }

    /// Fraction of play-throughs that were won (0.0 for an empty tally).
    pub fn win_ratio(self) -> f64 {
        let total = self.total();
        if total == 0 { 0.0 } else { self.won as f64 / total as f64 }
    }

    /// Scale both counters, used when a distinct total stands for several dice outcomes.
    #[inline]
    pub fn scaled(self, factor: u128) -> Self {
        AllGamesResult { won: self.won * factor, lost: self.lost * factor }
    }
}

impl Add for AllGamesResult {
    type Output = AllGamesResult;

    #[inline]
    fn add(self, other: AllGamesResult) -> AllGamesResult {
        AllGamesResult { won: self.won + other.won, lost: self.lost + other.lost }
    }
}

impl AddAssign for AllGamesResult {
    #[inline]
    fn add_assign(&mut self, other: AllGamesResult) { *self = *self + other; }
}

impl Sum for AllGamesResult {
    fn sum<I: Iterator<Item = AllGamesResult>>(iter: I) -> Self {
        iter.fold(AllGamesResult::default(), Add::add)
    }
}

impl fmt::Display for AllGamesResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AllGamesResult(num_won={}, num_lost={})", self.won, self.lost)
    }
}

/// Configurable knobs for the counters. Defaults are the fast exact setup.
///
/// - `cache_enabled`: memoize per-state results in a transposition table.
/// - `par_thresholds`: thresholds used only by the parallel implementation.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Enable/disable transposition caching.
    pub cache_enabled: bool,
    /// Thresholds used by the parallel implementation.
    pub par_thresholds: ParThresholds,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { cache_enabled: true, par_thresholds: ParThresholds::default() }
    }
}

/// Thresholds used to balance parallel overheads.
///
/// Rayon fans out only at states with at least `min_flips_remaining` flips
/// left; deeper states recurse sequentially on the current worker.
#[derive(Debug, Clone, Copy)]
pub struct ParThresholds {
    pub min_flips_remaining: u8,
}

impl Default for ParThresholds {
    fn default() -> Self { Self { min_flips_remaining: 8 } }
}

/// Basic search stats for a single count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// States visited, including cache hits and won leaves.
    pub nodes: u64,
    pub cache_hits: u64,
    pub states_cached: u64,
}

/// Per-total slice of a state's tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    pub total: u32,
    /// Ordered dice outcomes that produce `total`.
    pub outcomes: u32,
    /// Legal expansions of the state for this total.
    pub successors: usize,
    /// Summed over all `outcomes`.
    pub result: AllGamesResult,
}

impl RollOutcome {
    /// Recombine a breakdown of `state` into its full tally.
    pub fn tally(state: BoardState, rows: &[RollOutcome]) -> AllGamesResult {
        if state.is_won() { AllGamesResult::WIN } else { rows.iter().map(|r| r.result).sum() }
    }
}

// One row per distinct total (2..=12); `count` tallies a successor subtree.
fn breakdown_with<F>(state: BoardState, mut count: F) -> Result<[RollOutcome; 11], SearchError>
where
    F: FnMut(BoardState) -> Result<AllGamesResult, SearchError>,
{
    let empty = RollOutcome { total: 0, outcomes: 0, successors: 0, result: AllGamesResult::default() };
    let mut out = [empty; 11];
    for (slot, total) in out.iter_mut().zip(2u32..=12) {
        let outcomes = outcomes_for_total(total);
        let successors = state.successors(total);
        let per_outcome = if state.is_won() {
            AllGamesResult::default()
        } else if successors.is_empty() {
            AllGamesResult::LOSS
        } else {
            let mut acc = AllGamesResult::default();
            for &next in &successors {
                acc += count(next)?;
            }
            acc
        };
        *slot = RollOutcome {
            total,
            outcomes,
            successors: successors.len(),
            result: per_outcome.scaled(u128::from(outcomes)),
        };
    }
    Ok(out)
}

/// Cooperative cancellation flag shared between a caller and a running count.
///
/// Counters poll it once per visited node.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }

    pub fn cancel(&self) { self.0.store(true, Ordering::Relaxed); }

    #[inline]
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Relaxed) }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("search cancelled after visiting {nodes} states")]
    Cancelled { nodes: u64 },
}

/// Count every winning and losing play-through from `state` with the default
/// sequential counter.
pub fn count_all_games(state: BoardState) -> AllGamesResult {
    GameCounter::new().count_all_games(state)
}

#[inline]
fn check_cancelled(cancel: Option<&CancelToken>, nodes: u64) -> Result<(), SearchError> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(SearchError::Cancelled { nodes }),
        _ => Ok(()),
    }
}
