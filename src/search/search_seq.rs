use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::board::BoardState;

use super::{
    breakdown_with, check_cancelled, dice_totals, AllGamesResult, CancelToken, RollOutcome,
    SearchConfig, SearchError, SearchStats,
};

/// Single-threaded exhaustive counter.
///
/// Walks the tree depth-first, folding each subtree's tally into its
/// parent's return value.
pub struct GameCounter {
    cfg: SearchConfig,
    stats: SearchStats,
    progress: Option<Arc<AtomicU64>>,
}

struct Walk<'a> {
    map: HashMap<BoardState, AllGamesResult>,
    nodes: u64,
    cache_hits: u64,
    cancel: Option<&'a CancelToken>,
}

impl GameCounter {
    pub fn new() -> Self { Self::with_config(SearchConfig::default()) }

    pub fn with_config(cfg: SearchConfig) -> Self {
        Self { cfg, stats: SearchStats::default(), progress: None }
    }

    /// Publish the running node count to `progress` while counting.
    pub fn with_progress(mut self, progress: Arc<AtomicU64>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Count from a freshly built canonical initial state.
    #[inline]
    pub fn count_from_initial(&mut self) -> AllGamesResult {
        self.count_all_games(BoardState::INITIAL)
    }

    /// Exact number of winning and losing play-throughs reachable from `state`.
    ///
    /// Example
    /// ```
    /// use shut_the_box::board::BoardState;
    /// use shut_the_box::search::{AllGamesResult, GameCounter};
    /// let mut counter = GameCounter::new();
    /// assert_eq!(counter.count_all_games(BoardState::WON), AllGamesResult::WIN);
    /// ```
    pub fn count_all_games(&mut self, state: BoardState) -> AllGamesResult {
        match self.run(state, None) {
            Ok(result) => result,
            Err(SearchError::Cancelled { .. }) => unreachable!("no cancel token was supplied"),
        }
    }

    /// Like [`Self::count_all_games`] but gives up once `cancel` is set.
    pub fn count_all_games_cancellable(
        &mut self,
        state: BoardState,
        cancel: &CancelToken,
    ) -> Result<AllGamesResult, SearchError> {
        self.run(state, Some(cancel))
    }

    /// Split the tally of `state` by distinct dice total (2..=12).
    ///
    /// [`RollOutcome::tally`] recombines the rows into [`Self::count_all_games`]
    /// for the same state.
    pub fn roll_breakdown(&mut self, state: BoardState) -> [RollOutcome; 11] {
        match self.breakdown(state, None) {
            Ok(rows) => rows,
            Err(SearchError::Cancelled { .. }) => unreachable!("no cancel token was supplied"),
        }
    }

    /// Like [`Self::roll_breakdown`] but gives up once `cancel` is set.
    pub fn roll_breakdown_cancellable(
        &mut self,
        state: BoardState,
        cancel: &CancelToken,
    ) -> Result<[RollOutcome; 11], SearchError> {
        self.breakdown(state, Some(cancel))
    }

    /// Statistics collected from the last count.
    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    /// Reset accumulated stats to zero.
    #[inline]
    pub fn reset_stats(&mut self) { self.stats = SearchStats::default(); }

    fn run(&mut self, state: BoardState, cancel: Option<&CancelToken>) -> Result<AllGamesResult, SearchError> {
        let mut walk = Walk { map: HashMap::new(), nodes: 0, cache_hits: 0, cancel };
        let result = self.count(state, &mut walk);
        self.record_stats(&walk);
        result
    }

    fn breakdown(&mut self, state: BoardState, cancel: Option<&CancelToken>) -> Result<[RollOutcome; 11], SearchError> {
        let mut walk = Walk { map: HashMap::new(), nodes: 0, cache_hits: 0, cancel };
        let rows = breakdown_with(state, |next| self.count(next, &mut walk));
        self.record_stats(&walk);
        rows
    }

    fn record_stats(&mut self, walk: &Walk<'_>) {
        self.stats = SearchStats {
            nodes: walk.nodes,
            cache_hits: walk.cache_hits,
            states_cached: walk.map.len() as u64,
        };
    }

    fn count(&self, state: BoardState, walk: &mut Walk<'_>) -> Result<AllGamesResult, SearchError> {
        walk.nodes += 1;
        if let Some(progress) = &self.progress {
            progress.fetch_add(1, Ordering::Relaxed);
        }
        check_cancelled(walk.cancel, walk.nodes)?;
        if state.is_won() {
            return Ok(AllGamesResult::WIN);
        }
        if self.cfg.cache_enabled {
            if let Some(&hit) = walk.map.get(&state) {
                walk.cache_hits += 1;
                return Ok(hit);
            }
        }
        let mut acc = AllGamesResult::default();
        for total in dice_totals() {
            let expanded = state.try_for_each_successor(total, |next| -> Result<(), SearchError> {
                acc += self.count(next, walk)?;
                Ok(())
            })?;
            if expanded == 0 {
                acc += AllGamesResult::LOSS;
            }
        }
        if self.cfg.cache_enabled {
            walk.map.insert(state, acc);
        }
        Ok(acc)
    }
}

impl Default for GameCounter { fn default() -> Self { Self::new() } }
