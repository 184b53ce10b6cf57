use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::RandomState as AHasher;
use dashmap::DashMap;
use rayon::prelude::*;

use crate::board::BoardState;

use super::{
    breakdown_with, check_cancelled, AllGamesResult, CancelToken, ParThresholds, RollOutcome,
    SearchConfig, SearchError, SearchStats, DICE_TOTALS,
};

/// Parallel exhaustive counter using rayon and a shared `DashMap` transposition table.
///
/// Produces the same tally as [`super::GameCounter`]; addition is
/// commutative and associative, so subtrees can be reduced in any order.
pub struct GameCounterParallel {
    cfg: SearchConfig,
    stats: SearchStats,
    progress: Option<Arc<AtomicU64>>,
}

struct SharedWalk<'a> {
    map: DashMap<BoardState, AllGamesResult, AHasher>,
    nodes: AtomicU64,
    cache_hits: AtomicU64,
    cancel: Option<&'a CancelToken>,
}

impl<'a> SharedWalk<'a> {
    fn new(cancel: Option<&'a CancelToken>) -> Self {
        SharedWalk {
            map: DashMap::with_hasher(AHasher::new()),
            nodes: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cancel,
        }
    }
}

impl GameCounterParallel {
    pub fn new() -> Self { Self::with_config(SearchConfig::default()) }

    pub fn with_config(cfg: SearchConfig) -> Self {
        Self { cfg, stats: SearchStats::default(), progress: None }
    }

    /// Publish the running node count to `progress` while counting.
    pub fn with_progress(mut self, progress: Arc<AtomicU64>) -> Self {
        self.progress = Some(progress);
        self
    }

    #[inline]
    pub fn count_from_initial(&mut self) -> AllGamesResult {
        self.count_all_games(BoardState::INITIAL)
    }

    /// Exact number of winning and losing play-throughs reachable from `state`.
    ///
    /// Runs on the current rayon pool; wrap in `ThreadPool::install` to pin a pool size.
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

    /// Split the tally of `state` by distinct dice total (2..=12), counting
    /// each successor subtree in parallel.
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
        let walk = SharedWalk::new(cancel);
        let result = self.count_parallel(state, &walk);
        self.record_stats(&walk);
        result
    }

    fn breakdown(&mut self, state: BoardState, cancel: Option<&CancelToken>) -> Result<[RollOutcome; 11], SearchError> {
        let walk = SharedWalk::new(cancel);
        let rows = breakdown_with(state, |next| self.count_parallel(next, &walk));
        self.record_stats(&walk);
        rows
    }

    fn record_stats(&mut self, walk: &SharedWalk<'_>) {
        self.stats = SearchStats {
            nodes: walk.nodes.load(Ordering::Relaxed),
            cache_hits: walk.cache_hits.load(Ordering::Relaxed),
            states_cached: walk.map.len() as u64,
        };
    }

    fn count_parallel(&self, state: BoardState, walk: &SharedWalk<'_>) -> Result<AllGamesResult, SearchError> {
        let nodes = walk.nodes.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(progress) = &self.progress {
            progress.fetch_add(1, Ordering::Relaxed);
        }
        check_cancelled(walk.cancel, nodes)?;
        if state.is_won() {
            return Ok(AllGamesResult::WIN);
        }
        if self.cfg.cache_enabled {
            // Copy out so the shard guard is released before recursing.
            if let Some(hit) = walk.map.get(&state).map(|entry| *entry) {
                walk.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }
        }
        let ParThresholds { min_flips_remaining } = self.cfg.par_thresholds;
        let acc = if state.flips_remaining() >= min_flips_remaining {
            DICE_TOTALS
                .par_iter()
                .map(|&total| {
                    let next = state.successors(total);
                    if next.is_empty() {
                        return Ok(AllGamesResult::LOSS);
                    }
                    next.par_iter()
                        .map(|&n| self.count_parallel(n, walk))
                        .try_reduce(AllGamesResult::default, |a, b| Ok(a + b))
                })
                .try_reduce(AllGamesResult::default, |a, b| Ok(a + b))?
        } else {
            let mut acc = AllGamesResult::default();
            for &total in DICE_TOTALS.iter() {
                let expanded = state.try_for_each_successor(total, |next| -> Result<(), SearchError> {
                    acc += self.count_parallel(next, walk)?;
                    Ok(())
                })?;
                if expanded == 0 {
                    acc += AllGamesResult::LOSS;
                }
            }
            acc
        };
        if self.cfg.cache_enabled {
            walk.map.insert(state, acc);
        }
        Ok(acc)
    }
}

impl Default for GameCounterParallel { fn default() -> Self { Self::new() } }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::GameCounter;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rayon::ThreadPoolBuilder;

    fn state(s: &str) -> BoardState { s.parse().unwrap() }

    #[test]
    fn won_state_counts_one_win() {
        let mut counter = GameCounterParallel::new();
        assert_eq!(counter.count_all_games(BoardState::WON), AllGamesResult::WIN);
    }

    #[test]
    fn matches_sequential_on_random_states() {
        let mut rng = StdRng::seed_from_u64(31337);
        let cfg = SearchConfig { par_thresholds: ParThresholds { min_flips_remaining: 2 }, ..Default::default() };
        let mut par = GameCounterParallel::with_config(cfg);
        let mut seq = GameCounter::new();
        for _ in 0..10 {
            let mut counts = [2u8; 12];
            for _ in 0..12 {
                let idx = rng.gen_range(0..12);
                counts[idx] = counts[idx].saturating_sub(1);
            }
            let s = BoardState::from_flip_counts(counts).unwrap();
            assert_eq!(par.count_all_games(s), seq.count_all_games(s), "state {}", s);
        }
    }

    #[test]
    fn uncached_parallel_matches_golden() {
        let cfg = SearchConfig {
            cache_enabled: false,
            par_thresholds: ParThresholds { min_flips_remaining: 3 },
        };
        let mut counter = GameCounterParallel::with_config(cfg);
        assert_eq!(counter.count_all_games(state("222222222112")), AllGamesResult { won: 12, lost: 199 });
        assert_eq!(counter.last_stats().cache_hits, 0);
        assert_eq!(counter.last_stats().states_cached, 0);
    }

    #[test]
    fn canonical_full_run_on_pinned_pool() {
        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let mut counter = GameCounterParallel::new();
        let result = pool.install(|| counter.count_from_initial());
        assert_eq!(
            result,
            AllGamesResult {
                won: 5_335_716_896_886_538_435_988_630_916_000,
                lost: 101_497_227_827_160_959_403_290_647_879_591,
            }
        );
        assert!(counter.last_stats().states_cached <= 3u64.pow(12));
    }

    #[test]
    fn breakdown_matches_sequential() {
        let mut par = GameCounterParallel::new();
        let mut seq = GameCounter::new();
        for s in ["222222222221", "222222111111", "222222220000"] {
            let s = state(s);
            let rows = par.roll_breakdown(s);
            assert_eq!(rows, seq.roll_breakdown(s));
            assert_eq!(RollOutcome::tally(s, &rows), seq.count_all_games(s));
        }
        let token = CancelToken::new();
        token.cancel();
        let res = par.roll_breakdown_cancellable(state("222222220000"), &token);
        assert!(matches!(res, Err(SearchError::Cancelled { .. })));
    }

    #[test]
    fn cancelled_token_returns_error() {
        let token = CancelToken::new();
        token.cancel();
        let mut counter = GameCounterParallel::new();
        let res = counter.count_all_games_cancellable(BoardState::INITIAL, &token);
        assert!(matches!(res, Err(SearchError::Cancelled { .. })));
    }
}
