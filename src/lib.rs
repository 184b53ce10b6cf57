//! shut-the-box: exhaustive play-through counting for two-row Shut the Box
//!
//! This crate provides:
//! - A compact `BoardState` (two packed 12-bit rows) with `successors`, `advance`, `is_won`, ...
//! - Exhaustive win/loss counters (`search` module) with single-threaded and parallel variants
//!
//! The game: twelve tiles numbered 1..=12, each flipped twice (front row, then
//! back row). Every turn two dice are rolled and the player flips any tiles
//! whose values sum to the total. The game is won when all 24 flips are done
//! and lost on the first roll that cannot be matched.
//!
//! Quick start:
//! ```
//! use shut_the_box::board::BoardState;
//! use shut_the_box::search::{AllGamesResult, GameCounter};
//!
//! let s: BoardState = "222222222220".parse().unwrap();
//! assert_eq!(s.successors(12).len(), 1);
//!
//! let mut counter = GameCounter::new();
//! assert_eq!(counter.count_all_games(s), AllGamesResult { won: 1, lost: 70 });
//! ```
//!
//! Counting from [`board::BoardState::INITIAL`] visits every legal state once
//! thanks to the transposition cache; the tally itself
//! exceeds 10^32 paths, so counters use `u128`.
//!
pub mod board;
pub mod search;
