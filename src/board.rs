use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Number of numbered tiles on the board (values `1..=12`).
pub const TILE_COUNT: u8 = 12;

/// Each tile can be flipped twice: once in the front row, then once in the back row.
pub const FLIPS_PER_TILE: u8 = 2;

type RowRaw = u16;

const ROW_MASK: RowRaw = (1 << TILE_COUNT) - 1;

/// One row of flip flags packed into the low 12 bits of a `u16`.
///
/// Bit `n - 1` is set when tile `n` has been flipped in this row.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TileRow(RowRaw);

impl TileRow {
    /// No tile flipped.
    pub const EMPTY: TileRow = TileRow(0);
    /// Every tile flipped.
    pub const FULL: TileRow = TileRow(ROW_MASK);

    /// Build a row from its raw mask. Bits above tile 12 are rejected.
    #[inline]
    pub fn from_raw(raw: RowRaw) -> Result<Self, BoardError> {
        if raw & !ROW_MASK != 0 {
            return Err(BoardError::BitsOutOfRange { raw });
        }
        Ok(TileRow(raw))
    }

    /// Borrow the raw packed mask.
    #[inline]
    pub fn raw(&self) -> RowRaw { self.0 }

    /// True if `tile` (1-based) is flipped in this row. Tiles outside
    /// `1..=12` are never flipped.
    #[inline]
    pub fn is_flipped(self, tile: u8) -> bool { self.0 & bit(tile) != 0 }

    /// Return a copy of this row with `tile` flipped. Tiles outside `1..=12`
    /// leave the row unchanged.
    #[inline]
    pub fn with_flipped(self, tile: u8) -> Self { TileRow(self.0 | bit(tile)) }

    /// Number of flipped tiles.
    #[inline]
    pub fn count(self) -> u8 { self.0.count_ones() as u8 }

    #[inline]
    pub fn is_full(self) -> bool { self.0 == ROW_MASK }

    /// Return true if every flag set in `self` is also set in `other`.
    #[inline]
    pub fn is_subset_of(self, other: TileRow) -> bool { self.0 & !other.0 == 0 }
}

impl fmt::Debug for TileRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TileRow({:#014b})", self.0)
    }
}

#[inline(always)]
fn is_tile(tile: u8) -> bool { (1..=TILE_COUNT).contains(&tile) }

// Zero for out-of-range tiles so no row can gain bits above tile 12.
#[inline(always)]
fn bit(tile: u8) -> RowRaw {
    if is_tile(tile) { 1 << (tile - 1) } else { 0 }
}

/// A board configuration: which tiles are flipped in the front and back rows.
///
/// The back row may only hold tiles that are already flipped in front. Every
/// transition returns a new `BoardState`; states are small `Copy` values, so
/// sibling branches of a search never alias each other.
///
/// Example
/// ```
/// use shut_the_box::board::BoardState;
/// let s = BoardState::INITIAL.advance(3).unwrap();
/// assert_eq!(s.flip_count(3), 1);
/// assert_eq!(s.to_string(), "001000000000");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoardState {
    front: TileRow,
    back: TileRow,
}

impl BoardState {
    /// Canonical starting position: nothing flipped.
    pub const INITIAL: BoardState = BoardState { front: TileRow::EMPTY, back: TileRow::EMPTY };
    /// Every tile flipped in both rows.
    pub const WON: BoardState = BoardState { front: TileRow::FULL, back: TileRow::FULL };

    /// Build a state from its two rows, enforcing the front-before-back rule.
    pub fn new(front: TileRow, back: TileRow) -> Result<Self, BoardError> {
        if let Some(tile) = (1..=TILE_COUNT).find(|&t| back.is_flipped(t) && !front.is_flipped(t)) {
            return Err(BoardError::BackWithoutFront { tile });
        }
        Ok(BoardState { front, back })
    }

    /// Build a state from per-tile flip counts (`0`, `1` or `2`), tile 1 first.
    ///
    /// ```
    /// use shut_the_box::board::BoardState;
    /// let s = BoardState::from_flip_counts([2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1]).unwrap();
    /// assert!(s.is_consumed(11));
    /// assert!(!s.is_consumed(12));
    /// ```
    pub fn from_flip_counts(counts: [u8; TILE_COUNT as usize]) -> Result<Self, BoardError> {
        let mut front = TileRow::EMPTY;
        let mut back = TileRow::EMPTY;
        for (idx, &count) in counts.iter().enumerate() {
            let tile = idx as u8 + 1;
            match count {
                0 => {}
                1 => front = front.with_flipped(tile),
                2 => {
                    front = front.with_flipped(tile);
                    back = back.with_flipped(tile);
                }
                _ => return Err(BoardError::InvalidFlipCount { tile, count }),
            }
        }
        Ok(BoardState { front, back })
    }

    /// Per-tile flip counts, tile 1 first.
    pub fn flip_counts(self) -> [u8; TILE_COUNT as usize] {
        let mut counts = [0u8; TILE_COUNT as usize];
        for (idx, slot) in counts.iter_mut().enumerate() {
            *slot = self.flip_count(idx as u8 + 1);
        }
        counts
    }

    #[inline]
    pub fn front(self) -> TileRow { self.front }

    #[inline]
    pub fn back(self) -> TileRow { self.back }

    /// How many times `tile` has been flipped (0, 1 or 2; 0 outside `1..=12`).
    #[inline]
    pub fn flip_count(self, tile: u8) -> u8 {
        self.front.is_flipped(tile) as u8 + self.back.is_flipped(tile) as u8
    }

    /// A consumed tile is flipped in both rows and can no longer be selected.
    #[inline]
    pub fn is_consumed(self, tile: u8) -> bool { self.back.is_flipped(tile) }

    /// True once all 24 flags are set.
    #[inline]
    pub fn is_won(self) -> bool { self.front.is_full() && self.back.is_full() }

    /// Flip transitions left before the board is won (`0..=24`).
    #[inline]
    pub fn flips_remaining(self) -> u8 {
        TILE_COUNT * FLIPS_PER_TILE - self.front.count() - self.back.count()
    }

    /// Apply one flip transition to `tile`: front if unflipped, back if
    /// front-flipped, `None` if already consumed or not a tile number.
    #[inline]
    pub fn advance(self, tile: u8) -> Option<Self> {
        if !is_tile(tile) {
            None
        } else if !self.front.is_flipped(tile) {
            Some(BoardState { front: self.front.with_flipped(tile), back: self.back })
        } else if !self.back.is_flipped(tile) {
            Some(BoardState { front: self.front, back: self.back.with_flipped(tile) })
        } else {
            None
        }
    }

    /// Every successor reachable by flipping tiles whose values sum to `roll`.
    ///
    /// Tiles are picked in non-decreasing order and a path may pick a tile
    /// as long as it still has a flip transition left, so each multiset of
    /// picks yields exactly one successor. Returns an empty `Vec` when the
    /// roll cannot be decomposed, which the search treats as a loss.
    ///
    /// ```
    /// use shut_the_box::board::BoardState;
    /// let next = BoardState::INITIAL.successors(1);
    /// assert_eq!(next.len(), 1);
    /// assert_eq!(next[0].to_string(), "100000000000");
    /// // 4 = {4}, {1,3}, {2,2}, {1,1,2}
    /// assert_eq!(BoardState::INITIAL.successors(4).len(), 4);
    /// ```
    pub fn successors(self, roll: u32) -> Vec<BoardState> {
        let mut out = Vec::new();
        self.for_each_successor(roll, |next| out.push(next));
        out
    }

    /// Streaming form of [`Self::successors`]. Returns how many successors were visited.
    #[inline]
    pub fn for_each_successor<F: FnMut(BoardState)>(self, roll: u32, mut f: F) -> usize {
        match self.try_for_each_successor(roll, |next| -> Result<(), Infallible> {
            f(next);
            Ok(())
        }) {
            Ok(n) => n,
            Err(never) => match never {},
        }
    }

    /// Fallible streaming form; stops at the first error returned by `f`.
    pub fn try_for_each_successor<E, F>(self, roll: u32, mut f: F) -> Result<usize, E>
    where
        F: FnMut(BoardState) -> Result<(), E>,
    {
        if roll == 0 {
            return Ok(0);
        }
        let mut visited = 0;
        visit_successors(self, 1, roll, &mut f, &mut visited)?;
        Ok(visited)
    }
}

// Depth-first over tile values starting at `start`; the in-progress state
// decides which tiles can still be picked on this path.
fn visit_successors<E, F>(
    state: BoardState,
    start: u8,
    remaining: u32,
    f: &mut F,
    visited: &mut usize,
) -> Result<(), E>
where
    F: FnMut(BoardState) -> Result<(), E>,
{
    if remaining == 0 {
        *visited += 1;
        return f(state);
    }
    for tile in start..=TILE_COUNT {
        if u32::from(tile) > remaining {
            break;
        }
        if let Some(next) = state.advance(tile) {
            visit_successors(next, tile, remaining - u32::from(tile), f, visited)?;
        }
    }
    Ok(())
}

/// Free-function mirror of [`BoardState::successors`].
pub fn expand(state: BoardState, roll: u32) -> Vec<BoardState> { state.successors(roll) }

/// Errors building a `BoardState` from raw parts or text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("tile {tile} is flipped in the back row but not in the front row")]
    BackWithoutFront { tile: u8 },
    #[error("row mask {raw:#06x} has bits above tile 12")]
    BitsOutOfRange { raw: u16 },
    #[error("tile {tile} has flip count {count}, expected 0, 1 or 2")]
    InvalidFlipCount { tile: u8, count: u8 },
    #[error("expected 12 flip digits, found {found}")]
    Length { found: usize },
    #[error("invalid flip digit {ch:?}, expected 0, 1 or 2")]
    InvalidDigit { ch: char },
}

impl fmt::Debug for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoardState(front={:#05x}, back={:#05x})", self.front.0, self.back.0)
    }
}

/// Twelve flip-count digits, tile 1 first.
impl fmt::Display for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for count in self.flip_counts() {
            write!(f, "{}", count)?;
        }
        Ok(())
    }
}

/// Parses the [`Display`](fmt::Display) form. Whitespace and `_` separators are ignored.
impl FromStr for BoardState {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: Vec<char> = s.chars().filter(|c| !c.is_whitespace() && *c != '_').collect();
        if digits.len() != TILE_COUNT as usize {
            return Err(BoardError::Length { found: digits.len() });
        }
        let mut counts = [0u8; TILE_COUNT as usize];
        for (slot, ch) in counts.iter_mut().zip(digits) {
            *slot = match ch {
                '0' => 0,
                '1' => 1,
                '2' => 2,
                _ => return Err(BoardError::InvalidDigit { ch }),
            };
        }
        BoardState::from_flip_counts(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_state(rng: &mut StdRng) -> BoardState {
        let mut counts = [0u8; TILE_COUNT as usize];
        for c in counts.iter_mut() {
            *c = rng.gen_range(0..=2);
        }
        BoardState::from_flip_counts(counts).unwrap()
    }

    fn tiles_picked(from: BoardState, to: BoardState) -> u32 {
        (1..=TILE_COUNT)
            .map(|t| u32::from(t) * u32::from(to.flip_count(t) - from.flip_count(t)))
            .sum()
    }

    #[test]
    fn initial_roll_one_flips_tile_one() {
        let next = expand(BoardState::INITIAL, 1);
        assert_eq!(next.len(), 1);
        assert!(next[0].front().is_flipped(1));
        assert_eq!(next[0].front().count(), 1);
        assert_eq!(next[0].back(), TileRow::EMPTY);
    }

    #[test]
    fn initial_successor_counts() {
        let expected = [1, 2, 2, 4, 5, 7, 9, 13, 16, 22, 27, 36, 43];
        for (roll, &n) in (1..=13).zip(expected.iter()) {
            assert_eq!(BoardState::INITIAL.successors(roll).len(), n, "roll {}", roll);
        }
    }

    #[test]
    fn roll_zero_has_no_successors() {
        assert!(BoardState::INITIAL.successors(0).is_empty());
    }

    #[test]
    fn same_tile_twice_goes_front_then_back() {
        let next = BoardState::INITIAL.successors(2);
        assert!(next.contains(&"200000000000".parse().unwrap()));
        assert!(next.contains(&"010000000000".parse().unwrap()));
    }

    #[test]
    fn consumed_tiles_are_never_selected() {
        let s: BoardState = "222222222222".parse().unwrap();
        assert_eq!(s, BoardState::WON);
        for roll in 1..=12 {
            assert!(s.successors(roll).is_empty());
        }
        let s: BoardState = "022222222222".parse().unwrap();
        // Only tile 1 is open: it can take a roll of 1 or 2.
        assert_eq!(s.successors(1).len(), 1);
        assert_eq!(s.successors(2), vec![BoardState::WON]);
        assert!(s.successors(3).is_empty());
    }

    #[test]
    fn last_tile_back_flip_wins() {
        let s = BoardState::from_flip_counts([2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1]).unwrap();
        let next = s.successors(12);
        assert_eq!(next, vec![BoardState::WON]);
        assert!(next[0].is_won());
        for roll in 2..12 {
            assert!(s.successors(roll).is_empty());
        }
    }

    #[test]
    fn successors_are_monotonic_and_sum_to_roll() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let s = random_state(&mut rng);
            let roll = rng.gen_range(1..=13);
            for next in s.successors(roll) {
                assert!(s.front().is_subset_of(next.front()));
                assert!(s.back().is_subset_of(next.back()));
                assert!(next.back().is_subset_of(next.front()));
                assert_eq!(tiles_picked(s, next), roll);
            }
        }
    }

    #[test]
    fn successors_are_distinct_multisets() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..100 {
            let s = random_state(&mut rng);
            let mut next = s.successors(rng.gen_range(2..=12));
            let n = next.len();
            next.sort_by_key(|b| (b.front().raw(), b.back().raw()));
            next.dedup();
            assert_eq!(next.len(), n);
        }
    }

    #[test]
    fn try_for_each_stops_on_error() {
        let mut seen = 0;
        let res: Result<usize, &str> = BoardState::INITIAL.try_for_each_successor(12, |_| {
            seen += 1;
            if seen == 3 { Err("stop") } else { Ok(()) }
        });
        assert_eq!(res, Err("stop"));
        assert_eq!(seen, 3);
    }

    #[test]
    fn flips_remaining_counts_both_rows() {
        assert_eq!(BoardState::INITIAL.flips_remaining(), 24);
        assert_eq!(BoardState::WON.flips_remaining(), 0);
        let s: BoardState = "1200 0000 0000".parse().unwrap();
        assert_eq!(s.flips_remaining(), 21);
    }

    #[test]
    fn parse_and_display() {
        let s: BoardState = "0120_0000_0002".parse().unwrap();
        assert_eq!(s.to_string(), "012000000002");
        assert_eq!("0123".parse::<BoardState>(), Err(BoardError::Length { found: 4 }));
        assert_eq!(
            "01x000000000".parse::<BoardState>(),
            Err(BoardError::InvalidDigit { ch: 'x' })
        );
    }

    #[test]
    fn out_of_range_tiles_are_inert() {
        for tile in [0, 13, 16, 255] {
            assert_eq!(BoardState::INITIAL.advance(tile), None);
            assert_eq!(BoardState::WON.flip_count(tile), 0);
            assert!(!TileRow::FULL.is_flipped(tile));
            assert_eq!(TileRow::EMPTY.with_flipped(tile), TileRow::EMPTY);
        }
        let s = BoardState::INITIAL.advance(12).and_then(|s| s.advance(12)).unwrap();
        assert_eq!(s.flips_remaining(), 22);
        assert_eq!(s.advance(13), None);
    }

    #[test]
    fn new_rejects_back_without_front() {
        let front = TileRow::from_raw(0b0001).unwrap();
        let back = TileRow::from_raw(0b0011).unwrap();
        assert_eq!(BoardState::new(front, back), Err(BoardError::BackWithoutFront { tile: 2 }));
        assert!(BoardState::new(back, front).is_ok());
        assert_eq!(TileRow::from_raw(0x1000), Err(BoardError::BitsOutOfRange { raw: 0x1000 }));
    }
}
