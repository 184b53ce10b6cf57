use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use shut_the_box::board::BoardState;
use shut_the_box::search::DICE_TOTALS;
use std::hint::black_box;

fn corpus() -> Vec<BoardState> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut boards = vec![BoardState::INITIAL];
    // Walk random games forward to get a spread of densities
    for _ in 0..16 {
        let mut b = BoardState::INITIAL;
        loop {
            let total = DICE_TOTALS[rng.gen_range(0..DICE_TOTALS.len())];
            let next = b.successors(total);
            if next.is_empty() { break; }
            b = next[rng.gen_range(0..next.len())];
            boards.push(b);
        }
    }
    boards
}

fn bench_expand(c: &mut Criterion) {
    let boards = corpus();
    c.bench_function("expand/successors_all_rolls", |bch| {
        bch.iter(|| {
            let mut acc = 0usize;
            for &bd in &boards {
                for &total in DICE_TOTALS.iter() { acc += bd.successors(total).len(); }
            }
            black_box(acc)
        })
    });
    c.bench_function("expand/for_each_all_rolls", |bch| {
        bch.iter(|| {
            let mut acc = 0u32;
            for &bd in &boards {
                for &total in DICE_TOTALS.iter() {
                    bd.for_each_successor(total, |n| acc ^= u32::from(n.front().raw()));
                }
            }
            black_box(acc)
        })
    });
}

criterion_group!(expand, bench_expand);
criterion_main!(expand);
