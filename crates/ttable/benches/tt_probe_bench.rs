//! Benchmark for transposition table probe / write / clear

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::hint::black_box;
use ttable::{Bound, Move, TranspositionTable, TtOptions, Value};

fn setup_filled_tt(size_mb: usize) -> TranspositionTable {
    let tt = TranspositionTable::new(TtOptions {
        hash_mb: size_mb,
        ..TtOptions::default()
    });
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);

    // Fill TT with random entries
    for _ in 0..100_000 {
        let key: u64 = rng.random();
        let depth = rng.random_range(1..20);
        tt.probe(key).write(
            key,
            Value::new(rng.random_range(-1000..1000)),
            false,
            Bound::Exact,
            depth,
            Move::from_u16(rng.random()),
            Value::new(rng.random_range(-500..500)),
        );
    }

    tt
}

fn bench_tt_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("tt_probe");

    let tt = setup_filled_tt(16);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
    let keys: Vec<u64> = (0..1000).map(|_| rng.random()).collect();

    group.bench_function("mixed_access", |b| {
        let mut idx = 0;
        b.iter(|| {
            let key = keys[idx % keys.len()];
            idx += 1;
            black_box(tt.probe(black_box(key)).found)
        });
    });

    group.bench_function("probe_write", |b| {
        let mut idx = 0;
        b.iter(|| {
            let key = keys[idx % keys.len()];
            idx += 1;
            let probe = tt.probe(black_box(key));
            probe.write(key, Value::new(1), false, Bound::Lower, 8, Move::NONE, Value::ZERO);
        });
    });

    group.finish();
}

fn bench_tt_clear(c: &mut Criterion) {
    let mut group = c.benchmark_group("tt_clear");
    group.sample_size(10);

    for threads in [1, 4] {
        let mut tt = TranspositionTable::new(TtOptions {
            hash_mb: 64,
            threads,
            large_pages: false,
        });
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, _| {
            b.iter(|| tt.clear());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tt_probe, bench_tt_clear);
criterion_main!(benches);
