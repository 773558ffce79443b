//! Integration tests for the transposition table public API

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use ttable::tt::{CLUSTER_SIZE, GENERATION_DELTA};
use ttable::types::DEPTH_ENTRY_OFFSET;
use ttable::{Bound, Move, TranspositionTable, TtOptions, Value};

fn options(hash_mb: usize) -> TtOptions {
    TtOptions {
        hash_mb,
        threads: 2,
        large_pages: false,
    }
}

/// タグが0にならないランダムキー
fn random_key(rng: &mut Xoshiro256PlusPlus) -> u64 {
    loop {
        let key: u64 = rng.random();
        if key >> 48 != 0 {
            return key;
        }
    }
}

#[test]
fn test_round_trip_random_keys() {
    let tt = TranspositionTable::new(options(8));
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x5eed);

    for _ in 0..200 {
        let key = random_key(&mut rng);
        let value = Value::new(rng.random_range(-3000..3000));
        let eval = Value::new(rng.random_range(-3000..3000));
        let depth = rng.random_range(DEPTH_ENTRY_OFFSET..64);
        let mv = Move::from_u16(rng.random_range(1..u16::MAX));
        let bound = [Bound::Upper, Bound::Lower, Bound::Exact][rng.random_range(0..3)];
        let is_pv = rng.random_bool(0.5);

        let probe = tt.probe(key);
        if probe.found {
            // 既に同じタグがある（まれな衝突）場合は比較しない
            continue;
        }
        probe.write(key, value, is_pv, bound, depth, mv, eval);

        let hit = tt.probe(key);
        assert!(hit.found);
        assert_eq!(hit.data.value, value);
        assert_eq!(hit.data.eval, eval);
        assert_eq!(hit.data.depth, depth);
        assert_eq!(hit.data.bound, bound);
        assert_eq!(hit.data.is_pv, is_pv);
        assert_eq!(hit.data.mv, mv);
    }
}

#[test]
fn test_move_retained_for_shallower_inexact_save() {
    let tt = TranspositionTable::new(options(1));
    let key = 0xabcd_0000_1111_2222;
    let mv = Move::from_u16(0x0f0f);

    tt.probe(key).write(key, Value::new(30), false, Bound::Lower, 10, mv, Value::ZERO);
    tt.probe(key).write(key, Value::new(-30), false, Bound::Upper, 8, Move::NONE, Value::ZERO);

    let hit = tt.probe(key);
    assert!(hit.found);
    assert_eq!(hit.data.mv, mv);
}

#[test]
fn test_new_move_replaces_old_even_without_overwrite() {
    let tt = TranspositionTable::new(options(1));
    let key = 0xabcd_0000_1111_2222;

    let (old, new) = (Move::from_u16(1), Move::from_u16(2));
    tt.probe(key).write(key, Value::new(30), false, Bound::Lower, 10, old, Value::ZERO);
    tt.probe(key).write(key, Value::new(-30), false, Bound::Upper, 8, new, Value::ZERO);

    let hit = tt.probe(key);
    assert_eq!(hit.data.mv, new);
    // 残りのフィールドは浅い非EXACTなので更新されない
    assert_eq!(hit.data.value.raw(), 30);
    assert_eq!(hit.data.depth, 10);
}

#[test]
fn test_idempotent_resize_preserves_entries() {
    let mut tt = TranspositionTable::new(options(2));
    let key = 0x1357_9bdf_2468_ace0;
    tt.probe(key).write(key, Value::new(77), true, Bound::Exact, 20, Move::NONE, Value::ZERO);

    tt.resize(2);
    tt.resize(2);

    let hit = tt.probe(key);
    assert!(hit.found);
    assert_eq!(hit.data.value.raw(), 77);
}

#[test]
fn test_resize_to_new_size_clears() {
    let mut tt = TranspositionTable::new(options(2));
    let key = 0x1357_9bdf_2468_ace0;
    tt.probe(key).write(key, Value::new(77), true, Bound::Exact, 20, Move::NONE, Value::ZERO);

    tt.resize(3);
    assert!(!tt.probe(key).found);
    assert_eq!(tt.hash_mb(), 3);
}

#[test]
fn test_hashfull_bounds_for_various_sizes() {
    for clusters in [1, 2, 7, 999, 1000, 1001, 5000] {
        let tt = TranspositionTable::with_cluster_count(clusters, options(1));
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(clusters as u64);
        assert_eq!(tt.hashfull(), 0);

        for i in 0..clusters * CLUSTER_SIZE * 2 {
            let key = random_key(&mut rng);
            tt.probe(key).write(key, Value::ZERO, false, Bound::Lower, 1, Move::NONE, Value::ZERO);
            if i % 16 == 0 {
                let h = tt.hashfull();
                assert!((0..=1000).contains(&h), "clusters={clusters} hashfull={h}");
            }
        }
        assert!(tt.hashfull() > 0);
    }
}

#[test]
fn test_hashfull_tracks_generation() {
    let tt = TranspositionTable::with_cluster_count(10, options(1));
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
    for _ in 0..200 {
        let key = random_key(&mut rng);
        tt.probe(key).write(key, Value::ZERO, false, Bound::Lower, 1, Move::NONE, Value::ZERO);
    }
    let before = tt.hashfull();
    assert!(before > 0);

    tt.new_search();
    assert_eq!(tt.generation(), GENERATION_DELTA);
    assert_eq!(tt.hashfull(), 0);
}

#[test]
fn test_large_pages_option_falls_back_transparently() {
    let opts = TtOptions {
        hash_mb: 4,
        threads: 1,
        large_pages: true,
    };
    let tt = TranspositionTable::new(opts);
    let key = 0x2222_3333_4444_5555;
    tt.probe(key).write(key, Value::new(5), false, Bound::Lower, 3, Move::NONE, Value::ZERO);
    assert!(tt.probe(key).found);
    assert_eq!(tt.cluster_count(), 4 * 1024 * 1024 / 64);
}

#[test]
fn test_concrete_two_cluster_scenario() {
    let tt = TranspositionTable::with_cluster_count(2, options(1));
    // 最上位bitが0のキーは全て cluster 0
    let [a, b, c, d] = [0x0001u64, 0x0002, 0x0003, 0x0004].map(|tag| tag << 48);

    for key in [a, b, c] {
        let probe = tt.probe(key);
        assert!(!probe.found);
        probe.write(key, Value::new(1), false, Bound::Lower, 5, Move::NONE, Value::ZERO);
    }

    let probe = tt.probe(d);
    assert!(!probe.found);
    probe.write(d, Value::new(2), false, Bound::Lower, 10, Move::NONE, Value::ZERO);

    assert!(!tt.probe(a).found);
    for key in [b, c, d] {
        assert!(tt.probe(key).found);
    }
}
