//! Concurrent acquire/release/compaction tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use peerbuf_core::config::PoolConfig;
use peerbuf_core::tag::AllocatorTag;
use peerbuf_mem::DirectBufferPool;

const LENGTHS: [usize; 8] = [3, 16, 200, 1500, 2048, 2049, 16_400, 70_000];

fn churn(pool: &DirectBufferPool, seed: usize, rounds: usize) {
    for i in 0..rounds {
        let length = LENGTHS[(seed + i) % LENGTHS.len()];
        let mut buf = pool.acquire(AllocatorTag::Other, length).unwrap();
        assert_eq!(buf.limit(), length);

        let fill = (seed as u8).wrapping_add(i as u8);
        buf.chunk_mut().fill(fill);
        buf.set_position(length).unwrap();
        buf.flip();
        assert!(buf.chunk().iter().all(|b| *b == fill));
        buf.release();
    }
}

#[test]
fn test_parallel_churn_balances_counters() {
    let mut cfg = PoolConfig::default();
    cfg.diagnostics.track_handed_out = true;
    let pool = DirectBufferPool::new(cfg).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|seed| {
            let pool = pool.clone();
            thread::spawn(move || churn(&pool, seed, 500))
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.usage.in_use, 0);
    assert_eq!(stats.usage.given, stats.usage.returned);
    assert_eq!(stats.handed_out, 0);
    assert_eq!(stats.unmatched_returns, 0);
    for class in &stats.slices {
        assert_eq!(class.free, class.allocated_entries, "class {}", class.entry_size);
    }
}

#[test]
fn test_compaction_races_with_churn() {
    let cfg = PoolConfig {
        min_free_bytes: 0,
        max_free_bytes: 64 * 1024,
        ..PoolConfig::default()
    };
    let pool = DirectBufferPool::new(cfg).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let compactor = {
        let pool = pool.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut passes = 0usize;
            while !stop.load(Ordering::Relaxed) {
                pool.compact();
                passes += 1;
                thread::yield_now();
            }
            passes
        })
    };

    let workers: Vec<_> = (0..4)
        .map(|seed| {
            let pool = pool.clone();
            thread::spawn(move || churn(&pool, seed * 3, 400))
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    assert!(compactor.join().unwrap() > 0);

    assert_eq!(pool.stats().usage.in_use, 0);
    for class in pool.stats().slices {
        assert_eq!(class.free, class.allocated_entries);
    }
}

#[test]
fn test_shared_buffer_across_threads() {
    let pool = DirectBufferPool::new(PoolConfig::default()).unwrap();
    let mut buf = pool.acquire(AllocatorTag::PieceBlock, 5000).unwrap();
    buf.put_slice(b"block").unwrap();
    buf.flip();
    let shared = buf.into_shared();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let view = shared.shared_view();
            thread::spawn(move || {
                let guard = view.lock();
                assert_eq!(guard.chunk(), b"block");
            })
        })
        .collect();
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(shared.ref_count(), 1);
    assert_eq!(pool.free_bytes(), 0);
    drop(shared);
    assert_eq!(pool.free_bytes(), 8192);
}
