//! Slice tier tests: chunk sharing, LIFO reuse, exhaustion fallback, compaction

use std::sync::Arc;

use parking_lot::Mutex;
use peerbuf_core::alert::{Alert, AlertLevel, AlertSink};
use peerbuf_core::config::PoolConfig;
use peerbuf_core::id::RegionId;
use peerbuf_core::tag::AllocatorTag;
use peerbuf_mem::slice::SliceClassStats;
use peerbuf_mem::{
    DirectBufferPool, Error, RegionIds, SliceAllocator, SliceDescriptor, SliceGrant,
};

#[derive(Default)]
struct CapturingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl AlertSink for CapturingSink {
    fn alert(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}

fn class_stats(pool: &DirectBufferPool, entry_size: usize) -> SliceClassStats {
    pool.stats()
        .slices
        .into_iter()
        .find(|s| s.entry_size == entry_size)
        .expect("slice class exists")
}

/// One 16-byte class, four entries per chunk, `chunks` chunk slots.
fn tiny_config(chunks: usize) -> PoolConfig {
    PoolConfig {
        slice_chunk_size: 64,
        slice_entry_sizes: vec![16],
        slice_chunk_limits: vec![chunks],
        ..PoolConfig::default()
    }
}

#[test]
fn test_small_requests_share_a_chunk() {
    let pool = DirectBufferPool::new(PoolConfig::default()).unwrap();
    let a = pool.acquire(AllocatorTag::MessageHave, 10).unwrap();
    let b = pool.acquire(AllocatorTag::MessageHave, 10).unwrap();

    assert_eq!(a.capacity(), 16);
    assert_eq!(b.capacity(), 16);
    assert_ne!(a.region(), b.region());
    assert_eq!(a.slice_descriptor(), Some(SliceDescriptor { chunk: 0, slot: 0 }));
    assert_eq!(b.slice_descriptor(), Some(SliceDescriptor { chunk: 0, slot: 1 }));

    let stats = class_stats(&pool, 16);
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.entries_per_chunk, 256);
    assert_eq!(stats.allocated_entries, 256);
    assert_eq!(stats.free, 254);
    assert_eq!(stats.use_count, 2);

    a.release();
    b.release();
    let report = pool.compact();
    assert_eq!(report.slice_chunks, 1);

    let stats = class_stats(&pool, 16);
    assert_eq!(stats.chunks, 0);
    assert_eq!(stats.free, 0);
}

#[test]
fn test_slice_entry_selection() {
    let pool = DirectBufferPool::new(PoolConfig::default()).unwrap();
    for (length, entry) in [(1, 8), (8, 8), (9, 16), (100, 128), (1025, 2048), (2048, 2048)] {
        let buf = pool.acquire(AllocatorTag::Other, length).unwrap();
        assert_eq!(buf.capacity(), entry, "length {length}");
        assert_eq!(buf.limit(), length);
        assert!(buf.slice_descriptor().is_some());
    }
}

#[test]
fn test_released_entry_is_reused_first() {
    let pool = DirectBufferPool::new(PoolConfig::default()).unwrap();
    let first = pool.acquire(AllocatorTag::Other, 60).unwrap();
    let _second = pool.acquire(AllocatorTag::Other, 60).unwrap();
    let region = first.region();
    first.release();

    let again = pool.acquire(AllocatorTag::Other, 33).unwrap();
    assert_eq!(again.region(), region);
}

#[test]
fn test_exhausted_class_falls_back_to_unpooled() {
    let sink = Arc::new(CapturingSink::default());
    let pool = DirectBufferPool::builder(tiny_config(1))
        .with_alert_sink(sink.clone())
        .build()
        .unwrap();

    let held: Vec<_> = (0..4)
        .map(|_| pool.acquire(AllocatorTag::Message, 10).unwrap())
        .collect();
    assert!(held.iter().all(|b| b.is_pooled()));

    let overflow = pool.acquire(AllocatorTag::Message, 10).unwrap();
    assert!(!overflow.is_pooled());
    assert_eq!(overflow.capacity(), 10);
    assert!(overflow.slice_descriptor().is_none());

    let again = pool.acquire(AllocatorTag::Message, 12).unwrap();
    assert_eq!(again.capacity(), 12);

    let alerts = sink.alerts.lock().clone();
    assert_eq!(alerts.len(), 1, "warned once per class");
    assert_eq!(alerts[0].level, AlertLevel::Warning);
    assert!(!alerts[0].repeatable);
    assert!(class_stats(&pool, 16).exhausted);

    // unpooled buffers are freed, never pooled
    overflow.release();
    again.release();
    assert_eq!(class_stats(&pool, 16).free, 0);
    assert_eq!(pool.free_bytes(), 0);
}

#[test]
fn test_compaction_keeps_partially_used_chunks() {
    let pool = DirectBufferPool::new(tiny_config(2)).unwrap();
    let mut bufs: Vec<_> = (0..5)
        .map(|_| pool.acquire(AllocatorTag::Other, 16).unwrap())
        .collect();
    assert_eq!(
        bufs[4].slice_descriptor(),
        Some(SliceDescriptor { chunk: 1, slot: 0 })
    );

    let pinned = bufs.remove(0);
    drop(bufs);

    let report = pool.compact();
    assert_eq!(report.slice_chunks, 1);
    let stats = class_stats(&pool, 16);
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.free, 3);

    // lowest slot of the surviving chunk comes out first
    let next = pool.acquire(AllocatorTag::Other, 16).unwrap();
    assert_eq!(
        next.slice_descriptor(),
        Some(SliceDescriptor { chunk: 0, slot: 1 })
    );
    drop(pinned);
}

#[test]
fn test_reclaimed_chunk_slot_is_reused() {
    let pool = DirectBufferPool::new(tiny_config(1)).unwrap();
    let bufs: Vec<_> = (0..4)
        .map(|_| pool.acquire(AllocatorTag::Other, 16).unwrap())
        .collect();
    drop(bufs);
    assert_eq!(pool.compact().slice_chunks, 1);

    let buf = pool.acquire(AllocatorTag::Other, 16).unwrap();
    assert!(buf.is_pooled());
    assert_eq!(buf.slice_descriptor(), Some(SliceDescriptor { chunk: 0, slot: 0 }));
}

#[test]
fn test_chunk_limit_multiplier() {
    let cfg = PoolConfig {
        slice_limit_multiplier: 2,
        ..tiny_config(1)
    };
    let pool = DirectBufferPool::new(cfg).unwrap();
    let bufs: Vec<_> = (0..8)
        .map(|_| pool.acquire(AllocatorTag::Other, 16).unwrap())
        .collect();
    assert!(bufs.iter().all(|b| b.is_pooled()));
    assert_eq!(class_stats(&pool, 16).chunks, 2);
}

#[test]
fn test_allocator_requests_whole_chunks() {
    let slices = SliceAllocator::new(4096, &[8, 2048], &[1, 1]);
    let ids = RegionIds::default();
    let mut requested = Vec::new();

    let grant = slices
        .acquire(2000, &ids, |size| {
            requested.push(size);
            Ok(bytes::BytesMut::zeroed(size))
        })
        .unwrap();
    let entry = match grant {
        SliceGrant::Entry(entry) => entry,
        other => panic!("expected an entry, got {other:?}"),
    };
    assert_eq!(entry.capacity(), 2048);
    assert_eq!(requested, vec![4096]);

    // second entry of the chunk comes from the free list
    let grant = slices
        .acquire(2048, &ids, |_| panic!("no new chunk expected"))
        .unwrap();
    assert!(matches!(grant, SliceGrant::Entry(_)));

    let grant = slices
        .acquire(2048, &ids, |_| panic!("cap reached"))
        .unwrap();
    assert!(matches!(
        grant,
        SliceGrant::Exhausted {
            entry_size: 2048,
            first: true
        }
    ));

    slices.release(entry);
    assert_eq!(slices.stats()[1].free, 1);
    assert_eq!(slices.end_size(), 2048);
}

#[test]
fn test_chunk_count_tracks_peak_live_entries() {
    let pool = DirectBufferPool::new(PoolConfig::default()).unwrap();
    let per_chunk = class_stats(&pool, 16).entries_per_chunk;

    let mut live = Vec::new();
    let mut peak = 0usize;
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    for round in 0..2000 {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let roll = (seed >> 33) % 3;
        // alternate growing and shrinking phases
        let grow = (round / 400) % 2 == 0;
        let acquire = live.is_empty() || if grow { roll != 0 } else { roll == 0 };

        if acquire {
            live.push(pool.acquire(AllocatorTag::Other, 16).unwrap());
        } else {
            let victim = (seed >> 17) as usize % live.len();
            live.swap_remove(victim).release();
        }
        peak = peak.max(live.len());

        let chunks = class_stats(&pool, 16).chunks;
        assert!(
            chunks <= peak.div_ceil(per_chunk),
            "round {round}: {chunks} chunks for peak {peak}"
        );
    }

    drop(live);
    pool.compact();
    assert_eq!(class_stats(&pool, 16).chunks, 0);
}

#[test]
fn test_rejected_hand_out_returns_entry_to_its_chunk() {
    let mut cfg = tiny_config(1);
    cfg.diagnostics.track_handed_out = true;
    let pool = DirectBufferPool::new(cfg).unwrap();

    // the first entry of a fresh chunk takes region 1
    pool.diagnostics()
        .on_hand_out(RegionId::new(1), AllocatorTag::Other, 16)
        .unwrap();
    match pool.acquire(AllocatorTag::Other, 16) {
        Err(Error::DoubleHandOut { region }) => assert_eq!(region, RegionId::new(1)),
        other => panic!("expected double hand-out, got {other:?}"),
    }

    let stats = class_stats(&pool, 16);
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.free, 4);
    assert_eq!(pool.compact().slice_chunks, 1);
}
