//! Size-class tier: one free list per fixed capacity.
//!
//! Classes are the powers of two between `2^min_class_power` and
//! `2^max_class_power` plus any extra buckets (the disk block size plus
//! header room by default). A request is served by the smallest class that
//! fits, and every region on a class's free list has exactly that class's
//! capacity.
//!
//! Native allocation happens outside the class lock. Two threads missing on
//! the same class at once each allocate a region; both end up on the free
//! list when released and compaction trims the surplus.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use peerbuf_core::config::PoolConfig;
use peerbuf_core::id::RegionId;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::handle::RegionIds;
use crate::native::NativeAllocator;

/// A free region parked on a class list.
#[derive(Debug)]
pub struct PooledRegion {
    region: RegionId,
    storage: BytesMut,
}

impl PooledRegion {
    pub fn new(region: RegionId, storage: BytesMut) -> Self {
        Self { region, storage }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn into_parts(self) -> (RegionId, BytesMut) {
        (self.region, self.storage)
    }
}

struct SizeClass {
    size: usize,
    free: Mutex<Vec<PooledRegion>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassStats {
    pub size: usize,
    pub free: usize,
}

/// Outcome of one size-class compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClassCompaction {
    pub free_before: usize,
    pub free_after: usize,
    pub dropped: usize,
}

/// Fraction of each free list kept by compaction.
///
/// Above `max_free` the pool shrinks to half of `max_free`; below it the
/// factor slides from 1.0 (empty) to 0.5 (at the limit).
pub fn retention_factor(free: usize, max_free: usize) -> f64 {
    let free = free as f64;
    let max = max_free as f64;
    if free > max {
        0.5 * max / free
    } else {
        1.0 - 0.5 * free / max
    }
}

pub struct SizeClassPool {
    classes: Vec<SizeClass>,
    native: Arc<dyn NativeAllocator>,
    explicit_gc: bool,
}

impl SizeClassPool {
    /// `sizes` must be ascending and free of duplicates.
    pub fn new(sizes: &[usize], native: Arc<dyn NativeAllocator>, explicit_gc: bool) -> Self {
        let classes = sizes
            .iter()
            .map(|&size| SizeClass {
                size,
                free: Mutex::new(Vec::new()),
            })
            .collect();
        Self {
            classes,
            native,
            explicit_gc,
        }
    }

    pub fn from_config(cfg: &PoolConfig, native: Arc<dyn NativeAllocator>) -> Self {
        Self::new(&cfg.size_classes(), native, cfg.explicit_gc)
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.classes.iter().map(|c| c.size).collect()
    }

    pub fn largest(&self) -> usize {
        self.classes.last().map(|c| c.size).unwrap_or(0)
    }

    /// Capacity of the smallest class holding `length` bytes.
    pub fn class_for(&self, length: usize) -> Option<usize> {
        self.index_for(length).map(|i| self.classes[i].size)
    }

    fn index_for(&self, length: usize) -> Option<usize> {
        let i = self.classes.partition_point(|c| c.size < length);
        (i < self.classes.len()).then_some(i)
    }

    /// Pop a free region of the fitting class, or allocate a new one.
    pub fn acquire(&self, length: usize, ids: &RegionIds) -> Result<PooledRegion> {
        let Some(index) = self.index_for(length) else {
            return Err(Error::InvalidRequest {
                length,
                max: self.largest(),
            });
        };
        let class = &self.classes[index];

        if let Some(region) = class.free.lock().pop() {
            tracing::trace!(size = class.size, region = %region.region, "size class hit");
            return Ok(region);
        }

        let storage = self.allocate_native(class.size)?;
        let region = ids.next();
        tracing::trace!(size = class.size, %region, "size class miss; allocated");
        Ok(PooledRegion::new(region, storage))
    }

    /// Park a region on the list matching its exact capacity.
    ///
    /// On error the region has already been dropped.
    pub fn release(&self, region: PooledRegion) -> Result<()> {
        let capacity = region.capacity();
        match self.classes.binary_search_by_key(&capacity, |c| c.size) {
            Ok(i) => {
                self.classes[i].free.lock().push(region);
                Ok(())
            }
            Err(_) => Err(Error::Configuration { capacity }),
        }
    }

    /// Allocate `capacity` bytes, retrying once after emptying every free list.
    pub fn allocate_native(&self, capacity: usize) -> Result<BytesMut> {
        match self.native.allocate(capacity) {
            Ok(storage) => Ok(storage),
            Err(err) => {
                let dropped = self.clear();
                tracing::warn!(
                    requested = capacity,
                    dropped,
                    error = %err,
                    "native allocation failed; released pooled buffers and retrying"
                );
                if self.explicit_gc {
                    self.native.collect();
                }
                self.native
                    .allocate(capacity)
                    .map_err(|_| Error::OutOfMemory {
                        requested: capacity,
                    })
            }
        }
    }

    /// Drop every free region. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        for class in &self.classes {
            let drained = std::mem::take(&mut *class.free.lock());
            dropped += drained.len();
        }
        dropped
    }

    /// Total bytes parked on the free lists.
    pub fn free_bytes(&self) -> usize {
        self.classes
            .iter()
            .map(|c| c.size * c.free.lock().len())
            .sum()
    }

    pub fn free_count(&self) -> usize {
        self.classes.iter().map(|c| c.free.lock().len()).sum()
    }

    /// Shrink the free lists under `max_free` pressure; no-op below `min_free`.
    pub fn compact(&self, min_free: usize, max_free: usize) -> ClassCompaction {
        let free_before = self.free_bytes();
        if free_before < min_free {
            return ClassCompaction {
                free_before,
                free_after: free_before,
                dropped: 0,
            };
        }

        let keep = retention_factor(free_before, max_free);
        let mut dropped = 0;
        for class in self.classes.iter().rev() {
            let surplus = {
                let mut free = class.free.lock();
                // floor, so lists can reach zero
                let len = free.len();
                let target = (len as f64 * keep) as usize;
                free.split_off(target.min(len))
            };
            dropped += surplus.len();
        }

        if self.explicit_gc {
            self.native.collect();
        }

        let free_after = self.free_bytes();
        tracing::debug!(
            free_before,
            free_after,
            dropped,
            keep,
            "size classes compacted"
        );
        ClassCompaction {
            free_before,
            free_after,
            dropped,
        }
    }

    pub fn stats(&self) -> Vec<ClassStats> {
        self.classes
            .iter()
            .map(|c| ClassStats {
                size: c.size,
                free: c.free.lock().len(),
            })
            .collect()
    }
}
