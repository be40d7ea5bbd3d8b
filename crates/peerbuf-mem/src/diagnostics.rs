//! Hand-out bookkeeping and the usage report.
//!
//! Byte counters are always maintained. The region registry is only kept
//! when `track_handed_out` is on; it catches a region being handed out
//! while already live and returns of regions that were never handed out.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use peerbuf_core::id::RegionId;
use peerbuf_core::tag::AllocatorTag;

use crate::error::{Error, Result};
use crate::size_class::ClassStats;
use crate::slice::SliceClassStats;
use crate::tracking::{UsageCounters, UsageSnapshot};

const MB: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandedOut {
    pub tag: AllocatorTag,
    pub capacity: usize,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    track: bool,
    handed_out: Mutex<HashMap<RegionId, HandedOut>>,
    counters: UsageCounters,
    unmatched_returns: AtomicU64,
}

impl Diagnostics {
    pub fn new(track: bool) -> Self {
        Self {
            track,
            ..Self::default()
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.track
    }

    /// Register a region leaving the pool.
    pub fn on_hand_out(&self, region: RegionId, tag: AllocatorTag, capacity: usize) -> Result<()> {
        if self.track {
            let mut registry = self.handed_out.lock();
            if let Some(previous) = registry.get(&region) {
                tracing::error!(
                    %region,
                    tag = %tag,
                    previous_tag = %previous.tag,
                    capacity,
                    "buffer handed out twice"
                );
                return Err(Error::DoubleHandOut { region });
            }
            registry.insert(region, HandedOut { tag, capacity });
        }
        self.counters.record_given(capacity);
        Ok(())
    }

    /// Register a region coming back.
    pub fn on_return(&self, region: RegionId, capacity: usize) {
        self.counters.record_returned(capacity);
        if self.track && self.handed_out.lock().remove(&region).is_none() {
            self.unmatched_returns.fetch_add(1, Ordering::Relaxed);
            tracing::error!(%region, capacity, "buffer not handed out");
        }
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.counters.snapshot()
    }

    pub fn unmatched_returns(&self) -> u64 {
        self.unmatched_returns.load(Ordering::Relaxed)
    }

    pub fn handed_out_count(&self) -> usize {
        self.handed_out.lock().len()
    }

    pub fn is_handed_out(&self, region: RegionId) -> bool {
        self.handed_out.lock().contains_key(&region)
    }

    /// Live buffer count per capacity. Empty unless tracking.
    pub fn capacity_histogram(&self) -> BTreeMap<usize, usize> {
        let mut out = BTreeMap::new();
        for entry in self.handed_out.lock().values() {
            *out.entry(entry.capacity).or_insert(0) += 1;
        }
        out
    }

    /// Live buffer count per allocator tag. Empty unless tracking.
    pub fn tag_histogram(&self) -> BTreeMap<AllocatorTag, usize> {
        let mut out = BTreeMap::new();
        for entry in self.handed_out.lock().values() {
            *out.entry(entry.tag).or_insert(0) += 1;
        }
        out
    }

    fn live_regions(&self) -> Vec<(RegionId, HandedOut)> {
        let mut regions: Vec<_> = self
            .handed_out
            .lock()
            .iter()
            .map(|(id, h)| (*id, *h))
            .collect();
        regions.sort_unstable_by_key(|(id, _)| *id);
        regions
    }

    /// Multi-line usage report.
    pub fn report(
        &self,
        free_bytes: usize,
        classes: &[ClassStats],
        slices: &[SliceClassStats],
        verbose: bool,
    ) -> String {
        let usage = self.usage();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "DIRECT: given={}MB, returned={}MB, in use={}, free={}, peak={}",
            usage.given / MB,
            usage.returned / MB,
            byte_amount(usage.in_use),
            byte_amount(free_bytes),
            byte_amount(usage.peak_in_use),
        );

        let caps: Vec<String> = self
            .capacity_histogram()
            .into_iter()
            .map(|(cap, n)| format!("[{} x {n}]", capacity_label(cap)))
            .collect();
        let _ = writeln!(out, "{}", caps.join(" "));

        let tags: Vec<String> = self
            .tag_histogram()
            .into_iter()
            .map(|(tag, n)| format!("[{tag} x {n}]"))
            .collect();
        let _ = writeln!(out, "{}", tags.join(" "));

        let _ = writeln!(out, "slices: {}", slice_summary(slices));
        let _ = writeln!(out, "free block sizes: {}", free_footprint(classes));

        let slice_bytes: usize = slices
            .iter()
            .map(|s| s.allocated_entries * s.entry_size)
            .sum();
        let _ = writeln!(
            out,
            "native: resident~{} (in use {}, free {}, slice chunks {})",
            byte_amount(usage.in_use + free_bytes + slice_bytes),
            byte_amount(usage.in_use),
            byte_amount(free_bytes),
            byte_amount(slice_bytes),
        );

        if self.unmatched_returns() > 0 {
            let _ = writeln!(out, "unmatched returns: {}", self.unmatched_returns());
        }

        if verbose {
            for (region, held) in self.live_regions() {
                let _ = writeln!(out, "  {region} {} {}", held.tag, held.capacity);
            }
        }
        out
    }
}

/// `[8]f=..,a=..,u=..` per slice class, comma separated.
pub fn slice_summary(slices: &[SliceClassStats]) -> String {
    slices
        .iter()
        .map(|s| {
            format!(
                "[{}]f={},a={},u={}",
                s.entry_size, s.free, s.allocated_entries, s.use_count
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// `[blocksize:footprint]` for every class with free regions.
pub fn free_footprint(classes: &[ClassStats]) -> String {
    classes
        .iter()
        .filter(|c| c.free > 0)
        .map(|c| format!("[{}:{}]", scaled(c.size), scaled(c.size * c.free)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `512` below 1KB, `16K` above.
pub fn capacity_label(capacity: usize) -> String {
    if capacity < 1024 {
        capacity.to_string()
    } else {
        format!("{}K", capacity / 1024)
    }
}

fn byte_amount(n: usize) -> String {
    if n < MB {
        format!("{n}B")
    } else {
        format!("{}MB", n / MB)
    }
}

fn scaled(n: usize) -> String {
    if n > MB {
        format!("{}M", n / MB)
    } else if n > 1024 {
        format!("{}k", n / 1024)
    } else {
        n.to_string()
    }
}
