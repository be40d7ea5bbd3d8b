//! Slice tier: small buffers carved out of fixed-size chunks.
//!
//! Each entry-size class owns up to `cap` chunks. A chunk is allocated whole
//! and split into `chunk_size / entry_size` entries that share its memory;
//! the chunk goes back to the system once every one of its entries has been
//! dropped. Allocation and release both work at the head of the free list,
//! so idle entries sink to the tail where compaction can find whole chunks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::BytesMut;
use parking_lot::Mutex;
use peerbuf_core::config::PoolConfig;
use peerbuf_core::id::RegionId;
use serde::Serialize;

use crate::error::Result;
use crate::handle::RegionIds;

/// Position of an entry: which chunk slot, and which entry within the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SliceDescriptor {
    pub chunk: u32,
    pub slot: u32,
}

#[derive(Debug)]
pub struct SliceEntry {
    region: RegionId,
    descriptor: SliceDescriptor,
    storage: BytesMut,
}

impl SliceEntry {
    pub(crate) fn new(region: RegionId, descriptor: SliceDescriptor, storage: BytesMut) -> Self {
        Self {
            region,
            descriptor,
            storage,
        }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn descriptor(&self) -> SliceDescriptor {
        self.descriptor
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub(crate) fn into_parts(self) -> (RegionId, SliceDescriptor, BytesMut) {
        (self.region, self.descriptor, self.storage)
    }
}

/// Result of a slice request.
#[derive(Debug)]
pub enum SliceGrant {
    Entry(SliceEntry),
    /// Every chunk slot of the class is in use. `first` is set only on the
    /// first exhaustion of the class.
    Exhausted { entry_size: usize, first: bool },
}

#[derive(Default)]
struct ClassState {
    free: Vec<SliceEntry>,
    // one flag per chunk slot; true while the chunk is allocated
    chunks: Vec<bool>,
}

struct SliceClass {
    entry_size: usize,
    entries_per_chunk: usize,
    state: Mutex<ClassState>,
    exhausted: AtomicBool,
    use_count: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SliceClassStats {
    pub entry_size: usize,
    pub entries_per_chunk: usize,
    pub free: usize,
    pub chunks: usize,
    pub allocated_entries: usize,
    pub use_count: u64,
    pub exhausted: bool,
}

pub struct SliceAllocator {
    chunk_size: usize,
    classes: Vec<SliceClass>,
}

impl SliceAllocator {
    /// `entry_sizes` ascending, each at most `chunk_size`; `caps` are chunk
    /// slots per class.
    pub fn new(chunk_size: usize, entry_sizes: &[usize], caps: &[usize]) -> Self {
        let classes = entry_sizes
            .iter()
            .zip(caps)
            .map(|(&entry_size, &cap)| SliceClass {
                entry_size,
                entries_per_chunk: (chunk_size / entry_size).max(1),
                state: Mutex::new(ClassState {
                    free: Vec::new(),
                    chunks: vec![false; cap],
                }),
                exhausted: AtomicBool::new(false),
                use_count: AtomicU64::new(0),
            })
            .collect();
        Self {
            chunk_size,
            classes,
        }
    }

    pub fn from_config(cfg: &PoolConfig) -> Self {
        Self::new(
            cfg.slice_chunk_size,
            &cfg.slice_entry_sizes,
            &cfg.slice_chunk_caps(),
        )
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Largest request this tier serves; 0 when it has no classes.
    pub fn end_size(&self) -> usize {
        self.classes.last().map(|c| c.entry_size).unwrap_or(0)
    }

    pub fn entry_sizes(&self) -> Vec<usize> {
        self.classes.iter().map(|c| c.entry_size).collect()
    }

    fn class_index(&self, length: usize) -> Option<usize> {
        let i = self.classes.partition_point(|c| c.entry_size < length);
        (i < self.classes.len()).then_some(i)
    }

    /// Entry size serving `length`, if this tier serves it.
    pub fn entry_size_for(&self, length: usize) -> Option<usize> {
        self.class_index(length).map(|i| self.classes[i].entry_size)
    }

    /// Take an entry of the smallest class holding `length` bytes.
    ///
    /// `allocate` provides the memory for a new chunk. `length` must be at
    /// most `end_size()`.
    pub fn acquire<F>(&self, length: usize, ids: &RegionIds, allocate: F) -> Result<SliceGrant>
    where
        F: FnOnce(usize) -> Result<BytesMut>,
    {
        let Some(index) = self.class_index(length) else {
            return Ok(SliceGrant::Exhausted {
                entry_size: length,
                first: false,
            });
        };
        let class = &self.classes[index];
        let mut state = class.state.lock();

        if let Some(entry) = state.free.pop() {
            class.use_count.fetch_add(1, Ordering::Relaxed);
            return Ok(SliceGrant::Entry(entry));
        }

        let Some(chunk) = state.chunks.iter().position(|used| !used) else {
            let first = !class.exhausted.swap(true, Ordering::Relaxed);
            return Ok(SliceGrant::Exhausted {
                entry_size: class.entry_size,
                first,
            });
        };

        let mut memory = allocate(class.entry_size * class.entries_per_chunk)?;
        state.chunks[chunk] = true;

        let mut entries = Vec::with_capacity(class.entries_per_chunk);
        for slot in 0..class.entries_per_chunk {
            let storage = memory.split_to(class.entry_size);
            entries.push(SliceEntry::new(
                ids.next(),
                SliceDescriptor {
                    chunk: chunk as u32,
                    slot: slot as u32,
                },
                storage,
            ));
        }
        // slot 0 goes out; slot 1 becomes the new head
        let mut entries = entries.into_iter();
        let granted = entries.next();
        state.free.extend(entries.rev());

        tracing::debug!(
            entry_size = class.entry_size,
            chunk,
            entries = class.entries_per_chunk,
            "slice chunk allocated"
        );

        match granted {
            Some(entry) => {
                class.use_count.fetch_add(1, Ordering::Relaxed);
                Ok(SliceGrant::Entry(entry))
            }
            None => Ok(SliceGrant::Exhausted {
                entry_size: class.entry_size,
                first: false,
            }),
        }
    }

    /// Push an entry back onto the head of its class's free list.
    pub fn release(&self, entry: SliceEntry) {
        match self.class_index(entry.capacity()) {
            Some(i) if self.classes[i].entry_size == entry.capacity() => {
                self.classes[i].state.lock().free.push(entry);
            }
            _ => {
                tracing::error!(
                    capacity = entry.capacity(),
                    region = %entry.region,
                    "slice entry does not match any class; dropping"
                );
            }
        }
    }

    /// Free every chunk whose entries are all on the free list. Returns the
    /// number of chunks reclaimed.
    pub fn compact(&self) -> usize {
        let mut reclaimed = 0;
        for class in &self.classes {
            let dropped = {
                let mut state = class.state.lock();
                if state.free.len() < class.entries_per_chunk {
                    continue;
                }
                // descending, so pops from the end reuse the lowest chunks first
                state.free.sort_unstable_by(|a, b| b.descriptor.cmp(&a.descriptor));

                let mut idle = Vec::new();
                let mut run_chunk = None;
                let mut run_len = 0;
                for entry in &state.free {
                    if run_chunk == Some(entry.descriptor.chunk) {
                        run_len += 1;
                    } else {
                        run_chunk = Some(entry.descriptor.chunk);
                        run_len = 1;
                    }
                    if run_len == class.entries_per_chunk {
                        idle.push(entry.descriptor.chunk);
                    }
                }
                if idle.is_empty() {
                    continue;
                }

                for &chunk in &idle {
                    if let Some(used) = state.chunks.get_mut(chunk as usize) {
                        *used = false;
                    }
                }
                let ClassState { free, .. } = &mut *state;
                let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(free)
                    .into_iter()
                    .partition(|e| idle.contains(&e.descriptor.chunk));
                *free = kept;
                reclaimed += idle.len();

                tracing::debug!(
                    entry_size = class.entry_size,
                    chunks = idle.len(),
                    "slice chunks reclaimed"
                );
                dropped
            };
            drop(dropped);
        }
        reclaimed
    }

    pub fn stats(&self) -> Vec<SliceClassStats> {
        self.classes
            .iter()
            .map(|class| {
                let state = class.state.lock();
                let chunks = state.chunks.iter().filter(|used| **used).count();
                SliceClassStats {
                    entry_size: class.entry_size,
                    entries_per_chunk: class.entries_per_chunk,
                    free: state.free.len(),
                    chunks,
                    allocated_entries: chunks * class.entries_per_chunk,
                    use_count: class.use_count.load(Ordering::Relaxed),
                    exhausted: class.exhausted.load(Ordering::Relaxed),
                }
            })
            .collect()
    }
}
