#![forbid(unsafe_code)]
//! peerbuf-mem: pooled native buffers for network and disk I/O.
//!
//! Two tiers sit behind `DirectBufferPool`:
//! - `slice`: entries of 2KB or less carved from 4KB chunks,
//! - `size_class`: power-of-two free lists from 4KB up to 256MB, plus the
//!   disk block bucket.
//!
//! Every buffer is a `DirectBuffer` that owns its region exclusively and
//! gives it back when released or dropped. `CompactionScheduler` trims idle
//! memory periodically; `diagnostics` keeps the hand-out registry and the
//! usage report.

pub mod alert;
pub mod compaction;
pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod native;
pub mod pool;
pub mod shared;
pub mod size_class;
pub mod slice;
pub mod trace;
pub mod tracking;

pub use alert::TracingAlertSink;
pub use compaction::{CompactionReport, CompactionScheduler};
pub use error::{Error, Result};
pub use handle::{release_if_live, BufferFlags, DirectBuffer, RegionIds};
pub use native::{AllocError, NativeAllocator, SystemAllocator};
pub use pool::{DirectBufferPool, PoolBuilder, PoolStats, WeakPool};
pub use shared::SharedBuffer;
pub use size_class::{retention_factor, ClassCompaction, SizeClassPool};
pub use slice::{SliceAllocator, SliceDescriptor, SliceGrant};
pub use tracking::UsageSnapshot;
