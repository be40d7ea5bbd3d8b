//! Convenient re-exports for downstream crates.

pub use crate::alert::{Alert, AlertLevel, AlertSink};
pub use crate::config::{DiagnosticsConfig, PoolConfig, DISK_BLOCK_SIZE};
pub use crate::error::{Error, Result};
pub use crate::id::RegionId;
pub use crate::schedule::{PeriodicScheduler, PeriodicTask};
pub use crate::tag::{AllocatorTag, Operation, Subsystem};
