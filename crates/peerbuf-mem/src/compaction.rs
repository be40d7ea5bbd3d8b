//! Periodic compaction of both allocator tiers.

use std::time::Duration;

use peerbuf_core::schedule::PeriodicScheduler;
use serde::Serialize;

use crate::error::Result;
use crate::pool::{DirectBufferPool, WeakPool};
use crate::size_class::ClassCompaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompactionReport {
    pub classes: ClassCompaction,
    /// Slice chunks handed back to the system.
    pub slice_chunks: usize,
}

/// Runs `compact()` on a pool it does not keep alive.
#[derive(Debug, Clone)]
pub struct CompactionScheduler {
    pool: WeakPool,
}

impl CompactionScheduler {
    pub fn new(pool: &DirectBufferPool) -> Self {
        Self {
            pool: pool.downgrade(),
        }
    }

    /// One pass; `None` once the pool has been dropped.
    pub fn tick(&self) -> Option<CompactionReport> {
        let pool = self.pool.upgrade()?;
        let report = pool.compact();
        tracing::trace!(
            free_before = report.classes.free_before,
            free_after = report.classes.free_after,
            dropped = report.classes.dropped,
            slice_chunks = report.slice_chunks,
            "compaction tick"
        );
        Some(report)
    }

    /// Install the tick on `scheduler`, first firing one `interval` from now.
    ///
    /// `on_report` sees the outcome of every pass that ran.
    pub fn register<F>(
        self,
        scheduler: &dyn PeriodicScheduler,
        interval: Duration,
        mut on_report: F,
    ) -> Result<()>
    where
        F: FnMut(&CompactionReport) + Send + 'static,
    {
        scheduler.schedule_periodic(
            "peerbuf:compact",
            interval,
            Box::new(move || {
                if let Some(report) = self.tick() {
                    on_report(&report);
                }
            }),
        )?;
        Ok(())
    }
}
