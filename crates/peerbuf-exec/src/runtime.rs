//! Runtime: builds the pool and wires its periodic work to a timer.
//!
//! - Compaction runs every `compaction_interval` and is reported through
//!   `metrics::record_compaction`.
//! - With `diagnostics.print_interval_ms` set, the usage report is logged at
//!   that period.
//! - Periodic tasks hold only a weak pool reference; dropping the runtime
//!   stops them.

use thiserror::Error;

use peerbuf_core::config::PoolConfig;
use peerbuf_core::schedule::PeriodicScheduler;
use peerbuf_mem::{CompactionScheduler, DirectBufferPool};

use crate::metrics;
use crate::timer::ThreadTimer;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("pool: {0}")]
    Mem(#[from] peerbuf_mem::Error),
    #[error(transparent)]
    Core(#[from] peerbuf_core::Error),
    #[error("logging: {0}")]
    Logging(String),
}

/// Owns a pool together with the timer driving its maintenance.
pub struct BufferRuntime<S: PeriodicScheduler = ThreadTimer> {
    pool: DirectBufferPool,
    scheduler: S,
}

impl BufferRuntime<ThreadTimer> {
    /// Build a pool from `cfg` and start its maintenance threads.
    pub fn new(cfg: PoolConfig) -> Result<Self, ExecError> {
        let pool = DirectBufferPool::new(cfg)?;
        Self::with_pool(pool, ThreadTimer::new())
    }

    /// Configuration from `PEERBUF_*` environment variables.
    pub fn from_env() -> Result<Self, ExecError> {
        Self::new(PoolConfig::from_env())
    }
}

impl<S: PeriodicScheduler> BufferRuntime<S> {
    /// Attach maintenance for an existing pool to `scheduler`.
    pub fn with_pool(pool: DirectBufferPool, scheduler: S) -> Result<Self, ExecError> {
        let cfg = pool.config().clone();

        CompactionScheduler::new(&pool).register(
            &scheduler,
            cfg.compaction_interval(),
            metrics::record_compaction,
        )?;

        if let Some(interval) = cfg.print_interval() {
            let weak = pool.downgrade();
            scheduler.schedule_periodic(
                "peerbuf:usage",
                interval,
                Box::new(move || {
                    if let Some(pool) = weak.upgrade() {
                        metrics::record_usage(&pool.stats());
                        tracing::info!("{}", pool.describe(false));
                    }
                }),
            )?;
        }

        tracing::info!(
            max_size = pool.max_size(),
            compaction_interval_ms = cfg.compaction_interval_ms,
            print_interval_ms = cfg.diagnostics.print_interval_ms,
            "buffer runtime started"
        );
        Ok(Self { pool, scheduler })
    }

    pub fn pool(&self) -> &DirectBufferPool {
        &self.pool
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Stop the timer and hand back the pool.
    pub fn shutdown(self) -> DirectBufferPool {
        let Self { pool, scheduler } = self;
        drop(scheduler);
        tracing::info!("buffer runtime stopped");
        pool
    }
}
