//! Periodic timer interface.
//!
//! Compaction and usage printing are driven by an external timer. The pool
//! never spawns threads itself; the composition root decides which timer
//! implementation to hand in.

use std::time::Duration;

use crate::error::Result;

/// Work executed on every timer tick.
pub type PeriodicTask = Box<dyn FnMut() + Send + 'static>;

pub trait PeriodicScheduler: Send + Sync {
    /// Run `task` every `interval` until the scheduler is shut down.
    ///
    /// The first run happens one interval after registration.
    fn schedule_periodic(
        &self,
        name: &'static str,
        interval: Duration,
        task: PeriodicTask,
    ) -> Result<()>;
}
