//! Periodic timers.
//!
//! `ThreadTimer` runs each task on its own named thread and is always
//! available. With the `async-timer` feature, `TokioTimer` drives tasks from
//! an existing tokio runtime instead.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use peerbuf_core::schedule::{PeriodicScheduler, PeriodicTask};
use peerbuf_core::{Error, Result};

#[cfg(feature = "async-timer")]
pub use async_impl::TokioTimer;

struct Worker {
    name: &'static str,
    // dropping the sender wakes the worker and stops it
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// One thread per registered task.
#[derive(Default)]
pub struct ThreadTimer {
    workers: Mutex<Vec<Worker>>,
}

impl ThreadTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Stop every task and wait for its thread. A tick in progress finishes first.
    pub fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            drop(worker.stop);
            if worker.handle.join().is_err() {
                tracing::warn!(task = worker.name, "periodic task panicked");
            }
        }
    }
}

impl PeriodicScheduler for ThreadTimer {
    fn schedule_periodic(
        &self,
        name: &'static str,
        interval: Duration,
        mut task: PeriodicTask,
    ) -> Result<()> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => task(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| Error::Scheduler(format!("spawning '{name}': {e}")))?;

        tracing::debug!(
            task = name,
            interval_ms = interval.as_millis() as u64,
            "periodic task started"
        );
        self.workers.lock().push(Worker { name, stop, handle });
        Ok(())
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(feature = "async-timer")]
mod async_impl {
    use std::time::Duration;

    use parking_lot::Mutex;
    use peerbuf_core::schedule::{PeriodicScheduler, PeriodicTask};
    use peerbuf_core::Result;
    use tokio::runtime::Handle;
    use tokio::task::JoinHandle;
    use tokio::time::{self, Instant, MissedTickBehavior};

    /// Spawns each task onto a tokio runtime; tasks are aborted on drop.
    pub struct TokioTimer {
        runtime: Handle,
        tasks: Mutex<Vec<JoinHandle<()>>>,
    }

    impl TokioTimer {
        pub fn new(runtime: Handle) -> Self {
            Self {
                runtime,
                tasks: Mutex::new(Vec::new()),
            }
        }

        /// Bind to the runtime of the calling context.
        ///
        /// Panics when called outside a tokio runtime.
        pub fn current() -> Self {
            Self::new(Handle::current())
        }

        pub fn shutdown(&self) {
            for task in self.tasks.lock().drain(..) {
                task.abort();
            }
        }
    }

    impl PeriodicScheduler for TokioTimer {
        fn schedule_periodic(
            &self,
            name: &'static str,
            interval: Duration,
            mut task: PeriodicTask,
        ) -> Result<()> {
            let handle = self.runtime.spawn(async move {
                let mut ticker = time::interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    task();
                }
            });
            tracing::debug!(
                task = name,
                interval_ms = interval.as_millis() as u64,
                "periodic task spawned"
            );
            self.tasks.lock().push(handle);
            Ok(())
        }
    }

    impl Drop for TokioTimer {
        fn drop(&mut self) {
            self.shutdown();
        }
    }
}

#[cfg(all(test, feature = "async-timer"))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use peerbuf_core::schedule::PeriodicScheduler;

    use super::TokioTimer;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tokio_timer_ticks_until_shutdown() {
        let timer = TokioTimer::current();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        timer
            .schedule_periodic(
                "test:tick",
                Duration::from_millis(5),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        for _ in 0..200 {
            if ticks.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(ticks.load(Ordering::SeqCst) >= 2);

        timer.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after);
    }
}
