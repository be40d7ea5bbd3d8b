#![forbid(unsafe_code)]
//! peerbuf-exec: composition root for the buffer pool.
//!
//! Builds a `DirectBufferPool`, drives its compaction and usage reporting
//! from a periodic timer, and sets up logging.

pub mod logging;
pub mod metrics;
pub mod runtime;
pub mod timer;

pub use logging::init_tracing;
pub use runtime::{BufferRuntime, ExecError};
pub use timer::ThreadTimer;

#[cfg(feature = "async-timer")]
pub use timer::TokioTimer;
