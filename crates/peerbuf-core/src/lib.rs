#![forbid(unsafe_code)]
//! peerbuf-core: shared vocabulary for the direct-buffer allocator.
//!
//! Only types and traits live here: configuration, error, region ids,
//! allocator tags, and the interfaces of the collaborators the pool talks to
//! (periodic timer, alert sink). The allocator itself lives in `peerbuf-mem`.

pub mod alert;
pub mod config;
pub mod error;
pub mod id;
pub mod prelude;
pub mod schedule;
pub mod tag;

pub use error::{Error, Result};
