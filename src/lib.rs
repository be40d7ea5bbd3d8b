#![forbid(unsafe_code)]
//! peerbuf: pooled direct buffers for a BitTorrent client runtime.
//!
//! Facade over the workspace crates:
//! - `peerbuf-core`: configuration, ids, allocator tags, collaborator traits
//! - `peerbuf-mem`: the buffer pool and its handles
//! - `peerbuf-exec`: timers, periodic maintenance, logging setup

pub use peerbuf_core;
pub use peerbuf_exec;
pub use peerbuf_mem;

pub use peerbuf_core::config::PoolConfig;
pub use peerbuf_core::tag::AllocatorTag;
pub use peerbuf_exec::BufferRuntime;
pub use peerbuf_mem::{DirectBuffer, DirectBufferPool, SharedBuffer};
