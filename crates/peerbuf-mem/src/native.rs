//! Native allocation seam.
//!
//! Every region the pool hands out is allocated through a `NativeAllocator`.
//! Allocation is fallible: the size-class pool reacts to a failure by
//! dropping its free buffers, calling `collect`, and retrying once.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("native allocation of {requested} bytes failed")]
pub struct AllocError {
    pub requested: usize,
}

pub trait NativeAllocator: Send + Sync + 'static {
    /// Allocate a region of exactly `capacity` initialised bytes.
    fn allocate(&self, capacity: usize) -> Result<BytesMut, AllocError>;

    /// Hint that previously dropped regions should be handed back to the
    /// system now. Called after an allocation failure and after compaction.
    fn collect(&self) {}
}

/// Allocates from the global allocator without aborting on exhaustion.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl NativeAllocator for SystemAllocator {
    fn allocate(&self, capacity: usize) -> Result<BytesMut, AllocError> {
        let mut raw: Vec<u8> = Vec::new();
        raw.try_reserve_exact(capacity)
            .map_err(|_| AllocError { requested: capacity })?;
        raw.resize(capacity, 0);
        // Unique `Bytes` converts back without copying.
        Ok(BytesMut::from(Bytes::from(raw)))
    }
}
