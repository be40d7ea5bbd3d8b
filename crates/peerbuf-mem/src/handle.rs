//! `DirectBuffer`: the caller-facing ownership token for one native region.
//!
//! A handle owns its region exclusively. Releasing consumes the handle, and
//! dropping it releases as well, so a region can be neither returned twice
//! nor used after it went back to the pool. Cursors follow NIO buffer
//! semantics: `0 <= position <= limit <= capacity`.

use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use bytes::{Buf, BytesMut};
use peerbuf_core::id::RegionId;
use peerbuf_core::tag::{AllocatorTag, Operation, Subsystem};

use crate::error::{Error, Result};
use crate::pool::PoolShared;
use crate::shared::SharedBuffer;
use crate::slice::SliceDescriptor;
use crate::trace::UsageTrace;

/// Buffer attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferFlags(u8);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    /// Contents are short-lived and must not be cached by the consumer.
    pub const CONTAINS_TRANSIENT_DATA: BufferFlags = BufferFlags(0x01);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: BufferFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: BufferFlags) {
        self.0 &= !other.0;
    }
}

/// Mints process-unique region ids; 0 is reserved for detached buffers.
#[derive(Debug)]
pub struct RegionIds {
    next: AtomicU64,
}

impl Default for RegionIds {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl RegionIds {
    pub fn next(&self) -> RegionId {
        RegionId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a region goes when its handle is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegionKind {
    /// Back onto the size-class free list with the same capacity.
    Class,
    /// Back onto the slice free list of its chunk.
    Slice(SliceDescriptor),
    /// Straight back to the system; never pooled.
    Unpooled,
}

/// A region on its way back to the pool.
pub(crate) struct ReturnedRegion {
    pub(crate) region: RegionId,
    pub(crate) kind: RegionKind,
    pub(crate) storage: BytesMut,
}

pub struct DirectBuffer {
    region: RegionId,
    tag: AllocatorTag,
    flags: BufferFlags,
    subsystem: Subsystem,
    // Length always equals capacity; the readable window is [position, limit).
    storage: BytesMut,
    position: usize,
    limit: usize,
    kind: RegionKind,
    pool: Option<Weak<PoolShared>>,
    trace: Option<UsageTrace>,
}

impl DirectBuffer {
    pub(crate) fn pooled(
        region: RegionId,
        storage: BytesMut,
        kind: RegionKind,
        pool: Weak<PoolShared>,
        tag: AllocatorTag,
        length: usize,
        trace_depth: Option<usize>,
    ) -> Self {
        let limit = length.min(storage.len());
        Self {
            region,
            tag,
            flags: BufferFlags::NONE,
            subsystem: tag.subsystem(),
            storage,
            position: 0,
            limit,
            kind,
            pool: Some(pool),
            trace: trace_depth.map(UsageTrace::new),
        }
    }

    /// Wrap memory that did not come from a pool. Released straight to the system.
    pub fn wrap(tag: AllocatorTag, storage: BytesMut) -> Self {
        let limit = storage.len();
        Self {
            region: RegionId::DETACHED,
            tag,
            flags: BufferFlags::NONE,
            subsystem: tag.subsystem(),
            storage,
            position: 0,
            limit,
            kind: RegionKind::Unpooled,
            pool: None,
            trace: None,
        }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn tag(&self) -> AllocatorTag {
        self.tag
    }

    /// Re-attribute the buffer, e.g. when a cache read is handed to the network layer.
    pub fn set_tag(&mut self, tag: AllocatorTag) {
        self.record(Operation::Retag);
        self.tag = tag;
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: BufferFlags) {
        self.flags.insert(flag);
    }

    pub fn clear_flag(&mut self, flag: BufferFlags) {
        self.flags.remove(flag);
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// Record that another layer now operates on the buffer.
    pub fn set_subsystem(&mut self, subsystem: Subsystem) {
        self.subsystem = subsystem;
        self.record(Operation::Handover);
    }

    pub fn slice_descriptor(&self) -> Option<SliceDescriptor> {
        match self.kind {
            RegionKind::Slice(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// Whether release returns the region to a free list.
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some() && self.kind != RegionKind::Unpooled
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    pub fn set_position(&mut self, position: usize) -> Result<()> {
        self.record(Operation::SetPosition);
        if position > self.limit {
            return Err(self.bounds(Operation::SetPosition, position));
        }
        self.position = position;
        Ok(())
    }

    /// Set the limit; the position is clamped to it.
    pub fn set_limit(&mut self, limit: usize) -> Result<()> {
        self.record(Operation::SetLimit);
        if limit > self.capacity() {
            return Err(self.bounds(Operation::SetLimit, limit));
        }
        self.limit = limit;
        self.position = self.position.min(limit);
        Ok(())
    }

    /// Position to zero, limit to capacity. Contents are left untouched.
    pub fn clear(&mut self) {
        self.record(Operation::Clear);
        self.position = 0;
        self.limit = self.capacity();
    }

    pub fn flip(&mut self) {
        self.record(Operation::Flip);
        self.limit = self.position;
        self.position = 0;
    }

    pub fn rewind(&mut self) {
        self.record(Operation::Rewind);
        self.position = 0;
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put_slice_as(Operation::PutU8, &[value])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.put_slice_as(Operation::PutU16, &value.to_be_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put_slice_as(Operation::PutU32, &value.to_be_bytes())
    }

    pub fn put_slice(&mut self, src: &[u8]) -> Result<()> {
        self.put_slice_as(Operation::PutBytes, src)
    }

    /// Move all of `src`'s remaining bytes into this buffer.
    pub fn put_buffer(&mut self, src: &mut DirectBuffer) -> Result<()> {
        let n = src.remaining();
        let start = self.advance_checked(Operation::PutBuffer, n)?;
        self.storage[start..start + n].copy_from_slice(src.chunk());
        src.record(Operation::GetBytes);
        src.position = src.limit;
        Ok(())
    }

    /// Absolute write; the position is not moved.
    pub fn put_u8_at(&mut self, index: usize, value: u8) -> Result<()> {
        self.record(Operation::PutAt);
        if index >= self.limit {
            return Err(self.bounds(Operation::PutAt, index));
        }
        self.storage[index] = value;
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        let mut out = [0u8; 1];
        self.get_slice_as(Operation::GetU8, &mut out)?;
        Ok(out[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let mut out = [0u8; 2];
        self.get_slice_as(Operation::GetU16, &mut out)?;
        Ok(u16::from_be_bytes(out))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let mut out = [0u8; 4];
        self.get_slice_as(Operation::GetU32, &mut out)?;
        Ok(u32::from_be_bytes(out))
    }

    /// Fill `dst` completely from the remaining bytes.
    pub fn get_slice(&mut self, dst: &mut [u8]) -> Result<()> {
        self.get_slice_as(Operation::GetBytes, dst)
    }

    /// Absolute read; the position is not moved.
    pub fn get_u8_at(&mut self, index: usize) -> Result<u8> {
        self.record(Operation::GetAt);
        if index >= self.limit {
            return Err(self.bounds(Operation::GetAt, index));
        }
        Ok(self.storage[index])
    }

    /// Read once from `src` into `[position, limit)`, advancing by the count read.
    pub fn read_from<R: Read + ?Sized>(&mut self, src: &mut R) -> Result<usize> {
        self.record(Operation::ReadStream);
        let (position, limit) = (self.position, self.limit);
        let n = src.read(&mut self.storage[position..limit])?;
        self.position += n.min(limit - position);
        Ok(n)
    }

    /// Write once from `[position, limit)` to `dst`, advancing by the count written.
    pub fn write_to<W: Write + ?Sized>(&mut self, dst: &mut W) -> Result<usize> {
        self.record(Operation::WriteStream);
        let n = dst.write(&self.storage[self.position..self.limit])?;
        self.position += n.min(self.remaining());
        Ok(n)
    }

    /// The bytes between position and limit.
    pub fn chunk(&self) -> &[u8] {
        &self.storage[self.position..self.limit]
    }

    pub fn chunk_mut(&mut self) -> &mut [u8] {
        let (position, limit) = (self.position, self.limit);
        &mut self.storage[position..limit]
    }

    /// Dump of the usage trace, when tracing is enabled for this buffer.
    pub fn trace_string(&self) -> Option<String> {
        self.trace.as_ref().map(|trace| {
            format!(
                "{} {} cap={} [{}]",
                self.region,
                self.tag,
                self.capacity(),
                trace.dump()
            )
        })
    }

    /// Convert into an atomically ref-counted handle; the region is released
    /// when the last view drops.
    pub fn into_shared(mut self) -> SharedBuffer {
        self.record(Operation::Share);
        SharedBuffer::new(self)
    }

    /// Give the region back. Consumes the handle, so it cannot be released twice.
    pub fn release(mut self) {
        self.record(Operation::Release);
        drop(self);
    }

    fn put_slice_as(&mut self, op: Operation, src: &[u8]) -> Result<()> {
        let start = self.advance_checked(op, src.len())?;
        self.storage[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn get_slice_as(&mut self, op: Operation, dst: &mut [u8]) -> Result<()> {
        let start = self.advance_checked(op, dst.len())?;
        dst.copy_from_slice(&self.storage[start..start + dst.len()]);
        Ok(())
    }

    /// Claim `n` bytes at the position; returns where they start.
    fn advance_checked(&mut self, op: Operation, n: usize) -> Result<usize> {
        self.record(op);
        if n > self.remaining() {
            return Err(self.bounds(op, n));
        }
        let start = self.position;
        self.position += n;
        Ok(start)
    }

    fn bounds(&self, op: Operation, requested: usize) -> Error {
        Error::Bounds {
            op,
            position: self.position,
            limit: self.limit,
            capacity: self.capacity(),
            requested,
            trace: self.trace_string(),
        }
    }

    fn record(&mut self, op: Operation) {
        if let Some(trace) = self.trace.as_mut() {
            trace.record(self.subsystem, op);
        }
    }
}

/// Release the buffer held in `slot`, if any. Returns whether one was released.
pub fn release_if_live(slot: &mut Option<DirectBuffer>) -> bool {
    match slot.take() {
        Some(buffer) => {
            buffer.release();
            true
        }
        None => false,
    }
}

impl Drop for DirectBuffer {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut self.storage);
        if let Some(pool) = self.pool.take().and_then(|weak| weak.upgrade()) {
            pool.reclaim(ReturnedRegion {
                region: self.region,
                kind: self.kind,
                storage,
            });
        }
    }
}

impl Buf for DirectBuffer {
    fn remaining(&self) -> usize {
        self.limit - self.position
    }

    fn chunk(&self) -> &[u8] {
        &self.storage[self.position..self.limit]
    }

    fn advance(&mut self, cnt: usize) {
        assert!(
            cnt <= self.limit - self.position,
            "cannot advance past limit: {cnt} > {}",
            self.limit - self.position
        );
        self.position += cnt;
    }
}

impl fmt::Debug for DirectBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectBuffer")
            .field("region", &self.region)
            .field("tag", &self.tag)
            .field("capacity", &self.capacity())
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("kind", &self.kind)
            .finish()
    }
}
