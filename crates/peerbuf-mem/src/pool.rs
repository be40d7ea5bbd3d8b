//! `DirectBufferPool`: the facade every buffer request goes through.
//!
//! Requests up to the largest slice entry (2KB by default) are carved from
//! slice chunks; larger ones come from the size-class tier. The pool is an
//! ordinary value owned by the application and shared by cloning; buffers
//! hold a weak back-reference and return their region on release or drop.
//! Buffers outliving their pool simply free their memory.

use std::fmt;
use std::sync::{Arc, Weak};

use bytes::BytesMut;
use peerbuf_core::alert::{Alert, AlertLevel, AlertSink};
use peerbuf_core::config::PoolConfig;
use peerbuf_core::id::RegionId;
use peerbuf_core::tag::AllocatorTag;
use serde::Serialize;

use crate::alert::TracingAlertSink;
use crate::compaction::CompactionReport;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::handle::{DirectBuffer, RegionIds, RegionKind, ReturnedRegion};
use crate::native::{NativeAllocator, SystemAllocator};
use crate::size_class::{ClassStats, PooledRegion, SizeClassPool};
use crate::slice::{SliceAllocator, SliceClassStats, SliceEntry, SliceGrant};
use crate::tracking::UsageSnapshot;

pub(crate) struct PoolShared {
    config: PoolConfig,
    classes: SizeClassPool,
    slices: SliceAllocator,
    diagnostics: Diagnostics,
    alerts: Arc<dyn AlertSink>,
    ids: RegionIds,
}

impl PoolShared {
    /// Route a returned region to its tier.
    pub(crate) fn reclaim(&self, returned: ReturnedRegion) {
        let ReturnedRegion {
            region,
            kind,
            storage,
        } = returned;
        self.diagnostics.on_return(region, storage.len());
        self.restore(region, kind, storage);
    }

    /// Put a region back in its tier without touching the registry.
    fn restore(&self, region: RegionId, kind: RegionKind, storage: BytesMut) {
        match kind {
            RegionKind::Class => {
                if let Err(err) = self.classes.release(PooledRegion::new(region, storage)) {
                    tracing::error!(%region, error = %err, "returned buffer dropped");
                }
            }
            RegionKind::Slice(descriptor) => {
                self.slices
                    .release(SliceEntry::new(region, descriptor, storage));
            }
            RegionKind::Unpooled => {
                tracing::trace!(%region, capacity = storage.len(), "unpooled buffer freed");
            }
        }
    }

    fn grant(&self, length: usize) -> Result<(RegionId, BytesMut, RegionKind)> {
        if length <= self.slices.end_size() {
            let grant = self
                .slices
                .acquire(length, &self.ids, |size| self.classes.allocate_native(size))?;
            return match grant {
                SliceGrant::Entry(entry) => {
                    let (region, descriptor, storage) = entry.into_parts();
                    Ok((region, storage, RegionKind::Slice(descriptor)))
                }
                SliceGrant::Exhausted { entry_size, first } => {
                    if first {
                        let message = format!(
                            "Run out of slice space for '{entry_size}', reverting to normal allocation"
                        );
                        tracing::warn!(entry_size, "{message}");
                        self.alerts
                            .alert(Alert::unrepeatable(AlertLevel::Warning, message));
                    }
                    let storage = self.classes.allocate_native(length)?;
                    Ok((self.ids.next(), storage, RegionKind::Unpooled))
                }
            };
        }

        let (region, storage) = self.classes.acquire(length, &self.ids)?.into_parts();
        Ok((region, storage, RegionKind::Class))
    }

    fn out_of_memory(&self, requested: usize) {
        let message = format!(
            "Memory allocation failed: out of native memory space ({requested} bytes requested). \
             Lower cache or connection limits, or raise the process memory limit."
        );
        self.alerts
            .alert(Alert::unrepeatable(AlertLevel::Error, message));
        tracing::error!(
            requested,
            report = %self.describe(true),
            "native memory exhausted"
        );
    }

    fn describe(&self, verbose: bool) -> String {
        self.diagnostics.report(
            self.classes.free_bytes(),
            &self.classes.stats(),
            &self.slices.stats(),
            verbose,
        )
    }

    fn compact(&self) -> CompactionReport {
        let classes = self
            .classes
            .compact(self.config.min_free_bytes, self.config.max_free_bytes);
        let slice_chunks = self.slices.compact();
        CompactionReport {
            classes,
            slice_chunks,
        }
    }
}

/// Serializable snapshot of the pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub usage: UsageSnapshot,
    pub free_bytes: usize,
    pub free_regions: usize,
    pub handed_out: usize,
    pub unmatched_returns: u64,
    pub classes: Vec<ClassStats>,
    pub slices: Vec<SliceClassStats>,
}

/// Builder for pools with a custom allocator or alert sink.
pub struct PoolBuilder {
    config: PoolConfig,
    native: Option<Arc<dyn NativeAllocator>>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl PoolBuilder {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            native: None,
            alerts: None,
        }
    }

    pub fn with_native_allocator(mut self, native: Arc<dyn NativeAllocator>) -> Self {
        self.native = Some(native);
        self
    }

    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn build(self) -> Result<DirectBufferPool> {
        self.config.validate()?;
        let native = self
            .native
            .unwrap_or_else(|| Arc::new(SystemAllocator) as Arc<dyn NativeAllocator>);
        let alerts = self
            .alerts
            .unwrap_or_else(|| Arc::new(TracingAlertSink::new()) as Arc<dyn AlertSink>);

        let classes = SizeClassPool::from_config(&self.config, Arc::clone(&native));
        let slices = SliceAllocator::from_config(&self.config);
        let diagnostics = Diagnostics::new(self.config.diagnostics.track_handed_out);

        tracing::debug!(
            classes = classes.sizes().len(),
            slice_classes = slices.entry_sizes().len(),
            max_size = self.config.max_size(),
            "buffer pool created"
        );

        Ok(DirectBufferPool {
            shared: Arc::new(PoolShared {
                config: self.config,
                classes,
                slices,
                diagnostics,
                alerts,
                ids: RegionIds::default(),
            }),
        })
    }
}

#[derive(Clone)]
pub struct DirectBufferPool {
    shared: Arc<PoolShared>,
}

impl DirectBufferPool {
    pub fn new(config: PoolConfig) -> Result<Self> {
        PoolBuilder::new(config).build()
    }

    pub fn builder(config: PoolConfig) -> PoolBuilder {
        PoolBuilder::new(config)
    }

    /// Hand out a buffer with room for `length` bytes.
    ///
    /// The buffer's position is 0 and its limit is `length`; its capacity is
    /// the size of the slice entry or class that served it.
    pub fn acquire(&self, tag: AllocatorTag, length: usize) -> Result<DirectBuffer> {
        let shared = &self.shared;
        let max = shared.config.max_size();
        if length == 0 || length > max {
            tracing::warn!(length, max, "invalid buffer request");
            return Err(Error::InvalidRequest { length, max });
        }

        let (region, storage, kind) = match shared.grant(length) {
            Ok(granted) => granted,
            Err(err @ Error::OutOfMemory { .. }) => {
                shared.out_of_memory(length);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = shared.diagnostics.on_hand_out(region, tag, storage.len()) {
            // the registry entry belongs to the live holder
            shared.restore(region, kind, storage);
            return Err(err);
        }

        let trace_depth = shared
            .config
            .diagnostics
            .trace_usage
            .then_some(shared.config.diagnostics.trace_depth);
        Ok(DirectBuffer::pooled(
            region,
            storage,
            kind,
            Arc::downgrade(&self.shared),
            tag,
            length,
            trace_depth,
        ))
    }

    /// Return a buffer. Same as dropping it.
    pub fn release(&self, buffer: DirectBuffer) {
        buffer.release();
    }

    pub fn max_size(&self) -> usize {
        self.shared.config.max_size()
    }

    pub fn size_classes(&self) -> Vec<usize> {
        self.shared.classes.sizes()
    }

    pub fn slice_entry_sizes(&self) -> Vec<usize> {
        self.shared.slices.entry_sizes()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.shared.diagnostics
    }

    /// One compaction pass over both tiers.
    pub fn compact(&self) -> CompactionReport {
        self.shared.compact()
    }

    /// Bytes parked on the size-class free lists.
    pub fn free_bytes(&self) -> usize {
        self.shared.classes.free_bytes()
    }

    /// Drop every free size-class region.
    pub fn clear(&self) -> usize {
        self.shared.classes.clear()
    }

    /// Usage report; `verbose` adds one line per live region.
    pub fn describe(&self, verbose: bool) -> String {
        self.shared.describe(verbose)
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        PoolStats {
            usage: shared.diagnostics.usage(),
            free_bytes: shared.classes.free_bytes(),
            free_regions: shared.classes.free_count(),
            handed_out: shared.diagnostics.handed_out_count(),
            unmatched_returns: shared.diagnostics.unmatched_returns(),
            classes: shared.classes.stats(),
            slices: shared.slices.stats(),
        }
    }

    pub fn downgrade(&self) -> WeakPool {
        WeakPool {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl fmt::Debug for DirectBufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectBufferPool")
            .field("max_size", &self.max_size())
            .field("free_bytes", &self.free_bytes())
            .finish()
    }
}

/// Non-owning pool reference; periodic tasks hold one of these.
#[derive(Clone, Debug)]
pub struct WeakPool {
    shared: Weak<PoolShared>,
}

impl WeakPool {
    pub fn upgrade(&self) -> Option<DirectBufferPool> {
        self.shared
            .upgrade()
            .map(|shared| DirectBufferPool { shared })
    }
}
