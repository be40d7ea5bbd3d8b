//! Metric events.
//!
//! Emitted as `tracing` events under the `peerbuf::metrics` target so a
//! subscriber layer can forward them to whatever telemetry backend the
//! binary uses.

use peerbuf_mem::{CompactionReport, PoolStats};

pub fn record_compaction(report: &CompactionReport) {
    tracing::debug!(
        target: "peerbuf::metrics",
        free_before = report.classes.free_before,
        free_after = report.classes.free_after,
        regions_dropped = report.classes.dropped,
        slice_chunks = report.slice_chunks,
        "compaction"
    );
}

pub fn record_usage(stats: &PoolStats) {
    let slice_free: usize = stats.slices.iter().map(|s| s.free).sum();
    let slice_chunks: usize = stats.slices.iter().map(|s| s.chunks).sum();
    tracing::info!(
        target: "peerbuf::metrics",
        given = stats.usage.given,
        returned = stats.usage.returned,
        in_use = stats.usage.in_use,
        peak_in_use = stats.usage.peak_in_use,
        free_bytes = stats.free_bytes,
        free_regions = stats.free_regions,
        slice_free,
        slice_chunks,
        "buffer usage"
    );
}
