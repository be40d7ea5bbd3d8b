//! Pool configuration that the composition root can serialize/deserialize.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Disk block length; the dominant large-buffer request is one block plus a
/// protocol header, so it gets its own size class.
pub const DISK_BLOCK_SIZE: usize = 16 * 1024;

pub const DEFAULT_SLICE_ENTRY_SIZES: [usize; 9] = [8, 16, 32, 64, 128, 256, 512, 1024, 2048];
pub const DEFAULT_SLICE_CHUNK_LIMITS: [usize; 9] = [256, 256, 128, 64, 64, 64, 64, 64, 64];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Smallest power-of-two size class (2^12 = 4KB).
    pub min_class_power: u32,

    /// Largest power-of-two size class; also the maximum request length.
    pub max_class_power: u32,

    /// Extra non power-of-two classes merged into the class list.
    pub extra_class_sizes: Vec<usize>,

    /// Native chunk subdivided by the slice allocator.
    pub slice_chunk_size: usize,

    /// Entry sizes of the slice allocator, strictly ascending. Requests up to
    /// the last entry size are served from slices.
    pub slice_entry_sizes: Vec<usize>,

    /// Max concurrently allocated chunks per slice class (before the multiplier).
    pub slice_chunk_limits: Vec<usize>,

    /// Scales every entry of `slice_chunk_limits` when greater than one.
    pub slice_limit_multiplier: usize,

    /// Below this many free pooled bytes compaction does nothing.
    pub min_free_bytes: usize,

    /// Free pooled bytes above this are shrunk aggressively.
    pub max_free_bytes: usize,

    pub compaction_interval_ms: u64,

    /// Call the native allocator's collection hook after dropping free buffers.
    pub explicit_gc: bool,

    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Keep a registry of handed-out regions (leak / double hand-out detection).
    pub track_handed_out: bool,

    /// Record a ring of (subsystem, operation) pairs on every buffer.
    pub trace_usage: bool,

    pub trace_depth: usize,

    /// Periodically log the usage report when set.
    pub print_interval_ms: Option<u64>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            track_handed_out: false,
            trace_usage: false,
            trace_depth: 64,
            print_interval_ms: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_class_power: 12, // 4 KiB
            max_class_power: 28, // 256 MiB, the largest piece size seen in the wild
            extra_class_sizes: vec![DISK_BLOCK_SIZE + 128],
            slice_chunk_size: 4096,
            slice_entry_sizes: DEFAULT_SLICE_ENTRY_SIZES.to_vec(),
            slice_chunk_limits: DEFAULT_SLICE_CHUNK_LIMITS.to_vec(),
            slice_limit_multiplier: 1,
            min_free_bytes: 1024 * 1024,
            max_free_bytes: 10 * 1024 * 1024,
            compaction_interval_ms: 2 * 60 * 1000,
            explicit_gc: true,
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Largest length `acquire` accepts.
    pub fn max_size(&self) -> usize {
        1usize << self.max_class_power
    }

    /// Largest length served by the slice allocator (0 when slicing is off).
    pub fn slice_end_size(&self) -> usize {
        self.slice_entry_sizes.last().copied().unwrap_or(0)
    }

    /// Sorted, de-duplicated capacity list of the large-buffer pool.
    pub fn size_classes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = (self.min_class_power..=self.max_class_power)
            .map(|p| 1usize << p)
            .collect();
        sizes.extend(self.extra_class_sizes.iter().copied());
        sizes.sort_unstable();
        sizes.dedup();
        sizes
    }

    /// Per-class chunk caps with the multiplier applied.
    pub fn slice_chunk_caps(&self) -> Vec<usize> {
        let mult = self.slice_limit_multiplier.max(1);
        self.slice_chunk_limits
            .iter()
            .map(|limit| limit.saturating_mul(mult))
            .collect()
    }

    pub fn compaction_interval(&self) -> Duration {
        Duration::from_millis(self.compaction_interval_ms)
    }

    pub fn print_interval(&self) -> Option<Duration> {
        self.diagnostics.print_interval_ms.map(Duration::from_millis)
    }

    /// Check the invariants the allocator relies on.
    pub fn validate(&self) -> Result<()> {
        if self.min_class_power > self.max_class_power {
            return Err(Error::Config(format!(
                "min_class_power {} exceeds max_class_power {}",
                self.min_class_power, self.max_class_power
            )));
        }
        if self.max_class_power >= usize::BITS - 1 {
            return Err(Error::Config(format!(
                "max_class_power {} does not fit in a usize",
                self.max_class_power
            )));
        }
        let max = self.max_size();
        if let Some(bad) = self.extra_class_sizes.iter().find(|s| **s == 0 || **s > max) {
            return Err(Error::Config(format!(
                "extra size class {bad} must be in 1..={max}"
            )));
        }

        if self.slice_entry_sizes.len() != self.slice_chunk_limits.len() {
            return Err(Error::Config(format!(
                "{} slice entry sizes but {} chunk limits",
                self.slice_entry_sizes.len(),
                self.slice_chunk_limits.len()
            )));
        }
        if !self.slice_entry_sizes.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::Config(
                "slice entry sizes must be strictly ascending".into(),
            ));
        }
        if let Some(bad) = self
            .slice_entry_sizes
            .iter()
            .find(|s| **s == 0 || **s > self.slice_chunk_size)
        {
            return Err(Error::Config(format!(
                "slice entry size {bad} must be in 1..={}",
                self.slice_chunk_size
            )));
        }
        if self.slice_chunk_limits.contains(&0) {
            return Err(Error::Config("slice chunk limits must be non-zero".into()));
        }
        if self.slice_end_size() > max {
            return Err(Error::Config(format!(
                "largest slice entry {} exceeds max size {max}",
                self.slice_end_size()
            )));
        }

        if self.max_free_bytes == 0 || self.min_free_bytes > self.max_free_bytes {
            return Err(Error::Config(format!(
                "free watermarks must satisfy 0 <= min ({}) <= max ({}), max > 0",
                self.min_free_bytes, self.max_free_bytes
            )));
        }
        if self.compaction_interval_ms == 0 {
            return Err(Error::Config("compaction interval must be non-zero".into()));
        }
        if self.diagnostics.trace_usage && self.diagnostics.trace_depth == 0 {
            return Err(Error::Config("trace depth must be non-zero".into()));
        }
        Ok(())
    }

    /// Parse a (possibly partial) JSON document; missing fields take defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `PEERBUF_SLICE_LIMIT_MULTIPLIER`: slice chunk cap multiplier
    /// - `PEERBUF_MAX_CLASS_POWER`: largest size class / request (power of two)
    /// - `PEERBUF_MIN_FREE_BYTES` / `PEERBUF_MAX_FREE_BYTES`: compaction watermarks
    /// - `PEERBUF_COMPACTION_INTERVAL_MS`: compaction period
    /// - `PEERBUF_DISABLE_EXPLICIT_GC`: `1` skips the collection hook
    /// - `PEERBUF_TRACK_HANDED_OUT`, `PEERBUF_TRACE_USAGE`: `1` enables diagnostics
    /// - `PEERBUF_PRINT_INTERVAL_MS`: periodic usage report
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("PEERBUF_SLICE_LIMIT_MULTIPLIER") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.slice_limit_multiplier = v;
            }
        }

        if let Ok(s) = std::env::var("PEERBUF_MAX_CLASS_POWER") {
            if let Ok(v) = s.parse::<u32>() {
                cfg.max_class_power = v;
            }
        }

        if let Ok(s) = std::env::var("PEERBUF_MIN_FREE_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.min_free_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("PEERBUF_MAX_FREE_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_free_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("PEERBUF_COMPACTION_INTERVAL_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.compaction_interval_ms = v;
            }
        }

        if env_flag("PEERBUF_DISABLE_EXPLICIT_GC") {
            cfg.explicit_gc = false;
        }

        if env_flag("PEERBUF_TRACK_HANDED_OUT") {
            cfg.diagnostics.track_handed_out = true;
        }

        if env_flag("PEERBUF_TRACE_USAGE") {
            cfg.diagnostics.trace_usage = true;
        }

        if let Ok(s) = std::env::var("PEERBUF_PRINT_INTERVAL_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.diagnostics.print_interval_ms = Some(v);
            }
        }

        cfg
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|s| s.trim() == "1").unwrap_or(false)
}
