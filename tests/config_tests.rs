//! Pool configuration tests: defaults, JSON, environment, validation

use peerbuf_core::config::{
    PoolConfig, DEFAULT_SLICE_CHUNK_LIMITS, DEFAULT_SLICE_ENTRY_SIZES, DISK_BLOCK_SIZE,
};
use peerbuf_core::Error;

#[test]
fn test_defaults() {
    let cfg = PoolConfig::default();
    assert!(cfg.validate().is_ok());

    assert_eq!(cfg.max_size(), 1 << 28);
    assert_eq!(cfg.slice_end_size(), 2048);
    assert_eq!(cfg.slice_chunk_caps(), DEFAULT_SLICE_CHUNK_LIMITS.to_vec());
    assert_eq!(cfg.slice_entry_sizes, DEFAULT_SLICE_ENTRY_SIZES.to_vec());
    assert_eq!(cfg.extra_class_sizes, vec![DISK_BLOCK_SIZE + 128]);
    assert_eq!(cfg.min_free_bytes, 1024 * 1024);
    assert_eq!(cfg.max_free_bytes, 10 * 1024 * 1024);
    assert_eq!(cfg.compaction_interval().as_secs(), 120);
    assert!(cfg.explicit_gc);
    assert!(!cfg.diagnostics.track_handed_out);
    assert!(!cfg.diagnostics.trace_usage);
    assert_eq!(cfg.diagnostics.trace_depth, 64);
    assert!(cfg.print_interval().is_none());
}

#[test]
fn test_size_classes_are_sorted_and_deduplicated() {
    let cfg = PoolConfig {
        min_class_power: 12,
        max_class_power: 15,
        extra_class_sizes: vec![8192, 5000],
        ..PoolConfig::default()
    };
    assert_eq!(cfg.size_classes(), vec![4096, 5000, 8192, 16384, 32768]);
}

#[test]
fn test_multiplier_scales_chunk_caps() {
    let cfg = PoolConfig::from_json_str(r#"{ "slice_limit_multiplier": 3 }"#).unwrap();
    assert_eq!(cfg.slice_chunk_caps()[0], 768);
    assert_eq!(cfg.slice_chunk_caps()[8], 192);
    assert_eq!(cfg.max_size(), 1 << 28);
}

#[test]
fn test_json_roundtrip_keeps_diagnostics() {
    let mut cfg = PoolConfig::default();
    cfg.diagnostics.trace_usage = true;
    cfg.diagnostics.print_interval_ms = Some(60_000);

    let text = serde_json::to_string(&cfg).unwrap();
    assert_eq!(PoolConfig::from_json_str(&text).unwrap(), cfg);
}

#[test]
fn test_validation_errors() {
    let mismatched = PoolConfig {
        slice_chunk_limits: vec![1],
        ..PoolConfig::default()
    };
    assert!(matches!(mismatched.validate(), Err(Error::Config(_))));

    let inverted = PoolConfig {
        min_class_power: 20,
        max_class_power: 12,
        ..PoolConfig::default()
    };
    assert!(inverted.validate().is_err());

    let watermarks = PoolConfig {
        min_free_bytes: 2,
        max_free_bytes: 1,
        ..PoolConfig::default()
    };
    assert!(watermarks.validate().is_err());

    let oversized_entry = PoolConfig {
        slice_chunk_size: 1024,
        ..PoolConfig::default()
    };
    assert!(oversized_entry.validate().is_err());

    assert!(PoolConfig::from_json_str(r#"{ "compaction_interval_ms": 0 }"#).is_err());
    assert!(PoolConfig::from_json_str("not json").is_err());
}

#[test]
fn test_from_env() {
    std::env::set_var("PEERBUF_SLICE_LIMIT_MULTIPLIER", "2");
    std::env::set_var("PEERBUF_MAX_CLASS_POWER", "24");
    std::env::set_var("PEERBUF_DISABLE_EXPLICIT_GC", "1");
    std::env::set_var("PEERBUF_TRACK_HANDED_OUT", "1");
    std::env::set_var("PEERBUF_PRINT_INTERVAL_MS", "not-a-number");

    let cfg = PoolConfig::from_env();

    for var in [
        "PEERBUF_SLICE_LIMIT_MULTIPLIER",
        "PEERBUF_MAX_CLASS_POWER",
        "PEERBUF_DISABLE_EXPLICIT_GC",
        "PEERBUF_TRACK_HANDED_OUT",
        "PEERBUF_PRINT_INTERVAL_MS",
    ] {
        std::env::remove_var(var);
    }

    assert_eq!(cfg.slice_limit_multiplier, 2);
    assert_eq!(cfg.max_size(), 1 << 24);
    assert!(!cfg.explicit_gc);
    assert!(cfg.diagnostics.track_handed_out);
    assert!(cfg.print_interval().is_none());
    assert!(!cfg.diagnostics.trace_usage);
}
