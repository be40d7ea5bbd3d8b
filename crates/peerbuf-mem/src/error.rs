use peerbuf_core::id::RegionId;
use peerbuf_core::tag::Operation;
use thiserror::Error;

/// Result type local to peerbuf-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid buffer request: length {length} outside 1..={max}")]
    InvalidRequest { length: usize, max: usize },

    #[error("out of native memory: {requested} bytes could not be allocated even after releasing pooled buffers")]
    OutOfMemory { requested: usize },

    #[error("no size class matches buffer capacity {capacity}")]
    Configuration { capacity: usize },

    #[error("{region} handed out twice")]
    DoubleHandOut { region: RegionId },

    #[error(
        "'{op}' out of bounds: position {position}, limit {limit}, capacity {capacity}, requested {requested}{}",
        trace_suffix(.trace)
    )]
    Bounds {
        op: Operation,
        position: usize,
        limit: usize,
        capacity: usize,
        requested: usize,
        trace: Option<String>,
    },

    #[error("buffer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] peerbuf_core::Error),
}

fn trace_suffix(trace: &Option<String>) -> String {
    match trace {
        Some(t) => format!("; trace: {t}"),
        None => String::new(),
    }
}
