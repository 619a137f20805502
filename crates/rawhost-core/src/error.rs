use thiserror::Error;

/// Errors reported synchronously to the interpreter.
///
/// Audio stalls never show up here: the pipeline recovers from them on its
/// own and interrupt-context code has no caller to report to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("seek to {offset} is outside of a {size} byte file")]
    OutOfRange { offset: i64, size: u64 },

    #[error("timer table is full ({capacity} slots)")]
    Full { capacity: usize },

    #[error("{path} is {size} bytes, file cache holds at most {capacity}")]
    CacheFull {
        path: String,
        size: u64,
        capacity: usize,
    },

    #[error("backend is not initialized")]
    NotInitialized,
}

/// Failures raised by a [`crate::fs::Medium`] implementation.
#[derive(Error, Debug)]
pub enum MediumError {
    #[error("no entry named {0} in the current directory")]
    NoEntry(String),

    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("medium i/o error: {0}")]
    Io(#[from] std::io::Error),
}
