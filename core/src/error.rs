//! Error types for the mixer core library.

use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A required corpus statistic was never loaded into the store.
    #[error("missing store key `{0}`")]
    MissingKey(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("job `{job}` failed: {reason}")]
    Job { job: String, reason: String },
}

/// Errors decoding the line formats written by the batch jobs.
#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("missing `{0}` separator")]
    MissingSeparator(char),

    #[error("invalid number `{0}`")]
    InvalidNumber(String),

    #[error("expected {expected} frequencies, got {got}")]
    FieldCount { expected: usize, got: usize },

    #[error("frequencies sum to {expected} but {got} positions were given")]
    PositionCount { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
