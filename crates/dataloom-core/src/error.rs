//! Error types for dataloom-core.

use thiserror::Error;

/// Error type for core sample/array/buffer/stream operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("shape error: {0}")]
    Shape(String),

    #[error("range error: index {index} out of bounds for length {len}")]
    Range { index: i64, len: usize },

    #[error("type error: {0}")]
    Type(String),

    #[error("coverage error: {0}")]
    Coverage(String),

    #[error("stream aborted: {0}")]
    StreamAborted(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
