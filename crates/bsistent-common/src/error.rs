//! Error types for bsistent.

use thiserror::Error;

/// Result type alias using BsistentError.
pub type Result<T> = std::result::Result<T, BsistentError>;

/// Errors that can occur in bsistent operations.
#[derive(Debug, Error)]
pub enum BsistentError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short write: expected {expected} bytes, wrote {written}")]
    ShortWrite { expected: usize, written: usize },

    // Codec errors
    #[error("buffer underflow: needed {needed} bytes, {remaining} remaining")]
    BufferUnderflow { needed: usize, remaining: usize },

    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(String),

    // Storage errors
    #[error("storage file locked by a pending operation")]
    StorageLocked,

    #[error("page not found at offset {0}")]
    PageNotFound(u64),

    // Tree errors
    #[error("record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("page has no items")]
    EmptyPage,

    #[error("tree corrupted: {0}")]
    Corrupted(String),

    // Configuration errors
    #[error("invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}
