//! Error types for Level II decoding.

use thiserror::Error;

/// Result type for Level II decoding.
pub type NexradResult<T> = Result<T, NexradError>;

#[derive(Error, Debug)]
pub enum NexradError {
    #[error("Not a Level II archive: {0}")]
    InvalidFormat(String),

    #[error("Archive truncated at byte {offset} (needed {needed} more)")]
    Truncated { offset: usize, needed: usize },

    #[error("Failed to decompress record: {0}")]
    Decompression(String),

    #[error("Invalid data block: {0}")]
    InvalidBlock(String),

    #[error("Archive contains no radials")]
    NoRadials,
}
