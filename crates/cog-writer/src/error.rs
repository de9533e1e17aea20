//! Error types for COG writing.

use thiserror::Error;

/// Result type for COG writing.
pub type CogResult<T> = Result<T, CogError>;

#[derive(Error, Debug)]
pub enum CogError {
    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    #[error("Tile compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("File exceeds classic TIFF 4 GiB limit")]
    TooLarge,
}
