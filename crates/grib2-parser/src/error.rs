//! Error types for GRIB2 decoding.

use thiserror::Error;

/// Result type for GRIB2 decoding.
pub type Grib2Result<T> = Result<T, Grib2Error>;

#[derive(Error, Debug)]
pub enum Grib2Error {
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unsupported GRIB2 feature: {0}")]
    Unsupported(String),

    #[error("Failed to unpack values: {0}")]
    Unpacking(String),

    #[error("Failed to decompress: {0}")]
    Decompression(String),
}
