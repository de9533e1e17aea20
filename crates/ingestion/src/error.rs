//! Error types for the ingestion crate.

use std::fmt;

use thiserror::Error;

use crate::pipeline::Stage;
use crate::request::SensorParams;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// No matching source object, or a requested artifact is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream archive unreachable or access denied.
    #[error("Source archive unavailable (status {}): {message}", .code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    SourceAccess { code: Option<u16>, message: String },

    #[error("No supported field found; available: {}", .available.join(", "))]
    UnsupportedFormat { available: Vec<String> },

    #[error("No valid samples after filtering")]
    EmptyGrid,

    #[error("Failed to decode source archive: {0}")]
    Decode(String),

    /// COG or sidecar serialization failed.
    #[error("Failed to encode artifact: {0}")]
    Encode(String),

    #[error("Failed to publish artifact: {0}")]
    Publish(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl IngestionError {
    /// HTTP status code surfaced by the service layer.
    pub fn http_status(&self) -> u16 {
        match self {
            IngestionError::NotFound(_) => 404,
            IngestionError::InvalidRequest(_) => 400,
            IngestionError::SourceAccess { .. } => 502,
            IngestionError::UnsupportedFormat { .. } | IngestionError::EmptyGrid => 422,
            IngestionError::Decode(_)
            | IngestionError::Encode(_)
            | IngestionError::Publish(_)
            | IngestionError::Config(_) => 500,
        }
    }

    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestionError::NotFound(_) => "not_found",
            IngestionError::InvalidRequest(_) => "invalid_request",
            IngestionError::SourceAccess { .. } => "source_access",
            IngestionError::UnsupportedFormat { .. } => "unsupported_format",
            IngestionError::EmptyGrid => "empty_grid",
            IngestionError::Decode(_) => "decode",
            IngestionError::Encode(_) => "encode",
            IngestionError::Publish(_) => "publish",
            IngestionError::Config(_) => "config",
        }
    }

    /// Map a source archive failure. A missing object is `NotFound`.
    pub(crate) fn from_source(err: storage::StorageError) -> Self {
        match err {
            storage::StorageError::NotFound(path) => IngestionError::NotFound(path),
            other => IngestionError::SourceAccess {
                code: other.status(),
                message: other.to_string(),
            },
        }
    }

    /// Map a derived-bucket write failure.
    pub(crate) fn from_publish(err: storage::StorageError) -> Self {
        IngestionError::Publish(err.to_string())
    }
}

impl From<atmos_common::CommonError> for IngestionError {
    fn from(err: atmos_common::CommonError) -> Self {
        IngestionError::InvalidRequest(err.to_string())
    }
}

impl From<nexrad_parser::NexradError> for IngestionError {
    fn from(err: nexrad_parser::NexradError) -> Self {
        IngestionError::Decode(err.to_string())
    }
}

impl From<netcdf_parser::NetCdfError> for IngestionError {
    fn from(err: netcdf_parser::NetCdfError) -> Self {
        IngestionError::Decode(err.to_string())
    }
}

impl From<grib2_parser::Grib2Error> for IngestionError {
    fn from(err: grib2_parser::Grib2Error) -> Self {
        IngestionError::Decode(err.to_string())
    }
}

impl From<cog_writer::CogError> for IngestionError {
    fn from(err: cog_writer::CogError) -> Self {
        IngestionError::Encode(err.to_string())
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;

/// A failed pipeline invocation: where it stopped and for what.
#[derive(Debug)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub params: SensorParams,
    pub source: IngestionError,
}

impl PipelineFailure {
    pub fn new(stage: Stage, params: SensorParams, source: IngestionError) -> Self {
        Self {
            stage,
            params,
            source,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.source.http_status()
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ingestion failed during {} ({}): {}",
            self.params.sensor(),
            self.stage,
            self.params,
            self.source
        )
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
