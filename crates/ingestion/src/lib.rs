//! Atmospheric observation ingestion.
//!
//! Turns public NEXRAD Level II volumes, GOES ABI L1b files and MRMS
//! composite mosaics into cloud-optimized GeoTIFFs with JSON sidecars,
//! published under a stable key layout with rolling frame and timeline
//! indices.
//!
//! # Architecture
//!
//! An [`Ingester`] runs each request through five stages:
//!
//! - [`locator`]: find the archive object nearest the target time
//! - [`decode`]: Level II radials, ABI scan-angle grids or GRIB2 lat/lon
//!   grids to typed fields
//! - [`regrid`]: bin samples onto a north-up EPSG:4326 raster
//! - [`encode`]: COG bytes plus the metadata sidecar
//! - [`publisher`]: idempotent artifact writes, then index updates

pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod index;
mod ingester;
pub mod locator;
pub mod pipeline;
pub mod publisher;
pub mod regrid;
pub mod request;

// Re-exports
pub use config::{CompositeConfig, IngestionConfig, RadarConfig, SatelliteConfig};
pub use decode::{AbiOpener, DecodedObservation, NetCdfOpener};
pub use encode::{ArtifactMetadata, EncodedArtifact, RasterEncoder};
pub use error::{IngestionError, PipelineFailure, Result};
pub use index::{Frame, FrameIndex, TimelineIndex};
pub use ingester::{
    ArtifactKeys, Clock, FrameListing, FramesOutcome, Ingester, IngestionOutcome, LegendResponse,
    TimelineListing, DEFAULT_FRAME_LIMIT,
};
pub use locator::{SourceLocator, SourceReference};
pub use pipeline::Stage;
pub use publisher::Publisher;
pub use regrid::{RasterArtifact, TargetGrid, NODATA};
pub use request::SensorParams;
