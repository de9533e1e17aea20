//! Cloud-optimized GeoTIFF writer.
//!
//! Writes single-band float32 rasters in EPSG:4326 as COGs:
//! - 256x256 tiles, deflate compressed
//! - internal overviews at 2x, 4x, 8x and 16x built by nodata-aware averaging
//! - all IFDs at the front of the file, tile data after, smallest overview
//!   first and full resolution last, so a reader can fetch any level with
//!   one header request and range reads
//!
//! The TIFF container is written by hand (no libtiff/GDAL), in the same
//! spirit as a minimal PNG encoder.

pub mod cog;
pub mod error;
pub mod overview;
mod tiff;

pub use cog::{write_cog, CogOptions, GeoRaster};
pub use error::{CogError, CogResult};
pub use overview::downsample_2x_mean;
