//! Regridder: sensor samples onto a regular north-up lat/lon raster.
//!
//! Each valid sample is binned into exactly one destination cell by linear
//! scaling of its coordinates. When several samples land in one cell the
//! last one written wins; there is no averaging. Cells nobody writes keep
//! the nodata value.

use atmos_common::{BoundingBox, SatelliteSector};
use projection::RadarSite;
use tracing::debug;

use crate::decode::DecodedObservation;
use crate::error::{IngestionError, Result};

/// Nodata sentinel written to every uncovered cell.
pub const NODATA: f32 = -9999.0;

pub const CRS_EPSG_4326: &str = "EPSG:4326";

/// CONUS output raster (rows, cols), about 2.5 km spacing.
pub const CONUS_SHAPE: (usize, usize) = (1400, 2800);
/// Full disk output raster (rows, cols) over the data bounds.
pub const FULL_DISK_SHAPE: (usize, usize) = (2000, 2000);

/// A fixed output grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub bounds: BoundingBox,
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    /// Cell containing `(lon, lat)`, `None` outside the bounds. Row 0 is the
    /// northern edge; points on the south/east edge fall in the last cell.
    pub fn cell(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let b = &self.bounds;
        if !b.contains(lon, lat) {
            return None;
        }
        let row = ((b.north - lat) / b.height() * self.rows as f64).floor() as usize;
        let col = ((lon - b.west) / b.width() * self.cols as f64).floor() as usize;
        Some((row.min(self.rows - 1), col.min(self.cols - 1)))
    }

    /// Cell size in degrees: (longitude, latitude).
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.bounds.width() / self.cols as f64,
            self.bounds.height() / self.rows as f64,
        )
    }
}

/// Where the output raster lies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetGrid {
    Fixed(GridSpec),
    /// Bounds taken from the valid samples themselves.
    DataBounds { rows: usize, cols: usize },
}

impl TargetGrid {
    /// Square grid centred on the radar, `2 * radius_km` on a side.
    pub fn radar(site: &RadarSite, radius_km: f64, resolution_km: f64) -> Self {
        let cells = ((2.0 * radius_km) / resolution_km).round().max(1.0) as usize;
        TargetGrid::Fixed(GridSpec {
            bounds: site.extent(radius_km),
            rows: cells,
            cols: cells,
        })
    }

    /// MRMS mosaics are resampled onto the CONUS grid.
    pub fn composite() -> Self {
        TargetGrid::Fixed(GridSpec {
            bounds: BoundingBox::conus(),
            rows: CONUS_SHAPE.0,
            cols: CONUS_SHAPE.1,
        })
    }

    /// Output grid of an ABI sector.
    pub fn satellite(sector: SatelliteSector) -> Result<Self> {
        match sector {
            SatelliteSector::Conus => Ok(TargetGrid::composite()),
            SatelliteSector::FullDisk => Ok(TargetGrid::DataBounds {
                rows: FULL_DISK_SHAPE.0,
                cols: FULL_DISK_SHAPE.1,
            }),
            other => Err(IngestionError::InvalidRequest(format!(
                "no output grid defined for sector {}",
                other
            ))),
        }
    }
}

/// A regridded raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterArtifact {
    /// Row-major, north-up
    pub grid: Vec<f32>,
    pub nodata_value: f32,
    pub bounds: BoundingBox,
    /// (rows, cols)
    pub shape: (usize, usize),
    pub crs: String,
    /// Cells holding a sample
    pub valid_cells: usize,
}

impl RasterArtifact {
    pub fn rows(&self) -> usize {
        self.shape.0
    }

    pub fn cols(&self) -> usize {
        self.shape.1
    }

    pub fn value(&self, row: usize, col: usize) -> f32 {
        self.grid[row * self.shape.1 + col]
    }
}

/// A sample the regridder will use: finite, in-range coordinates and a
/// finite value.
fn is_valid_sample(lon: f64, lat: f64, value: f32) -> bool {
    lon.is_finite()
        && lat.is_finite()
        && lat.abs() <= 90.0
        && lon.abs() <= 180.0
        && value.is_finite()
}

/// Bin `observation` onto `target`.
pub fn regrid(
    observation: &DecodedObservation,
    target: &TargetGrid,
    nodata: f32,
) -> Result<RasterArtifact> {
    let spec = match *target {
        TargetGrid::Fixed(spec) => spec,
        TargetGrid::DataBounds { rows, cols } => {
            let points = observation
                .samples()
                .filter(|&(lon, lat, v)| is_valid_sample(lon, lat, v))
                .map(|(lon, lat, _)| (lon, lat));
            let mut bounds = BoundingBox::from_points(points).ok_or(IngestionError::EmptyGrid)?;
            // A single row or column of samples still needs a non-zero extent
            if bounds.width() <= 0.0 {
                bounds.east = bounds.west + 1e-6;
            }
            if bounds.height() <= 0.0 {
                bounds.north = bounds.south + 1e-6;
            }
            GridSpec { bounds, rows, cols }
        }
    };

    if spec.rows == 0 || spec.cols == 0 || !spec.bounds.is_valid() {
        return Err(IngestionError::InvalidRequest(format!(
            "invalid output grid {:?}",
            spec
        )));
    }

    let mut grid = vec![nodata; spec.rows * spec.cols];
    let mut written = vec![false; spec.rows * spec.cols];
    let mut samples = 0usize;

    for (lon, lat, value) in observation.samples() {
        if !is_valid_sample(lon, lat, value) {
            continue;
        }
        if let Some((row, col)) = spec.cell(lon, lat) {
            let idx = row * spec.cols + col;
            grid[idx] = value;
            written[idx] = true;
            samples += 1;
        }
    }

    let valid_cells = written.iter().filter(|w| **w).count();
    if valid_cells == 0 {
        return Err(IngestionError::EmptyGrid);
    }

    debug!(
        rows = spec.rows,
        cols = spec.cols,
        samples,
        valid_cells,
        "Regridded observation"
    );

    Ok(RasterArtifact {
        grid,
        nodata_value: nodata,
        bounds: spec.bounds,
        shape: (spec.rows, spec.cols),
        crs: CRS_EPSG_4326.to_string(),
        valid_cells,
    })
}
