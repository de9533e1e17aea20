//! Geographic extents.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees (EPSG:4326).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Continental US extent used for CONUS satellite products.
    pub fn conus() -> Self {
        Self::new(-130.0, 20.0, -60.0, 55.0)
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// True when the box has a positive, finite area.
    pub fn is_valid(&self) -> bool {
        [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// `[west, south, east, north]`, the order used by metadata sidecars.
    pub fn to_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    /// Smallest box covering all finite points, or `None` for no points.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut bbox: Option<Self> = None;
        for (lon, lat) in points {
            if !lon.is_finite() || !lat.is_finite() {
                continue;
            }
            bbox = Some(match bbox {
                None => Self::new(lon, lat, lon, lat),
                Some(b) => Self::new(
                    b.west.min(lon),
                    b.south.min(lat),
                    b.east.max(lon),
                    b.north.max(lat),
                ),
            });
        }
        bbox
    }
}
