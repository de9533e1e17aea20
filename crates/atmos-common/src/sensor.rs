//! Sensor families and satellite sectors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CommonError;

/// The observation families the pipeline ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// NEXRAD Level II weather radar.
    Radar,
    /// GOES ABI geostationary imager.
    Satellite,
    /// MRMS multi-radar national mosaic.
    Composite,
}

impl SensorKind {
    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Radar => "nexrad",
            SensorKind::Satellite => "goes",
            SensorKind::Composite => "mrms",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ABI scan sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SatelliteSector {
    #[serde(rename = "CONUS")]
    Conus,
    #[serde(rename = "FULL")]
    FullDisk,
    #[serde(rename = "MESO1")]
    Meso1,
    #[serde(rename = "MESO2")]
    Meso2,
}

impl SatelliteSector {
    /// Name used in derived keys and responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            SatelliteSector::Conus => "CONUS",
            SatelliteSector::FullDisk => "FULL",
            SatelliteSector::Meso1 => "MESO1",
            SatelliteSector::Meso2 => "MESO2",
        }
    }

    /// Product letter in `ABI-L1b-Rad<letter>` source prefixes.
    pub fn product_letter(&self) -> char {
        match self {
            SatelliteSector::Conus => 'C',
            SatelliteSector::FullDisk => 'F',
            SatelliteSector::Meso1 | SatelliteSector::Meso2 => 'M',
        }
    }

    /// Sector token as it appears in source filenames (`RadC`, `RadM1`).
    pub fn filename_token(&self) -> &'static str {
        match self {
            SatelliteSector::Conus => "RadC",
            SatelliteSector::FullDisk => "RadF",
            SatelliteSector::Meso1 => "RadM1",
            SatelliteSector::Meso2 => "RadM2",
        }
    }
}

impl FromStr for SatelliteSector {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONUS" | "C" => Ok(SatelliteSector::Conus),
            "FULL" | "FULLDISK" | "F" => Ok(SatelliteSector::FullDisk),
            "MESO1" | "M1" => Ok(SatelliteSector::Meso1),
            "MESO2" | "M2" => Ok(SatelliteSector::Meso2),
            _ => Err(CommonError::UnknownSector(s.to_string())),
        }
    }
}

impl fmt::Display for SatelliteSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MRMS mosaic product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompositeProduct {
    /// Merged reflectivity composite, quality controlled.
    #[serde(rename = "reflq")]
    ReflectivityQc,
}

impl CompositeProduct {
    /// Name used in derived keys and responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositeProduct::ReflectivityQc => "reflq",
        }
    }

    /// Archive directory names that hold this product, in search order.
    pub fn source_names(&self) -> &'static [&'static str] {
        match self {
            CompositeProduct::ReflectivityQc => &[
                "MergedReflectivityQComposite",
                "MergedReflectivityComposite_00.50",
                "MRMS_MergedReflectivityQC",
            ],
        }
    }
}

impl FromStr for CompositeProduct {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reflq" | "mergedreflectivityqcomposite" => Ok(CompositeProduct::ReflectivityQc),
            _ => Err(CommonError::UnknownProduct(s.to_string())),
        }
    }
}

impl fmt::Display for CompositeProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
