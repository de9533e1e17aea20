//! Sensor parameters and their resolution against configured defaults.

use std::fmt;

use atmos_common::{CompositeProduct, SatelliteSector, SensorKind, TimestampKey};
use serde::{Deserialize, Serialize};
use storage::StoragePath;

use crate::config::IngestionConfig;
use crate::error::{IngestionError, Result};

/// Fully resolved parameters of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "sensor")]
pub enum SensorParams {
    #[serde(rename = "nexrad")]
    Radar { site: String },
    #[serde(rename = "goes")]
    Satellite { band: u8, sector: SatelliteSector },
    #[serde(rename = "mrms")]
    Composite { product: CompositeProduct },
}

impl SensorParams {
    /// Resolve a radar site, defaulting from config. Sites are 4-character ICAO ids.
    pub fn radar(site: Option<&str>, config: &IngestionConfig) -> Result<Self> {
        let site = match site.map(str::trim) {
            None | Some("") => config.radar.default_site.clone(),
            Some(s) => s.to_ascii_uppercase(),
        };
        validate_site(&site)?;
        Ok(SensorParams::Radar { site })
    }

    /// Resolve a band and sector, defaulting from config.
    pub fn satellite(
        band: Option<u8>,
        sector: Option<&str>,
        config: &IngestionConfig,
    ) -> Result<Self> {
        let band = band.unwrap_or(config.satellite.default_band);
        if !(1..=16).contains(&band) {
            return Err(IngestionError::InvalidRequest(format!(
                "ABI band must be 1..=16, got {}",
                band
            )));
        }
        let sector = match sector.map(str::trim) {
            None => config.satellite.default_sector,
            Some("") => {
                return Err(IngestionError::InvalidRequest(
                    "sector must not be empty".to_string(),
                ))
            }
            Some(s) => s.parse::<SatelliteSector>()?,
        };
        Ok(SensorParams::Satellite { band, sector })
    }

    /// Resolve a mosaic product, defaulting from config.
    pub fn composite(product: Option<&str>, config: &IngestionConfig) -> Result<Self> {
        let product = match product.map(str::trim) {
            None | Some("") => config.composite.default_product,
            Some(p) => p.parse::<CompositeProduct>()?,
        };
        Ok(SensorParams::Composite { product })
    }

    pub fn sensor(&self) -> SensorKind {
        match self {
            SensorParams::Radar { .. } => SensorKind::Radar,
            SensorParams::Satellite { .. } => SensorKind::Satellite,
            SensorParams::Composite { .. } => SensorKind::Composite,
        }
    }

    /// Derived key of the raster for one timestamp.
    pub fn cog_key(&self, ts: &TimestampKey) -> String {
        match self {
            SensorParams::Radar { site } => StoragePath::radar_cog(site, ts),
            SensorParams::Satellite { band, sector } => StoragePath::goes_cog(*band, *sector, ts),
            SensorParams::Composite { product } => StoragePath::mrms_cog(*product, ts),
        }
    }

    /// Derived key of the metadata sidecar for one timestamp.
    pub fn meta_key(&self, ts: &TimestampKey) -> String {
        match self {
            SensorParams::Radar { site } => StoragePath::radar_meta(site, ts),
            SensorParams::Satellite { band, sector } => StoragePath::goes_meta(*band, *sector, ts),
            SensorParams::Composite { product } => StoragePath::mrms_meta(*product, ts),
        }
    }

    /// Derived key of the rolling index (frames or timeline).
    pub fn index_key(&self) -> String {
        match self {
            SensorParams::Radar { site } => StoragePath::radar_frames(site),
            SensorParams::Satellite { band, sector } => StoragePath::goes_timeline(*band, *sector),
            SensorParams::Composite { product } => StoragePath::mrms_timeline(*product),
        }
    }

    /// XYZ tile URL template served by the tile front end.
    pub fn tile_template(&self, ts: &TimestampKey) -> String {
        match self {
            SensorParams::Radar { site } => {
                format!("/tiles/weather/nexrad-{}/{}/{{z}}/{{x}}/{{y}}.png", site, ts)
            }
            SensorParams::Satellite { band, sector } => format!(
                "/tiles/weather/goes-c{:02}-{}/{}/{{z}}/{{x}}/{{y}}.png",
                band,
                sector.as_str().to_ascii_lowercase(),
                ts
            ),
            SensorParams::Composite { product } => format!(
                "/tiles/weather/mrms-{}/{}/{{z}}/{{x}}/{{y}}.png",
                product, ts
            ),
        }
    }
}

impl fmt::Display for SensorParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorParams::Radar { site } => write!(f, "site={}", site),
            SensorParams::Satellite { band, sector } => {
                write!(f, "band={} sector={}", band, sector)
            }
            SensorParams::Composite { product } => write!(f, "product={}", product),
        }
    }
}

/// Site ids are used verbatim in keys, so only plain 4-character ids pass.
pub(crate) fn validate_site(site: &str) -> Result<()> {
    if site.len() == 4 && site.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(IngestionError::InvalidRequest(format!(
            "invalid radar site {:?}",
            site
        )))
    }
}
