//! Ingestion configuration.
//!
//! Built once from the environment and handed to [`crate::Ingester`];
//! nothing in the crate reads the environment after that.

use std::env;
use std::str::FromStr;

use atmos_common::{CompositeProduct, SatelliteSector, TemperatureStyle};
use serde::{Deserialize, Serialize};
use storage::{ObjectStorageConfig, SourceArchiveConfig};

use crate::error::{IngestionError, Result};

/// Radar (NEXRAD Level II) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarConfig {
    /// Public Level II archive bucket
    pub bucket: String,
    pub region: String,
    pub default_site: String,
    /// Search window for single-volume ingests (minutes)
    pub default_minutes_lookback: i64,
    /// Search window for batch frame ingests (minutes)
    pub lookback_minutes: i64,
    /// Frames retained per site index
    pub max_frames: usize,
    pub grid_res_km: f64,
    pub grid_radius_km: f64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            bucket: "unidata-nexrad-level2".to_string(),
            region: "us-east-1".to_string(),
            default_site: "KTLX".to_string(),
            default_minutes_lookback: 10,
            lookback_minutes: 60,
            max_frames: 10,
            grid_res_km: 1.0,
            grid_radius_km: 240.0,
        }
    }
}

/// Satellite (GOES ABI) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteConfig {
    pub bucket: String,
    pub region: String,
    pub default_band: u8,
    pub default_sector: SatelliteSector,
    /// Timestamps retained per timeline index
    pub timeline_max: usize,
    /// How far back "latest" searches (minutes)
    pub latest_lookback_minutes: i64,
    /// Display units advertised in brightness temperature sidecars
    pub temperature_style: TemperatureStyle,
}

impl Default for SatelliteConfig {
    fn default() -> Self {
        Self {
            bucket: "noaa-goes16".to_string(),
            region: "us-east-1".to_string(),
            default_band: 13,
            default_sector: SatelliteSector::Conus,
            timeline_max: 12,
            latest_lookback_minutes: 240,
            temperature_style: TemperatureStyle::Kelvin,
        }
    }
}

/// Composite (MRMS mosaic) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeConfig {
    pub bucket: String,
    pub region: String,
    pub default_product: CompositeProduct,
    /// Timestamps retained per timeline index
    pub timeline_max: usize,
    /// Nominal spacing advertised in the timeline (minutes)
    pub cadence_minutes: u32,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            bucket: "noaa-mrms-pds".to_string(),
            region: "us-east-1".to_string(),
            default_product: CompositeProduct::ReflectivityQc,
            timeline_max: 12,
            cadence_minutes: 5,
        }
    }
}

/// Top-level ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Derived bucket (read-write)
    pub derived: ObjectStorageConfig,
    pub radar: RadarConfig,
    pub satellite: SatelliteConfig,
    pub composite: CompositeConfig,
    /// Concurrent pipeline invocations
    pub max_workers: usize,
    /// Retry budget for source archive requests
    pub source_max_retries: usize,
    /// Per-request timeout for source archive requests
    pub source_timeout_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            derived: ObjectStorageConfig {
                endpoint: "http://object-store:9000".to_string(),
                ..ObjectStorageConfig::default()
            },
            radar: RadarConfig::default(),
            satellite: SatelliteConfig::default(),
            composite: CompositeConfig::default(),
            max_workers: 2,
            source_max_retries: 5,
            source_timeout_secs: 60,
        }
    }
}

impl IngestionConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let derived = ObjectStorageConfig {
            endpoint: env_or("S3_ENDPOINT", defaults.derived.endpoint),
            bucket: env_or("S3_BUCKET_DERIVED", defaults.derived.bucket),
            access_key_id: env_or("S3_ACCESS_KEY", defaults.derived.access_key_id),
            secret_access_key: env_or("S3_SECRET_KEY", defaults.derived.secret_access_key),
            region: env_or("S3_REGION", defaults.derived.region),
            allow_http: env::var("S3_ALLOW_HTTP")
                .map(|v| v == "true")
                .unwrap_or(defaults.derived.allow_http),
            max_retries: parse_env("SOURCE_MAX_RETRIES", defaults.derived.max_retries)?,
        };

        let radar = RadarConfig {
            bucket: env_or("NEXRAD_BUCKET_NAME", defaults.radar.bucket),
            region: env_or("NEXRAD_SOURCE_REGION", defaults.radar.region),
            default_site: env_or("NEXRAD_DEFAULT_SITE", defaults.radar.default_site)
                .to_ascii_uppercase(),
            default_minutes_lookback: parse_env(
                "NEXRAD_DEFAULT_MINUTES_LOOKBACK",
                defaults.radar.default_minutes_lookback,
            )?,
            lookback_minutes: parse_env("NEXRAD_LOOKBACK_MINUTES", defaults.radar.lookback_minutes)?,
            max_frames: parse_env("NEXRAD_MAX_FRAMES", defaults.radar.max_frames)?,
            grid_res_km: parse_env("NEXRAD_GRID_RES_KM", defaults.radar.grid_res_km)?,
            grid_radius_km: parse_env("NEXRAD_GRID_RADIUS_KM", defaults.radar.grid_radius_km)?,
        };

        let satellite = SatelliteConfig {
            bucket: env_or("GOES_SOURCE_BUCKET", defaults.satellite.bucket),
            region: env_or("GOES_SOURCE_REGION", defaults.satellite.region),
            default_band: parse_env("GOES_DEFAULT_BAND", defaults.satellite.default_band)?,
            default_sector: parse_env("GOES_DEFAULT_SECTOR", defaults.satellite.default_sector)?,
            timeline_max: parse_env("GOES_TIMELINE_MAX", defaults.satellite.timeline_max)?,
            latest_lookback_minutes: parse_env(
                "GOES_LATEST_LOOKBACK_MINUTES",
                defaults.satellite.latest_lookback_minutes,
            )?,
            temperature_style: parse_env(
                "GOES_TEMPERATURE_STYLE",
                defaults.satellite.temperature_style,
            )?,
        };

        let composite = CompositeConfig {
            bucket: env_or("MRMS_SOURCE_BUCKET", defaults.composite.bucket),
            region: env_or("MRMS_SOURCE_REGION", defaults.composite.region),
            default_product: parse_env("MRMS_DEFAULT_PRODUCT", defaults.composite.default_product)?,
            timeline_max: parse_env("MRMS_TIMELINE_MAX", defaults.composite.timeline_max)?,
            cadence_minutes: parse_env("MRMS_CADENCE_MINUTES", defaults.composite.cadence_minutes)?,
        };

        let config = Self {
            derived,
            radar,
            satellite,
            composite,
            max_workers: parse_env("INGESTION_MAX_WORKERS", defaults.max_workers)?,
            source_max_retries: parse_env("SOURCE_MAX_RETRIES", defaults.source_max_retries)?,
            source_timeout_secs: parse_env("SOURCE_TIMEOUT_SECS", defaults.source_timeout_secs)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(IngestionError::Config(
                "INGESTION_MAX_WORKERS must be at least 1".to_string(),
            ));
        }
        if !(1..=16).contains(&self.satellite.default_band) {
            return Err(IngestionError::Config(format!(
                "GOES_DEFAULT_BAND must be 1..=16, got {}",
                self.satellite.default_band
            )));
        }
        if self.radar.max_frames == 0
            || self.satellite.timeline_max == 0
            || self.composite.timeline_max == 0
        {
            return Err(IngestionError::Config(
                "index retention must keep at least one entry".to_string(),
            ));
        }
        if !(self.radar.grid_res_km > 0.0 && self.radar.grid_radius_km >= self.radar.grid_res_km) {
            return Err(IngestionError::Config(format!(
                "invalid radar grid: radius {} km at {} km resolution",
                self.radar.grid_radius_km, self.radar.grid_res_km
            )));
        }
        if self.radar.default_minutes_lookback < 0
            || self.radar.lookback_minutes < 0
            || self.satellite.latest_lookback_minutes < 0
        {
            return Err(IngestionError::Config(
                "lookback windows must not be negative".to_string(),
            ));
        }
        if self.radar.default_site.is_empty() {
            return Err(IngestionError::Config(
                "NEXRAD_DEFAULT_SITE must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Anonymous client settings for the Level II archive.
    pub fn radar_source(&self) -> SourceArchiveConfig {
        SourceArchiveConfig {
            bucket: self.radar.bucket.clone(),
            region: self.radar.region.clone(),
            max_retries: self.source_max_retries,
            timeout_secs: self.source_timeout_secs,
        }
    }

    /// Anonymous client settings for the ABI archive.
    pub fn satellite_source(&self) -> SourceArchiveConfig {
        SourceArchiveConfig {
            bucket: self.satellite.bucket.clone(),
            region: self.satellite.region.clone(),
            max_retries: self.source_max_retries,
            timeout_secs: self.source_timeout_secs,
        }
    }

    /// Anonymous client settings for the MRMS archive.
    pub fn composite_source(&self) -> SourceArchiveConfig {
        SourceArchiveConfig {
            bucket: self.composite.bucket.clone(),
            region: self.composite.region.clone(),
            max_retries: self.source_max_retries,
            timeout_secs: self.source_timeout_secs,
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| IngestionError::Config(format!("{}={:?}: {}", key, raw, e))),
        _ => Ok(default),
    }
}
