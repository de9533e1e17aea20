//! Raster Encoder: COG bytes plus the metadata sidecar.
//!
//! The sidecar is a stable contract read by legend and display endpoints.
//! Rescale ranges are fixed per product, never derived from the data.

use atmos_common::{CompositeProduct, SatelliteSector, TemperatureStyle, TimestampKey};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use cog_writer::{write_cog, CogOptions, GeoRaster};
use projection::RadarSite;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::decode::{DecodedObservation, FIRST_IR_BAND};
use crate::error::{IngestionError, Result};
use crate::regrid::RasterArtifact;

/// Display range for reflectivity (dBZ).
pub const RADAR_RESCALE: [f64; 2] = [-30.0, 75.0];
pub const RADAR_PALETTE: &str = "nexrad_reflectivity";
pub const RADAR_PRODUCT: &str = "NEXRAD Level II";

/// Display range for the MRMS composite (dBZ).
pub const COMPOSITE_RESCALE: [f64; 2] = [-30.0, 80.0];
pub const COMPOSITE_PRODUCT: &str = "MRMS Merged Reflectivity Composite";

/// Display range for an ABI band: band 13 clean IR, other IR, visible.
pub fn satellite_rescale(band: u8) -> [f64; 2] {
    match band {
        13 => [180.0, 330.0],
        b if b >= FIRST_IR_BAND => [180.0, 320.0],
        _ => [0.0, 1.0],
    }
}

/// Radar antenna position as written to the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarLocationMeta {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
}

impl From<&RadarSite> for RadarLocationMeta {
    fn from(site: &RadarSite) -> Self {
        Self {
            latitude: site.latitude,
            longitude: site.longitude,
            elevation_m: site.altitude_m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridInfo {
    pub resolution_m: f64,
    pub extent_km: f64,
    pub shape: [usize; 2],
}

/// How viewers should present a brightness temperature raster. Pixel
/// values stay in Kelvin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayScale {
    pub style: TemperatureStyle,
    pub units: String,
    pub rescale: [f64; 2],
}

impl DisplayScale {
    pub fn new(style: TemperatureStyle, rescale_kelvin: [f64; 2]) -> Self {
        Self {
            style,
            units: style.units().to_string(),
            rescale: style.convert_range(rescale_kelvin),
        }
    }
}

/// Product-specific sidecar fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductDetails {
    Radar {
        site: String,
        field: String,
        radar_location: RadarLocationMeta,
        grid_info: GridInfo,
        color_palette: String,
    },
    Satellite {
        band: u8,
        sector: SatelliteSector,
        satellite: String,
        instrument: String,
        update_cadence: String,
        processing: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display: Option<DisplayScale>,
    },
    Composite {
        mosaic: CompositeProduct,
        coverage: String,
        resolution: String,
        color_palette: String,
        update_cadence: String,
    },
}

/// The metadata sidecar stored next to every raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub product: String,
    pub units: String,
    pub rescale: [f64; 2],
    /// `[west, south, east, north]`
    pub bounds: [f64; 4],
    /// `[rows, cols]`
    pub shape: [usize; 2],
    pub crs: String,
    pub nodata: f32,
    pub provenance: String,
    pub caveats: Vec<String>,
    pub timestamp: String,
    pub timestamp_key: TimestampKey,
    pub source_key: String,
    /// Filled in by the publisher once the key is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cog_key: Option<String>,
    #[serde(flatten)]
    pub details: ProductDetails,
}

impl ArtifactMetadata {
    /// Sidecar for a regridded radar sweep observed by the radar at `location`.
    #[allow(clippy::too_many_arguments)]
    pub fn radar(
        site: &str,
        location: &RadarSite,
        observation: &DecodedObservation,
        artifact: &RasterArtifact,
        observed_at: DateTime<Utc>,
        source_key: &str,
        radius_km: f64,
        resolution_km: f64,
    ) -> Self {
        let location = RadarLocationMeta::from(location);

        let mut caveats = observation.caveats.clone();
        caveats.push(
            "Nearest-cell polar to Cartesian mapping; gaps possible between radials at long range"
                .to_string(),
        );

        Self::base(
            RADAR_PRODUCT,
            observation,
            artifact,
            RADAR_RESCALE,
            "NOAA NEXRAD Level II",
            caveats,
            observed_at,
            source_key,
            ProductDetails::Radar {
                site: site.to_string(),
                field: observation.field_name.clone(),
                radar_location: location,
                grid_info: GridInfo {
                    resolution_m: resolution_km * 1000.0,
                    extent_km: radius_km,
                    shape: [artifact.rows(), artifact.cols()],
                },
                color_palette: RADAR_PALETTE.to_string(),
            },
        )
    }

    /// Sidecar for a regridded ABI band. `style` only applies when the
    /// decoder produced brightness temperature.
    pub fn satellite(
        band: u8,
        sector: SatelliteSector,
        observation: &DecodedObservation,
        artifact: &RasterArtifact,
        observed_at: DateTime<Utc>,
        source_key: &str,
        style: TemperatureStyle,
    ) -> Self {
        let satellite = observation
            .sensor_metadata
            .get("satellite")
            .and_then(Value::as_str)
            .unwrap_or("GOES-16")
            .to_string();

        let mut caveats = observation.caveats.clone();
        caveats.push("Reprojection artifacts possible at edge of coverage".to_string());

        let rescale = satellite_rescale(band);
        let display = (observation.units == "K").then(|| DisplayScale::new(style, rescale));

        Self::base(
            &format!("GOES ABI Band {}", band),
            observation,
            artifact,
            rescale,
            "NOAA GOES-East",
            caveats,
            observed_at,
            source_key,
            ProductDetails::Satellite {
                band,
                sector,
                satellite,
                instrument: "ABI".to_string(),
                update_cadence: "10 minutes".to_string(),
                processing: "Geostationary projection to geographic coordinates".to_string(),
                display,
            },
        )
    }

    /// Sidecar for a regridded MRMS mosaic.
    pub fn composite(
        product: CompositeProduct,
        observation: &DecodedObservation,
        artifact: &RasterArtifact,
        observed_at: DateTime<Utc>,
        source_key: &str,
    ) -> Self {
        let mut caveats = observation.caveats.clone();
        caveats.push("Composite product from multiple radars".to_string());
        caveats.push("Some interpolation artifacts possible".to_string());

        Self::base(
            COMPOSITE_PRODUCT,
            observation,
            artifact,
            COMPOSITE_RESCALE,
            "NOAA MRMS",
            caveats,
            observed_at,
            source_key,
            ProductDetails::Composite {
                mosaic: product,
                coverage: "CONUS".to_string(),
                resolution: "~2.5km".to_string(),
                color_palette: RADAR_PALETTE.to_string(),
                update_cadence: "2-5 minutes".to_string(),
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn base(
        product: &str,
        observation: &DecodedObservation,
        artifact: &RasterArtifact,
        rescale: [f64; 2],
        provenance: &str,
        caveats: Vec<String>,
        observed_at: DateTime<Utc>,
        source_key: &str,
        details: ProductDetails,
    ) -> Self {
        Self {
            product: product.to_string(),
            units: observation.units.clone(),
            rescale,
            bounds: artifact.bounds.to_array(),
            shape: [artifact.rows(), artifact.cols()],
            crs: artifact.crs.clone(),
            nodata: artifact.nodata_value,
            provenance: provenance.to_string(),
            caveats,
            timestamp: observed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            timestamp_key: TimestampKey::from_datetime(&observed_at),
            source_key: source_key.to_string(),
            cog_key: None,
            details,
        }
    }

    pub fn to_json_bytes(&self) -> Result<Bytes> {
        serde_json::to_vec_pretty(self)
            .map(Bytes::from)
            .map_err(|e| IngestionError::Encode(format!("failed to serialize metadata: {}", e)))
    }
}

/// Encoder output handed to the publisher.
#[derive(Debug, Clone)]
pub struct EncodedArtifact {
    pub cog: Bytes,
    pub metadata: ArtifactMetadata,
}

/// Writes rasters as COGs.
#[derive(Debug, Clone, Default)]
pub struct RasterEncoder {
    options: CogOptions,
}

impl RasterEncoder {
    pub fn new(options: CogOptions) -> Self {
        Self { options }
    }

    /// Encode `artifact`. Keys are not decided here.
    pub fn encode(
        &self,
        artifact: &RasterArtifact,
        metadata: ArtifactMetadata,
    ) -> Result<EncodedArtifact> {
        let raster = GeoRaster {
            data: &artifact.grid,
            width: artifact.cols(),
            height: artifact.rows(),
            bounds: artifact.bounds,
            nodata: artifact.nodata_value,
        };
        let cog = write_cog(&raster, &self.options)?;
        debug!(
            bytes = cog.len(),
            rows = artifact.rows(),
            cols = artifact.cols(),
            "Encoded COG"
        );
        Ok(EncodedArtifact {
            cog: Bytes::from(cog),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{FieldGrid, Geolocation};
    use crate::regrid::NODATA;
    use atmos_common::BoundingBox;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn artifact() -> RasterArtifact {
        RasterArtifact {
            grid: vec![NODATA, 12.5, 30.0, NODATA],
            nodata_value: NODATA,
            bounds: BoundingBox::new(-98.0, 34.0, -96.0, 36.0),
            shape: (2, 2),
            crs: "EPSG:4326".into(),
            valid_cells: 2,
        }
    }

    fn ktlx() -> RadarSite {
        RadarSite::new(35.3331, -97.2778, 384.0)
    }

    fn radar_observation() -> DecodedObservation {
        DecodedObservation {
            raw_field: FieldGrid {
                rows: 0,
                cols: 0,
                values: vec![],
            },
            field_name: "reflectivity".into(),
            units: "dBZ".into(),
            geolocation: Geolocation::Polar {
                site: ktlx(),
                radials: vec![],
            },
            caveats: vec![],
            sensor_metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_satellite_rescale() {
        assert_eq!(satellite_rescale(13), [180.0, 330.0]);
        assert_eq!(satellite_rescale(7), [180.0, 320.0]);
        assert_eq!(satellite_rescale(16), [180.0, 320.0]);
        assert_eq!(satellite_rescale(2), [0.0, 1.0]);
    }

    #[test]
    fn test_radar_sidecar_contract() {
        let observed = test_utils::utc(2025, 1, 1, 1, 2, 3);
        let meta = ArtifactMetadata::radar(
            "KTLX",
            &ktlx(),
            &radar_observation(),
            &artifact(),
            observed,
            "2025/01/01/KTLX/KTLX20250101_010203_V06",
            240.0,
            1.0,
        );
        let value = serde_json::to_value(&meta).unwrap();

        assert_eq!(value["units"], json!("dBZ"));
        assert_eq!(value["rescale"], json!([-30.0, 75.0]));
        assert_eq!(value["bounds"], json!([-98.0, 34.0, -96.0, 36.0]));
        assert_eq!(value["shape"], json!([2, 2]));
        assert_eq!(value["nodata"], json!(-9999.0));
        assert_eq!(value["timestamp"], json!("2025-01-01T01:02:03Z"));
        assert_eq!(value["timestamp_key"], json!("20250101T010203Z"));
        assert_eq!(value["site"], json!("KTLX"));
        assert_eq!(value["color_palette"], json!("nexrad_reflectivity"));
        assert_eq!(value["grid_info"]["extent_km"], json!(240.0));
        assert_eq!(value["grid_info"]["resolution_m"], json!(1000.0));
        assert_eq!(value["radar_location"]["latitude"], json!(35.3331));
        assert_eq!(value["radar_location"]["longitude"], json!(-97.2778));
        assert_eq!(value["radar_location"]["elevation_m"], json!(384.0));
        assert!(value["provenance"].is_string());
        assert!(!value["caveats"].as_array().unwrap().is_empty());
        assert!(value.get("cog_key").is_none());
    }

    #[test]
    fn test_sidecar_roundtrips_through_json() {
        let meta = ArtifactMetadata::radar(
            "KTLX",
            &ktlx(),
            &radar_observation(),
            &artifact(),
            test_utils::utc(2025, 1, 1, 1, 2, 3),
            "src",
            240.0,
            1.0,
        );
        let bytes = meta.to_json_bytes().unwrap();
        let back: ArtifactMetadata = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, meta);
    }

    fn satellite_observation(units: &str) -> DecodedObservation {
        DecodedObservation {
            raw_field: FieldGrid {
                rows: 0,
                cols: 0,
                values: vec![],
            },
            field_name: "Rad".into(),
            units: units.into(),
            geolocation: Geolocation::Geostationary {
                projection: projection::Geostationary::goes_east(),
                x: vec![],
                y: vec![],
            },
            caveats: vec![],
            sensor_metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_satellite_display_scale() {
        let observed = test_utils::utc(2025, 1, 1, 1, 2, 3);
        let meta = ArtifactMetadata::satellite(
            13,
            SatelliteSector::Conus,
            &satellite_observation("K"),
            &artifact(),
            observed,
            "src",
            TemperatureStyle::Celsius,
        );
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["units"], json!("K"));
        assert_eq!(value["rescale"], json!([180.0, 330.0]));
        assert_eq!(value["band"], json!(13));
        assert_eq!(value["display"]["style"], json!("celsius"));
        assert_eq!(value["display"]["units"], json!("°C"));
        let low = value["display"]["rescale"][0].as_f64().unwrap();
        assert!((low + 93.15).abs() < 1e-9, "low {}", low);

        let back: ArtifactMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, meta);

        // Raw radiance keeps its native units and gets no display hint
        let raw = ArtifactMetadata::satellite(
            13,
            SatelliteSector::Conus,
            &satellite_observation("mW m-2 sr-1 (cm-1)-1"),
            &artifact(),
            observed,
            "src",
            TemperatureStyle::Celsius,
        );
        assert!(serde_json::to_value(&raw).unwrap().get("display").is_none());
    }

    #[test]
    fn test_composite_sidecar_contract() {
        let mut observation = radar_observation();
        observation.field_name = "MergedReflectivityQComposite".into();
        let meta = ArtifactMetadata::composite(
            CompositeProduct::ReflectivityQc,
            &observation,
            &artifact(),
            test_utils::utc(2025, 1, 1, 11, 56, 38),
            "2025/01/01/MergedReflectivityQComposite/x.grib2.gz",
        );
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["product"], json!("MRMS Merged Reflectivity Composite"));
        assert_eq!(value["units"], json!("dBZ"));
        assert_eq!(value["rescale"], json!([-30.0, 80.0]));
        assert_eq!(value["provenance"], json!("NOAA MRMS"));
        assert_eq!(value["mosaic"], json!("reflq"));
        assert_eq!(value["coverage"], json!("CONUS"));
        assert_eq!(value["color_palette"], json!("nexrad_reflectivity"));
        assert_eq!(value["update_cadence"], json!("2-5 minutes"));
        assert_eq!(
            value["caveats"],
            json!([
                "Composite product from multiple radars",
                "Some interpolation artifacts possible"
            ])
        );

        let back: ArtifactMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_encode_produces_tiff() {
        let meta = ArtifactMetadata::radar(
            "KTLX",
            &ktlx(),
            &radar_observation(),
            &artifact(),
            test_utils::utc(2025, 1, 1, 1, 2, 3),
            "src",
            240.0,
            1.0,
        );
        let encoded = RasterEncoder::default().encode(&artifact(), meta).unwrap();
        assert_eq!(&encoded.cog[..4], b"II*\0");
        assert_eq!(encoded.metadata.shape, [2, 2]);
    }
}
