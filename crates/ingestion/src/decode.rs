//! Format Decoder: source archive bytes to a typed field plus geolocation.

use std::collections::BTreeMap;

use grib2_parser::LatLonGrid;
use netcdf_parser::{AbiSource, NetCdfDataset, NetCdfResult};
use projection::{Geostationary, RadarSite};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{IngestionError, Result};

/// Radar reflectivity field names, highest priority first.
pub const RADAR_FIELD_ALIASES: &[&str] = &["reflectivity", "DBZH", "DBZ", "reflectivity_horizontal"];

/// ABI data variable names, highest priority first. When none is present,
/// the first variable whose name contains one of
/// [`SATELLITE_FIELD_PATTERNS`] is used.
pub const SATELLITE_FIELD_ALIASES: &[&str] = &["Rad", "CMI"];
pub const SATELLITE_FIELD_PATTERNS: &[&str] = &["rad", "cmi", "brightness"];

/// Planck constants required for brightness temperature.
const PLANCK_VARIABLES: [&str; 4] = ["planck_fk1", "planck_fk2", "planck_bc1", "planck_bc2"];

/// First ABI infrared band; lower bands are visible/near-IR reflectance.
pub const FIRST_IR_BAND: u8 = 7;

pub const RADIANCE_UNITS: &str = "mW m-2 sr-1 (cm-1)-1";

/// MRMS writes -999 for missing and -99 for no coverage.
pub const COMPOSITE_MISSING_THRESHOLD: f32 = -99.0;
/// A composite peaking above this is linear reflectivity (Z), not dBZ.
pub const COMPOSITE_LINEAR_THRESHOLD: f32 = 100.0;
/// Floor applied to linear reflectivity before taking the logarithm.
const MIN_LINEAR_REFLECTIVITY: f32 = 0.01;

/// A row-major 2D float field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGrid {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f32>,
}

impl FieldGrid {
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.cols + col]
    }

    /// Count of finite values.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }
}

/// Pointing of one radar radial; row `i` of the field is radial `i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialGeometry {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub first_gate_m: f64,
    pub gate_spacing_m: f64,
}

/// How field cells map to the ground.
#[derive(Debug, Clone, PartialEq)]
pub enum Geolocation {
    /// One row per radial, one column per gate.
    Polar {
        site: RadarSite,
        radials: Vec<RadialGeometry>,
    },
    /// Row `r` at scan angle `y[r]`, column `c` at `x[c]` (radians).
    Geostationary {
        projection: Geostationary,
        x: Vec<f64>,
        y: Vec<f64>,
    },
    /// Regular lat/lon grid in scan order.
    LatLon { grid: LatLonGrid },
}

impl Geolocation {
    /// Longitude/latitude of cell `(row, col)`, `None` where the geometry has
    /// no ground intersection.
    pub fn locate(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        match self {
            Geolocation::Polar { site, radials } => {
                let radial = radials.get(row)?;
                let range = radial.first_gate_m + col as f64 * radial.gate_spacing_m;
                Some(site.gate_to_geo(radial.azimuth_deg, range, radial.elevation_deg))
            }
            Geolocation::Geostationary { projection, x, y } => {
                projection.scan_to_geo(*x.get(col)?, *y.get(row)?)
            }
            Geolocation::LatLon { grid } => {
                (row < grid.nj && col < grid.ni).then(|| grid.locate(row, col))
            }
        }
    }
}

/// A decoded observation, owned by one pipeline run.
#[derive(Debug, Clone)]
pub struct DecodedObservation {
    pub raw_field: FieldGrid,
    /// Variable or moment the field came from
    pub field_name: String,
    pub units: String,
    pub geolocation: Geolocation,
    /// Conditions a consumer should know about (e.g. uncalibrated values)
    pub caveats: Vec<String>,
    pub sensor_metadata: BTreeMap<String, Value>,
}

impl DecodedObservation {
    /// `(lon, lat, value)` of every finite cell. Geolocation failures are
    /// yielded as NaN coordinates for the regridder to filter.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64, f32)> + '_ {
        let cols = self.raw_field.cols;
        self.raw_field
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(move |(i, &v)| {
                let (lon, lat) = self
                    .geolocation
                    .locate(i / cols, i % cols)
                    .unwrap_or((f64::NAN, f64::NAN));
                (lon, lat, v)
            })
    }
}

/// Decode a Level II archive, keeping the lowest sweep carrying reflectivity.
pub fn decode_radar(data: &[u8]) -> Result<DecodedObservation> {
    let volume = nexrad_parser::decode(data)?;

    let available = volume.field_names();
    let Some(field) = RADAR_FIELD_ALIASES
        .iter()
        .find(|alias| available.iter().any(|name| name == *alias))
    else {
        return Err(IngestionError::UnsupportedFormat { available });
    };

    let sweep = volume
        .sweeps
        .iter()
        .find(|s| s.field_names().contains(*field))
        .ok_or_else(|| IngestionError::Decode(format!("no sweep carries {}", field)))?;

    let location = volume.location.ok_or_else(|| {
        IngestionError::Decode("volume has no site location block".to_string())
    })?;
    let site = RadarSite::new(location.latitude, location.longitude, location.altitude_m);

    let rows: Vec<_> = sweep.moments(field).collect();
    let cols = rows.iter().map(|(_, _, m)| m.values.len()).max().unwrap_or(0);
    let mut values = Vec::with_capacity(rows.len() * cols);
    let mut radials = Vec::with_capacity(rows.len());
    for (azimuth, elevation, moment) in &rows {
        values.extend_from_slice(&moment.values);
        values.extend(std::iter::repeat(f32::NAN).take(cols - moment.values.len()));
        radials.push(RadialGeometry {
            azimuth_deg: f64::from(*azimuth),
            elevation_deg: f64::from(*elevation),
            first_gate_m: moment.first_gate_m,
            gate_spacing_m: moment.gate_spacing_m,
        });
    }

    let mut sensor_metadata = BTreeMap::new();
    sensor_metadata.insert("icao".to_string(), json!(volume.header.icao));
    sensor_metadata.insert("volume_start".to_string(), json!(volume.header.started_at));
    sensor_metadata.insert("vcp".to_string(), json!(volume.vcp));
    sensor_metadata.insert("elevation_number".to_string(), json!(sweep.elevation_number));
    sensor_metadata.insert("elevation_deg".to_string(), json!(sweep.mean_elevation()));
    sensor_metadata.insert(
        "radar_location".to_string(),
        json!({
            "latitude": location.latitude,
            "longitude": location.longitude,
            "elevation_m": location.altitude_m,
        }),
    );

    debug!(
        icao = %volume.header.icao,
        field = %field,
        radials = radials.len(),
        gates = cols,
        "Decoded radar sweep"
    );

    Ok(DecodedObservation {
        raw_field: FieldGrid {
            rows: radials.len(),
            cols,
            values,
        },
        field_name: field.to_string(),
        units: "dBZ".to_string(),
        geolocation: Geolocation::Polar { site, radials },
        caveats: Vec::new(),
        sensor_metadata,
    })
}

/// Decode an MRMS composite. Missing and no-coverage flags become NaN, and a
/// field in linear units is converted to dBZ.
pub fn decode_composite(data: &[u8]) -> Result<DecodedObservation> {
    let field = grib2_parser::decode_field(data)?;
    let (rows, cols) = (field.rows(), field.cols());

    let mut values: Vec<f32> = field
        .values
        .into_iter()
        .map(|v| {
            if v.is_finite() && v > COMPOSITE_MISSING_THRESHOLD {
                v
            } else {
                f32::NAN
            }
        })
        .collect();

    let mut caveats = Vec::new();
    let peak = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    if peak > COMPOSITE_LINEAR_THRESHOLD {
        info!(peak, "Composite looks linear, converting to dBZ");
        for v in values.iter_mut().filter(|v| v.is_finite()) {
            *v = 10.0 * v.max(MIN_LINEAR_REFLECTIVITY).log10();
        }
        caveats.push("Converted from linear reflectivity to dBZ".to_string());
    }

    let mut sensor_metadata = BTreeMap::new();
    sensor_metadata.insert(
        "reference_time".to_string(),
        json!(field.reference_time.to_rfc3339()),
    );
    sensor_metadata.insert("center".to_string(), json!(field.center));
    sensor_metadata.insert(
        "parameter".to_string(),
        json!({
            "discipline": field.discipline,
            "category": field.parameter.category,
            "number": field.parameter.number,
        }),
    );
    sensor_metadata.insert(
        "source_grid".to_string(),
        json!({
            "ni": cols,
            "nj": rows,
            "di_deg": field.grid.di,
            "dj_deg": field.grid.dj,
        }),
    );

    debug!(rows, cols, "Decoded MRMS composite");

    Ok(DecodedObservation {
        raw_field: FieldGrid { rows, cols, values },
        field_name: "MergedReflectivityQComposite".to_string(),
        units: "dBZ".to_string(),
        geolocation: Geolocation::LatLon { grid: field.grid },
        caveats,
        sensor_metadata,
    })
}

/// Pick the ABI data variable by alias, then by name pattern.
pub fn select_satellite_field(names: &[String]) -> Option<&str> {
    SATELLITE_FIELD_ALIASES
        .iter()
        .find_map(|alias| names.iter().find(|n| n == alias))
        .or_else(|| {
            names.iter().find(|n| {
                let lower = n.to_ascii_lowercase();
                SATELLITE_FIELD_PATTERNS.iter().any(|p| lower.contains(p))
            })
        })
        .map(String::as_str)
}

/// Decode an ABI dataset. Radiance from IR bands is converted to brightness
/// temperature only when every Planck constant is present.
pub fn decode_satellite(source: &dyn AbiSource, band: u8) -> Result<DecodedObservation> {
    let mut names = source.variable_names();
    names.sort();
    let field_name = select_satellite_field(&names)
        .ok_or_else(|| IngestionError::UnsupportedFormat {
            available: names.clone(),
        })?
        .to_string();

    let field = source.read_field(&field_name)?;
    let scan = source.scan_angles()?;
    let projection = source.projection()?;
    if scan.x.len() != field.cols || scan.y.len() != field.rows {
        return Err(IngestionError::Decode(format!(
            "{} is {}x{} but scan angles are {}x{}",
            field_name,
            field.rows,
            field.cols,
            scan.y.len(),
            scan.x.len()
        )));
    }

    let is_radiance = field_name != "CMI" && !field_name.to_ascii_lowercase().contains("brightness");
    let native_units = field.units.clone().unwrap_or_else(|| RADIANCE_UNITS.to_string());
    let mut caveats = Vec::new();

    let (values, units) = if band >= FIRST_IR_BAND && is_radiance {
        match planck_constants(source) {
            Some(planck) => {
                info!(band, "Converting radiance to brightness temperature");
                let bt = field
                    .values
                    .iter()
                    .map(|&rad| brightness_temperature(rad, planck))
                    .collect();
                (bt, "K".to_string())
            }
            None => {
                warn!(band, "Missing Planck constants, keeping raw radiance");
                caveats.push(
                    "Brightness temperature not derived: Planck calibration constants missing; values are radiance"
                        .to_string(),
                );
                (field.values, native_units)
            }
        }
    } else {
        (field.values, native_units)
    };

    let mut sensor_metadata = BTreeMap::new();
    sensor_metadata.insert("band".to_string(), json!(band));
    let platform = source.global_attribute("platform_ID");
    sensor_metadata.insert(
        "satellite".to_string(),
        json!(satellite_name(platform.as_deref())),
    );
    if let Some(platform) = platform {
        sensor_metadata.insert("platform_id".to_string(), json!(platform));
    }
    sensor_metadata.insert(
        "longitude_of_projection_origin".to_string(),
        json!(projection.longitude_origin()),
    );

    debug!(
        field = %field_name,
        rows = field.rows,
        cols = field.cols,
        units = %units,
        "Decoded ABI field"
    );

    Ok(DecodedObservation {
        raw_field: FieldGrid {
            rows: field.rows,
            cols: field.cols,
            values,
        },
        field_name,
        units,
        geolocation: Geolocation::Geostationary {
            projection,
            x: scan.x,
            y: scan.y,
        },
        caveats,
        sensor_metadata,
    })
}

/// `(fk1, fk2, bc1, bc2)` when all four are present.
fn planck_constants(source: &dyn AbiSource) -> Option<(f64, f64, f64, f64)> {
    let [fk1, fk2, bc1, bc2] = PLANCK_VARIABLES.map(|name| source.read_scalar(name));
    Some((fk1?, fk2?, bc1?, bc2?))
}

/// Inverse Planck function. Non-physical results become NaN.
pub fn brightness_temperature(radiance: f32, planck: (f64, f64, f64, f64)) -> f32 {
    let (fk1, fk2, bc1, bc2) = planck;
    let rad = f64::from(radiance);
    if !rad.is_finite() || rad <= 0.0 {
        return f32::NAN;
    }
    let bt = (fk2 / (fk1 / rad + 1.0).ln() - bc1) / bc2;
    if bt.is_finite() && bt > 0.0 {
        bt as f32
    } else {
        f32::NAN
    }
}

/// Human-readable satellite name from the `platform_ID` attribute.
pub fn satellite_name(platform_id: Option<&str>) -> String {
    match platform_id {
        Some(id) if id.len() > 1 && id.starts_with('G') => format!("GOES-{}", &id[1..]),
        _ => "GOES-16".to_string(),
    }
}

/// Opens ABI bytes as a dataset. The service uses libnetcdf; tests swap in
/// in-memory datasets.
pub trait AbiOpener: Send + Sync {
    fn open(&self, data: &[u8]) -> NetCdfResult<Box<dyn AbiSource>>;
}

/// Opens NetCDF-4 files through libnetcdf.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetCdfOpener;

impl AbiOpener for NetCdfOpener {
    fn open(&self, data: &[u8]) -> NetCdfResult<Box<dyn AbiSource>> {
        Ok(Box::new(NetCdfDataset::from_bytes(data)?))
    }
}
