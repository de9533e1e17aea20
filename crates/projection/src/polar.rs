//! Polar radar geometry.
//!
//! Gate positions follow the standard 4/3 effective Earth radius beam
//! propagation model, then an azimuthal equidistant projection centred on
//! the radar converts ground-plane offsets to longitude/latitude.
//!
//! Reference: Doviak and Zrnic, Doppler Radar and Weather Observations, 2.28

use atmos_common::BoundingBox;

/// Mean Earth radius used for beam propagation (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Standard atmosphere refraction factor.
pub const EFFECTIVE_RADIUS_FACTOR: f64 = 4.0 / 3.0;

/// Sphere radius for the azimuthal equidistant projection (meters).
const AEQD_RADIUS_M: f64 = 6_370_997.0;

/// Kilometres per degree of longitude at the equator.
pub const KM_PER_DEG_LON: f64 = 111.32;

/// Kilometres per degree of latitude.
pub const KM_PER_DEG_LAT: f64 = 110.54;

/// Radar antenna location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarSite {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Antenna height above mean sea level (meters)
    pub altitude_m: f64,
}

impl RadarSite {
    pub fn new(latitude: f64, longitude: f64, altitude_m: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude_m,
        }
    }

    /// Ground-plane offset (east, north) in meters and beam height above the
    /// antenna for a gate at slant `range_m` along `azimuth_deg`/`elevation_deg`.
    pub fn gate_offset(&self, azimuth_deg: f64, range_m: f64, elevation_deg: f64) -> (f64, f64, f64) {
        let re = EARTH_RADIUS_M * EFFECTIVE_RADIUS_FACTOR;
        let el = elevation_deg.to_radians();
        let az = azimuth_deg.to_radians();

        let z = (range_m * range_m + re * re + 2.0 * range_m * re * el.sin()).sqrt() - re;
        let s = re * (range_m * el.cos() / (re + z)).asin();

        (s * az.sin(), s * az.cos(), z)
    }

    /// Longitude/latitude of a gate.
    pub fn gate_to_geo(&self, azimuth_deg: f64, range_m: f64, elevation_deg: f64) -> (f64, f64) {
        let (x, y, _) = self.gate_offset(azimuth_deg, range_m, elevation_deg);
        self.offset_to_geo(x, y)
    }

    /// Inverse azimuthal equidistant projection of a ground offset (meters).
    pub fn offset_to_geo(&self, x: f64, y: f64) -> (f64, f64) {
        let lat0 = self.latitude.to_radians();
        let lon0 = self.longitude.to_radians();

        let rho = x.hypot(y);
        if rho == 0.0 {
            return (self.longitude, self.latitude);
        }
        let c = rho / AEQD_RADIUS_M;

        let lat = (c.cos() * lat0.sin() + y * c.sin() * lat0.cos() / rho).asin();
        let lon = lon0
            + (x * c.sin()).atan2(rho * lat0.cos() * c.cos() - y * lat0.sin() * c.sin());

        let mut lon_deg = lon.to_degrees();
        if lon_deg > 180.0 {
            lon_deg -= 360.0;
        } else if lon_deg < -180.0 {
            lon_deg += 360.0;
        }
        (lon_deg, lat.to_degrees())
    }

    /// Square extent of half-width `radius_km` centred on the radar.
    ///
    /// Uses flat per-degree distances with the longitude span widened by
    /// `1 / cos(latitude)`.
    pub fn extent(&self, radius_km: f64) -> BoundingBox {
        let cos_lat = self.latitude.to_radians().cos().max(1e-6);
        let dlon = radius_km / (KM_PER_DEG_LON * cos_lat);
        let dlat = radius_km / KM_PER_DEG_LAT;
        BoundingBox::new(
            self.longitude - dlon,
            self.latitude - dlat,
            self.longitude + dlon,
            self.latitude + dlat,
        )
    }
}
