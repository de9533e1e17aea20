//! GOES-R ABI fixed grid geometry.
//!
//! ABI pixels are addressed by scan angles (radians): `x` sweeps east-west,
//! `y` north-south, both measured at the satellite from the nadir line.
//! Formulas follow the GOES-R PUG Volume 4 navigation appendix.

/// Viewing geometry read from an ABI file's `goes_imager_projection`.
#[derive(Debug, Clone, PartialEq)]
pub struct Geostationary {
    /// Distance from Earth center to the satellite (meters)
    pub h: f64,
    /// Height of the satellite above the equator (meters)
    pub perspective_point_height: f64,
    /// Equatorial radius (meters)
    pub req: f64,
    /// Polar radius (meters)
    pub rpol: f64,
    /// Sub-satellite longitude (radians)
    pub lambda_0: f64,
}

impl Geostationary {
    pub fn new(
        perspective_point_height: f64,
        semi_major_axis: f64,
        semi_minor_axis: f64,
        longitude_origin_deg: f64,
    ) -> Self {
        Self {
            h: perspective_point_height + semi_major_axis,
            perspective_point_height,
            req: semi_major_axis,
            rpol: semi_minor_axis,
            lambda_0: longitude_origin_deg.to_radians(),
        }
    }

    /// GOES-East nominal slot (75.0°W, GRS80).
    pub fn goes_east() -> Self {
        Self::new(35_786_023.0, 6_378_137.0, 6_356_752.31414, -75.0)
    }

    pub fn longitude_origin(&self) -> f64 {
        self.lambda_0.to_degrees()
    }

    /// `(req / rpol)^2`
    fn axis_ratio_sq(&self) -> f64 {
        let r = self.req / self.rpol;
        r * r
    }

    /// Ground point `(lon, lat)` in degrees seen at scan angles `(x, y)`,
    /// `None` when the line of sight misses the Earth.
    pub fn scan_to_geo(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (sin_x, cos_x) = x.sin_cos();
        let (sin_y, cos_y) = y.sin_cos();
        let ratio = self.axis_ratio_sq();

        // Distance along the line of sight solves a * rs^2 + b * rs + c = 0
        let a = sin_x * sin_x + cos_x * cos_x * (cos_y * cos_y + ratio * sin_y * sin_y);
        let b = -2.0 * self.h * cos_x * cos_y;
        let c = self.h * self.h - self.req * self.req;
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return None;
        }
        let rs = (-b - disc.sqrt()) / (2.0 * a);

        let sx = rs * cos_x * cos_y;
        let sy = -rs * sin_x;
        let sz = rs * cos_x * sin_y;

        let lat = (ratio * sz / (self.h - sx).hypot(sy)).atan();
        let lon = self.lambda_0 - sy.atan2(self.h - sx);
        Some((lon.to_degrees(), lat.to_degrees()))
    }

    /// Scan angles `(x, y)` of a ground point, `None` beyond the limb.
    pub fn geo_to_scan(&self, lon_deg: f64, lat_deg: f64) -> Option<(f64, f64)> {
        let lat = lat_deg.to_radians();
        let dlon = lon_deg.to_radians() - self.lambda_0;

        // Great-circle distance from nadir must stay inside the visible cap
        if (lat.cos() * dlon.cos()).acos() > (self.req / self.h).acos() {
            return None;
        }

        let ratio_inv = (self.rpol / self.req).powi(2);
        let phi_c = (ratio_inv * lat.tan()).atan();
        let e2 = 1.0 - ratio_inv;
        let rc = self.rpol / (1.0 - e2 * phi_c.cos().powi(2)).sqrt();

        let sx = self.h - rc * phi_c.cos() * dlon.cos();
        let sy = -rc * phi_c.cos() * dlon.sin();
        let sz = rc * phi_c.sin();
        if sx <= 0.0 {
            return None;
        }

        let range = (sx * sx + sy * sy + sz * sz).sqrt();
        Some(((-sy / range).asin(), (sz / sx).atan()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nadir_is_sub_satellite_point() {
        let proj = Geostationary::goes_east();
        let (lon, lat) = proj.scan_to_geo(0.0, 0.0).unwrap();
        assert!((lon + 75.0).abs() < 1e-6, "lon {}", lon);
        assert!(lat.abs() < 1e-6, "lat {}", lat);
        assert!((proj.longitude_origin() + 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_geo_scan_inverse_over_oklahoma() {
        let proj = Geostationary::goes_east();
        let (x, y) = proj.geo_to_scan(-97.5, 35.3).unwrap();
        // Inside the CONUS sector window
        assert!((-0.101..0.039).contains(&x), "x = {}", x);
        assert!((0.044..0.129).contains(&y), "y = {}", y);

        let (lon, lat) = proj.scan_to_geo(x, y).unwrap();
        assert!((lon + 97.5).abs() < 1e-6, "lon {}", lon);
        assert!((lat - 35.3).abs() < 1e-6, "lat {}", lat);
    }

    #[test]
    fn test_off_earth_and_far_side() {
        let proj = Geostationary::goes_east();
        assert!(proj.scan_to_geo(0.5, 0.5).is_none());
        assert!(proj.geo_to_scan(180.0, 0.0).is_none());
        assert!(proj.geo_to_scan(-75.0, 0.0).is_some());
    }
}
