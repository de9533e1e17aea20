//! Synthetic GOES ABI datasets.

use netcdf_parser::MemoryDataset;
use projection::Geostationary;

use crate::fixtures::{radiance_for_brightness_temperature, BAND13_PLANCK};

/// Scan-angle window roughly covering the ABI CONUS sector (radians).
pub const CONUS_X: (f64, f64) = (-0.0900, 0.0300);
pub const CONUS_Y: (f64, f64) = (0.1240, 0.0500);

/// Evenly spaced scan angles from `range.0` to `range.1` inclusive.
pub fn scan_axis(range: (f64, f64), n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![range.0];
    }
    let step = (range.1 - range.0) / (n - 1) as f64;
    (0..n).map(|i| range.0 + i as f64 * step).collect()
}

/// Band 13 L1b radiance dataset whose brightness temperature is
/// `bt(row, col)`; `None` writes a fill (NaN) pixel.
pub fn band13_radiance<F>(rows: usize, cols: usize, bt: F) -> MemoryDataset
where
    F: Fn(usize, usize) -> Option<f64>,
{
    let mut values = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            values.push(match bt(row, col) {
                Some(t) => radiance_for_brightness_temperature(t, BAND13_PLANCK) as f32,
                None => f32::NAN,
            });
        }
    }

    let (fk1, fk2, bc1, bc2) = BAND13_PLANCK;
    MemoryDataset::new()
        .with_field("Rad", rows, cols, values, Some("mW m-2 sr-1 (cm-1)-1"))
        .with_scalar("planck_fk1", fk1)
        .with_scalar("planck_fk2", fk2)
        .with_scalar("planck_bc1", bc1)
        .with_scalar("planck_bc2", bc2)
        .with_scalar("band_id", 13.0)
        .with_scan_angles(scan_axis(CONUS_X, cols), scan_axis(CONUS_Y, rows))
        .with_projection(Geostationary::goes_east())
        .with_attribute("platform_ID", "G16")
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcdf_parser::AbiSource;

    #[test]
    fn test_scan_axis_endpoints() {
        let axis = scan_axis((0.0, 1.0), 5);
        assert_eq!(axis, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(scan_axis((0.3, 1.0), 1), vec![0.3]);
    }

    #[test]
    fn test_band13_dataset_shape() {
        let ds = band13_radiance(3, 4, |_, _| Some(250.0));
        let field = ds.read_field("Rad").unwrap();
        assert_eq!((field.rows, field.cols), (3, 4));
        assert_eq!(ds.scan_angles().unwrap().x.len(), 4);
        assert!(ds.read_scalar("planck_fk1").is_some());
    }
}
