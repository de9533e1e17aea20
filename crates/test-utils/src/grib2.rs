//! GRIB2 message writer for MRMS-style lat/lon fields.
//!
//! Messages use template 3.0, 4.0 and simple packing (5.0) with 16-bit
//! values, the same shape the MRMS mosaics have apart from PNG packing.

use std::io::Write;

use chrono::{DateTime, Datelike, Timelike, Utc};
use flate2::{write::GzEncoder, Compression};

use crate::fixtures::utc;

/// Build a single-field GRIB2 message.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    reference_time: DateTime<Utc>,
    ni: u32,
    nj: u32,
    /// Microdegrees, longitudes in 0..360
    la1: i32,
    lo1: i32,
    di: u32,
    dj: u32,
    scanning_mode: u8,
    category: u8,
    number: u8,
    level_type: u8,
    level_value: u32,
    values: Vec<f32>,
}

impl Grib2Builder {
    /// MergedReflectivityQComposite on a corner of the 0.01° CONUS grid.
    pub fn mrms_reflectivity() -> Self {
        let (ni, nj) = (20, 15);
        Self {
            discipline: 209,
            center: 161,
            reference_time: utc(2025, 1, 1, 12, 0, 0),
            ni,
            nj,
            la1: 54_995_000,
            lo1: 230_005_000,
            di: 10_000,
            dj: 10_000,
            // +i, -j, i consecutive
            scanning_mode: 0,
            category: 0,
            number: 16,
            level_type: 102,
            level_value: 500,
            values: vec![-999.0; (ni * nj) as usize],
        }
    }

    pub fn with_reference_time(mut self, time: DateTime<Utc>) -> Self {
        self.reference_time = time;
        self
    }

    /// Resize the grid; values reset to zero.
    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.values = vec![0.0; (ni * nj) as usize];
        self
    }

    /// First grid point in degrees; negative longitudes are wrapped to 0..360.
    pub fn with_origin(mut self, lat: f64, lon: f64) -> Self {
        self.la1 = (lat * 1e6).round() as i32;
        self.lo1 = (lon.rem_euclid(360.0) * 1e6).round() as i32;
        self
    }

    /// Grid spacing in degrees.
    pub fn with_spacing(mut self, di: f64, dj: f64) -> Self {
        self.di = (di * 1e6).round() as u32;
        self.dj = (dj * 1e6).round() as u32;
        self
    }

    /// Row-major values, north row first.
    pub fn with_values(mut self, values: Vec<f32>) -> Self {
        assert_eq!(
            values.len(),
            (self.ni * self.nj) as usize,
            "value count must match the grid"
        );
        self.values = values;
        self
    }

    /// Fill from `f(lon, lat)` evaluated at each grid point.
    pub fn with_field<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, f64) -> f32,
    {
        let (lat0, lon0) = (self.la1 as f64 * 1e-6, self.lo1 as f64 * 1e-6);
        let (di, dj) = (self.di as f64 * 1e-6, self.dj as f64 * 1e-6);
        self.values = (0..self.nj)
            .flat_map(|j| (0..self.ni).map(move |i| (i, j)))
            .map(|(i, j)| {
                let lon = lon0 + i as f64 * di;
                let lon = if lon > 180.0 { lon - 360.0 } else { lon };
                f(lon, lat0 - j as f64 * dj)
            })
            .collect();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let sections = [
            self.section1(),
            self.section3(),
            self.section4(),
            self.section5(),
            vec![0, 0, 0, 6, 6, 255],
            self.section7(),
        ];
        let total = 16 + sections.iter().map(Vec::len).sum::<usize>() + 4;

        let mut message = Vec::with_capacity(total);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0, self.discipline, 2]);
        message.extend_from_slice(&(total as u64).to_be_bytes());
        for section in &sections {
            message.extend_from_slice(section);
        }
        message.extend_from_slice(b"7777");
        message
    }

    /// The message as MRMS distributes it (`.grib2.gz`).
    pub fn build_gzipped(&self) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder
            .write_all(&self.build())
            .unwrap_or_else(|e| panic!("gzip failed: {}", e));
        encoder
            .finish()
            .unwrap_or_else(|e| panic!("gzip failed: {}", e))
    }

    fn section1(&self) -> Vec<u8> {
        let t = &self.reference_time;
        let mut s = header(21, 1);
        s.extend_from_slice(&self.center.to_be_bytes());
        s.extend_from_slice(&0u16.to_be_bytes());
        // Master and local table versions, analysis
        s.extend_from_slice(&[2, 1, 0]);
        s.extend_from_slice(&(t.year() as u16).to_be_bytes());
        s.extend_from_slice(&[
            t.month() as u8,
            t.day() as u8,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
        ]);
        // Operational products, analysis
        s.extend_from_slice(&[0, 0]);
        s
    }

    fn section3(&self) -> Vec<u8> {
        let mut s = header(72, 3);
        s.push(0);
        s.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        s.extend_from_slice(&[0, 0]);
        s.extend_from_slice(&0u16.to_be_bytes());
        // Spherical earth, radius 6371229 m; no scaled radii
        s.push(6);
        s.extend_from_slice(&[0; 15]);
        s.extend_from_slice(&self.ni.to_be_bytes());
        s.extend_from_slice(&self.nj.to_be_bytes());
        s.extend_from_slice(&0u32.to_be_bytes());
        s.extend_from_slice(&u32::MAX.to_be_bytes());

        let last_lat = self.la1 - ((self.nj - 1) * self.dj) as i32;
        let last_lon = self.lo1 + ((self.ni - 1) * self.di) as i32;
        s.extend_from_slice(&sign_magnitude(self.la1).to_be_bytes());
        s.extend_from_slice(&sign_magnitude(self.lo1).to_be_bytes());
        s.push(48);
        s.extend_from_slice(&sign_magnitude(last_lat).to_be_bytes());
        s.extend_from_slice(&sign_magnitude(last_lon).to_be_bytes());
        s.extend_from_slice(&self.di.to_be_bytes());
        s.extend_from_slice(&self.dj.to_be_bytes());
        s.push(self.scanning_mode);
        s
    }

    fn section4(&self) -> Vec<u8> {
        let mut s = header(34, 4);
        s.extend_from_slice(&0u16.to_be_bytes());
        s.extend_from_slice(&0u16.to_be_bytes());
        s.extend_from_slice(&[self.category, self.number, 0, 0, 0]);
        s.extend_from_slice(&0u16.to_be_bytes());
        s.extend_from_slice(&[0, 1]);
        s.extend_from_slice(&0u32.to_be_bytes());
        s.extend_from_slice(&[self.level_type, 0]);
        s.extend_from_slice(&self.level_value.to_be_bytes());
        s.extend_from_slice(&[255, 0]);
        s.extend_from_slice(&0u32.to_be_bytes());
        s
    }

    fn section5(&self) -> Vec<u8> {
        let (reference, scale, bits) = self.packing();
        let mut s = header(21, 5);
        s.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        s.extend_from_slice(&0u16.to_be_bytes());
        s.extend_from_slice(&reference.to_be_bytes());
        let e = if scale < 0 {
            0x8000 | scale.unsigned_abs()
        } else {
            scale as u16
        };
        s.extend_from_slice(&e.to_be_bytes());
        s.extend_from_slice(&0u16.to_be_bytes());
        s.extend_from_slice(&[bits, 0]);
        s
    }

    fn section7(&self) -> Vec<u8> {
        let (reference, scale, bits) = self.packing();
        let mut packed = Vec::new();
        if bits > 0 {
            let step = 2.0_f64.powi(scale as i32);
            for &v in &self.values {
                let p = ((v as f64 - reference as f64) / step).round() as u16;
                packed.extend_from_slice(&p.to_be_bytes());
            }
        }
        let mut s = header(5 + packed.len() as u32, 7);
        s.extend_from_slice(&packed);
        s
    }

    /// Reference value, binary scale factor and bit width.
    fn packing(&self) -> (f32, i16, u8) {
        let (min, max) = self
            .values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = (max - min) as f64;
        if range == 0.0 {
            return (min, 0, 0);
        }
        (min, (range / 65535.0).log2().ceil() as i16, 16)
    }
}

fn header(len: u32, number: u8) -> Vec<u8> {
    let mut s = len.to_be_bytes().to_vec();
    s.push(number);
    s
}

fn sign_magnitude(v: i32) -> u32 {
    if v < 0 {
        0x8000_0000 | v.unsigned_abs()
    } else {
        v as u32
    }
}

/// Source archive key under `YYYY/MM/DD/<directory>/`, e.g.
/// `2025/01/01/MergedReflectivityQComposite/MergedReflectivityQComposite_00.50_20250101-120000.grib2.gz`.
pub fn mrms_archive_key(directory: &str, time: &DateTime<Utc>) -> String {
    let stem = if directory.ends_with("_00.50") {
        directory.to_string()
    } else {
        format!("{}_00.50", directory)
    };
    format!(
        "{}/{}/{}_{}.grib2.gz",
        time.format("%Y/%m/%d"),
        directory,
        stem,
        time.format("%Y%m%d-%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_lengths_agree() {
        let bytes = Grib2Builder::mrms_reflectivity().build();
        assert_eq!(&bytes[..4], b"GRIB");
        assert_eq!(&bytes[bytes.len() - 4..], b"7777");
        let declared = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
        assert_eq!(declared as usize, bytes.len());
        // Constant field packs to zero bits
        assert_eq!(bytes.len(), 16 + 21 + 72 + 34 + 21 + 6 + 5 + 4);
    }

    #[test]
    fn test_negative_origin_is_wrapped() {
        let b = Grib2Builder::mrms_reflectivity().with_origin(35.0, -97.5);
        assert_eq!(b.lo1, 262_500_000);
        assert_eq!(b.la1, 35_000_000);
    }

    #[test]
    fn test_mrms_archive_key() {
        let t = utc(2025, 1, 1, 11, 56, 38);
        assert_eq!(
            mrms_archive_key("MergedReflectivityQComposite", &t),
            "2025/01/01/MergedReflectivityQComposite/MergedReflectivityQComposite_00.50_20250101-115638.grib2.gz"
        );
        assert_eq!(
            mrms_archive_key("MergedReflectivityComposite_00.50", &t),
            "2025/01/01/MergedReflectivityComposite_00.50/MergedReflectivityComposite_00.50_20250101-115638.grib2.gz"
        );
    }
}
