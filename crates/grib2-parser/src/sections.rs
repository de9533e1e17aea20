//! Section walking and the header sections needed to place a field.
//!
//! Every section after the indicator starts with a big-endian `u32` length
//! and a one-byte section number. Offsets below are zero-based within the
//! section, so octet N of the WMO tables is index N - 1.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Grib2Error, Grib2Result};
use crate::sign_magnitude;

/// Section 0 is always 16 bytes.
pub const INDICATOR_LEN: usize = 16;
const END_MARKER: &[u8; 4] = b"7777";

/// Scanning mode bits (flag table 3.4).
const SCAN_I_NEGATIVE: u8 = 0x80;
const SCAN_J_POSITIVE: u8 = 0x40;
const SCAN_J_CONSECUTIVE: u8 = 0x20;

/// Section 0: Indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub total_length: u64,
}

impl Indicator {
    pub fn parse(data: &[u8]) -> Grib2Result<Self> {
        if data.len() < INDICATOR_LEN {
            return Err(Grib2Error::InvalidFormat(format!(
                "{} bytes is too short for an indicator section",
                data.len()
            )));
        }
        if &data[0..4] != b"GRIB" {
            return Err(Grib2Error::InvalidFormat("missing GRIB magic".to_string()));
        }
        let edition = data[7];
        if edition != 2 {
            return Err(Grib2Error::Unsupported(format!("GRIB edition {}", edition)));
        }
        let mut length = [0u8; 8];
        length.copy_from_slice(&data[8..16]);
        Ok(Self {
            discipline: data[6],
            edition,
            total_length: u64::from_be_bytes(length),
        })
    }
}

/// The sections of the first message, in file order.
#[derive(Debug)]
pub struct Sections<'a> {
    pub indicator: Indicator,
    /// The whole message including section 8
    pub message: &'a [u8],
    sections: Vec<(u8, &'a [u8])>,
}

impl<'a> Sections<'a> {
    pub fn split(data: &'a [u8]) -> Grib2Result<Self> {
        let indicator = Indicator::parse(data)?;
        let end = usize::try_from(indicator.total_length)
            .map_err(|_| Grib2Error::InvalidFormat("message length overflows".to_string()))?;
        if end > data.len() {
            return Err(Grib2Error::InvalidFormat(format!(
                "message declares {} bytes, only {} present",
                end,
                data.len()
            )));
        }

        let mut sections = Vec::new();
        let mut offset = INDICATOR_LEN;
        loop {
            let header = data.get(offset..offset + 4).ok_or_else(|| {
                Grib2Error::InvalidFormat(format!("truncated at byte {}", offset))
            })?;
            if header == END_MARKER {
                break;
            }
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
            if len < 5 || offset + len > end {
                return Err(Grib2Error::InvalidFormat(format!(
                    "bad section length {} at byte {}",
                    len, offset
                )));
            }
            let number = data[offset + 4];
            sections.push((number, &data[offset..offset + len]));
            offset += len;
        }

        Ok(Self {
            indicator,
            message: &data[..end],
            sections,
        })
    }

    /// First section with `number`.
    pub fn get(&self, number: u8) -> Grib2Result<&'a [u8]> {
        self.sections
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, s)| *s)
            .ok_or_else(|| Grib2Error::InvalidSection {
                section: number,
                reason: "missing".to_string(),
            })
    }

    pub fn numbers(&self) -> Vec<u8> {
        self.sections.iter().map(|(n, _)| *n).collect()
    }
}

/// Section 1: Identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub reference_time: DateTime<Utc>,
}

impl Identification {
    pub fn parse(section: &[u8]) -> Grib2Result<Self> {
        let year = read_u16(section, 1, 12)?;
        let field = |offset: usize| read_u8(section, 1, offset).map(u32::from);
        let (month, day, hour, minute, second) =
            (field(14)?, field(15)?, field(16)?, field(17)?, field(18)?);

        let reference_time = NaiveDate::from_ymd_opt(year as i32, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .ok_or_else(|| Grib2Error::InvalidSection {
                section: 1,
                reason: format!(
                    "invalid reference time {}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                ),
            })?
            .and_utc();

        Ok(Self {
            center: read_u16(section, 1, 5)?,
            sub_center: read_u16(section, 1, 7)?,
            reference_time,
        })
    }
}

/// Section 4 parameter identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub template: u16,
    pub category: u8,
    pub number: u8,
}

impl Parameter {
    pub fn parse(section: &[u8]) -> Grib2Result<Self> {
        Ok(Self {
            template: read_u16(section, 4, 7)?,
            category: read_u8(section, 4, 9)?,
            number: read_u8(section, 4, 10)?,
        })
    }
}

/// Section 3 with template 3.0: a regular latitude/longitude grid.
///
/// Angles are in degrees; longitudes are normalized to [-180, 180].
#[derive(Debug, Clone, PartialEq)]
pub struct LatLonGrid {
    /// Points along a parallel
    pub ni: usize,
    /// Points along a meridian
    pub nj: usize,
    pub lat_first: f64,
    pub lon_first: f64,
    pub lat_last: f64,
    pub lon_last: f64,
    pub di: f64,
    pub dj: f64,
    pub scanning_mode: u8,
}

impl LatLonGrid {
    pub fn parse(section: &[u8]) -> Grib2Result<Self> {
        let template = read_u16(section, 3, 12)?;
        if template != 0 {
            return Err(Grib2Error::Unsupported(format!(
                "grid definition template 3.{}",
                template
            )));
        }

        let basic_angle = read_u32(section, 3, 38)?;
        let subdivisions = read_u32(section, 3, 42)?;
        let unit = if basic_angle == 0
            || basic_angle == u32::MAX
            || subdivisions == 0
            || subdivisions == u32::MAX
        {
            1e-6
        } else {
            basic_angle as f64 / subdivisions as f64
        };
        let angle = |offset: usize| -> Grib2Result<f64> {
            Ok(sign_magnitude(read_u32(section, 3, offset)?) as f64 * unit)
        };

        let scanning_mode = read_u8(section, 3, 71)?;
        if scanning_mode & SCAN_J_CONSECUTIVE != 0 {
            return Err(Grib2Error::Unsupported(
                "column-major (j consecutive) scanning".to_string(),
            ));
        }

        let grid = Self {
            ni: read_u32(section, 3, 30)? as usize,
            nj: read_u32(section, 3, 34)? as usize,
            lat_first: angle(46)?,
            lon_first: normalize_longitude(angle(50)?),
            lat_last: angle(55)?,
            lon_last: normalize_longitude(angle(59)?),
            di: angle(63)?.abs(),
            dj: angle(67)?.abs(),
            scanning_mode,
        };

        let declared = read_u32(section, 3, 6)? as usize;
        if grid.ni == 0 || grid.nj == 0 || grid.len() != declared {
            return Err(Grib2Error::InvalidSection {
                section: 3,
                reason: format!(
                    "{} x {} grid does not match {} data points",
                    grid.ni, grid.nj, declared
                ),
            });
        }
        Ok(grid)
    }

    pub fn len(&self) -> usize {
        self.ni * self.nj
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(lon, lat)` of the point at storage row `row` (j) and column `col` (i).
    pub fn locate(&self, row: usize, col: usize) -> (f64, f64) {
        let di = if self.scanning_mode & SCAN_I_NEGATIVE != 0 {
            -self.di
        } else {
            self.di
        };
        let dj = if self.scanning_mode & SCAN_J_POSITIVE != 0 {
            self.dj
        } else {
            -self.dj
        };
        (
            normalize_longitude(self.lon_first + col as f64 * di),
            self.lat_first + row as f64 * dj,
        )
    }
}

/// Map a 0..360 longitude into -180..180.
pub fn normalize_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

fn slice<const N: usize>(section: &[u8], number: u8, offset: usize) -> Grib2Result<[u8; N]> {
    section
        .get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: number,
            reason: format!("truncated at octet {}", offset + 1),
        })
}

fn read_u8(section: &[u8], number: u8, offset: usize) -> Grib2Result<u8> {
    slice::<1>(section, number, offset).map(|b| b[0])
}

fn read_u16(section: &[u8], number: u8, offset: usize) -> Grib2Result<u16> {
    slice(section, number, offset).map(u16::from_be_bytes)
}

fn read_u32(section: &[u8], number: u8, offset: usize) -> Grib2Result<u32> {
    slice(section, number, offset).map(u32::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(scanning_mode: u8) -> LatLonGrid {
        LatLonGrid {
            ni: 7000,
            nj: 3500,
            lat_first: 54.995,
            lon_first: -129.995,
            lat_last: 20.005,
            lon_last: -60.005,
            di: 0.01,
            dj: 0.01,
            scanning_mode,
        }
    }

    #[test]
    fn test_locate_north_to_south() {
        let g = grid(0);
        let (lon, lat) = g.locate(0, 0);
        assert!((lon + 129.995).abs() < 1e-9);
        assert!((lat - 54.995).abs() < 1e-9);

        let (lon, lat) = g.locate(3499, 6999);
        assert!((lon + 60.005).abs() < 1e-6, "lon {}", lon);
        assert!((lat - 20.005).abs() < 1e-6, "lat {}", lat);
    }

    #[test]
    fn test_locate_south_to_north() {
        let g = LatLonGrid {
            lat_first: 20.005,
            ..grid(SCAN_J_POSITIVE)
        };
        let (_, lat) = g.locate(1, 0);
        assert!((lat - 20.015).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_longitude() {
        assert_eq!(normalize_longitude(230.0), -130.0);
        assert_eq!(normalize_longitude(-97.5), -97.5);
        assert_eq!(normalize_longitude(180.0), 180.0);
    }

    #[test]
    fn test_indicator_rejects_edition_one() {
        let mut data = b"GRIB".to_vec();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&16u64.to_be_bytes());
        assert!(matches!(
            Indicator::parse(&data),
            Err(Grib2Error::Unsupported(_))
        ));
        assert!(matches!(
            Indicator::parse(b"GRIB"),
            Err(Grib2Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_identification_reference_time() {
        let mut section = vec![0, 0, 0, 21, 1];
        section.extend_from_slice(&161u16.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes());
        section.extend_from_slice(&[2, 1, 0]);
        section.extend_from_slice(&2025u16.to_be_bytes());
        section.extend_from_slice(&[1, 1, 11, 56, 38, 0, 0]);

        let id = Identification::parse(&section).unwrap();
        assert_eq!(id.center, 161);
        assert_eq!(id.reference_time.to_rfc3339(), "2025-01-01T11:56:38+00:00");

        section[16] = 25;
        assert!(Identification::parse(&section).is_err());
    }
}
