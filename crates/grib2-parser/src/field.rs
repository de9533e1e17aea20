//! Whole-field decoding.

use std::borrow::Cow;
use std::io::{Cursor, Read};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::{Grib2Error, Grib2Result};
use crate::sections::{Identification, LatLonGrid, Parameter, Sections};
use crate::unpacking::SimplePacking;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BITMAP_PRESENT: u8 = 0;
const BITMAP_ABSENT: u8 = 255;

/// One decoded field on its grid, values in storage (scan) order.
#[derive(Debug, Clone)]
pub struct Grib2Field {
    pub discipline: u8,
    pub center: u16,
    pub reference_time: DateTime<Utc>,
    pub parameter: Parameter,
    pub grid: LatLonGrid,
    /// Missing points are NaN
    pub values: Vec<f32>,
}

impl Grib2Field {
    pub fn rows(&self) -> usize {
        self.grid.nj
    }

    pub fn cols(&self) -> usize {
        self.grid.ni
    }

    pub fn value(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.grid.ni + col]
    }
}

/// Inflate gzipped input, pass anything else through.
pub fn maybe_gunzip(data: &[u8]) -> Grib2Result<Cow<'_, [u8]>> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(data));
    }
    let mut out = Vec::with_capacity(data.len() * 4);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Grib2Error::Decompression(e.to_string()))?;
    Ok(Cow::Owned(out))
}

/// Decode the first field of a (possibly gzipped) GRIB2 file.
pub fn decode_field(data: &[u8]) -> Grib2Result<Grib2Field> {
    let data = maybe_gunzip(data)?;
    let sections = Sections::split(&data)?;

    let identification = Identification::parse(sections.get(1)?)?;
    let grid = LatLonGrid::parse(sections.get(3)?)?;
    let parameter = Parameter::parse(sections.get(4)?)?;

    let values = unpack(&sections)?;
    if values.len() != grid.len() {
        return Err(Grib2Error::InvalidFormat(format!(
            "{} values for a {} x {} grid",
            values.len(),
            grid.ni,
            grid.nj
        )));
    }

    debug!(
        reference_time = %identification.reference_time,
        category = parameter.category,
        number = parameter.number,
        ni = grid.ni,
        nj = grid.nj,
        "Decoded GRIB2 field"
    );

    Ok(Grib2Field {
        discipline: sections.indicator.discipline,
        center: identification.center,
        reference_time: identification.reference_time,
        parameter,
        grid,
        values,
    })
}

fn unpack(sections: &Sections<'_>) -> Grib2Result<Vec<f32>> {
    let representation = sections.get(5)?;
    let template = representation
        .get(9..11)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 5,
            reason: "truncated".to_string(),
        })?;

    if template != 0 {
        return unpack_with_grib_crate(sections.message);
    }

    let packing = SimplePacking::parse(representation)?;
    let data = sections.get(7)?;
    packing.unpack(&data[5..], bitmap(sections)?)
}

fn bitmap<'a>(sections: &Sections<'a>) -> Grib2Result<Option<&'a [u8]>> {
    let Ok(section) = sections.get(6) else {
        return Ok(None);
    };
    match section.get(5).copied() {
        Some(BITMAP_PRESENT) => Ok(Some(&section[6..])),
        Some(BITMAP_ABSENT) => Ok(None),
        Some(other) => Err(Grib2Error::Unsupported(format!(
            "bitmap indicator {}",
            other
        ))),
        None => Err(Grib2Error::InvalidSection {
            section: 6,
            reason: "truncated".to_string(),
        }),
    }
}

/// PNG, complex and JPEG2000 packings.
fn unpack_with_grib_crate(message: &[u8]) -> Grib2Result<Vec<f32>> {
    let grib = grib::from_reader(Cursor::new(message))
        .map_err(|e| Grib2Error::InvalidFormat(e.to_string()))?;
    let mut submessages = grib.iter();
    let (_, submessage) = submessages
        .next()
        .ok_or_else(|| Grib2Error::InvalidFormat("message has no fields".to_string()))?;
    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Grib2Error::Unpacking(e.to_string()))?;
    let values = decoder
        .dispatch()
        .map_err(|e| Grib2Error::Unpacking(e.to_string()))?;
    Ok(values.collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};
    use test_utils::grib2::Grib2Builder;

    #[test]
    fn test_gunzip_only_when_gzipped() {
        assert!(matches!(maybe_gunzip(b"GRIB").unwrap(), Cow::Borrowed(_)));

        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(b"GRIB").unwrap();
        let gz = enc.finish().unwrap();
        assert_eq!(&*maybe_gunzip(&gz).unwrap(), b"GRIB");
    }

    #[test]
    fn test_decode_mrms_field() {
        let bytes = Grib2Builder::mrms_reflectivity()
            .with_grid(4, 3)
            .with_values(vec![
                -30.0, 0.0, 10.0, 20.0, //
                30.0, 40.0, 50.0, 60.0, //
                -999.0, 5.0, 15.0, 25.0,
            ])
            .build_gzipped();

        let field = decode_field(&bytes).unwrap();
        assert_eq!(field.discipline, 209);
        assert_eq!(field.center, 161);
        assert_eq!((field.rows(), field.cols()), (3, 4));
        assert_eq!(field.parameter.category, 0);
        assert_eq!(field.parameter.number, 16);
        assert!((field.grid.lat_first - 54.995).abs() < 1e-9);
        assert!((field.grid.lon_first + 129.995).abs() < 1e-9);

        // 16-bit packing over a 1059 dBZ range keeps values within a few hundredths
        assert!((field.value(1, 2) - 50.0).abs() < 0.02, "{}", field.value(1, 2));
        assert!((field.value(2, 0) + 999.0).abs() < 0.02);
        let (lon, lat) = field.grid.locate(2, 3);
        assert!((lon + 129.965).abs() < 1e-6 && (lat - 54.975).abs() < 1e-6);
    }

    #[test]
    fn test_constant_field_decodes() {
        let bytes = Grib2Builder::mrms_reflectivity()
            .with_grid(2, 2)
            .with_values(vec![-99.0; 4])
            .build();
        let field = decode_field(&bytes).unwrap();
        assert!(field.values.iter().all(|v| *v == -99.0));
    }

    #[test]
    fn test_truncated_message_is_invalid() {
        let bytes = Grib2Builder::mrms_reflectivity().with_grid(2, 2).build();
        let result = decode_field(&bytes[..bytes.len() - 10]);
        assert!(matches!(result, Err(Grib2Error::InvalidFormat(_))));
    }

    #[test]
    fn test_non_grib_is_rejected() {
        assert!(decode_field(b"AR2V0006.751").is_err());
    }
}
