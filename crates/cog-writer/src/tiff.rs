//! Little-endian classic TIFF container.

use std::collections::BTreeMap;

pub(crate) const TAG_NEW_SUBFILE_TYPE: u16 = 254;
pub(crate) const TAG_IMAGE_WIDTH: u16 = 256;
pub(crate) const TAG_IMAGE_LENGTH: u16 = 257;
pub(crate) const TAG_BITS_PER_SAMPLE: u16 = 258;
pub(crate) const TAG_COMPRESSION: u16 = 259;
pub(crate) const TAG_PHOTOMETRIC: u16 = 262;
pub(crate) const TAG_SAMPLES_PER_PIXEL: u16 = 277;
pub(crate) const TAG_PLANAR_CONFIG: u16 = 284;
pub(crate) const TAG_TILE_WIDTH: u16 = 322;
pub(crate) const TAG_TILE_LENGTH: u16 = 323;
pub(crate) const TAG_TILE_OFFSETS: u16 = 324;
pub(crate) const TAG_TILE_BYTE_COUNTS: u16 = 325;
pub(crate) const TAG_SAMPLE_FORMAT: u16 = 339;
pub(crate) const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const TAG_MODEL_TIEPOINT: u16 = 33922;
pub(crate) const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
pub(crate) const TAG_GDAL_NODATA: u16 = 42113;

pub(crate) const COMPRESSION_DEFLATE: u16 = 8;
pub(crate) const PHOTOMETRIC_MIN_IS_BLACK: u16 = 1;
pub(crate) const SAMPLE_FORMAT_IEEE_FLOAT: u16 = 3;

pub(crate) const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
}

impl Value {
    fn field_type(&self) -> u16 {
        match self {
            Value::Ascii(_) => 2,
            Value::Short(_) => 3,
            Value::Long(_) => 4,
            Value::Double(_) => 12,
        }
    }

    fn count(&self) -> u32 {
        match self {
            Value::Ascii(s) => s.len() as u32 + 1,
            Value::Short(v) => v.len() as u32,
            Value::Long(v) => v.len() as u32,
            Value::Double(v) => v.len() as u32,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Ascii(s) => {
                let mut b = s.as_bytes().to_vec();
                b.push(0);
                b
            }
            Value::Short(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Long(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Double(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }

    /// Bytes stored outside the entry, padded to a word boundary.
    fn external_len(&self) -> usize {
        let len = self.to_bytes().len();
        if len <= 4 {
            0
        } else {
            len + len % 2
        }
    }
}

/// One image file directory; entries are kept sorted by tag as TIFF requires.
#[derive(Debug, Clone, Default)]
pub(crate) struct Ifd {
    entries: BTreeMap<u16, Value>,
}

impl Ifd {
    pub fn set(&mut self, tag: u16, value: Value) {
        self.entries.insert(tag, value);
    }

    /// Total bytes: entry table plus out-of-line values.
    pub fn encoded_len(&self) -> usize {
        2 + 12 * self.entries.len() + 4 + self.entries.values().map(Value::external_len).sum::<usize>()
    }

    /// Append this IFD, which must start at `offset` in the file.
    pub fn write(&self, out: &mut Vec<u8>, offset: usize, next_ifd: u32) {
        debug_assert_eq!(out.len(), offset);

        let mut external = Vec::new();
        let mut external_offset = offset + 2 + 12 * self.entries.len() + 4;

        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        for (tag, value) in &self.entries {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&value.field_type().to_le_bytes());
            out.extend_from_slice(&value.count().to_le_bytes());

            let bytes = value.to_bytes();
            if bytes.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..bytes.len()].copy_from_slice(&bytes);
                out.extend_from_slice(&inline);
            } else {
                out.extend_from_slice(&(external_offset as u32).to_le_bytes());
                external.extend_from_slice(&bytes);
                if bytes.len() % 2 == 1 {
                    external.push(0);
                }
                external_offset += value.external_len();
            }
        }
        out.extend_from_slice(&next_ifd.to_le_bytes());
        out.extend_from_slice(&external);
    }
}

/// `II*\0` header pointing at the first IFD.
pub(crate) fn write_header(out: &mut Vec<u8>, first_ifd: u32) {
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&first_ifd.to_le_bytes());
}
