//! GRIB2 (WMO FM 92 edition 2) decoding for regular lat/lon fields.
//!
//! Only what the MRMS national mosaics need is covered: the first field of
//! a message on a template 3.0 grid. Section headers and the grid are read
//! here; packed values are unpacked by the `grib` crate, which also
//! handles the PNG packing MRMS uses.
//!
//! ```text
//! 0 Indicator | 1 Identification | (2 Local) | 3 Grid | 4 Product
//! | 5 Data representation | 6 Bitmap | 7 Data | 8 "7777"
//! ```

pub mod error;
mod field;
mod unpacking;
pub mod sections;

pub use error::{Grib2Error, Grib2Result};
pub use field::{decode_field, maybe_gunzip, Grib2Field};
pub use sections::{Identification, Indicator, LatLonGrid, Parameter};

/// Decode a GRIB2 sign-magnitude integer (high bit is the sign).
pub(crate) fn sign_magnitude(raw: u32) -> i64 {
    let magnitude = (raw & 0x7FFF_FFFF) as i64;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_magnitude() {
        assert_eq!(sign_magnitude(54_995_000), 54_995_000);
        assert_eq!(sign_magnitude(0x8000_0000 | 5), -5);
        assert_eq!(sign_magnitude(0x8000_0000), 0);
    }
}
