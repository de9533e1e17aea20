//! NEXRAD Level II archive decoder.
//!
//! Reads the WSR-88D archive format distributed on the public NEXRAD
//! buckets (AR2V0006 and later):
//!
//! ```text
//! +------------------------+
//! | Volume header (24 B)   |  "AR2V0006." + extension, date, time, ICAO
//! +------------------------+
//! | LDM record             |  i32 control word (byte count) + bzip2 block
//! +------------------------+
//! | ...                    |
//! +------------------------+
//! ```
//!
//! Each decompressed record holds a run of messages. Only Message 31
//! (digital radar data generic format) carries moment data; metadata
//! messages are fixed 2432-byte frames and are skipped.
//!
//! Moments are exposed under descriptive names (`reflectivity`,
//! `velocity`, ...) with gates below threshold or range folded set to NaN.

pub mod error;
mod header;
mod message;
mod records;
mod volume;

pub use error::{NexradError, NexradResult};
pub use header::VolumeHeader;
pub use message::{moment_field_name, Moment, Radial};
pub use volume::{decode, RadarLocation, Sweep, Volume};

pub(crate) fn be_bytes<const N: usize>(buf: &[u8], offset: usize) -> NexradResult<[u8; N]> {
    buf.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(NexradError::Truncated { offset, needed: N })
}

pub(crate) fn be_u16(buf: &[u8], offset: usize) -> NexradResult<u16> {
    Ok(u16::from_be_bytes(be_bytes(buf, offset)?))
}

pub(crate) fn be_i16(buf: &[u8], offset: usize) -> NexradResult<i16> {
    Ok(i16::from_be_bytes(be_bytes(buf, offset)?))
}

pub(crate) fn be_u32(buf: &[u8], offset: usize) -> NexradResult<u32> {
    Ok(u32::from_be_bytes(be_bytes(buf, offset)?))
}

pub(crate) fn be_i32(buf: &[u8], offset: usize) -> NexradResult<i32> {
    Ok(i32::from_be_bytes(be_bytes(buf, offset)?))
}

pub(crate) fn be_f32(buf: &[u8], offset: usize) -> NexradResult<f32> {
    Ok(f32::from_be_bytes(be_bytes(buf, offset)?))
}

/// Modified Julian date used throughout Level II (day 1 = 1970-01-01) plus
/// milliseconds past midnight.
pub(crate) fn nexrad_datetime(julian_date: u32, millis: u32) -> Option<chrono::DateTime<chrono::Utc>> {
    let days = i64::from(julian_date) - 1;
    chrono::DateTime::from_timestamp(days * 86_400, 0)
        .map(|midnight| midnight + chrono::Duration::milliseconds(i64::from(millis)))
}
