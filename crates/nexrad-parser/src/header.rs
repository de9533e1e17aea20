//! Archive volume header.

use chrono::{DateTime, Utc};

use crate::error::{NexradError, NexradResult};
use crate::{be_bytes, be_u32, nexrad_datetime};

pub(crate) const VOLUME_HEADER_LEN: usize = 24;

/// The 24-byte record that opens every archive.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeHeader {
    /// Archive format, e.g. `AR2V0006`
    pub version: String,
    /// Volume sequence number within the tape
    pub extension: String,
    /// Volume start time
    pub started_at: DateTime<Utc>,
    /// Four-letter site identifier
    pub icao: String,
}

impl VolumeHeader {
    pub fn parse(data: &[u8]) -> NexradResult<Self> {
        let tape: [u8; 9] = be_bytes(data, 0)?;
        if &tape[..4] != b"AR2V" {
            return Err(NexradError::InvalidFormat(format!(
                "unexpected magic {:?}",
                String::from_utf8_lossy(&tape[..4])
            )));
        }

        let extension: [u8; 3] = be_bytes(data, 9)?;
        let date = be_u32(data, 12)?;
        let millis = be_u32(data, 16)?;
        let icao: [u8; 4] = be_bytes(data, 20)?;

        let started_at = nexrad_datetime(date, millis).ok_or_else(|| {
            NexradError::InvalidFormat(format!("volume date {} out of range", date))
        })?;

        Ok(Self {
            version: String::from_utf8_lossy(&tape[..8]).into_owned(),
            extension: String::from_utf8_lossy(&extension).into_owned(),
            started_at,
            icao: String::from_utf8_lossy(&icao).trim().to_string(),
        })
    }
}
