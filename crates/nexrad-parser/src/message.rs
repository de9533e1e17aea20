//! Message framing and Message 31 radial decoding.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{NexradError, NexradResult};
use crate::{be_f32, be_i16, be_u16, be_u32, nexrad_datetime};

/// Channel terminal manager header preceding every message.
pub(crate) const CTM_HEADER_LEN: usize = 12;
/// Message header (size, type, sequence, date, segments).
pub(crate) const MESSAGE_HEADER_LEN: usize = 16;
/// Frame size for every message type other than 31.
pub(crate) const LEGACY_RECORD_LEN: usize = 2432;

const MSG_DIGITAL_RADAR_DATA: u8 = 31;
const MOMENT_HEADER_LEN: usize = 28;

/// Descriptive name for a Message 31 moment block.
pub fn moment_field_name(block_name: &str) -> Option<&'static str> {
    match block_name.trim() {
        "REF" => Some("reflectivity"),
        "VEL" => Some("velocity"),
        "SW" => Some("spectrum_width"),
        "ZDR" => Some("differential_reflectivity"),
        "PHI" => Some("differential_phase"),
        "RHO" => Some("cross_correlation_ratio"),
        "CFP" => Some("clutter_filter_power_removed"),
        _ => None,
    }
}

/// Gate values of one moment along a radial.
#[derive(Debug, Clone, PartialEq)]
pub struct Moment {
    /// Range to the centre of the first gate (meters)
    pub first_gate_m: f64,
    /// Gate spacing (meters)
    pub gate_spacing_m: f64,
    /// Physical values; NaN below threshold or range folded
    pub values: Vec<f32>,
}

impl Moment {
    /// Slant range to gate `index` (meters).
    pub fn gate_range(&self, index: usize) -> f64 {
        self.first_gate_m + index as f64 * self.gate_spacing_m
    }
}

/// Site constants from the volume data block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct VolumeBlock {
    pub latitude: f32,
    pub longitude: f32,
    pub site_height_m: i16,
    pub feedhorn_height_m: u16,
    pub vcp: u16,
}

/// One decoded radial.
#[derive(Debug, Clone, PartialEq)]
pub struct Radial {
    pub azimuth_deg: f32,
    pub elevation_deg: f32,
    /// Elevation cut number within the volume (1-based)
    pub elevation_number: u8,
    pub radial_status: u8,
    pub collected_at: DateTime<Utc>,
    /// Moments keyed by descriptive field name
    pub moments: BTreeMap<String, Moment>,
    pub(crate) volume: Option<VolumeBlock>,
}

/// Walk a decompressed message stream, decoding every Message 31.
pub(crate) fn decode_messages(stream: &[u8]) -> NexradResult<Vec<Radial>> {
    let mut radials = Vec::new();
    let mut pos = 0usize;

    while pos + CTM_HEADER_LEN + MESSAGE_HEADER_LEN <= stream.len() {
        let header = pos + CTM_HEADER_LEN;
        let size_halfwords = be_u16(stream, header)? as usize;
        let message_type = stream[header + 3];

        if message_type != MSG_DIGITAL_RADAR_DATA {
            pos += LEGACY_RECORD_LEN;
            continue;
        }

        let message_len = size_halfwords * 2;
        if message_len < MESSAGE_HEADER_LEN {
            return Err(NexradError::InvalidBlock(format!(
                "message 31 at byte {} declares {} bytes",
                pos, message_len
            )));
        }
        let end = header + message_len;
        let Some(body) = stream.get(header + MESSAGE_HEADER_LEN..end) else {
            warn!(offset = pos, "Truncated final message, stopping");
            break;
        };

        radials.push(decode_radial(body)?);
        pos = end;
    }

    Ok(radials)
}

/// Decode the body of one Message 31 (everything after the message header).
fn decode_radial(body: &[u8]) -> NexradResult<Radial> {
    let collect_ms = be_u32(body, 4)?;
    let collect_date = be_u16(body, 8)?;
    let azimuth_deg = be_f32(body, 12)?;
    let radial_status = byte(body, 21)?;
    let elevation_number = byte(body, 22)?;
    let elevation_deg = be_f32(body, 24)?;
    let block_count = be_u16(body, 30)? as usize;

    let collected_at = nexrad_datetime(u32::from(collect_date), collect_ms).ok_or_else(|| {
        NexradError::InvalidBlock(format!("radial date {} out of range", collect_date))
    })?;

    let mut moments = BTreeMap::new();
    let mut volume = None;

    for i in 0..block_count {
        let pointer = be_u32(body, 32 + 4 * i)? as usize;
        if pointer == 0 {
            continue;
        }
        let name_bytes = body
            .get(pointer + 1..pointer + 4)
            .ok_or(NexradError::Truncated { offset: pointer, needed: 4 })?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();

        match byte(body, pointer)? {
            b'R' if name == "VOL" => volume = Some(decode_volume_block(body, pointer)?),
            b'R' => {}
            b'D' => {
                if let Some(field) = moment_field_name(&name) {
                    moments.insert(field.to_string(), decode_moment(body, pointer, &name)?);
                }
            }
            other => {
                return Err(NexradError::InvalidBlock(format!(
                    "unknown block type {:#04x} ({})",
                    other, name
                )))
            }
        }
    }

    Ok(Radial {
        azimuth_deg,
        elevation_deg,
        elevation_number,
        radial_status,
        collected_at,
        moments,
        volume,
    })
}

fn decode_volume_block(body: &[u8], at: usize) -> NexradResult<VolumeBlock> {
    Ok(VolumeBlock {
        latitude: be_f32(body, at + 8)?,
        longitude: be_f32(body, at + 12)?,
        site_height_m: be_i16(body, at + 16)?,
        feedhorn_height_m: be_u16(body, at + 18)?,
        vcp: be_u16(body, at + 40)?,
    })
}

fn decode_moment(body: &[u8], at: usize, name: &str) -> NexradResult<Moment> {
    let gates = be_u16(body, at + 8)? as usize;
    let first_gate = be_u16(body, at + 10)?;
    let gate_spacing = be_u16(body, at + 12)?;
    let word_size = byte(body, at + 19)?;
    let scale = be_f32(body, at + 20)?;
    let offset = be_f32(body, at + 24)?;

    if scale == 0.0 || !scale.is_finite() {
        return Err(NexradError::InvalidBlock(format!("{} has scale {}", name, scale)));
    }

    let data_start = at + MOMENT_HEADER_LEN;
    let word_bytes = match word_size {
        8 => 1,
        16 => 2,
        other => {
            return Err(NexradError::InvalidBlock(format!(
                "{} has word size {}",
                name, other
            )))
        }
    };
    let raw = body
        .get(data_start..data_start + gates * word_bytes)
        .ok_or(NexradError::Truncated {
            offset: data_start,
            needed: gates * word_bytes,
        })?;

    let values = raw
        .chunks_exact(word_bytes)
        .map(|w| {
            let code = if word_bytes == 1 {
                u16::from(w[0])
            } else {
                u16::from_be_bytes([w[0], w[1]])
            };
            // 0 = below threshold, 1 = range folded
            if code <= 1 {
                f32::NAN
            } else {
                (f32::from(code) - offset) / scale
            }
        })
        .collect();

    Ok(Moment {
        first_gate_m: f64::from(first_gate),
        gate_spacing_m: f64::from(gate_spacing),
        values,
    })
}

fn byte(buf: &[u8], offset: usize) -> NexradResult<u8> {
    buf.get(offset)
        .copied()
        .ok_or(NexradError::Truncated { offset, needed: 1 })
}
