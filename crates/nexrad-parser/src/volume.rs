//! Volume assembly: radials grouped into sweeps.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{NexradError, NexradResult};
use crate::header::VolumeHeader;
use crate::message::{decode_messages, Moment, Radial};
use crate::records::{maybe_gunzip, message_stream};

/// Radar antenna position from the volume data block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Site elevation plus feedhorn height (meters above MSL)
    pub altitude_m: f64,
}

/// All radials sharing one elevation cut.
#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    pub elevation_number: u8,
    pub radials: Vec<Radial>,
}

impl Sweep {
    /// Mean elevation angle of the radials (degrees).
    pub fn mean_elevation(&self) -> f64 {
        if self.radials.is_empty() {
            return 0.0;
        }
        self.radials
            .iter()
            .map(|r| f64::from(r.elevation_deg))
            .sum::<f64>()
            / self.radials.len() as f64
    }

    /// Fields present on at least one radial.
    pub fn field_names(&self) -> BTreeSet<String> {
        self.radials
            .iter()
            .flat_map(|r| r.moments.keys().cloned())
            .collect()
    }

    /// `(azimuth, elevation, moment)` for every radial carrying `field`.
    pub fn moments<'a>(&'a self, field: &'a str) -> impl Iterator<Item = (f32, f32, &'a Moment)> + 'a {
        self.radials.iter().filter_map(move |r| {
            r.moments
                .get(field)
                .map(|m| (r.azimuth_deg, r.elevation_deg, m))
        })
    }
}

/// A decoded Level II volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub header: VolumeHeader,
    pub location: Option<RadarLocation>,
    /// Volume coverage pattern number, when a volume block was present
    pub vcp: Option<u16>,
    /// Sweeps ordered by elevation number, lowest tilt first
    pub sweeps: Vec<Sweep>,
}

impl Volume {
    /// Fields present anywhere in the volume, sorted.
    pub fn field_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self.sweeps.iter().flat_map(|s| s.field_names()).collect();
        names.into_iter().collect()
    }

    pub fn sweep(&self, index: usize) -> Option<&Sweep> {
        self.sweeps.get(index)
    }
}

/// Decode a complete Level II archive.
pub fn decode(data: &[u8]) -> NexradResult<Volume> {
    let gunzipped = maybe_gunzip(data)?;
    let data = gunzipped.as_deref().unwrap_or(data);

    let header = VolumeHeader::parse(data)?;
    let stream = message_stream(data)?;
    let radials = decode_messages(&stream)?;
    if radials.is_empty() {
        return Err(NexradError::NoRadials);
    }

    let volume_block = radials.iter().find_map(|r| r.volume);
    let location = volume_block.map(|v| RadarLocation {
        latitude: f64::from(v.latitude),
        longitude: f64::from(v.longitude),
        altitude_m: f64::from(v.site_height_m) + f64::from(v.feedhorn_height_m),
    });

    let mut by_cut: BTreeMap<u8, Vec<Radial>> = BTreeMap::new();
    for radial in radials {
        by_cut.entry(radial.elevation_number).or_default().push(radial);
    }
    let sweeps: Vec<Sweep> = by_cut
        .into_iter()
        .map(|(elevation_number, radials)| Sweep {
            elevation_number,
            radials,
        })
        .collect();

    debug!(
        icao = %header.icao,
        sweeps = sweeps.len(),
        radials = sweeps.iter().map(|s| s.radials.len()).sum::<usize>(),
        "Decoded Level II volume"
    );

    Ok(Volume {
        header,
        location,
        vcp: volume_block.map(|v| v.vcp),
        sweeps,
    })
}
