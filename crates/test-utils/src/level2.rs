//! Synthetic NEXRAD Level II archive writer.
//!
//! Produces byte-exact AR2V0006 archives: volume header, one metadata record
//! and one bzip2 LDM record per sweep of Message 31 radials.

use std::io::Write;

use bzip2::write::BzEncoder;
use bzip2::Compression;
use chrono::{DateTime, Timelike, Utc};

const LEGACY_RECORD_LEN: usize = 2432;
/// Reflectivity encoding used by the RDA: code = dBZ * 2 + 66.
const REF_SCALE: f32 = 2.0;
const REF_OFFSET: f32 = 66.0;

struct SweepSpec {
    elevation_number: u8,
    elevation_deg: f32,
    moment: [u8; 3],
    radials: Vec<(f32, Vec<u8>)>,
}

/// Builder for a single-volume archive.
pub struct Level2Builder {
    icao: String,
    time: DateTime<Utc>,
    location: (f64, f64, f64),
    first_gate_m: u16,
    gate_spacing_m: u16,
    sweeps: Vec<SweepSpec>,
}

impl Level2Builder {
    pub fn new(icao: &str, time: DateTime<Utc>) -> Self {
        Self {
            icao: icao.to_string(),
            time,
            location: crate::fixtures::KTLX,
            first_gate_m: 2125,
            gate_spacing_m: 250,
            sweeps: Vec::new(),
        }
    }

    /// Antenna latitude, longitude and height (meters).
    pub fn location(mut self, location: (f64, f64, f64)) -> Self {
        self.location = location;
        self
    }

    pub fn gates(mut self, first_gate_m: u16, gate_spacing_m: u16) -> Self {
        self.first_gate_m = first_gate_m;
        self.gate_spacing_m = gate_spacing_m;
        self
    }

    /// Add a reflectivity sweep. `dbz(azimuth, gate)` returning `None` writes
    /// a below-threshold gate.
    pub fn reflectivity_sweep<F>(
        self,
        elevation_number: u8,
        elevation_deg: f32,
        radials: usize,
        gates: usize,
        dbz: F,
    ) -> Self
    where
        F: Fn(f32, usize) -> Option<f32>,
    {
        self.moment_sweep(*b"REF", elevation_number, elevation_deg, radials, gates, dbz)
    }

    /// Add a sweep carrying a single arbitrary moment block name.
    pub fn moment_sweep<F>(
        mut self,
        moment: [u8; 3],
        elevation_number: u8,
        elevation_deg: f32,
        radials: usize,
        gates: usize,
        value: F,
    ) -> Self
    where
        F: Fn(f32, usize) -> Option<f32>,
    {
        let step = 360.0 / radials.max(1) as f32;
        let radials = (0..radials)
            .map(|i| {
                let azimuth = (i as f32 + 0.5) * step;
                let codes = (0..gates)
                    .map(|g| match value(azimuth, g) {
                        Some(v) => (v * REF_SCALE + REF_OFFSET).round().clamp(2.0, 255.0) as u8,
                        None => 0,
                    })
                    .collect();
                (azimuth, codes)
            })
            .collect();

        self.sweeps.push(SweepSpec {
            elevation_number,
            elevation_deg,
            moment,
            radials,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let (date, millis) = nexrad_date(&self.time);

        let mut out = Vec::new();
        out.extend_from_slice(b"AR2V0006.001");
        out.extend_from_slice(&date.to_be_bytes());
        out.extend_from_slice(&millis.to_be_bytes());
        out.extend_from_slice(&icao_bytes(&self.icao));

        // Metadata record: a single RDA status frame (message type 2)
        let mut metadata = vec![0u8; LEGACY_RECORD_LEN];
        metadata[12..14].copy_from_slice(&((LEGACY_RECORD_LEN as u16 - 12) / 2).to_be_bytes());
        metadata[15] = 2;

        let mut records = vec![metadata];
        let total_sweeps = self.sweeps.len();
        for (s, sweep) in self.sweeps.iter().enumerate() {
            let mut stream = Vec::new();
            for (r, (azimuth, codes)) in sweep.radials.iter().enumerate() {
                let status = match (s, r) {
                    (0, 0) => 3,
                    (_, 0) => 0,
                    _ if s + 1 == total_sweeps && r + 1 == sweep.radials.len() => 4,
                    _ if r + 1 == sweep.radials.len() => 2,
                    _ => 1,
                };
                stream.extend_from_slice(&self.message31(sweep, r, *azimuth, status, codes));
            }
            records.push(stream);
        }

        let count = records.len();
        for (i, record) in records.into_iter().enumerate() {
            let compressed = bzip(&record);
            let len = compressed.len() as i32;
            let control = if i + 1 == count { -len } else { len };
            out.extend_from_slice(&control.to_be_bytes());
            out.extend_from_slice(&compressed);
        }
        out
    }

    fn message31(
        &self,
        sweep: &SweepSpec,
        index: usize,
        azimuth: f32,
        status: u8,
        codes: &[u8],
    ) -> Vec<u8> {
        let (date, millis) = nexrad_date(&self.time);
        let (lat, lon, height) = self.location;
        let block_count: u16 = 2;
        let header_len = 32 + 4 * block_count as usize;
        let vol_len = 44;

        let mut body = Vec::new();
        body.extend_from_slice(&icao_bytes(&self.icao));
        body.extend_from_slice(&millis.to_be_bytes());
        body.extend_from_slice(&(date as u16).to_be_bytes());
        body.extend_from_slice(&(index as u16 + 1).to_be_bytes());
        body.extend_from_slice(&azimuth.to_be_bytes());
        body.extend_from_slice(&[0, 0]); // compression, spare
        body.extend_from_slice(&0u16.to_be_bytes()); // radial length
        body.extend_from_slice(&[1, status, sweep.elevation_number, 0]);
        body.extend_from_slice(&sweep.elevation_deg.to_be_bytes());
        body.extend_from_slice(&[0, 0]); // spot blanking, indexing mode
        body.extend_from_slice(&block_count.to_be_bytes());
        body.extend_from_slice(&(header_len as u32).to_be_bytes());
        body.extend_from_slice(&((header_len + vol_len) as u32).to_be_bytes());

        // Volume data block
        body.push(b'R');
        body.extend_from_slice(b"VOL");
        body.extend_from_slice(&(vol_len as u16).to_be_bytes());
        body.extend_from_slice(&[1, 0]);
        body.extend_from_slice(&(lat as f32).to_be_bytes());
        body.extend_from_slice(&(lon as f32).to_be_bytes());
        body.extend_from_slice(&(height as i16 - 20).to_be_bytes());
        body.extend_from_slice(&20u16.to_be_bytes()); // feedhorn height
        body.extend_from_slice(&[0u8; 20]); // calibration and power fields
        body.extend_from_slice(&212u16.to_be_bytes()); // VCP
        body.extend_from_slice(&0u16.to_be_bytes());

        // Moment data block
        body.push(b'D');
        body.extend_from_slice(&sweep.moment);
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&(codes.len() as u16).to_be_bytes());
        body.extend_from_slice(&self.first_gate_m.to_be_bytes());
        body.extend_from_slice(&self.gate_spacing_m.to_be_bytes());
        body.extend_from_slice(&16u16.to_be_bytes()); // threshold
        body.extend_from_slice(&0i16.to_be_bytes()); // SNR threshold
        body.extend_from_slice(&[0, 8]); // control flags, word size
        body.extend_from_slice(&REF_SCALE.to_be_bytes());
        body.extend_from_slice(&REF_OFFSET.to_be_bytes());
        body.extend_from_slice(codes);
        if body.len() % 2 == 1 {
            body.push(0);
        }

        let message_len = 16 + body.len();
        let mut msg = vec![0u8; 12];
        msg.extend_from_slice(&((message_len / 2) as u16).to_be_bytes());
        msg.extend_from_slice(&[0, 31]);
        msg.extend_from_slice(&(index as u16).to_be_bytes());
        msg.extend_from_slice(&(date as u16).to_be_bytes());
        msg.extend_from_slice(&millis.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&body);
        msg
    }
}

/// Source archive filename for a site and time, e.g. `KTLX20250101_010203_V06`.
pub fn archive_name(icao: &str, time: &DateTime<Utc>) -> String {
    format!("{}{}_V06", icao, time.format("%Y%m%d_%H%M%S"))
}

/// Source archive key under the `YYYY/MM/DD/SITE/` layout.
pub fn archive_key(icao: &str, time: &DateTime<Utc>) -> String {
    format!("{}/{}/{}", time.format("%Y/%m/%d"), icao, archive_name(icao, time))
}

fn nexrad_date(time: &DateTime<Utc>) -> (u32, u32) {
    let days = time.timestamp().div_euclid(86_400) as u32 + 1;
    let millis = time.num_seconds_from_midnight() * 1000;
    (days, millis)
}

fn icao_bytes(icao: &str) -> [u8; 4] {
    let mut out = [b' '; 4];
    for (dst, src) in out.iter_mut().zip(icao.bytes()) {
        *dst = src;
    }
    out
}

fn bzip(data: &[u8]) -> Vec<u8> {
    let mut enc = BzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(data).expect("in-memory write");
    enc.finish().expect("in-memory bzip2")
}
