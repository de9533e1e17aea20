//! Shared fixtures for ingestion integration tests.
//!
//! Archives live in in-memory stores; the clock is pinned so locator
//! windows are deterministic.

#![allow(dead_code)]

use std::sync::Arc;

use atmos_common::SatelliteSector;
use bytes::Bytes;
use chrono::{DateTime, Datelike, Timelike, Utc};
use ingestion::{AbiOpener, Ingester, IngestionConfig};
use netcdf_parser::{AbiSource, MemoryDataset, NetCdfResult};
use storage::ObjectStorage;
use test_utils::grib2::{mrms_archive_key, Grib2Builder};
use test_utils::{archive_key, band13_radiance, utc, Level2Builder, KTLX};

/// Pinned "now" of every harness.
pub fn now() -> DateTime<Utc> {
    utc(2025, 1, 1, 12, 0, 0)
}

/// Small radar grid keeps encoding fast.
pub fn config() -> IngestionConfig {
    let mut config = IngestionConfig::default();
    config.radar.grid_radius_km = 60.0;
    config.radar.grid_res_km = 2.0;
    config.radar.max_frames = 10;
    config
}

/// Hands out the same in-memory dataset for any ABI file.
pub struct FixtureOpener(pub MemoryDataset);

impl AbiOpener for FixtureOpener {
    fn open(&self, _data: &[u8]) -> NetCdfResult<Box<dyn AbiSource>> {
        Ok(Box::new(self.0.clone()))
    }
}

pub struct Harness {
    pub radar: ObjectStorage,
    pub goes: ObjectStorage,
    pub mrms: ObjectStorage,
    pub derived: ObjectStorage,
    pub ingester: Ingester,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: IngestionConfig) -> Self {
        let radar = ObjectStorage::in_memory("unidata-nexrad-level2");
        let goes = ObjectStorage::in_memory("noaa-goes16");
        let mrms = ObjectStorage::in_memory("noaa-mrms-pds");
        let derived = ObjectStorage::in_memory("derived");
        let dataset = band13_radiance(40, 60, |_, _| Some(250.0));
        let ingester = Ingester::with_stores(
            config,
            radar.clone(),
            goes.clone(),
            mrms.clone(),
            derived.clone(),
        )
        .with_abi_opener(Arc::new(FixtureOpener(dataset)))
        .with_clock(now);
        Self {
            radar,
            goes,
            mrms,
            derived,
            ingester,
        }
    }

    /// Store a 35 dBZ KTLX volume observed at `time`.
    pub async fn put_volume(&self, time: DateTime<Utc>) -> String {
        let bytes = Level2Builder::new("KTLX", time)
            .location(KTLX)
            .gates(2125, 250)
            .reflectivity_sweep(1, 0.5, 90, 80, |_, _| Some(35.0))
            .build();
        self.put_radar_bytes(time, Bytes::from(bytes)).await
    }

    pub async fn put_radar_bytes(&self, time: DateTime<Utc>, bytes: Bytes) -> String {
        let key = archive_key("KTLX", &time);
        self.radar
            .put(&key, bytes, "application/octet-stream")
            .await
            .unwrap();
        key
    }

    /// Store a band 13 CONUS file whose scan started at `start`.
    pub async fn put_goes_file(&self, start: DateTime<Utc>) -> String {
        let key = goes_key(SatelliteSector::Conus, 13, start);
        self.goes
            .put(&key, Bytes::from_static(b"CDF"), "application/x-netcdf")
            .await
            .unwrap();
        key
    }

    /// Store a gzipped composite in `directory` whose reference time is
    /// `time`: 45 dBZ over central Oklahoma, no coverage elsewhere.
    pub async fn put_mrms_file(&self, directory: &str, time: DateTime<Utc>) -> String {
        let bytes = Grib2Builder::mrms_reflectivity()
            .with_reference_time(time)
            .with_grid(40, 30)
            .with_origin(36.5, -98.5)
            .with_spacing(0.05, 0.05)
            .with_field(|lon, lat| {
                if (-98.0..-97.0).contains(&lon) && (35.0..36.0).contains(&lat) {
                    45.0
                } else {
                    -99.0
                }
            })
            .build_gzipped();
        let key = mrms_archive_key(directory, &time);
        self.mrms
            .put(&key, Bytes::from(bytes), "application/gzip")
            .await
            .unwrap();
        key
    }

    pub async fn read_json(&self, key: &str) -> serde_json::Value {
        let bytes = self.derived.get(key).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

/// `ABI-L1b-RadC/YYYY/DDD/HH/OR_ABI-L1b-RadC-M6C13_G16_s..._e..._c....nc`
pub fn goes_key(sector: SatelliteSector, band: u8, start: DateTime<Utc>) -> String {
    let token = sector.filename_token();
    let stamp = format!(
        "{:04}{:03}{:02}{:02}{:02}0",
        start.year(),
        start.ordinal(),
        start.hour(),
        start.minute(),
        start.second()
    );
    format!(
        "ABI-L1b-Rad{}/{:04}/{:03}/{:02}/OR_ABI-L1b-{}-M6C{:02}_G16_s{}_e{}_c{}.nc",
        sector.product_letter(),
        start.year(),
        start.ordinal(),
        start.hour(),
        token,
        band,
        stamp,
        stamp,
        stamp
    )
}
