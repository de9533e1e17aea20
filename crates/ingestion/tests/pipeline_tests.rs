//! End-to-end ingestion against in-memory archives.

mod common;

use atmos_common::{CompositeProduct, SatelliteSector, TimeTarget};
use bytes::Bytes;
use common::Harness;
use ingestion::{IngestionError, SensorParams, Stage};
use test_utils::{utc, Level2Builder, KTLX};

fn ktlx() -> SensorParams {
    SensorParams::Radar {
        site: "KTLX".to_string(),
    }
}

fn goes_conus() -> SensorParams {
    SensorParams::Satellite {
        band: 13,
        sector: SatelliteSector::Conus,
    }
}

fn mrms() -> SensorParams {
    SensorParams::Composite {
        product: CompositeProduct::ReflectivityQc,
    }
}

#[tokio::test]
async fn test_radar_latest_publishes_closest_volume() {
    let h = Harness::new();
    h.put_volume(utc(2025, 1, 1, 11, 50, 0)).await;
    let closest = h.put_volume(utc(2025, 1, 1, 11, 58, 0)).await;

    let outcome = h.ingester.ingest_latest(ktlx()).await.unwrap();

    assert_eq!(outcome.timestamp_key.as_str(), "20250101T115800Z");
    assert_eq!(outcome.source_key, closest);
    assert_eq!(outcome.requested_time, "latest");
    assert!(!outcome.fallback);
    assert!(outcome.written);
    assert_eq!(
        outcome.artifact_keys.cog_key,
        "nexrad/KTLX/20250101T115800Z/tilt0_reflectivity.tif"
    );
    assert_eq!(
        outcome.artifact_keys.index_key,
        "indices/radar/nexrad/KTLX/frames.json"
    );

    let cog = h.derived.get(&outcome.artifact_keys.cog_key).await.unwrap();
    assert_eq!(&cog[..4], b"II*\0");

    let meta = h.read_json(&outcome.artifact_keys.meta_key).await;
    assert_eq!(meta["units"], "dBZ");
    assert_eq!(meta["rescale"], serde_json::json!([-30.0, 75.0]));
    assert_eq!(meta["shape"], serde_json::json!([60, 60]));
    assert_eq!(meta["cog_key"], outcome.artifact_keys.cog_key.as_str());
    assert_eq!(meta["source_key"], closest.as_str());

    let frames = h.read_json(&outcome.artifact_keys.index_key).await;
    assert_eq!(frames.as_array().unwrap().len(), 1);
    assert_eq!(frames[0]["timestamp_key"], "20250101T115800Z");
    assert_eq!(
        frames[0]["tile_template"],
        "/tiles/weather/nexrad-KTLX/20250101T115800Z/{z}/{x}/{y}.png"
    );
}

#[tokio::test]
async fn test_radar_at_time_prefers_smaller_difference() {
    let h = Harness::new();
    h.put_volume(utc(2025, 1, 1, 9, 40, 0)).await;
    h.put_volume(utc(2025, 1, 1, 10, 5, 0)).await;

    let outcome = h
        .ingester
        .ingest_at(ktlx(), utc(2025, 1, 1, 10, 0, 0))
        .await
        .unwrap();

    assert_eq!(outcome.timestamp_key.as_str(), "20250101T100500Z");
    assert_eq!(outcome.requested_time, "2025-01-01T10:00:00Z");
    assert!(!outcome.fallback);
}

#[tokio::test]
async fn test_radar_at_time_falls_back_to_newest_object() {
    let h = Harness::new();
    h.put_volume(utc(2025, 1, 1, 11, 0, 0)).await;

    let outcome = h
        .ingester
        .ingest(ktlx(), TimeTarget::At(utc(2025, 1, 1, 6, 0, 0)))
        .await
        .unwrap();

    assert!(outcome.fallback);
    assert_eq!(outcome.timestamp_key.as_str(), "20250101T110000Z");
    let meta = h.read_json(&outcome.artifact_keys.meta_key).await;
    let caveats = meta["caveats"].as_array().unwrap();
    assert!(caveats
        .iter()
        .any(|c| c.as_str().unwrap().contains("newest available")));
}

#[tokio::test]
async fn test_radar_at_time_window_edge_is_inclusive() {
    let h = Harness::new();
    h.put_volume(utc(2025, 1, 1, 10, 30, 0)).await;

    let outcome = h
        .ingester
        .ingest_at(ktlx(), utc(2025, 1, 1, 10, 0, 0))
        .await
        .unwrap();

    assert!(!outcome.fallback);
    assert_eq!(outcome.timestamp_key.as_str(), "20250101T103000Z");
}

#[tokio::test]
async fn test_radar_at_time_beyond_window_falls_back() {
    let h = Harness::new();
    h.put_volume(utc(2025, 1, 1, 9, 29, 0)).await;
    h.put_volume(utc(2025, 1, 1, 10, 31, 0)).await;

    let outcome = h
        .ingester
        .ingest_at(ktlx(), utc(2025, 1, 1, 10, 0, 0))
        .await
        .unwrap();

    assert!(outcome.fallback);
    assert_eq!(outcome.timestamp_key.as_str(), "20250101T103100Z");
}

#[tokio::test]
async fn test_missing_source_fails_while_locating() {
    let h = Harness::new();

    let failure = h.ingester.ingest_latest(ktlx()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Locating);
    assert_eq!(failure.http_status(), 404);
    assert!(matches!(failure.source, IngestionError::NotFound(_)));
    assert!(h.derived.list("").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_republish_is_idempotent() {
    let h = Harness::new();
    h.put_volume(utc(2025, 1, 1, 11, 55, 0)).await;

    let first = h.ingester.ingest_latest(ktlx()).await.unwrap();
    let before = h.derived.get(&first.artifact_keys.cog_key).await.unwrap();
    let second = h.ingester.ingest_latest(ktlx()).await.unwrap();

    assert!(first.written);
    assert!(!second.written);
    assert_eq!(first.artifact_keys, second.artifact_keys);
    let after = h.derived.get(&second.artifact_keys.cog_key).await.unwrap();
    assert_eq!(before, after);

    let frames = h.read_json(&second.artifact_keys.index_key).await;
    assert_eq!(frames.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_republish_restores_missing_index_entry() {
    let h = Harness::new();
    h.put_volume(utc(2025, 1, 1, 11, 55, 0)).await;

    let first = h.ingester.ingest_latest(ktlx()).await.unwrap();
    h.derived
        .put(
            &first.artifact_keys.index_key,
            Bytes::from_static(b"[]"),
            "application/json",
        )
        .await
        .unwrap();

    let second = h.ingester.ingest_latest(ktlx()).await.unwrap();
    assert!(!second.written);
    let frames = h.read_json(&second.artifact_keys.index_key).await;
    assert_eq!(frames.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_velocity_only_volume_is_unsupported() {
    let h = Harness::new();
    let time = utc(2025, 1, 1, 11, 55, 0);
    let bytes = Level2Builder::new("KTLX", time)
        .location(KTLX)
        .moment_sweep(*b"VEL", 1, 0.5, 36, 20, |_, _| Some(5.0))
        .build();
    h.put_radar_bytes(time, Bytes::from(bytes)).await;

    let failure = h.ingester.ingest_latest(ktlx()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Decoding);
    assert_eq!(failure.http_status(), 422);
    match failure.source {
        IngestionError::UnsupportedFormat { available } => {
            assert_eq!(available, vec!["velocity".to_string()]);
        }
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
    assert!(h.derived.list("").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_adds_new_frames_once() {
    let h = Harness::new();
    h.put_volume(utc(2025, 1, 1, 11, 0, 0)).await;
    h.ingester
        .ingest_at(ktlx(), utc(2025, 1, 1, 11, 0, 0))
        .await
        .unwrap();
    h.put_volume(utc(2025, 1, 1, 11, 20, 0)).await;
    h.put_volume(utc(2025, 1, 1, 11, 40, 0)).await;

    let first = h.ingester.ingest_frames("ktlx", 5, None).await.unwrap();
    assert_eq!(first.site, "KTLX");
    assert_eq!(first.added, 2);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.total_frames, 3);

    let second = h.ingester.ingest_frames("KTLX", 5, None).await.unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.total_frames, 3);

    let keys: Vec<_> = second
        .frames
        .iter()
        .map(|f| f.timestamp_key.as_str().to_string())
        .collect();
    assert_eq!(
        keys,
        vec!["20250101T110000Z", "20250101T112000Z", "20250101T114000Z"]
    );
}

#[tokio::test]
async fn test_batch_respects_max_new_in_chronological_order() {
    let h = Harness::new();
    for minute in [10, 20, 30, 40] {
        h.put_volume(utc(2025, 1, 1, 11, minute, 0)).await;
    }

    let outcome = h.ingester.ingest_frames("KTLX", 2, None).await.unwrap();

    assert_eq!(outcome.added, 2);
    let keys: Vec<_> = outcome
        .frames
        .iter()
        .map(|f| f.timestamp_key.as_str().to_string())
        .collect();
    assert_eq!(keys, vec!["20250101T111000Z", "20250101T112000Z"]);
}

#[tokio::test]
async fn test_batch_skips_corrupt_volume() {
    let h = Harness::new();
    h.put_volume(utc(2025, 1, 1, 11, 10, 0)).await;
    h.put_radar_bytes(
        utc(2025, 1, 1, 11, 20, 0),
        Bytes::from_static(b"AR2V0006.not a volume"),
    )
    .await;
    h.put_volume(utc(2025, 1, 1, 11, 30, 0)).await;

    let outcome = h.ingester.ingest_frames("KTLX", 5, Some(60)).await.unwrap();

    assert_eq!(outcome.added, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.total_frames, 2);
}

#[tokio::test]
async fn test_batch_caps_index_length() {
    let mut config = common::config();
    config.radar.max_frames = 3;
    let h = Harness::with_config(config);
    for minute in [5, 15, 25, 35, 45] {
        h.put_volume(utc(2025, 1, 1, 11, minute, 0)).await;
    }

    let outcome = h.ingester.ingest_frames("KTLX", 10, None).await.unwrap();

    assert_eq!(outcome.added, 3);
    assert_eq!(outcome.skipped, 2);
    assert_eq!(outcome.total_frames, 3);
    // Volumes that could never be retained leave nothing behind
    let written = h.derived.list("nexrad/KTLX/").await.unwrap();
    assert_eq!(written.len(), 6);
    assert!(written.iter().all(|o| !o.key.contains("T110500Z")));
    let frames = h.read_json(&outcome.index_key).await;
    let stored: Vec<_> = frames
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["timestamp_key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        stored,
        vec!["20250101T112500Z", "20250101T113500Z", "20250101T114500Z"]
    );
}

#[tokio::test]
async fn test_batch_rerun_on_full_index_adds_nothing() {
    let mut config = common::config();
    config.radar.max_frames = 3;
    let h = Harness::with_config(config);
    for minute in [5, 15, 25, 35, 45] {
        h.put_volume(utc(2025, 1, 1, 11, minute, 0)).await;
    }

    let first = h.ingester.ingest_frames("KTLX", 10, None).await.unwrap();
    let second = h.ingester.ingest_frames("KTLX", 10, None).await.unwrap();

    assert_eq!(second.added, 0);
    assert_eq!(second.failed, 0);
    assert_eq!(second.skipped, 5);
    assert_eq!(second.total_frames, first.total_frames);
    assert_eq!(second.frames, first.frames);

    // A newer volume still gets in, evicting the oldest frame
    h.put_volume(utc(2025, 1, 1, 11, 55, 0)).await;
    let third = h.ingester.ingest_frames("KTLX", 1, None).await.unwrap();
    assert_eq!(third.added, 1);
    assert_eq!(third.total_frames, 3);
    assert_eq!(third.frames[0].timestamp_key.as_str(), "20250101T113500Z");
    assert_eq!(third.frames[2].timestamp_key.as_str(), "20250101T115500Z");
}

#[tokio::test]
async fn test_concurrent_ingests_keep_every_frame() {
    let h = Harness::new();
    let times: Vec<_> = [20, 30, 40]
        .into_iter()
        .map(|m| utc(2025, 1, 1, 11, m, 0))
        .collect();
    for time in &times {
        h.put_volume(*time).await;
    }

    let tasks: Vec<_> = times
        .iter()
        .map(|time| {
            let ingester = h.ingester.clone();
            let time = *time;
            tokio::spawn(async move { ingester.ingest_at(ktlx(), time).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let listing = h.ingester.list_frames("KTLX", None).await.unwrap();
    assert_eq!(listing.frames.len(), 3);
}

#[tokio::test]
async fn test_goes_latest_publishes_and_updates_timeline() {
    let h = Harness::new();
    h.put_goes_file(utc(2025, 1, 1, 11, 36, 20)).await;
    let newest = h.put_goes_file(utc(2025, 1, 1, 11, 56, 20)).await;

    let outcome = h.ingester.ingest_latest(goes_conus()).await.unwrap();

    assert_eq!(outcome.timestamp_key.as_str(), "20250101T115620Z");
    assert_eq!(outcome.source_key, newest);
    assert_eq!(
        outcome.artifact_keys.cog_key,
        "derived/goes/east/abi/c13/conus/20250101T115620Z/bt_c13.tif"
    );

    let meta = h.read_json(&outcome.artifact_keys.meta_key).await;
    assert_eq!(meta["units"], "K");
    assert_eq!(meta["band"], 13);
    assert_eq!(meta["sector"], "CONUS");
    assert_eq!(meta["rescale"], serde_json::json!([180.0, 330.0]));
    assert_eq!(meta["shape"], serde_json::json!([1400, 2800]));
    assert_eq!(meta["instrument"], "ABI");

    let timeline = h
        .read_json("indices/goes/east/abi/c13/conus/index.json")
        .await;
    assert_eq!(timeline["latest"], "20250101T115620Z");
    assert_eq!(timeline["timestamps"], serde_json::json!(["20250101T115620Z"]));
    assert_eq!(timeline["cadence_minutes"], 10);
}

#[tokio::test]
async fn test_goes_meso_sector_is_rejected() {
    let h = Harness::new();
    let params = SensorParams::Satellite {
        band: 13,
        sector: SatelliteSector::Meso1,
    };

    let failure = h.ingester.ingest_latest(params).await.unwrap_err();

    assert_eq!(failure.http_status(), 400);
    assert_eq!(failure.stage, Stage::Locating);
}

#[tokio::test]
async fn test_mrms_latest_prefers_primary_directory() {
    let h = Harness::new();
    let primary = h
        .put_mrms_file("MergedReflectivityQComposite", utc(2025, 1, 1, 11, 50, 0))
        .await;
    h.put_mrms_file(
        "MergedReflectivityComposite_00.50",
        utc(2025, 1, 1, 11, 56, 0),
    )
    .await;

    let outcome = h.ingester.ingest_latest(mrms()).await.unwrap();

    // 11:50 sits on the edge of the window around now
    assert_eq!(outcome.source_key, primary);
    assert_eq!(outcome.timestamp_key.as_str(), "20250101T115000Z");
    assert_eq!(
        outcome.artifact_keys.cog_key,
        "derived/mrms/reflq/20250101T115000Z/mosaic.tif"
    );
    assert_eq!(
        outcome.tile_template,
        "/tiles/weather/mrms-reflq/20250101T115000Z/{z}/{x}/{y}.png"
    );

    let meta = h.read_json(&outcome.artifact_keys.meta_key).await;
    assert_eq!(meta["product"], "MRMS Merged Reflectivity Composite");
    assert_eq!(meta["units"], "dBZ");
    assert_eq!(meta["rescale"], serde_json::json!([-30.0, 80.0]));
    assert_eq!(meta["shape"], serde_json::json!([1400, 2800]));
    assert_eq!(meta["bounds"], serde_json::json!([-130.0, 20.0, -60.0, 55.0]));
    assert_eq!(meta["coverage"], "CONUS");
    assert_eq!(meta["provenance"], "NOAA MRMS");
    assert_eq!(meta["cog_key"], outcome.artifact_keys.cog_key.as_str());

    let timeline = h.read_json("indices/mrms/reflq/index.json").await;
    assert_eq!(timeline["latest"], "20250101T115000Z");
    assert_eq!(timeline["cadence_minutes"], 5);
}

#[tokio::test]
async fn test_mrms_latest_searches_back_in_steps() {
    let h = Harness::new();
    h.put_mrms_file("MRMS_MergedReflectivityQC", utc(2025, 1, 1, 11, 35, 0))
        .await;

    let outcome = h.ingester.ingest_latest(mrms()).await.unwrap();
    assert_eq!(outcome.timestamp_key.as_str(), "20250101T113500Z");

    let h = Harness::new();
    h.put_mrms_file("MergedReflectivityQComposite", utc(2025, 1, 1, 11, 0, 0))
        .await;
    let failure = h.ingester.ingest_latest(mrms()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Locating);
    assert_eq!(failure.http_status(), 404);
}

#[tokio::test]
async fn test_mrms_at_time_requires_match_within_the_hour() {
    let h = Harness::new();
    h.put_mrms_file("MergedReflectivityQComposite", utc(2025, 1, 1, 11, 0, 0))
        .await;

    let failure = h
        .ingester
        .ingest_at(mrms(), utc(2025, 1, 1, 10, 0, 0))
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Locating);
    assert!(matches!(failure.source, IngestionError::NotFound(_)));

    let outcome = h
        .ingester
        .ingest_at(mrms(), utc(2025, 1, 1, 10, 0, 1))
        .await
        .unwrap();
    assert_eq!(outcome.timestamp_key.as_str(), "20250101T110000Z");
    assert_eq!(outcome.requested_time, "2025-01-01T10:00:01Z");
}

#[tokio::test]
async fn test_mrms_corrupt_file_fails_while_decoding() {
    let h = Harness::new();
    let key = test_utils::grib2::mrms_archive_key(
        "MergedReflectivityQComposite",
        &utc(2025, 1, 1, 11, 58, 0),
    );
    h.mrms
        .put(&key, Bytes::from_static(b"GRIB\0\0\xd1\x02"), "application/gzip")
        .await
        .unwrap();

    let failure = h.ingester.ingest_latest(mrms()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Decoding);
    assert!(!h.derived.exists("indices/mrms/reflq/index.json").await.unwrap());
}

#[tokio::test]
async fn test_list_frames_and_legend() {
    let h = Harness::new();
    assert!(matches!(
        h.ingester.list_frames("KTLX", None).await,
        Err(IngestionError::NotFound(_))
    ));

    h.put_volume(utc(2025, 1, 1, 11, 55, 0)).await;
    let outcome = h.ingester.ingest_latest(ktlx()).await.unwrap();

    let listing = h.ingester.list_frames("ktlx", Some(5)).await.unwrap();
    assert_eq!(listing.site, "KTLX");
    assert_eq!(listing.frames.len(), 1);

    let legend = h
        .ingester
        .legend("KTLX", outcome.timestamp_key.as_str())
        .await
        .unwrap();
    assert_eq!(legend.legend["palette"], "nexrad_reflectivity");
    assert_eq!(legend.legend["site"], "KTLX");
    assert_eq!(legend.legend["extent_km"], 60.0);
    assert_eq!(legend.legend["resolution_m"], 2000.0);
    assert_eq!(legend.raw["timestamp_key"], "20250101T115500Z");

    assert!(matches!(
        h.ingester.legend("KTLX", "20250101T000000Z").await,
        Err(IngestionError::NotFound(_))
    ));
    assert!(matches!(
        h.ingester.legend("KTLX", "yesterday").await,
        Err(IngestionError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_timeline_lists_index_documents() {
    let h = Harness::new();
    h.put_volume(utc(2025, 1, 1, 11, 55, 0)).await;
    h.ingester.ingest_latest(ktlx()).await.unwrap();

    let listing = h.ingester.timeline("radar/nexrad").await.unwrap();
    assert_eq!(listing.count, 1);
    assert_eq!(listing.entries, vec!["KTLX/frames.json".to_string()]);

    assert!(matches!(
        h.ingester.timeline("../secrets").await,
        Err(IngestionError::InvalidRequest(_))
    ));
}

