//! Decoding of synthetic Level II archives.

use nexrad_parser::{decode, NexradError};
use test_utils::level2::Level2Builder;
use test_utils::{assert_approx_eq, utc, KTLX};

#[test]
fn test_decode_single_sweep_volume() {
    let time = utc(2025, 1, 1, 1, 2, 3);
    let bytes = Level2Builder::new("KTLX", time)
        .reflectivity_sweep(1, 0.5, 36, 100, |_, gate| Some(gate as f32 * 0.5 - 10.0))
        .build();

    let volume = decode(&bytes).unwrap();
    assert_eq!(volume.header.icao, "KTLX");
    assert_eq!(volume.header.started_at, time);
    assert_eq!(volume.vcp, Some(212));
    assert_eq!(volume.sweeps.len(), 1);
    assert_eq!(volume.field_names(), vec!["reflectivity".to_string()]);

    let location = volume.location.expect("volume block present");
    assert_approx_eq!(location.latitude, KTLX.0, 1e-4);
    assert_approx_eq!(location.longitude, KTLX.1, 1e-4);
    assert_approx_eq!(location.altitude_m, KTLX.2, 1e-9);

    let sweep = volume.sweep(0).unwrap();
    assert_eq!(sweep.radials.len(), 36);
    assert_approx_eq!(sweep.mean_elevation(), 0.5, 1e-6);

    let radial = &sweep.radials[0];
    assert_eq!(radial.collected_at, time);
    assert_approx_eq!(radial.azimuth_deg, 5.0, 1e-6);

    let moment = &radial.moments["reflectivity"];
    assert_eq!(moment.values.len(), 100);
    assert_eq!(moment.first_gate_m, 2125.0);
    assert_eq!(moment.gate_spacing_m, 250.0);
    assert_approx_eq!(moment.values[0], -10.0, 1e-6);
    assert_approx_eq!(moment.values[40], 10.0, 1e-6);
}

#[test]
fn test_below_threshold_gates_are_nan() {
    let bytes = Level2Builder::new("KTLX", utc(2025, 1, 1, 0, 0, 0))
        .reflectivity_sweep(1, 0.5, 8, 10, |_, gate| if gate < 5 { None } else { Some(30.0) })
        .build();

    let volume = decode(&bytes).unwrap();
    let values = &volume.sweeps[0].radials[3].moments["reflectivity"].values;
    assert!(values[..5].iter().all(|v| v.is_nan()));
    assert!(values[5..].iter().all(|v| (*v - 30.0).abs() < 1e-6));
}

#[test]
fn test_sweeps_ordered_by_elevation_number() {
    let bytes = Level2Builder::new("KFWS", utc(2025, 6, 1, 12, 0, 0))
        .reflectivity_sweep(2, 1.5, 4, 4, |_, _| Some(5.0))
        .reflectivity_sweep(1, 0.5, 4, 4, |_, _| Some(15.0))
        .build();

    let volume = decode(&bytes).unwrap();
    let numbers: Vec<u8> = volume.sweeps.iter().map(|s| s.elevation_number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_approx_eq!(volume.sweeps[0].mean_elevation(), 0.5, 1e-6);
}

#[test]
fn test_unknown_moment_names_are_ignored() {
    let bytes = Level2Builder::new("KTLX", utc(2025, 1, 1, 0, 0, 0))
        .moment_sweep(*b"XYZ", 1, 0.5, 4, 4, |_, _| Some(1.0))
        .build();

    let volume = decode(&bytes).unwrap();
    assert!(volume.field_names().is_empty());
}

#[test]
fn test_not_an_archive() {
    let result = decode(b"CDF\x01 this is a netcdf file, not radar data");
    assert!(matches!(result, Err(NexradError::InvalidFormat(_))));
}

#[test]
fn test_header_only_archive_has_no_radials() {
    let bytes = Level2Builder::new("KTLX", utc(2025, 1, 1, 0, 0, 0)).build();
    assert!(matches!(decode(&bytes), Err(NexradError::NoRadials)));
}
