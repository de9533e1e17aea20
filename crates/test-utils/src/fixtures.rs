//! Common sites and times.

use chrono::{DateTime, TimeZone, Utc};

/// KTLX (Oklahoma City) antenna: latitude, longitude, height above MSL.
pub const KTLX: (f64, f64, f64) = (35.3331, -97.2778, 384.0);

/// KFWS (Dallas/Fort Worth) antenna.
pub const KFWS: (f64, f64, f64) = (32.5730, -97.3031, 233.0);

/// GOES-16 band 13 Planck constants: fk1, fk2, bc1, bc2.
pub const BAND13_PLANCK: (f64, f64, f64, f64) = (10803.3, 1392.74, 0.07550, 0.99975);

/// Shorthand for a UTC instant.
pub fn utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
        .single()
        .unwrap_or_else(|| panic!("invalid fixture time {year}-{month}-{day} {hour}:{min}:{sec}"))
}

/// Radiance that inverts to `bt_kelvin` under the given Planck constants.
pub fn radiance_for_brightness_temperature(bt_kelvin: f64, planck: (f64, f64, f64, f64)) -> f64 {
    let (fk1, fk2, bc1, bc2) = planck;
    let t_eff = bc1 + bc2 * bt_kelvin;
    fk1 / ((fk2 / t_eff).exp() - 1.0)
}
