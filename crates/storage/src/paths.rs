//! Key layouts for the source archives and the derived bucket.
//!
//! Derived keys are consumed bit-exact by tile servers; every writer goes
//! through these builders rather than formatting keys itself.

use atmos_common::{CompositeProduct, SatelliteSector, TimestampKey};
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Derived bucket layout.
pub struct StoragePath;

impl StoragePath {
    /// Format: nexrad/{SITE}/{TIMESTAMP_KEY}/tilt0_reflectivity.tif
    pub fn radar_cog(site: &str, ts: &TimestampKey) -> String {
        format!("nexrad/{}/{}/tilt0_reflectivity.tif", site, ts)
    }

    /// Format: nexrad/{SITE}/{TIMESTAMP_KEY}/tilt0_reflectivity.json
    pub fn radar_meta(site: &str, ts: &TimestampKey) -> String {
        format!("nexrad/{}/{}/tilt0_reflectivity.json", site, ts)
    }

    /// Format: indices/radar/nexrad/{SITE}/frames.json
    pub fn radar_frames(site: &str) -> String {
        format!("indices/radar/nexrad/{}/frames.json", site)
    }

    /// Format: derived/goes/east/abi/c{BAND}/{sector}/{TIMESTAMP_KEY}/bt_c{BAND}.tif
    pub fn goes_cog(band: u8, sector: SatelliteSector, ts: &TimestampKey) -> String {
        format!(
            "derived/goes/east/abi/c{:02}/{}/{}/bt_c{:02}.tif",
            band,
            sector_segment(sector),
            ts,
            band
        )
    }

    /// Format: derived/goes/east/abi/c{BAND}/{sector}/{TIMESTAMP_KEY}/bt_c{BAND}.json
    pub fn goes_meta(band: u8, sector: SatelliteSector, ts: &TimestampKey) -> String {
        format!(
            "derived/goes/east/abi/c{:02}/{}/{}/bt_c{:02}.json",
            band,
            sector_segment(sector),
            ts,
            band
        )
    }

    /// Format: indices/goes/east/abi/c{BAND}/{sector}/index.json
    pub fn goes_timeline(band: u8, sector: SatelliteSector) -> String {
        format!(
            "indices/goes/east/abi/c{:02}/{}/index.json",
            band,
            sector_segment(sector)
        )
    }

    /// Format: derived/mrms/{product}/{TIMESTAMP_KEY}/mosaic.tif
    pub fn mrms_cog(product: CompositeProduct, ts: &TimestampKey) -> String {
        format!("derived/mrms/{}/{}/mosaic.tif", product, ts)
    }

    /// Format: derived/mrms/{product}/{TIMESTAMP_KEY}/meta.json
    pub fn mrms_meta(product: CompositeProduct, ts: &TimestampKey) -> String {
        format!("derived/mrms/{}/{}/meta.json", product, ts)
    }

    /// Format: indices/mrms/{product}/index.json
    pub fn mrms_timeline(product: CompositeProduct) -> String {
        format!("indices/mrms/{}/index.json", product)
    }

    /// Format: indices/{layer}/
    pub fn index_prefix(layer: &str) -> String {
        format!("indices/{}/", layer.trim_matches('/'))
    }
}

/// Sector path segments are lowercase (`conus`, `full`).
fn sector_segment(sector: SatelliteSector) -> String {
    sector.as_str().to_ascii_lowercase()
}

/// Public source archive layouts.
pub struct SourcePath;

impl SourcePath {
    /// Format: {YYYY}/{MM}/{DD}/{SITE}/
    pub fn nexrad_day(site: &str, day: &DateTime<Utc>) -> String {
        format!(
            "{:04}/{:02}/{:02}/{}/",
            day.year(),
            day.month(),
            day.day(),
            site
        )
    }

    /// Format: {YYYY}/{MM}/{DD}/{product directory}/
    pub fn mrms_day(directory: &str, day: &DateTime<Utc>) -> String {
        format!(
            "{:04}/{:02}/{:02}/{}/",
            day.year(),
            day.month(),
            day.day(),
            directory
        )
    }

    /// Format: ABI-L1b-Rad{C|F|M}/{YYYY}/{DDD}/{HH}/
    pub fn goes_hour(sector: SatelliteSector, hour: &DateTime<Utc>) -> String {
        format!(
            "ABI-L1b-Rad{}/{:04}/{:03}/{:02}/",
            sector.product_letter(),
            hour.year(),
            hour.ordinal(),
            hour.hour()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> TimestampKey {
        TimestampKey::parse("20250101T010203Z").unwrap()
    }

    #[test]
    fn test_radar_paths() {
        assert_eq!(
            StoragePath::radar_cog("KTLX", &ts()),
            "nexrad/KTLX/20250101T010203Z/tilt0_reflectivity.tif"
        );
        assert_eq!(
            StoragePath::radar_meta("KTLX", &ts()),
            "nexrad/KTLX/20250101T010203Z/tilt0_reflectivity.json"
        );
        assert_eq!(
            StoragePath::radar_frames("KTLX"),
            "indices/radar/nexrad/KTLX/frames.json"
        );
    }

    #[test]
    fn test_goes_paths() {
        assert_eq!(
            StoragePath::goes_cog(13, SatelliteSector::Conus, &ts()),
            "derived/goes/east/abi/c13/conus/20250101T010203Z/bt_c13.tif"
        );
        assert_eq!(
            StoragePath::goes_meta(2, SatelliteSector::FullDisk, &ts()),
            "derived/goes/east/abi/c02/full/20250101T010203Z/bt_c02.json"
        );
        assert_eq!(
            StoragePath::goes_timeline(13, SatelliteSector::Conus),
            "indices/goes/east/abi/c13/conus/index.json"
        );
        assert_eq!(StoragePath::index_prefix("/radar/nexrad/"), "indices/radar/nexrad/");
    }

    #[test]
    fn test_mrms_paths() {
        let product = CompositeProduct::ReflectivityQc;
        assert_eq!(
            StoragePath::mrms_cog(product, &ts()),
            "derived/mrms/reflq/20250101T010203Z/mosaic.tif"
        );
        assert_eq!(
            StoragePath::mrms_meta(product, &ts()),
            "derived/mrms/reflq/20250101T010203Z/meta.json"
        );
        assert_eq!(StoragePath::mrms_timeline(product), "indices/mrms/reflq/index.json");
    }

    #[test]
    fn test_source_prefixes() {
        let t = Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(SourcePath::nexrad_day("KTLX", &t), "2025/02/03/KTLX/");
        assert_eq!(
            SourcePath::goes_hour(SatelliteSector::Conus, &t),
            "ABI-L1b-RadC/2025/034/04/"
        );
        assert_eq!(
            SourcePath::goes_hour(SatelliteSector::Meso2, &t),
            "ABI-L1b-RadM/2025/034/04/"
        );
        assert_eq!(
            SourcePath::mrms_day("MergedReflectivityQComposite", &t),
            "2025/02/03/MergedReflectivityQComposite/"
        );
    }
}
