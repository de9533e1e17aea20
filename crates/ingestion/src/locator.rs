//! Source Locator: finds the archive object that best matches a request.
//!
//! Every archive encodes the observation time in the object name, so all
//! matching is done on names; `last_modified` is only used by the radar
//! fallback.

use std::collections::HashMap;

use atmos_common::{CompositeProduct, SatelliteSector, SensorKind, TimeTarget, TimestampKey};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use storage::{ObjectInfo, ObjectStorage, SourcePath};
use tracing::{debug, instrument, warn};

use crate::error::{IngestionError, Result};
use crate::request::SensorParams;

/// GOES "latest" searches step back this far each time.
pub const GOES_SEARCH_STEP_MINUTES: i64 = 10;
/// Hour-prefix offsets searched around an "at time" target.
const GOES_AT_TIME_OFFSETS: [i64; 3] = [-30, 0, 30];
/// A GOES file must start strictly within this distance of the target.
const GOES_AT_TIME_MAX_DIFF_MINUTES: i64 = 60;
/// Half-width of the radar "at time" window.
pub const RADAR_AT_TIME_WINDOW_MINUTES: i64 = 30;
/// MRMS "latest" searches step back this far each time.
pub const MRMS_SEARCH_STEP_MINUTES: i64 = 2;
/// MRMS "latest" gives up after searching this far back.
const MRMS_LATEST_HORIZON_MINUTES: i64 = 30;
/// A mosaic matches a "latest" step within this distance (inclusive).
const MRMS_MATCH_WINDOW_MINUTES: i64 = 10;
/// A mosaic must be strictly within this distance of an "at time" target.
const MRMS_AT_TIME_MAX_DIFF_MINUTES: i64 = 60;

type Listing = HashMap<String, Vec<(String, DateTime<Utc>)>>;

/// One resolved source archive object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    pub params: SensorParams,
    pub object_key: String,
    /// Observation time decoded from the object name
    pub observed_at: DateTime<Utc>,
    /// True when no object matched the window and the newest object was used instead
    pub fallback: bool,
}

impl SourceReference {
    pub fn sensor(&self) -> SensorKind {
        self.params.sensor()
    }

    pub fn timestamp_key(&self) -> TimestampKey {
        TimestampKey::from_datetime(&self.observed_at)
    }

    /// Final path component of the object key.
    pub fn file_name(&self) -> &str {
        file_name(&self.object_key)
    }
}

/// Finds source objects in the public archives.
#[derive(Debug, Clone)]
pub struct SourceLocator {
    radar_source: ObjectStorage,
    satellite_source: ObjectStorage,
    composite_source: ObjectStorage,
    /// Radar "latest" window (minutes)
    radar_lookback_minutes: i64,
    /// GOES "latest" search horizon (minutes)
    goes_lookback_minutes: i64,
}

impl SourceLocator {
    pub fn new(
        radar_source: ObjectStorage,
        satellite_source: ObjectStorage,
        composite_source: ObjectStorage,
        radar_lookback_minutes: i64,
        goes_lookback_minutes: i64,
    ) -> Self {
        Self {
            radar_source,
            satellite_source,
            composite_source,
            radar_lookback_minutes,
            goes_lookback_minutes,
        }
    }

    /// Archive holding objects for `sensor`.
    pub fn source_for(&self, sensor: SensorKind) -> &ObjectStorage {
        match sensor {
            SensorKind::Radar => &self.radar_source,
            SensorKind::Satellite => &self.satellite_source,
            SensorKind::Composite => &self.composite_source,
        }
    }

    /// Resolve `params` and `target` to one archive object.
    pub async fn locate(
        &self,
        params: &SensorParams,
        target: TimeTarget,
        now: DateTime<Utc>,
    ) -> Result<SourceReference> {
        match params {
            SensorParams::Radar { site } => self.locate_radar(site, target, now).await,
            SensorParams::Satellite { band, sector } => {
                self.locate_goes(*band, *sector, target, now).await
            }
            SensorParams::Composite { product } => {
                self.locate_mrms(*product, target, now).await
            }
        }
    }

    /// Radar: the volume closest to the anchor time within the window, else
    /// the most recently modified volume under the day prefixes (flagged).
    #[instrument(skip(self), fields(target = %target.marker()))]
    async fn locate_radar(
        &self,
        site: &str,
        target: TimeTarget,
        now: DateTime<Utc>,
    ) -> Result<SourceReference> {
        let (anchor, start, end) = match target {
            TimeTarget::Latest => (now, now - Duration::minutes(self.radar_lookback_minutes), now),
            TimeTarget::At(t) => (
                t,
                t - Duration::minutes(RADAR_AT_TIME_WINDOW_MINUTES),
                t + Duration::minutes(RADAR_AT_TIME_WINDOW_MINUTES),
            ),
        };

        let candidates = self.radar_volumes(site, start, end).await?;
        let params = SensorParams::Radar {
            site: site.to_string(),
        };

        let best = candidates
            .iter()
            .filter(|c| c.observed_at >= start && c.observed_at <= end)
            .min_by_key(|c| (c.observed_at - anchor).num_milliseconds().abs());

        if let Some(best) = best {
            debug!(key = %best.key, "Matched radar volume");
            return Ok(SourceReference {
                params,
                object_key: best.key.clone(),
                observed_at: best.observed_at,
                fallback: false,
            });
        }

        match candidates.iter().max_by_key(|c| (c.last_modified, c.observed_at)) {
            Some(newest) => {
                warn!(
                    key = %newest.key,
                    lag_minutes = (anchor - newest.observed_at).num_minutes(),
                    "No radar volume inside the window; falling back to newest object"
                );
                Ok(SourceReference {
                    params,
                    object_key: newest.key.clone(),
                    observed_at: newest.observed_at,
                    fallback: true,
                })
            }
            None => Err(IngestionError::NotFound(format!(
                "no NEXRAD volumes for {} near {}",
                site,
                target.marker()
            ))),
        }
    }

    /// Volumes for `site` under every day prefix touched by `[start, end]`,
    /// ascending by observation time. Unparsable and `_MDM` names are skipped.
    pub async fn radar_volumes(
        &self,
        site: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RadarVolume>> {
        let mut volumes = Vec::new();
        for day in day_span(start, end) {
            let prefix = SourcePath::nexrad_day(site, &day);
            let listed = self
                .radar_source
                .list(&prefix)
                .await
                .map_err(IngestionError::from_source)?;
            debug!(prefix = %prefix, objects = listed.len(), "Listed radar prefix");
            volumes.extend(listed.into_iter().filter_map(|o| RadarVolume::from_object(site, o)));
        }
        volumes.sort_by(|a, b| a.observed_at.cmp(&b.observed_at).then(a.key.cmp(&b.key)));
        volumes.dedup_by(|a, b| a.key == b.key);
        Ok(volumes)
    }

    /// Up to `cap` most recent volumes observed within `lookback_minutes`
    /// of `now`, returned oldest first.
    pub async fn recent_radar_volumes(
        &self,
        site: &str,
        now: DateTime<Utc>,
        lookback_minutes: i64,
        cap: usize,
    ) -> Result<Vec<SourceReference>> {
        let cutoff = now - Duration::minutes(lookback_minutes);
        let volumes = self.radar_volumes(site, cutoff, now).await?;

        let mut recent: Vec<SourceReference> = volumes
            .into_iter()
            .rev()
            .filter(|v| v.observed_at >= cutoff && v.observed_at <= now)
            .take(cap)
            .map(|v| SourceReference {
                params: SensorParams::Radar {
                    site: site.to_string(),
                },
                object_key: v.key,
                observed_at: v.observed_at,
                fallback: false,
            })
            .collect();
        recent.reverse();
        Ok(recent)
    }

    /// GOES: "latest" walks back in fixed steps and stops at the first hour
    /// prefix holding a match; "at time" searches the surrounding hours.
    #[instrument(skip(self), fields(target = %target.marker()))]
    async fn locate_goes(
        &self,
        band: u8,
        sector: SatelliteSector,
        target: TimeTarget,
        now: DateTime<Utc>,
    ) -> Result<SourceReference> {
        let mut listings = Listing::new();
        let params = SensorParams::Satellite { band, sector };

        let found = match target {
            TimeTarget::Latest => {
                let mut found = None;
                let mut minutes_back = 0;
                while minutes_back < self.goes_lookback_minutes.max(1) {
                    let anchor = now - Duration::minutes(minutes_back);
                    let candidates = self.goes_hour(&mut listings, band, sector, anchor).await?;
                    if let Some(best) = closest(candidates, anchor, None) {
                        found = Some(best);
                        break;
                    }
                    minutes_back += GOES_SEARCH_STEP_MINUTES;
                }
                found
            }
            TimeTarget::At(t) => {
                let mut all = Vec::new();
                for offset in GOES_AT_TIME_OFFSETS {
                    let anchor = t + Duration::minutes(offset);
                    all.extend(self.goes_hour(&mut listings, band, sector, anchor).await?);
                }
                closest(all, t, Some(Duration::minutes(GOES_AT_TIME_MAX_DIFF_MINUTES)))
            }
        };

        match found {
            Some((object_key, observed_at)) => {
                debug!(key = %object_key, "Matched ABI file");
                Ok(SourceReference {
                    params,
                    object_key,
                    observed_at,
                    fallback: false,
                })
            }
            None => Err(IngestionError::NotFound(format!(
                "no GOES ABI file for band {} sector {} near {}",
                band,
                sector,
                target.marker()
            ))),
        }
    }

    /// Matching files under the hour prefix containing `anchor`. Listings are
    /// cached per call so repeated steps into one hour list it once.
    async fn goes_hour(
        &self,
        listings: &mut Listing,
        band: u8,
        sector: SatelliteSector,
        anchor: DateTime<Utc>,
    ) -> Result<Vec<(String, DateTime<Utc>)>> {
        let prefix = SourcePath::goes_hour(sector, &anchor);
        if let Some(cached) = listings.get(&prefix) {
            return Ok(cached.clone());
        }

        let listed = self
            .satellite_source
            .list(&prefix)
            .await
            .map_err(IngestionError::from_source)?;
        let matches: Vec<_> = listed
            .into_iter()
            .filter_map(|o| {
                let name = file_name(&o.key);
                if !matches_goes_product(name, band, sector) {
                    return None;
                }
                parse_goes_start_time(name).map(|t| (o.key.clone(), t))
            })
            .collect();
        debug!(prefix = %prefix, matches = matches.len(), "Listed ABI prefix");
        listings.insert(prefix, matches.clone());
        Ok(matches)
    }
}

impl SourceLocator {
    /// MRMS: "latest" walks back in 2-minute steps and takes the first
    /// directory with a mosaic near the anchor; "at time" takes the first
    /// directory with a mosaic within the hour.
    #[instrument(skip(self), fields(target = %target.marker()))]
    async fn locate_mrms(
        &self,
        product: CompositeProduct,
        target: TimeTarget,
        now: DateTime<Utc>,
    ) -> Result<SourceReference> {
        let mut listings = Listing::new();

        let found = match target {
            TimeTarget::Latest => {
                let window = Duration::minutes(MRMS_MATCH_WINDOW_MINUTES);
                let mut found = None;
                'search: for minutes_back in (0..MRMS_LATEST_HORIZON_MINUTES)
                    .step_by(MRMS_SEARCH_STEP_MINUTES as usize)
                {
                    let anchor = now - Duration::minutes(minutes_back);
                    for directory in product.source_names() {
                        let candidates = self
                            .mrms_directory(&mut listings, directory, anchor, anchor)
                            .await?
                            .into_iter()
                            .filter(|(_, t)| (*t - anchor).abs() <= window)
                            .collect();
                        if let Some(best) = closest(candidates, anchor, None) {
                            found = Some(best);
                            break 'search;
                        }
                    }
                }
                found
            }
            TimeTarget::At(t) => {
                let max = Duration::minutes(MRMS_AT_TIME_MAX_DIFF_MINUTES);
                let mut found = None;
                for directory in product.source_names() {
                    let candidates = self
                        .mrms_directory(&mut listings, directory, t - max, t + max)
                        .await?;
                    if let Some(best) = closest(candidates, t, Some(max)) {
                        found = Some(best);
                        break;
                    }
                }
                found
            }
        };

        match found {
            Some((object_key, observed_at)) => {
                debug!(key = %object_key, "Matched MRMS mosaic");
                Ok(SourceReference {
                    params: SensorParams::Composite { product },
                    object_key,
                    observed_at,
                    fallback: false,
                })
            }
            None => Err(IngestionError::NotFound(format!(
                "no MRMS {} mosaic near {}",
                product,
                target.marker()
            ))),
        }
    }

    /// Timestamped mosaics in `directory` under every day prefix touched by
    /// `[start, end]`, cached per prefix for the duration of one lookup.
    async fn mrms_directory(
        &self,
        listings: &mut Listing,
        directory: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(String, DateTime<Utc>)>> {
        let mut all = Vec::new();
        for day in day_span(start, end) {
            let prefix = SourcePath::mrms_day(directory, &day);
            if let Some(cached) = listings.get(&prefix) {
                all.extend(cached.iter().cloned());
                continue;
            }

            let listed = self
                .composite_source
                .list(&prefix)
                .await
                .map_err(IngestionError::from_source)?;
            let matches: Vec<_> = listed
                .into_iter()
                .filter_map(|o| parse_mrms_time(file_name(&o.key)).map(|t| (o.key, t)))
                .collect();
            debug!(prefix = %prefix, matches = matches.len(), "Listed MRMS prefix");
            all.extend(matches.iter().cloned());
            listings.insert(prefix, matches);
        }
        Ok(all)
    }
}

/// A parsed Level II volume listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarVolume {
    pub key: String,
    pub observed_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl RadarVolume {
    fn from_object(site: &str, object: ObjectInfo) -> Option<Self> {
        let observed_at = parse_radar_time(file_name(&object.key), site)?;
        Some(Self {
            key: object.key,
            observed_at,
            last_modified: object.last_modified,
        })
    }
}

/// Candidate with the smallest |time - anchor|, optionally strictly within `max`.
fn closest(
    candidates: Vec<(String, DateTime<Utc>)>,
    anchor: DateTime<Utc>,
    max: Option<Duration>,
) -> Option<(String, DateTime<Utc>)> {
    candidates
        .into_iter()
        .map(|(key, t)| {
            let diff = (t - anchor).abs();
            (diff, key, t)
        })
        .filter(|(diff, _, _)| max.map_or(true, |m| *diff < m))
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, key, t)| (key, t))
}

/// Midnight of every UTC day from `start` to `end` inclusive.
fn day_span(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let (start, end) = if start <= end { (start, end) } else { (end, start) };
    let mut days = Vec::new();
    let mut day = start.date_naive();
    while day <= end.date_naive() {
        days.push(day.and_time(chrono::NaiveTime::MIN).and_utc());
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    days
}

pub(crate) fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// True for L1b radiance files of `band` in `sector`:
/// `..._ABI-L1b-<token>-M<mode>C<BB>_...nc`.
pub fn matches_goes_product(filename: &str, band: u8, sector: SatelliteSector) -> bool {
    if !filename.ends_with(".nc") {
        return false;
    }
    let marker = format!("ABI-L1b-{}-M", sector.filename_token());
    let Some(pos) = filename.find(&marker) else {
        return false;
    };
    let rest = &filename[pos + marker.len()..];
    let mode_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if mode_len == 0 {
        return false;
    }
    let band_token = format!("C{:02}", band);
    rest[mode_len..].starts_with(&band_token)
        && !rest[mode_len + band_token.len()..].starts_with(|c: char| c.is_ascii_digit())
}

/// Start time from the `sYYYYDDDHHMMSSt` token of an ABI filename.
pub fn parse_goes_start_time(filename: &str) -> Option<DateTime<Utc>> {
    let stem = filename.strip_suffix(".nc").unwrap_or(filename);
    let token = stem.split('_').find_map(|part| {
        let digits = part.strip_prefix('s')?;
        (digits.len() == 14 && digits.chars().all(|c| c.is_ascii_digit())).then_some(digits)
    })?;

    let year: i32 = token[0..4].parse().ok()?;
    let day_of_year: u32 = token[4..7].parse().ok()?;
    let hour: u32 = token[7..9].parse().ok()?;
    let minute: u32 = token[9..11].parse().ok()?;
    let second: u32 = token[11..13].parse().ok()?;

    let date = NaiveDate::from_yo_opt(year, day_of_year)?;
    Some(date.and_hms_opt(hour, minute, second)?.and_utc())
}

/// Mosaic time from the `YYYYMMDD-HHMMSS` token of an MRMS filename,
/// e.g. `MergedReflectivityQComposite_00.50_20250101-115638.grib2.gz`.
pub fn parse_mrms_time(filename: &str) -> Option<DateTime<Utc>> {
    filename.split('_').find_map(|part| {
        let token = part.split('.').next()?;
        if token.len() != 15 || !token.contains('-') {
            return None;
        }
        NaiveDateTime::parse_from_str(token, "%Y%m%d-%H%M%S")
            .ok()
            .map(|ndt| ndt.and_utc())
    })
}

/// Volume time from `SITEYYYYMMDD_HHMMSS_V06` (also `SITE_YYYYMMDD_...`).
/// `_MDM` metadata files yield `None`.
pub fn parse_radar_time(filename: &str, site: &str) -> Option<DateTime<Utc>> {
    if filename.contains("_MDM") {
        return None;
    }
    let rest = filename.strip_prefix(site)?;
    let rest = rest.strip_prefix('_').unwrap_or(rest);
    let stamp = rest.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S")
        .ok()
        .map(|ndt| ndt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 28, h, m, s).unwrap()
    }

    #[test]
    fn test_parse_goes_start_time() {
        let name = "OR_ABI-L1b-RadC-M6C13_G16_s20241801200203_e20241801209511_c20241801209553.nc";
        assert_eq!(parse_goes_start_time(name), Some(t(12, 0, 20)));
        assert_eq!(parse_goes_start_time("OR_ABI-L1b-RadC-M6C13_G16_sXXXX.nc"), None);
        // Day 367 does not exist
        assert_eq!(
            parse_goes_start_time("OR_ABI-L1b-RadC-M6C13_G16_s20243671200203_e1.nc"),
            None
        );
    }

    #[test]
    fn test_matches_goes_product() {
        let name = "OR_ABI-L1b-RadC-M6C13_G16_s20241801200203_e20241801209511_c20241801209553.nc";
        assert!(matches_goes_product(name, 13, SatelliteSector::Conus));
        assert!(!matches_goes_product(name, 1, SatelliteSector::Conus));
        assert!(!matches_goes_product(name, 13, SatelliteSector::FullDisk));
        assert!(matches_goes_product(
            "OR_ABI-L1b-RadM2-M3C02_G16_s20241801200203_e1_c1.nc",
            2,
            SatelliteSector::Meso2
        ));
        assert!(!matches_goes_product(
            "OR_ABI-L1b-RadC-M6C13_G16_s20241801200203.nc.tmp",
            13,
            SatelliteSector::Conus
        ));
    }

    #[test]
    fn test_parse_radar_time() {
        let expected = Some(Utc.with_ymd_and_hms(2025, 1, 1, 1, 2, 3).unwrap());
        assert_eq!(parse_radar_time("KTLX20250101_010203_V06", "KTLX"), expected);
        assert_eq!(parse_radar_time("KTLX_20250101_010203_V06", "KTLX"), expected);
        assert_eq!(parse_radar_time("KTLX20250101_010203_V06.gz", "KTLX"), expected);
        assert_eq!(parse_radar_time("KTLX20250101_010203_V06_MDM", "KTLX"), None);
        assert_eq!(parse_radar_time("KTLXgarbage", "KTLX"), None);
        assert_eq!(parse_radar_time("KFWS20250101_010203_V06", "KTLX"), None);
    }

    #[test]
    fn test_parse_mrms_time() {
        let expected = Some(Utc.with_ymd_and_hms(2025, 1, 1, 11, 56, 38).unwrap());
        assert_eq!(
            parse_mrms_time("MergedReflectivityQComposite_00.50_20250101-115638.grib2.gz"),
            expected
        );
        assert_eq!(
            parse_mrms_time("MRMS_MergedReflectivityQC_00.50_20250101-115638.grib2"),
            expected
        );
        assert_eq!(parse_mrms_time("MergedReflectivityQComposite_00.50_latest.grib2.gz"), None);
        assert_eq!(parse_mrms_time("Composite_20251301-115638.grib2.gz"), None);
    }

    #[test]
    fn test_closest_prefers_smaller_difference() {
        let anchor = t(12, 0, 0);
        let candidates = vec![
            ("early".to_string(), t(11, 40, 0)),
            ("late".to_string(), t(12, 5, 0)),
        ];
        assert_eq!(closest(candidates.clone(), anchor, None).unwrap().0, "late");
        assert!(closest(candidates, anchor, Some(Duration::minutes(5))).is_none());
    }

    #[test]
    fn test_day_span_crosses_midnight() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 23, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 2, 0, 10, 0).unwrap();
        let days = day_span(start, end);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0], Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(day_span(end, end).len(), 1);
    }
}
