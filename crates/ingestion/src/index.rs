//! Frame and timeline indices.
//!
//! Radar frames are kept as a JSON array ordered oldest first. GOES and
//! MRMS layers keep a timeline of timestamp keys with the newest at the end.

use atmos_common::TimestampKey;
use serde::{Deserialize, Serialize};

/// Nominal GOES ABI cadence recorded in timelines.
pub const GOES_CADENCE_MINUTES: u32 = 10;
/// Nominal MRMS mosaic cadence recorded in timelines.
pub const MRMS_CADENCE_MINUTES: u32 = 5;

/// One published frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp_key: TimestampKey,
    pub cog_key: String,
    pub meta_key: String,
    pub tile_template: String,
}

/// Ordered frames of one radar site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameIndex {
    frames: Vec<Frame>,
}

impl FrameIndex {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, key: &TimestampKey) -> bool {
        self.frames.iter().any(|f| &f.timestamp_key == key)
    }

    /// Merge `incoming`, then sort, dedupe on timestamp and keep the newest
    /// `max_frames`. Returns whether the index changed.
    pub fn merge(&mut self, incoming: &[Frame], max_frames: usize) -> bool {
        let before = self.frames.clone();
        for frame in incoming {
            if !self.contains(&frame.timestamp_key) {
                self.frames.push(frame.clone());
            }
        }
        self.normalize(max_frames);
        self.frames != before
    }

    /// Sort ascending, drop duplicate timestamps (first occurrence wins) and
    /// evict the oldest beyond `max_frames`.
    pub fn normalize(&mut self, max_frames: usize) {
        self.frames
            .sort_by(|a, b| a.timestamp_key.cmp(&b.timestamp_key));
        self.frames
            .dedup_by(|later, earlier| later.timestamp_key == earlier.timestamp_key);
        if self.frames.len() > max_frames {
            let excess = self.frames.len() - max_frames;
            self.frames.drain(..excess);
        }
    }

    /// Oldest timestamp that would still be kept after merging `incoming`
    /// under `max_frames`. Anything older is evicted by the merge itself.
    pub fn retention_floor(
        &self,
        incoming: &[TimestampKey],
        max_frames: usize,
    ) -> Option<TimestampKey> {
        let mut keys: Vec<&TimestampKey> = self
            .frames
            .iter()
            .map(|f| &f.timestamp_key)
            .chain(incoming)
            .collect();
        keys.sort_unstable();
        keys.dedup();
        let start = keys.len().saturating_sub(max_frames);
        keys.get(start).map(|k| (*k).clone())
    }

    /// The newest `n` frames, still oldest first.
    pub fn latest(&self, n: usize) -> &[Frame] {
        let start = self.frames.len().saturating_sub(n);
        &self.frames[start..]
    }
}

/// Timeline of one GOES layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineIndex {
    pub timestamps: Vec<TimestampKey>,
    pub latest: Option<TimestampKey>,
    pub cadence_minutes: u32,
}

impl Default for TimelineIndex {
    fn default() -> Self {
        Self {
            timestamps: Vec::new(),
            latest: None,
            cadence_minutes: GOES_CADENCE_MINUTES,
        }
    }
}

impl TimelineIndex {
    /// An empty timeline advertising `cadence_minutes`.
    pub fn with_cadence(cadence_minutes: u32) -> Self {
        Self {
            cadence_minutes,
            ..Self::default()
        }
    }

    /// Add `key`, keep the newest `max` entries in ascending order.
    /// Returns whether the timeline changed.
    pub fn insert(&mut self, key: TimestampKey, max: usize) -> bool {
        let before = self.clone();
        if !self.timestamps.contains(&key) {
            self.timestamps.push(key);
        }
        // Older writers stored newest first; sorting absorbs either order.
        self.timestamps.sort();
        self.timestamps.dedup();
        if self.timestamps.len() > max {
            let excess = self.timestamps.len() - max;
            self.timestamps.drain(..excess);
        }
        self.latest = self.timestamps.last().cloned();
        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> TimestampKey {
        TimestampKey::parse(s).unwrap()
    }

    fn frame(ts: &str) -> Frame {
        Frame {
            timestamp_key: key(ts),
            cog_key: format!("nexrad/KTLX/{}/tilt0_reflectivity.tif", ts),
            meta_key: format!("nexrad/KTLX/{}/tilt0_reflectivity.json", ts),
            tile_template: format!("/tiles/nexrad/KTLX/{}/{{z}}/{{x}}/{{y}}.png", ts),
        }
    }

    #[test]
    fn test_merge_sorts_and_dedupes() {
        let mut index = FrameIndex::default();
        let changed = index.merge(
            &[
                frame("20250101T001000Z"),
                frame("20250101T000000Z"),
                frame("20250101T001000Z"),
            ],
            10,
        );
        assert!(changed);
        let keys: Vec<_> = index.frames().iter().map(|f| f.timestamp_key.as_str()).collect();
        assert_eq!(keys, vec!["20250101T000000Z", "20250101T001000Z"]);

        assert!(!index.merge(&[frame("20250101T000000Z")], 10));
    }

    #[test]
    fn test_merge_evicts_oldest() {
        let mut index = FrameIndex::default();
        let frames: Vec<_> = (0..5)
            .map(|m| frame(&format!("20250101T00{:02}00Z", m * 10)))
            .collect();
        index.merge(&frames, 3);
        assert_eq!(index.len(), 3);
        assert_eq!(index.frames()[0].timestamp_key.as_str(), "20250101T002000Z");
        assert_eq!(index.latest(1)[0].timestamp_key.as_str(), "20250101T004000Z");
        assert_eq!(index.latest(10).len(), 3);
    }

    #[test]
    fn test_retention_floor_when_full() {
        let mut index = FrameIndex::default();
        index.merge(
            &[
                frame("20250101T002000Z"),
                frame("20250101T003000Z"),
                frame("20250101T004000Z"),
            ],
            3,
        );

        // Older candidates would be evicted straight away
        let older = [key("20250101T000000Z"), key("20250101T001000Z")];
        assert_eq!(
            index.retention_floor(&older, 3).unwrap().as_str(),
            "20250101T002000Z"
        );

        let newer = [key("20250101T001000Z"), key("20250101T005000Z")];
        assert_eq!(
            index.retention_floor(&newer, 3).unwrap().as_str(),
            "20250101T003000Z"
        );

        assert_eq!(
            FrameIndex::default()
                .retention_floor(&older, 10)
                .unwrap()
                .as_str(),
            "20250101T000000Z"
        );
        assert!(FrameIndex::default().retention_floor(&[], 3).is_none());
    }

    #[test]
    fn test_frame_index_is_a_json_array() {
        let index = FrameIndex::new(vec![frame("20250101T000000Z")]);
        let value = serde_json::to_value(&index).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["timestamp_key"], "20250101T000000Z");
        let back: FrameIndex = serde_json::from_value(value).unwrap();
        assert_eq!(back, index);
    }

    #[test]
    fn test_timeline_caps_and_tracks_latest() {
        let mut timeline = TimelineIndex::default();
        for m in 0..5 {
            timeline.insert(key(&format!("20250101T00{:02}00Z", m * 10)), 3);
        }
        assert_eq!(timeline.timestamps.len(), 3);
        assert_eq!(timeline.timestamps[0].as_str(), "20250101T002000Z");
        assert_eq!(timeline.latest.as_ref().unwrap().as_str(), "20250101T004000Z");
        assert_eq!(timeline.cadence_minutes, 10);

        assert!(!timeline.insert(key("20250101T004000Z"), 3));
    }

    #[test]
    fn test_timeline_accepts_newest_first_documents() {
        let raw = r#"{"timestamps":["20250101T002000Z","20250101T001000Z"],"latest":"20250101T002000Z","cadence_minutes":10}"#;
        let mut timeline: TimelineIndex = serde_json::from_str(raw).unwrap();
        timeline.insert(key("20250101T003000Z"), 12);
        let keys: Vec<_> = timeline.timestamps.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["20250101T001000Z", "20250101T002000Z", "20250101T003000Z"]
        );
    }
}
