//! Publisher: writes artifacts to the derived bucket and maintains indices.
//!
//! Artifact writes are idempotent (existing keys are left alone) and always
//! land before the index that references them. Index updates are
//! read-modify-write under a per-key async lock.

use std::collections::HashMap;
use std::sync::Arc;

use atmos_common::TimestampKey;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use storage::{ObjectStorage, StoragePath};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::encode::EncodedArtifact;
use crate::error::{IngestionError, Result};
use crate::index::{
    Frame, FrameIndex, TimelineIndex, GOES_CADENCE_MINUTES, MRMS_CADENCE_MINUTES,
};
use crate::request::SensorParams;

pub const COG_CONTENT_TYPE: &str = "image/tiff";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// One async mutex per index key. Entries nobody holds or waits on are
/// pruned on the next acquire, so the map tracks live keys only.
#[derive(Debug, Default, Clone)]
pub struct IndexLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl IndexLocks {
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // The map's own reference is the only one left for idle keys
            locks.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Retention and advertised cadence of a family of timelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelinePolicy {
    pub max: usize,
    pub cadence_minutes: u32,
}

/// What a publish did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub frame: Frame,
    pub index_key: String,
    /// False when both artifacts already existed
    pub written: bool,
}

#[derive(Debug, Clone)]
pub struct Publisher {
    store: ObjectStorage,
    locks: IndexLocks,
    max_frames: usize,
    satellite_timeline: TimelinePolicy,
    composite_timeline: TimelinePolicy,
}

impl Publisher {
    pub fn new(store: ObjectStorage, max_frames: usize, timeline_max: usize) -> Self {
        Self {
            store,
            locks: IndexLocks::default(),
            max_frames,
            satellite_timeline: TimelinePolicy {
                max: timeline_max,
                cadence_minutes: GOES_CADENCE_MINUTES,
            },
            composite_timeline: TimelinePolicy {
                max: 12,
                cadence_minutes: MRMS_CADENCE_MINUTES,
            },
        }
    }

    /// Override retention and cadence of MRMS timelines.
    pub fn with_composite_timeline(mut self, max: usize, cadence_minutes: u32) -> Self {
        self.composite_timeline = TimelinePolicy {
            max,
            cadence_minutes,
        };
        self
    }

    pub fn store(&self) -> &ObjectStorage {
        &self.store
    }

    /// Write the COG and sidecar, then record the frame in the sensor's index.
    #[instrument(skip(self, encoded), fields(params = %params, ts = %ts))]
    pub async fn publish(
        &self,
        params: &SensorParams,
        ts: &TimestampKey,
        encoded: EncodedArtifact,
    ) -> Result<PublishReceipt> {
        let (frame, written) = self.put_artifacts(params, ts, encoded).await?;

        match params {
            SensorParams::Radar { site } => {
                self.append_frames(site, std::slice::from_ref(&frame)).await?;
            }
            SensorParams::Satellite { .. } | SensorParams::Composite { .. } => {
                self.update_timeline(params, ts).await?;
            }
        }

        Ok(PublishReceipt {
            frame,
            index_key: params.index_key(),
            written,
        })
    }

    /// Write the artifacts of one frame without touching any index.
    /// Returns the frame and whether anything was written.
    pub async fn put_artifacts(
        &self,
        params: &SensorParams,
        ts: &TimestampKey,
        encoded: EncodedArtifact,
    ) -> Result<(Frame, bool)> {
        let cog_key = params.cog_key(ts);
        let meta_key = params.meta_key(ts);

        let mut metadata = encoded.metadata;
        metadata.cog_key = Some(cog_key.clone());

        let wrote_cog = self
            .put_if_absent(&cog_key, encoded.cog, COG_CONTENT_TYPE)
            .await?;
        let wrote_meta = self
            .put_if_absent(&meta_key, metadata.to_json_bytes()?, JSON_CONTENT_TYPE)
            .await?;

        let frame = Frame {
            timestamp_key: ts.clone(),
            cog_key,
            meta_key,
            tile_template: params.tile_template(ts),
        };
        Ok((frame, wrote_cog || wrote_meta))
    }

    async fn put_if_absent(&self, key: &str, data: Bytes, content_type: &str) -> Result<bool> {
        if self
            .store
            .exists(key)
            .await
            .map_err(IngestionError::from_publish)?
        {
            debug!(key = %key, "Artifact already present, skipping write");
            return Ok(false);
        }
        let size = data.len();
        self.store
            .put(key, data, content_type)
            .await
            .map_err(IngestionError::from_publish)?;
        info!(key = %key, size, "Published artifact");
        Ok(true)
    }

    /// Merge `frames` into the site's frame index. The index is rewritten
    /// only when it changed.
    #[instrument(skip(self, frames), fields(count = frames.len()))]
    pub async fn append_frames(&self, site: &str, frames: &[Frame]) -> Result<FrameIndex> {
        let key = StoragePath::radar_frames(site);
        let _guard = self.locks.acquire(&key).await;

        let mut index: FrameIndex = self.load_json(&key).await?.unwrap_or_default();
        if index.merge(frames, self.max_frames) {
            self.write_json(&key, &index).await?;
            info!(key = %key, total = index.len(), "Updated frame index");
        }
        Ok(index)
    }

    /// Current frame index of `site`, `None` when none was published yet.
    pub async fn load_frame_index(&self, site: &str) -> Result<Option<FrameIndex>> {
        self.load_json(&StoragePath::radar_frames(site)).await
    }

    /// Add `ts` to the timeline of a GOES or MRMS layer.
    #[instrument(skip(self), fields(params = %params))]
    pub async fn update_timeline(
        &self,
        params: &SensorParams,
        ts: &TimestampKey,
    ) -> Result<TimelineIndex> {
        let policy = match params {
            SensorParams::Satellite { .. } => self.satellite_timeline,
            SensorParams::Composite { .. } => self.composite_timeline,
            SensorParams::Radar { .. } => {
                return Err(IngestionError::InvalidRequest(
                    "radar layers keep a frame index, not a timeline".to_string(),
                ))
            }
        };
        let key = params.index_key();
        let _guard = self.locks.acquire(&key).await;

        let mut timeline: TimelineIndex = self
            .load_json(&key)
            .await?
            .unwrap_or_else(|| TimelineIndex::with_cadence(policy.cadence_minutes));
        if timeline.insert(ts.clone(), policy.max) {
            self.write_json(&key, &timeline).await?;
            info!(key = %key, total = timeline.timestamps.len(), "Updated timeline");
        }
        Ok(timeline)
    }

    /// Read a JSON document. An unparseable document is an error so that it
    /// is never overwritten by a fresh index.
    async fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self
            .store
            .get_opt(key)
            .await
            .map_err(IngestionError::from_publish)?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            warn!(key = %key, error = %e, "Unreadable index document");
            IngestionError::Publish(format!("unreadable index document {}: {}", key, e))
        })
    }

    async fn write_json<T: Serialize>(&self, key: &str, doc: &T) -> Result<()> {
        let body = serde_json::to_vec_pretty(doc)
            .map_err(|e| IngestionError::Publish(format!("failed to serialize {}: {}", key, e)))?;
        self.store
            .put(key, Bytes::from(body), JSON_CONTENT_TYPE)
            .await
            .map_err(IngestionError::from_publish)
    }
}
