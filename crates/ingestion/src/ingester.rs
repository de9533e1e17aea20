//! Ingestion orchestrator.
//!
//! Drives one invocation through Locator, Decoder, Regridder, Encoder and
//! Publisher. Invocations share a bounded worker pool; CPU-heavy stages run
//! on the blocking thread pool.

use std::sync::Arc;

use atmos_common::{SensorKind, TimeTarget, TimestampKey};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::{json, Value};
use storage::{ObjectStorage, StoragePath};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, instrument, warn};

use crate::config::IngestionConfig;
use crate::decode::{
    decode_composite, decode_radar, decode_satellite, AbiOpener, DecodedObservation,
    Geolocation, NetCdfOpener,
};
use crate::encode::{ArtifactMetadata, EncodedArtifact, RasterEncoder};
use crate::error::{IngestionError, PipelineFailure, Result};
use crate::index::Frame;
use crate::locator::{SourceLocator, SourceReference};
use crate::pipeline::{PipelineRun, Stage};
use crate::publisher::Publisher;
use crate::regrid::{regrid, RasterArtifact, TargetGrid, NODATA};
use crate::request::SensorParams;

/// Frames returned by a frame listing when no limit is given.
pub const DEFAULT_FRAME_LIMIT: usize = 10;

/// Source of "now". Injected so locator windows are testable.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Keys written (or found) by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactKeys {
    pub cog_key: String,
    pub meta_key: String,
    pub index_key: String,
}

/// Result of a single ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionOutcome {
    #[serde(flatten)]
    pub params: SensorParams,
    /// `"latest"` or the requested time
    pub requested_time: String,
    pub ingested_time: String,
    pub timestamp_key: TimestampKey,
    pub artifact_keys: ArtifactKeys,
    pub tile_template: String,
    pub source_key: String,
    /// The newest volume was used because nothing matched the window
    pub fallback: bool,
    /// False when the artifacts already existed
    pub written: bool,
}

/// Result of a batch radar ingest.
#[derive(Debug, Clone, Serialize)]
pub struct FramesOutcome {
    pub site: String,
    pub lookback_minutes: i64,
    /// New frames present in the index after the merge
    pub added: usize,
    /// Candidates already indexed or older than every retained frame
    pub skipped: usize,
    /// Candidates whose processing failed
    pub failed: usize,
    pub total_frames: usize,
    pub index_key: String,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameListing {
    pub site: String,
    pub frames: Vec<Frame>,
}

/// Display subset of a radar sidecar plus the sidecar itself.
#[derive(Debug, Clone, Serialize)]
pub struct LegendResponse {
    pub legend: Value,
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineListing {
    pub layer: String,
    pub count: usize,
    pub entries: Vec<String>,
}

/// The ingestion orchestrator. Cheap to clone; clones share clients,
/// index locks and the worker pool.
#[derive(Clone)]
pub struct Ingester {
    config: Arc<IngestionConfig>,
    locator: SourceLocator,
    publisher: Publisher,
    encoder: RasterEncoder,
    opener: Arc<dyn AbiOpener>,
    workers: Arc<Semaphore>,
    clock: Clock,
}

impl Ingester {
    /// Build an orchestrator with anonymous source clients and the
    /// configured derived bucket.
    pub fn new(config: IngestionConfig) -> Result<Self> {
        config.validate()?;
        let radar_source = ObjectStorage::anonymous(&config.radar_source())
            .map_err(|e| IngestionError::Config(e.to_string()))?;
        let satellite_source = ObjectStorage::anonymous(&config.satellite_source())
            .map_err(|e| IngestionError::Config(e.to_string()))?;
        let composite_source = ObjectStorage::anonymous(&config.composite_source())
            .map_err(|e| IngestionError::Config(e.to_string()))?;
        let derived = ObjectStorage::new(&config.derived)
            .map_err(|e| IngestionError::Config(e.to_string()))?;
        Ok(Self::with_stores(
            config,
            radar_source,
            satellite_source,
            composite_source,
            derived,
        ))
    }

    /// Build an orchestrator over explicit clients.
    pub fn with_stores(
        config: IngestionConfig,
        radar_source: ObjectStorage,
        satellite_source: ObjectStorage,
        composite_source: ObjectStorage,
        derived: ObjectStorage,
    ) -> Self {
        let locator = SourceLocator::new(
            radar_source,
            satellite_source,
            composite_source,
            config.radar.default_minutes_lookback,
            config.satellite.latest_lookback_minutes,
        );
        let publisher = Publisher::new(
            derived,
            config.radar.max_frames,
            config.satellite.timeline_max,
        )
        .with_composite_timeline(
            config.composite.timeline_max,
            config.composite.cadence_minutes,
        );
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            config: Arc::new(config),
            locator,
            publisher,
            encoder: RasterEncoder::default(),
            opener: Arc::new(NetCdfOpener),
            workers,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the ABI file opener.
    pub fn with_abi_opener(mut self, opener: Arc<dyn AbiOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Replace the clock.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Ingest the observation closest to now.
    pub async fn ingest_latest(
        &self,
        params: SensorParams,
    ) -> std::result::Result<IngestionOutcome, PipelineFailure> {
        self.ingest(params, TimeTarget::Latest).await
    }

    /// Ingest the observation closest to `at`.
    pub async fn ingest_at(
        &self,
        params: SensorParams,
        at: DateTime<Utc>,
    ) -> std::result::Result<IngestionOutcome, PipelineFailure> {
        self.ingest(params, TimeTarget::At(at)).await
    }

    /// Run the full pipeline once. Nothing is published unless every stage
    /// succeeds.
    #[instrument(skip(self), fields(params = %params, target = %target.marker()))]
    pub async fn ingest(
        &self,
        params: SensorParams,
        target: TimeTarget,
    ) -> std::result::Result<IngestionOutcome, PipelineFailure> {
        let sensor = params.sensor();
        let mut run = PipelineRun::start(params);
        let _permit = self.acquire().await.map_err(|e| run.fail(e))?;

        let result = self.run_pipeline(&mut run, target).await;
        let elapsed_ms = run.elapsed_ms();
        match &result {
            Ok(outcome) => {
                record_run(sensor, "success", elapsed_ms);
                if outcome.written {
                    counter!("frames_published_total", "sensor" => sensor.as_str()).increment(1);
                }
                info!(
                    timestamp_key = %outcome.timestamp_key,
                    cog_key = %outcome.artifact_keys.cog_key,
                    fallback = outcome.fallback,
                    written = outcome.written,
                    elapsed_ms,
                    "Ingestion complete"
                );
            }
            Err(failure) => {
                record_run(sensor, "failure", elapsed_ms);
                error!(
                    stage = %failure.stage,
                    kind = failure.source.kind(),
                    error = %failure.source,
                    "Ingestion failed"
                );
            }
        }
        result
    }

    async fn run_pipeline(
        &self,
        run: &mut PipelineRun,
        target: TimeTarget,
    ) -> std::result::Result<IngestionOutcome, PipelineFailure> {
        let params = run.params().clone();

        run.enter(Stage::Locating);
        check_output_grid(&params).map_err(|e| run.fail(e))?;
        let now = (self.clock)();
        let source = self
            .locator
            .locate(&params, target, now)
            .await
            .map_err(|e| run.fail(e))?;
        if source.fallback {
            warn!(
                key = %source.object_key,
                observed_at = %source.observed_at,
                "Using fallback source object"
            );
        }

        let encoded = self.produce(run, &source).await?;

        run.enter(Stage::Publishing);
        let ts = source.timestamp_key();
        let receipt = self
            .publisher
            .publish(&params, &ts, encoded)
            .await
            .map_err(|e| run.fail(e))?;
        run.finish();

        Ok(IngestionOutcome {
            requested_time: target.marker(),
            ingested_time: source.observed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            timestamp_key: ts,
            artifact_keys: ArtifactKeys {
                cog_key: receipt.frame.cog_key,
                meta_key: receipt.frame.meta_key,
                index_key: receipt.index_key,
            },
            tile_template: receipt.frame.tile_template,
            source_key: source.object_key,
            fallback: source.fallback,
            written: receipt.written,
            params,
        })
    }

    /// Ingest up to `max_new` recent radar volumes missing from the site's
    /// frame index, oldest first. Volumes that a full index would evict on
    /// merge are skipped without being fetched. A failing volume is skipped;
    /// the index is written once at the end and only if something was added.
    #[instrument(skip(self))]
    pub async fn ingest_frames(
        &self,
        site: &str,
        max_new: usize,
        lookback_minutes: Option<i64>,
    ) -> Result<FramesOutcome> {
        let params = SensorParams::radar(Some(site), &self.config)?;
        let SensorParams::Radar { site } = &params else {
            return Err(IngestionError::InvalidRequest(
                "frame ingestion is radar only".to_string(),
            ));
        };
        let site = site.clone();
        let lookback = lookback_minutes.unwrap_or(self.config.radar.lookback_minutes);
        if lookback <= 0 {
            return Err(IngestionError::InvalidRequest(format!(
                "lookback_minutes must be positive, got {}",
                lookback
            )));
        }

        let max_frames = self.config.radar.max_frames;
        let now = (self.clock)();
        let existing = self
            .publisher
            .load_frame_index(&site)
            .await?
            .unwrap_or_default();
        let candidates = self
            .locator
            .recent_radar_volumes(&site, now, lookback, max_frames.saturating_mul(2))
            .await?;

        let (indexed, fresh): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| existing.contains(&c.timestamp_key()));
        let mut skipped = indexed.len();

        // Volumes the merge would evict immediately are never fetched
        let fresh_keys: Vec<TimestampKey> = fresh.iter().map(|c| c.timestamp_key()).collect();
        let floor = existing.retention_floor(&fresh_keys, max_frames);
        let (retained, stale): (Vec<_>, Vec<_>) = fresh
            .into_iter()
            .partition(|c| floor.as_ref().is_some_and(|f| c.timestamp_key() >= *f));
        if !stale.is_empty() {
            debug!(
                count = stale.len(),
                "Skipping volumes older than the retained frames"
            );
        }
        skipped += stale.len();

        let mut new_frames: Vec<Frame> = Vec::new();
        let mut failed = 0;
        for source in retained {
            if new_frames.len() >= max_new {
                break;
            }
            match self.ingest_volume(&source).await {
                Ok(frame) => new_frames.push(frame),
                Err(failure) => {
                    failed += 1;
                    warn!(
                        key = %source.object_key,
                        stage = %failure.stage,
                        error = %failure.source,
                        "Skipping radar volume"
                    );
                }
            }
        }

        let index = if new_frames.is_empty() {
            existing
        } else {
            self.publisher.append_frames(&site, &new_frames).await?
        };
        let added = new_frames
            .iter()
            .filter(|f| index.contains(&f.timestamp_key))
            .count();
        if added > 0 {
            counter!("frames_published_total", "sensor" => SensorKind::Radar.as_str())
                .increment(added as u64);
        }

        info!(
            site = %site,
            added,
            skipped,
            failed,
            total_frames = index.len(),
            "Frame ingestion complete"
        );

        Ok(FramesOutcome {
            index_key: params.index_key(),
            lookback_minutes: lookback,
            added,
            skipped,
            failed,
            total_frames: index.len(),
            frames: index.latest(max_frames).to_vec(),
            site,
        })
    }

    /// Process one located radar volume up to its artifact writes.
    async fn ingest_volume(
        &self,
        source: &SourceReference,
    ) -> std::result::Result<Frame, PipelineFailure> {
        let mut run = PipelineRun::start(source.params.clone());
        let _permit = self.acquire().await.map_err(|e| run.fail(e))?;
        run.enter(Stage::Locating);

        let result = async {
            let encoded = self.produce(&mut run, source).await?;
            run.enter(Stage::Publishing);
            let (frame, _) = self
                .publisher
                .put_artifacts(&source.params, &source.timestamp_key(), encoded)
                .await
                .map_err(|e| run.fail(e))?;
            run.finish();
            Ok::<_, PipelineFailure>(frame)
        }
        .await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        record_run(SensorKind::Radar, outcome, run.elapsed_ms());
        result
    }

    /// Download, decode, regrid and encode one source object.
    async fn produce(
        &self,
        run: &mut PipelineRun,
        source: &SourceReference,
    ) -> std::result::Result<EncodedArtifact, PipelineFailure> {
        run.enter(Stage::Decoding);
        let bytes = self.download(source).await.map_err(|e| run.fail(e))?;
        let observation = self
            .decode(&source.params, bytes)
            .await
            .map_err(|e| run.fail(e))?;

        run.enter(Stage::Regridding);
        let target = self
            .target_grid(&source.params, &observation)
            .map_err(|e| run.fail(e))?;
        let (observation, artifact) = blocking(move || {
            let artifact = regrid(&observation, &target, NODATA)?;
            Ok((observation, artifact))
        })
        .await
        .map_err(|e| run.fail(e))?;

        run.enter(Stage::Encoding);
        let metadata = self
            .metadata(source, &observation, &artifact)
            .map_err(|e| run.fail(e))?;
        let encoder = self.encoder.clone();
        blocking(move || encoder.encode(&artifact, metadata))
            .await
            .map_err(|e| run.fail(e))
    }

    async fn download(&self, source: &SourceReference) -> Result<Bytes> {
        let bytes = self
            .locator
            .source_for(source.sensor())
            .get(&source.object_key)
            .await
            .map_err(IngestionError::from_source)?;
        info!(key = %source.object_key, size = bytes.len(), "Downloaded source object");
        Ok(bytes)
    }

    async fn decode(&self, params: &SensorParams, bytes: Bytes) -> Result<DecodedObservation> {
        match *params {
            SensorParams::Radar { .. } => blocking(move || decode_radar(&bytes)).await,
            SensorParams::Satellite { band, .. } => {
                let opener = Arc::clone(&self.opener);
                blocking(move || {
                    let dataset = opener.open(&bytes)?;
                    decode_satellite(&*dataset, band)
                })
                .await
            }
            SensorParams::Composite { .. } => blocking(move || decode_composite(&bytes)).await,
        }
    }

    fn target_grid(
        &self,
        params: &SensorParams,
        observation: &DecodedObservation,
    ) -> Result<TargetGrid> {
        match (params, &observation.geolocation) {
            (SensorParams::Radar { .. }, Geolocation::Polar { site, .. }) => Ok(TargetGrid::radar(
                site,
                self.config.radar.grid_radius_km,
                self.config.radar.grid_res_km,
            )),
            (SensorParams::Satellite { sector, .. }, _) => TargetGrid::satellite(*sector),
            (SensorParams::Composite { .. }, _) => Ok(TargetGrid::composite()),
            (SensorParams::Radar { .. }, _) => Err(missing_polar_geometry()),
        }
    }

    fn metadata(
        &self,
        source: &SourceReference,
        observation: &DecodedObservation,
        artifact: &RasterArtifact,
    ) -> Result<ArtifactMetadata> {
        let mut metadata = match (&source.params, &observation.geolocation) {
            (SensorParams::Radar { site }, Geolocation::Polar { site: location, .. }) => {
                ArtifactMetadata::radar(
                    site,
                    location,
                    observation,
                    artifact,
                    source.observed_at,
                    &source.object_key,
                    self.config.radar.grid_radius_km,
                    self.config.radar.grid_res_km,
                )
            }
            (SensorParams::Radar { .. }, _) => return Err(missing_polar_geometry()),
            (SensorParams::Satellite { band, sector }, _) => ArtifactMetadata::satellite(
                *band,
                *sector,
                observation,
                artifact,
                source.observed_at,
                &source.object_key,
                self.config.satellite.temperature_style,
            ),
            (SensorParams::Composite { product }, _) => ArtifactMetadata::composite(
                *product,
                observation,
                artifact,
                source.observed_at,
                &source.object_key,
            ),
        };
        if source.fallback {
            metadata
                .caveats
                .push("No observation matched the requested time; newest available used".to_string());
        }
        Ok(metadata)
    }

    /// The newest `limit` frames of a site's index.
    pub async fn list_frames(&self, site: &str, limit: Option<usize>) -> Result<FrameListing> {
        let params = SensorParams::radar(Some(site), &self.config)?;
        let SensorParams::Radar { site } = params else {
            return Err(IngestionError::InvalidRequest(format!("invalid site {}", site)));
        };
        let index = self
            .publisher
            .load_frame_index(&site)
            .await?
            .ok_or_else(|| IngestionError::NotFound(format!("no frame index for {}", site)))?;
        let limit = limit.unwrap_or(DEFAULT_FRAME_LIMIT);
        Ok(FrameListing {
            frames: index.latest(limit).to_vec(),
            site,
        })
    }

    /// Legend fields of a published radar frame.
    pub async fn legend(&self, site: &str, timestamp_key: &str) -> Result<LegendResponse> {
        let params = SensorParams::radar(Some(site), &self.config)?;
        let ts = TimestampKey::parse(timestamp_key)?;
        let key = params.meta_key(&ts);
        let bytes = self
            .publisher
            .store()
            .get_opt(&key)
            .await
            .map_err(IngestionError::from_source)?
            .ok_or_else(|| IngestionError::NotFound(format!("no metadata at {}", key)))?;
        let raw: Value = serde_json::from_slice(&bytes)
            .map_err(|e| IngestionError::Decode(format!("unreadable metadata {}: {}", key, e)))?;

        let field = |name: &str| raw.get(name).cloned().unwrap_or(Value::Null);
        let grid = |name: &str| {
            raw.get("grid_info")
                .and_then(|g| g.get(name))
                .cloned()
                .unwrap_or(Value::Null)
        };
        let legend = json!({
            "product": field("product"),
            "units": field("units"),
            "rescale": field("rescale"),
            "palette": field("color_palette"),
            "timestamp": field("timestamp"),
            "site": field("site"),
            "extent_km": grid("extent_km"),
            "resolution_m": grid("resolution_m"),
        });
        Ok(LegendResponse { legend, raw })
    }

    /// Index documents under `indices/<layer>/`, relative to that prefix.
    pub async fn timeline(&self, layer: &str) -> Result<TimelineListing> {
        let layer = layer.trim_matches('/');
        if layer.is_empty() || layer.split('/').any(|s| s.is_empty() || s == "..") {
            return Err(IngestionError::InvalidRequest(format!(
                "invalid layer path '{}'",
                layer
            )));
        }
        let prefix = StoragePath::index_prefix(layer);
        let objects = self
            .publisher
            .store()
            .list(&prefix)
            .await
            .map_err(IngestionError::from_source)?;
        let mut entries: Vec<String> = objects
            .into_iter()
            .filter_map(|o| o.key.strip_prefix(&prefix).map(str::to_string))
            .filter(|name| !name.is_empty())
            .collect();
        entries.sort();
        Ok(TimelineListing {
            layer: layer.to_string(),
            count: entries.len(),
            entries,
        })
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.workers
            .acquire()
            .await
            .map_err(|_| IngestionError::Config("worker pool is closed".to_string()))
    }
}

/// Sectors without an output grid are rejected before anything is fetched.
fn check_output_grid(params: &SensorParams) -> Result<()> {
    match params {
        SensorParams::Satellite { sector, .. } => TargetGrid::satellite(*sector).map(|_| ()),
        SensorParams::Radar { .. } | SensorParams::Composite { .. } => Ok(()),
    }
}

fn missing_polar_geometry() -> IngestionError {
    IngestionError::Decode("radar observation carries no polar geometry".to_string())
}

/// Run CPU-bound work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| IngestionError::Decode(format!("worker task failed: {}", e)))?
}

fn record_run(sensor: SensorKind, outcome: &'static str, elapsed_ms: u64) {
    counter!("ingest_runs_total", "sensor" => sensor.as_str(), "outcome" => outcome).increment(1);
    histogram!("ingest_duration_ms", "sensor" => sensor.as_str()).record(elapsed_ms as f64);
}
