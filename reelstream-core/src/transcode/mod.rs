mod engine;
mod error;
mod job;
mod types;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use hex::encode as hex_encode;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::MovieCatalog;
use crate::config::MAX_ENCODE_WORKERS;
use crate::layout::{is_safe_segment, MediaLayout};
use crate::quality::{QualityProfile, QualityProfileCatalog};
use crate::variants::{
    CompletedArtifact, EncodingStatus, JobVariants, SqliteVariantStore, VariantKey, VideoVariant,
};

pub use engine::{parse_progress_line, CodecEngine, FfmpegEngine, ProgressSink, SourceMetadata};
pub use error::{EngineError, EngineResult, TranscodeError, TranscodeResult};
pub use job::JobHandle;
pub use types::{
    JobSnapshot, JobStatus, QualityOutcome, QualityProgress, TranscodeReport, TranscodeRequest,
};

pub const DEFAULT_ENCODE_WORKERS: usize = 2;

const CHECKSUM_CHUNK: usize = 64 * 1024;

/// Fans a source out to one encode per quality profile and records every
/// outcome in the variant registry.
#[derive(Clone)]
pub struct TranscodeCoordinator {
    variants: SqliteVariantStore,
    catalog: Arc<dyn MovieCatalog>,
    engine: Arc<dyn CodecEngine>,
    profiles: Arc<QualityProfileCatalog>,
    layout: MediaLayout,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl TranscodeCoordinator {
    pub fn new(
        variants: SqliteVariantStore,
        catalog: Arc<dyn MovieCatalog>,
        engine: Arc<dyn CodecEngine>,
        profiles: QualityProfileCatalog,
        layout: MediaLayout,
    ) -> Self {
        Self {
            variants,
            catalog,
            engine,
            profiles: Arc::new(profiles),
            layout,
            permits: Arc::new(Semaphore::new(DEFAULT_ENCODE_WORKERS)),
            max_concurrent: DEFAULT_ENCODE_WORKERS,
        }
    }

    /// Replaces the encode pool. The pool is shared by every job started
    /// from this coordinator and its clones.
    pub fn with_max_concurrent(mut self, workers: usize) -> Self {
        let workers = workers.clamp(1, MAX_ENCODE_WORKERS);
        self.permits = Arc::new(Semaphore::new(workers));
        self.max_concurrent = workers;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn profiles(&self) -> &QualityProfileCatalog {
        &self.profiles
    }

    pub fn layout(&self) -> &MediaLayout {
        &self.layout
    }

    pub fn variants(&self) -> &SqliteVariantStore {
        &self.variants
    }

    /// Spawns the job on the current runtime and returns immediately.
    pub fn start(&self, request: TranscodeRequest) -> JobHandle {
        let job_id = Uuid::new_v4().simple().to_string();
        let movie_id = request.movie_id.clone();
        let cancel = CancellationToken::new();
        let (sender, receiver) = watch::channel(JobSnapshot::new(&job_id, &movie_id));
        let task = tokio::spawn({
            let coordinator = self.clone();
            let job_id = job_id.clone();
            let cancel = cancel.clone();
            async move {
                coordinator
                    .execute(job_id, request, cancel, Arc::new(sender))
                    .await
            }
        });
        JobHandle::new(job_id, movie_id, cancel, receiver, task)
    }

    pub async fn run(&self, request: TranscodeRequest) -> TranscodeResult<TranscodeReport> {
        self.start(request).wait().await
    }

    /// Runs the job inline under a caller-owned token.
    pub async fn run_with_cancel(
        &self,
        request: TranscodeRequest,
        cancel: CancellationToken,
    ) -> TranscodeResult<TranscodeReport> {
        let job_id = Uuid::new_v4().simple().to_string();
        let (sender, _receiver) = watch::channel(JobSnapshot::new(&job_id, &request.movie_id));
        self.execute(job_id, request, cancel, Arc::new(sender)).await
    }

    /// Deletes every variant row and artifact of a movie and clears its
    /// cached quality list. Returns the number of rows removed.
    pub async fn purge_movie(&self, movie_id: &str) -> TranscodeResult<usize> {
        if !is_safe_segment(movie_id) {
            return Err(TranscodeError::InvalidMovieId(movie_id.to_string()));
        }
        let removed = self.variants.delete_by_movie(movie_id)?;
        let dir = self.layout.movie_dir(movie_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(TranscodeError::Io { source, path: dir }),
        }
        if let Err(err) = self.catalog.set_available_qualities(movie_id, &[]) {
            warn!(movie_id = %movie_id, error = %err, "failed to clear available qualities");
        }
        info!(movie_id = %movie_id, removed, "movie variants purged");
        Ok(removed)
    }

    /// Call once at startup, before any job is started.
    pub fn recover_interrupted(&self) -> TranscodeResult<Vec<VariantKey>> {
        let keys = self.variants.reconcile_interrupted()?;
        for key in &keys {
            warn!(movie_id = %key.movie_id, quality = %key.quality, "interrupted variant marked failed");
        }
        Ok(keys)
    }

    async fn execute(
        &self,
        job_id: String,
        request: TranscodeRequest,
        cancel: CancellationToken,
        snapshot: Arc<watch::Sender<JobSnapshot>>,
    ) -> TranscodeResult<TranscodeReport> {
        let clock = Instant::now();
        let started_at = Utc::now();
        let movie_id = request.movie_id.clone();
        if !is_safe_segment(&movie_id) {
            return Err(TranscodeError::InvalidMovieId(movie_id));
        }
        info!(
            job_id = %job_id,
            movie_id = %movie_id,
            source = %request.source_path.display(),
            profiles = self.profiles.len(),
            "transcode job started"
        );

        let source = match self.engine.open_source(&request.source_path).await {
            Ok(source) => source,
            Err(err) => {
                warn!(job_id = %job_id, movie_id = %movie_id, error = %err, "source rejected before encoding");
                return self.abort(job_id, request, err.to_string(), started_at, clock, &snapshot);
            }
        };

        let movie_dir = self.layout.movie_dir(&movie_id);
        if let Err(err) = tokio::fs::create_dir_all(&movie_dir).await {
            warn!(job_id = %job_id, path = %movie_dir.display(), error = %err, "storage directory unavailable");
            let reason = format!("io error at {}: {err}", movie_dir.display());
            return self.abort(job_id, request, reason, started_at, clock, &snapshot);
        }

        self.claim_rows(&job_id, &movie_id, &snapshot)?;
        let rows = self.variants.for_job(job_id.as_str());

        let tasks = self.profiles.iter().cloned().map(|profile| {
            let task = EncodeTask {
                movie_id: movie_id.clone(),
                output: self.layout.artifact_path(&movie_id, &profile.name),
                url: self.layout.variant_url(&movie_id, &profile.name),
                profile,
                source: source.clone(),
                variants: rows.clone(),
                engine: Arc::clone(&self.engine),
                permits: Arc::clone(&self.permits),
                cancel: cancel.clone(),
                snapshot: Arc::clone(&snapshot),
            };
            tokio::spawn(task.run())
        });
        let joined = join_all(tasks).await;

        let mut outcomes = Vec::with_capacity(joined.len());
        for (profile, result) in self.profiles.iter().zip(joined) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    let reason = format!("encode task aborted: {err}");
                    if let Err(mark) = rows.mark_failed(&movie_id, &profile.name, &reason) {
                        warn!(movie_id = %movie_id, quality = %profile.name, error = %mark, "failed to record aborted task");
                    }
                    outcomes.push(QualityOutcome {
                        quality: profile.name.clone(),
                        status: EncodingStatus::Failed,
                        url: None,
                        file_size_bytes: None,
                        error: Some(reason),
                        elapsed_ms: 0,
                    });
                }
            }
        }

        let available_qualities = self.denormalize(&movie_id, &outcomes);
        let status = if cancel.is_cancelled() {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        snapshot.send_modify(|snap| snap.status = status);

        let report = TranscodeReport {
            job_id,
            movie_id,
            source_path: request.source_path,
            original_file_name: request.original_file_name,
            status,
            outcomes,
            available_qualities,
            error: None,
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: clock.elapsed().as_millis() as u64,
        };
        info!(
            job_id = %report.job_id,
            movie_id = %report.movie_id,
            status = report.status.as_str(),
            completed = report.completed_qualities().len(),
            failed = report.failed_qualities().len(),
            elapsed_ms = report.elapsed_ms,
            "transcode job finished"
        );
        Ok(report)
    }

    /// Every profile row goes back to `Pending` under this job before any
    /// encode starts. The claim is all or nothing and is refused while
    /// another job still owns rows of the movie.
    fn claim_rows(
        &self,
        job_id: &str,
        movie_id: &str,
        snapshot: &watch::Sender<JobSnapshot>,
    ) -> TranscodeResult<()> {
        let rows: Vec<VideoVariant> = self
            .profiles
            .iter()
            .map(|profile| VideoVariant::pending_for(movie_id, profile, self.layout.container()))
            .collect();
        if let Err(err) = self.variants.claim_for_job(job_id, &rows) {
            warn!(job_id = %job_id, movie_id = %movie_id, error = %err, "could not claim variant rows");
            return Err(err.into());
        }
        snapshot.send_modify(|snap| {
            for profile in self.profiles.iter() {
                snap.set(&profile.name, EncodingStatus::Pending, 0);
            }
        });
        Ok(())
    }

    /// Best effort: the registry stays authoritative if the catalog write
    /// fails.
    fn denormalize(&self, movie_id: &str, outcomes: &[QualityOutcome]) -> Vec<String> {
        let available = match self.variants.available_qualities(movie_id) {
            Ok(available) => available,
            Err(err) => {
                warn!(movie_id = %movie_id, error = %err, "could not read available qualities");
                return outcomes
                    .iter()
                    .filter(|outcome| outcome.succeeded())
                    .map(|outcome| outcome.quality.clone())
                    .collect();
            }
        };
        if let Err(err) = self.catalog.set_available_qualities(movie_id, &available) {
            warn!(movie_id = %movie_id, error = %err, "failed to denormalize available qualities");
        }
        available
    }

    fn abort(
        &self,
        job_id: String,
        request: TranscodeRequest,
        reason: String,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
        snapshot: &watch::Sender<JobSnapshot>,
    ) -> TranscodeResult<TranscodeReport> {
        let available_qualities = self.variants.available_qualities(&request.movie_id)?;
        snapshot.send_modify(|snap| snap.status = JobStatus::InfrastructureFailure);
        Ok(TranscodeReport {
            job_id,
            movie_id: request.movie_id,
            source_path: request.source_path,
            original_file_name: request.original_file_name,
            status: JobStatus::InfrastructureFailure,
            outcomes: Vec::new(),
            available_qualities,
            error: Some(reason),
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: clock.elapsed().as_millis() as u64,
        })
    }
}

struct EncodeTask {
    movie_id: String,
    profile: QualityProfile,
    source: SourceMetadata,
    output: PathBuf,
    url: String,
    variants: JobVariants,
    engine: Arc<dyn CodecEngine>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    snapshot: Arc<watch::Sender<JobSnapshot>>,
}

impl EncodeTask {
    async fn run(self) -> QualityOutcome {
        let clock = Instant::now();
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err("cancelled before start"),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| "encoder pool closed")
            }
        };
        let _permit = match permit {
            Ok(permit) => permit,
            Err(reason) => return self.fail(reason.to_string(), clock),
        };

        if let Err(err) = self.variants.mark_processing(&self.movie_id, &self.profile.name) {
            return self.fail(err.to_string(), clock);
        }
        self.publish(EncodingStatus::Processing, 0);
        debug!(movie_id = %self.movie_id, quality = %self.profile.name, "encode started");

        let encoded = self
            .engine
            .encode(
                &self.source,
                &self.profile,
                &self.output,
                self.progress_sink(),
                self.cancel.clone(),
            )
            .await;
        if let Err(err) = encoded {
            return self.fail(err.to_string(), clock);
        }

        match self.record_artifact().await {
            Ok(file_size_bytes) => {
                self.publish(EncodingStatus::Completed, 100);
                info!(
                    movie_id = %self.movie_id,
                    quality = %self.profile.name,
                    bytes = file_size_bytes,
                    "variant completed"
                );
                QualityOutcome {
                    quality: self.profile.name.clone(),
                    status: EncodingStatus::Completed,
                    url: Some(self.url.clone()),
                    file_size_bytes: Some(file_size_bytes),
                    error: None,
                    elapsed_ms: clock.elapsed().as_millis() as u64,
                }
            }
            Err(reason) => self.fail(reason, clock),
        }
    }

    async fn record_artifact(&self) -> Result<i64, String> {
        let metadata = tokio::fs::metadata(&self.output)
            .await
            .map_err(|err| format!("io error at {}: {err}", self.output.display()))?;
        let checksum = sha256_file(&self.output)
            .await
            .map_err(|err| format!("io error at {}: {err}", self.output.display()))?;
        let file_size_bytes = metadata.len() as i64;
        let artifact = CompletedArtifact {
            url: self.url.clone(),
            width: self.profile.width,
            height: self.profile.height,
            bitrate_kbps: self.profile.target_bitrate_kbps,
            file_size_bytes,
            checksum_sha256: Some(checksum),
            duration_seconds: self.source.duration_seconds,
        };
        self.variants
            .mark_completed(&self.movie_id, &self.profile.name, &artifact)
            .map_err(|err| err.to_string())?;
        Ok(file_size_bytes)
    }

    /// Row writes happen only when the percentage actually moves.
    fn progress_sink(&self) -> ProgressSink {
        let last = AtomicU8::new(0);
        let variants = self.variants.clone();
        let movie_id = self.movie_id.clone();
        let quality = self.profile.name.clone();
        let snapshot = Arc::clone(&self.snapshot);
        Arc::new(move |percent: u8| {
            let percent = percent.min(100);
            if last.swap(percent, Ordering::Relaxed) == percent {
                return;
            }
            match variants.update_progress(&movie_id, &quality, percent) {
                Ok(true) => {}
                Ok(false) => return,
                Err(err) => {
                    debug!(movie_id = %movie_id, quality = %quality, error = %err, "progress not persisted");
                }
            }
            snapshot.send_modify(|snap| snap.set(&quality, EncodingStatus::Processing, percent));
        })
    }

    fn publish(&self, status: EncodingStatus, progress: u8) {
        self.snapshot
            .send_modify(|snap| snap.set(&self.profile.name, status, progress));
    }

    fn fail(&self, reason: String, clock: Instant) -> QualityOutcome {
        let mut error = reason;
        if let Err(err) = self
            .variants
            .mark_failed(&self.movie_id, &self.profile.name, &error)
        {
            warn!(movie_id = %self.movie_id, quality = %self.profile.name, error = %err, "failed to record encode failure");
            error = format!("{error}; registry: {err}");
        }
        self.publish(EncodingStatus::Failed, 0);
        warn!(movie_id = %self.movie_id, quality = %self.profile.name, error = %error, "variant failed");
        QualityOutcome {
            quality: self.profile.name.clone(),
            status: EncodingStatus::Failed,
            url: None,
            file_size_bytes: None,
            error: Some(error),
            elapsed_ms: clock.elapsed().as_millis() as u64,
        }
    }
}

async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHECKSUM_CHUNK];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex_encode(hasher.finalize()))
}
