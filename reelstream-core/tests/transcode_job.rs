use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

use reelstream_core::{
    CodecEngine, EncodingStatus, EngineError, EngineResult, JobStatus, MediaLayout, Movie,
    MovieCatalog, ProgressSink, QualityProfile, QualityProfileCatalog, RegistryError,
    SourceMetadata, SqliteMovieStore, SqliteVariantStore, TranscodeCoordinator, TranscodeError,
    TranscodeRequest,
};

/// Stand-in encoder: writes a small artifact, fails on request and can be
/// held mid-encode until released or cancelled.
#[derive(Default)]
struct ScriptedEngine {
    reject_source: bool,
    failing: HashSet<String>,
    release: Option<CancellationToken>,
    started: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedEngine {
    fn failing(qualities: &[&str]) -> Self {
        Self {
            failing: qualities.iter().map(|q| q.to_string()).collect(),
            ..Self::default()
        }
    }

    fn gated(release: CancellationToken) -> Self {
        Self {
            release: Some(release),
            ..Self::default()
        }
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodecEngine for ScriptedEngine {
    async fn open_source(&self, path: &Path) -> EngineResult<SourceMetadata> {
        if self.reject_source {
            return Err(EngineError::Unreadable {
                path: path.to_path_buf(),
                reason: "no video stream".into(),
            });
        }
        Ok(SourceMetadata {
            path: path.to_path_buf(),
            width: 1920,
            height: 1080,
            duration_seconds: Some(120.0),
            video_codec: Some("h264".into()),
        })
    }

    async fn encode(
        &self,
        _source: &SourceMetadata,
        profile: &QualityProfile,
        output: &Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> EngineResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        progress(50);

        let result: EngineResult<()> = async {
            if let Some(release) = &self.release {
                tokio::select! {
                    _ = release.cancelled() => {}
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                }
            } else {
                tokio::task::yield_now().await;
            }
            if self.failing.contains(&profile.name) {
                return Err(EngineError::Failed {
                    status: Some(1),
                    stderr: format!("scripted failure for {}", profile.name),
                });
            }
            let body = format!("{}x{}@{}", profile.width, profile.height, profile.target_bitrate_kbps);
            tokio::fs::write(output, body)
                .await
                .map_err(|source| EngineError::Io {
                    source,
                    path: output.to_path_buf(),
                })?;
            progress(100);
            Ok(())
        }
        .await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

struct Harness {
    dir: TempDir,
    variants: SqliteVariantStore,
    movies: SqliteMovieStore,
    engine: Arc<ScriptedEngine>,
    coordinator: TranscodeCoordinator,
}

impl Harness {
    fn new(engine: ScriptedEngine) -> Self {
        let dir = tempdir().unwrap();
        let variants = SqliteVariantStore::new(dir.path().join("variants.sqlite")).unwrap();
        variants.initialize().unwrap();
        let movies = SqliteMovieStore::new(dir.path().join("movies.sqlite")).unwrap();
        movies.initialize().unwrap();
        let mut movie = Movie::new("m1");
        movie.title = Some("Harbour Lights".into());
        movies.upsert_movie(&movie).unwrap();
        std::fs::write(dir.path().join("upload.mov"), b"source bytes").unwrap();

        let engine = Arc::new(engine);
        let coordinator = TranscodeCoordinator::new(
            variants.clone(),
            Arc::new(movies.clone()),
            engine.clone(),
            QualityProfileCatalog::default(),
            MediaLayout::new(dir.path().join("videos"), "/videos/stream", "/api", "mp4"),
        );
        Self {
            dir,
            variants,
            movies,
            engine,
            coordinator,
        }
    }

    fn request(&self, movie_id: &str) -> TranscodeRequest {
        TranscodeRequest::new(movie_id, self.dir.path().join("upload.mov"), "upload.mov")
    }

    fn artifact(&self, movie_id: &str, quality: &str) -> PathBuf {
        self.dir
            .path()
            .join("videos")
            .join(movie_id)
            .join(format!("{movie_id}_{quality}.mp4"))
    }

    fn count_status(&self, movie_id: &str, status: EncodingStatus) -> usize {
        self.variants
            .list_by_movie(movie_id)
            .unwrap()
            .iter()
            .filter(|row| row.encoding_status == status)
            .count()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn every_profile_completes_and_is_denormalized() {
    let harness = Harness::new(ScriptedEngine::default());
    let report = harness.coordinator.run(harness.request("m1")).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert!(report.succeeded());
    assert_eq!(report.outcomes.len(), 3);
    assert!(report.failed_qualities().is_empty());
    assert_eq!(report.available_qualities, vec!["1080p", "720p", "360p"]);

    let rows = harness.variants.list_by_movie("m1").unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.encoding_status, EncodingStatus::Completed);
        assert_eq!(row.encoding_progress, 100);
        assert!(row.is_available);
        assert_eq!(
            row.url.as_deref(),
            Some(format!("/videos/stream/m1/m1_{}.mp4", row.quality).as_str())
        );
        assert!(row.file_size_bytes.unwrap() > 0);
        assert_eq!(row.checksum_sha256.as_ref().map(String::len), Some(64));
        assert_eq!(row.duration_seconds, Some(120.0));
        assert!(harness.artifact("m1", &row.quality).is_file());
    }
    let hd = harness.variants.get("m1", "1080p").unwrap().unwrap();
    assert_eq!((hd.width, hd.height, hd.bitrate_kbps), (1920, 1080, 5000));

    let movie = harness.movies.fetch_movie("m1").unwrap().unwrap();
    assert_eq!(movie.available_qualities, vec!["1080p", "720p", "360p"]);
}

#[tokio::test]
async fn one_failed_quality_leaves_the_others_intact() {
    let harness = Harness::new(ScriptedEngine::failing(&["720p"]));
    let report = harness.coordinator.run(harness.request("m1")).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.failed_qualities(), vec!["720p"]);
    let failed = report.outcome("720p").unwrap();
    assert!(failed.error.as_deref().unwrap().contains("scripted failure"));
    assert!(report.outcome("1080p").unwrap().succeeded());
    assert!(report.outcome("360p").unwrap().succeeded());

    let row = harness.variants.get("m1", "720p").unwrap().unwrap();
    assert_eq!(row.encoding_status, EncodingStatus::Failed);
    assert!(!row.is_available);
    assert!(row.error_message.is_some());

    let movie = harness.movies.fetch_movie("m1").unwrap().unwrap();
    assert_eq!(movie.available_qualities, vec!["1080p", "360p"]);
}

#[tokio::test]
async fn rerunning_a_job_reuses_rows() {
    let harness = Harness::new(ScriptedEngine::default());
    let first = harness.coordinator.run(harness.request("m1")).await.unwrap();
    let second = harness.coordinator.run(harness.request("m1")).await.unwrap();

    assert_ne!(first.job_id, second.job_id);
    assert_eq!(harness.variants.list_by_movie("m1").unwrap().len(), 3);
    assert_eq!(harness.count_status("m1", EncodingStatus::Completed), 3);
    let row = harness.variants.get("m1", "360p").unwrap().unwrap();
    assert_eq!(row.job_id.as_deref(), Some(second.job_id.as_str()));
}

#[tokio::test]
async fn unreadable_source_touches_no_rows() {
    let engine = ScriptedEngine {
        reject_source: true,
        ..ScriptedEngine::default()
    };
    let harness = Harness::new(engine);
    let report = harness.coordinator.run(harness.request("m1")).await.unwrap();

    assert_eq!(report.status, JobStatus::InfrastructureFailure);
    assert!(!report.succeeded());
    assert!(report.outcomes.is_empty());
    assert!(report.error.as_deref().unwrap().contains("no video stream"));
    assert_eq!(harness.engine.started(), 0);
    assert!(harness.variants.list_by_movie("m1").unwrap().is_empty());
}

#[tokio::test]
async fn a_movie_being_encoded_refuses_a_second_job() {
    let release = CancellationToken::new();
    let harness = Harness::new(ScriptedEngine::gated(release.clone()));
    let coordinator = harness.coordinator.clone().with_max_concurrent(2);
    let first = coordinator.start(harness.request("m1"));
    wait_until(|| harness.engine.started() == 2).await;

    let err = coordinator.run(harness.request("m1")).await.unwrap_err();
    match err {
        TranscodeError::Registry(RegistryError::MovieBusy { movie_id, owner }) => {
            assert_eq!(movie_id, "m1");
            assert_eq!(owner.as_deref(), Some(first.job_id()));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.count_status("m1", EncodingStatus::Processing), 2);
    assert_eq!(harness.count_status("m1", EncodingStatus::Pending), 1);

    release.cancel();
    let report = first.wait().await.unwrap();
    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.completed_qualities().len(), 3);
    assert_eq!(harness.count_status("m1", EncodingStatus::Completed), 3);
    for row in harness.variants.list_by_movie("m1").unwrap() {
        assert_eq!(row.job_id.as_deref(), Some(report.job_id.as_str()));
    }

    let rerun = coordinator.run(harness.request("m1")).await.unwrap();
    assert_eq!(rerun.completed_qualities().len(), 3);
}

#[tokio::test]
async fn encode_pool_caps_concurrency() {
    let release = CancellationToken::new();
    let harness = Harness::new(ScriptedEngine::gated(release.clone()));
    let coordinator = harness.coordinator.clone().with_max_concurrent(2);
    let handle = coordinator.start(harness.request("m1"));

    wait_until(|| harness.engine.started() == 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.engine.started(), 2);
    assert_eq!(harness.count_status("m1", EncodingStatus::Processing), 2);
    assert_eq!(harness.count_status("m1", EncodingStatus::Pending), 1);

    // Nothing mid-job may look streamable.
    for row in harness.variants.list_by_movie("m1").unwrap() {
        assert!(!row.is_available);
        if row.encoding_status == EncodingStatus::Processing {
            assert_eq!(row.encoding_progress, 50);
        }
    }
    assert!(harness.variants.list_available_by_movie("m1").unwrap().is_empty());
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.status, JobStatus::Running);
    assert_eq!(snapshot.qualities.len(), 3);
    assert!(!handle.is_finished());

    release.cancel();
    let report = handle.wait().await.unwrap();
    assert_eq!(report.completed_qualities().len(), 3);
    assert_eq!(harness.engine.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancellation_fails_every_unfinished_quality() {
    let release = CancellationToken::new();
    let harness = Harness::new(ScriptedEngine::gated(release));
    let coordinator = harness.coordinator.clone().with_max_concurrent(2);
    let handle = coordinator.start(harness.request("m1"));

    wait_until(|| harness.engine.started() == 2).await;
    handle.cancel();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.status, JobStatus::Cancelled);
    assert_eq!(report.failed_qualities().len(), 3);
    assert_eq!(harness.engine.started(), 2);
    assert_eq!(harness.count_status("m1", EncodingStatus::Processing), 0);
    assert_eq!(harness.count_status("m1", EncodingStatus::Pending), 0);
    assert_eq!(harness.count_status("m1", EncodingStatus::Failed), 3);

    let never_started = report
        .outcomes
        .iter()
        .filter(|outcome| outcome.error.as_deref() == Some("cancelled before start"))
        .count();
    assert_eq!(never_started, 1);
    let movie = harness.movies.fetch_movie("m1").unwrap().unwrap();
    assert!(movie.available_qualities.is_empty());
}

#[tokio::test]
async fn caller_token_cancels_inline_runs() {
    let harness = Harness::new(ScriptedEngine::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = harness
        .coordinator
        .run_with_cancel(harness.request("m1"), cancel)
        .await
        .unwrap();

    assert_eq!(report.status, JobStatus::Cancelled);
    assert_eq!(harness.engine.started(), 0);
    assert_eq!(harness.count_status("m1", EncodingStatus::Failed), 3);
}

#[tokio::test]
async fn unsafe_movie_ids_are_refused() {
    let harness = Harness::new(ScriptedEngine::default());
    let err = harness
        .coordinator
        .run(harness.request("../escape"))
        .await
        .unwrap_err();
    assert!(matches!(err, TranscodeError::InvalidMovieId(_)));
    assert_eq!(harness.engine.started(), 0);
}

#[tokio::test]
async fn purge_removes_rows_files_and_cache() {
    let harness = Harness::new(ScriptedEngine::default());
    harness.coordinator.run(harness.request("m1")).await.unwrap();

    let removed = harness.coordinator.purge_movie("m1").await.unwrap();
    assert_eq!(removed, 3);
    assert!(harness.variants.list_by_movie("m1").unwrap().is_empty());
    assert!(!harness.dir.path().join("videos").join("m1").exists());
    let movie = harness.movies.fetch_movie("m1").unwrap().unwrap();
    assert!(movie.available_qualities.is_empty());

    assert_eq!(harness.coordinator.purge_movie("m1").await.unwrap(), 0);
}

#[tokio::test]
async fn recovery_fails_rows_left_by_a_dead_process() {
    let harness = Harness::new(ScriptedEngine::default());
    let profile = QualityProfile::new("720p", 1280, 720, 2500);
    harness
        .variants
        .reset_pending(&reelstream_core::VideoVariant::pending_for("m9", &profile, "mp4"))
        .unwrap();
    harness.variants.mark_processing("m9", "720p").unwrap();

    let keys = harness.coordinator.recover_interrupted().unwrap();
    assert_eq!(keys.len(), 1);
    let row = harness.variants.get("m9", "720p").unwrap().unwrap();
    assert_eq!(row.encoding_status, EncodingStatus::Failed);
    assert!(row
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("interrupted"));
}
