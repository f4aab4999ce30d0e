use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use reelstream_core::{
    load_config, DownloadResolution, EncodingStatus, FfmpegEngine, JobStatus, MediaLayout, Movie,
    MovieCatalog, PlaybackService, PlaybackStart, QualityProfileCatalog, ReelstreamConfig,
    SqliteMovieStore, SqliteVariantStore, StreamResolution, StreamResolver, TranscodeCoordinator,
    TranscodeReport, TranscodeRequest, VariantKey, VariantSummary, VideoVariant,
};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] reelstream_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Registry(#[from] reelstream_core::RegistryError),
    #[error(transparent)]
    Catalog(#[from] reelstream_core::CatalogError),
    #[error(transparent)]
    Transcode(#[from] reelstream_core::TranscodeError),
    #[error(transparent)]
    Resolve(#[from] reelstream_core::ResolveError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("required resource missing: {0}")]
    MissingResource(String),
    #[error("transcode job {job_id} did not run: {reason}")]
    JobFailed { job_id: String, reason: String },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "reelstream command-line control interface", long_about = None)]
pub struct Cli {
    /// Path to reelstream.toml
    #[arg(long, default_value = "configs/reelstream.toml")]
    pub config: PathBuf,
    /// Overrides paths.data_dir
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Overrides paths.storage_dir
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,
    /// Alternative path for variants.sqlite
    #[arg(long)]
    pub variants_db: Option<PathBuf>,
    /// Alternative path for movies.sqlite
    #[arg(long)]
    pub movies_db: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Node, profile and variant summary
    Status,
    /// Movie catalog operations
    #[command(subcommand)]
    Movie(MovieCommands),
    /// Encode a source file into every configured quality
    Transcode(TranscodeArgs),
    /// Resolve the stream URL for a movie
    Resolve(ResolveArgs),
    /// Resolve a downloadable variant for a movie
    Download(DownloadArgs),
    /// Variant registry operations
    #[command(subcommand)]
    Variants(VariantCommands),
    /// Fail variants orphaned by an interrupted process; run while no transcode is active
    Reconcile,
    /// Run integrity checks
    #[command(name = "health")]
    #[command(subcommand)]
    Health(HealthCommands),
}

#[derive(Subcommand, Debug)]
pub enum MovieCommands {
    /// Insert or update a movie record
    Register(MovieRegisterArgs),
    /// Show a movie with its variants
    Show(MovieShowArgs),
}

#[derive(Args, Debug)]
pub struct MovieRegisterArgs {
    pub movie_id: String,
    #[arg(long)]
    pub title: Option<String>,
    /// Raw stored reference: absolute URL, routed path or bare filename
    #[arg(long)]
    pub video_url: Option<String>,
    #[arg(long)]
    pub streaming_url: Option<String>,
    /// Single quality recorded before variants existed
    #[arg(long)]
    pub video_quality: Option<String>,
    #[arg(long, default_value_t = false)]
    pub download_enabled: bool,
    #[arg(long)]
    pub max_download_quality: Option<String>,
}

#[derive(Args, Debug)]
pub struct MovieShowArgs {
    pub movie_id: String,
}

#[derive(Args, Debug)]
pub struct TranscodeArgs {
    pub movie_id: String,
    /// Uploaded source file
    pub source: PathBuf,
    /// Name the file was uploaded under (defaults to the source file name)
    #[arg(long)]
    pub original_name: Option<String>,
    /// Simultaneous encodes, capped at 4
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    pub movie_id: String,
    #[arg(long, default_value = "720p")]
    pub quality: String,
    /// Count a view and record the duration, as a player starting would
    #[arg(long, default_value_t = false)]
    pub play: bool,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    pub movie_id: String,
    #[arg(long)]
    pub quality: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum VariantCommands {
    /// List variant rows
    List(VariantListArgs),
    /// Delete every variant row and artifact of a movie
    Purge(VariantPurgeArgs),
}

#[derive(Args, Debug)]
pub struct VariantListArgs {
    /// Restrict to one movie
    #[arg(long)]
    pub movie: Option<String>,
    /// Filter by encoding status (pending, processing, completed, failed)
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct VariantPurgeArgs {
    pub movie_id: String,
}

#[derive(Subcommand, Debug)]
pub enum HealthCommands {
    /// Check config, storage, databases and encoder binaries
    Check,
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;
    if !matches!(cli.command, Commands::Health(_)) {
        context.prepare_stores()?;
    }

    match &cli.command {
        Commands::Status => {
            let status = context.gather_status()?;
            render(&status, cli.format)?;
        }
        Commands::Movie(MovieCommands::Register(args)) => {
            let movie = context.register_movie(args)?;
            render(&movie, cli.format)?;
        }
        Commands::Movie(MovieCommands::Show(args)) => {
            let detail = context.show_movie(&args.movie_id)?;
            render(&detail, cli.format)?;
        }
        Commands::Transcode(args) => {
            let report = context.transcode(args).await?;
            render(&report, cli.format)?;
            if report.status == JobStatus::InfrastructureFailure {
                return Err(AppError::JobFailed {
                    job_id: report.job_id.clone(),
                    reason: report.error.clone().unwrap_or_default(),
                });
            }
        }
        Commands::Resolve(args) if args.play => {
            let started = context.start_playback(args)?;
            render(&started, cli.format)?;
        }
        Commands::Resolve(args) => {
            let resolution = context.resolve(args)?;
            render(&resolution, cli.format)?;
        }
        Commands::Download(args) => {
            let download = context.download(args)?;
            render(&download, cli.format)?;
        }
        Commands::Variants(VariantCommands::List(args)) => {
            let list = context.variant_list(args)?;
            render(&list, cli.format)?;
        }
        Commands::Variants(VariantCommands::Purge(args)) => {
            let result = context.purge(&args.movie_id).await?;
            render(&result, cli.format)?;
        }
        Commands::Reconcile => {
            let result = context.reconcile()?;
            render(&result, cli.format)?;
        }
        Commands::Health(HealthCommands::Check) => {
            let report = context.health_check();
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: ReelstreamConfig,
    config_path: PathBuf,
    data_dir: PathBuf,
    storage_dir: PathBuf,
    variants_db: PathBuf,
    movies_db: PathBuf,
    variants: SqliteVariantStore,
    movies: SqliteMovieStore,
    profiles: QualityProfileCatalog,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let config = load_config(&config_path)?;
        let profiles = config.quality_catalog()?;

        let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.data_dir());
        let storage_dir = cli
            .storage_dir
            .clone()
            .unwrap_or_else(|| config.storage_dir());
        let variants_db = cli
            .variants_db
            .clone()
            .unwrap_or_else(|| data_dir.join("variants.sqlite"));
        let movies_db = cli
            .movies_db
            .clone()
            .unwrap_or_else(|| data_dir.join("movies.sqlite"));

        let variants = SqliteVariantStore::new(&variants_db)?;
        let movies = SqliteMovieStore::new(&movies_db)?;

        Ok(Self {
            config,
            config_path,
            data_dir,
            storage_dir,
            variants_db,
            movies_db,
            variants,
            movies,
            profiles,
        })
    }

    fn prepare_stores(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.storage_dir] {
            fs::create_dir_all(dir)?;
        }
        for db in [&self.variants_db, &self.movies_db] {
            if let Some(parent) = db.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        self.variants.initialize()?;
        self.movies.initialize()?;
        Ok(())
    }

    fn layout(&self) -> MediaLayout {
        let streaming = &self.config.streaming;
        MediaLayout::new(
            &self.storage_dir,
            streaming.public_prefix.clone(),
            streaming.api_prefix.clone(),
            self.config.transcode.container.clone(),
        )
    }

    fn resolver(&self) -> StreamResolver {
        StreamResolver::from_config(&self.config, self.variants.clone()).with_layout(self.layout())
    }

    fn playback(&self) -> PlaybackService {
        PlaybackService::new(
            Arc::new(self.movies.clone()),
            self.resolver(),
            self.profiles.clone(),
        )
    }

    fn coordinator(&self, workers: Option<usize>) -> TranscodeCoordinator {
        let engine = FfmpegEngine::from_config(&self.config.transcode);
        TranscodeCoordinator::new(
            self.variants.clone(),
            Arc::new(self.movies.clone()),
            Arc::new(engine),
            self.profiles.clone(),
            self.layout(),
        )
        .with_max_concurrent(workers.unwrap_or_else(|| self.config.encode_workers()))
    }

    fn gather_status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            node_name: self.config.system.node_name.clone(),
            environment: self.config.system.environment.clone(),
            generated_at: Utc::now(),
            encode_workers: self.config.encode_workers(),
            profiles: self
                .profiles
                .iter()
                .map(|profile| ProfileEntry {
                    name: profile.name.clone(),
                    width: profile.width,
                    height: profile.height,
                    target_bitrate_kbps: profile.target_bitrate_kbps,
                })
                .collect(),
            movies: self.movies.count()?,
            variants: self.variants.summary()?,
        })
    }

    fn register_movie(&self, args: &MovieRegisterArgs) -> Result<Movie> {
        let mut movie = self
            .movies
            .fetch_movie(&args.movie_id)?
            .unwrap_or_else(|| Movie::new(args.movie_id.clone()));
        movie.title = args.title.clone().or(movie.title);
        movie.video_url = args.video_url.clone().or(movie.video_url);
        movie.streaming_url = args.streaming_url.clone().or(movie.streaming_url);
        movie.video_quality = args.video_quality.clone().or(movie.video_quality);
        movie.download_enabled = args.download_enabled;
        movie.max_download_quality = args
            .max_download_quality
            .clone()
            .or(movie.max_download_quality);
        if let Some(cap) = &movie.max_download_quality {
            if self.profiles.get(cap).is_none() {
                return Err(AppError::InvalidArgument(format!(
                    "unknown quality {cap}; expected one of {}",
                    self.profiles.names().join(", ")
                )));
            }
        }
        self.movies.upsert_movie(&movie)?;
        info!(movie_id = %movie.movie_id, "movie registered");
        self.movies
            .fetch_movie(&movie.movie_id)?
            .ok_or_else(|| AppError::MissingResource(format!("movie {}", movie.movie_id)))
    }

    fn show_movie(&self, movie_id: &str) -> Result<MovieDetail> {
        let movie = self
            .movies
            .fetch_movie(movie_id)?
            .ok_or_else(|| AppError::MissingResource(format!("movie {movie_id}")))?;
        let variants = self.variants.list_by_movie(movie_id)?;
        Ok(MovieDetail { movie, variants })
    }

    async fn transcode(&self, args: &TranscodeArgs) -> Result<TranscodeReport> {
        if self.movies.fetch_movie(&args.movie_id)?.is_none() {
            return Err(AppError::MissingResource(format!(
                "movie {} is not registered",
                args.movie_id
            )));
        }
        let original_name = args.original_name.clone().unwrap_or_else(|| {
            args.source
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default()
        });
        let request = TranscodeRequest::new(args.movie_id.clone(), args.source.clone(), original_name);
        let handle = self.coordinator(args.workers).start(request);
        info!(job_id = %handle.job_id(), movie_id = %handle.movie_id(), "transcode job submitted");

        let cancel = handle.cancellation_token();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling transcode job");
                cancel.cancel();
            }
        });
        let report = handle.wait().await;
        interrupt.abort();
        Ok(report?)
    }

    fn resolve(&self, args: &ResolveArgs) -> Result<StreamResolution> {
        Ok(self.playback().resolve(&args.movie_id, &args.quality)?)
    }

    fn start_playback(&self, args: &ResolveArgs) -> Result<PlaybackStart> {
        Ok(self
            .playback()
            .start_playback(&args.movie_id, &args.quality)?)
    }

    fn download(&self, args: &DownloadArgs) -> Result<DownloadResolution> {
        Ok(self
            .playback()
            .resolve_download(&args.movie_id, args.quality.as_deref())?)
    }

    fn variant_list(&self, args: &VariantListArgs) -> Result<VariantList> {
        let status = args
            .status
            .as_deref()
            .map(str::parse::<EncodingStatus>)
            .transpose()
            .map_err(AppError::InvalidArgument)?;
        let rows = match &args.movie {
            Some(movie_id) => self
                .variants
                .list_by_movie(movie_id)?
                .into_iter()
                .filter(|row| status.map_or(true, |status| row.encoding_status == status))
                .take(args.limit)
                .collect(),
            None => self.variants.list(status, args.limit)?,
        };
        Ok(VariantList { rows })
    }

    async fn purge(&self, movie_id: &str) -> Result<PurgeResult> {
        let removed = self.coordinator(None).purge_movie(movie_id).await?;
        Ok(PurgeResult {
            movie_id: movie_id.to_string(),
            removed,
        })
    }

    fn reconcile(&self) -> Result<ReconcileResult> {
        let failed = self.coordinator(None).recover_interrupted()?;
        Ok(ReconcileResult { failed })
    }

    fn health_check(&self) -> Vec<HealthEntry> {
        vec![
            self.check_path("reelstream.toml", &self.config_path),
            self.check_directory("data", &self.data_dir),
            self.check_directory("storage", &self.storage_dir),
            self.check_database("variants.sqlite", &self.variants_db),
            self.check_database("movies.sqlite", &self.movies_db),
            self.check_binary("ffmpeg", &self.config.transcode.ffmpeg_binary),
            self.check_binary("ffprobe", &self.config.transcode.ffprobe_binary),
        ]
    }

    fn check_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{}", path.display()))
        } else {
            HealthEntry::error(name, format!("{path} missing", path = path.display()))
        }
    }

    fn check_directory(&self, name: &str, path: &Path) -> HealthEntry {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => HealthEntry::ok(name, format!("{}", path.display())),
            Ok(_) => HealthEntry::warn(
                name,
                format!("{path} is not a directory", path = path.display()),
            ),
            Err(_) => HealthEntry::warn(name, format!("{path} not found", path = path.display())),
        }
    }

    fn check_database(&self, name: &str, path: &Path) -> HealthEntry {
        if !path.exists() {
            return HealthEntry::warn(name, format!("{path} not found", path = path.display()));
        }
        match Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
            Ok(conn) => {
                let pragma: rusqlite::Result<String> =
                    conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0));
                match pragma {
                    Ok(result) if result.eq_ignore_ascii_case("ok") => {
                        HealthEntry::ok(name, "integrity ok".to_string())
                    }
                    Ok(result) => HealthEntry::warn(name, format!("integrity_check: {result}")),
                    Err(err) => HealthEntry::warn(name, format!("error: {err}")),
                }
            }
            Err(err) => HealthEntry::error(name, format!("failed to open: {err}")),
        }
    }

    fn check_binary(&self, name: &str, program: &str) -> HealthEntry {
        let output = Command::new(program)
            .arg("-version")
            .stdin(Stdio::null())
            .output();
        match output {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                HealthEntry::ok(name, version)
            }
            Ok(output) => HealthEntry::error(
                name,
                format!("{program} -version exited with {:?}", output.status.code()),
            ),
            Err(err) => HealthEntry::error(name, format!("{program} not runnable: {err}")),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub node_name: String,
    pub environment: String,
    pub generated_at: DateTime<Utc>,
    pub encode_workers: usize,
    pub profiles: Vec<ProfileEntry>,
    pub movies: usize,
    pub variants: VariantSummary,
}

#[derive(Debug, Serialize)]
pub struct ProfileEntry {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub target_bitrate_kbps: u32,
}

impl DisplayFallback for StatusReport {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("Node: {} (env: {})", self.node_name, self.environment),
            format!("Encode workers: {}", self.encode_workers),
            "Profiles:".to_string(),
        ];
        for profile in &self.profiles {
            lines.push(format!(
                "  - {}: {}x{} @ {} kbps",
                profile.name, profile.width, profile.height, profile.target_bitrate_kbps
            ));
        }
        lines.push(format!("Movies: {}", self.movies));
        lines.push(format!(
            "Variants: {} total, {} available across {} movies",
            self.variants.total, self.variants.available, self.variants.movies
        ));
        let ordered: BTreeMap<_, _> = self.variants.by_status.iter().collect();
        for (status, count) in ordered {
            lines.push(format!("  - {status}: {count}"));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Movie {
    fn display(&self) -> String {
        let qualities = if self.available_qualities.is_empty() {
            "-".to_string()
        } else {
            self.available_qualities.join(",")
        };
        format!(
            "{} | {} | views={} | qualities={} | download={}",
            self.movie_id,
            self.title.as_deref().unwrap_or("<untitled>"),
            self.view_count,
            qualities,
            if self.download_enabled {
                self.max_download_quality.as_deref().unwrap_or("any")
            } else {
                "off"
            }
        )
    }
}

#[derive(Debug, Serialize)]
pub struct MovieDetail {
    pub movie: Movie,
    pub variants: Vec<VideoVariant>,
}

impl DisplayFallback for MovieDetail {
    fn display(&self) -> String {
        let mut lines = vec![self.movie.display()];
        if self.variants.is_empty() {
            lines.push("  no variants".to_string());
        }
        for variant in &self.variants {
            lines.push(format!("  {}", variant_line(variant)));
        }
        lines.join("\n")
    }
}

fn variant_line(variant: &VideoVariant) -> String {
    let mut line = format!(
        "{}/{} status={} progress={}% available={}",
        variant.movie_id,
        variant.quality,
        variant.encoding_status,
        variant.encoding_progress,
        variant.is_available
    );
    if let Some(url) = &variant.url {
        line.push_str(&format!(" url={url}"));
    }
    if let Some(error) = &variant.error_message {
        line.push_str(&format!(" error={error}"));
    }
    line
}

impl DisplayFallback for TranscodeReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Job {} for movie {}: {} in {} ms",
            self.job_id,
            self.movie_id,
            self.status.as_str(),
            self.elapsed_ms
        )];
        if let Some(error) = &self.error {
            lines.push(format!("  error: {error}"));
        }
        for outcome in &self.outcomes {
            let detail = match (&outcome.url, &outcome.error) {
                (Some(url), _) => url.clone(),
                (None, Some(error)) => error.clone(),
                (None, None) => "-".to_string(),
            };
            lines.push(format!(
                "  [{}] {} ({} ms) {}",
                outcome.status, outcome.quality, outcome.elapsed_ms, detail
            ));
        }
        lines.push(format!(
            "Available: {}",
            if self.available_qualities.is_empty() {
                "-".to_string()
            } else {
                self.available_qualities.join(",")
            }
        ));
        lines.join("\n")
    }
}

impl DisplayFallback for StreamResolution {
    fn display(&self) -> String {
        format!(
            "{} [{}] via {}",
            self.url,
            self.quality,
            self.source.as_str()
        )
    }
}

impl DisplayFallback for PlaybackStart {
    fn display(&self) -> String {
        let mut line = format!("{} (views={})", self.resolution.display(), self.view_count);
        if let Some(seconds) = self.duration_recorded {
            line.push_str(&format!(" duration={seconds}s"));
        }
        line
    }
}

impl DisplayFallback for DownloadResolution {
    fn display(&self) -> String {
        let size = self
            .file_size_bytes
            .map(|bytes| format!("{bytes} bytes"))
            .unwrap_or_else(|| "-".to_string());
        format!("{} [{}] {}", self.url, self.quality, size)
    }
}

#[derive(Debug, Serialize)]
pub struct VariantList {
    pub rows: Vec<VideoVariant>,
}

impl DisplayFallback for VariantList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No variants found".to_string();
        }
        self.rows
            .iter()
            .map(variant_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct PurgeResult {
    pub movie_id: String,
    pub removed: usize,
}

impl DisplayFallback for PurgeResult {
    fn display(&self) -> String {
        format!("Removed {} variants of movie {}", self.removed, self.movie_id)
    }
}

#[derive(Debug, Serialize)]
pub struct ReconcileResult {
    pub failed: Vec<VariantKey>,
}

impl DisplayFallback for ReconcileResult {
    fn display(&self) -> String {
        if self.failed.is_empty() {
            return "No interrupted variants".to_string();
        }
        let mut lines = vec![format!("Marked {} variants failed:", self.failed.len())];
        for key in &self.failed {
            lines.push(format!("  - {key}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(|entry| format!("[{}] {}: {}", entry.status, entry.name, entry.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
