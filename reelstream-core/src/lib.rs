pub mod catalog;
pub mod config;
pub mod error;
pub mod layout;
pub mod quality;
pub mod sqlite;
pub mod stream;
pub mod transcode;
pub mod variants;

pub use catalog::{
    CatalogError, CatalogResult, Movie, MovieCatalog, SqliteMovieStore, SqliteMovieStoreBuilder,
};
pub use config::{
    load_config, LegacyOverrideEntry, PathsSection, ReelstreamConfig, StreamingSection,
    SystemSection, TranscodeSection, MAX_ENCODE_WORKERS,
};
pub use error::{ConfigError, Result};
pub use layout::{is_safe_segment, MediaLayout};
pub use quality::{
    pick_quality, QualityError, QualityFallbackPicker, QualityProfile, QualityProfileCatalog,
    NEUTRAL_QUALITY, ORIGINAL_QUALITY,
};
pub use stream::{
    DownloadResolution, LegacyOverrides, PlaybackService, PlaybackStart, ResolutionSource,
    ResolveError, ResolveResult, StreamResolution, StreamResolver,
};
pub use transcode::{
    CodecEngine, EngineError, EngineResult, FfmpegEngine, JobHandle, JobSnapshot, JobStatus,
    ProgressSink, QualityOutcome, QualityProgress, SourceMetadata, TranscodeCoordinator,
    TranscodeError, TranscodeReport, TranscodeRequest, TranscodeResult,
};
pub use variants::{
    CompletedArtifact, EncodingStatus, JobVariants, RegistryError, RegistryResult,
    SqliteVariantStore, SqliteVariantStoreBuilder, VariantKey, VariantSummary, VideoVariant,
};
