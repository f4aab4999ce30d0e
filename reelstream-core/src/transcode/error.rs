use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::variants::RegistryError;

/// Failures raised by a codec engine for a single probe or encode.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("source {path} is unreadable: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("encoder exited with status {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
    #[error("encode cancelled")]
    Cancelled,
    #[error("encode timed out after {0:?}")]
    TimedOut(Duration),
    #[error("encoder produced no output at {0}")]
    MissingOutput(PathBuf),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures that abort a transcode job or a maintenance operation as a
/// whole. Per-quality encode failures are reported in the job report
/// instead.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("movie id {0:?} cannot be used as a storage path segment")]
    InvalidMovieId(String),
    #[error("variant registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("transcode task failed: {0}")]
    Task(String),
}

pub type TranscodeResult<T> = Result<T, TranscodeError>;
