use std::path::PathBuf;

use thiserror::Error;

use super::models::EncodingStatus;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("variant {movie_id}/{quality} not found")]
    NotFound { movie_id: String, quality: String },
    #[error("variant {movie_id}/{quality} cannot move from {from} to {to}")]
    InvalidTransition {
        movie_id: String,
        quality: String,
        from: EncodingStatus,
        to: EncodingStatus,
    },
    #[error("variant {movie_id}/{quality} is no longer owned by job {job_id}")]
    Superseded {
        movie_id: String,
        quality: String,
        job_id: String,
        owner: Option<String>,
    },
    #[error("movie {movie_id} already has an encode in progress")]
    MovieBusy {
        movie_id: String,
        owner: Option<String>,
    },
    #[error("variant store path not configured")]
    MissingStore,
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
