use thiserror::Error;

use crate::catalog::CatalogError;
use crate::variants::RegistryError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("movie {movie_id} is not streamable at {quality}")]
    NotStreamable { movie_id: String, quality: String },
    #[error("movie {0} not found")]
    MovieNotFound(String),
    #[error("downloads are disabled for movie {0}")]
    DownloadDisabled(String),
    #[error("no downloadable variant of movie {movie_id} at or below {quality}")]
    QualityNotDownloadable { movie_id: String, quality: String },
    #[error("variant registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

pub type ResolveResult<T> = Result<T, ResolveError>;
