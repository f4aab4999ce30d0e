//! The narrow slice of the movie catalog that transcoding and playback need.

pub mod error;
pub mod models;
pub mod store;

pub use error::{CatalogError, CatalogResult};
pub use models::Movie;
pub use store::{SqliteMovieStore, SqliteMovieStoreBuilder};

/// Movie-side reads and writes owned by the catalog collaborator.
///
/// `available_qualities` written here is a cache of the variant registry and
/// is never read back as authoritative by this crate.
pub trait MovieCatalog: Send + Sync {
    fn fetch_movie(&self, movie_id: &str) -> CatalogResult<Option<Movie>>;

    fn set_available_qualities(&self, movie_id: &str, qualities: &[String]) -> CatalogResult<()>;

    /// Returns true when the duration was written, false when one was
    /// already recorded.
    fn set_duration_if_unset(&self, movie_id: &str, seconds: i64) -> CatalogResult<bool>;

    /// Returns the counter after the increment.
    fn increment_view_count(&self, movie_id: &str) -> CatalogResult<i64>;
}
