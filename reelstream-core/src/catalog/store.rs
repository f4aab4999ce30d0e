use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};

use crate::sqlite::configure_connection;

use super::models::Movie;
use super::{CatalogError, CatalogResult, MovieCatalog};

const MOVIE_SCHEMA: &str = include_str!("../../../sql/movies.sql");

#[derive(Debug, Clone)]
pub struct SqliteMovieStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteMovieStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteMovieStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> CatalogResult<SqliteMovieStore> {
        let path = self.path.ok_or(CatalogError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteMovieStore { path, flags })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteMovieStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteMovieStore {
    pub fn builder() -> SqliteMovieStoreBuilder {
        SqliteMovieStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> CatalogResult<Self> {
        SqliteMovieStoreBuilder::new().path(path).build()
    }

    fn open(&self) -> CatalogResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            CatalogError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| CatalogError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> CatalogResult<()> {
        let conn = self.open()?;
        conn.execute_batch(MOVIE_SCHEMA)?;
        Ok(())
    }

    /// Writes the movie's legacy and download fields. Counters and the
    /// derived quality list are left alone on update.
    pub fn upsert_movie(&self, movie: &Movie) -> CatalogResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO movies (
                movie_id, title, video_url, streaming_url, video_quality,
                download_enabled, max_download_quality, available_qualities,
                video_duration_s, view_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(movie_id) DO UPDATE SET
                title = excluded.title,
                video_url = excluded.video_url,
                streaming_url = excluded.streaming_url,
                video_quality = excluded.video_quality,
                download_enabled = excluded.download_enabled,
                max_download_quality = excluded.max_download_quality,
                updated_at = CURRENT_TIMESTAMP",
            params![
                &movie.movie_id,
                &movie.title,
                &movie.video_url,
                &movie.streaming_url,
                &movie.video_quality,
                if movie.download_enabled { 1 } else { 0 },
                &movie.max_download_quality,
                Movie::serialize_qualities(&movie.available_qualities),
                &movie.video_duration_s,
                movie.view_count,
            ],
        )?;
        Ok(())
    }

    pub fn list(&self, limit: usize) -> CatalogResult<Vec<Movie>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM movies ORDER BY (updated_at IS NULL) ASC, updated_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| Movie::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> CatalogResult<usize> {
        let conn = self.open()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM movies", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn delete(&self, movie_id: &str) -> CatalogResult<()> {
        let conn = self.open()?;
        conn.execute("DELETE FROM movies WHERE movie_id = ?1", [movie_id])?;
        Ok(())
    }

    fn not_found(movie_id: &str) -> CatalogError {
        CatalogError::NotFound {
            movie_id: movie_id.to_string(),
        }
    }
}

impl MovieCatalog for SqliteMovieStore {
    fn fetch_movie(&self, movie_id: &str) -> CatalogResult<Option<Movie>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT * FROM movies WHERE movie_id = ?1")?;
        let movie = stmt
            .query_row([movie_id], |row| Movie::from_row(row))
            .optional()?;
        Ok(movie)
    }

    fn set_available_qualities(&self, movie_id: &str, qualities: &[String]) -> CatalogResult<()> {
        let conn = self.open()?;
        let affected = conn.execute(
            "UPDATE movies SET available_qualities = ?2, updated_at = CURRENT_TIMESTAMP
             WHERE movie_id = ?1",
            params![movie_id, Movie::serialize_qualities(qualities)],
        )?;
        if affected == 0 {
            return Err(Self::not_found(movie_id));
        }
        Ok(())
    }

    fn set_duration_if_unset(&self, movie_id: &str, seconds: i64) -> CatalogResult<bool> {
        let conn = self.open()?;
        let affected = conn.execute(
            "UPDATE movies SET video_duration_s = ?2, updated_at = CURRENT_TIMESTAMP
             WHERE movie_id = ?1 AND (video_duration_s IS NULL OR video_duration_s <= 0)",
            params![movie_id, seconds],
        )?;
        Ok(affected > 0)
    }

    /// The increment and the read back share one write transaction, so the
    /// returned count is always the one this call produced.
    fn increment_view_count(&self, movie_id: &str) -> CatalogResult<i64> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let affected = tx.execute(
            "UPDATE movies SET view_count = view_count + 1 WHERE movie_id = ?1",
            [movie_id],
        )?;
        if affected == 0 {
            return Err(Self::not_found(movie_id));
        }
        let count = tx.query_row(
            "SELECT view_count FROM movies WHERE movie_id = ?1",
            [movie_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(count)
    }
}
