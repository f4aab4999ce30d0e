use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};

use crate::sqlite::configure_connection;

use super::models::{
    CompletedArtifact, EncodingStatus, VariantKey, VariantSummary, VideoVariant,
};
use super::{RegistryError, RegistryResult};

const VARIANT_SCHEMA: &str = include_str!("../../../sql/variants.sql");

#[derive(Debug, Clone)]
pub struct SqliteVariantStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteVariantStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteVariantStoreBuilder {
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

    pub fn build(self) -> RegistryResult<SqliteVariantStore> {
        let path = self.path.ok_or(RegistryError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };

        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        Ok(SqliteVariantStore { path, flags })
    }
}

/// Durable registry of one row per (movie, quality).
///
/// Every call opens its own connection, so clones can be handed to encode
/// tasks freely. Each write is a single statement or an immediate
/// transaction; readers only ever see committed rows.
#[derive(Debug, Clone)]
pub struct SqliteVariantStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteVariantStore {
    pub fn builder() -> SqliteVariantStoreBuilder {
        SqliteVariantStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> RegistryResult<Self> {
        SqliteVariantStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> RegistryResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            RegistryError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| RegistryError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> RegistryResult<()> {
        let conn = self.open()?;
        conn.execute_batch(VARIANT_SCHEMA)?;
        Ok(())
    }

    /// Insert or overwrite the row for the variant's key. `is_available` is
    /// only persisted as true for completed rows.
    pub fn upsert(&self, variant: &VideoVariant) -> RegistryResult<()> {
        let conn = self.open()?;
        write_row(&conn, variant)
    }

    pub fn get(&self, movie_id: &str, quality: &str) -> RegistryResult<Option<VideoVariant>> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT * FROM video_variants WHERE movie_id = ?1 AND quality = ?2")?;
        let variant = stmt
            .query_row([movie_id, quality], |row| VideoVariant::from_row(row))
            .optional()?;
        Ok(variant)
    }

    pub fn list_by_movie(&self, movie_id: &str) -> RegistryResult<Vec<VideoVariant>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM video_variants
             WHERE movie_id = ?1
             ORDER BY height DESC, quality ASC",
        )?;
        let rows = stmt
            .query_map([movie_id], |row| VideoVariant::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The canonical "what can be streamed" view, best quality first.
    pub fn list_available_by_movie(&self, movie_id: &str) -> RegistryResult<Vec<VideoVariant>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM video_variants
             WHERE movie_id = ?1 AND is_available = 1 AND encoding_status = 'completed'
             ORDER BY height DESC, quality ASC",
        )?;
        let rows = stmt
            .query_map([movie_id], |row| VideoVariant::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn available_qualities(&self, movie_id: &str) -> RegistryResult<Vec<String>> {
        Ok(self
            .list_available_by_movie(movie_id)?
            .into_iter()
            .map(|variant| variant.quality)
            .collect())
    }

    pub fn list(&self, status: Option<EncodingStatus>, limit: usize) -> RegistryResult<Vec<VideoVariant>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM video_variants
             WHERE (?1 IS NULL OR encoding_status = ?1)
             ORDER BY updated_at DESC, movie_id ASC, height DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(
                (status.as_ref().map(EncodingStatus::as_str), limit as i64),
                |row| VideoVariant::from_row(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_by_movie(&self, movie_id: &str) -> RegistryResult<usize> {
        let conn = self.open()?;
        let removed = conn.execute("DELETE FROM video_variants WHERE movie_id = ?1", [movie_id])?;
        Ok(removed)
    }

    /// Start of a job: the row is reset to `Pending` whatever it held before.
    pub fn reset_pending(&self, variant: &VideoVariant) -> RegistryResult<()> {
        self.upsert(&pending_copy(variant))
    }

    /// Resets every given row to `Pending` under `job_id` in one
    /// transaction. Refused with `MovieBusy` while another job still owns a
    /// pending or processing row of the same movie.
    pub fn claim_for_job(&self, job_id: &str, variants: &[VideoVariant]) -> RegistryResult<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let movies: HashSet<&str> = variants.iter().map(|v| v.movie_id.as_str()).collect();
        let busy_sql = format!(
            "SELECT job_id FROM video_variants
             WHERE movie_id = ?1 AND {} AND (job_id IS NULL OR job_id <> ?2)
             LIMIT 1",
            active_guard()
        );
        for movie_id in movies {
            let owner: Option<Option<String>> = tx
                .query_row(&busy_sql, params![movie_id, job_id], |row| row.get(0))
                .optional()?;
            if let Some(owner) = owner {
                return Err(RegistryError::MovieBusy {
                    movie_id: movie_id.to_string(),
                    owner,
                });
            }
        }
        for variant in variants {
            let mut fresh = pending_copy(variant);
            fresh.job_id = Some(job_id.to_string());
            write_row(&tx, &fresh)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Writes scoped to one job's rows.
    pub fn for_job(&self, job_id: impl Into<String>) -> JobVariants {
        JobVariants {
            store: self.clone(),
            job_id: job_id.into(),
        }
    }

    pub fn mark_processing(&self, movie_id: &str, quality: &str) -> RegistryResult<()> {
        self.start_processing(movie_id, quality, None)
    }

    /// Returns false when the row has already left `Processing`; late
    /// progress reports are dropped rather than treated as errors.
    pub fn update_progress(&self, movie_id: &str, quality: &str, progress: u8) -> RegistryResult<bool> {
        self.record_progress(movie_id, quality, progress, None)
    }

    pub fn mark_completed(
        &self,
        movie_id: &str,
        quality: &str,
        artifact: &CompletedArtifact,
    ) -> RegistryResult<()> {
        self.complete(movie_id, quality, artifact, None)
    }

    pub fn mark_failed(&self, movie_id: &str, quality: &str, error: &str) -> RegistryResult<()> {
        self.fail(movie_id, quality, error, None)
    }

    /// Rows still `Pending` or `Processing` when no job is running belong to
    /// a process that died. They are failed so nothing waits on them forever.
    pub fn reconcile_interrupted(&self) -> RegistryResult<Vec<VariantKey>> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let keys = {
            let mut stmt = tx.prepare(&format!(
                "SELECT movie_id, quality FROM video_variants
                 WHERE {}
                 ORDER BY movie_id, quality",
                active_guard()
            ))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(VariantKey::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        tx.execute(
            &format!(
                "UPDATE video_variants
                 SET encoding_status = 'failed',
                     is_available = 0,
                     error_message = 'interrupted: no owning job after restart',
                     updated_at = CURRENT_TIMESTAMP
                 WHERE {}",
                active_guard()
            ),
            [],
        )?;
        tx.commit()?;
        Ok(keys)
    }

    pub fn summary(&self) -> RegistryResult<VariantSummary> {
        let conn = self.open()?;
        let mut by_status = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT encoding_status, COUNT(*) FROM video_variants GROUP BY encoding_status",
        )?;
        for row in stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })? {
            let (status, count) = row?;
            by_status.insert(status, count as usize);
        }
        let available: i64 = conn.query_row(
            "SELECT COUNT(*) FROM video_variants
             WHERE is_available = 1 AND encoding_status = 'completed'",
            [],
            |row| row.get(0),
        )?;
        let mut movies_stmt = conn.prepare("SELECT DISTINCT movie_id FROM video_variants")?;
        let movies = movies_stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(VariantSummary {
            total: by_status.values().copied().sum(),
            by_status,
            available: available as usize,
            movies: movies.len(),
        })
    }

    fn start_processing(
        &self,
        movie_id: &str,
        quality: &str,
        job_id: Option<&str>,
    ) -> RegistryResult<()> {
        let conn = self.open()?;
        let affected = conn.execute(
            &format!(
                "UPDATE video_variants
                 SET encoding_status = 'processing',
                     encoding_progress = 0,
                     is_available = 0,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE movie_id = ?1 AND quality = ?2 AND {}
                   AND (?3 IS NULL OR job_id = ?3)",
                forward_guard(EncodingStatus::Processing)
            ),
            params![movie_id, quality, job_id],
        )?;
        self.ensure_transition(&conn, affected, movie_id, quality, EncodingStatus::Processing, job_id)
    }

    fn record_progress(
        &self,
        movie_id: &str,
        quality: &str,
        progress: u8,
        job_id: Option<&str>,
    ) -> RegistryResult<bool> {
        let conn = self.open()?;
        let affected = conn.execute(
            "UPDATE video_variants
             SET encoding_progress = ?3, updated_at = CURRENT_TIMESTAMP
             WHERE movie_id = ?1 AND quality = ?2 AND encoding_status = 'processing'
               AND (?4 IS NULL OR job_id = ?4)",
            params![movie_id, quality, progress.min(100), job_id],
        )?;
        Ok(affected > 0)
    }

    fn complete(
        &self,
        movie_id: &str,
        quality: &str,
        artifact: &CompletedArtifact,
        job_id: Option<&str>,
    ) -> RegistryResult<()> {
        let conn = self.open()?;
        let affected = conn.execute(
            &format!(
                "UPDATE video_variants
                 SET encoding_status = 'completed',
                     encoding_progress = 100,
                     is_available = 1,
                     url = ?3,
                     width = ?4,
                     height = ?5,
                     bitrate_kbps = ?6,
                     file_size_bytes = ?7,
                     checksum_sha256 = ?8,
                     duration_seconds = COALESCE(?9, duration_seconds),
                     error_message = NULL,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE movie_id = ?1 AND quality = ?2 AND {}
                   AND (?10 IS NULL OR job_id = ?10)",
                forward_guard(EncodingStatus::Completed)
            ),
            params![
                movie_id,
                quality,
                &artifact.url,
                artifact.width,
                artifact.height,
                artifact.bitrate_kbps,
                artifact.file_size_bytes,
                &artifact.checksum_sha256,
                &artifact.duration_seconds,
                job_id,
            ],
        )?;
        self.ensure_transition(&conn, affected, movie_id, quality, EncodingStatus::Completed, job_id)
    }

    fn fail(
        &self,
        movie_id: &str,
        quality: &str,
        error: &str,
        job_id: Option<&str>,
    ) -> RegistryResult<()> {
        let conn = self.open()?;
        let affected = conn.execute(
            &format!(
                "UPDATE video_variants
                 SET encoding_status = 'failed',
                     is_available = 0,
                     error_message = ?3,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE movie_id = ?1 AND quality = ?2 AND {}
                   AND (?4 IS NULL OR job_id = ?4)",
                forward_guard(EncodingStatus::Failed)
            ),
            params![movie_id, quality, error, job_id],
        )?;
        self.ensure_transition(&conn, affected, movie_id, quality, EncodingStatus::Failed, job_id)
    }

    fn ensure_transition(
        &self,
        conn: &Connection,
        affected: usize,
        movie_id: &str,
        quality: &str,
        to: EncodingStatus,
        job_id: Option<&str>,
    ) -> RegistryResult<()> {
        if affected > 0 {
            return Ok(());
        }
        let current: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT encoding_status, job_id FROM video_variants
                 WHERE movie_id = ?1 AND quality = ?2",
                [movie_id, quality],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((status, owner)) = current else {
            return Err(RegistryError::NotFound {
                movie_id: movie_id.to_string(),
                quality: quality.to_string(),
            });
        };
        match job_id {
            Some(job_id) if owner.as_deref() != Some(job_id) => Err(RegistryError::Superseded {
                movie_id: movie_id.to_string(),
                quality: quality.to_string(),
                job_id: job_id.to_string(),
                owner,
            }),
            _ => Err(RegistryError::InvalidTransition {
                movie_id: movie_id.to_string(),
                quality: quality.to_string(),
                from: status.parse().unwrap_or(EncodingStatus::Failed),
                to,
            }),
        }
    }
}

/// Registry writes on behalf of a single job. Rows another job has since
/// claimed are left untouched and report `Superseded`.
#[derive(Debug, Clone)]
pub struct JobVariants {
    store: SqliteVariantStore,
    job_id: String,
}

impl JobVariants {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn mark_processing(&self, movie_id: &str, quality: &str) -> RegistryResult<()> {
        self.store
            .start_processing(movie_id, quality, Some(&self.job_id))
    }

    pub fn update_progress(&self, movie_id: &str, quality: &str, progress: u8) -> RegistryResult<bool> {
        self.store
            .record_progress(movie_id, quality, progress, Some(&self.job_id))
    }

    pub fn mark_completed(
        &self,
        movie_id: &str,
        quality: &str,
        artifact: &CompletedArtifact,
    ) -> RegistryResult<()> {
        self.store
            .complete(movie_id, quality, artifact, Some(&self.job_id))
    }

    pub fn mark_failed(&self, movie_id: &str, quality: &str, error: &str) -> RegistryResult<()> {
        self.store
            .fail(movie_id, quality, error, Some(&self.job_id))
    }
}

fn pending_copy(variant: &VideoVariant) -> VideoVariant {
    let mut fresh = variant.clone();
    fresh.encoding_status = EncodingStatus::Pending;
    fresh.encoding_progress = 0;
    fresh.is_available = false;
    fresh.url = None;
    fresh.file_size_bytes = None;
    fresh.checksum_sha256 = None;
    fresh.error_message = None;
    fresh
}

fn write_row(conn: &Connection, variant: &VideoVariant) -> RegistryResult<()> {
    let available = variant.is_available && variant.encoding_status == EncodingStatus::Completed;
    conn.execute(
        "INSERT INTO video_variants (
            movie_id, quality, width, height, url, format, file_size_bytes,
            bitrate_kbps, duration_seconds, checksum_sha256, is_available,
            encoding_status, encoding_progress, error_message, job_id
        ) VALUES (
            :movie_id, :quality, :width, :height, :url, :format, :file_size_bytes,
            :bitrate_kbps, :duration_seconds, :checksum_sha256, :is_available,
            :encoding_status, :encoding_progress, :error_message, :job_id
        )
        ON CONFLICT(movie_id, quality) DO UPDATE SET
            width = excluded.width,
            height = excluded.height,
            url = excluded.url,
            format = excluded.format,
            file_size_bytes = excluded.file_size_bytes,
            bitrate_kbps = excluded.bitrate_kbps,
            duration_seconds = excluded.duration_seconds,
            checksum_sha256 = excluded.checksum_sha256,
            is_available = excluded.is_available,
            encoding_status = excluded.encoding_status,
            encoding_progress = excluded.encoding_progress,
            error_message = excluded.error_message,
            job_id = excluded.job_id,
            updated_at = CURRENT_TIMESTAMP",
        rusqlite::named_params! {
            ":movie_id": &variant.movie_id,
            ":quality": &variant.quality,
            ":width": variant.width,
            ":height": variant.height,
            ":url": &variant.url,
            ":format": &variant.format,
            ":file_size_bytes": &variant.file_size_bytes,
            ":bitrate_kbps": variant.bitrate_kbps,
            ":duration_seconds": &variant.duration_seconds,
            ":checksum_sha256": &variant.checksum_sha256,
            ":is_available": if available { 1 } else { 0 },
            ":encoding_status": variant.encoding_status.as_str(),
            ":encoding_progress": variant.encoding_progress.min(100),
            ":error_message": &variant.error_message,
            ":job_id": &variant.job_id,
        },
    )?;
    Ok(())
}

fn status_in(statuses: impl Iterator<Item = EncodingStatus>) -> String {
    let list = statuses
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("encoding_status IN ({list})")
}

/// SQL guard admitting the rows allowed to move into `to`.
fn forward_guard(to: EncodingStatus) -> String {
    status_in(EncodingStatus::predecessors(to))
}

/// SQL guard admitting rows an encode still owns.
fn active_guard() -> String {
    status_in(EncodingStatus::ALL.into_iter().filter(|status| !status.terminal()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityProfile;

    fn store() -> (tempfile::TempDir, SqliteVariantStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVariantStore::new(dir.path().join("variants.sqlite")).unwrap();
        store.initialize().unwrap();
        (dir, store)
    }

    #[test]
    fn builder_requires_path() {
        assert!(matches!(
            SqliteVariantStore::builder().build(),
            Err(RegistryError::MissingStore)
        ));
    }

    #[test]
    fn upsert_never_persists_available_without_completion() {
        let (_dir, store) = store();
        let mut variant = VideoVariant::new("m1", "720p");
        variant.is_available = true;
        variant.encoding_status = EncodingStatus::Processing;
        store.upsert(&variant).unwrap();
        let stored = store.get("m1", "720p").unwrap().unwrap();
        assert!(!stored.is_available);
        assert_eq!(stored.encoding_status, EncodingStatus::Processing);
    }

    #[test]
    fn completed_requires_processing_first() {
        let (_dir, store) = store();
        let profile = QualityProfile::new("360p", 640, 360, 800);
        store
            .reset_pending(&VideoVariant::pending_for("m1", &profile, "mp4"))
            .unwrap();
        let artifact = CompletedArtifact {
            url: "/videos/stream/m1/m1_360p.mp4".into(),
            width: 640,
            height: 360,
            bitrate_kbps: 800,
            file_size_bytes: 10,
            checksum_sha256: None,
            duration_seconds: None,
        };
        let err = store.mark_completed("m1", "360p", &artifact).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidTransition {
                from: EncodingStatus::Pending,
                to: EncodingStatus::Completed,
                ..
            }
        ));
        assert!(matches!(
            store.mark_processing("m1", "480p"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn late_progress_is_ignored() {
        let (_dir, store) = store();
        let profile = QualityProfile::new("720p", 1280, 720, 2500);
        store
            .reset_pending(&VideoVariant::pending_for("m1", &profile, "mp4"))
            .unwrap();
        assert!(!store.update_progress("m1", "720p", 40).unwrap());
        store.mark_processing("m1", "720p").unwrap();
        assert!(store.update_progress("m1", "720p", 40).unwrap());
        store.mark_failed("m1", "720p", "boom").unwrap();
        assert!(!store.update_progress("m1", "720p", 80).unwrap());
        let row = store.get("m1", "720p").unwrap().unwrap();
        assert_eq!(row.encoding_progress, 40);
        assert_eq!(row.error_message.as_deref(), Some("boom"));
    }
}
