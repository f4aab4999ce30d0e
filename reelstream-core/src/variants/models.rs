use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::quality::QualityProfile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EncodingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EncodingStatus {
    pub const ALL: [EncodingStatus; 4] = [
        EncodingStatus::Pending,
        EncodingStatus::Processing,
        EncodingStatus::Completed,
        EncodingStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingStatus::Pending => "pending",
            EncodingStatus::Processing => "processing",
            EncodingStatus::Completed => "completed",
            EncodingStatus::Failed => "failed",
        }
    }

    pub fn terminal(&self) -> bool {
        matches!(self, EncodingStatus::Completed | EncodingStatus::Failed)
    }

    /// Any state may be reset to `Pending` by a fresh job; everything else
    /// moves strictly forward.
    pub fn can_transition_to(&self, next: EncodingStatus) -> bool {
        use EncodingStatus::*;
        match (self, next) {
            (_, Pending) => true,
            (Pending, Processing) | (Pending, Failed) => true,
            (Processing, Completed) | (Processing, Failed) => true,
            _ => false,
        }
    }

    /// States a row may hold for a forward move into `next`. Resets to
    /// `Pending` are not forward moves and are excluded.
    pub fn predecessors(next: EncodingStatus) -> impl Iterator<Item = EncodingStatus> {
        Self::ALL
            .into_iter()
            .filter(move |from| *from != next && from.can_transition_to(next))
    }
}

impl fmt::Display for EncodingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EncodingStatus::Pending),
            "processing" => Ok(EncodingStatus::Processing),
            "completed" => Ok(EncodingStatus::Completed),
            "failed" => Ok(EncodingStatus::Failed),
            other => Err(format!("unknown encoding status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    pub movie_id: String,
    pub quality: String,
}

impl VariantKey {
    pub fn new(movie_id: impl Into<String>, quality: impl Into<String>) -> Self {
        Self {
            movie_id: movie_id.into(),
            quality: quality.into(),
        }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.movie_id, self.quality)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoVariant {
    pub movie_id: String,
    pub quality: String,
    pub width: u32,
    pub height: u32,
    pub url: Option<String>,
    pub format: String,
    pub file_size_bytes: Option<i64>,
    pub bitrate_kbps: u32,
    pub duration_seconds: Option<f64>,
    pub checksum_sha256: Option<String>,
    pub is_available: bool,
    pub encoding_status: EncodingStatus,
    pub encoding_progress: u8,
    pub error_message: Option<String>,
    pub job_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl VideoVariant {
    pub fn new(movie_id: impl Into<String>, quality: impl Into<String>) -> Self {
        Self {
            movie_id: movie_id.into(),
            quality: quality.into(),
            width: 0,
            height: 0,
            url: None,
            format: "mp4".to_string(),
            file_size_bytes: None,
            bitrate_kbps: 0,
            duration_seconds: None,
            checksum_sha256: None,
            is_available: false,
            encoding_status: EncodingStatus::Pending,
            encoding_progress: 0,
            error_message: None,
            job_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Fresh `Pending` row for a profile, as written at the start of a job.
    pub fn pending_for(
        movie_id: impl Into<String>,
        profile: &QualityProfile,
        format: impl Into<String>,
    ) -> Self {
        let mut variant = Self::new(movie_id, profile.name.clone());
        variant.width = profile.width;
        variant.height = profile.height;
        variant.bitrate_kbps = profile.target_bitrate_kbps;
        variant.format = format.into();
        variant
    }

    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.movie_id.clone(), self.quality.clone())
    }

    /// Playable means both flags agree; a row mid-transition never counts.
    pub fn is_playable(&self) -> bool {
        self.is_available
            && self.encoding_status == EncodingStatus::Completed
            && self.url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: Option<NaiveDateTime> = row.get("created_at")?;
        let updated_at: Option<NaiveDateTime> = row.get("updated_at")?;
        Ok(Self {
            movie_id: row.get("movie_id")?,
            quality: row.get("quality")?,
            width: row.get::<_, i64>("width")?.max(0) as u32,
            height: row.get::<_, i64>("height")?.max(0) as u32,
            url: row.get("url")?,
            format: row.get("format")?,
            file_size_bytes: row.get("file_size_bytes")?,
            bitrate_kbps: row.get::<_, i64>("bitrate_kbps")?.max(0) as u32,
            duration_seconds: row.get("duration_seconds")?,
            checksum_sha256: row.get("checksum_sha256")?,
            is_available: row.get::<_, i64>("is_available")? != 0,
            encoding_status: row
                .get::<_, String>("encoding_status")?
                .parse()
                .unwrap_or(EncodingStatus::Failed),
            encoding_progress: row.get::<_, i64>("encoding_progress")?.clamp(0, 100) as u8,
            error_message: row.get("error_message")?,
            job_id: row.get("job_id")?,
            created_at: created_at.map(|dt| Utc.from_utc_datetime(&dt)),
            updated_at: updated_at.map(|dt| Utc.from_utc_datetime(&dt)),
        })
    }
}

/// What a finished encode contributes to its row.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedArtifact {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub file_size_bytes: i64,
    pub checksum_sha256: Option<String>,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct VariantSummary {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
    pub available: usize,
    pub movies: usize,
}
