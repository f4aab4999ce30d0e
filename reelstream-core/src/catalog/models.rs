use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub movie_id: String,
    pub title: Option<String>,
    /// Raw stored reference to the uploaded file: an absolute URL, an
    /// already-routed path or a bare filename.
    pub video_url: Option<String>,
    pub streaming_url: Option<String>,
    pub video_quality: Option<String>,
    pub download_enabled: bool,
    pub max_download_quality: Option<String>,
    pub available_qualities: Vec<String>,
    pub video_duration_s: Option<i64>,
    pub view_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Movie {
    pub fn new(movie_id: impl Into<String>) -> Self {
        Self {
            movie_id: movie_id.into(),
            title: None,
            video_url: None,
            streaming_url: None,
            video_quality: None,
            download_enabled: false,
            max_download_quality: None,
            available_qualities: Vec::new(),
            video_duration_s: None,
            view_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: Option<NaiveDateTime> = row.get("created_at")?;
        let updated_at: Option<NaiveDateTime> = row.get("updated_at")?;
        let qualities: Option<String> = row.get("available_qualities")?;
        Ok(Self {
            movie_id: row.get("movie_id")?,
            title: row.get("title")?,
            video_url: row.get("video_url")?,
            streaming_url: row.get("streaming_url")?,
            video_quality: row.get("video_quality")?,
            download_enabled: row.get::<_, Option<i64>>("download_enabled")?.unwrap_or(0) != 0,
            max_download_quality: row.get("max_download_quality")?,
            available_qualities: qualities
                .map(|value| Self::parse_qualities(&value))
                .unwrap_or_default(),
            video_duration_s: row.get("video_duration_s")?,
            view_count: row.get::<_, Option<i64>>("view_count")?.unwrap_or(0),
            created_at: created_at.map(|dt| Utc.from_utc_datetime(&dt)),
            updated_at: updated_at.map(|dt| Utc.from_utc_datetime(&dt)),
        })
    }

    pub fn serialize_qualities(qualities: &[String]) -> Option<String> {
        if qualities.is_empty() {
            None
        } else {
            Some(qualities.join(","))
        }
    }

    pub fn parse_qualities(value: &str) -> Vec<String> {
        value
            .split(',')
            .filter(|item| !item.trim().is_empty())
            .map(|item| item.trim().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualities_serialize_as_csv() {
        let qualities = vec!["1080p".to_string(), "360p".to_string()];
        let csv = Movie::serialize_qualities(&qualities).unwrap();
        assert_eq!(csv, "1080p,360p");
        assert_eq!(Movie::parse_qualities(&csv), qualities);
        assert_eq!(Movie::serialize_qualities(&[]), None);
        assert_eq!(Movie::parse_qualities(" 720p , ,"), vec!["720p".to_string()]);
    }
}
