use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::variants::EncodingStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeRequest {
    pub movie_id: String,
    pub source_path: PathBuf,
    pub original_file_name: String,
}

impl TranscodeRequest {
    pub fn new(
        movie_id: impl Into<String>,
        source_path: impl Into<PathBuf>,
        original_file_name: impl Into<String>,
    ) -> Self {
        Self {
            movie_id: movie_id.into(),
            source_path: source_path.into(),
            original_file_name: original_file_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    /// Every profile was attempted; individual qualities may still have
    /// failed.
    Completed,
    Cancelled,
    /// Nothing was attempted, e.g. the source could not be read.
    InfrastructureFailure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::InfrastructureFailure => "infrastructure_failure",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityOutcome {
    pub quality: String,
    pub status: EncodingStatus,
    pub url: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl QualityOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == EncodingStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeReport {
    pub job_id: String,
    pub movie_id: String,
    pub source_path: PathBuf,
    pub original_file_name: String,
    pub status: JobStatus,
    pub outcomes: Vec<QualityOutcome>,
    pub available_qualities: Vec<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl TranscodeReport {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn outcome(&self, quality: &str) -> Option<&QualityOutcome> {
        self.outcomes.iter().find(|outcome| outcome.quality == quality)
    }

    pub fn completed_qualities(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.succeeded())
            .map(|outcome| outcome.quality.as_str())
            .collect()
    }

    pub fn failed_qualities(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.succeeded())
            .map(|outcome| outcome.quality.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QualityProgress {
    pub status: EncodingStatus,
    pub progress: u8,
}

/// Point-in-time view of a running job, published through its handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSnapshot {
    pub job_id: String,
    pub movie_id: String,
    pub status: JobStatus,
    pub qualities: BTreeMap<String, QualityProgress>,
}

impl JobSnapshot {
    pub fn new(job_id: impl Into<String>, movie_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            movie_id: movie_id.into(),
            status: JobStatus::Running,
            qualities: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, quality: &str, status: EncodingStatus, progress: u8) {
        self.qualities.insert(
            quality.to_string(),
            QualityProgress {
                status,
                progress: progress.min(100),
            },
        );
    }

    pub fn settled(&self) -> bool {
        self.status != JobStatus::Running
    }
}
