/// Returned when nothing has been encoded yet. Callers treat it as "use the
/// legacy or raw source".
pub const NEUTRAL_QUALITY: &str = "720p";

/// Sentinel quality for a movie that only has its uploaded source.
pub const ORIGINAL_QUALITY: &str = "original";

const CANONICAL_ORDER: [&str; 3] = ["1080p", "720p", "360p"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityFallbackPicker {
    order: Vec<String>,
    neutral: String,
}

impl Default for QualityFallbackPicker {
    fn default() -> Self {
        Self {
            order: CANONICAL_ORDER.iter().map(|q| q.to_string()).collect(),
            neutral: NEUTRAL_QUALITY.to_string(),
        }
    }
}

impl QualityFallbackPicker {
    pub fn new(order: Vec<String>, neutral: impl Into<String>) -> Self {
        Self {
            order,
            neutral: neutral.into(),
        }
    }

    pub fn neutral(&self) -> &str {
        &self.neutral
    }

    /// Pure and deterministic: identical inputs always give the same answer.
    pub fn pick<S: AsRef<str>>(&self, available: &[S], preferred: &str) -> String {
        let Some(first) = available.first() else {
            return self.neutral.clone();
        };
        if available.iter().any(|q| q.as_ref() == preferred) {
            return preferred.to_string();
        }
        self.order
            .iter()
            .find(|candidate| available.iter().any(|q| q.as_ref() == candidate.as_str()))
            .cloned()
            .unwrap_or_else(|| first.as_ref().to_string())
    }
}

pub fn pick_quality<S: AsRef<str>>(available: &[S], preferred: &str) -> String {
    QualityFallbackPicker::default().pick(available, preferred)
}
