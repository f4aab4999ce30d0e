use std::path::{Path, PathBuf};

use url::Url;

use crate::config::ReelstreamConfig;

/// Where artifacts live on disk and how they are addressed publicly.
///
/// Artifacts are `{movie_id}_{quality}.{container}` inside a directory named
/// after the movie; the public form is `{public_prefix}/{movie_id}/{file}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLayout {
    storage_root: PathBuf,
    public_prefix: String,
    api_prefix: String,
    container: String,
}

impl MediaLayout {
    pub fn new(
        storage_root: impl Into<PathBuf>,
        public_prefix: impl Into<String>,
        api_prefix: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            storage_root: storage_root.into(),
            public_prefix: trim_trailing_slash(public_prefix.into()),
            api_prefix: trim_trailing_slash(api_prefix.into()),
            container: container.into(),
        }
    }

    pub fn from_config(config: &ReelstreamConfig) -> Self {
        Self::new(
            config.storage_dir(),
            config.streaming.public_prefix.clone(),
            config.streaming.api_prefix.clone(),
            config.transcode.container.clone(),
        )
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn movie_dir(&self, movie_id: &str) -> PathBuf {
        self.storage_root.join(movie_id)
    }

    pub fn artifact_name(&self, movie_id: &str, quality: &str, extension: &str) -> String {
        format!("{movie_id}_{quality}.{extension}")
    }

    pub fn artifact_path(&self, movie_id: &str, quality: &str) -> PathBuf {
        self.movie_dir(movie_id)
            .join(self.artifact_name(movie_id, quality, &self.container))
    }

    pub fn public_url(&self, movie_id: &str, file_name: &str) -> String {
        format!("{}/{}/{}", self.public_prefix, movie_id, file_name)
    }

    pub fn variant_url(&self, movie_id: &str, quality: &str) -> String {
        self.public_url(
            movie_id,
            &self.artifact_name(movie_id, quality, &self.container),
        )
    }

    /// Turns a raw stored video reference into something a player can
    /// fetch. Absolute URLs and rooted paths pass through; an API path
    /// missing its leading slash gets one; anything else is treated as a
    /// file inside the movie's directory.
    pub fn normalize_reference(&self, movie_id: &str, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(parsed) = Url::parse(raw) {
            if matches!(parsed.scheme(), "http" | "https") {
                return Some(raw.to_string());
            }
        }
        if raw.starts_with('/') {
            return Some(raw.to_string());
        }
        let api = self.api_prefix.trim_start_matches('/');
        if !api.is_empty() && raw.starts_with(&format!("{api}/")) {
            return Some(format!("/{raw}"));
        }
        let file_name = raw
            .rsplit(|c| c == '/' || c == '\\')
            .find(|part| !part.is_empty())?;
        if !is_safe_segment(movie_id) {
            return None;
        }
        Some(self.public_url(movie_id, file_name))
    }
}

/// A path segment that cannot escape its parent directory.
pub fn is_safe_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
}

fn trim_trailing_slash(value: String) -> String {
    let trimmed = value.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> MediaLayout {
        MediaLayout::new("/srv/videos", "/videos/stream/", "/api", "mp4")
    }

    #[test]
    fn artifacts_follow_naming_convention() {
        let layout = layout();
        assert_eq!(
            layout.artifact_path("12", "720p"),
            PathBuf::from("/srv/videos/12/12_720p.mp4")
        );
        assert_eq!(layout.variant_url("12", "720p"), "/videos/stream/12/12_720p.mp4");
    }

    #[test]
    fn normalize_handles_each_reference_shape() {
        let layout = layout();
        assert_eq!(
            layout.normalize_reference("12", "https://cdn.example.com/a.mp4").as_deref(),
            Some("https://cdn.example.com/a.mp4")
        );
        assert_eq!(
            layout.normalize_reference("12", "/api/videos/12/raw").as_deref(),
            Some("/api/videos/12/raw")
        );
        assert_eq!(
            layout.normalize_reference("12", "api/videos/12/raw").as_deref(),
            Some("/api/videos/12/raw")
        );
        assert_eq!(
            layout.normalize_reference("12", "upload-8831.mp4").as_deref(),
            Some("/videos/stream/12/upload-8831.mp4")
        );
        assert_eq!(
            layout.normalize_reference("12", "uploads\\tmp\\clip.mov").as_deref(),
            Some("/videos/stream/12/clip.mov")
        );
        assert_eq!(layout.normalize_reference("12", "   "), None);
    }

    #[test]
    fn unsafe_segments_are_rejected() {
        assert!(is_safe_segment("abc-123"));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment(""));
        assert_eq!(layout().normalize_reference("../etc", "clip.mp4"), None);
    }
}
