use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Movie, MovieCatalog};
use crate::config::ReelstreamConfig;
use crate::layout::{is_safe_segment, MediaLayout};
use crate::quality::{QualityFallbackPicker, ORIGINAL_QUALITY};
use crate::variants::{SqliteVariantStore, VideoVariant};

use super::error::{ResolveError, ResolveResult};
use super::legacy::LegacyOverrides;

/// Which rung of the lookup produced the URL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    RawVideo,
    LegacyOverride,
    StreamingUrl,
    Variant,
    FileProbe,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::RawVideo => "raw_video",
            ResolutionSource::LegacyOverride => "legacy_override",
            ResolutionSource::StreamingUrl => "streaming_url",
            ResolutionSource::Variant => "variant",
            ResolutionSource::FileProbe => "file_probe",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamResolution {
    pub movie_id: String,
    pub requested_quality: String,
    /// The quality picked against the registry, reported whichever rung
    /// supplied the URL.
    pub quality: String,
    pub url: String,
    pub source: ResolutionSource,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate_kbps: Option<u32>,
    pub duration_seconds: Option<f64>,
}

/// Read-only mapping from a movie and a requested quality to a playable URL.
#[derive(Debug, Clone)]
pub struct StreamResolver {
    variants: SqliteVariantStore,
    layout: MediaLayout,
    overrides: LegacyOverrides,
    picker: QualityFallbackPicker,
    probe_extensions: Vec<String>,
}

impl StreamResolver {
    pub fn new(variants: SqliteVariantStore, layout: MediaLayout) -> Self {
        let probe_extensions = vec![layout.container().to_string()];
        Self {
            variants,
            layout,
            overrides: LegacyOverrides::default(),
            picker: QualityFallbackPicker::default(),
            probe_extensions,
        }
    }

    pub fn from_config(config: &ReelstreamConfig, variants: SqliteVariantStore) -> Self {
        let streaming = &config.streaming;
        Self::new(variants, MediaLayout::from_config(config))
            .with_overrides(LegacyOverrides::from_entries(&config.legacy_overrides))
            .with_picker(QualityFallbackPicker::new(
                streaming.preference_order.clone(),
                streaming.default_quality.clone(),
            ))
            .with_probe_extensions(streaming.probe_extensions.clone())
    }

    pub fn with_layout(mut self, layout: MediaLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_overrides(mut self, overrides: LegacyOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_picker(mut self, picker: QualityFallbackPicker) -> Self {
        self.picker = picker;
        self
    }

    pub fn with_probe_extensions(mut self, extensions: Vec<String>) -> Self {
        if !extensions.is_empty() {
            self.probe_extensions = extensions;
        }
        self
    }

    pub fn variants(&self) -> &SqliteVariantStore {
        &self.variants
    }

    pub fn layout(&self) -> &MediaLayout {
        &self.layout
    }

    pub fn picker(&self) -> &QualityFallbackPicker {
        &self.picker
    }

    /// Registry-backed quality choice: the picker over available variants,
    /// then the movie's single legacy quality, then `original`.
    pub fn effective_quality(&self, movie: &Movie, requested: &str) -> ResolveResult<String> {
        let available = self.variants.available_qualities(&movie.movie_id)?;
        if !available.is_empty() {
            return Ok(self.picker.pick(&available, requested));
        }
        Ok(movie
            .video_quality
            .as_deref()
            .map(str::trim)
            .filter(|quality| !quality.is_empty())
            .unwrap_or(ORIGINAL_QUALITY)
            .to_string())
    }

    pub fn resolve_by_id(
        &self,
        catalog: &dyn MovieCatalog,
        movie_id: &str,
        requested: &str,
    ) -> ResolveResult<StreamResolution> {
        let movie = catalog
            .fetch_movie(movie_id)?
            .ok_or_else(|| ResolveError::MovieNotFound(movie_id.to_string()))?;
        self.resolve(&movie, requested)
    }

    /// Walks the lookup ladder and stops at the first usable URL.
    pub fn resolve(&self, movie: &Movie, requested: &str) -> ResolveResult<StreamResolution> {
        let movie_id = movie.movie_id.as_str();
        let quality = self.effective_quality(movie, requested)?;
        let found = |url: String, source: ResolutionSource| {
            debug!(movie_id = %movie_id, quality = %quality, source = source.as_str(), url = %url, "stream resolved");
            StreamResolution {
                movie_id: movie_id.to_string(),
                requested_quality: requested.to_string(),
                quality: quality.clone(),
                url,
                source,
                width: None,
                height: None,
                bitrate_kbps: None,
                duration_seconds: None,
            }
        };

        if let Some(url) = movie
            .video_url
            .as_deref()
            .and_then(|raw| self.layout.normalize_reference(movie_id, raw))
        {
            return Ok(found(url, ResolutionSource::RawVideo));
        }

        if let Some(url) = self.overrides.lookup(movie_id, &quality) {
            return Ok(found(url, ResolutionSource::LegacyOverride));
        }

        if let Some(url) = movie
            .streaming_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
        {
            return Ok(found(url.to_string(), ResolutionSource::StreamingUrl));
        }

        if let Some(variant) = self.playable_variant(movie_id, &quality)? {
            let url = variant.url.clone().unwrap_or_default();
            let mut resolution = found(url, ResolutionSource::Variant);
            resolution.width = Some(variant.width);
            resolution.height = Some(variant.height);
            resolution.bitrate_kbps = Some(variant.bitrate_kbps);
            resolution.duration_seconds = variant.duration_seconds;
            return Ok(resolution);
        }

        if let Some(url) = self.probe_files(movie_id, &quality) {
            return Ok(found(url, ResolutionSource::FileProbe));
        }

        debug!(movie_id = %movie_id, requested = %requested, quality = %quality, "no stream source");
        Err(ResolveError::NotStreamable {
            movie_id: movie_id.to_string(),
            quality,
        })
    }

    fn playable_variant(&self, movie_id: &str, quality: &str) -> ResolveResult<Option<VideoVariant>> {
        Ok(self
            .variants
            .get(movie_id, quality)?
            .filter(VideoVariant::is_playable))
    }

    fn probe_files(&self, movie_id: &str, quality: &str) -> Option<String> {
        if !is_safe_segment(movie_id) || !is_safe_segment(quality) {
            return None;
        }
        let dir = self.layout.movie_dir(movie_id);
        self.probe_extensions.iter().find_map(|extension| {
            let file_name = self.layout.artifact_name(movie_id, quality, extension);
            let candidate = dir.join(&file_name);
            match std::fs::metadata(&candidate) {
                Ok(meta) if meta.is_file() => Some(self.layout.public_url(movie_id, &file_name)),
                _ => None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(dir: &std::path::Path) -> StreamResolver {
        let variants = SqliteVariantStore::new(dir.join("variants.sqlite")).unwrap();
        variants.initialize().unwrap();
        StreamResolver::new(
            variants,
            MediaLayout::new(dir.join("videos"), "/videos/stream", "/api", "mp4"),
        )
    }

    #[test]
    fn quality_falls_back_to_movie_field_then_original() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());
        let mut movie = Movie::new("5");
        assert_eq!(resolver.effective_quality(&movie, "1080p").unwrap(), "original");
        movie.video_quality = Some("480p".into());
        assert_eq!(resolver.effective_quality(&movie, "1080p").unwrap(), "480p");
    }

    #[test]
    fn source_names_are_stable() {
        assert_eq!(ResolutionSource::FileProbe.as_str(), "file_probe");
        assert_eq!(
            serde_json::to_string(&ResolutionSource::LegacyOverride).unwrap(),
            "\"legacy_override\""
        );
    }
}
