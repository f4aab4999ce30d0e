use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::{Movie, MovieCatalog};
use crate::quality::QualityProfileCatalog;

use super::error::{ResolveError, ResolveResult};
use super::resolver::{StreamResolution, StreamResolver};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackStart {
    pub resolution: StreamResolution,
    pub view_count: i64,
    pub duration_recorded: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadResolution {
    pub movie_id: String,
    pub quality: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub file_size_bytes: Option<i64>,
    pub checksum_sha256: Option<String>,
}

/// Resolution plus the movie-side effects of a viewer actually starting
/// playback or asking for a file.
#[derive(Clone)]
pub struct PlaybackService {
    catalog: Arc<dyn MovieCatalog>,
    resolver: StreamResolver,
    profiles: Arc<QualityProfileCatalog>,
}

impl PlaybackService {
    pub fn new(
        catalog: Arc<dyn MovieCatalog>,
        resolver: StreamResolver,
        profiles: QualityProfileCatalog,
    ) -> Self {
        Self {
            catalog,
            resolver,
            profiles: Arc::new(profiles),
        }
    }

    pub fn resolver(&self) -> &StreamResolver {
        &self.resolver
    }

    /// Resolution without side effects.
    pub fn resolve(&self, movie_id: &str, requested: &str) -> ResolveResult<StreamResolution> {
        self.resolver
            .resolve_by_id(self.catalog.as_ref(), movie_id, requested)
    }

    /// The view is counted once, and only after resolution succeeded.
    pub fn start_playback(&self, movie_id: &str, requested: &str) -> ResolveResult<PlaybackStart> {
        let movie = self.fetch(movie_id)?;
        let resolution = self.resolver.resolve(&movie, requested)?;
        let view_count = self.catalog.increment_view_count(movie_id)?;
        let duration_recorded = self.record_duration(&movie, &resolution);
        info!(
            movie_id = %movie_id,
            quality = %resolution.quality,
            source = resolution.source.as_str(),
            view_count,
            "playback started"
        );
        Ok(PlaybackStart {
            resolution,
            view_count,
            duration_recorded,
        })
    }

    /// Picks the requested quality when it is both encoded and within the
    /// movie's download cap, otherwise the best variant that is.
    pub fn resolve_download(
        &self,
        movie_id: &str,
        requested: Option<&str>,
    ) -> ResolveResult<DownloadResolution> {
        let movie = self.fetch(movie_id)?;
        if !movie.download_enabled {
            return Err(ResolveError::DownloadDisabled(movie_id.to_string()));
        }
        let cap = movie
            .max_download_quality
            .as_deref()
            .map(str::trim)
            .filter(|cap| !cap.is_empty());
        let allowed: Option<Vec<&str>> = cap.map(|cap| {
            self.profiles
                .at_or_below(cap)
                .into_iter()
                .map(|profile| profile.name.as_str())
                .collect()
        });

        let candidates: Vec<_> = self
            .resolver
            .variants()
            .list_available_by_movie(movie_id)?
            .into_iter()
            .filter(|variant| variant.is_playable())
            .filter(|variant| {
                allowed
                    .as_ref()
                    .map_or(true, |names| names.contains(&variant.quality.as_str()))
            })
            .collect();
        let names: Vec<&str> = candidates.iter().map(|v| v.quality.as_str()).collect();
        let Some(best) = names.first() else {
            return Err(ResolveError::QualityNotDownloadable {
                movie_id: movie_id.to_string(),
                quality: requested.or(cap).unwrap_or("any").to_string(),
            });
        };
        let chosen = self.resolver.picker().pick(&names, requested.unwrap_or(*best));
        let variant = candidates
            .iter()
            .find(|variant| variant.quality == chosen)
            .unwrap_or(&candidates[0]);

        Ok(DownloadResolution {
            movie_id: movie_id.to_string(),
            quality: variant.quality.clone(),
            url: variant.url.clone().unwrap_or_default(),
            width: variant.width,
            height: variant.height,
            file_size_bytes: variant.file_size_bytes,
            checksum_sha256: variant.checksum_sha256.clone(),
        })
    }

    fn fetch(&self, movie_id: &str) -> ResolveResult<Movie> {
        self.catalog
            .fetch_movie(movie_id)?
            .ok_or_else(|| ResolveError::MovieNotFound(movie_id.to_string()))
    }

    /// First playback fills in a missing duration. Failures here never undo
    /// the view that was just counted.
    fn record_duration(&self, movie: &Movie, resolution: &StreamResolution) -> Option<i64> {
        if movie.video_duration_s.is_some_and(|seconds| seconds > 0) {
            return None;
        }
        let seconds = match resolution.duration_seconds {
            Some(seconds) => Some(seconds),
            None => self
                .resolver
                .variants()
                .list_available_by_movie(&movie.movie_id)
                .ok()?
                .into_iter()
                .find_map(|variant| variant.duration_seconds),
        }
        .filter(|seconds| *seconds >= 1.0)?
        .round() as i64;
        match self.catalog.set_duration_if_unset(&movie.movie_id, seconds) {
            Ok(true) => Some(seconds),
            Ok(false) => None,
            Err(err) => {
                warn!(movie_id = %movie.movie_id, error = %err, "failed to record movie duration");
                None
            }
        }
    }
}
