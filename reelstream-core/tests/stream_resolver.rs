use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use reelstream_core::{
    CompletedArtifact, LegacyOverrideEntry, LegacyOverrides, MediaLayout, Movie, MovieCatalog,
    PlaybackService, QualityProfileCatalog, ResolutionSource, ResolveError, SqliteMovieStore,
    SqliteVariantStore, StreamResolver, VideoVariant,
};

struct Fixture {
    dir: TempDir,
    variants: SqliteVariantStore,
    movies: SqliteMovieStore,
    profiles: QualityProfileCatalog,
    resolver: StreamResolver,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let variants = SqliteVariantStore::new(dir.path().join("variants.sqlite")).unwrap();
        variants.initialize().unwrap();
        let movies = SqliteMovieStore::new(dir.path().join("movies.sqlite")).unwrap();
        movies.initialize().unwrap();
        let overrides = LegacyOverrides::from_entries(&[LegacyOverrideEntry {
            movie_id: "1".into(),
            url_template: "/videos/stream/{movie_id}/movie_{movie_id}_{quality}.mp4".into(),
        }]);
        let resolver = StreamResolver::new(
            variants.clone(),
            MediaLayout::new(dir.path().join("videos"), "/videos/stream", "/api", "mp4"),
        )
        .with_overrides(overrides)
        .with_probe_extensions(vec!["mp4".into(), "webm".into()]);
        Self {
            dir,
            variants,
            movies,
            profiles: QualityProfileCatalog::default(),
            resolver,
        }
    }

    fn movie(&self, movie: Movie) -> Movie {
        self.movies.upsert_movie(&movie).unwrap();
        movie
    }

    fn encode(&self, movie_id: &str, quality: &str) {
        let profile = self.profiles.get(quality).unwrap();
        self.variants
            .reset_pending(&VideoVariant::pending_for(movie_id, profile, "mp4"))
            .unwrap();
        self.variants.mark_processing(movie_id, quality).unwrap();
        let artifact = CompletedArtifact {
            url: format!("/videos/stream/{movie_id}/{movie_id}_{quality}.mp4"),
            width: profile.width,
            height: profile.height,
            bitrate_kbps: profile.target_bitrate_kbps,
            file_size_bytes: 2048,
            checksum_sha256: None,
            duration_seconds: Some(5399.6),
        };
        self.variants
            .mark_completed(movie_id, quality, &artifact)
            .unwrap();
    }

    fn playback(&self) -> PlaybackService {
        PlaybackService::new(
            Arc::new(self.movies.clone()),
            self.resolver.clone(),
            self.profiles.clone(),
        )
    }
}

#[test]
fn raw_reference_wins_over_encoded_variants() {
    let fixture = Fixture::new();
    let mut movie = Movie::new("20");
    movie.video_url = Some("upload-20.mp4".into());
    let movie = fixture.movie(movie);
    fixture.encode("20", "720p");

    let resolution = fixture.resolver.resolve(&movie, "720p").unwrap();
    assert_eq!(resolution.source, ResolutionSource::RawVideo);
    assert_eq!(resolution.url, "/videos/stream/20/upload-20.mp4");
    assert_eq!(resolution.quality, "720p");
}

#[test]
fn absolute_and_api_references_pass_through() {
    let fixture = Fixture::new();
    let mut movie = Movie::new("21");
    movie.video_url = Some("https://cdn.example.net/21/master.mp4".into());
    let resolution = fixture.resolver.resolve(&movie, "720p").unwrap();
    assert_eq!(resolution.url, "https://cdn.example.net/21/master.mp4");

    movie.video_url = Some("api/videos/21/raw".into());
    let resolution = fixture.resolver.resolve(&movie, "720p").unwrap();
    assert_eq!(resolution.url, "/api/videos/21/raw");
}

#[test]
fn legacy_override_applies_to_its_movie_only() {
    let fixture = Fixture::new();
    let mut legacy = Movie::new("1");
    legacy.video_quality = Some("720p".into());
    legacy.streaming_url = Some("/cdn/ignored.m3u8".into());
    let resolution = fixture.resolver.resolve(&legacy, "1080p").unwrap();
    assert_eq!(resolution.source, ResolutionSource::LegacyOverride);
    assert_eq!(resolution.url, "/videos/stream/1/movie_1_720p.mp4");

    let mut other = Movie::new("11");
    other.streaming_url = Some("/cdn/11/index.m3u8".into());
    let resolution = fixture.resolver.resolve(&other, "1080p").unwrap();
    assert_eq!(resolution.source, ResolutionSource::StreamingUrl);
    assert_eq!(resolution.url, "/cdn/11/index.m3u8");
    assert_eq!(resolution.quality, "original");
}

#[test]
fn registry_lookup_falls_back_through_the_picker() {
    let fixture = Fixture::new();
    let movie = fixture.movie(Movie::new("30"));
    fixture.encode("30", "360p");
    fixture.encode("30", "1080p");

    let resolution = fixture.resolver.resolve(&movie, "720p").unwrap();
    assert_eq!(resolution.source, ResolutionSource::Variant);
    assert_eq!(resolution.quality, "1080p");
    assert_eq!(resolution.requested_quality, "720p");
    assert_eq!(resolution.url, "/videos/stream/30/30_1080p.mp4");
    assert_eq!(resolution.width, Some(1920));
    assert_eq!(resolution.bitrate_kbps, Some(5000));

    let exact = fixture.resolver.resolve(&movie, "360p").unwrap();
    assert_eq!(exact.quality, "360p");
    assert_eq!(exact.height, Some(360));
}

#[test]
fn files_on_disk_are_found_when_the_registry_is_empty() {
    let fixture = Fixture::new();
    let mut movie = Movie::new("40");
    movie.video_quality = Some("360p".into());
    let movie_dir = fixture.dir.path().join("videos").join("40");
    std::fs::create_dir_all(&movie_dir).unwrap();
    std::fs::write(movie_dir.join("40_360p.webm"), b"webm").unwrap();

    let resolution = fixture.resolver.resolve(&movie, "1080p").unwrap();
    assert_eq!(resolution.source, ResolutionSource::FileProbe);
    assert_eq!(resolution.url, "/videos/stream/40/40_360p.webm");
}

#[test]
fn unfinished_variants_are_never_streamed() {
    let fixture = Fixture::new();
    let mut movie = Movie::new("50");
    movie.video_quality = Some("720p".into());
    let profile = fixture.profiles.get("720p").unwrap();
    fixture
        .variants
        .reset_pending(&VideoVariant::pending_for("50", profile, "mp4"))
        .unwrap();
    fixture.variants.mark_processing("50", "720p").unwrap();

    let err = fixture.resolver.resolve(&movie, "720p").unwrap_err();
    match err {
        ResolveError::NotStreamable { movie_id, quality } => {
            assert_eq!(movie_id, "50");
            assert_eq!(quality, "720p");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn nothing_to_play_is_not_streamable() {
    let fixture = Fixture::new();
    let movie = fixture.movie(Movie::new("60"));
    assert!(matches!(
        fixture.resolver.resolve(&movie, "720p"),
        Err(ResolveError::NotStreamable { ref quality, .. }) if quality == "original"
    ));
    assert!(matches!(
        fixture.resolver.resolve_by_id(&fixture.movies, "missing", "720p"),
        Err(ResolveError::MovieNotFound(_))
    ));
}

#[test]
fn playback_start_counts_one_view_and_fills_duration() {
    let fixture = Fixture::new();
    fixture.movie(Movie::new("70"));
    fixture.encode("70", "720p");
    let playback = fixture.playback();

    let started = playback.start_playback("70", "720p").unwrap();
    assert_eq!(started.view_count, 1);
    assert_eq!(started.duration_recorded, Some(5400));
    assert_eq!(started.resolution.source, ResolutionSource::Variant);

    let again = playback.start_playback("70", "720p").unwrap();
    assert_eq!(again.view_count, 2);
    assert_eq!(again.duration_recorded, None);

    let movie = fixture.movies.fetch_movie("70").unwrap().unwrap();
    assert_eq!(movie.view_count, 2);
    assert_eq!(movie.video_duration_s, Some(5400));
}

#[test]
fn failed_resolution_does_not_count_a_view() {
    let fixture = Fixture::new();
    fixture.movie(Movie::new("71"));
    let playback = fixture.playback();

    assert!(playback.start_playback("71", "720p").is_err());
    let movie = fixture.movies.fetch_movie("71").unwrap().unwrap();
    assert_eq!(movie.view_count, 0);

    // Plain resolution has no side effects.
    fixture.encode("71", "360p");
    playback.resolve("71", "360p").unwrap();
    let movie = fixture.movies.fetch_movie("71").unwrap().unwrap();
    assert_eq!(movie.view_count, 0);
}

#[test]
fn downloads_respect_the_toggle_and_the_cap() {
    let fixture = Fixture::new();
    let mut movie = Movie::new("80");
    movie.download_enabled = true;
    movie.max_download_quality = Some("720p".into());
    fixture.movie(movie);
    for quality in ["360p", "720p", "1080p"] {
        fixture.encode("80", quality);
    }
    let playback = fixture.playback();

    assert_eq!(playback.resolve_download("80", Some("1080p")).unwrap().quality, "720p");
    assert_eq!(playback.resolve_download("80", Some("360p")).unwrap().quality, "360p");
    let best = playback.resolve_download("80", None).unwrap();
    assert_eq!(best.quality, "720p");
    assert_eq!(best.url, "/videos/stream/80/80_720p.mp4");
    assert_eq!(best.file_size_bytes, Some(2048));

    let mut locked = Movie::new("81");
    locked.download_enabled = false;
    fixture.movie(locked);
    fixture.encode("81", "720p");
    assert!(matches!(
        playback.resolve_download("81", None),
        Err(ResolveError::DownloadDisabled(_))
    ));

    let mut capped = Movie::new("82");
    capped.download_enabled = true;
    capped.max_download_quality = Some("360p".into());
    fixture.movie(capped);
    fixture.encode("82", "1080p");
    assert!(matches!(
        playback.resolve_download("82", None),
        Err(ResolveError::QualityNotDownloadable { .. })
    ));
}
