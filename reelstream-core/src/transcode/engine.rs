use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, Lines};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TranscodeSection;
use crate::quality::QualityProfile;

use super::error::{EngineError, EngineResult};

/// Receives encode progress as a percentage in `0..=100`.
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceMetadata {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: Option<f64>,
    pub video_codec: Option<String>,
}

/// The external encoder, treated as a black box.
#[async_trait]
pub trait CodecEngine: Send + Sync {
    async fn open_source(&self, path: &Path) -> EngineResult<SourceMetadata>;

    /// Encode `source` to `output` at the profile's geometry and bitrate.
    /// Implementations stop promptly once `cancel` fires and return
    /// [`EngineError::Cancelled`].
    async fn encode(
        &self,
        source: &SourceMetadata,
        profile: &QualityProfile,
        output: &Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> EngineResult<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    preset: String,
    audio_bitrate_kbps: u32,
    container: String,
    timeout: Option<Duration>,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::from_config(&TranscodeSection::default())
    }
}

impl FfmpegEngine {
    pub fn from_config(section: &TranscodeSection) -> Self {
        Self {
            ffmpeg: PathBuf::from(&section.ffmpeg_binary),
            ffprobe: PathBuf::from(&section.ffprobe_binary),
            preset: section.preset.clone(),
            audio_bitrate_kbps: section.audio_bitrate_kbps,
            container: section.container.clone(),
            timeout: section.encode_timeout_seconds.map(Duration::from_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn encode_args(
        &self,
        source: &SourceMetadata,
        profile: &QualityProfile,
        output: &Path,
    ) -> Vec<String> {
        let kbps = profile.target_bitrate_kbps;
        let (video_codec, audio_codec) = match self.container.as_str() {
            "webm" => ("libvpx-vp9", "libopus"),
            _ => ("libx264", "aac"),
        };
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            source.path.to_string_lossy().to_string(),
            "-vf".to_string(),
            format!(
                "scale=w={}:h={}:force_original_aspect_ratio=decrease:force_divisible_by=2",
                profile.width, profile.height
            ),
            "-c:v".to_string(),
            video_codec.to_string(),
        ];
        if video_codec == "libx264" {
            args.push("-preset".to_string());
            args.push(self.preset.clone());
        }
        args.extend([
            "-b:v".to_string(),
            format!("{kbps}k"),
            "-maxrate".to_string(),
            format!("{}k", kbps + kbps / 10),
            "-bufsize".to_string(),
            format!("{}k", kbps * 2),
            "-c:a".to_string(),
            audio_codec.to_string(),
            "-b:a".to_string(),
            format!("{}k", self.audio_bitrate_kbps),
        ]);
        if self.container == "mp4" {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }
        args.extend([
            "-progress".to_string(),
            "pipe:1".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    codec_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

enum Drive {
    Finished(std::io::Result<()>),
    TimedOut(Duration),
    Cancelled,
}

#[async_trait]
impl CodecEngine for FfmpegEngine {
    async fn open_source(&self, path: &Path) -> EngineResult<SourceMetadata> {
        let unreadable = |reason: String| EngineError::Unreadable {
            path: path.to_path_buf(),
            reason,
        };
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|err| unreadable(err.to_string()))?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(unreadable("not a non-empty regular file".to_string()));
        }

        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-show_entries")
            .arg("stream=width,height,codec_name:format=duration")
            .arg("-of")
            .arg("json")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                program: self.ffprobe.to_string_lossy().to_string(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(unreadable(format!("ffprobe failed: {stderr}")));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|err| unreadable(format!("invalid ffprobe output: {err}")))?;
        let stream = probe
            .streams
            .into_iter()
            .find(|stream| stream.width.is_some() && stream.height.is_some())
            .ok_or_else(|| unreadable("no video stream".to_string()))?;
        let duration_seconds = probe
            .format
            .and_then(|format| format.duration)
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0);

        Ok(SourceMetadata {
            path: path.to_path_buf(),
            width: stream.width.unwrap_or_default(),
            height: stream.height.unwrap_or_default(),
            duration_seconds,
            video_codec: stream.codec_name,
        })
    }

    async fn encode(
        &self,
        source: &SourceMetadata,
        profile: &QualityProfile,
        output: &Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> EngineResult<()> {
        let args = self.encode_args(source, profile, output);
        debug!(quality = %profile.name, args = ?args, "launching ffmpeg");
        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.ffmpeg.to_string_lossy().to_string(),
                source,
            })?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer).await;
                buffer
            })
        });
        let stdout = child.stdout.take().ok_or_else(|| EngineError::Io {
            path: output.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "ffmpeg stdout missing"),
        })?;
        let mut lines = BufReader::new(stdout).lines();

        let reading = read_progress(&mut lines, &progress, source.duration_seconds);
        let timeout = self.timeout;
        let driven = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, reading).await {
                    Ok(result) => Drive::Finished(result),
                    Err(_) => Drive::TimedOut(limit),
                },
                None => Drive::Finished(reading.await),
            }
        };
        let drive = tokio::select! {
            _ = cancel.cancelled() => Drive::Cancelled,
            outcome = driven => outcome,
        };

        let failure = match drive {
            Drive::Finished(Ok(())) => None,
            Drive::Finished(Err(source)) => Some(EngineError::Io {
                path: output.to_path_buf(),
                source,
            }),
            Drive::TimedOut(limit) => Some(EngineError::TimedOut(limit)),
            Drive::Cancelled => Some(EngineError::Cancelled),
        };
        if let Some(error) = failure {
            if let Err(err) = child.kill().await {
                warn!(quality = %profile.name, error = %err, "failed to kill ffmpeg");
            }
            remove_partial(output).await;
            return Err(error);
        }

        let status = child.wait().await.map_err(|source| EngineError::Io {
            path: output.to_path_buf(),
            source,
        })?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if !status.success() {
            remove_partial(output).await;
            return Err(EngineError::Failed {
                status: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => {
                progress(100);
                Ok(())
            }
            _ => Err(EngineError::MissingOutput(output.to_path_buf())),
        }
    }
}

async fn read_progress<R>(
    lines: &mut Lines<BufReader<R>>,
    progress: &ProgressSink,
    duration_seconds: Option<f64>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        if let Some(percent) = parse_progress_line(&line, duration_seconds) {
            progress(percent);
        }
    }
    Ok(())
}

/// Interprets one `-progress` line. Mid-encode values stop at 99; only the
/// final `progress=end` marker reports 100.
pub fn parse_progress_line(line: &str, duration_seconds: Option<f64>) -> Option<u8> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "progress" if value == "end" => Some(100),
        // Despite the name, ffmpeg reports out_time_ms in microseconds.
        "out_time_us" | "out_time_ms" => {
            let total = duration_seconds.filter(|d| *d > 0.0)?;
            let micros = value.parse::<f64>().ok()?;
            let percent = (micros / 1_000_000.0 / total * 100.0).floor();
            Some(percent.clamp(0.0, 99.0) as u8)
        }
        _ => None,
    }
}

async fn remove_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %output.display(), error = %err, "failed to remove partial output"),
    }
}
