use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{tool} failed: {reason}")]
    Tool { tool: &'static str, reason: String },
    #[error("unparseable {what}: {detail}")]
    Parse { what: &'static str, detail: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Seam over the external media-analysis tool. Implementations run the
/// actual binaries; all output parsing happens in this crate.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Container/stream probe of the URL, as the tool's JSON document.
    async fn probe(&self, url: &str) -> Result<serde_json::Value, AnalysisError>;

    /// Run a volume-detection filter pass over the URL's audio track and
    /// return the tool's diagnostic output (stderr).
    async fn volume_detect(&self, url: &str) -> Result<String, AnalysisError>;

    /// Write a single scaled JPEG frame from the URL to `out`.
    async fn grab_frame(&self, url: &str, out: &Path) -> Result<(), AnalysisError>;
}

/// ffprobe/ffmpeg-backed toolkit.
pub struct FfmpegToolkit {
    ffprobe: String,
    ffmpeg: String,
}

impl FfmpegToolkit {
    pub fn new() -> Self {
        Self {
            ffprobe: "ffprobe".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }

    pub fn with_commands(ffprobe: impl Into<String>, ffmpeg: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe(&self, url: &str) -> Result<serde_json::Value, AnalysisError> {
        debug!(url, "Probing segment");
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
                url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AnalysisError::Tool {
                tool: "ffprobe",
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(AnalysisError::Tool {
                tool: "ffprobe",
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| AnalysisError::Parse {
            what: "probe output",
            detail: e.to_string(),
        })
    }

    async fn volume_detect(&self, url: &str) -> Result<String, AnalysisError> {
        debug!(url, "Measuring loudness");
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-i", url, "-af", "volumedetect", "-f", "null", "-"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AnalysisError::Tool {
                tool: "ffmpeg",
                reason: e.to_string(),
            })?;

        // volumedetect reports on stderr even on success.
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(AnalysisError::Tool {
                tool: "ffmpeg",
                reason: stderr.trim().to_string(),
            });
        }
        Ok(stderr)
    }

    async fn grab_frame(&self, url: &str, out: &Path) -> Result<(), AnalysisError> {
        debug!(url, out = %out.display(), "Extracting thumbnail");
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-y", "-ss", "0.5", "-i", url])
            .args(["-frames:v", "1", "-vf", "scale=320:-1", "-q:v", "5"])
            .arg(out)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AnalysisError::Tool {
                tool: "ffmpeg",
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(AnalysisError::Tool {
                tool: "ffmpeg",
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
