use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub mod ytdlp;

pub use ytdlp::YtDlpDownloader;

use crate::queue::StopSignal;
use crate::DownloadError;

/// Target media formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    /// Audio only, converted to MP3 by ffmpeg
    Mp3,
    /// Best video+audio, merged into an MP4 container
    Mp4,
}

impl MediaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Mp3 => "mp3",
            MediaFormat::Mp4 => "mp4",
        }
    }

    /// MP3 extraction runs the downloaded audio through ffmpeg
    pub fn needs_transcoder(&self) -> bool {
        matches!(self, MediaFormat::Mp3)
    }
}

impl std::fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bitrates outside this range are clamped before reaching yt-dlp
pub const MIN_BITRATE_KBPS: u32 = 32;
pub const MAX_BITRATE_KBPS: u32 = 320;

/// Per-job download configuration handed to the external downloader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOptions {
    /// Output format
    pub format: MediaFormat,

    /// Audio bitrate in kbps; only meaningful for MP3
    pub bitrate: Option<u32>,

    /// Directory downloaded files are written to
    pub output_dir: PathBuf,
}

impl DownloadOptions {
    /// Build options, clamping the bitrate to what ffmpeg will accept
    pub fn new(format: MediaFormat, bitrate: Option<u32>, output_dir: PathBuf) -> Self {
        let bitrate = bitrate.map(|requested| {
            let clamped = requested.clamp(MIN_BITRATE_KBPS, MAX_BITRATE_KBPS);
            if clamped != requested {
                tracing::warn!(
                    "Bitrate clamped from {} to {} kbps (supported range: {}-{})",
                    requested,
                    clamped,
                    MIN_BITRATE_KBPS,
                    MAX_BITRATE_KBPS
                );
            }
            clamped
        });

        Self {
            format,
            bitrate,
            output_dir,
        }
    }

    /// Bitrate to pass to the audio post-processor
    pub fn effective_bitrate(&self) -> u32 {
        self.bitrate.unwrap_or(192)
    }
}

/// Metadata probed from the external downloader without downloading
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Media title as reported by the platform
    pub title: Option<String>,

    /// Duration in seconds
    pub duration_secs: Option<f64>,

    /// Exact or approximate file size in bytes, when the platform reports one
    pub filesize: Option<u64>,
}

impl MediaInfo {
    /// Estimate the on-disk size of the finished file in bytes.
    ///
    /// MP3 size follows from duration and bitrate. MP4 uses the reported size
    /// when available, otherwise assumes a 5 Mbps stream.
    pub fn estimated_size(&self, options: &DownloadOptions) -> Option<u64> {
        match options.format {
            MediaFormat::Mp3 => {
                let duration = self.duration_secs?;
                let bits_per_sec = f64::from(options.effective_bitrate()) * 1000.0;
                Some((duration * bits_per_sec / 8.0) as u64)
            }
            MediaFormat::Mp4 => {
                if let Some(size) = self.filesize {
                    return Some(size);
                }
                let duration = self.duration_secs?;
                Some((duration * 5_000_000.0 / 8.0) as u64)
            }
        }
    }
}

/// Callback invoked with download progress in the range 0.0 to 1.0
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Contract with the external download engine.
///
/// Implementations must eventually terminate each call with success or a
/// descriptive error. Cancellation is cooperative: implementations that
/// support it watch `stop` while a download is in flight and return
/// [`DownloadError::Cancelled`]; others may ignore `stop` entirely and let
/// the job finish naturally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Verify the external tools needed for the given formats are installed
    fn check_tools(&self, formats: &[MediaFormat]) -> Result<(), DownloadError>;

    /// Fetch title/duration metadata without downloading
    async fn probe(&self, url: String) -> Result<MediaInfo, DownloadError>;

    /// Download one URL with the given options
    async fn download(
        &self,
        url: String,
        options: DownloadOptions,
        stop: StopSignal,
        progress: ProgressFn,
    ) -> Result<(), DownloadError>;
}
