use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::{DownloadOptions, Downloader, MediaFormat, MediaInfo, ProgressFn};
use crate::config::Config;
use crate::queue::StopSignal;
use crate::utils;
use crate::DownloadError;

/// How often the stop signal is polled while a download is in flight
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// External downloader backed by the yt-dlp CLI (with ffmpeg for MP3 extraction)
pub struct YtDlpDownloader {
    yt_dlp: PathBuf,
    ffmpeg: Option<PathBuf>,
}

impl YtDlpDownloader {
    pub fn new() -> Self {
        Self {
            yt_dlp: PathBuf::from("yt-dlp"),
            ffmpeg: None,
        }
    }

    /// Use tool locations from the config file, falling back to PATH lookup
    pub fn from_config(config: &Config) -> Self {
        Self {
            yt_dlp: config
                .tools
                .yt_dlp_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("yt-dlp")),
            ffmpeg: config.tools.ffmpeg_path.clone(),
        }
    }

    /// Argument list for one download invocation
    fn build_args(&self, url: &str, options: &DownloadOptions) -> Vec<String> {
        let mut args = match options.format {
            MediaFormat::Mp3 => vec![
                "--format".to_string(),
                "bestaudio/best".to_string(),
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                format!("{}K", options.effective_bitrate()),
            ],
            MediaFormat::Mp4 => vec![
                "--format".to_string(),
                "bestvideo+bestaudio/best".to_string(),
                "--merge-output-format".to_string(),
                "mp4".to_string(),
            ],
        };

        if let Some(ffmpeg) = &self.ffmpeg {
            // yt-dlp wants the directory containing the ffmpeg binaries
            let location = if ffmpeg.is_dir() {
                ffmpeg.clone()
            } else {
                ffmpeg.parent().map(Path::to_path_buf).unwrap_or_else(|| ffmpeg.clone())
            };
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().into_owned());
        }

        args.push("--no-playlist".to_string());
        args.push("--newline".to_string());
        args.push("--progress-template".to_string());
        args.push("progress:%(progress._percent_str)s".to_string());
        args.push("--output".to_string());
        args.push(
            options
                .output_dir
                .join("%(title)s.%(ext)s")
                .to_string_lossy()
                .into_owned(),
        );
        args.push(url.to_string());

        args
    }
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    fn check_tools(&self, formats: &[MediaFormat]) -> Result<(), DownloadError> {
        if !tool_available(&self.yt_dlp) {
            return Err(DownloadError::ToolMissing("yt-dlp".to_string()));
        }

        if formats.iter().any(MediaFormat::needs_transcoder) {
            let ffmpeg = self
                .ffmpeg
                .clone()
                .unwrap_or_else(|| PathBuf::from("ffmpeg"));
            if !tool_available(&ffmpeg) {
                return Err(DownloadError::ToolMissing("ffmpeg".to_string()));
            }
        }

        Ok(())
    }

    async fn probe(&self, url: String) -> Result<MediaInfo, DownloadError> {
        tracing::debug!("Probing metadata for: {}", url);

        let output = Command::new(&self.yt_dlp)
            .args(["--dump-json", "--no-playlist", url.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DownloadError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::Failed(summarize_stderr(
                &stderr,
                output.status.code(),
            )));
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DownloadError::Failed(format!("unreadable yt-dlp metadata: {}", e)))?;

        Ok(MediaInfo {
            title: info["title"].as_str().map(|s| s.to_string()),
            duration_secs: info["duration"].as_f64(),
            filesize: info["filesize"]
                .as_u64()
                .or_else(|| info["filesize_approx"].as_u64()),
        })
    }

    async fn download(
        &self,
        url: String,
        options: DownloadOptions,
        stop: StopSignal,
        progress: ProgressFn,
    ) -> Result<(), DownloadError> {
        fs_err::create_dir_all(&options.output_dir)
            .map_err(|e| DownloadError::OutputDir(e.to_string()))?;

        let args = self.build_args(&url, &options);
        tracing::debug!("Running {} {:?}", self.yt_dlp.display(), args);

        let mut child = Command::new(&self.yt_dlp)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DownloadError::Spawn(e.to_string()))?;

        // Drain stderr concurrently so a chatty yt-dlp cannot block on the pipe
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Spawn("could not capture yt-dlp stdout".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        loop {
            if stop.is_set() {
                tracing::info!("Stop requested, killing yt-dlp");
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(DownloadError::Cancelled);
            }

            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            tracing::trace!("yt-dlp: {}", line);
                            if let Some(pct) = parse_progress_line(&line) {
                                progress(pct);
                            }
                        }
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }
                _ = tokio::time::sleep(STOP_POLL_INTERVAL) => {}
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::Spawn(e.to_string()))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if stop.is_set() && !status.success() {
            return Err(DownloadError::Cancelled);
        }

        if !status.success() {
            return Err(DownloadError::Failed(summarize_stderr(
                &stderr_output,
                status.code(),
            )));
        }

        progress(1.0);
        Ok(())
    }
}

/// Resolve whether a configured tool can actually be invoked
fn tool_available(path: &Path) -> bool {
    if path.components().count() > 1 {
        return path.exists();
    }
    utils::find_in_path(&path.to_string_lossy()).is_some()
}

/// Parse a percentage out of a `--progress-template` line, scaled to 0.0..=1.0
fn parse_progress_line(line: &str) -> Option<f32> {
    let rest = line.strip_prefix("progress:")?;
    let number = rest.trim().strip_suffix('%')?;
    let value = number.trim().parse::<f32>().ok()?;
    Some((value / 100.0).clamp(0.0, 1.0))
}

/// Reduce yt-dlp stderr to a one-line failure reason
fn summarize_stderr(stderr: &str, code: Option<i32>) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if let Some(error) = lines.iter().rev().find(|l| l.starts_with("ERROR")) {
        return error.to_string();
    }
    if let Some(last) = lines.last() {
        return last.to_string();
    }
    match code {
        Some(code) => format!("yt-dlp exited with status {}", code),
        None => "yt-dlp was terminated by a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp3_options(bitrate: Option<u32>) -> DownloadOptions {
        DownloadOptions::new(MediaFormat::Mp3, bitrate, PathBuf::from("/tmp/music"))
    }

    #[test]
    fn test_mp3_args() {
        let downloader = YtDlpDownloader::new();
        let args = downloader.build_args("https://youtu.be/abc", &mp3_options(Some(128)));

        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.contains(&"128K".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");

        let output_idx = args.iter().position(|a| a == "--output").unwrap();
        assert_eq!(args[output_idx + 1], "/tmp/music/%(title)s.%(ext)s");
    }

    #[test]
    fn test_mp4_args() {
        let downloader = YtDlpDownloader::new();
        let options =
            DownloadOptions::new(MediaFormat::Mp4, None, PathBuf::from("/tmp/videos"));
        let args = downloader.build_args("https://youtu.be/abc", &options);

        assert!(args.contains(&"bestvideo+bestaudio/best".to_string()));
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert!(!args.contains(&"--extract-audio".to_string()));
    }

    #[test]
    fn test_ffmpeg_location_forwarded() {
        let downloader = YtDlpDownloader {
            yt_dlp: PathBuf::from("yt-dlp"),
            ffmpeg: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
        };
        let args = downloader.build_args("https://youtu.be/abc", &mp3_options(None));

        let idx = args.iter().position(|a| a == "--ffmpeg-location").unwrap();
        assert_eq!(args[idx + 1], "/opt/ffmpeg/bin");
    }

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(parse_progress_line("progress:  42.5%"), Some(0.425));
        assert_eq!(parse_progress_line("progress: 100.0%"), Some(1.0));
        assert_eq!(parse_progress_line("[download] 42.5% of ~3MiB"), None);
        assert_eq!(parse_progress_line("progress: NA"), None);
    }

    #[test]
    fn test_summarize_stderr_prefers_error_line() {
        let stderr = "WARNING: slow connection\nERROR: Video unavailable\n";
        assert_eq!(summarize_stderr(stderr, Some(1)), "ERROR: Video unavailable");
    }

    #[test]
    fn test_summarize_stderr_falls_back_to_status() {
        assert_eq!(
            summarize_stderr("", Some(2)),
            "yt-dlp exited with status 2"
        );
    }
}
