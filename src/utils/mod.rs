use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use url::Url;

use crate::config::Config;

/// Whether user input parses as an HTTP(S) URL. Anything else is still handed
/// to yt-dlp, which accepts bare video ids and search terms, but the console
/// warns about it.
pub fn looks_like_url(input: &str) -> bool {
    Url::parse(input)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Locate an executable on PATH
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&paths) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let candidate = dir.join(format!("{}.exe", name));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Open a directory in the platform file manager
pub fn open_in_file_manager(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Output folder does not exist: {}", path.display());
    }

    #[cfg(target_os = "windows")]
    let command = "explorer";
    #[cfg(target_os = "macos")]
    let command = "open";
    #[cfg(all(unix, not(target_os = "macos")))]
    let command = "xdg-open";

    std::process::Command::new(command)
        .arg(path)
        .spawn()
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(())
}

/// Check if the current environment has the required external tools
pub async fn check_dependencies(config: &Config) -> Vec<String> {
    let mut missing = Vec::new();

    let yt_dlp = config
        .tools
        .yt_dlp_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("yt-dlp"));
    if !check_command_available(&yt_dlp).await {
        missing.push("yt-dlp - required for all downloads".to_string());
    }

    let ffmpeg = config
        .tools
        .ffmpeg_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("ffmpeg"));
    if !check_command_available(&ffmpeg).await {
        missing.push("ffmpeg - required for MP3 conversion".to_string());
    }

    missing
}

/// Check if a command is available by running its --version
async fn check_command_available(command: &Path) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[test]
    fn test_looks_like_url() {
        assert!(looks_like_url("https://www.youtube.com/watch?v=123"));
        assert!(looks_like_url("http://example.com"));
        assert!(!looks_like_url("ftp://example.com"));
        assert!(!looks_like_url("dQw4w9WgXcQ"));
    }
}
