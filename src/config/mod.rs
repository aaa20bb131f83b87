use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::downloader::{MediaFormat, MAX_BITRATE_KBPS, MIN_BITRATE_KBPS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Download defaults
    pub downloads: DownloadsConfig,

    /// External tool locations
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadsConfig {
    /// Default output format
    pub format: MediaFormat,

    /// Default MP3 bitrate in kbps
    pub bitrate: u32,

    /// Directory finished files are written to
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Explicit yt-dlp location; looked up on PATH when unset
    pub yt_dlp_path: Option<PathBuf>,

    /// Explicit ffmpeg location; looked up on PATH when unset
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            downloads: DownloadsConfig {
                format: MediaFormat::Mp3,
                bitrate: 192,
                output_dir: dirs::download_dir()
                    .unwrap_or_else(|| PathBuf::from("downloads")),
            },
            tools: ToolsConfig {
                yt_dlp_path: None,
                ffmpeg_path: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("tubedrop.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("tubedrop").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        let bitrate = self.downloads.bitrate;
        if !(MIN_BITRATE_KBPS..=MAX_BITRATE_KBPS).contains(&bitrate) {
            anyhow::bail!(
                "Configured bitrate {} is outside the supported range {}-{} kbps",
                bitrate,
                MIN_BITRATE_KBPS,
                MAX_BITRATE_KBPS
            );
        }

        if self.downloads.output_dir.as_os_str().is_empty() {
            anyhow::bail!("Output directory must not be empty");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Default format: {}", self.downloads.format);
        println!("  Default bitrate: {} kbps", self.downloads.bitrate);
        println!(
            "  Output directory: {}",
            self.downloads.output_dir.display()
        );
        match &self.tools.yt_dlp_path {
            Some(path) => println!("  yt-dlp: {}", path.display()),
            None => println!("  yt-dlp: (found on PATH)"),
        }
        match &self.tools.ffmpeg_path {
            Some(path) => println!("  ffmpeg: {}", path.display()),
            None => println!("  ffmpeg: (found on PATH)"),
        }
    }
}
