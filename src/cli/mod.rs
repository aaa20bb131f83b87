use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::downloader::MediaFormat;

#[derive(Parser)]
#[command(
    name = "tubedrop",
    about = "tubedrop - paste YouTube URLs, get MP3s (or MP4s)",
    version,
    long_about = "A small desktop utility for downloading YouTube audio as MP3 or video as MP4. Extraction is delegated to yt-dlp and audio conversion to ffmpeg; tubedrop queues the URLs and drives them one at a time."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download one or more URLs, prompting for a URL block when none are given
    Download {
        /// YouTube URLs; entries may also be separated by commas
        #[arg(value_name = "URL")]
        urls: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<MediaFormat>,

        /// Audio bitrate in kbps (MP3 only)
        #[arg(short, long, value_name = "KBPS")]
        bitrate: Option<u32>,

        /// Output directory (defaults to the configured one)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Open the desktop window
    Gui,

    /// Show the current configuration or where to edit it
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check that the required external tools are installed
    Check,
}
