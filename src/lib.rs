//! tubedrop - paste YouTube URLs, get MP3s (or MP4s)
//!
//! This library wires a sequential download queue to external tools: yt-dlp does
//! the extraction and ffmpeg the audio conversion. The queue processes one job at
//! a time and reports every status transition to registered observers.

pub mod cli;
pub mod config;
pub mod console;
pub mod downloader;
pub mod gui;
pub mod queue;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use downloader::{DownloadOptions, Downloader, MediaFormat, MediaInfo, YtDlpDownloader};
pub use queue::{DownloadJob, DownloadQueue, JobStatus, QueueEvent, StopSignal};

/// Result type used throughout the binary layer
pub type Result<T> = anyhow::Result<T>;

/// Errors raised by queue operations
#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    /// The submitted URL was empty or whitespace
    #[error("invalid URL: {0}")]
    Validation(String),

    /// A required external tool is not installed
    #[error("missing external tool: {0}")]
    Configuration(String),

    /// The operation is not valid for the current queue state
    #[error("invalid queue state: {0}")]
    InvalidState(String),
}

/// Errors raised by the external download collaborator for a single job
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    /// A required external tool is not installed
    #[error("{0} not found. Please install it and make sure it is on your PATH")]
    ToolMissing(String),

    /// The downloader process could not be launched
    #[error("failed to launch downloader: {0}")]
    Spawn(String),

    /// The downloader ran but reported a failure
    #[error("download failed: {0}")]
    Failed(String),

    /// The output directory could not be created
    #[error("output directory unusable: {0}")]
    OutputDir(String),

    /// The download was cancelled by a stop request
    #[error("download cancelled")]
    Cancelled,
}
