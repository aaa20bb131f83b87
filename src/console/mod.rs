use ::console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead};
use std::sync::Arc;

use crate::queue::{DownloadJob, JobStatus, QueueEvent};
use crate::utils;

/// Split free-form user text into individual URLs.
///
/// Commas and newlines both separate entries; whitespace is trimmed, empty
/// entries dropped, order preserved, duplicates kept.
pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(|c| c == ',' || c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read one block of text: lines until the first blank line or EOF
pub fn read_url_block<R: BufRead>(reader: R) -> io::Result<String> {
    let mut collected = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }
        collected.push(line);
    }
    Ok(collected.join("\n"))
}

/// Interactive prompt for the console variant
pub fn prompt_for_urls() -> io::Result<String> {
    println!("Paste one or more YouTube URLs, separated by commas or newlines.");
    println!("Press Enter on an empty line to finish:");
    read_url_block(io::stdin().lock())
}

/// One display line for a job's current state
pub fn render_status(job: &DownloadJob) -> String {
    let name = job.display_name();
    match job.status {
        JobStatus::Pending => format!("queued      {}", name),
        JobStatus::Running => {
            let mut line = format!("downloading {}", name);
            if let Some(details) = media_details(job) {
                line.push_str(&format!(" ({})", details));
            }
            line
        }
        JobStatus::Done => format!("done        {}", name),
        JobStatus::Failed => format!(
            "failed      {}: {}",
            name,
            job.error.as_deref().unwrap_or("unknown error")
        ),
        JobStatus::Stopped => format!("stopped     {}", name),
    }
}

/// Duration and estimated size, when metadata is known
fn media_details(job: &DownloadJob) -> Option<String> {
    let media = job.media.as_ref()?;
    let mut parts = Vec::new();
    if let Some(duration) = media.duration_secs {
        parts.push(utils::format_duration(duration));
    }
    if let Some(size) = media.estimated_size(&job.options) {
        parts.push(format!("~{}", utils::format_file_size(size)));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Log line for a queue event, shared by the console and the GUI log view
pub fn render_event(event: &QueueEvent) -> Option<String> {
    match event {
        QueueEvent::Started => Some("Started downloads".to_string()),
        QueueEvent::StopRequested => {
            Some("Stop requested, waiting for the current download to wind down".to_string())
        }
        QueueEvent::JobUpdated { job, .. } => Some(render_status(job)),
        QueueEvent::Progress { .. } => None,
        QueueEvent::Finished { stopped: true } => Some("Stopped.".to_string()),
        QueueEvent::Finished { stopped: false } => Some("All downloads processed.".to_string()),
    }
}

/// Prints timestamped status lines and drives a progress bar from queue
/// events. Safe to call from the worker's context: only terminal I/O.
pub struct ConsoleReporter {
    bar: ProgressBar,
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Arc<Self> {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                    .unwrap(),
            );
            bar
        };
        Arc::new(Self { bar, quiet })
    }

    pub fn handle(&self, event: &QueueEvent) {
        match event {
            QueueEvent::JobUpdated { job, .. } if job.status == JobStatus::Running => {
                self.bar.reset();
                self.bar.set_message(job.display_name().to_string());
            }
            QueueEvent::Progress { percent, .. } => {
                self.bar.set_position((percent * 100.0) as u64);
                return;
            }
            QueueEvent::Finished { .. } => {
                self.bar.finish_and_clear();
            }
            _ => {}
        }

        if let Some(line) = render_event(event) {
            self.println(line);
        }
    }

    fn println(&self, line: String) {
        let stamped = format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line);
        if self.quiet {
            println!("{}", stamped);
        } else {
            self.bar.println(stamped);
        }
    }
}

/// Print the end-of-run summary and return the number of failed jobs
pub fn print_summary(jobs: &[DownloadJob]) -> usize {
    let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
    let done = count(JobStatus::Done);
    let failed = count(JobStatus::Failed);
    let stopped = count(JobStatus::Stopped);

    println!();
    println!(
        "{} done, {} failed, {} stopped",
        style(done).green(),
        style(failed).red(),
        style(stopped).yellow()
    );
    for job in jobs.iter().filter(|j| j.status == JobStatus::Failed) {
        println!(
            "  {} {}: {}",
            style("failed").red(),
            job.display_name(),
            job.error.as_deref().unwrap_or("unknown error")
        );
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::{DownloadOptions, MediaFormat, MediaInfo};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn job_with_status(status: JobStatus) -> DownloadJob {
        DownloadJob {
            id: uuid::Uuid::new_v4(),
            url: "https://youtu.be/abc".to_string(),
            options: DownloadOptions::new(MediaFormat::Mp3, Some(192), PathBuf::from(".")),
            status,
            title: None,
            media: None,
            error: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_parse_url_list_mixed_separators() {
        assert_eq!(parse_url_list("a,b\nc"), ["a", "b", "c"]);
    }

    #[test]
    fn test_parse_url_list_empty_entries() {
        assert!(parse_url_list(" , ,\n").is_empty());
        assert!(parse_url_list("").is_empty());
    }

    #[test]
    fn test_parse_url_list_preserves_order_and_duplicates() {
        assert_eq!(parse_url_list("b\na, b"), ["b", "a", "b"]);
    }

    #[test]
    fn test_read_url_block_stops_at_blank_line() {
        let input = Cursor::new("one\ntwo\n\nthree\n");
        assert_eq!(read_url_block(input).unwrap(), "one\ntwo");
    }

    #[test]
    fn test_read_url_block_reads_to_eof() {
        let input = Cursor::new("one\ntwo");
        assert_eq!(read_url_block(input).unwrap(), "one\ntwo");
    }

    #[test]
    fn test_render_status_shows_failure_reason() {
        let mut job = job_with_status(JobStatus::Failed);
        job.error = Some("ERROR: Video unavailable".to_string());
        let line = render_status(&job);
        assert!(line.contains("failed"));
        assert!(line.contains("Video unavailable"));
    }

    #[test]
    fn test_render_status_prefers_title() {
        let mut job = job_with_status(JobStatus::Done);
        job.title = Some("Some Song".to_string());
        assert!(render_status(&job).contains("Some Song"));
        assert!(!render_status(&job).contains("youtu.be"));
    }

    #[test]
    fn test_render_running_includes_estimate() {
        let mut job = job_with_status(JobStatus::Running);
        job.media = Some(MediaInfo {
            title: None,
            duration_secs: Some(100.0),
            filesize: None,
        });
        let line = render_status(&job);
        assert!(line.contains("1m 40s"));
        assert!(line.contains("~2.3 MB"));
    }

    #[test]
    fn test_render_event_skips_progress() {
        assert!(render_event(&QueueEvent::Progress {
            id: uuid::Uuid::new_v4(),
            percent: 0.5
        })
        .is_none());
    }
}
