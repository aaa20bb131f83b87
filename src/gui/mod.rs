use eframe::egui;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::console;
use crate::downloader::{DownloadOptions, MediaFormat, YtDlpDownloader};
use crate::queue::{DownloadQueue, JobId, JobStatus, QueueEvent};
use crate::utils;

/// Launch the desktop window.
///
/// Blocks until the window closes. A tokio runtime must be active on the
/// calling thread; the queue worker is spawned on it while this thread runs
/// the GUI event loop.
pub fn run(config: Config) -> Result<(), eframe::Error> {
    let downloader = Arc::new(YtDlpDownloader::from_config(&config));
    let queue = DownloadQueue::new(downloader);

    // The observer runs in the worker's context, so it only pushes events
    // into a channel drained by the frame loop.
    let (events_tx, events_rx) = channel();
    queue.on_status_change(move |event| {
        let _ = events_tx.send(event.clone());
    });

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "tubedrop",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Box::new(TubedropApp::new(config, queue, events_rx))
        }),
    )
}

/// Application state for the GUI
struct TubedropApp {
    /// Multiline input for URLs
    url_input: String,
    /// Selected output format
    format: MediaFormat,
    /// Bitrate field, MP3 only
    bitrate_input: String,
    /// Destination folder for downloads
    output_dir: String,
    /// The job queue driving the downloads
    queue: DownloadQueue,
    /// Incoming queue events
    events: Receiver<QueueEvent>,
    /// Append-only log shown at the bottom
    log: Vec<String>,
    /// Live progress per job id
    progress: HashMap<JobId, f32>,
    /// Whether a worker run is active
    running: bool,
}

impl TubedropApp {
    fn new(config: Config, queue: DownloadQueue, events: Receiver<QueueEvent>) -> Self {
        Self {
            url_input: String::new(),
            format: config.downloads.format,
            bitrate_input: config.downloads.bitrate.to_string(),
            output_dir: config.downloads.output_dir.display().to_string(),
            queue,
            events,
            log: Vec::new(),
            progress: HashMap::new(),
            running: false,
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match &event {
                QueueEvent::Started => self.running = true,
                QueueEvent::Finished { .. } => {
                    self.running = false;
                    self.progress.clear();
                }
                QueueEvent::Progress { id, percent } => {
                    self.progress.insert(*id, *percent);
                }
                _ => {}
            }
            if let Some(line) = console::render_event(&event) {
                self.push_log(line);
            }
        }
    }

    fn push_log(&mut self, line: String) {
        self.log
            .push(format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line));
    }

    fn current_options(&mut self) -> DownloadOptions {
        let bitrate = if self.format == MediaFormat::Mp3 {
            match self.bitrate_input.trim().parse::<u32>() {
                Ok(value) => Some(value),
                Err(_) => {
                    if !self.bitrate_input.trim().is_empty() {
                        let line =
                            format!("Ignoring invalid bitrate \"{}\"", self.bitrate_input.trim());
                        self.push_log(line);
                    }
                    None
                }
            }
        } else {
            None
        };
        DownloadOptions::new(self.format, bitrate, PathBuf::from(self.output_dir.trim()))
    }

    fn add_urls(&mut self) {
        let options = self.current_options();
        for url in console::parse_url_list(&self.url_input) {
            if let Err(error) = self.queue.enqueue(&url, options.clone()) {
                self.push_log(error.to_string());
            }
        }
        self.url_input.clear();
    }

    fn start(&mut self) {
        if let Err(error) = self.queue.start() {
            self.push_log(error.to_string());
        }
    }
}

impl eframe::App for TubedropApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        egui::SidePanel::right("queue_panel")
            .min_width(320.0)
            .show(ctx, |ui| {
                ui.heading("Queue");
                ui.separator();

                let jobs = self.queue.jobs();
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        for job in &jobs {
                            ui.group(|ui| {
                                ui.label(job.display_name());
                                ui.horizontal(|ui| {
                                    ui.colored_label(
                                        status_color(job.status),
                                        job.status.as_str(),
                                    );
                                    if job.status != JobStatus::Running
                                        && ui.small_button("✕").clicked()
                                    {
                                        let _ = self.queue.remove(job.id);
                                    }
                                });
                                if job.status == JobStatus::Running {
                                    let progress =
                                        self.progress.get(&job.id).copied().unwrap_or(0.0);
                                    ui.add(egui::ProgressBar::new(progress).show_percentage());
                                }
                                if let Some(error) = &job.error {
                                    ui.colored_label(egui::Color32::RED, error);
                                }
                            });
                        }
                    });

                ui.separator();
                if ui.button("Clear queue").clicked() {
                    self.queue.clear();
                }
            });

        egui::TopBottomPanel::bottom("log_panel")
            .resizable(true)
            .default_height(140.0)
            .show(ctx, |ui| {
                ui.heading("Log");
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        for line in &self.log {
                            ui.label(line);
                        }
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("tubedrop");

            ui.label("Paste YouTube URLs (one per line, commas also work):");
            ui.add(
                egui::TextEdit::multiline(&mut self.url_input)
                    .desired_rows(4)
                    .desired_width(f32::INFINITY),
            );

            ui.horizontal(|ui| {
                ui.label("Format:");
                egui::ComboBox::from_id_source("format")
                    .selected_text(self.format.as_str())
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut self.format, MediaFormat::Mp3, "mp3");
                        ui.selectable_value(&mut self.format, MediaFormat::Mp4, "mp4");
                    });

                ui.label("Bitrate (kbps):");
                ui.add_enabled(
                    self.format == MediaFormat::Mp3,
                    egui::TextEdit::singleline(&mut self.bitrate_input).desired_width(60.0),
                );
            });

            ui.horizontal(|ui| {
                ui.label("Output folder:");
                ui.text_edit_singleline(&mut self.output_dir);
                if ui.button("Browse…").clicked() {
                    if let Some(folder) = rfd::FileDialog::new()
                        .set_directory(&self.output_dir)
                        .pick_folder()
                    {
                        self.output_dir = folder.display().to_string();
                    }
                }
            });

            ui.horizontal(|ui| {
                if ui.button("Add to queue").clicked() {
                    self.add_urls();
                }
                if ui
                    .add_enabled(!self.running, egui::Button::new("Start"))
                    .clicked()
                {
                    self.start();
                }
                if ui
                    .add_enabled(self.running, egui::Button::new("Stop"))
                    .clicked()
                {
                    self.queue.stop();
                }
                if ui.button("Open output folder").clicked() {
                    if let Err(error) = utils::open_in_file_manager(Path::new(&self.output_dir)) {
                        self.push_log(error.to_string());
                    }
                }
            });
        });

        // Keep polling for worker events while downloads run
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

fn status_color(status: JobStatus) -> egui::Color32 {
    match status {
        JobStatus::Pending => egui::Color32::GRAY,
        JobStatus::Running => egui::Color32::LIGHT_BLUE,
        JobStatus::Done => egui::Color32::GREEN,
        JobStatus::Failed => egui::Color32::RED,
        JobStatus::Stopped => egui::Color32::YELLOW,
    }
}
