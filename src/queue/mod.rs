use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::downloader::{DownloadOptions, Downloader, MediaFormat, MediaInfo, ProgressFn};
use crate::{DownloadError, QueueError};

pub type JobId = Uuid;

/// Lifecycle of a download job.
///
/// `Pending -> Running -> {Done | Failed | Stopped}`, with `Pending -> Stopped`
/// when a stop request skips a job before it started. Terminal states have no
/// outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "downloading",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One requested URL-to-file download
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: JobId,
    pub url: String,
    pub options: DownloadOptions,
    pub status: JobStatus,

    /// Media title, filled in once metadata has been probed
    pub title: Option<String>,

    /// Probed metadata (duration, reported size)
    pub media: Option<MediaInfo>,

    /// One-line failure reason for FAILED jobs
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl DownloadJob {
    fn new(url: String, options: DownloadOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            options,
            status: JobStatus::Pending,
            title: None,
            media: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Title when known, URL otherwise
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// Cooperative stop flag shared between the queue, its worker, and the
/// download collaborator. Owned by one [`DownloadQueue`] instance, so
/// independent queues (and tests) never interfere.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Event delivered synchronously to observers from the worker's context.
///
/// Observers must not block; GUI code should only push events into a channel.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A worker run began
    Started,

    /// A stop was requested; in-flight and pending jobs will wind down
    StopRequested,

    /// A job changed status (also emitted once at enqueue time, as PENDING)
    JobUpdated {
        job: DownloadJob,
        message: Option<String>,
    },

    /// Download progress for the running job, 0.0..=1.0
    Progress { id: JobId, percent: f32 },

    /// The worker run ended; `stopped` is true when it ended on a stop request
    Finished { stopped: bool },
}

pub type StatusCallback = Box<dyn Fn(&QueueEvent) + Send + Sync>;

struct QueueInner {
    jobs: Mutex<Vec<DownloadJob>>,
    observers: Mutex<Vec<StatusCallback>>,
    stop: StopSignal,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    downloader: Arc<dyn Downloader>,
    handle: tokio::runtime::Handle,
}

impl QueueInner {
    fn emit(&self, event: QueueEvent) {
        let observers = self.observers.lock().unwrap();
        for callback in observers.iter() {
            callback(&event);
        }
    }

    fn set_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
    ) -> Option<DownloadJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.iter_mut().find(|j| j.id == id)?;
        job.status = status;
        job.error = error;
        Some(job.clone())
    }
}

/// Owns the ordered job list and the single worker that drains it.
///
/// All mutation goes through this type; the presentation layer only receives
/// job snapshots via [`QueueEvent`]s or [`DownloadQueue::jobs`]. Must be
/// created inside a tokio runtime, which the worker is spawned on.
#[derive(Clone)]
pub struct DownloadQueue {
    inner: Arc<QueueInner>,
}

impl DownloadQueue {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                jobs: Mutex::new(Vec::new()),
                observers: Mutex::new(Vec::new()),
                stop: StopSignal::new(),
                running: AtomicBool::new(false),
                worker: Mutex::new(None),
                downloader,
                handle: tokio::runtime::Handle::current(),
            }),
        }
    }

    /// Register an observer for job status transitions and queue-level events
    pub fn on_status_change(&self, callback: impl Fn(&QueueEvent) + Send + Sync + 'static) {
        self.inner.observers.lock().unwrap().push(Box::new(callback));
    }

    /// Append a job to the queue. Fails if the URL is empty or whitespace.
    pub fn enqueue(&self, url: &str, options: DownloadOptions) -> Result<DownloadJob, QueueError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(QueueError::Validation(
                "URL must not be empty".to_string(),
            ));
        }

        let job = DownloadJob::new(url.to_string(), options);
        self.inner.jobs.lock().unwrap().push(job.clone());
        tracing::debug!("Enqueued {} as job {}", job.url, job.id);
        self.inner.emit(QueueEvent::JobUpdated {
            job: job.clone(),
            message: None,
        });
        Ok(job)
    }

    /// Drop every job except the one currently downloading
    pub fn clear(&self) {
        let mut jobs = self.inner.jobs.lock().unwrap();
        jobs.retain(|j| j.status == JobStatus::Running);
    }

    /// Remove a single job; the running job cannot be removed
    pub fn remove(&self, id: JobId) -> Result<(), QueueError> {
        let mut jobs = self.inner.jobs.lock().unwrap();
        match jobs.iter().position(|j| j.id == id) {
            Some(idx) if jobs[idx].status == JobStatus::Running => Err(QueueError::InvalidState(
                "cannot remove the job currently downloading".to_string(),
            )),
            Some(idx) => {
                jobs.remove(idx);
                Ok(())
            }
            None => Err(QueueError::InvalidState("no such job".to_string())),
        }
    }

    /// Snapshot of all jobs in insertion order
    pub fn jobs(&self) -> Vec<DownloadJob> {
        self.inner.jobs.lock().unwrap().clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Begin processing pending jobs on a background worker.
    ///
    /// Returns `Ok(false)` without doing anything when the worker is already
    /// running or there is nothing pending. Fails with
    /// [`QueueError::Configuration`] before any job runs when a required
    /// external tool is missing.
    pub fn start(&self) -> Result<bool, QueueError> {
        let pending_formats: Vec<MediaFormat> = {
            let jobs = self.inner.jobs.lock().unwrap();
            jobs.iter()
                .filter(|j| j.status == JobStatus::Pending)
                .map(|j| j.options.format)
                .collect()
        };
        if pending_formats.is_empty() {
            tracing::debug!("start() with nothing pending is a no-op");
            return Ok(false);
        }

        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Worker already running");
            return Ok(false);
        }

        if let Err(e) = self.inner.downloader.check_tools(&pending_formats) {
            self.inner.running.store(false, Ordering::SeqCst);
            return Err(QueueError::Configuration(e.to_string()));
        }

        self.inner.stop.clear();
        self.inner.emit(QueueEvent::Started);

        let inner = Arc::clone(&self.inner);
        let handle = self.inner.handle.spawn(run_worker(inner));
        *self.inner.worker.lock().unwrap() = Some(handle);
        Ok(true)
    }

    /// Request a stop. The running job is cancelled if the collaborator
    /// supports it (otherwise it finishes naturally); everything still
    /// pending will be marked STOPPED.
    pub fn stop(&self) {
        if !self.is_running() {
            tracing::debug!("stop() without a running worker is a no-op");
            return;
        }
        self.inner.stop.set();
        self.inner.emit(QueueEvent::StopRequested);
    }

    /// Wait for the current worker run to finish
    pub async fn join(&self) {
        let handle = self.inner.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// The single sequential worker: claims pending jobs in order, drives each
/// through the download collaborator, and reports every transition.
async fn run_worker(inner: Arc<QueueInner>) {
    loop {
        if inner.stop.is_set() {
            break;
        }

        let claimed = {
            let mut jobs = inner.jobs.lock().unwrap();
            match jobs.iter_mut().find(|j| j.status == JobStatus::Pending) {
                Some(job) => {
                    job.status = JobStatus::Running;
                    Some(job.clone())
                }
                None => None,
            }
        };
        let Some(mut job) = claimed else { break };

        // Best-effort metadata fetch so status lines can show the title
        match inner.downloader.probe(job.url.clone()).await {
            Ok(info) => {
                let mut jobs = inner.jobs.lock().unwrap();
                if let Some(j) = jobs.iter_mut().find(|j| j.id == job.id) {
                    j.title = info.title.clone();
                    j.media = Some(info);
                    job = j.clone();
                }
            }
            Err(e) => tracing::debug!("Metadata probe failed for {}: {}", job.url, e),
        }
        inner.emit(QueueEvent::JobUpdated {
            job: job.clone(),
            message: job.title.clone(),
        });

        let progress: ProgressFn = {
            let inner = Arc::clone(&inner);
            let id = job.id;
            Arc::new(move |percent| inner.emit(QueueEvent::Progress { id, percent }))
        };

        let result = inner
            .downloader
            .download(
                job.url.clone(),
                job.options.clone(),
                inner.stop.clone(),
                progress,
            )
            .await;

        let (status, error) = match result {
            Ok(()) => (JobStatus::Done, None),
            Err(DownloadError::Cancelled) => (JobStatus::Stopped, None),
            Err(e) => (JobStatus::Failed, Some(e.to_string())),
        };
        tracing::info!("Job {} finished: {}", job.id, status);
        if let Some(updated) = inner.set_status(job.id, status, error.clone()) {
            inner.emit(QueueEvent::JobUpdated {
                job: updated,
                message: error,
            });
        }
    }

    // A stop request skips everything still pending
    let skipped: Vec<DownloadJob> = {
        let mut jobs = inner.jobs.lock().unwrap();
        jobs.iter_mut()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| {
                j.status = JobStatus::Stopped;
                j.clone()
            })
            .collect()
    };
    for job in skipped {
        inner.emit(QueueEvent::JobUpdated { job, message: None });
    }

    inner.running.store(false, Ordering::SeqCst);
    inner.emit(QueueEvent::Finished {
        stopped: inner.stop.is_set(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::MockDownloader;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

    fn options() -> DownloadOptions {
        DownloadOptions::new(MediaFormat::Mp3, Some(192), PathBuf::from("downloads"))
    }

    /// Scripted collaborator: records invocations, optionally fails chosen
    /// URLs, optionally blocks until released, optionally honors the stop
    /// signal (a cancellable collaborator).
    struct FakeDownloader {
        calls: Mutex<Vec<String>>,
        fail: HashSet<String>,
        cancellable: bool,
        started_tx: Option<UnboundedSender<String>>,
        release_rx: Option<tokio::sync::Mutex<UnboundedReceiver<()>>>,
    }

    impl FakeDownloader {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: HashSet::new(),
                cancellable: false,
                started_tx: None,
                release_rx: None,
            }
        }

        fn failing(urls: &[&str]) -> Self {
            let mut fake = Self::new();
            fake.fail = urls.iter().map(|u| u.to_string()).collect();
            fake
        }

        /// Block each download until the test sends one `()` on the returned
        /// sender; also report when a download begins.
        fn gated(cancellable: bool) -> (Self, UnboundedReceiver<String>, UnboundedSender<()>) {
            let (started_tx, started_rx) = unbounded_channel();
            let (release_tx, release_rx) = unbounded_channel();
            let mut fake = Self::new();
            fake.cancellable = cancellable;
            fake.started_tx = Some(started_tx);
            fake.release_rx = Some(tokio::sync::Mutex::new(release_rx));
            (fake, started_rx, release_tx)
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Downloader for FakeDownloader {
        fn check_tools(&self, _formats: &[MediaFormat]) -> Result<(), DownloadError> {
            Ok(())
        }

        async fn probe(&self, _url: String) -> Result<MediaInfo, DownloadError> {
            Ok(MediaInfo::default())
        }

        async fn download(
            &self,
            url: String,
            _options: DownloadOptions,
            stop: StopSignal,
            _progress: ProgressFn,
        ) -> Result<(), DownloadError> {
            self.calls.lock().unwrap().push(url.clone());
            if let Some(tx) = &self.started_tx {
                let _ = tx.send(url.clone());
            }
            if let Some(rx) = &self.release_rx {
                rx.lock().await.recv().await;
            }
            if self.cancellable && stop.is_set() {
                return Err(DownloadError::Cancelled);
            }
            if self.fail.contains(&url) {
                return Err(DownloadError::Failed("simulated failure".to_string()));
            }
            Ok(())
        }
    }

    fn statuses(queue: &DownloadQueue) -> Vec<JobStatus> {
        queue.jobs().iter().map(|j| j.status).collect()
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let fake = Arc::new(FakeDownloader::new());
        let queue = DownloadQueue::new(fake.clone());

        for url in ["a", "b", "c"] {
            queue.enqueue(url, options()).unwrap();
        }
        let urls: Vec<String> = queue.jobs().iter().map(|j| j.url.clone()).collect();
        assert_eq!(urls, ["a", "b", "c"]);

        assert!(queue.start().unwrap());
        queue.join().await;
        assert_eq!(fake.calls(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_url_rejected() {
        let queue = DownloadQueue::new(Arc::new(FakeDownloader::new()));

        assert!(matches!(
            queue.enqueue("", options()),
            Err(QueueError::Validation(_))
        ));
        assert!(matches!(
            queue.enqueue("   ", options()),
            Err(QueueError::Validation(_))
        ));
        assert!(queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_queue() {
        let fake = Arc::new(FakeDownloader::failing(&["b"]));
        let queue = DownloadQueue::new(fake.clone());
        for url in ["a", "b", "c"] {
            queue.enqueue(url, options()).unwrap();
        }

        assert!(queue.start().unwrap());
        queue.join().await;

        assert_eq!(
            statuses(&queue),
            [JobStatus::Done, JobStatus::Failed, JobStatus::Done]
        );
        assert_eq!(fake.calls(), ["a", "b", "c"]);

        let failed = &queue.jobs()[1];
        assert!(failed.error.as_deref().unwrap().contains("simulated failure"));
    }

    #[tokio::test]
    async fn test_stop_skips_pending_jobs() {
        let (fake, mut started_rx, release_tx) = FakeDownloader::gated(false);
        let fake = Arc::new(fake);
        let queue = DownloadQueue::new(fake.clone());
        for url in ["a", "b", "c"] {
            queue.enqueue(url, options()).unwrap();
        }

        assert!(queue.start().unwrap());
        assert_eq!(started_rx.recv().await.unwrap(), "a");

        // Collaborator is not cancellable: job "a" must finish naturally
        queue.stop();
        release_tx.send(()).unwrap();
        queue.join().await;

        assert_eq!(
            statuses(&queue),
            [JobStatus::Done, JobStatus::Stopped, JobStatus::Stopped]
        );
        assert_eq!(fake.calls(), ["a"]);
    }

    #[tokio::test]
    async fn test_stop_cancels_running_job() {
        let (fake, mut started_rx, release_tx) = FakeDownloader::gated(true);
        let fake = Arc::new(fake);
        let queue = DownloadQueue::new(fake.clone());
        for url in ["a", "b"] {
            queue.enqueue(url, options()).unwrap();
        }

        assert!(queue.start().unwrap());
        assert_eq!(started_rx.recv().await.unwrap(), "a");

        queue.stop();
        release_tx.send(()).unwrap();
        queue.join().await;

        assert_eq!(statuses(&queue), [JobStatus::Stopped, JobStatus::Stopped]);
        assert_eq!(fake.calls(), ["a"]);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (fake, mut started_rx, release_tx) = FakeDownloader::gated(false);
        let fake = Arc::new(fake);
        let queue = DownloadQueue::new(fake.clone());
        for url in ["a", "b"] {
            queue.enqueue(url, options()).unwrap();
        }

        assert!(queue.start().unwrap());
        assert_eq!(started_rx.recv().await.unwrap(), "a");

        // Second start while the worker is busy must not spawn another run
        assert!(!queue.start().unwrap());

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        queue.join().await;

        assert_eq!(fake.calls(), ["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_tool_aborts_start() {
        let mut mock = MockDownloader::new();
        mock.expect_check_tools()
            .returning(|_| Err(DownloadError::ToolMissing("yt-dlp".to_string())));

        let queue = DownloadQueue::new(Arc::new(mock));
        queue.enqueue("a", options()).unwrap();

        assert!(matches!(
            queue.start(),
            Err(QueueError::Configuration(_))
        ));
        assert!(!queue.is_running());
        assert_eq!(statuses(&queue), [JobStatus::Pending]);
    }

    #[tokio::test]
    async fn test_start_with_empty_queue_is_noop() {
        let queue = DownloadQueue::new(Arc::new(FakeDownloader::new()));
        assert!(!queue.start().unwrap());
        assert!(!queue.is_running());
    }

    #[tokio::test]
    async fn test_clear_keeps_running_job() {
        let (fake, mut started_rx, release_tx) = FakeDownloader::gated(false);
        let fake = Arc::new(fake);
        let queue = DownloadQueue::new(fake.clone());
        for url in ["a", "b"] {
            queue.enqueue(url, options()).unwrap();
        }

        assert!(queue.start().unwrap());
        assert_eq!(started_rx.recv().await.unwrap(), "a");

        queue.clear();
        assert_eq!(queue.jobs().len(), 1);

        release_tx.send(()).unwrap();
        queue.join().await;

        assert_eq!(statuses(&queue), [JobStatus::Done]);
        assert_eq!(fake.calls(), ["a"]);
    }

    #[tokio::test]
    async fn test_remove_rejects_running_job() {
        let (fake, mut started_rx, release_tx) = FakeDownloader::gated(false);
        let queue = DownloadQueue::new(Arc::new(fake));
        let running = queue.enqueue("a", options()).unwrap();
        let pending = queue.enqueue("b", options()).unwrap();

        assert!(queue.start().unwrap());
        started_rx.recv().await.unwrap();

        assert!(matches!(
            queue.remove(running.id),
            Err(QueueError::InvalidState(_))
        ));
        queue.remove(pending.id).unwrap();
        assert_eq!(queue.jobs().len(), 1);

        release_tx.send(()).unwrap();
        queue.join().await;
    }

    #[tokio::test]
    async fn test_observer_sees_full_transition_sequence() {
        let events: Arc<Mutex<Vec<QueueEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let queue = DownloadQueue::new(Arc::new(FakeDownloader::new()));
        {
            let events = Arc::clone(&events);
            queue.on_status_change(move |event| events.lock().unwrap().push(event.clone()));
        }

        queue.enqueue("a", options()).unwrap();
        assert!(queue.start().unwrap());
        queue.join().await;

        let events = events.lock().unwrap();
        let seen: Vec<JobStatus> = events
            .iter()
            .filter_map(|e| match e {
                QueueEvent::JobUpdated { job, .. } => Some(job.status),
                _ => None,
            })
            .collect();
        assert_eq!(
            seen,
            [JobStatus::Pending, JobStatus::Running, JobStatus::Done]
        );
        assert!(matches!(events.first(), Some(QueueEvent::JobUpdated { .. })));
        assert!(matches!(
            events.last(),
            Some(QueueEvent::Finished { stopped: false })
        ));
    }
}
