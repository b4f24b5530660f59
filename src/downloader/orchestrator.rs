// Orchestrator - one session, one job at a time
//
// The job task is the only place that sends the terminal Outcome, and it
// moves the state to a terminal value before doing so. Strategies only
// ever see a ProgressEmitter, so nothing can be sent after the Outcome.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::backends::{DirectStrategy, YtDlpStrategy};
use super::config::DownloaderConfig;
use super::errors::DownloadError;
use super::models::{DownloadEvent, JobOutcome, JobRequest, JobState};
use super::platform::{self, SourceKind};
use super::traits::{DownloadStrategy, ProgressEmitter};
use super::utils::normalize_url;

/// Extra time `cancel()` allows on top of the strategy's grace period
const CANCEL_MARGIN: Duration = Duration::from_secs(1);

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// A caller session
pub struct Downloader {
    config: DownloaderConfig,
    media: Arc<dyn DownloadStrategy>,
    direct: Arc<dyn DownloadStrategy>,
    current: Mutex<Option<Arc<watch::Sender<JobState>>>>,
}

impl Downloader {
    pub fn new(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let media = Arc::new(YtDlpStrategy::new(&config));
        let direct = Arc::new(DirectStrategy::new(&config)?);
        Ok(Self::with_strategies(config, media, direct))
    }

    /// Session with explicit strategies for media platforms and plain files
    pub fn with_strategies(
        config: DownloaderConfig,
        media: Arc<dyn DownloadStrategy>,
        direct: Arc<dyn DownloadStrategy>,
    ) -> Self {
        Self {
            config,
            media,
            direct,
            current: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Start a job in the background. Must be called inside a Tokio runtime.
    pub fn submit(&self, request: JobRequest) -> Result<(DownloadJob, JobEvents), DownloadError> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = current.as_ref() {
            if !state.borrow().is_terminal() {
                return Err(DownloadError::JobInProgress);
            }
        }

        let url = normalize_url(&request.url)?;
        let request = JobRequest { url, ..request };
        let kind = platform::classify(&request.url);
        let strategy = match kind {
            SourceKind::MediaPlatform => Arc::clone(&self.media),
            SourceKind::DirectResource => Arc::clone(&self.direct),
        };

        let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let (state_tx, _) = watch::channel(JobState::Created);
        let state = Arc::new(state_tx);
        let cancel = CancellationToken::new();

        tracing::info!(
            "[Downloader] Job #{} {} via {} ({:?})",
            id,
            request.url,
            strategy.name(),
            kind
        );

        tokio::spawn(run_job(JobContext {
            id,
            kind,
            strategy,
            request,
            emitter: ProgressEmitter::new(tx),
            cancel: cancel.clone(),
            state: Arc::clone(&state),
            grace: self.config.cancel_grace,
        }));

        *current = Some(Arc::clone(&state));

        let job = DownloadJob {
            id,
            kind,
            cancel,
            state,
            grace: self.config.cancel_grace,
        };
        Ok((job, JobEvents { rx }))
    }
}

/// Control handle of a running job
pub struct DownloadJob {
    id: u64,
    kind: SourceKind,
    cancel: CancellationToken,
    state: Arc<watch::Sender<JobState>>,
    grace: Duration,
}

impl DownloadJob {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Which route the job took
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Request cancellation and wait, bounded, for the job to end.
    /// Safe to call repeatedly; returns the state observed afterwards.
    pub async fn cancel(&self) -> JobState {
        let requested = self.state.send_if_modified(|s| {
            if *s == JobState::Running {
                *s = JobState::Cancelling;
                true
            } else {
                false
            }
        });
        if requested {
            tracing::info!("[Downloader] Job #{} cancel requested", self.id);
        }
        self.cancel.cancel();

        let mut rx = self.state.subscribe();
        let timed_out = tokio::time::timeout(self.grace + CANCEL_MARGIN, rx.wait_for(|s| s.is_terminal()))
            .await
            .is_err();
        if timed_out {
            tracing::warn!("[Downloader] Job #{} did not stop within {:?}", self.id, self.grace);
        }
        self.state()
    }
}

/// Ordered events of one job; the last one is always `DownloadEvent::Outcome`
pub struct JobEvents {
    rx: mpsc::Receiver<DownloadEvent>,
}

impl JobEvents {
    /// Next event, or None once the job has finished and everything was read
    pub async fn recv(&mut self) -> Option<DownloadEvent> {
        self.rx.recv().await
    }

    /// Read until the Outcome, returning it
    pub async fn outcome(mut self) -> Option<JobOutcome> {
        while let Some(event) = self.rx.recv().await {
            if let DownloadEvent::Outcome(outcome) = event {
                return Some(outcome);
            }
        }
        None
    }
}

struct JobContext {
    id: u64,
    kind: SourceKind,
    strategy: Arc<dyn DownloadStrategy>,
    request: JobRequest,
    emitter: ProgressEmitter,
    cancel: CancellationToken,
    state: Arc<watch::Sender<JobState>>,
    grace: Duration,
}

/// Move to `next` unless the state is already terminal
fn transition(state: &watch::Sender<JobState>, next: JobState) -> bool {
    state.send_if_modified(|s| {
        if s.is_terminal() || *s == next {
            false
        } else {
            *s = next;
            true
        }
    })
}

async fn run_job(ctx: JobContext) {
    let JobContext {
        id,
        kind,
        strategy,
        request,
        emitter,
        cancel,
        state,
        grace,
    } = ctx;

    transition(&state, JobState::Running);

    emitter
        .log(match kind {
            SourceKind::MediaPlatform => "🎬 Media platform detected",
            SourceKind::DirectResource => "🔗 Direct download detected",
        })
        .await;
    emitter.progress(0).await;

    let result = if cancel.is_cancelled() {
        Err(DownloadError::Cancelled)
    } else {
        let work = AssertUnwindSafe(strategy.download(&request, &emitter, &cancel)).catch_unwind();
        tokio::select! {
            res = work => res.unwrap_or_else(|_| {
                tracing::error!("[Downloader] Job #{} strategy {} panicked", id, strategy.name());
                Err(DownloadError::Unexpected(format!("{} strategy crashed", strategy.name())))
            }),
            _ = async {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(
                    "[Downloader] Job #{} strategy {} ignored cancel for {:?}, abandoning it",
                    id,
                    strategy.name(),
                    grace
                );
                Err(DownloadError::Cancelled)
            }
        }
    };

    let (final_state, outcome) = match result {
        Ok(acquired) => {
            emitter.progress(100).await;
            (JobState::Succeeded, JobOutcome::success(acquired))
        }
        Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
            if !e.is_cancelled() {
                tracing::debug!("[Downloader] Job #{} failed after cancel: {}", id, e);
            }
            (JobState::Cancelled, JobOutcome::cancelled())
        }
        Err(e) => {
            tracing::warn!("[Downloader] Job #{} failed: {}", id, e);
            (JobState::Failed, JobOutcome::failure(e.to_string()))
        }
    };

    tracing::info!("[Downloader] Job #{} finished: {:?}", id, final_state);
    transition(&state, final_state);
    emitter.emit(DownloadEvent::Outcome(outcome)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::Acquired;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    enum Behavior {
        Succeed,
        Fail(DownloadError),
        /// Waits for cancel, then acknowledges it
        WaitForCancel,
        /// Never returns on its own
        Stuck,
    }

    struct FakeStrategy {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
        last_url: Mutex<Option<String>>,
    }

    impl FakeStrategy {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
                last_url: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DownloadStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn download(
            &self,
            request: &JobRequest,
            emitter: &ProgressEmitter,
            cancel: &CancellationToken,
        ) -> Result<Acquired, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_url.lock().unwrap() = Some(request.url.clone());
            emitter.log(format!("{} working", self.name)).await;
            emitter.progress(50).await;

            match &self.behavior {
                Behavior::Succeed => Ok(Acquired {
                    message: "done".to_string(),
                    path: Some(PathBuf::from("/tmp/out.bin")),
                }),
                Behavior::Fail(e) => Err(e.clone()),
                Behavior::WaitForCancel => {
                    cancel.cancelled().await;
                    Err(DownloadError::Cancelled)
                }
                Behavior::Stuck => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(DownloadError::Unexpected("woke up".to_string()))
                }
            }
        }
    }

    fn session(media: Arc<FakeStrategy>, direct: Arc<FakeStrategy>) -> Downloader {
        let config = DownloaderConfig::default()
            .with_download_root("/tmp")
            .with_cancel_grace(Duration::from_millis(200));
        Downloader::with_strategies(config, media, direct)
    }

    async fn collect(mut events: JobEvents) -> Vec<DownloadEvent> {
        let mut all = Vec::new();
        while let Some(event) = events.recv().await {
            all.push(event);
        }
        all
    }

    fn outcomes(events: &[DownloadEvent]) -> Vec<&JobOutcome> {
        events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Outcome(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_media_url_goes_to_media_strategy() {
        let media = FakeStrategy::new("media", Behavior::Succeed);
        let direct = FakeStrategy::new("direct", Behavior::Succeed);
        let downloader = session(media.clone(), direct.clone());

        let (job, events) = downloader
            .submit(JobRequest::new("https://www.youtube.com/watch?v=abc", "/tmp"))
            .unwrap();
        assert_eq!(job.kind(), SourceKind::MediaPlatform);
        let events = collect(events).await;

        assert_eq!(media.calls(), 1);
        assert_eq!(direct.calls(), 0);
        assert!(matches!(&events[0], DownloadEvent::Log { text } if text.contains("Media platform detected")));
    }

    #[tokio::test]
    async fn test_plain_file_goes_to_direct_strategy_with_scheme_added() {
        let media = FakeStrategy::new("media", Behavior::Succeed);
        let direct = FakeStrategy::new("direct", Behavior::Succeed);
        let downloader = session(media.clone(), direct.clone());

        let (_job, events) = downloader
            .submit(JobRequest::new("example.com/path/file.zip", "/tmp"))
            .unwrap();
        collect(events).await;

        assert_eq!(media.calls(), 0);
        assert_eq!(direct.calls(), 1);
        assert_eq!(
            direct.last_url.lock().unwrap().as_deref(),
            Some("https://example.com/path/file.zip")
        );
    }

    #[tokio::test]
    async fn test_success_events_end_with_single_outcome() {
        let downloader = session(
            FakeStrategy::new("media", Behavior::Succeed),
            FakeStrategy::new("direct", Behavior::Succeed),
        );
        let (job, events) = downloader
            .submit(JobRequest::new("https://example.com/file.zip", "/tmp"))
            .unwrap();
        let events = collect(events).await;

        assert_eq!(outcomes(&events).len(), 1);
        assert!(matches!(events.last(), Some(DownloadEvent::Outcome(o)) if o.succeeded));
        assert!(matches!(
            &events[events.len() - 2],
            DownloadEvent::Progress { percent: 100 }
        ));
        assert!(events
            .iter()
            .any(|e| matches!(e, DownloadEvent::Progress { percent: 0 })));
        assert_eq!(job.state(), JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_failure_message_reaches_outcome() {
        let downloader = session(
            FakeStrategy::new("media", Behavior::Succeed),
            FakeStrategy::new(
                "direct",
                Behavior::Fail(DownloadError::Http {
                    status: 404,
                    url: "https://example.com/x.zip".to_string(),
                }),
            ),
        );
        let (job, events) = downloader
            .submit(JobRequest::new("https://example.com/x.zip", "/tmp"))
            .unwrap();
        let outcome = events.outcome().await.unwrap();

        assert!(!outcome.succeeded);
        assert!(!outcome.cancelled);
        assert!(outcome.message.contains("404"));
        assert!(outcome.result_path.is_none());
        assert_eq!(job.state(), JobState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_acknowledged_by_strategy() {
        let downloader = session(
            FakeStrategy::new("media", Behavior::Succeed),
            FakeStrategy::new("direct", Behavior::WaitForCancel),
        );
        let (job, events) = downloader
            .submit(JobRequest::new("https://example.com/big.iso", "/tmp"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(job.cancel().await, JobState::Cancelled);
        let events = collect(events).await;
        let done = outcomes(&events);
        assert_eq!(done.len(), 1);
        assert!(done[0].cancelled);
        assert!(!done[0].succeeded);
    }

    #[tokio::test]
    async fn test_cancel_synthesizes_outcome_for_stuck_strategy() {
        let downloader = session(
            FakeStrategy::new("media", Behavior::Stuck),
            FakeStrategy::new("direct", Behavior::Succeed),
        );
        let (job, events) = downloader
            .submit(JobRequest::new("https://vimeo.com/123", "/tmp"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        assert_eq!(job.cancel().await, JobState::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));

        let events = collect(events).await;
        assert!(matches!(events.last(), Some(DownloadEvent::Outcome(o)) if o.cancelled));
        assert_eq!(outcomes(&events).len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let downloader = session(
            FakeStrategy::new("media", Behavior::WaitForCancel),
            FakeStrategy::new("direct", Behavior::Succeed),
        );
        let (job, events) = downloader
            .submit(JobRequest::new("https://youtu.be/abc", "/tmp"))
            .unwrap();

        assert_eq!(job.cancel().await, JobState::Cancelled);
        assert_eq!(job.cancel().await, JobState::Cancelled);
        assert_eq!(outcomes(&collect(events).await).len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_success_keeps_state() {
        let downloader = session(
            FakeStrategy::new("media", Behavior::Succeed),
            FakeStrategy::new("direct", Behavior::Succeed),
        );
        let (job, events) = downloader
            .submit(JobRequest::new("https://example.com/a.pdf", "/tmp"))
            .unwrap();
        let outcome = events.outcome().await.unwrap();

        assert!(outcome.succeeded);
        assert_eq!(job.cancel().await, JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_second_submit_rejected_while_running() {
        let downloader = session(
            FakeStrategy::new("media", Behavior::Succeed),
            FakeStrategy::new("direct", Behavior::WaitForCancel),
        );
        let (job, events) = downloader
            .submit(JobRequest::new("https://example.com/one.zip", "/tmp"))
            .unwrap();

        assert!(matches!(
            downloader.submit(JobRequest::new("https://example.com/two.zip", "/tmp")),
            Err(DownloadError::JobInProgress)
        ));

        job.cancel().await;
        collect(events).await;
        assert!(downloader
            .submit(JobRequest::new("https://example.com/two.zip", "/tmp"))
            .is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_at_submit() {
        let downloader = session(
            FakeStrategy::new("media", Behavior::Succeed),
            FakeStrategy::new("direct", Behavior::Succeed),
        );
        assert!(matches!(
            downloader.submit(JobRequest::new("   ", "/tmp")),
            Err(DownloadError::InvalidUrl(_))
        ));
    }
}
