// Download strategy trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::errors::DownloadError;
use super::models::{Acquired, DownloadEvent, JobRequest};

/// One way of acquiring a URL (external tool, direct HTTP, ...)
#[async_trait]
pub trait DownloadStrategy: Send + Sync {
    /// Name of the strategy (for logging)
    fn name(&self) -> &'static str;

    /// Acquire the request's URL into its category folder.
    ///
    /// Must check `cancel` at every blocking step and return
    /// `DownloadError::Cancelled` once it fires.
    async fn download(
        &self,
        request: &JobRequest,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<Acquired, DownloadError>;
}

/// Sends progress and log events to the job's caller
#[derive(Clone)]
pub struct ProgressEmitter {
    tx: mpsc::Sender<DownloadEvent>,
}

impl ProgressEmitter {
    pub fn new(tx: mpsc::Sender<DownloadEvent>) -> Self {
        Self { tx }
    }

    pub async fn progress(&self, percent: u8) {
        self.emit(DownloadEvent::Progress {
            percent: percent.min(100),
        })
        .await;
    }

    pub async fn log(&self, text: impl Into<String>) {
        self.emit(DownloadEvent::Log { text: text.into() }).await;
    }

    pub(crate) async fn emit(&self, event: DownloadEvent) {
        // Receiver gone means the caller stopped listening; the job still runs to completion.
        let _ = self.tx.send(event).await;
    }
}
