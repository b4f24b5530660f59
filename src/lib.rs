pub mod downloader;

pub use downloader::{
    Acquired, DownloadError, DownloadEvent, DownloadJob, DownloadStrategy, Downloader, DownloaderConfig,
    JobEvents, JobOutcome, JobRequest, JobState, ProgressEmitter, SourceKind, ToolInfo, ToolManager,
    VideoQuality,
};

use tracing_subscriber::EnvFilter;

/// Install a stderr `tracing` subscriber filtered by `RUST_LOG` (default `info`).
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
