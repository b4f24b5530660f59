// Downloader module - routing, strategies and the job orchestrator

pub mod backends;
pub mod categories;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod filename;
pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod tools;
pub mod traits;
pub mod utils;

pub use config::DownloaderConfig;
pub use errors::DownloadError;
pub use models::{Acquired, DownloadEvent, JobOutcome, JobRequest, JobState, VideoQuality};
pub use orchestrator::{DownloadJob, Downloader, JobEvents};
pub use platform::SourceKind;
pub use tools::{ToolInfo, ToolManager};
pub use traits::{DownloadStrategy, ProgressEmitter};
