// Common data models for downloader

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Video quality ceiling passed to the extraction tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoQuality {
    /// Best available, capped at 1080p
    #[default]
    Best,
    P720,
    P480,
    P360,
}

impl VideoQuality {
    /// Maximum video height for this quality
    pub fn max_height(&self) -> u32 {
        match self {
            Self::Best => 1080,
            Self::P720 => 720,
            Self::P480 => 480,
            Self::P360 => 360,
        }
    }

    /// yt-dlp `-f` filter for this quality
    pub fn format_filter(&self) -> String {
        format!("best[height<=?{}]", self.max_height())
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => write!(f, "best"),
            Self::P720 => write!(f, "720p"),
            Self::P480 => write!(f, "480p"),
            Self::P360 => write!(f, "360p"),
        }
    }
}

impl FromStr for VideoQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "720p" | "720" => Ok(Self::P720),
            "480p" | "480" => Ok(Self::P480),
            "360p" | "360" => Ok(Self::P360),
            other => Err(format!("unknown quality '{}' (expected best, 720p, 480p or 360p)", other)),
        }
    }
}

/// One download request. Immutable once the job starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub url: String,
    pub destination_root: PathBuf,
    pub video_quality: VideoQuality,
    pub audio_only: bool,
    /// Replaces the base name of the saved file
    pub custom_name: Option<String>,
}

impl JobRequest {
    pub fn new(url: impl Into<String>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination_root: destination_root.into(),
            video_quality: VideoQuality::Best,
            audio_only: false,
            custom_name: None,
        }
    }

    pub fn with_quality(mut self, quality: VideoQuality) -> Self {
        self.video_quality = quality;
        self
    }

    pub fn with_audio_only(mut self, audio_only: bool) -> Self {
        self.audio_only = audio_only;
        self
    }

    pub fn with_custom_name(mut self, name: Option<String>) -> Self {
        self.custom_name = name.filter(|n| !n.trim().is_empty());
        self
    }
}

/// What a strategy hands back on success
#[derive(Debug, Clone)]
pub struct Acquired {
    pub message: String,
    /// None when the tool finished but its output could not be located
    pub path: Option<PathBuf>,
}

/// Terminal result of a job. Exactly one per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub succeeded: bool,
    /// Set when the job ended because the user cancelled it
    pub cancelled: bool,
    pub message: String,
    pub result_path: Option<PathBuf>,
}

impl JobOutcome {
    pub fn success(acquired: Acquired) -> Self {
        Self {
            succeeded: true,
            cancelled: false,
            message: acquired.message,
            result_path: acquired.path,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            cancelled: false,
            message: message.into(),
            result_path: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            succeeded: false,
            cancelled: true,
            message: "Download cancelled".to_string(),
            result_path: None,
        }
    }
}

/// Events delivered to the caller, in production order.
/// `Outcome` is always the last event of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// Latest known percentage (0-100). Not guaranteed to be monotonic
    /// for the extraction tool.
    Progress { percent: u8 },
    Log { text: String },
    Outcome(JobOutcome),
}

/// Job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Running,
    Cancelling,
    Cancelled,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Succeeded | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_parse_and_filter() {
        assert_eq!("720p".parse::<VideoQuality>().unwrap(), VideoQuality::P720);
        assert_eq!("BEST".parse::<VideoQuality>().unwrap(), VideoQuality::Best);
        assert!("4k".parse::<VideoQuality>().is_err());
        assert_eq!(VideoQuality::Best.format_filter(), "best[height<=?1080]");
        assert_eq!(VideoQuality::P360.format_filter(), "best[height<=?360]");
    }

    #[test]
    fn test_blank_custom_name_is_dropped() {
        let req = JobRequest::new("https://a.b/c", "/tmp").with_custom_name(Some("  ".into()));
        assert!(req.custom_name.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Cancelling.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_string(&DownloadEvent::Progress { percent: 42 }).unwrap();
        assert_eq!(json, r#"{"type":"progress","percent":42}"#);
    }
}
