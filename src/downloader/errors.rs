// Error types for download strategies

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// yt-dlp is missing and could not be installed automatically
    #[error("yt-dlp is not available and could not be installed.\n{0}")]
    ToolUnavailable(String),

    /// yt-dlp ran but exited with a non-zero status
    #[error("yt-dlp failed (exit code {}):\n{tail}", exit_code_label(.code))]
    ToolExecution { code: Option<i32>, tail: String },

    /// Server answered with a non-2xx status
    #[error("HTTP error {status} for {url}")]
    Http { status: u16, url: String },

    /// Transport-level failure (connect, TLS, read timeout, reset)
    #[error("Connection error: {0}")]
    Network(String),

    /// Anything else that went wrong while acquiring the file
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// The user cancelled the job
    #[error("Download cancelled")]
    Cancelled,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A job is already running in this session
    #[error("A download is already in progress")]
    JobInProgress,
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

impl DownloadError {
    /// Cancellation is reported to callers, but it is not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Self::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        Self::Network(e.to_string())
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        Self::Unexpected(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_execution_message_keeps_tail() {
        let err = DownloadError::ToolExecution {
            code: Some(1),
            tail: "ERROR: Unsupported URL".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.ends_with("ERROR: Unsupported URL"));
    }

    #[test]
    fn test_only_cancelled_is_cancelled() {
        assert!(DownloadError::Cancelled.is_cancelled());
        assert!(!DownloadError::Network("reset".into()).is_cancelled());
    }

    #[test]
    fn test_io_error_is_unexpected() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(DownloadError::from(io), DownloadError::Unexpected(_)));
    }
}
