// Failure diagnostics for yt-dlp output
//
// Maps the tail of a failed run to a likely cause so the caller can be
// told what to try next.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Site not handled by the extractor
    UnsupportedUrl,
    /// Audio extraction needs ffmpeg/ffprobe
    FfmpegMissing,
    /// DRM, purchase or subscription required
    DrmProtected,
    PrivateVideo,
    VideoUnavailable,
    /// Needs a logged-in session (age gate, login wall)
    LoginRequired,
    GeoBlocked,
    RateLimited,
    Http403Forbidden,
    NetworkTimeout,
    Unknown,
}

impl FailureReason {
    /// Check if this is a permanent restriction (no workaround)
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::DrmProtected | Self::VideoUnavailable | Self::UnsupportedUrl)
    }

    /// Check if proxy might help
    pub fn proxy_might_help(&self) -> bool {
        matches!(
            self,
            Self::GeoBlocked | Self::RateLimited | Self::Http403Forbidden | Self::NetworkTimeout
        )
    }

    /// What the user can try
    pub fn hint(&self) -> &'static str {
        match self {
            Self::UnsupportedUrl => "The extractor does not support this site. Check the URL.",
            Self::FfmpegMissing => "Audio extraction needs ffmpeg. Install it (e.g. sudo pacman -S ffmpeg).",
            Self::DrmProtected => "The content is DRM-protected and cannot be downloaded as a file.",
            Self::PrivateVideo => "The video is private.",
            Self::VideoUnavailable => "The video was removed or is no longer available.",
            Self::LoginRequired => "The site requires a logged-in session for this content.",
            Self::GeoBlocked => "The content is blocked in your country. A proxy in another region may help.",
            Self::RateLimited => "The site is rate-limiting requests. Wait a few minutes and retry.",
            Self::Http403Forbidden => "Access was denied (HTTP 403). Updating yt-dlp often fixes this.",
            Self::NetworkTimeout => "The network timed out. Check your connection or proxy.",
            Self::Unknown => "Check the URL and try again. Updating yt-dlp may help.",
        }
    }
}

/// Analyze error output and return the most specific reason
pub fn diagnose_error(output: &str) -> Option<FailureReason> {
    let lower = output.to_lowercase();

    if lower.contains("unsupported url") {
        return Some(FailureReason::UnsupportedUrl);
    }

    if lower.contains("ffprobe and ffmpeg not found")
        || lower.contains("ffmpeg not found")
        || lower.contains("ffprobe/avprobe and ffmpeg/avconv not found")
    {
        return Some(FailureReason::FfmpegMissing);
    }

    if lower.contains("drm") || lower.contains("widevine") || lower.contains("requires purchase") {
        return Some(FailureReason::DrmProtected);
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return Some(FailureReason::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
    {
        return Some(FailureReason::VideoUnavailable);
    }

    if lower.contains("sign in to confirm")
        || lower.contains("login required")
        || lower.contains("requires authentication")
        || lower.contains("use --cookies")
    {
        return Some(FailureReason::LoginRequired);
    }

    if lower.contains("not available in your country") || lower.contains("geo restrict") {
        return Some(FailureReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit") {
        return Some(FailureReason::RateLimited);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureReason::Http403Forbidden);
    }

    if lower.contains("timed out") || lower.contains("timeout") || lower.contains("network unreachable") {
        return Some(FailureReason::NetworkTimeout);
    }

    if !output.trim().is_empty() {
        return Some(FailureReason::Unknown);
    }

    None
}
