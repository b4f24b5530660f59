// Platform detection - decides which strategy handles a URL
//
// Pure and synchronous, no network access.

use regex::RegexSet;
use serde::{Deserialize, Serialize};

/// Where a URL points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Video/social site handled by yt-dlp
    MediaPlatform,
    /// Plain file fetched over HTTP
    DirectResource,
}

lazy_static::lazy_static! {
    // Host patterns are anchored on a boundary so that e.g. dropbox.com
    // does not match x.com.
    static ref MEDIA_PATTERNS: RegexSet = RegexSet::new([
        r"(?i)(?:^|[/.@])youtube\.com/(?:watch|shorts/|live/|embed/)",
        r"(?i)(?:^|[/.@])youtu\.be/",
        r"(?i)(?:^|[/.@])vimeo\.com/",
        r"(?i)(?:^|[/.@])tiktok\.com/",
        r"(?i)(?:^|[/.@])instagram\.com/",
        r"(?i)(?:^|[/.@])facebook\.com/",
        r"(?i)(?:^|[/.@])fb\.watch/",
        r"(?i)(?:^|[/.@])twitter\.com/",
        r"(?i)(?:^|[/.@])x\.com/",
        r"(?i)(?:^|[/.@])twitch\.tv/",
        r"(?i)(?:^|[/.@])dailymotion\.com/",
        r"(?i)(?:^|[/.@])metacafe\.com/",
        r"(?i)(?:^|[/.@])veoh\.com/",
    ]).unwrap();
}

/// Classify a URL by matching it against known media hosts
pub fn classify(url: &str) -> SourceKind {
    if MEDIA_PATTERNS.is_match(url) {
        SourceKind::MediaPlatform
    } else {
        SourceKind::DirectResource
    }
}
