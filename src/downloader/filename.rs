// File name resolution for direct downloads
//
// Order of preference:
// 1. Content-Disposition (filename*= then filename=)
// 2. Last URL path segment, when it carries an extension
// 3. FALLBACK_NAME
// A custom name replaces the base name and keeps the extension.
// Names still lacking an extension get one from Content-Type.

use regex::Regex;
use std::path::{Path, PathBuf};

pub const FALLBACK_NAME: &str = "downloaded_file";
pub const FALLBACK_EXTENSION: &str = ".bin";

lazy_static::lazy_static! {
    static ref UNSAFE_CHARS_RE: Regex = Regex::new(r"[^\w\s-]").unwrap();
    static ref FILENAME_STAR_RE: Regex = Regex::new(r#"(?i)filename\*\s*=\s*([^;]+)"#).unwrap();
    static ref FILENAME_RE: Regex = Regex::new(r#"(?i)filename\s*=\s*("[^"]*"|[^;]+)"#).unwrap();
}

/// Strip characters that are not word chars, whitespace or dashes
pub fn sanitize_custom_name(name: &str) -> String {
    UNSAFE_CHARS_RE.replace_all(name, "").trim().to_string()
}

/// Keep only the final path component so a name cannot leave its folder
fn last_component(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

fn percent_decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// File name from a Content-Disposition header value
pub fn from_content_disposition(header: &str) -> Option<String> {
    // RFC 5987: filename*=UTF-8''a%20b.txt
    if let Some(caps) = FILENAME_STAR_RE.captures(header) {
        let value = caps[1].trim().trim_matches(['"', '\'']);
        let encoded = match value.find("''") {
            Some(idx) => &value[idx + 2..],
            None => value,
        };
        if let Some(name) = last_component(&percent_decode(encoded)) {
            return Some(name);
        }
    }

    let caps = FILENAME_RE.captures(header)?;
    let value = caps[1].trim().trim_matches(['"', '\'']);
    last_component(&percent_decode(value))
}

/// File name from the final URL path segment, if it has an extension
pub fn from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let name = last_component(&percent_decode(segment))?;
    if Path::new(&name).extension().is_some() {
        Some(name)
    } else {
        None
    }
}

/// Extension (with dot) for a Content-Type value
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_lowercase();
    let ext = match mime.as_str() {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "image/bmp" => ".bmp",
        "image/tiff" => ".tiff",
        "image/x-icon" | "image/vnd.microsoft.icon" => ".ico",
        "image/avif" => ".avif",
        "audio/mpeg" => ".mp3",
        "audio/flac" => ".flac",
        "audio/ogg" => ".ogg",
        "audio/wav" | "audio/x-wav" => ".wav",
        "audio/aac" => ".aac",
        "audio/mp4" => ".m4a",
        "audio/opus" => ".opus",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "video/x-matroska" => ".mkv",
        "video/x-msvideo" => ".avi",
        "video/quicktime" => ".mov",
        "application/pdf" => ".pdf",
        "application/msword" => ".doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => ".docx",
        "application/vnd.ms-excel" => ".xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => ".xlsx",
        "application/vnd.ms-powerpoint" => ".ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => ".pptx",
        "application/rtf" => ".rtf",
        "text/plain" => ".txt",
        "text/html" => ".html",
        "text/csv" => ".csv",
        "application/json" => ".json",
        "application/zip" => ".zip",
        "application/x-rar-compressed" | "application/vnd.rar" => ".rar",
        "application/x-7z-compressed" => ".7z",
        "application/x-tar" => ".tar",
        "application/gzip" | "application/x-gzip" => ".gz",
        "application/x-bzip2" => ".bz2",
        "application/x-xz" => ".xz",
        _ => return None,
    };
    Some(ext)
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) => (&name[..name.len() - ext.len() - 1], Some(ext)),
        None => (name, None),
    }
}

/// Resolve the final file name for a direct download
pub fn resolve(
    url: &str,
    content_disposition: Option<&str>,
    content_type: Option<&str>,
    custom_name: Option<&str>,
) -> String {
    let mut filename = content_disposition
        .and_then(from_content_disposition)
        .or_else(|| from_url(url))
        .unwrap_or_else(|| FALLBACK_NAME.to_string());

    if let Some(custom) = custom_name.map(sanitize_custom_name).filter(|c| !c.is_empty()) {
        filename = match split_extension(&filename).1 {
            Some(ext) => format!("{}.{}", custom, ext),
            None => format!("{}{}", custom, FALLBACK_EXTENSION),
        };
    }

    if Path::new(&filename).extension().is_none() {
        let ext = content_type
            .and_then(extension_for_content_type)
            .unwrap_or(FALLBACK_EXTENSION);
        filename.push_str(ext);
    }

    filename
}

/// First free path in `dir`: name.ext, name_1.ext, name_2.ext, ...
pub fn unique_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let (base, ext) = split_extension(filename);
    let mut counter = 1u32;
    loop {
        let name = match ext {
            Some(ext) => format!("{}_{}.{}", base, counter, ext),
            None => format!("{}_{}", base, counter),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_quoted_with_space() {
        assert_eq!(
            from_content_disposition(r#"attachment; filename="a b.txt""#).as_deref(),
            Some("a b.txt")
        );
    }

    #[test]
    fn test_content_disposition_percent_encoded() {
        assert_eq!(
            from_content_disposition("attachment; filename=a%20b.txt").as_deref(),
            Some("a b.txt")
        );
        assert_eq!(
            from_content_disposition("attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf; filename=\"resume.pdf\"")
                .as_deref(),
            Some("résumé.pdf")
        );
    }

    #[test]
    fn test_content_disposition_cannot_escape_folder() {
        assert_eq!(
            from_content_disposition(r#"attachment; filename="../../etc/passwd""#).as_deref(),
            Some("passwd")
        );
        assert_eq!(from_content_disposition("inline"), None);
    }

    #[test]
    fn test_from_url() {
        assert_eq!(from_url("https://example.com/path/file.zip").as_deref(), Some("file.zip"));
        assert_eq!(from_url("https://example.com/my%20doc.pdf?x=1").as_deref(), Some("my doc.pdf"));
        assert_eq!(from_url("https://example.com/download"), None);
        assert_eq!(from_url("https://example.com/"), None);
    }

    #[test]
    fn test_resolve_plain_url() {
        assert_eq!(resolve("https://example.com/path/file.zip", None, None, None), "file.zip");
    }

    #[test]
    fn test_resolve_custom_name_keeps_extension() {
        let name = resolve("https://example.com/file.zip", None, None, Some("My Backup!"));
        assert_eq!(name, "My Backup.zip");
    }

    #[test]
    fn test_resolve_custom_name_without_known_extension() {
        let name = resolve("https://example.com/download", None, Some("image/png"), Some("pic"));
        assert_eq!(name, "pic.bin");
    }

    #[test]
    fn test_resolve_extension_from_content_type() {
        let name = resolve("https://example.com/download", None, Some("image/png; charset=binary"), None);
        assert_eq!(name, "downloaded_file.png");
        let name = resolve("https://example.com/download", None, Some("application/x-unknown"), None);
        assert_eq!(name, "downloaded_file.bin");
        let name = resolve("https://example.com/download", None, None, None);
        assert_eq!(name, "downloaded_file.bin");
    }

    #[test]
    fn test_resolve_prefers_content_disposition() {
        let name = resolve(
            "https://example.com/file.zip",
            Some(r#"attachment; filename="report.pdf""#),
            None,
            None,
        );
        assert_eq!(name, "report.pdf");
    }

    #[test]
    fn test_sanitize_custom_name() {
        assert_eq!(sanitize_custom_name("a/b:c*d?"), "abcd");
        assert_eq!(sanitize_custom_name("  My-File_1  "), "My-File_1");
        assert_eq!(sanitize_custom_name("!!!"), "");
    }

    #[test]
    fn test_unique_path_appends_next_counter() {
        let dir = tempfile::tempdir().unwrap();
        for existing in ["name.zip", "name_1.zip", "name_2.zip"] {
            std::fs::write(dir.path().join(existing), b"x").unwrap();
        }
        assert_eq!(unique_path(dir.path(), "name.zip"), dir.path().join("name_3.zip"));
        assert_eq!(unique_path(dir.path(), "other.zip"), dir.path().join("other.zip"));
    }

    #[test]
    fn test_unique_path_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("name"), b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "name"), dir.path().join("name_1"));
    }
}
