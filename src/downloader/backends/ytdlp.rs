use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::downloader::categories::{self, FileCategory};
use crate::downloader::config::DownloaderConfig;
use crate::downloader::diagnostics::diagnose_error;
use crate::downloader::errors::DownloadError;
use crate::downloader::filename::sanitize_custom_name;
use crate::downloader::models::{Acquired, JobRequest};
use crate::downloader::tools::{ExtractorCommand, ToolManager};
use crate::downloader::traits::{DownloadStrategy, ProgressEmitter};
use crate::downloader::utils::{tail_lines, terminate_gracefully};

pub const AUDIO_FORMAT: &str = "mp3";
pub const AUDIO_QUALITY: &str = "192K";
const VIDEO_EXTENSION: &str = "mp4";

/// Lines kept for the failure report
const TAIL_LINES: usize = 10;

/// Fallback scan only looks at files this recent
const RECENT_WINDOW: Duration = Duration::from_secs(60);

const AUDIO_OUTPUT_EXTENSIONS: &[&str] = &["mp3", "m4a"];
const VIDEO_OUTPUT_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv"];

lazy_static::lazy_static! {
    static ref PROGRESS_RE: Regex = Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap();
    static ref DEST_RE: Regex = Regex::new(r"^\[(?:download|ExtractAudio)\]\s+Destination:\s+(.+)$").unwrap();
    static ref MERGE_RE: Regex = Regex::new(r#"^\[Merger\]\s+Merging formats into "(.+)"$"#).unwrap();
    static ref ALREADY_RE: Regex = Regex::new(r"^\[download\]\s+(.+) has already been downloaded").unwrap();
}

/// What one line of yt-dlp output tells us
#[derive(Debug, Default, PartialEq)]
pub struct ParsedLine {
    pub percent: Option<u8>,
    /// File the tool says it is writing
    pub path: Option<PathBuf>,
    /// Worth showing to the caller
    pub notable: bool,
}

/// Parse yt-dlp output like:
/// [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59
/// [download] Destination: /home/u/Downloads/Videos/Title.mp4
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    let mut parsed = ParsedLine::default();

    if let Some(caps) = PROGRESS_RE.captures(line) {
        if let Ok(percent) = caps[1].parse::<f32>() {
            parsed.percent = Some(percent.clamp(0.0, 100.0) as u8);
        }
    }

    parsed.path = DEST_RE
        .captures(line)
        .or_else(|| MERGE_RE.captures(line))
        .or_else(|| ALREADY_RE.captures(line))
        .map(|caps| PathBuf::from(caps[1].trim()));

    let lower = line.to_lowercase();
    parsed.notable = ["title:", "destination:", "finished", "merging formats", "has already been downloaded"]
        .iter()
        .any(|marker| lower.contains(marker));

    parsed
}

/// Category folder the tool writes into
pub fn target_category(audio_only: bool) -> &'static FileCategory {
    let ext = if audio_only { AUDIO_FORMAT } else { VIDEO_EXTENSION };
    categories::category_for(&format!("output.{}", ext))
}

/// Build yt-dlp arguments for a request
pub fn build_args(request: &JobRequest, url: &str, dest_folder: &Path, proxy: Option<&str>) -> Vec<String> {
    let mut args = vec!["--newline".to_string(), "--no-playlist".to_string()];

    if request.audio_only {
        args.extend([
            "-x".to_string(),
            "--audio-format".to_string(),
            AUDIO_FORMAT.to_string(),
            "--audio-quality".to_string(),
            AUDIO_QUALITY.to_string(),
        ]);
    } else {
        args.push("-f".to_string());
        args.push(request.video_quality.format_filter());
    }

    if let Some(proxy) = proxy {
        args.push("--proxy".to_string());
        args.push(proxy.to_string());
    }

    let base = request
        .custom_name
        .as_deref()
        .map(sanitize_custom_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "%(title)s".to_string());
    args.push("-o".to_string());
    args.push(dest_folder.join(format!("{}.%(ext)s", base)).to_string_lossy().to_string());

    args.push(url.to_string());
    args
}

/// Output extensions expected for the mode
pub fn output_extensions(audio_only: bool) -> &'static [&'static str] {
    if audio_only {
        AUDIO_OUTPUT_EXTENSIONS
    } else {
        VIDEO_OUTPUT_EXTENSIONS
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| extensions.contains(&ext.to_string_lossy().to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Newest file in `dir` with one of `extensions`, modified within `window`
pub fn find_recent_output(dir: &Path, extensions: &[&str], window: Duration) -> Option<PathBuf> {
    let cutoff = SystemTime::now().checked_sub(window)?;

    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            if !has_extension(&path, extensions) {
                return None;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            (modified >= cutoff).then_some((modified, path))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

/// Line reader that decodes lossily, so a stray non-UTF-8 byte does not end the stream.
/// Partial reads stay in `buf`, which keeps `next_line` usable inside `select!`.
struct LossyLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LossyLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> Option<String> {
        match self.reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) if self.buf.is_empty() => None,
            Ok(_) => {
                let line = String::from_utf8_lossy(&self.buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                self.buf.clear();
                Some(line)
            }
            Err(e) => {
                tracing::warn!("[yt-dlp] Failed to read output: {}", e);
                None
            }
        }
    }
}

enum Next {
    Cancelled,
    Stdout(Option<String>),
    Stderr(Option<String>),
}

/// Media platforms via yt-dlp
pub struct YtDlpStrategy {
    tools: ToolManager,
    command: OnceCell<ExtractorCommand>,
    proxy: Option<String>,
    auto_install: bool,
    cancel_grace: Duration,
}

impl YtDlpStrategy {
    pub fn new(config: &DownloaderConfig) -> Self {
        Self {
            tools: ToolManager::new(config),
            command: OnceCell::new(),
            proxy: config.proxy.clone(),
            auto_install: config.auto_install,
            cancel_grace: config.cancel_grace,
        }
    }

    /// Use a known command instead of detecting one
    pub fn with_command(config: &DownloaderConfig, command: ExtractorCommand) -> Self {
        Self {
            command: OnceCell::new_with(Some(command)),
            ..Self::new(config)
        }
    }

    async fn command(&self, emitter: &ProgressEmitter) -> Result<&ExtractorCommand, DownloadError> {
        self.command
            .get_or_try_init(|| self.tools.ensure_available(self.auto_install, emitter))
            .await
    }
}

#[async_trait]
impl DownloadStrategy for YtDlpStrategy {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(
        &self,
        request: &JobRequest,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<Acquired, DownloadError> {
        let command = self.command(emitter).await?;

        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let category = target_category(request.audio_only);
        let dest_folder = request.destination_root.join(category.folder);
        tokio::fs::create_dir_all(&dest_folder).await?;

        let args = command.args_with(build_args(request, &request.url, &dest_folder, self.proxy.as_deref()));
        tracing::info!("[yt-dlp] {} {}", command.program, args.join(" "));
        emitter.log(format!("🎥 Processing with yt-dlp: {}", request.url)).await;

        let mut child = Command::new(&command.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::Unexpected(format!("Failed to start yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Unexpected("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Unexpected("Failed to capture stderr".to_string()))?;
        let mut out_lines = LossyLines::new(stdout);
        let mut err_lines = LossyLines::new(stderr);
        let (mut out_done, mut err_done) = (false, false);

        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let mut reported: Vec<PathBuf> = Vec::new();
        let mut last_percent: Option<u8> = None;

        while !(out_done && err_done) {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Next::Cancelled,
                line = out_lines.next_line(), if !out_done => Next::Stdout(line),
                line = err_lines.next_line(), if !err_done => Next::Stderr(line),
            };

            let line = match next {
                Next::Cancelled => {
                    tracing::info!("[yt-dlp] Cancel requested, stopping process");
                    terminate_gracefully(&mut child, self.cancel_grace).await;
                    return Err(DownloadError::Cancelled);
                }
                Next::Stdout(None) => {
                    out_done = true;
                    continue;
                }
                Next::Stderr(None) => {
                    err_done = true;
                    continue;
                }
                Next::Stdout(Some(line)) | Next::Stderr(Some(line)) => line,
            };

            if line.trim().is_empty() {
                continue;
            }

            let parsed = parse_line(&line);
            if let Some(percent) = parsed.percent {
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    emitter.progress(percent).await;
                }
            }
            if let Some(path) = parsed.path {
                reported.push(path);
            }
            if parsed.notable {
                emitter.log(format!("ℹ️  {}", line.trim())).await;
            }

            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.trim().to_string());
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                terminate_gracefully(&mut child, self.cancel_grace).await;
                return Err(DownloadError::Cancelled);
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            let tail = tail_lines(&Vec::from(tail), TAIL_LINES);
            if let Some(reason) = diagnose_error(&tail) {
                let marker = if reason.is_permanent() { "⛔" } else { "💡" };
                emitter.log(format!("{} {}", marker, reason.hint())).await;
                if reason.proxy_might_help() && self.proxy.is_none() {
                    emitter
                        .log("💡 A proxy may help: set UNIVERSAL_DL_PROXY or pass --proxy")
                        .await;
                }
            }
            return Err(DownloadError::ToolExecution {
                code: status.code(),
                tail,
            });
        }

        emitter.log("✅ Download completed with yt-dlp").await;

        let extensions = output_extensions(request.audio_only);
        let located = reported
            .iter()
            .rev()
            .find(|p| has_extension(p, extensions) && p.exists())
            .cloned()
            .or_else(|| {
                tracing::debug!("[yt-dlp] No announced output found, scanning {}", dest_folder.display());
                find_recent_output(&dest_folder, extensions, RECENT_WINDOW)
            });

        match located {
            Some(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok(Acquired {
                    message: format!("Downloaded successfully:\n{}\n\nSaved in: {}/", name, category.folder),
                    path: Some(path),
                })
            }
            None => Ok(Acquired {
                message: "Download completed, but the output file could not be located".to_string(),
                path: None,
            }),
        }
    }
}
