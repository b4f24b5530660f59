// Downloader configuration
//
// Defaults are usable as-is; `from_env` layers environment overrides:
//   UNIVERSAL_DL_DIR    destination root
//   UNIVERSAL_DL_PROXY  proxy URL for yt-dlp and the HTTP client
//   YTDLP_PATH          yt-dlp executable, skipping the lookup
//   YTDLP_PYTHON        interpreter for the `python -m yt_dlp` fallback

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Root under which category folders are created
    pub download_root: PathBuf,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// yt-dlp executable; None searches the usual install locations
    pub ytdlp_path: Option<String>,
    /// Python interpreter used for `-m yt_dlp` and `-m pip`
    pub python: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Upper bound for a single body chunk read
    pub read_timeout: Duration,
    /// Upper bound for `--version` probes
    pub tool_check_timeout: Duration,
    /// Upper bound for each install attempt
    pub install_timeout: Duration,
    /// How long a strategy gets to acknowledge cancellation
    pub cancel_grace: Duration,
    /// Capacity of the per-job event channel
    pub event_buffer: usize,
    /// Try to install yt-dlp when it is missing
    pub auto_install: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            download_root: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            proxy: None,
            ytdlp_path: None,
            python: "python3".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            tool_check_timeout: Duration::from_secs(5),
            install_timeout: Duration::from_secs(60),
            cancel_grace: Duration::from_secs(5),
            event_buffer: 64,
            auto_install: true,
        }
    }
}

impl DownloaderConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env_non_empty("UNIVERSAL_DL_DIR") {
            config.download_root = PathBuf::from(dir);
        }
        config.proxy = env_non_empty("UNIVERSAL_DL_PROXY");
        config.ytdlp_path = env_non_empty("YTDLP_PATH");
        if let Some(python) = env_non_empty("YTDLP_PYTHON") {
            config.python = python;
        }
        config
    }

    pub fn with_download_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.download_root = root.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<String>) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn with_auto_install(mut self, enabled: bool) -> Self {
        self.auto_install = enabled;
        self
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
