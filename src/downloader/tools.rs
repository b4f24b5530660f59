// Extraction tool management - locate, probe and install yt-dlp

use serde::{Deserialize, Serialize};
use std::process::Command;
use std::time::Duration;

use super::config::DownloaderConfig;
use super::errors::DownloadError;
use super::traits::ProgressEmitter;
use super::utils::run_output_with_timeout;

pub const INSTALL_HINT: &str = "Install it manually:\n\
                                • sudo pacman -S yt-dlp\n\
                                • pip install --user yt-dlp";

/// How yt-dlp is launched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Invocation {
    /// Standalone `yt-dlp` executable
    Binary,
    /// `python -m yt_dlp`
    PythonModule,
}

/// A ready-to-use yt-dlp command line prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorCommand {
    pub program: String,
    pub prefix_args: Vec<String>,
    pub invocation: Invocation,
}

impl ExtractorCommand {
    pub fn binary(path: impl Into<String>) -> Self {
        Self {
            program: path.into(),
            prefix_args: Vec::new(),
            invocation: Invocation::Binary,
        }
    }

    pub fn python_module(python: impl Into<String>) -> Self {
        Self {
            program: python.into(),
            prefix_args: vec!["-m".to_string(), "yt_dlp".to_string()],
            invocation: Invocation::PythonModule,
        }
    }

    /// Prefix args followed by `extra`
    pub fn args_with(&self, extra: impl IntoIterator<Item = String>) -> Vec<String> {
        self.prefix_args.iter().cloned().chain(extra).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub invocation: Option<Invocation>,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// One way of installing yt-dlp, tried in order
#[derive(Debug, Clone)]
pub struct InstallStep {
    pub label: &'static str,
    pub program: String,
    pub args: Vec<String>,
}

impl InstallStep {
    fn new(label: &'static str, program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            label,
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

pub struct ToolManager {
    binary: Option<String>,
    python: String,
    check_timeout: Duration,
    install_timeout: Duration,
    install_steps: Vec<InstallStep>,
}

impl ToolManager {
    pub fn new(config: &DownloaderConfig) -> Self {
        Self {
            binary: config.ytdlp_path.clone(),
            python: config.python.clone(),
            check_timeout: config.tool_check_timeout,
            install_timeout: config.install_timeout,
            install_steps: vec![
                // -n: fail instead of prompting for a password
                InstallStep::new("pacman", "sudo", &["-n", "pacman", "-S", "--noconfirm", "yt-dlp"]),
                InstallStep::new("pip", config.python.clone(), &["-m", "pip", "install", "--user", "yt-dlp"]),
            ],
        }
    }

    /// Replace the install attempts
    pub fn with_install_steps(mut self, steps: Vec<InstallStep>) -> Self {
        self.install_steps = steps;
        self
    }

    /// Find yt-dlp executable in common paths
    pub fn find_ytdlp() -> String {
        let common_paths = [
            "/usr/bin/yt-dlp",       // System installation
            "/usr/local/bin/yt-dlp", // Manual / Homebrew on Intel Mac
            "/opt/homebrew/bin/yt-dlp",
        ];

        for path in common_paths {
            if std::path::Path::new(path).exists() {
                return path.to_string();
            }
        }

        // pip --user installs land here
        if let Some(home) = dirs::home_dir() {
            let local = home.join(".local/bin/yt-dlp");
            if local.exists() {
                return local.to_string_lossy().to_string();
            }
        }

        if let Ok(output) = Command::new("which").arg("yt-dlp").output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return path;
                }
            }
        }

        // Last resort: hope it's in PATH
        "yt-dlp".to_string()
    }

    /// Run `--version`; Some(version) when the command answers successfully
    pub async fn probe(&self, command: &ExtractorCommand) -> Option<String> {
        let args = command.args_with(["--version".to_string()]);
        match run_output_with_timeout(&command.program, args, self.check_timeout).await {
            Ok(out) if out.status.success() => {
                Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
            }
            Ok(out) => {
                tracing::debug!(
                    "[ToolManager] {} --version exited with {:?}",
                    command.program,
                    out.status.code()
                );
                None
            }
            Err(e) => {
                tracing::debug!("[ToolManager] {} probe failed: {}", command.program, e);
                None
            }
        }
    }

    /// Try the executable first, then the Python module
    pub async fn detect(&self) -> Option<(ExtractorCommand, String)> {
        let candidates = [
            ExtractorCommand::binary(self.binary.clone().unwrap_or_else(Self::find_ytdlp)),
            ExtractorCommand::python_module(self.python.clone()),
        ];

        for command in candidates {
            if let Some(version) = self.probe(&command).await {
                tracing::info!(
                    "[ToolManager] yt-dlp {} via {:?} ({})",
                    version,
                    command.invocation,
                    command.program
                );
                return Some((command, version));
            }
        }

        None
    }

    pub async fn status(&self) -> ToolInfo {
        match self.detect().await {
            Some((command, version)) => ToolInfo {
                name: "yt-dlp".to_string(),
                invocation: Some(command.invocation),
                version: Some(version),
                path: Some(command.program),
                is_available: true,
            },
            None => ToolInfo {
                name: "yt-dlp".to_string(),
                invocation: None,
                version: None,
                path: None,
                is_available: false,
            },
        }
    }

    /// Best-effort install: system package manager, then pip --user
    pub async fn install(&self, emitter: Option<&ProgressEmitter>) -> Result<ExtractorCommand, DownloadError> {
        for step in &self.install_steps {
            let label = step.label;
            tracing::info!("[ToolManager] Installing yt-dlp with {}", label);
            match run_output_with_timeout(&step.program, step.args.clone(), self.install_timeout).await {
                Ok(out) if out.status.success() => {
                    if let Some(emitter) = emitter {
                        emitter.log(format!("✅ yt-dlp installed with {}", label)).await;
                    }
                    if let Some((command, _)) = self.detect().await {
                        return Ok(command);
                    }
                    tracing::warn!("[ToolManager] {} reported success but yt-dlp still not found", label);
                }
                Ok(out) => {
                    tracing::warn!(
                        "[ToolManager] {} install failed: {}",
                        label,
                        String::from_utf8_lossy(&out.stderr).trim()
                    );
                }
                Err(e) => tracing::warn!("[ToolManager] {} install failed: {}", label, e),
            }
        }

        if let Some(emitter) = emitter {
            emitter.log("❌ Could not install yt-dlp automatically").await;
        }
        Err(DownloadError::ToolUnavailable(INSTALL_HINT.to_string()))
    }

    /// Detect yt-dlp, installing it when allowed
    pub async fn ensure_available(
        &self,
        auto_install: bool,
        emitter: &ProgressEmitter,
    ) -> Result<ExtractorCommand, DownloadError> {
        if let Some((command, _)) = self.detect().await {
            return Ok(command);
        }

        if !auto_install {
            return Err(DownloadError::ToolUnavailable(INSTALL_HINT.to_string()));
        }

        emitter.log("🔧 yt-dlp not found, trying to install it...").await;
        self.install(Some(emitter)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_module_prefix() {
        let cmd = ExtractorCommand::python_module("python3");
        assert_eq!(cmd.args_with(["--version".to_string()]), vec!["-m", "yt_dlp", "--version"]);
        assert_eq!(cmd.invocation, Invocation::PythonModule);
    }

    #[test]
    fn test_binary_has_no_prefix() {
        let cmd = ExtractorCommand::binary("/usr/bin/yt-dlp");
        assert_eq!(cmd.args_with(["-x".to_string()]), vec!["-x"]);
    }

    #[tokio::test]
    async fn test_probe_missing_program() {
        let manager = ToolManager::new(&DownloaderConfig::default());
        let cmd = ExtractorCommand::binary("/nonexistent/yt-dlp-missing");
        assert!(manager.probe(&cmd).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_reads_version() {
        let manager = ToolManager::new(&DownloaderConfig::default());
        let cmd = ExtractorCommand {
            program: "sh".to_string(),
            prefix_args: vec!["-c".to_string(), "echo 2024.01.01".to_string()],
            invocation: Invocation::Binary,
        };
        assert_eq!(manager.probe(&cmd).await.as_deref(), Some("2024.01.01"));
    }

    fn missing_tool_manager() -> ToolManager {
        let config = DownloaderConfig::default()
            .with_ytdlp_path(Some("/nonexistent/yt-dlp-missing".into()))
            .with_python("/nonexistent/python-missing");
        ToolManager::new(&config)
    }

    #[tokio::test]
    async fn test_configured_binary_is_used() {
        let manager = missing_tool_manager();
        assert!(manager.detect().await.is_none());
        assert!(!manager.status().await.is_available);
    }

    #[tokio::test]
    async fn test_missing_tool_without_auto_install() {
        let manager = missing_tool_manager().with_install_steps(Vec::new());
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        let result = manager.ensure_available(false, &ProgressEmitter::new(tx)).await;
        assert!(matches!(result, Err(DownloadError::ToolUnavailable(hint)) if hint.contains("pip install")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_tries_each_step_then_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("attempts.log");
        let step = |label: &'static str| InstallStep {
            label,
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("echo {} >> '{}'; exit 1", label, log.display()),
            ],
        };
        let manager = missing_tool_manager().with_install_steps(vec![step("pacman"), step("pip")]);

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let result = manager.ensure_available(true, &ProgressEmitter::new(tx)).await;

        assert!(matches!(result, Err(DownloadError::ToolUnavailable(_))));
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "pacman\npip\n");

        let mut texts = Vec::new();
        while let Ok(crate::downloader::models::DownloadEvent::Log { text }) = rx.try_recv() {
            texts.push(text);
        }
        assert!(texts.iter().any(|t| t.contains("Could not install")));
    }
}
