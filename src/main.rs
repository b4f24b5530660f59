use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use time::macros::format_description;
use time::OffsetDateTime;

use universal_downloader_lib::downloader::utils::format_bytes;
use universal_downloader_lib::{
    init_tracing, DownloadEvent, Downloader, DownloaderConfig, JobOutcome, JobRequest, ToolManager,
    VideoQuality,
};

#[derive(Parser, Debug)]
#[command(name = "universal-downloader")]
#[command(author, version, about = "Download media and files into category folders", long_about = None)]
struct Cli {
    /// Video page or file URL (https:// is added when missing)
    #[arg(required_unless_present_any = ["check_tool", "install_tool"])]
    url: Option<String>,

    /// Destination root (default: UNIVERSAL_DL_DIR or the Downloads folder)
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Video quality: best, 720p, 480p, 360p
    #[arg(short, long, default_value = "best")]
    quality: VideoQuality,

    /// Extract audio as mp3
    #[arg(short, long)]
    audio_only: bool,

    /// File name to use instead of the detected one
    #[arg(short, long)]
    name: Option<String>,

    /// Proxy URL (overrides UNIVERSAL_DL_PROXY)
    #[arg(long)]
    proxy: Option<String>,

    /// Do not try to install yt-dlp when it is missing
    #[arg(long)]
    no_install: bool,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Report whether yt-dlp is available and exit
    #[arg(long)]
    check_tool: bool,

    /// Install yt-dlp and exit
    #[arg(long)]
    install_tool: bool,
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

fn print_event(event: &DownloadEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        DownloadEvent::Progress { percent } => println!("[{}] {:>3}%", timestamp(), percent),
        DownloadEvent::Log { text } => println!("[{}] {}", timestamp(), text),
        DownloadEvent::Outcome(outcome) => print_outcome(outcome),
    }
    Ok(())
}

fn print_outcome(outcome: &JobOutcome) {
    if outcome.succeeded {
        println!("[{}] ✅ {}", timestamp(), outcome.message);
        if let Some(path) = &outcome.result_path {
            let size = std::fs::metadata(path).map(|m| format_bytes(m.len())).unwrap_or_default();
            println!("[{}] {} {}", timestamp(), path.display(), size);
        }
    } else if outcome.cancelled {
        println!("[{}] ⏹️ {}", timestamp(), outcome.message);
    } else {
        eprintln!("[{}] ❌ {}", timestamp(), outcome.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = DownloaderConfig::from_env().with_auto_install(!cli.no_install);
    if let Some(dest) = cli.dest {
        config = config.with_download_root(dest);
    }
    if cli.proxy.is_some() {
        config = config.with_proxy(cli.proxy);
    }

    if cli.check_tool {
        let info = ToolManager::new(&config).status().await;
        if cli.json {
            println!("{}", serde_json::to_string(&info)?);
        } else if info.is_available {
            println!(
                "yt-dlp {} ({:?}, {})",
                info.version.unwrap_or_default(),
                info.invocation,
                info.path.unwrap_or_default()
            );
        } else {
            println!("yt-dlp not found");
        }
        return Ok(());
    }

    if cli.install_tool {
        let command = ToolManager::new(&config)
            .install(None)
            .await
            .context("yt-dlp installation failed")?;
        println!("yt-dlp ready: {} {}", command.program, command.prefix_args.join(" "));
        return Ok(());
    }

    let Some(url) = cli.url else {
        bail!("a URL is required");
    };

    let request = JobRequest::new(url, config.download_root.clone())
        .with_quality(cli.quality)
        .with_audio_only(cli.audio_only)
        .with_custom_name(cli.name);

    let downloader = Downloader::new(config)?;
    let (job, mut events) = downloader.submit(request)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut outcome = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event, cli.json)?;
                if let DownloadEvent::Outcome(o) = event {
                    outcome = Some(o);
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::info!("[cli] Interrupted, cancelling job #{}", job.id());
                job.cancel().await;
            }
        }
    }

    match outcome {
        Some(o) if o.succeeded => Ok(()),
        Some(o) if o.cancelled => std::process::exit(130),
        Some(o) => bail!(o.message),
        None => bail!("job ended without a result"),
    }
}
