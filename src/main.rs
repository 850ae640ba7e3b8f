use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

mod config;
mod crawler;
mod dispatch;
mod error;
mod extractor;
mod http;
mod pipeline;
mod queue;
mod stream;
mod ui;
mod utils;

use config::{FileConfig, Mode, RunConfig};
use crawler::{AcceptAll, PromptEachWithLabel, SelectionPolicy};
use http::ReqwestClient;
use pipeline::Pipeline;
use queue::{DownloadQueue, FfmpegDownloader};

#[derive(Parser)]
#[command(name = "ftvgrab", version, about = "Download france.tv episodes and whole shows")]
struct Cli {
    /// URL of the episode or collection page
    #[arg(long = "url", value_name = "URL")]
    url: Option<String>,

    /// Same as --url
    #[arg(value_name = "PAGE_URL", conflicts_with = "url")]
    page: Option<String>,

    /// Download all episodes if the page contains multiple videos
    #[arg(short, long)]
    all: bool,

    /// Only download the subtitles
    #[arg(long = "subs-only", alias = "subsOnly")]
    subs_only: bool,

    /// Verbose diagnostics
    #[arg(long)]
    debug: bool,

    /// Use the HLS/m3u8 pipeline instead of DASH
    #[arg(long)]
    m3u8: bool,

    /// Where downloaded files go (defaults to the working directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of parallel download workers
    #[arg(short, long, default_value_t = 3)]
    workers: usize,

    /// Maximum number of listing pages to crawl
    #[arg(long)]
    max_pages: Option<usize>,

    /// TOML file overriding page selectors and API endpoints
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replace characters that are unsafe in file names
    #[arg(long)]
    sanitize: bool,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "ftvgrab=debug" } else { "ftvgrab=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let url = cli.url.clone().or(cli.page.clone()).ok_or_else(|| {
        anyhow!(
            "you need to pass the URL of a france.tv episode page. \
             Take a look at https://www.france.tv/enfants/six-huit-ans/ for ideas"
        )
    })?;
    Url::parse(&url).with_context(|| format!("Something went wrong when trying to parse {}", url))?;

    let config = build_config(&cli)?;
    if config.debug {
        info!("Debug mode enabled");
    }
    if config.subs_only {
        info!("Downloading subtitles only");
    }
    info!("Checking {} ({} pipeline)", url, config.mode);

    let http = ReqwestClient::new(&config.user_agent, config.request_timeout)?;
    let queue = DownloadQueue::start(config.workers, Arc::new(FfmpegDownloader::new()));
    let policy: &dyn SelectionPolicy = if config.select_all {
        &AcceptAll
    } else {
        &PromptEachWithLabel
    };

    let resolved = {
        let pipeline = Pipeline::new(&http, &config, policy, &queue)?;
        tokio::select! {
            result = pipeline.run(&url) => result,
            _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted")),
        }
    };
    let summary = resolved?;
    info!(
        "{} queued, {} already downloaded, {} unsupported, {} failed",
        summary.queued, summary.skipped, summary.unsupported, summary.failed
    );

    let report = tokio::select! {
        report = queue.finish() => report,
        _ = tokio::signal::ctrl_c() => return Err(anyhow!("interrupted while downloading")),
    };
    info!("{} downloads completed, {} failed", report.completed, report.failed);

    Ok(())
}

fn build_config(cli: &Cli) -> Result<RunConfig> {
    let output_dir = match &cli.output_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read the working directory")?,
    };

    let mut config = RunConfig {
        mode: if cli.m3u8 { Mode::Hls } else { Mode::Dash },
        select_all: cli.all,
        subs_only: cli.subs_only,
        debug: cli.debug,
        output_dir,
        workers: cli.workers,
        request_timeout: Duration::from_secs(cli.timeout),
        ..RunConfig::default()
    };

    if let Some(path) = cli.config.clone().or_else(FileConfig::default_path) {
        config.apply(FileConfig::load(&path)?);
    }
    if let Some(max_pages) = cli.max_pages {
        config.max_pages = max_pages;
    }
    if cli.sanitize {
        config.sanitize_filenames = true;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_run_config() {
        let cli = Cli::parse_from([
            "ftvgrab",
            "--all",
            "--m3u8",
            "--subs-only",
            "--max-pages",
            "7",
            "-o",
            "/tmp/ftv",
            "https://www.france.tv/x.html",
        ]);
        assert_eq!(cli.page.as_deref(), Some("https://www.france.tv/x.html"));

        let config = build_config(&cli).unwrap();
        assert_eq!(config.mode, Mode::Hls);
        assert!(config.select_all);
        assert!(config.subs_only);
        assert_eq!(config.max_pages, 7);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/ftv"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = Cli::parse_from(["ftvgrab", "--url", "https://www.france.tv/x.html", "--config", "/nonexistent/ftvgrab.toml"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
