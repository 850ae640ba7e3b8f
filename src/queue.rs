use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::future::join_all;
use indicatif::MultiProgress;
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Mode;
use crate::ui;

/// A resolved episode ready to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub manifest_url: String,
    pub dest_dir: PathBuf,
    /// File stem, without extension
    pub filename: String,
    pub mode: Mode,
    pub subs_only: bool,
}

impl Job {
    pub fn destination(&self) -> PathBuf {
        self.dest_dir.join(format!("{}.{}", self.filename, self.mode.extension()))
    }

    pub fn subtitles_destination(&self) -> PathBuf {
        self.dest_dir.join(format!("{}.srt", self.filename))
    }
}

/// Performs the transfer of one job.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, job: &Job) -> Result<()>;
}

/// Remuxes the manifest with ffmpeg, which reads both HLS playlists and DASH manifests.
pub struct FfmpegDownloader {
    program: String,
    progress: MultiProgress,
}

impl FfmpegDownloader {
    pub fn new() -> Self {
        let program = find_program("ffmpeg").unwrap_or_else(|| {
            warn!("ffmpeg not found in PATH, downloads will fail");
            "ffmpeg".to_string()
        });

        Self {
            program,
            progress: MultiProgress::new(),
        }
    }

    fn arguments(job: &Job) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-n", "-i", job.manifest_url.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if job.subs_only {
            // srt holds a single track, keep the first one
            args.extend(["-map", "0:s:0?", "-c:s", "srt"].map(String::from));
            args.push(job.subtitles_destination().to_string_lossy().into_owned());
            return args;
        }

        match job.mode {
            Mode::Hls => args.extend(["-c", "copy", "-sn", "-bsf:a", "aac_adtstoasc"].map(String::from)),
            Mode::Dash => args.extend(["-map", "0", "-c", "copy"].map(String::from)),
        }
        args.push(job.destination().to_string_lossy().into_owned());
        args
    }
}

impl Default for FfmpegDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for FfmpegDownloader {
    async fn download(&self, job: &Job) -> Result<()> {
        tokio::fs::create_dir_all(&job.dest_dir)
            .await
            .with_context(|| format!("Failed to create {}", job.dest_dir.display()))?;

        let spinner = ui::job_spinner(&self.progress, format!("{} ({})", job.filename, job.mode));
        let output = Command::new(&self.program)
            .args(Self::arguments(job))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to start {}", self.program))?;
        spinner.finish_and_clear();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("ffmpeg exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(())
    }
}

fn find_program(program: &str) -> Option<String> {
    let output = std::process::Command::new("which").arg(program).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8(output.stdout).ok()?;
    let path = path.trim();
    (!path.is_empty()).then(|| path.to_string())
}

/// Jobs that went through the pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueReport {
    pub completed: usize,
    pub failed: usize,
}

/// Fixed pool of workers draining one ordered channel.
pub struct DownloadQueue {
    sender: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<QueueReport>>,
}

impl DownloadQueue {
    pub fn start(workers: usize, downloader: Arc<dyn Downloader>) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(workers * 2);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers)
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let downloader = Arc::clone(&downloader);
                tokio::spawn(async move { worker(id, receiver, downloader).await })
            })
            .collect();

        Self { sender, workers }
    }

    pub async fn enqueue(&self, job: Job) -> Result<()> {
        info!("Queuing up {}", job.destination().display());
        self.sender
            .send(job)
            .await
            .map_err(|_| anyhow!("download queue is closed"))
    }

    /// Close the channel and wait for every worker to drain it.
    pub async fn finish(self) -> QueueReport {
        drop(self.sender);

        let mut report = QueueReport::default();
        for result in join_all(self.workers).await {
            match result {
                Ok(stats) => {
                    report.completed += stats.completed;
                    report.failed += stats.failed;
                }
                Err(e) => error!("Download worker crashed: {}", e),
            }
        }
        report
    }
}

async fn worker(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>, downloader: Arc<dyn Downloader>) -> QueueReport {
    let mut stats = QueueReport::default();
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else { break };

        debug!("worker {} picked {}", id, job.filename);
        match downloader.download(&job).await {
            Ok(()) => {
                info!("Downloaded {}", job.destination().display());
                stats.completed += 1;
            }
            Err(e) => {
                error!("Failed to download {}: {:#}", job.filename, e);
                stats.failed += 1;
            }
        }
    }
    stats
}
