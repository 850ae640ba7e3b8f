use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::crawler::{CollectionCrawler, SelectionPolicy};
use crate::dispatch::{FormatDispatcher, Outcome};
use crate::error::Error;
use crate::http::HttpClient;
use crate::queue::DownloadQueue;
use crate::utils::is_collection_url;

/// Per-run tally of episode outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub queued: usize,
    pub skipped: usize,
    pub unsupported: usize,
    pub failed: usize,
}

/// Drives crawling and resolution, and feeds the download queue.
pub struct Pipeline<'a> {
    http: &'a dyn HttpClient,
    config: &'a RunConfig,
    policy: &'a dyn SelectionPolicy,
    queue: &'a DownloadQueue,
    dispatcher: FormatDispatcher<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        http: &'a dyn HttpClient,
        config: &'a RunConfig,
        policy: &'a dyn SelectionPolicy,
        queue: &'a DownloadQueue,
    ) -> Result<Self> {
        Ok(Self {
            http,
            config,
            policy,
            queue,
            dispatcher: FormatDispatcher::new(http, config)?,
        })
    }

    pub async fn run(&self, url: &str) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        if is_collection_url(url, &self.config.schema.collection_markers) {
            info!("Trying to find all videos");
            let episodes = self.collect(url).await?;
            self.process_all(&episodes, &mut summary).await?;
            return Ok(summary);
        }

        match self.dispatcher.resolve(url, self.config.mode).await {
            Ok(outcome) => self.record(outcome, &mut summary).await?,
            Err(e) if e.is_extraction() => {
                // might be a collection page after all
                let episodes = match self.collect(url).await {
                    Ok(episodes) if !episodes.is_empty() => episodes,
                    _ => {
                        warn!("Unexpected script content, make sure you picked an episode page.");
                        return Err(e).with_context(|| format!("Couldn't resolve {}", url));
                    }
                };
                self.process_all(&episodes, &mut summary).await?;
            }
            Err(e) => return Err(e).with_context(|| format!("Couldn't resolve {}", url)),
        }

        Ok(summary)
    }

    async fn collect(&self, url: &str) -> Result<Vec<String>> {
        let crawler = CollectionCrawler::new(self.http, self.config, self.policy)?;
        let collection = crawler.crawl(url).await?;
        info!("{} videos found in {}", collection.episodes.len(), collection.listing_url);
        Ok(collection.episodes)
    }

    async fn process_all(&self, episodes: &[String], summary: &mut RunSummary) -> Result<()> {
        for episode in episodes {
            match self.dispatcher.resolve(episode, self.config.mode).await {
                Ok(outcome) => self.record(outcome, summary).await?,
                Err(e) if self.config.select_all => {
                    error!("Skipping {}: {}", episode, e);
                    summary.failed += 1;
                }
                Err(e) => return Err(e).with_context(|| format!("Couldn't resolve {}", episode)),
            }
        }
        Ok(())
    }

    async fn record(&self, outcome: Outcome, summary: &mut RunSummary) -> Result<()> {
        match outcome {
            Outcome::Queued(job) => {
                self.queue.enqueue(job).await?;
                summary.queued += 1;
            }
            Outcome::AlreadyExists(path) => {
                info!("{} already exists", path.display());
                summary.skipped += 1;
            }
            Outcome::Unsupported { filename, format } => {
                warn!("{}", Error::UnsupportedFormat { filename, format: format.to_string() });
                summary.unsupported += 1;
            }
        }
        Ok(())
    }
}
