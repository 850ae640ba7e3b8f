use scraper::Selector;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::http::{self, HttpClient, Page};
use crate::ui;
use crate::utils::{NextPage, absolute_url, next_page_url};

/// An episode card found on a listing page.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub url: String,
    pub label: String,
}

/// Decides which discovered episodes are kept.
pub trait SelectionPolicy {
    fn accept(&self, candidate: &Candidate) -> bool;
}

/// Keeps everything, used with `--all`.
pub struct AcceptAll;

impl SelectionPolicy for AcceptAll {
    fn accept(&self, candidate: &Candidate) -> bool {
        info!("Adding {}", candidate.label);
        true
    }
}

/// Asks on the terminal for every episode.
pub struct PromptEachWithLabel;

impl SelectionPolicy for PromptEachWithLabel {
    fn accept(&self, candidate: &Candidate) -> bool {
        let question = format!("Do you want to download {} ? (Type y for Yes)", candidate.label);
        match ui::prompt_input(&question) {
            Ok(answer) => is_affirmative(&answer),
            Err(e) => {
                warn!("Could not read the answer, skipping {}: {}", candidate.label, e);
                false
            }
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y")
}

/// Episode URLs gathered from a listing, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct CollectionPage {
    pub listing_url: String,
    pub episodes: Vec<String>,
}

pub struct CollectionCrawler<'a> {
    http: &'a dyn HttpClient,
    policy: &'a dyn SelectionPolicy,
    card: Selector,
    label: Selector,
    site_base: String,
    max_pages: usize,
}

impl<'a> CollectionCrawler<'a> {
    pub fn new(http: &'a dyn HttpClient, config: &RunConfig, policy: &'a dyn SelectionPolicy) -> Result<Self> {
        let schema = &config.schema;
        let card = Selector::parse(&schema.episode_card_selector).map_err(|e| {
            Error::Config(format!("bad episode card selector {:?}: {}", schema.episode_card_selector, e))
        })?;
        let label = Selector::parse(&schema.episode_label_selector).map_err(|e| {
            Error::Config(format!("bad episode label selector {:?}: {}", schema.episode_label_selector, e))
        })?;

        Ok(Self {
            http,
            policy,
            card,
            label,
            site_base: schema.site_base.clone(),
            max_pages: config.max_pages,
        })
    }

    /// Walk the listing and its pagination until a page has no episode card.
    pub async fn crawl(&self, listing_url: &str) -> Result<CollectionPage> {
        let mut collection = CollectionPage {
            listing_url: listing_url.to_string(),
            episodes: Vec::new(),
        };
        let mut url = listing_url.to_string();

        for page_number in 0..self.max_pages {
            let page = match http::fetch(self.http, &url).await {
                Ok(page) => page,
                Err(e) if page_number == 0 => return Err(e),
                Err(e) => {
                    warn!("Stopping pagination: {}", e);
                    return Ok(collection);
                }
            };

            let candidates = self.candidates(&page);
            if candidates.is_empty() {
                if collection.episodes.is_empty() {
                    info!("No videos found on {}", url);
                }
                return Ok(collection);
            }
            debug!("{} episode cards on {}", candidates.len(), url);

            for candidate in &candidates {
                if self.policy.accept(candidate) {
                    collection.episodes.push(candidate.url.clone());
                }
            }

            match next_page_url(&url) {
                NextPage::Url(next) => {
                    debug!("Checking pagination: {}", next);
                    url = next;
                }
                NextPage::Unparsable => {
                    warn!("{}", Error::PaginationParse { url });
                    return Ok(collection);
                }
            }
        }

        warn!(
            "Stopped after {} listing pages, {} episodes collected",
            self.max_pages,
            collection.episodes.len()
        );
        Ok(collection)
    }

    fn candidates(&self, page: &Page) -> Vec<Candidate> {
        let document = page.document();
        document
            .select(&self.card)
            .map(|card| {
                let href = card.value().attr("href").unwrap_or_default();
                let label = card
                    .select(&self.label)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
                    .unwrap_or_default();

                Candidate {
                    url: absolute_url(&self.site_base, href),
                    label,
                }
            })
            .collect()
    }
}
