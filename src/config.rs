use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

const DASH_ENDPOINT: &str = "https://k7.ftven.fr/videos/{video_id}?country_code=FR&w=955&h=537&screen_w=1680&screen_h=1050&player_version=5.71.7&domain=www.france.tv&device_type=desktop&browser=chrome&browser_version=108&os=macos&os_version=10_15_7&diffusion_mode=tunnel_first&gmt=0100&video_product_id={content_id}";
const HLS_ENDPOINT: &str = "https://player.webservices.francetelevisions.fr/v1/videos/{video_id}?country_code=FR&w=1024&h=768&version=5.29.4&domain=www.france.tv&device_type=desktop&browser=safari&browser_version=13&os=macos&os_version=10_14_6&diffusion_mode=tunnel_first&gmt=%2B1";

/// Which manifest protocol a resolution attempt runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Hls,
    Dash,
}

impl Mode {
    /// Extension of the file produced by this pipeline
    pub fn extension(self) -> &'static str {
        match self {
            Mode::Hls => "mp4",
            Mode::Dash => "mkv",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Hls => write!(f, "HLS"),
            Mode::Dash => write!(f, "DASH"),
        }
    }
}

/// Markup knobs that follow the upstream site's redesigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSchema {
    /// Script node holding the player payload
    pub player_script_selector: String,
    /// Variable declarations the payload may start with
    pub player_prefixes: Vec<String>,
    /// Anchor of an episode card on a listing page
    pub episode_card_selector: String,
    /// Label inside an episode card, shown when asking for confirmation
    pub episode_label_selector: String,
    /// Base used to absolutize episode card links
    pub site_base: String,
    /// URL fragments identifying a collection page
    pub collection_markers: Vec<String>,
}

impl Default for PageSchema {
    fn default() -> Self {
        Self {
            player_script_selector: "div > div.l-column-left > script".to_string(),
            player_prefixes: vec![
                "window.FTVPlayerVideos".to_string(),
                "let FTVPlayerVideos".to_string(),
            ],
            episode_card_selector: "a.c-card-16x9".to_string(),
            episode_label_selector: ".c-card-16x9__subtitle".to_string(),
            site_base: "https://france.tv".to_string(),
            collection_markers: vec![
                "replay-videos".to_string(),
                "toutes-les-videos".to_string(),
            ],
        }
    }
}

/// Playback API endpoint plus the client identity it expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiProfile {
    /// URL template, `{video_id}` and `{content_id}` are substituted
    pub endpoint: String,
    /// Sent as `Origin` and used as the `Referer` prefix
    pub site_origin: String,
    pub accept_language: String,
    pub sec_ch_ua: String,
    pub sec_ch_ua_platform: String,
}

impl ApiProfile {
    pub fn dash() -> Self {
        Self {
            endpoint: DASH_ENDPOINT.to_string(),
            ..Self::common()
        }
    }

    pub fn hls() -> Self {
        Self {
            endpoint: HLS_ENDPOINT.to_string(),
            ..Self::common()
        }
    }

    fn common() -> Self {
        Self {
            endpoint: String::new(),
            site_origin: "https://www.france.tv".to_string(),
            accept_language: "fr-FR;q=0.9,fr;q=0.8".to_string(),
            sec_ch_ua: "\"Chromium\";v=\"108\", \"Google Chrome\";v=\"108\"".to_string(),
            sec_ch_ua_platform: "\"macOS\"".to_string(),
        }
    }

    pub fn request_url(&self, video_id: &str, content_id: i64) -> String {
        self.endpoint
            .replace("{video_id}", video_id)
            .replace("{content_id}", &content_id.to_string())
    }
}

/// Options for one run, handed to each component when it is built.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    /// Accept every discovered episode without asking
    pub select_all: bool,
    pub subs_only: bool,
    pub debug: bool,
    pub output_dir: PathBuf,
    pub workers: usize,
    /// Upper bound on listing pages fetched by one crawl
    pub max_pages: usize,
    pub request_timeout: Duration,
    /// Replace filesystem-unsafe characters in output filenames
    pub sanitize_filenames: bool,
    pub user_agent: String,
    pub schema: PageSchema,
    pub hls_api: ApiProfile,
    pub dash_api: ApiProfile,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Dash,
            select_all: false,
            subs_only: false,
            debug: false,
            output_dir: PathBuf::from("."),
            workers: 3,
            max_pages: 50,
            request_timeout: Duration::from_secs(30),
            sanitize_filenames: false,
            user_agent: USER_AGENT.to_string(),
            schema: PageSchema::default(),
            hls_api: ApiProfile::hls(),
            dash_api: ApiProfile::dash(),
        }
    }
}

impl RunConfig {
    pub fn api(&self, mode: Mode) -> &ApiProfile {
        match mode {
            Mode::Hls => &self.hls_api,
            Mode::Dash => &self.dash_api,
        }
    }

    /// Layer a config file on top of the current values.
    pub fn apply(&mut self, file: FileConfig) {
        if let Some(schema) = file.schema {
            self.schema = schema;
        }
        if let Some(api) = file.hls_api {
            self.hls_api = api;
        }
        if let Some(api) = file.dash_api {
            self.dash_api = api;
        }
        if let Some(user_agent) = file.user_agent {
            self.user_agent = user_agent;
        }
        if let Some(max_pages) = file.max_pages {
            self.max_pages = max_pages;
        }
        if let Some(sanitize) = file.sanitize_filenames {
            self.sanitize_filenames = sanitize;
        }
    }
}

/// On-disk overrides, every section optional.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub schema: Option<PageSchema>,
    pub hls_api: Option<ApiProfile>,
    pub dash_api: Option<ApiProfile>,
    pub user_agent: Option<String>,
    pub max_pages: Option<usize>,
    pub sanitize_filenames: Option<bool>,
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config overrides from {}", path.display());
        Self::parse(&contents)
    }

    /// `<config dir>/ftvgrab/config.toml`, only if it exists
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("ftvgrab");
        path.push("config.toml");
        path.exists().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_substitutes_identifiers() {
        let url = ApiProfile::dash().request_url("abc-123", 42);
        assert!(url.starts_with("https://k7.ftven.fr/videos/abc-123?"));
        assert!(url.ends_with("video_product_id=42"));
    }

    #[test]
    fn partial_schema_keeps_defaults() {
        let file = FileConfig::parse(
            r#"
            max_pages = 5

            [schema]
            player_prefixes = ["var FTVPlayerVideos"]
            "#,
        )
        .unwrap();

        let mut config = RunConfig::default();
        config.apply(file);

        assert_eq!(config.max_pages, 5);
        assert_eq!(config.schema.player_prefixes, vec!["var FTVPlayerVideos"]);
        assert_eq!(config.schema.episode_card_selector, "a.c-card-16x9");
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(matches!(FileConfig::parse("max_pages = \"x\""), Err(Error::Config(_))));
    }
}
