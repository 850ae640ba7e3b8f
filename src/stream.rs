use serde::Deserialize;
use tracing::{debug, error};

use crate::config::{Mode, RunConfig};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::utils::token_exchange_url;

/// Playback API answer. The API shape has drifted over time, so every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamData {
    #[serde(default)]
    pub video: StreamVideo,
    #[serde(default)]
    pub meta: StreamMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamVideo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<Token>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub is_live: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamMeta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub pre_title: Option<String>,
    #[serde(default)]
    pub additional_title: Option<String>,
}

/// Signed-URL token: older responses carry a bare string, newer ones nest it per CDN.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Token {
    Plain(String),
    Nested {
        #[serde(default)]
        akamai: Option<String>,
    },
}

impl Token {
    pub fn as_str(&self) -> &str {
        match self {
            Token::Plain(token) => token,
            Token::Nested { akamai } => akamai.as_deref().unwrap_or_default(),
        }
    }
}

/// Format declared by the playback API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFormat {
    Hls,
    Dash,
    Other(String),
}

impl StreamFormat {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "hls" => StreamFormat::Hls,
            "dash" => StreamFormat::Dash,
            other => StreamFormat::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamFormat::Hls => write!(f, "hls"),
            StreamFormat::Dash => write!(f, "dash"),
            StreamFormat::Other(other) => write!(f, "{}", other),
        }
    }
}

impl StreamData {
    pub fn format(&self) -> StreamFormat {
        StreamFormat::parse(self.video.format.as_deref().unwrap_or_default())
    }

    pub fn url(&self) -> &str {
        self.video.url.as_deref().unwrap_or_default()
    }

    pub fn token(&self) -> &str {
        self.video.token.as_ref().map(Token::as_str).unwrap_or_default()
    }
}

/// Talks to the playback API and the token service.
pub struct StreamResolver<'a> {
    http: &'a dyn HttpClient,
    config: &'a RunConfig,
}

impl<'a> StreamResolver<'a> {
    pub fn new(http: &'a dyn HttpClient, config: &'a RunConfig) -> Self {
        Self { http, config }
    }

    /// Fetch stream metadata for one video from the API backing `mode`.
    pub async fn fetch_stream(
        &self,
        mode: Mode,
        video_id: &str,
        content_id: i64,
        origin_path: &str,
    ) -> Result<StreamData> {
        let profile = self.config.api(mode);
        let url = profile.request_url(video_id, content_id);
        debug!("Requesting {} stream info: {}", mode, url);

        let headers = [
            ("Accept", "*/*".to_string()),
            ("Accept-Language", profile.accept_language.clone()),
            ("Dnt", "1".to_string()),
            ("Origin", profile.site_origin.clone()),
            ("Referer", format!("{}{}", profile.site_origin, origin_path)),
            ("Sec-Fetch-Dest", "empty".to_string()),
            ("Sec-Fetch-Mode", "cors".to_string()),
            ("Sec-Fetch-Site", "cross-site".to_string()),
            ("User-Agent", self.config.user_agent.clone()),
            ("Sec-Ch-Ua", profile.sec_ch_ua.clone()),
            ("Sec-Ch-Ua-Platform", profile.sec_ch_ua_platform.clone()),
        ];

        let resp = self.http.get(&url, &headers).await.map_err(|e| {
            error!("Failed to send request to {}: {}", url, e);
            Error::Api { url: url.clone(), status: None }
        })?;

        if !resp.is_ok() {
            return Err(Error::Api {
                url,
                status: Some(resp.status),
            });
        }

        serde_json::from_str(&resp.body).map_err(|source| Error::Decode {
            url,
            body: resp.body,
            source,
        })
    }

    /// Final manifest URL, exchanging the signed token when there is one.
    pub async fn manifest_url(&self, stream: &StreamData) -> Result<String> {
        let token = stream.token();
        if token.is_empty() {
            debug!("video token not set");
            return Ok(stream.url().to_string());
        }

        let url = token_exchange_url(token, stream.url());
        let resp = self.http.get(&url, &[]).await.map_err(|e| {
            error!("Failed to fetch the token URL {}: {}", url, e);
            Error::Token { url: url.clone(), status: None }
        })?;

        if !resp.is_ok() {
            return Err(Error::Token {
                url,
                status: Some(resp.status),
            });
        }

        debug!("Manifest URL: {}", resp.body);
        Ok(resp.body)
    }
}
