use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Raw response as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Transport used for every outbound request.
///
/// `Err` is a transport-level failure; HTTP status handling is left to the caller.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> std::result::Result<HttpResponse, String>;
}

pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> std::result::Result<HttpResponse, String> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let resp = request.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| e.to_string())?;

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.to_string(),
            body,
        })
    }
}

/// A fetched HTML page.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

impl Page {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// Plain GET of an HTML page, 200 only.
pub async fn fetch(http: &dyn HttpClient, url: &str) -> Result<Page> {
    debug!("Fetching {}", url);
    let resp = http.get(url, &[]).await.map_err(|reason| Error::Http {
        url: url.to_string(),
        status: None,
        reason,
    })?;

    if !resp.is_ok() {
        warn!("Can't download {} - status code error: {}", url, resp.reason);
        return Err(Error::Http {
            url: url.to_string(),
            status: Some(resp.status),
            reason: resp.reason,
        });
    }

    Ok(Page::new(url, resp.body))
}


#[cfg(test)]
mod tests {
    use super::fake::FakeHttp;
    use super::*;

    #[tokio::test]
    async fn fetch_rejects_non_200() {
        let http = FakeHttp::new().route("https://www.france.tv/missing", 404, "nope");
        let err = fetch(&http, "https://www.france.tv/missing").await.unwrap_err();
        assert!(matches!(err, Error::Http { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn fetch_reports_transport_failure() {
        let http = FakeHttp::new();
        let err = fetch(&http, "https://www.france.tv/down").await.unwrap_err();
        assert!(matches!(err, Error::Http { status: None, .. }));
    }

    #[tokio::test]
    async fn fetch_returns_body() {
        let http = FakeHttp::new().route("https://www.france.tv/ok", 200, "<html></html>");
        let page = fetch(&http, "https://www.france.tv/ok").await.unwrap();
        assert_eq!(page.body, "<html></html>");
    }
}
