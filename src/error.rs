use thiserror::Error;

/// Everything that can go wrong while turning a page URL into a download job.
#[derive(Debug, Error)]
pub enum Error {
    /// Page fetch failed at the transport level or returned a non-200 status
    #[error("failed to fetch {url}: {reason}")]
    Http {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// The player script marker is missing: not an episode page
    #[error("no player data found in the page")]
    NoPlayerData,

    /// Marker present but no `[...]` span could be isolated
    #[error("no JSON data found in the player script")]
    MissingPlayerJsonData,

    #[error("bad JSON data found in the player script: {source}")]
    BadPlayerJsonData {
        fragment: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("player data has no video id")]
    MissingVideoId,

    #[error("playback API request to {url} failed: {}", describe_status(.status, "transport error"))]
    Api { url: String, status: Option<u16> },

    #[error("failed to parse the playback API response from {url}: {source}\nbody: {body}")]
    Decode {
        url: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("token exchange at {url} failed: {}", describe_status(.status, "transport error"))]
    Token { url: String, status: Option<u16> },

    #[error("{filename} is in an unsupported format: {format}")]
    UnsupportedFormat { filename: String, format: String },

    #[error("couldn't get the next page from {url}")]
    PaginationParse { url: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Failures that may mean the URL points to a collection page rather than an episode.
    pub fn is_extraction(&self) -> bool {
        matches!(
            self,
            Error::NoPlayerData
                | Error::MissingPlayerJsonData
                | Error::BadPlayerJsonData { .. }
                | Error::MissingVideoId
        )
    }
}

fn describe_status(status: &Option<u16>, fallback: &str) -> String {
    match status {
        Some(code) => format!("status code {}", code),
        None => fallback.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
