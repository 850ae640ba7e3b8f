use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static FORMAT_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([?&])format=json(&|#|$)").expect("valid regex"));

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("valid regex"));

// Builds "{title} - {preTitle} - {additionalTitle}", falling back to the
// episode title when the API has no pre-title. Spaces are dropped from the
// middle component only.
pub fn build_filename(title: &str, pre_title: &str, fallback_title: &str, additional_title: &str) -> String {
    let pre_title = if pre_title.is_empty() { fallback_title } else { pre_title };
    let pre_title = pre_title.replace(' ', "");
    format!("{} - {} - {}", title, pre_title, additional_title)
}

// Replaces characters that are not allowed in a file name
pub fn sanitize_filename(name: &str) -> String {
    UNSAFE_CHARS.replace_all(name, "_").trim().to_string()
}

// Token service URL: the token with its format switched to plain text, then the stream URL
pub fn token_exchange_url(token: &str, stream_url: &str) -> String {
    let token = FORMAT_JSON.replace(token, "${1}format=text${2}");
    format!("{}&url={}", token, stream_url)
}

// True when the URL points to a listing rather than an episode
pub fn is_collection_url(url: &str, markers: &[String]) -> bool {
    markers.iter().any(|marker| url.contains(marker.as_str()))
}

// Absolute episode URL from a card href
pub fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.starts_with("//") {
        return format!("https:{}", href);
    }

    match Url::parse(base).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}{}", base.trim_end_matches('/'), href),
    }
}

/// Where a listing crawl goes next.
#[derive(Debug, PartialEq, Eq)]
pub enum NextPage {
    Url(String),
    /// The current `page=` value is not a number
    Unparsable,
}

// First page gets "/?page=1" appended, later pages have their counter bumped
pub fn next_page_url(url: &str) -> NextPage {
    if !url.contains("?page") {
        return NextPage::Url(format!("{}/?page=1", url.trim_end_matches('/')));
    }

    let Some(idx) = url.rfind("page=") else {
        return NextPage::Unparsable;
    };
    let value_start = idx + "page=".len();
    match url[value_start..].parse::<u64>().ok().and_then(|current| current.checked_add(1)) {
        Some(next) => NextPage::Url(format!("{}{}", &url[..value_start], next)),
        None => NextPage::Unparsable,
    }
}
