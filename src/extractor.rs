use chrono::{DateTime, FixedOffset};
use scraper::Selector;
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::PageSchema;
use crate::error::{Error, Result};
use crate::http::Page;

/// Identifies one episode, as embedded by the site in its player script.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoData {
    /// Product id expected by the playback API
    #[serde(default)]
    pub content_id: i64,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub video_title: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
    /// Usually a site-relative path, sometimes null
    #[serde(default)]
    pub origin_url: serde_json::Value,
    #[serde(default)]
    pub end_date: Option<DateTime<FixedOffset>>,
}

impl VideoData {
    pub fn origin_path(&self) -> &str {
        self.origin_url.as_str().unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.video_title.as_deref().unwrap_or_default()
    }
}

/// Pulls [`VideoData`] out of an episode page.
///
/// The lookup depends on the exact DOM position and variable name the site
/// uses, both taken from [`PageSchema`].
pub struct VideoDataExtractor {
    script: Selector,
    prefixes: Vec<String>,
}

impl VideoDataExtractor {
    pub fn new(schema: &PageSchema) -> Result<Self> {
        let script = Selector::parse(&schema.player_script_selector).map_err(|e| {
            Error::Config(format!("bad player selector {:?}: {}", schema.player_script_selector, e))
        })?;

        Ok(Self {
            script,
            prefixes: schema.player_prefixes.clone(),
        })
    }

    pub fn extract(&self, page: &Page) -> Result<VideoData> {
        let script_text = {
            let document = page.document();
            document
                .select(&self.script)
                .flat_map(|el| el.text())
                .collect::<String>()
        };

        let data = self.extract_from_script(&script_text).inspect_err(|e| {
            if matches!(e, Error::MissingPlayerJsonData) {
                debug!("Didn't find the expected json data in {}", page.url);
            }
        })?;

        if data.video_id.is_empty() {
            return Err(Error::MissingVideoId);
        }
        Ok(data)
    }

    /// Decode the player payload from the raw script text.
    pub fn extract_from_script(&self, script_text: &str) -> Result<VideoData> {
        let text = script_text.trim();
        if !self.prefixes.iter().any(|prefix| text.starts_with(prefix.as_str())) {
            return Err(Error::NoPlayerData);
        }

        let (Some(start), Some(end)) = (text.find('['), text.rfind(';')) else {
            return Err(Error::MissingPlayerJsonData);
        };
        if end <= start {
            return Err(Error::MissingPlayerJsonData);
        }

        debug!("Parsing the json data");
        let fragment = &text[start..end];
        let videos: Vec<VideoData> = serde_json::from_str(fragment).map_err(|source| {
            error!("Failed to parse video json data:\n{}\nerr: {}", fragment, source);
            Error::BadPlayerJsonData {
                fragment: fragment.to_string(),
                source,
            }
        })?;

        videos.into_iter().next().ok_or(Error::MissingPlayerJsonData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> VideoDataExtractor {
        VideoDataExtractor::new(&PageSchema::default()).unwrap()
    }

    fn episode_page(script: &str) -> Page {
        Page::new(
            "https://www.france.tv/france-5/c-dans-l-air/episode-1.html",
            format!(
                "<html><body><div><div class=\"l-column-left\"><script>{}</script></div></div></body></html>",
                script
            ),
        )
    }

    #[test]
    fn decodes_let_declaration() {
        let data = extractor()
            .extract_from_script(r#"let FTVPlayerVideos = [{"videoId":"abc","contentId":7}];"#)
            .unwrap();
        assert_eq!(data.video_id, "abc");
        assert_eq!(data.content_id, 7);
    }

    #[test]
    fn extracts_from_page_markup() {
        let page = episode_page(
            r#"
            window.FTVPlayerVideos = [{"videoId":"f00","contentId":1234,"videoTitle":"Episode 1","originUrl":"/france-5/episode-1.html","endDate":"2024-03-01T23:59:00+01:00"}];
            "#,
        );
        let data = extractor().extract(&page).unwrap();
        assert_eq!(data.video_id, "f00");
        assert_eq!(data.content_id, 1234);
        assert_eq!(data.title(), "Episode 1");
        assert_eq!(data.origin_path(), "/france-5/episode-1.html");
        assert!(data.end_date.is_some());
    }

    #[test]
    fn only_first_video_is_used() {
        let data = extractor()
            .extract_from_script(r#"let FTVPlayerVideos = [{"videoId":"one"},{"videoId":"two"}];"#)
            .unwrap();
        assert_eq!(data.video_id, "one");
    }

    #[test]
    fn missing_marker_is_no_player_data() {
        let page = episode_page("var somethingElse = 1;");
        assert!(matches!(extractor().extract(&page), Err(Error::NoPlayerData)));
    }

    #[test]
    fn absent_script_node_is_no_player_data() {
        let page = Page::new("https://www.france.tv/", "<html><body><p>hello</p></body></html>");
        assert!(matches!(extractor().extract(&page), Err(Error::NoPlayerData)));

        let page = Page::new("https://www.france.tv/", "<div><div class=\"l-column-left\"><script>");
        assert!(matches!(extractor().extract(&page), Err(Error::NoPlayerData)));
    }

    #[test]
    fn marker_without_array_is_missing_json() {
        assert!(matches!(
            extractor().extract_from_script("let FTVPlayerVideos = null;"),
            Err(Error::MissingPlayerJsonData)
        ));
        assert!(matches!(
            extractor().extract_from_script("let FTVPlayerVideos = ; [1]"),
            Err(Error::MissingPlayerJsonData)
        ));
    }

    #[test]
    fn broken_json_keeps_fragment() {
        let err = extractor()
            .extract_from_script(r#"let FTVPlayerVideos = [{"videoId":];"#)
            .unwrap_err();
        match err {
            Error::BadPlayerJsonData { fragment, .. } => assert_eq!(fragment, r#"[{"videoId":]"#),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_video_id_is_rejected() {
        let page = episode_page(r#"let FTVPlayerVideos = [{"contentId":3}];"#);
        assert!(matches!(extractor().extract(&page), Err(Error::MissingVideoId)));
    }

    #[test]
    fn prefixes_come_from_schema() {
        let schema = PageSchema {
            player_prefixes: vec!["var PlayerData".to_string()],
            ..PageSchema::default()
        };
        let extractor = VideoDataExtractor::new(&schema).unwrap();
        assert!(extractor.extract_from_script(r#"var PlayerData = [{"videoId":"x"}];"#).is_ok());
        assert!(matches!(
            extractor.extract_from_script(r#"let FTVPlayerVideos = [{"videoId":"x"}];"#),
            Err(Error::NoPlayerData)
        ));
    }
}
