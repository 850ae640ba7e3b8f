use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::{Mode, RunConfig};
use crate::error::Result;
use crate::extractor::{VideoData, VideoDataExtractor};
use crate::http::{self, HttpClient};
use crate::queue::Job;
use crate::stream::{StreamData, StreamFormat, StreamResolver};
use crate::utils::{build_filename, sanitize_filename};

/// What happened to one episode page.
#[derive(Debug)]
pub enum Outcome {
    Queued(Job),
    /// The destination file is already on disk
    AlreadyExists(PathBuf),
    Unsupported { filename: String, format: StreamFormat },
}

/// Runs page → player data → stream → job for one episode, in HLS or DASH mode.
///
/// HLS mode switches to DASH once when the API announces a DASH stream. DASH mode
/// never switches back.
pub struct FormatDispatcher<'a> {
    http: &'a dyn HttpClient,
    config: &'a RunConfig,
    extractor: VideoDataExtractor,
}

impl<'a> FormatDispatcher<'a> {
    pub fn new(http: &'a dyn HttpClient, config: &'a RunConfig) -> Result<Self> {
        Ok(Self {
            http,
            config,
            extractor: VideoDataExtractor::new(&config.schema)?,
        })
    }

    pub async fn resolve(&self, page_url: &str, mode: Mode) -> Result<Outcome> {
        let resolver = StreamResolver::new(self.http, self.config);
        let mut mode = mode;
        let mut allow_fallback = mode == Mode::Hls;

        loop {
            let page = http::fetch(self.http, page_url).await?;
            let video = self.extractor.extract(&page)?;
            debug!(
                "Video {} (product {}) of {:?} from {}, available until {:?}",
                video.video_id, video.content_id, video.program_name, page_url, video.end_date
            );

            let stream = resolver
                .fetch_stream(mode, &video.video_id, video.content_id, video.origin_path())
                .await?;

            if stream.video.is_live == Some(true) {
                debug!("{} is a live stream", page_url);
            }

            if allow_fallback && stream.format() == StreamFormat::Dash {
                info!("{} is only available as DASH, switching pipeline", page_url);
                mode = Mode::Dash;
                allow_fallback = false;
                continue;
            }

            return self.dispatch(&resolver, mode, &video, &stream).await;
        }
    }

    async fn dispatch(
        &self,
        resolver: &StreamResolver<'_>,
        mode: Mode,
        video: &VideoData,
        stream: &StreamData,
    ) -> Result<Outcome> {
        let filename = self.filename(video, stream);
        let format = stream.format();

        if mode == Mode::Hls && format != StreamFormat::Hls {
            return Ok(Outcome::Unsupported { filename, format });
        }
        if mode == Mode::Dash && format != StreamFormat::Dash {
            warn!("{} announced as {}, handing it to the DASH path anyway", filename, format);
        }

        let job = Job {
            manifest_url: String::new(),
            dest_dir: self.config.output_dir.clone(),
            filename,
            mode,
            subs_only: self.config.subs_only,
        };

        let destination = if job.subs_only {
            job.subtitles_destination()
        } else {
            job.destination()
        };
        if destination.exists() {
            return Ok(Outcome::AlreadyExists(destination));
        }

        let manifest_url = resolver.manifest_url(stream).await?;
        debug!("{} manifest URL: {}", mode, manifest_url);

        Ok(Outcome::Queued(Job { manifest_url, ..job }))
    }

    fn filename(&self, video: &VideoData, stream: &StreamData) -> String {
        let meta = &stream.meta;
        let filename = build_filename(
            meta.title.as_deref().unwrap_or_default(),
            meta.pre_title.as_deref().unwrap_or_default(),
            video.title(),
            meta.additional_title.as_deref().unwrap_or_default(),
        );

        if self.config.sanitize_filenames {
            sanitize_filename(&filename)
        } else {
            filename
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::error::Error;
    use crate::http::fake::FakeHttp;

    const PAGE: &str = "https://www.france.tv/france-2/show/1234-episode.html";
    const HLS_API: &str = "https://hls.test/videos/vid-9";
    const DASH_API: &str = "https://dash.test/videos/vid-9?p=55";
    const TOKEN: &str = "https://tok.test/esi?format=text&url=https://cdn.test/master";

    fn page_html() -> String {
        r#"<html><body><div><div class="l-column-left"><script>
            window.FTVPlayerVideos = [{"videoId":"vid-9","contentId":55,"videoTitle":"Episode 12","originUrl":"/france-2/show/1234-episode.html"}];
        </script></div></div></body></html>"#
            .to_string()
    }

    fn stream_json(format: &str, pre_title: &str) -> String {
        format!(
            r#"{{"video":{{"url":"https://cdn.test/master","format":"{format}","token":{{"akamai":"https://tok.test/esi?format=json"}}}},"meta":{{"title":"Show","pre_title":"{pre_title}","additional_title":"Pilot/1"}}}}"#
        )
    }

    fn config(dir: &TempDir) -> RunConfig {
        let mut config = RunConfig::default();
        config.output_dir = dir.path().to_path_buf();
        config.hls_api.endpoint = "https://hls.test/videos/{video_id}".to_string();
        config.dash_api.endpoint = "https://dash.test/videos/{video_id}?p={content_id}".to_string();
        config
    }

    #[tokio::test]
    async fn hls_stream_is_queued_as_mp4() {
        let dir = TempDir::new().unwrap();
        let http = FakeHttp::new()
            .route(PAGE, 200, &page_html())
            .route(HLS_API, 200, &stream_json("hls", "S1 E12"))
            .route(TOKEN, 200, "https://cdn.test/master.m3u8?hdnea=1");
        let config = config(&dir);
        let dispatcher = FormatDispatcher::new(&http, &config).unwrap();

        match dispatcher.resolve(PAGE, Mode::Hls).await.unwrap() {
            Outcome::Queued(job) => {
                assert_eq!(job.manifest_url, "https://cdn.test/master.m3u8?hdnea=1");
                assert_eq!(job.filename, "Show - S1E12 - Pilot/1");
                assert_eq!(job.mode, Mode::Hls);
                assert!(job.destination().to_string_lossy().ends_with(".mp4"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(http.count(DASH_API), 0);
    }

    #[tokio::test]
    async fn dash_stream_in_hls_mode_falls_back_once() {
        let dir = TempDir::new().unwrap();
        let http = FakeHttp::new()
            .route(PAGE, 200, &page_html())
            .route(HLS_API, 200, &stream_json("dash", ""))
            .route(DASH_API, 200, &stream_json("dash", ""))
            .route(TOKEN, 200, "https://cdn.test/manifest.mpd");
        let config = config(&dir);
        let dispatcher = FormatDispatcher::new(&http, &config).unwrap();

        match dispatcher.resolve(PAGE, Mode::Hls).await.unwrap() {
            Outcome::Queued(job) => {
                assert_eq!(job.mode, Mode::Dash);
                assert_eq!(job.filename, "Show - Episode12 - Pilot/1");
                assert!(job.destination().to_string_lossy().ends_with(".mkv"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(http.count(HLS_API), 1);
        assert_eq!(http.count(DASH_API), 1);
    }

    #[tokio::test]
    async fn dash_mode_never_falls_back() {
        let dir = TempDir::new().unwrap();
        let http = FakeHttp::new()
            .route(PAGE, 200, &page_html())
            .route(HLS_API, 200, &stream_json("dash", ""))
            .route(DASH_API, 200, &stream_json("hls", ""))
            .route(TOKEN, 200, "https://cdn.test/manifest");
        let config = config(&dir);
        let dispatcher = FormatDispatcher::new(&http, &config).unwrap();

        let outcome = dispatcher.resolve(PAGE, Mode::Hls).await.unwrap();
        assert!(matches!(outcome, Outcome::Queued(Job { mode: Mode::Dash, .. })));
        assert_eq!(http.count(HLS_API), 1);
        assert_eq!(http.count(DASH_API), 1);
    }

    #[tokio::test]
    async fn unknown_format_is_reported() {
        let dir = TempDir::new().unwrap();
        let http = FakeHttp::new()
            .route(PAGE, 200, &page_html())
            .route(HLS_API, 200, &stream_json("smooth", "S1"));
        let config = config(&dir);
        let dispatcher = FormatDispatcher::new(&http, &config).unwrap();

        match dispatcher.resolve(PAGE, Mode::Hls).await.unwrap() {
            Outcome::Unsupported { format, .. } => assert_eq!(format, StreamFormat::Other("smooth".into())),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(http.count(TOKEN), 0);
    }

    #[tokio::test]
    async fn existing_file_skips_token_exchange() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Show - S1 - Extra.mkv"), b"done").unwrap();
        let body = r#"{"video":{"url":"https://cdn.test/master","format":"dash","token":"https://tok.test/esi?format=json"},"meta":{"title":"Show","pre_title":"S1","additional_title":"Extra"}}"#;
        let http = FakeHttp::new()
            .route(PAGE, 200, &page_html())
            .route(DASH_API, 200, body)
            .route(TOKEN, 200, "https://cdn.test/manifest.mpd");
        let config = config(&dir);
        let dispatcher = FormatDispatcher::new(&http, &config).unwrap();

        let outcome = dispatcher.resolve(PAGE, Mode::Dash).await.unwrap();
        assert!(matches!(outcome, Outcome::AlreadyExists(_)));
        assert_eq!(http.count(TOKEN), 0);
    }

    #[tokio::test]
    async fn sanitized_filenames() {
        let dir = TempDir::new().unwrap();
        let http = FakeHttp::new()
            .route(PAGE, 200, &page_html())
            .route(DASH_API, 200, &stream_json("dash", "S1"))
            .route(TOKEN, 200, "https://cdn.test/manifest.mpd");
        let mut config = config(&dir);
        config.sanitize_filenames = true;
        let dispatcher = FormatDispatcher::new(&http, &config).unwrap();

        match dispatcher.resolve(PAGE, Mode::Dash).await.unwrap() {
            Outcome::Queued(job) => assert_eq!(job.filename, "Show - S1 - Pilot_1"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_episode_page_is_an_extraction_error() {
        let dir = TempDir::new().unwrap();
        let http = FakeHttp::new().route(PAGE, 200, "<html><body>listing</body></html>");
        let config = config(&dir);
        let dispatcher = FormatDispatcher::new(&http, &config).unwrap();

        let err = dispatcher.resolve(PAGE, Mode::Dash).await.unwrap_err();
        assert!(matches!(err, Error::NoPlayerData));
    }
}
