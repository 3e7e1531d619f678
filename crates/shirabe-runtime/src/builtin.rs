//! Handlers that ship with the runtime.
//!
//! [`DirectLinkSource`] accepts plain stream URLs (`.m3u8`, `.mp4`, ...) and
//! presents each as single-episode content on one server. The
//! [`PassthroughParser`] claims that server and hands the URL back as-is.
//! The `Content-Type` seen while probing travels with the episode and wins
//! over the URL extension when it names a known stream kind.

use indexmap::IndexMap;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use url::Url;

use shirabe_core::models::{
    ContentDescriptor, ContentDetail, Episode, EpisodeLink, PlayableMedia, Purpose, StreamKind,
};
use shirabe_core::{Error, MediaParser, Promise, Source};

/// Server id of the single server a direct link is listed on.
pub const DIRECT_SERVER: &str = "direct";

const CONTENT_TYPE_KEY: &str = "content_type";

pub struct PassthroughParser;

impl MediaParser for PassthroughParser {
    fn name(&self) -> &str {
        "Passthrough"
    }

    fn aliases(&self) -> Vec<String> {
        vec![DIRECT_SERVER.to_string()]
    }

    fn parse(&self, episode: &Episode, _purpose: Purpose) -> Promise<PlayableMedia> {
        if !matches!(episode.target.scheme(), "http" | "https") {
            return Promise::fail(Error::response(format!(
                "cannot play {} directly",
                episode.target
            )));
        }
        let probed = episode
            .context
            .get(CONTENT_TYPE_KEY)
            .and_then(|v| v.as_str())
            .map(StreamKind::from_content_type)
            .filter(|kind| *kind != StreamKind::Unknown);
        let (link, target) = (episode.link.clone(), episode.target.clone());
        let mut media = match probed {
            Some(kind) if kind.is_aggregated() => {
                PlayableMedia::aggregated(link, target, kind.content_type())
            }
            Some(kind) => PlayableMedia::direct(link, target, kind.content_type()),
            None => PlayableMedia::infer(link, target),
        };
        if let Some(referer) = &episode.referer {
            media = media.with_header("Referer", referer.as_str());
        }
        Promise::resolved(media)
    }
}

pub struct DirectLinkSource {
    client: reqwest::Client,
}

impl DirectLinkSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn title_of(url: &Url) -> String {
        url.path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_else(|| url.host_str().unwrap_or_default())
            .to_string()
    }

    fn detail(link: &ContentDescriptor, content_type: Option<String>) -> ContentDetail {
        let servers = IndexMap::from([(DIRECT_SERVER.to_string(), "Direct".to_string())]);
        let episode = EpisodeLink {
            identifier: link.link.to_string(),
            name: "1".to_string(),
            server: DIRECT_SERVER.to_string(),
            parent: link.clone(),
        };
        let episodes = IndexMap::from([(DIRECT_SERVER.to_string(), vec![episode])]);

        let mut detail = ContentDetail::new(link.clone(), servers, episodes);
        if let Some(content_type) = content_type {
            detail.attributes.insert(CONTENT_TYPE_KEY.into(), content_type);
        }
        detail
    }
}

impl Source for DirectLinkSource {
    fn name(&self) -> &str {
        DIRECT_SERVER
    }

    fn can_handle(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https") && StreamKind::from_url(url) != StreamKind::Unknown
    }

    fn link(&self, url: &Url) -> Promise<ContentDescriptor> {
        if !self.can_handle(url) {
            return Promise::fail(Error::response(format!("{url} is not a direct stream link")));
        }
        Promise::resolved(ContentDescriptor::new(DIRECT_SERVER, Self::title_of(url), url.clone()))
    }

    fn content(&self, link: &ContentDescriptor) -> Promise<ContentDetail> {
        let client = self.client.clone();
        let link = link.clone();
        Promise::spawn(async move {
            tracing::debug!(url = %link.link, "Probing direct link");
            let response = client
                .head(link.link.clone())
                .send()
                .await
                .map_err(|e| Error::response(format!("probe failed: {e}")))?;

            let status = response.status();
            match status {
                s if s.is_success() => {}
                // Some hosts refuse HEAD outright; the link may still play.
                StatusCode::METHOD_NOT_ALLOWED => return Ok(Self::detail(&link, None)),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(Error::authentication_required(
                        format!("{} answered {status}", link.link),
                        None,
                    ))
                }
                StatusCode::NOT_FOUND | StatusCode::GONE => {
                    return Err(Error::unavailable(format!("{} answered {status}", link.link)))
                }
                _ => return Err(Error::response(format!("{} answered {status}", link.link))),
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(Self::detail(&link, content_type))
        })
    }

    fn episode(&self, link: &EpisodeLink, content: &ContentDetail) -> Promise<Episode> {
        Promise::firstly(|| {
            let target = Url::parse(&link.identifier)
                .map_err(|e| Error::response(format!("bad episode locator: {e}")))?;
            let episode = Episode::new(link.clone(), target);
            Ok(match content.attributes.get(CONTENT_TYPE_KEY) {
                Some(content_type) => episode.with_context(
                    CONTENT_TYPE_KEY,
                    serde_json::Value::String(content_type.clone()),
                ),
                None => episode,
            })
        })
    }
}
