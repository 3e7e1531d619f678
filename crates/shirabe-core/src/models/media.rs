use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use super::EpisodeLink;

pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const DASH_CONTENT_TYPE: &str = "application/dash+xml";

/// What the caller intends to do with the resolved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Playback,
    Casting,
    Download,
}

impl Purpose {
    pub const ALL: &[Purpose] = &[Self::Playback, Self::Casting, Self::Download];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Casting => "casting",
            Self::Download => "download",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "playback" | "play" => Ok(Self::Playback),
            "casting" | "cast" => Ok(Self::Casting),
            "download" => Ok(Self::Download),
            other => Err(format!("unknown purpose: {other}")),
        }
    }
}

/// The terminal artifact of a resolution: something a player can open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayableMedia {
    pub link: EpisodeLink,
    pub url: Url,
    pub content_type: String,
    /// Headers the player must send (Referer, User-Agent, ...).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Manifest-based stream (HLS/DASH) rather than a single file.
    pub aggregated: bool,
}

impl PlayableMedia {
    /// A single downloadable asset.
    pub fn direct(link: EpisodeLink, url: Url, content_type: impl Into<String>) -> Self {
        Self {
            link,
            url,
            content_type: content_type.into(),
            headers: HashMap::new(),
            aggregated: false,
        }
    }

    /// A manifest-based stream.
    pub fn aggregated(link: EpisodeLink, url: Url, content_type: impl Into<String>) -> Self {
        Self {
            aggregated: true,
            ..Self::direct(link, url, content_type)
        }
    }

    /// Build from a bare stream URL, inferring kind from its extension.
    pub fn infer(link: EpisodeLink, url: Url) -> Self {
        let kind = StreamKind::from_url(&url);
        Self {
            aggregated: kind.is_aggregated(),
            ..Self::direct(link, url, kind.content_type())
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Stream container guessed from a URL path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Hls,
    Dash,
    Mp4,
    Webm,
    Matroska,
    Unknown,
}

impl StreamKind {
    pub fn from_url(url: &Url) -> Self {
        let extension = url
            .path_segments()
            .and_then(|segments| segments.last())
            .and_then(|last| last.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("m3u8") | Some("m3u") => Self::Hls,
            Some("mpd") => Self::Dash,
            Some("mp4") | Some("m4v") => Self::Mp4,
            Some("webm") => Self::Webm,
            Some("mkv") => Self::Matroska,
            _ => Self::Unknown,
        }
    }

    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            HLS_CONTENT_TYPE | "application/x-mpegurl" | "audio/mpegurl" => Self::Hls,
            DASH_CONTENT_TYPE => Self::Dash,
            "video/mp4" => Self::Mp4,
            "video/webm" => Self::Webm,
            "video/x-matroska" => Self::Matroska,
            _ => Self::Unknown,
        }
    }

    pub fn is_aggregated(self) -> bool {
        matches!(self, Self::Hls | Self::Dash)
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Hls => HLS_CONTENT_TYPE,
            Self::Dash => DASH_CONTENT_TYPE,
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
            Self::Matroska => "video/x-matroska",
            Self::Unknown => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentDescriptor;

    fn link() -> EpisodeLink {
        let parent = ContentDescriptor::new(
            "alpha",
            "Frieren",
            Url::parse("https://alpha.example/frieren").unwrap(),
        );
        EpisodeLink {
            identifier: "1".into(),
            name: "1".into(),
            server: "srv1".into(),
            parent,
        }
    }

    #[test]
    fn test_purpose_parse() {
        assert_eq!("Cast".parse::<Purpose>().unwrap(), Purpose::Casting);
        assert_eq!("download".parse::<Purpose>().unwrap(), Purpose::Download);
        assert!("stream".parse::<Purpose>().is_err());
    }

    #[test]
    fn test_infer_hls_is_aggregated() {
        let url = Url::parse("https://cdn.example/v/master.m3u8?token=abc").unwrap();
        let media = PlayableMedia::infer(link(), url);
        assert!(media.aggregated);
        assert_eq!(media.content_type, HLS_CONTENT_TYPE);
    }

    #[test]
    fn test_infer_mp4_is_direct() {
        let url = Url::parse("https://cdn.example/v/episode.MP4").unwrap();
        let media = PlayableMedia::infer(link(), url).with_header("Referer", "https://alpha.example");
        assert!(!media.aggregated);
        assert_eq!(media.content_type, "video/mp4");
        assert_eq!(media.headers.get("Referer").map(String::as_str), Some("https://alpha.example"));
    }

    #[test]
    fn test_kind_from_content_type() {
        assert_eq!(
            StreamKind::from_content_type("application/x-mpegURL; charset=utf-8"),
            StreamKind::Hls
        );
        assert_eq!(StreamKind::from_content_type("text/html"), StreamKind::Unknown);
    }
}
