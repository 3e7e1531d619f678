use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// Identifier a content site uses for one of its streaming servers.
pub type ServerId = String;

/// One piece of content at one source, before its details are fetched.
///
/// Equality and hashing use only `(source, link)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDescriptor {
    pub title: String,
    pub link: Url,
    pub artwork: Option<Url>,
    /// Name of the owning source in the source registry.
    pub source: String,
}

impl ContentDescriptor {
    pub fn new(source: impl Into<String>, title: impl Into<String>, link: Url) -> Self {
        Self {
            title: title.into(),
            link,
            artwork: None,
            source: source.into(),
        }
    }
}

impl PartialEq for ContentDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.link == other.link
    }
}

impl Eq for ContentDescriptor {}

impl Hash for ContentDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.link.hash(state);
    }
}

/// A fully fetched content item.
///
/// `servers` keeps the order the site listed them in; the default server
/// recommendation relies on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDetail {
    pub link: ContentDescriptor,
    /// Server id → display name.
    pub servers: IndexMap<ServerId, String>,
    /// Server id → episodes available on that server.
    pub episodes: IndexMap<ServerId, Vec<EpisodeLink>>,
    pub description: Option<String>,
    pub alternative_titles: Vec<String>,
    /// Free-form metadata (rating, airing dates, ...).
    pub attributes: IndexMap<String, String>,
}

impl ContentDetail {
    pub fn new(
        link: ContentDescriptor,
        servers: IndexMap<ServerId, String>,
        episodes: IndexMap<ServerId, Vec<EpisodeLink>>,
    ) -> Self {
        Self {
            link,
            servers,
            episodes,
            description: None,
            alternative_titles: Vec::new(),
            attributes: IndexMap::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.link.title
    }

    /// Primary title followed by every alternative.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.link.title.as_str())
            .chain(self.alternative_titles.iter().map(String::as_str))
    }

    pub fn episodes_on(&self, server: &str) -> &[EpisodeLink] {
        self.episodes.get(server).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find an episode on `server` by its display name.
    pub fn episode(&self, server: &str, name: &str) -> Option<&EpisodeLink> {
        self.episodes_on(server).iter().find(|e| e.name == name)
    }

    pub fn server_name(&self, server: &str) -> Option<&str> {
        self.servers.get(server).map(String::as_str)
    }
}

/// An episode as listed on one server of a content page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeLink {
    /// Site-specific locator for this episode on this server.
    pub identifier: String,
    /// Display name, usually the episode number ("12", "12.5", "OVA").
    pub name: String,
    pub server: ServerId,
    pub parent: ContentDescriptor,
}

/// An episode resolved far enough to be handed to a media parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub link: EpisodeLink,
    /// Where the server-specific player lives.
    pub target: Url,
    pub referer: Option<Url>,
    /// Hints a source passes to the parser (tokens, quality labels, ...).
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl Episode {
    pub fn new(link: EpisodeLink, target: Url) -> Self {
        Self {
            link,
            target,
            referer: None,
            context: HashMap::new(),
        }
    }

    pub fn with_referer(mut self, referer: Url) -> Self {
        self.referer = Some(referer);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn server(&self) -> &str {
        &self.link.server
    }
}
