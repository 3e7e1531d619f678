//! Interfaces the pipeline consumes.
//!
//! Site adapters implement [`Source`]; video-host adapters implement
//! [`MediaParser`]. Both are registered at startup and dispatched by name
//! through a [`Registry`](crate::registry::Registry). All asynchronous work
//! is returned as a [`Promise`] so the pipeline can chain and cancel it.

use url::Url;

use crate::error::Error;
use crate::models::{
    ContentDescriptor, ContentDetail, Episode, EpisodeLink, PlayableMedia, Purpose, ServerId,
};
use crate::promise::Promise;
use crate::recommendation;
use crate::registry::ParserRegistry;

/// Turns an episode's server-specific locator into playable media.
pub trait MediaParser: Send + Sync {
    /// Provider name the parser is registered under (e.g. "Streamtape").
    fn name(&self) -> &str;

    /// Other names sites use for the same provider.
    fn aliases(&self) -> Vec<String> {
        Vec::new()
    }

    fn parse(&self, episode: &Episode, purpose: Purpose) -> Promise<PlayableMedia>;

    /// Whether this provider is a good choice for `purpose`. Parsers with
    /// no opinion accept everything.
    fn is_recommended(&self, _purpose: Purpose) -> bool {
        true
    }
}

/// Adapter for one catalog/streaming site.
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Whether `url` points into this site.
    fn can_handle(&self, url: &Url) -> bool;

    /// Build a content descriptor from an arbitrary URL on this site.
    fn link(&self, url: &Url) -> Promise<ContentDescriptor>;

    fn content(&self, link: &ContentDescriptor) -> Promise<ContentDetail>;

    fn episode(&self, link: &EpisodeLink, content: &ContentDetail) -> Promise<Episode>;

    fn search(&self, query: &str) -> Promise<Vec<ContentDescriptor>> {
        Promise::fail(Error::search(format!(
            "{} does not support searching for \"{query}\"",
            self.name()
        )))
    }

    /// Rank the servers of `content` for `purpose`, best first.
    ///
    /// Override to encode site-specific knowledge (e.g. "this site's own
    /// server is always the most reliable"). The default keeps the site's
    /// listing order after `preferred` hints.
    fn recommend_servers(
        &self,
        content: &ContentDetail,
        purpose: Purpose,
        parsers: &ParserRegistry,
        preferred: &[String],
    ) -> Vec<ServerId> {
        recommendation::recommend_servers(content, purpose, parsers, preferred)
    }
}
