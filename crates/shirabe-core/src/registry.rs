//! Name-keyed lookup tables for parsers and sources.
//!
//! Populated once at startup and read-only afterwards, so lookups need no
//! synchronization. Registration is first-writer-wins: a second handler
//! under an existing key is ignored, which keeps the result independent of
//! initialization order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::traits::{MediaParser, Source};

/// One registered handler.
pub struct Entry<H: ?Sized> {
    pub key: String,
    pub aliases: Vec<String>,
    pub handler: Arc<H>,
}

/// Capability key → handler.
///
/// Keys match exactly; aliases match case-insensitively and are only
/// consulted when no key matches.
pub struct Registry<H: ?Sized> {
    kind: &'static str,
    entries: Vec<Entry<H>>,
    keys: HashMap<String, usize>,
    aliases: HashMap<String, usize>,
}

pub type ParserRegistry = Registry<dyn MediaParser>;
pub type SourceRegistry = Registry<dyn Source>;

impl<H: ?Sized> fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<H: ?Sized> Registry<H> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            keys: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Register `handler` under `key` and `aliases`. Returns `false` (and
    /// keeps the existing handler) when `key` is already taken.
    pub fn register<I, S>(&mut self, key: impl Into<String>, aliases: I, handler: Arc<H>) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        if self.keys.contains_key(&key) {
            tracing::warn!(kind = self.kind, key = %key, "Duplicate registration ignored");
            return false;
        }

        let index = self.entries.len();
        let aliases: Vec<String> = aliases.into_iter().map(Into::into).collect();
        for alias in &aliases {
            self.aliases.entry(alias.to_lowercase()).or_insert(index);
        }
        self.keys.insert(key.clone(), index);
        tracing::debug!(kind = self.kind, key = %key, aliases = aliases.len(), "Registered");
        self.entries.push(Entry {
            key,
            aliases,
            handler,
        });
        true
    }

    /// Exact key first, then alias, then nothing.
    pub fn lookup(&self, key: &str) -> Option<&Arc<H>> {
        self.keys
            .get(key)
            .or_else(|| self.aliases.get(&key.to_lowercase()))
            .map(|&index| &self.entries[index].handler)
    }

    /// Like [`lookup`](Self::lookup) but also reports the key the handler
    /// was registered under.
    pub fn entry(&self, key: &str) -> Option<&Entry<H>> {
        self.keys
            .get(key)
            .or_else(|| self.aliases.get(&key.to_lowercase()))
            .map(|&index| &self.entries[index])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry<H>> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Registry<dyn MediaParser> {
    pub fn parsers() -> Self {
        Self::new("parser")
    }

    /// Register under the parser's own name and aliases.
    pub fn register_parser(&mut self, parser: Arc<dyn MediaParser>) -> bool {
        let name = parser.name().to_string();
        let aliases = parser.aliases();
        self.register(name, aliases, parser)
    }
}

impl Registry<dyn Source> {
    pub fn sources() -> Self {
        Self::new("source")
    }

    pub fn register_source(&mut self, source: Arc<dyn Source>) -> bool {
        let name = source.name().to_string();
        self.register(name, Vec::<String>::new(), source)
    }

    /// First enabled source, in registration order, that claims `url`.
    pub fn source_for(&self, url: &Url) -> Option<&Arc<dyn Source>> {
        self.entries
            .iter()
            .map(|e| &e.handler)
            .find(|s| s.is_enabled() && s.can_handle(url))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.entries
            .iter()
            .map(|e| &e.handler)
            .filter(|s| s.is_enabled())
    }
}

/// Every registry the pipeline dispatches through.
#[derive(Debug)]
pub struct Catalog {
    pub parsers: ParserRegistry,
    pub sources: SourceRegistry,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            parsers: Registry::parsers(),
            sources: Registry::sources(),
        }
    }
}
