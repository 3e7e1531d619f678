mod builtin;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::RwLock;
use url::Url;

use shirabe_core::config::Config;
use shirabe_core::event_log::{shared_event_log, EventEntry, SharedEventLog};
use shirabe_core::matcher::match_title;
use shirabe_core::models::{ContentDescriptor, PlayableMedia, Purpose, ServerId};
use shirabe_core::search::SearchHit;
use shirabe_core::{Catalog, Pipeline, TaskContainer};

pub use builtin::{DirectLinkSource, PassthroughParser, DIRECT_SERVER};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http client error: {0}")]
    Http(String),
    #[error(transparent)]
    Resolution(#[from] shirabe_core::Error),
}

static CATALOG: OnceLock<Arc<Catalog>> = OnceLock::new();

/// Register every built-in source and parser.
///
/// Idempotent: the first call builds the catalog, later calls return the
/// same one.
pub fn initialize() -> Result<Arc<Catalog>, RuntimeError> {
    if let Some(catalog) = CATALOG.get() {
        return Ok(Arc::clone(catalog));
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("shirabe/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|e| RuntimeError::Http(e.to_string()))?;

    let mut catalog = Catalog::new();
    catalog
        .sources
        .register_source(Arc::new(DirectLinkSource::new(client)));
    catalog.parsers.register_parser(Arc::new(PassthroughParser));
    tracing::info!(
        sources = catalog.sources.len(),
        parsers = catalog.parsers.len(),
        "Catalog initialized"
    );

    Ok(Arc::clone(CATALOG.get_or_init(|| Arc::new(catalog))))
}

pub struct Runtime {
    catalog: Arc<Catalog>,
    config: Arc<RwLock<Config>>,
    events: SharedEventLog,
}

impl Runtime {
    /// Load the user config and initialize the catalog.
    pub fn new() -> Result<Self, RuntimeError> {
        let config = Config::load().map_err(|e| RuntimeError::Config(e.to_string()))?;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self, RuntimeError> {
        Ok(Self::with_catalog(initialize()?, config))
    }

    /// Run over a caller-provided catalog instead of the built-in one.
    pub fn with_catalog(catalog: Arc<Catalog>, config: Config) -> Self {
        Self {
            catalog,
            config: Arc::new(RwLock::new(config)),
            events: shared_event_log(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn get_config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn update_config(&self, new_config: Config) -> Result<(), RuntimeError> {
        new_config
            .save()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        *self.config.write().await = new_config;
        Ok(())
    }

    /// A pipeline reflecting the current config.
    pub async fn pipeline(&self) -> Pipeline {
        let config = self.config.read().await;
        Pipeline::new(Arc::clone(&self.catalog))
            .with_preferred_servers(config.resolution.preferred_servers.clone())
            .with_event_log(Arc::clone(&self.events))
    }

    /// Resolve episode `episode` of whatever `url` points at. `purpose`
    /// defaults to the configured one.
    pub async fn resolve(
        &self,
        url: &Url,
        episode: &str,
        purpose: Option<Purpose>,
        server: Option<ServerId>,
    ) -> Result<PlayableMedia, RuntimeError> {
        let purpose = match purpose {
            Some(purpose) => purpose,
            None => self.config.read().await.resolution.default_purpose,
        };
        let pipeline = self.pipeline().await;
        let tasks = TaskContainer::new();
        let media = pipeline
            .resolve_url(url, episode, purpose, server, &tasks)
            .await?;
        Ok(media)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, RuntimeError> {
        let disabled = self.config.read().await.search.disabled_sources.clone();
        let pipeline = self.pipeline().await;
        Ok(pipeline.search(query, &disabled).await?)
    }

    /// Search, then keep the hit whose title reconciles with `title` under
    /// the configured matching threshold.
    pub async fn find(&self, title: &str) -> Result<Option<ContentDescriptor>, RuntimeError> {
        let threshold = self.config.read().await.matching.threshold;
        let links: Vec<ContentDescriptor> = self
            .search(title)
            .await?
            .into_iter()
            .map(|hit| hit.link)
            .collect();
        Ok(match_title(title, &links, threshold).candidate().cloned())
    }

    /// Recorded resolution events, oldest first.
    pub fn events(&self) -> Vec<EventEntry> {
        self.events.lock().snapshot()
    }
}
