//! Content descriptor → playable media.
//!
//! Stages: fetch content detail from the owning source, pick a server,
//! look up its parser, locate the episode on that server, parse it. Every
//! stage promise is registered in the caller's task container, so
//! cancelling the container aborts whichever stage is in flight and no
//! continuation downstream of it fires. The pipeline never retries.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{Error, Result};
use crate::event_log::{ResolutionEvent, SharedEventLog};
use crate::models::{ContentDescriptor, ContentDetail, PlayableMedia, Purpose, ServerId};
use crate::promise::Promise;
use crate::recommendation::{self, Candidate};
use crate::registry::Catalog;
use crate::search::{self, SearchHit};
use crate::task::{TaskContainer, WeakTaskContainer};
use crate::traits::{MediaParser, Source};

/// What to resolve.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    pub content: ContentDescriptor,
    /// Episode display name as listed by the site ("1", "12.5", ...).
    pub episode: String,
    pub purpose: Purpose,
    /// Skip recommendation and use this server id.
    pub server: Option<ServerId>,
}

impl ResolutionRequest {
    pub fn new(content: ContentDescriptor, episode: impl Into<String>, purpose: Purpose) -> Self {
        Self {
            content,
            episode: episode.into(),
            purpose,
            server: None,
        }
    }

    pub fn with_server(mut self, server: impl Into<ServerId>) -> Self {
        self.server = Some(server.into());
        self
    }
}

/// The server chosen for a resolution and the parser that will handle it.
#[derive(Clone)]
pub struct ServerSelection {
    pub server: ServerId,
    pub display_name: String,
    pub parser: Arc<dyn MediaParser>,
    /// The caller named the server instead of taking a recommendation.
    pub overridden: bool,
}

impl ServerSelection {
    fn from_candidate(candidate: Candidate, overridden: bool) -> Self {
        Self {
            server: candidate.server,
            display_name: candidate.display_name,
            parser: candidate.parser,
            overridden,
        }
    }
}

impl fmt::Debug for ServerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSelection")
            .field("server", &self.server)
            .field("display_name", &self.display_name)
            .field("parser", &self.parser.name())
            .field("overridden", &self.overridden)
            .finish()
    }
}

#[derive(Clone, Default)]
struct Recorder(Option<SharedEventLog>);

impl Recorder {
    fn push(&self, event: ResolutionEvent) {
        if let Some(log) = &self.0 {
            log.lock().push(event);
        }
    }

    fn failure(&self, title: &str, error: &Error) {
        self.push(ResolutionEvent::Failed {
            title: title.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}

/// Orchestrates resolution over a populated [`Catalog`]. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    catalog: Arc<Catalog>,
    preferred_servers: Arc<[String]>,
    recorder: Recorder,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("catalog", &self.catalog)
            .field("preferred_servers", &self.preferred_servers)
            .finish()
    }
}

impl Pipeline {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            preferred_servers: Arc::from(Vec::new()),
            recorder: Recorder::default(),
        }
    }

    /// Servers (by id, display name or parser name) to try ahead of the
    /// site's own ordering.
    pub fn with_preferred_servers(mut self, preferred: Vec<String>) -> Self {
        self.preferred_servers = Arc::from(preferred);
        self
    }

    pub fn with_event_log(mut self, log: SharedEventLog) -> Self {
        self.recorder = Recorder(Some(log));
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn source(&self, name: &str) -> Result<Arc<dyn Source>> {
        self.catalog
            .sources
            .lookup(name)
            .cloned()
            .ok_or_else(|| Error::provider(format!("no source registered as {name}")))
    }

    /// Turn an arbitrary URL into a content descriptor via whichever source
    /// claims it.
    pub fn link(&self, url: &Url) -> Promise<ContentDescriptor> {
        match self.catalog.sources.source_for(url) {
            Some(source) => {
                tracing::debug!(source = %source.name(), url = %url, "Dispatching link");
                source.link(url)
            }
            None => Promise::fail(Error::response(format!("no source can handle {url}"))),
        }
    }

    /// Fetch the detail page of `link` from its owning source.
    pub fn content(&self, link: &ContentDescriptor, tasks: &WeakTaskContainer) -> Promise<ContentDetail> {
        let source = match self.source(&link.source) {
            Ok(source) => source,
            Err(e) => return Promise::fail(e),
        };

        let recorder = self.recorder.clone();
        let failure_recorder = self.recorder.clone();
        let title = link.title.clone();
        let promise = source
            .content(link)
            .done(move |detail| {
                tracing::debug!(
                    source = %detail.link.source,
                    title = %detail.title(),
                    servers = detail.servers.len(),
                    "Content fetched"
                );
                recorder.push(ResolutionEvent::ContentFetched {
                    source: detail.link.source.clone(),
                    title: detail.title().to_string(),
                    servers: detail.servers.len(),
                });
            })
            .error(move |e| failure_recorder.failure(&title, &e));
        tasks.add(promise.clone());
        promise
    }

    /// Choose the server to resolve `content` on.
    ///
    /// With `override_server` the recommendation is skipped entirely,
    /// purpose filter included; the server still needs a registered parser.
    pub fn select_server(
        &self,
        content: &ContentDetail,
        purpose: Purpose,
        override_server: Option<&str>,
    ) -> Result<ServerSelection> {
        match self.pick_server(content, purpose, override_server)? {
            Some(selection) => Ok(selection),
            None => Err(self.no_supported_server(content, purpose)),
        }
    }

    /// `Ok(None)` when no listed server survives recommendation.
    fn pick_server(
        &self,
        content: &ContentDetail,
        purpose: Purpose,
        override_server: Option<&str>,
    ) -> Result<Option<ServerSelection>> {
        let parsers = &self.catalog.parsers;

        if let Some(server) = override_server {
            let display_name = content.server_name(server).unwrap_or(server);
            return recommendation::candidate(server, display_name, parsers)
                .map(|c| Some(ServerSelection::from_candidate(c, true)))
                .ok_or_else(|| Error::provider(format!("no parser registered for server {server}")));
        }

        let ranked = match self.catalog.sources.lookup(&content.link.source) {
            Some(source) => {
                source.recommend_servers(content, purpose, parsers, &self.preferred_servers)
            }
            None => {
                recommendation::recommend_servers(content, purpose, parsers, &self.preferred_servers)
            }
        };

        let Some(server) = ranked.into_iter().next() else {
            return Ok(None);
        };

        let display_name = content.server_name(&server).unwrap_or(&server);
        recommendation::candidate(&server, display_name, parsers)
            .map(|c| Some(ServerSelection::from_candidate(c, false)))
            .ok_or_else(|| Error::provider(format!("no parser registered for server {server}")))
    }

    fn no_supported_server(&self, content: &ContentDetail, purpose: Purpose) -> Error {
        tracing::warn!(title = %content.title(), purpose = %purpose, "No supported server");
        self.recorder.push(ResolutionEvent::NoSupportedServer {
            title: content.title().to_string(),
            purpose,
        });
        Error::no_supported_server(content.title())
    }

    /// Resolve one episode of already-fetched content.
    pub fn resolve_episode(
        &self,
        content: &ContentDetail,
        episode: &str,
        purpose: Purpose,
        server: Option<&str>,
        tasks: &WeakTaskContainer,
    ) -> Promise<PlayableMedia> {
        let title = content.title().to_string();

        let selection = match self.pick_server(content, purpose, server) {
            Ok(Some(selection)) => selection,
            Ok(None) => return Promise::fail(self.no_supported_server(content, purpose)),
            Err(e) => {
                self.recorder.failure(&title, &e);
                return Promise::fail(e);
            }
        };
        tracing::info!(
            title = %title,
            server = %selection.server,
            parser = %selection.parser.name(),
            purpose = %purpose,
            overridden = selection.overridden,
            "Server selected"
        );
        self.recorder.push(ResolutionEvent::ServerSelected {
            title: title.clone(),
            server: selection.server.clone(),
            parser: selection.parser.name().to_string(),
            purpose,
            overridden: selection.overridden,
        });

        let Some(link) = content.episode(&selection.server, episode).cloned() else {
            let e = Error::response(format!(
                "episode {episode} is not listed on server {}",
                selection.server
            ));
            self.recorder.failure(&title, &e);
            return Promise::fail(e);
        };

        let source = match self.source(&content.link.source) {
            Ok(source) => source,
            Err(e) => {
                self.recorder.failure(&title, &e);
                return Promise::fail(e);
            }
        };

        let located = source.episode(&link, content);
        tasks.add(located.clone());

        let parser = Arc::clone(&selection.parser);
        let stage_tasks = tasks.clone();
        let media = located.then_promise(move |episode| {
            tracing::debug!(server = %episode.server(), target = %episode.target, "Parsing episode");
            let media = parser.parse(&episode, purpose);
            stage_tasks.add(media.clone());
            media
        });
        tasks.add(media.clone());

        self.observe(&media, title, episode.to_string(), selection.server);
        media
    }

    /// Resolve `request` end to end. The returned promise, and every stage
    /// behind it, is held by `tasks`.
    #[tracing::instrument(
        name = "resolve",
        skip_all,
        fields(content = %request.content.title, episode = %request.episode, purpose = %request.purpose)
    )]
    pub fn resolve(&self, request: &ResolutionRequest, tasks: &TaskContainer) -> Promise<PlayableMedia> {
        self.resolve_in(request.clone(), tasks.downgrade())
    }

    /// Resolve starting from a bare URL on any registered site.
    pub fn resolve_url(
        &self,
        url: &Url,
        episode: &str,
        purpose: Purpose,
        server: Option<ServerId>,
        tasks: &TaskContainer,
    ) -> Promise<PlayableMedia> {
        let weak = tasks.downgrade();
        let link = self.link(url);
        weak.add(link.clone());

        let pipeline = self.clone();
        let episode = episode.to_string();
        let stage_tasks = weak.clone();
        let media = link.then_promise(move |content| {
            let request = ResolutionRequest {
                content,
                episode,
                purpose,
                server,
            };
            pipeline.resolve_in(request, stage_tasks)
        });
        weak.add(media.clone());
        media
    }

    fn resolve_in(&self, request: ResolutionRequest, tasks: WeakTaskContainer) -> Promise<PlayableMedia> {
        let content = self.content(&request.content, &tasks);

        let pipeline = self.clone();
        let stage_tasks = tasks.clone();
        let media = content.then_promise(move |detail| {
            pipeline.resolve_episode(
                &detail,
                &request.episode,
                request.purpose,
                request.server.as_deref(),
                &stage_tasks,
            )
        });
        tasks.add(media.clone());
        media
    }

    /// Search every enabled source not listed in `disabled`.
    pub fn search(&self, query: &str, disabled: &[String]) -> Promise<Vec<SearchHit>> {
        let sources: Vec<Arc<dyn Source>> = self
            .catalog
            .sources
            .enabled()
            .filter(|s| !disabled.iter().any(|d| d.eq_ignore_ascii_case(s.name())))
            .cloned()
            .collect();

        let recorder = self.recorder.clone();
        let query_owned = query.to_string();
        let count = sources.len();
        search::search_sources(sources, query).done(move |hits| {
            recorder.push(ResolutionEvent::SearchFinished {
                query: query_owned,
                sources: count,
                hits: hits.len(),
            });
        })
    }

    fn observe(&self, media: &Promise<PlayableMedia>, title: String, episode: String, server: ServerId) {
        let recorder = self.recorder.clone();
        let failure_recorder = self.recorder.clone();
        let cancel_recorder = self.recorder.clone();
        let (failure_title, cancel_title) = (title.clone(), title.clone());

        media
            .done(move |media| {
                tracing::info!(
                    title = %title,
                    episode = %episode,
                    server = %server,
                    aggregated = media.aggregated,
                    "Media resolved"
                );
                recorder.push(ResolutionEvent::MediaResolved {
                    title,
                    episode,
                    server,
                    aggregated: media.aggregated,
                });
            })
            .error(move |e| {
                tracing::warn!(title = %failure_title, kind = e.kind(), error = %e, "Resolution failed");
                failure_recorder.failure(&failure_title, &e);
            })
            .on_cancel(move || {
                tracing::debug!(title = %cancel_title, "Resolution cancelled");
                cancel_recorder.push(ResolutionEvent::Cancelled { title: cancel_title });
            });
    }
}
