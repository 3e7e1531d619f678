use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use url::Url;

use shirabe_core::event_log::{shared_event_log, ResolutionEvent};
use shirabe_core::models::{
    ContentDescriptor, ContentDetail, Episode, EpisodeLink, PlayableMedia, Purpose,
};
use shirabe_core::{
    AggregateState, Catalog, Error, MediaParser, Pipeline, Promise, ResolutionRequest, Resolver,
    Settlement, Source, StatefulTaskContainer, TaskContainer,
};

struct MockParser {
    name: &'static str,
    purposes: &'static [Purpose],
    calls: AtomicUsize,
}

impl MockParser {
    fn new(name: &'static str, purposes: &'static [Purpose]) -> Arc<Self> {
        Arc::new(Self {
            name,
            purposes,
            calls: AtomicUsize::new(0),
        })
    }
}

impl MediaParser for MockParser {
    fn name(&self) -> &str {
        self.name
    }

    fn parse(&self, episode: &Episode, _purpose: Purpose) -> Promise<PlayableMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Promise::resolved(PlayableMedia::infer(episode.link.clone(), episode.target.clone()))
    }

    fn is_recommended(&self, purpose: Purpose) -> bool {
        self.purposes.contains(&purpose)
    }
}

/// A site listing two servers, `srv1` ("ProviderA") and `srv2`
/// ("ProviderB"), each carrying episodes "1" and "2".
struct MockSource {
    hold_content: bool,
    held: Mutex<Vec<Resolver<ContentDetail>>>,
    search_titles: Vec<&'static str>,
}

impl MockSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            hold_content: false,
            held: Mutex::new(Vec::new()),
            search_titles: vec!["Sousou no Frieren", "Frieren Recap"],
        })
    }

    fn holding() -> Arc<Self> {
        Arc::new(Self {
            hold_content: true,
            held: Mutex::new(Vec::new()),
            search_titles: Vec::new(),
        })
    }

    fn detail(link: &ContentDescriptor) -> ContentDetail {
        let servers: IndexMap<String, String> = [("srv1", "ProviderA"), ("srv2", "ProviderB")]
            .into_iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect();
        let episodes = servers
            .keys()
            .map(|server| {
                let listed = ["1", "2"]
                    .into_iter()
                    .map(|name| EpisodeLink {
                        identifier: format!("{server}-{name}"),
                        name: name.to_string(),
                        server: server.clone(),
                        parent: link.clone(),
                    })
                    .collect();
                (server.clone(), listed)
            })
            .collect();
        ContentDetail::new(link.clone(), servers, episodes)
    }
}

impl Source for MockSource {
    fn name(&self) -> &str {
        "alpha"
    }

    fn can_handle(&self, url: &Url) -> bool {
        url.host_str() == Some("alpha.example")
    }

    fn link(&self, url: &Url) -> Promise<ContentDescriptor> {
        Promise::resolved(ContentDescriptor::new("alpha", "Sousou no Frieren", url.clone()))
    }

    fn content(&self, link: &ContentDescriptor) -> Promise<ContentDetail> {
        if self.hold_content {
            let (promise, resolver) = Promise::pending();
            self.held.lock().push(resolver);
            return promise;
        }
        Promise::resolved(Self::detail(link))
    }

    fn episode(&self, link: &EpisodeLink, _content: &ContentDetail) -> Promise<Episode> {
        let target = format!("https://cdn.example/{}/{}.m3u8", link.server, link.identifier);
        Promise::firstly(|| {
            let target = Url::parse(&target).map_err(|e| Error::response(e.to_string()))?;
            Ok(Episode::new(link.clone(), target))
        })
    }

    fn search(&self, _query: &str) -> Promise<Vec<ContentDescriptor>> {
        let links = self
            .search_titles
            .iter()
            .enumerate()
            .map(|(i, title)| {
                let url = Url::parse(&format!("https://alpha.example/{i}")).unwrap();
                ContentDescriptor::new("alpha", *title, url)
            })
            .collect();
        Promise::resolved(links)
    }
}

fn frieren() -> ContentDescriptor {
    ContentDescriptor::new(
        "alpha",
        "Sousou no Frieren",
        Url::parse("https://alpha.example/frieren").unwrap(),
    )
}

fn pipeline(source: Arc<MockSource>, parsers: Vec<Arc<MockParser>>) -> Pipeline {
    let mut catalog = Catalog::new();
    catalog.sources.register_source(source);
    for parser in parsers {
        catalog.parsers.register_parser(parser);
    }
    Pipeline::new(Arc::new(catalog))
}

fn resolved(promise: &Promise<PlayableMedia>) -> PlayableMedia {
    match promise.settlement() {
        Some(Settlement::Resolved(media)) => media,
        other => panic!("Expected resolved media, got {other:?}"),
    }
}

#[test]
fn test_selects_the_only_supported_server() {
    let parser = MockParser::new("ProviderB", Purpose::ALL);
    let pipeline = pipeline(MockSource::new(), vec![parser.clone()]);
    let tasks = TaskContainer::new();

    let request = ResolutionRequest::new(frieren(), "1", Purpose::Playback);
    let media = resolved(&pipeline.resolve(&request, &tasks));

    assert_eq!(media.link.server, "srv2");
    assert_eq!(media.link.name, "1");
    assert!(media.aggregated);
    assert_eq!(parser.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_no_supported_server() {
    let pipeline = pipeline(MockSource::new(), Vec::new());
    let tasks = TaskContainer::new();

    let request = ResolutionRequest::new(frieren(), "1", Purpose::Playback);
    match pipeline.resolve(&request, &tasks).settlement() {
        Some(Settlement::Failed(Error::Provider(message))) => {
            assert!(message.contains("no supported server"), "{message}")
        }
        other => panic!("Expected provider error, got {other:?}"),
    }
}

#[test]
fn test_no_supported_server_is_logged_once() {
    let log = shared_event_log();
    let pipeline = pipeline(MockSource::new(), Vec::new()).with_event_log(log.clone());
    let tasks = TaskContainer::new();

    let request = ResolutionRequest::new(frieren(), "1", Purpose::Playback);
    assert!(pipeline.resolve(&request, &tasks).settlement().is_some());

    let log = log.lock();
    let failures: Vec<&ResolutionEvent> = log.failures().map(|(_, e)| e).collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], ResolutionEvent::NoSupportedServer { .. }));
}

#[test]
fn test_cancel_mid_fetch_fires_nothing() {
    let source = MockSource::holding();
    let parser = MockParser::new("ProviderB", Purpose::ALL);
    let pipeline = pipeline(source.clone(), vec![parser.clone()]);
    let tasks = TaskContainer::new();

    let fired = Arc::new(AtomicUsize::new(0));
    let (on_done, on_error, on_complete) = (fired.clone(), fired.clone(), fired.clone());
    let cancellations = Arc::new(AtomicUsize::new(0));
    let on_cancel = cancellations.clone();

    let supervisor = StatefulTaskContainer::new();
    let request = ResolutionRequest::new(frieren(), "1", Purpose::Playback);
    let media = pipeline
        .resolve(&request, &tasks)
        .finally(move |_| {
            on_done.fetch_add(1, Ordering::SeqCst);
        })
        .error(move |_| {
            on_error.fetch_add(1, Ordering::SeqCst);
        });
    supervisor.supervise(&media);
    supervisor.on_completion(move |_| {
        on_complete.fetch_add(1, Ordering::SeqCst);
    });
    supervisor.on_cancellation(move || {
        on_cancel.fetch_add(1, Ordering::SeqCst);
    });
    supervisor.seal();

    supervisor.cancel();
    assert!(media.is_cancelled());

    let held = source.held.lock().pop().unwrap();
    assert!(held.is_cancelled());
    held.fulfill(MockSource::detail(&frieren()));

    assert_eq!(supervisor.state(), AggregateState::Unknown);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(cancellations.load(Ordering::SeqCst), 1);
    assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_dropping_container_cancels_resolution() {
    let source = MockSource::holding();
    let pipeline = pipeline(source.clone(), vec![MockParser::new("ProviderA", Purpose::ALL)]);

    let media = {
        let tasks = TaskContainer::new();
        pipeline.resolve(&ResolutionRequest::new(frieren(), "1", Purpose::Playback), &tasks)
    };

    assert!(media.is_cancelled());
    assert!(source.held.lock().iter().all(|r| r.is_cancelled()));
}

#[test]
fn test_purpose_filter_and_override() {
    let pipeline = pipeline(
        MockSource::new(),
        vec![MockParser::new("ProviderA", &[Purpose::Playback])],
    );
    let tasks = TaskContainer::new();

    let download = ResolutionRequest::new(frieren(), "2", Purpose::Download);
    assert!(matches!(
        pipeline.resolve(&download, &tasks).settlement(),
        Some(Settlement::Failed(Error::Provider(_)))
    ));

    let forced = download.with_server("srv1");
    let media = resolved(&pipeline.resolve(&forced, &tasks));
    assert_eq!(media.link.server, "srv1");
    assert_eq!(media.link.name, "2");
}

#[test]
fn test_override_without_parser_fails() {
    let pipeline = pipeline(MockSource::new(), vec![MockParser::new("ProviderA", Purpose::ALL)]);
    let tasks = TaskContainer::new();

    let request = ResolutionRequest::new(frieren(), "1", Purpose::Playback).with_server("srv2");
    assert!(matches!(
        pipeline.resolve(&request, &tasks).settlement(),
        Some(Settlement::Failed(Error::Provider(_)))
    ));
}

#[test]
fn test_missing_episode_is_response_error() {
    let pipeline = pipeline(MockSource::new(), vec![MockParser::new("ProviderA", Purpose::ALL)]);
    let tasks = TaskContainer::new();

    let request = ResolutionRequest::new(frieren(), "13", Purpose::Playback);
    assert!(matches!(
        pipeline.resolve(&request, &tasks).settlement(),
        Some(Settlement::Failed(Error::Response(_)))
    ));
}

#[test]
fn test_preferred_server_wins_over_listing_order() {
    let pipeline = pipeline(
        MockSource::new(),
        vec![
            MockParser::new("ProviderA", Purpose::ALL),
            MockParser::new("ProviderB", Purpose::ALL),
        ],
    )
    .with_preferred_servers(vec!["providerb".into()]);
    let tasks = TaskContainer::new();

    let request = ResolutionRequest::new(frieren(), "1", Purpose::Playback);
    assert_eq!(resolved(&pipeline.resolve(&request, &tasks)).link.server, "srv2");
}

#[test]
fn test_resolve_url_dispatches_to_owning_source() {
    let pipeline = pipeline(MockSource::new(), vec![MockParser::new("ProviderA", Purpose::ALL)]);
    let tasks = TaskContainer::new();

    let url = Url::parse("https://alpha.example/frieren").unwrap();
    let media = resolved(&pipeline.resolve_url(&url, "1", Purpose::Casting, None, &tasks));
    assert_eq!(media.link.server, "srv1");

    let foreign = Url::parse("https://beta.example/frieren").unwrap();
    assert!(matches!(
        pipeline.resolve_url(&foreign, "1", Purpose::Casting, None, &tasks).settlement(),
        Some(Settlement::Failed(Error::Response(_)))
    ));
}

#[test]
fn test_events_are_recorded() {
    let log = shared_event_log();
    let pipeline = pipeline(MockSource::new(), vec![MockParser::new("ProviderB", Purpose::ALL)])
        .with_event_log(log.clone());
    let tasks = TaskContainer::new();

    let request = ResolutionRequest::new(frieren(), "1", Purpose::Playback);
    resolved(&pipeline.resolve(&request, &tasks));

    let events: Vec<ResolutionEvent> = log.lock().snapshot().into_iter().map(|(_, e)| e).collect();
    assert!(matches!(&events[0], ResolutionEvent::ContentFetched { servers: 2, .. }));
    assert!(matches!(
        &events[1],
        ResolutionEvent::ServerSelected { server, overridden: false, .. } if server == "srv2"
    ));
    assert!(matches!(&events[2], ResolutionEvent::MediaResolved { aggregated: true, .. }));
}

#[test]
fn test_search_honours_disabled_sources() {
    let pipeline = pipeline(MockSource::new(), Vec::new());

    match pipeline.search("Frieren", &[]).settlement() {
        Some(Settlement::Resolved(hits)) => {
            assert_eq!(hits.len(), 2);
            assert!(hits[0].score >= hits[1].score);
        }
        other => panic!("Expected hits, got {other:?}"),
    }

    assert!(matches!(
        pipeline.search("Frieren", &["ALPHA".to_string()]).settlement(),
        Some(Settlement::Failed(Error::Search(_)))
    ));
}

#[tokio::test]
async fn test_resolution_can_be_awaited() {
    let pipeline = pipeline(MockSource::new(), vec![MockParser::new("ProviderA", Purpose::ALL)]);
    let tasks = TaskContainer::new();

    let request = ResolutionRequest::new(frieren(), "2", Purpose::Download);
    let media = pipeline.resolve(&request, &tasks).await.unwrap();
    assert_eq!(media.url.as_str(), "https://cdn.example/srv1/srv1-2.m3u8");
}
