use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::Purpose;

const EVENT_LOG_CAPACITY: usize = 200;

/// What happened during one resolution, in the order it happened.
#[derive(Debug, Clone)]
pub enum ResolutionEvent {
    ContentFetched {
        source: String,
        title: String,
        servers: usize,
    },
    ServerSelected {
        title: String,
        server: String,
        parser: String,
        purpose: Purpose,
        overridden: bool,
    },
    NoSupportedServer {
        title: String,
        purpose: Purpose,
    },
    MediaResolved {
        title: String,
        episode: String,
        server: String,
        aggregated: bool,
    },
    Failed {
        title: String,
        kind: &'static str,
        message: String,
    },
    Cancelled {
        title: String,
    },
    SearchFinished {
        query: String,
        sources: usize,
        hits: usize,
    },
}

impl ResolutionEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::NoSupportedServer { .. })
    }
}

impl fmt::Display for ResolutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentFetched {
                source,
                title,
                servers,
            } => write!(f, "{source}: fetched \"{title}\" ({servers} servers)"),
            Self::ServerSelected {
                title,
                server,
                parser,
                purpose,
                overridden,
            } => {
                let how = if *overridden { "forced" } else { "recommended" };
                write!(f, "\"{title}\": {how} server {server} via {parser} for {purpose}")
            }
            Self::NoSupportedServer { title, purpose } => {
                write!(f, "\"{title}\": no supported server for {purpose}")
            }
            Self::MediaResolved {
                title,
                episode,
                server,
                aggregated,
            } => {
                let kind = if *aggregated { "stream" } else { "file" };
                write!(f, "\"{title}\" episode {episode}: {kind} from {server}")
            }
            Self::Failed {
                title,
                kind,
                message,
            } => write!(f, "\"{title}\": {kind} failure: {message}"),
            Self::Cancelled { title } => write!(f, "\"{title}\": cancelled"),
            Self::SearchFinished {
                query,
                sources,
                hits,
            } => write!(f, "search \"{query}\": {hits} hits from {sources} sources"),
        }
    }
}

pub type EventEntry = (DateTime<Utc>, ResolutionEvent);

/// Most recent resolution events, oldest evicted first.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<EventEntry>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    pub fn push(&mut self, event: ResolutionEvent) {
        if self.entries.len() >= EVENT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((Utc::now(), event));
    }

    /// All entries, newest last.
    pub fn snapshot(&self) -> Vec<EventEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EventEntry> {
        self.entries.iter().filter(|(_, event)| event.is_failure())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type SharedEventLog = Arc<Mutex<EventLog>>;

pub fn shared_event_log() -> SharedEventLog {
    Arc::new(Mutex::new(EventLog::new()))
}
