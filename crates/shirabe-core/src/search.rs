//! Search fan-out across sources.
//!
//! Every source is queried concurrently under one [`StatefulTaskContainer`].
//! The combined promise settles once all of them have: with every hit ranked
//! by title proximity to the query, or with the first failure when nothing
//! was found. Cancelling it cancels every outstanding source query.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::Error;
use crate::models::ContentDescriptor;
use crate::normalize::normalize;
use crate::promise::Promise;
use crate::proximity::proximity;
use crate::task::{AggregateState, StatefulTaskContainer};
use crate::traits::Source;

/// One search result and how closely its title matches the query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub link: ContentDescriptor,
    pub score: f64,
}

#[derive(Default)]
struct Collected {
    hits: Vec<SearchHit>,
    first_error: Option<Error>,
}

pub fn search_sources(sources: Vec<Arc<dyn Source>>, query: &str) -> Promise<Vec<SearchHit>> {
    if sources.is_empty() {
        return Promise::fail(Error::search(format!(
            "no source available to search for \"{query}\""
        )));
    }

    let normalized_query = normalize(query);
    let container = Arc::new(StatefulTaskContainer::new());
    let collected = Arc::new(Mutex::new(Collected::default()));
    let (promise, resolver) = Promise::pending();

    for source in &sources {
        let name = source.name().to_string();
        let results = source.search(query);

        let hits_into = Arc::clone(&collected);
        let errors_into = Arc::clone(&collected);
        let normalized_query = normalized_query.clone();
        let source_name = name.clone();
        results
            .done(move |links| {
                tracing::debug!(source = %source_name, results = links.len(), "Source search finished");
                let scored = links.into_iter().map(|link| {
                    let score = proximity(&normalized_query, &normalize(&link.title));
                    SearchHit { link, score }
                });
                hits_into.lock().hits.extend(scored);
            })
            .error(move |e| {
                tracing::warn!(source = %name, error = %e, "Source search failed");
                let mut collected = errors_into.lock();
                if collected.first_error.is_none() {
                    collected.first_error = Some(e);
                }
            });
        container.supervise(&results);
    }

    {
        let query = query.to_string();
        container.on_completion(move |state| {
            let Collected { mut hits, first_error } = std::mem::take(&mut *collected.lock());
            if !hits.is_empty() {
                hits.sort_by(|a, b| b.score.total_cmp(&a.score));
                resolver.fulfill(hits);
                return;
            }
            let error = match (state, first_error) {
                (AggregateState::Failed, Some(e)) => e,
                _ => Error::search(format!("nothing found for \"{query}\"")),
            };
            resolver.reject(error);
        });
    }

    let downstream = promise.clone();
    container.on_cancellation(move || downstream.cancel());
    let owner = Arc::clone(&container);
    promise.on_cancel(move || owner.cancel());

    tracing::debug!(query = %query, sources = sources.len(), "Searching");
    container.seal();
    promise
}
