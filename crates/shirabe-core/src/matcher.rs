use crate::models::{ContentDescriptor, ContentDetail};
use crate::normalize::normalize;
use crate::proximity::proximity;

/// Anything carrying one or more titles a query can be matched against.
pub trait Titled {
    fn titles(&self) -> Vec<&str>;
}

impl Titled for ContentDescriptor {
    fn titles(&self) -> Vec<&str> {
        vec![self.title.as_str()]
    }
}

impl Titled for ContentDetail {
    fn titles(&self) -> Vec<&str> {
        ContentDetail::titles(self).collect()
    }
}

/// Result of reconciling a title against a list of candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult<'a, T> {
    /// Exact or normalized match.
    Matched(&'a T),
    /// Best proximity match at or above the threshold, with its score.
    Fuzzy(&'a T, f64),
    NoMatch,
}

impl<'a, T> MatchResult<'a, T> {
    pub fn candidate(&self) -> Option<&'a T> {
        match self {
            Self::Matched(c) | Self::Fuzzy(c, _) => Some(c),
            Self::NoMatch => None,
        }
    }
}

/// Match `query` against `candidates`.
///
/// Strategy: exact → normalized → best proximity ≥ `threshold` → NoMatch.
/// Ties on proximity go to the earlier candidate.
pub fn match_title<'a, T: Titled>(
    query: &str,
    candidates: &'a [T],
    threshold: f64,
) -> MatchResult<'a, T> {
    if query.trim().is_empty() || candidates.is_empty() {
        return MatchResult::NoMatch;
    }

    if let Some(c) = candidates.iter().find(|c| c.titles().contains(&query)) {
        return MatchResult::Matched(c);
    }

    let normalized_query = normalize(query);
    if normalized_query.is_empty() {
        return MatchResult::NoMatch;
    }

    let normalized: Vec<Vec<String>> = candidates
        .iter()
        .map(|c| c.titles().into_iter().map(normalize).collect())
        .collect();

    if let Some(i) = normalized
        .iter()
        .position(|titles| titles.iter().any(|t| *t == normalized_query))
    {
        return MatchResult::Matched(&candidates[i]);
    }

    let mut best: Option<(usize, f64)> = None;
    for (i, titles) in normalized.iter().enumerate() {
        let score = titles
            .iter()
            .map(|t| proximity(&normalized_query, t))
            .fold(0.0, f64::max);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }

    match best {
        Some((i, score)) if score >= threshold => {
            tracing::trace!(query = %query, score, "Fuzzy title match");
            MatchResult::Fuzzy(&candidates[i], score)
        }
        _ => MatchResult::NoMatch,
    }
}
