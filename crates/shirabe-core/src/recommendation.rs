//! Server recommendation.
//!
//! A server is eligible when the parser registry knows it, either by the
//! site's internal server id or by the display name the site shows for it.
//! The id is tried first. Eligible servers whose parser declines the
//! requested purpose are dropped. What remains keeps the site's own listing
//! order, except that servers named in the caller's `preferred` list move to
//! the front in that list's order.

use std::fmt;
use std::sync::Arc;

use crate::models::{ContentDetail, Purpose, ServerId};
use crate::registry::ParserRegistry;
use crate::traits::MediaParser;

/// How a server was matched to a registered parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    ServerId,
    DisplayName,
}

/// A server of one content item together with the parser that handles it.
#[derive(Clone)]
pub struct Candidate {
    pub server: ServerId,
    pub display_name: String,
    pub matched_by: MatchedBy,
    pub parser: Arc<dyn MediaParser>,
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("server", &self.server)
            .field("display_name", &self.display_name)
            .field("matched_by", &self.matched_by)
            .field("parser", &self.parser.name())
            .finish()
    }
}

/// Resolve the parser for one server: id first, then display name.
pub fn candidate(
    server: &str,
    display_name: &str,
    parsers: &ParserRegistry,
) -> Option<Candidate> {
    let (parser, matched_by) = parsers
        .lookup(server)
        .map(|p| (p, MatchedBy::ServerId))
        .or_else(|| {
            parsers
                .lookup(display_name)
                .map(|p| (p, MatchedBy::DisplayName))
        })?;
    Some(Candidate {
        server: server.to_string(),
        display_name: display_name.to_string(),
        matched_by,
        parser: Arc::clone(parser),
    })
}

/// Every server of `content` that some registered parser can handle, in the
/// site's listing order.
pub fn eligible_servers(content: &ContentDetail, parsers: &ParserRegistry) -> Vec<Candidate> {
    content
        .servers
        .iter()
        .filter_map(|(id, name)| candidate(id, name, parsers))
        .collect()
}

/// Eligible servers recommended for `purpose`, best first.
pub fn rank_candidates(
    content: &ContentDetail,
    purpose: Purpose,
    parsers: &ParserRegistry,
    preferred: &[String],
) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = eligible_servers(content, parsers)
        .into_iter()
        .filter(|c| c.parser.is_recommended(purpose))
        .collect();

    // Stable sort keeps listing order among equally preferred servers.
    ranked.sort_by_key(|c| preference_rank(c, preferred));

    tracing::debug!(
        content = %content.title(),
        purpose = %purpose,
        listed = content.servers.len(),
        recommended = ranked.len(),
        "Ranked servers"
    );
    ranked
}

pub fn recommend_servers(
    content: &ContentDetail,
    purpose: Purpose,
    parsers: &ParserRegistry,
    preferred: &[String],
) -> Vec<ServerId> {
    rank_candidates(content, purpose, parsers, preferred)
        .into_iter()
        .map(|c| c.server)
        .collect()
}

/// Position in `preferred`, or past the end when not listed.
fn preference_rank(candidate: &Candidate, preferred: &[String]) -> usize {
    preferred
        .iter()
        .position(|p| {
            p.eq_ignore_ascii_case(&candidate.server)
                || p.eq_ignore_ascii_case(&candidate.display_name)
                || p.eq_ignore_ascii_case(candidate.parser.name())
        })
        .unwrap_or(preferred.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentDescriptor, Episode, PlayableMedia};
    use crate::promise::Promise;
    use indexmap::IndexMap;
    use url::Url;

    struct FakeParser {
        name: &'static str,
        purposes: &'static [Purpose],
    }

    impl MediaParser for FakeParser {
        fn name(&self) -> &str {
            self.name
        }

        fn parse(&self, episode: &Episode, _purpose: Purpose) -> Promise<PlayableMedia> {
            Promise::resolved(PlayableMedia::infer(episode.link.clone(), episode.target.clone()))
        }

        fn is_recommended(&self, purpose: Purpose) -> bool {
            self.purposes.contains(&purpose)
        }
    }

    fn register(parsers: &mut ParserRegistry, name: &'static str, purposes: &'static [Purpose]) {
        parsers.register_parser(Arc::new(FakeParser { name, purposes }));
    }

    fn content(servers: &[(&str, &str)]) -> ContentDetail {
        let link = ContentDescriptor::new(
            "alpha",
            "Frieren",
            Url::parse("https://alpha.example/frieren").unwrap(),
        );
        let servers: IndexMap<String, String> = servers
            .iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect();
        ContentDetail::new(link, servers, IndexMap::new())
    }

    #[test]
    fn test_matches_by_display_name() {
        let mut parsers = ParserRegistry::parsers();
        register(&mut parsers, "ProviderB", Purpose::ALL);
        let detail = content(&[("srv1", "ProviderA"), ("srv2", "ProviderB")]);

        let eligible = eligible_servers(&detail, &parsers);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].server, "srv2");
        assert_eq!(eligible[0].matched_by, MatchedBy::DisplayName);
    }

    #[test]
    fn test_id_takes_precedence_over_display_name() {
        let mut parsers = ParserRegistry::parsers();
        register(&mut parsers, "srv1", Purpose::ALL);
        register(&mut parsers, "ProviderA", Purpose::ALL);
        let detail = content(&[("srv1", "ProviderA")]);

        let eligible = eligible_servers(&detail, &parsers);
        assert_eq!(eligible[0].matched_by, MatchedBy::ServerId);
        assert_eq!(eligible[0].parser.name(), "srv1");
    }

    #[test]
    fn test_filters_by_purpose() {
        let mut parsers = ParserRegistry::parsers();
        register(&mut parsers, "Fast", &[Purpose::Playback]);
        register(&mut parsers, "Castable", &[Purpose::Playback, Purpose::Casting]);
        let detail = content(&[("a", "Fast"), ("b", "Castable")]);

        assert_eq!(
            recommend_servers(&detail, Purpose::Playback, &parsers, &[]),
            vec!["a", "b"]
        );
        assert_eq!(
            recommend_servers(&detail, Purpose::Casting, &parsers, &[]),
            vec!["b"]
        );
        assert!(recommend_servers(&detail, Purpose::Download, &parsers, &[]).is_empty());
    }

    #[test]
    fn test_first_in_listing_order_by_default() {
        let mut parsers = ParserRegistry::parsers();
        register(&mut parsers, "A", Purpose::ALL);
        register(&mut parsers, "B", Purpose::ALL);
        let detail = content(&[("2", "B"), ("1", "A")]);

        assert_eq!(
            recommend_servers(&detail, Purpose::Playback, &parsers, &[]),
            vec!["2", "1"]
        );
    }

    #[test]
    fn test_preferred_moves_to_front() {
        let mut parsers = ParserRegistry::parsers();
        register(&mut parsers, "A", Purpose::ALL);
        register(&mut parsers, "B", Purpose::ALL);
        register(&mut parsers, "C", Purpose::ALL);
        let detail = content(&[("1", "A"), ("2", "B"), ("3", "C")]);
        let preferred = vec!["c".to_string(), "Missing".to_string()];

        assert_eq!(
            recommend_servers(&detail, Purpose::Playback, &parsers, &preferred),
            vec!["3", "1", "2"]
        );
    }

    #[test]
    fn test_no_registered_parsers() {
        let parsers = ParserRegistry::parsers();
        let detail = content(&[("srv1", "ProviderA")]);
        assert!(recommend_servers(&detail, Purpose::Playback, &parsers, &[]).is_empty());
    }
}
