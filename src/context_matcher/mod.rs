//! Context Matcher (spec §4.10): `match_context(url, title)` used by the
//! client's URL-change checks. Canonicalizes the URL, derives keywords,
//! queries the store for candidate events, and validates relevance through
//! the same tiered LLM/heuristic/fallback shape as the ingestion pipeline.

mod cache;

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::db::Event;
use crate::domain::EventCandidate;
use crate::envelope::EnvelopeError;
use crate::heuristics;
use crate::llm::LlmClient;
use crate::store::DocumentStore;
use crate::tier::{ProbeFuture, TierOrchestrator};

pub use cache::MatchCache;

const TRACKING_PARAM_PREFIXES: [&str; 1] = ["utm_"];
const TRACKING_PARAMS: [&str; 3] = ["ref", "fbclid", "gclid"];

/// A (service/activity label, keyword) regex table consulted before the
/// default path-tokenizer (spec §4.10 step 3).
static KNOWN_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"netflix\.com").unwrap(), "netflix"),
        (Regex::new(r"primevideo\.com|amazon\.[a-z.]+/gp/video").unwrap(), "prime video"),
        (Regex::new(r"hotstar\.com").unwrap(), "hotstar"),
        (Regex::new(r"spotify\.com").unwrap(), "spotify"),
        (Regex::new(r"makemytrip\.com|booking\.com|airbnb\.[a-z.]+|goibibo\.com").unwrap(), "travel"),
        (Regex::new(r"swiggy\.com|zomato\.com").unwrap(), "food delivery"),
        (Regex::new(r"maps\.google\.[a-z.]+|goo\.gl/maps").unwrap(), "maps"),
    ]
});

pub struct ContextMatcher {
    store: Arc<DocumentStore>,
    llm: Arc<LlmClient>,
    tier: Arc<TierOrchestrator>,
    cache: MatchCache,
    hot_window_days: i64,
}

/// Result of one `match_context` call (spec §6 `/api/context-check`).
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    pub events: Vec<Event>,
    pub confidence: f64,
}

impl ContextMatcher {
    pub fn new(
        store: Arc<DocumentStore>,
        llm: Arc<LlmClient>,
        tier: Arc<TierOrchestrator>,
        cache_capacity: usize,
        hot_window_days: i64,
    ) -> Self {
        Self {
            store,
            llm,
            tier,
            cache: MatchCache::new(cache_capacity, std::time::Duration::from_secs(600)),
            hot_window_days,
        }
    }

    /// Match-result cache occupancy, for `/api/health` and `/api/ai-status`.
    pub async fn cache_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "size": self.cache.len().await,
            "capacity": self.cache.capacity(),
        })
    }

    /// spec §4.10 entry point.
    pub async fn match_context(&self, url: &str, title: Option<&str>, extra_keywords: &[String]) -> MatchResult {
        let canonical = canonicalize_url(url);

        if let Some(hit) = self.cache.get_fresh(&canonical).await {
            return hit;
        }

        let mut keywords = derive_keywords(&canonical);
        keywords.extend(title.map(title_keywords).unwrap_or_default());
        keywords.extend(extra_keywords.iter().cloned());
        keywords.sort();
        keywords.dedup();

        let candidates = self.query_store(&canonical, &keywords).await;
        let result = if candidates.is_empty() {
            match self.cache.get_stale(&canonical).await {
                Some(stale) => stale,
                None => MatchResult { matched: false, events: Vec::new(), confidence: 0.0 },
            }
        } else {
            self.validate(&keywords, candidates).await
        };

        self.cache.put(canonical, result.clone()).await;
        result
    }

    async fn query_store(&self, canonical_url: &str, keywords: &[String]) -> Vec<Event> {
        let exact = self.store.context_url_matches(canonical_url).await;
        if !exact.is_empty() {
            return exact;
        }
        if keywords.is_empty() {
            return Vec::new();
        }

        let query = keywords.join(" ");
        let vector = self.llm.embed(&query).await.ok();
        self.store
            .hybrid_search_events(&query, vector.as_deref(), self.hot_window_days, 20)
            .await
    }

    fn ping_probe(&self) -> impl Fn() -> ProbeFuture + Send + Sync + 'static {
        let llm = self.llm.clone();
        move || -> ProbeFuture {
            let llm = llm.clone();
            Box::pin(async move { llm.ping().await })
        }
    }

    /// spec §4.10 step 5: `withFallback(LLM validate, keyword overlap, empty)`.
    async fn validate(&self, keywords: &[String], candidates: Vec<Event>) -> MatchResult {
        let candidate_views: Vec<EventCandidate> = candidates.iter().map(to_candidate).collect();

        let llm = self.llm.clone();
        let keywords_t1 = keywords.to_vec();
        let candidates_t1 = candidate_views.clone();
        let keywords_t2 = keywords.to_vec();
        let candidates_t2 = candidate_views.clone();
        let probe = self.ping_probe();

        let (indices, confidence): (Vec<usize>, f64) = self
            .tier
            .with_fallback(
                probe,
                move || async move { llm.validate_relevance(&keywords_t1, &candidates_t1).await.map(|idx| (idx, 1.0)) },
                move || async move {
                    Ok::<(Vec<usize>, f64), EnvelopeError>((heuristics::validate_relevance(&keywords_t2, &candidates_t2), 0.6))
                },
                move || (Vec::new(), 0.0),
            )
            .await;

        let matched_events: Vec<Event> = indices
            .into_iter()
            .filter_map(|idx| candidates.get(idx).cloned())
            .collect();

        MatchResult { matched: !matched_events.is_empty(), confidence, events: matched_events }
    }
}

/// Strips `utm_*`, `ref`, `fbclid`, `gclid` query params and any fragment
/// (spec §4.10 step 1). Falls back to a lowercase of the raw input if the
/// URL fails to parse (e.g. a bare host the client sent without a scheme).
fn canonicalize_url(raw: &str) -> String {
    let parsed = Url::parse(raw).or_else(|_| Url::parse(&format!("https://{raw}")));
    let Ok(mut parsed) = parsed else {
        return raw.to_lowercase();
    };

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| {
            let lower = key.to_lowercase();
            !TRACKING_PARAM_PREFIXES.iter().any(|p| lower.starts_with(p)) && !TRACKING_PARAMS.contains(&lower.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let query = kept.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        parsed.set_query(Some(&query));
    }
    parsed.set_fragment(None);

    parsed.to_string().to_lowercase()
}

/// spec §4.10 step 3: regex table first, then a default tokenizer over the
/// URL path that drops sub-3-char segments and pure-digit tokens.
fn derive_keywords(canonical_url: &str) -> Vec<String> {
    for (pattern, keyword) in KNOWN_PATTERNS.iter() {
        if pattern.is_match(canonical_url) {
            return vec![keyword.to_string()];
        }
    }

    let Ok(parsed) = Url::parse(canonical_url) else {
        return Vec::new();
    };

    parsed
        .path_segments()
        .into_iter()
        .flatten()
        .flat_map(|segment| segment.split(['-', '_', '.']))
        .map(str::to_lowercase)
        .filter(|s| s.len() >= 3 && !s.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

fn title_keywords(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() >= 3)
        .collect()
}

fn to_candidate(event: &Event) -> EventCandidate {
    EventCandidate {
        id: event.id,
        title: event.title.clone(),
        event_type: event.event_type.clone(),
        keywords: event.keywords.clone(),
        location: event.location.clone().unwrap_or_default(),
        description: event.description.clone().unwrap_or_default(),
        event_time: event.event_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_tracking_params_and_fragment() {
        let url = "https://example.com/page?utm_source=whatsapp&ref=share&id=7#section-2";
        assert_eq!(canonicalize_url(url), "https://example.com/page?id=7");
    }

    #[test]
    fn canonicalize_lowercases_host_and_path() {
        assert_eq!(canonicalize_url("https://Example.COM/Goa-Hotels"), "https://example.com/goa-hotels");
    }

    #[test]
    fn derive_keywords_recognizes_known_service() {
        let keywords = derive_keywords("https://www.netflix.com/browse");
        assert_eq!(keywords, vec!["netflix".to_string()]);
    }

    #[test]
    fn derive_keywords_falls_back_to_path_tokenizer() {
        let keywords = derive_keywords("https://www.makemytrip-clone.example.com/goa-hotels-123");
        assert!(keywords.contains(&"goa".to_string()));
        assert!(keywords.contains(&"hotels".to_string()));
        assert!(!keywords.iter().any(|k| k == "123"));
    }

    #[test]
    fn title_keywords_drops_short_words() {
        let keywords = title_keywords("Go to the Goa trip page");
        assert!(keywords.contains(&"goa".to_string()));
        assert!(!keywords.contains(&"to".to_string()));
    }
}
