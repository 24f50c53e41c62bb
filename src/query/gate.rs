//! Retrieval gate.
//!
//! Decides whether a query deserves retrieval at all. Deterministic fast
//! rules cover the common cases in well under a millisecond; everything
//! else falls through to a text-completion provider with a strict timeout.
//! Provider failure never blocks retrieval: the fallback decision is to
//! retrieve at confidence 0.5.
//!
//! # Fast path
//!
//! | Signal | Decision | Strategy | Confidence |
//! |--------|----------|----------|------------|
//! | Backticked code or file extension | retrieve | keyword | 0.95 |
//! | find/locate/show/list | retrieve | semantic | 0.9 |
//! | debug/fix/"why … error" | retrieve | graph | 0.9 |
//! | Greeting, confirmation, arithmetic, generic language question | skip | — | 0.99 |

use super::patterns::{
    ARITHMETIC, BACKTICK_FRAGMENT, CONFIRMATION, FILE_EXTENSION, GREETING, LANGUAGE_CONCEPT,
    LOOKUP_WORDS, TROUBLESHOOT_PHRASE,
};
use crate::config::GateConfig;
use crate::llm::CompletionProvider;
use crate::models::SearchSource;
use crate::current_timestamp;
use lru::LruCache;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tracing::instrument;

/// Gate decision for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    /// Whether retrieval should run.
    pub should_retrieve: bool,
    /// Decision confidence in [0, 1].
    pub confidence: f32,
    /// Human-readable reason.
    pub reason: String,
    /// Strategy hint for the search layer.
    pub suggested_strategy: Option<SearchSource>,
}

impl GateDecision {
    fn retrieve(confidence: f32, reason: &str, strategy: Option<SearchSource>) -> Self {
        Self {
            should_retrieve: true,
            confidence,
            reason: reason.to_string(),
            suggested_strategy: strategy,
        }
    }

    fn skip(confidence: f32, reason: &str) -> Self {
        Self {
            should_retrieve: false,
            confidence,
            reason: reason.to_string(),
            suggested_strategy: None,
        }
    }
}

struct CachedDecision {
    decision: GateDecision,
    inserted_at: i64,
}

/// Provider response shape for the slow path.
#[derive(Debug, Deserialize)]
struct ProviderDecision {
    #[serde(rename = "shouldRetrieve")]
    should_retrieve: bool,
    confidence: f32,
    reason: Option<String>,
    #[serde(rename = "suggestedStrategy")]
    suggested_strategy: Option<String>,
}

/// Admission gate in front of the retrieval pipeline.
pub struct RetrievalGate {
    provider: Option<Arc<dyn CompletionProvider>>,
    config: GateConfig,
    cache: Mutex<LruCache<String, CachedDecision>>,
}

impl RetrievalGate {
    /// Creates a gate with the given provider and configuration.
    #[must_use]
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>, config: GateConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            config,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Decides whether to retrieve for the query.
    ///
    /// Decisions are cached by the raw query string for the configured TTL.
    /// Disabled mode bypasses every check and always retrieves.
    #[instrument(skip(self), fields(query_len = query.len()))]
    pub fn should_retrieve(&self, query: &str) -> GateDecision {
        if !self.config.enabled {
            return GateDecision::retrieve(1.0, "gate disabled", None);
        }

        if let Some(cached) = self.cache_get(query) {
            metrics::counter!("repolens_gate_cache_hits_total").increment(1);
            return cached;
        }

        let decision = self
            .fast_path(query)
            .unwrap_or_else(|| self.slow_path(query));

        self.cache_put(query, &decision);
        metrics::counter!(
            "repolens_gate_decisions_total",
            "retrieve" => if decision.should_retrieve { "true" } else { "false" }
        )
        .increment(1);
        decision
    }

    fn fast_path(&self, query: &str) -> Option<GateDecision> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Some(GateDecision::skip(1.0, "empty query"));
        }

        if BACKTICK_FRAGMENT.is_match(trimmed) || FILE_EXTENSION.is_match(trimmed) {
            return Some(GateDecision::retrieve(
                0.95,
                "code or file reference",
                Some(SearchSource::Keyword),
            ));
        }

        if GREETING.is_match(trimmed)
            || CONFIRMATION.is_match(trimmed)
            || ARITHMETIC.is_match(trimmed)
            || LANGUAGE_CONCEPT.is_match(trimmed)
        {
            return Some(GateDecision::skip(0.99, "trivial query"));
        }

        if TROUBLESHOOT_PHRASE.is_match(trimmed) {
            return Some(GateDecision::retrieve(
                0.9,
                "troubleshooting phrasing",
                Some(SearchSource::Graph),
            ));
        }

        if LOOKUP_WORDS.is_match(trimmed) {
            return Some(GateDecision::retrieve(
                0.9,
                "lookup phrasing",
                Some(SearchSource::Semantic),
            ));
        }

        None
    }

    fn slow_path(&self, query: &str) -> GateDecision {
        let Some(provider) = self.provider.clone() else {
            return Self::fallback_decision("no provider configured");
        };

        let prompt = self.build_prompt(query);
        let timeout = Duration::from_millis(self.config.provider_timeout_ms);
        let (tx, rx) = mpsc::channel();

        // The worker thread outlives a timeout; Rust threads cannot be
        // killed, so the send simply fails once the receiver is gone.
        std::thread::spawn(move || {
            let result = provider.complete(&prompt);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(text)) => Self::parse_provider_response(&text),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "gate provider failed");
                metrics::counter!("repolens_gate_provider_failures_total").increment(1);
                Self::fallback_decision("provider error")
            },
            Err(_) => {
                metrics::counter!("repolens_gate_provider_timeouts_total").increment(1);
                Self::fallback_decision("provider timeout")
            },
        }
    }

    fn build_prompt(&self, query: &str) -> String {
        format!(
            "You decide whether a coding assistant should search a repository \
             knowledge base before answering.\n\
             Project: {}\n\
             Entity types available: {}\n\
             Query: {query}\n\n\
             Respond with JSON only: {{\"shouldRetrieve\": bool, \"confidence\": number, \
             \"reason\": string, \"suggestedStrategy\": \"keyword\"|\"semantic\"|\"graph\"|null}}",
            self.config.project_description,
            self.config.entity_types.join(", "),
        )
    }

    fn parse_provider_response(text: &str) -> GateDecision {
        // Tolerate prose around the JSON object.
        let json = text
            .find('{')
            .and_then(|start| text.rfind('}').map(|end| &text[start..=end]))
            .unwrap_or(text);

        match serde_json::from_str::<ProviderDecision>(json) {
            Ok(parsed) => GateDecision {
                should_retrieve: parsed.should_retrieve,
                confidence: parsed.confidence.clamp(0.0, 1.0),
                reason: parsed
                    .reason
                    .unwrap_or_else(|| "provider decision".to_string()),
                suggested_strategy: parsed
                    .suggested_strategy
                    .as_deref()
                    .and_then(SearchSource::parse),
            },
            Err(e) => {
                tracing::debug!(error = %e, "malformed gate provider response");
                Self::fallback_decision("malformed provider response")
            },
        }
    }

    fn fallback_decision(cause: &str) -> GateDecision {
        GateDecision::retrieve(0.5, &format!("fallback: {cause}"), None)
    }

    fn cache_get(&self, query: &str) -> Option<GateDecision> {
        if !self.config.cache_enabled {
            return None;
        }
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let ttl = i64::try_from(self.config.cache_ttl_secs).unwrap_or(i64::MAX);
        match cache.get(query) {
            Some(entry) if current_timestamp() - entry.inserted_at <= ttl => {
                Some(entry.decision.clone())
            },
            Some(_) => {
                cache.pop(query);
                None
            },
            None => None,
        }
    }

    fn cache_put(&self, query: &str, decision: &GateDecision) {
        if !self.config.cache_enabled {
            return;
        }
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.put(
            query.to_string(),
            CachedDecision {
                decision: decision.clone(),
                inserted_at: current_timestamp(),
            },
        );
    }
}
