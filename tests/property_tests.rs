//! Property-based tests for the pure pipeline math: bigram similarity,
//! the feedback multiplier, token estimation, assembly budgets, and
//! parser stability.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use repolens::config::AssemblerConfig;
use repolens::context::{ContextAssembler, estimate_tokens, score_multiplier};
use repolens::graph::bigram_jaccard;
use repolens::models::{
    Entity, EntityFeedbackStats, EntityId, EntityType, ScoredEntity, SearchSource,
};
use repolens::query::{QueryParser, normalize};
use repolens::service::pipeline_confidence;
use repolens::storage::sanitize_project_name;

proptest! {
    /// Property: bigram similarity of a string with itself is 1.
    #[test]
    fn prop_jaccard_identity(s in "[a-zA-Z0-9 _-]{1,40}") {
        // strings with no alphanumerics normalize to empty and score 0
        if s.chars().any(|c| c.is_ascii_alphanumeric()) {
            prop_assert!((bigram_jaccard(&s, &s) - 1.0).abs() < f32::EPSILON);
        }
    }

    /// Property: bigram similarity is symmetric.
    #[test]
    fn prop_jaccard_symmetric(a in "[a-zA-Z0-9]{0,30}", b in "[a-zA-Z0-9]{0,30}") {
        prop_assert_eq!(bigram_jaccard(&a, &b).to_bits(), bigram_jaccard(&b, &a).to_bits());
    }

    /// Property: empty input on either side scores 0.
    #[test]
    fn prop_jaccard_empty_is_zero(s in "[a-zA-Z0-9]{1,30}") {
        prop_assert!(bigram_jaccard("", &s).abs() < f32::EPSILON);
        prop_assert!(bigram_jaccard(&s, "").abs() < f32::EPSILON);
    }

    /// Property: bigram similarity stays within [0, 1].
    #[test]
    fn prop_jaccard_bounded(a in "[a-zA-Z0-9 ]{0,40}", b in "[a-zA-Z0-9 ]{0,40}") {
        let sim = bigram_jaccard(&a, &b);
        prop_assert!((0.0..=1.0).contains(&sim));
    }

    /// Property: the feedback multiplier is clamped to [0.3, 1.7] and
    /// neutral below five signals.
    #[test]
    fn prop_multiplier_bounds(used in 0u32..50, ignored in 0u32..50, pos in 0u32..20, neg in 0u32..20) {
        let stats = EntityFeedbackStats {
            total_returns: used + ignored,
            used_count: used,
            ignored_count: ignored,
            positive_count: pos,
            negative_count: neg,
        };
        let multiplier = score_multiplier(&stats);
        prop_assert!((0.3..=1.7).contains(&multiplier));
        if stats.total_signals() < 5 {
            prop_assert!((multiplier - 1.0).abs() < f32::EPSILON);
        }
    }

    /// Property: token estimation is ceil(chars / 4).
    #[test]
    fn prop_token_estimate(s in ".{0,200}") {
        let chars = s.chars().count();
        prop_assert_eq!(estimate_tokens(&s), chars.div_ceil(4));
    }

    /// Property: assembled output never exceeds the token budget.
    #[test]
    fn prop_assembler_budget(
        sizes in prop::collection::vec(1usize..500, 0..8),
        max_tokens in 10usize..300,
    ) {
        let results: Vec<ScoredEntity> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                let entity = Entity::new(EntityType::Function, format!("e{i}"), format!("q::e{i}"))
                    .with_id(EntityId::new(format!("e{i}")))
                    .with_content("x".repeat(*size));
                ScoredEntity::new(entity, 0.9, SearchSource::Keyword)
            })
            .collect();

        let config = AssemblerConfig {
            max_tokens,
            ..Default::default()
        };
        let output = ContextAssembler::new().assemble(&results, &config);
        prop_assert!(output.tokens_used <= max_tokens);
        // truncated iff something eligible was dropped
        prop_assert_eq!(output.truncated, output.sources.len() < results.len());
    }

    /// Property: pipeline confidence stays in [0, 1].
    #[test]
    fn prop_confidence_bounded(scores in prop::collection::vec(0.0f32..3.0, 0..10)) {
        let confidence = pipeline_confidence(&scores);
        prop_assert!((0.0..=1.0).contains(&confidence));
    }

    /// Property: normalization is idempotent.
    #[test]
    fn prop_normalize_idempotent(s in "[a-zA-Z0-9 `.,!?]{0,80}") {
        let once = normalize(&s);
        let twice = normalize(&once);
        prop_assert_eq!(once, twice);
    }

    /// Property: re-parsing the normalized query preserves intent and
    /// keyword set.
    #[test]
    fn prop_reparse_stable(s in "[a-zA-Z ]{1,60}") {
        let parser = QueryParser::new();
        let first = parser.parse(&s);
        let second = parser.parse(&first.normalized);

        prop_assert_eq!(first.intent, second.intent);
        let first_set: std::collections::HashSet<_> = first.keywords.iter().cloned().collect();
        let second_set: std::collections::HashSet<_> = second.keywords.iter().cloned().collect();
        prop_assert_eq!(first_set, second_set);
    }

    /// Property: a parsed query survives a serialize → parse round trip.
    #[test]
    fn prop_parsed_query_serde_roundtrip(s in "[a-zA-Z `]{1,60}") {
        let parser = QueryParser::new();
        let parsed = parser.parse(&s);
        let json = serde_json::to_string(&parsed).unwrap();
        let back: repolens::models::ParsedQuery = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, back);
    }

    /// Property: sanitized project names contain only [A-Za-z0-9_].
    #[test]
    fn prop_sanitize_alphabet(s in ".{1,40}") {
        let sanitized = sanitize_project_name(&s);
        prop_assert!(sanitized.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        prop_assert_eq!(sanitize_project_name(&sanitized), sanitized);
    }
}
