//! End-to-end pipeline tests: gate decisions, search fusion, feedback
//! adjustment, expansion, and assembly through `query_context`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use repolens::config::{GateConfig, RepolensConfig};
use repolens::llm::StaticCompletion;
use repolens::models::{
    ContextFormat, EntityId, EntityInput, EntityType, FeedbackSignal, RelationshipInput,
    RelationshipType,
};
use repolens::query::RetrievalGate;
use repolens::service::{QueryOptions, RetrievalService};
use std::sync::Arc;

fn service() -> RetrievalService {
    RetrievalService::new(RepolensConfig::in_memory()).unwrap()
}

fn seed(
    service: &RetrievalService,
    project: &str,
    id: &str,
    name: &str,
    ty: EntityType,
    content: &str,
) {
    let entities = service.entities(project).unwrap();
    let index = service.embeddings(project).unwrap();
    let entity = entities
        .upsert(EntityInput {
            id: Some(EntityId::new(id)),
            name: name.to_string(),
            qualified_name: format!("{project}::{id}"),
            entity_type: Some(ty),
            content: Some(content.to_string()),
            ..Default::default()
        })
        .unwrap();
    let vector = service.embedder().embed(entity.comparison_text()).unwrap();
    index.upsert(&entity.id, &vector).unwrap();
}

// ---------------------------------------------------------------------------
// Gate fast-path scenarios
// ---------------------------------------------------------------------------

#[test]
fn gate_greeting_is_suppressed() {
    let gate = RetrievalGate::new(None, GateConfig::default());
    let decision = gate.should_retrieve("hello");
    assert!(!decision.should_retrieve);
    assert!(decision.confidence >= 0.99);
}

#[test]
fn gate_backtick_suggests_keyword() {
    let gate = RetrievalGate::new(None, GateConfig::default());
    let decision = gate.should_retrieve("Find `AuthService`");
    assert!(decision.should_retrieve);
    assert_eq!(
        decision.suggested_strategy,
        Some(repolens::models::SearchSource::Keyword)
    );
}

#[test]
fn gate_troubleshooting_suggests_graph() {
    let gate = RetrievalGate::new(None, GateConfig::default());
    let decision = gate.should_retrieve("why is the test failing");
    assert!(decision.should_retrieve);
    assert_eq!(
        decision.suggested_strategy,
        Some(repolens::models::SearchSource::Graph)
    );
}

// ---------------------------------------------------------------------------
// Feedback adjustment
// ---------------------------------------------------------------------------

#[test]
fn feedback_reorders_results() {
    let service = service();
    // two entities that match the query equally well
    seed(
        &service,
        "p",
        "E",
        "retry_handler",
        EntityType::Function,
        "retry with backoff",
    );
    seed(
        &service,
        "p",
        "F",
        "retry_helper",
        EntityType::Function,
        "retry with backoff",
    );

    // E: 9 used, 1 ignored → multiplier 1.4; F: no data → 1.0
    let feedback = service.feedback("p").unwrap();
    for i in 0..9 {
        feedback
            .record(&format!("q{i}"), &EntityId::new("E"), FeedbackSignal::Used)
            .unwrap();
    }
    feedback
        .record("q9", &EntityId::new("E"), FeedbackSignal::Ignored)
        .unwrap();

    let result = service
        .query_context("p", "find the retry backoff", &QueryOptions::default())
        .unwrap();

    let e_pos = result
        .sources
        .iter()
        .position(|s| s.entity_id.as_str() == "E")
        .expect("E in sources");
    let f_pos = result
        .sources
        .iter()
        .position(|s| s.entity_id.as_str() == "F")
        .expect("F in sources");
    assert!(e_pos < f_pos, "feedback should rank E above F");
}

#[test]
fn detect_usage_splits_used_and_ignored() {
    let service = service();
    seed(&service, "p", "E", "AuthService", EntityType::Class, "auth");
    seed(&service, "p", "F", "Parser", EntityType::Class, "parse");

    let entities = service.entities("p").unwrap();
    let all = vec![
        entities.get(&EntityId::new("E")).unwrap().unwrap(),
        entities.get(&EntityId::new("F")).unwrap().unwrap(),
    ];

    let feedback = service.feedback("p").unwrap();
    feedback
        .detect_usage("q1", &all, "AuthService handles the token flow.")
        .unwrap();

    let e_stats = feedback.stats_for(&EntityId::new("E")).unwrap();
    let f_stats = feedback.stats_for(&EntityId::new("F")).unwrap();
    assert_eq!(e_stats.used_count, 1);
    assert_eq!(f_stats.ignored_count, 1);
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

#[test]
fn assembler_truncates_on_budget() {
    let service = service();
    seed(
        &service,
        "p",
        "big1",
        "first_block",
        EntityType::Function,
        &"first body ".repeat(20),
    );
    seed(
        &service,
        "p",
        "big2",
        "second_block",
        EntityType::Function,
        &"second body ".repeat(30),
    );

    let options = QueryOptions {
        max_tokens: Some(100),
        expand: false,
        ..Default::default()
    };
    let result = service
        .query_context("p", "find the first block body", &options)
        .unwrap();

    assert!(result.tokens_used <= 100);
    assert!(result.truncated);
    assert_eq!(result.sources.len(), 1);
}

#[test]
fn xml_format_via_options() {
    let service = service();
    seed(
        &service,
        "p",
        "e1",
        "token_refresh",
        EntityType::Function,
        "rotate the token",
    );

    let options = QueryOptions {
        format: Some(ContextFormat::Xml),
        ..Default::default()
    };
    let result = service
        .query_context("p", "find the token refresh", &options)
        .unwrap();
    assert!(result.context.contains("<entity name=\"token_refresh\""));
    assert!(result.context.contains("</entity>"));
}

// ---------------------------------------------------------------------------
// Pipeline composition
// ---------------------------------------------------------------------------

#[test]
fn decomposed_query_covers_both_clauses() {
    let service = service();
    seed(
        &service,
        "p",
        "refresh",
        "token_refresh",
        EntityType::Function,
        "rotate the session token on expiry",
    );
    seed(
        &service,
        "p",
        "invalidate",
        "cache_invalidation",
        EntityType::Function,
        "drop stale cache entries",
    );

    let result = service
        .query_context(
            "p",
            "explain the token refresh and describe the cache invalidation",
            &QueryOptions::default(),
        )
        .unwrap();

    let ids: Vec<&str> = result.sources.iter().map(|s| s.entity_id.as_str()).collect();
    assert!(ids.contains(&"refresh"));
    assert!(ids.contains(&"invalidate"));
}

#[test]
fn expansion_adds_owner_with_reduced_relevance() {
    let service = service();
    seed(
        &service,
        "p",
        "func",
        "token_refresh",
        EntityType::Function,
        "rotate the token",
    );
    seed(
        &service,
        "p",
        "file",
        "auth_module",
        EntityType::File,
        "module source",
    );
    service
        .relationships("p")
        .unwrap()
        .create(RelationshipInput::new(
            EntityId::new("file"),
            EntityId::new("func"),
            RelationshipType::Contains,
        ))
        .unwrap();

    let result = service
        .query_context("p", "find the token refresh", &QueryOptions::default())
        .unwrap();

    let seed_source = result
        .sources
        .iter()
        .find(|s| s.entity_id.as_str() == "func")
        .expect("seed present");
    let expanded = result
        .sources
        .iter()
        .find(|s| s.entity_id.as_str() == "file")
        .expect("owner expanded in");
    assert!(expanded.relevance < seed_source.relevance);
}

#[test]
fn hyde_failure_degrades_gracefully() {
    let config = RepolensConfig::in_memory();
    let service = RetrievalService::with_providers(
        config,
        Arc::new(repolens::embedding::HashingEmbedder::default()),
        Some(Arc::new(StaticCompletion::failing())),
    )
    .unwrap();
    seed(
        &service,
        "p",
        "e1",
        "token_refresh",
        EntityType::Function,
        "rotate the token",
    );

    let options = QueryOptions {
        hyde: true,
        ..Default::default()
    };
    let result = service
        .query_context("p", "find the token refresh", &options)
        .unwrap();
    // provider failure never blocks the search itself
    assert!(!result.sources.is_empty());
}

#[test]
fn confidence_tracks_result_quality() {
    let service = service();
    seed(
        &service,
        "p",
        "e1",
        "token_refresh",
        EntityType::Function,
        "rotate the session token",
    );

    let strong = service
        .query_context("p", "find the token_refresh function", &QueryOptions::default())
        .unwrap();

    let empty_project = service
        .query_context("q", "find the token_refresh function", &QueryOptions::default())
        .unwrap();

    assert!(strong.confidence > empty_project.confidence);
    assert!(empty_project.confidence.abs() < f32::EPSILON);
    assert!(strong.confidence <= 1.0);
}

#[test]
fn explicit_strategy_selection_is_honored() {
    let service = service();
    seed(
        &service,
        "p",
        "e1",
        "token_refresh",
        EntityType::Function,
        "rotate the token",
    );

    // graph-only search with no mentions yields nothing
    let options = QueryOptions {
        strategies: Some(vec![repolens::models::SearchSource::Graph]),
        expand: false,
        gate: false,
        ..Default::default()
    };
    let result = service
        .query_context("p", "rotate the token somehow", &options)
        .unwrap();
    assert!(result.sources.is_empty());
}

#[test]
fn type_filter_from_query_restricts_results() {
    let service = service();
    seed(
        &service,
        "p",
        "code",
        "token_notes_fn",
        EntityType::Function,
        "token helper",
    );
    seed(
        &service,
        "p",
        "doc",
        "token_notes",
        EntityType::Document,
        "token documentation",
    );

    let result = service
        .query_context("p", "find token notes type:document", &QueryOptions::default())
        .unwrap();
    assert!(!result.sources.is_empty());
    assert!(result
        .sources
        .iter()
        .all(|s| s.entity_type == EntityType::Document));
}
