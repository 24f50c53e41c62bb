//! Natural-language query parsing.
//!
//! Pure functions over the query string: intent classification, entity
//! mention extraction, keyword and synonym expansion, filter recognition,
//! normalization, and decomposition into weighted sub-queries.

use super::patterns::{
    BACKTICK_FRAGMENT, CALL_TOKEN, CONJUNCTION_SPLIT, IN_PATH_FILTER, INTENT_SIGNALS,
    LAST_DAYS_FILTER, LIMIT_FILTER, PASCAL_CASE, PATH_TOKEN, SINCE_FILTER, STOP_WORDS,
    TYPE_FILTER, synonyms_for,
};
use crate::models::{
    EntityMention, EntityType, MentionKind, ParsedQuery, QueryFilters, QueryIntent, SubQuery,
};
use chrono::NaiveDate;

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Minimum keyword length; shorter tokens are dropped (mention texts
    /// are always kept).
    pub min_keyword_length: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            min_keyword_length: 3,
        }
    }
}

/// Pure query parser.
#[derive(Debug, Clone, Default)]
pub struct QueryParser {
    config: ParserConfig,
}

impl QueryParser {
    /// Creates a parser with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser with the given configuration.
    #[must_use]
    pub const fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parses a query string.
    #[must_use]
    pub fn parse(&self, query: &str) -> ParsedQuery {
        let mentions = extract_mentions(query);
        let normalized = normalize(query);
        let (intent, intent_confidence) = classify_intent(&normalized);
        let filters = extract_filters(query);

        // Scrub mention and filter spans before tokenizing so their text
        // never leaks into generic keywords.
        let scrubbed = scrub_spans(query, &mentions);
        let scrubbed = scrub_filters(&scrubbed);
        let mut keywords = self.extract_keywords(&scrubbed);

        // Mention texts are keywords regardless of length.
        for mention in &mentions {
            let lowered = mention.text.to_lowercase();
            if !keywords.contains(&lowered) {
                keywords.push(lowered);
            }
        }

        let expanded_keywords = expand_keywords(&keywords);
        let sub_queries = self.decompose(&normalized);
        let was_decomposed = !sub_queries.is_empty();

        ParsedQuery {
            normalized,
            intent,
            intent_confidence,
            mentions,
            keywords,
            expanded_keywords,
            filters,
            was_decomposed,
            sub_queries,
        }
    }

    fn extract_keywords(&self, text: &str) -> Vec<String> {
        let mut keywords = Vec::new();
        for token in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
            let token = token.to_lowercase();
            if token.len() < self.config.min_keyword_length {
                continue;
            }
            if STOP_WORDS.contains(token.as_str()) {
                continue;
            }
            if token.chars().all(char::is_numeric) {
                continue;
            }
            if !keywords.contains(&token) {
                keywords.push(token);
            }
        }
        keywords
    }

    fn decompose(&self, normalized: &str) -> Vec<SubQuery> {
        let parts: Vec<&str> = CONJUNCTION_SPLIT
            .split(normalized)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() < 2 {
            return Vec::new();
        }

        // Each clause must carry enough substance to search on its own.
        let substantive: Vec<(&str, usize)> = parts
            .iter()
            .map(|p| (*p, self.extract_keywords(p).len()))
            .filter(|(_, count)| *count >= 1)
            .collect();
        if substantive.len() < 2 {
            return Vec::new();
        }

        // Weight proportional to keyword mass, floored, normalized to 1.0.
        #[allow(clippy::cast_precision_loss)]
        let raw: Vec<f32> = substantive
            .iter()
            .map(|(_, count)| (*count as f32).max(0.1))
            .collect();
        let total: f32 = raw.iter().sum();

        substantive
            .iter()
            .zip(raw.iter())
            .map(|((text, _), weight)| SubQuery {
                text: (*text).to_string(),
                weight: weight / total,
            })
            .collect()
    }
}

/// Normalizes a query: strips backticks (keeping content), collapses
/// whitespace, trims, and strips trailing punctuation.
#[must_use]
pub fn normalize(query: &str) -> String {
    let without_backticks = query.replace('`', "");
    let collapsed = without_backticks.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| {
            c.is_whitespace() || matches!(c, '.' | '!' | '?' | ',' | ';' | ':')
        })
        .trim_start()
        .to_string()
}

/// Classifies the query intent.
///
/// All matching families are collected; the highest-confidence match wins,
/// with ties broken by the fixed family priority order.
#[must_use]
pub fn classify_intent(query: &str) -> (QueryIntent, f32) {
    let mut best_per_family: Vec<(QueryIntent, f32)> = Vec::new();

    for signal in INTENT_SIGNALS.iter() {
        if signal.pattern.is_match(query) {
            match best_per_family.iter_mut().find(|(i, _)| *i == signal.intent) {
                Some((_, confidence)) => *confidence = confidence.max(signal.confidence),
                None => best_per_family.push((signal.intent, signal.confidence)),
            }
        }
    }

    if best_per_family.is_empty() {
        return (QueryIntent::General, 0.25);
    }

    let top_confidence = best_per_family
        .iter()
        .map(|(_, c)| *c)
        .fold(0.0_f32, f32::max);

    // Ties resolve by the fixed priority order.
    for family in QueryIntent::priority_order() {
        if let Some((intent, confidence)) = best_per_family
            .iter()
            .find(|(i, c)| i == family && (top_confidence - *c).abs() < f32::EPSILON)
        {
            return (*intent, *confidence);
        }
    }

    // Unreachable in practice; fall back to the raw maximum.
    best_per_family
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or((QueryIntent::General, 0.25))
}

fn classify_backtick_fragment(text: &str) -> MentionKind {
    if text.contains('(') {
        MentionKind::Function
    } else if text.contains('/') || looks_like_filename(text) {
        MentionKind::File
    } else {
        MentionKind::Class
    }
}

fn looks_like_filename(text: &str) -> bool {
    text.rsplit_once('.')
        .is_some_and(|(stem, ext)| {
            !stem.is_empty() && !ext.is_empty() && ext.chars().all(char::is_alphanumeric)
        })
}

fn push_mention(mentions: &mut Vec<EntityMention>, candidate: EntityMention) {
    if !mentions.iter().any(|m| m.duplicates(&candidate)) {
        mentions.push(candidate);
    }
}

/// Extracts entity mentions with their byte spans in the raw query.
#[must_use]
pub fn extract_mentions(query: &str) -> Vec<EntityMention> {
    let mut mentions: Vec<EntityMention> = Vec::new();

    // Backticked fragments first; their spans shadow the generic rules.
    for capture in BACKTICK_FRAGMENT.captures_iter(query) {
        if let (Some(whole), Some(inner)) = (capture.get(0), capture.get(1)) {
            let raw_text = inner.as_str().trim();
            if raw_text.is_empty() {
                continue;
            }
            let kind = classify_backtick_fragment(raw_text);
            let text = if kind == MentionKind::Function {
                raw_text.trim_end_matches("()").trim().to_string()
            } else {
                raw_text.to_string()
            };
            push_mention(
                &mut mentions,
                EntityMention {
                    text,
                    kind,
                    start: whole.start(),
                    end: whole.end(),
                },
            );
        }
    }

    fn inside_backticks(mentions: &[EntityMention], start: usize, end: usize) -> bool {
        mentions.iter().any(|m| start < m.end && m.start < end)
    }

    // PascalCase tokens outside backticks.
    for m in PASCAL_CASE.find_iter(query) {
        if inside_backticks(&mentions, m.start(), m.end()) {
            continue;
        }
        push_mention(
            &mut mentions,
            EntityMention {
                text: m.as_str().to_string(),
                kind: MentionKind::Class,
                start: m.start(),
                end: m.end(),
            },
        );
    }

    // Tokens followed by an opening parenthesis.
    for capture in CALL_TOKEN.captures_iter(query) {
        if let Some(name) = capture.get(1) {
            if inside_backticks(&mentions, name.start(), name.end()) {
                continue;
            }
            push_mention(
                &mut mentions,
                EntityMention {
                    text: name.as_str().to_string(),
                    kind: MentionKind::Function,
                    start: name.start(),
                    end: name.end(),
                },
            );
        }
    }

    // Path-like tokens.
    for m in PATH_TOKEN.find_iter(query) {
        if inside_backticks(&mentions, m.start(), m.end()) {
            continue;
        }
        push_mention(
            &mut mentions,
            EntityMention {
                text: m.as_str().to_string(),
                kind: MentionKind::File,
                start: m.start(),
                end: m.end(),
            },
        );
    }

    mentions.sort_by_key(|m| m.start);
    mentions
}

/// Recognizes structured filters in the query.
#[must_use]
pub fn extract_filters(query: &str) -> QueryFilters {
    let mut filters = QueryFilters::default();

    let types: Vec<EntityType> = TYPE_FILTER
        .captures_iter(query)
        .filter_map(|c| c.get(1).and_then(|m| EntityType::parse(m.as_str())))
        .collect();
    if !types.is_empty() {
        filters.types = Some(types);
    }

    if let Some(capture) = LIMIT_FILTER.captures(query)
        && let Some(m) = capture.get(1)
        && let Ok(limit) = m.as_str().parse::<usize>()
    {
        filters.limit = Some(limit.max(1));
    }

    let files: Vec<String> = IN_PATH_FILTER
        .captures_iter(query)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim_end_matches('/').to_string()))
        .collect();
    if !files.is_empty() {
        filters.files = Some(files);
    }

    if let Some(capture) = SINCE_FILTER.captures(query)
        && let Some(m) = capture.get(1)
        && let Ok(date) = m.as_str().parse::<NaiveDate>()
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        filters.since = Some(midnight.and_utc().timestamp());
    } else if let Some(capture) = LAST_DAYS_FILTER.captures(query)
        && let Some(m) = capture.get(1)
        && let Ok(days) = m.as_str().parse::<i64>()
    {
        filters.since = Some(crate::current_timestamp() - days * 86_400);
    }

    filters
}

fn scrub_spans(query: &str, mentions: &[EntityMention]) -> String {
    let mut bytes: Vec<u8> = query.bytes().collect();
    for mention in mentions {
        for byte in bytes
            .iter_mut()
            .take(mention.end.min(query.len()))
            .skip(mention.start)
        {
            *byte = b' ';
        }
    }
    String::from_utf8(bytes).unwrap_or_else(|_| query.to_string())
}

fn scrub_filters(text: &str) -> String {
    let mut scrubbed = TYPE_FILTER.replace_all(text, " ").into_owned();
    scrubbed = LIMIT_FILTER.replace_all(&scrubbed, " ").into_owned();
    scrubbed = IN_PATH_FILTER.replace_all(&scrubbed, " ").into_owned();
    scrubbed = SINCE_FILTER.replace_all(&scrubbed, " ").into_owned();
    scrubbed = LAST_DAYS_FILTER.replace_all(&scrubbed, " ").into_owned();
    scrubbed
}

fn expand_keywords(keywords: &[String]) -> Vec<String> {
    let mut expansions = Vec::new();
    for keyword in keywords {
        for synonym in synonyms_for(keyword) {
            let synonym = synonym.to_string();
            if !keywords.contains(&synonym) && !expansions.contains(&synonym) {
                expansions.push(synonym);
            }
        }
    }
    expansions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  find   `AuthService`!!  "), "find AuthService");
        assert_eq!(normalize("what is this?"), "what is this");
    }

    #[test]
    fn test_intent_classification() {
        assert_eq!(classify_intent("how do I add a route").0, QueryIntent::How);
        assert_eq!(
            classify_intent("why is the test failing").0,
            QueryIntent::Debug
        );
        assert_eq!(
            classify_intent("difference between parser and lexer").0,
            QueryIntent::Compare
        );
        assert_eq!(classify_intent("find the token store").0, QueryIntent::Find);
        assert_eq!(
            classify_intent("list all functions in the module").0,
            QueryIntent::List
        );
        assert_eq!(classify_intent("purple monkeys").0, QueryIntent::General);
    }

    #[test]
    fn test_intent_confidence_ordering() {
        let (_, anchored) = classify_intent("how do I cache results");
        let (_, inner) = classify_intent("tell me how to cache results");
        assert!(anchored > inner);
    }

    #[test]
    fn test_mention_backtick_function() {
        let mentions = extract_mentions("explain `parse_query()` please");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].text, "parse_query");
        assert_eq!(mentions[0].kind, MentionKind::Function);
    }

    #[test]
    fn test_mention_backtick_file_and_class() {
        let mentions = extract_mentions("compare `src/auth.rs` with `AuthService`");
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].kind, MentionKind::File);
        assert_eq!(mentions[1].kind, MentionKind::Class);
        assert_eq!(mentions[1].text, "AuthService");
    }

    #[test]
    fn test_mention_pascal_case_outside_backticks() {
        let mentions = extract_mentions("where does TokenStore get created");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].kind, MentionKind::Class);
        assert_eq!(mentions[0].text, "TokenStore");
    }

    #[test]
    fn test_mention_call_token() {
        let mentions = extract_mentions("who calls refresh_token() today");
        assert!(
            mentions
                .iter()
                .any(|m| m.text == "refresh_token" && m.kind == MentionKind::Function)
        );
    }

    #[test]
    fn test_mention_duplicate_suppression() {
        // PascalCase inside backticks must not double-report
        let mentions = extract_mentions("look at `AuthService`");
        assert_eq!(mentions.len(), 1);
    }

    #[test]
    fn test_keywords_strip_mentions_and_stops() {
        let parser = QueryParser::new();
        let parsed = parser.parse("find the `AuthService` token rotation");

        assert!(parsed.keywords.contains(&"token".to_string()));
        assert!(parsed.keywords.contains(&"rotation".to_string()));
        // mention text preserved as a keyword
        assert!(parsed.keywords.contains(&"authservice".to_string()));
        // stop word dropped
        assert!(!parsed.keywords.contains(&"the".to_string()));
    }

    #[test]
    fn test_short_mention_kept_as_keyword() {
        let parser = QueryParser::new();
        let parsed = parser.parse("what is `io`");
        assert!(parsed.keywords.contains(&"io".to_string()));
    }

    #[test]
    fn test_synonym_expansion_excludes_present() {
        let parser = QueryParser::new();
        let parsed = parser.parse("auth token errors");
        assert!(parsed.expanded_keywords.contains(&"authentication".to_string()));
        assert!(parsed.expanded_keywords.contains(&"exception".to_string()));
        // present keywords are never re-added
        assert!(!parsed.expanded_keywords.contains(&"auth".to_string()));
    }

    #[test]
    fn test_filters() {
        let filters = extract_filters("type:function limit:5 in src/auth since:2024-03-01");
        assert_eq!(filters.types, Some(vec![EntityType::Function]));
        assert_eq!(filters.limit, Some(5));
        assert_eq!(filters.files, Some(vec!["src/auth".to_string()]));
        assert!(filters.since.is_some());
    }

    #[test]
    fn test_last_days_filter() {
        let filters = extract_filters("changes last 7 days");
        let since = filters.since.unwrap();
        let expected = crate::current_timestamp() - 7 * 86_400;
        assert!((since - expected).abs() <= 1);
    }

    #[test]
    fn test_filter_tokens_not_keywords() {
        let parser = QueryParser::new();
        let parsed = parser.parse("token handling type:function limit:5");
        assert!(!parsed.keywords.contains(&"limit".to_string()));
        assert!(parsed.keywords.contains(&"token".to_string()));
        assert_eq!(parsed.filters.limit, Some(5));
    }

    #[test]
    fn test_decomposition_weights_sum_to_one() {
        let parser = QueryParser::new();
        let parsed = parser.parse("explain the token refresh flow and list the cache invalidation hooks");
        assert!(parsed.was_decomposed);
        assert_eq!(parsed.sub_queries.len(), 2);
        let total: f32 = parsed.sub_queries.iter().map(|s| s.weight).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_no_decomposition_for_simple_query() {
        let parser = QueryParser::new();
        let parsed = parser.parse("explain the token refresh flow");
        assert!(!parsed.was_decomposed);
        assert!(parsed.sub_queries.is_empty());
    }

    #[test]
    fn test_reparse_is_stable() {
        // parse → normalize → parse keeps intent, keywords, mention texts
        let parser = QueryParser::new();
        let first = parser.parse("find the `AuthService` rotation and fix the login bug");
        let second = parser.parse(&first.normalized);

        assert_eq!(first.intent, second.intent);

        let first_keywords: std::collections::HashSet<_> = first.keywords.iter().collect();
        let second_keywords: std::collections::HashSet<_> = second.keywords.iter().collect();
        assert_eq!(first_keywords, second_keywords);

        let first_texts: std::collections::HashSet<_> =
            first.mentions.iter().map(|m| &m.text).collect();
        let second_texts: std::collections::HashSet<_> =
            second.mentions.iter().map(|m| &m.text).collect();
        assert_eq!(first_texts, second_texts);
    }
}
