//! Parsed-query types: intent, entity mentions, filters, sub-queries.

use super::entity::EntityType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified intent of a natural-language query.
///
/// Multiple intent families may match a query; the parser keeps the
/// highest-confidence family and breaks ties by the fixed priority order of
/// [`QueryIntent::priority_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// "find X", "where is X" — locate an entity.
    Find,
    /// "explain X", "what does X do" — explain behavior.
    Explain,
    /// "list all X", "show every X" — enumerate.
    List,
    /// "X vs Y", "difference between" — compare.
    Compare,
    /// "how do I", "how does" — implementation guidance.
    How,
    /// "why does", "why is" — rationale.
    Why,
    /// "debug", "fix", "error" — troubleshooting.
    Debug,
    /// "refactor", "clean up" — restructuring.
    Refactor,
    /// "implement", "add", "create" — new functionality.
    Implement,
    /// Unclassified.
    #[default]
    General,
}

impl QueryIntent {
    /// Fixed tie-break order: more specific intents win over `General`.
    #[must_use]
    pub const fn priority_order() -> &'static [Self] {
        &[
            Self::Debug,
            Self::How,
            Self::Why,
            Self::Compare,
            Self::Implement,
            Self::Refactor,
            Self::Find,
            Self::List,
            Self::Explain,
            Self::General,
        ]
    }

    /// Returns the intent as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Explain => "explain",
            Self::List => "list",
            Self::Compare => "compare",
            Self::How => "how",
            Self::Why => "why",
            Self::Debug => "debug",
            Self::Refactor => "refactor",
            Self::Implement => "implement",
            Self::General => "general",
        }
    }

    /// Parses an intent from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "find" | "locate" => Some(Self::Find),
            "explain" | "describe" => Some(Self::Explain),
            "list" | "enumerate" => Some(Self::List),
            "compare" | "vs" => Some(Self::Compare),
            "how" | "howto" => Some(Self::How),
            "why" => Some(Self::Why),
            "debug" | "fix" | "troubleshoot" => Some(Self::Debug),
            "refactor" => Some(Self::Refactor),
            "implement" | "create" => Some(Self::Implement),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of entity a mention most likely refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionKind {
    /// Looks like a callable (`foo(`, backticked text containing `(`).
    Function,
    /// Has an extension or a path separator.
    File,
    /// PascalCase token or other backticked identifier.
    Class,
}

impl MentionKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::File => "file",
            Self::Class => "class",
        }
    }

    /// Maps the mention kind to the entity types it should match.
    #[must_use]
    pub fn entity_types(&self) -> Vec<EntityType> {
        match self {
            Self::Function => vec![EntityType::Function, EntityType::Method],
            Self::File => vec![EntityType::File, EntityType::Document],
            Self::Class => vec![
                EntityType::Class,
                EntityType::Interface,
                EntityType::Module,
                EntityType::Concept,
            ],
        }
    }
}

/// An entity mention extracted from a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    /// The mentioned text, backticks stripped.
    pub text: String,
    /// Likely kind of the referenced entity.
    pub kind: MentionKind,
    /// Byte offset where the mention starts in the raw query.
    pub start: usize,
    /// Byte offset one past the mention end.
    pub end: usize,
}

impl EntityMention {
    /// Returns true when this mention overlaps `other` and carries the same
    /// text. Used to suppress duplicates.
    #[must_use]
    pub fn duplicates(&self, other: &Self) -> bool {
        self.text == other.text && self.start < other.end && other.start < self.end
    }
}

/// Structured filters recognized inside a query
/// (`type:function`, `limit:5`, `in src/auth`, `since:2024-01-01`,
/// `last 7 days`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    /// Restrict results to these entity types.
    pub types: Option<Vec<EntityType>>,
    /// Restrict results to paths containing one of these fragments.
    pub files: Option<Vec<String>>,
    /// Result limit override.
    pub limit: Option<usize>,
    /// Only entities updated at or after this Unix timestamp.
    pub since: Option<i64>,
}

impl QueryFilters {
    /// Returns true if no filter is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.types.is_none() && self.files.is_none() && self.limit.is_none() && self.since.is_none()
    }
}

/// A weighted sub-query produced by decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    /// The sub-query text.
    pub text: String,
    /// Contribution weight; all sub-query weights sum to ≈ 1.0.
    pub weight: f32,
}

/// Result of parsing a natural-language query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Normalized query text.
    pub normalized: String,
    /// Classified intent.
    pub intent: QueryIntent,
    /// Confidence of the intent classification (0.0 to 1.0).
    pub intent_confidence: f32,
    /// Extracted entity mentions.
    pub mentions: Vec<EntityMention>,
    /// Deduplicated lowercase keywords.
    pub keywords: Vec<String>,
    /// Synonym expansions not already present in `keywords`.
    pub expanded_keywords: Vec<String>,
    /// Recognized structured filters.
    pub filters: QueryFilters,
    /// True when the query was split into sub-queries.
    pub was_decomposed: bool,
    /// Weighted sub-queries (empty unless decomposed).
    pub sub_queries: Vec<SubQuery>,
}

impl ParsedQuery {
    /// All search terms: keywords followed by expansions.
    #[must_use]
    pub fn all_terms(&self) -> Vec<&str> {
        self.keywords
            .iter()
            .map(String::as_str)
            .chain(self.expanded_keywords.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_roundtrip() {
        for intent in QueryIntent::priority_order() {
            assert_eq!(QueryIntent::parse(intent.as_str()), Some(*intent));
        }
    }

    #[test]
    fn test_priority_order_covers_all_intents() {
        assert_eq!(QueryIntent::priority_order().len(), 10);
    }

    #[test]
    fn test_mention_duplicates() {
        let a = EntityMention {
            text: "AuthService".to_string(),
            kind: MentionKind::Class,
            start: 5,
            end: 16,
        };
        let b = EntityMention {
            text: "AuthService".to_string(),
            kind: MentionKind::Class,
            start: 5,
            end: 16,
        };
        let c = EntityMention {
            text: "AuthService".to_string(),
            kind: MentionKind::Class,
            start: 30,
            end: 41,
        };
        assert!(a.duplicates(&b));
        assert!(!a.duplicates(&c));
    }

    #[test]
    fn test_mention_kind_entity_types() {
        assert!(
            MentionKind::Function
                .entity_types()
                .contains(&EntityType::Method)
        );
        assert!(MentionKind::File.entity_types().contains(&EntityType::File));
    }

    #[test]
    fn test_filters_is_empty() {
        assert!(QueryFilters::default().is_empty());
        let filters = QueryFilters {
            limit: Some(5),
            ..Default::default()
        };
        assert!(!filters.is_empty());
    }
}
