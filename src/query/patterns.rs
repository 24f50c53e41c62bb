//! Static pattern data for query understanding.
//!
//! Intent signals, stop words, the synonym table, filter syntax, and the
//! trivial-query patterns used by the retrieval gate.

// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::models::QueryIntent;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// An intent signal pattern with its family and confidence.
#[derive(Debug)]
pub struct IntentSignal {
    /// The regex pattern to match.
    pub pattern: Regex,
    /// The intent family this pattern indicates.
    pub intent: QueryIntent,
    /// Confidence when this pattern fires.
    pub confidence: f32,
    /// Human-readable description of the signal.
    #[allow(dead_code)]
    pub description: &'static str,
}

/// Static intent signal patterns grouped by family.
///
/// Anchored variants (`^`) score higher than mid-sentence matches.
pub static INTENT_SIGNALS: Lazy<Vec<IntentSignal>> = Lazy::new(|| {
    vec![
        // Debug family
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(debug|troubleshoot)\b").expect("static regex: debug"),
            intent: QueryIntent::Debug,
            confidence: 0.9,
            description: "debug/troubleshoot",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\bfix\b.*\b(bug|error|issue|crash|test)\b")
                .expect("static regex: fix error"),
            intent: QueryIntent::Debug,
            confidence: 0.85,
            description: "fix ... error",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\bwhy\b.*\b(error|fail|failing|failed|broken|crash|wrong)\b")
                .expect("static regex: why error"),
            intent: QueryIntent::Debug,
            confidence: 0.9,
            description: "why ... error/failing",
        },
        // How family
        IntentSignal {
            pattern: Regex::new(r"(?i)^how\s+(do|does|can|should|would|to)\b")
                .expect("static regex: how do"),
            intent: QueryIntent::How,
            confidence: 0.9,
            description: "how do/does/to (anchored)",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\bhow\s+(do|does|can|to)\b").expect("static regex: how"),
            intent: QueryIntent::How,
            confidence: 0.7,
            description: "how do/does/to",
        },
        // Why family
        IntentSignal {
            pattern: Regex::new(r"(?i)^why\s+(is|are|does|do|did|was|were)\b")
                .expect("static regex: why is"),
            intent: QueryIntent::Why,
            confidence: 0.85,
            description: "why is/does (anchored)",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\bwhy\b").expect("static regex: why"),
            intent: QueryIntent::Why,
            confidence: 0.6,
            description: "why",
        },
        // Compare family
        IntentSignal {
            pattern: Regex::new(r"(?i)\bdifference\s+between\b")
                .expect("static regex: difference between"),
            intent: QueryIntent::Compare,
            confidence: 0.9,
            description: "difference between",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(compare|vs\.?|versus)\b").expect("static regex: compare"),
            intent: QueryIntent::Compare,
            confidence: 0.8,
            description: "compare/vs/versus",
        },
        // Implement family
        IntentSignal {
            pattern: Regex::new(r"(?i)^(implement|add|create|build|write)\b")
                .expect("static regex: implement"),
            intent: QueryIntent::Implement,
            confidence: 0.85,
            description: "implement/add/create (anchored)",
        },
        // Refactor family
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(refactor|clean\s+up|restructure|simplify)\b")
                .expect("static regex: refactor"),
            intent: QueryIntent::Refactor,
            confidence: 0.85,
            description: "refactor/clean up",
        },
        // Find family
        IntentSignal {
            pattern: Regex::new(r"(?i)^(find|locate|search\s+for|show\s+me)\b")
                .expect("static regex: find"),
            intent: QueryIntent::Find,
            confidence: 0.9,
            description: "find/locate (anchored)",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\bwhere\s+(is|are|does|can\s+i\s+find)\b")
                .expect("static regex: where is"),
            intent: QueryIntent::Find,
            confidence: 0.85,
            description: "where is/are",
        },
        // List family
        IntentSignal {
            pattern: Regex::new(r"(?i)^(list|enumerate|show)\s+(all|every|the)\b")
                .expect("static regex: list all"),
            intent: QueryIntent::List,
            confidence: 0.9,
            description: "list/show all (anchored)",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\ball\s+(the\s+)?(functions|classes|files|tests|usages)\b")
                .expect("static regex: all functions"),
            intent: QueryIntent::List,
            confidence: 0.75,
            description: "all functions/classes/files",
        },
        // Explain family
        IntentSignal {
            pattern: Regex::new(r"(?i)^(explain|describe)\b").expect("static regex: explain"),
            intent: QueryIntent::Explain,
            confidence: 0.9,
            description: "explain/describe (anchored)",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\bwhat\s+(is|are|does|do)\b").expect("static regex: what is"),
            intent: QueryIntent::Explain,
            confidence: 0.7,
            description: "what is/does",
        },
    ]
});

/// Common English stop words excluded from keyword extraction.
pub static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was",
        "one", "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now",
        "old", "see", "two", "way", "who", "did", "its", "let", "put", "say", "she", "too",
        "use", "that", "with", "have", "this", "will", "your", "from", "they", "know", "want",
        "been", "good", "much", "some", "time", "very", "when", "come", "here", "just", "like",
        "long", "make", "many", "more", "only", "over", "such", "take", "than", "them", "well",
        "were", "what", "where", "which", "while", "about", "after", "again", "also", "any",
        "because", "before", "being", "between", "both", "does", "doing", "down", "during",
        "each", "few", "further", "into", "itself", "most", "other", "should", "since", "then",
        "there", "these", "those", "through", "under", "until", "why", "would", "could", "mine",
    ]
    .into_iter()
    .collect()
});

/// Synonym groups; a keyword in any group expands to the other members.
pub static SYNONYM_GROUPS: &[&[&str]] = &[
    &["auth", "authentication", "login", "credential"],
    &["error", "exception", "bug", "issue"],
    &["config", "configuration", "settings", "options"],
    &["database", "db", "storage", "persistence"],
    &["test", "testing", "spec", "unittest"],
    &["delete", "remove", "drop"],
    &["create", "add", "insert"],
    &["fetch", "get", "retrieve", "load"],
    &["function", "method", "procedure"],
    &["class", "type", "struct"],
    &["dependency", "import", "require"],
    &["cache", "caching", "memoize"],
    &["async", "concurrent", "parallel"],
    &["token", "jwt", "session"],
];

/// Returns synonym expansions for a keyword (excluding the keyword itself).
#[must_use]
pub fn synonyms_for(keyword: &str) -> Vec<&'static str> {
    for group in SYNONYM_GROUPS {
        if group.contains(&keyword) {
            return group.iter().filter(|s| **s != keyword).copied().collect();
        }
    }
    Vec::new()
}

// ---------------------------------------------------------------------------
// Mention extraction
// ---------------------------------------------------------------------------

/// Backticked fragment.
pub static BACKTICK_FRAGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`]+)`").expect("static regex: backtick fragment"));

/// PascalCase identifier (two or more capitalized segments).
pub static PASCAL_CASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+\b").expect("static regex: pascal case")
});

/// Identifier immediately followed by an opening parenthesis.
pub static CALL_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("static regex: call token")
});

/// Path-like token: contains a separator or a known source extension.
pub static PATH_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b[\w.-]+(?:/[\w.-]+)+\b|\b[\w-]+\.(rs|ts|tsx|js|jsx|py|go|java|rb|c|h|cpp|hpp|md|toml|yaml|yml|json)\b",
    )
    .expect("static regex: path token")
});

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// `type:<name>` filter.
pub static TYPE_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btype:([a-z_]+)").expect("static regex: type filter"));

/// `limit:<n>` filter.
pub static LIMIT_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\blimit:(\d+)").expect("static regex: limit filter"));

/// `in <path>` filter.
pub static IN_PATH_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bin\s+((?:[\w.-]+/)+[\w.*-]*)").expect("static regex: in path filter")
});

/// `since:<YYYY-MM-DD>` filter.
pub static SINCE_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsince:(\d{4}-\d{2}-\d{2})").expect("static regex: since"));

/// `last <N> days` filter.
pub static LAST_DAYS_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\blast\s+(\d+)\s+days?\b").expect("static regex: last days"));

// ---------------------------------------------------------------------------
// Decomposition
// ---------------------------------------------------------------------------

/// Clause-joining conjunctions used to split compound queries.
pub static CONJUNCTION_SPLIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:\band\s+also\b|\bas\s+well\s+as\b|\band\b|;)\s+")
        .expect("static regex: conjunction split")
});

// ---------------------------------------------------------------------------
// Gate fast-path patterns
// ---------------------------------------------------------------------------

/// File-extension mention anywhere in the query.
pub static FILE_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\w+\.(rs|ts|tsx|js|jsx|py|go|java|rb|cpp|hpp|md|toml|yaml|yml|json)\b")
        .expect("static regex: file extension")
});

/// Lookup-style intent words.
pub static LOOKUP_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(find|locate|show|list|search)\b").expect("static regex: lookup words")
});

/// Troubleshooting phrasing.
pub static TROUBLESHOOT_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(debug|fix)\b|\bwhy\b.*\b(error|fail|failing|failed|broken|crash)")
        .expect("static regex: troubleshoot phrase")
});

/// Greetings and pleasantries.
pub static GREETING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(hi|hello|hey|howdy|thanks|thank\s+you|good\s+(morning|evening|afternoon))\s*[.!?]*\s*$")
        .expect("static regex: greeting")
});

/// Bare confirmations.
pub static CONFIRMATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(yes|no|ok|okay|sure|yep|nope|got\s+it|sounds\s+good)\s*[.!?]*\s*$")
        .expect("static regex: confirmation")
});

/// Bare arithmetic.
pub static ARITHMETIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[\d\s+\-*/%().=^]+\s*\??\s*$").expect("static regex: arithmetic")
});

/// Generic language-concept questions with no repository anchor.
pub static LANGUAGE_CONCEPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*what\s+is\s+(a|an|the)?\s*(closure|monad|trait|generic|pointer|recursion|borrow\s+checker|garbage\s+collect\w*|mutex|thread|promise|coroutine)s?\b[^`]*$",
    )
    .expect("static regex: language concept")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_signals_compile_and_match() {
        assert!(
            INTENT_SIGNALS
                .iter()
                .any(|s| s.intent == QueryIntent::Debug && s.pattern.is_match("debug this"))
        );
        assert!(
            INTENT_SIGNALS
                .iter()
                .any(|s| s.pattern.is_match("why is the test failing"))
        );
    }

    #[test]
    fn test_synonyms_for() {
        let expansions = synonyms_for("auth");
        assert!(expansions.contains(&"authentication"));
        assert!(!expansions.contains(&"auth"));
        assert!(synonyms_for("xylophone").is_empty());
    }

    #[test]
    fn test_mention_patterns() {
        assert!(PASCAL_CASE.is_match("the AuthService handles tokens"));
        assert!(!PASCAL_CASE.is_match("the auth service"));
        assert!(CALL_TOKEN.is_match("call parse_query() here"));
        assert!(PATH_TOKEN.is_match("look at src/auth/service.rs"));
        assert!(PATH_TOKEN.is_match("open main.py"));
    }

    #[test]
    fn test_filter_patterns() {
        assert!(TYPE_FILTER.is_match("type:function"));
        assert_eq!(
            LIMIT_FILTER.captures("limit:25").unwrap()[1].to_string(),
            "25"
        );
        assert!(IN_PATH_FILTER.is_match("tokens in src/auth"));
        assert!(SINCE_FILTER.is_match("since:2024-01-15"));
        assert!(LAST_DAYS_FILTER.is_match("last 7 days"));
    }

    #[test]
    fn test_gate_patterns() {
        assert!(GREETING.is_match("hello"));
        assert!(GREETING.is_match("  Thanks! "));
        assert!(!GREETING.is_match("hello, where is the config?"));
        assert!(CONFIRMATION.is_match("ok"));
        assert!(ARITHMETIC.is_match("2 + 2"));
        assert!(ARITHMETIC.is_match("12 * (3 - 1) = ?"));
        assert!(!ARITHMETIC.is_match("add 2 numbers in the parser"));
        assert!(LANGUAGE_CONCEPT.is_match("what is a closure?"));
        assert!(!LANGUAGE_CONCEPT.is_match("what is a closure in `parser.rs`?"));
    }
}
