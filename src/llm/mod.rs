//! Text-completion client abstraction.
//!
//! The retrieval gate and HyDE expansion call a text-completion provider
//! through [`CompletionProvider`]. Providers MUST tolerate failure: every
//! call site degrades gracefully when a provider errors (the gate falls
//! back to its default decision; HyDE is skipped).
//!
//! # Implementations
//!
//! | Provider | Use Case |
//! |----------|----------|
//! | [`HttpCompletionClient`] | OpenAI-compatible chat endpoint |
//! | [`StaticCompletion`] | Tests and offline operation |

mod http;

pub use http::{CompletionHttpConfig, HttpCompletionClient};

use crate::{Error, Result};

/// Trait for text-completion providers.
pub trait CompletionProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Canned completion provider for tests and offline operation.
///
/// Returns the configured text, or a provider error when constructed
/// with [`StaticCompletion::failing`].
pub struct StaticCompletion {
    response: Option<String>,
}

impl StaticCompletion {
    /// Creates a provider that always returns `response`.
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
        }
    }

    /// Creates a provider that always fails.
    #[must_use]
    pub const fn failing() -> Self {
        Self { response: None }
    }
}

impl CompletionProvider for StaticCompletion {
    fn name(&self) -> &'static str {
        "static"
    }

    fn complete(&self, _prompt: &str) -> Result<String> {
        self.response.clone().ok_or_else(|| Error::External {
            provider: "static".to_string(),
            cause: "configured to fail".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_completion() {
        let provider = StaticCompletion::new("hello");
        assert_eq!(provider.complete("anything").unwrap(), "hello");
    }

    #[test]
    fn test_static_failing() {
        let provider = StaticCompletion::failing();
        assert!(provider.complete("anything").is_err());
    }
}
