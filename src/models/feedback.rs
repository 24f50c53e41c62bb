//! Relevance-feedback types.
//!
//! Feedback records form an append-only log of per-query usage signals.
//! They are aggregated on demand into per-entity statistics which drive a
//! multiplicative score adjustment (see `context::feedback`).

use super::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Usage signal observed for an entity returned by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSignal {
    /// The entity appeared in the assistant's response.
    Used,
    /// The entity was returned but never referenced.
    Ignored,
    /// Explicit positive feedback from the client.
    ExplicitPositive,
    /// Explicit negative feedback from the client.
    ExplicitNegative,
}

impl FeedbackSignal {
    /// Returns the signal as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Used => "used",
            Self::Ignored => "ignored",
            Self::ExplicitPositive => "explicit_positive",
            Self::ExplicitNegative => "explicit_negative",
        }
    }

    /// Parses a signal from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "used" => Some(Self::Used),
            "ignored" => Some(Self::Ignored),
            "explicit_positive" => Some(Self::ExplicitPositive),
            "explicit_negative" => Some(Self::ExplicitNegative),
            _ => None,
        }
    }
}

impl fmt::Display for FeedbackSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the append-only feedback log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Row identifier.
    pub id: String,
    /// The query this signal belongs to.
    pub query_id: String,
    /// The entity the signal is about.
    pub entity_id: EntityId,
    /// The observed signal.
    pub signal: FeedbackSignal,
    /// When the signal was recorded (Unix seconds).
    pub created_at: i64,
}

/// Aggregated per-entity feedback statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntityFeedbackStats {
    /// Times the entity was returned (used + ignored).
    pub total_returns: u32,
    /// Times the entity was perceived as used.
    pub used_count: u32,
    /// Times the entity was returned but ignored.
    pub ignored_count: u32,
    /// Explicit positive signals.
    pub positive_count: u32,
    /// Explicit negative signals.
    pub negative_count: u32,
}

impl EntityFeedbackStats {
    /// Fraction of returns that were used; 0.5 with no return data.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn use_rate(&self) -> f32 {
        if self.total_returns == 0 {
            0.5
        } else {
            self.used_count as f32 / self.total_returns as f32
        }
    }

    /// Total signals of any kind.
    #[must_use]
    pub const fn total_signals(&self) -> u32 {
        self.used_count + self.ignored_count + self.positive_count + self.negative_count
    }
}
