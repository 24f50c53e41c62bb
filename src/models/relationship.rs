//! Relationship types for the repository knowledge graph.
//!
//! Relationships are typed, weighted, directed edges between entities.
//! `(source, target, type)` is unique per project; re-indexing uses upsert
//! semantics so edge IDs stay stable.

use super::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier for a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipId(String);

impl RelationshipId {
    /// Creates a relationship ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique relationship ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("rel_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RelationshipId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Type of relationship between entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Structural containment (file contains function, class contains method).
    Contains,
    /// Caller → callee.
    Calls,
    /// File imports file or module.
    Imports,
    /// Subclass → superclass.
    Extends,
    /// Type → implemented interface.
    Implements,
    /// Document or session mentions an entity.
    Mentions,
    /// General association.
    RelatesTo,
    /// Build or runtime dependency.
    DependsOn,
    /// Symbol → defining file.
    DefinedIn,
    /// Consumer → consumed entity.
    Uses,
    /// Cross-reference between documents.
    References,
    /// Document documents a code entity.
    Documents,
    /// Config file configures a component.
    Configures,
    /// Test → tested entity.
    Tests,
}

impl RelationshipType {
    /// Returns all relationship type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Contains,
            Self::Calls,
            Self::Imports,
            Self::Extends,
            Self::Implements,
            Self::Mentions,
            Self::RelatesTo,
            Self::DependsOn,
            Self::DefinedIn,
            Self::Uses,
            Self::References,
            Self::Documents,
            Self::Configures,
            Self::Tests,
        ]
    }

    /// Returns the relationship type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::Mentions => "mentions",
            Self::RelatesTo => "relates_to",
            Self::DependsOn => "depends_on",
            Self::DefinedIn => "defined_in",
            Self::Uses => "uses",
            Self::References => "references",
            Self::Documents => "documents",
            Self::Configures => "configures",
            Self::Tests => "tests",
        }
    }

    /// Parses a relationship type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "contains" => Some(Self::Contains),
            "calls" | "invokes" => Some(Self::Calls),
            "imports" => Some(Self::Imports),
            "extends" | "inherits" => Some(Self::Extends),
            "implements" | "realizes" => Some(Self::Implements),
            "mentions" => Some(Self::Mentions),
            "relates_to" | "relatesto" | "related" => Some(Self::RelatesTo),
            "depends_on" | "dependson" | "requires" => Some(Self::DependsOn),
            "defined_in" | "definedin" => Some(Self::DefinedIn),
            "uses" => Some(Self::Uses),
            "references" | "refs" => Some(Self::References),
            "documents" => Some(Self::Documents),
            "configures" => Some(Self::Configures),
            "tests" => Some(Self::Tests),
            _ => None,
        }
    }

    /// Returns true for structural relationships followed by the context
    /// expander (ownership, imports, super-types).
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Contains | Self::Imports | Self::Implements | Self::Extends
        )
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown relationship type: {s}"))
    }
}

/// Direction selector for per-endpoint edge queries and traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges leaving the entity.
    Out,
    /// Edges arriving at the entity.
    In,
    /// Both directions.
    #[default]
    Both,
}

impl Direction {
    /// Returns the direction as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Out => "out",
            Self::In => "in",
            Self::Both => "both",
        }
    }
}

/// A typed, weighted, directed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier.
    pub id: RelationshipId,
    /// Source entity.
    pub source_id: EntityId,
    /// Target entity.
    pub target_id: EntityId,
    /// Edge type.
    pub relationship: RelationshipType,
    /// Non-negative weight, default 1.0.
    pub weight: f32,
    /// Free-form metadata.
    pub metadata: HashMap<String, serde_json::Value>,
    /// Creation time (Unix seconds).
    pub created_at: i64,
}

impl Relationship {
    /// Returns the endpoint opposite to `id`, or `None` if `id` is neither
    /// endpoint.
    #[must_use]
    pub fn other_endpoint(&self, id: &EntityId) -> Option<&EntityId> {
        if &self.source_id == id {
            Some(&self.target_id)
        } else if &self.target_id == id {
            Some(&self.source_id)
        } else {
            None
        }
    }

    /// Returns true if the edge is a self-loop.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }
}

/// Edge payload emitted by the relationship extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipInput {
    /// Source entity.
    pub source_id: EntityId,
    /// Target entity.
    pub target_id: EntityId,
    /// Edge type.
    pub relationship: RelationshipType,
    /// Weight; defaults to 1.0 when absent.
    pub weight: Option<f32>,
    /// Free-form metadata.
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl RelationshipInput {
    /// Creates an input with default weight and empty metadata.
    #[must_use]
    pub const fn new(
        source_id: EntityId,
        target_id: EntityId,
        relationship: RelationshipType,
    ) -> Self {
        Self {
            source_id,
            target_id,
            relationship,
            weight: None,
            metadata: None,
        }
    }

    /// Sets the weight.
    #[must_use]
    pub const fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Filter options for per-endpoint edge queries.
#[derive(Debug, Clone, Default)]
pub struct RelationshipFilter {
    /// Restrict to these edge types.
    pub types: Option<Vec<RelationshipType>>,
    /// Minimum edge weight (inclusive).
    pub min_weight: Option<f32>,
    /// Maximum number of edges returned.
    pub limit: Option<usize>,
}

impl RelationshipFilter {
    /// Creates an empty filter (matches all edges).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            types: None,
            min_weight: None,
            limit: None,
        }
    }

    /// Restricts to the given edge types.
    #[must_use]
    pub fn with_types(mut self, types: Vec<RelationshipType>) -> Self {
        self.types = Some(types);
        self
    }

    /// Sets the minimum weight.
    #[must_use]
    pub const fn with_min_weight(mut self, min_weight: f32) -> Self {
        self.min_weight = Some(min_weight);
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
