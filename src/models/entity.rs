//! Entity types for the repository knowledge graph.
//!
//! Entities are the indexed units of meaning: code objects (functions,
//! classes, files), documentation, and extracted concepts. Each entity
//! carries identity, optional source text, an optional LLM summary, and
//! free-form metadata.
//!
//! # Entity Types
//!
//! | Type | Description | Examples |
//! |------|-------------|----------|
//! | `File` | Source or documentation file | `src/auth/service.rs` |
//! | `Module` | Namespace or module | `auth`, `storage::sqlite` |
//! | `Function` | Free function | `parse_query()` |
//! | `Class` | Class or struct | `AuthService` |
//! | `Interface` | Interface or trait | `TokenStore` |
//! | `Method` | Member function | `AuthService::refresh` |
//! | `Variable` | Constant or global | `MAX_RETRIES` |
//! | `Concept` | Extracted abstract idea | "token rotation" |
//! | `Document` | Markdown/docs page | `README.md` |
//! | `Requirement` | Tracked requirement | "REQ-12 session expiry" |
//! | `Decision` | Recorded design decision | "use SQLite for storage" |
//! | `Session` | Captured conversation | session transcript |
//! | `Message` | Single conversation message | one turn of a session |

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique entity ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("ent_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Type of entity in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Source or documentation file.
    File,
    /// Namespace or module.
    Module,
    /// Free function.
    Function,
    /// Class or struct.
    Class,
    /// Interface or trait.
    Interface,
    /// Member function.
    Method,
    /// Constant or global variable.
    Variable,
    /// Abstract idea extracted from docs or conversations.
    Concept,
    /// Documentation page.
    Document,
    /// Tracked requirement.
    Requirement,
    /// Recorded design decision.
    Decision,
    /// Captured conversation session.
    Session,
    /// Single conversation message.
    Message,
}

impl EntityType {
    /// Returns all entity type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::File,
            Self::Module,
            Self::Function,
            Self::Class,
            Self::Interface,
            Self::Method,
            Self::Variable,
            Self::Concept,
            Self::Document,
            Self::Requirement,
            Self::Decision,
            Self::Session,
            Self::Message,
        ]
    }

    /// Returns the entity type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Module => "module",
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Method => "method",
            Self::Variable => "variable",
            Self::Concept => "concept",
            Self::Document => "document",
            Self::Requirement => "requirement",
            Self::Decision => "decision",
            Self::Session => "session",
            Self::Message => "message",
        }
    }

    /// Parses an entity type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "file" => Some(Self::File),
            "module" | "namespace" | "package" => Some(Self::Module),
            "function" | "func" | "fn" => Some(Self::Function),
            "class" | "struct" => Some(Self::Class),
            "interface" | "trait" | "protocol" => Some(Self::Interface),
            "method" => Some(Self::Method),
            "variable" | "var" | "const" | "constant" => Some(Self::Variable),
            "concept" | "idea" | "pattern" | "technology" => Some(Self::Concept),
            "document" | "doc" | "documentation" => Some(Self::Document),
            "requirement" | "req" => Some(Self::Requirement),
            "decision" => Some(Self::Decision),
            "session" | "conversation" => Some(Self::Session),
            "message" => Some(Self::Message),
            _ => None,
        }
    }

    /// Returns true for types that represent code objects.
    ///
    /// Used by the context assembler to group results under *Relevant Code*.
    #[must_use]
    pub const fn is_code(&self) -> bool {
        matches!(
            self,
            Self::Function
                | Self::Class
                | Self::Method
                | Self::Interface
                | Self::Module
                | Self::Variable
                | Self::File
        )
    }

    /// Returns true for documentation-shaped types.
    #[must_use]
    pub const fn is_documentation(&self) -> bool {
        matches!(self, Self::Document | Self::Requirement)
    }

    /// Returns true for conversational types.
    #[must_use]
    pub const fn is_conversation(&self) -> bool {
        matches!(self, Self::Session | Self::Decision | Self::Message)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown entity type: {s}"))
    }
}

/// Metadata key under which aliases are stored.
pub const ALIASES_KEY: &str = "aliases";

/// An entity in the repository knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier, stable across re-indexing.
    pub id: EntityId,
    /// Type of entity.
    pub entity_type: EntityType,
    /// Display name.
    pub name: String,
    /// Stable hierarchical identifier used for exact lookup
    /// (e.g. `file::class::method`). Unique per type within a project.
    pub qualified_name: String,
    /// Source file path, when the entity maps to code.
    pub file_path: Option<String>,
    /// First line of the entity in its file (1-based).
    pub start_line: Option<u32>,
    /// Last line of the entity in its file (1-based).
    pub end_line: Option<u32>,
    /// Raw source or document text.
    pub content: Option<String>,
    /// LLM-generated prose summary.
    pub summary: Option<String>,
    /// Free-form metadata. The `aliases` key holds a JSON array of
    /// alternative names accumulated by entity merges.
    pub metadata: HashMap<String, serde_json::Value>,
    /// Creation time (Unix seconds), assigned by the entity store.
    pub created_at: i64,
    /// Last update time (Unix seconds).
    pub updated_at: i64,
}

impl Entity {
    /// Creates a new entity with a generated ID and zeroed timestamps.
    ///
    /// The entity store assigns real timestamps on insert.
    #[must_use]
    pub fn new(
        entity_type: EntityType,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::generate(),
            entity_type,
            name: name.into(),
            qualified_name: qualified_name.into(),
            file_path: None,
            start_line: None,
            end_line: None,
            content: None,
            summary: None,
            metadata: HashMap::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Sets a specific ID.
    #[must_use]
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    /// Sets the source location.
    #[must_use]
    pub fn with_location(mut self, file_path: impl Into<String>, start: u32, end: u32) -> Self {
        self.file_path = Some(file_path.into());
        self.start_line = Some(start);
        self.end_line = Some(end);
        self
    }

    /// Sets the file path without line information.
    #[must_use]
    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    /// Sets the raw content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the aliases stored in metadata, if any.
    #[must_use]
    pub fn aliases(&self) -> Vec<String> {
        self.metadata
            .get(ALIASES_KEY)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replaces the alias list in metadata.
    pub fn set_aliases(&mut self, aliases: Vec<String>) {
        self.metadata.insert(
            ALIASES_KEY.to_string(),
            serde_json::Value::Array(aliases.into_iter().map(serde_json::Value::String).collect()),
        );
    }

    /// Returns every name this entity is known by: its name, the final
    /// segment of its qualified name, and all aliases.
    #[must_use]
    pub fn known_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        if let Some(last) = self.qualified_name.rsplit("::").next()
            && !last.is_empty()
            && !names.iter().any(|n| n == last)
        {
            names.push(last.to_string());
        }
        for alias in self.aliases() {
            if !names.contains(&alias) {
                names.push(alias);
            }
        }
        names
    }

    /// Returns the text used for embedding and similarity comparison:
    /// content, falling back to summary, falling back to name.
    #[must_use]
    pub fn comparison_text(&self) -> &str {
        self.content
            .as_deref()
            .or(self.summary.as_deref())
            .unwrap_or(&self.name)
    }
}

/// Entity payload emitted by the indexing collaborators.
///
/// The entity store assigns timestamps; an absent `id` is generated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityInput {
    /// Optional stable ID. Generated when absent.
    pub id: Option<EntityId>,
    /// Entity type.
    pub entity_type: Option<EntityType>,
    /// Display name.
    pub name: String,
    /// Stable hierarchical identifier.
    pub qualified_name: String,
    /// Source file path.
    pub file_path: Option<String>,
    /// First line (1-based).
    pub start_line: Option<u32>,
    /// Last line (1-based).
    pub end_line: Option<u32>,
    /// Raw text.
    pub content: Option<String>,
    /// LLM summary.
    pub summary: Option<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EntityInput {
    /// Converts the input into an [`Entity`], generating an ID if needed.
    #[must_use]
    pub fn into_entity(self) -> Entity {
        Entity {
            id: self.id.unwrap_or_else(EntityId::generate),
            entity_type: self.entity_type.unwrap_or(EntityType::Concept),
            name: self.name,
            qualified_name: self.qualified_name,
            file_path: self.file_path,
            start_line: self.start_line,
            end_line: self.end_line,
            content: self.content,
            summary: self.summary,
            metadata: self.metadata,
            created_at: 0,
            updated_at: 0,
        }
    }
}
