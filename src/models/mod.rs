//! Domain model types.
//!
//! Plain data types shared across the pipeline: entities, relationships,
//! parsed queries, search results, and feedback records. All I/O lives in
//! `storage`; these types carry no connection handles.

mod entity;
mod feedback;
mod query;
mod relationship;
mod search;

pub use entity::{ALIASES_KEY, Entity, EntityId, EntityInput, EntityType};
pub use feedback::{EntityFeedbackStats, FeedbackRecord, FeedbackSignal};
pub use query::{EntityMention, MentionKind, ParsedQuery, QueryFilters, QueryIntent, SubQuery};
pub use relationship::{
    Direction, Relationship, RelationshipFilter, RelationshipId, RelationshipInput,
    RelationshipType,
};
pub use search::{
    ContextFormat, ContextResult, ContextSource, ScoredEntity, SearchSource, sort_by_score,
};
