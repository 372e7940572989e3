//! Domain model for relationship prediction
//!
//! - **Entity**: read-only view of a story graph node
//! - **FeatureVector**: normalized pair signals
//! - **RelationshipSuggestion**: a proposed relationship and its evidence
//! - **SuggestionFeedback**: an append-only user decision
//! - **LearningWeight**: a learned per-feature weight
//!
//! Storage is abstracted behind [`GraphStore`] and [`SuggestionStore`].

mod entity;
mod feature;
mod feedback;
mod repository;
mod suggestion;
mod weight;

pub use entity::{ContentFragment, Entity, EntityType, GraphSummary, TimelineEvent};
pub use feature::{FeatureType, FeatureVector, WeightTable, default_weights};
pub use feedback::{FeedbackAction, FeedbackDetails, SuggestionFeedback};
pub use repository::{GraphStore, SuggestionStore};
pub use suggestion::{
    EvidenceItem, GenerationMethod, RelationshipKind, RelationshipSuggestion, SuggestionFeature,
    SuggestionStatus, unordered_pair,
};
pub use weight::LearningWeight;
