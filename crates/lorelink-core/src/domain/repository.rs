//! Repository traits for the prediction core
//!
//! The graph itself is owned elsewhere and is read through [`GraphStore`].
//! Suggestions, feature snapshots, feedback and learned weights are written
//! through [`SuggestionStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

use super::entity::{ContentFragment, Entity, GraphSummary, TimelineEvent};
use super::feedback::SuggestionFeedback;
use super::suggestion::{
    RelationshipKind, RelationshipSuggestion, SuggestionFeature, SuggestionStatus,
};
use super::weight::LearningWeight;

/// Read access to story graphs
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========== Graph Operations ==========

    /// List every graph
    async fn list_graphs(&self) -> Result<Vec<GraphSummary>>;

    /// Check whether a graph exists
    async fn graph_exists(&self, graph_id: &str) -> Result<bool>;

    // ========== Entity Operations ==========

    /// All entities of a graph, most important first
    async fn get_entities(&self, graph_id: &str) -> Result<Vec<Entity>>;

    /// Get one entity of a graph
    async fn get_entity(&self, graph_id: &str, entity_id: &str) -> Result<Option<Entity>>;

    /// Count the entities in a graph
    async fn count_entities(&self, graph_id: &str) -> Result<u64>;

    // ========== Edge Operations ==========

    /// Whether a confirmed relationship joins the two entities in either direction
    async fn edge_exists(&self, graph_id: &str, a: &str, b: &str) -> Result<bool>;

    /// Number of confirmed relationships touching an entity
    async fn degree(&self, graph_id: &str, entity_id: &str) -> Result<u64>;

    /// Entities reached from `entity_id` over edges whose type is in `edge_types`
    async fn neighbors_via(
        &self,
        graph_id: &str,
        entity_id: &str,
        edge_types: &[String],
    ) -> Result<Vec<String>>;

    // ========== Content Operations ==========

    /// Content fragments that feature an entity
    async fn content_fragments(&self, graph_id: &str, entity_id: &str)
    -> Result<Vec<ContentFragment>>;

    /// Timeline events an entity takes part in
    async fn timeline_events(&self, graph_id: &str, entity_id: &str) -> Result<Vec<TimelineEvent>>;

    /// Number of fragments in a graph whose text mentions both names
    async fn count_joint_mentions(&self, graph_id: &str, name_a: &str, name_b: &str)
    -> Result<u64>;
}

/// Persistence for suggestions, feedback and learned weights
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    // ========== Suggestion Operations ==========

    /// Insert a suggestion and its feature snapshot
    ///
    /// Returns `false` without writing when a suggestion with the same type
    /// already exists for the unordered pair.
    async fn create_suggestion(
        &self,
        suggestion: &RelationshipSuggestion,
        features: &[SuggestionFeature],
    ) -> Result<bool>;

    /// Get a suggestion by ID
    async fn get_suggestion(&self, id: &str) -> Result<Option<RelationshipSuggestion>>;

    /// Every suggestion for an unordered pair
    async fn find_by_pair(
        &self,
        graph_id: &str,
        a: &str,
        b: &str,
    ) -> Result<Vec<RelationshipSuggestion>>;

    /// List suggestions by priority, highest first
    async fn list_suggestions(
        &self,
        graph_id: &str,
        status: Option<SuggestionStatus>,
        limit: usize,
    ) -> Result<Vec<RelationshipSuggestion>>;

    /// Count pending suggestions in a graph
    async fn count_pending(&self, graph_id: &str) -> Result<u64>;

    /// Feature snapshot taken when a suggestion was generated
    async fn get_suggestion_features(&self, suggestion_id: &str) -> Result<Vec<SuggestionFeature>>;

    /// Remove every suggestion, snapshot and feedback row of a graph
    async fn delete_graph_suggestions(&self, graph_id: &str) -> Result<u64>;

    // ========== Feedback Operations ==========

    /// Persist a decided suggestion and its feedback row as one unit
    ///
    /// Either both writes land or neither does.
    async fn record_decision(
        &self,
        suggestion: &RelationshipSuggestion,
        feedback: &SuggestionFeedback,
    ) -> Result<()>;

    /// Feedback for a graph, oldest first
    async fn list_feedback(&self, graph_id: &str) -> Result<Vec<SuggestionFeedback>>;

    /// Feedback rows created after `since` (all rows when `None`)
    async fn count_feedback_since(
        &self,
        graph_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64>;

    // ========== Weight Operations ==========

    /// Weights of one table (graph-wide when `relationship_type` is `None`)
    async fn get_weights(
        &self,
        graph_id: &str,
        relationship_type: Option<RelationshipKind>,
    ) -> Result<Vec<LearningWeight>>;

    /// Every weight row for a graph, across all tables
    async fn list_weights(&self, graph_id: &str) -> Result<Vec<LearningWeight>>;

    /// Insert or update weights
    async fn save_weights(&self, weights: &[LearningWeight]) -> Result<()>;

    /// Delete all learned weights for a graph
    async fn delete_weights(&self, graph_id: &str) -> Result<u64>;
}
