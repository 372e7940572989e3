//! Graph read model
//!
//! Entities, content fragments and timeline events are owned by the graph
//! store. The prediction core only reads them.

use serde::{Deserialize, Serialize};

/// A node in a story graph (character, location, faction, event, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier for the entity
    pub id: String,
    /// Graph (story) the entity belongs to
    pub graph_id: String,
    /// Kind of entity
    pub entity_type: EntityType,
    /// Display name, also used for textual mention matching
    pub name: String,
    /// Editorial importance (0 to 100), if the author set one
    pub importance: Option<f64>,
}

impl Entity {
    /// Create a new entity
    pub fn new(
        id: impl Into<String>,
        graph_id: impl Into<String>,
        name: impl Into<String>,
        entity_type: EntityType,
    ) -> Self {
        Self {
            id: id.into(),
            graph_id: graph_id.into(),
            entity_type,
            name: name.into(),
            importance: None,
        }
    }

    /// Set the importance score (clamped to 0-100)
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance.clamp(0.0, 100.0));
        self
    }

    /// Lowercased name used for mention matching
    pub fn canonical_name(&self) -> String {
        self.name.trim().to_lowercase()
    }
}

/// Types of story entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Character,
    Location,
    Faction,
    Event,
    Item,
    Concept,
}

impl EntityType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Location => "location",
            Self::Faction => "faction",
            Self::Event => "event",
            Self::Item => "item",
            Self::Concept => "concept",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "character" | "person" => Some(Self::Character),
            "location" | "place" => Some(Self::Location),
            "faction" | "organization" | "organisation" => Some(Self::Faction),
            "event" => Some(Self::Event),
            "item" | "artifact" | "artefact" => Some(Self::Item),
            "concept" => Some(Self::Concept),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A piece of story text linked to the entities it features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFragment {
    pub id: String,
    pub text: String,
}

/// A point on the story timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    /// In-story day ordinal; only differences matter
    pub story_day: i64,
    pub title: String,
}

/// Summary of a graph known to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub id: String,
    pub name: String,
    pub entity_count: u64,
}
