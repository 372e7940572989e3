//! Lorelink Core Library
//!
//! Relationship suggestion for story knowledge graphs:
//! - Feature extraction over entity pairs (content, timeline, attributes, structure)
//! - Confidence scoring and relationship typing (rule cascade plus optional classifier)
//! - Learning from accept/reject/modify/dismiss feedback
//! - Batch scheduling with progress, rate limits and periodic refresh
//! - Storage (SQLite, in-memory) and ephemeral progress cache
//! - LLM integration (OpenRouter API) for ambiguous pairs

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod learning;
pub mod llm;
pub mod prediction;
pub mod scheduler;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{EphemeralStore, InMemoryEphemeralStore};
    pub use crate::config::Config;
    pub use crate::domain::{
        Entity, EntityType, FeatureType, FeatureVector, FeedbackAction, GraphStore,
        RelationshipKind, RelationshipSuggestion, SuggestionStatus, SuggestionStore,
    };
    pub use crate::error::{Error, Result};
    pub use crate::features::FeatureExtractor;
    pub use crate::learning::LearningEngine;
    pub use crate::prediction::RelationshipPredictor;
    pub use crate::scheduler::{BatchScheduler, JobStatus, ProgressRecord};
}

#[cfg(test)]
mod error_tests;
