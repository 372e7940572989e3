//! Confidence and typing model
//!
//! - `scoring`: confidence, strength, priority, method, evidence and reasoning
//! - `typing`: the ordered rule cascade and the optional [`TypeClassifier`]
//! - `predictor`: pair, entity and graph level prediction

mod predictor;
pub mod scoring;
mod typing;

pub use predictor::{Prediction, RelationshipPredictor, entity_pairs};
pub use typing::{RuleMatch, TypeClassifier, TypeDecision, TypeResolver, TypeRule};
