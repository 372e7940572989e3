//! Online learning from user feedback
//!
//! - `engine`: feedback recording, weight updates, weight resolution
//! - `metrics`: precision, recall, F1 and accuracy over feedback

mod engine;
mod metrics;

pub use engine::{FeedbackOutcome, LearningEngine, LearningSummary, optimal_weights};
pub use metrics::{AccuracyMetrics, predicted_improvement};
