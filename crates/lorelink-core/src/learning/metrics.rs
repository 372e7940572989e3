//! Accuracy metrics over recorded feedback

use serde::{Deserialize, Serialize};

use crate::domain::SuggestionFeedback;

/// Confusion counts and derived scores, as percentages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
    /// Feedback rows that confirmed or denied a relationship
    pub actioned: u64,
}

impl AccuracyMetrics {
    /// Classify feedback against the high-confidence cutoff
    ///
    /// A high-confidence suggestion is a positive prediction. Dismissals carry
    /// no verdict and are ignored.
    pub fn from_feedback(feedback: &[SuggestionFeedback], high_confidence_cutoff: f64) -> Self {
        let mut metrics = Self::default();

        for row in feedback {
            let Some(confirmed) = row.action.confirms_relationship() else {
                continue;
            };
            let predicted = row.confidence_at_decision >= high_confidence_cutoff;
            match (predicted, confirmed) {
                (true, true) => metrics.true_positives += 1,
                (true, false) => metrics.false_positives += 1,
                (false, false) => metrics.true_negatives += 1,
                (false, true) => metrics.false_negatives += 1,
            }
        }

        let tp = metrics.true_positives as f64;
        let fp = metrics.false_positives as f64;
        let tn = metrics.true_negatives as f64;
        let fn_ = metrics.false_negatives as f64;

        metrics.actioned = metrics.true_positives
            + metrics.false_positives
            + metrics.true_negatives
            + metrics.false_negatives;
        metrics.precision = percentage(tp, tp + fp);
        metrics.recall = percentage(tp, tp + fn_);
        metrics.accuracy = percentage(tp + tn, metrics.actioned as f64);
        metrics.f1_score = if metrics.precision + metrics.recall > 0.0 {
            2.0 * metrics.precision * metrics.recall / (metrics.precision + metrics.recall)
        } else {
            0.0
        };

        metrics
    }
}

fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        100.0 * numerator / denominator
    } else {
        0.0
    }
}

/// Rough estimate of how many accuracy points more feedback would buy
///
/// Advisory only. Returns a flat 20 until enough samples exist.
pub fn predicted_improvement(current_accuracy: f64, samples: u64, min_samples: u64) -> f64 {
    if samples < min_samples {
        return 20.0;
    }
    ((100.0 - current_accuracy) / (1.0 + samples as f64 / 20.0)).max(0.0)
}
