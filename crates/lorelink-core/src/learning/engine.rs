//! Feedback-driven weight learning
//!
//! Feedback rows form an append-only log. Each weight update folds the rows
//! written since the previous update into the stored weights, so calling
//! [`LearningEngine::update_weights`] twice in a row never counts a row
//! twice, and deleting the weights replays the whole log on the next update.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::EphemeralStore;
use crate::config::LearningConfig;
use crate::domain::{
    FeatureType, FeedbackAction, FeedbackDetails, LearningWeight, RelationshipKind,
    SuggestionFeedback, SuggestionStatus, SuggestionStore, WeightTable, default_weights,
};
use crate::error::{Error, Result};

use super::metrics::{AccuracyMetrics, predicted_improvement};

/// What recording a piece of feedback did
#[derive(Debug, Clone)]
pub struct FeedbackOutcome {
    pub feedback: SuggestionFeedback,
    /// Whether the recording triggered a weight update
    pub weights_updated: bool,
}

/// Snapshot of what the engine has learned for a graph
#[derive(Debug, Clone, Serialize)]
pub struct LearningSummary {
    pub graph_id: String,
    pub weights: WeightTable,
    pub per_type: BTreeMap<RelationshipKind, WeightTable>,
    pub metrics: AccuracyMetrics,
    pub feedback_count: u64,
    pub predicted_improvement: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Resolve the weights to score a suggestion of `kind` with
///
/// Per-type weights win over graph-wide ones, which win over defaults. Every
/// feature always has a weight.
pub async fn optimal_weights(
    store: &dyn SuggestionStore,
    graph_id: &str,
    kind: Option<RelationshipKind>,
) -> Result<WeightTable> {
    let mut weights = default_weights();
    for row in store.get_weights(graph_id, None).await? {
        weights.insert(row.feature, row.weight);
    }
    if kind.is_some() {
        for row in store.get_weights(graph_id, kind).await? {
            weights.insert(row.feature, row.weight);
        }
    }
    Ok(weights)
}

fn cooldown_key(graph_id: &str) -> String {
    format!("learning:cooldown:{}", graph_id)
}

/// One feedback row reduced to what the weight update needs
#[derive(Clone)]
struct Signal<'a> {
    correct: bool,
    error: f64,
    feedback: &'a SuggestionFeedback,
}

/// Learns feature weights from user feedback
pub struct LearningEngine {
    store: Arc<dyn SuggestionStore>,
    cache: Arc<dyn EphemeralStore>,
    config: LearningConfig,
}

impl LearningEngine {
    pub fn new(
        store: Arc<dyn SuggestionStore>,
        cache: Arc<dyn EphemeralStore>,
        config: LearningConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Record a user decision on a pending suggestion
    ///
    /// Applies the decision to the suggestion, appends a feedback row with the
    /// feature snapshot taken at generation time, and then tries an automatic
    /// weight update. A failing automatic update is logged, not returned.
    pub async fn record_feedback(
        &self,
        suggestion_id: &str,
        action: FeedbackAction,
        user_id: &str,
        details: FeedbackDetails,
    ) -> Result<FeedbackOutcome> {
        let mut suggestion = self
            .store
            .get_suggestion(suggestion_id)
            .await?
            .ok_or_else(|| Error::SuggestionNotFound(suggestion_id.to_string()))?;

        if suggestion.status != SuggestionStatus::Pending {
            return Err(Error::InvalidTransition {
                id: suggestion.id.clone(),
                status: suggestion.status.to_string(),
            });
        }

        let snapshot = self.store.get_suggestion_features(&suggestion.id).await?;

        let mut feedback = SuggestionFeedback::new(
            &suggestion.id,
            &suggestion.graph_id,
            user_id,
            action,
            suggestion.suggested_type,
        );
        feedback.confidence_at_decision = suggestion.confidence;
        feedback.feature_snapshot = snapshot;
        feedback.time_to_decision_secs = (feedback.created_at - suggestion.created_at)
            .num_seconds()
            .max(0);
        feedback.details = FeedbackDetails {
            corrected_strength: details.corrected_strength.map(|s| s.min(100)),
            ..details
        };

        suggestion.status = action.resulting_status();
        if action == FeedbackAction::Modify {
            if let Some(kind) = feedback.details.corrected_type {
                suggestion.suggested_type = kind;
            }
            if let Some(strength) = feedback.details.corrected_strength {
                suggestion.strength = strength;
            }
        }
        suggestion.updated_at = feedback.created_at;

        self.store.record_decision(&suggestion, &feedback).await?;

        info!(
            graph_id = %suggestion.graph_id,
            suggestion_id = %suggestion.id,
            action = %action,
            "Recorded feedback"
        );

        let weights_updated = match self.maybe_update_weights(&suggestion.graph_id).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(graph_id = %suggestion.graph_id, error = %e, "Automatic weight update failed");
                false
            }
        };

        Ok(FeedbackOutcome {
            feedback,
            weights_updated,
        })
    }

    /// Run a weight update if the cooldown has passed and enough new
    /// feedback has arrived
    async fn maybe_update_weights(&self, graph_id: &str) -> Result<bool> {
        let key = cooldown_key(graph_id);
        if self.cache.get(&key).await?.is_some() {
            debug!(graph_id = %graph_id, "Weight update cooling down");
            return Ok(false);
        }

        let since = self.last_update(graph_id).await?;
        let fresh = self.store.count_feedback_since(graph_id, since).await?;
        if fresh < self.config.min_samples {
            debug!(
                graph_id = %graph_id,
                fresh,
                needed = self.config.min_samples,
                "Not enough new feedback for a weight update"
            );
            return Ok(false);
        }

        let marker = Utc::now().to_rfc3339();
        if !self
            .cache
            .compare_and_swap(&key, None, &marker, self.config.cooldown())
            .await?
        {
            return Ok(false);
        }

        self.update_weights(graph_id).await
    }

    /// When the graph's weights last changed
    async fn last_update(&self, graph_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .list_weights(graph_id)
            .await?
            .into_iter()
            .map(|w| w.updated_at)
            .max())
    }

    /// Fold new decisive feedback into the graph-wide and per-type weights
    ///
    /// Returns `false` without touching anything when the graph has fewer than
    /// `min_samples` feedback rows, or when none of the new rows is decisive.
    pub async fn update_weights(&self, graph_id: &str) -> Result<bool> {
        let total = self.store.count_feedback_since(graph_id, None).await?;
        if total < self.config.min_samples {
            debug!(graph_id = %graph_id, total, "Too little feedback to learn from");
            return Ok(false);
        }

        let since = self.last_update(graph_id).await?;
        let feedback: Vec<SuggestionFeedback> = self
            .store
            .list_feedback(graph_id)
            .await?
            .into_iter()
            .filter(|f| since.is_none_or(|since| f.created_at > since))
            .collect();

        let signals: Vec<Signal<'_>> = feedback.iter().filter_map(|f| self.signal(f)).collect();
        if signals.is_empty() {
            debug!(graph_id = %graph_id, rows = feedback.len(), "No decisive feedback");
            return Ok(false);
        }

        let existing = self.store.list_weights(graph_id).await?;
        let mut updated = self.fold(graph_id, None, &signals, &existing);

        let mut by_kind: BTreeMap<RelationshipKind, Vec<Signal<'_>>> = BTreeMap::new();
        for signal in &signals {
            by_kind
                .entry(signal.feedback.suggested_type)
                .or_default()
                .push(signal.clone());
        }
        for (kind, group) in by_kind {
            updated.extend(self.fold(graph_id, Some(kind), &group, &existing));
        }

        self.store.save_weights(&updated).await?;

        info!(
            graph_id = %graph_id,
            samples = signals.len(),
            weights = updated.len(),
            "Updated learning weights"
        );
        Ok(true)
    }

    /// Decisive feedback: a confirmed or denied high-confidence suggestion
    fn signal<'a>(&self, feedback: &'a SuggestionFeedback) -> Option<Signal<'a>> {
        let correct = feedback.action.confirms_relationship()?;
        let value = feedback.action.learning_value();
        if value <= 0.0 || feedback.confidence_at_decision < self.config.high_confidence_cutoff {
            return None;
        }
        Some(Signal {
            correct,
            error: if correct { value } else { -value },
            feedback,
        })
    }

    /// Apply one batch of signals to one weight table
    fn fold(
        &self,
        graph_id: &str,
        kind: Option<RelationshipKind>,
        signals: &[Signal<'_>],
        existing: &[LearningWeight],
    ) -> Vec<LearningWeight> {
        let mut sums: HashMap<FeatureType, (f64, u64)> = HashMap::new();
        for signal in signals {
            for snapshot in &signal.feedback.feature_snapshot {
                let entry = sums.entry(snapshot.feature).or_insert((0.0, 0));
                entry.0 += signal.error * snapshot.value;
                entry.1 += 1;
            }
        }

        let correct = signals.iter().filter(|s| s.correct).count() as f64;
        let batch_accuracy = 100.0 * correct / signals.len() as f64;
        let now = Utc::now();

        let current = |feature: FeatureType, kind: Option<RelationshipKind>| {
            existing
                .iter()
                .find(|w| w.feature == feature && w.relationship_type == kind)
                .cloned()
        };

        let mut rows: Vec<LearningWeight> = sums
            .into_iter()
            .map(|(feature, (sum, count))| {
                let adjustment = sum / count as f64;
                // A per-type table starts from the graph-wide weight
                let mut weight = current(feature, kind)
                    .or_else(|| {
                        kind.and_then(|_| current(feature, None)).map(|global| LearningWeight {
                            relationship_type: kind,
                            accuracy_score: 0.0,
                            sample_count: 0,
                            ..global
                        })
                    })
                    .unwrap_or_else(|| LearningWeight::seeded(graph_id, feature, kind));

                weight.adjust(self.config.learning_rate * adjustment);

                let previous = weight.sample_count as f64;
                let added = signals.len() as f64;
                weight.accuracy_score =
                    (weight.accuracy_score * previous + batch_accuracy * added) / (previous + added);
                weight.sample_count += signals.len() as u64;
                weight.updated_at = now;
                weight
            })
            .collect();
        rows.sort_by_key(|w| w.feature);
        rows
    }

    /// Precision, recall, F1 and accuracy over all feedback of a graph
    pub async fn get_accuracy_metrics(&self, graph_id: &str) -> Result<AccuracyMetrics> {
        let feedback = self.store.list_feedback(graph_id).await?;
        Ok(AccuracyMetrics::from_feedback(
            &feedback,
            self.config.high_confidence_cutoff,
        ))
    }

    /// Advisory estimate of the accuracy gain more feedback would bring
    pub async fn predict_accuracy_improvement(&self, graph_id: &str) -> Result<f64> {
        let feedback = self.store.list_feedback(graph_id).await?;
        let metrics =
            AccuracyMetrics::from_feedback(&feedback, self.config.high_confidence_cutoff);
        Ok(predicted_improvement(
            metrics.accuracy,
            feedback.len() as u64,
            self.config.min_samples,
        ))
    }

    /// Forget every learned weight for a graph; feedback history is kept
    pub async fn reset_learning(&self, graph_id: &str) -> Result<u64> {
        let removed = self.store.delete_weights(graph_id).await?;
        self.cache.delete(&cooldown_key(graph_id)).await?;
        info!(graph_id = %graph_id, removed, "Reset learning weights");
        Ok(removed)
    }

    /// Weights to score a suggestion of `kind` with
    pub async fn get_optimal_weights(
        &self,
        graph_id: &str,
        kind: Option<RelationshipKind>,
    ) -> Result<WeightTable> {
        optimal_weights(self.store.as_ref(), graph_id, kind).await
    }

    pub async fn learning_summary(&self, graph_id: &str) -> Result<LearningSummary> {
        let rows = self.store.list_weights(graph_id).await?;
        let feedback = self.store.list_feedback(graph_id).await?;
        let metrics =
            AccuracyMetrics::from_feedback(&feedback, self.config.high_confidence_cutoff);

        let mut weights = default_weights();
        let mut per_type: BTreeMap<RelationshipKind, WeightTable> = BTreeMap::new();
        for row in &rows {
            match row.relationship_type {
                None => {
                    weights.insert(row.feature, row.weight);
                }
                Some(kind) => {
                    per_type.entry(kind).or_default().insert(row.feature, row.weight);
                }
            }
        }

        Ok(LearningSummary {
            graph_id: graph_id.to_string(),
            weights,
            per_type,
            predicted_improvement: predicted_improvement(
                metrics.accuracy,
                feedback.len() as u64,
                self.config.min_samples,
            ),
            metrics,
            feedback_count: feedback.len() as u64,
            last_updated: rows.iter().map(|w| w.updated_at).max(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryEphemeralStore;
    use crate::domain::{FeatureVector, RelationshipSuggestion, SuggestionFeature};
    use crate::storage::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        engine: LearningEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let engine = LearningEngine::new(
            store.clone(),
            Arc::new(InMemoryEphemeralStore::new()),
            LearningConfig::default(),
        );
        Fixture { store, engine }
    }

    /// Store a pending suggestion with a two-feature snapshot
    async fn suggestion(store: &InMemoryStore, n: usize, confidence: f64) -> String {
        let mut s = RelationshipSuggestion::new(
            "saga",
            format!("a{}", n),
            format!("b{}", n),
            RelationshipKind::Ally,
        );
        s.confidence = confidence;
        let features = FeatureVector::new()
            .with(FeatureType::CoOccurrence, 1.0)
            .with(FeatureType::SharedFaction, 0.5);
        let snapshot = SuggestionFeature::snapshot(&s.id, &features, &default_weights());
        assert!(store.create_suggestion(&s, &snapshot).await.unwrap());
        s.id
    }

    async fn accept(engine: &LearningEngine, id: &str) -> FeedbackOutcome {
        engine
            .record_feedback(id, FeedbackAction::Accept, "user", FeedbackDetails::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_feedback_moves_status_and_snapshots() {
        let f = fixture();
        let id = suggestion(&f.store, 0, 80.0).await;

        let outcome = accept(&f.engine, &id).await;
        assert!(!outcome.weights_updated);
        assert_eq!(outcome.feedback.feature_snapshot.len(), 2);
        assert_eq!(outcome.feedback.confidence_at_decision, 80.0);

        let stored = f.store.get_suggestion(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, SuggestionStatus::Accepted);
        assert_eq!(f.store.list_feedback("saga").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_modify_clamps_out_of_range_strength() {
        let f = fixture();
        let id = suggestion(&f.store, 0, 80.0).await;
        let details = FeedbackDetails {
            corrected_type: Some(RelationshipKind::Rival),
            corrected_strength: Some(150),
            explanation: None,
        };

        let outcome = f
            .engine
            .record_feedback(&id, FeedbackAction::Modify, "user", details)
            .await
            .unwrap();
        assert_eq!(outcome.feedback.details.corrected_strength, Some(100));

        let stored = f.store.get_suggestion(&id).await.unwrap().unwrap();
        assert_eq!(stored.strength, 100);
        assert_eq!(stored.suggested_type, RelationshipKind::Rival);
        assert_eq!(stored.status, SuggestionStatus::Modified);
    }

    #[tokio::test]
    async fn test_feedback_on_decided_suggestion_rejected() {
        let f = fixture();
        let id = suggestion(&f.store, 0, 80.0).await;
        accept(&f.engine, &id).await;

        let err = f
            .engine
            .record_feedback(&id, FeedbackAction::Reject, "user", FeedbackDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(f.store.list_feedback("saga").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_suggestion() {
        let f = fixture();
        let err = f
            .engine
            .record_feedback("nope", FeedbackAction::Accept, "user", FeedbackDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SuggestionNotFound(_)));
    }

    #[tokio::test]
    async fn test_modify_applies_corrections() {
        let f = fixture();
        let id = suggestion(&f.store, 0, 80.0).await;
        let details = FeedbackDetails::default()
            .with_corrected_type(RelationshipKind::Rival)
            .with_corrected_strength(30)
            .with_explanation("they compete for the throne");

        f.engine
            .record_feedback(&id, FeedbackAction::Modify, "user", details)
            .await
            .unwrap();

        let stored = f.store.get_suggestion(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, SuggestionStatus::Modified);
        assert_eq!(stored.suggested_type, RelationshipKind::Rival);
        assert_eq!(stored.strength, 30);

        let feedback = f.store.list_feedback("saga").await.unwrap();
        assert_eq!(feedback[0].suggested_type, RelationshipKind::Ally);
    }

    #[tokio::test]
    async fn test_update_short_circuits_below_min_samples() {
        let f = fixture();
        for n in 0..4 {
            let id = suggestion(&f.store, n, 90.0).await;
            accept(&f.engine, &id).await;
        }
        assert!(!f.engine.update_weights("saga").await.unwrap());
        assert!(f.store.list_weights("saga").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_moves_weights_towards_accepted_features() {
        let f = fixture();
        for n in 0..5 {
            let id = suggestion(&f.store, n, 90.0).await;
            // the fifth accept triggers the update
            accept(&f.engine, &id).await;
        }

        let weights = f.engine.get_optimal_weights("saga", None).await.unwrap();
        let co = FeatureType::CoOccurrence;
        let faction = FeatureType::SharedFaction;
        assert!((weights[&co] - (co.default_weight() + 0.1 * 1.0)).abs() < 1e-9);
        assert!((weights[&faction] - (faction.default_weight() + 0.1 * 0.5)).abs() < 1e-9);
        // untouched features keep their defaults
        assert_eq!(
            weights[&FeatureType::NetworkCentrality],
            FeatureType::NetworkCentrality.default_weight()
        );

        let rows = f.store.get_weights("saga", Some(RelationshipKind::Ally)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|w| w.sample_count == 5 && w.accuracy_score == 100.0));
    }

    #[tokio::test]
    async fn test_rejections_lower_weights_and_stay_in_range() {
        let f = fixture();
        for round in 0..4 {
            for n in 0..5 {
                let id = suggestion(&f.store, round * 10 + n, 95.0).await;
                f.engine
                    .record_feedback(&id, FeedbackAction::Reject, "user", FeedbackDetails::default())
                    .await
                    .unwrap();
            }
            f.engine.update_weights("saga").await.unwrap();
        }

        let weights = f.engine.get_optimal_weights("saga", None).await.unwrap();
        let co = weights[&FeatureType::CoOccurrence];
        assert!(co < FeatureType::CoOccurrence.default_weight());
        assert!(weights.values().all(|w| (0.0..=1.0).contains(w)));
    }

    #[tokio::test]
    async fn test_low_confidence_and_dismissals_are_not_decisive() {
        let f = fixture();
        for n in 0..3 {
            let id = suggestion(&f.store, n, 40.0).await;
            accept(&f.engine, &id).await;
        }
        for n in 3..5 {
            let id = suggestion(&f.store, n, 99.0).await;
            f.engine
                .record_feedback(&id, FeedbackAction::Dismiss, "user", FeedbackDetails::default())
                .await
                .unwrap();
        }

        assert!(!f.engine.update_weights("saga").await.unwrap());
        assert!(f.store.list_weights("saga").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_does_not_count_rows_twice() {
        let f = fixture();
        for n in 0..5 {
            let id = suggestion(&f.store, n, 90.0).await;
            accept(&f.engine, &id).await;
        }
        let before = f.engine.get_optimal_weights("saga", None).await.unwrap();
        assert!(!f.engine.update_weights("saga").await.unwrap());
        let after = f.engine.get_optimal_weights("saga", None).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_reset_learning_restores_defaults_and_keeps_feedback() {
        let f = fixture();
        for n in 0..5 {
            let id = suggestion(&f.store, n, 90.0).await;
            accept(&f.engine, &id).await;
        }
        assert!(!f.store.list_weights("saga").await.unwrap().is_empty());

        let removed = f.engine.reset_learning("saga").await.unwrap();
        assert!(removed > 0);
        assert!(f.store.list_weights("saga").await.unwrap().is_empty());
        assert_eq!(f.store.list_feedback("saga").await.unwrap().len(), 5);

        let weights = f
            .engine
            .get_optimal_weights("saga", Some(RelationshipKind::Ally))
            .await
            .unwrap();
        assert_eq!(weights, default_weights());
    }

    #[tokio::test]
    async fn test_per_type_weights_override_global() {
        let f = fixture();
        let mut global = LearningWeight::seeded("saga", FeatureType::CoOccurrence, None);
        global.weight = 0.2;
        let mut rival =
            LearningWeight::seeded("saga", FeatureType::CoOccurrence, Some(RelationshipKind::Rival));
        rival.weight = 0.9;
        f.store.save_weights(&[global, rival]).await.unwrap();

        let ally = f
            .engine
            .get_optimal_weights("saga", Some(RelationshipKind::Ally))
            .await
            .unwrap();
        assert_eq!(ally[&FeatureType::CoOccurrence], 0.2);

        let rival = f
            .engine
            .get_optimal_weights("saga", Some(RelationshipKind::Rival))
            .await
            .unwrap();
        assert_eq!(rival[&FeatureType::CoOccurrence], 0.9);
    }

    #[tokio::test]
    async fn test_metrics_and_summary() {
        let f = fixture();
        let metrics = f.engine.get_accuracy_metrics("saga").await.unwrap();
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(f.engine.predict_accuracy_improvement("saga").await.unwrap(), 20.0);

        for n in 0..2 {
            let id = suggestion(&f.store, n, 90.0).await;
            accept(&f.engine, &id).await;
        }
        let id = suggestion(&f.store, 9, 90.0).await;
        f.engine
            .record_feedback(&id, FeedbackAction::Reject, "user", FeedbackDetails::default())
            .await
            .unwrap();

        let summary = f.engine.learning_summary("saga").await.unwrap();
        assert_eq!(summary.feedback_count, 3);
        assert_eq!(summary.metrics.true_positives, 2);
        assert_eq!(summary.metrics.false_positives, 1);
        assert_eq!(summary.weights, default_weights());
        assert!(summary.per_type.is_empty());
        assert!(summary.last_updated.is_none());
    }
}
