//! Relationship predictor
//!
//! Turns an entity pair into a scored, typed and explained suggestion, and
//! drives that over a whole graph or around a single entity.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{FeatureConfig, PredictionConfig};
use crate::domain::{
    Entity, FeatureVector, GraphStore, RelationshipSuggestion, SuggestionFeature, SuggestionStatus,
    SuggestionStore,
};
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::learning::optimal_weights;

use super::scoring;
use super::typing::{TypeClassifier, TypeResolver, TypeRule};

/// A generated suggestion and the feature snapshot that produced it
#[derive(Debug, Clone)]
pub struct Prediction {
    pub suggestion: RelationshipSuggestion,
    pub features: FeatureVector,
    pub snapshot: Vec<SuggestionFeature>,
}

/// Every unordered index pair `(i, j)` with `i < j`
pub fn entity_pairs(count: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..count).flat_map(move |i| (i + 1..count).map(move |j| (i, j)))
}

/// Scores entity pairs and persists the suggestions worth showing
pub struct RelationshipPredictor {
    graph: Arc<dyn GraphStore>,
    suggestions: Arc<dyn SuggestionStore>,
    extractor: FeatureExtractor,
    resolver: TypeResolver,
    config: PredictionConfig,
}

impl RelationshipPredictor {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        suggestions: Arc<dyn SuggestionStore>,
        features: FeatureConfig,
        config: PredictionConfig,
    ) -> Self {
        Self {
            extractor: FeatureExtractor::new(graph.clone(), features),
            resolver: TypeResolver::from_config(&config),
            graph,
            suggestions,
            config,
        }
    }

    /// Consult a classifier for ambiguous pairs
    pub fn with_classifier(mut self, classifier: Arc<dyn TypeClassifier>) -> Self {
        self.resolver = self.resolver.with_classifier(classifier);
        self
    }

    /// Replace the typing cascade
    pub fn with_rules(mut self, rules: Vec<TypeRule>) -> Self {
        self.resolver = self.resolver.with_rules(rules);
        self
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Score one pair without persisting anything
    ///
    /// Returns `None` when the pair already has a suggestion or an edge, or
    /// when confidence stays below the configured minimum.
    pub async fn predict(&self, a: &Entity, b: &Entity, graph_id: &str) -> Result<Option<Prediction>> {
        if a.id == b.id {
            return Err(Error::InvalidPair(a.id.clone()));
        }

        if !self.suggestions.find_by_pair(graph_id, &a.id, &b.id).await?.is_empty() {
            debug!(graph_id = %graph_id, source = %a.id, target = %b.id, "Pair already has a suggestion");
            return Ok(None);
        }
        if self.graph.edge_exists(graph_id, &a.id, &b.id).await? {
            debug!(graph_id = %graph_id, source = %a.id, target = %b.id, "Pair already related");
            return Ok(None);
        }

        let features = self.extractor.extract(a, b, graph_id).await?;
        let decision = self.resolver.resolve(a, b, &features).await;
        let weights = optimal_weights(self.suggestions.as_ref(), graph_id, Some(decision.kind)).await?;

        let confidence = scoring::confidence(&features, &weights);
        if confidence < self.config.min_confidence {
            debug!(
                graph_id = %graph_id,
                source = %a.id,
                target = %b.id,
                confidence,
                "Below minimum confidence"
            );
            return Ok(None);
        }

        let strength = scoring::strength(&features);
        let mut suggestion = RelationshipSuggestion::new(graph_id, &a.id, &b.id, decision.kind);
        suggestion.confidence = confidence;
        suggestion.strength = strength;
        suggestion.reasoning = scoring::reasoning(
            &a.name,
            &b.name,
            decision.kind,
            &features,
            self.config.reasoning_threshold,
        );
        suggestion.evidence = scoring::evidence(&features);
        suggestion.method =
            scoring::method(&features, decision.semantic, self.config.reasoning_threshold);
        suggestion.priority_score = scoring::priority(confidence, strength, &features);
        suggestion.status = if confidence >= self.config.auto_accept_threshold {
            SuggestionStatus::AutoAccepted
        } else {
            SuggestionStatus::Pending
        };

        let snapshot = SuggestionFeature::snapshot(&suggestion.id, &features, &weights);

        Ok(Some(Prediction {
            suggestion,
            features,
            snapshot,
        }))
    }

    /// Score one pair and persist the result
    ///
    /// Returns `None` when nothing was predicted or a concurrent writer stored
    /// the same suggestion first.
    pub async fn predict_and_store(
        &self,
        a: &Entity,
        b: &Entity,
        graph_id: &str,
    ) -> Result<Option<RelationshipSuggestion>> {
        let Some(prediction) = self.predict(a, b, graph_id).await? else {
            return Ok(None);
        };

        let created = self
            .suggestions
            .create_suggestion(&prediction.suggestion, &prediction.snapshot)
            .await?;
        if !created {
            debug!(graph_id = %graph_id, source = %a.id, target = %b.id, "Suggestion written concurrently");
            return Ok(None);
        }

        info!(
            graph_id = %graph_id,
            suggestion_id = %prediction.suggestion.id,
            source = %a.id,
            target = %b.id,
            kind = %prediction.suggestion.suggested_type,
            confidence = prediction.suggestion.confidence,
            status = %prediction.suggestion.status,
            "Created suggestion"
        );
        Ok(Some(prediction.suggestion))
    }

    /// Look both entities up by id, then predict and store
    pub async fn predict_pair(
        &self,
        graph_id: &str,
        a_id: &str,
        b_id: &str,
    ) -> Result<Option<RelationshipSuggestion>> {
        if a_id == b_id {
            return Err(Error::InvalidPair(a_id.to_string()));
        }
        self.ensure_graph(graph_id).await?;
        let a = self.entity(graph_id, a_id).await?;
        let b = self.entity(graph_id, b_id).await?;
        self.predict_and_store(&a, &b, graph_id).await
    }

    /// Predict across the most important entities of a graph
    ///
    /// Stops once `limit` suggestions have been stored.
    pub async fn predict_for_graph(
        &self,
        graph_id: &str,
        limit: usize,
    ) -> Result<Vec<RelationshipSuggestion>> {
        self.ensure_graph(graph_id).await?;
        let mut entities = self.graph.get_entities(graph_id).await?;
        entities.truncate(self.config.max_entities);

        let mut created = Vec::new();
        for (i, j) in entity_pairs(entities.len()) {
            if created.len() >= limit {
                break;
            }
            if let Some(suggestion) = self.try_pair(&entities[i], &entities[j], graph_id).await? {
                created.push(suggestion);
            }
        }

        info!(
            graph_id = %graph_id,
            entities = entities.len(),
            created = created.len(),
            "Graph prediction finished"
        );
        Ok(created)
    }

    /// Predict between one entity and the most important others
    pub async fn predict_for_entity(
        &self,
        entity_id: &str,
        graph_id: &str,
        limit: usize,
    ) -> Result<Vec<RelationshipSuggestion>> {
        self.ensure_graph(graph_id).await?;
        let entity = self.entity(graph_id, entity_id).await?;

        let mut candidates = self.graph.get_entities(graph_id).await?;
        candidates.retain(|c| c.id != entity.id);
        candidates.truncate(self.config.max_entities);

        let mut created = Vec::new();
        for candidate in &candidates {
            if created.len() >= limit {
                break;
            }
            if let Some(suggestion) = self.try_pair(&entity, candidate, graph_id).await? {
                created.push(suggestion);
            }
        }
        Ok(created)
    }

    /// Predict one pair, skipping it when the failure only concerns the pair
    pub(crate) async fn try_pair(
        &self,
        a: &Entity,
        b: &Entity,
        graph_id: &str,
    ) -> Result<Option<RelationshipSuggestion>> {
        match self.predict_and_store(a, b, graph_id).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_pair_recoverable() => {
                warn!(
                    graph_id = %graph_id,
                    source = %a.id,
                    target = %b.id,
                    code = e.code(),
                    error = %e,
                    "Skipping pair"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_graph(&self, graph_id: &str) -> Result<()> {
        if self.graph.graph_exists(graph_id).await? {
            Ok(())
        } else {
            Err(Error::GraphNotFound(graph_id.to_string()))
        }
    }

    async fn entity(&self, graph_id: &str, entity_id: &str) -> Result<Entity> {
        self.graph
            .get_entity(graph_id, entity_id)
            .await?
            .ok_or_else(|| Error::EntityNotFound(entity_id.to_string()))
    }
}

impl std::fmt::Debug for RelationshipPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipPredictor")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .finish()
    }
}
