//! Pair feature extraction
//!
//! Every sub-metric is computed independently from graph-store reads and
//! cached per (graph, unordered pair, feature) for a short TTL, so repeated
//! predictions over overlapping pairs do not repeat the same joins.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::cache::TtlCache;
use crate::config::FeatureConfig;
use crate::domain::{Entity, FeatureType, FeatureVector, GraphStore, unordered_pair};
use crate::error::{Error, Result};

use super::normalize::{capped, inverse_log, normalize, ratio};

/// Weight of the shared-event count inside timeline proximity
const TIMELINE_COUNT_WEIGHT: f64 = 0.6;
/// Weight of the time-distance term inside timeline proximity
const TIMELINE_DISTANCE_WEIGHT: f64 = 0.4;
/// Score contribution of two entities having the same type
const SAME_TYPE_SCORE: f64 = 0.3;
/// Score contribution of two entities having similar importance
const SIMILAR_IMPORTANCE_SCORE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    graph_id: String,
    low: String,
    high: String,
    feature: FeatureType,
}

/// Computes normalized pair features from a graph store
pub struct FeatureExtractor {
    graph: Arc<dyn GraphStore>,
    config: FeatureConfig,
    cache: TtlCache<CacheKey, f64>,
}

impl FeatureExtractor {
    /// Create a new extractor over a graph store
    pub fn new(graph: Arc<dyn GraphStore>, config: FeatureConfig) -> Self {
        Self {
            graph,
            config,
            cache: TtlCache::new(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Compute every feature for a pair
    ///
    /// Fails with [`Error::InvalidPair`] when both sides are the same entity.
    pub async fn extract(&self, a: &Entity, b: &Entity, graph_id: &str) -> Result<FeatureVector> {
        if a.id == b.id {
            return Err(Error::InvalidPair(a.id.clone()));
        }

        let mut features = FeatureVector::new();
        for feature in FeatureType::all() {
            let value = self.feature(*feature, a, b, graph_id).await?;
            features.insert(*feature, value);
        }

        debug!(
            graph_id = %graph_id,
            source = %a.id,
            target = %b.id,
            features = ?features,
            "Extracted pair features"
        );

        Ok(features)
    }

    /// Compute a single feature, consulting the cache first
    pub async fn feature(
        &self,
        feature: FeatureType,
        a: &Entity,
        b: &Entity,
        graph_id: &str,
    ) -> Result<f64> {
        if a.id == b.id {
            return Err(Error::InvalidPair(a.id.clone()));
        }

        let (low, high) = unordered_pair(&a.id, &b.id);
        let key = CacheKey {
            graph_id: graph_id.to_string(),
            low: low.to_string(),
            high: high.to_string(),
            feature,
        };
        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }

        let value = match feature {
            FeatureType::CoOccurrence => self.co_occurrence(a, b, graph_id).await,
            FeatureType::TimelineProximity => self.timeline_proximity(a, b, graph_id).await,
            FeatureType::AttributeSimilarity => Ok(self.attribute_similarity(a, b)),
            FeatureType::SharedLocation => self.shared_location(a, b, graph_id).await,
            FeatureType::SharedFaction => self.shared_faction(a, b, graph_id).await,
            FeatureType::NetworkCentrality => self.network_centrality(a, b, graph_id).await,
            FeatureType::MentionFrequency => self.mention_frequency(a, b, graph_id).await,
        }
        .map_err(|e| match e {
            Error::FeatureComputation(_) => e,
            other => Error::FeatureComputation(format!("{}: {}", feature, other)),
        })?;

        let value = normalize(value, 0.0, 1.0);
        self.cache.insert(key, value, self.config.cache_ttl());
        Ok(value)
    }

    /// Drop all cached feature values
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Shared content fragments over the smaller per-entity fragment count
    async fn co_occurrence(&self, a: &Entity, b: &Entity, graph_id: &str) -> Result<f64> {
        let fragments_a: HashSet<String> = self
            .graph
            .content_fragments(graph_id, &a.id)
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect();
        let fragments_b: HashSet<String> = self
            .graph
            .content_fragments(graph_id, &b.id)
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect();

        let shared = fragments_a.intersection(&fragments_b).count();
        let smaller = fragments_a.len().min(fragments_b.len());
        Ok(ratio(shared, smaller))
    }

    /// Blend of shared-event count and closeness in story time
    async fn timeline_proximity(&self, a: &Entity, b: &Entity, graph_id: &str) -> Result<f64> {
        let events_a = self.graph.timeline_events(graph_id, &a.id).await?;
        let events_b = self.graph.timeline_events(graph_id, &b.id).await?;

        let ids_b: HashSet<&str> = events_b.iter().map(|e| e.id.as_str()).collect();
        let shared = events_a
            .iter()
            .filter(|e| ids_b.contains(e.id.as_str()))
            .count();
        if shared == 0 {
            return Ok(0.0);
        }

        let count_score = capped(shared as u64, self.config.timeline_event_cap);

        // Mean distance from each of A's events to B's nearest event
        let total_distance: f64 = events_a
            .iter()
            .filter_map(|ea| {
                events_b
                    .iter()
                    .map(|eb| ea.story_day.abs_diff(eb.story_day))
                    .min()
            })
            .map(|d| d as f64)
            .sum();
        let mean_distance = total_distance / events_a.len() as f64;

        Ok(TIMELINE_COUNT_WEIGHT * count_score
            + TIMELINE_DISTANCE_WEIGHT * inverse_log(mean_distance))
    }

    /// Weighted boolean attribute checks divided by the number of checks made
    fn attribute_similarity(&self, a: &Entity, b: &Entity) -> f64 {
        let mut score = 0.0;
        let mut checks = 0u32;

        checks += 1;
        if a.entity_type == b.entity_type {
            score += SAME_TYPE_SCORE;
        }

        if let (Some(ia), Some(ib)) = (a.importance, b.importance) {
            checks += 1;
            if (ia - ib).abs() <= self.config.importance_tolerance {
                score += SIMILAR_IMPORTANCE_SCORE;
            }
        }

        normalize(score / f64::from(checks), 0.0, 1.0)
    }

    /// Number of common locations, against a fixed cap
    async fn shared_location(&self, a: &Entity, b: &Entity, graph_id: &str) -> Result<f64> {
        let common = self
            .common_neighbors(a, b, graph_id, &self.config.location_edge_types)
            .await?;
        Ok(capped(common as u64, self.config.shared_location_cap))
    }

    /// 1 when both entities share at least one faction
    async fn shared_faction(&self, a: &Entity, b: &Entity, graph_id: &str) -> Result<f64> {
        let common = self
            .common_neighbors(a, b, graph_id, &self.config.faction_edge_types)
            .await?;
        Ok(if common > 0 { 1.0 } else { 0.0 })
    }

    async fn common_neighbors(
        &self,
        a: &Entity,
        b: &Entity,
        graph_id: &str,
        edge_types: &[String],
    ) -> Result<usize> {
        if edge_types.is_empty() {
            return Ok(0);
        }
        let neighbors_a: HashSet<String> = self
            .graph
            .neighbors_via(graph_id, &a.id, edge_types)
            .await?
            .into_iter()
            .collect();
        let neighbors_b: HashSet<String> = self
            .graph
            .neighbors_via(graph_id, &b.id, edge_types)
            .await?
            .into_iter()
            .collect();
        Ok(neighbors_a.intersection(&neighbors_b).count())
    }

    /// Mean degree centrality of the two entities
    async fn network_centrality(&self, a: &Entity, b: &Entity, graph_id: &str) -> Result<f64> {
        let total = self.graph.count_entities(graph_id).await?;
        if total == 0 {
            return Ok(0.0);
        }
        let degree_a = self.graph.degree(graph_id, &a.id).await? as f64;
        let degree_b = self.graph.degree(graph_id, &b.id).await? as f64;
        let total = total as f64;

        Ok(normalize((degree_a / total + degree_b / total) / 2.0, 0.0, 1.0))
    }

    /// Fragments naming both entities, against a fixed cap
    async fn mention_frequency(&self, a: &Entity, b: &Entity, graph_id: &str) -> Result<f64> {
        let name_a = a.canonical_name();
        let name_b = b.canonical_name();
        if name_a.is_empty() || name_b.is_empty() {
            return Ok(0.0);
        }
        let count = self
            .graph
            .count_joint_mentions(graph_id, &name_a, &name_b)
            .await?;
        Ok(capped(count, self.config.mention_cap))
    }
}
