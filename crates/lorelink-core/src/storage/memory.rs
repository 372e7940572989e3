//! In-memory graph and suggestion store
//!
//! Implements both [`GraphStore`] and [`SuggestionStore`] over plain maps.
//! Used by tests and by embedders that keep their graph in process.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ContentFragment, Entity, FeatureType, GraphStore, GraphSummary, LearningWeight, RelationshipKind,
    RelationshipSuggestion, SuggestionFeature, SuggestionFeedback, SuggestionStatus,
    SuggestionStore, TimelineEvent, unordered_pair,
};
use crate::error::{Error, Result};

use super::document::GraphDocument;

#[derive(Debug, Clone)]
struct Edge {
    graph_id: String,
    source: String,
    target: String,
    edge_type: String,
}

#[derive(Debug, Clone)]
struct Fragment {
    graph_id: String,
    fragment: ContentFragment,
    entities: HashSet<String>,
}

#[derive(Debug, Clone)]
struct Event {
    graph_id: String,
    event: TimelineEvent,
    participants: HashSet<String>,
}

type WeightKey = (String, Option<RelationshipKind>, FeatureType);

#[derive(Debug, Default)]
struct State {
    graphs: BTreeMap<String, String>,
    entities: Vec<Entity>,
    edges: Vec<Edge>,
    fragments: Vec<Fragment>,
    events: Vec<Event>,
    suggestions: Vec<RelationshipSuggestion>,
    features: HashMap<String, Vec<SuggestionFeature>>,
    feedback: Vec<SuggestionFeedback>,
    weights: BTreeMap<WeightKey, LearningWeight>,
}

/// Process-local implementation of both store traits
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding one imported graph
    pub fn from_document(document: &GraphDocument) -> Result<Self> {
        let store = Self::new();
        store.import(document)?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== Graph Writes ==========

    pub fn add_graph(&self, id: &str, name: &str) {
        self.lock().graphs.insert(id.to_string(), name.to_string());
    }

    pub fn add_entity(&self, entity: Entity) {
        let mut state = self.lock();
        state
            .entities
            .retain(|e| e.graph_id != entity.graph_id || e.id != entity.id);
        state.entities.push(entity);
    }

    pub fn add_edge(&self, graph_id: &str, source: &str, target: &str, edge_type: &str) {
        self.lock().edges.push(Edge {
            graph_id: graph_id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            edge_type: edge_type.to_string(),
        });
    }

    pub fn add_fragment(&self, graph_id: &str, id: &str, text: &str, entities: &[&str]) {
        self.lock().fragments.push(Fragment {
            graph_id: graph_id.to_string(),
            fragment: ContentFragment {
                id: id.to_string(),
                text: text.to_string(),
            },
            entities: entities.iter().map(|e| e.to_string()).collect(),
        });
    }

    pub fn add_event(&self, graph_id: &str, id: &str, story_day: i64, title: &str, participants: &[&str]) {
        self.lock().events.push(Event {
            graph_id: graph_id.to_string(),
            event: TimelineEvent {
                id: id.to_string(),
                story_day,
                title: title.to_string(),
            },
            participants: participants.iter().map(|p| p.to_string()).collect(),
        });
    }

    /// Load a validated graph document, replacing the content of any graph
    /// with the same id
    ///
    /// Suggestions, feedback and learned weights of that graph are kept.
    pub fn import(&self, document: &GraphDocument) -> Result<()> {
        document.validate()?;
        clear_graph_content(&mut self.lock(), &document.id);

        self.add_graph(&document.id, &document.name);
        for entity in document.domain_entities() {
            self.add_entity(entity);
        }
        for edge in &document.relationships {
            self.add_edge(&document.id, &edge.source, &edge.target, &edge.relationship_type);
        }
        for fragment in &document.fragments {
            let entities: Vec<&str> = fragment.entities.iter().map(String::as_str).collect();
            self.add_fragment(&document.id, &fragment.id, &fragment.text, &entities);
        }
        for event in &document.events {
            let participants: Vec<&str> = event.participants.iter().map(String::as_str).collect();
            self.add_event(&document.id, &event.id, event.story_day, &event.title, &participants);
        }
        Ok(())
    }

    /// Remove a graph and everything that belongs to it
    pub fn delete_graph(&self, graph_id: &str) -> bool {
        let mut state = self.lock();
        let existed = state.graphs.remove(graph_id).is_some();
        clear_graph_content(&mut state, graph_id);
        state.weights.retain(|(g, _, _), _| g != graph_id);
        remove_suggestions(&mut state, graph_id);
        existed
    }
}

fn clear_graph_content(state: &mut State, graph_id: &str) {
    state.entities.retain(|e| e.graph_id != graph_id);
    state.edges.retain(|e| e.graph_id != graph_id);
    state.fragments.retain(|f| f.graph_id != graph_id);
    state.events.retain(|e| e.graph_id != graph_id);
}

fn remove_suggestions(state: &mut State, graph_id: &str) -> u64 {
    let removed: Vec<String> = state
        .suggestions
        .iter()
        .filter(|s| s.graph_id == graph_id)
        .map(|s| s.id.clone())
        .collect();
    state.suggestions.retain(|s| s.graph_id != graph_id);
    for id in &removed {
        state.features.remove(id);
    }
    state.feedback.retain(|f| f.graph_id != graph_id);
    removed.len() as u64
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn list_graphs(&self) -> Result<Vec<GraphSummary>> {
        let state = self.lock();
        Ok(state
            .graphs
            .iter()
            .map(|(id, name)| GraphSummary {
                id: id.clone(),
                name: name.clone(),
                entity_count: state.entities.iter().filter(|e| &e.graph_id == id).count() as u64,
            })
            .collect())
    }

    async fn graph_exists(&self, graph_id: &str) -> Result<bool> {
        Ok(self.lock().graphs.contains_key(graph_id))
    }

    async fn get_entities(&self, graph_id: &str) -> Result<Vec<Entity>> {
        let mut entities: Vec<Entity> = self
            .lock()
            .entities
            .iter()
            .filter(|e| e.graph_id == graph_id)
            .cloned()
            .collect();
        entities.sort_by(|a, b| {
            b.importance
                .unwrap_or(0.0)
                .total_cmp(&a.importance.unwrap_or(0.0))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(entities)
    }

    async fn get_entity(&self, graph_id: &str, entity_id: &str) -> Result<Option<Entity>> {
        Ok(self
            .lock()
            .entities
            .iter()
            .find(|e| e.graph_id == graph_id && e.id == entity_id)
            .cloned())
    }

    async fn count_entities(&self, graph_id: &str) -> Result<u64> {
        Ok(self
            .lock()
            .entities
            .iter()
            .filter(|e| e.graph_id == graph_id)
            .count() as u64)
    }

    async fn edge_exists(&self, graph_id: &str, a: &str, b: &str) -> Result<bool> {
        Ok(self.lock().edges.iter().any(|e| {
            e.graph_id == graph_id
                && ((e.source == a && e.target == b) || (e.source == b && e.target == a))
        }))
    }

    async fn degree(&self, graph_id: &str, entity_id: &str) -> Result<u64> {
        Ok(self
            .lock()
            .edges
            .iter()
            .filter(|e| e.graph_id == graph_id && (e.source == entity_id || e.target == entity_id))
            .count() as u64)
    }

    async fn neighbors_via(
        &self,
        graph_id: &str,
        entity_id: &str,
        edge_types: &[String],
    ) -> Result<Vec<String>> {
        let state = self.lock();
        let mut neighbors: Vec<String> = state
            .edges
            .iter()
            .filter(|e| e.graph_id == graph_id && edge_types.contains(&e.edge_type))
            .filter_map(|e| {
                if e.source == entity_id {
                    Some(e.target.clone())
                } else if e.target == entity_id {
                    Some(e.source.clone())
                } else {
                    None
                }
            })
            .collect();
        neighbors.sort();
        neighbors.dedup();
        Ok(neighbors)
    }

    async fn content_fragments(
        &self,
        graph_id: &str,
        entity_id: &str,
    ) -> Result<Vec<ContentFragment>> {
        Ok(self
            .lock()
            .fragments
            .iter()
            .filter(|f| f.graph_id == graph_id && f.entities.contains(entity_id))
            .map(|f| f.fragment.clone())
            .collect())
    }

    async fn timeline_events(&self, graph_id: &str, entity_id: &str) -> Result<Vec<TimelineEvent>> {
        let mut events: Vec<TimelineEvent> = self
            .lock()
            .events
            .iter()
            .filter(|e| e.graph_id == graph_id && e.participants.contains(entity_id))
            .map(|e| e.event.clone())
            .collect();
        events.sort_by_key(|e| e.story_day);
        Ok(events)
    }

    async fn count_joint_mentions(&self, graph_id: &str, name_a: &str, name_b: &str) -> Result<u64> {
        let name_a = name_a.to_lowercase();
        let name_b = name_b.to_lowercase();
        Ok(self
            .lock()
            .fragments
            .iter()
            .filter(|f| f.graph_id == graph_id)
            .filter(|f| {
                let text = f.fragment.text.to_lowercase();
                text.contains(&name_a) && text.contains(&name_b)
            })
            .count() as u64)
    }
}

#[async_trait]
impl SuggestionStore for InMemoryStore {
    async fn create_suggestion(
        &self,
        suggestion: &RelationshipSuggestion,
        features: &[SuggestionFeature],
    ) -> Result<bool> {
        if suggestion.source_entity_id == suggestion.target_entity_id {
            return Err(Error::InvalidPair(suggestion.source_entity_id.clone()));
        }
        let mut state = self.lock();
        let pair = suggestion.unordered_pair();
        let duplicate = state.suggestions.iter().any(|s| {
            s.graph_id == suggestion.graph_id
                && s.unordered_pair() == pair
                && s.suggested_type == suggestion.suggested_type
        });
        if duplicate {
            return Ok(false);
        }
        state.suggestions.push(suggestion.clone());
        state
            .features
            .insert(suggestion.id.clone(), features.to_vec());
        Ok(true)
    }

    async fn get_suggestion(&self, id: &str) -> Result<Option<RelationshipSuggestion>> {
        Ok(self.lock().suggestions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_by_pair(
        &self,
        graph_id: &str,
        a: &str,
        b: &str,
    ) -> Result<Vec<RelationshipSuggestion>> {
        let pair = unordered_pair(a, b);
        Ok(self
            .lock()
            .suggestions
            .iter()
            .filter(|s| s.graph_id == graph_id && s.unordered_pair() == pair)
            .cloned()
            .collect())
    }

    async fn list_suggestions(
        &self,
        graph_id: &str,
        status: Option<SuggestionStatus>,
        limit: usize,
    ) -> Result<Vec<RelationshipSuggestion>> {
        let mut suggestions: Vec<RelationshipSuggestion> = self
            .lock()
            .suggestions
            .iter()
            .filter(|s| s.graph_id == graph_id)
            .filter(|s| status.is_none_or(|status| s.status == status))
            .cloned()
            .collect();
        suggestions.sort_by(|a, b| {
            b.priority_score
                .total_cmp(&a.priority_score)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        suggestions.truncate(limit);
        Ok(suggestions)
    }

    async fn count_pending(&self, graph_id: &str) -> Result<u64> {
        Ok(self
            .lock()
            .suggestions
            .iter()
            .filter(|s| s.graph_id == graph_id && s.status == SuggestionStatus::Pending)
            .count() as u64)
    }

    async fn get_suggestion_features(&self, suggestion_id: &str) -> Result<Vec<SuggestionFeature>> {
        Ok(self
            .lock()
            .features
            .get(suggestion_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_graph_suggestions(&self, graph_id: &str) -> Result<u64> {
        Ok(remove_suggestions(&mut self.lock(), graph_id))
    }

    async fn record_decision(
        &self,
        suggestion: &RelationshipSuggestion,
        feedback: &SuggestionFeedback,
    ) -> Result<()> {
        let mut state = self.lock();
        let slot = state
            .suggestions
            .iter_mut()
            .find(|s| s.id == suggestion.id)
            .ok_or_else(|| Error::SuggestionNotFound(suggestion.id.clone()))?;
        *slot = suggestion.clone();
        state.feedback.push(feedback.clone());
        Ok(())
    }

    async fn list_feedback(&self, graph_id: &str) -> Result<Vec<SuggestionFeedback>> {
        let mut feedback: Vec<SuggestionFeedback> = self
            .lock()
            .feedback
            .iter()
            .filter(|f| f.graph_id == graph_id)
            .cloned()
            .collect();
        feedback.sort_by_key(|f| f.created_at);
        Ok(feedback)
    }

    async fn count_feedback_since(
        &self,
        graph_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        Ok(self
            .lock()
            .feedback
            .iter()
            .filter(|f| f.graph_id == graph_id)
            .filter(|f| since.is_none_or(|since| f.created_at > since))
            .count() as u64)
    }

    async fn get_weights(
        &self,
        graph_id: &str,
        relationship_type: Option<RelationshipKind>,
    ) -> Result<Vec<LearningWeight>> {
        Ok(self
            .lock()
            .weights
            .values()
            .filter(|w| w.graph_id == graph_id && w.relationship_type == relationship_type)
            .cloned()
            .collect())
    }

    async fn list_weights(&self, graph_id: &str) -> Result<Vec<LearningWeight>> {
        Ok(self
            .lock()
            .weights
            .values()
            .filter(|w| w.graph_id == graph_id)
            .cloned()
            .collect())
    }

    async fn save_weights(&self, weights: &[LearningWeight]) -> Result<()> {
        let mut state = self.lock();
        for weight in weights {
            let key = (weight.graph_id.clone(), weight.relationship_type, weight.feature);
            state.weights.insert(key, weight.clone());
        }
        Ok(())
    }

    async fn delete_weights(&self, graph_id: &str) -> Result<u64> {
        let mut state = self.lock();
        let before = state.weights.len();
        state.weights.retain(|(g, _, _), _| g != graph_id);
        Ok((before - state.weights.len()) as u64)
    }
}
