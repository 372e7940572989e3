//! SQLite implementations of the store traits
//!
//! Every statement is parameterised. Timestamps are stored as fixed-width
//! RFC 3339 strings so they compare correctly as text.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    ContentFragment, Entity, EntityType, EvidenceItem, FeatureType, FeedbackAction,
    FeedbackDetails, GenerationMethod, GraphStore, GraphSummary, LearningWeight,
    RelationshipKind, RelationshipSuggestion, SuggestionFeature, SuggestionFeedback,
    SuggestionStatus, SuggestionStore, TimelineEvent, unordered_pair,
};
use crate::error::{Error, Result};

use super::document::GraphDocument;

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::CorruptRecord(format!("{} '{}': {}", column, s, e)))
}

/// `?, ?, ?` for a dynamic `IN (...)` list
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// Graph store
// ============================================================================

/// Tables holding a graph's imported content, children first
const GRAPH_CONTENT_TABLES: [&str; 6] = [
    "relationships",
    "fragment_mentions",
    "event_participants",
    "content_fragments",
    "timeline_events",
    "entities",
];

/// SQLite implementation of [`GraphStore`]
#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load a graph document, replacing the content of any graph with the
    /// same id
    ///
    /// The graph row itself is updated in place, so suggestions, feedback and
    /// learned weights that reference it survive a re-import.
    pub async fn import(&self, document: &GraphDocument) -> Result<()> {
        document.validate()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO graphs (id, name) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&document.id)
        .bind(&document.name)
        .execute(&mut *tx)
        .await?;

        for table in GRAPH_CONTENT_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE graph_id = ?"))
                .bind(&document.id)
                .execute(&mut *tx)
                .await?;
        }

        for entity in document.domain_entities() {
            sqlx::query(
                "INSERT INTO entities (graph_id, id, entity_type, name, importance) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&entity.graph_id)
            .bind(&entity.id)
            .bind(entity.entity_type.as_str())
            .bind(&entity.name)
            .bind(entity.importance)
            .execute(&mut *tx)
            .await?;
        }

        for edge in &document.relationships {
            sqlx::query(
                "INSERT INTO relationships (id, graph_id, source_id, target_id, relationship_type) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&document.id)
            .bind(&edge.source)
            .bind(&edge.target)
            .bind(&edge.relationship_type)
            .execute(&mut *tx)
            .await?;
        }

        for fragment in &document.fragments {
            sqlx::query("INSERT INTO content_fragments (graph_id, id, text) VALUES (?, ?, ?)")
                .bind(&document.id)
                .bind(&fragment.id)
                .bind(&fragment.text)
                .execute(&mut *tx)
                .await?;
            for entity_id in &fragment.entities {
                sqlx::query(
                    "INSERT OR IGNORE INTO fragment_mentions (graph_id, fragment_id, entity_id) VALUES (?, ?, ?)",
                )
                .bind(&document.id)
                .bind(&fragment.id)
                .bind(entity_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        for event in &document.events {
            sqlx::query(
                "INSERT INTO timeline_events (graph_id, id, story_day, title) VALUES (?, ?, ?, ?)",
            )
            .bind(&document.id)
            .bind(&event.id)
            .bind(event.story_day)
            .bind(&event.title)
            .execute(&mut *tx)
            .await?;
            for entity_id in &event.participants {
                sqlx::query(
                    "INSERT OR IGNORE INTO event_participants (graph_id, event_id, entity_id) VALUES (?, ?, ?)",
                )
                .bind(&document.id)
                .bind(&event.id)
                .bind(entity_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        info!(
            graph_id = %document.id,
            entities = document.entities.len(),
            relationships = document.relationships.len(),
            "Graph imported"
        );
        Ok(())
    }

    /// Delete a graph; suggestions, feedback and weights go with it
    pub async fn delete_graph(&self, graph_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM graphs WHERE id = ?")
            .bind(graph_id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(graph_id = %graph_id, "Graph deleted");
        }
        Ok(deleted)
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    // ========== Graph Operations ==========

    async fn list_graphs(&self) -> Result<Vec<GraphSummary>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT g.id, g.name, COUNT(e.id)
            FROM graphs g
            LEFT JOIN entities e ON e.graph_id = g.id
            GROUP BY g.id, g.name
            ORDER BY g.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, count)| GraphSummary {
                id,
                name,
                entity_count: count as u64,
            })
            .collect())
    }

    async fn graph_exists(&self, graph_id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM graphs WHERE id = ?")
            .bind(graph_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    // ========== Entity Operations ==========

    async fn get_entities(&self, graph_id: &str) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            r#"
            SELECT id, graph_id, entity_type, name, importance FROM entities
            WHERE graph_id = ?
            ORDER BY COALESCE(importance, 0) DESC, name
            "#,
        )
        .bind(graph_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_entity()).collect()
    }

    async fn get_entity(&self, graph_id: &str, entity_id: &str) -> Result<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as(
            "SELECT id, graph_id, entity_type, name, importance FROM entities WHERE graph_id = ? AND id = ?",
        )
        .bind(graph_id)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_entity()).transpose()
    }

    async fn count_entities(&self, graph_id: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities WHERE graph_id = ?")
            .bind(graph_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // ========== Edge Operations ==========

    async fn edge_exists(&self, graph_id: &str, a: &str, b: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM relationships
            WHERE graph_id = ?
              AND ((source_id = ? AND target_id = ?) OR (source_id = ? AND target_id = ?))
            LIMIT 1
            "#,
        )
        .bind(graph_id)
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn degree(&self, graph_id: &str, entity_id: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM relationships WHERE graph_id = ? AND (source_id = ? OR target_id = ?)",
        )
        .bind(graph_id)
        .bind(entity_id)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn neighbors_via(
        &self,
        graph_id: &str,
        entity_id: &str,
        edge_types: &[String],
    ) -> Result<Vec<String>> {
        if edge_types.is_empty() {
            return Ok(Vec::new());
        }

        let types = placeholders(edge_types.len());
        let sql = format!(
            r#"
            SELECT target_id FROM relationships
            WHERE graph_id = ? AND source_id = ? AND relationship_type IN ({types})
            UNION
            SELECT source_id FROM relationships
            WHERE graph_id = ? AND target_id = ? AND relationship_type IN ({types})
            "#
        );

        let mut query = sqlx::query_as::<_, (String,)>(&sql)
            .bind(graph_id)
            .bind(entity_id);
        for edge_type in edge_types {
            query = query.bind(edge_type);
        }
        query = query.bind(graph_id).bind(entity_id);
        for edge_type in edge_types {
            query = query.bind(edge_type);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // ========== Content Operations ==========

    async fn content_fragments(
        &self,
        graph_id: &str,
        entity_id: &str,
    ) -> Result<Vec<ContentFragment>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT f.id, f.text FROM content_fragments f
            JOIN fragment_mentions m ON m.graph_id = f.graph_id AND m.fragment_id = f.id
            WHERE f.graph_id = ? AND m.entity_id = ?
            "#,
        )
        .bind(graph_id)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, text)| ContentFragment { id, text })
            .collect())
    }

    async fn timeline_events(&self, graph_id: &str, entity_id: &str) -> Result<Vec<TimelineEvent>> {
        let rows: Vec<(String, i64, String)> = sqlx::query_as(
            r#"
            SELECT t.id, t.story_day, t.title FROM timeline_events t
            JOIN event_participants p ON p.graph_id = t.graph_id AND p.event_id = t.id
            WHERE t.graph_id = ? AND p.entity_id = ?
            ORDER BY t.story_day
            "#,
        )
        .bind(graph_id)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, story_day, title)| TimelineEvent { id, story_day, title })
            .collect())
    }

    async fn count_joint_mentions(&self, graph_id: &str, name_a: &str, name_b: &str) -> Result<u64> {
        // SQLite's lower() only folds ASCII, so matching happens here
        let texts: Vec<(String,)> =
            sqlx::query_as("SELECT text FROM content_fragments WHERE graph_id = ?")
                .bind(graph_id)
                .fetch_all(&self.pool)
                .await?;

        let name_a = name_a.to_lowercase();
        let name_b = name_b.to_lowercase();
        Ok(texts
            .iter()
            .filter(|(text,)| {
                let text = text.to_lowercase();
                text.contains(&name_a) && text.contains(&name_b)
            })
            .count() as u64)
    }
}

// ============================================================================
// Suggestion store
// ============================================================================

/// SQLite implementation of [`SuggestionStore`]
#[derive(Clone)]
pub struct SqliteSuggestionStore {
    pool: SqlitePool,
}

impl SqliteSuggestionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SUGGESTION_COLUMNS: &str = "id, graph_id, source_entity_id, target_entity_id, suggested_type, \
     confidence, strength, reasoning, evidence, method, status, priority_score, created_at, updated_at";

#[async_trait]
impl SuggestionStore for SqliteSuggestionStore {
    // ========== Suggestion Operations ==========

    async fn create_suggestion(
        &self,
        suggestion: &RelationshipSuggestion,
        features: &[SuggestionFeature],
    ) -> Result<bool> {
        if suggestion.source_entity_id == suggestion.target_entity_id {
            return Err(Error::InvalidPair(suggestion.source_entity_id.clone()));
        }

        let evidence_json = serde_json::to_string(&suggestion.evidence)?;
        let (low, high) = suggestion.unordered_pair();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO suggestions (
                id, graph_id, source_entity_id, target_entity_id, pair_low, pair_high,
                suggested_type, confidence, strength, reasoning, evidence, method,
                status, priority_score, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(graph_id, pair_low, pair_high, suggested_type) DO NOTHING
            "#,
        )
        .bind(&suggestion.id)
        .bind(&suggestion.graph_id)
        .bind(&suggestion.source_entity_id)
        .bind(&suggestion.target_entity_id)
        .bind(low)
        .bind(high)
        .bind(suggestion.suggested_type.as_str())
        .bind(suggestion.confidence)
        .bind(i64::from(suggestion.strength))
        .bind(&suggestion.reasoning)
        .bind(&evidence_json)
        .bind(suggestion.method.as_str())
        .bind(suggestion.status.as_str())
        .bind(suggestion.priority_score)
        .bind(timestamp(&suggestion.created_at))
        .bind(timestamp(&suggestion.updated_at))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            debug!(
                graph_id = %suggestion.graph_id,
                source = %suggestion.source_entity_id,
                target = %suggestion.target_entity_id,
                suggested_type = %suggestion.suggested_type,
                "Duplicate suggestion ignored"
            );
            return Ok(false);
        }

        for feature in features {
            sqlx::query(
                "INSERT INTO suggestion_features (suggestion_id, feature_type, value, weight) VALUES (?, ?, ?, ?)",
            )
            .bind(&feature.suggestion_id)
            .bind(feature.feature.as_str())
            .bind(feature.value)
            .bind(feature.weight)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn get_suggestion(&self, id: &str) -> Result<Option<RelationshipSuggestion>> {
        let sql = format!("SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE id = ?");
        let row: Option<SuggestionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_suggestion()).transpose()
    }

    async fn find_by_pair(
        &self,
        graph_id: &str,
        a: &str,
        b: &str,
    ) -> Result<Vec<RelationshipSuggestion>> {
        let (low, high) = unordered_pair(a, b);
        let sql = format!(
            "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE graph_id = ? AND pair_low = ? AND pair_high = ?"
        );
        let rows: Vec<SuggestionRow> = sqlx::query_as(&sql)
            .bind(graph_id)
            .bind(low)
            .bind(high)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.into_suggestion()).collect()
    }

    async fn list_suggestions(
        &self,
        graph_id: &str,
        status: Option<SuggestionStatus>,
        limit: usize,
    ) -> Result<Vec<RelationshipSuggestion>> {
        let sql = format!(
            r#"
            SELECT {SUGGESTION_COLUMNS} FROM suggestions
            WHERE graph_id = ? AND (? IS NULL OR status = ?)
            ORDER BY priority_score DESC, created_at ASC
            LIMIT ?
            "#
        );
        let status = status.map(|s| s.as_str());
        let rows: Vec<SuggestionRow> = sqlx::query_as(&sql)
            .bind(graph_id)
            .bind(status)
            .bind(status)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.into_suggestion()).collect()
    }

    async fn count_pending(&self, graph_id: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM suggestions WHERE graph_id = ? AND status = 'pending'",
        )
        .bind(graph_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn get_suggestion_features(&self, suggestion_id: &str) -> Result<Vec<SuggestionFeature>> {
        let rows: Vec<(String, String, f64, f64)> = sqlx::query_as(
            "SELECT suggestion_id, feature_type, value, weight FROM suggestion_features WHERE suggestion_id = ?",
        )
        .bind(suggestion_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(suggestion_id, feature, value, weight)| {
                Ok(SuggestionFeature {
                    suggestion_id,
                    feature: parse_feature(&feature)?,
                    value,
                    weight,
                })
            })
            .collect()
    }

    async fn delete_graph_suggestions(&self, graph_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM suggestions WHERE graph_id = ?")
            .bind(graph_id)
            .execute(&self.pool)
            .await?;

        info!(graph_id = %graph_id, deleted = result.rows_affected(), "Suggestions deleted");
        Ok(result.rows_affected())
    }

    // ========== Feedback Operations ==========

    async fn record_decision(
        &self,
        suggestion: &RelationshipSuggestion,
        feedback: &SuggestionFeedback,
    ) -> Result<()> {
        let snapshot_json = serde_json::to_string(&feedback.feature_snapshot)?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE suggestions
            SET suggested_type = ?, strength = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(suggestion.suggested_type.as_str())
        .bind(i64::from(suggestion.strength))
        .bind(suggestion.status.as_str())
        .bind(timestamp(&suggestion.updated_at))
        .bind(&suggestion.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::SuggestionNotFound(suggestion.id.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO suggestion_feedback (
                id, suggestion_id, graph_id, user_id, action, suggested_type,
                corrected_type, corrected_strength, explanation, confidence_at_decision,
                feature_snapshot, time_to_decision_secs, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&feedback.id)
        .bind(&feedback.suggestion_id)
        .bind(&feedback.graph_id)
        .bind(&feedback.user_id)
        .bind(feedback.action.as_str())
        .bind(feedback.suggested_type.as_str())
        .bind(feedback.details.corrected_type.map(|k| k.as_str()))
        .bind(feedback.details.corrected_strength.map(i64::from))
        .bind(&feedback.details.explanation)
        .bind(feedback.confidence_at_decision)
        .bind(&snapshot_json)
        .bind(feedback.time_to_decision_secs)
        .bind(timestamp(&feedback.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            suggestion_id = %suggestion.id,
            status = %suggestion.status,
            feedback_id = %feedback.id,
            "Decision recorded"
        );
        Ok(())
    }

    async fn list_feedback(&self, graph_id: &str) -> Result<Vec<SuggestionFeedback>> {
        let rows: Vec<FeedbackRow> = sqlx::query_as(
            r#"
            SELECT id, suggestion_id, graph_id, user_id, action, suggested_type,
                   corrected_type, corrected_strength, explanation, confidence_at_decision,
                   feature_snapshot, time_to_decision_secs, created_at
            FROM suggestion_feedback
            WHERE graph_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(graph_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_feedback()).collect()
    }

    async fn count_feedback_since(
        &self,
        graph_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let since = since.map(|dt| timestamp(&dt));
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM suggestion_feedback WHERE graph_id = ? AND (? IS NULL OR created_at > ?)",
        )
        .bind(graph_id)
        .bind(since.as_deref())
        .bind(since.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    // ========== Weight Operations ==========

    async fn get_weights(
        &self,
        graph_id: &str,
        relationship_type: Option<RelationshipKind>,
    ) -> Result<Vec<LearningWeight>> {
        let rows: Vec<WeightRow> = sqlx::query_as(
            r#"
            SELECT graph_id, feature_type, relationship_type, weight, accuracy_score, sample_count, updated_at
            FROM learning_weights
            WHERE graph_id = ? AND relationship_type = ?
            ORDER BY feature_type
            "#,
        )
        .bind(graph_id)
        .bind(relationship_type.map(|k| k.as_str()).unwrap_or(""))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_weight()).collect()
    }

    async fn list_weights(&self, graph_id: &str) -> Result<Vec<LearningWeight>> {
        let rows: Vec<WeightRow> = sqlx::query_as(
            r#"
            SELECT graph_id, feature_type, relationship_type, weight, accuracy_score, sample_count, updated_at
            FROM learning_weights
            WHERE graph_id = ?
            ORDER BY relationship_type, feature_type
            "#,
        )
        .bind(graph_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_weight()).collect()
    }

    async fn save_weights(&self, weights: &[LearningWeight]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for weight in weights {
            sqlx::query(
                r#"
                INSERT INTO learning_weights (
                    graph_id, feature_type, relationship_type, weight,
                    accuracy_score, sample_count, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(graph_id, feature_type, relationship_type) DO UPDATE SET
                    weight = excluded.weight,
                    accuracy_score = excluded.accuracy_score,
                    sample_count = excluded.sample_count,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&weight.graph_id)
            .bind(weight.feature.as_str())
            .bind(weight.relationship_type.map(|k| k.as_str()).unwrap_or(""))
            .bind(weight.weight.clamp(0.0, 1.0))
            .bind(weight.accuracy_score)
            .bind(i64::try_from(weight.sample_count).unwrap_or(i64::MAX))
            .bind(timestamp(&weight.updated_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_weights(&self, graph_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM learning_weights WHERE graph_id = ?")
            .bind(graph_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Row types
// ============================================================================

fn parse_feature(s: &str) -> Result<FeatureType> {
    FeatureType::parse(s).ok_or_else(|| Error::CorruptRecord(format!("Invalid feature type: {}", s)))
}

fn parse_kind(s: &str) -> Result<RelationshipKind> {
    RelationshipKind::parse(s)
        .ok_or_else(|| Error::CorruptRecord(format!("Invalid relationship type: {}", s)))
}

#[derive(Debug, FromRow)]
struct EntityRow {
    id: String,
    graph_id: String,
    entity_type: String,
    name: String,
    importance: Option<f64>,
}

impl EntityRow {
    fn into_entity(self) -> Result<Entity> {
        let entity_type = EntityType::parse(&self.entity_type)
            .ok_or_else(|| Error::CorruptRecord(format!("Invalid entity type: {}", self.entity_type)))?;

        Ok(Entity {
            id: self.id,
            graph_id: self.graph_id,
            entity_type,
            name: self.name,
            importance: self.importance,
        })
    }
}

#[derive(Debug, FromRow)]
struct SuggestionRow {
    id: String,
    graph_id: String,
    source_entity_id: String,
    target_entity_id: String,
    suggested_type: String,
    confidence: f64,
    strength: i64,
    reasoning: String,
    evidence: String,
    method: String,
    status: String,
    priority_score: f64,
    created_at: String,
    updated_at: String,
}

impl SuggestionRow {
    fn into_suggestion(self) -> Result<RelationshipSuggestion> {
        let method = GenerationMethod::parse(&self.method)
            .ok_or_else(|| Error::CorruptRecord(format!("Invalid generation method: {}", self.method)))?;
        let status = SuggestionStatus::parse(&self.status)
            .ok_or_else(|| Error::CorruptRecord(format!("Invalid suggestion status: {}", self.status)))?;
        let evidence: Vec<EvidenceItem> = serde_json::from_str(&self.evidence)?;

        Ok(RelationshipSuggestion {
            id: self.id,
            graph_id: self.graph_id,
            source_entity_id: self.source_entity_id,
            target_entity_id: self.target_entity_id,
            suggested_type: parse_kind(&self.suggested_type)?,
            confidence: self.confidence,
            strength: self.strength.clamp(0, 100) as u8,
            reasoning: self.reasoning,
            evidence,
            method,
            status,
            priority_score: self.priority_score,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct FeedbackRow {
    id: String,
    suggestion_id: String,
    graph_id: String,
    user_id: String,
    action: String,
    suggested_type: String,
    corrected_type: Option<String>,
    corrected_strength: Option<i64>,
    explanation: Option<String>,
    confidence_at_decision: f64,
    feature_snapshot: String,
    time_to_decision_secs: i64,
    created_at: String,
}

impl FeedbackRow {
    fn into_feedback(self) -> Result<SuggestionFeedback> {
        let action = FeedbackAction::parse(&self.action)
            .ok_or_else(|| Error::CorruptRecord(format!("Invalid feedback action: {}", self.action)))?;
        let corrected_type = self.corrected_type.as_deref().map(parse_kind).transpose()?;
        let feature_snapshot: Vec<SuggestionFeature> =
            serde_json::from_str(&self.feature_snapshot)?;

        Ok(SuggestionFeedback {
            id: self.id,
            suggestion_id: self.suggestion_id,
            graph_id: self.graph_id,
            user_id: self.user_id,
            action,
            suggested_type: parse_kind(&self.suggested_type)?,
            details: FeedbackDetails {
                corrected_type,
                corrected_strength: self.corrected_strength.map(|s| s.clamp(0, 100) as u8),
                explanation: self.explanation,
            },
            confidence_at_decision: self.confidence_at_decision,
            feature_snapshot,
            time_to_decision_secs: self.time_to_decision_secs,
            created_at: parse_timestamp("created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct WeightRow {
    graph_id: String,
    feature_type: String,
    relationship_type: String,
    weight: f64,
    accuracy_score: f64,
    sample_count: i64,
    updated_at: String,
}

impl WeightRow {
    fn into_weight(self) -> Result<LearningWeight> {
        let relationship_type = if self.relationship_type.is_empty() {
            None
        } else {
            Some(parse_kind(&self.relationship_type)?)
        };

        Ok(LearningWeight {
            graph_id: self.graph_id,
            feature: parse_feature(&self.feature_type)?,
            relationship_type,
            weight: self.weight,
            accuracy_score: self.accuracy_score,
            sample_count: self.sample_count.max(0) as u64,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}
