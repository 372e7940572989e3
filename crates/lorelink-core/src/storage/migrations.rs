//! Schema migrations
//!
//! Applied in order when a [`Database`](super::Database) opens. The
//! `_migrations` table records which versions a file already has.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::Result;

/// Current schema version
pub const CURRENT_VERSION: i32 = 3;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Story graph
///
/// Entity, fragment and event ids are scoped to their graph, so two stories
/// may both use `f1` or `aria`.
const MIGRATION_V1: &str = r#"
    -- Graphs (one per story)
    CREATE TABLE IF NOT EXISTS graphs (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- Entities
    CREATE TABLE IF NOT EXISTS entities (
        graph_id TEXT NOT NULL REFERENCES graphs(id) ON DELETE CASCADE,
        id TEXT NOT NULL,
        entity_type TEXT NOT NULL CHECK (entity_type IN ('character', 'location', 'faction', 'event', 'item', 'concept')),
        name TEXT NOT NULL,
        importance REAL CHECK (importance IS NULL OR (importance >= 0 AND importance <= 100)),
        PRIMARY KEY (graph_id, id)
    );

    -- Confirmed relationships
    CREATE TABLE IF NOT EXISTS relationships (
        id TEXT PRIMARY KEY NOT NULL,
        graph_id TEXT NOT NULL REFERENCES graphs(id) ON DELETE CASCADE,
        source_id TEXT NOT NULL,
        target_id TEXT NOT NULL,
        relationship_type TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        CHECK (source_id != target_id),
        FOREIGN KEY (graph_id, source_id) REFERENCES entities(graph_id, id) ON DELETE CASCADE,
        FOREIGN KEY (graph_id, target_id) REFERENCES entities(graph_id, id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(graph_id, source_id);
    CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(graph_id, target_id);

    -- Content fragments and the entities they feature
    CREATE TABLE IF NOT EXISTS content_fragments (
        graph_id TEXT NOT NULL REFERENCES graphs(id) ON DELETE CASCADE,
        id TEXT NOT NULL,
        text TEXT NOT NULL,
        PRIMARY KEY (graph_id, id)
    );

    CREATE TABLE IF NOT EXISTS fragment_mentions (
        graph_id TEXT NOT NULL,
        fragment_id TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        PRIMARY KEY (graph_id, fragment_id, entity_id),
        FOREIGN KEY (graph_id, fragment_id) REFERENCES content_fragments(graph_id, id) ON DELETE CASCADE,
        FOREIGN KEY (graph_id, entity_id) REFERENCES entities(graph_id, id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_fragment_mentions_entity ON fragment_mentions(graph_id, entity_id);

    -- Timeline events and their participants
    CREATE TABLE IF NOT EXISTS timeline_events (
        graph_id TEXT NOT NULL REFERENCES graphs(id) ON DELETE CASCADE,
        id TEXT NOT NULL,
        story_day INTEGER NOT NULL,
        title TEXT NOT NULL,
        PRIMARY KEY (graph_id, id)
    );

    CREATE TABLE IF NOT EXISTS event_participants (
        graph_id TEXT NOT NULL,
        event_id TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        PRIMARY KEY (graph_id, event_id, entity_id),
        FOREIGN KEY (graph_id, event_id) REFERENCES timeline_events(graph_id, id) ON DELETE CASCADE,
        FOREIGN KEY (graph_id, entity_id) REFERENCES entities(graph_id, id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_event_participants_entity ON event_participants(graph_id, entity_id);
"#;

/// Migration 2: Suggestions, feedback and learned weights
const MIGRATION_V2: &str = r#"
    -- Relationship suggestions, one per unordered pair per type
    CREATE TABLE IF NOT EXISTS suggestions (
        id TEXT PRIMARY KEY NOT NULL,
        graph_id TEXT NOT NULL REFERENCES graphs(id) ON DELETE CASCADE,
        source_entity_id TEXT NOT NULL,
        target_entity_id TEXT NOT NULL,
        pair_low TEXT NOT NULL,
        pair_high TEXT NOT NULL,
        suggested_type TEXT NOT NULL,
        confidence REAL NOT NULL CHECK (confidence >= 0 AND confidence <= 100),
        strength INTEGER NOT NULL CHECK (strength >= 0 AND strength <= 100),
        reasoning TEXT NOT NULL DEFAULT '',
        evidence TEXT NOT NULL DEFAULT '[]',
        method TEXT NOT NULL CHECK (method IN ('content', 'timeline', 'attribute', 'semantic', 'hybrid')),
        status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'accepted', 'rejected', 'modified', 'dismissed', 'auto_accepted')),
        priority_score REAL NOT NULL DEFAULT 0.0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (source_entity_id != target_entity_id),
        UNIQUE (graph_id, pair_low, pair_high, suggested_type)
    );

    CREATE INDEX IF NOT EXISTS idx_suggestions_graph_status ON suggestions(graph_id, status);
    CREATE INDEX IF NOT EXISTS idx_suggestions_pair ON suggestions(graph_id, pair_low, pair_high);
    CREATE INDEX IF NOT EXISTS idx_suggestions_priority ON suggestions(graph_id, priority_score DESC);

    -- Feature values and weights at generation time
    CREATE TABLE IF NOT EXISTS suggestion_features (
        suggestion_id TEXT NOT NULL REFERENCES suggestions(id) ON DELETE CASCADE,
        feature_type TEXT NOT NULL,
        value REAL NOT NULL CHECK (value >= 0 AND value <= 1),
        weight REAL NOT NULL,
        PRIMARY KEY (suggestion_id, feature_type)
    );

    -- Append-only user decisions
    CREATE TABLE IF NOT EXISTS suggestion_feedback (
        id TEXT PRIMARY KEY NOT NULL,
        suggestion_id TEXT NOT NULL REFERENCES suggestions(id) ON DELETE CASCADE,
        graph_id TEXT NOT NULL REFERENCES graphs(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        action TEXT NOT NULL CHECK (action IN ('accept', 'reject', 'modify', 'dismiss')),
        suggested_type TEXT NOT NULL,
        corrected_type TEXT,
        corrected_strength INTEGER,
        explanation TEXT,
        confidence_at_decision REAL NOT NULL,
        feature_snapshot TEXT NOT NULL DEFAULT '[]',
        time_to_decision_secs INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_suggestion_feedback_graph ON suggestion_feedback(graph_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_suggestion_feedback_suggestion ON suggestion_feedback(suggestion_id);

    -- Learned weights; relationship_type '' is the graph-wide table
    CREATE TABLE IF NOT EXISTS learning_weights (
        graph_id TEXT NOT NULL REFERENCES graphs(id) ON DELETE CASCADE,
        feature_type TEXT NOT NULL,
        relationship_type TEXT NOT NULL DEFAULT '',
        weight REAL NOT NULL CHECK (weight >= 0 AND weight <= 1),
        accuracy_score REAL NOT NULL DEFAULT 0.0,
        sample_count INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (graph_id, feature_type, relationship_type)
    );
"#;

/// Migration 3: Ephemeral entries shared between processes
const MIGRATION_V3: &str = r#"
    -- Progress records, rate windows and cooldown markers; expires_at is unix millis
    CREATE TABLE IF NOT EXISTS ephemeral_entries (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_ephemeral_entries_expiry ON ephemeral_entries(expires_at);
"#;

/// Every migration in order: version, description, SQL
const MIGRATIONS: [(i32, &str, &str); 3] = [
    (1, "story graph", MIGRATION_V1),
    (2, "suggestions and learning", MIGRATION_V2),
    (3, "ephemeral entries", MIGRATION_V3),
];

/// Highest migration applied to the database, 0 for a fresh file
pub async fn schema_version(pool: &SqlitePool) -> Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the database, each in its own transaction
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current = schema_version(pool).await?;
    if current >= CURRENT_VERSION {
        debug!(version = current, "Schema up to date");
        return Ok(());
    }

    for (version, description, sql) in MIGRATIONS {
        if version <= current {
            continue;
        }
        info!(version, description, "Applying migration");

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    info!(from = current, to = CURRENT_VERSION, "Schema migrated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;
        assert_eq!(schema_version(&pool).await.unwrap(), 0);

        run_migrations(&pool).await.unwrap();
        assert_eq!(schema_version(&pool).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let (applied,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(applied, i64::from(CURRENT_VERSION));
    }

    #[tokio::test]
    async fn test_resumes_from_recorded_version() {
        let pool = create_test_pool().await;
        sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(&pool).await.unwrap();
        sqlx::raw_sql(MIGRATION_V1).execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO _migrations (version) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();
        assert_eq!(schema_version(&pool).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let tables = [
            "graphs",
            "entities",
            "relationships",
            "content_fragments",
            "fragment_mentions",
            "timeline_events",
            "event_participants",
            "suggestions",
            "suggestion_features",
            "suggestion_feedback",
            "learning_weights",
            "ephemeral_entries",
        ];

        for table in tables {
            let result: (i32,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|_| panic!("Table {} should exist", table));
            assert_eq!(result.0, 0, "Table {} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_suggestion_pair_uniqueness() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::query("INSERT INTO graphs (id, name) VALUES ('saga', 'Saga')")
            .execute(&pool)
            .await
            .unwrap();

        let insert = "INSERT INTO suggestions (id, graph_id, source_entity_id, target_entity_id, \
                      pair_low, pair_high, suggested_type, confidence, strength, method, \
                      created_at, updated_at) \
                      VALUES (?, 'saga', 'b', 'a', 'a', 'b', 'ally', 50, 50, 'hybrid', 'now', 'now')";

        sqlx::query(insert).bind("s1").execute(&pool).await.unwrap();
        let duplicate = sqlx::query(insert).bind("s2").execute(&pool).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_entity_ids_are_scoped_per_graph() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::raw_sql(
            "INSERT INTO graphs (id, name) VALUES ('saga', 'Saga'), ('coast', 'Coast');
             INSERT INTO entities (graph_id, id, entity_type, name) VALUES ('saga', 'aria', 'character', 'Aria');
             INSERT INTO entities (graph_id, id, entity_type, name) VALUES ('coast', 'aria', 'character', 'Aria');
             INSERT INTO content_fragments (graph_id, id, text) VALUES ('saga', 'f1', 'Aria.');
             INSERT INTO content_fragments (graph_id, id, text) VALUES ('coast', 'f1', 'Aria again.');",
        )
        .execute(&pool)
        .await
        .unwrap();

        let same_graph = sqlx::query(
            "INSERT INTO entities (graph_id, id, entity_type, name) VALUES ('saga', 'aria', 'character', 'Other')",
        )
        .execute(&pool)
        .await;
        assert!(same_graph.is_err());
    }
}
