//! Lorelink Core Integration Tests

use std::sync::Arc;
use std::time::Duration;

use lorelink_core::{
    Error,
    cache::InMemoryEphemeralStore,
    config::{Config, FeatureConfig, LearningConfig, PredictionConfig, SchedulerConfig},
    domain::{
        Entity, EntityType, FeatureType, FeatureVector, FeedbackAction, FeedbackDetails,
        RelationshipKind, RelationshipSuggestion, SuggestionFeature, SuggestionStatus,
        SuggestionStore, WeightTable, default_weights,
    },
    learning::LearningEngine,
    prediction::{RelationshipPredictor, TypeResolver, scoring},
    scheduler::{BatchScheduler, JobStatus},
    storage::{
        Database, GraphDocument, InMemoryStore, SqliteEphemeralStore, SqliteGraphStore,
        SqliteSuggestionStore,
    },
};

const SAGA: &str = r#"{
    "id": "saga",
    "name": "The Long Saga",
    "entities": [
        {"id": "aria", "name": "Aria", "type": "character", "importance": 80},
        {"id": "kael", "name": "Kael", "type": "character", "importance": 70},
        {"id": "loner", "name": "Loner", "type": "character", "importance": 10},
        {"id": "guild", "name": "Silver Guild", "type": "faction"},
        {"id": "keep", "name": "Stone Keep", "type": "location"}
    ],
    "relationships": [
        {"source": "aria", "target": "guild", "type": "member_of"},
        {"source": "kael", "target": "guild", "type": "member_of"},
        {"source": "aria", "target": "keep", "type": "lives_in"},
        {"source": "kael", "target": "keep", "type": "visited"}
    ],
    "fragments": [
        {"id": "f1", "text": "Aria and Kael ride out.", "entities": ["aria", "kael"]},
        {"id": "f2", "text": "Kael speaks to Aria.", "entities": ["aria", "kael"]},
        {"id": "f3", "text": "Aria alone.", "entities": ["aria"]}
    ],
    "events": [
        {"id": "ev1", "story_day": 100, "title": "Siege", "participants": ["aria", "kael"]},
        {"id": "ev2", "story_day": 110, "title": "Flight", "participants": ["aria", "kael"]},
        {"id": "ev3", "story_day": 400, "title": "Wedding", "participants": ["aria"]}
    ]
}"#;

struct SqliteStack {
    pool: sqlx::SqlitePool,
    graph: Arc<SqliteGraphStore>,
    suggestions: Arc<SqliteSuggestionStore>,
    cache: Arc<SqliteEphemeralStore>,
}

async fn sqlite_stack() -> SqliteStack {
    let db = Database::in_memory().await.expect("Failed to create database");
    let pool = db.pool().clone();
    let graph = Arc::new(SqliteGraphStore::new(pool.clone()));
    graph
        .import(&GraphDocument::from_json(SAGA).unwrap())
        .await
        .unwrap();
    SqliteStack {
        graph,
        suggestions: Arc::new(SqliteSuggestionStore::new(pool.clone())),
        cache: Arc::new(SqliteEphemeralStore::new(pool.clone())),
        pool,
    }
}

/// Store a pending, high-confidence suggestion with a fixed snapshot
async fn pending_suggestion(store: &dyn SuggestionStore, n: usize) -> String {
    let mut s = RelationshipSuggestion::new(
        "saga",
        format!("hero{}", n),
        format!("friend{}", n),
        RelationshipKind::Ally,
    );
    s.confidence = 90.0;
    let features = FeatureVector::new()
        .with(FeatureType::CoOccurrence, 0.9)
        .with(FeatureType::TimelineProximity, 0.4);
    let snapshot = SuggestionFeature::snapshot(&s.id, &features, &default_weights());
    assert!(store.create_suggestion(&s, &snapshot).await.unwrap());
    s.id
}

#[tokio::test]
async fn test_faction_heavy_pair_scores_and_types_as_ally() {
    let features = FeatureVector::new()
        .with(FeatureType::CoOccurrence, 0.8)
        .with(FeatureType::SharedFaction, 0.9)
        .with(FeatureType::TimelineProximity, 0.2);
    let weights: WeightTable = [
        (FeatureType::CoOccurrence, 0.5),
        (FeatureType::SharedFaction, 0.5),
        (FeatureType::TimelineProximity, 0.5),
    ]
    .into_iter()
    .collect();

    let confidence = scoring::confidence(&features, &weights);
    assert!((confidence - 63.333_333).abs() < 1e-4);

    let resolver = TypeResolver::from_config(&PredictionConfig::default());
    let a = Entity::new("aria", "saga", "Aria", EntityType::Character);
    let b = Entity::new("kael", "saga", "Kael", EntityType::Character);
    let decision = resolver.resolve(&a, &b, &features).await;
    assert_eq!(decision.kind, RelationshipKind::Ally);
    assert!(!decision.semantic);
}

#[tokio::test]
async fn test_sqlite_prediction_end_to_end() {
    let stack = sqlite_stack().await;
    let predictor = RelationshipPredictor::new(
        stack.graph.clone(),
        stack.suggestions.clone(),
        FeatureConfig::default(),
        PredictionConfig::default(),
    );

    let created = predictor.predict_for_graph("saga", 10).await.unwrap();
    assert!(created.iter().any(|s| s.involves_pair("aria", "kael")));
    for s in &created {
        assert!(s.confidence >= 40.0 && s.confidence <= 100.0);
        assert!(matches!(
            s.status,
            SuggestionStatus::Pending | SuggestionStatus::AutoAccepted
        ));
        assert!(!s.reasoning.is_empty());
    }

    // neither an existing suggestion nor an existing edge is suggested again
    assert!(predictor.predict_pair("saga", "kael", "aria").await.unwrap().is_none());
    assert!(predictor.predict_pair("saga", "aria", "guild").await.unwrap().is_none());

    let err = predictor.predict_pair("saga", "aria", "aria").await.unwrap_err();
    assert!(matches!(err, Error::InvalidPair(_)));

    let listed = stack
        .suggestions
        .list_suggestions("saga", None, 50)
        .await
        .unwrap();
    assert_eq!(listed.len(), created.len());
    assert!(
        listed
            .windows(2)
            .all(|w| w[0].priority_score >= w[1].priority_score)
    );
}

#[tokio::test(start_paused = true)]
async fn test_automatic_update_waits_for_samples_and_cooldown() {
    let store = Arc::new(InMemoryStore::new());
    let engine = LearningEngine::new(
        store.clone(),
        Arc::new(InMemoryEphemeralStore::new()),
        LearningConfig::default(),
    );
    let accept = |id: String| {
        let engine = &engine;
        async move {
            engine
                .record_feedback(&id, FeedbackAction::Accept, "editor", FeedbackDetails::default())
                .await
                .unwrap()
                .weights_updated
        }
    };

    for n in 0..4 {
        let id = pending_suggestion(store.as_ref(), n).await;
        assert!(!accept(id).await, "row {} must not trigger an update", n + 1);
    }
    assert!(store.list_weights("saga").await.unwrap().is_empty());

    let id = pending_suggestion(store.as_ref(), 4).await;
    assert!(accept(id).await);
    let first = engine.get_optimal_weights("saga", None).await.unwrap();
    assert!(first[&FeatureType::CoOccurrence] > FeatureType::CoOccurrence.default_weight());

    // enough new rows again, but the cooldown holds
    for n in 5..10 {
        let id = pending_suggestion(store.as_ref(), n).await;
        assert!(!accept(id).await);
    }
    assert_eq!(engine.get_optimal_weights("saga", None).await.unwrap(), first);

    tokio::time::advance(Duration::from_secs(3601)).await;
    let id = pending_suggestion(store.as_ref(), 10).await;
    assert!(accept(id).await);
    let second = engine.get_optimal_weights("saga", None).await.unwrap();
    assert!(second[&FeatureType::CoOccurrence] > first[&FeatureType::CoOccurrence]);
    assert!(second.values().all(|w| (0.0..=1.0).contains(w)));
}

#[tokio::test]
async fn test_reset_learning_on_sqlite_falls_back_to_defaults() {
    let stack = sqlite_stack().await;
    let engine = LearningEngine::new(
        stack.suggestions.clone(),
        stack.cache.clone(),
        LearningConfig::default(),
    );

    // suggestions reference real entities of the imported graph
    let pairs = [
        ("aria", "kael"),
        ("aria", "loner"),
        ("kael", "loner"),
        ("loner", "keep"),
        ("loner", "guild"),
    ];
    for (a, b) in pairs {
        let mut s = RelationshipSuggestion::new("saga", a, b, RelationshipKind::Ally);
        s.confidence = 85.0;
        let features = FeatureVector::new().with(FeatureType::CoOccurrence, 0.7);
        let snapshot = SuggestionFeature::snapshot(&s.id, &features, &default_weights());
        assert!(stack.suggestions.create_suggestion(&s, &snapshot).await.unwrap());
        engine
            .record_feedback(&s.id, FeedbackAction::Accept, "editor", FeedbackDetails::default())
            .await
            .unwrap();
    }
    assert!(!stack.suggestions.list_weights("saga").await.unwrap().is_empty());

    let removed = engine.reset_learning("saga").await.unwrap();
    assert!(removed > 0);
    assert_eq!(
        engine
            .get_optimal_weights("saga", Some(RelationshipKind::Ally))
            .await
            .unwrap(),
        default_weights()
    );
    assert_eq!(stack.suggestions.list_feedback("saga").await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_failed_feedback_write_leaves_suggestion_pending() {
    let stack = sqlite_stack().await;
    let engine = LearningEngine::new(
        stack.suggestions.clone(),
        stack.cache.clone(),
        LearningConfig::default(),
    );
    let id = pending_suggestion(stack.suggestions.as_ref(), 0).await;

    // take the feedback table away so the second write of the decision fails
    sqlx::query("ALTER TABLE suggestion_feedback RENAME TO suggestion_feedback_offline")
        .execute(&stack.pool)
        .await
        .unwrap();
    let err = engine
        .record_feedback(&id, FeedbackAction::Accept, "editor", FeedbackDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DatabaseError(_)));
    let untouched = stack.suggestions.get_suggestion(&id).await.unwrap().unwrap();
    assert_eq!(untouched.status, SuggestionStatus::Pending);

    sqlx::query("ALTER TABLE suggestion_feedback_offline RENAME TO suggestion_feedback")
        .execute(&stack.pool)
        .await
        .unwrap();
    engine
        .record_feedback(&id, FeedbackAction::Accept, "editor", FeedbackDetails::default())
        .await
        .unwrap();
    let decided = stack.suggestions.get_suggestion(&id).await.unwrap().unwrap();
    assert_eq!(decided.status, SuggestionStatus::Accepted);
    assert_eq!(stack.suggestions.list_feedback("saga").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reimport_preserves_learning_history() {
    let stack = sqlite_stack().await;
    let engine = LearningEngine::new(
        stack.suggestions.clone(),
        stack.cache.clone(),
        LearningConfig::default(),
    );
    for n in 0..5 {
        let id = pending_suggestion(stack.suggestions.as_ref(), n).await;
        engine
            .record_feedback(&id, FeedbackAction::Accept, "editor", FeedbackDetails::default())
            .await
            .unwrap();
    }
    let learned = engine.get_optimal_weights("saga", None).await.unwrap();
    assert_ne!(learned, default_weights());

    stack
        .graph
        .import(&GraphDocument::from_json(SAGA).unwrap())
        .await
        .unwrap();

    assert_eq!(stack.suggestions.list_feedback("saga").await.unwrap().len(), 5);
    assert_eq!(engine.get_optimal_weights("saga", None).await.unwrap(), learned);
}

#[tokio::test]
async fn test_scheduler_over_sqlite() {
    let stack = sqlite_stack().await;
    let config = Config::default();
    let predictor = Arc::new(RelationshipPredictor::new(
        stack.graph.clone(),
        stack.suggestions.clone(),
        config.features.clone(),
        config.prediction.clone(),
    ));
    let scheduler = BatchScheduler::new(
        stack.graph.clone(),
        predictor,
        stack.cache.clone(),
        SchedulerConfig {
            batch_size: 4,
            batch_pause_ms: 10,
            ..SchedulerConfig::default()
        },
    );

    assert!(scheduler.schedule_generation_job("saga").await.unwrap());
    let queued = scheduler.get_progress("saga").await.unwrap().unwrap();

    // a second schedule leaves the first job's record alone
    assert!(!scheduler.schedule_generation_job("saga").await.unwrap());
    let current = scheduler.get_progress("saga").await.unwrap().unwrap();
    assert_eq!(current.job_id, queued.job_id);

    scheduler.wait_idle().await;
    let done = scheduler.get_progress("saga").await.unwrap().unwrap();
    assert_eq!(done.job_id, queued.job_id);
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.total, 10);
    assert_eq!(done.processed, 10);
    let stored = stack.suggestions.list_suggestions("saga", None, 50).await.unwrap();
    assert_eq!(done.created, stored.len() as u64);
}
