//! Relationship-type classifier backed by a chat model
//!
//! Only consulted for pairs the rule cascade finds ambiguous. The model is
//! asked for a single relationship type; anything it answers outside the
//! known vocabulary is treated as "no answer".

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Entity, FeatureVector, RelationshipKind};
use crate::error::{Error, Result};
use crate::prediction::TypeClassifier;

use super::client::LlmClient;
use super::types::Message;

/// [`TypeClassifier`] that asks an OpenRouter model
#[derive(Debug, Clone)]
pub struct LlmTypeClassifier {
    client: LlmClient,
}

impl LlmTypeClassifier {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TypeClassifier for LlmTypeClassifier {
    async fn classify(
        &self,
        a: &Entity,
        b: &Entity,
        features: &FeatureVector,
    ) -> Result<Option<RelationshipKind>> {
        let answer = self
            .client
            .ask(&build_messages(a, b, features))
            .await
            .map_err(|e| Error::ClassifierFailed(e.to_string()))?;

        let kind = parse_answer(&answer.text);
        debug!(
            source = %a.id,
            target = %b.id,
            model = %answer.model,
            answer = %answer.text.trim(),
            parsed = ?kind,
            "Classifier answered"
        );
        Ok(kind)
    }
}

fn build_messages(a: &Entity, b: &Entity, features: &FeatureVector) -> Vec<Message> {
    let vocabulary: Vec<&str> = RelationshipKind::all()
        .iter()
        .filter(|k| k.is_interpersonal() || **k == RelationshipKind::RelatedTo)
        .map(|k| k.as_str())
        .collect();

    let system = format!(
        "You classify relationships between entities of a fictional story. \
         Answer with exactly one of: {}. Answer `unknown` if the evidence is insufficient.",
        vocabulary.join(", ")
    );

    let signals: Vec<String> = features
        .ranked()
        .into_iter()
        .map(|(feature, value)| format!("- {}: {:.2}", feature, value))
        .collect();

    let user = format!(
        "Entity A: {} ({})\nEntity B: {} ({})\nSignals (0 to 1):\n{}\n\nWhat is the relationship between A and B?",
        a.name,
        a.entity_type,
        b.name,
        b.entity_type,
        signals.join("\n")
    );

    vec![Message::system(system), Message::user(user)]
}

/// Read a relationship type out of a model answer
fn parse_answer(content: &str) -> Option<RelationshipKind> {
    let first_line = content.lines().map(str::trim).find(|l| !l.is_empty())?;
    RelationshipKind::parse(first_line).or_else(|| {
        first_line
            .split_whitespace()
            .next()
            .and_then(RelationshipKind::parse)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::domain::{EntityType, FeatureType};
    use crate::llm::MessageRole;

    fn pair() -> (Entity, Entity) {
        (
            Entity::new("aria", "saga", "Aria", EntityType::Character),
            Entity::new("kael", "saga", "Kael", EntityType::Character),
        )
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("rival"), Some(RelationshipKind::Rival));
        assert_eq!(parse_answer("  Mentor.\n"), Some(RelationshipKind::Mentor));
        assert_eq!(parse_answer("\n\nenemy\nbecause of the siege"), Some(RelationshipKind::Enemy));
        assert_eq!(parse_answer("Family - they are siblings"), Some(RelationshipKind::Family));
        assert_eq!(parse_answer("unknown"), None);
        assert_eq!(parse_answer("I cannot tell"), None);
        assert_eq!(parse_answer(""), None);
    }

    #[test]
    fn test_prompt_carries_entities_and_signals() {
        let (a, b) = pair();
        let features = FeatureVector::new()
            .with(FeatureType::CoOccurrence, 0.9)
            .with(FeatureType::TimelineProximity, 0.75);

        let messages = build_messages(&a, &b, &features);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.contains("rival"));
        assert!(!messages[0].content.contains("located_at"));

        let user = &messages[1].content;
        assert!(user.contains("Entity A: Aria (character)"));
        assert!(user.contains("- co_occurrence: 0.90"));
        assert!(user.contains("- timeline_proximity: 0.75"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_classifier_failure() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let client = LlmClient::new(config, "test-key").unwrap();
        let classifier = LlmTypeClassifier::new(client);
        let (a, b) = pair();

        let err = classifier
            .classify(&a, &b, &FeatureVector::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ClassifierFailed(_)));
    }
}
