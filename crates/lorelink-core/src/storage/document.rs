//! JSON interchange format for story graphs
//!
//! Graphs are owned by whatever editor produced them. A [`GraphDocument`] is
//! how one is handed to lorelink, either loaded into SQLite by the CLI or into
//! an [`InMemoryStore`](super::InMemoryStore).

use serde::{Deserialize, Serialize};

use crate::domain::{Entity, EntityType};
use crate::error::{Error, Result};

/// A complete story graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub relationships: Vec<EdgeRecord>,
    #[serde(default)]
    pub fragments: Vec<FragmentRecord>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub importance: Option<f64>,
}

/// A confirmed relationship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
}

/// A piece of story text and the entities it features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// A timeline event and its participants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub story_day: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

impl GraphDocument {
    /// Parse and validate a document
    pub fn from_json(json: &str) -> Result<Self> {
        let document: GraphDocument = serde_json::from_str(json)?;
        document.validate()?;
        Ok(document)
    }

    /// Entities as domain values
    pub fn domain_entities(&self) -> Vec<Entity> {
        self.entities
            .iter()
            .map(|record| {
                let entity = Entity::new(&record.id, &self.id, &record.name, record.entity_type);
                match record.importance {
                    Some(importance) => entity.with_importance(importance),
                    None => entity,
                }
            })
            .collect()
    }

    /// Check that every reference points at a declared entity
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("graph id must not be empty".to_string()));
        }

        let known: std::collections::HashSet<&str> =
            self.entities.iter().map(|e| e.id.as_str()).collect();
        if known.len() != self.entities.len() {
            return Err(Error::InvalidInput(format!(
                "graph '{}' declares duplicate entity ids",
                self.id
            )));
        }

        let check = |id: &str, context: &str| {
            if known.contains(id) {
                Ok(())
            } else {
                Err(Error::EntityNotFound(format!("{} (referenced by {})", id, context)))
            }
        };

        for edge in &self.relationships {
            check(&edge.source, "relationship")?;
            check(&edge.target, "relationship")?;
            if edge.source == edge.target {
                return Err(Error::InvalidPair(edge.source.clone()));
            }
        }
        for fragment in &self.fragments {
            for id in &fragment.entities {
                check(id, &format!("fragment {}", fragment.id))?;
            }
        }
        for event in &self.events {
            for id in &event.participants {
                check(id, &format!("event {}", event.id))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "id": "saga",
        "name": "The Long Saga",
        "entities": [
            {"id": "aria", "name": "Aria", "type": "character", "importance": 80},
            {"id": "guild", "name": "Silver Guild", "type": "faction"}
        ],
        "relationships": [{"source": "aria", "target": "guild", "type": "member_of"}],
        "fragments": [{"id": "f1", "text": "Aria joins the guild.", "entities": ["aria", "guild"]}],
        "events": [{"id": "ev1", "story_day": 3, "title": "Oath", "participants": ["aria"]}]
    }"#;

    #[test]
    fn test_parse_document() {
        let doc = GraphDocument::from_json(DOC).unwrap();
        assert_eq!(doc.entities.len(), 2);

        let entities = doc.domain_entities();
        assert_eq!(entities[0].graph_id, "saga");
        assert_eq!(entities[0].importance, Some(80.0));
        assert_eq!(entities[1].importance, None);
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let json = DOC.replace(r#""participants": ["aria"]"#, r#""participants": ["ghost"]"#);
        let err = GraphDocument::from_json(&json).unwrap_err();
        assert!(matches!(err, Error::EntityNotFound(_)));
    }

    #[test]
    fn test_self_edge_rejected() {
        let json = DOC.replace(r#""target": "guild""#, r#""target": "aria""#);
        let err = GraphDocument::from_json(&json).unwrap_err();
        assert!(matches!(err, Error::InvalidPair(_)));
    }
}
