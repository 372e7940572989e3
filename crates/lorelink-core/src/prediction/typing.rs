//! Relationship typing
//!
//! A suggestion's type comes from an ordered list of [`TypeRule`]s. The first
//! rule that matches wins. A rule can also flag the pair as ambiguous, in which
//! case the optional [`TypeClassifier`] gets a say before the rule's fallback
//! is used.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::PredictionConfig;
use crate::domain::{Entity, EntityType, FeatureType, FeatureVector, RelationshipKind};
use crate::error::Result;

/// External collaborator that can name the relationship between two entities
#[async_trait]
pub trait TypeClassifier: Send + Sync {
    /// `Ok(None)` means the classifier had no usable answer
    async fn classify(
        &self,
        a: &Entity,
        b: &Entity,
        features: &FeatureVector,
    ) -> Result<Option<RelationshipKind>>;
}

/// One step of the typing cascade
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRule {
    /// The two entity types, in either order, imply a kind
    EntityTypes {
        first: EntityType,
        second: EntityType,
        kind: RelationshipKind,
    },
    /// A single feature at or above a threshold implies a kind
    FeatureAtLeast {
        feature: FeatureType,
        threshold: f64,
        kind: RelationshipKind,
    },
    /// Strong co-occurrence and timeline overlap say the entities are close
    /// without saying how
    Ambiguous {
        threshold: f64,
        fallback: RelationshipKind,
    },
}

/// Result of evaluating one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    Resolved(RelationshipKind),
    Ambiguous(RelationshipKind),
}

impl TypeRule {
    pub fn evaluate(&self, a: &Entity, b: &Entity, features: &FeatureVector) -> Option<RuleMatch> {
        match self {
            Self::EntityTypes {
                first,
                second,
                kind,
            } => {
                let (x, y) = (a.entity_type, b.entity_type);
                ((x == *first && y == *second) || (x == *second && y == *first))
                    .then_some(RuleMatch::Resolved(*kind))
            }
            Self::FeatureAtLeast {
                feature,
                threshold,
                kind,
            } => (features.value(*feature) >= *threshold).then_some(RuleMatch::Resolved(*kind)),
            Self::Ambiguous {
                threshold,
                fallback,
            } => (features.value(FeatureType::CoOccurrence) >= *threshold
                && features.value(FeatureType::TimelineProximity) >= *threshold)
                .then_some(RuleMatch::Ambiguous(*fallback)),
        }
    }

    /// The rules used unless a caller supplies its own
    pub fn default_cascade(config: &PredictionConfig) -> Vec<TypeRule> {
        use EntityType::*;

        let mut rules: Vec<TypeRule> = [
            (Character, Faction, RelationshipKind::MemberOf),
            (Character, Location, RelationshipKind::LocatedAt),
            (Character, Event, RelationshipKind::ParticipatedIn),
            (Event, Location, RelationshipKind::OccurredAt),
        ]
        .into_iter()
        .map(|(first, second, kind)| TypeRule::EntityTypes {
            first,
            second,
            kind,
        })
        .collect();

        rules.push(TypeRule::FeatureAtLeast {
            feature: FeatureType::SharedFaction,
            threshold: config.faction_ally_threshold,
            kind: RelationshipKind::Ally,
        });
        rules.push(TypeRule::Ambiguous {
            threshold: config.ambiguity_threshold,
            fallback: RelationshipKind::Ally,
        });
        rules
    }
}

/// The type chosen for a pair and whether the classifier chose it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDecision {
    pub kind: RelationshipKind,
    pub semantic: bool,
}

/// Runs the rule cascade and, for ambiguous pairs, the classifier
#[derive(Clone)]
pub struct TypeResolver {
    rules: Vec<TypeRule>,
    default_kind: RelationshipKind,
    classifier: Option<Arc<dyn TypeClassifier>>,
}

impl TypeResolver {
    pub fn new(rules: Vec<TypeRule>, default_kind: RelationshipKind) -> Self {
        Self {
            rules,
            default_kind,
            classifier: None,
        }
    }

    pub fn from_config(config: &PredictionConfig) -> Self {
        Self::new(TypeRule::default_cascade(config), config.default_kind())
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TypeClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_rules(mut self, rules: Vec<TypeRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &[TypeRule] {
        &self.rules
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    /// First matching rule, or the default kind
    pub fn evaluate_rules(&self, a: &Entity, b: &Entity, features: &FeatureVector) -> RuleMatch {
        self.rules
            .iter()
            .find_map(|rule| rule.evaluate(a, b, features))
            .unwrap_or(RuleMatch::Resolved(self.default_kind))
    }

    /// Decide the relationship type for a pair
    ///
    /// Classifier failures are logged and never surface to the caller.
    pub async fn resolve(&self, a: &Entity, b: &Entity, features: &FeatureVector) -> TypeDecision {
        let fallback = match self.evaluate_rules(a, b, features) {
            RuleMatch::Resolved(kind) => {
                return TypeDecision {
                    kind,
                    semantic: false,
                };
            }
            RuleMatch::Ambiguous(fallback) => fallback,
        };

        let Some(classifier) = &self.classifier else {
            return TypeDecision {
                kind: fallback,
                semantic: false,
            };
        };

        match classifier.classify(a, b, features).await {
            Ok(Some(kind)) => {
                debug!(source = %a.id, target = %b.id, kind = %kind, "Classifier resolved ambiguous pair");
                TypeDecision {
                    kind,
                    semantic: true,
                }
            }
            Ok(None) => TypeDecision {
                kind: fallback,
                semantic: false,
            },
            Err(e) => {
                warn!(
                    source = %a.id,
                    target = %b.id,
                    error = %e,
                    "Relationship classifier failed, using rule fallback"
                );
                TypeDecision {
                    kind: fallback,
                    semantic: false,
                }
            }
        }
    }
}

impl std::fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeResolver")
            .field("rules", &self.rules.len())
            .field("default_kind", &self.default_kind)
            .field("classifier", &self.classifier.is_some())
            .finish()
    }
}
