//! Relationship suggestions
//!
//! A suggestion is a proposed, not-yet-confirmed relationship between two
//! entities, together with the evidence that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::feature::{FeatureType, FeatureVector, WeightTable};

/// Relationship vocabulary for suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Ally,
    Enemy,
    Rival,
    Mentor,
    Family,
    Romantic,
    MemberOf,
    LocatedAt,
    ParticipatedIn,
    OccurredAt,
    RelatedTo,
}

impl RelationshipKind {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ally => "ally",
            Self::Enemy => "enemy",
            Self::Rival => "rival",
            Self::Mentor => "mentor",
            Self::Family => "family",
            Self::Romantic => "romantic",
            Self::MemberOf => "member_of",
            Self::LocatedAt => "located_at",
            Self::ParticipatedIn => "participated_in",
            Self::OccurredAt => "occurred_at",
            Self::RelatedTo => "related_to",
        }
    }

    /// Parse from string, tolerating the spellings a language model produces
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
            .to_lowercase()
            .replace([' ', '-'], "_");
        match normalized.as_str() {
            "ally" | "allies" | "friend" | "friends" => Some(Self::Ally),
            "enemy" | "enemies" | "nemesis" => Some(Self::Enemy),
            "rival" | "rivals" => Some(Self::Rival),
            "mentor" | "teacher" => Some(Self::Mentor),
            "family" | "sibling" | "parent" | "child" => Some(Self::Family),
            "romantic" | "lover" | "lovers" | "spouse" => Some(Self::Romantic),
            "member_of" | "memberof" => Some(Self::MemberOf),
            "located_at" | "locatedat" | "lives_in" => Some(Self::LocatedAt),
            "participated_in" | "participatedin" => Some(Self::ParticipatedIn),
            "occurred_at" | "occurredat" => Some(Self::OccurredAt),
            "related_to" | "relatedto" | "related" => Some(Self::RelatedTo),
            _ => None,
        }
    }

    /// Get all relationship kinds
    pub fn all() -> &'static [RelationshipKind] {
        &[
            Self::Ally,
            Self::Enemy,
            Self::Rival,
            Self::Mentor,
            Self::Family,
            Self::Romantic,
            Self::MemberOf,
            Self::LocatedAt,
            Self::ParticipatedIn,
            Self::OccurredAt,
            Self::RelatedTo,
        ]
    }

    /// Kinds that only make sense between two characters
    pub fn is_interpersonal(&self) -> bool {
        matches!(
            self,
            Self::Ally | Self::Enemy | Self::Rival | Self::Mentor | Self::Family | Self::Romantic
        )
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a suggestion
///
/// `Pending` is the only non-terminal state. `AutoAccepted` is only set at
/// creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
    Modified,
    Dismissed,
    AutoAccepted,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Modified => "modified",
            Self::Dismissed => "dismissed",
            Self::AutoAccepted => "auto_accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "modified" => Some(Self::Modified),
            "dismissed" => Some(Self::Dismissed),
            "auto_accepted" | "autoaccepted" => Some(Self::AutoAccepted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which family of signals produced a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    Content,
    Timeline,
    Attribute,
    Semantic,
    Hybrid,
}

impl GenerationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Timeline => "timeline",
            Self::Attribute => "attribute",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "content" => Some(Self::Content),
            "timeline" => Some(Self::Timeline),
            "attribute" => Some(Self::Attribute),
            "semantic" => Some(Self::Semantic),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    /// The signal family a single feature belongs to
    pub fn family_of(feature: FeatureType) -> Self {
        match feature {
            FeatureType::CoOccurrence | FeatureType::MentionFrequency => Self::Content,
            FeatureType::TimelineProximity => Self::Timeline,
            FeatureType::AttributeSimilarity
            | FeatureType::SharedLocation
            | FeatureType::SharedFaction
            | FeatureType::NetworkCentrality => Self::Attribute,
        }
    }
}

impl std::fmt::Display for GenerationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One supporting signal for a suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub feature: FeatureType,
    pub value: f64,
    pub description: String,
}

/// A proposed relationship between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSuggestion {
    pub id: String,
    pub graph_id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub suggested_type: RelationshipKind,
    /// Confidence score (0 to 100)
    pub confidence: f64,
    /// Estimated relationship strength (0 to 100)
    pub strength: u8,
    pub reasoning: String,
    pub evidence: Vec<EvidenceItem>,
    pub method: GenerationMethod,
    pub status: SuggestionStatus,
    /// Display ordering only
    pub priority_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelationshipSuggestion {
    /// Create a pending suggestion for an ordered pair
    pub fn new(
        graph_id: impl Into<String>,
        source_entity_id: impl Into<String>,
        target_entity_id: impl Into<String>,
        suggested_type: RelationshipKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            graph_id: graph_id.into(),
            source_entity_id: source_entity_id.into(),
            target_entity_id: target_entity_id.into(),
            suggested_type,
            confidence: 0.0,
            strength: 50,
            reasoning: String::new(),
            evidence: Vec::new(),
            method: GenerationMethod::Hybrid,
            status: SuggestionStatus::Pending,
            priority_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The pair with the lexicographically smaller id first
    pub fn unordered_pair(&self) -> (&str, &str) {
        unordered_pair(&self.source_entity_id, &self.target_entity_id)
    }

    /// Whether this suggestion concerns the given pair, in either direction
    pub fn involves_pair(&self, a: &str, b: &str) -> bool {
        self.unordered_pair() == unordered_pair(a, b)
    }
}

/// Order two ids so a pair has one canonical key regardless of direction
pub fn unordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Feature value and weight in effect when a suggestion was generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionFeature {
    pub suggestion_id: String,
    pub feature: FeatureType,
    pub value: f64,
    pub weight: f64,
}

impl SuggestionFeature {
    /// Snapshot every feature of a vector with the weights used to score it
    pub fn snapshot(
        suggestion_id: &str,
        features: &FeatureVector,
        weights: &WeightTable,
    ) -> Vec<SuggestionFeature> {
        features
            .iter()
            .map(|(feature, value)| SuggestionFeature {
                suggestion_id: suggestion_id.to_string(),
                feature,
                value,
                weight: weights
                    .get(&feature)
                    .copied()
                    .unwrap_or_else(|| feature.default_weight()),
            })
            .collect()
    }
}
