//! Feature types and feature vectors
//!
//! A feature is a normalized signal in [0, 1] describing one dimension of
//! similarity or co-occurrence between two entities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The fixed set of pair features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    CoOccurrence,
    TimelineProximity,
    AttributeSimilarity,
    SharedLocation,
    SharedFaction,
    NetworkCentrality,
    MentionFrequency,
}

impl FeatureType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoOccurrence => "co_occurrence",
            Self::TimelineProximity => "timeline_proximity",
            Self::AttributeSimilarity => "attribute_similarity",
            Self::SharedLocation => "shared_location",
            Self::SharedFaction => "shared_faction",
            Self::NetworkCentrality => "network_centrality",
            Self::MentionFrequency => "mention_frequency",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "co_occurrence" | "cooccurrence" => Some(Self::CoOccurrence),
            "timeline_proximity" => Some(Self::TimelineProximity),
            "attribute_similarity" => Some(Self::AttributeSimilarity),
            "shared_location" => Some(Self::SharedLocation),
            "shared_faction" => Some(Self::SharedFaction),
            "network_centrality" => Some(Self::NetworkCentrality),
            "mention_frequency" => Some(Self::MentionFrequency),
            _ => None,
        }
    }

    /// Get all feature types
    pub fn all() -> &'static [FeatureType] {
        &[
            Self::CoOccurrence,
            Self::TimelineProximity,
            Self::AttributeSimilarity,
            Self::SharedLocation,
            Self::SharedFaction,
            Self::NetworkCentrality,
            Self::MentionFrequency,
        ]
    }

    /// Weight a feature starts with before any feedback has been learned
    pub fn default_weight(&self) -> f64 {
        match self {
            Self::CoOccurrence => 0.8,
            Self::TimelineProximity => 0.6,
            Self::AttributeSimilarity => 0.4,
            Self::SharedLocation => 0.5,
            Self::SharedFaction => 0.7,
            Self::NetworkCentrality => 0.3,
            Self::MentionFrequency => 0.6,
        }
    }

    /// Short phrase used when citing this feature in reasoning text
    pub fn describe(&self) -> &'static str {
        match self {
            Self::CoOccurrence => "appear together in the same scenes",
            Self::TimelineProximity => "are present at the same moments of the timeline",
            Self::AttributeSimilarity => "have similar attributes",
            Self::SharedLocation => "frequent the same locations",
            Self::SharedFaction => "belong to the same faction",
            Self::NetworkCentrality => "are both well connected in the story",
            Self::MentionFrequency => "are often mentioned together",
        }
    }
}

impl std::fmt::Display for FeatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Feature values for one entity pair
///
/// Values are sanitized on insert: NaN becomes 0 and everything else is
/// clamped to [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<FeatureType, f64>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, sanitizing it into [0, 1]
    pub fn insert(&mut self, feature: FeatureType, value: f64) {
        self.0.insert(feature, sanitize(value));
    }

    /// Builder-style insert
    pub fn with(mut self, feature: FeatureType, value: f64) -> Self {
        self.insert(feature, value);
        self
    }

    pub fn get(&self, feature: FeatureType) -> Option<f64> {
        self.0.get(&feature).copied()
    }

    /// Value of a feature, or 0 when absent
    pub fn value(&self, feature: FeatureType) -> f64 {
        self.get(feature).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureType, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Features sorted by value, highest first; ties keep enum order
    pub fn ranked(&self) -> Vec<(FeatureType, f64)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }

    /// The `n` strongest features
    pub fn top(&self, n: usize) -> Vec<(FeatureType, f64)> {
        let mut ranked = self.ranked();
        ranked.truncate(n);
        ranked
    }
}

impl FromIterator<(FeatureType, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (FeatureType, f64)>>(iter: I) -> Self {
        let mut vector = FeatureVector::new();
        for (feature, value) in iter {
            vector.insert(feature, value);
        }
        vector
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Weight table keyed by feature type
pub type WeightTable = BTreeMap<FeatureType, f64>;

/// The type-specific default weights for every feature
pub fn default_weights() -> WeightTable {
    FeatureType::all()
        .iter()
        .map(|f| (*f, f.default_weight()))
        .collect()
}
