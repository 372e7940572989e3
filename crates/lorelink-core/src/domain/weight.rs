//! Learned feature weights

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::feature::FeatureType;
use super::suggestion::RelationshipKind;

/// Learned weight for one feature of one graph
///
/// `relationship_type` is `None` for the graph-wide table and set for the
/// per-type tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningWeight {
    pub graph_id: String,
    pub feature: FeatureType,
    pub relationship_type: Option<RelationshipKind>,
    /// Weight (0.0 to 1.0)
    pub weight: f64,
    /// Share of decisive feedback the model got right, as a percentage
    pub accuracy_score: f64,
    pub sample_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl LearningWeight {
    /// A weight seeded with the feature's default
    pub fn seeded(
        graph_id: impl Into<String>,
        feature: FeatureType,
        relationship_type: Option<RelationshipKind>,
    ) -> Self {
        Self {
            graph_id: graph_id.into(),
            feature,
            relationship_type,
            weight: feature.default_weight(),
            accuracy_score: 0.0,
            sample_count: 0,
            updated_at: Utc::now(),
        }
    }

    /// Move the weight by `delta`, keeping it inside [0, 1]
    pub fn adjust(&mut self, delta: f64) {
        let next = self.weight + delta;
        self.weight = if next.is_nan() { self.weight } else { next.clamp(0.0, 1.0) };
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_weight() {
        let w = LearningWeight::seeded("saga", FeatureType::SharedFaction, None);
        assert_eq!(w.weight, FeatureType::SharedFaction.default_weight());
        assert_eq!(w.sample_count, 0);
    }

    #[test]
    fn test_adjust_clamps() {
        let mut w = LearningWeight::seeded("saga", FeatureType::CoOccurrence, None);
        w.adjust(5.0);
        assert_eq!(w.weight, 1.0);
        w.adjust(-7.0);
        assert_eq!(w.weight, 0.0);
        w.adjust(f64::NAN);
        assert_eq!(w.weight, 0.0);
    }
}
