//! Scores and explanations derived from a feature vector

use crate::domain::{
    EvidenceItem, FeatureType, FeatureVector, GenerationMethod, RelationshipKind, WeightTable,
};

/// Features cited in reasoning and evidence
const TOP_FEATURES: usize = 3;

/// Feature value that counts towards diversity in the priority score
const DIVERSITY_THRESHOLD: f64 = 0.5;

/// Weighted mean of the feature values, scaled to [0, 100]
///
/// Only features present in the vector contribute to the denominator. A
/// non-positive total weight yields 0.
pub fn confidence(features: &FeatureVector, weights: &WeightTable) -> f64 {
    let (weighted, total) = features
        .iter()
        .fold((0.0, 0.0), |(weighted, total), (feature, value)| {
            let weight = weight_for(weights, feature);
            (weighted + value * weight, total + weight)
        });

    if total <= 0.0 {
        return 0.0;
    }
    (100.0 * weighted / total).clamp(0.0, 100.0)
}

fn weight_for(weights: &WeightTable, feature: FeatureType) -> f64 {
    weights
        .get(&feature)
        .copied()
        .unwrap_or_else(|| feature.default_weight())
        .max(0.0)
}

/// Mean of the three strongest features as a percentage, 50 when empty
pub fn strength(features: &FeatureVector) -> u8 {
    let top = features.top(TOP_FEATURES);
    if top.is_empty() {
        return 50;
    }
    let mean = top.iter().map(|(_, v)| v).sum::<f64>() / top.len() as f64;
    (mean * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Display ordering score
pub fn priority(confidence: f64, strength: u8, features: &FeatureVector) -> f64 {
    let diversity = if features.is_empty() {
        0.0
    } else {
        features
            .iter()
            .filter(|(_, v)| *v >= DIVERSITY_THRESHOLD)
            .count() as f64
            / features.len() as f64
    };
    0.6 * confidence + 0.3 * f64::from(strength) + 10.0 * diversity
}

/// Which signal family produced the suggestion
pub fn method(features: &FeatureVector, semantic: bool, strong_threshold: f64) -> GenerationMethod {
    if semantic {
        return GenerationMethod::Semantic;
    }

    let mut families: Vec<GenerationMethod> = features
        .iter()
        .filter(|(_, v)| *v >= strong_threshold)
        .map(|(f, _)| GenerationMethod::family_of(f))
        .collect();
    families.sort_by_key(|m| m.as_str());
    families.dedup();

    if families.len() >= 2 {
        return GenerationMethod::Hybrid;
    }
    features
        .top(1)
        .first()
        .map(|(f, _)| GenerationMethod::family_of(*f))
        .unwrap_or(GenerationMethod::Hybrid)
}

/// The strongest non-zero features as evidence items
pub fn evidence(features: &FeatureVector) -> Vec<EvidenceItem> {
    features
        .top(TOP_FEATURES)
        .into_iter()
        .filter(|(_, value)| *value > 0.0)
        .map(|(feature, value)| EvidenceItem {
            feature,
            value,
            description: format!("{} ({:.0}%)", feature.describe(), value * 100.0),
        })
        .collect()
}

/// One-sentence explanation citing the strongest features
pub fn reasoning(
    source: &str,
    target: &str,
    kind: RelationshipKind,
    features: &FeatureVector,
    cite_threshold: f64,
) -> String {
    let cited: Vec<String> = features
        .top(TOP_FEATURES)
        .into_iter()
        .filter(|(_, value)| *value >= cite_threshold)
        .map(|(feature, value)| format!("{} ({:.0}%)", feature.describe(), value * 100.0))
        .collect();

    let body = match cited.as_slice() {
        [] => format!(
            "{} and {} show weak but consistent signals across {} features",
            source,
            target,
            features.len()
        ),
        [only] => format!("{} and {} {}", source, target, only),
        [init @ .., last] => format!("{} and {} {} and {}", source, target, init.join(", "), last),
    };

    format!("{}. Suggested relationship: {}.", body, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::default_weights;

    fn scenario() -> FeatureVector {
        FeatureVector::new()
            .with(FeatureType::CoOccurrence, 0.8)
            .with(FeatureType::SharedFaction, 0.9)
            .with(FeatureType::TimelineProximity, 0.2)
    }

    fn flat(weight: f64) -> WeightTable {
        FeatureType::all().iter().map(|f| (*f, weight)).collect()
    }

    #[test]
    fn test_confidence_formula() {
        let c = confidence(&scenario(), &flat(0.5));
        assert!((c - 100.0 * 0.95 / 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_zero_weight() {
        assert_eq!(confidence(&scenario(), &flat(0.0)), 0.0);
        assert_eq!(confidence(&FeatureVector::new(), &default_weights()), 0.0);
    }

    #[test]
    fn test_confidence_monotonic_in_each_feature() {
        let weights = default_weights();
        for feature in FeatureType::all() {
            let mut previous = -1.0;
            for step in 0..=10 {
                let features = scenario().with(*feature, step as f64 / 10.0);
                let c = confidence(&features, &weights);
                assert!(c >= previous, "{} not monotonic", feature);
                assert!((0.0..=100.0).contains(&c));
                previous = c;
            }
        }
    }

    #[test]
    fn test_strength() {
        assert_eq!(strength(&FeatureVector::new()), 50);
        // mean of 0.9, 0.8, 0.2
        assert_eq!(strength(&scenario()), 63);
        let one = FeatureVector::new().with(FeatureType::SharedLocation, 0.456);
        assert_eq!(strength(&one), 46);
    }

    #[test]
    fn test_priority_rises_with_confidence_and_strength() {
        let features = scenario();
        let base = priority(60.0, 50, &features);
        assert!(priority(70.0, 50, &features) > base);
        assert!(priority(60.0, 60, &features) > base);
        assert!((base - (36.0 + 15.0 + 10.0 * 2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_method() {
        assert_eq!(method(&scenario(), true, 0.6), GenerationMethod::Semantic);
        // content and attribute families are both strong
        assert_eq!(method(&scenario(), false, 0.6), GenerationMethod::Hybrid);

        let timeline = FeatureVector::new()
            .with(FeatureType::TimelineProximity, 0.7)
            .with(FeatureType::CoOccurrence, 0.3);
        assert_eq!(method(&timeline, false, 0.6), GenerationMethod::Timeline);

        let weak = FeatureVector::new().with(FeatureType::MentionFrequency, 0.2);
        assert_eq!(method(&weak, false, 0.6), GenerationMethod::Content);
    }

    #[test]
    fn test_evidence_skips_zero_values() {
        let features = FeatureVector::new()
            .with(FeatureType::SharedFaction, 1.0)
            .with(FeatureType::SharedLocation, 0.0);
        let items = evidence(&features);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].feature, FeatureType::SharedFaction);
        assert!(items[0].description.contains("100%"));
    }

    #[test]
    fn test_reasoning_cites_strong_features() {
        let text = reasoning("Aria", "Kael", RelationshipKind::Ally, &scenario(), 0.6);
        assert_eq!(
            text,
            "Aria and Kael belong to the same faction (90%) and appear together in the same scenes (80%). \
             Suggested relationship: ally."
        );
    }

    #[test]
    fn test_reasoning_fallback() {
        let features = FeatureVector::new()
            .with(FeatureType::CoOccurrence, 0.3)
            .with(FeatureType::NetworkCentrality, 0.1);
        let text = reasoning("Aria", "Kael", RelationshipKind::Rival, &features, 0.6);
        assert!(text.starts_with("Aria and Kael show weak but consistent signals across 2 features"));
        assert!(text.ends_with("Suggested relationship: rival."));
    }
}
