//! User feedback on suggestions
//!
//! Feedback rows are append-only. They are the training signal for the
//! learning engine and carry the full feature snapshot taken at decision time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::suggestion::{RelationshipKind, SuggestionFeature, SuggestionStatus};

/// Decision a user took on a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackAction {
    Accept,
    Reject,
    Modify,
    Dismiss,
}

impl FeedbackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Modify => "modify",
            Self::Dismiss => "dismiss",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "accept" | "accepted" => Some(Self::Accept),
            "reject" | "rejected" => Some(Self::Reject),
            "modify" | "modified" => Some(Self::Modify),
            "dismiss" | "dismissed" => Some(Self::Dismiss),
            _ => None,
        }
    }

    /// Status the suggestion moves to once this action is applied
    pub fn resulting_status(&self) -> SuggestionStatus {
        match self {
            Self::Accept => SuggestionStatus::Accepted,
            Self::Reject => SuggestionStatus::Rejected,
            Self::Modify => SuggestionStatus::Modified,
            Self::Dismiss => SuggestionStatus::Dismissed,
        }
    }

    /// How strongly this action counts as a training signal
    pub fn learning_value(&self) -> f64 {
        match self {
            Self::Accept | Self::Reject => 1.0,
            Self::Modify => 0.5,
            Self::Dismiss => 0.0,
        }
    }

    /// Whether the user confirmed that some relationship exists
    pub fn confirms_relationship(&self) -> Option<bool> {
        match self {
            Self::Accept | Self::Modify => Some(true),
            Self::Reject => Some(false),
            Self::Dismiss => None,
        }
    }
}

impl std::fmt::Display for FeedbackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Optional details a user can attach to a decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackDetails {
    pub corrected_type: Option<RelationshipKind>,
    pub corrected_strength: Option<u8>,
    pub explanation: Option<String>,
}

impl FeedbackDetails {
    pub fn with_corrected_type(mut self, kind: RelationshipKind) -> Self {
        self.corrected_type = Some(kind);
        self
    }

    pub fn with_corrected_strength(mut self, strength: u8) -> Self {
        self.corrected_strength = Some(strength.min(100));
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

/// One recorded user decision against one suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionFeedback {
    pub id: String,
    pub suggestion_id: String,
    pub graph_id: String,
    pub user_id: String,
    pub action: FeedbackAction,
    /// Type the suggestion carried when the decision was taken
    pub suggested_type: RelationshipKind,
    pub details: FeedbackDetails,
    /// Confidence of the suggestion at decision time
    pub confidence_at_decision: f64,
    /// Feature values and weights at decision time
    pub feature_snapshot: Vec<SuggestionFeature>,
    pub time_to_decision_secs: i64,
    pub created_at: DateTime<Utc>,
}

impl SuggestionFeedback {
    pub fn new(
        suggestion_id: impl Into<String>,
        graph_id: impl Into<String>,
        user_id: impl Into<String>,
        action: FeedbackAction,
        suggested_type: RelationshipKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            suggestion_id: suggestion_id.into(),
            graph_id: graph_id.into(),
            user_id: user_id.into(),
            action,
            suggested_type,
            details: FeedbackDetails::default(),
            confidence_at_decision: 0.0,
            feature_snapshot: Vec::new(),
            time_to_decision_secs: 0,
            created_at: Utc::now(),
        }
    }
}
