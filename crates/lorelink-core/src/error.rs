//! Error types for Lorelink

use thiserror::Error;

/// Result type alias using Lorelink's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Lorelink error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors (E001-E099)
    #[error("Invalid pair: entity '{0}' cannot be related to itself.")]
    InvalidPair(String),

    #[error("Graph '{0}' not found. Run `lorelink graphs` to see all graphs.")]
    GraphNotFound(String),

    #[error("Entity '{0}' not found.")]
    EntityNotFound(String),

    #[error("Suggestion '{0}' not found. Run `lorelink suggestions <graph>` to list suggestions.")]
    SuggestionNotFound(String),

    #[error("Suggestion '{id}' is already {status}; only pending suggestions accept feedback.")]
    InvalidTransition { id: String, status: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Computation errors (E100-E199)
    #[error("Feature computation failed: {0}")]
    FeatureComputation(String),

    #[error("Relationship classifier failed: {0}")]
    ClassifierFailed(String),

    #[error("LLM API error: {0}. Check your API key with `echo $LORELINK_API_KEY`.")]
    LLMError(String),

    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    // Persistence errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Corrupt stored record: {0}")]
    CorruptRecord(String),

    // Rate limit errors (E500-E599)
    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    // Job errors (E600-E699)
    #[error("Generation job for graph '{graph_id}' failed: {message}")]
    JobFailed { graph_id: String, message: String },

    // Config errors (E700-E799)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification of errors, used by the batch loop to decide whether
/// a failure skips one pair or ends the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Computation,
    Persistence,
    RateLimit,
    Job,
    Config,
    Other,
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPair(_) => "E001",
            Self::GraphNotFound(_) => "E002",
            Self::EntityNotFound(_) => "E003",
            Self::SuggestionNotFound(_) => "E004",
            Self::InvalidTransition { .. } => "E005",
            Self::InvalidInput(_) => "E006",
            Self::FeatureComputation(_) => "E100",
            Self::ClassifierFailed(_) => "E101",
            Self::LLMError(_) => "E102",
            Self::NetworkError(_) => "E103",
            Self::DatabaseError(_) => "E400",
            Self::Serialization(_) => "E401",
            Self::CacheError(_) => "E402",
            Self::CorruptRecord(_) => "E403",
            Self::RateLimited(_) => "E500",
            Self::JobFailed { .. } => "E600",
            Self::ConfigError(_) => "E700",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::GraphNotFound(_) => Some("lorelink graphs".to_string()),
            Self::SuggestionNotFound(_) => Some("lorelink suggestions <graph>".to_string()),
            Self::LLMError(_) => Some("export LORELINK_API_KEY=<key>".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::JobFailed { graph_id, .. } => Some(format!("lorelink progress {}", graph_id)),
            Self::ConfigError(_) => Some("lorelink config show".to_string()),
            _ => None,
        }
    }

    /// Which part of the error taxonomy this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidPair(_)
            | Self::GraphNotFound(_)
            | Self::EntityNotFound(_)
            | Self::SuggestionNotFound(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidInput(_) => ErrorCategory::Validation,
            Self::FeatureComputation(_)
            | Self::ClassifierFailed(_)
            | Self::LLMError(_)
            | Self::NetworkError(_) => ErrorCategory::Computation,
            Self::DatabaseError(_)
            | Self::Serialization(_)
            | Self::CacheError(_)
            | Self::CorruptRecord(_) => ErrorCategory::Persistence,
            Self::RateLimited(_) => ErrorCategory::RateLimit,
            Self::JobFailed { .. } => ErrorCategory::Job,
            Self::ConfigError(_) => ErrorCategory::Config,
            Self::Other(_) | Self::Io(_) => ErrorCategory::Other,
        }
    }

    /// Whether a batch may skip the failing pair and carry on
    pub fn is_pair_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::Computation | ErrorCategory::Persistence
        )
    }
}
