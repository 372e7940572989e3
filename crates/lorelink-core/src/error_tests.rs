//! Error module tests

use crate::error::{Error, ErrorCategory};

#[test]
fn test_invalid_pair_error() {
    let error = Error::InvalidPair("hero".to_string());
    assert_eq!(error.code(), "E001");
    assert_eq!(error.suggestion(), None);
    assert_eq!(error.category(), ErrorCategory::Validation);
    assert!(error.to_string().contains("hero"));
}

#[test]
fn test_graph_not_found_error() {
    let error = Error::GraphNotFound("saga-1".to_string());
    assert_eq!(error.code(), "E002");
    assert_eq!(error.suggestion(), Some("lorelink graphs".to_string()));
    assert!(error.to_string().contains("saga-1"));
}

#[test]
fn test_invalid_transition_error() {
    let error = Error::InvalidTransition {
        id: "s-1".to_string(),
        status: "accepted".to_string(),
    };
    assert_eq!(error.code(), "E005");
    assert_eq!(error.category(), ErrorCategory::Validation);
    assert!(error.to_string().contains("accepted"));
}

#[test]
fn test_computation_errors_are_recoverable() {
    assert!(Error::FeatureComputation("query failed".into()).is_pair_recoverable());
    assert!(Error::ClassifierFailed("timeout".into()).is_pair_recoverable());
    assert!(Error::LLMError("bad model".into()).is_pair_recoverable());
}

#[test]
fn test_persistence_errors_are_recoverable() {
    let error = Error::CacheError("poisoned".into());
    assert_eq!(error.code(), "E402");
    assert_eq!(error.category(), ErrorCategory::Persistence);
    assert!(error.is_pair_recoverable());
}

#[test]
fn test_corrupt_record_error() {
    let error = Error::CorruptRecord("bad created_at 'yesterday'".into());
    assert_eq!(error.code(), "E403");
    assert_eq!(error.category(), ErrorCategory::Persistence);
    assert!(error.to_string().contains("yesterday"));
}

#[test]
fn test_job_failed_error() {
    let error = Error::JobFailed {
        graph_id: "saga-7".to_string(),
        message: "store offline".to_string(),
    };
    assert_eq!(error.code(), "E600");
    assert_eq!(error.suggestion(), Some("lorelink progress saga-7".to_string()));
    assert!(!error.is_pair_recoverable());
}

#[test]
fn test_rate_limited_error() {
    let error = Error::RateLimited(30);
    assert_eq!(error.code(), "E500");
    assert_eq!(error.category(), ErrorCategory::RateLimit);
    assert!(error.to_string().contains("30"));
}

#[test]
fn test_config_error() {
    let error = Error::ConfigError("batch_size must be positive".to_string());
    assert_eq!(error.code(), "E700");
    assert!(!error.is_pair_recoverable());
}

#[test]
fn test_serialization_error_from() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_err.into();
    assert_eq!(error.code(), "E401");
}

#[test]
fn test_io_error_from() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error: Error = io_err.into();
    assert_eq!(error.code(), "E9999");
    assert_eq!(error.category(), ErrorCategory::Other);
}
