use thiserror::Error;

/// Errors raised while constructing a Suggestion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SuggestionError {
    #[error("confidence must lie in [0.0, 1.0], got {0}")]
    ConfidenceOutOfRange(f64),

    #[error("action kind must not be empty")]
    EmptyActionKind,

    #[error("evidence metric must not be empty")]
    EmptyMetric,

    /// NaN and infinities have no JSON form and cannot be recorded.
    #[error("evidence {field} must be finite, got {value}")]
    NonFiniteEvidence { field: &'static str, value: f64 },
}
