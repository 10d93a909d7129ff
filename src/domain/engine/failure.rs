//! Adapter failure taxonomy.
//!
//! Failures of the completion-service adapters are always recovered
//! locally by substituting a deterministic fallback; this type records
//! which class of failure forced the substitution.

use crate::ports::AiError;

/// Why an adapter call fell back to its deterministic result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterFailure {
    /// Network failure or hard-deadline expiry talking to the service.
    Transport(String),
    /// The response body was not the expected structured document.
    Parse(String),
    /// The document parsed but violated the declared schema (missing
    /// fields, out-of-enum values, out-of-range numbers).
    Schema(String),
}

impl AdapterFailure {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse(reason.into())
    }

    pub fn schema(reason: impl Into<String>) -> Self {
        Self::Schema(reason.into())
    }
}

impl std::fmt::Display for AdapterFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(reason) => write!(f, "transport: {}", reason),
            Self::Parse(reason) => write!(f, "parse: {}", reason),
            Self::Schema(reason) => write!(f, "schema: {}", reason),
        }
    }
}

impl From<AiError> for AdapterFailure {
    fn from(err: AiError) -> Self {
        match err {
            AiError::Parse(reason) => Self::Parse(reason),
            other => Self::Transport(other.to_string()),
        }
    }
}
