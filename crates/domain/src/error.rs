//! Error classification shared across the domain.

use thiserror::Error;

/// Broad category of a failure.
///
/// Callers decide whether to retry purely from this value: only
/// infrastructure failures can succeed on a later attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range input, or an illegal state transition.
    Validation,
    /// A referenced aggregate does not exist.
    NotFound,
    /// The request conflicts with existing state.
    Conflict,
    /// Storage, broker or other transient failure.
    Infrastructure,
}

impl ErrorKind {
    /// Returns true if an operation failing with this kind may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Infrastructure)
    }

    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Infrastructure => "Infrastructure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A wire value that does not map to any variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
