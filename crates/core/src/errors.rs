use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown interaction outcome `{0}` (expected yes|no|view|click|favorite)")]
    InvalidOutcome(String),
    #[error("unknown style `{0}` (expected casual|street|mode|natural|classic|feminine)")]
    InvalidStyle(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Errors surfaced by engine operations. Reads never produce one: they
/// degrade instead. Only the interaction write path and profile building
/// return these.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable machine-readable class used in command payloads.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "invalid_input",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Whether retrying the same call can succeed without caller changes.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl From<crate::recommend::StoreError> for ApplicationError {
    fn from(value: crate::recommend::StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}
