use chrono::{DateTime, Utc};
use thiserror::Error;

use stylematch_core::recommend::StoreError;

pub mod interaction;
pub mod memory;
pub mod product;
pub mod profile;

pub use interaction::SqlInteractionRepository;
pub use memory::{InMemoryCatalog, InMemoryInteractionLog, InMemoryProfileRepository};
pub use product::SqlProductRepository;
pub use profile::SqlProfileRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(e) => StoreError::Unavailable(e.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
        }
    }
}

pub(crate) fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid {column} `{raw}`: {e}")))
}

/// SQLite caps bound parameters per statement; larger id lists are chunked.
pub(crate) const MAX_BIND_CHUNK: usize = 500;
