use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::errors::DomainError;

/// What the user did with a product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Yes,
    No,
    View,
    Click,
    Favorite,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::View => "view",
            Self::Click => "click",
            Self::Favorite => "favorite",
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Yes | Self::Click | Self::Favorite)
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Self::No)
    }

    /// Explicit swipe answers; views and clicks are passive.
    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Yes | Self::No)
    }
}

impl std::str::FromStr for Outcome {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "like" => Ok(Self::Yes),
            "no" | "dislike" => Ok(Self::No),
            "view" => Ok(Self::View),
            "click" => Ok(Self::Click),
            "favorite" | "favourite" => Ok(Self::Favorite),
            other => Err(DomainError::InvalidOutcome(other.to_string())),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only interaction record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: String,
    pub product_id: ProductId,
    pub outcome: Outcome,
    pub occurred_at: DateTime<Utc>,
    pub response_time_ms: Option<u32>,
}

impl Interaction {
    pub fn new(
        user_id: impl Into<String>,
        product_id: impl Into<String>,
        outcome: Outcome,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            product_id: ProductId::new(product_id),
            outcome,
            occurred_at,
            response_time_ms: None,
        }
    }

    pub fn with_response_time(mut self, millis: u32) -> Self {
        self.response_time_ms = Some(millis);
        self
    }
}
