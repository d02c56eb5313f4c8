use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Leading marker of every response text that stands in for a failed query.
pub const ERROR_PREFIX: &str = "[error] ";

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A user-supplied score in `MIN_RATING..=MAX_RATING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: i64) -> Result<Self> {
        if (i64::from(MIN_RATING)..=i64::from(MAX_RATING)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(Error::Validation(format!(
                "rating {value} is outside {MIN_RATING}..={MAX_RATING}"
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// Outcome of one model query. Both variants end up as plain text in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    Answer(String),
    Failed(String),
}

impl ModelReply {
    /// Wraps a failure description, adding [`ERROR_PREFIX`].
    pub fn failed(detail: impl std::fmt::Display) -> Self {
        ModelReply::Failed(format!("{ERROR_PREFIX}{detail}"))
    }

    pub fn from_error(err: &Error) -> Self {
        Self::failed(err)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ModelReply::Failed(_))
    }

    pub fn text(&self) -> &str {
        match self {
            ModelReply::Answer(text) | ModelReply::Failed(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ModelReply::Answer(text) | ModelReply::Failed(text) => text,
        }
    }
}

/// One entry of the in-memory round: which model answered what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: String,
    pub response: String,
    /// True when `response` carries a query failure rather than an answer.
    #[serde(default)]
    pub failed: bool,
}

impl ModelResponse {
    pub fn new(model: impl Into<String>, reply: ModelReply) -> Self {
        let failed = reply.is_failure();
        Self {
            model: model.into(),
            response: reply.into_text(),
            failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    #[default]
    Idle,
    Querying,
    AwaitingRatings,
}

impl RoundPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RoundPhase::Idle => "idle",
            RoundPhase::Querying => "querying",
            RoundPhase::AwaitingRatings => "awaiting_ratings",
        }
    }
}

/// Transient state of the round in progress. Never persisted as such.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub round_id: Option<String>,
    pub prompt: String,
    pub responses: Vec<ModelResponse>,
}

impl SessionState {
    pub fn clear(&mut self) {
        self.round_id = None;
        self.prompt.clear();
        self.responses.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// A response paired with the rating the user gave it, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatedResponse {
    pub model_name: String,
    pub response: String,
    pub rating: Rating,
}

/// One persisted evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub id: i64,
    pub prompt: String,
    pub model_name: String,
    pub response: String,
    pub rating: u8,
    pub created_at: String,
}
