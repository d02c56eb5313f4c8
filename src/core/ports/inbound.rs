//! Inbound ports (use-case ports) define the application service interface that
//! driving adapters (CLI, HTTP server) consume.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::domain::{EvaluationRow, ModelResponse, RoundPhase};
use crate::core::error::Result;

/// Request to start a new evaluation round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub prompt: String,
    /// Models to query, in display order. `None` selects the whole catalog.
    #[serde(default)]
    pub models: Option<Vec<String>>,
}

/// Snapshot of the round in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundView {
    pub phase: RoundPhase,
    pub round_id: Option<String>,
    pub prompt: String,
    pub responses: Vec<ModelResponse>,
}

/// Result of a successful save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub round_id: Option<String>,
    pub saved: usize,
}

/// Ratings keyed by the index of the response they apply to.
pub type RatingInput = BTreeMap<usize, i64>;

/// The primary application service trait that driving adapters consume.
#[async_trait]
pub trait EvaluationService: Send + Sync {
    /// The fixed set of model identifiers a round may use.
    fn catalog(&self) -> Vec<String>;

    /// Query every selected model with the prompt and hold the answers for rating.
    async fn submit(&self, request: SubmitRequest) -> Result<RoundView>;

    /// The round currently held in memory.
    async fn current_round(&self) -> RoundView;

    /// Validate ratings for every pending response and persist the round.
    async fn record_ratings(&self, ratings: RatingInput) -> Result<SaveOutcome>;

    /// Drop the round in progress without saving it.
    async fn reset(&self);

    /// Saved evaluations, newest first.
    async fn list_evaluations(&self, limit: Option<usize>) -> Result<Vec<EvaluationRow>>;

    /// Forget memoized model answers so the next round queries again.
    async fn refresh(&self);
}
