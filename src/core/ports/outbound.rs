use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::domain::{EvaluationRow, ModelReply, RatedResponse};
use crate::core::error::Result;

/// Abstraction for querying one model with one prompt.
///
/// Implementations never fail: every transport or decoding problem is folded
/// into a [`ModelReply::Failed`] whose text is shown in place of an answer.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn query(&self, prompt: &str, model: &str) -> ModelReply;
}

/// Abstraction over the table of persisted evaluations.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Create the evaluation table if it does not exist yet.
    async fn ensure_schema(&self) -> Result<()>;
    /// Insert every rated response of one round in a single transaction.
    async fn save_batch(&self, prompt: &str, rows: &[RatedResponse]) -> Result<usize>;
    /// Every stored row, newest first.
    async fn list_all(&self) -> Result<Vec<EvaluationRow>>;
}

/// Abstraction for sending telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Record a generic event.
    fn record_event(&self, event_name: &str, properties: HashMap<String, String>);
}
