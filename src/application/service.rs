//! Application service implementation that provides the `EvaluationService` trait.
//! This is the primary use-case port implementation that driving adapters consume.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    application::orchestrator::Orchestrator,
    core::{
        domain::EvaluationRow,
        error::Result as CoreResult,
        ports::{
            EvaluationService, RatingInput, ResultStore, RoundView, SaveOutcome, SubmitRequest,
        },
    },
};

/// Application service that implements `EvaluationService`.
///
/// Holds the single orchestrator of this process behind an async mutex, so
/// one round is in flight at a time, plus a handle on the store for the
/// read-only review listing.
pub struct AppService {
    orchestrator: Mutex<Orchestrator>,
    store: Arc<dyn ResultStore>,
    catalog: Vec<String>,
}

impl AppService {
    pub fn new(orchestrator: Orchestrator, store: Arc<dyn ResultStore>) -> Self {
        let catalog = orchestrator.catalog().models().to_vec();
        Self {
            orchestrator: Mutex::new(orchestrator),
            store,
            catalog,
        }
    }
}

#[async_trait]
impl EvaluationService for AppService {
    fn catalog(&self) -> Vec<String> {
        self.catalog.clone()
    }

    async fn submit(&self, request: SubmitRequest) -> CoreResult<RoundView> {
        let models = request.models.unwrap_or_else(|| self.catalog.clone());
        let mut orchestrator = self.orchestrator.lock().await;
        orchestrator.submit(&request.prompt, &models).await
    }

    async fn current_round(&self) -> RoundView {
        self.orchestrator.lock().await.view()
    }

    async fn record_ratings(&self, ratings: RatingInput) -> CoreResult<SaveOutcome> {
        let mut orchestrator = self.orchestrator.lock().await;
        orchestrator.record_ratings(&ratings).await
    }

    async fn reset(&self) {
        self.orchestrator.lock().await.reset();
    }

    async fn list_evaluations(&self, limit: Option<usize>) -> CoreResult<Vec<EvaluationRow>> {
        let mut rows = self.store.list_all().await?;
        if let Some(limit) = limit.filter(|l| *l > 0) {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn refresh(&self) {
        self.orchestrator.lock().await.clear_cache();
    }
}
