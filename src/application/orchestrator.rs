//! Drives one evaluation round: fan a prompt out to the selected models, hold
//! the answers while the user rates them, then commit the rated batch.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::application::{cache::ResponseCache, catalog::ModelCatalog};
use crate::core::{
    domain::{
        MAX_RATING, MIN_RATING, ModelReply, ModelResponse, RatedResponse, Rating, RoundPhase,
        SessionState,
    },
    error::{Error, Result},
    ports::{ModelClient, RatingInput, ResultStore, RoundView, SaveOutcome, TelemetrySink},
};

/// How the selected models are queried within one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOut {
    /// One model after the other, in selection order.
    #[default]
    Sequential,
    /// All models at once; results are still reported in selection order.
    Concurrent,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    pub fan_out: FanOut,
    /// Upper bound for a single model query. `None` waits indefinitely.
    pub query_timeout: Option<Duration>,
    pub memoize: bool,
}

/// Owner of the round in progress and of the services it calls out to.
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    store: Arc<dyn ResultStore>,
    telemetry: Arc<dyn TelemetrySink>,
    catalog: ModelCatalog,
    options: OrchestratorOptions,
    cache: ResponseCache,
    state: SessionState,
    phase: RoundPhase,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn ModelClient>,
        store: Arc<dyn ResultStore>,
        telemetry: Arc<dyn TelemetrySink>,
        catalog: ModelCatalog,
        options: OrchestratorOptions,
    ) -> Self {
        let cache = ResponseCache::new(options.memoize);
        Self {
            client,
            store,
            telemetry,
            catalog,
            options,
            cache,
            state: SessionState::default(),
            phase: RoundPhase::Idle,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn view(&self) -> RoundView {
        RoundView {
            phase: self.phase,
            round_id: self.state.round_id.clone(),
            prompt: self.state.prompt.clone(),
            responses: self.state.responses.clone(),
        }
    }

    /// Start a round: validate the input, drop the previous round and query
    /// every selected model. Query failures become error-text responses.
    ///
    /// If the returned future is dropped while models are still being
    /// queried, the orchestrator falls back to `Idle`.
    pub async fn submit(&mut self, prompt: &str, selected_models: &[String]) -> Result<RoundView> {
        if prompt.is_empty() {
            return Err(Error::Validation("please enter a prompt".into()));
        }
        if selected_models.is_empty() {
            return Err(Error::Validation("please select at least one model".into()));
        }
        self.catalog.check_selection(selected_models)?;

        let round_id = Uuid::new_v4().to_string();
        let round = QueryingRound::enter(&mut self.state, &mut self.phase, &round_id, prompt);

        let started = Instant::now();
        let span = info_span!("round", %round_id);
        let replies = FanOutPlan {
            client: &self.client,
            cache: &self.cache,
            options: &self.options,
        }
        .run(prompt, selected_models)
        .instrument(span)
        .await;

        let responses: Vec<ModelResponse> = selected_models
            .iter()
            .zip(replies)
            .map(|(model, reply)| {
                self.cache.remember(prompt, model, &reply);
                ModelResponse::new(model.clone(), reply)
            })
            .collect();
        let failures = responses.iter().filter(|r| r.failed).count();
        info!(
            %round_id,
            models = responses.len(),
            failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "round answered"
        );
        round.complete(responses);

        self.telemetry.record_event(
            "round_submitted",
            HashMap::from([
                ("round_id".to_string(), round_id),
                ("models".to_string(), selected_models.join(",")),
                ("failures".to_string(), failures.to_string()),
            ]),
        );
        Ok(self.view())
    }

    /// Persist the pending round with one rating per response.
    ///
    /// Nothing is written unless every response has a rating in range. The
    /// round is kept when the store fails so the save can be retried.
    pub async fn record_ratings(&mut self, ratings: &RatingInput) -> Result<SaveOutcome> {
        if self.phase != RoundPhase::AwaitingRatings || self.state.is_empty() {
            return Err(Error::InvalidState(format!(
                "no responses are awaiting ratings (round is {}); submit a prompt first",
                self.phase.as_str()
            )));
        }
        let rated = self.rate_responses(ratings)?;
        let round_id = self.state.round_id.clone().unwrap_or_default();

        let result = self.store.save_batch(&self.state.prompt, &rated).await;
        match result {
            Ok(saved) => {
                info!(%round_id, rows = saved, "ratings saved");
                self.telemetry.record_event(
                    "ratings_saved",
                    HashMap::from([
                        ("round_id".to_string(), round_id.clone()),
                        ("rows".to_string(), saved.to_string()),
                    ]),
                );
                self.state.clear();
                self.phase = RoundPhase::Idle;
                Ok(SaveOutcome {
                    round_id: Some(round_id),
                    saved,
                })
            }
            Err(err) => {
                error!(%round_id, error = %err, "saving ratings failed; round kept for retry");
                self.telemetry.record_event(
                    "ratings_save_failed",
                    HashMap::from([
                        ("round_id".to_string(), round_id),
                        ("error".to_string(), err.to_string()),
                    ]),
                );
                Err(err)
            }
        }
    }

    /// Abandon the round in progress.
    pub fn reset(&mut self) {
        if let Some(round_id) = &self.state.round_id {
            debug!(%round_id, "round discarded");
        }
        self.state.clear();
        self.phase = RoundPhase::Idle;
    }

    pub fn clear_cache(&mut self) {
        let dropped = self.cache.len();
        self.cache.clear();
        debug!(dropped, "memoized responses cleared");
    }

    fn rate_responses(&self, ratings: &RatingInput) -> Result<Vec<RatedResponse>> {
        let pending = self.state.responses.len();
        if let Some(index) = ratings.keys().find(|index| **index >= pending) {
            return Err(Error::Validation(format!(
                "rating given for response {index}, but only {pending} responses are pending"
            )));
        }

        self.state
            .responses
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let value = ratings.get(&index).ok_or_else(|| {
                    Error::Validation(format!(
                        "response {index} ({}) has no rating",
                        entry.model
                    ))
                })?;
                let rating = Rating::new(*value).map_err(|_| {
                    Error::Validation(format!(
                        "rating {value} for response {index} ({}) is outside {MIN_RATING}..={MAX_RATING}",
                        entry.model
                    ))
                })?;
                Ok(RatedResponse {
                    model_name: entry.model.clone(),
                    response: entry.response.clone(),
                    rating,
                })
            })
            .collect()
    }
}

/// Marks the round as `Querying` until [`QueryingRound::complete`] is called.
/// Dropping it early, such as when the caller gives up on `submit`, leaves an
/// empty `Idle` round behind.
struct QueryingRound<'a> {
    state: &'a mut SessionState,
    phase: &'a mut RoundPhase,
    completed: bool,
}

impl<'a> QueryingRound<'a> {
    fn enter(
        state: &'a mut SessionState,
        phase: &'a mut RoundPhase,
        round_id: &str,
        prompt: &str,
    ) -> Self {
        state.clear();
        state.round_id = Some(round_id.to_string());
        state.prompt = prompt.to_string();
        *phase = RoundPhase::Querying;
        Self {
            state,
            phase,
            completed: false,
        }
    }

    fn complete(mut self, responses: Vec<ModelResponse>) {
        self.state.responses = responses;
        *self.phase = RoundPhase::AwaitingRatings;
        self.completed = true;
    }
}

impl Drop for QueryingRound<'_> {
    fn drop(&mut self) {
        if !self.completed {
            if let Some(round_id) = &self.state.round_id {
                warn!(%round_id, "round abandoned while models were being queried");
            }
            self.state.clear();
            *self.phase = RoundPhase::Idle;
        }
    }
}

/// The read-only pieces of the orchestrator one fan-out needs.
struct FanOutPlan<'a> {
    client: &'a Arc<dyn ModelClient>,
    cache: &'a ResponseCache,
    options: &'a OrchestratorOptions,
}

impl FanOutPlan<'_> {
    async fn run(self, prompt: &str, models: &[String]) -> Vec<ModelReply> {
        match self.options.fan_out {
            FanOut::Sequential => self.query_sequential(prompt, models).await,
            FanOut::Concurrent => self.query_concurrent(prompt, models).await,
        }
    }

    async fn query_sequential(&self, prompt: &str, models: &[String]) -> Vec<ModelReply> {
        let mut replies = Vec::with_capacity(models.len());
        for model in models {
            let reply = match self.cache.get(prompt, model) {
                Some(hit) => {
                    debug!(%model, "using memoized response");
                    hit
                }
                None => {
                    query_model(
                        self.client.clone(),
                        prompt.to_string(),
                        model.clone(),
                        self.options.query_timeout,
                    )
                    .await
                }
            };
            replies.push(reply);
        }
        replies
    }

    async fn query_concurrent(&self, prompt: &str, models: &[String]) -> Vec<ModelReply> {
        let mut slots: Vec<Option<ModelReply>> = vec![None; models.len()];
        let mut join_set = JoinSet::new();
        for (index, model) in models.iter().enumerate() {
            if let Some(hit) = self.cache.get(prompt, model) {
                debug!(%model, "using memoized response");
                slots[index] = Some(hit);
                continue;
            }
            let client = self.client.clone();
            let prompt = prompt.to_string();
            let model = model.clone();
            let timeout = self.options.query_timeout;
            join_set.spawn(
                async move { (index, query_model(client, prompt, model, timeout).await) }
                    .in_current_span(),
            );
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, reply)) => slots[index] = Some(reply),
                Err(err) => error!(error = %err, "model query task panicked or was cancelled"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    ModelReply::from_error(&Error::System("model query task did not finish".into()))
                })
            })
            .collect()
    }
}

async fn query_model(
    client: Arc<dyn ModelClient>,
    prompt: String,
    model: String,
    timeout: Option<Duration>,
) -> ModelReply {
    let started = Instant::now();
    let reply = match timeout {
        Some(limit) => match tokio::time::timeout(limit, client.query(&prompt, &model)).await {
            Ok(reply) => reply,
            Err(_) => ModelReply::from_error(&Error::Transport(format!(
                "request timed out after {} ms",
                limit.as_millis()
            ))),
        },
        None => client.query(&prompt, &model).await,
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if reply.is_failure() {
        warn!(%model, elapsed_ms, response = reply.text(), "model query failed");
    } else {
        debug!(%model, elapsed_ms, "model answered");
    }
    reply
}
