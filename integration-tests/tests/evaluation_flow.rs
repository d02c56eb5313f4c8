mod common;

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Result;
use common::{API_KEY, FakeCompletions, sqlite_url};
use evalbench::{
    adapters::{
        llm::ChatCompletionsClient, persistence::SqliteResultStore,
        telemetry::TracingTelemetrySink,
    },
    application::{AppService, FanOut, ModelCatalog, Orchestrator, OrchestratorOptions},
    core::{
        Error,
        domain::RoundPhase,
        ports::{
            EvaluationService, RatingInput, ResultStore, SubmitRequest, TelemetrySink,
        },
    },
};
use tempfile::tempdir;

fn build_service(
    endpoint: &str,
    store: Arc<dyn ResultStore>,
    models: &[&str],
    options: OrchestratorOptions,
) -> Result<AppService> {
    let client = Arc::new(ChatCompletionsClient::new(API_KEY, endpoint)?);
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(TracingTelemetrySink::new());
    let orchestrator = Orchestrator::new(
        client,
        store.clone(),
        telemetry,
        ModelCatalog::new(models.iter().copied())?,
        options,
    );
    Ok(AppService::new(orchestrator, store))
}

#[tokio::test(flavor = "multi_thread")]
async fn timed_out_model_is_saved_with_error_text() -> Result<()> {
    let fake = FakeCompletions::spawn();
    let temp = tempdir()?;
    let store = SqliteResultStore::open(&sqlite_url(&temp.path().join("evals.sqlite3")))?;
    store.ensure_schema().await?;
    let store: Arc<dyn ResultStore> = Arc::new(store);

    let service = build_service(
        &fake.endpoint,
        store.clone(),
        &["A", "B-slow"],
        OrchestratorOptions {
            query_timeout: Some(Duration::from_millis(500)),
            memoize: true,
            ..OrchestratorOptions::default()
        },
    )?;

    let round = service
        .submit(SubmitRequest {
            prompt: "2+2?".into(),
            models: Some(vec!["A".into(), "B-slow".into()]),
        })
        .await?;
    assert_eq!(round.phase, RoundPhase::AwaitingRatings);
    assert_eq!(round.responses[0].response, "4");
    assert!(round.responses[1].failed);
    assert!(round.responses[1].response.starts_with("[error] "));
    assert!(round.responses[1].response.contains("timed out"));

    let outcome = service
        .record_ratings(RatingInput::from([(0, 5), (1, 1)]))
        .await?;
    assert_eq!(outcome.saved, 2);
    assert_eq!(service.current_round().await.phase, RoundPhase::Idle);

    let rows = service.list_evaluations(None).await?;
    let by_model: HashMap<&str, (&str, u8)> = rows
        .iter()
        .map(|r| (r.model_name.as_str(), (r.response.as_str(), r.rating)))
        .collect();
    assert_eq!(by_model["A"], ("4", 5));
    assert_eq!(by_model["B-slow"].1, 1);
    assert!(by_model["B-slow"].0.starts_with("[error] "));
    assert!(rows.iter().all(|r| r.prompt == "2+2?"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_round_keeps_selection_order() -> Result<()> {
    let fake = FakeCompletions::spawn();
    let store = SqliteResultStore::open("sqlite::memory:")?;
    store.ensure_schema().await?;
    let store: Arc<dyn ResultStore> = Arc::new(store);

    let service = build_service(
        &fake.endpoint,
        store,
        &["x/broken", "y/ok", "z/ok"],
        OrchestratorOptions {
            fan_out: FanOut::Concurrent,
            ..OrchestratorOptions::default()
        },
    )?;

    let round = service
        .submit(SubmitRequest {
            prompt: "order?".into(),
            models: None,
        })
        .await?;
    let models: Vec<&str> = round.responses.iter().map(|r| r.model.as_str()).collect();
    assert_eq!(models, ["x/broken", "y/ok", "z/ok"]);
    assert!(round.responses[0].failed);
    assert!(!round.responses[1].failed && !round.responses[2].failed);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_api_key_surfaces_as_failed_response() -> Result<()> {
    let fake = FakeCompletions::spawn();
    let store = SqliteResultStore::open(":memory:")?;
    store.ensure_schema().await?;
    let store: Arc<dyn ResultStore> = Arc::new(store);

    let client = Arc::new(ChatCompletionsClient::new("wrong-key", fake.endpoint.as_str())?);
    let orchestrator = Orchestrator::new(
        client,
        store.clone(),
        Arc::new(TracingTelemetrySink::new()),
        ModelCatalog::new(["A"])?,
        OrchestratorOptions::default(),
    );
    let service = AppService::new(orchestrator, store);

    let round = service
        .submit(SubmitRequest {
            prompt: "hi".into(),
            models: None,
        })
        .await?;
    assert!(round.responses[0].failed);
    assert!(round.responses[0].response.contains("401"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn rating_without_round_is_invalid_state() -> Result<()> {
    let fake = FakeCompletions::spawn();
    let store = SqliteResultStore::open(":memory:")?;
    store.ensure_schema().await?;
    let service = build_service(
        &fake.endpoint,
        Arc::new(store),
        &["A"],
        OrchestratorOptions::default(),
    )?;

    let err = service
        .record_ratings(RatingInput::from([(0, 3)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(service.list_evaluations(None).await?.is_empty());

    Ok(())
}
