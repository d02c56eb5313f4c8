//! HTTP server inbound adapter that exposes evaluation rounds and the review listing.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context as AnyhowContext, Result};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{
    core::{
        error::Error as CoreError,
        ports::{EvaluationService, RatingInput, RoundView, SaveOutcome, SubmitRequest},
    },
    review_export::{CatalogExport, EvaluationListExport},
};

/// Configuration options for the server adapter.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    /// Row cap for listings that do not pass `?limit=`. `None` returns every row.
    pub default_limit: Option<usize>,
}

/// Server adapter that exposes the `EvaluationService` via HTTP.
pub struct ServerAdapter {
    service: Arc<dyn EvaluationService>,
    options: ServeOptions,
}

impl ServerAdapter {
    pub fn new(service: Arc<dyn EvaluationService>, options: ServeOptions) -> Self {
        Self { service, options }
    }

    /// Run the HTTP server on the given address.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind evaluation service listener")?;
        self.run_with_listener(listener).await
    }

    /// Run the HTTP server with an existing listener (useful for tests).
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<()> {
        let router = self.router();
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "evalbench serve listening");
        } else {
            info!("evalbench serve listening");
        }
        axum::serve(listener, router.into_make_service())
            .await
            .context("serve endpoint failed")
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(ServeState {
            service: self.service.clone(),
            default_limit: self.options.default_limit.filter(|l| *l > 0),
        });
        build_router(state)
    }
}

struct ServeState {
    service: Arc<dyn EvaluationService>,
    default_limit: Option<usize>,
}

impl ServeState {
    fn limit_or_default(&self, value: Option<usize>) -> Option<usize> {
        value.filter(|v| *v > 0).or(self.default_limit)
    }
}

fn build_router(state: Arc<ServeState>) -> Router {
    Router::new()
        .route("/models", get(models_handler))
        .route(
            "/evaluation",
            get(current_round_handler)
                .post(submit_handler)
                .delete(reset_handler),
        )
        .route("/evaluation/ratings", post(ratings_handler))
        .route("/evaluations", get(list_evaluations_handler))
        .route("/evaluations/refresh", post(refresh_handler))
        .with_state(state)
}

/// Error body returned for every rejected request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

struct ApiError(CoreError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::InvalidState(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !self.0.is_validation() {
            error!(error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

/// Ratings in response order: element `i` rates response `i`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RatingsRequest {
    pub ratings: Vec<i64>,
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn models_handler(State(state): State<Arc<ServeState>>) -> Json<CatalogExport> {
    Json(CatalogExport {
        models: state.service.catalog(),
    })
}

async fn current_round_handler(State(state): State<Arc<ServeState>>) -> Json<RoundView> {
    Json(state.service.current_round().await)
}

async fn submit_handler(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<RoundView>, ApiError> {
    Ok(Json(state.service.submit(request).await?))
}

async fn ratings_handler(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<RatingsRequest>,
) -> Result<(StatusCode, Json<SaveOutcome>), ApiError> {
    let ratings: RatingInput = request.ratings.into_iter().enumerate().collect();
    let outcome = state.service.record_ratings(ratings).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn reset_handler(State(state): State<Arc<ServeState>>) -> StatusCode {
    state.service.reset().await;
    StatusCode::NO_CONTENT
}

async fn list_evaluations_handler(
    State(state): State<Arc<ServeState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<EvaluationListExport>, ApiError> {
    let limit = state.limit_or_default(query.limit);
    let rows = state.service.list_evaluations(limit).await?;
    Ok(Json(EvaluationListExport::from_rows(rows)))
}

async fn refresh_handler(
    State(state): State<Arc<ServeState>>,
) -> Result<Json<EvaluationListExport>, ApiError> {
    state.service.refresh().await;
    let rows = state
        .service
        .list_evaluations(state.default_limit)
        .await?;
    Ok(Json(EvaluationListExport::from_rows(rows)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::persistence::SqliteResultStore,
        application::{AppService, ModelCatalog, Orchestrator, OrchestratorOptions},
        core::{
            domain::{ModelReply, RatedResponse, Rating, RoundPhase},
            ports::{ModelClient, ResultStore, TelemetrySink},
        },
    };
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use std::collections::HashMap;
    use tower::ServiceExt;

    struct EchoClient;

    #[async_trait]
    impl ModelClient for EchoClient {
        async fn query(&self, prompt: &str, model: &str) -> ModelReply {
            if model == "broken" {
                ModelReply::failed("API error: endpoint returned HTTP 502")
            } else {
                ModelReply::Answer(format!("{model} says {prompt}"))
            }
        }
    }

    struct NoTelemetry;

    impl TelemetrySink for NoTelemetry {
        fn record_event(&self, _: &str, _: HashMap<String, String>) {}
    }

    async fn app() -> Router {
        let store = SqliteResultStore::open(":memory:").unwrap();
        store.ensure_schema().await.unwrap();
        app_with_store(Arc::new(store))
    }

    fn app_with_store(store: Arc<dyn ResultStore>) -> Router {
        let orchestrator = Orchestrator::new(
            Arc::new(EchoClient),
            store.clone(),
            Arc::new(NoTelemetry),
            ModelCatalog::new(["alpha", "broken"]).unwrap(),
            OrchestratorOptions::default(),
        );
        let service: Arc<dyn EvaluationService> = Arc::new(AppService::new(orchestrator, store));
        ServerAdapter::new(service, ServeOptions::default()).router()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn models_endpoint_lists_catalog() {
        let response = app()
            .await
            .oneshot(
                axum::http::Request::builder()
                    .uri("/models")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let catalog: CatalogExport = body_json(response).await;
        assert_eq!(catalog.models, ["alpha", "broken"]);
    }

    #[tokio::test]
    async fn empty_prompt_is_bad_request() {
        let response = app()
            .await
            .oneshot(json_request(
                "POST",
                "/evaluation",
                serde_json::json!({"prompt": "", "models": ["alpha"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = body_json(response).await;
        assert!(body.error.contains("prompt"));
    }

    #[tokio::test]
    async fn ratings_without_round_conflict() {
        let response = app()
            .await
            .oneshot(json_request(
                "POST",
                "/evaluation/ratings",
                serde_json::json!({"ratings": [3]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: ErrorBody = body_json(response).await;
        assert!(body.error.starts_with("Invalid state"));
    }

    #[tokio::test]
    async fn submit_rate_and_review_round_trip() {
        let app = app().await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/evaluation",
                serde_json::json!({"prompt": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let round: RoundView = body_json(response).await;
        assert_eq!(round.phase, RoundPhase::AwaitingRatings);
        assert_eq!(round.responses.len(), 2, "defaults to the whole catalog");
        assert!(round.responses[1].failed);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/evaluation/ratings",
                serde_json::json!({"ratings": [4]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/evaluation/ratings",
                serde_json::json!({"ratings": [4, 1]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let outcome: SaveOutcome = body_json(response).await;
        assert_eq!(outcome.saved, 2);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/evaluations?limit=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let list: EvaluationListExport = body_json(response).await;
        assert_eq!(list.evaluations.len(), 2);
        assert_eq!(list.evaluations[0].model_name, "broken");
        assert_eq!(list.evaluations[0].rating, 1);
        assert_eq!(list.evaluations[1].response, "alpha says hi");
    }

    #[tokio::test]
    async fn listing_without_limit_returns_every_row() {
        let store = SqliteResultStore::open(":memory:").unwrap();
        store.ensure_schema().await.unwrap();
        let rows: Vec<RatedResponse> = (0..60)
            .map(|i| RatedResponse {
                model_name: format!("model-{i}"),
                response: "ok".into(),
                rating: Rating::new(3).unwrap(),
            })
            .collect();
        store.save_batch("bulk?", &rows).await.unwrap();
        let app = app_with_store(Arc::new(store));

        for uri in ["/evaluations", "/evaluations?limit=0"] {
            let response = app
                .clone()
                .oneshot(
                    axum::http::Request::builder()
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let list: EvaluationListExport = body_json(response).await;
            assert_eq!(list.evaluations.len(), 60, "{uri}");
        }

        let response = app
            .oneshot(json_request(
                "POST",
                "/evaluations/refresh",
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        let list: EvaluationListExport = body_json(response).await;
        assert_eq!(list.evaluations.len(), 60);
    }

    #[tokio::test]
    async fn reset_clears_round() {
        let app = app().await;
        app.clone()
            .oneshot(json_request(
                "POST",
                "/evaluation",
                serde_json::json!({"prompt": "hi", "models": ["alpha"]}),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("DELETE")
                    .uri("/evaluation")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/evaluation")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let round: RoundView = body_json(response).await;
        assert_eq!(round.phase, RoundPhase::Idle);
        assert!(round.responses.is_empty());
    }
}
