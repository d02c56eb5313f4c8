//! Shared fixtures: a stand-in chat completions endpoint and a seeded database.

#![allow(dead_code)]

use std::{net::TcpListener as StdTcpListener, path::Path, time::Duration};

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use evalbench::{
    adapters::persistence::SqliteResultStore,
    core::domain::{RatedResponse, Rating},
};
use serde_json::{Value, json};

pub const API_KEY: &str = "test-key";
pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Models the fake endpoint understands:
/// `*broken*` gets HTTP 502, `*slow*` answers after five seconds, anything else answers "4".
pub struct FakeCompletions {
    pub endpoint: String,
}

impl FakeCompletions {
    /// Serve the fake endpoint from its own runtime thread so blocking and async tests can share it.
    pub fn spawn() -> Self {
        let std_listener = StdTcpListener::bind("127.0.0.1:0").expect("bind fake endpoint");
        std_listener
            .set_nonblocking(true)
            .expect("nonblocking listener");
        let addr = std_listener.local_addr().expect("local addr");

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("fake endpoint runtime");
            runtime.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(std_listener).expect("tokio listener");
                let app = Router::new().route(COMPLETIONS_PATH, post(completions));
                axum::serve(listener, app).await.expect("fake endpoint");
            });
        });

        Self {
            endpoint: format!("http://{addr}{COMPLETIONS_PATH}"),
        }
    }

    /// YAML config pointing the app at this endpoint with the given catalog.
    pub fn config_yaml(&self, models: &[&str]) -> String {
        let list = models
            .iter()
            .map(|m| format!("\"{m}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!("endpoint: \"{}\"\nmodels: [{list}]\n", self.endpoint)
    }
}

async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {API_KEY}"));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    }

    let model = body["model"].as_str().unwrap_or_default().to_string();
    let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
    if prompt.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty prompt").into_response();
    }
    if model.contains("broken") {
        return (StatusCode::BAD_GATEWAY, "upstream down").into_response();
    }
    if model.contains("slow") {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    Json(json!({
        "id": "cmpl-test",
        "model": model,
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "4"}}]
    }))
    .into_response()
}

pub fn rated(model: &str, response: &str, rating: i64) -> RatedResponse {
    RatedResponse {
        model_name: model.into(),
        response: response.into(),
        rating: Rating::new(rating).expect("valid rating"),
    }
}

/// Write one saved round into the database at `path`.
pub fn seed_round(path: &Path, prompt: &str, rows: &[RatedResponse]) {
    let store = SqliteResultStore::open(&sqlite_url(path)).expect("open store");
    store.init_schema().expect("schema");
    store.insert_batch(prompt, rows).expect("seed round");
}

pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}
