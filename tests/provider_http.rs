// tests/provider_http.rs
//
// GeminiProvider wire format against a local fake of the generation API, and the
// waterfall + catalog driven through real HTTP.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use market_briefing::catalog::{discover, CatalogOutcome};
use market_briefing::config::briefing::{ProviderSection, WaterfallSection};
use market_briefing::provider::{classify_result, AttemptOutcome, GeminiProvider, GenerationProvider};
use market_briefing::waterfall::{RecordingSleeper, Waterfall};

const KEY: &str = "test-key";

fn api_error(status: StatusCode, code: u16, label: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": code, "message": "fake", "status": label}})),
    )
        .into_response()
}

async fn generate(
    Path(target): Path<String>,
    Query(q): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if q.get("key").map(String::as_str) != Some(KEY) {
        return api_error(StatusCode::BAD_REQUEST, 400, "INVALID_ARGUMENT");
    }
    let Some(model) = target.strip_suffix(":generateContent") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if body["safetySettings"].as_array().map(Vec::len) != Some(4) {
        return api_error(StatusCode::BAD_REQUEST, 400, "INVALID_ARGUMENT");
    }
    match model {
        "busy" => api_error(StatusCode::TOO_MANY_REQUESTS, 429, "RESOURCE_EXHAUSTED"),
        "gone" => api_error(StatusCode::NOT_FOUND, 404, "NOT_FOUND"),
        "plain503" => (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response(),
        "garbage" => (StatusCode::OK, "<html>not json</html>").into_response(),
        _ => {
            let prompt = body["contents"][0]["parts"][0]["text"]
                .as_str()
                .unwrap_or_default();
            Json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": format!("{model} read '{prompt}' at $5")}]},
                    "finishReason": "STOP"
                }]
            }))
            .into_response()
        }
    }
}

async fn list(Query(q): Query<HashMap<String, String>>) -> Response {
    if q.get("key").map(String::as_str) != Some(KEY) {
        return api_error(StatusCode::BAD_REQUEST, 400, "INVALID_ARGUMENT");
    }
    Json(json!({
        "models": [
            {"name": "models/gemini-2.0-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]},
            {"name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"]},
            {"name": "models/gemini-2.0-flash-exp", "supportedGenerationMethods": ["generateContent"]}
        ]
    }))
    .into_response()
}

async fn provider() -> GeminiProvider {
    let app = Router::new()
        .route("/v1beta/models", get(list))
        .route("/v1beta/models/{target}", post(generate));
    let base = common::serve(app).await;
    GeminiProvider::new(&ProviderSection {
        base_url: base,
        connect_timeout_secs: 1,
        request_timeout_secs: 5,
    })
    .expect("provider")
}

#[tokio::test]
async fn success_reply_is_sanitized_text() {
    let p = provider().await;
    let out = classify_result(p.generate_content("gemini-2.0-flash", "hi", KEY).await);
    assert_eq!(
        out,
        AttemptOutcome::Success("gemini-2.0-flash read 'hi' at USD 5".to_string())
    );
}

async fn outcome(p: &GeminiProvider, model: &str) -> AttemptOutcome {
    classify_result(p.generate_content(model, "x", KEY).await)
}

#[tokio::test]
async fn error_codes_come_from_body_or_status() {
    let p = provider().await;

    assert_eq!(outcome(&p, "busy").await, AttemptOutcome::RetryableError(429));
    assert_eq!(outcome(&p, "gone").await, AttemptOutcome::FatalForModel(404));
    assert_eq!(outcome(&p, "plain503").await, AttemptOutcome::RetryableError(503));
    assert!(matches!(
        outcome(&p, "garbage").await,
        AttemptOutcome::TransportError(_)
    ));
}

#[tokio::test]
async fn wrong_key_is_neither_retryable_nor_fatal() {
    let p = provider().await;
    let out = classify_result(p.generate_content("gemini-2.0-flash", "x", "bad").await);
    assert!(matches!(out, AttemptOutcome::TransportError(_)), "got {out:?}");
}

#[tokio::test]
async fn discovery_keeps_generation_models_without_prefix() {
    let p = provider().await;
    match discover(&p, KEY).await {
        CatalogOutcome::Resolved(models) => {
            let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
            assert_eq!(ids, ["gemini-2.0-flash", "gemini-2.0-flash-exp"]);
        }
        other => panic!("expected models, got {other:?}"),
    }
    assert!(matches!(discover(&p, "bad").await, CatalogOutcome::Empty(_)));
}

#[tokio::test]
async fn waterfall_over_http_moves_past_busy_and_missing_models() {
    let p = Arc::new(provider().await);
    let sleeper = Arc::new(RecordingSleeper::new());
    let cfg = WaterfallSection {
        safe_defaults: vec!["gone".into(), "gemini-2.0-flash".into()],
        ..WaterfallSection::default()
    };
    let wf = Waterfall::new(p, sleeper.clone(), &cfg);

    let run = wf.run("brief me", KEY, "busy").await;

    assert_eq!(
        sleeper.waits(),
        vec![Duration::from_secs(4), Duration::from_secs(8)]
    );
    assert_eq!(run.advances, 2);
    let (model, text) = run.into_result().unwrap();
    assert_eq!(model, "gemini-2.0-flash");
    assert!(text.contains("brief me"));
    assert!(!text.contains('$'));
}

#[tokio::test]
async fn dead_endpoint_is_a_transport_error() {
    let p = GeminiProvider::new(&ProviderSection {
        base_url: "http://127.0.0.1:1".into(),
        connect_timeout_secs: 1,
        request_timeout_secs: 1,
    })
    .unwrap();
    let out = classify_result(p.generate_content("m", "x", KEY).await);
    assert!(matches!(out, AttemptOutcome::TransportError(_)));
}

type Seen = Arc<Mutex<Vec<String>>>;

async fn record(State(seen): State<Seen>, uri: Uri) -> Response {
    seen.lock().unwrap().push(uri.to_string());
    api_error(StatusCode::NOT_FOUND, 404, "NOT_FOUND")
}

#[tokio::test]
async fn hostile_model_ids_cannot_leave_the_generate_path() {
    let seen: Seen = Arc::default();
    let app = Router::new().fallback(record).with_state(seen.clone());
    let base = common::serve(app).await;
    let p = GeminiProvider::new(&ProviderSection {
        base_url: base,
        connect_timeout_secs: 1,
        request_timeout_secs: 5,
    })
    .unwrap();

    for model in ["../../admin", "x#frag", "x?alt=1"] {
        assert_eq!(outcome(&p, model).await, AttemptOutcome::FatalForModel(404));
    }

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        [
            "/v1beta/models/..%2F..%2Fadmin:generateContent?key=test-key",
            "/v1beta/models/x%23frag:generateContent?key=test-key",
            "/v1beta/models/x%3Falt=1:generateContent?key=test-key",
        ]
    );
}
