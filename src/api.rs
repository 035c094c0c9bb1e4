use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::briefing::Briefing;
use crate::catalog::ModelChoices;
use crate::history::StoredReport;
use crate::market::{MarketClient, MarketSnapshot};
use crate::mode::ReportMode;
use crate::sentiment::SentimentIndex;

#[derive(Clone)]
pub struct AppState {
    pub briefing: Arc<Briefing>,
    pub market: Arc<MarketClient>,
}

impl AppState {
    pub fn new(briefing: Arc<Briefing>, market: Arc<MarketClient>) -> Self {
        Self { briefing, market }
    }

    /// Production wiring from a loaded config.
    pub fn from_config(cfg: crate::config::BriefingConfig) -> anyhow::Result<Self> {
        let market = MarketClient::new(&cfg.market)?;
        let briefing = Briefing::from_config(cfg)?;
        Ok(Self::new(Arc::new(briefing), Arc::new(market)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/report", post(post_report))
        .route("/report/{mode}", get(get_last_report))
        .route("/models", post(post_models))
        .route("/sentiment", get(get_sentiment))
        .route("/market", get(get_market))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct ReportReq {
    mode: String,
    #[serde(default)]
    credential: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(serde::Serialize)]
struct ReportResp {
    mode: ReportMode,
    report: String,
}

#[derive(serde::Deserialize)]
struct ModelsReq {
    #[serde(default)]
    credential: String,
}

fn bad_mode(raw: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        format!("unknown mode '{raw}' (expected BTC, FX or GEO)"),
    )
        .into_response()
}

/// Always 200 for a known mode: the body carries either the report or the user-facing
/// failure sentence.
async fn post_report(State(state): State<AppState>, Json(body): Json<ReportReq>) -> Response {
    let Ok(mode) = body.mode.parse::<ReportMode>() else {
        return bad_mode(&body.mode);
    };
    let report = state
        .briefing
        .request_report(mode, &body.credential, body.model.as_deref())
        .await;
    Json(ReportResp { mode, report }).into_response()
}

async fn get_last_report(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let Ok(mode) = raw.parse::<ReportMode>() else {
        return bad_mode(&raw);
    };
    let last: Option<StoredReport> = state.briefing.session().reports.last(mode);
    Json(last).into_response()
}

async fn post_models(
    State(state): State<AppState>,
    Json(body): Json<ModelsReq>,
) -> Json<ModelChoices> {
    Json(state.briefing.list_models(&body.credential).await)
}

async fn get_sentiment(State(state): State<AppState>) -> Json<SentimentIndex> {
    let cfg = &state.briefing.config().market;
    Json(SentimentIndex::gather(&state.market, cfg).await)
}

async fn get_market(State(state): State<AppState>) -> Json<Option<MarketSnapshot>> {
    let tickers = &state.briefing.config().market.tickers;
    Json(state.market.snapshot(tickers).await)
}
