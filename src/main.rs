//! Market briefing service — binary entrypoint.
//! Loads config, wires the pipeline into shared state and serves the HTTP router.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_briefing::api::{self, AppState};
use market_briefing::config::BriefingConfig;
use market_briefing::metrics::Metrics;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - BRIEFING_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("BRIEFING_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("briefing=info,waterfall=info,catalog=info,ingest=info,market=info,warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let cfg = BriefingConfig::load()?;
    let metrics = Metrics::init(&cfg)?;
    tracing::info!(
        target: "briefing",
        per_source_chars = cfg.ingest.per_source_chars,
        provider = %cfg.provider.base_url,
        "config loaded"
    );

    let state = AppState::from_config(cfg)?;
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
