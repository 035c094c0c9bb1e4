// src/ingest/fetcher.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use std::time::Duration;

use crate::config::briefing::IngestSection;
use crate::ingest::extract_text;
use crate::ingest::types::{FetchOutcome, SourceFetcher};

/// Plain HTTP fetcher: one GET per call, no cookie store, generic browser identity.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("building source http client")?;
        Ok(Self { client })
    }

    pub fn from_config(cfg: &IngestSection) -> Result<Self> {
        Self::new(&cfg.user_agent, Duration::from_secs(cfg.fetch_timeout_secs))
    }

    async fn fetch_body(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().await.context("source http get()")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("source answered {status}");
        }
        resp.text().await.context("source http .text()")
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let t0 = std::time::Instant::now();
        let outcome = match self.fetch_body(url).await {
            Ok(body) => FetchOutcome::Text(extract_text(&body)),
            Err(e) => {
                tracing::warn!(target: "ingest", error = %format!("{e:#}"), %url, "source unavailable");
                FetchOutcome::Empty(format!("{e:#}"))
            }
        };

        let label = match outcome {
            FetchOutcome::Text(_) => "ok",
            FetchOutcome::Empty(_) => "empty",
        };
        counter!("briefing_source_fetch_total", "outcome" => label).increment(1);
        histogram!("briefing_source_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        outcome
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
