// src/market.rs
//! Display data for the dashboard header: latest price and intraday change per instrument,
//! plus the raw inputs of the sentiment gauges. Best effort throughout.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::briefing::MarketSection;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub label: String,
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub quotes: Vec<Quote>,
    pub fetched_at: DateTime<Utc>,
}

// Chart endpoint shape: chart.result[0].indicators.quote[0].{open,close}, with nulls.
#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}
#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}
#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}
#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}
#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct FearGreedEnvelope {
    data: Vec<FearGreedPoint>,
}
#[derive(Debug, Deserialize)]
struct FearGreedPoint {
    value: String,
}

/// First open and last close of the day, ignoring gaps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayRange {
    pub open: f64,
    pub latest: f64,
}

/// `(latest - open) / open * 100`, zero when the open is zero.
pub fn percent_change(open: f64, latest: f64) -> f64 {
    if open == 0.0 || !open.is_finite() || !latest.is_finite() {
        return 0.0;
    }
    (latest - open) / open * 100.0
}

fn day_range(body: &str) -> Result<Option<DayRange>> {
    let env: ChartEnvelope = serde_json::from_str(body).context("parsing chart json")?;
    let series = env
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .and_then(|r| r.indicators.quote.into_iter().next())
        .unwrap_or_default();
    let open = series.open.iter().flatten().next().copied();
    let latest = series.close.iter().rev().flatten().next().copied();
    Ok(match (open, latest) {
        (Some(open), Some(latest)) => Some(DayRange { open, latest }),
        _ => None,
    })
}

pub struct MarketClient {
    http: reqwest::Client,
    chart_base_url: String,
    fear_greed_url: String,
}

impl MarketClient {
    pub fn new(cfg: &MarketSection) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building market http client")?;
        Ok(Self {
            http,
            chart_base_url: cfg.chart_base_url.trim_end_matches('/').to_string(),
            fear_greed_url: cfg.fear_greed_url.clone(),
        })
    }

    /// Intraday range for `symbol` at one-minute resolution. `Ok(None)` means no bars today.
    pub async fn day_range(&self, symbol: &str) -> Result<Option<DayRange>> {
        let url = format!("{}/v8/finance/chart/{}", self.chart_base_url, symbol);
        let resp = self
            .http
            .get(url)
            .query(&[("range", "1d"), ("interval", "1m")])
            .send()
            .await
            .context("chart http get()")?
            .error_for_status()
            .context("chart http status")?;
        let body = resp.text().await.context("chart http .text()")?;
        day_range(&body)
    }

    /// Quotes for `(label, symbol)` pairs. An instrument without bars shows `0.0 / 0.0`;
    /// `None` only when no instrument could be fetched at all.
    pub async fn snapshot(&self, tickers: &[(String, String)]) -> Option<MarketSnapshot> {
        let mut quotes = Vec::with_capacity(tickers.len());
        let mut reached = 0usize;
        for (label, symbol) in tickers {
            let (price, change_pct) = match self.day_range(symbol).await {
                Ok(Some(r)) => {
                    reached += 1;
                    (r.latest, percent_change(r.open, r.latest))
                }
                Ok(None) => {
                    reached += 1;
                    (0.0, 0.0)
                }
                Err(e) => {
                    tracing::warn!(target: "market", %symbol, error = %format!("{e:#}"), "quote unavailable");
                    (0.0, 0.0)
                }
            };
            quotes.push(Quote {
                label: label.clone(),
                symbol: symbol.clone(),
                price,
                change_pct,
            });
        }
        if reached == 0 && !tickers.is_empty() {
            return None;
        }
        Some(MarketSnapshot {
            quotes,
            fetched_at: Utc::now(),
        })
    }

    /// Latest close of `symbol`, used for the volatility gauge.
    pub async fn latest_close(&self, symbol: &str) -> Result<f64> {
        self.day_range(symbol)
            .await?
            .map(|r| r.latest)
            .context("no bars for symbol")
    }

    /// Crypto fear & greed reading, 0..=100.
    pub async fn crypto_fear_greed(&self) -> Result<u8> {
        let env: FearGreedEnvelope = self
            .http
            .get(&self.fear_greed_url)
            .send()
            .await
            .context("fear&greed http get()")?
            .json()
            .await
            .context("fear&greed json")?;
        let raw = env.data.first().context("fear&greed: empty data")?;
        let v: u32 = raw.value.trim().parse().context("fear&greed: value")?;
        Ok(v.min(100) as u8)
    }
}
