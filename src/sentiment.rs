// src/sentiment.rs
//! Sentiment gauges: crypto fear & greed and a macro score derived from volatility.
//! Both fall back to a neutral reading instead of failing.

use serde::Serialize;

use crate::config::briefing::MarketSection;
use crate::market::MarketClient;

pub const NEUTRAL_SCORE: u8 = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentIndex {
    /// 0 = extreme fear, 100 = extreme greed.
    pub crypto: u8,
    /// High = risk on, low = risk off.
    pub macro_score: u8,
    /// Volatility close used for `macro_score`, two decimals; 0.0 when unavailable.
    pub vix: f64,
}

/// `100 - (vix - 10) * 3`, truncated and clamped to 0..=100.
pub fn macro_score_from_vix(vix: f64) -> u8 {
    if !vix.is_finite() {
        return NEUTRAL_SCORE;
    }
    let score = (100.0 - (vix - 10.0) * 3.0).trunc();
    score.clamp(0.0, 100.0) as u8
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Macro reading from an optional volatility close; `(50, 0.0)` without one.
pub fn macro_reading(vix: Option<f64>) -> (u8, f64) {
    match vix.filter(|v| v.is_finite()) {
        Some(v) => (macro_score_from_vix(v), round2(v)),
        None => (NEUTRAL_SCORE, 0.0),
    }
}

impl SentimentIndex {
    pub async fn gather(client: &MarketClient, cfg: &MarketSection) -> Self {
        let crypto = match client.crypto_fear_greed().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "market", error = %format!("{e:#}"), "crypto fear&greed unavailable");
                NEUTRAL_SCORE
            }
        };
        let vix = match client.latest_close(&cfg.volatility_symbol).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(target: "market", error = %format!("{e:#}"), "volatility close unavailable");
                None
            }
        };
        let (macro_score, vix) = macro_reading(vix);
        Self {
            crypto,
            macro_score,
            vix,
        }
    }
}
