// src/config/briefing.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::mode::ReportMode;

// --- env defaults & names ---
pub const DEFAULT_BRIEFING_CONFIG_PATH: &str = "config/briefing.toml";
pub const ENV_BRIEFING_CONFIG_PATH: &str = "BRIEFING_CONFIG_PATH";
pub const ENV_BRIEFING_SOURCE_CHARS: &str = "BRIEFING_SOURCE_CHARS";
pub const ENV_BRIEFING_PROVIDER_URL: &str = "BRIEFING_PROVIDER_URL";

pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_PER_SOURCE_CHARS: usize = 5_000;
pub const DEFAULT_DUMP_BUDGET_CHARS: usize = 15_000;

/// Upper bound accepted from `BRIEFING_SOURCE_CHARS`; keeps one page from eating the prompt.
const MAX_PER_SOURCE_CHARS: usize = 50_000;

/// Top-level configuration. Every section has serde defaults, so an empty file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BriefingConfig {
    pub provider: ProviderSection,
    pub ingest: IngestSection,
    pub prompt: PromptSection,
    pub waterfall: WaterfallSection,
    pub catalog: CatalogSection,
    pub sources: SourcesSection,
    pub market: MarketSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSection {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    /// Generation calls can be slow on large prompts.
    pub request_timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestSection {
    pub fetch_timeout_secs: u64,
    pub per_source_chars: usize,
    pub user_agent: String,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 5,
            per_source_chars: DEFAULT_PER_SOURCE_CHARS,
            user_agent: "Mozilla/5.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptSection {
    pub dump_budget_chars: usize,
}

impl Default for PromptSection {
    fn default() -> Self {
        Self {
            dump_budget_chars: DEFAULT_DUMP_BUDGET_CHARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WaterfallSection {
    /// Waits before each retry of the same model; its length is the retry count.
    pub wait_schedule_secs: Vec<u64>,
    pub transport_wait_secs: u64,
    /// Appended after the caller's model, deduplicated.
    pub safe_defaults: Vec<String>,
}

impl Default for WaterfallSection {
    fn default() -> Self {
        Self {
            wait_schedule_secs: vec![4, 8],
            transport_wait_secs: 1,
            safe_defaults: vec![
                "gemini-2.0-flash".to_string(),
                "gemini-2.0-flash-exp".to_string(),
                "gemini-1.5-flash".to_string(),
            ],
        }
    }
}

impl WaterfallSection {
    /// At least one usable model id, so every chain has a fallback.
    pub fn has_safe_default(&self) -> bool {
        self.safe_defaults.iter().any(|m| !m.trim().is_empty())
    }

    pub fn wait_schedule(&self) -> Vec<Duration> {
        self.wait_schedule_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }

    pub fn transport_wait(&self) -> Duration {
        Duration::from_secs(self.transport_wait_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogSection {
    /// Offered to the selection control when discovery yields nothing.
    pub fallback_models: Vec<String>,
    pub stable_marker: String,
    pub experimental_marker: String,
    pub experimental_flash_marker: String,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            fallback_models: vec![
                "gemini-2.0-flash".to_string(),
                "gemini-2.0-flash-exp".to_string(),
                "gemini-2.5-flash".to_string(),
            ],
            stable_marker: "gemini-2.0-flash".to_string(),
            experimental_marker: "exp".to_string(),
            experimental_flash_marker: "gemini-2.0-flash-exp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesSection {
    pub btc: Vec<String>,
    pub fx: Vec<String>,
    pub geo: Vec<String>,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            btc: vec![
                "https://cointelegraph.com/tags/bitcoin".to_string(),
                "https://u.today/bitcoin-news".to_string(),
            ],
            fx: vec![
                "https://www.fxstreet.com/news".to_string(),
                "https://www.dailyfx.com/market-news".to_string(),
            ],
            geo: vec![
                "https://oilprice.com/Geopolitics".to_string(),
                "https://www.fxstreet.com/news/macroeconomics".to_string(),
                "https://www.cnbc.com/world/?region=world".to_string(),
            ],
        }
    }
}

impl SourcesSection {
    pub fn for_mode(&self, mode: ReportMode) -> &[String] {
        match mode {
            ReportMode::Btc => &self.btc,
            ReportMode::Fx => &self.fx,
            ReportMode::Geo => &self.geo,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketSection {
    pub chart_base_url: String,
    pub fear_greed_url: String,
    pub volatility_symbol: String,
    /// (label, symbol) pairs in display order.
    pub tickers: Vec<(String, String)>,
    pub timeout_secs: u64,
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            chart_base_url: "https://query1.finance.yahoo.com".to_string(),
            fear_greed_url: "https://api.alternative.me/fng/?limit=1".to_string(),
            volatility_symbol: "^VIX".to_string(),
            tickers: [
                ("BTC", "BTC-USD"),
                ("EUR", "EURUSD=X"),
                ("USD", "DX-Y.NYB"),
                ("GOLD", "GC=F"),
                ("OIL", "CL=F"),
            ]
            .into_iter()
            .map(|(l, s)| (l.to_string(), s.to_string()))
            .collect(),
            timeout_secs: 5,
        }
    }
}

impl BriefingConfig {
    /// Load using `$BRIEFING_CONFIG_PATH`, falling back to `config/briefing.toml`.
    /// A missing file means built-in defaults; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_BRIEFING_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_BRIEFING_CONFIG_PATH));

        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            tracing::info!(target: "briefing", path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading briefing config from {}", path.display()))?;
        Self::from_toml_str(&data)
            .with_context(|| format!("parsing briefing config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: BriefingConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(n) = parse_source_chars_env(env::var(ENV_BRIEFING_SOURCE_CHARS).ok()) {
            self.ingest.per_source_chars = n;
        }
        if let Ok(url) = env::var(ENV_BRIEFING_PROVIDER_URL) {
            let url = url.trim();
            if !url.is_empty() {
                self.provider.base_url = url.trim_end_matches('/').to_string();
            }
        }
    }

    /// Repair values that would break invariants downstream (empty chains, zero budgets).
    fn sanitize(&mut self) {
        self.provider.base_url = self.provider.base_url.trim_end_matches('/').to_string();
        if self.provider.base_url.is_empty() {
            self.provider.base_url = DEFAULT_PROVIDER_BASE_URL.to_string();
        }
        if self.ingest.per_source_chars == 0 {
            self.ingest.per_source_chars = DEFAULT_PER_SOURCE_CHARS;
        }
        if self.prompt.dump_budget_chars == 0 {
            self.prompt.dump_budget_chars = DEFAULT_DUMP_BUDGET_CHARS;
        }
        if self.catalog.fallback_models.is_empty() {
            self.catalog.fallback_models = CatalogSection::default().fallback_models;
        }
        if !self.waterfall.has_safe_default() {
            self.waterfall.safe_defaults = WaterfallSection::default().safe_defaults;
        }
    }
}

// parse optional usize env and clamp to <1..=MAX_PER_SOURCE_CHARS>
fn parse_source_chars_env(raw: Option<String>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .map(|v| v.clamp(1, MAX_PER_SOURCE_CHARS))
}
