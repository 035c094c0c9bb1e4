// src/prompt.rs
//! Prompt composer: one static template per report mode with the source dump embedded.
//! The headers are part of the contract with the provider and the dashboard renderer;
//! change them only together with the consumers.

use crate::config::briefing::DEFAULT_DUMP_BUDGET_CHARS;
use crate::mode::ReportMode;

const DATA_SLOT: &str = "{DATA}";

pub const BTC_HEADERS: [&str; 4] = [
    "### ⚡️ BITCOIN EXECUTIVE SUMMARY",
    "### 🐋 ORDER FLOW & SENTIMENT",
    "### 🧱 KEY LEVELS",
    "### 🎯 TRADE PLAN",
];

pub const GEO_HEADERS: [&str; 4] = [
    "### ⚠️ GEOPOLITICAL THREAT ASSESSMENT",
    "### 🛢 ENERGY & COMMODITIES",
    "### 🛡 DEFENSE & SECURITY",
    "### 💵 FX & SOVEREIGN RISK",
];

pub const FX_HEADERS: [&str; 8] = [
    "**💵 US DOLLAR INDEX (DXY) & MACRO**",
    "### 🇪🇺 EUR/USD",
    "### 🇬🇧 GBP/USD",
    "### 🇯🇵 USD/JPY",
    "### 🇨🇭 USD/CHF",
    "### 🇦🇺 AUD/USD",
    "### 🇨🇦 USD/CAD",
    "### 🇳🇿 NZD/USD",
];

const BTC_TEMPLATE: &str = "\
ROLE: Senior Hedge Fund Analyst.
TASK: Write a comprehensive Bitcoin briefing.
DATA: {DATA}
OUTPUT FORMAT (Markdown):
### ⚡️ BITCOIN EXECUTIVE SUMMARY
(Current Price Action & Narrative)
### 🐋 ORDER FLOW & SENTIMENT
(ETF Flows, Whale Activity, Fear/Greed)
### 🧱 KEY LEVELS
(Support/Resistance & Liquidity)
### 🎯 TRADE PLAN
(Bull/Bear Scenarios)
";

const GEO_TEMPLATE: &str = "\
ROLE: Geopolitical Risk Strategist.
TASK: Analyze events through MARKET IMPACT.
DATA: {DATA}

OUTPUT FORMAT (Strict Markdown - Insert \\n\\n before every header):

### ⚠️ GEOPOLITICAL THREAT ASSESSMENT
**Current Status:** (Low / Elevated / Critical)
**Market Focus:** (e.g., \"Middle East Tensions\")

---
### 🛢 ENERGY & COMMODITIES
(Impact on supply chains/Gold demand)

---
### 🛡 DEFENSE & SECURITY
(Conflict zone developments)

---
### 💵 FX & SOVEREIGN RISK
(USD Safe Haven vs EM Risk)
";

const FX_TEMPLATE: &str = "\
ROLE: Global Macro Strategist (Forex Desk).
TASK: Detailed breakdown for the 7 Major Currencies based on the provided data.
DATA: {DATA}

OUTPUT FORMAT (Strict Markdown - IMPORTANT: You MUST put TWO NEWLINES (\\n\\n) before every header):

**💵 US DOLLAR INDEX (DXY) & MACRO**
(Advanced, concise synthesis of DXY structure, Yield Curve dynamics, and Global Liquidity conditions.)

---

### 🇪🇺 EUR/USD
* **Overview:** (Context & Price Action)
* **Bias:** (Bullish / Bearish / Neutral)
* **News Impacts:** (ECB policy, Data releases)
* **Sentiment:** (Institutional positioning)

---

### 🇬🇧 GBP/USD
* **Overview:** (Context & Price Action)
* **Bias:** (Bullish / Bearish / Neutral)
* **News Impacts:** (BoE policy, UK Data)
* **Sentiment:** (Institutional positioning)

---

### 🇯🇵 USD/JPY
* **Overview:** (Context & Price Action)
* **Bias:** (Bullish / Bearish / Neutral)
* **News Impacts:** (BoJ interventions, Yield spreads)
* **Sentiment:** (Carry trade flows)

---

### 🇨🇭 USD/CHF
* **Overview:** (Safe haven status & SNB)
* **Bias:** (Direction)

---

### 🇦🇺 AUD/USD
* **Overview:** (Commodities & China correlation)
* **Bias:** (Direction)

---

### 🇨🇦 USD/CAD
* **Overview:** (Oil correlation & BoC)
* **Bias:** (Direction)

---

### 🇳🇿 NZD/USD
* **Overview:** (Agri-commodities & RBNZ)
* **Bias:** (Direction)
";

pub fn template(mode: ReportMode) -> &'static str {
    match mode {
        ReportMode::Btc => BTC_TEMPLATE,
        ReportMode::Fx => FX_TEMPLATE,
        ReportMode::Geo => GEO_TEMPLATE,
    }
}

pub fn headers(mode: ReportMode) -> &'static [&'static str] {
    match mode {
        ReportMode::Btc => &BTC_HEADERS,
        ReportMode::Fx => &FX_HEADERS,
        ReportMode::Geo => &GEO_HEADERS,
    }
}

/// Render the mode's template with the first `DEFAULT_DUMP_BUDGET_CHARS` characters of `dump`.
pub fn compose(mode: ReportMode, dump: &str) -> String {
    compose_with_budget(mode, dump, DEFAULT_DUMP_BUDGET_CHARS)
}

/// Same as [`compose`] with an explicit dump budget. The dump is inserted verbatim.
pub fn compose_with_budget(mode: ReportMode, dump: &str, budget_chars: usize) -> String {
    let data: String = dump.chars().take(budget_chars).collect();
    // Single slot per template; replacen keeps a dump containing "{DATA}" from being re-expanded.
    template(mode).replacen(DATA_SLOT, &data, 1)
}
