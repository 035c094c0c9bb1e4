// src/mode.rs
//! Report modes: the three fixed intelligence domains a briefing can cover.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportMode {
    /// Bitcoin briefing.
    Btc,
    /// Foreign-exchange desk, seven majors.
    Fx,
    /// Geopolitical risk through a market lens.
    Geo,
}

impl ReportMode {
    pub const ALL: [ReportMode; 3] = [ReportMode::Btc, ReportMode::Fx, ReportMode::Geo];

    pub fn as_str(self) -> &'static str {
        match self {
            ReportMode::Btc => "BTC",
            ReportMode::Fx => "FX",
            ReportMode::Geo => "GEO",
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportMode {
    type Err = anyhow::Error;

    /// Case-insensitive; accepts the long names used by the dashboard tabs too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "btc" | "bitcoin" => Ok(ReportMode::Btc),
            "fx" | "forex" | "currencies" => Ok(ReportMode::Fx),
            "geo" | "geopolitics" => Ok(ReportMode::Geo),
            other => anyhow::bail!("unknown report mode: {other}"),
        }
    }
}
