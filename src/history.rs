//! history.rs: last report per mode, held in memory for the session only.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::mode::ReportMode;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReport {
    pub mode: ReportMode,
    /// What the user saw: report markdown or the failure sentence.
    pub text: String,
    pub ok: bool,
    /// Model that produced the text; `None` for failures.
    pub model: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Per-mode report slots plus the gates that keep one generation per mode in flight.
pub struct ReportDesk {
    last: Mutex<HashMap<ReportMode, StoredReport>>,
    gates: HashMap<ReportMode, AsyncMutex<()>>,
}

impl Default for ReportDesk {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportDesk {
    pub fn new() -> Self {
        let gates = ReportMode::ALL
            .into_iter()
            .map(|m| (m, AsyncMutex::new(())))
            .collect();
        Self {
            last: Mutex::new(HashMap::new()),
            gates,
        }
    }

    /// Wait until no other generation for `mode` is running, then hold the gate.
    /// Different modes never block each other.
    pub async fn enter(&self, mode: ReportMode) -> AsyncMutexGuard<'_, ()> {
        // Every mode gets a gate in `new`, so the lookup cannot miss.
        self.gates[&mode].lock().await
    }

    /// True while a generation for `mode` holds the gate.
    pub fn is_busy(&self, mode: ReportMode) -> bool {
        self.gates[&mode].try_lock().is_err()
    }

    pub fn store(&self, report: StoredReport) {
        let mut map = self.last.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(report.mode, report);
    }

    pub fn last(&self, mode: ReportMode) -> Option<StoredReport> {
        let map = self.last.lock().unwrap_or_else(|p| p.into_inner());
        map.get(&mode).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(mode: ReportMode, text: &str) -> StoredReport {
        StoredReport {
            mode,
            text: text.to_string(),
            ok: true,
            model: Some("m".into()),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn store_replaces_previous_report_of_same_mode() {
        let desk = ReportDesk::new();
        assert!(desk.last(ReportMode::Btc).is_none());
        desk.store(report(ReportMode::Btc, "one"));
        desk.store(report(ReportMode::Btc, "two"));
        desk.store(report(ReportMode::Fx, "fx"));
        assert_eq!(desk.last(ReportMode::Btc).unwrap().text, "two");
        assert_eq!(desk.last(ReportMode::Fx).unwrap().text, "fx");
        assert!(desk.last(ReportMode::Geo).is_none());
    }

    #[tokio::test]
    async fn gates_are_per_mode() {
        let desk = ReportDesk::new();
        let g = desk.enter(ReportMode::Geo).await;
        assert!(desk.is_busy(ReportMode::Geo));
        assert!(!desk.is_busy(ReportMode::Btc));
        let _other = desk.enter(ReportMode::Btc).await;
        drop(g);
        assert!(!desk.is_busy(ReportMode::Geo));
    }
}
