// src/session.rs
use chrono::{DateTime, Utc};

use crate::catalog::ModelCatalog;
use crate::history::ReportDesk;

/// State shared by every request of one running process: created empty at startup,
/// dropped on exit. Passed around by handle; there is no global.
pub struct Session {
    pub catalog: ModelCatalog,
    pub reports: ReportDesk,
    pub started_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            catalog: ModelCatalog::new(),
            reports: ReportDesk::new(),
            started_at: Utc::now(),
        }
    }
}
