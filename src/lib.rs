// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod briefing;
pub mod catalog;
pub mod config;
pub mod error;
pub mod history;
pub mod ingest;
pub mod market;
pub mod metrics;
pub mod mode;
pub mod prompt;
pub mod provider;
pub mod sentiment;
pub mod session;
pub mod waterfall;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::briefing::{Briefing, Report};
pub use crate::config::BriefingConfig;
pub use crate::error::ReportError;
pub use crate::mode::ReportMode;
pub use crate::session::Session;
