//! Errors escalated past the pipeline boundary.
//!
//! Everything recoverable (dead sources, missing catalog, single provider hiccups) is
//! absorbed below this level; only these two conditions reach the caller, and only as the
//! fixed sentences from [`ReportError::user_message`].

use thiserror::Error;

pub const MISSING_CREDENTIAL_MESSAGE: &str = "⚠️ Please enter your Google API Key in the sidebar.";
pub const EXHAUSTED_MESSAGE: &str = "⚠️ System Overloaded: All AI models are currently busy or rate-limited. Please wait 60 seconds and try again.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// Detected before any network call.
    #[error("no provider credential supplied")]
    MissingCredential,

    /// Every model in the fallback chain failed and every retry slot was used.
    #[error("fallback chain exhausted after {attempts} provider calls")]
    Exhausted { attempts: usize },
}

impl ReportError {
    /// Non-technical sentence shown to the end user. Never carries codes or traces.
    pub fn user_message(&self) -> &'static str {
        match self {
            ReportError::MissingCredential => MISSING_CREDENTIAL_MESSAGE,
            ReportError::Exhausted { .. } => EXHAUSTED_MESSAGE,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportError::MissingCredential => "missing_credential",
            ReportError::Exhausted { .. } => "exhausted",
        }
    }
}
