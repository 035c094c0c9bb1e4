// src/briefing.rs
//! Report pipeline: sources -> dump -> prompt -> waterfall, plus model listing.
//! This is the surface the dashboard calls; it always answers with a displayable string.

use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::catalog::{self, fingerprint, ModelChoices};
use crate::config::BriefingConfig;
use crate::error::ReportError;
use crate::history::StoredReport;
use crate::ingest::{self, fetcher::HttpFetcher, types::SourceFetcher};
use crate::mode::ReportMode;
use crate::prompt;
use crate::provider::{GeminiProvider, GenerationProvider};
use crate::session::Session;
use crate::waterfall::{Generation, Sleeper, TokioSleeper, Waterfall, WaterfallRun};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "briefing_reports_total",
            "Report requests by mode and outcome (ok/missing_credential/exhausted)."
        );
    });
}

/// A generated report with the facts needed for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub mode: ReportMode,
    pub text: String,
    pub model: String,
    pub attempts: usize,
    pub sources_ok: usize,
    pub sources_total: usize,
    pub dump_chars: usize,
}

pub struct Briefing {
    cfg: Arc<BriefingConfig>,
    fetcher: Arc<dyn SourceFetcher>,
    provider: Arc<dyn GenerationProvider>,
    waterfall: Waterfall,
    session: Arc<Session>,
}

impl Briefing {
    pub fn new(
        cfg: Arc<BriefingConfig>,
        fetcher: Arc<dyn SourceFetcher>,
        provider: Arc<dyn GenerationProvider>,
        sleeper: Arc<dyn Sleeper>,
        session: Arc<Session>,
    ) -> Self {
        let waterfall = Waterfall::new(provider.clone(), sleeper, &cfg.waterfall);
        Self {
            cfg,
            fetcher,
            provider,
            waterfall,
            session,
        }
    }

    /// Production wiring: HTTP fetcher, Gemini provider, real sleeps, fresh session.
    pub fn from_config(cfg: BriefingConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::from_config(&cfg.ingest)?;
        let provider = GeminiProvider::new(&cfg.provider)?;
        Ok(Self::new(
            Arc::new(cfg),
            Arc::new(fetcher),
            Arc::new(provider),
            Arc::new(TokioSleeper),
            Arc::new(Session::new()),
        ))
    }

    pub fn config(&self) -> &BriefingConfig {
        &self.cfg
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Options for the model selection control. A blank credential gets the static list
    /// without touching the network.
    pub async fn list_models(&self, credential: &str) -> ModelChoices {
        let credential = credential.trim();
        if credential.is_empty() {
            return catalog::choices(
                &catalog::CatalogOutcome::Empty("no credential".into()),
                &self.cfg.catalog,
            );
        }
        let outcome = self
            .session
            .catalog
            .resolve(self.provider.as_ref(), credential)
            .await;
        catalog::choices(&outcome, &self.cfg.catalog)
    }

    /// The caller's model when given, else the catalog's default pick.
    async fn pick_model(&self, credential: &str, preferred: Option<&str>) -> String {
        match preferred.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p.to_string(),
            None => {
                let choices = self.list_models(credential).await;
                choices
                    .models
                    .get(choices.default_index)
                    .cloned()
                    .unwrap_or_default()
            }
        }
    }

    /// Run the full pipeline. Only a missing credential or an exhausted chain escape.
    pub async fn try_report(
        &self,
        mode: ReportMode,
        credential: &str,
        preferred: Option<&str>,
    ) -> Result<Report, ReportError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(ReportError::MissingCredential);
        }

        let sources = self.cfg.sources.for_mode(mode);
        let dump = ingest::aggregate(
            self.fetcher.as_ref(),
            sources,
            self.cfg.ingest.per_source_chars,
        )
        .await;
        if dump.has_no_content() {
            tracing::warn!(target: "briefing", %mode, "no source produced text, generating anyway");
        }

        let prompt = prompt::compose_with_budget(
            mode,
            dump.as_str(),
            self.cfg.prompt.dump_budget_chars,
        );
        let preferred = self.pick_model(credential, preferred).await;

        let run: WaterfallRun = self.waterfall.run(&prompt, credential, &preferred).await;
        let attempts = run.attempts.len();
        match run.generation {
            Generation::Text { model, text } => Ok(Report {
                mode,
                text,
                model,
                attempts,
                sources_ok: dump.entries().iter().filter(|(_, t)| !t.is_empty()).count(),
                sources_total: sources.len(),
                dump_chars: dump.char_len(),
            }),
            Generation::Exhausted => Err(ReportError::Exhausted { attempts }),
        }
    }

    /// Entry point for the presentation layer. Never fails: the answer is either the
    /// report markdown or a fixed, non-technical sentence. Requests for the same mode
    /// queue behind each other; the result is kept as the mode's last report.
    pub async fn request_report(
        &self,
        mode: ReportMode,
        credential: &str,
        preferred: Option<&str>,
    ) -> String {
        ensure_metrics_described();

        if credential.trim().is_empty() {
            counter!("briefing_reports_total", "mode" => mode.as_str(), "outcome" => "missing_credential")
                .increment(1);
            return ReportError::MissingCredential.user_message().to_string();
        }

        let _gate = self.session.reports.enter(mode).await;
        let t0 = std::time::Instant::now();
        let result = self.try_report(mode, credential, preferred).await;

        let stored = match &result {
            Ok(report) => {
                counter!("briefing_reports_total", "mode" => mode.as_str(), "outcome" => "ok")
                    .increment(1);
                tracing::info!(
                    target: "briefing",
                    %mode,
                    key = %fingerprint(credential.trim()),
                    model = %report.model,
                    attempts = report.attempts,
                    sources_ok = report.sources_ok,
                    ms = t0.elapsed().as_millis() as u64,
                    "report generated"
                );
                StoredReport {
                    mode,
                    text: report.text.clone(),
                    ok: true,
                    model: Some(report.model.clone()),
                    generated_at: Utc::now(),
                }
            }
            Err(e) => {
                counter!("briefing_reports_total", "mode" => mode.as_str(), "outcome" => e.label())
                    .increment(1);
                tracing::warn!(
                    target: "briefing",
                    %mode,
                    key = %fingerprint(credential.trim()),
                    error = %e,
                    "report failed"
                );
                StoredReport {
                    mode,
                    text: e.user_message().to_string(),
                    ok: false,
                    model: None,
                    generated_at: Utc::now(),
                }
            }
        };

        let text = stored.text.clone();
        self.session.reports.store(stored);
        text
    }
}
