// src/waterfall.rs
//! Generation engine: a waterfall over a fallback chain of models.
//!
//! The control flow is a small state machine. [`transition`] is pure and decides the next
//! state from the current one and a classified outcome; [`Waterfall::run`] drives it,
//! performing the provider calls and sleeps the states ask for. Provider and sleeper are
//! injected, so the whole thing runs deterministically under test.
//!
//! Per model: one call plus one retry per entry of the wait schedule (default `[4s, 8s]`).
//! 429/503 consume the next scheduled wait, transport failures wait `transport_wait`
//! (default 1s) but still consume a slot, 404 advances immediately.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

use crate::config::briefing::WaterfallSection;
use crate::error::ReportError;
use crate::provider::{classify_result, AttemptOutcome, GenerationProvider};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "briefing_generation_attempts_total",
            "Provider generation calls by classified outcome."
        );
        describe_histogram!(
            "briefing_backoff_seconds",
            "Waits taken between attempts on the same model."
        );
        describe_counter!(
            "briefing_chain_advances_total",
            "Times the waterfall gave up on a model and moved on."
        );
    });
}

// ------------------------------------------------------------
// Chain + policy
// ------------------------------------------------------------

/// `[preferred] + defaults`, first occurrence wins. A blank `preferred` is skipped.
pub fn build_chain<S: AsRef<str>>(preferred: &str, defaults: &[S]) -> Vec<String> {
    let mut chain: Vec<String> = Vec::with_capacity(defaults.len() + 1);
    let preferred = preferred.trim();
    if !preferred.is_empty() {
        chain.push(preferred.to_string());
    }
    for m in defaults {
        let m = m.as_ref().trim();
        if !m.is_empty() && !chain.iter().any(|c| c == m) {
            chain.push(m.to_string());
        }
    }
    chain
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before each retry of the same model; its length is the retry budget per model.
    pub waits: Vec<Duration>,
    pub transport_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&WaterfallSection::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &WaterfallSection) -> Self {
        Self {
            waits: cfg.wait_schedule(),
            transport_wait: cfg.transport_wait(),
        }
    }

    pub fn retries_per_model(&self) -> usize {
        self.waits.len()
    }
}

// ------------------------------------------------------------
// State machine
// ------------------------------------------------------------

/// Position in the chain and retries already spent on that model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub model: usize,
    pub retries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    TryModel(Cursor),
    Wait { cursor: Cursor, wait: Duration },
    Advance { from: usize },
    Success(String),
    Exhausted,
}

impl State {
    pub fn start(chain_len: usize) -> Self {
        if chain_len == 0 {
            State::Exhausted
        } else {
            State::TryModel(Cursor {
                model: 0,
                retries: 0,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Success(_) | State::Exhausted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A provider call finished with this outcome.
    Attempted(AttemptOutcome),
    /// The wait or advance the previous state asked for has been carried out.
    Resumed,
}

/// Pure transition function. Events that do not fit the state leave it unchanged.
pub fn transition(state: State, event: Event, policy: &RetryPolicy, chain_len: usize) -> State {
    match (state, event) {
        (State::TryModel(cursor), Event::Attempted(outcome)) => match outcome {
            AttemptOutcome::Success(text) => State::Success(text),
            AttemptOutcome::RetryableError(_) => match policy.waits.get(cursor.retries) {
                Some(wait) => State::Wait {
                    cursor,
                    wait: *wait,
                },
                None => State::Advance { from: cursor.model },
            },
            AttemptOutcome::TransportError(_) => {
                if cursor.retries < policy.retries_per_model() {
                    State::Wait {
                        cursor,
                        wait: policy.transport_wait,
                    }
                } else {
                    State::Advance { from: cursor.model }
                }
            }
            AttemptOutcome::FatalForModel(_) => State::Advance { from: cursor.model },
        },
        (State::Wait { cursor, .. }, Event::Resumed) => State::TryModel(Cursor {
            model: cursor.model,
            retries: cursor.retries + 1,
        }),
        (State::Advance { from }, Event::Resumed) => {
            if from + 1 < chain_len {
                State::TryModel(Cursor {
                    model: from + 1,
                    retries: 0,
                })
            } else {
                State::Exhausted
            }
        }
        (state, _) => state,
    }
}

// ------------------------------------------------------------
// Sleepers
// ------------------------------------------------------------

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, wait: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, wait: Duration) {
        tokio::time::sleep(wait).await;
    }
}

/// Records requested waits and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, wait: Duration) {
        self.waits
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(wait);
    }
}

// ------------------------------------------------------------
// Driver
// ------------------------------------------------------------

/// One provider call inside a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    pub model: String,
    /// Wait taken after this attempt before retrying the same model, if any.
    pub wait: Option<Duration>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Text { model: String, text: String },
    Exhausted,
}

/// Full trace of one waterfall invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaterfallRun {
    pub chain: Vec<String>,
    pub attempts: Vec<GenerationAttempt>,
    pub advances: usize,
    pub generation: Generation,
}

impl WaterfallRun {
    pub fn waits(&self) -> Vec<Duration> {
        self.attempts.iter().filter_map(|a| a.wait).collect()
    }

    pub fn into_result(self) -> Result<(String, String), ReportError> {
        match self.generation {
            Generation::Text { model, text } => Ok((model, text)),
            Generation::Exhausted => Err(ReportError::Exhausted {
                attempts: self.attempts.len(),
            }),
        }
    }
}

pub struct Waterfall {
    provider: Arc<dyn GenerationProvider>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    safe_defaults: Vec<String>,
}

impl Waterfall {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        sleeper: Arc<dyn Sleeper>,
        cfg: &WaterfallSection,
    ) -> Self {
        let safe_defaults = if cfg.has_safe_default() {
            cfg.safe_defaults.clone()
        } else {
            WaterfallSection::default().safe_defaults
        };
        Self {
            provider,
            sleeper,
            policy: RetryPolicy::from_config(cfg),
            safe_defaults,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn chain_for(&self, preferred: &str) -> Vec<String> {
        build_chain(preferred, &self.safe_defaults)
    }

    /// Drive the state machine to a terminal state. Always terminates: at most
    /// `chain.len() * (1 + retries_per_model)` provider calls.
    pub async fn run(&self, prompt: &str, credential: &str, preferred: &str) -> WaterfallRun {
        ensure_metrics_described();

        let chain = self.chain_for(preferred);
        let mut attempts: Vec<GenerationAttempt> = Vec::new();
        let mut advances = 0usize;
        let mut state = State::start(chain.len());

        loop {
            state = match state {
                State::TryModel(cursor) => {
                    let model = &chain[cursor.model];
                    let outcome = classify_result(
                        self.provider
                            .generate_content(model, prompt, credential)
                            .await,
                    );
                    counter!("briefing_generation_attempts_total", "outcome" => outcome.label())
                        .increment(1);
                    tracing::debug!(
                        target: "waterfall",
                        %model,
                        retries = cursor.retries,
                        outcome = outcome.label(),
                        "attempt finished"
                    );
                    attempts.push(GenerationAttempt {
                        model: model.clone(),
                        wait: None,
                        outcome: outcome.clone(),
                    });
                    transition(
                        State::TryModel(cursor),
                        Event::Attempted(outcome),
                        &self.policy,
                        chain.len(),
                    )
                }
                State::Wait { cursor, wait } => {
                    if let Some(last) = attempts.last_mut() {
                        last.wait = Some(wait);
                    }
                    histogram!("briefing_backoff_seconds").record(wait.as_secs_f64());
                    self.sleeper.sleep(wait).await;
                    transition(
                        State::Wait { cursor, wait },
                        Event::Resumed,
                        &self.policy,
                        chain.len(),
                    )
                }
                State::Advance { from } => {
                    advances += 1;
                    counter!("briefing_chain_advances_total").increment(1);
                    tracing::warn!(
                        target: "waterfall",
                        model = %chain[from],
                        next = chain.get(from + 1).map(String::as_str).unwrap_or("-"),
                        "giving up on model"
                    );
                    transition(
                        State::Advance { from },
                        Event::Resumed,
                        &self.policy,
                        chain.len(),
                    )
                }
                State::Success(text) => {
                    let model = attempts
                        .last()
                        .map(|a| a.model.clone())
                        .unwrap_or_default();
                    tracing::info!(
                        target: "waterfall",
                        %model,
                        attempts = attempts.len(),
                        advances,
                        "generation succeeded"
                    );
                    return WaterfallRun {
                        chain,
                        attempts,
                        advances,
                        generation: Generation::Text { model, text },
                    };
                }
                State::Exhausted => {
                    tracing::warn!(
                        target: "waterfall",
                        attempts = attempts.len(),
                        chain = chain.len(),
                        "fallback chain exhausted"
                    );
                    return WaterfallRun {
                        chain,
                        attempts,
                        advances,
                        generation: Generation::Exhausted,
                    };
                }
            };
        }
    }

    /// Generated text, or `ReportError::Exhausted`.
    pub async fn generate(
        &self,
        prompt: &str,
        credential: &str,
        preferred: &str,
    ) -> Result<String, ReportError> {
        self.run(prompt, credential, preferred)
            .await
            .into_result()
            .map(|(_, text)| text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    fn at(model: usize, retries: usize) -> State {
        State::TryModel(Cursor { model, retries })
    }

    #[test]
    fn chain_dedups_and_keeps_caller_first() {
        let d = ["A", "B", "C"];
        assert_eq!(build_chain("A", &d), vec!["A", "B", "C"]);
        assert_eq!(build_chain("Z", &d), vec!["Z", "A", "B", "C"]);
        assert_eq!(build_chain("B", &d), vec!["B", "A", "C"]);
        assert_eq!(build_chain("  ", &d), vec!["A", "B", "C"]);
        assert_eq!(build_chain("Z", &["A", "A", ""]), vec!["Z", "A"]);
    }

    #[test]
    fn retryable_uses_schedule_then_advances() {
        let p = policy();
        let s = transition(at(0, 0), Event::Attempted(AttemptOutcome::RetryableError(429)), &p, 3);
        assert_eq!(
            s,
            State::Wait {
                cursor: Cursor { model: 0, retries: 0 },
                wait: Duration::from_secs(4)
            }
        );
        let s = transition(s, Event::Resumed, &p, 3);
        assert_eq!(s, at(0, 1));
        let s = transition(s, Event::Attempted(AttemptOutcome::RetryableError(503)), &p, 3);
        assert!(matches!(s, State::Wait { wait, .. } if wait == Duration::from_secs(8)));
        let s = transition(s, Event::Resumed, &p, 3);
        assert_eq!(s, at(0, 2));
        let s = transition(s, Event::Attempted(AttemptOutcome::RetryableError(503)), &p, 3);
        assert_eq!(s, State::Advance { from: 0 });
        assert_eq!(transition(s, Event::Resumed, &p, 3), at(1, 0));
    }

    #[test]
    fn transport_waits_one_second_and_consumes_a_slot() {
        let p = policy();
        let s = transition(
            at(1, 1),
            Event::Attempted(AttemptOutcome::TransportError("reset".into())),
            &p,
            3,
        );
        assert_eq!(
            s,
            State::Wait {
                cursor: Cursor { model: 1, retries: 1 },
                wait: Duration::from_secs(1)
            }
        );
        let s = transition(
            at(1, 2),
            Event::Attempted(AttemptOutcome::TransportError("reset".into())),
            &p,
            3,
        );
        assert_eq!(s, State::Advance { from: 1 });
    }

    #[test]
    fn not_found_advances_and_last_model_exhausts() {
        let p = policy();
        let s = transition(at(2, 0), Event::Attempted(AttemptOutcome::FatalForModel(404)), &p, 3);
        assert_eq!(s, State::Advance { from: 2 });
        assert_eq!(transition(s, Event::Resumed, &p, 3), State::Exhausted);
    }

    #[test]
    fn terminal_states_and_mismatched_events_are_stable() {
        let p = policy();
        assert_eq!(
            transition(State::Exhausted, Event::Resumed, &p, 3),
            State::Exhausted
        );
        let ok = State::Success("x".into());
        assert_eq!(transition(ok.clone(), Event::Resumed, &p, 3), ok);
        assert_eq!(transition(at(0, 0), Event::Resumed, &p, 3), at(0, 0));
        assert_eq!(State::start(0), State::Exhausted);
        assert!(State::start(0).is_terminal());
    }

    #[tokio::test]
    async fn recording_sleeper_does_not_block() {
        let s = RecordingSleeper::new();
        s.sleep(Duration::from_secs(3600)).await;
        assert_eq!(s.waits(), vec![Duration::from_secs(3600)]);
    }
}
