// src/provider.rs
//! Text-generation provider: wire types, the HTTP client and response classification.
//! The waterfall only sees `GenerationProvider`, so tests can script replies without a network.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::briefing::ProviderSection;

/// Method name a model must advertise to be offered for generation.
pub const GENERATE_METHOD: &str = "generateContent";
const MODEL_PREFIX: &str = "models/";

// ------------------------------------------------------------
// Wire types
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

/// Fixed policy sent with every generation call.
pub static SAFETY_SETTINGS: [SafetySetting; 4] = [
    SafetySetting {
        category: "HARM_CATEGORY_HARASSMENT",
        threshold: "BLOCK_ONLY_HIGH",
    },
    SafetySetting {
        category: "HARM_CATEGORY_HATE_SPEECH",
        threshold: "BLOCK_ONLY_HIGH",
    },
    SafetySetting {
        category: "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        threshold: "BLOCK_ONLY_HIGH",
    },
    SafetySetting {
        category: "HARM_CATEGORY_DANGEROUS_CONTENT",
        threshold: "BLOCK_ONLY_HIGH",
    },
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest<'a> {
    pub contents: Vec<Content<'a>>,
    pub safety_settings: &'a [SafetySetting],
}

#[derive(Debug, Serialize)]
pub struct Content<'a> {
    pub parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Part<'a> {
    pub text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    pub fn new(prompt: &'a str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            safety_settings: &SAFETY_SETTINGS,
        }
    }
}

/// Generation reply. Either `candidates` or `error` is normally present.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CandidatePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl GenerateResponse {
    /// Reply carrying only an error code.
    pub fn error(code: u16) -> Self {
        Self {
            candidates: Vec::new(),
            error: Some(ErrorBody {
                code: Some(code),
                ..ErrorBody::default()
            }),
        }
    }

    /// Reply with a single candidate holding `text`.
    pub fn text(text: &str) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(CandidateContent {
                    parts: vec![CandidatePart {
                        text: Some(text.to_string()),
                    }],
                }),
            }],
            error: None,
        }
    }

    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ListModelsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    pub fn bare_id(&self) -> &str {
        self.name.strip_prefix(MODEL_PREFIX).unwrap_or(&self.name)
    }

    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_METHOD)
    }
}

// ------------------------------------------------------------
// Provider abstraction + HTTP implementation
// ------------------------------------------------------------

/// Remote side of generation and model discovery. `Err` means the call itself failed
/// (connect, timeout, unreadable body); provider-level errors arrive inside the reply.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
        credential: &str,
    ) -> Result<GenerateResponse>;

    async fn list_models(&self, credential: &str) -> Result<ListModelsResponse>;

    fn name(&self) -> &'static str;
}

/// Generative Language REST API, credential passed as the `key` query parameter.
pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: Url,
}

impl GeminiProvider {
    pub fn new(cfg: &ProviderSection) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("market-briefing/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("building provider http client")?;
        let base_url = Url::parse(cfg.base_url.trim_end_matches('/'))
            .with_context(|| format!("provider base url {:?}", cfg.base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("provider base url {:?} cannot carry a path", cfg.base_url));
        }
        Ok(Self { http, base_url })
    }

    /// `{base}/v1beta/models[/{tail}]`. The tail is one percent-encoded segment, so a
    /// model id can never add path segments, a query or a fragment.
    fn endpoint(&self, tail: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| anyhow!("provider base url cannot carry a path"))?;
            segs.pop_if_empty().push("v1beta").push("models");
            if let Some(tail) = tail {
                segs.push(tail);
            }
        }
        Ok(url)
    }

    fn models_url(&self) -> Result<Url> {
        self.endpoint(None)
    }

    fn generate_url(&self, model: &str) -> Result<Url> {
        self.endpoint(Some(&format!("{model}:{GENERATE_METHOD}")))
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
        credential: &str,
    ) -> Result<GenerateResponse> {
        let resp = self
            .http
            .post(self.generate_url(model)?)
            .query(&[("key", credential)])
            .json(&GenerateRequest::new(prompt))
            .send()
            .await
            .context("provider generate send()")?;

        let status = resp.status();
        let body = resp.text().await.context("provider generate .text()")?;
        match serde_json::from_str::<GenerateResponse>(&body) {
            Ok(mut parsed) => {
                // Body code wins; the status line only fills in when the body has none.
                if parsed.candidates.is_empty() && !status.is_success() {
                    let err = parsed.error.get_or_insert_with(ErrorBody::default);
                    if err.code.is_none() {
                        err.code = Some(status.as_u16());
                    }
                }
                Ok(parsed)
            }
            Err(_) if !status.is_success() => Ok(GenerateResponse::error(status.as_u16())),
            Err(e) => Err(e).context("provider generate body is not json"),
        }
    }

    async fn list_models(&self, credential: &str) -> Result<ListModelsResponse> {
        let resp = self
            .http
            .get(self.models_url()?)
            .query(&[("key", credential)])
            .send()
            .await
            .context("provider list send()")?;
        let body = resp.text().await.context("provider list .text()")?;
        serde_json::from_str(&body).context("provider list body is not json")
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ------------------------------------------------------------
// Classification
// ------------------------------------------------------------

/// What one provider call means for the waterfall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    /// 429 rate limited / 503 overloaded: worth retrying the same model.
    RetryableError(u16),
    /// 404: the model id is wrong for this account; move on.
    FatalForModel(u16),
    /// Anything else, including failures before a reply arrived.
    TransportError(String),
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::RetryableError(_) => "retryable",
            AttemptOutcome::FatalForModel(_) => "fatal_for_model",
            AttemptOutcome::TransportError(_) => "transport",
        }
    }
}

pub fn classify(reply: &GenerateResponse) -> AttemptOutcome {
    if !reply.candidates.is_empty() {
        return match reply.first_text() {
            Some(text) => AttemptOutcome::Success(currency_safe(text)),
            None => AttemptOutcome::TransportError("candidate without text".to_string()),
        };
    }
    match reply.error.as_ref().and_then(|e| e.code) {
        Some(code @ (429 | 503)) => AttemptOutcome::RetryableError(code),
        Some(code @ 404) => AttemptOutcome::FatalForModel(code),
        Some(code) => AttemptOutcome::TransportError(format!("provider error code {code}")),
        None => AttemptOutcome::TransportError("reply without candidates".to_string()),
    }
}

/// Classify the result of a provider call, folding call failures into `TransportError`.
pub fn classify_result(result: Result<GenerateResponse>) -> AttemptOutcome {
    match result {
        Ok(reply) => classify(&reply),
        Err(e) => AttemptOutcome::TransportError(format!("{e:#}")),
    }
}

/// Replace currency signs with spaced currency codes; the dashboard's markdown
/// renderer treats `$` as a math delimiter. Signs without a code of their own
/// become `CUR `, so no currency symbol survives.
pub fn currency_safe(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match currency_code(ch) {
            Some(code) => {
                out.push_str(code);
                out.push(' ');
            }
            None if is_currency_symbol(ch) => out.push_str("CUR "),
            None => out.push(ch),
        }
    }
    out
}

fn currency_code(ch: char) -> Option<&'static str> {
    Some(match ch {
        '$' | '\u{FE69}' | '\u{FF04}' => "USD",
        '\u{00A2}' | '\u{FFE0}' => "USc",
        '£' | '\u{FFE1}' => "GBP",
        '¥' | '\u{FFE5}' => "JPY",
        '€' => "EUR",
        '₿' => "BTC",
        '₹' => "INR",
        '₩' | '\u{FFE6}' => "KRW",
        '₽' => "RUB",
        '₺' => "TRY",
        '₪' => "ILS",
        '₫' => "VND",
        '₴' => "UAH",
        '₦' => "NGN",
        '₱' => "PHP",
        '₸' => "KZT",
        '₾' => "GEL",
        '฿' => "THB",
        _ => return None,
    })
}

/// Unicode general category `Sc` (currency symbol), Unicode 15.1.
pub fn is_currency_symbol(c: char) -> bool {
    matches!(
        c,
        '$' | '\u{00A2}'..='\u{00A5}'
            | '\u{058F}'
            | '\u{060B}'
            | '\u{07FE}'..='\u{07FF}'
            | '\u{09F2}'..='\u{09F3}'
            | '\u{09FB}'
            | '\u{0AF1}'
            | '\u{0BF9}'
            | '\u{0E3F}'
            | '\u{17DB}'
            | '\u{20A0}'..='\u{20C0}'
            | '\u{A838}'
            | '\u{FDFC}'
            | '\u{FE69}'
            | '\u{FF04}'
            | '\u{FFE0}'..='\u{FFE1}'
            | '\u{FFE5}'..='\u{FFE6}'
            | '\u{11FDD}'..='\u{11FE0}'
            | '\u{1E2FF}'
            | '\u{1ECB0}'
    )
}

pub fn contains_currency_sign(text: &str) -> bool {
    text.chars().any(is_currency_symbol)
}
