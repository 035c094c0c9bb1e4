// tests/common/mod.rs
//
// Scripted doubles shared by the integration tests: a generation provider that
// replays queued replies, a fetcher backed by a map, and a local fixture server.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use market_briefing::briefing::Briefing;
use market_briefing::config::BriefingConfig;
use market_briefing::ingest::types::{FetchOutcome, SourceFetcher};
use market_briefing::provider::{
    GenerateResponse, GenerationProvider, ListModelsResponse, ModelInfo,
};
use market_briefing::session::Session;
use market_briefing::waterfall::RecordingSleeper;

/// One scripted generation reply. `Transport` simulates a call that never got an answer.
#[derive(Clone, Debug)]
pub enum Reply {
    Ok(GenerateResponse),
    Transport,
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Ok(GenerateResponse::text(s))
    }
    pub fn code(c: u16) -> Self {
        Reply::Ok(GenerateResponse::error(c))
    }
}

/// Replays replies in order; once the script runs out, `fallback` answers every call.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    models: Mutex<Option<ListModelsResponse>>,
    pub generate_calls: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
    pub list_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            models: Mutex::new(None),
            generate_calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self::new(Vec::new(), reply)
    }

    /// Listing reply. Without one, `list_models` fails like an unreachable endpoint.
    pub fn with_models(self, ids: &[&str]) -> Self {
        let models = ids
            .iter()
            .map(|id| ModelInfo {
                name: format!("models/{id}"),
                supported_generation_methods: vec!["generateContent".to_string()],
            })
            .collect();
        *self.models.lock().unwrap() = Some(ListModelsResponse {
            models,
            error: None,
        });
        self
    }

    pub fn called_models(&self) -> Vec<String> {
        self.generate_calls.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.lock().unwrap().len()
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
        _credential: &str,
    ) -> Result<GenerateResponse> {
        self.generate_calls.lock().unwrap().push(model.to_string());
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match next {
            Reply::Ok(r) => Ok(r),
            Reply::Transport => Err(anyhow!("connection reset")),
        }
    }

    async fn list_models(&self, _credential: &str) -> Result<ListModelsResponse> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.models
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("listing unavailable"))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Serves fixed text per URL; unknown URLs come back empty.
#[derive(Default)]
pub struct MapFetcher {
    pages: HashMap<String, String>,
    pub calls: AtomicUsize,
}

impl MapFetcher {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(u, t)| (u.to_string(), t.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn dead() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url) {
            Some(t) => FetchOutcome::Text(t.clone()),
            None => FetchOutcome::Empty("unreachable".to_string()),
        }
    }

    fn name(&self) -> &'static str {
        "map"
    }
}

/// Config with short local source lists so tests never leave the process.
pub fn test_config() -> BriefingConfig {
    let mut cfg = BriefingConfig::default();
    cfg.sources.btc = vec!["http://src.test/btc-a".into(), "http://src.test/btc-b".into()];
    cfg.sources.fx = vec!["http://src.test/fx".into()];
    cfg.sources.geo = vec![
        "http://src.test/geo-a".into(),
        "http://src.test/geo-b".into(),
        "http://src.test/geo-c".into(),
    ];
    cfg.provider.base_url = "http://127.0.0.1:1".into();
    cfg.market.chart_base_url = "http://127.0.0.1:1".into();
    cfg.market.fear_greed_url = "http://127.0.0.1:1/fng/".into();
    cfg.market.timeout_secs = 1;
    cfg
}

pub struct Rig {
    pub briefing: Arc<Briefing>,
    pub provider: Arc<ScriptedProvider>,
    pub fetcher: Arc<MapFetcher>,
    pub sleeper: Arc<RecordingSleeper>,
}

pub fn rig(cfg: BriefingConfig, provider: ScriptedProvider, fetcher: MapFetcher) -> Rig {
    let provider = Arc::new(provider);
    let fetcher = Arc::new(fetcher);
    let sleeper = Arc::new(RecordingSleeper::new());
    let briefing = Briefing::new(
        Arc::new(cfg),
        fetcher.clone(),
        provider.clone(),
        sleeper.clone(),
        Arc::new(Session::new()),
    );
    Rig {
        briefing: Arc::new(briefing),
        provider,
        fetcher,
        sleeper,
    }
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}
