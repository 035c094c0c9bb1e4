// src/catalog.rs
//! Model catalog: discovery through the provider's listing endpoint, a session-scoped
//! memo per credential, and the default-model pick for the selection control.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell as SyncOnceCell;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::config::briefing::CatalogSection;
use crate::provider::GenerationProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub supports_generation: bool,
}

/// Discovery result. Failures of any kind collapse into `Empty`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogOutcome {
    Resolved(Vec<ModelDescriptor>),
    Empty(String),
}

impl CatalogOutcome {
    pub fn descriptors(&self) -> &[ModelDescriptor] {
        match self {
            CatalogOutcome::Resolved(v) => v,
            CatalogOutcome::Empty(_) => &[],
        }
    }
}

fn ensure_metrics_described() {
    static ONCE: SyncOnceCell<()> = SyncOnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "briefing_catalog_lookups_total",
            "Catalog lookups by source (network/cache) and result."
        );
    });
}

/// Short, stable fingerprint of a credential for map keys and logs. Never the key itself.
pub fn fingerprint(credential: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(credential.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Query the listing endpoint once, without touching any cache.
pub async fn discover(provider: &dyn GenerationProvider, credential: &str) -> CatalogOutcome {
    let reply = match provider.list_models(credential).await {
        Ok(r) => r,
        Err(e) => return CatalogOutcome::Empty(format!("{e:#}")),
    };
    if let Some(err) = reply.error {
        return CatalogOutcome::Empty(format!(
            "provider error {}",
            err.code.map(|c| c.to_string()).unwrap_or_else(|| "?".into())
        ));
    }
    let models: Vec<ModelDescriptor> = reply
        .models
        .iter()
        .filter(|m| m.supports_generation())
        .map(|m| ModelDescriptor {
            id: m.bare_id().to_string(),
            supports_generation: true,
        })
        .collect();
    if models.is_empty() {
        CatalogOutcome::Empty("no generation-capable models listed".to_string())
    } else {
        CatalogOutcome::Resolved(models)
    }
}

/// Session-scoped memo: credential fingerprint -> discovered models.
///
/// Each credential gets a once-cell, so concurrent first lookups run one discovery and
/// the rest wait for it. Only non-empty discoveries are stored; a failed scan is retried
/// on the next lookup. Nothing is ever evicted.
#[derive(Default)]
pub struct ModelCatalog {
    slots: Mutex<HashMap<String, Arc<OnceCell<Vec<ModelDescriptor>>>>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, credential: &str) -> Arc<OnceCell<Vec<ModelDescriptor>>> {
        let mut map = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        map.entry(fingerprint(credential))
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Cached descriptors for `credential`, if a discovery has already succeeded.
    pub fn cached(&self, credential: &str) -> Option<Vec<ModelDescriptor>> {
        let map = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        map.get(&fingerprint(credential))
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of credentials with a populated catalog.
    pub fn populated(&self) -> usize {
        let map = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        map.values().filter(|c| c.initialized()).count()
    }

    /// Resolve through the memo; the network is hit only while the slot is empty.
    pub async fn resolve(
        &self,
        provider: &dyn GenerationProvider,
        credential: &str,
    ) -> CatalogOutcome {
        ensure_metrics_described();
        let cell = self.slot(credential);
        if let Some(hit) = cell.get() {
            counter!("briefing_catalog_lookups_total", "source" => "cache", "result" => "resolved")
                .increment(1);
            return CatalogOutcome::Resolved(hit.clone());
        }

        let res = cell
            .get_or_try_init(|| async {
                match discover(provider, credential).await {
                    CatalogOutcome::Resolved(v) => Ok(v),
                    CatalogOutcome::Empty(reason) => Err(reason),
                }
            })
            .await;

        match res {
            Ok(models) => {
                counter!("briefing_catalog_lookups_total", "source" => "network", "result" => "resolved")
                    .increment(1);
                tracing::info!(
                    target: "catalog",
                    key = %fingerprint(credential),
                    models = models.len(),
                    "catalog resolved"
                );
                CatalogOutcome::Resolved(models.clone())
            }
            Err(reason) => {
                counter!("briefing_catalog_lookups_total", "source" => "network", "result" => "empty")
                    .increment(1);
                tracing::warn!(
                    target: "catalog",
                    key = %fingerprint(credential),
                    %reason,
                    "catalog unavailable, static defaults apply"
                );
                CatalogOutcome::Empty(reason)
            }
        }
    }
}

/// Options for the model selection control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelChoices {
    pub models: Vec<String>,
    pub default_index: usize,
    /// False when the static fallback list is offered.
    pub discovered: bool,
}

/// Deterministic, order-preserving scan:
/// 1. first id containing the stable marker and not the experimental marker;
/// 2. else first id containing the experimental-flash marker;
/// 3. else 0.
pub fn select_default<S: AsRef<str>>(ids: &[S], cfg: &CatalogSection) -> usize {
    let stable = ids.iter().position(|id| {
        let id = id.as_ref();
        id.contains(&cfg.stable_marker) && !id.contains(&cfg.experimental_marker)
    });
    stable
        .or_else(|| {
            ids.iter()
                .position(|id| id.as_ref().contains(&cfg.experimental_flash_marker))
        })
        .unwrap_or(0)
}

/// Turn a catalog outcome into selection-control options, falling back to the static list.
pub fn choices(outcome: &CatalogOutcome, cfg: &CatalogSection) -> ModelChoices {
    match outcome {
        CatalogOutcome::Resolved(models) if !models.is_empty() => {
            let ids: Vec<String> = models.iter().map(|m| m.id.clone()).collect();
            let default_index = select_default(&ids, cfg);
            ModelChoices {
                models: ids,
                default_index,
                discovered: true,
            }
        }
        _ => ModelChoices {
            models: cfg.fallback_models.clone(),
            default_index: 0,
            discovered: false,
        },
    }
}
