//! Fetcher doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use fussball_core::{FetchError, Fetcher, Payload, ResourceKey};

/// Answers every key with a scripted outcome and counts calls per key.
///
/// Keys without a scripted outcome get `{"key": "<kind>:<id>", "n": <call>}`.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    calls: Mutex<HashMap<ResourceKey, usize>>,
    total: AtomicUsize,
    outcomes: Mutex<HashMap<ResourceKey, Result<Payload, FetchError>>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, key: &ResourceKey, value: serde_json::Value) {
        self.outcomes.lock().insert(key.clone(), Ok(Arc::new(value)));
    }

    pub(crate) fn fail(&self, key: &ResourceKey) {
        let err = FetchError::Upstream {
            key: key.clone(),
            reason: "connection refused".into(),
        };
        self.outcomes.lock().insert(key.clone(), Err(err));
    }

    pub(crate) fn not_found(&self, key: &ResourceKey) {
        self.outcomes
            .lock()
            .insert(key.clone(), Err(FetchError::NotFound(key.clone())));
    }

    pub(crate) fn calls(&self, key: &ResourceKey) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, key: &ResourceKey) -> Result<Payload, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let n = {
            let mut calls = self.calls.lock();
            let n = calls.entry(key.clone()).or_insert(0);
            *n += 1;
            *n
        };
        // Let concurrent callers interleave.
        tokio::task::yield_now().await;

        match self.outcomes.lock().get(key) {
            Some(outcome) => outcome.clone(),
            None => Ok(Arc::new(json!({ "key": key.to_string(), "n": n }))),
        }
    }
}
