//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use idp_reconciler::config::HistoryConfig;
use idp_reconciler::provider::{AnalysisProvider, Credential, ProviderError, SubmitAck, Upload};
use idp_reconciler::reconcile::{Clock, PollPolicy, Reconciler};
use idp_reconciler::storage::HistoryStore;
use serde_json::{json, Value};

/// Returns immediately; counts requested delays.
#[derive(Default)]
pub struct InstantClock {
    pub sleeps: AtomicUsize,
}

#[async_trait::async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

/// In-memory provider. Uploads get sequential ids `EX1`, `EX2`, ... with
/// file refs `f1`, `f2`, ...; status queries pop from a script and fall back
/// to `default_status`.
pub struct FakeProvider {
    pub uploads: AtomicUsize,
    pub queries: AtomicUsize,
    script: Mutex<VecDeque<Result<Value, ProviderError>>>,
    default_status: Value,
}

impl FakeProvider {
    pub fn new(script: Vec<Result<Value, ProviderError>>) -> Arc<Self> {
        Self::with_default(script, json!({"status": "RUNNING"}))
    }

    pub fn always_succeeding() -> Arc<Self> {
        Self::with_default(Vec::new(), succeeded_body("doc.pdf", "OK"))
    }

    pub fn with_default(script: Vec<Result<Value, ProviderError>>, default_status: Value) -> Arc<Self> {
        Arc::new(Self {
            uploads: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
            default_status,
        })
    }

    pub fn push(&self, response: Result<Value, ProviderError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AnalysisProvider for FakeProvider {
    async fn send_file(&self, _upload: &Upload, _credential: &Credential) -> Result<SubmitAck, ProviderError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SubmitAck {
            execution_id: Some(format!("EX{n}")),
            file_ref: Some(format!("f{n}")),
        })
    }

    async fn query_execution(
        &self,
        _execution_id: &str,
        _file_ref: &str,
        _credential: &Credential,
    ) -> Result<Value, ProviderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_status.clone()))
    }
}

pub fn succeeded_body(document: &str, result: &str) -> Value {
    json!({
        "status": "SUCCEEDED",
        "Result": result,
        "datas": { "documentName": document }
    })
}

pub fn in_review_body() -> Value {
    json!({ "status": "in review, wait a few minutes" })
}

pub fn history_store(dir: &tempfile::TempDir) -> HistoryStore {
    let cfg = HistoryConfig {
        db_path: dir.path().join("history.db"),
        ..HistoryConfig::default()
    };
    HistoryStore::open(&cfg).unwrap()
}

pub fn reconciler(provider: Arc<dyn AnalysisProvider>, dir: &tempfile::TempDir) -> Reconciler {
    reconciler_with_policy(provider, dir, PollPolicy::default())
}

pub fn reconciler_with_policy(
    provider: Arc<dyn AnalysisProvider>,
    dir: &tempfile::TempDir,
    policy: PollPolicy,
) -> Reconciler {
    reconciler_with_clock(provider, dir, Arc::new(InstantClock::default()), policy)
}

pub fn reconciler_with_clock(
    provider: Arc<dyn AnalysisProvider>,
    dir: &tempfile::TempDir,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
) -> Reconciler {
    Reconciler::new(provider, clock, policy, history_store(dir))
}
