//! Bounded ledger of past executions and their last-known outcome.
//!
//! Stored as one JSON list, newest first, under an application-scoped key in
//! `kv_store`. Every mutation is a read-modify-write inside an immediate
//! transaction, so concurrent writers serialize on the database lock.

use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{kv_get, kv_put, open_pool, Pool, StorageError};
use crate::config::HistoryConfig;
use crate::reconcile::{Outcome, OutcomeKind};

/// Summary stored for outcomes that carry no provider text.
const MANUAL_REVIEW_SUMMARY: &str = "Manual validation required";
const TIMED_OUT_SUMMARY: &str = "Analysis still in progress, try again later";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub execution_id: String,
    pub document_name: String,
    pub timestamp: DateTime<Utc>,
    pub outcome_kind: OutcomeKind,
    #[serde(default)]
    pub result_summary: Option<String>,
    #[serde(default)]
    pub provider_file_ref: Option<String>,
    #[serde(default)]
    pub extracted_fields: Option<Map<String, Value>>,
    /// Set when a later re-probe rewrote this entry.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    /// Entry for a terminal outcome of `execution_id`.
    pub fn from_outcome(
        execution_id: &str,
        document_name: &str,
        provider_file_ref: Option<&str>,
        outcome: &Outcome,
        now: DateTime<Utc>,
    ) -> Self {
        let (document_name, result_summary, extracted_fields) = match outcome {
            Outcome::Succeeded {
                document_name,
                result_summary,
                extracted_fields,
            } => (
                document_name.clone(),
                Some(result_summary.clone()),
                extracted_fields.clone(),
            ),
            Outcome::ManualReviewRequired { .. } => (
                document_name.to_string(),
                Some(MANUAL_REVIEW_SUMMARY.to_string()),
                None,
            ),
            Outcome::TimedOut => (
                document_name.to_string(),
                Some(TIMED_OUT_SUMMARY.to_string()),
                None,
            ),
            Outcome::Failed { reason } => (document_name.to_string(), Some(reason.clone()), None),
        };

        Self {
            execution_id: execution_id.to_string(),
            document_name,
            timestamp: now,
            outcome_kind: outcome.kind(),
            result_summary,
            provider_file_ref: provider_file_ref.map(str::to_string),
            extracted_fields,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEffect {
    Inserted,
    Updated,
}

/// In-memory ledger logic; [`HistoryStore`] persists it.
#[derive(Debug, Clone)]
pub struct Ledger {
    entries: Vec<HistoryEntry>,
    capacity: usize,
}

impl Ledger {
    pub fn new(capacity: usize) -> Self {
        Self::from_entries(Vec::new(), capacity)
    }

    pub fn from_entries(mut entries: Vec<HistoryEntry>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        entries.truncate(capacity);
        Self { entries, capacity }
    }

    /// Insert at the front, or overwrite the outcome of an existing entry in
    /// place (position and original timestamp kept). Evicts past capacity.
    pub fn record(&mut self, entry: HistoryEntry) -> RecordEffect {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.execution_id == entry.execution_id)
        {
            existing.outcome_kind = entry.outcome_kind;
            existing.result_summary = entry.result_summary;
            existing.extracted_fields = entry.extracted_fields;
            if entry.provider_file_ref.is_some() {
                existing.provider_file_ref = entry.provider_file_ref;
            }
            existing.updated_at = Some(entry.timestamp);
            return RecordEffect::Updated;
        }

        self.entries.insert(0, entry);
        self.entries.truncate(self.capacity);
        RecordEffect::Inserted
    }

    pub fn find(&self, execution_id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.execution_id == execution_id)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<HistoryEntry> {
        self.entries
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Durable [`Ledger`] backed by SQLite.
#[derive(Clone)]
pub struct HistoryStore {
    pool: Pool,
    key: String,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(pool: Pool, key: impl Into<String>, capacity: usize) -> Self {
        Self {
            pool,
            key: key.into(),
            capacity,
        }
    }

    /// Open the database named in `config` and bind to its ledger key.
    pub fn open(config: &HistoryConfig) -> Result<Self, StorageError> {
        info!(db_path = %config.db_path.display(), key = %config.key, "opening history store");
        let pool = open_pool(&config.db_path)?;
        Ok(Self::new(pool, config.key.clone(), config.capacity))
    }

    pub fn record(&self, entry: HistoryEntry) -> Result<RecordEffect, StorageError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut ledger = Ledger::from_entries(load(&tx, &self.key)?, self.capacity);
        let execution_id = entry.execution_id.clone();
        let effect = ledger.record(entry);
        kv_put(&tx, &self.key, &serde_json::to_string(ledger.entries())?)?;
        tx.commit()?;

        debug!(%execution_id, ?effect, size = ledger.len(), "history recorded");
        Ok(effect)
    }

    pub fn find(&self, execution_id: &str) -> Result<Option<HistoryEntry>, StorageError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|e| e.execution_id == execution_id))
    }

    /// Entries newest first. Read-only.
    pub fn list(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        let conn = self.pool.get()?;
        let entries = load(&conn, &self.key)?;
        Ok(Ledger::from_entries(entries, self.capacity).into_entries())
    }
}

fn load(conn: &rusqlite::Connection, key: &str) -> Result<Vec<HistoryEntry>, StorageError> {
    match kv_get(conn, key)? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}
