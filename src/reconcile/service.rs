//! Ties the gateway, engine and ledger together for one application.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use super::engine::succeeded_outcome;
use super::inflight::{InFlight, InFlightGuard};
use super::{
    Classification, Clock, Outcome, PollPolicy, ReconcileError, ReconciliationEngine,
    ReconciliationSession,
};
use crate::probe::{ProbeError, ProviderProbe, StatusProbe};
use crate::provider::{AnalysisProvider, Credential, ExecutionHandle};
use crate::storage::{HistoryEntry, HistoryStore, StorageError};
use crate::submission::{Document, SubmissionError, SubmissionGateway};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("execution {0} is not in the local history")]
    UnknownExecution(String),

    #[error("execution {0} has no provider file reference; resubmit the document")]
    MissingFileReference(String),

    #[error("execution {0} is already being reconciled")]
    AlreadyInFlight(String),

    #[error("an IDP token is required")]
    MissingCredential,
}

/// Result of an operator-initiated re-probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ReprobeOutcome {
    /// Converged; the history entry now holds this outcome.
    Succeeded(Outcome),
    /// Still waiting on a human; history entry confirmed.
    StillInReview,
    /// Provider is still working; history untouched.
    Pending { status: String },
}

/// Application-level entry point to the reconciliation core.
#[derive(Clone)]
pub struct Reconciler {
    gateway: SubmissionGateway,
    engine: Arc<ReconciliationEngine>,
    history: HistoryStore,
    inflight: InFlight,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        clock: Arc<dyn Clock>,
        policy: PollPolicy,
        history: HistoryStore,
    ) -> Self {
        let probe: Arc<dyn StatusProbe> = Arc::new(ProviderProbe::new(provider.clone()));
        Self {
            gateway: SubmissionGateway::new(provider),
            engine: Arc::new(ReconciliationEngine::new(probe, clock, policy)),
            history,
            inflight: InFlight::new(),
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn inflight(&self) -> &InFlight {
        &self.inflight
    }

    /// Validate and upload. Nothing is recorded yet.
    pub async fn submit(
        &self,
        document: &Document,
        credential: Credential,
    ) -> Result<ExecutionHandle, ServiceError> {
        Ok(self.gateway.submit(document, credential).await?)
    }

    /// Claim an execution before polling it. Hold the guard for the whole cycle.
    pub fn claim(&self, execution_id: &str) -> Result<InFlightGuard, ServiceError> {
        self.inflight
            .claim(execution_id)
            .ok_or_else(|| ServiceError::AlreadyInFlight(execution_id.to_string()))
    }

    /// Poll `session` to a terminal outcome and record it.
    ///
    /// Cancelling the guard's token (see [`InFlight::cancel`]) ends the cycle
    /// without touching history.
    pub async fn reconcile(
        &self,
        session: &mut ReconciliationSession,
        guard: &InFlightGuard,
    ) -> Result<Outcome, ServiceError> {
        let outcome = self.engine.run(session, guard.token()).await?;

        let entry = HistoryEntry::from_outcome(
            session.execution_id(),
            session.document_name(),
            Some(&session.handle().provider_file_ref),
            &outcome,
            Utc::now(),
        );
        self.history.record(entry)?;
        Ok(outcome)
    }

    /// Submit and reconcile in one call (foreground use, e.g. the CLI).
    pub async fn submit_and_reconcile(
        &self,
        document: &Document,
        credential: Credential,
    ) -> Result<Outcome, ServiceError> {
        let handle = self.submit(document, credential).await?;
        let guard = self.claim(&handle.execution_id)?;
        let mut session = ReconciliationSession::new(handle, document.name.clone());
        self.reconcile(&mut session, &guard).await
    }

    /// One status query for an execution already in history.
    ///
    /// Succeeded and manual-review verdicts update the entry in place. Any
    /// error leaves history untouched.
    pub async fn reprobe(
        &self,
        execution_id: &str,
        credential: Credential,
    ) -> Result<ReprobeOutcome, ServiceError> {
        if credential.is_empty() {
            return Err(ServiceError::MissingCredential);
        }
        let entry = self
            .history
            .find(execution_id)?
            .ok_or_else(|| ServiceError::UnknownExecution(execution_id.to_string()))?;
        let file_ref = entry
            .provider_file_ref
            .clone()
            .ok_or_else(|| ServiceError::MissingFileReference(execution_id.to_string()))?;
        let _guard = self.claim(execution_id)?;

        let handle = ExecutionHandle {
            execution_id: execution_id.to_string(),
            provider_file_ref: file_ref,
            credential,
        };
        let verdict = self.engine.reprobe(&handle).await.map_err(|e| {
            warn!(%execution_id, error = %e, "re-probe failed, history unchanged");
            e
        })?;

        match verdict {
            Classification::Succeeded(payload) => {
                let outcome = succeeded_outcome(payload, &entry.document_name);
                self.record_reprobe(&entry, &outcome)?;
                info!(%execution_id, "re-probe converged");
                Ok(ReprobeOutcome::Succeeded(outcome))
            }
            Classification::ManualReview => {
                let outcome = Outcome::ManualReviewRequired {
                    execution_id: execution_id.to_string(),
                };
                self.record_reprobe(&entry, &outcome)?;
                info!(%execution_id, "still awaiting manual validation");
                Ok(ReprobeOutcome::StillInReview)
            }
            Classification::Pending(status) => {
                info!(%execution_id, %status, "re-probe: still processing");
                Ok(ReprobeOutcome::Pending { status })
            }
        }
    }

    fn record_reprobe(&self, entry: &HistoryEntry, outcome: &Outcome) -> Result<(), StorageError> {
        let update = HistoryEntry::from_outcome(
            &entry.execution_id,
            &entry.document_name,
            entry.provider_file_ref.as_deref(),
            outcome,
            Utc::now(),
        );
        self.history.record(update)?;
        Ok(())
    }
}
