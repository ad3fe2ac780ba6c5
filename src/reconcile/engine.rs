//! The polling state machine.
//!
//! `Idle -> Polling -> {Succeeded | ManualReview | TimedOut | Failed | Cancelled}`.
//! Terminal states are absorbing. Per probe, first match wins:
//!
//! 1. manual review requested -> `ManualReview`
//! 2. analysis succeeded      -> `Succeeded`
//! 3. attempt budget spent    -> `TimedOut`
//! 4. otherwise               -> wait one interval, probe again
//!
//! A non-retryable probe error ends the cycle as `Failed`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Clock, Outcome, ReconcileError};
use crate::config::PollingConfig;
use crate::probe::{ProbeError, ResultPayload, StatusProbe, StatusSnapshot};
use crate::provider::ExecutionHandle;

/// Summary used when the provider finished without a `Result` text.
pub const DEFAULT_RESULT_SUMMARY: &str = "Analysis complete";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before every probe, the first one included.
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(cfg: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval_secs),
            max_attempts: cfg.max_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Polling,
    Succeeded,
    ManualReview,
    TimedOut,
    Failed,
    Cancelled,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineState::Idle | EngineState::Polling)
    }
}

/// Everything one reconciliation cycle knows about its submission.
///
/// Owned by the caller and threaded through [`ReconciliationEngine::run`], so
/// concurrent sessions never share mutable state.
#[derive(Debug, Clone)]
pub struct ReconciliationSession {
    handle: ExecutionHandle,
    document_name: String,
    state: EngineState,
    attempts: u32,
}

impl ReconciliationSession {
    pub fn new(handle: ExecutionHandle, document_name: impl Into<String>) -> Self {
        Self {
            handle,
            document_name: document_name.into(),
            state: EngineState::Idle,
            attempts: 0,
        }
    }

    pub fn handle(&self) -> &ExecutionHandle {
        &self.handle
    }

    pub fn execution_id(&self) -> &str {
        &self.handle.execution_id
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// What a single snapshot says, before the attempt budget is considered.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    ManualReview,
    Succeeded(ResultPayload),
    Pending(String),
}

/// Rules 1 and 2 of the transition table; rule 4 otherwise.
pub fn classify(snapshot: StatusSnapshot) -> Classification {
    if snapshot.is_manual_review_required {
        Classification::ManualReview
    } else if snapshot.is_succeeded {
        Classification::Succeeded(snapshot.result_payload.unwrap_or_default())
    } else {
        Classification::Pending(snapshot.raw_status)
    }
}

/// Result of a single-shot re-probe.
pub type Reprobe = Classification;

/// Build the `Succeeded` outcome, falling back to the submitted name.
pub fn succeeded_outcome(payload: ResultPayload, fallback_name: &str) -> Outcome {
    Outcome::Succeeded {
        document_name: payload
            .document_name
            .unwrap_or_else(|| fallback_name.to_string()),
        result_summary: payload
            .summary
            .unwrap_or_else(|| DEFAULT_RESULT_SUMMARY.to_string()),
        extracted_fields: payload.extracted_fields,
    }
}

pub struct ReconciliationEngine {
    probe: Arc<dyn StatusProbe>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl ReconciliationEngine {
    pub fn new(probe: Arc<dyn StatusProbe>, clock: Arc<dyn Clock>, policy: PollPolicy) -> Self {
        Self {
            probe,
            clock,
            policy,
        }
    }

    /// Poll until the session reaches a terminal state.
    ///
    /// `cancel` is checked while waiting and before each probe; an in-flight
    /// probe is allowed to finish.
    pub async fn run(
        &self,
        session: &mut ReconciliationSession,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ReconcileError> {
        if session.state.is_terminal() {
            return Err(ReconcileError::AlreadyTerminal(session.state));
        }
        session.state = EngineState::Polling;
        info!(
            execution_id = %session.execution_id(),
            interval_secs = self.policy.interval.as_secs(),
            max_attempts = self.policy.max_attempts,
            "polling started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancel(session)),
                _ = self.clock.sleep(self.policy.interval) => {}
            }
            if cancel.is_cancelled() {
                return Err(self.cancel(session));
            }

            session.attempts += 1;
            let attempt = session.attempts;

            match self.probe.probe(&session.handle).await {
                Ok(snapshot) => match classify(snapshot) {
                    Classification::ManualReview => {
                        let outcome = Outcome::ManualReviewRequired {
                            execution_id: session.handle.execution_id.clone(),
                        };
                        return Ok(self.finish(session, EngineState::ManualReview, outcome));
                    }
                    Classification::Succeeded(payload) => {
                        let outcome = succeeded_outcome(payload, &session.document_name);
                        return Ok(self.finish(session, EngineState::Succeeded, outcome));
                    }
                    Classification::Pending(status) => {
                        debug!(execution_id = %session.execution_id(), attempt, %status, "still processing");
                    }
                },
                Err(e) if e.is_retryable() => {
                    warn!(execution_id = %session.execution_id(), attempt, error = %e, "probe timed out, will retry");
                }
                Err(e) => {
                    warn!(execution_id = %session.execution_id(), attempt, error = %e, "probe failed");
                    let outcome = Outcome::Failed { reason: e.reason() };
                    return Ok(self.finish(session, EngineState::Failed, outcome));
                }
            }

            if attempt >= self.policy.max_attempts {
                return Ok(self.finish(session, EngineState::TimedOut, Outcome::TimedOut));
            }
        }
    }

    /// One probe, classified without an attempt budget. Does not touch any session.
    pub async fn reprobe(&self, handle: &ExecutionHandle) -> Result<Reprobe, ProbeError> {
        let snapshot = self.probe.probe(handle).await?;
        let verdict = classify(snapshot);
        debug!(execution_id = %handle.execution_id, ?verdict, "re-probe classified");
        Ok(verdict)
    }

    fn finish(
        &self,
        session: &mut ReconciliationSession,
        state: EngineState,
        outcome: Outcome,
    ) -> Outcome {
        session.state = state;
        info!(
            execution_id = %session.execution_id(),
            attempts = session.attempts,
            outcome = %outcome.kind(),
            "reconciliation finished"
        );
        outcome
    }

    fn cancel(&self, session: &mut ReconciliationSession) -> ReconcileError {
        session.state = EngineState::Cancelled;
        info!(execution_id = %session.execution_id(), attempts = session.attempts, "reconciliation cancelled");
        ReconcileError::Cancelled {
            attempts: session.attempts,
        }
    }
}
