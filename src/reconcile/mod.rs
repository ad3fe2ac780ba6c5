//! Execution-status reconciliation: drive a submitted job to one terminal outcome.

pub mod clock;
pub mod engine;
pub mod inflight;
pub mod service;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use self::clock::{Clock, TokioClock};
pub use self::engine::{
    classify, Classification, EngineState, PollPolicy, ReconciliationEngine,
    ReconciliationSession, Reprobe,
};
pub use self::service::{Reconciler, ReprobeOutcome, ServiceError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("reconciliation cancelled after {attempts} probe(s)")]
    Cancelled { attempts: u32 },

    #[error("session already reached a terminal state ({0:?})")]
    AlreadyTerminal(EngineState),
}

/// The single terminal result of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Succeeded {
        document_name: String,
        result_summary: String,
        extracted_fields: Option<Map<String, Value>>,
    },
    #[serde(rename = "MANUAL_VALIDATION_REQUIRED")]
    ManualReviewRequired { execution_id: String },
    TimedOut,
    Failed { reason: String },
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Succeeded { .. } => OutcomeKind::Succeeded,
            Outcome::ManualReviewRequired { .. } => OutcomeKind::ManualReviewRequired,
            Outcome::TimedOut => OutcomeKind::TimedOut,
            Outcome::Failed { .. } => OutcomeKind::Failed,
        }
    }
}

/// Persisted discriminant of an [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Succeeded,
    #[serde(rename = "MANUAL_VALIDATION_REQUIRED")]
    ManualReviewRequired,
    TimedOut,
    Failed,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Succeeded => write!(f, "SUCCEEDED"),
            OutcomeKind::ManualReviewRequired => write!(f, "MANUAL_VALIDATION_REQUIRED"),
            OutcomeKind::TimedOut => write!(f, "TIMED_OUT"),
            OutcomeKind::Failed => write!(f, "FAILED"),
        }
    }
}
