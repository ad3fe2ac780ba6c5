//! Status probe: one provider round-trip, normalized into a [`StatusSnapshot`].
//!
//! Every quirk of the provider's response shape is handled in [`normalize`];
//! nothing downstream looks at raw provider fields.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::provider::{AnalysisProvider, ExecutionHandle, ProviderError};

const STATUS_SUCCEEDED: &str = "SUCCEEDED";
const STATUS_IN_REVIEW: &str = "in review, wait a few minutes";
const STATUS_MANUAL_VALIDATION: &str = "MANUAL_VALIDATION_REQUIRED";
const STATUS_DEFAULT: &str = "processing";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("status query timed out")]
    Timeout,

    #[error("status query failed: {0}")]
    Transport(String),

    #[error("status query returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("unreadable status response: {0}")]
    Malformed(String),

    #[error("status query rejected: {0}")]
    Rejected(String),
}

impl ProbeError {
    /// Only a timed-out request may be followed by another attempt in the same cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProbeError::Timeout)
    }

    pub fn reason(&self) -> String {
        match self {
            ProbeError::Http { message, .. } => message.clone(),
            ProbeError::Rejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ProviderError> for ProbeError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Timeout => ProbeError::Timeout,
            ProviderError::Transport(m) => ProbeError::Transport(m),
            ProviderError::Http { status, message } => ProbeError::Http { status, message },
            ProviderError::Malformed(m) => ProbeError::Malformed(m),
            ProviderError::Rejected(m) => ProbeError::Rejected(m),
        }
    }
}

/// Result data attached to a finished analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPayload {
    pub summary: Option<String>,
    pub document_name: Option<String>,
    /// Fields extracted from the document (`check_infos` for passports).
    pub extracted_fields: Option<Map<String, Value>>,
}

/// Normalized view of one probe.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub raw_status: String,
    pub is_manual_review_required: bool,
    pub is_succeeded: bool,
    pub result_payload: Option<ResultPayload>,
}

impl StatusSnapshot {
    pub fn pending(status: impl Into<String>) -> Self {
        Self {
            raw_status: status.into(),
            is_manual_review_required: false,
            is_succeeded: false,
            result_payload: None,
        }
    }

    pub fn succeeded(payload: ResultPayload) -> Self {
        Self {
            raw_status: STATUS_SUCCEEDED.to_string(),
            is_manual_review_required: false,
            is_succeeded: true,
            result_payload: Some(payload),
        }
    }

    pub fn manual_review() -> Self {
        Self {
            raw_status: STATUS_IN_REVIEW.to_string(),
            is_manual_review_required: true,
            is_succeeded: false,
            result_payload: None,
        }
    }
}

/// Map a provider status body onto a snapshot.
///
/// Accepted shapes:
/// - `status: "SUCCEEDED"` with a payload.
/// - `Result` plus a `datas` object, whatever the status (some provider
///   builds omit it).
/// - `status: "in review, wait a few minutes"`, `isManualValidationRequired: true`,
///   or `datas.status: "MANUAL_VALIDATION_REQUIRED"`.
///
/// Anything else is still running.
pub fn normalize(body: &Value) -> StatusSnapshot {
    let status = str_field(body, "status");
    let datas = body.get("datas").and_then(Value::as_object);
    let result = str_field(body, "Result");

    let manual = status == Some(STATUS_IN_REVIEW)
        || body.get("isManualValidationRequired").and_then(Value::as_bool) == Some(true)
        || datas
            .and_then(|d| d.get("status"))
            .and_then(Value::as_str)
            == Some(STATUS_MANUAL_VALIDATION);

    let succeeded =
        status == Some(STATUS_SUCCEEDED) || (result.is_some() && datas.is_some());

    let result_payload = (succeeded || result.is_some() || datas.is_some()).then(|| ResultPayload {
        summary: result.map(str::to_string),
        document_name: str_field(body, "documentName")
            .or_else(|| datas.and_then(|d| d.get("documentName")).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        extracted_fields: datas
            .and_then(|d| d.get("check_infos"))
            .and_then(Value::as_object)
            .cloned(),
    });

    StatusSnapshot {
        raw_status: status.unwrap_or(STATUS_DEFAULT).to_string(),
        is_manual_review_required: manual,
        is_succeeded: succeeded,
        result_payload,
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// One status query for one execution.
#[async_trait::async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self, handle: &ExecutionHandle) -> Result<StatusSnapshot, ProbeError>;
}

/// [`StatusProbe`] over an [`AnalysisProvider`].
#[derive(Clone)]
pub struct ProviderProbe {
    provider: Arc<dyn AnalysisProvider>,
}

impl ProviderProbe {
    pub fn new(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl StatusProbe for ProviderProbe {
    async fn probe(&self, handle: &ExecutionHandle) -> Result<StatusSnapshot, ProbeError> {
        let body = self
            .provider
            .query_execution(&handle.execution_id, &handle.provider_file_ref, &handle.credential)
            .await?;
        let snapshot = normalize(&body);
        debug!(
            execution_id = %handle.execution_id,
            status = %snapshot.raw_status,
            succeeded = snapshot.is_succeeded,
            manual_review = snapshot.is_manual_review_required,
            "probe complete"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explicit_succeeded() {
        let snap = normalize(&json!({
            "status": "SUCCEEDED",
            "Result": "OK",
            "datas": {"documentName": "scan.pdf"}
        }));
        assert!(snap.is_succeeded);
        assert!(!snap.is_manual_review_required);
        let payload = snap.result_payload.unwrap();
        assert_eq!(payload.summary.as_deref(), Some("OK"));
        assert_eq!(payload.document_name.as_deref(), Some("scan.pdf"));
    }

    #[test]
    fn test_result_with_datas_but_no_status_is_succeeded() {
        let snap = normalize(&json!({"Result": "X", "datas": {"foo": 1}}));
        assert!(snap.is_succeeded);
        assert_eq!(snap.raw_status, "processing");
        assert_eq!(snap.result_payload.unwrap().summary.as_deref(), Some("X"));
    }

    #[test]
    fn test_result_without_datas_is_not_succeeded() {
        let snap = normalize(&json!({"Result": "X"}));
        assert!(!snap.is_succeeded);
    }

    #[test]
    fn test_empty_result_is_not_succeeded() {
        let snap = normalize(&json!({"Result": "", "datas": {}}));
        assert!(!snap.is_succeeded);
    }

    #[test]
    fn test_in_review_status_is_manual() {
        let snap = normalize(&json!({"status": "in review, wait a few minutes"}));
        assert!(snap.is_manual_review_required);
        assert!(!snap.is_succeeded);
    }

    #[test]
    fn test_manual_flag_is_manual() {
        let snap = normalize(&json!({"status": "RUNNING", "isManualValidationRequired": true}));
        assert!(snap.is_manual_review_required);
        assert_eq!(snap.raw_status, "RUNNING");
    }

    #[test]
    fn test_nested_manual_validation_status_is_manual() {
        let snap = normalize(&json!({
            "Result": "Validation requise",
            "datas": {"status": "MANUAL_VALIDATION_REQUIRED", "documentName": "p.png"}
        }));
        assert!(snap.is_manual_review_required);
    }

    #[test]
    fn test_unknown_shape_is_pending_with_default_status() {
        let snap = normalize(&json!({}));
        assert_eq!(snap, StatusSnapshot::pending("processing"));

        let snap = normalize(&json!({"status": "RUNNING"}));
        assert_eq!(snap.raw_status, "RUNNING");
        assert!(!snap.is_succeeded && !snap.is_manual_review_required);
    }

    #[test]
    fn test_passport_fields_extracted() {
        let snap = normalize(&json!({
            "status": "SUCCEEDED",
            "Result": "Passeport valide",
            "datas": {
                "documentName": "passport.jpg",
                "check_infos": {"numero_passeport": "AB123", "nom": "DIOP", "prenom": "Awa", "date": "2031-04-02"}
            }
        }));
        let fields = snap.result_payload.unwrap().extracted_fields.unwrap();
        assert_eq!(fields["numero_passeport"], "AB123");
        assert_eq!(fields["nom"], "DIOP");
    }

    #[test]
    fn test_top_level_document_name_wins() {
        let snap = normalize(&json!({
            "status": "SUCCEEDED",
            "documentName": "top.pdf",
            "datas": {"documentName": "nested.pdf"}
        }));
        assert_eq!(snap.result_payload.unwrap().document_name.as_deref(), Some("top.pdf"));
    }

    #[test]
    fn test_only_timeout_is_retryable() {
        assert!(ProbeError::Timeout.is_retryable());
        assert!(!ProbeError::Transport("refused".into()).is_retryable());
        assert!(!ProbeError::Http { status: 500, message: "boom".into() }.is_retryable());
        assert!(!ProbeError::Malformed("eof".into()).is_retryable());
    }

    #[test]
    fn test_reason_prefers_provider_message() {
        let err = ProbeError::Http { status: 500, message: "Erreur".into() };
        assert_eq!(err.reason(), "Erreur");
    }
}
