use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::reconcile::ServiceError;
use crate::storage::StorageError;
use crate::submission::SubmissionError;

/// Error body: `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        let (status, code) = match &e {
            ServiceError::Submission(SubmissionError::InvalidDocument { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_document")
            }
            ServiceError::Submission(SubmissionError::MissingCredential)
            | ServiceError::MissingCredential => (StatusCode::BAD_REQUEST, "missing_token"),
            ServiceError::Submission(SubmissionError::SubmissionFailed { .. }) => {
                (StatusCode::BAD_GATEWAY, "submission_failed")
            }
            ServiceError::Probe(_) => (StatusCode::BAD_GATEWAY, "probe_failed"),
            ServiceError::UnknownExecution(_) => (StatusCode::NOT_FOUND, "unknown_execution"),
            ServiceError::MissingFileReference(_) => (StatusCode::CONFLICT, "missing_file_reference"),
            ServiceError::AlreadyInFlight(_) => (StatusCode::CONFLICT, "already_in_flight"),
            ServiceError::Reconcile(_) | ServiceError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        Self {
            status,
            code,
            message: e.to_string(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ServiceError::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        }
        let body = Json(json!({
            "error": { "code": self.code, "message": self.message }
        }));
        (self.status, body).into_response()
    }
}
