//! API route definitions.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::error::ApiError;
use super::state::AppState;
use crate::provider::Credential;
use crate::reconcile::{ReconciliationSession, ReprobeOutcome};
use crate::submission::Document;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/submissions", post(submit))
        .route("/executions/{id}", get(execution_status).delete(cancel_execution))
        .route("/executions/{id}/refresh", post(refresh_execution))
        .route("/history", get(list_history))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

/// Multipart fields: `document` (file) and `token` (text).
async fn submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut document = None;
    let mut token = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        match field.name() {
            Some("document") => {
                let name = field.file_name().unwrap_or("Document").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                document = Some(Document::new(name, content_type, bytes));
            }
            Some("token") => {
                token = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(e.body_text()))?,
                );
            }
            _ => {}
        }
    }

    let document = document.ok_or_else(|| ApiError::bad_request("no document was uploaded"))?;
    let credential = Credential::new(token.unwrap_or_default());

    let reconciler = state.reconciler.clone();
    let handle = reconciler.submit(&document, credential).await?;
    let guard = reconciler.claim(&handle.execution_id)?;

    let body = json!({
        "data": {
            "execution_id": handle.execution_id.clone(),
            "file_name": handle.provider_file_ref.clone(),
        },
        "meta": meta()
    });

    let mut session = ReconciliationSession::new(handle, document.name);
    tokio::spawn(async move {
        match reconciler.reconcile(&mut session, &guard).await {
            Ok(outcome) => {
                info!(execution_id = %session.execution_id(), outcome = %outcome.kind(), "background reconciliation done")
            }
            Err(e) => {
                warn!(execution_id = %session.execution_id(), error = %e, "background reconciliation ended without outcome")
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(body)))
}

async fn execution_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.reconciler.inflight().contains(&id) {
        return Ok(Json(json!({
            "data": { "execution_id": id, "state": "polling" },
            "meta": meta()
        })));
    }
    let entry = state
        .reconciler
        .history()
        .find(&id)?
        .ok_or_else(|| ApiError::not_found(format!("execution {} not found", id)))?;
    Ok(Json(json!({ "data": { "state": "finished", "entry": entry }, "meta": meta() })))
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

async fn refresh_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Value>, ApiError> {
    let credential = Credential::new(query.token.unwrap_or_default());
    let result = state.reconciler.reprobe(&id, credential).await?;
    let data = match result {
        ReprobeOutcome::Succeeded(outcome) => json!({ "state": "succeeded", "outcome": outcome }),
        ReprobeOutcome::StillInReview => json!({ "state": "manual_review" }),
        ReprobeOutcome::Pending { status } => json!({ "state": "pending", "status": status }),
    };
    Ok(Json(json!({ "data": data, "meta": meta() })))
}

async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.reconciler.inflight().cancel(&id) {
        info!(execution_id = %id, "cancellation requested");
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::not_found(format!("no reconciliation running for {}", id)))
    }
}

async fn list_history(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let entries = state.reconciler.history().list()?;
    let total = entries.len();
    Ok(Json(json!({ "data": entries, "meta": { "total": total } })))
}
