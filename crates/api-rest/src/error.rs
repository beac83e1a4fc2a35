//! Mapping of core errors onto HTTP responses.

use crate::dto::ErrorRes;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bcma_core::WorkflowError;
use uuid::Uuid;

#[derive(Debug)]
pub enum ApiError {
    SessionNotFound(Uuid),
    BadRequest(String),
    Internal(String),
    Workflow(WorkflowError),
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        ApiError::Workflow(e)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            ApiError::Workflow(e) => workflow_status(e),
        }
    }
}

fn workflow_status(e: &WorkflowError) -> (StatusCode, &'static str) {
    use WorkflowError::*;

    let unprocessable = StatusCode::UNPROCESSABLE_ENTITY;
    match e {
        WrongBarcodeType { .. } => (unprocessable, "wrong_barcode_type"),
        UnknownBarcodeFormat(_) => (unprocessable, "unknown_barcode_format"),
        ReadingOutOfRange { .. } => (unprocessable, "reading_out_of_range"),
        MissingJustification => (unprocessable, "missing_justification"),
        MissingVerifier => (unprocessable, "missing_verifier"),
        ReadingNotApplicable { .. } => (unprocessable, "reading_not_applicable"),
        NothingToOverride => (unprocessable, "nothing_to_override"),
        ValidationFailed { .. } => (StatusCode::CONFLICT, "validation_failed"),
        ReadingRequired { .. } => (StatusCode::CONFLICT, "reading_required"),
        InvalidState { .. } => (StatusCode::CONFLICT, "invalid_state"),
        WorkflowComplete => (StatusCode::CONFLICT, "workflow_complete"),
        PersistenceFailure(_) => (StatusCode::SERVICE_UNAVAILABLE, "persistence_failure"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::SessionNotFound(id) => format!("no workflow session {}", id.simple()),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg.clone(),
            ApiError::Workflow(e) => e.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("request failed: {message}");
        }

        (
            status,
            Json(ErrorRes {
                error: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}
