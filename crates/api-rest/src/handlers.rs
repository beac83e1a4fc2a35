use crate::dto::*;
use crate::error::ApiError;
use crate::{lock_session, AppState, Session};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use bcma_core::{
    classify, CompletionDetails, NonEmptyText, ScanDispatcher, Workflow, WorkflowContext,
};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn with_session<T>(
    state: &AppState,
    id: Uuid,
    f: impl FnOnce(&mut Session) -> Result<T, ApiError>,
) -> Result<T, ApiError> {
    let session = state.session(id).ok_or(ApiError::SessionNotFound(id))?;
    let mut guard = lock_session(&session);
    f(&mut *guard)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "BCMA REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/barcodes/classify",
    request_body = ClassifyReq,
    responses(
        (status = 200, description = "Barcode classification", body = ClassifyRes)
    )
)]
/// Classify a barcode without touching any workflow.
pub async fn classify_barcode(
    State(_state): State<AppState>,
    Json(req): Json<ClassifyReq>,
) -> Json<ClassifyRes> {
    Json(classify(&req.raw).into())
}

#[utoipa::path(
    post,
    path = "/workflows",
    request_body = CreateWorkflowReq,
    responses(
        (status = 201, description = "Workflow session created", body = CreateWorkflowRes),
        (status = 400, description = "Bad request", body = ErrorRes)
    )
)]
/// Start a verification workflow for one patient and one scheduled medication.
///
/// The session owns its own scan dispatcher; scans posted to `/workflows/{id}/scans` are
/// delivered only to this workflow.
#[axum::debug_handler]
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkflowReq>,
) -> Result<(StatusCode, Json<CreateWorkflowRes>), ApiError> {
    let operator = NonEmptyText::new(&req.operator)
        .map_err(|_| ApiError::BadRequest("operator is required".into()))?;
    if req.patient.id.trim().is_empty() || req.medication.id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "patient and medication identifiers are required".into(),
        ));
    }

    let mut context = WorkflowContext::new(req.patient.into(), req.medication.into(), operator);
    if let Some(route) = req.administering_route.filter(|r| !r.trim().is_empty()) {
        context = context.with_administering_route(route);
    }

    let mut dispatcher = ScanDispatcher::new(&state.config, state.clock.clone());
    let workflow = Workflow::with_dispatcher(
        context,
        state.config.clone(),
        state.clock.clone(),
        &mut dispatcher,
    );

    let id = Uuid::new_v4();
    let status = WorkflowStatusRes::from_workflow(id, &workflow);
    state.lock_sessions().insert(
        id,
        Arc::new(Mutex::new(Session {
            dispatcher,
            workflow,
        })),
    );

    tracing::info!("created workflow session {}", id.simple());
    Ok((
        StatusCode::CREATED,
        Json(CreateWorkflowRes {
            id: id.simple().to_string(),
            status,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/workflows/{id}",
    params(("id" = String, Path, description = "Workflow session id")),
    responses(
        (status = 200, description = "Workflow status", body = WorkflowStatusRes),
        (status = 404, description = "Unknown session", body = ErrorRes)
    )
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowStatusRes>, ApiError> {
    with_session(&state, id, |s| {
        Ok(Json(WorkflowStatusRes::from_workflow(id, &s.workflow)))
    })
}

#[utoipa::path(
    delete,
    path = "/workflows/{id}",
    params(("id" = String, Path, description = "Workflow session id")),
    responses(
        (status = 204, description = "Workflow discarded"),
        (status = 404, description = "Unknown session", body = ErrorRes)
    )
)]
/// Cancel a workflow by discarding it. Nothing captured so far is kept.
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    match state.lock_sessions().remove(&id) {
        Some(_) => {
            tracing::info!("cancelled workflow session {}", id.simple());
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::SessionNotFound(id)),
    }
}

#[utoipa::path(
    post,
    path = "/workflows/{id}/scans",
    params(("id" = String, Path, description = "Workflow session id")),
    request_body = ScanReq,
    responses(
        (status = 200, description = "Scan processed", body = ScanRes),
        (status = 404, description = "Unknown session", body = ErrorRes),
        (status = 422, description = "Wrong or unknown barcode", body = ErrorRes)
    )
)]
/// Deliver a decoded scanner read through the session's dispatcher.
pub async fn scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ScanReq>,
) -> Result<Json<ScanRes>, ApiError> {
    with_session(&state, id, |s| {
        let dispatch = s.dispatcher.publish(&req.raw);
        let outcome = s
            .workflow
            .pump()
            .pop()
            .transpose()?
            .map(|o| outcome_name(&o).to_string());

        Ok(Json(ScanRes {
            dispatch: dispatch_name(dispatch).to_string(),
            outcome,
            status: WorkflowStatusRes::from_workflow(id, &s.workflow),
        }))
    })
}

#[utoipa::path(
    post,
    path = "/workflows/{id}/manual",
    params(("id" = String, Path, description = "Workflow session id")),
    request_body = ManualEntryReq,
    responses(
        (status = 200, description = "Entry processed", body = ScanRes),
        (status = 404, description = "Unknown session", body = ErrorRes),
        (status = 422, description = "Wrong or unknown barcode", body = ErrorRes)
    )
)]
/// Typed fallback for a barcode that will not scan.
pub async fn manual_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ManualEntryReq>,
) -> Result<Json<ScanRes>, ApiError> {
    with_session(&state, id, |s| {
        let outcome = s.workflow.manual_entry(&req.text)?;
        Ok(Json(ScanRes {
            dispatch: "delivered".into(),
            outcome: Some(outcome_name(&outcome).to_string()),
            status: WorkflowStatusRes::from_workflow(id, &s.workflow),
        }))
    })
}

#[utoipa::path(
    post,
    path = "/workflows/{id}/override",
    params(("id" = String, Path, description = "Workflow session id")),
    request_body = OverrideReq,
    responses(
        (status = 200, description = "Override applied", body = OverrideRes),
        (status = 409, description = "Workflow not verifying", body = ErrorRes),
        (status = 422, description = "Missing justification or nothing to override", body = ErrorRes)
    )
)]
pub async fn override_checks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<OverrideReq>,
) -> Result<Json<OverrideRes>, ApiError> {
    with_session(&state, id, |s| {
        let flipped = s.workflow.override_checks(&req.justification)?;
        Ok(Json(OverrideRes {
            overridden: flipped.iter().map(|r| r.as_str().to_string()).collect(),
            status: WorkflowStatusRes::from_workflow(id, &s.workflow),
        }))
    })
}

#[utoipa::path(
    post,
    path = "/workflows/{id}/reading",
    params(("id" = String, Path, description = "Workflow session id")),
    request_body = ReadingReq,
    responses(
        (status = 200, description = "Reading recorded", body = WorkflowStatusRes),
        (status = 409, description = "Workflow not verifying", body = ErrorRes),
        (status = 422, description = "Reading out of range or not applicable", body = ErrorRes)
    )
)]
pub async fn record_reading(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReadingReq>,
) -> Result<Json<WorkflowStatusRes>, ApiError> {
    let captured_at = req.captured_at.unwrap_or_else(|| state.clock.now());
    with_session(&state, id, |s| {
        s.workflow.record_reading(req.value, captured_at)?;
        Ok(Json(WorkflowStatusRes::from_workflow(id, &s.workflow)))
    })
}

#[utoipa::path(
    post,
    path = "/workflows/{id}/revalidate",
    params(("id" = String, Path, description = "Workflow session id")),
    responses(
        (status = 200, description = "Rights recomputed", body = WorkflowStatusRes),
        (status = 409, description = "Workflow not verifying", body = ErrorRes)
    )
)]
pub async fn revalidate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowStatusRes>, ApiError> {
    with_session(&state, id, |s| {
        s.workflow.revalidate()?;
        Ok(Json(WorkflowStatusRes::from_workflow(id, &s.workflow)))
    })
}

#[utoipa::path(
    post,
    path = "/workflows/{id}/complete",
    params(("id" = String, Path, description = "Workflow session id")),
    request_body = CompleteReq,
    responses(
        (status = 200, description = "Administration recorded", body = CompleteRes),
        (status = 409, description = "Validation failing or reading required", body = ErrorRes),
        (status = 422, description = "Missing verifier", body = ErrorRes),
        (status = 503, description = "Store unavailable; retry", body = ErrorRes)
    )
)]
/// Record the administration.
///
/// The store write runs on the blocking pool so a slow disk never stalls other sessions. On
/// success the session is closed and its id stops resolving. On `503` the session stays in
/// `verifying` and the same request can be retried.
#[axum::debug_handler]
pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteReq>,
) -> Result<Json<CompleteRes>, ApiError> {
    let details = CompletionDetails {
        verifier: req.verifier,
        witness: req.witness,
        notes: req.notes,
    };
    let session = state.session(id).ok_or(ApiError::SessionNotFound(id))?;
    let store = state.store.clone();

    let res = tokio::task::spawn_blocking(move || -> Result<CompleteRes, ApiError> {
        let mut s = lock_session(&session);
        let log = s.workflow.complete(details, store.as_ref())?;
        let log = serde_json::to_value(&log)
            .map_err(|e| ApiError::Internal(format!("failed to serialise log: {e}")))?;
        Ok(CompleteRes {
            status: WorkflowStatusRes::from_workflow(id, &s.workflow),
            log,
        })
    })
    .await
    .map_err(|e| ApiError::Internal(format!("completion task failed: {e}")))??;

    state.lock_sessions().remove(&id);
    tracing::info!("closed completed workflow session {}", id.simple());
    Ok(Json(res))
}
