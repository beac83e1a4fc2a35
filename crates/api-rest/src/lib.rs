//! # API REST
//!
//! REST surface for BCMA verification workflows.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - Session bookkeeping: one [`Workflow`] and its [`ScanDispatcher`] per session id
//!
//! All verification rules live in `bcma-core`; this crate only maps them onto HTTP.

#![warn(rust_2018_idioms)]

pub mod dto;
pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use bcma_core::{AdministrationStore, BcmaConfig, Clock, ScanDispatcher, Workflow};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::dto::*;
use crate::handlers::*;

/// A live workflow together with the dispatcher feeding it.
pub struct Session {
    pub dispatcher: ScanDispatcher,
    pub workflow: Workflow,
}

pub(crate) fn lock_session(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) type SharedSession = Arc<Mutex<Session>>;

/// Application state shared by all request handlers.
///
/// The session table lock is only held to look a session up, insert or remove it. Work on a
/// session happens under that session's own lock.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BcmaConfig>,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn AdministrationStore>,
    sessions: Arc<Mutex<HashMap<Uuid, SharedSession>>>,
}

impl AppState {
    pub fn new(
        config: Arc<BcmaConfig>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn AdministrationStore>,
    ) -> Self {
        Self {
            config,
            clock,
            store,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn lock_sessions(&self) -> MutexGuard<'_, HashMap<Uuid, SharedSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn session(&self, id: Uuid) -> Option<SharedSession> {
        self.lock_sessions().get(&id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        classify_barcode,
        create_workflow,
        get_workflow,
        cancel_workflow,
        scan,
        manual_entry,
        override_checks,
        record_reading,
        revalidate,
        complete,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        ClassifyReq,
        ClassifyRes,
        PatientReq,
        MedicationReq,
        CreateWorkflowReq,
        CreateWorkflowRes,
        ChecksDto,
        WorkflowStatusRes,
        ScanReq,
        ManualEntryReq,
        ScanRes,
        OverrideReq,
        OverrideRes,
        ReadingReq,
        CompleteReq,
        CompleteRes,
    ))
)]
pub struct ApiDoc;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/barcodes/classify", post(classify_barcode))
        .route("/workflows", post(create_workflow))
        .route("/workflows/:id", get(get_workflow).delete(cancel_workflow))
        .route("/workflows/:id/scans", post(scan))
        .route("/workflows/:id/manual", post(manual_entry))
        .route("/workflows/:id/override", post(override_checks))
        .route("/workflows/:id/reading", post(record_reading))
        .route("/workflows/:id/revalidate", post(revalidate))
        .route("/workflows/:id/complete", post(complete))
        .merge(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
///
/// # Errors
/// Returns an error if:
/// - the address cannot be bound, or
/// - the HTTP server fails while running.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    tracing::info!("-- Starting BCMA REST API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use bcma_core::{FixedClock, InMemoryAdministrationStore};
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_state() -> (AppState, Arc<InMemoryAdministrationStore>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid date"),
        ));
        let store = Arc::new(InMemoryAdministrationStore::new());
        let state = AppState::new(Arc::new(BcmaConfig::default()), clock, store.clone());
        (state, store)
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(b) => builder.body(Body::from(b.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");

        let response = router(state.clone())
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    fn create_body(category: &str) -> Value {
        json!({
            "patient": {
                "id": "PT12345",
                "display_name": "Ada Lovelace",
                "date_of_birth": "1950-12-10"
            },
            "medication": {
                "id": "MA00001",
                "name": "Insulin glargine",
                "dose": "10 units",
                "ordered_dose": "10 Units",
                "route": "SC",
                "scheduled_time": "2026-03-02T09:00:00Z",
                "category": category
            },
            "operator": "nurse.jones",
            "administering_route": "sc"
        })
    }

    async fn create(state: &AppState, category: &str) -> String {
        let (status, body) = call(state, "POST", "/workflows", Some(create_body(category))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"]["state"], "awaiting_patient_scan");
        body["id"].as_str().expect("session id").to_string()
    }

    #[tokio::test]
    async fn health_reports_alive() {
        let (state, _) = test_state();
        let (status, body) = call(&state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn classify_reports_kind_and_value() {
        let (state, _) = test_state();
        let (status, body) =
            call(&state, "POST", "/barcodes/classify", Some(json!({"raw": "PAT-777"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "patient");
        assert_eq!(body["format"], "legacy");
        assert_eq!(body["value"], "PAT-777");
    }

    #[tokio::test]
    async fn full_administration_over_http() {
        let (state, store) = test_state();
        let id = create(&state, "general").await;

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/scans"),
            Some(json!({"raw": "PT12345"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "patient_accepted");
        assert_eq!(body["status"]["state"], "awaiting_medication_scan");

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/scans"),
            Some(json!({"raw": "MA00001"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["state"], "verifying");
        assert_eq!(body["status"]["is_valid"], true);

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/complete"),
            Some(json!({"verifier": "nurse.smith"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["state"], "complete");
        assert_eq!(body["log"]["patient_id"], "PT12345");
        assert_eq!(store.logs().len(), 1);

        assert_eq!(state.session_count(), 0);
        let (status, body) = call(&state, "GET", &format!("/workflows/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session_not_found");
    }

    /// Store that reports when a write starts and holds it until released.
    struct GatedStore {
        entered: Mutex<std::sync::mpsc::Sender<()>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
        inner: InMemoryAdministrationStore,
    }

    impl AdministrationStore for GatedStore {
        fn persist(&self, log: &bcma_core::AdministrationLog) -> bcma_core::StoreResult<()> {
            let _ = self.entered.lock().expect("lock").send(());
            let _ = self.release.lock().expect("lock").recv();
            self.inner.persist(log)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_store_write_does_not_block_other_sessions() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let store = Arc::new(GatedStore {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            inner: InMemoryAdministrationStore::new(),
        });
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid date"),
        ));
        let state = AppState::new(Arc::new(BcmaConfig::default()), clock, store.clone());

        let first = create(&state, "general").await;
        let second = create(&state, "general").await;
        for raw in ["PT12345", "MA00001"] {
            call(&state, "POST", &format!("/workflows/{first}/scans"), Some(json!({"raw": raw}))).await;
        }

        let pending = tokio::spawn({
            let state = state.clone();
            async move {
                call(
                    &state,
                    "POST",
                    &format!("/workflows/{first}/complete"),
                    Some(json!({"verifier": "nurse.smith"})),
                )
                .await
            }
        });

        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .expect("join")
            .expect("store write started");

        let (status, body) = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            call(&state, "POST", &format!("/workflows/{second}/scans"), Some(json!({"raw": "PT12345"}))),
        )
        .await
        .expect("other session answers while the write is in flight");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "patient_accepted");

        release_tx.send(()).expect("release store");
        let (status, body) = pending.await.expect("complete task");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["state"], "complete");
        assert_eq!(store.inner.logs().len(), 1);
        assert_eq!(state.session_count(), 1);
    }

    #[tokio::test]
    async fn wrong_barcode_type_is_unprocessable() {
        let (state, _) = test_state();
        let id = create(&state, "general").await;

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/scans"),
            Some(json!({"raw": "MA00001"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "wrong_barcode_type");

        let (_, body) = call(&state, "GET", &format!("/workflows/{id}"), None).await;
        assert_eq!(body["state"], "awaiting_patient_scan");
    }

    #[tokio::test]
    async fn mismatch_requires_override_before_completion() {
        let (state, store) = test_state();
        let id = create(&state, "general").await;

        call(&state, "POST", &format!("/workflows/{id}/manual"), Some(json!({"text": "PT99999"}))).await;
        let (_, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/manual"),
            Some(json!({"text": "MA00001"})),
        )
        .await;
        assert_eq!(body["status"]["is_valid"], false);
        assert_eq!(body["status"]["checks"]["patient"], false);

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/complete"),
            Some(json!({"verifier": "nurse.smith"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "validation_failed");

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/override"),
            Some(json!({"justification": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "missing_justification");

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/override"),
            Some(json!({"justification": "wristband reprinted, identity confirmed verbally"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overridden"], json!(["patient"]));
        assert_eq!(body["status"]["is_valid"], true);

        let (status, _) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/complete"),
            Some(json!({"verifier": "nurse.smith"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(store.logs()[0].was_overridden());
    }

    #[tokio::test]
    async fn diabetic_medication_needs_glucose_reading() {
        let (state, _) = test_state();
        let id = create(&state, "diabetic").await;

        call(&state, "POST", &format!("/workflows/{id}/scans"), Some(json!({"raw": "PT12345"}))).await;
        let (_, body) =
            call(&state, "POST", &format!("/workflows/{id}/scans"), Some(json!({"raw": "MA00001"}))).await;
        assert_eq!(body["status"]["pending_gate"], "glucose");

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/complete"),
            Some(json!({"verifier": "nurse.smith"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "reading_required");

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/reading"),
            Some(json!({"value": 0.5})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "reading_out_of_range");

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/reading"),
            Some(json!({"value": 6.2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reading"], 6.2);
        assert_eq!(body["pending_gate"], Value::Null);

        let (status, body) = call(
            &state,
            "POST",
            &format!("/workflows/{id}/complete"),
            Some(json!({"verifier": "nurse.smith"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["log"]["reading"]["value"], 6.2);
    }

    #[tokio::test]
    async fn cancelled_sessions_are_gone() {
        let (state, _) = test_state();
        let id = create(&state, "general").await;
        assert_eq!(state.session_count(), 1);

        let (status, _) = call(&state, "DELETE", &format!("/workflows/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(state.session_count(), 0);

        let (status, body) = call(&state, "GET", &format!("/workflows/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session_not_found");

        let (status, _) = call(&state, "DELETE", &format!("/workflows/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_operator_is_rejected() {
        let (state, _) = test_state();
        let mut body = create_body("general");
        body["operator"] = json!("  ");

        let (status, body) = call(&state, "POST", "/workflows", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }
}
