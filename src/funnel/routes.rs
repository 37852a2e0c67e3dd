//! REST surface for funnel sessions.
//!
//! The reference frontend drives one controller per visitor; these routes
//! expose the same operations over HTTP so any client can run the funnel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FunnelTiming;
use crate::error::FunnelError;
use crate::funnel::FunnelController;
use crate::funnel::state::FunnelState;
use crate::store::LeadStore;

/// One live session plus its idle clock for the sweep.
struct SessionEntry {
    controller: Arc<FunnelController>,
    last_seen: tokio::sync::Mutex<Instant>,
}

impl SessionEntry {
    fn new(controller: Arc<FunnelController>) -> Self {
        Self {
            controller,
            last_seen: tokio::sync::Mutex::new(Instant::now()),
        }
    }

    async fn touch(&self) {
        *self.last_seen.lock().await = Instant::now();
    }

    async fn idle_for(&self) -> Duration {
        self.last_seen.lock().await.elapsed()
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct FunnelApiState {
    sessions: Arc<tokio::sync::RwLock<HashMap<Uuid, Arc<SessionEntry>>>>,
    store: Arc<dyn LeadStore>,
    timing: FunnelTiming,
}

/// Build the Axum router with the funnel session routes and start the idle
/// session sweep.
pub fn funnel_routes(store: Arc<dyn LeadStore>, timing: FunnelTiming) -> Router {
    let state = FunnelApiState {
        sessions: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        store,
        timing,
    };
    spawn_session_sweep(state.clone());

    Router::new()
        .route("/health", get(health))
        .route("/api/session", post(create_session))
        .route("/api/session/{id}", get(get_session))
        .route("/api/session/{id}", delete(delete_session))
        .route("/api/session/{id}/begin", post(begin))
        .route("/api/session/{id}/options", get(options))
        .route("/api/session/{id}/answer", post(answer))
        .route("/api/session/{id}/submit", post(submit))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lead-funnel"
    }))
}

// ── Session lifecycle ───────────────────────────────────────────────────

/// Look up a session and refresh its idle clock.
async fn session(state: &FunnelApiState, id: Uuid) -> Option<Arc<FunnelController>> {
    let entry = state.sessions.read().await.get(&id).cloned()?;
    entry.touch().await;
    Some(Arc::clone(&entry.controller))
}

/// Spawn a background task that periodically reaps sessions idle past the
/// TTL, shutting their timer tasks down with them.
fn spawn_session_sweep(state: FunnelApiState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let ttl = state.timing.session_ttl;
        let period = (ttl / 2).max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(period);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let mut expired = Vec::new();
            {
                let mut sessions = state.sessions.write().await;
                let mut stale = Vec::new();
                for (id, entry) in sessions.iter() {
                    if entry.idle_for().await > ttl {
                        stale.push(*id);
                    }
                }
                for id in stale {
                    if let Some(entry) = sessions.remove(&id) {
                        expired.push((id, entry));
                    }
                }
            }

            for (id, entry) in expired {
                entry.controller.shutdown().await;
                debug!(session = %id, "idle funnel session expired");
            }
        }
    })
}

async fn create_session(State(state): State<FunnelApiState>) -> impl IntoResponse {
    let id = Uuid::new_v4();
    let controller = Arc::new(FunnelController::new(
        Arc::clone(&state.store),
        state.timing,
    ));
    controller.start_social_proof().await;
    state
        .sessions
        .write()
        .await
        .insert(id, Arc::new(SessionEntry::new(controller)));

    info!(session = %id, "funnel session created");
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id, "state": FunnelState::Landing })),
    )
}

async fn get_session(
    State(state): State<FunnelApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let Some(controller) = session(&state, id).await else {
        return session_not_found();
    };
    let snapshot = controller.snapshot().await;
    (StatusCode::OK, Json(serde_json::json!(snapshot)))
}

async fn delete_session(
    State(state): State<FunnelApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.write().await.remove(&id) else {
        return session_not_found();
    };
    // Stop the analysis script and social-proof ticker with the session.
    entry.controller.shutdown().await;
    info!(session = %id, "funnel session torn down");
    (StatusCode::OK, Json(serde_json::json!({ "deleted": true })))
}

// ── Funnel operations ───────────────────────────────────────────────────

async fn begin(State(state): State<FunnelApiState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let Some(controller) = session(&state, id).await else {
        return session_not_found();
    };
    match controller.begin().await {
        Ok(next) => (StatusCode::OK, Json(serde_json::json!({ "state": next }))),
        Err(e) => funnel_error(e),
    }
}

async fn options(State(state): State<FunnelApiState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let Some(controller) = session(&state, id).await else {
        return session_not_found();
    };
    match controller.state().await {
        FunnelState::Wizard { step } => (
            StatusCode::OK,
            Json(serde_json::json!({
                "step": step,
                "prompt": step.prompt(),
                "options": step.options(),
            })),
        ),
        other => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": format!("no options in state {other}") })),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct AnswerBody {
    option: String,
}

async fn answer(
    State(state): State<FunnelApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AnswerBody>,
) -> impl IntoResponse {
    let Some(controller) = session(&state, id).await else {
        return session_not_found();
    };
    match controller.choose(&body.option).await {
        Ok(next) => (StatusCode::OK, Json(serde_json::json!({ "state": next }))),
        Err(e) => funnel_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    phone: String,
}

async fn submit(
    State(state): State<FunnelApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitBody>,
) -> impl IntoResponse {
    let Some(controller) = session(&state, id).await else {
        return session_not_found();
    };
    match controller.submit(&body.phone).await {
        Ok(next) => (StatusCode::OK, Json(serde_json::json!({ "state": next }))),
        Err(e) => funnel_error(e),
    }
}

// ── Error mapping ───────────────────────────────────────────────────────

fn session_not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "session not found" })),
    )
}

/// Map controller errors to HTTP responses. Store failures get the generic
/// user-facing message; the detail stays in the server log.
fn funnel_error(err: FunnelError) -> (StatusCode, Json<serde_json::Value>) {
    match err {
        FunnelError::InvalidPhone => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "error": "请输入正确的 11 位手机号" })),
        ),
        FunnelError::UnknownOption { step, option } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "error": format!("option {option:?} is not offered at step {step}")
            })),
        ),
        FunnelError::Store(e) => {
            warn!(error = %e, "submission failed at the store");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "网络繁忙，请稍后重试" })),
            )
        }
        FunnelError::SubmissionInFlight | FunnelError::ResetWhileSubmitting => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "submission already in progress" })),
        ),
        e @ (FunnelError::InvalidTransition { .. } | FunnelError::IncompleteAnswers) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}
