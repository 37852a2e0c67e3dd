//! HTTP surface of the notification relay.
//!
//! One handler: `POST /api/notify` with `{phone, country, gpa}`. Responses
//! mirror the reference contract exactly — `200 {success:true, data}` on
//! delivery, `500 {"error":"Token not configured"}` without a credential
//! (and zero outbound calls), `500 {"error":"Internal Server Error"}` on
//! any other failure.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use secrecy::SecretString;
use tracing::{error, info};

use crate::error::NotifyError;
use crate::notify::{NOTIFY_TITLE, NotifyRequest, PushClient, format_lead_message, mask_token};

/// Relay handler state. The credential is read once at startup and shared
/// read-only across invocations; each request is otherwise fully isolated.
#[derive(Clone)]
pub struct RelayState {
    token: Option<SecretString>,
    push: Arc<dyn PushClient>,
}

/// Build the relay router.
pub fn notify_routes(token: Option<SecretString>, push: Arc<dyn PushClient>) -> Router {
    let state = RelayState { token, push };
    Router::new()
        .route("/api/notify", post(notify_handler))
        .with_state(state)
}

async fn notify_handler(
    State(state): State<RelayState>,
    Json(req): Json<NotifyRequest>,
) -> impl IntoResponse {
    match relay_lead(&state, &req).await {
        Ok(data) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "data": data })),
        ),
        Err(NotifyError::TokenMissing) => {
            error!("PUSHPLUS_TOKEN is not configured; refusing to notify");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Token not configured" })),
            )
        }
        Err(e) => {
            error!(error = %e, "push delivery failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal Server Error" })),
            )
        }
    }
}

/// The relay proper: require the credential, build the message, push once.
async fn relay_lead(
    state: &RelayState,
    req: &NotifyRequest,
) -> Result<serde_json::Value, NotifyError> {
    let token = state.token.as_ref().ok_or(NotifyError::TokenMissing)?;
    let content = format_lead_message(req);
    info!(token = %mask_token(token), country = %req.country, "forwarding lead notification");
    state.push.push(token, NOTIFY_TITLE, &content).await
}
