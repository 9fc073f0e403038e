//! `POST /webhooks` and `DELETE /webhooks`.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_webhooks::{RequestContext, WebhookError, WebhookRequest, WebhookStatus};
use serde_json::json;
use tracing::debug;

use crate::server::AppState;

/// Register a webhook fed by the server's event bus.
pub async fn add(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<WebhookRequest>,
) -> Response {
    let ctx = RequestContext {
        remote_addr: peer.ip(),
    };
    respond(state.webhooks.add(Some(&ctx), &req, Some(state.event_source())))
}

/// Cancel a webhook.
pub async fn remove(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<WebhookRequest>,
) -> Response {
    let ctx = RequestContext {
        remote_addr: peer.ip(),
    };
    respond(state.webhooks.remove(Some(&ctx), &req))
}

fn respond(result: Result<WebhookStatus, WebhookError>) -> Response {
    match result {
        Ok(status) => status_code(status.status_code()).into_response(),
        Err(err) => {
            debug!(error = %err, "webhook request rejected");
            let body = Json(json!({ "error": err.to_string() }));
            (status_code(err.status_code()), body).into_response()
        }
    }
}

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
