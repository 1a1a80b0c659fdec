/// WebSocket task events
///
/// ```text
/// GET /socket?token=<jwt>
/// ```
///
/// The token may also be sent as `Authorization: Bearer`. It is checked
/// before the upgrade request itself, so an unauthenticated client gets a
/// plain 401.
///
/// Once connected the client receives `{"event": "connected", ...}` and
/// then every task event addressed to its account, from this instance or
/// (through Redis) from any other:
///
/// ```json
/// {"event": "task_updated", "data": {"id": "...", "status": "Completed", ...}}
/// ```
///
/// The server closes the socket when the token it was opened with expires.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use axum::extract::ws::{close_code, CloseFrame};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use pmsgo_shared::auth::middleware::{authenticate, bearer_token, AuthContext};
use pmsgo_shared::realtime::Envelope;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

pub async fn socket_handler(
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    let token = match query.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => bearer_token(&headers)?,
    };
    let auth = authenticate(token, state.jwt_secret())?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    // Subscribe before upgrading so nothing emitted in between is lost
    let events = state.realtime.subscribe();

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, auth, events)))
}

/// Text frame for an envelope, if it is addressed to `account_id`
pub fn frame_for(envelope: &Envelope, account_id: Uuid) -> Option<String> {
    if envelope.audience != account_id {
        return None;
    }

    match serde_json::to_string(&envelope.event) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize real-time event");
            None
        }
    }
}

/// Time left until `expires_at` (unix seconds), zero once it has passed
pub fn session_remaining(expires_at: i64, now: i64) -> Duration {
    u64::try_from(expires_at.saturating_sub(now))
        .map(Duration::from_secs)
        .unwrap_or(Duration::ZERO)
}

fn connected_frame(auth: &AuthContext) -> String {
    serde_json::json!({
        "event": "connected",
        "data": { "account_id": auth.account_id },
    })
    .to_string()
}

async fn handle_socket(
    socket: WebSocket,
    auth: AuthContext,
    mut events: broadcast::Receiver<Envelope>,
) {
    let account_id = auth.account_id;
    let (mut sender, mut receiver) = socket.split();
    let session_end = tokio::time::sleep(session_remaining(
        auth.expires_at,
        Utc::now().timestamp(),
    ));
    tokio::pin!(session_end);

    tracing::info!(account_id = %account_id, "Socket connected");

    if sender
        .send(Message::Text(connected_frame(&auth)))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(envelope) => {
                    let Some(frame) = frame_for(&envelope, account_id) else {
                        continue;
                    };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(account_id = %account_id, skipped, "Socket fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(account_id = %account_id, error = %e, "Socket read failed");
                    break;
                }
            },
            _ = &mut session_end => {
                tracing::info!(account_id = %account_id, "Socket token expired");
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::POLICY,
                        reason: "Token expired".into(),
                    })))
                    .await;
                break;
            }
        }
    }

    tracing::info!(account_id = %account_id, "Socket disconnected");
}
