//! WebSocket upgrade handshake: authenticate the bearer token, authorize
//! the target channel, then hand the socket to the connection actor.
//! Rejections close the socket with a policy close code and touch the
//! registry not at all.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt::{self, AuthError};
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection.
/// Auth is via query param ?token=JWT because browsers cannot set headers
/// on a WebSocket upgrade.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token invalid or wrong type
/// 4003 = not a participant of the requested channel
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;
const CLOSE_NOT_PARTICIPANT: u16 = 4003;

/// GET /ws/chats/{chat_id}?token=JWT
/// Upgrade endpoint for a chat channel. The authenticated user must be
/// one of the chat's two participants.
pub async fn chat_ws_upgrade(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match jwt::validate_access_token(&state.jwt_secret, &params.token) {
        Ok(claims) => claims,
        Err(err) => return reject(ws, err),
    };

    // Authorization: participant check against the chat row, off the
    // async runtime. A missing chat is indistinguishable from a chat the
    // user is not in; both close with the same policy code.
    let authorized = {
        let db = state.db.clone();
        let cid = chat_id.clone();
        let uid = claims.sub.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().ok()?;
            crate::db::is_chat_participant(&conn, &cid, &uid).ok()
        })
        .await
        .ok()
        .flatten()
        .unwrap_or(false)
    };

    if !authorized {
        tracing::warn!(
            user_id = %claims.sub,
            chat_id = %chat_id,
            "WebSocket rejected: not a chat participant"
        );
        return close_with(ws, CLOSE_NOT_PARTICIPANT, "Not a participant");
    }

    tracing::info!(
        user_id = %claims.sub,
        chat_id = %chat_id,
        "WebSocket chat connection authenticated"
    );
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, chat_id, claims.sub))
}

/// GET /ws/notifications?token=JWT
/// Upgrade endpoint for the personal notification channel. The channel id
/// is the authenticated user's own id, so no further authorization check
/// is needed.
pub async fn notifications_ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match jwt::validate_access_token(&state.jwt_secret, &params.token) {
        Ok(claims) => claims,
        Err(err) => return reject(ws, err),
    };

    tracing::info!(
        user_id = %claims.sub,
        "WebSocket notification connection authenticated"
    );
    let channel_id = claims.sub.clone();
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, channel_id, claims.sub))
}

/// Map an auth failure to its close code and finish the upgrade with an
/// immediate close frame.
fn reject(ws: WebSocketUpgrade, err: AuthError) -> Response {
    let (close_code, reason) = match err {
        AuthError::Expired => (CLOSE_TOKEN_EXPIRED, "Token expired"),
        AuthError::Malformed | AuthError::WrongType => (CLOSE_TOKEN_INVALID, "Token invalid"),
    };

    tracing::warn!(
        close_code = close_code,
        reason = reason,
        "WebSocket auth failed"
    );

    close_with(ws, close_code, reason)
}

/// Upgrade the connection, then immediately close with the given code.
/// No application-level error body, protocol close frame only.
fn close_with(ws: WebSocketUpgrade, code: u16, reason: &'static str) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        let close_frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
    })
}
