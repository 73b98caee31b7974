//! Direct-message chats: chat creation, message history, and the REST
//! message path that feeds the real-time broadcast.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::Claims;
use crate::db::models::Message;
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::events::WsEvent;

/// Maximum message content length (chars).
const MAX_CONTENT_LENGTH: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub recipient_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub chat_id: String,
    pub participants: [String; 2],
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub status: String,
    pub timestamp: String,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            chat_id: m.chat_id,
            sender_id: m.sender_id,
            content: m.content,
            status: m.status,
            timestamp: m.timestamp,
        }
    }
}

/// POST /api/chats
/// Open a two-party chat with a contact.
pub async fn create_chat(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let recipient_id = req.recipient_id.clone();

    let chat = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        let recipient = crate::db::get_user(&conn, &recipient_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?;
        if recipient.is_none() {
            return Err((StatusCode::NOT_FOUND, "Recipient not found".to_string()));
        }

        let is_contact: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM contacts WHERE user_id = ?1 AND contact_id = ?2",
                rusqlite::params![user_id, recipient_id],
                |row| row.get(0),
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?;
        if is_contact == 0 {
            return Err((
                StatusCode::FORBIDDEN,
                "Recipient is not in your contact list".to_string(),
            ));
        }

        let chat_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chats (id, user1_id, user2_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![chat_id, user_id, recipient_id, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB insert: {}", e)))?;

        Ok(ChatResponse {
            chat_id,
            participants: [user_id, recipient_id],
            created_at: now,
        })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    tracing::info!(chat_id = %chat.chat_id, "Chat created");

    Ok((StatusCode::CREATED, Json(chat)))
}

/// GET /api/chats
/// List chats the caller participates in.
pub async fn list_chats(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<ChatResponse>>, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let chats = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, user1_id, user2_id, created_at FROM chats
                 WHERE user1_id = ?1 OR user2_id = ?1
                 ORDER BY updated_at DESC",
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB prepare: {}", e)))?;

        let rows = stmt
            .query_map([&user_id], |row| {
                Ok(ChatResponse {
                    chat_id: row.get(0)?,
                    participants: [row.get(1)?, row.get(2)?],
                    created_at: row.get(3)?,
                })
            })
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?
            .filter_map(|r| r.ok())
            .collect::<Vec<_>>();

        Ok(rows)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(chats))
}

/// POST /api/chats/{chat_id}/messages
/// Persist a message, then broadcast a new_message event to the chat
/// channel. The REST response depends only on persistence; real-time
/// delivery is best-effort and never fails this call.
pub async fn create_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(chat_id): Path<String>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), (StatusCode, String)> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message cannot be empty".to_string()));
    }
    if content.len() > MAX_CONTENT_LENGTH {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            "Message too long".to_string(),
        ));
    }

    let db = state.db.clone();
    let sender_id = claims.sub.clone();
    let cid = chat_id.clone();

    let message = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        if !crate::db::chat_exists(&conn, &cid)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?
        {
            return Err((StatusCode::NOT_FOUND, "Chat not found".to_string()));
        }
        if !crate::db::is_chat_participant(&conn, &cid, &sender_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?
        {
            return Err((
                StatusCode::FORBIDDEN,
                "Not a participant of this chat".to_string(),
            ));
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            chat_id: cid.clone(),
            sender_id,
            content,
            status: "sent".to_string(),
            pinned: false,
            translation: None,
            detected_language: None,
            timestamp: Utc::now().to_rfc3339(),
        };
        conn.execute(
            "INSERT INTO messages (id, chat_id, sender_id, content, status, pinned, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                message.id,
                message.chat_id,
                message.sender_id,
                message.content,
                message.status,
                message.pinned,
                message.timestamp
            ],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB insert: {}", e)))?;
        conn.execute(
            "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![message.timestamp, cid],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB update: {}", e)))?;

        Ok(message)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    // Fan out to live chat members after persistence succeeded.
    let event = WsEvent::new_message(&message);
    let report = broadcast::broadcast(&state.registry, &chat_id, &event.to_json());
    tracing::debug!(
        chat_id = %chat_id,
        delivered = report.delivered,
        failed = report.failed,
        "Message event broadcast"
    );

    Ok((StatusCode::CREATED, Json(message.into())))
}

/// GET /api/chats/{chat_id}/messages
/// Message history, participants only.
pub async fn list_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let messages = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        if !crate::db::chat_exists(&conn, &chat_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?
        {
            return Err((StatusCode::NOT_FOUND, "Chat not found".to_string()));
        }
        if !crate::db::is_chat_participant(&conn, &chat_id, &user_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?
        {
            return Err((
                StatusCode::FORBIDDEN,
                "Not a participant of this chat".to_string(),
            ));
        }

        let mut stmt = conn
            .prepare(
                "SELECT id, chat_id, sender_id, content, status, timestamp
                 FROM messages WHERE chat_id = ?1 ORDER BY timestamp",
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB prepare: {}", e)))?;

        let rows = stmt
            .query_map([&chat_id], |row| {
                Ok(MessageResponse {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    content: row.get(3)?,
                    status: row.get(4)?,
                    timestamp: row.get(5)?,
                })
            })
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?
            .filter_map(|r| r.ok())
            .collect::<Vec<_>>();

        Ok(rows)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(messages))
}

/// PUT /api/chats/{chat_id}/read
/// Mark all messages from the other participant as read.
pub async fn mark_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(chat_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        if !crate::db::is_chat_participant(&conn, &chat_id, &user_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?
        {
            return Err((StatusCode::NOT_FOUND, "Chat not found".to_string()));
        }

        conn.execute(
            "UPDATE messages SET status = 'read'
             WHERE chat_id = ?1 AND sender_id != ?2 AND status != 'read'",
            rusqlite::params![chat_id, user_id],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB update: {}", e)))?;

        Ok(())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(StatusCode::OK)
}
