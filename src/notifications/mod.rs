//! Per-user notifications: persisted rows with best-effort real-time
//! delivery on the recipient's personal channel.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::Claims;
use crate::db::models::Notification;
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::events::WsEvent;

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: String,
    pub message: String,
    pub notification_type: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub notification_type: String,
    pub read: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            user_id: n.user_id,
            message: n.message,
            notification_type: n.notification_type,
            read: n.read,
            created_at: n.created_at,
        }
    }
}

/// POST /api/notifications
/// Persist a notification for a user, then push it to their live devices.
pub async fn create_notification(
    State(state): State<AppState>,
    _claims: Claims,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationResponse>), (StatusCode, String)> {
    if req.message.trim().is_empty() || req.notification_type.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Message and notification_type cannot be empty".to_string(),
        ));
    }

    let db = state.db.clone();
    let target_id = req.user_id.clone();
    let message_text = req.message.clone();
    let notification_type = req.notification_type.clone();

    let notification = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        let target = crate::db::get_user(&conn, &target_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?;
        if target.is_none() {
            return Err((StatusCode::NOT_FOUND, "User not found".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: target_id,
            message: message_text,
            notification_type,
            read: false,
            created_at: now.clone(),
            updated_at: now,
        };
        conn.execute(
            "INSERT INTO notifications (id, user_id, message, notification_type, read, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                notification.id,
                notification.user_id,
                notification.message,
                notification.notification_type,
                notification.read,
                notification.created_at,
                notification.updated_at
            ],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB insert: {}", e)))?;

        Ok(notification)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    // Push to the recipient's personal channel; an offline user just
    // fetches the row later.
    let event = WsEvent::notification(&notification);
    broadcast::notify_user(&state.registry, &notification.user_id, &event.to_json());

    Ok((StatusCode::CREATED, Json(notification.into())))
}

/// GET /api/notifications
/// List the caller's notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<NotificationResponse>>, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let notifications = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, message, notification_type, read, created_at
                 FROM notifications WHERE user_id = ?1 ORDER BY created_at DESC",
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB prepare: {}", e)))?;

        let rows = stmt
            .query_map([&user_id], |row| {
                Ok(NotificationResponse {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    message: row.get(2)?,
                    notification_type: row.get(3)?,
                    read: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?
            .filter_map(|r| r.ok())
            .collect::<Vec<_>>();

        Ok(rows)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(notifications))
}

/// PUT /api/notifications/{id}/read
/// Mark one of the caller's notifications as read.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(notification_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let updated = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;
        conn.execute(
            "UPDATE notifications SET read = 1, updated_at = ?1 WHERE id = ?2 AND user_id = ?3",
            rusqlite::params![Utc::now().to_rfc3339(), notification_id, user_id],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB update: {}", e)))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    if updated == 0 {
        return Err((StatusCode::NOT_FOUND, "Notification not found".to_string()));
    }

    Ok(StatusCode::OK)
}
