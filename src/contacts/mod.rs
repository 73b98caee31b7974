//! Contact list management. Chats can only be opened with contacts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::jwt::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddContactRequest {
    pub contact_id: String,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub contact_id: String,
    pub username: String,
    pub created_at: String,
}

/// POST /api/contacts
/// Add another user to the caller's contact list.
pub async fn add_contact(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<AddContactRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    if req.contact_id == claims.sub {
        return Err((
            StatusCode::BAD_REQUEST,
            "Cannot add yourself as a contact".to_string(),
        ));
    }

    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let contact_id = req.contact_id.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        let target = crate::db::get_user(&conn, &contact_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?;
        if target.is_none() {
            return Err((StatusCode::NOT_FOUND, "User not found".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO contacts (user_id, contact_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, contact_id, now],
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB insert: {}", e)))?;
        if inserted == 0 {
            return Err((StatusCode::CONFLICT, "Already a contact".to_string()));
        }

        Ok(())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(StatusCode::CREATED)
}

/// GET /api/contacts
/// List the caller's contacts.
pub async fn list_contacts(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<ContactResponse>>, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let contacts = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        let mut stmt = conn
            .prepare(
                "SELECT c.contact_id, u.username, c.created_at
                 FROM contacts c JOIN users u ON u.id = c.contact_id
                 WHERE c.user_id = ?1
                 ORDER BY u.username",
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB prepare: {}", e)))?;

        let rows = stmt
            .query_map([&user_id], |row| {
                Ok(ContactResponse {
                    contact_id: row.get(0)?,
                    username: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB query: {}", e)))?
            .filter_map(|r| r.ok())
            .collect::<Vec<_>>();

        Ok(rows)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(contacts))
}

/// DELETE /api/contacts/{contact_id}
/// Remove a user from the caller's contact list.
pub async fn remove_contact(
    State(state): State<AppState>,
    claims: Claims,
    Path(contact_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let removed = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;
        conn.execute(
            "DELETE FROM contacts WHERE user_id = ?1 AND contact_id = ?2",
            rusqlite::params![user_id, contact_id],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB delete: {}", e)))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    if removed == 0 {
        return Err((StatusCode::NOT_FOUND, "Contact not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
