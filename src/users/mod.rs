//! Account registration, login, and token refresh.
//!
//! Passwords are hashed with Argon2id; access and refresh tokens are
//! typed JWTs (see auth::jwt).

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt;
use crate::state::AppState;

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// POST /api/auth/register
/// Create a new account and return a token pair.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), (StatusCode, String)> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if username.is_empty() || email.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Username and email cannot be empty".to_string(),
        ));
    }
    if req.password.len() < MIN_PASSWORD_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }

    let db = state.db.clone();
    let password = req.password.clone();

    let user_id = tokio::task::spawn_blocking(move || {
        // Argon2id is deliberately slow; keep it off the async runtime.
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Hashing failed: {}", e)))?
            .to_string();

        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        let taken: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1 OR username = ?2",
                rusqlite::params![email, username],
                |row| row.get(0),
            )
            .ok();
        if taken.is_some() {
            return Err((
                StatusCode::CONFLICT,
                "Email or username already registered".to_string(),
            ));
        }

        let user_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![user_id, username, email, password_hash, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB insert: {}", e)))?;

        Ok(user_id)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    tracing::info!(user_id = %user_id, "User registered");

    token_pair(&state.jwt_secret, &user_id).map(|resp| (StatusCode::CREATED, Json(resp)))
}

/// POST /api/auth/login
/// Verify credentials and return a token pair.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = req.email.trim().to_lowercase();
    let password = req.password.clone();

    let user_id = tokio::task::spawn_blocking(move || {
        let stored: Option<(String, String)> = {
            let conn = db
                .lock()
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;
            conn.query_row(
                "SELECT id, password_hash FROM users WHERE email = ?1",
                [&email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok()
        };

        // Same rejection for unknown email and wrong password.
        let (user_id, password_hash) = stored.ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        ))?;

        let parsed = PasswordHash::new(&password_hash)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Bad stored hash: {}", e)))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string()))?;

        Ok(user_id)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    tracing::info!(user_id = %user_id, "User logged in");

    token_pair(&state.jwt_secret, &user_id).map(Json)
}

/// POST /api/auth/refresh
/// Exchange a valid refresh token for a fresh token pair.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, String)> {
    let claims = jwt::validate_refresh_token(&state.jwt_secret, &req.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    // The account may have been deleted since the token was issued.
    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let exists = tokio::task::spawn_blocking(move || {
        let conn = db.lock().ok()?;
        crate::db::get_user(&conn, &user_id).ok().flatten()
    })
    .await
    .ok()
    .flatten()
    .is_some();

    if !exists {
        return Err((StatusCode::UNAUTHORIZED, "Unknown user".to_string()));
    }

    token_pair(&state.jwt_secret, &claims.sub).map(Json)
}

fn token_pair(secret: &[u8], user_id: &str) -> Result<TokenResponse, (StatusCode, String)> {
    let access_token = jwt::issue_access_token(secret, user_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Token signing: {}", e)))?;
    let refresh_token = jwt::issue_refresh_token(secret, user_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Token signing: {}", e)))?;

    Ok(TokenResponse {
        user_id: user_id.to_string(),
        access_token,
        refresh_token,
    })
}
