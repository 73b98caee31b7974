use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::JwtSecret;
use crate::chat;
use crate::contacts;
use crate::notifications;
use crate::state::AppState;
use crate::users;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting: 5 requests per minute per IP on auth endpoints
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(12) // 1 token every 12 seconds = 5 per minute
            .burst_size(5) // Allow burst of 5
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // Auth routes with rate limiting
    let auth_routes = Router::new()
        .route("/api/auth/register", axum::routing::post(users::register))
        .route("/api/auth/login", axum::routing::post(users::login))
        .route("/api/auth/refresh", axum::routing::post(users::refresh))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Authenticated routes (JWT required, Claims extractor validates token)
    let contact_routes = Router::new()
        .route("/api/contacts", axum::routing::post(contacts::add_contact))
        .route("/api/contacts", axum::routing::get(contacts::list_contacts))
        .route(
            "/api/contacts/{contact_id}",
            axum::routing::delete(contacts::remove_contact),
        );

    let chat_routes = Router::new()
        .route("/api/chats", axum::routing::post(chat::create_chat))
        .route("/api/chats", axum::routing::get(chat::list_chats))
        .route(
            "/api/chats/{chat_id}/messages",
            axum::routing::post(chat::create_message),
        )
        .route(
            "/api/chats/{chat_id}/messages",
            axum::routing::get(chat::list_messages),
        )
        .route(
            "/api/chats/{chat_id}/read",
            axum::routing::put(chat::mark_read),
        );

    let notification_routes = Router::new()
        .route(
            "/api/notifications",
            axum::routing::post(notifications::create_notification),
        )
        .route(
            "/api/notifications",
            axum::routing::get(notifications::list_notifications),
        )
        .route(
            "/api/notifications/{id}/read",
            axum::routing::put(notifications::mark_notification_read),
        );

    // WebSocket endpoints (auth via query param, not JWT header)
    let ws_routes = Router::new()
        .route(
            "/ws/chats/{chat_id}",
            axum::routing::get(ws_handler::chat_ws_upgrade),
        )
        .route(
            "/ws/notifications",
            axum::routing::get(ws_handler::notifications_ws_upgrade),
        );

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(contact_routes)
        .merge(chat_routes)
        .merge(notification_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
