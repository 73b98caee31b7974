use std::sync::Arc;

use crate::db::DbPool;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Registry of live WebSocket connections, keyed by channel
    /// (chat id for chat streams, user id for personal notifications).
    /// Created once at startup; the handshake controller and the
    /// broadcast dispatcher both go through this single instance.
    pub registry: Arc<ConnectionRegistry>,
}
