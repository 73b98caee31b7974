pub mod migrations;
pub mod models;

use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use models::User;

/// Type alias for the shared database connection.
/// rusqlite is synchronous, so we wrap in Arc<Mutex> for thread safety
/// with tokio::task::spawn_blocking for DB operations.
pub type DbPool = Arc<Mutex<Connection>>;

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("courier.db");
    let mut conn = Connection::open(&db_path)?;

    // WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let migrations = migrations::migrations();
    migrations.to_latest(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

// --- Identity/session data access used by the WebSocket handshake and REST handlers ---

/// Look up a user by id. None if the user does not exist.
pub fn get_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, email, password_hash, created_at, updated_at
         FROM users WHERE id = ?1",
        [user_id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password_hash: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()
}

/// Whether the user is one of the two participants of the chat.
/// False for unknown chats; callers distinguish 404 from 403 separately
/// when they need to.
pub fn is_chat_participant(conn: &Connection, chat_id: &str, user_id: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM chats WHERE id = ?1 AND (user1_id = ?2 OR user2_id = ?2)",
        rusqlite::params![chat_id, user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Whether a chat with this id exists at all.
pub fn chat_exists(conn: &Connection, chat_id: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM chats WHERE id = ?1",
        [chat_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
