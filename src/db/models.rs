/// Database row types for all tables.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.

/// User record in the users table
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Contact list entry (directed: user_id has contact_id in their list)
#[derive(Debug, Clone)]
pub struct Contact {
    pub user_id: String,
    pub contact_id: String,
    pub created_at: String,
}

/// Two-party direct-message chat
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Chat message. Translation and detected_language are filled by external
/// services and stay NULL here.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub status: String,
    pub pinned: bool,
    pub translation: Option<String>,
    pub detected_language: Option<String>,
    pub timestamp: String,
}

/// Per-user notification row
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub notification_type: String,
    pub read: bool,
    pub created_at: String,
    pub updated_at: String,
}
