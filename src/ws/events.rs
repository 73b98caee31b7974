//! Wire payloads pushed to WebSocket clients, serialized as JSON and
//! tagged by a "type" field.

use serde::Serialize;

use crate::db::models::{Message, Notification};

/// An event pushed over a WebSocket channel.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    /// A message was created in a chat; fanned out to the chat channel.
    NewMessage {
        chat_id: String,
        message: MessagePayload,
    },
    /// A notification for one user; sent on their personal channel.
    Notification { notification: NotificationPayload },
}

#[derive(Debug, Serialize)]
pub struct MessagePayload {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub timestamp: String,
    pub status: String,
    pub pinned: bool,
    pub reactions: Vec<ReactionPayload>,
    pub translation: Option<String>,
    pub detected_language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReactionPayload {
    pub user_id: String,
    pub reaction: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationPayload {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub notification_type: String,
    pub read: bool,
    pub created_at: String,
}

impl WsEvent {
    pub fn new_message(message: &Message) -> Self {
        WsEvent::NewMessage {
            chat_id: message.chat_id.clone(),
            message: MessagePayload {
                id: message.id.clone(),
                content: message.content.clone(),
                sender_id: message.sender_id.clone(),
                timestamp: message.timestamp.clone(),
                status: message.status.clone(),
                pinned: message.pinned,
                reactions: Vec::new(),
                translation: message.translation.clone(),
                detected_language: message.detected_language.clone(),
            },
        }
    }

    pub fn notification(notification: &Notification) -> Self {
        WsEvent::Notification {
            notification: NotificationPayload {
                id: notification.id.clone(),
                user_id: notification.user_id.clone(),
                message: notification.message.clone(),
                notification_type: notification.notification_type.clone(),
                read: notification.read,
                created_at: notification.created_at.clone(),
            },
        }
    }

    /// Serialize for the wire. These types cannot fail to serialize;
    /// an empty string would simply be ignored by clients.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_event_wire_shape() {
        let message = Message {
            id: "m1".to_string(),
            chat_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            content: "hello".to_string(),
            status: "sent".to_string(),
            pinned: false,
            translation: None,
            detected_language: None,
            timestamp: "2026-08-23T12:00:00+00:00".to_string(),
        };

        let json: serde_json::Value =
            serde_json::from_str(&WsEvent::new_message(&message).to_json()).unwrap();

        assert_eq!(json["type"], "new_message");
        assert_eq!(json["chat_id"], "c1");
        assert_eq!(json["message"]["content"], "hello");
        assert_eq!(json["message"]["sender_id"], "u1");
        assert_eq!(json["message"]["status"], "sent");
        assert_eq!(json["message"]["pinned"], false);
        assert_eq!(json["message"]["reactions"], serde_json::json!([]));
        assert!(json["message"]["translation"].is_null());
        assert!(json["message"]["detected_language"].is_null());
    }

    #[test]
    fn notification_event_wire_shape() {
        let row = Notification {
            id: "n1".to_string(),
            user_id: "u1".to_string(),
            message: "You have a new contact request".to_string(),
            notification_type: "friend_request".to_string(),
            read: false,
            created_at: "2026-08-23T12:00:00+00:00".to_string(),
            updated_at: "2026-08-23T12:00:00+00:00".to_string(),
        };

        let json: serde_json::Value =
            serde_json::from_str(&WsEvent::notification(&row).to_json()).unwrap();

        assert_eq!(json["type"], "notification");
        assert_eq!(json["notification"]["notification_type"], "friend_request");
        assert_eq!(json["notification"]["read"], false);
    }
}
