use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Role;

/// One turn of a conversation.
///
/// `id` and `timestamp_millis` belong to the store; they are never sent to a
/// provider (see [`WireMessage`](super::chat::WireMessage)).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    #[serde(default = "new_uuid")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default = "now_millis")]
    pub timestamp_millis: u64,
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: new_uuid(),
            role,
            content,
            timestamp_millis: now_millis(),
        }
    }

    pub fn system<T: Into<String>>(content: T) -> Self {
        Self::new(Role::System, content.into())
    }
    pub fn user<T: Into<String>>(content: T) -> Self {
        Self::new(Role::User, content.into())
    }
    pub fn assistant<T: Into<String>>(content: T) -> Self {
        Self::new(Role::Assistant, content.into())
    }
}

fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_role_and_fresh_id() {
        let a = Message::user("hi");
        let b = Message::user("hi");
        assert_eq!(a.role, Role::User);
        assert_eq!(a.content, "hi");
        assert_ne!(a.id, b.id);
        assert!(a.timestamp_millis > 0);
    }

    #[test]
    fn stored_form_keeps_internal_fields() {
        let msg = Message::assistant("done");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["id"], msg.id.as_str());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
