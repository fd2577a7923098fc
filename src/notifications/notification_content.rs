use serde::{Deserialize, Serialize};

use crate::Message;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NotificationContent {
    /// One fragment of the assistant reply, in arrival order.
    Token(String),
    /// The assistant turn as it was persisted.
    Done(Message),
    /// The exchange failed before a reply could be stored.
    Error(String),
}
