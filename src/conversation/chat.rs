use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Provider;

pub const DEFAULT_TITLE: &str = "New Chat";

/// A conversation's routing data. Its turns live in the
/// [`ConversationStore`](super::ConversationStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub provider: Provider,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Chat {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            provider,
            model: model.into(),
            system_prompt: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}
