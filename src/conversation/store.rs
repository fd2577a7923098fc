use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use tokio::sync::RwLock;

use crate::{Chat, Message};

#[derive(Debug, Clone, PartialEq)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Persistence the driver needs: read a chat and its turns, append new turns.
/// Turns come back in insertion order and are never edited.
pub trait ConversationStore: Send + Sync {
    fn get_chat(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Option<Chat>, StoreError>> + Send;

    fn update_chat(&self, chat: Chat) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load_turns(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;

    fn append_turn(
        &self,
        chat_id: &str,
        turn: Message,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Default)]
struct Entry {
    chat: Option<Chat>,
    turns: Vec<Message>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryConversationStore {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_chat(&self, chat: Chat) {
        let mut map = self.inner.write().await;
        let id = chat.id.clone();
        map.entry(id).or_default().chat = Some(chat);
    }
}

impl ConversationStore for InMemoryConversationStore {
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .get(chat_id)
            .and_then(|e| e.chat.clone()))
    }

    async fn update_chat(&self, chat: Chat) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        match map.get_mut(&chat.id) {
            Some(entry) if entry.chat.is_some() => {
                entry.chat = Some(chat);
                Ok(())
            }
            _ => Err(StoreError(format!("unknown chat {}", chat.id))),
        }
    }

    async fn load_turns(&self, chat_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .get(chat_id)
            .map(|e| e.turns.clone())
            .unwrap_or_default())
    }

    async fn append_turn(&self, chat_id: &str, turn: Message) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        match map.get_mut(chat_id) {
            Some(entry) if entry.chat.is_some() => {
                entry.turns.push(turn);
                Ok(())
            }
            _ => Err(StoreError(format!("unknown chat {chat_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Provider;

    #[tokio::test]
    async fn appends_in_order_and_rejects_unknown_chats() {
        let store = InMemoryConversationStore::new();
        let chat = Chat::new(Provider::Local, "m");
        store.insert_chat(chat.clone()).await;

        store.append_turn(&chat.id, Message::user("1")).await.unwrap();
        store.append_turn(&chat.id, Message::assistant("2")).await.unwrap();
        let turns = store.load_turns(&chat.id).await.unwrap();
        assert_eq!(
            turns.iter().map(|t| t.content.as_str()).collect::<Vec<_>>(),
            vec!["1", "2"]
        );

        assert!(store.append_turn("nope", Message::user("x")).await.is_err());
        assert!(store.get_chat("nope").await.unwrap().is_none());
        assert!(store.load_turns("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_replaces_existing_chat_only() {
        let store = InMemoryConversationStore::new();
        let chat = Chat::new(Provider::Cloud, "openai/gpt-4o");
        store.insert_chat(chat.clone()).await;

        store.update_chat(chat.clone().with_title("Renamed")).await.unwrap();
        assert_eq!(store.get_chat(&chat.id).await.unwrap().unwrap().title, "Renamed");

        let stray = Chat::new(Provider::Local, "m");
        assert!(store.update_chat(stray).await.is_err());
    }
}
