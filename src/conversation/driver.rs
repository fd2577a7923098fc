use std::{collections::HashMap, sync::Arc};

use futures::StreamExt;
use tokio::sync::mpsc::{self, Sender};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

use crate::{
    ChatBackend, Chat, ConversationStore, DriverError, GenerationOptions, Message, ModelDescriptor,
    Notification, NotificationHandler, NotificationOutputChannel, Provider, Role, ERROR_FRAGMENT,
    NO_RESPONSE, UNCONFIGURED_FRAGMENT,
};

const TITLE_PROMPT: &str = "Summarize the user's message as a chat title of at most six words. \
Reply with the title only, without quotes or punctuation at the end.";
const TITLE_MAX_CHARS: usize = 60;
const STREAM_CHANNEL_CAPACITY: usize = 64;
/// Fragments a client yields in place of a model answer.
const NON_ANSWERS: [&str; 3] = [NO_RESPONSE, ERROR_FRAGMENT, UNCONFIGURED_FRAGMENT];

/// Runs one user/assistant exchange against the backend a chat is bound to.
///
/// Backends are registered per [`Provider`]; a chat is only ever sent to the
/// backend registered under its own `provider` tag.
pub struct ConversationDriver<B, S> {
    store: S,
    backends: HashMap<Provider, B>,
    options: GenerationOptions,
    notification_channel: Option<Sender<Notification>>,
}

impl<B, S> ConversationDriver<B, S>
where
    B: ChatBackend,
    S: ConversationStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            backends: HashMap::new(),
            options: GenerationOptions::default(),
            notification_channel: None,
        }
    }

    /// Registers `backend` under its own provider, replacing any previous one.
    pub fn with_backend(mut self, backend: B) -> Self {
        self.backends.insert(backend.provider(), backend);
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Every exchange started with [`send`](Self::send) reports its tokens here.
    pub fn with_notification_channel(mut self, sender: Sender<Notification>) -> Self {
        self.notification_channel = Some(sender);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backend(&self, provider: Provider) -> Option<&B> {
        self.backends.get(&provider)
    }

    pub async fn is_ready(&self, provider: Provider) -> bool {
        match self.backends.get(&provider) {
            Some(backend) => backend.is_ready().await,
            None => false,
        }
    }

    pub async fn available_models(
        &self,
        provider: Provider,
    ) -> Result<Vec<ModelDescriptor>, DriverError> {
        let backend = self
            .backends
            .get(&provider)
            .ok_or(DriverError::ProviderNotConfigured(provider))?;
        Ok(backend.list_models().await)
    }

    /// Appends `content` as a user turn, streams the reply and stores it as an
    /// assistant turn.
    ///
    /// Errors before the stream starts are returned and nothing but the user
    /// turn is stored. A stream that breaks midway still produces a stored
    /// reply ending in the apology fragment.
    ///
    /// If a notification channel is attached and its receiver goes away, the
    /// provider stream is dropped, the partial reply is discarded and
    /// [`DriverError::Cancelled`] is returned.
    pub async fn send(
        &self,
        chat_id: &str,
        content: impl Into<String>,
    ) -> Result<Message, DriverError> {
        let channel =
            NotificationOutputChannel::new(self.notification_channel.clone(), chat_id.to_string());
        self.send_with(chat_id, content.into(), &channel).await
    }

    async fn send_with(
        &self,
        chat_id: &str,
        content: String,
        channel: &NotificationOutputChannel,
    ) -> Result<Message, DriverError> {
        match self.exchange(chat_id, content, channel).await {
            Ok(reply) => {
                channel.notify_done(reply.clone()).await;
                Ok(reply)
            }
            Err(e) => {
                channel.notify_error(e.to_string()).await;
                Err(e)
            }
        }
    }

    #[instrument(name = "driver.exchange", skip_all, fields(chat_id = %chat_id))]
    async fn exchange(
        &self,
        chat_id: &str,
        content: String,
        channel: &NotificationOutputChannel,
    ) -> Result<Message, DriverError> {
        let chat = self.load_chat(chat_id).await?;
        let backend = self.route(&chat)?;

        let history = self.store.load_turns(chat_id).await?;
        let user_turn = Message::user(content);
        self.store.append_turn(chat_id, user_turn.clone()).await?;

        let mut request = Vec::with_capacity(history.len() + 2);
        if let Some(prompt) = chat.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            request.push(Message::system(prompt));
        }
        request.extend(history);
        request.push(user_turn);

        let mut stream = backend
            .stream_completion(&request, &chat.model, self.options.clone())
            .await
            .map_err(|e| {
                warn!(provider = %chat.provider, error = %e, "completion request failed");
                e
            })?;

        let mut reply = String::new();
        while let Some(fragment) = stream.next().await {
            reply.push_str(&fragment);
            if !channel.notify_token(fragment).await && channel.receiver_dropped() {
                debug!(chars = reply.len(), "receiver dropped, abandoning reply");
                return Err(DriverError::Cancelled);
            }
        }

        let turn = Message::assistant(reply);
        self.store.append_turn(chat_id, turn.clone()).await?;
        debug!(chars = turn.content.len(), "assistant turn stored");
        Ok(turn)
    }

    /// Names the chat after its first user turn. Keeps the current title when
    /// there is nothing to summarize or the backend gave no usable answer.
    #[instrument(name = "driver.generate_title", skip_all, fields(chat_id = %chat_id))]
    pub async fn generate_title(&self, chat_id: &str) -> Result<String, DriverError> {
        let mut chat = self.load_chat(chat_id).await?;
        let backend = self.route(&chat)?;

        let turns = self.store.load_turns(chat_id).await?;
        let Some(first) = turns.iter().find(|t| t.role == Role::User) else {
            return Ok(chat.title);
        };

        let prompt = [Message::system(TITLE_PROMPT), Message::user(first.content.clone())];
        let raw = backend.get_single_response(&prompt, &chat.model).await?;
        if NON_ANSWERS.contains(&raw.as_str()) {
            return Ok(chat.title);
        }

        let title = clean_title(&raw);
        if title.is_empty() {
            return Ok(chat.title);
        }

        chat.title = title.clone();
        self.store.update_chat(chat).await?;
        Ok(title)
    }

    async fn load_chat(&self, chat_id: &str) -> Result<Chat, DriverError> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| DriverError::ChatNotFound(chat_id.to_string()))?;
        if chat.model.trim().is_empty() {
            return Err(DriverError::ModelNotSet(chat_id.to_string()));
        }
        Ok(chat)
    }

    fn route(&self, chat: &Chat) -> Result<&B, DriverError> {
        self.backends
            .get(&chat.provider)
            .ok_or(DriverError::ProviderNotConfigured(chat.provider))
    }
}

impl<B, S> ConversationDriver<B, S>
where
    B: ChatBackend + 'static,
    S: ConversationStore + 'static,
{
    /// Runs [`send`](Self::send) on a background task and returns its
    /// notifications: `Token`s in arrival order, then one `Done` or `Error`.
    pub fn send_streaming(
        self: &Arc<Self>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> ReceiverStream<Notification> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let driver = Arc::clone(self);
        let chat_id = chat_id.into();
        let content = content.into();

        tokio::spawn(async move {
            let channel = NotificationOutputChannel::new(Some(tx), chat_id.clone());
            if let Err(e) = driver.send_with(&chat_id, content, &channel).await {
                debug!(error = %e, "streaming exchange failed");
            }
        });

        ReceiverStream::new(rx)
    }
}

fn clean_title(raw: &str) -> String {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let line = line
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '*')
        .trim_end_matches(|c: char| c == '.' || c == '!' || c == '?')
        .trim();
    line.chars().take(TITLE_MAX_CHARS).collect::<String>().trim_end().to_string()
}
