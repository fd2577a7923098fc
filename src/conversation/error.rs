use crate::{ModelClientError, Provider, StoreError};

/// Errors raised by the [`ConversationDriver`](super::ConversationDriver).
#[derive(Debug)]
pub enum DriverError {
    ChatNotFound(String),
    /// The chat has no model id to send.
    ModelNotSet(String),
    /// No backend was registered for the chat's provider.
    ProviderNotConfigured(Provider),
    /// The client refused or failed the request before streaming began.
    Client(ModelClientError),
    Store(StoreError),
    /// The notification receiver went away before the reply finished.
    Cancelled,
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::ChatNotFound(id) => write!(f, "Chat not found: {id}"),
            DriverError::ModelNotSet(id) => write!(f, "Chat {id} has no model set"),
            DriverError::ProviderNotConfigured(p) => {
                write!(f, "No backend configured for provider {p}")
            }
            DriverError::Client(e) => write!(f, "Client error: {e}"),
            DriverError::Store(e) => write!(f, "{e}"),
            DriverError::Cancelled => write!(f, "Exchange cancelled by the receiver"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Client(e) => Some(e),
            DriverError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ModelClientError> for DriverError {
    fn from(err: ModelClientError) -> Self {
        DriverError::Client(err)
    }
}

impl From<StoreError> for DriverError {
    fn from(err: StoreError) -> Self {
        DriverError::Store(err)
    }
}
