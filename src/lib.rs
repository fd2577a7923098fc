pub mod conversation;
pub mod notifications;
pub mod observability;
pub(crate) mod services;

#[cfg(test)]
pub(crate) mod test_util;

pub use conversation::{
    Chat, ConversationDriver, ConversationStore, DriverError, InMemoryConversationStore,
    StoreError,
};
pub use notifications::{
    Notification, NotificationContent, NotificationHandler, NotificationOutputChannel,
};
pub use observability::init_default_tracing;
pub use services::credentials::{CredentialStore, EnvCredentialStore, StaticCredentialStore};
pub use services::llm::models::{
    GenerationOptions, Message, ModelClientError, ModelDescriptor, ModelPricing, RateLimit, Role,
    UsageRecord,
};
pub use services::llm::providers::{
    local::LocalInferenceClient,
    openrouter::{CloudRoutingClient, UNCONFIGURED_FRAGMENT},
};
pub use services::llm::stream::{
    decode_sse, LineBuffer, TextStream, ERROR_FRAGMENT, MAX_LINE_BYTES, NO_RESPONSE,
};
pub use services::llm::{ChatBackend, ClientBuilder, ClientConfig, InferenceClient, Provider};
