pub mod chat;
pub mod driver;
pub mod error;
pub mod store;

pub use chat::Chat;
pub use driver::ConversationDriver;
pub use error::DriverError;
pub use store::{ConversationStore, InMemoryConversationStore, StoreError};
