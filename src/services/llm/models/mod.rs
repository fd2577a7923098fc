pub mod base;
pub mod catalog;
pub mod chat;
pub mod errors;
pub mod message;

pub use base::*;
pub use catalog::*;
pub use errors::*;
pub use message::*;
