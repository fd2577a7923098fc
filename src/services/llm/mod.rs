pub mod client;
pub mod client_config;
pub(crate) mod http;
pub mod models;
pub mod providers;
pub mod stream;

pub use client::{ChatBackend, InferenceClient, Provider};
pub use client_config::{ClientBuilder, ClientConfig};
