use std::{fmt::Debug, future::Future, pin::Pin};

pub type CredentialFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

/// Read-only access to the user's stored cloud credential.
///
/// An empty string means no key is stored.
pub trait CredentialStore: Debug + Send + Sync {
    fn get_cloud_api_key(&self) -> CredentialFuture<'_>;
}

/// A credential fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    key: String,
}

impl StaticCredentialStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl CredentialStore for StaticCredentialStore {
    fn get_cloud_api_key(&self) -> CredentialFuture<'_> {
        Box::pin(async move { self.key.clone() })
    }
}

/// Reads the key from an environment variable on every lookup.
#[derive(Debug, Clone)]
pub struct EnvCredentialStore {
    var: String,
}

impl EnvCredentialStore {
    pub const DEFAULT_VAR: &'static str = "OPENROUTER_API_KEY";

    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

impl CredentialStore for EnvCredentialStore {
    fn get_cloud_api_key(&self) -> CredentialFuture<'_> {
        Box::pin(async move { std::env::var(&self.var).unwrap_or_default() })
    }
}
