use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::{
    services::{credentials::CredentialStore, llm::InferenceClient},
    ModelClientError, Provider,
};

pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:1234/v1";
pub const DEFAULT_CLOUD_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_APP_URL: &str = "https://github.com/chatline/chatline-rs";
pub const DEFAULT_APP_TITLE: &str = "Chatline";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub provider: Option<Provider>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Sent as `HTTP-Referer` to the routing service.
    pub app_url: Option<String>,
    /// Sent as `X-Title` to the routing service.
    pub app_title: Option<String>,
    pub extra_headers: Option<HashMap<String, String>>,
    pub probe_timeout: Option<Duration>,
    /// Longest wait between two body chunks. `Duration::ZERO` disables the bound.
    pub stream_idle_timeout: Option<Duration>,
    pub credentials: Option<Arc<dyn CredentialStore>>,
}

impl ClientConfig {
    /// Reads overrides from `CHATLINE_LOCAL_BASE_URL`, `CHATLINE_CLOUD_BASE_URL`,
    /// `OPENROUTER_API_KEY`, `CHATLINE_APP_URL` and `CHATLINE_APP_TITLE`.
    pub fn from_env(provider: Provider) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let base_url = match provider {
            Provider::Local => var("CHATLINE_LOCAL_BASE_URL"),
            Provider::Cloud => var("CHATLINE_CLOUD_BASE_URL"),
        };
        let api_key = match provider {
            Provider::Local => None,
            Provider::Cloud => var("OPENROUTER_API_KEY"),
        };

        Self {
            provider: Some(provider),
            base_url,
            api_key,
            app_url: var("CHATLINE_APP_URL"),
            app_title: var("CHATLINE_APP_TITLE"),
            ..Default::default()
        }
    }

    pub(crate) fn resolved_probe_timeout(&self) -> Duration {
        self.probe_timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT)
    }

    pub(crate) fn resolved_idle_timeout(&self) -> Option<Duration> {
        match self.stream_idle_timeout {
            Some(d) if d.is_zero() => None,
            Some(d) => Some(d),
            None => Some(DEFAULT_STREAM_IDLE_TIMEOUT),
        }
    }
}

pub trait ClientBuilder {
    fn provider(self, provider: Provider) -> Self;
    fn base_url(self, base_url: impl Into<String>) -> Self;
    fn api_key(self, api_key: impl Into<String>) -> Self;
    fn app_url(self, app_url: impl Into<String>) -> Self;
    fn app_title(self, app_title: impl Into<String>) -> Self;
    fn extra_headers(self, extra_headers: HashMap<String, String>) -> Self;
    fn probe_timeout(self, timeout: Duration) -> Self;
    fn stream_idle_timeout(self, timeout: Duration) -> Self;
    fn credentials(self, store: Arc<dyn CredentialStore>) -> Self;
    fn build(self) -> Result<InferenceClient, ModelClientError>;
}

impl ClientBuilder for ClientConfig {
    fn provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn app_url(mut self, app_url: impl Into<String>) -> Self {
        self.app_url = Some(app_url.into());
        self
    }

    fn app_title(mut self, app_title: impl Into<String>) -> Self {
        self.app_title = Some(app_title.into());
        self
    }

    fn extra_headers(mut self, extra_headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(extra_headers);
        self
    }

    fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    fn stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = Some(timeout);
        self
    }

    fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    fn build(self) -> Result<InferenceClient, ModelClientError> {
        InferenceClient::try_from(ClientConfig {
            provider: self.provider.or(Some(Provider::Local)),
            ..self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_timeout_defaults_and_zero_disables() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.resolved_idle_timeout(), Some(DEFAULT_STREAM_IDLE_TIMEOUT));
        assert_eq!(cfg.resolved_probe_timeout(), DEFAULT_PROBE_TIMEOUT);

        let cfg = ClientConfig::default().stream_idle_timeout(Duration::ZERO);
        assert_eq!(cfg.resolved_idle_timeout(), None);

        let cfg = ClientConfig::default().stream_idle_timeout(Duration::from_secs(3));
        assert_eq!(cfg.resolved_idle_timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn build_defaults_to_local_provider() {
        let client = ClientConfig::default().build().unwrap();
        assert!(matches!(client.get_config().provider, Some(Provider::Local)));
    }
}
