use std::{fmt, future::Future, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    services::llm::{
        models::errors::ModelClientError,
        providers::{local::LocalInferenceClient, openrouter::CloudRoutingClient},
        stream::TextStream,
    },
    ClientConfig, GenerationOptions, Message, ModelDescriptor,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Local,
    Cloud,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Local => write!(f, "local"),
            Provider::Cloud => write!(f, "cloud"),
        }
    }
}

/// The capability set shared by every backend a conversation can talk to.
pub trait ChatBackend: Send + Sync {
    fn provider(&self) -> Provider;

    /// Local: the server answered the probe. Cloud: a key is available.
    fn is_ready(&self) -> impl Future<Output = bool> + Send;

    fn list_models(&self) -> impl Future<Output = Vec<ModelDescriptor>> + Send;

    fn stream_completion(
        &self,
        turns: &[Message],
        model: &str,
        options: GenerationOptions,
    ) -> impl Future<Output = Result<TextStream, ModelClientError>> + Send;

    fn get_single_response(
        &self,
        turns: &[Message],
        model: &str,
    ) -> impl Future<Output = Result<String, ModelClientError>> + Send;
}

impl ChatBackend for LocalInferenceClient {
    fn provider(&self) -> Provider {
        Provider::Local
    }

    async fn is_ready(&self) -> bool {
        self.check_availability().await
    }

    async fn list_models(&self) -> Vec<ModelDescriptor> {
        LocalInferenceClient::list_models(self).await
    }

    async fn stream_completion(
        &self,
        turns: &[Message],
        model: &str,
        options: GenerationOptions,
    ) -> Result<TextStream, ModelClientError> {
        LocalInferenceClient::stream_completion(self, turns, model, options).await
    }

    async fn get_single_response(
        &self,
        turns: &[Message],
        model: &str,
    ) -> Result<String, ModelClientError> {
        LocalInferenceClient::get_single_response(self, turns, model).await
    }
}

impl ChatBackend for CloudRoutingClient {
    fn provider(&self) -> Provider {
        Provider::Cloud
    }

    async fn is_ready(&self) -> bool {
        self.is_configured().await
    }

    async fn list_models(&self) -> Vec<ModelDescriptor> {
        CloudRoutingClient::list_models(self).await
    }

    async fn stream_completion(
        &self,
        turns: &[Message],
        model: &str,
        options: GenerationOptions,
    ) -> Result<TextStream, ModelClientError> {
        CloudRoutingClient::stream_completion(self, turns, model, options).await
    }

    async fn get_single_response(
        &self,
        turns: &[Message],
        model: &str,
    ) -> Result<String, ModelClientError> {
        CloudRoutingClient::get_single_response(self, turns, model).await
    }
}

#[derive(Debug, Clone)]
enum ClientInner {
    Local(LocalInferenceClient),
    Cloud(CloudRoutingClient),
}

/// A backend picked at runtime from [`ClientConfig::provider`].
#[derive(Clone, Debug)]
pub struct InferenceClient {
    config: ClientConfig,
    inner: Arc<ClientInner>,
}

impl InferenceClient {
    pub fn get_config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn as_local(&self) -> Option<&LocalInferenceClient> {
        match &*self.inner {
            ClientInner::Local(c) => Some(c),
            ClientInner::Cloud(_) => None,
        }
    }

    pub fn as_cloud(&self) -> Option<&CloudRoutingClient> {
        match &*self.inner {
            ClientInner::Cloud(c) => Some(c),
            ClientInner::Local(_) => None,
        }
    }
}

impl ChatBackend for InferenceClient {
    fn provider(&self) -> Provider {
        match &*self.inner {
            ClientInner::Local(_) => Provider::Local,
            ClientInner::Cloud(_) => Provider::Cloud,
        }
    }

    async fn is_ready(&self) -> bool {
        match &*self.inner {
            ClientInner::Local(c) => c.check_availability().await,
            ClientInner::Cloud(c) => c.is_configured().await,
        }
    }

    async fn list_models(&self) -> Vec<ModelDescriptor> {
        match &*self.inner {
            ClientInner::Local(c) => c.list_models().await,
            ClientInner::Cloud(c) => c.list_models().await,
        }
    }

    async fn stream_completion(
        &self,
        turns: &[Message],
        model: &str,
        options: GenerationOptions,
    ) -> Result<TextStream, ModelClientError> {
        match &*self.inner {
            ClientInner::Local(c) => c.stream_completion(turns, model, options).await,
            ClientInner::Cloud(c) => c.stream_completion(turns, model, options).await,
        }
    }

    async fn get_single_response(
        &self,
        turns: &[Message],
        model: &str,
    ) -> Result<String, ModelClientError> {
        match &*self.inner {
            ClientInner::Local(c) => c.get_single_response(turns, model).await,
            ClientInner::Cloud(c) => c.get_single_response(turns, model).await,
        }
    }
}

impl TryFrom<ClientConfig> for InferenceClient {
    type Error = ModelClientError;

    fn try_from(cfg: ClientConfig) -> Result<Self, Self::Error> {
        let config = cfg.clone();
        let Some(provider) = cfg.provider else {
            return Err(ModelClientError::Config("Provider not defined".into()));
        };
        let inner = match provider {
            Provider::Local => ClientInner::Local(LocalInferenceClient::new(cfg)?),
            Provider::Cloud => ClientInner::Cloud(CloudRoutingClient::new(cfg)?),
        };
        Ok(Self {
            config,
            inner: Arc::new(inner),
        })
    }
}
