use std::{sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderName, HeaderValue},
    Client, RequestBuilder,
};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::services::credentials::CredentialStore;
use crate::services::llm::client_config::{
    ClientConfig, DEFAULT_APP_TITLE, DEFAULT_APP_URL, DEFAULT_CLOUD_BASE_URL,
};
use crate::services::llm::http::{ensure_success, header_map, join_url, send_traced};
use crate::services::llm::models::catalog::de_lenient_pricing;
use crate::services::llm::models::chat::{delta_content, message_content, ChatRequest};
use crate::services::llm::stream::{
    decode_completion, decode_sse, first_fragment, recover_stream, single_fragment, TextStream,
};
use crate::{
    GenerationOptions, Message, ModelClientError, ModelDescriptor, ModelPricing, UsageRecord,
};

/// Yielded instead of a reply when no API key can be resolved.
pub const UNCONFIGURED_FRAGMENT: &str =
    "OpenRouter API key is not configured. Please add your API key in settings to use cloud models.";

/// Client for the OpenRouter multi-model routing API.
///
/// The bearer key is resolved lazily: an explicit key wins, otherwise the
/// [`CredentialStore`] is asked on first use and a non-empty answer is cached.
#[derive(Debug, Clone)]
pub struct CloudRoutingClient {
    client: Client,
    base_url: String,
    api_key: Arc<RwLock<Option<String>>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    stream_idle_timeout: Option<Duration>,
}

impl CloudRoutingClient {
    pub fn new(cfg: ClientConfig) -> Result<Self, ModelClientError> {
        let stream_idle_timeout = cfg.resolved_idle_timeout();
        let mut headers = header_map(cfg.extra_headers.as_ref())?;

        let app_url = cfg.app_url.as_deref().unwrap_or(DEFAULT_APP_URL);
        let app_title = cfg.app_title.as_deref().unwrap_or(DEFAULT_APP_TITLE);
        headers.insert(
            HeaderName::from_static("http-referer"),
            HeaderValue::from_str(app_url)
                .map_err(|e| ModelClientError::Config(format!("Invalid app_url header: {e}")))?,
        );
        headers.insert(
            HeaderName::from_static("x-title"),
            HeaderValue::from_str(app_title)
                .map_err(|e| ModelClientError::Config(format!("Invalid app_title header: {e}")))?,
        );

        let client = Client::builder().default_headers(headers).build()?;
        let api_key = cfg.api_key.filter(|k| !k.trim().is_empty());

        Ok(Self {
            client,
            base_url: cfg
                .base_url
                .unwrap_or_else(|| DEFAULT_CLOUD_BASE_URL.to_string()),
            api_key: Arc::new(RwLock::new(api_key)),
            credentials: cfg.credentials,
            stream_idle_timeout,
        })
    }

    /// Replaces the cached key. An empty key clears it, so the next call
    /// consults the credential store again.
    pub async fn set_api_key(&self, key: impl Into<String>) {
        let key = key.into();
        *self.api_key.write().await = if key.trim().is_empty() {
            None
        } else {
            Some(key)
        };
    }

    pub async fn is_configured(&self) -> bool {
        self.resolve_api_key().await.is_some()
    }

    async fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.read().await.clone() {
            return Some(key);
        }

        let store = self.credentials.as_ref()?;
        let fetched = store.get_cloud_api_key().await;
        let fetched = fetched.trim();
        if fetched.is_empty() {
            debug!("no stored OpenRouter key");
            return None;
        }

        let mut slot = self.api_key.write().await;
        // Another caller may have filled the slot while we were fetching.
        Some(slot.get_or_insert_with(|| fetched.to_string()).clone())
    }

    fn authorized(&self, request: RequestBuilder, key: Option<&str>) -> RequestBuilder {
        match key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Returns the full catalog with pricing and context length where the
    /// service reports them. Empty on any failure.
    #[instrument(name = "openrouter.list_models", skip_all)]
    pub async fn list_models(&self) -> Vec<ModelDescriptor> {
        match self.fetch_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "failed to list OpenRouter models");
                Vec::new()
            }
        }
    }

    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, ModelClientError> {
        let url = join_url(&self.base_url, "/models");
        let key = self.resolve_api_key().await;
        let request = self.authorized(self.client.get(&url), key.as_deref());

        let resp = send_traced(request, "GET", &url, None).await?;
        let text = ensure_success(resp).await?.text().await?;
        let catalog: OrModelList = serde_json::from_str(&text).map_err(|e| {
            ModelClientError::Serialization(format!("decode error: {e}; raw: {text}"))
        })?;

        Ok(catalog.data.into_iter().map(ModelDescriptor::from).collect())
    }

    /// Key usage and limits. `None` when unconfigured or on any failure.
    #[instrument(name = "openrouter.get_usage", skip_all)]
    pub async fn get_usage(&self) -> Option<UsageRecord> {
        let key = self.resolve_api_key().await?;
        match self.fetch_usage(&key).await {
            Ok(usage) => Some(usage),
            Err(e) => {
                warn!(error = %e, "failed to fetch OpenRouter usage");
                None
            }
        }
    }

    async fn fetch_usage(&self, key: &str) -> Result<UsageRecord, ModelClientError> {
        let url = join_url(&self.base_url, "/auth/key");
        let request = self.client.get(&url).bearer_auth(key);

        let resp = send_traced(request, "GET", &url, None).await?;
        let text = ensure_success(resp).await?.text().await?;
        let envelope: OrKeyInfo = serde_json::from_str(&text).map_err(|e| {
            ModelClientError::Serialization(format!("decode error: {e}; raw: {text}"))
        })?;
        Ok(envelope.data)
    }

    /// Same contract as the local client, plus: with no resolvable key the
    /// stream is a single [`UNCONFIGURED_FRAGMENT`] and nothing is sent.
    #[instrument(name = "openrouter.stream_completion", skip_all, fields(model = %model, turns = turns.len()))]
    pub async fn stream_completion(
        &self,
        turns: &[Message],
        model: &str,
        options: GenerationOptions,
    ) -> Result<TextStream, ModelClientError> {
        let Some(key) = self.resolve_api_key().await else {
            warn!("OpenRouter key missing, skipping request");
            return Ok(single_fragment(UNCONFIGURED_FRAGMENT));
        };

        let url = join_url(&self.base_url, "/chat/completions");
        let body = ChatRequest::new(model, turns, &options);
        let input = serde_json::to_string(&body).ok();
        let request = self.client.post(&url).bearer_auth(&key).json(&body);

        let resp = send_traced(request, "POST", &url, input).await?;
        let resp = ensure_success(resp).await?;

        let fragments = if options.stream {
            decode_sse(resp.bytes_stream(), delta_content, self.stream_idle_timeout)
        } else {
            decode_completion(resp, message_content)
        };
        Ok(recover_stream(fragments, "openrouter"))
    }

    pub async fn get_single_response(
        &self,
        turns: &[Message],
        model: &str,
    ) -> Result<String, ModelClientError> {
        let options = GenerationOptions::default().with_stream(false);
        let stream = self.stream_completion(turns, model, options).await?;
        Ok(first_fragment(stream).await)
    }
}

#[derive(Deserialize)]
struct OrModelList {
    #[serde(default)]
    data: Vec<OrModel>,
}

#[derive(Deserialize)]
struct OrModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_pricing")]
    pricing: Option<ModelPricing>,
    #[serde(default)]
    context_length: Option<u64>,
}

impl From<OrModel> for ModelDescriptor {
    fn from(m: OrModel) -> Self {
        ModelDescriptor {
            name: m.name.unwrap_or_else(|| m.id.clone()),
            id: m.id,
            pricing: m.pricing,
            context_length: m.context_length,
        }
    }
}

#[derive(Deserialize)]
struct OrKeyInfo {
    data: UsageRecord,
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::services::credentials::StaticCredentialStore;
    use crate::test_util::{sse_frame, MockReply, MockServer};
    use crate::{ClientBuilder, ERROR_FRAGMENT, NO_RESPONSE};

    fn config_for(server: &MockServer) -> ClientConfig {
        ClientConfig::default()
            .base_url(server.base_url())
            .stream_idle_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn unconfigured_without_key_or_store() {
        let client = CloudRoutingClient::new(ClientConfig::default()).unwrap();
        assert!(!client.is_configured().await);

        let empty_store = ClientConfig::default().credentials(Arc::new(StaticCredentialStore::new("  ")));
        let client = CloudRoutingClient::new(empty_store).unwrap();
        assert!(!client.is_configured().await);
    }

    #[tokio::test]
    async fn configured_after_direct_key() {
        let client = CloudRoutingClient::new(ClientConfig::default()).unwrap();
        client.set_api_key("sk-or-direct").await;
        assert!(client.is_configured().await);

        client.set_api_key("").await;
        assert!(!client.is_configured().await);
    }

    #[tokio::test]
    async fn configured_from_credential_store() {
        let cfg = ClientConfig::default().credentials(Arc::new(StaticCredentialStore::new("sk-or-stored")));
        let client = CloudRoutingClient::new(cfg).unwrap();
        assert!(client.is_configured().await);
        assert_eq!(client.api_key.read().await.as_deref(), Some("sk-or-stored"));
    }

    #[tokio::test]
    async fn missing_key_yields_explanation_without_request() {
        let server = MockServer::start(vec![MockReply::sse(vec![sse_frame("nope")])]).await;
        let client = CloudRoutingClient::new(config_for(&server)).unwrap();

        let out: Vec<String> = client
            .stream_completion(&[Message::user("Hello")], "m", GenerationOptions::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(out, vec![UNCONFIGURED_FRAGMENT.to_string()]);
        assert!(server.requests().await.is_empty());
    }

    #[tokio::test]
    async fn streams_with_auth_and_attribution_headers() {
        let server = MockServer::start(vec![MockReply::sse(vec![
            ": OPENROUTER PROCESSING\n\n".to_string(),
            sse_frame("Hi"),
            sse_frame(" there"),
            "data: [DONE]\n\n".to_string(),
        ])])
        .await;
        let client = CloudRoutingClient::new(
            config_for(&server)
                .api_key("sk-or-test")
                .app_title("Chatline Tests"),
        )
        .unwrap();

        let out: Vec<String> = client
            .stream_completion(&[Message::user("Hello")], "test-model", GenerationOptions::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(out, vec!["Hi".to_string(), " there".to_string()]);

        let req = server.requests().await.remove(0);
        assert_eq!(req.header("authorization").as_deref(), Some("Bearer sk-or-test"));
        assert_eq!(req.header("x-title").as_deref(), Some("Chatline Tests"));
        assert_eq!(req.header("http-referer").as_deref(), Some(DEFAULT_APP_URL));
    }

    #[tokio::test]
    async fn unauthorized_status_is_an_error() {
        let server = MockServer::start(vec![MockReply::status(
            401,
            r#"{"error":{"message":"No auth credentials found","code":401}}"#,
        )])
        .await;
        let client = CloudRoutingClient::new(config_for(&server).api_key("sk-bad")).unwrap();

        let err = client
            .stream_completion(&[Message::user("Hello")], "m", GenerationOptions::default())
            .await
            .err()
            .expect("401 must fail before streaming");
        assert!(matches!(err, ModelClientError::ProviderRequest { status: 401, .. }));
    }

    #[tokio::test]
    async fn in_band_error_frame_becomes_apology() {
        let server = MockServer::start(vec![MockReply::sse(vec![
            sse_frame("Par"),
            "data: {\"error\":{\"message\":\"Provider returned error\",\"code\":502}}\n\n".to_string(),
        ])])
        .await;
        let client = CloudRoutingClient::new(config_for(&server).api_key("k")).unwrap();

        let out: Vec<String> = client
            .stream_completion(&[Message::user("Hello")], "m", GenerationOptions::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(out, vec!["Par".to_string(), ERROR_FRAGMENT.to_string()]);
    }

    #[tokio::test]
    async fn dropped_connection_keeps_partial_text() {
        let server = MockServer::start(vec![MockReply::sse_then_drop(vec![sse_frame("Hi")])]).await;
        let client = CloudRoutingClient::new(config_for(&server).api_key("k")).unwrap();

        let out: Vec<String> = client
            .stream_completion(&[Message::user("Hello")], "m", GenerationOptions::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(out, vec!["Hi".to_string(), ERROR_FRAGMENT.to_string()]);
    }

    #[tokio::test]
    async fn single_response_reads_message_content() {
        let server = MockServer::start(vec![
            MockReply::json(r#"{"id":"gen-1","choices":[{"message":{"role":"assistant","content":"Paris"}}]}"#),
            MockReply::json(r#"{"id":"gen-2","choices":[{"message":{"role":"assistant","content":""}}]}"#),
        ])
        .await;
        let client = CloudRoutingClient::new(config_for(&server).api_key("k")).unwrap();

        let turns = [Message::user("Capital of France?")];
        assert_eq!(client.get_single_response(&turns, "m").await.unwrap(), "Paris");
        assert_eq!(client.get_single_response(&turns, "m").await.unwrap(), NO_RESPONSE);
    }

    #[tokio::test]
    async fn list_models_returns_full_catalog_with_metadata() {
        let server = MockServer::start(vec![MockReply::json(
            r#"{"data":[
                {"id":"openai/gpt-4o","name":"OpenAI: GPT-4o","context_length":128000,
                 "pricing":{"prompt":"0.0000025","completion":"0.00001"}},
                {"id":"meta/llama-3-8b"},
                {"id":"acme/partial","pricing":{"prompt":"0.1"}}
            ]}"#,
        )])
        .await;
        let client = CloudRoutingClient::new(config_for(&server)).unwrap();

        let models = client.list_models().await;
        assert_eq!(models.len(), 3);
        assert_eq!(models[0].name, "OpenAI: GPT-4o");
        assert_eq!(models[0].context_length, Some(128000));
        assert_eq!(
            models[0].pricing,
            Some(ModelPricing {
                prompt: 0.0000025,
                completion: 0.00001
            })
        );
        assert_eq!(models[1], ModelDescriptor::new("meta/llama-3-8b"));
        assert_eq!(models[2], ModelDescriptor::new("acme/partial"));
    }

    #[tokio::test]
    async fn usage_is_none_when_unconfigured_or_failing() {
        let server = MockServer::start(vec![
            MockReply::json(r#"{"data":{"label":"sk-or-...abc","usage":0.42,"limit":null,"is_free_tier":false}}"#),
            MockReply::status(500, "oops"),
        ])
        .await;

        let unconfigured = CloudRoutingClient::new(config_for(&server)).unwrap();
        assert!(unconfigured.get_usage().await.is_none());
        assert!(server.requests().await.is_empty());

        let client = CloudRoutingClient::new(config_for(&server).api_key("k")).unwrap();
        let usage = client.get_usage().await.expect("usage record");
        assert_eq!(usage.usage, 0.42);
        assert_eq!(usage.label.as_deref(), Some("sk-or-...abc"));
        assert!(client.get_usage().await.is_none());
    }
}
