use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::services::llm::client_config::{ClientConfig, DEFAULT_LOCAL_BASE_URL};
use crate::services::llm::http::{ensure_success, header_map, join_url, send_traced};
use crate::services::llm::models::chat::{delta_content, message_content, ChatRequest};
use crate::services::llm::stream::{
    decode_completion, decode_sse, first_fragment, recover_stream, TextStream,
};
use crate::{GenerationOptions, Message, ModelClientError, ModelDescriptor};

/// Client for a local server exposing the OpenAI chat-completions API
/// (LM Studio, llama.cpp server and friends). No authentication.
#[derive(Debug, Clone)]
pub struct LocalInferenceClient {
    client: Client,
    base_url: String,
    probe_timeout: Duration,
    stream_idle_timeout: Option<Duration>,
}

impl LocalInferenceClient {
    pub fn new(cfg: ClientConfig) -> Result<Self, ModelClientError> {
        let probe_timeout = cfg.resolved_probe_timeout();
        let stream_idle_timeout = cfg.resolved_idle_timeout();
        let headers = header_map(cfg.extra_headers.as_ref())?;
        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: cfg
                .base_url
                .unwrap_or_else(|| DEFAULT_LOCAL_BASE_URL.to_string()),
            probe_timeout,
            stream_idle_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probes the catalog endpoint. Any failure, including hitting the probe
    /// timeout, reads as "not available".
    #[instrument(name = "local.check_availability", skip_all, fields(base_url = %self.base_url))]
    pub async fn check_availability(&self) -> bool {
        let url = join_url(&self.base_url, "/models");
        let probe = self.client.get(&url).timeout(self.probe_timeout).send();

        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(resp)) => {
                let ok = resp.status().is_success();
                debug!(status = %resp.status(), available = ok, "probe finished");
                ok
            }
            Ok(Err(e)) => {
                debug!(error = %e, "local inference server unreachable");
                false
            }
            Err(_) => {
                debug!(timeout_ms = self.probe_timeout.as_millis() as u64, "probe timed out");
                false
            }
        }
    }

    #[instrument(name = "local.list_models", skip_all)]
    pub async fn list_models(&self) -> Vec<ModelDescriptor> {
        match self.fetch_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "failed to list local models");
                Vec::new()
            }
        }
    }

    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, ModelClientError> {
        let url = join_url(&self.base_url, "/models");
        let resp = send_traced(self.client.get(&url), "GET", &url, None).await?;
        let text = ensure_success(resp).await?.text().await?;
        let list: LocalModelList = serde_json::from_str(&text).map_err(|e| {
            ModelClientError::Serialization(format!("decode error: {e}; raw: {text}"))
        })?;
        Ok(list
            .data
            .into_iter()
            .map(|m| ModelDescriptor::new(m.id))
            .collect())
    }

    /// Starts a completion and returns its text as it arrives.
    ///
    /// A non-success status is returned as `Err` before anything is yielded.
    /// Failures after that end the stream with an apology fragment.
    #[instrument(name = "local.stream_completion", skip_all, fields(model = %model, turns = turns.len()))]
    pub async fn stream_completion(
        &self,
        turns: &[Message],
        model: &str,
        options: GenerationOptions,
    ) -> Result<TextStream, ModelClientError> {
        let url = join_url(&self.base_url, "/chat/completions");
        let body = ChatRequest::new(model, turns, &options);
        let input = serde_json::to_string(&body).ok();

        let resp = send_traced(self.client.post(&url).json(&body), "POST", &url, input).await?;
        let resp = ensure_success(resp).await?;

        let fragments = if options.stream {
            decode_sse(resp.bytes_stream(), delta_content, self.stream_idle_timeout)
        } else {
            decode_completion(resp, message_content)
        };
        Ok(recover_stream(fragments, "local"))
    }

    /// Non-streaming convenience call. Yields [`NO_RESPONSE`](crate::NO_RESPONSE)
    /// when the server returned no text.
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
struct LocalModelList {
    #[serde(default)]
    data: Vec<LocalModel>,
}

#[derive(Deserialize)]
struct LocalModel {
    id: String,
}
