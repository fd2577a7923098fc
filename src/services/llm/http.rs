use std::collections::HashMap;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    RequestBuilder, Response,
};
use tracing::{error, span, Instrument, Level, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::ModelClientError;

/// Sends `request` inside a span carrying the Langfuse observation attributes.
/// Only transport failures are errors here; the status is left to the caller.
pub(crate) async fn send_traced(
    request: RequestBuilder,
    method: &'static str,
    url: &str,
    input: Option<String>,
) -> Result<Response, ModelClientError> {
    let span = span!(
        Level::INFO,
        "HTTP request",
        "langfuse.observation.name" = format!("{method} {url}").as_str(),
        "langfuse.observation.type" = "span",
        "http.request.method" = method,
        "url.full" = url,
    );

    if let Some(body) = input {
        span.set_attribute("langfuse.observation.input", body);
    }

    async {
        let response = request.send().await.map_err(|e| {
            Span::current().set_status(opentelemetry::trace::Status::Error {
                description: e.to_string().into(),
            });
            ModelClientError::from(e)
        })?;

        Span::current().set_attribute(
            "http.response.status_code",
            response.status().as_u16() as i64,
        );
        Ok(response)
    }
    .instrument(span)
    .await
}

/// Passes a successful response through; otherwise reads the body into a
/// [`ModelClientError::ProviderRequest`].
pub(crate) async fn ensure_success(response: Response) -> Result<Response, ModelClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".into());

    error!(%status, body = %body, "provider request failed");
    Span::current().set_attribute("langfuse.observation.status_message", body.clone());

    Err(ModelClientError::ProviderRequest {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn header_map(
    extra: Option<&HashMap<String, String>>,
) -> Result<HeaderMap, ModelClientError> {
    let mut headers = HeaderMap::new();
    if let Some(extra) = extra {
        for (k, v) in extra {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|_| ModelClientError::Config(format!("Invalid header name: {k}")))?;
            let value = HeaderValue::from_str(v)
                .map_err(|_| ModelClientError::Config(format!("Invalid header value for {k}")))?;
            headers.insert(name, value);
        }
    }
    Ok(headers)
}

pub(crate) fn join_url(base_url: &str, endpoint: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), endpoint)
}
