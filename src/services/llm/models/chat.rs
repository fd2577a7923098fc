use serde::Serialize;
use serde_json::Value;

use crate::{GenerationOptions, Message, ModelClientError, Role};

/// Body of `POST /chat/completions`, shared by both providers.
#[derive(Serialize, Debug, Clone)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

/// A turn as the provider sees it: role and content only.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct WireMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

impl<'a> ChatRequest<'a> {
    pub fn new(model: &'a str, turns: &'a [Message], options: &GenerationOptions) -> Self {
        Self {
            model,
            messages: turns
                .iter()
                .map(|t| WireMessage {
                    role: t.role,
                    content: &t.content,
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: options.stream,
        }
    }
}

/// Incremental text of a streaming frame: `choices[0].delta.content`.
pub fn delta_content(frame: &Value) -> Option<String> {
    frame
        .pointer("/choices/0/delta/content")?
        .as_str()
        .map(str::to_owned)
}

/// Full text of a non-streaming body: `choices[0].message.content`.
pub fn message_content(body: &Value) -> Option<String> {
    body.pointer("/choices/0/message/content")?
        .as_str()
        .map(str::to_owned)
}

/// Recognizes the `{"error": ...}` envelope providers send in place of a
/// completion, either as a whole body or as a single SSE frame.
pub fn error_envelope(value: &Value) -> Option<ModelClientError> {
    let error = value.get("error")?;
    let message = match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let msg = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            match obj.get("code") {
                Some(code) if !code.is_null() => format!("{code}: {msg}"),
                _ => msg.to_string(),
            }
        }
        Value::Null => return None,
        other => other.to_string(),
    };
    Some(ModelClientError::Api(message))
}
