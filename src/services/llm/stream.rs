use std::{fmt::Display, pin::Pin, time::Duration};

use async_stream::{stream, try_stream};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::services::llm::models::chat::error_envelope;
use crate::ModelClientError;

/// Incremental reply text as handed to callers. Never fails: errors after the
/// first byte have already been folded into a closing fragment.
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send + 'static>>;

/// Decoded fragments before mid-stream failures are folded away.
pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<String, ModelClientError>> + Send + 'static>>;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Longest line a provider may send before the stream is treated as broken.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Closing fragment emitted when a stream breaks after it started.
pub const ERROR_FRAGMENT: &str = "Sorry, I encountered an error while processing your request.";
/// Returned by `get_single_response` when the provider produced nothing.
pub const NO_RESPONSE: &str = "No response received";

/// Splits a byte stream into `\n` terminated lines.
///
/// Bytes are kept raw until a full line is available so that a multi-byte
/// character cut across two network chunks is decoded intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    // bytes already known to hold no newline
    scanned: usize,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = self.buf.len();
            return None;
        };
        let pos = self.scanned + offset;
        self.scanned = 0;
        let line: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(decode_line(&line[..line.len() - 1]))
    }

    /// Bytes of the unterminated line still waiting for its newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drains whatever is left once the input ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

#[derive(Debug, PartialEq)]
pub enum Frame<'a> {
    Data(&'a str),
    Done,
}

/// Classifies one line. Anything that is not a `data:` line (comments,
/// `event:`, `id:`, keep-alive blanks) yields `None`.
pub fn parse_frame(line: &str) -> Option<Frame<'_>> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload == DONE_SENTINEL {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload))
    }
}

enum LineOutcome {
    Fragment(String),
    Done,
    Skip,
}

fn handle_line<F>(line: &str, extract: &F) -> Result<LineOutcome, ModelClientError>
where
    F: Fn(&Value) -> Option<String>,
{
    let payload = match parse_frame(line) {
        Some(Frame::Done) => return Ok(LineOutcome::Done),
        Some(Frame::Data(payload)) => payload,
        None => return Ok(LineOutcome::Skip),
    };

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            debug!(err = %e, raw = %payload, "skipping malformed stream frame");
            return Ok(LineOutcome::Skip);
        }
    };

    if let Some(e) = error_envelope(&value) {
        return Err(e);
    }

    match extract(&value) {
        Some(text) if !text.is_empty() => Ok(LineOutcome::Fragment(text)),
        _ => Ok(LineOutcome::Skip),
    }
}

/// Decodes a `data: <json>` framed body into text fragments.
///
/// Fragments are yielded as soon as their line is complete. The sequence ends
/// at the `[DONE]` sentinel (later bytes are never read) or when the body ends.
/// Frames that are not valid JSON are skipped. A transport error, or no bytes
/// for `idle_timeout`, or a line longer than [`MAX_LINE_BYTES`], ends the
/// sequence with a single `StreamIo` error.
pub fn decode_sse<S, B, E, F>(
    byte_stream: S,
    extract: F,
    idle_timeout: Option<Duration>,
) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
    F: Fn(&Value) -> Option<String> + Send + 'static,
{
    let s = try_stream! {
        let mut lines = LineBuffer::default();
        futures::pin_mut!(byte_stream);

        loop {
            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, byte_stream.next()).await {
                    Ok(next) => next,
                    Err(_) => Err(ModelClientError::StreamIo(format!(
                        "no data received for {} ms",
                        limit.as_millis()
                    )))?,
                },
                None => byte_stream.next().await,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| ModelClientError::StreamIo(e.to_string()))?;
            lines.push(chunk.as_ref());

            while let Some(line) = lines.next_line() {
                match handle_line(&line, &extract)? {
                    LineOutcome::Fragment(text) => yield text,
                    LineOutcome::Done => return,
                    LineOutcome::Skip => {}
                }
            }

            if lines.pending() > MAX_LINE_BYTES {
                Err::<(), _>(ModelClientError::StreamIo(format!(
                    "line exceeds {MAX_LINE_BYTES} bytes without a newline"
                )))?;
            }
        }

        if let Some(line) = lines.finish() {
            if let LineOutcome::Fragment(text) = handle_line(&line, &extract)? {
                yield text;
            }
        }
    };

    Box::pin(s)
}

/// Reads a whole non-streaming completion body and yields its text once.
pub fn decode_completion<F>(response: reqwest::Response, extract: F) -> FragmentStream
where
    F: Fn(&Value) -> Option<String> + Send + 'static,
{
    let s = try_stream! {
        let text = response
            .text()
            .await
            .map_err(|e| ModelClientError::StreamIo(e.to_string()))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            ModelClientError::Serialization(format!("decode error: {e}; raw: {text}"))
        })?;
        if let Some(e) = error_envelope(&value) {
            Err::<(), _>(e)?;
        }
        if let Some(content) = extract(&value).filter(|c| !c.is_empty()) {
            yield content;
        }
    };

    Box::pin(s)
}

/// Turns the first mid-stream error into [`ERROR_FRAGMENT`] and stops.
/// Text yielded before the error stays with the consumer.
pub fn recover_stream(mut fragments: FragmentStream, provider: &'static str) -> TextStream {
    let s = stream! {
        let mut yielded = 0usize;
        while let Some(item) = fragments.next().await {
            match item {
                Ok(text) => {
                    yielded += 1;
                    yield text;
                }
                Err(e) => {
                    warn!(provider, error = %e, fragments = yielded, "stream failed after start");
                    yield ERROR_FRAGMENT.to_string();
                    break;
                }
            }
        }
    };

    Box::pin(s)
}

/// A stream of exactly one fragment.
pub fn single_fragment(text: impl Into<String>) -> TextStream {
    Box::pin(futures::stream::once(futures::future::ready(text.into())))
}

/// Drains a non-streaming reply into its sole fragment, or [`NO_RESPONSE`].
pub async fn first_fragment(mut stream: TextStream) -> String {
    match stream.next().await {
        Some(text) => text,
        None => NO_RESPONSE.to_string(),
    }
}
