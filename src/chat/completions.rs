//! Completions backend.
//!
//! [`SourcegraphCompletionsClient`] posts a prompt to
//! `<endpoint>/.api/completions/stream` and reads the server-sent event
//! stream it answers with. Three event types matter:
//!
//! | event        | data                        | effect                           |
//! |--------------|-----------------------------|----------------------------------|
//! | `completion` | `{"completion": "<text>"}`  | replaces the text so far         |
//! | `error`      | `{"error": "<message>"}`    | the stream fails once it ends    |
//! | `done`       | `{}`                        | end of stream                    |
//!
//! Every `completion` event carries the full text so far, not a delta.

use std::future::Future;
use std::pin::Pin;

use bytes::BytesMut;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::chat::transcript::Speaker;
use crate::config::AgentConfig;
use crate::{AppError, Result};

/// Path of the streaming completions endpoint.
pub const COMPLETIONS_STREAM_PATH: &str = "/.api/completions/stream";

/// Boxed future returned by [`CompletionsClient::stream`].
pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Callback receiving the text so far each time it grows.
pub type OnChange<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// One prompt message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Author.
    pub speaker: Speaker,
    /// Message text.
    pub text: String,
}

/// Body of a completions request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionParameters {
    /// Conversation, oldest first; the last message is the new human turn.
    pub messages: Vec<PromptMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens_to_sample: u32,
    /// Top-k sampling; -1 disables.
    pub top_k: i32,
    /// Top-p sampling; -1 disables.
    pub top_p: i32,
}

impl CompletionParameters {
    /// Chat defaults for `messages`.
    #[must_use]
    pub fn chat(messages: Vec<PromptMessage>) -> Self {
        Self {
            messages,
            temperature: 0.2,
            max_tokens_to_sample: 1000,
            top_k: -1,
            top_p: -1,
        }
    }
}

/// Source of model completions.
pub trait CompletionsClient: Send + Sync {
    /// Stream a completion for `params`, reporting partial text to
    /// `on_change`, and resolve with the final text.
    ///
    /// Errors surface as [`AppError::Upstream`].
    fn stream<'a>(
        &'a self,
        params: CompletionParameters,
        on_change: OnChange<'a>,
    ) -> CompletionFuture<'a>;
}

// ── Event stream ──────────────────────────────────────────────────────────────

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    /// Full completion text so far.
    Completion(String),
    /// Server-reported failure.
    Error(String),
    /// End of stream.
    Done,
}

#[derive(Deserialize)]
struct CompletionData {
    completion: String,
}

#[derive(Deserialize)]
struct ErrorData {
    error: String,
}

/// Splits a `text/event-stream` body into [`CompletionEvent`]s.
///
/// Events of other types and comment lines are skipped.
#[derive(Debug, Default)]
pub struct EventStreamCodec;

impl EventStreamCodec {
    /// Create a decoder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for EventStreamCodec {
    type Item = CompletionEvent;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        while let Some((end, separator)) = find_event_end(src) {
            let block = src.split_to(end + separator);
            let text = String::from_utf8_lossy(&block[..end]);
            if let Some(event) = parse_event_block(&text)? {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }
        // A final event may be missing its blank-line terminator.
        let block = src.split();
        parse_event_block(&String::from_utf8_lossy(&block))
    }
}

/// Position of the first blank line and the length of that separator.
fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|at| (at, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|at| (at, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Parse one event block (`event:` and `data:` lines).
///
/// # Errors
///
/// Returns [`AppError::Upstream`] if a known event carries malformed data.
pub fn parse_event_block(block: &str) -> Result<Option<CompletionEvent>> {
    let mut name = "message";
    let mut data = Vec::new();
    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => name = value,
            "data" => data.push(value),
            _ => {}
        }
    }
    let data = data.join("\n");

    let event = match name {
        "completion" => {
            let parsed: CompletionData = serde_json::from_str(&data)
                .map_err(|e| AppError::Upstream(format!("malformed completion event: {e}")))?;
            CompletionEvent::Completion(parsed.completion)
        }
        "error" => {
            let parsed: ErrorData = serde_json::from_str(&data)
                .map_err(|e| AppError::Upstream(format!("malformed error event: {e}")))?;
            CompletionEvent::Error(parsed.error)
        }
        "done" => CompletionEvent::Done,
        other => {
            debug!(event = other, "completions: skipping event");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

/// Accumulates events into the final completion.
#[derive(Debug, Default)]
struct CompletionFold {
    text: String,
    error: Option<String>,
}

impl CompletionFold {
    /// Apply one event; returns true once the stream is done.
    fn apply(&mut self, event: CompletionEvent, on_change: OnChange<'_>) -> bool {
        match event {
            CompletionEvent::Completion(text) => {
                self.text = text;
                if self.error.is_none() {
                    on_change(&self.text);
                }
                false
            }
            CompletionEvent::Error(message) => {
                warn!(error = %message, "completions: server reported an error");
                if self.error.is_none() {
                    self.error = Some(message);
                }
                false
            }
            CompletionEvent::Done => true,
        }
    }

    fn finish(self) -> Result<String> {
        match self.error {
            Some(message) => Err(AppError::Upstream(message)),
            None => Ok(self.text),
        }
    }
}

/// Fold a complete event sequence into the final text.
///
/// Events after `done` are ignored.
///
/// # Errors
///
/// Returns [`AppError::Upstream`] carrying the first `error` event.
pub fn fold_events<I>(events: I, on_change: OnChange<'_>) -> Result<String>
where
    I: IntoIterator<Item = CompletionEvent>,
{
    let mut fold = CompletionFold::default();
    for event in events {
        if fold.apply(event, on_change) {
            break;
        }
    }
    fold.finish()
}

// ── Sourcegraph HTTP client ───────────────────────────────────────────────────

/// [`CompletionsClient`] talking to a Sourcegraph instance over HTTP.
#[derive(Debug, Clone)]
pub struct SourcegraphCompletionsClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl SourcegraphCompletionsClient {
    /// Build a client from the endpoint, token and custom headers in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the endpoint or a header is invalid.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let endpoint = config
            .endpoint_url()?
            .join(COMPLETIONS_STREAM_PATH)
            .map_err(|e| AppError::Config(format!("invalid completions endpoint: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.custom_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AppError::Config(format!("invalid header name `{name}`: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AppError::Config(format!("invalid value for header `{name}`: {e}")))?;
            headers.insert(name, value);
        }
        let mut token = HeaderValue::from_str(&format!("token {}", config.access_token))
            .map_err(|e| AppError::Config(format!("access token is not a valid header: {e}")))?;
        token.set_sensitive(true);
        headers.insert(AUTHORIZATION, token);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { http, endpoint })
    }

    /// Full URL completions are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl CompletionsClient for SourcegraphCompletionsClient {
    fn stream<'a>(
        &'a self,
        params: CompletionParameters,
        on_change: OnChange<'a>,
    ) -> CompletionFuture<'a> {
        Box::pin(async move {
            debug!(endpoint = %self.endpoint, messages = params.messages.len(), "completions: request");
            let mut response = self
                .http
                .post(self.endpoint.clone())
                .header(ACCEPT, "text/event-stream")
                .json(&params)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Upstream(format!(
                    "completions request failed with {status}: {}",
                    body.trim()
                )));
            }

            let mut codec = EventStreamCodec::new();
            let mut buf = BytesMut::new();
            let mut fold = CompletionFold::default();

            while let Some(chunk) = response.chunk().await? {
                buf.extend_from_slice(&chunk);
                while let Some(event) = codec.decode(&mut buf)? {
                    if fold.apply(event, on_change) {
                        return fold.finish();
                    }
                }
            }
            while let Some(event) = codec.decode_eof(&mut buf)? {
                if fold.apply(event, on_change) {
                    break;
                }
            }
            fold.finish()
        })
    }
}
