//! Protocol message model.
//!
//! Every framed body decodes into exactly one [`Message`]. Classification
//! follows the presence of `id` and `method`:
//!
//! | `id` | `method` | Variant                    |
//! |------|----------|----------------------------|
//! | yes  | yes      | [`Message::Request`]       |
//! | yes  | no       | [`Message::Response`]      |
//! | no   | yes      | [`Message::Notification`]  |
//! | no   | no       | rejected as a framing error |
//!
//! A `jsonrpc` member sent by the peer is accepted and ignored; outbound
//! messages carry only the members shown above.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppError;

/// Correlation id of a request, unique per direction for the connection.
pub type RequestId = i64;

/// JSON-RPC error codes used on the wire.
pub mod codes {
    /// The request object is not valid in the current state.
    pub const INVALID_REQUEST: i64 = -32600;
    /// No handler is registered for the method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Parameters failed to decode into the method's params type.
    pub const INVALID_PARAMS: i64 = -32602;
    /// A handler failed or panicked.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// An operational request arrived before `initialize`.
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
    /// Generic server-side failure (unknown recipe, upstream failure).
    pub const SERVER_ERROR: i64 = -32000;
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    /// Human-readable failure description.
    pub message: String,
    /// Optional numeric error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

/// A call that expects exactly one [`Response`] with the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id assigned by the sender.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters; `Value::Null` when the method takes none.
    pub params: Value,
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request being answered.
    pub id: RequestId,
    /// Result value or error object.
    pub outcome: std::result::Result<Value, ResponseError>,
}

impl Response {
    /// Successful response carrying `result`.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Failed response carrying `error`.
    #[must_use]
    pub fn failure(id: RequestId, error: ResponseError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }

    /// Build a response from a handler outcome.
    #[must_use]
    pub fn from_outcome(id: RequestId, outcome: crate::Result<Value>) -> Self {
        Self {
            id,
            outcome: outcome.map_err(|err| err.to_response_error()),
        }
    }
}

/// A fire-and-forget message; no response is ever sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Method name.
    pub method: String,
    /// Method parameters; `Value::Null` when the method takes none.
    pub params: Value,
}

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Envelope", into = "Envelope")]
pub enum Message {
    /// See [`Request`].
    Request(Request),
    /// See [`Response`].
    Response(Response),
    /// See [`Notification`].
    Notification(Notification),
}

impl Message {
    /// Build a request message.
    #[must_use]
    pub fn request(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self::Request(Request {
            id,
            method: method.into(),
            params,
        })
    }

    /// Build a notification message.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    /// Method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(note) => Some(&note.method),
            Self::Response(_) => None,
        }
    }

    /// Correlation id for requests and responses.
    #[must_use]
    pub fn id(&self) -> Option<RequestId> {
        match self {
            Self::Request(req) => Some(req.id),
            Self::Response(resp) => Some(resp.id),
            Self::Notification(_) => None,
        }
    }
}

// ── Wire envelope ─────────────────────────────────────────────────────────────

/// Flat wire shape shared by all three message kinds.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    // `Some(Value::Null)` still serialises, so void results go out as `"result":null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ResponseError>,
}

impl TryFrom<Envelope> for Message {
    type Error = AppError;

    fn try_from(env: Envelope) -> Result<Self, Self::Error> {
        match (env.id, env.method) {
            (Some(id), Some(method)) => Ok(Self::Request(Request {
                id,
                method,
                params: env.params.unwrap_or(Value::Null),
            })),
            (Some(id), None) => {
                let outcome = match env.error {
                    Some(error) => Err(error),
                    None => Ok(env.result.unwrap_or(Value::Null)),
                };
                Ok(Self::Response(Response { id, outcome }))
            }
            (None, Some(method)) => Ok(Self::Notification(Notification {
                method,
                params: env.params.unwrap_or(Value::Null),
            })),
            (None, None) => Err(AppError::Framing(
                "message carries neither `id` nor `method`".into(),
            )),
        }
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        match message {
            Message::Request(req) => Self {
                id: Some(req.id),
                method: Some(req.method),
                params: non_null(req.params),
                ..Self::default()
            },
            Message::Response(resp) => match resp.outcome {
                Ok(result) => Self {
                    id: Some(resp.id),
                    result: Some(result),
                    ..Self::default()
                },
                Err(error) => Self {
                    id: Some(resp.id),
                    error: Some(error),
                    ..Self::default()
                },
            },
            Message::Notification(note) => Self {
                method: Some(note.method),
                params: non_null(note.params),
                ..Self::default()
            },
        }
    }
}

fn non_null(value: Value) -> Option<Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}
