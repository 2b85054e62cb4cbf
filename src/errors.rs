//! Error types shared across the agent.

use std::fmt::{Display, Formatter};

use crate::rpc::message::{codes, ResponseError};

/// Shared agent result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Agent error enumeration covering every failure mode of the protocol stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Malformed header, length, or JSON body; the connection is corrupted.
    Framing(String),
    /// An inbound request targeted a method with no registered handler.
    MethodNotFound(String),
    /// A method name was registered twice on the same registry.
    DuplicateMethod(String),
    /// Request or notification parameters did not match the method contract.
    InvalidParams(String),
    /// A well-framed message violated the method contract (e.g. bad result shape).
    Protocol(String),
    /// A registered handler failed while servicing a request.
    Handler(String),
    /// The remote peer answered one of our requests with an error response.
    Remote {
        /// Error code supplied by the peer, if any.
        code: Option<i64>,
        /// Error message supplied by the peer, relayed verbatim.
        message: String,
    },
    /// The transport ended while the request was outstanding.
    ConnectionClosed,
    /// An outbound request did not receive a response in time.
    Timeout(String),
    /// An operational request arrived before `initialize`.
    NotInitialized(String),
    /// A request is not valid in the current lifecycle state.
    Lifecycle(String),
    /// Requested entity (e.g. a recipe id) does not exist.
    NotFound(String),
    /// The recipe engine or completions backend failed.
    Upstream(String),
    /// The capability is not implemented by this side of the protocol.
    Unsupported(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// JSON-RPC error code used when this error is sent to the peer.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::NotInitialized(_) => codes::SERVER_NOT_INITIALIZED,
            Self::Lifecycle(_) => codes::INVALID_REQUEST,
            Self::NotFound(_) | Self::Upstream(_) => codes::SERVER_ERROR,
            Self::Remote {
                code: Some(code), ..
            } => *code,
            _ => codes::INTERNAL_ERROR,
        }
    }

    /// Convert this error into the wire error object of a failed response.
    #[must_use]
    pub fn to_response_error(&self) -> ResponseError {
        let message = match self {
            // Relay the peer's text untouched so nested failures stay readable.
            Self::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        };
        ResponseError {
            message,
            code: Some(self.code()),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Framing(msg) => write!(f, "framing: {msg}"),
            Self::MethodNotFound(msg) => write!(f, "method not found: {msg}"),
            Self::DuplicateMethod(msg) => write!(f, "duplicate method: {msg}"),
            Self::InvalidParams(msg) => write!(f, "invalid params: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Handler(msg) => write!(f, "handler: {msg}"),
            Self::Remote {
                code: Some(code),
                message,
            } => write!(f, "remote error {code}: {message}"),
            Self::Remote {
                code: None,
                message,
            } => write!(f, "remote error: {message}"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::NotInitialized(msg) => write!(f, "not initialized: {msg}"),
            Self::Lifecycle(msg) => write!(f, "lifecycle: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Upstream(msg) => write!(f, "upstream: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ResponseError> for AppError {
    fn from(err: ResponseError) -> Self {
        Self::Remote {
            code: err.code,
            message: err.message,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}
