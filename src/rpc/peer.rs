//! Outbound half of a connection.
//!
//! A [`Peer`] allocates request ids, owns the pending-request table, and
//! queues outbound messages for the connection's writer task. It is cheap to
//! clone; proxies and handlers keep their own clone so they can call back into
//! the remote side while the router is serving.
//!
//! # Pending table invariant
//!
//! Every id inserted by [`Peer::request`] is removed exactly once: by the
//! matching response ([`Peer::resolve`]), by a timeout, or by
//! [`Peer::close`], which rejects all outstanding entries with
//! [`AppError::ConnectionClosed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::rpc::message::{Message, RequestId, Response};
use crate::{AppError, Result};

/// Pending request table: `id` → single-use completion channel.
type PendingMap = HashMap<RequestId, oneshot::Sender<Result<Value>>>;

/// Receiving end of a peer's outbound queue, consumed by the writer task.
#[derive(Debug)]
pub struct Outbound(pub(crate) mpsc::UnboundedReceiver<Message>);

/// Cloneable handle for sending requests and notifications to the remote side.
#[derive(Debug, Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

#[derive(Debug)]
struct PeerInner {
    next_id: AtomicI64,
    pending: Mutex<PendingMap>,
    outbound: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
    request_timeout: Option<Duration>,
}

impl Peer {
    /// Create a peer and the outbound queue its writer task drains.
    ///
    /// `request_timeout` bounds how long [`Peer::request`] waits for a
    /// response; `None` waits until the response arrives or the connection
    /// closes.
    #[must_use]
    pub fn new(request_timeout: Option<Duration>) -> (Self, Outbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Self {
            inner: Arc::new(PeerInner {
                next_id: AtomicI64::new(1),
                pending: Mutex::new(HashMap::new()),
                outbound: tx,
                closed: AtomicBool::new(false),
                request_timeout,
            }),
        };
        (peer, Outbound(rx))
    }

    /// Send a request and wait for the correlated response.
    ///
    /// # Errors
    ///
    /// - [`AppError::Remote`]: the peer answered with an error response.
    /// - [`AppError::ConnectionClosed`]: the connection closed before a
    ///   response arrived, or was already closed.
    /// - [`AppError::Timeout`]: no response within the configured timeout.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.inner.pending.lock().await;
            // Checked under the lock so `close` cannot miss this entry.
            if self.is_closed() {
                return Err(AppError::ConnectionClosed);
            }
            pending.insert(id, tx);
        }

        debug!(id, method, "rpc: sending request");
        if self.send(Message::request(id, method, params)).is_err() {
            self.inner.pending.lock().await.remove(&id);
            return Err(AppError::ConnectionClosed);
        }

        let received = match self.inner.request_timeout {
            Some(limit) => {
                if let Ok(received) = tokio::time::timeout(limit, rx).await {
                    received
                } else {
                    self.inner.pending.lock().await.remove(&id);
                    warn!(id, method, ?limit, "rpc: request timed out");
                    return Err(AppError::Timeout(format!(
                        "`{method}` did not receive a response within {limit:?}"
                    )));
                }
            }
            None => rx.await,
        };

        received.unwrap_or(Err(AppError::ConnectionClosed))
    }

    /// Typed variant of [`Peer::request`].
    ///
    /// # Errors
    ///
    /// As [`Peer::request`], plus [`AppError::InvalidParams`] when `params`
    /// cannot be serialised and [`AppError::Protocol`] when the result does
    /// not decode into `R`.
    pub async fn request_as<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(|e| {
            AppError::InvalidParams(format!("failed to serialise `{method}` params: {e}"))
        })?;
        let value = self.request(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Protocol(format!("unexpected result for `{method}`: {e}")))
    }

    /// Queue a notification; never waits for the remote side.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConnectionClosed`] if the connection is closed.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::ConnectionClosed);
        }
        debug!(method, "rpc: sending notification");
        self.send(Message::notification(method, params))
    }

    /// Typed variant of [`Peer::notify`].
    ///
    /// # Errors
    ///
    /// As [`Peer::notify`], plus [`AppError::InvalidParams`] when `params`
    /// cannot be serialised.
    pub fn notify_as<P>(&self, method: &str, params: &P) -> Result<()>
    where
        P: Serialize + ?Sized,
    {
        let params = serde_json::to_value(params).map_err(|e| {
            AppError::InvalidParams(format!("failed to serialise `{method}` params: {e}"))
        })?;
        self.notify(method, params)
    }

    /// Whether the connection has been torn down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of outbound requests still awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    /// Queue a response to one of the remote side's requests.
    pub(crate) fn respond(&self, response: Response) -> Result<()> {
        self.send(Message::Response(response))
    }

    /// Complete the pending request matching `response.id`.
    ///
    /// Responses with no pending entry (late, duplicate, or after closure) are
    /// discarded with a warning.
    pub(crate) async fn resolve(&self, response: Response) {
        let entry = {
            let mut pending = self.inner.pending.lock().await;
            if self.is_closed() {
                None
            } else {
                pending.remove(&response.id)
            }
        };

        let Some(tx) = entry else {
            warn!(id = response.id, "rpc: discarding response with no pending request");
            return;
        };

        let outcome = response.outcome.map_err(AppError::from);
        if tx.send(outcome).is_err() {
            debug!(id = response.id, "rpc: requester gave up before the response arrived");
        }
    }

    /// Tear down the outbound side, rejecting every pending request.
    pub(crate) async fn close(&self) {
        let drained: Vec<_> = {
            let mut pending = self.inner.pending.lock().await;
            self.inner.closed.store(true, Ordering::SeqCst);
            pending.drain().collect()
        };

        if !drained.is_empty() {
            debug!(count = drained.len(), "rpc: rejecting pending requests on close");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(AppError::ConnectionClosed));
        }
    }

    fn send(&self, message: Message) -> Result<()> {
        self.inner
            .outbound
            .send(message)
            .map_err(|_| AppError::ConnectionClosed)
    }
}
