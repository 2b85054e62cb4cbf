//! Inbound dispatch loop.
//!
//! [`MessageRouter::serve`] owns the read half of a connection. For every
//! decoded [`Message`] it decides, in arrival order:
//!
//! - **Request** (`id` + `method`): look up the request handler. Unknown
//!   methods are answered with a `method not found` error response. A known
//!   handler is called in the read loop, so everything it does before its
//!   first suspension happens in arrival order. A handler that completes
//!   without suspending is answered on the spot; otherwise the rest of it
//!   runs on its own task so the read loop keeps decoding while the handler
//!   awaits its own outbound requests. The handler's result or error (panics
//!   included) always becomes exactly one response.
//! - **Response** (`id` only): complete the matching pending request on the
//!   [`Peer`]; unmatched ids are discarded with a warning.
//! - **Notification** (`method` only): run the handler inline, preserving
//!   notification order. Failures are logged and never reach the peer.
//!   Notification handlers must not await outbound requests.
//!
//! The loop ends on cancellation, end of stream, a framing error, or a writer
//! failure. On the way out every in-flight request handler is aborted and every
//! pending outbound request is rejected with
//! [`AppError::ConnectionClosed`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::rpc::codec::ContentLengthCodec;
use crate::rpc::message::{Message, Notification, Request, RequestId, Response};
use crate::rpc::peer::{Outbound, Peer};
use crate::rpc::registry::MethodRegistry;
use crate::rpc::writer::run_writer;
use crate::{AppError, Result};

/// Why a connection stopped being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The session token was cancelled (e.g. by the `exit` notification).
    Cancelled,
    /// The remote side closed the stream.
    Closed,
    /// The stream was corrupted or could not be written.
    Failed(AppError),
}

/// Serves one connection: reads, dispatches, and writes until it ends.
#[derive(Debug)]
pub struct MessageRouter {
    label: String,
    peer: Peer,
    outbound: Outbound,
    registry: Arc<MethodRegistry>,
    cancel: CancellationToken,
}

impl MessageRouter {
    /// Create a router for one connection.
    ///
    /// `label` tags every log line for the connection; `cancel` stops the
    /// loop from outside (or from a handler, as `exit` does).
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        peer: Peer,
        outbound: Outbound,
        registry: MethodRegistry,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            label: label.into(),
            peer,
            outbound,
            registry: Arc::new(registry),
            cancel,
        }
    }

    /// The outbound handle bound to this connection.
    #[must_use]
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Serve the connection over `reader` / `writer` until it ends.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> ConnectionEnd
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Self {
            label,
            peer,
            outbound,
            registry,
            cancel,
        } = self;

        let stop = CancellationToken::new();
        let mut writer_task = tokio::spawn(run_writer(label.clone(), writer, outbound, stop.clone()));
        let mut writer_finished = false;

        let dispatcher = Dispatcher {
            label,
            peer,
            registry,
        };
        let mut handlers = JoinSet::new();
        let mut framed = FramedRead::new(reader, ContentLengthCodec::new());

        info!(label = %dispatcher.label, "rpc: serving connection");

        let end = loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!(label = %dispatcher.label, "rpc: session cancelled");
                    break ConnectionEnd::Cancelled;
                }

                joined = &mut writer_task => {
                    writer_finished = true;
                    break match joined {
                        Ok(Ok(())) => ConnectionEnd::Closed,
                        Ok(Err(err)) => ConnectionEnd::Failed(err),
                        Err(err) => ConnectionEnd::Failed(AppError::Io(format!(
                            "writer task ended abnormally: {err}"
                        ))),
                    };
                }

                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            error!(label = %dispatcher.label, "rpc: request task panicked");
                        }
                    }
                }

                item = framed.next() => match item {
                    None => {
                        debug!(label = %dispatcher.label, "rpc: end of stream");
                        break ConnectionEnd::Closed;
                    }
                    Some(Err(err)) => {
                        warn!(
                            label = %dispatcher.label,
                            error = %err,
                            "rpc: unreadable stream, closing connection"
                        );
                        break ConnectionEnd::Failed(err);
                    }
                    Some(Ok(message)) => dispatcher.dispatch(message, &mut handlers).await,
                }
            }
        };

        handlers.abort_all();
        dispatcher.peer.close().await;
        stop.cancel();
        if !writer_finished {
            match writer_task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(label = %dispatcher.label, error = %err, "rpc: writer failed during teardown"),
                Err(err) => debug!(label = %dispatcher.label, error = %err, "rpc: writer task aborted"),
            }
        }

        info!(label = %dispatcher.label, ?end, "rpc: connection finished");
        end
    }
}

/// Per-connection dispatch state shared by the read loop.
struct Dispatcher {
    label: String,
    peer: Peer,
    registry: Arc<MethodRegistry>,
}

impl Dispatcher {
    async fn dispatch(&self, message: Message, handlers: &mut JoinSet<()>) {
        match message {
            Message::Request(request) => self.dispatch_request(request, handlers),
            Message::Response(response) => self.peer.resolve(response).await,
            Message::Notification(notification) => self.run_notification(notification).await,
        }
    }

    fn dispatch_request(&self, request: Request, handlers: &mut JoinSet<()>) {
        let Request { id, method, params } = request;

        let Some(handler) = self.registry.request_handler(&method) else {
            warn!(label = %self.label, id, method, "rpc: request for unknown method");
            let response = Response::from_outcome(id, Err(AppError::MethodNotFound(method)));
            if self.peer.respond(response).is_err() {
                debug!(label = %self.label, id, "rpc: connection closed before error response");
            }
            return;
        };

        debug!(label = %self.label, id, method, "rpc: dispatching request");
        let mut pending = match panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
            Ok(pending) => pending,
            Err(_) => {
                self.finish_request(id, &method, Err(panicked(&method)));
                return;
            }
        };

        // Handlers that never suspend are answered before the next message is read.
        if let Some(caught) = AssertUnwindSafe(&mut pending).catch_unwind().now_or_never() {
            let outcome = caught.unwrap_or_else(|_| Err(panicked(&method)));
            self.finish_request(id, &method, outcome);
            return;
        }

        let dispatcher = self.detached();
        handlers.spawn(async move {
            let outcome = AssertUnwindSafe(pending)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(panicked(&method)));
            dispatcher.finish_request(id, &method, outcome);
        });
    }

    fn finish_request(&self, id: RequestId, method: &str, outcome: Result<Value>) {
        if let Err(ref err) = outcome {
            debug!(label = %self.label, id, method, error = %err, "rpc: request failed");
        }
        if self.peer.respond(Response::from_outcome(id, outcome)).is_err() {
            debug!(label = %self.label, id, "rpc: connection closed before response");
        }
    }

    fn detached(&self) -> Self {
        Self {
            label: self.label.clone(),
            peer: self.peer.clone(),
            registry: Arc::clone(&self.registry),
        }
    }

    async fn run_notification(&self, notification: Notification) {
        let Notification { method, params } = notification;

        let Some(handler) = self.registry.notification_handler(&method) else {
            warn!(label = %self.label, method, "rpc: discarding notification for unknown method");
            return;
        };

        let Ok(pending) = panic::catch_unwind(AssertUnwindSafe(|| handler(params))) else {
            error!(label = %self.label, method, "rpc: notification handler panicked");
            return;
        };

        match AssertUnwindSafe(pending).catch_unwind().await {
            Ok(Ok(())) => debug!(label = %self.label, method, "rpc: notification handled"),
            Ok(Err(err)) => warn!(
                label = %self.label,
                method,
                error = %err,
                "rpc: notification handler failed"
            ),
            Err(_) => error!(label = %self.label, method, "rpc: notification handler panicked"),
        }
    }
}

fn panicked(method: &str) -> AppError {
    AppError::Handler(format!("handler for `{method}` panicked"))
}
