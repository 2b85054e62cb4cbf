//! Method registry.
//!
//! Two separate tables map method names to handlers: one for requests (which
//! produce a result) and one for notifications (fire-and-forget). Handlers are
//! registered with typed parameters; decoding and result serialisation happen
//! here so the router only ever sees [`serde_json::Value`].
//!
//! Calling an erased handler decodes the params and runs the user closure
//! immediately; only the future it returns is deferred. The router relies on
//! this to apply each message's synchronous effects in arrival order.
//!
//! Registering the same method twice on one table is rejected with
//! [`AppError::DuplicateMethod`].

use std::collections::HashMap;
use std::fmt;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{AppError, Result};

/// Boxed future returned by an erased request handler.
pub type RequestFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Boxed future returned by an erased notification handler.
pub type NotificationFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

pub(crate) type RequestHandler = Arc<dyn Fn(Value) -> RequestFuture + Send + Sync>;
pub(crate) type NotificationHandler = Arc<dyn Fn(Value) -> NotificationFuture + Send + Sync>;

/// Request and notification dispatch tables for one connection.
#[derive(Default)]
pub struct MethodRegistry {
    requests: HashMap<String, RequestHandler>,
    notifications: HashMap<String, NotificationHandler>,
}

impl MethodRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for request `method`.
    ///
    /// The handler receives params decoded into `P`; its `R` result is
    /// serialised into the response. Params that fail to decode are answered
    /// with [`AppError::InvalidParams`] without invoking the handler.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::DuplicateMethod`] if `method` already has a
    /// request handler.
    pub fn register_request<P, R, F, Fut>(&mut self, method: &str, handler: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        if self.requests.contains_key(method) {
            return Err(AppError::DuplicateMethod(format!(
                "request `{method}` is already registered"
            )));
        }

        let handler = Arc::new(handler);
        let name = method.to_owned();
        let erased: RequestHandler = Arc::new(move |params: Value| -> RequestFuture {
            let params: P = match decode_params(&name, params) {
                Ok(params) => params,
                Err(err) => return Box::pin(future::ready(Err(err))),
            };
            // The handler body up to its first await runs here, at dispatch.
            let pending = handler(params);
            let method = name.clone();
            Box::pin(async move {
                let result = pending.await?;
                serde_json::to_value(result).map_err(|e| {
                    AppError::Handler(format!("failed to serialise `{method}` result: {e}"))
                })
            })
        });

        self.requests.insert(method.to_owned(), erased);
        Ok(())
    }

    /// Register the handler for notification `method`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::DuplicateMethod`] if `method` already has a
    /// notification handler.
    pub fn register_notification<P, F, Fut>(&mut self, method: &str, handler: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if self.notifications.contains_key(method) {
            return Err(AppError::DuplicateMethod(format!(
                "notification `{method}` is already registered"
            )));
        }

        let handler = Arc::new(handler);
        let name = method.to_owned();
        let erased: NotificationHandler = Arc::new(move |params: Value| -> NotificationFuture {
            match decode_params(&name, params) {
                Ok(params) => Box::pin(handler(params)),
                Err(err) => Box::pin(future::ready(Err(err))),
            }
        });

        self.notifications.insert(method.to_owned(), erased);
        Ok(())
    }

    /// Whether a request handler exists for `method`.
    #[must_use]
    pub fn has_request(&self, method: &str) -> bool {
        self.requests.contains_key(method)
    }

    /// Whether a notification handler exists for `method`.
    #[must_use]
    pub fn has_notification(&self, method: &str) -> bool {
        self.notifications.contains_key(method)
    }

    pub(crate) fn request_handler(&self, method: &str) -> Option<RequestHandler> {
        self.requests.get(method).cloned()
    }

    pub(crate) fn notification_handler(&self, method: &str) -> Option<NotificationHandler> {
        self.notifications.get(method).cloned()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut requests: Vec<_> = self.requests.keys().collect();
        let mut notifications: Vec<_> = self.notifications.keys().collect();
        requests.sort();
        notifications.sort();
        f.debug_struct("MethodRegistry")
            .field("requests", &requests)
            .field("notifications", &notifications)
            .finish()
    }
}

fn decode_params<P: DeserializeOwned>(method: &str, params: Value) -> Result<P> {
    serde_json::from_value(params)
        .map_err(|e| AppError::InvalidParams(format!("`{method}`: {e}")))
}
