//! Client session: drives an agent over one connection.
//!
//! The client answers the agent's `editor/*` and `intent/*` requests from
//! local implementations and records chat notifications, while exposing the
//! client → server calls as typed methods.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::transcript::{ChatMessage, TranscriptJson};
use crate::editor::{serve_editor, Editor};
use crate::intent::{serve_intent_detector, IntentDetector};
use crate::protocol::{methods, ClientInfo, ExecuteRecipeParams, RecipeInfo, ServerInfo};
use crate::rpc::{ConnectionEnd, MessageRouter, MethodRegistry, Peer};
use crate::{AppError, Result};

/// How long to wait for the agent to close the connection after `exit`.
pub const EXIT_GRACE: Duration = Duration::from_secs(5);

type Shared<T> = Arc<Mutex<T>>;

/// Client side of an agent connection.
#[derive(Debug)]
pub struct ClientSession {
    peer: Peer,
    cancel: CancellationToken,
    router: JoinHandle<ConnectionEnd>,
    transcript: Shared<Option<TranscriptJson>>,
    in_progress: Shared<Option<ChatMessage>>,
}

impl ClientSession {
    /// Start serving a connection; no messages are sent yet.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::DuplicateMethod`] if the handler table cannot be
    /// built.
    pub fn start<R, W>(
        reader: R,
        writer: W,
        editor: Arc<dyn Editor>,
        intent: Arc<dyn IntentDetector>,
        request_timeout: Option<Duration>,
    ) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let transcript: Shared<Option<TranscriptJson>> = Arc::default();
        let in_progress: Shared<Option<ChatMessage>> = Arc::default();

        let mut registry = MethodRegistry::new();
        serve_editor(&mut registry, editor)?;
        serve_intent_detector(&mut registry, intent)?;

        let slot = Arc::clone(&in_progress);
        registry.register_notification(
            methods::CHAT_UPDATE_MESSAGE_IN_PROGRESS,
            move |message: Option<ChatMessage>| {
                let slot = Arc::clone(&slot);
                async move {
                    *slot.lock().await = message;
                    Ok(())
                }
            },
        )?;

        let slot = Arc::clone(&transcript);
        registry.register_notification(
            methods::CHAT_UPDATE_TRANSCRIPT,
            move |snapshot: TranscriptJson| {
                let slot = Arc::clone(&slot);
                async move {
                    debug!(
                        interactions = snapshot.interactions.len(),
                        "client: transcript updated"
                    );
                    *slot.lock().await = Some(snapshot);
                    Ok(())
                }
            },
        )?;

        let (peer, outbound) = Peer::new(request_timeout);
        let cancel = CancellationToken::new();
        let router = MessageRouter::new("client", peer.clone(), outbound, registry, cancel.clone());
        let router = tokio::spawn(router.serve(reader, writer));

        Ok(Self {
            peer,
            cancel,
            router,
            transcript,
            in_progress,
        })
    }

    /// Outbound handle of the connection.
    #[must_use]
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Perform the handshake: `initialize`, then `initialized`.
    ///
    /// # Errors
    ///
    /// Relays the agent's error response, or a connection failure.
    pub async fn initialize(&self, name: &str) -> Result<ServerInfo> {
        let info = ClientInfo {
            name: name.to_owned(),
        };
        let server: ServerInfo = self.peer.request_as(methods::INITIALIZE, &info).await?;
        self.peer.notify(methods::INITIALIZED, Value::Null)?;
        info!(server = %server.name, "client: connected");
        Ok(server)
    }

    /// Call `recipes/list`.
    ///
    /// # Errors
    ///
    /// Relays the agent's error response, or a connection failure.
    pub async fn list_recipes(&self) -> Result<Vec<RecipeInfo>> {
        self.peer.request_as(methods::RECIPES_LIST, &()).await
    }

    /// Call `recipes/execute`.
    ///
    /// # Errors
    ///
    /// Relays the agent's error response, or a connection failure.
    pub async fn execute_recipe(&self, params: &ExecuteRecipeParams) -> Result<()> {
        let _: Value = self
            .peer
            .request_as(methods::RECIPES_EXECUTE, params)
            .await?;
        Ok(())
    }

    /// Latest transcript pushed by the agent.
    pub async fn transcript(&self) -> Option<TranscriptJson> {
        self.transcript.lock().await.clone()
    }

    /// Assistant message currently being generated, if any.
    pub async fn message_in_progress(&self) -> Option<ChatMessage> {
        self.in_progress.lock().await.clone()
    }

    /// Send `shutdown`, then `exit`, and wait for the agent to hang up.
    ///
    /// # Errors
    ///
    /// Relays a failed `shutdown` response or a connection failure.
    pub async fn shutdown_and_exit(self) -> Result<ConnectionEnd> {
        let _: Value = self.peer.request_as(methods::SHUTDOWN, &()).await?;
        self.peer.notify(methods::EXIT, Value::Null)?;
        Ok(self.finish(EXIT_GRACE).await)
    }

    /// Wait up to `grace` for the connection to end, then tear it down.
    pub async fn finish(self, grace: Duration) -> ConnectionEnd {
        let Self {
            cancel, mut router, ..
        } = self;

        if let Ok(joined) = tokio::time::timeout(grace, &mut router).await {
            return joined.unwrap_or_else(|err| {
                ConnectionEnd::Failed(AppError::Io(format!("client router aborted: {err}")))
            });
        }

        warn!(?grace, "client: agent did not close the connection, cancelling");
        cancel.cancel();
        router.await.unwrap_or_else(|err| {
            ConnectionEnd::Failed(AppError::Io(format!("client router aborted: {err}")))
        })
    }
}
