//! Agent server.
//!
//! An [`Agent`] owns one connection's state: the lifecycle, the editor and
//! intent proxies bound to the connection's [`Peer`], the recipe registry,
//! and the [`ChatClient`] that holds the transcript. [`Agent::method_registry`] builds
//! the client → server method table:
//!
//! | Method            | Kind         | Lifecycle gate                         |
//! |-------------------|--------------|----------------------------------------|
//! | `initialize`      | request      | only while uninitialized               |
//! | `initialized`     | notification | logged                                 |
//! | `shutdown`        | request      | only while initialized                 |
//! | `exit`            | notification | always; ends the session               |
//! | `recipes/list`    | request      | only while initialized                 |
//! | `recipes/execute` | request      | only while initialized                 |

pub mod lifecycle;

use std::fmt;
use std::future;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::completions::CompletionsClient;
use crate::chat::transcript::{ChatMessage, TranscriptJson};
use crate::chat::{ChatClient, ChatEvents, SourcegraphCompletionsClient};
use crate::config::AgentConfig;
use crate::editor::{AgentEditor, Editor};
use crate::intent::AgentIntentDetector;
use crate::protocol::{methods, ClientInfo, ExecuteRecipeParams, RecipeInfo, ServerInfo};
use crate::recipes::{RecipeContext, RecipeRegistry};
use crate::rpc::{ConnectionEnd, MessageRouter, MethodRegistry, Peer};
use crate::{AppError, Result};

pub use lifecycle::{Lifecycle, LifecycleState};

/// Builds the completions backend when the agent is created.
pub type CompletionsFactory =
    Arc<dyn Fn(&AgentConfig) -> Result<Arc<dyn CompletionsClient>> + Send + Sync>;

/// Collaborators the agent delegates to.
#[derive(Clone)]
pub struct AgentServices {
    /// Recipes reported by `recipes/list` and run by `recipes/execute`.
    pub recipes: RecipeRegistry,
    /// Completions backend constructor.
    pub completions: CompletionsFactory,
}

impl Default for AgentServices {
    fn default() -> Self {
        Self {
            recipes: RecipeRegistry::builtin(),
            completions: Arc::new(|config: &AgentConfig| {
                let client: Arc<dyn CompletionsClient> =
                    Arc::new(SourcegraphCompletionsClient::new(config)?);
                Ok(client)
            }),
        }
    }
}

impl fmt::Debug for AgentServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentServices")
            .field("recipes", &self.recipes)
            .finish_non_exhaustive()
    }
}

/// How a served session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Why the connection stopped.
    pub end: ConnectionEnd,
    /// Final lifecycle state.
    pub state: LifecycleState,
    /// Process exit code: 0 after `shutdown` then `exit`, 1 otherwise.
    pub exit_code: i32,
}

// ── Agent ─────────────────────────────────────────────────────────────────────

/// Server side of one agent connection. Cheap to clone.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    config: AgentConfig,
    services: AgentServices,
    lifecycle: Lifecycle,
    session: CancellationToken,
    editor: AgentEditor,
    intent: AgentIntentDetector,
    client_info: Mutex<Option<ClientInfo>>,
    chat: ChatClient,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("server_name", &self.inner.config.server_name)
            .field("state", &self.inner.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Create an agent sending its outbound traffic through `peer`.
    ///
    /// `session` is cancelled when `exit` arrives.
    ///
    /// # Errors
    ///
    /// Returns whatever the completions factory fails with, typically
    /// [`AppError::Config`].
    pub fn new(
        config: AgentConfig,
        services: AgentServices,
        peer: Peer,
        session: CancellationToken,
    ) -> Result<Self> {
        let editor = AgentEditor::new(peer.clone(), config.static_editor());
        let intent = AgentIntentDetector::new(peer.clone());
        let completions = (services.completions)(&config)?;
        let events = Arc::new(PeerChatEvents { peer });
        let chat = ChatClient::new(completions, events);
        debug!("agent: chat client created");
        Ok(Self {
            inner: Arc::new(AgentInner {
                config,
                services,
                lifecycle: Lifecycle::new(),
                session,
                editor,
                intent,
                client_info: Mutex::new(None),
                chat,
            }),
        })
    }

    /// Lifecycle of this session.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    /// Editor proxy bound to this connection.
    #[must_use]
    pub fn editor(&self) -> &AgentEditor {
        &self.inner.editor
    }

    /// Identity announced by the client in `initialize`.
    pub async fn client_info(&self) -> Option<ClientInfo> {
        self.inner.client_info.lock().await.clone()
    }

    /// Register every client → server method.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::DuplicateMethod`] if a method is registered twice.
    pub fn method_registry(&self) -> Result<MethodRegistry> {
        let mut registry = MethodRegistry::new();

        let agent = self.clone();
        registry.register_request(methods::INITIALIZE, move |info: ClientInfo| {
            let agent = agent.clone();
            let admitted = agent.inner.lifecycle.initialize();
            async move {
                admitted?;
                Ok::<_, AppError>(agent.record_client(info).await)
            }
        })?;

        registry.register_notification(methods::INITIALIZED, |_: Value| async {
            debug!("agent: client finished initialization");
            Ok(())
        })?;

        let agent = self.clone();
        registry.register_request(methods::SHUTDOWN, move |_: Value| {
            future::ready(agent.shutdown())
        })?;

        let agent = self.clone();
        registry.register_notification(methods::EXIT, move |_: Value| {
            agent.exit();
            future::ready(Ok(()))
        })?;

        let agent = self.clone();
        registry.register_request(methods::RECIPES_LIST, move |_: Value| {
            future::ready(agent.list_recipes())
        })?;

        let agent = self.clone();
        registry.register_request(
            methods::RECIPES_EXECUTE,
            move |params: ExecuteRecipeParams| {
                let agent = agent.clone();
                let admitted = agent
                    .inner
                    .lifecycle
                    .ensure_operational(methods::RECIPES_EXECUTE);
                async move {
                    admitted?;
                    agent.run_recipe(params).await
                }
            },
        )?;

        Ok(registry)
    }

    /// Handle `initialize`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Lifecycle`] if the session is already initialized.
    pub async fn initialize(&self, info: ClientInfo) -> Result<ServerInfo> {
        self.inner.lifecycle.initialize()?;
        Ok(self.record_client(info).await)
    }

    async fn record_client(&self, info: ClientInfo) -> ServerInfo {
        info!(client = %info.name, "agent: initialized");
        *self.inner.client_info.lock().await = Some(info);
        ServerInfo {
            name: self.inner.config.server_name.clone(),
        }
    }

    /// Handle `shutdown`. In-flight executions are not drained.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error unless the session is initialized.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.lifecycle.shutdown()?;
        info!("agent: shutdown requested");
        Ok(())
    }

    /// Handle `exit`: enter the terminal state and end the session.
    pub fn exit(&self) {
        let code = self.inner.lifecycle.exit();
        info!(exit_code = code, "agent: exit received");
        self.inner.session.cancel();
    }

    /// Handle `recipes/list`.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error unless the session is initialized.
    pub fn list_recipes(&self) -> Result<Vec<RecipeInfo>> {
        self.inner
            .lifecycle
            .ensure_operational(methods::RECIPES_LIST)?;
        Ok(self.inner.services.recipes.list())
    }

    /// Handle `recipes/execute`.
    ///
    /// # Errors
    ///
    /// - Lifecycle errors unless the session is initialized.
    /// - [`AppError::NotFound`] for an unknown recipe id.
    /// - Any failure of the recipe, its editor round trips, or the
    ///   completions backend.
    pub async fn execute_recipe(&self, params: ExecuteRecipeParams) -> Result<()> {
        self.inner
            .lifecycle
            .ensure_operational(methods::RECIPES_EXECUTE)?;
        self.run_recipe(params).await
    }

    async fn run_recipe(&self, params: ExecuteRecipeParams) -> Result<()> {
        let ExecuteRecipeParams {
            id,
            human_chat_input,
            context,
        } = params;

        let recipe = self
            .inner
            .services
            .recipes
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("recipe `{id}` is not registered")))?;

        let static_context = context.unwrap_or_default();
        let editor: Arc<dyn Editor> = if static_context.editor.workspace_root.is_some() {
            Arc::new(self.inner.editor.with_static_editor(static_context.editor))
        } else {
            Arc::new(self.inner.editor.clone())
        };
        let context = RecipeContext {
            editor,
            intent: Arc::new(self.inner.intent.clone()),
            first_interaction: static_context.first_interaction,
        };

        info!(recipe = %id, "agent: executing recipe");
        self.inner
            .chat
            .execute_recipe(recipe.as_ref(), &human_chat_input, &context)
            .await
            .inspect_err(|err| warn!(recipe = %id, error = %err, "agent: recipe failed"))
    }
}

/// Delivers chat progress as notifications to the client.
struct PeerChatEvents {
    peer: Peer,
}

impl ChatEvents for PeerChatEvents {
    fn message_in_progress(&self, message: Option<&ChatMessage>) -> Result<()> {
        self.peer
            .notify_as(methods::CHAT_UPDATE_MESSAGE_IN_PROGRESS, &message)
    }

    fn transcript_updated(&self, transcript: &TranscriptJson) -> Result<()> {
        self.peer
            .notify_as(methods::CHAT_UPDATE_TRANSCRIPT, transcript)
    }
}

// ── Serving ───────────────────────────────────────────────────────────────────

/// Serve the agent protocol over `reader` / `writer` until `exit`, end of
/// stream, or cancellation of `session`.
///
/// # Errors
///
/// Fails before reading anything if the completions backend cannot be built,
/// or with [`AppError::DuplicateMethod`] if the method table cannot be built.
/// Connection failures are reported through [`SessionOutcome::end`].
pub async fn serve_connection<R, W>(
    config: AgentConfig,
    services: AgentServices,
    reader: R,
    writer: W,
    session: CancellationToken,
) -> Result<SessionOutcome>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (peer, outbound) = Peer::new(config.request_timeout());
    let agent = Agent::new(config, services, peer.clone(), session.clone())?;
    let registry = agent.method_registry()?;

    let router = MessageRouter::new("agent", peer, outbound, registry, session);
    let end = router.serve(reader, writer).await;

    let state = agent.lifecycle().state();
    let exit_code = state.exit_code().unwrap_or(1);
    info!(?end, ?state, exit_code, "agent: session ended");
    Ok(SessionOutcome {
        end,
        state,
        exit_code,
    })
}
