//! Intent detection.
//!
//! Recipes ask an [`IntentDetector`] whether a chat input needs codebase or
//! editor context. The agent uses [`AgentIntentDetector`], which forwards each
//! query to the client as one `intent/*` request; clients answer with any local
//! implementation mounted through [`serve_intent_detector`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::protocol::methods;
use crate::rpc::{MethodRegistry, Peer};
use crate::Result;

/// Boxed future returned by [`IntentDetector`] methods.
pub type IntentFuture<'a> = Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

/// Classifies chat input.
pub trait IntentDetector: Send + Sync {
    /// Whether answering `input` needs codebase search context.
    fn is_codebase_context_required(&self, input: &str) -> IntentFuture<'_>;

    /// Whether answering `input` needs the active editor's content.
    fn is_editor_context_required(&self, input: &str) -> IntentFuture<'_>;
}

/// Intent detector backed by the connected client.
#[derive(Debug, Clone)]
pub struct AgentIntentDetector {
    peer: Peer,
}

impl AgentIntentDetector {
    /// Create a proxy sending queries through `peer`.
    #[must_use]
    pub fn new(peer: Peer) -> Self {
        Self { peer }
    }
}

impl IntentDetector for AgentIntentDetector {
    fn is_codebase_context_required(&self, input: &str) -> IntentFuture<'_> {
        let input = input.to_owned();
        Box::pin(async move {
            self.peer
                .request_as(methods::INTENT_IS_CODEBASE_CONTEXT_REQUIRED, &input)
                .await
        })
    }

    fn is_editor_context_required(&self, input: &str) -> IntentFuture<'_> {
        let input = input.to_owned();
        Box::pin(async move {
            self.peer
                .request_as(methods::INTENT_IS_EDITOR_CONTEXT_REQUIRED, &input)
                .await
        })
    }
}

/// Detector giving the same answers for every input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticIntentDetector {
    /// Answer for `intent/isCodebaseContextRequired`.
    pub codebase: bool,
    /// Answer for `intent/isEditorContextRequired`.
    pub editor: bool,
}

impl IntentDetector for StaticIntentDetector {
    fn is_codebase_context_required(&self, _input: &str) -> IntentFuture<'_> {
        let answer = self.codebase;
        Box::pin(async move { Ok(answer) })
    }

    fn is_editor_context_required(&self, _input: &str) -> IntentFuture<'_> {
        let answer = self.editor;
        Box::pin(async move { Ok(answer) })
    }
}

/// Register `intent/*` request handlers answering from `detector`.
///
/// # Errors
///
/// Returns [`AppError::DuplicateMethod`](crate::AppError::DuplicateMethod) if
/// either method is already registered.
pub fn serve_intent_detector(
    registry: &mut MethodRegistry,
    detector: Arc<dyn IntentDetector>,
) -> Result<()> {
    let d = Arc::clone(&detector);
    registry.register_request(
        methods::INTENT_IS_CODEBASE_CONTEXT_REQUIRED,
        move |input: String| {
            let d = Arc::clone(&d);
            async move { d.is_codebase_context_required(&input).await }
        },
    )?;

    registry.register_request(
        methods::INTENT_IS_EDITOR_CONTEXT_REQUIRED,
        move |input: String| {
            let d = Arc::clone(&detector);
            async move { d.is_editor_context_required(&input).await }
        },
    )?;

    Ok(())
}
