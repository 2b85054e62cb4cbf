//! Editor capability surface.
//!
//! Recipes program against the [`Editor`] trait and never know where the
//! editing surface lives. Two implementations are provided:
//!
//! - [`AgentEditor`]: the remote proxy used by the agent. Every call becomes
//!   one outbound `editor/*` request (or notification) to the client.
//! - [`NoopEditor`]: a local editor with nothing open, used by headless
//!   clients and tests.
//!
//! [`serve_editor`] mounts any local implementation on a
//! [`MethodRegistry`] so the client side of a connection answers the
//! agent's `editor/*` requests.

mod proxy;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::protocol::{methods, ReplaceSelectionParams, ReplaceSelectionResult};
use crate::rpc::MethodRegistry;
use crate::Result;

pub use proxy::AgentEditor;

/// Boxed future returned by [`Editor`] methods.
pub type EditorFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

// ── Snapshot types ────────────────────────────────────────────────────────────

/// Content of the active editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTextEditor {
    /// Full file content.
    pub content: String,
    /// Path of the file in the editor.
    pub file_path: String,
    /// Repository the file belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    /// Revision the file was read at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// The selection in the active editor plus surrounding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTextEditorSelection {
    /// File holding the selection.
    pub file_name: String,
    /// Repository the file belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    /// Revision the file was read at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Text before the selection.
    #[serde(default)]
    pub preceding_text: String,
    /// The selected text.
    pub selected_text: String,
    /// Text after the selection.
    #[serde(default)]
    pub following_text: String,
}

/// The portion of the active file currently visible in the viewport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTextEditorVisibleContent {
    /// Visible text.
    pub content: String,
    /// File being shown.
    pub file_name: String,
    /// Repository the file belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    /// Revision the file was read at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// Progress of streamed fixup text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixupState {
    /// More text will follow.
    Streaming,
    /// The fixup text is final.
    Complete,
}

// ── Capability trait ──────────────────────────────────────────────────────────

/// Operations a recipe may perform on the editing surface.
///
/// A `None` snapshot means "no active editor/selection"; it is not an error.
pub trait Editor: Send + Sync {
    /// Workspace root, served locally without a round trip.
    fn workspace_root_path(&self) -> Option<String>;

    /// Snapshot of the active editor.
    fn active_text_editor(&self) -> EditorFuture<'_, Option<ActiveTextEditor>>;

    /// The current selection.
    fn active_text_editor_selection(&self) -> EditorFuture<'_, Option<ActiveTextEditorSelection>>;

    /// The current selection, or the whole file when nothing is selected.
    fn active_text_editor_selection_or_entire_file(
        &self,
    ) -> EditorFuture<'_, Option<ActiveTextEditorSelection>>;

    /// The visible viewport of the active editor.
    fn active_text_editor_visible_content(
        &self,
    ) -> EditorFuture<'_, Option<ActiveTextEditorVisibleContent>>;

    /// Replace `selected_text` in `file_name` with `replacement`.
    fn replace_selection(
        &self,
        file_name: &str,
        selected_text: &str,
        replacement: &str,
    ) -> EditorFuture<'_, ReplaceSelectionResult>;

    /// Ask the user to pick one of `labels`; `None` if dismissed.
    fn show_quick_pick(&self, labels: Vec<String>) -> EditorFuture<'_, Option<String>>;

    /// Show a warning without waiting for acknowledgement.
    fn show_warning_message(&self, message: &str) -> EditorFuture<'_, ()>;

    /// Ask the user for free text; `None` if dismissed.
    fn show_input_box(&self, prompt: Option<&str>) -> EditorFuture<'_, Option<String>>;

    /// Deliver streamed fixup text for the fixup `id`.
    fn did_receive_fixup_text(
        &self,
        id: &str,
        text: &str,
        state: FixupState,
    ) -> EditorFuture<'_, ()>;
}

// ── NoopEditor ────────────────────────────────────────────────────────────────

/// Editor with no open file: every snapshot is `None` and every prompt is
/// dismissed.
#[derive(Debug, Clone, Default)]
pub struct NoopEditor {
    workspace_root: Option<String>,
}

impl NoopEditor {
    /// Create a no-op editor reporting `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: Option<String>) -> Self {
        Self { workspace_root }
    }
}

impl Editor for NoopEditor {
    fn workspace_root_path(&self) -> Option<String> {
        self.workspace_root.clone()
    }

    fn active_text_editor(&self) -> EditorFuture<'_, Option<ActiveTextEditor>> {
        Box::pin(async { Ok(None) })
    }

    fn active_text_editor_selection(&self) -> EditorFuture<'_, Option<ActiveTextEditorSelection>> {
        Box::pin(async { Ok(None) })
    }

    fn active_text_editor_selection_or_entire_file(
        &self,
    ) -> EditorFuture<'_, Option<ActiveTextEditorSelection>> {
        Box::pin(async { Ok(None) })
    }

    fn active_text_editor_visible_content(
        &self,
    ) -> EditorFuture<'_, Option<ActiveTextEditorVisibleContent>> {
        Box::pin(async { Ok(None) })
    }

    fn replace_selection(
        &self,
        _file_name: &str,
        _selected_text: &str,
        _replacement: &str,
    ) -> EditorFuture<'_, ReplaceSelectionResult> {
        Box::pin(async {
            Ok(ReplaceSelectionResult {
                applied: false,
                failure_reason: "no active editor".to_owned(),
            })
        })
    }

    fn show_quick_pick(&self, _labels: Vec<String>) -> EditorFuture<'_, Option<String>> {
        Box::pin(async { Ok(None) })
    }

    fn show_warning_message(&self, message: &str) -> EditorFuture<'_, ()> {
        warn!(warning = message, "editor: warning shown");
        Box::pin(async { Ok(()) })
    }

    fn show_input_box(&self, _prompt: Option<&str>) -> EditorFuture<'_, Option<String>> {
        Box::pin(async { Ok(None) })
    }

    fn did_receive_fixup_text(
        &self,
        _id: &str,
        _text: &str,
        _state: FixupState,
    ) -> EditorFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

// ── Serving a local editor ────────────────────────────────────────────────────

/// Register request handlers answering every `editor/*` method from `editor`,
/// plus the `editor/warning` notification.
///
/// # Errors
///
/// Returns [`AppError::DuplicateMethod`](crate::AppError::DuplicateMethod) if
/// any `editor/*` method is already registered.
pub fn serve_editor(registry: &mut MethodRegistry, editor: Arc<dyn Editor>) -> Result<()> {
    let ed = Arc::clone(&editor);
    registry.register_request(methods::EDITOR_ACTIVE, move |_: Value| {
        let ed = Arc::clone(&ed);
        async move { ed.active_text_editor().await }
    })?;

    let ed = Arc::clone(&editor);
    registry.register_request(methods::EDITOR_SELECTION, move |_: Value| {
        let ed = Arc::clone(&ed);
        async move { ed.active_text_editor_selection().await }
    })?;

    let ed = Arc::clone(&editor);
    registry.register_request(methods::EDITOR_SELECTION_OR_ENTIRE_FILE, move |_: Value| {
        let ed = Arc::clone(&ed);
        async move { ed.active_text_editor_selection_or_entire_file().await }
    })?;

    let ed = Arc::clone(&editor);
    registry.register_request(methods::EDITOR_VISIBLE_CONTENT, move |_: Value| {
        let ed = Arc::clone(&ed);
        async move { ed.active_text_editor_visible_content().await }
    })?;

    let ed = Arc::clone(&editor);
    registry.register_request(
        methods::EDITOR_REPLACE_SELECTION,
        move |params: ReplaceSelectionParams| {
            let ed = Arc::clone(&ed);
            async move {
                ed.replace_selection(&params.file_name, &params.selected_text, &params.replacement)
                    .await
            }
        },
    )?;

    let ed = Arc::clone(&editor);
    registry.register_request(methods::EDITOR_QUICK_PICK, move |labels: Vec<String>| {
        let ed = Arc::clone(&ed);
        async move { ed.show_quick_pick(labels).await }
    })?;

    let ed = Arc::clone(&editor);
    registry.register_request(methods::EDITOR_PROMPT, move |prompt: Option<String>| {
        let ed = Arc::clone(&ed);
        async move {
            let prompt = prompt.filter(|p| !p.is_empty());
            ed.show_input_box(prompt.as_deref()).await
        }
    })?;

    let ed = editor;
    registry.register_notification(methods::EDITOR_WARNING, move |message: String| {
        let ed = Arc::clone(&ed);
        async move { ed.show_warning_message(&message).await }
    })?;

    Ok(())
}
