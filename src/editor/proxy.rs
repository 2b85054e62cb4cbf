//! Remote editor proxy.

use serde_json::json;
use tracing::debug;

use super::{
    ActiveTextEditor, ActiveTextEditorSelection, ActiveTextEditorVisibleContent, Editor,
    EditorFuture, FixupState,
};
use crate::protocol::{methods, ReplaceSelectionParams, ReplaceSelectionResult, StaticEditor};
use crate::rpc::Peer;
use crate::AppError;

/// [`Editor`] whose capabilities live on the other end of the connection.
///
/// Results are relayed exactly as the client answered them; error responses
/// surface as [`AppError::Remote`] with the client's message.
#[derive(Debug, Clone)]
pub struct AgentEditor {
    peer: Peer,
    static_editor: StaticEditor,
}

impl AgentEditor {
    /// Create a proxy sending requests through `peer`.
    #[must_use]
    pub fn new(peer: Peer, static_editor: StaticEditor) -> Self {
        Self {
            peer,
            static_editor,
        }
    }

    /// Same proxy with a different static editor (per-execution context).
    #[must_use]
    pub fn with_static_editor(&self, static_editor: StaticEditor) -> Self {
        Self {
            peer: self.peer.clone(),
            static_editor,
        }
    }
}

impl Editor for AgentEditor {
    fn workspace_root_path(&self) -> Option<String> {
        self.static_editor.workspace_root.clone()
    }

    fn active_text_editor(&self) -> EditorFuture<'_, Option<ActiveTextEditor>> {
        Box::pin(self.peer.request_as(methods::EDITOR_ACTIVE, &()))
    }

    fn active_text_editor_selection(&self) -> EditorFuture<'_, Option<ActiveTextEditorSelection>> {
        Box::pin(self.peer.request_as(methods::EDITOR_SELECTION, &()))
    }

    fn active_text_editor_selection_or_entire_file(
        &self,
    ) -> EditorFuture<'_, Option<ActiveTextEditorSelection>> {
        Box::pin(
            self.peer
                .request_as(methods::EDITOR_SELECTION_OR_ENTIRE_FILE, &()),
        )
    }

    fn active_text_editor_visible_content(
        &self,
    ) -> EditorFuture<'_, Option<ActiveTextEditorVisibleContent>> {
        Box::pin(self.peer.request_as(methods::EDITOR_VISIBLE_CONTENT, &()))
    }

    fn replace_selection(
        &self,
        file_name: &str,
        selected_text: &str,
        replacement: &str,
    ) -> EditorFuture<'_, ReplaceSelectionResult> {
        let params = ReplaceSelectionParams {
            file_name: file_name.to_owned(),
            selected_text: selected_text.to_owned(),
            replacement: replacement.to_owned(),
        };
        Box::pin(async move {
            self.peer
                .request_as(methods::EDITOR_REPLACE_SELECTION, &params)
                .await
        })
    }

    fn show_quick_pick(&self, labels: Vec<String>) -> EditorFuture<'_, Option<String>> {
        Box::pin(async move {
            self.peer
                .request_as(methods::EDITOR_QUICK_PICK, &labels)
                .await
        })
    }

    fn show_warning_message(&self, message: &str) -> EditorFuture<'_, ()> {
        let sent = self.peer.notify(methods::EDITOR_WARNING, json!(message));
        Box::pin(async move { sent })
    }

    fn show_input_box(&self, prompt: Option<&str>) -> EditorFuture<'_, Option<String>> {
        let prompt = prompt.unwrap_or_default().to_owned();
        Box::pin(async move { self.peer.request_as(methods::EDITOR_PROMPT, &prompt).await })
    }

    fn did_receive_fixup_text(
        &self,
        id: &str,
        _text: &str,
        state: FixupState,
    ) -> EditorFuture<'_, ()> {
        debug!(id, ?state, "editor proxy: fixup text has no remote counterpart");
        Box::pin(async {
            Err(AppError::Unsupported(
                "didReceiveFixupText is not available through the agent".to_owned(),
            ))
        })
    }
}
