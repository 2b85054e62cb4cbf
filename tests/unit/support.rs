//! In-process fakes shared by the unit tests.

use std::sync::{Arc, Mutex};

use cody_agent::chat::completions::{
    fold_events, CompletionEvent, CompletionFuture, CompletionParameters, CompletionsClient,
    OnChange,
};
use cody_agent::chat::transcript::{ChatMessage, TranscriptJson};
use cody_agent::chat::ChatEvents;
use cody_agent::editor::{
    ActiveTextEditor, ActiveTextEditorSelection, ActiveTextEditorVisibleContent, Editor,
    EditorFuture, FixupState,
};
use cody_agent::protocol::ReplaceSelectionResult;
use cody_agent::Result;

/// Selection used across recipe tests.
pub fn selection(text: &str) -> ActiveTextEditorSelection {
    ActiveTextEditorSelection {
        file_name: "src/lib.rs".into(),
        repo_name: None,
        revision: None,
        preceding_text: "use std::fmt;\n".into(),
        selected_text: text.into(),
        following_text: String::new(),
    }
}

/// Editor with a fixed selection that records every warning.
#[derive(Debug, Default)]
pub struct SelectionEditor {
    selection: Option<ActiveTextEditorSelection>,
    pub warnings: Mutex<Vec<String>>,
}

impl SelectionEditor {
    pub fn with_selection(selection: Option<ActiveTextEditorSelection>) -> Arc<Self> {
        Arc::new(Self {
            selection,
            warnings: Mutex::new(Vec::new()),
        })
    }
}

impl Editor for SelectionEditor {
    fn workspace_root_path(&self) -> Option<String> {
        None
    }

    fn active_text_editor(&self) -> EditorFuture<'_, Option<ActiveTextEditor>> {
        Box::pin(async { Ok(None) })
    }

    fn active_text_editor_selection(&self) -> EditorFuture<'_, Option<ActiveTextEditorSelection>> {
        let selection = self.selection.clone();
        Box::pin(async move { Ok(selection) })
    }

    fn active_text_editor_selection_or_entire_file(
        &self,
    ) -> EditorFuture<'_, Option<ActiveTextEditorSelection>> {
        self.active_text_editor_selection()
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
        Box::pin(async { Ok(ReplaceSelectionResult::default()) })
    }

    fn show_quick_pick(&self, _labels: Vec<String>) -> EditorFuture<'_, Option<String>> {
        Box::pin(async { Ok(None) })
    }

    fn show_warning_message(&self, message: &str) -> EditorFuture<'_, ()> {
        self.warnings.lock().unwrap().push(message.to_owned());
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

/// Completions backend replaying cumulative chunks, optionally ending in an
/// error event. Records every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedCompletions {
    chunks: Vec<String>,
    error: Option<String>,
    pub requests: Mutex<Vec<CompletionParameters>>,
}

impl ScriptedCompletions {
    pub fn answering(chunks: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.iter().map(|c| (*c).to_owned()).collect(),
            ..Self::default()
        })
    }

    pub fn failing(chunks: &[&str], error: &str) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.iter().map(|c| (*c).to_owned()).collect(),
            error: Some(error.to_owned()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

impl CompletionsClient for ScriptedCompletions {
    fn stream<'a>(
        &'a self,
        params: CompletionParameters,
        on_change: OnChange<'a>,
    ) -> CompletionFuture<'a> {
        self.requests.lock().unwrap().push(params);
        let mut events: Vec<CompletionEvent> = self
            .chunks
            .iter()
            .cloned()
            .map(CompletionEvent::Completion)
            .collect();
        if let Some(error) = &self.error {
            events.push(CompletionEvent::Error(error.clone()));
        }
        events.push(CompletionEvent::Done);
        Box::pin(async move { fold_events(events, on_change) })
    }
}

/// One observed chat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    InProgress(Option<String>),
    Transcript(TranscriptJson),
}

/// Chat sink recording events in arrival order.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    pub events: Mutex<Vec<ChatEvent>>,
}

impl ChatEvents for RecordingEvents {
    fn message_in_progress(&self, message: Option<&ChatMessage>) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(ChatEvent::InProgress(message.map(|m| m.text.clone())));
        Ok(())
    }

    fn transcript_updated(&self, transcript: &TranscriptJson) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(ChatEvent::Transcript(transcript.clone()));
        Ok(())
    }
}
