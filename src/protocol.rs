//! Agent protocol contract: method names and their parameter/result types.
//!
//! Framing and the initialization sequence follow LSP:
//!
//! 1. client → server `initialize` request, answered with [`ServerInfo`]
//! 2. client → server `initialized` notification
//! 3. either side sends any registered request or notification
//! 4. client → server `shutdown` request, answered with `null`
//! 5. client → server `exit` notification; the server session ends
//!
//! | Method                             | Direction       | Params                   | Result                          |
//! |------------------------------------|-----------------|--------------------------|---------------------------------|
//! | `initialize`                       | client → server | [`ClientInfo`]           | [`ServerInfo`]                  |
//! | `shutdown`                         | client → server | none                     | `null`                          |
//! | `recipes/list`                     | client → server | none                     | `[`[`RecipeInfo`]`]`            |
//! | `recipes/execute`                  | client → server | [`ExecuteRecipeParams`]  | `null`                          |
//! | `editor/quickPick`                 | server → client | `[string]`               | `string \| null`                |
//! | `editor/prompt`                    | server → client | `string`                 | `string \| null`                |
//! | `editor/active`                    | server → client | none                     | `ActiveTextEditor \| null`      |
//! | `editor/selection`                 | server → client | none                     | `ActiveTextEditorSelection \| null` |
//! | `editor/selectionOrEntireFile`     | server → client | none                     | `ActiveTextEditorSelection \| null` |
//! | `editor/visibleContent`            | server → client | none                     | `ActiveTextEditorVisibleContent \| null` |
//! | `editor/replaceSelection`          | server → client | [`ReplaceSelectionParams`] | [`ReplaceSelectionResult`]    |
//! | `intent/isCodebaseContextRequired` | server → client | `string`                 | `boolean`                       |
//! | `intent/isEditorContextRequired`   | server → client | `string`                 | `boolean`                       |
//!
//! Notifications: `initialized`, `exit` (client → server); `editor/warning`,
//! `chat/updateMessageInProgress`, `chat/updateTranscript` (server → client).

use serde::{Deserialize, Serialize};

/// Method names used on the wire.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Handshake completion notification.
    pub const INITIALIZED: &str = "initialized";
    /// Shutdown request.
    pub const SHUTDOWN: &str = "shutdown";
    /// Exit notification.
    pub const EXIT: &str = "exit";
    /// Recipe enumeration request.
    pub const RECIPES_LIST: &str = "recipes/list";
    /// Recipe execution request.
    pub const RECIPES_EXECUTE: &str = "recipes/execute";

    /// Quick-pick prompt request.
    pub const EDITOR_QUICK_PICK: &str = "editor/quickPick";
    /// Free-text prompt request.
    pub const EDITOR_PROMPT: &str = "editor/prompt";
    /// Active editor snapshot request.
    pub const EDITOR_ACTIVE: &str = "editor/active";
    /// Selection snapshot request.
    pub const EDITOR_SELECTION: &str = "editor/selection";
    /// Selection-or-file snapshot request.
    pub const EDITOR_SELECTION_OR_ENTIRE_FILE: &str = "editor/selectionOrEntireFile";
    /// Visible viewport snapshot request.
    pub const EDITOR_VISIBLE_CONTENT: &str = "editor/visibleContent";
    /// Selection replacement request.
    pub const EDITOR_REPLACE_SELECTION: &str = "editor/replaceSelection";
    /// Warning notification.
    pub const EDITOR_WARNING: &str = "editor/warning";

    /// Codebase-context intent query.
    pub const INTENT_IS_CODEBASE_CONTEXT_REQUIRED: &str = "intent/isCodebaseContextRequired";
    /// Editor-context intent query.
    pub const INTENT_IS_EDITOR_CONTEXT_REQUIRED: &str = "intent/isEditorContextRequired";

    /// Streaming assistant message notification.
    pub const CHAT_UPDATE_MESSAGE_IN_PROGRESS: &str = "chat/updateMessageInProgress";
    /// Transcript snapshot notification.
    pub const CHAT_UPDATE_TRANSCRIPT: &str = "chat/updateTranscript";
}

/// Identity the client announces in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name, recorded for diagnostics.
    pub name: String,
}

/// Identity the server returns from `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name (`cody-agent` unless configured otherwise).
    pub name: String,
}

/// One entry of `recipes/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeInfo {
    /// Recipe id used with `recipes/execute`.
    pub id: String,
    /// Human-readable title.
    pub title: String,
}

/// Editor facts that do not need a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticEditor {
    /// Workspace root path, if the client has one open.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Static context a client may attach to `recipes/execute`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticRecipeContext {
    /// Static editor facts.
    #[serde(default)]
    pub editor: StaticEditor,
    /// Whether this is the first interaction of the chat.
    #[serde(default)]
    pub first_interaction: bool,
}

/// Params of `recipes/execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRecipeParams {
    /// Recipe id from `recipes/list`.
    pub id: String,
    /// The human's chat input.
    pub human_chat_input: String,
    /// Optional static context.
    #[serde(default)]
    pub context: Option<StaticRecipeContext>,
}

/// Params of `editor/replaceSelection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSelectionParams {
    /// File holding the selection.
    pub file_name: String,
    /// Text expected to be selected.
    pub selected_text: String,
    /// Replacement text.
    pub replacement: String,
}

/// Result of `editor/replaceSelection`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSelectionResult {
    /// Whether the edit was applied.
    pub applied: bool,
    /// Why the edit was not applied; empty on success.
    #[serde(default)]
    pub failure_reason: String,
}
