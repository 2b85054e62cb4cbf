//! Unit tests for the recipe registry and the built-in recipes.

use std::sync::Arc;

use cody_agent::editor::NoopEditor;
use cody_agent::intent::StaticIntentDetector;
use cody_agent::recipes::builtin::{ChatQuestion, NO_SELECTION_WARNING};
use cody_agent::recipes::{Recipe, RecipeContext, RecipeRegistry};
use cody_agent::AppError;

use super::support::{selection, SelectionEditor};

fn context(editor: Arc<SelectionEditor>, editor_intent: bool) -> RecipeContext {
    RecipeContext {
        editor,
        intent: Arc::new(StaticIntentDetector {
            codebase: false,
            editor: editor_intent,
        }),
        first_interaction: true,
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

#[test]
fn builtin_registry_lists_in_registration_order() {
    let ids: Vec<String> = RecipeRegistry::builtin()
        .list()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(
        ids,
        vec![
            "chat-question",
            "explain-code-detailed",
            "explain-code-high-level",
            "generate-docstring",
            "generate-unit-test",
            "improve-variable-names",
            "find-code-smells",
        ]
    );
}

#[test]
fn listing_exposes_titles() {
    let registry = RecipeRegistry::builtin();
    let smell = registry
        .list()
        .into_iter()
        .find(|r| r.id == "find-code-smells")
        .expect("listed");
    assert_eq!(smell.title, "Smell code");
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut registry = RecipeRegistry::new();
    registry.register(Arc::new(ChatQuestion)).expect("first");
    let err = registry.register(Arc::new(ChatQuestion)).expect_err("dup");
    assert!(matches!(err, AppError::Config(_)));
    assert_eq!(registry.len(), 1);
}

#[test]
fn unknown_id_is_absent() {
    assert!(RecipeRegistry::builtin().get("no-such-recipe").is_none());
    assert!(RecipeRegistry::new().is_empty());
}

// ── Selection recipes ────────────────────────────────────────────────────────

#[tokio::test]
async fn selection_recipe_embeds_selected_code() {
    let editor = SelectionEditor::with_selection(Some(selection("fn answer() -> u8 { 42 }")));
    let recipe = RecipeRegistry::builtin()
        .get("explain-code-high-level")
        .expect("builtin");

    let interaction = recipe
        .interaction("", &context(Arc::clone(&editor), false))
        .await
        .expect("interaction");

    assert!(interaction.prompt.starts_with("Explain the following code at a high level."));
    assert!(interaction.prompt.contains("File: src/lib.rs"));
    assert!(interaction.prompt.contains("```\nfn answer() -> u8 { 42 }\n```"));
    assert!(interaction.prompt.contains("use std::fmt;"));
    assert_eq!(
        interaction.display_text,
        "Explain selected code (high level):\n```\nfn answer() -> u8 { 42 }\n```"
    );
    assert!(editor.warnings.lock().unwrap().is_empty());
}

#[tokio::test]
async fn selection_recipe_appends_extra_input() {
    let editor = SelectionEditor::with_selection(Some(selection("let x = 1;")));
    let recipe = RecipeRegistry::builtin()
        .get("generate-unit-test")
        .expect("builtin");

    let interaction = recipe
        .interaction("  use proptest  ", &context(editor, false))
        .await
        .expect("interaction");

    assert!(interaction.prompt.ends_with("\nuse proptest"));
}

#[tokio::test]
async fn selection_recipe_without_selection_warns_and_fails() {
    let editor = SelectionEditor::with_selection(None);
    let recipe = RecipeRegistry::builtin()
        .get("find-code-smells")
        .expect("builtin");

    let err = recipe
        .interaction("", &context(Arc::clone(&editor), false))
        .await
        .expect_err("must fail");

    assert!(matches!(err, AppError::Upstream(_)));
    assert_eq!(
        *editor.warnings.lock().unwrap(),
        vec![NO_SELECTION_WARNING.to_owned()]
    );
}

#[tokio::test]
async fn blank_selection_counts_as_no_selection() {
    let editor = SelectionEditor::with_selection(Some(selection("   \n")));
    let recipe = RecipeRegistry::builtin()
        .get("generate-docstring")
        .expect("builtin");

    let result = recipe.interaction("", &context(Arc::clone(&editor), false)).await;

    assert!(result.is_err());
    assert_eq!(editor.warnings.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn noop_editor_yields_upstream_error() {
    let ctx = RecipeContext {
        editor: Arc::new(NoopEditor::new(None)),
        intent: Arc::new(StaticIntentDetector::default()),
        first_interaction: false,
    };
    let recipe = RecipeRegistry::builtin()
        .get("explain-code-detailed")
        .expect("builtin");

    let err = recipe.interaction("", &ctx).await.expect_err("must fail");
    assert!(matches!(err, AppError::Upstream(ref msg) if msg.contains("explain-code-detailed")));
}

// ── chat-question ────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_question_passes_input_through() {
    let editor = SelectionEditor::with_selection(Some(selection("ignored")));
    let interaction = ChatQuestion
        .interaction("What is a monad?", &context(editor, false))
        .await
        .expect("interaction");

    assert_eq!(interaction.prompt, "What is a monad?");
    assert_eq!(interaction.display_text, "What is a monad?");
}

#[tokio::test]
async fn chat_question_attaches_selection_when_editor_context_required() {
    let editor = SelectionEditor::with_selection(Some(selection("x.unwrap()")));
    let interaction = ChatQuestion
        .interaction("Is this line safe?", &context(editor, true))
        .await
        .expect("interaction");

    assert!(interaction.prompt.contains("```\nx.unwrap()\n```"));
    assert!(interaction.prompt.ends_with("Is this line safe?"));
    assert_eq!(interaction.display_text, "Is this line safe?");
}

#[tokio::test]
async fn chat_question_without_selection_still_answers() {
    let editor = SelectionEditor::with_selection(None);
    let interaction = ChatQuestion
        .interaction("Explain lifetimes", &context(Arc::clone(&editor), true))
        .await
        .expect("interaction");

    assert_eq!(interaction.prompt, "Explain lifetimes");
    assert!(editor.warnings.lock().unwrap().is_empty());
}
