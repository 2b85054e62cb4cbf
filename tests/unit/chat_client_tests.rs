//! Unit tests for `ChatClient` transcript handling and progress events.

use std::sync::Arc;

use cody_agent::chat::transcript::Speaker;
use cody_agent::chat::ChatClient;
use cody_agent::intent::StaticIntentDetector;
use cody_agent::recipes::builtin::ChatQuestion;
use cody_agent::recipes::{RecipeContext, RecipeRegistry};
use cody_agent::AppError;

use super::support::{selection, ChatEvent, RecordingEvents, ScriptedCompletions, SelectionEditor};

fn context(editor: Arc<SelectionEditor>) -> RecipeContext {
    RecipeContext {
        editor,
        intent: Arc::new(StaticIntentDetector::default()),
        first_interaction: true,
    }
}

#[tokio::test]
async fn progress_then_completion_then_transcript() {
    let completions = ScriptedCompletions::answering(&["Four", "Four."]);
    let events = Arc::new(RecordingEvents::default());
    let client = ChatClient::new(completions, Arc::clone(&events) as _);

    client
        .execute_recipe(&ChatQuestion, "2 + 2?", &context(SelectionEditor::with_selection(None)))
        .await
        .expect("executes");

    let events = events.events.lock().unwrap().clone();
    assert_eq!(events.len(), 4, "got {events:?}");
    assert_eq!(events[0], ChatEvent::InProgress(Some("Four".into())));
    assert_eq!(events[1], ChatEvent::InProgress(Some("Four.".into())));
    assert_eq!(events[2], ChatEvent::InProgress(None));
    let ChatEvent::Transcript(transcript) = &events[3] else {
        panic!("expected transcript, got {:?}", events[3]);
    };
    assert_eq!(transcript.interactions.len(), 1);
    let exchange = &transcript.interactions[0];
    assert_eq!(exchange.human_message.speaker, Speaker::Human);
    assert_eq!(exchange.human_message.display_text.as_deref(), Some("2 + 2?"));
    assert_eq!(exchange.assistant_message.text, "Four.");
    assert_eq!(transcript.last_interaction_timestamp, exchange.timestamp);
}

#[tokio::test]
async fn later_prompts_carry_the_history() {
    let completions = ScriptedCompletions::answering(&["ok"]);
    let events = Arc::new(RecordingEvents::default());
    let client = ChatClient::new(Arc::clone(&completions) as _, events);
    let ctx = context(SelectionEditor::with_selection(None));

    client
        .execute_recipe(&ChatQuestion, "first", &ctx)
        .await
        .expect("first");
    client
        .execute_recipe(&ChatQuestion, "second", &ctx)
        .await
        .expect("second");

    let requests = completions.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let texts: Vec<&str> = requests[1].messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "ok", "second"]);
    assert_eq!(requests[1].messages[1].speaker, Speaker::Assistant);

    let transcript = client.transcript().await;
    assert_eq!(transcript.interactions.len(), 2);
}

#[tokio::test]
async fn transcript_id_is_stable_across_interactions() {
    let client = ChatClient::new(
        ScriptedCompletions::answering(&["a"]),
        Arc::new(RecordingEvents::default()),
    );
    let before = client.transcript().await;
    client
        .execute_recipe(&ChatQuestion, "q", &context(SelectionEditor::with_selection(None)))
        .await
        .expect("executes");

    assert_eq!(client.transcript().await.id, before.id);
    assert!(before.interactions.is_empty());
}

#[tokio::test]
async fn completion_failure_clears_progress_and_leaves_transcript_untouched() {
    let completions = ScriptedCompletions::failing(&["par"], "model overloaded");
    let events = Arc::new(RecordingEvents::default());
    let client = ChatClient::new(completions, Arc::clone(&events) as _);

    let err = client
        .execute_recipe(&ChatQuestion, "hi", &context(SelectionEditor::with_selection(None)))
        .await
        .expect_err("must fail");

    assert_eq!(err, AppError::Upstream("model overloaded".into()));
    let events = events.events.lock().unwrap().clone();
    assert_eq!(events.last(), Some(&ChatEvent::InProgress(None)));
    assert!(!events.iter().any(|e| matches!(e, ChatEvent::Transcript(_))));
    assert!(client.transcript().await.interactions.is_empty());
}

#[tokio::test]
async fn recipe_failure_never_reaches_the_backend() {
    let completions = ScriptedCompletions::answering(&["unused"]);
    let events = Arc::new(RecordingEvents::default());
    let client = ChatClient::new(Arc::clone(&completions) as _, Arc::clone(&events) as _);
    let recipe = RecipeRegistry::builtin()
        .get("generate-docstring")
        .expect("builtin");

    let result = client
        .execute_recipe(recipe.as_ref(), "", &context(SelectionEditor::with_selection(None)))
        .await;

    assert!(matches!(result, Err(AppError::Upstream(_))));
    assert!(completions.requests.lock().unwrap().is_empty());
    assert!(events.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn selection_prompt_is_sent_and_display_text_recorded() {
    let client = ChatClient::new(
        ScriptedCompletions::answering(&["Renamed."]),
        Arc::new(RecordingEvents::default()),
    );
    let recipe = RecipeRegistry::builtin()
        .get("improve-variable-names")
        .expect("builtin");
    let editor = SelectionEditor::with_selection(Some(selection("let a = b;")));

    client
        .execute_recipe(recipe.as_ref(), "", &context(editor))
        .await
        .expect("executes");

    let transcript = client.transcript().await;
    let human = &transcript.interactions[0].human_message;
    assert!(human.text.contains("let a = b;"));
    assert_eq!(
        human.display_text.as_deref(),
        Some("Improve variable names:\n```\nlet a = b;\n```")
    );
}
