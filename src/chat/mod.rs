//! Chat client: runs recipes against the completions backend and keeps the
//! transcript.

pub mod completions;
pub mod transcript;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chat::completions::{CompletionParameters, CompletionsClient, PromptMessage};
use crate::chat::transcript::{ChatMessage, Transcript, TranscriptJson};
use crate::recipes::{Recipe, RecipeContext};
use crate::Result;

pub use completions::SourcegraphCompletionsClient;

/// Sink for chat progress, implemented by the agent over its connection.
pub trait ChatEvents: Send + Sync {
    /// The assistant message being generated; `None` once it is complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be delivered.
    fn message_in_progress(&self, message: Option<&ChatMessage>) -> Result<()>;

    /// A new transcript snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be delivered.
    fn transcript_updated(&self, transcript: &TranscriptJson) -> Result<()>;
}

/// Executes recipes and owns the chat transcript.
pub struct ChatClient {
    completions: Arc<dyn CompletionsClient>,
    events: Arc<dyn ChatEvents>,
    transcript: Mutex<Transcript>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient").finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Create a client with an empty transcript.
    #[must_use]
    pub fn new(completions: Arc<dyn CompletionsClient>, events: Arc<dyn ChatEvents>) -> Self {
        Self {
            completions,
            events,
            transcript: Mutex::new(Transcript::new()),
        }
    }

    /// Snapshot of the current transcript.
    pub async fn transcript(&self) -> TranscriptJson {
        self.transcript.lock().await.to_json()
    }

    /// Run `recipe` for `human_input` and append the exchange.
    ///
    /// Progress is reported through [`ChatEvents`]: every partial assistant
    /// text, then `None`, then the updated transcript. Nothing is appended if
    /// the recipe or the completion fails.
    ///
    /// # Errors
    ///
    /// Propagates failures from the recipe (including editor round trips)
    /// and from the completions backend.
    pub async fn execute_recipe(
        &self,
        recipe: &dyn Recipe,
        human_input: &str,
        context: &RecipeContext,
    ) -> Result<()> {
        let interaction = recipe.interaction(human_input, context).await?;
        debug!(recipe = recipe.id(), "chat: interaction built");

        let mut messages: Vec<PromptMessage> = self
            .transcript
            .lock()
            .await
            .history()
            .into_iter()
            .map(|m| PromptMessage {
                speaker: m.speaker,
                text: m.text,
            })
            .collect();
        messages.push(PromptMessage {
            speaker: transcript::Speaker::Human,
            text: interaction.prompt.clone(),
        });

        let events = Arc::clone(&self.events);
        let on_change = move |text: &str| {
            if let Err(err) = events.message_in_progress(Some(&ChatMessage::assistant(text))) {
                debug!(error = %err, "chat: dropped progress update");
            }
        };

        let answer = self
            .completions
            .stream(CompletionParameters::chat(messages), &on_change)
            .await;
        self.events.message_in_progress(None)?;
        let answer = answer?;

        let snapshot = {
            let mut transcript = self.transcript.lock().await;
            transcript.add_interaction(
                ChatMessage::human(interaction.prompt, interaction.display_text),
                ChatMessage::assistant(answer),
            );
            transcript.to_json()
        };
        info!(
            recipe = recipe.id(),
            interactions = snapshot.interactions.len(),
            "chat: recipe executed"
        );
        self.events.transcript_updated(&snapshot)
    }
}
