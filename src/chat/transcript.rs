//! Chat transcript and its wire snapshot.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The user.
    Human,
    /// The model.
    Assistant,
}

/// One chat message as shown to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Author.
    pub speaker: Speaker,
    /// Text sent to (or received from) the model.
    pub text: String,
    /// Text shown in the chat view when it differs from `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
}

impl ChatMessage {
    /// Human message with a separate display text.
    #[must_use]
    pub fn human(text: impl Into<String>, display_text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Human,
            text: text.into(),
            display_text: Some(display_text.into()),
        }
    }

    /// Assistant message; display text mirrors the model output.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            speaker: Speaker::Assistant,
            display_text: Some(text.clone()),
            text,
        }
    }
}

/// One human/assistant exchange in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionJson {
    /// The human turn.
    pub human_message: ChatMessage,
    /// The assistant turn.
    pub assistant_message: ChatMessage,
    /// RFC 3339 completion time.
    pub timestamp: String,
}

/// Transcript snapshot sent with `chat/updateTranscript`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptJson {
    /// Stable transcript id.
    pub id: String,
    /// Every exchange, oldest first.
    pub interactions: Vec<InteractionJson>,
    /// Timestamp of the newest exchange (creation time when empty).
    pub last_interaction_timestamp: String,
}

#[derive(Debug, Clone)]
struct Interaction {
    human: ChatMessage,
    assistant: ChatMessage,
    timestamp: DateTime<Utc>,
}

/// Ordered chat history owned by one chat client.
#[derive(Debug, Clone)]
pub struct Transcript {
    id: String,
    created_at: DateTime<Utc>,
    interactions: Vec<Interaction>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// Empty transcript with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            interactions: Vec::new(),
        }
    }

    /// Transcript id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of completed exchanges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether no exchange has completed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Prior messages in model order, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.interactions
            .iter()
            .flat_map(|i| [i.human.clone(), i.assistant.clone()])
            .collect()
    }

    /// Append a completed exchange.
    pub fn add_interaction(&mut self, human: ChatMessage, assistant: ChatMessage) {
        self.interactions.push(Interaction {
            human,
            assistant,
            timestamp: Utc::now(),
        });
    }

    /// Wire snapshot.
    #[must_use]
    pub fn to_json(&self) -> TranscriptJson {
        let last = self
            .interactions
            .last()
            .map_or(self.created_at, |i| i.timestamp);
        TranscriptJson {
            id: self.id.clone(),
            interactions: self
                .interactions
                .iter()
                .map(|i| InteractionJson {
                    human_message: i.human.clone(),
                    assistant_message: i.assistant.clone(),
                    timestamp: rfc3339(i.timestamp),
                })
                .collect(),
            last_interaction_timestamp: rfc3339(last),
        }
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
