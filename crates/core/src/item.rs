//! Conversation items and the transcript data-channel event

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subject::{Speaker, Subject};

/// Topic label for transcript events published on the room data channel.
pub const TRANSCRIPT_TOPIC: &str = "transcript";

/// Role of a committed conversation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRole {
    User,
    Assistant,
}

impl ItemRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemRole::User => "user",
            ItemRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for ItemRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A committed conversation item as surfaced by the session runtime's
/// `conversation_item_added` signal. Transient; not stored in this core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationItem {
    pub role: ItemRole,
    pub content: String,
}

impl ConversationItem {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ItemRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ItemRole::Assistant,
            content: content.into(),
        }
    }
}

/// Transcript event published on the room data channel, topic
/// [`TRANSCRIPT_TOPIC`], as UTF-8 JSON. Field names are part of the wire
/// contract with the student/teacher UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub speaker: Speaker,
    pub role: ItemRole,
    pub content: String,
    pub subject: Option<Subject>,
    pub turn: u64,
    pub session_id: Uuid,
}

impl TranscriptEvent {
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serialization of a plain struct with string/uuid fields cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}
