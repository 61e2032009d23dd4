use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A result shared by one agent with its peers during a collaboration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerMessage {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// Name of the agent that produced the content.
    pub sender: String,
    /// The shared text.
    pub content: String,
    /// Subtask the content belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtask_id: Option<String>,
    /// Round in which the content was produced.
    pub round: u32,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl PeerMessage {
    /// Creates a new message from `sender`.
    pub fn new(sender: impl Into<String>, content: impl Into<String>, round: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            content: content.into(),
            subtask_id: None,
            round,
            timestamp: Utc::now(),
        }
    }

    /// Tags the message with the subtask it answers.
    pub fn for_subtask(mut self, subtask_id: impl Into<String>) -> Self {
        self.subtask_id = Some(subtask_id.into());
        self
    }
}
