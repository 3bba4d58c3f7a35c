//! Message Source Capability
//!
//! Information Hiding:
//! - How messages are obtained (page scraping, exports, fixtures) hidden behind trait
//! - Core logic depends only on `MessageData` and the three capabilities

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Text,
    Voice,
    Image,
    Video,
    Document,
    Unknown,
}

/// One message as extracted from a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub is_outgoing: bool,
    pub sender: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_forwarded: bool,
    #[serde(default)]
    pub media_type: MediaType,
}

impl MessageData {
    pub fn text(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            chat_id: None,
            is_outgoing: false,
            sender: sender.into(),
            content: content.into(),
            timestamp: None,
            is_group: false,
            is_deleted: false,
            is_forwarded: false,
            media_type: MediaType::Text,
        }
    }

    /// Content with a placeholder for media messages that carry no text
    pub fn display_content(&self) -> String {
        if !self.content.trim().is_empty() || self.media_type == MediaType::Text {
            return self.content.clone();
        }
        let label = match self.media_type {
            MediaType::Voice => "voice message",
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Document => "document",
            MediaType::Text | MediaType::Unknown => "attachment",
        };
        format!("[{}]", label)
    }
}

/// Where conversation messages come from
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Messages currently visible, oldest first
    async fn extract_visible_messages(&self) -> Result<Vec<MessageData>>;

    /// Stream of messages arriving after the call
    fn observe_new_messages(&self) -> mpsc::Receiver<MessageData>;

    /// Conversation id of the open chat, if any
    fn current_conversation_id(&self) -> Option<String>;
}

/// A conversation exported to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub chat_id: String,
    #[serde(default)]
    pub chat_name: String,
    #[serde(default)]
    pub is_group: bool,
    pub messages: Vec<MessageData>,
}

/// `MessageSource` backed by a transcript; new messages are pushed by the owner
pub struct TranscriptSource {
    transcript: Transcript,
    pending: std::sync::Mutex<Vec<MessageData>>,
}

impl TranscriptSource {
    pub fn new(transcript: Transcript) -> Self {
        Self {
            transcript,
            pending: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read transcript {:?}", path))?;
        let transcript: Transcript =
            serde_json::from_str(&json).with_context(|| format!("Invalid transcript {:?}", path))?;
        Ok(Self::new(transcript))
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Queue a message for the next `observe_new_messages` subscriber
    pub fn push(&self, message: MessageData) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(message);
        }
    }
}

#[async_trait]
impl MessageSource for TranscriptSource {
    async fn extract_visible_messages(&self) -> Result<Vec<MessageData>> {
        Ok(self.transcript.messages.clone())
    }

    fn observe_new_messages(&self) -> mpsc::Receiver<MessageData> {
        let queued: Vec<MessageData> = self
            .pending
            .lock()
            .map(|mut pending| pending.drain(..).collect())
            .unwrap_or_default();
        let (tx, rx) = mpsc::channel(queued.len().max(1));
        for message in queued {
            // Capacity covers every queued message
            let _ = tx.try_send(message);
        }
        rx
    }

    fn current_conversation_id(&self) -> Option<String> {
        Some(self.transcript.chat_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_defaults_from_minimal_json() {
        let message: MessageData =
            serde_json::from_str(r#"{"sender": "Bob", "content": "hi"}"#).unwrap();
        assert_eq!(message.media_type, MediaType::Text);
        assert!(!message.is_outgoing);
    }

    #[test]
    fn test_media_placeholder() {
        let mut voice = MessageData::text("Bob", "");
        voice.media_type = MediaType::Voice;
        assert_eq!(voice.display_content(), "[voice message]");
    }

    #[tokio::test]
    async fn test_transcript_source() {
        let source = TranscriptSource::new(Transcript {
            chat_id: "12345@c.us".to_string(),
            chat_name: "Bob".to_string(),
            is_group: false,
            messages: vec![MessageData::text("Bob", "hi")],
        });

        assert_eq!(source.current_conversation_id().as_deref(), Some("12345@c.us"));
        assert_eq!(source.extract_visible_messages().await.unwrap().len(), 1);

        source.push(MessageData::text("Bob", "are you there?"));
        let mut rx = source.observe_new_messages();
        assert_eq!(rx.recv().await.unwrap().content, "are you there?");
        assert!(rx.recv().await.is_none());
    }
}
