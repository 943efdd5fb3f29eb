//! Chat platform boundary
//!
//! The pipeline sends replies and downloads voice files only through
//! [`ChatGateway`]. Inbound events arrive as [`InboundMessage`] values.

pub mod telegram;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

pub use telegram::TelegramGateway;

use crate::Result;

/// Content of an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Plain text
    Text(String),
    /// Voice note not yet downloaded
    Voice(VoiceRef),
}

/// Reference to a voice file held by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRef {
    /// Platform file identifier
    pub file_id: String,
    /// MIME type reported by the platform
    pub mime_type: String,
    /// Duration in seconds, if known
    pub duration: Option<u32>,
}

/// A message received from the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Message identifier (unique within the chat)
    pub message_id: i64,
    /// Chat the message was sent in
    pub chat_id: i64,
    /// Sender identifier
    pub sender_id: i64,
    /// Sender display name
    pub sender_name: String,
    /// Text or voice content
    pub payload: Payload,
}

/// Reference to the message a reply answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    /// Chat to reply in
    pub chat_id: i64,
    /// Message to thread the reply under
    pub message_id: i64,
}

impl InboundMessage {
    /// Reference for threading replies to this message
    #[must_use]
    pub const fn reference(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}

/// Presence hint shown to the user while a message is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    /// "typing..."
    Typing,
    /// "recording voice message..."
    RecordVoice,
}

impl ChatAction {
    /// Wire name of the action
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Typing => "typing",
            Self::RecordVoice => "record_voice",
        }
    }
}

/// Outbound operations the pipeline needs from the chat platform
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Download the platform file `file_id` to `dest`
    ///
    /// # Errors
    ///
    /// Returns error if the download fails or exceeds `timeout`
    async fn download_file(&self, file_id: &str, dest: &Path, timeout: Duration) -> Result<()>;

    /// Reply to `original` with text
    ///
    /// # Errors
    ///
    /// Returns error if the platform rejects the message
    async fn reply_text(&self, original: MessageRef, text: &str) -> Result<()>;

    /// Reply to `original` with the voice note stored at `audio`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the upload fails
    async fn reply_voice(&self, original: MessageRef, audio: &Path) -> Result<()>;

    /// Show a presence hint in the chat of `original`
    ///
    /// # Errors
    ///
    /// Returns error if the platform rejects the action
    async fn send_action(&self, original: MessageRef, action: ChatAction) -> Result<()> {
        let _ = (original, action);
        Ok(())
    }
}
