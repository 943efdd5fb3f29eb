//! Telegram Bot API request/response types

use serde::{Deserialize, Serialize};

/// Telegram Bot API base URL
pub(crate) const API_BASE: &str = "https://api.telegram.org/bot";

/// Telegram file download base URL
pub(crate) const FILE_BASE: &str = "https://api.telegram.org/file/bot";

/// Telegram sendMessage request
#[derive(Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
}

/// Telegram sendChatAction request
#[derive(Serialize)]
pub(crate) struct SendChatActionRequest<'a> {
    pub chat_id: i64,
    pub action: &'a str,
}

/// Telegram getFile request
#[derive(Serialize)]
pub(crate) struct GetFileRequest<'a> {
    pub file_id: &'a str,
}

/// Telegram getUpdates request
#[derive(Serialize)]
pub(crate) struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub timeout: u64,
    pub allowed_updates: [&'static str; 1],
}

/// File metadata from Telegram getFile response
#[derive(Debug, Deserialize)]
pub(crate) struct TelegramFile {
    #[allow(dead_code)]
    pub file_id: String,
    pub file_path: Option<String>,
}

/// Bot identity from getMe
#[derive(Debug, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub username: Option<String>,
}

/// Telegram API response wrapper
#[derive(Deserialize)]
pub(crate) struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// A single update from getUpdates
#[derive(Debug, Deserialize)]
pub(crate) struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

/// Message from an update
#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub voice: Option<Voice>,
}

/// Voice note attached to a message
#[derive(Debug, Deserialize)]
pub(crate) struct Voice {
    pub file_id: String,
    pub duration: Option<u32>,
    pub mime_type: Option<String>,
}

/// Chat info
#[derive(Debug, Deserialize)]
pub(crate) struct Chat {
    pub id: i64,
}

/// User info
#[derive(Debug, Deserialize)]
pub(crate) struct User {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
}
