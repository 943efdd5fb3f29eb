//! Raw Telegram Bot API calls

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use super::types::*;
use crate::{Error, Result};

impl super::TelegramGateway {
    pub(super) fn method_url(&self, method: &str) -> String {
        format!("{}{}/{method}", self.api_base, self.token.expose_secret())
    }

    /// Validate the bot token by calling `getMe`
    ///
    /// # Errors
    ///
    /// Returns error if the token is invalid
    pub async fn get_me(&self) -> Result<BotUser> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getMe error: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Channel("Invalid Telegram bot token".to_string()));
        }

        read_result(response, "getMe").await
    }

    /// Send a plain text message
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<()> {
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_to_message_id: reply_to,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendMessage error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let lower = body.to_lowercase();

            // No point retrying unreachable chats
            if lower.contains("chat not found") || lower.contains("bot was blocked by the user") {
                return Err(Error::Channel(format!(
                    "Telegram chat {chat_id} not reachable: {body}"
                )));
            }

            return Err(Error::Channel(format!(
                "Telegram sendMessage error: {status} - {body}"
            )));
        }

        tracing::debug!(chat_id, "Telegram message sent");
        Ok(())
    }

    /// Upload the OGG/Opus file at `audio` as a voice message
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the upload fails
    pub async fn send_voice(&self, chat_id: i64, audio: &Path, reply_to: Option<i64>) -> Result<()> {
        let data = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map_or_else(|| "voice.ogg".to_string(), |n| n.to_string_lossy().into_owned());

        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str("audio/ogg")
            .map_err(|e| Error::Channel(format!("Invalid MIME type: {e}")))?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("voice", part);
        if let Some(reply_to) = reply_to {
            form = form.text("reply_to_message_id", reply_to.to_string());
        }

        let response = self
            .client
            .post(self.method_url("sendVoice"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendVoice error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram sendVoice error: {status} - {body}"
            )));
        }

        tracing::debug!(chat_id, "Telegram voice message sent");
        Ok(())
    }

    /// Send a chat action (typing indicator, etc.)
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<()> {
        let request = SendChatActionRequest { chat_id, action };

        let response = self
            .client
            .post(self.method_url("sendChatAction"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendChatAction error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram sendChatAction error: {status} - {body}"
            )));
        }

        Ok(())
    }

    /// Resolve `file_id` to a downloadable path via `getFile`
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or returns no path
    pub async fn get_file_path(&self, file_id: &str) -> Result<String> {
        let response = self
            .client
            .post(self.method_url("getFile"))
            .json(&GetFileRequest { file_id })
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getFile error: {e}")))?;

        let file: TelegramFile = read_result(response, "getFile").await?;
        file.file_path
            .ok_or_else(|| Error::Channel("Telegram getFile returned no file_path".to_string()))
    }

    /// Download `file_id` and stream it into `dest`
    ///
    /// The whole exchange (`getFile` plus the transfer) is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns error if the API request, the transfer or the write fails,
    /// or `Error::Timeout` when `timeout` elapses
    pub async fn fetch_file(&self, file_id: &str, dest: &Path, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.fetch_file_inner(file_id, dest, timeout))
            .await
            .map_err(|_| Error::Timeout {
                operation: "download",
                after: timeout,
            })?
    }

    async fn fetch_file_inner(&self, file_id: &str, dest: &Path, timeout: Duration) -> Result<()> {
        let file_path = self.get_file_path(file_id).await?;
        let url = format!("{}{}/{file_path}", self.file_base, self.token.expose_secret());

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram file download error: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Channel(format!(
                "Telegram file download error: {}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| Error::Channel(format!("Telegram file download read error: {e}")))?;
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        tracing::debug!(path = %dest.display(), bytes = written, "Telegram file downloaded");
        Ok(())
    }
}

/// Parse a Bot API envelope and return its `result`
pub(super) async fn read_result<T: DeserializeOwned>(
    response: reqwest::Response,
    method: &str,
) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| Error::Channel(format!("Telegram {method} response read error: {e}")))?;

    parse_result(&body, method)
}

/// Parse a Bot API envelope body and return its `result`
pub(super) fn parse_result<T: DeserializeOwned>(body: &str, method: &str) -> Result<T> {
    let parsed: TelegramResponse<T> = serde_json::from_str(body)
        .map_err(|e| Error::Channel(format!("Telegram {method} parse error: {e}")))?;

    match parsed.result {
        Some(result) if parsed.ok => Ok(result),
        _ => Err(Error::Channel(format!(
            "Telegram {method} error: {}",
            parsed.description.unwrap_or_default()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_envelope() {
        let body = r#"{"ok":true,"result":{"file_id":"abc","file_path":"voice/file_1.oga"}}"#;
        let file: TelegramFile = parse_result(body, "getFile").unwrap();
        assert_eq!(file.file_path.as_deref(), Some("voice/file_1.oga"));
    }

    #[test]
    fn error_envelope_carries_description() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: invalid file_id"}"#;
        let err = parse_result::<TelegramFile>(body, "getFile").unwrap_err();
        assert!(err.to_string().contains("invalid file_id"));
    }

    #[test]
    fn garbage_body_is_parse_error() {
        let err = parse_result::<BotUser>("<html>", "getMe").unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }
}
