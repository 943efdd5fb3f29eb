//! Telegram gateway
//!
//! Receives messages through `getUpdates` long polling and replies through
//! the Bot API.

mod api;
pub mod dedup;
pub mod polling;
pub mod types;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;

use super::{ChatAction, ChatGateway, MessageRef};
use crate::Result;

pub use dedup::UpdateDedup;

/// Default long-poll timeout for `getUpdates`
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for a single Bot API request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Slack on top of the long-poll timeout before a `getUpdates` call is abandoned
const POLL_GRACE: Duration = Duration::from_secs(15);

/// Telegram Bot API gateway
#[derive(Clone)]
pub struct TelegramGateway {
    token: SecretString,
    client: Client,
    api_base: String,
    file_base: String,
    poll_timeout: Duration,
}

impl TelegramGateway {
    /// Create a gateway for the bot identified by `token`
    #[must_use]
    pub fn new(token: SecretString, poll_timeout: Duration) -> Self {
        Self {
            token,
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: types::API_BASE.to_string(),
            file_base: types::FILE_BASE.to_string(),
            poll_timeout,
        }
    }

    /// Point the gateway at a self-hosted Bot API server
    #[must_use]
    pub fn with_base_urls(mut self, api_base: impl Into<String>, file_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.file_base = file_base.into();
        self
    }

    /// Long-poll timeout used by `getUpdates`
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// HTTP deadline for one `getUpdates` call
    fn poll_deadline(&self) -> Duration {
        self.poll_timeout + POLL_GRACE
    }
}

impl std::fmt::Debug for TelegramGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramGateway")
            .field("api_base", &self.api_base)
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn download_file(&self, file_id: &str, dest: &Path, timeout: Duration) -> Result<()> {
        self.fetch_file(file_id, dest, timeout).await
    }

    async fn reply_text(&self, original: MessageRef, text: &str) -> Result<()> {
        self.send_message(original.chat_id, text, Some(original.message_id))
            .await
    }

    async fn reply_voice(&self, original: MessageRef, audio: &Path) -> Result<()> {
        self.send_voice(original.chat_id, audio, Some(original.message_id))
            .await
    }

    async fn send_action(&self, original: MessageRef, action: ChatAction) -> Result<()> {
        self.send_chat_action(original.chat_id, action.as_str()).await?;
        tracing::debug!(chat_id = original.chat_id, action = action.as_str(), "Telegram chat action sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_token() {
        let gateway = TelegramGateway::new(
            SecretString::from("123:secret-token"),
            DEFAULT_POLL_TIMEOUT,
        );
        let rendered = format!("{gateway:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("api.telegram.org"));
    }

    #[test]
    fn base_urls_can_be_overridden() {
        let gateway = TelegramGateway::new(SecretString::from("t"), Duration::from_secs(5))
            .with_base_urls("http://localhost:8081/bot", "http://localhost:8081/file/bot");
        assert_eq!(gateway.api_base, "http://localhost:8081/bot");
        assert_eq!(gateway.file_base, "http://localhost:8081/file/bot");
        assert_eq!(gateway.poll_timeout(), Duration::from_secs(5));
        assert_eq!(gateway.poll_deadline(), Duration::from_secs(20));
    }
}
