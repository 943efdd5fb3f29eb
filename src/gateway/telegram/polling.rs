//! Telegram polling mode: getUpdates loop and message conversion

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::api::parse_result;
use super::dedup::UpdateDedup;
use super::types::{GetUpdatesRequest, Update};
use crate::gateway::{InboundMessage, Payload, VoiceRef};
use crate::retry::{RetryPolicy, delay_for_attempt};

/// MIME type Telegram uses for voice notes
const DEFAULT_VOICE_MIME: &str = "audio/ogg";

impl super::TelegramGateway {
    /// Spawn a background task that long-polls Telegram's getUpdates API
    ///
    /// Received messages are forwarded into `tx` in arrival order. Deletes any
    /// existing webhook before starting to avoid conflicts. The task exits
    /// when `shutdown` is cancelled or the receiver is dropped.
    pub fn start_polling(
        &self,
        tx: mpsc::Sender<InboundMessage>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let gateway = self.clone();
        tokio::spawn(async move {
            gateway.polling_loop(tx, shutdown).await;
        })
    }

    async fn polling_loop(&self, tx: mpsc::Sender<InboundMessage>, shutdown: CancellationToken) {
        // Delete any existing webhook so getUpdates works
        if let Err(e) = self
            .client
            .post(self.method_url("deleteWebhook"))
            .send()
            .await
        {
            tracing::warn!(error = %e, "failed to delete Telegram webhook before polling");
        }

        let backoff = RetryPolicy::default();
        let mut offset: Option<i64> = None;
        let mut dedup = UpdateDedup::default();
        let mut failures: u32 = 0;

        tracing::info!("Telegram polling started");

        loop {
            let updates = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                result = self.get_updates(offset) => result,
            };

            let updates = match updates {
                Ok(updates) => {
                    failures = 0;
                    updates
                }
                Err(e) => {
                    let delay = delay_for_attempt(&backoff, failures);
                    failures = failures.saturating_add(1);
                    tracing::warn!(error = %e, ?delay, "Telegram getUpdates error");
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(delay) => continue,
                    }
                }
            };

            for update in &updates {
                // Advance offset past this update
                offset = Some(update.update_id + 1);

                if dedup.is_duplicate(update.update_id) {
                    continue;
                }

                let Some(msg) = update_to_inbound(update) else {
                    tracing::debug!(update_id = update.update_id, "ignoring Telegram update");
                    continue;
                };

                if tx.send(msg).await.is_err() {
                    tracing::info!("message receiver dropped, stopping Telegram polling");
                    return;
                }
            }
        }

        tracing::info!("Telegram polling stopped");
    }

    async fn get_updates(&self, offset: Option<i64>) -> crate::Result<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: ["message"],
        };

        let body = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(self.poll_deadline())
            .json(&request)
            .send()
            .await?
            .text()
            .await?;

        parse_result(&body, "getUpdates")
    }
}

/// Convert a polling update into an [`InboundMessage`]
///
/// Returns `None` for updates without a message, messages from bots, and
/// messages carrying neither non-empty text nor a voice note.
pub(crate) fn update_to_inbound(update: &Update) -> Option<InboundMessage> {
    let msg = update.message.as_ref()?;

    // Skip bot messages
    if msg.from.as_ref().is_some_and(|u| u.is_bot) {
        return None;
    }

    let payload = if let Some(voice) = &msg.voice {
        Payload::Voice(VoiceRef {
            file_id: voice.file_id.clone(),
            mime_type: voice
                .mime_type
                .clone()
                .unwrap_or_else(|| DEFAULT_VOICE_MIME.to_string()),
            duration: voice.duration,
        })
    } else {
        Payload::Text(msg.text.clone().filter(|t| !t.trim().is_empty())?)
    };

    let (sender_id, sender_name) = msg
        .from
        .as_ref()
        .map_or((msg.chat.id, String::new()), |u| (u.id, u.first_name.clone()));

    Some(InboundMessage {
        message_id: msg.message_id,
        chat_id: msg.chat.id,
        sender_id,
        sender_name,
        payload,
    })
}
