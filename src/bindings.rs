//! Glue between gateway events and the pipeline

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::gateway::{InboundMessage, Payload};
use crate::pipeline::{PipelineHandle, Task, TaskState};
use crate::{Error, Result};

/// Turns inbound messages into queued tasks
#[derive(Debug, Clone)]
pub struct Bindings {
    handle: PipelineHandle,
}

impl Bindings {
    #[must_use]
    pub const fn new(handle: PipelineHandle) -> Self {
        Self { handle }
    }

    /// Queue a text message
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `msg` carries no text, or
    /// `Error::PipelineClosed` after shutdown began
    pub fn on_text_message(&self, msg: InboundMessage) -> Result<()> {
        if !matches!(msg.payload, Payload::Text(_)) {
            return Err(Error::InvalidInput(format!(
                "message {} is not a text message",
                msg.message_id
            )));
        }
        self.enqueue(msg)
    }

    /// Queue a voice message
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `msg` carries no voice note, or
    /// `Error::PipelineClosed` after shutdown began
    pub fn on_voice_message(&self, msg: InboundMessage) -> Result<()> {
        if !matches!(msg.payload, Payload::Voice(_)) {
            return Err(Error::InvalidInput(format!(
                "message {} is not a voice message",
                msg.message_id
            )));
        }
        self.enqueue(msg)
    }

    /// Route `msg` by payload kind
    ///
    /// # Errors
    ///
    /// Returns `Error::PipelineClosed` after shutdown began
    pub fn dispatch(&self, msg: InboundMessage) -> Result<()> {
        match msg.payload {
            Payload::Text(_) => self.on_text_message(msg),
            Payload::Voice(_) => self.on_voice_message(msg),
        }
    }

    /// Pump inbound messages into the pipeline until the stream ends,
    /// `shutdown` is cancelled, or the pipeline closes
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>, shutdown: CancellationToken) {
        loop {
            let msg = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                msg = inbound.recv() => {
                    let Some(msg) = msg else {
                        break; // Gateway stopped
                    };
                    msg
                }
            };

            let message_id = msg.message_id;
            match self.dispatch(msg) {
                Ok(()) => {}
                Err(Error::PipelineClosed) => {
                    tracing::info!(message_id, "pipeline closed, dropping message");
                    break;
                }
                Err(e) => tracing::warn!(message_id, error = %e, "failed to queue message"),
            }
        }

        tracing::debug!("bindings stopped");
    }

    fn enqueue(&self, msg: InboundMessage) -> Result<()> {
        tracing::debug!(
            message_id = msg.message_id,
            sender_id = msg.sender_id,
            sender = %msg.sender_name,
            state = %TaskState::Received,
            "message received"
        );
        self.handle.submit(Task::from(msg))
    }
}
