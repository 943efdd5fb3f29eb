//! Units of work flowing through the pipeline

use std::fmt;

use crate::gateway::{InboundMessage, MessageRef, Payload};

/// Reply sent when a voice message cannot be downloaded or transcribed
pub const VOICE_FAILURE_REPLY: &str =
    "Sorry, an error occurred while processing your voice message.";

/// Reply sent when the assistant, synthesis or voice reply fails
pub const GENERIC_FAILURE_REPLY: &str = "Sorry, an error occurred while processing your message.";

/// One inbound message waiting to be answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Message to answer (unique within the chat)
    pub message_id: i64,
    /// Chat the reply is threaded into
    pub chat_id: i64,
    /// Raw text or a not yet downloaded voice file
    pub payload: Payload,
}

impl Task {
    /// Reference used to thread replies under the original message
    #[must_use]
    pub const fn reference(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }

    /// Payload kind for logging
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self.payload {
            Payload::Text(_) => "text",
            Payload::Voice(_) => "voice",
        }
    }
}

impl From<InboundMessage> for Task {
    fn from(msg: InboundMessage) -> Self {
        Self {
            message_id: msg.message_id,
            chat_id: msg.chat_id,
            payload: msg.payload,
        }
    }
}

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Built from an inbound event
    Received,
    /// Waiting in the queue
    Queued,
    /// Being executed by the worker
    InProgress,
    /// Reply delivered
    Completed,
    /// Failed; an apology was sent (or attempted)
    FailedReported,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::FailedReported => "failed_reported",
        };
        f.write_str(name)
    }
}

/// Step of task execution that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Transcribe,
    Converse,
    Synthesize,
    Reply,
}

impl Stage {
    /// Apology sent to the user when this stage fails
    #[must_use]
    pub const fn failure_reply(self) -> &'static str {
        match self {
            Self::Download | Self::Transcribe => VOICE_FAILURE_REPLY,
            Self::Converse | Self::Synthesize | Self::Reply => GENERIC_FAILURE_REPLY,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Transcribe => "transcribe",
            Self::Converse => "converse",
            Self::Synthesize => "synthesize",
            Self::Reply => "reply",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Voice reply delivered
    Completed,
    /// `stage` failed and `reply` was sent as an apology
    FailedReported {
        stage: Stage,
        reply: &'static str,
    },
}

impl TaskOutcome {
    /// Terminal state this outcome puts the task in
    #[must_use]
    pub const fn state(&self) -> TaskState {
        match self {
            Self::Completed => TaskState::Completed,
            Self::FailedReported { .. } => TaskState::FailedReported,
        }
    }
}

/// Tally of a worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Tasks answered with a voice reply
    pub completed: u64,
    /// Tasks that ended with an apology
    pub failed: u64,
    /// Tasks left in the queue at shutdown and never executed
    pub discarded: u64,
}

impl PipelineReport {
    pub(crate) fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::FailedReported { .. } => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::VoiceRef;

    #[test]
    fn voice_stages_use_voice_apology() {
        assert_eq!(Stage::Download.failure_reply(), VOICE_FAILURE_REPLY);
        assert_eq!(Stage::Transcribe.failure_reply(), VOICE_FAILURE_REPLY);
        assert_eq!(Stage::Converse.failure_reply(), GENERIC_FAILURE_REPLY);
        assert_eq!(Stage::Synthesize.failure_reply(), GENERIC_FAILURE_REPLY);
        assert_eq!(Stage::Reply.failure_reply(), GENERIC_FAILURE_REPLY);
    }

    #[test]
    fn task_from_inbound_message() {
        let msg = InboundMessage {
            message_id: 3,
            chat_id: 9,
            sender_id: 1,
            sender_name: "Ada".to_string(),
            payload: Payload::Voice(VoiceRef {
                file_id: "f".to_string(),
                mime_type: "audio/ogg".to_string(),
                duration: None,
            }),
        };
        let task = Task::from(msg);
        assert_eq!(task.kind(), "voice");
        assert_eq!(
            task.reference(),
            MessageRef {
                chat_id: 9,
                message_id: 3
            }
        );
    }

    #[test]
    fn report_counts_outcomes() {
        let mut report = PipelineReport::default();
        report.record(&TaskOutcome::Completed);
        report.record(&TaskOutcome::FailedReported {
            stage: Stage::Converse,
            reply: GENERIC_FAILURE_REPLY,
        });
        report.record(&TaskOutcome::Completed);
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(TaskOutcome::Completed.state(), TaskState::Completed);
    }
}
