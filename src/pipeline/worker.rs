//! Background worker that executes tasks serially

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::PipelineContext;
use super::task::{PipelineReport, Stage, Task, TaskOutcome, TaskState};
use crate::gateway::{ChatAction, Payload, VoiceRef};
use crate::retry::with_retry;
use crate::{Error, Result};

/// A failed step and the error behind it
struct Failure {
    stage: Stage,
    error: Error,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, Failure>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, Failure> {
        self.map_err(|error| Failure { stage, error })
    }
}

/// Run a chat platform call under `after`, turning an elapsed deadline into
/// `Error::Timeout`
async fn bounded<T>(
    operation: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, call)
        .await
        .unwrap_or_else(|_| Err(Error::Timeout { operation, after }))
}

/// Single consumer of the task queue
pub struct Worker {
    rx: mpsc::UnboundedReceiver<Task>,
    ctx: PipelineContext,
}

impl Worker {
    pub(super) const fn new(rx: mpsc::UnboundedReceiver<Task>, ctx: PipelineContext) -> Self {
        Self { rx, ctx }
    }

    /// Run the worker loop until `shutdown` is cancelled or every handle is
    /// dropped
    ///
    /// Cancellation is observed between tasks only; the task in progress
    /// always runs to completion. Tasks still queued at that point are
    /// executed unless draining was turned off, in which case they are
    /// discarded. Every
    /// tracked file is removed before returning.
    pub async fn run(mut self, shutdown: CancellationToken) -> PipelineReport {
        let mut report = PipelineReport::default();
        tracing::info!("pipeline worker started");

        loop {
            let task = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                task = self.rx.recv() => {
                    let Some(task) = task else {
                        break; // All handles dropped
                    };
                    task
                }
            };

            let outcome = self.ctx.execute(task).await;
            report.record(&outcome);
        }

        // Refuse new submissions, then settle what is already queued
        self.rx.close();
        while let Ok(task) = self.rx.try_recv() {
            if self.ctx.drain_on_shutdown {
                let outcome = self.ctx.execute(task).await;
                report.record(&outcome);
            } else {
                tracing::debug!(message_id = task.message_id, "discarding queued task");
                report.discarded += 1;
            }
        }
        if report.discarded > 0 {
            tracing::warn!(count = report.discarded, "discarded queued tasks at shutdown");
        }

        self.ctx.files.cleanup_all().await;

        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            discarded = report.discarded,
            "pipeline worker stopped"
        );
        report
    }
}

impl PipelineContext {
    /// Execute one task to completion
    pub(super) async fn execute(&mut self, task: Task) -> TaskOutcome {
        let original = task.reference();
        tracing::info!(
            message_id = task.message_id,
            chat_id = task.chat_id,
            kind = task.kind(),
            state = %TaskState::InProgress,
            "processing message"
        );

        let reply_timeout = self.calls.timings().request_timeout;

        if let Err(e) = bounded(
            "send_action",
            reply_timeout,
            self.gateway.send_action(original, ChatAction::RecordVoice),
        )
        .await
        {
            tracing::debug!(error = %e, "failed to send chat action");
        }

        let result = self.process(&task).await;

        // Intermediate files are not needed past this point
        for path in self.scratch_paths(task.message_id) {
            if self.files.is_tracked(&path) {
                self.files.release(&path).await;
            }
        }

        let outcome = match result {
            Ok(()) => TaskOutcome::Completed,
            Err(Failure { stage, error }) => {
                if error.is_job_failure() {
                    tracing::error!(message_id = task.message_id, %stage, error = %error, "assistant job failed");
                } else {
                    tracing::error!(message_id = task.message_id, %stage, error = %error, "message processing failed");
                }

                let reply = stage.failure_reply();
                let sent = bounded(
                    "reply_text",
                    reply_timeout,
                    self.gateway.reply_text(original, reply),
                )
                .await;
                if let Err(e) = sent {
                    tracing::error!(message_id = task.message_id, error = %e, "failed to send failure reply");
                }
                TaskOutcome::FailedReported { stage, reply }
            }
        };

        tracing::info!(message_id = task.message_id, state = %outcome.state(), "message finished");
        outcome
    }

    async fn process(&mut self, task: &Task) -> std::result::Result<(), Failure> {
        let text = match &task.payload {
            Payload::Text(text) => text.clone(),
            Payload::Voice(voice) => self.transcribe_voice(task.message_id, voice).await?,
        };

        let reply = self
            .conversation
            .ask(&self.calls, &text)
            .await
            .at(Stage::Converse)?;
        tracing::debug!(message_id = task.message_id, chars = reply.len(), "assistant replied");

        let audio = self.calls.synthesize(&reply).await.at(Stage::Synthesize)?;
        let speech = self.files.speech_output_path(task.message_id);
        self.files
            .write(&speech, &audio)
            .await
            .at(Stage::Synthesize)?;

        bounded(
            "reply_voice",
            self.calls.timings().request_timeout,
            self.gateway.reply_voice(task.reference(), &speech),
        )
        .await
        .at(Stage::Reply)
    }

    async fn transcribe_voice(
        &mut self,
        message_id: i64,
        voice: &VoiceRef,
    ) -> std::result::Result<String, Failure> {
        let dest = self.files.voice_input_path(message_id);
        self.files.register(dest.clone());

        let gateway = &self.gateway;
        let timeout = self.download_timeout;
        with_retry(self.calls.policy(), "download", timeout, |_| {
            gateway.download_file(&voice.file_id, &dest, timeout)
        })
        .await
        .at(Stage::Download)?;

        let text = self.calls.transcribe(&dest).await.at(Stage::Transcribe)?;
        tracing::debug!(message_id, chars = text.len(), "voice transcribed");
        Ok(text)
    }

    fn scratch_paths(&self, message_id: i64) -> [PathBuf; 2] {
        [
            self.files.voice_input_path(message_id),
            self.files.speech_output_path(message_id),
        ]
    }
}
