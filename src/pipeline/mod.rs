//! Message pipeline
//!
//! Inbound messages become [`Task`]s and are queued in arrival order. A
//! single [`Worker`] executes them one at a time:
//!
//! ```text
//! bindings ──submit──▶ [ FIFO queue ] ──▶ worker
//!                                          │ download + transcribe (voice)
//!                                          │ ask the conversation
//!                                          │ synthesize speech
//!                                          └ reply with voice note
//! ```
//!
//! Every failure produces one apology reply and the worker moves on to the
//! next task.

mod task;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

pub use task::{
    GENERIC_FAILURE_REPLY, PipelineReport, Stage, Task, TaskOutcome, TaskState,
    VOICE_FAILURE_REPLY,
};
pub use worker::Worker;

use crate::adapter::RemoteCalls;
use crate::files::TransientFiles;
use crate::gateway::ChatGateway;
use crate::session::Conversation;
use crate::{Error, Result};

/// Default per-attempt budget for downloading a voice file
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything the worker needs to execute tasks
///
/// Moved into the [`Worker`]; nothing here is shared with other tasks.
pub struct PipelineContext {
    gateway: Arc<dyn ChatGateway>,
    calls: RemoteCalls,
    conversation: Conversation,
    files: TransientFiles,
    download_timeout: Duration,
    drain_on_shutdown: bool,
}

impl PipelineContext {
    /// Assemble a context with the default download timeout that drains the
    /// queue at shutdown
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        calls: RemoteCalls,
        conversation: Conversation,
        files: TransientFiles,
    ) -> Self {
        Self {
            gateway,
            calls,
            conversation,
            files,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            drain_on_shutdown: true,
        }
    }

    /// Per-attempt timeout for voice downloads
    #[must_use]
    pub const fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Whether queued tasks are executed at shutdown; `false` discards them
    #[must_use]
    pub const fn with_drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }
}

/// Sending side of the task queue
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<Task>,
}

impl PipelineHandle {
    /// Queue `task` behind every task submitted before it
    ///
    /// Never blocks.
    ///
    /// # Errors
    ///
    /// Returns `Error::PipelineClosed` once the worker has begun shutting down
    pub fn submit(&self, task: Task) -> Result<()> {
        let message_id = task.message_id;
        self.tx.send(task).map_err(|_| Error::PipelineClosed)?;
        tracing::debug!(message_id, state = %TaskState::Queued, "task queued");
        Ok(())
    }

    /// Whether the worker stopped accepting tasks
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Constructor for the queue and its worker
pub struct Pipeline;

impl Pipeline {
    /// Create the queue, returning the submit handle and the worker that
    /// drains it
    #[must_use]
    pub fn new(ctx: PipelineContext) -> (PipelineHandle, Worker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PipelineHandle { tx }, Worker::new(rx, ctx))
    }
}
