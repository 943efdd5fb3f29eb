//! Conversation session
//!
//! Holds the provider-side conversation that turns are sent to. In
//! [`SessionMode::Shared`] one thread lives for the whole process, so every
//! message sees the earlier turns. In [`SessionMode::PerMessage`] each
//! question opens a fresh thread.

use crate::Result;
use crate::adapter::RemoteCalls;
use crate::config::SessionMode;
use crate::provider::SessionHandle;

/// The conversation the pipeline talks to
#[derive(Debug, Clone)]
pub struct Conversation {
    mode: SessionMode,
    session: SessionHandle,
    turns: u64,
}

impl Conversation {
    /// Open the initial session
    ///
    /// Called once at startup; a failure here is fatal for the process.
    ///
    /// # Errors
    ///
    /// Returns `Error::RemoteOperationFailed` if no session could be created
    pub async fn start(calls: &RemoteCalls, mode: SessionMode) -> Result<Self> {
        let session = calls.open_session().await?;
        tracing::info!(
            assistant_id = %session.assistant_id,
            thread_id = %session.thread_id,
            %mode,
            "conversation session opened"
        );

        Ok(Self {
            mode,
            session,
            turns: 0,
        })
    }

    /// Wrap an existing session
    #[must_use]
    pub const fn from_handle(session: SessionHandle, mode: SessionMode) -> Self {
        Self {
            mode,
            session,
            turns: 0,
        }
    }

    /// Ask `text` and return the assistant's latest reply
    ///
    /// # Errors
    ///
    /// Returns error if a per-message session cannot be opened or the turn
    /// fails after every retry
    pub async fn ask(&mut self, calls: &RemoteCalls, text: &str) -> Result<String> {
        if self.mode == SessionMode::PerMessage && self.turns > 0 {
            self.session = calls.open_session().await?;
            tracing::debug!(thread_id = %self.session.thread_id, "fresh thread for message");
        }

        let reply = calls.complete_turn(&self.session, text).await?;
        self.turns += 1;
        Ok(reply)
    }

    /// Current provider session
    #[must_use]
    pub const fn handle(&self) -> &SessionHandle {
        &self.session
    }

    /// Session mode in effect
    #[must_use]
    pub const fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Number of turns answered so far
    #[must_use]
    pub const fn turns(&self) -> u64 {
        self.turns
    }
}
