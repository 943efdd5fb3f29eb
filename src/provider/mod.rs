//! AI provider boundary
//!
//! The pipeline talks to the provider only through [`AiProvider`], so tests
//! can swap in a fake and the OpenAI client stays replaceable.

mod openai;

use std::path::Path;

use async_trait::async_trait;

pub use openai::{DEFAULT_BASE_URL, OpenAiConfig, OpenAiProvider};

use crate::Result;

/// Provider-side conversation: an assistant definition plus a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Assistant (model + behavior) identifier
    pub assistant_id: String,
    /// Thread (ordered message history) identifier
    pub thread_id: String,
}

/// One submitted conversational turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Thread the turn was submitted to
    pub thread_id: String,
    /// Provider's job identifier
    pub job_id: String,
}

/// Status of a submitted turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Still queued or running
    Pending,
    /// Finished; carries the latest reply text
    Completed(String),
    /// Terminal failure reported by the provider
    Failed(String),
}

/// Remote AI operations consumed by the pipeline
///
/// Implementations make exactly one attempt per call; retries, backoff and
/// timeouts belong to [`crate::adapter::RemoteCalls`].
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Transcribe the audio file at `audio` to text
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the request fails
    async fn transcribe(&self, audio: &Path) -> Result<String>;

    /// Create a conversation session
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn create_session(&self) -> Result<SessionHandle>;

    /// Submit `text` as a new user turn and start a job answering it
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn submit_turn(&self, session: &SessionHandle, text: &str) -> Result<JobHandle>;

    /// Check the status of a submitted job
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn poll_job(&self, job: &JobHandle) -> Result<JobStatus>;

    /// Ask the provider to stop a job nobody is waiting on anymore
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the job already finished
    async fn cancel_job(&self, job: &JobHandle) -> Result<()>;

    /// Synthesize `text` to encoded audio
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
