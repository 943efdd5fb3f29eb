//! Resilient wrappers around the AI provider's operations
//!
//! [`RemoteCalls`] is the only place the pipeline reaches the provider.
//! Each operation validates its input, then runs under the shared
//! [`RetryPolicy`] with a per-attempt timeout.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::provider::{AiProvider, JobHandle, JobStatus, SessionHandle};
use crate::retry::{RetryPolicy, with_retry};
use crate::{Error, Result};

/// Timing knobs for remote calls
#[derive(Debug, Clone)]
pub struct CallTimings {
    /// Per-attempt budget for transcription and synthesis
    pub request_timeout: Duration,
    /// Per-attempt budget for one submit + poll cycle
    pub turn_timeout: Duration,
    /// Interval between job status polls
    pub poll_interval: Duration,
}

impl Default for CallTimings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            turn_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Retrying front for an [`AiProvider`]
#[derive(Clone)]
pub struct RemoteCalls {
    provider: Arc<dyn AiProvider>,
    policy: RetryPolicy,
    timings: CallTimings,
}

impl RemoteCalls {
    /// Wrap `provider` with the given retry policy and timings
    #[must_use]
    pub fn new(provider: Arc<dyn AiProvider>, policy: RetryPolicy, timings: CallTimings) -> Self {
        Self {
            provider,
            policy,
            timings,
        }
    }

    /// Retry policy shared by every operation
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Per-attempt timeouts and poll interval
    #[must_use]
    pub const fn timings(&self) -> &CallTimings {
        &self.timings
    }

    /// Create a provider session
    ///
    /// # Errors
    ///
    /// Returns `Error::RemoteOperationFailed` when every attempt fails
    pub async fn open_session(&self) -> Result<SessionHandle> {
        let provider = &self.provider;
        tracing::debug!(provider = provider.name(), "opening session");
        with_retry(&self.policy, "create_session", self.timings.request_timeout, |_| {
            provider.create_session()
        })
        .await
    }

    /// Transcribe the audio file at `audio`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the file is not readable, or
    /// `Error::RemoteOperationFailed` when every attempt fails
    pub async fn transcribe(&self, audio: &Path) -> Result<String> {
        let meta = tokio::fs::metadata(audio).await.map_err(|e| {
            Error::InvalidInput(format!("audio file {} not readable: {e}", audio.display()))
        })?;
        if !meta.is_file() {
            return Err(Error::InvalidInput(format!(
                "audio path {} is not a file",
                audio.display()
            )));
        }

        let provider = &self.provider;
        with_retry(&self.policy, "transcribe", self.timings.request_timeout, |_| {
            provider.transcribe(audio)
        })
        .await
    }

    /// Submit `text` as a turn on `session` and wait for the reply
    ///
    /// One attempt submits the turn and polls its job every
    /// `poll_interval`. A job the provider marks as failed ends the attempt
    /// at once; the outer retry loop decides whether to submit again. A
    /// failed poll is retried against the same job. A job left running by an
    /// abandoned attempt is cancelled before the turn is submitted again, so
    /// the thread never carries two live runs.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for empty text, or
    /// `Error::RemoteOperationFailed` when every attempt fails
    pub async fn complete_turn(&self, session: &SessionHandle, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("turn text is empty".to_string()));
        }
        if session.thread_id.is_empty() {
            return Err(Error::InvalidInput("session has no thread".to_string()));
        }

        let active = Mutex::new(None);
        let result = with_retry(&self.policy, "complete_turn", self.timings.turn_timeout, |_| {
            self.run_turn(session, text, &active)
        })
        .await;

        let leftover = active.lock().await.take();
        if let Some(job) = leftover {
            self.cancel_abandoned(&job).await;
        }
        result
    }

    async fn run_turn(
        &self,
        session: &SessionHandle,
        text: &str,
        active: &Mutex<Option<JobHandle>>,
    ) -> Result<String> {
        let stale = active.lock().await.take();
        if let Some(job) = stale {
            self.cancel_abandoned(&job).await;
        }

        let job = self.provider.submit_turn(session, text).await?;
        *active.lock().await = Some(job.clone());

        let max_poll_errors = self.policy.max_attempts.max(1);
        let mut poll_errors = 0;
        loop {
            match self.provider.poll_job(&job).await {
                Ok(JobStatus::Completed(reply)) => {
                    active.lock().await.take();
                    return Ok(reply);
                }
                Ok(JobStatus::Failed(reason)) => {
                    active.lock().await.take();
                    return Err(Error::JobFailed(reason));
                }
                Ok(JobStatus::Pending) => poll_errors = 0,
                Err(e) => {
                    poll_errors += 1;
                    if poll_errors >= max_poll_errors {
                        return Err(e);
                    }
                    tracing::warn!(job_id = %job.job_id, error = %e, "job poll failed, polling again");
                }
            }
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }

    /// Best-effort cancel of a job no attempt is waiting on anymore
    async fn cancel_abandoned(&self, job: &JobHandle) {
        let after = self.timings.request_timeout;
        let cancelled = tokio::time::timeout(after, self.provider.cancel_job(job))
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout {
                    operation: "cancel_job",
                    after,
                })
            });

        match cancelled {
            Ok(()) => tracing::info!(job_id = %job.job_id, "cancelled abandoned job"),
            Err(e) => tracing::warn!(job_id = %job.job_id, error = %e, "failed to cancel abandoned job"),
        }
    }

    /// Synthesize speech for `text`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for empty text, or
    /// `Error::RemoteOperationFailed` when every attempt fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("nothing to synthesize".to_string()));
        }

        let provider = &self.provider;
        with_retry(&self.policy, "synthesize", self.timings.request_timeout, |_| {
            provider.synthesize(text)
        })
        .await
    }
}
