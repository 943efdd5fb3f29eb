//! Shared test utilities: scripted chat gateway and AI provider fakes

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use voxrelay::gateway::{ChatAction, ChatGateway, InboundMessage, MessageRef, Payload, VoiceRef};
use voxrelay::provider::{AiProvider, JobHandle, JobStatus, SessionHandle};
use voxrelay::{
    CallTimings, Conversation, Error, PipelineContext, RemoteCalls, RetryPolicy, SessionMode,
    TransientFiles,
};

/// Something the gateway was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Action(i64),
    Download(i64),
    Text(i64, String),
    Voice(i64, Vec<u8>),
}

impl GatewayEvent {
    pub const fn message_id(&self) -> i64 {
        match self {
            Self::Action(id) | Self::Download(id) | Self::Text(id, _) | Self::Voice(id, _) => *id,
        }
    }
}

/// Chat gateway recording every call
#[derive(Default)]
pub struct FakeGateway {
    events: Mutex<Vec<GatewayEvent>>,
    /// Downloads that fail before one succeeds
    pub download_failures: AtomicU32,
    /// Message ids whose voice reply upload fails
    pub failing_voice_replies: Mutex<HashSet<i64>>,
    /// Message ids whose voice reply upload never returns
    pub hanging_voice_replies: Mutex<HashSet<i64>>,
}

impl FakeGateway {
    pub fn events(&self) -> Vec<GatewayEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, GatewayEvent::Download(_)))
            .count()
    }

    pub fn text_replies(&self) -> Vec<(i64, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                GatewayEvent::Text(id, text) => Some((id, text)),
                _ => None,
            })
            .collect()
    }

    pub fn voice_replies(&self) -> Vec<(i64, Vec<u8>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                GatewayEvent::Voice(id, audio) => Some((id, audio)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: GatewayEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ChatGateway for FakeGateway {
    async fn download_file(&self, file_id: &str, dest: &Path, _timeout: Duration) -> voxrelay::Result<()> {
        let message_id = message_id_of(dest);
        self.push(GatewayEvent::Download(message_id));

        let remaining = self.download_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.download_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Channel("connection reset".to_string()));
        }

        tokio::fs::write(dest, format!("audio:{file_id}")).await?;
        Ok(())
    }

    async fn reply_text(&self, original: MessageRef, text: &str) -> voxrelay::Result<()> {
        self.push(GatewayEvent::Text(original.message_id, text.to_string()));
        Ok(())
    }

    async fn reply_voice(&self, original: MessageRef, audio: &Path) -> voxrelay::Result<()> {
        if self
            .failing_voice_replies
            .lock()
            .unwrap()
            .contains(&original.message_id)
        {
            return Err(Error::Channel("Telegram sendVoice error: 500".to_string()));
        }
        let hangs = self
            .hanging_voice_replies
            .lock()
            .unwrap()
            .contains(&original.message_id);
        if hangs {
            std::future::pending::<()>().await;
        }

        let bytes = tokio::fs::read(audio).await?;
        self.push(GatewayEvent::Voice(original.message_id, bytes));
        Ok(())
    }

    async fn send_action(&self, original: MessageRef, action: ChatAction) -> voxrelay::Result<()> {
        assert_eq!(action, ChatAction::RecordVoice);
        self.push(GatewayEvent::Action(original.message_id));
        Ok(())
    }
}

/// Pull the message id back out of `voice_<id>.ogg`
fn message_id_of(path: &Path) -> i64 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('_').next())
        .and_then(|id| id.parse().ok())
        .unwrap_or(-1)
}

/// AI provider with scripted failures and call counters
#[derive(Default)]
pub struct FakeProvider {
    pub transcribes: AtomicU32,
    pub submits: AtomicU32,
    pub polls: AtomicU32,
    pub synths: AtomicU32,
    /// Job ids cancelled after their attempt was abandoned
    pub cancelled: Mutex<Vec<String>>,
    /// Texts submitted as turns, in order
    pub turns: Mutex<Vec<String>>,
    /// Voice file ids whose transcription fails
    pub failing_transcripts: Mutex<HashSet<String>>,
    /// Every job reports failure
    pub fail_jobs: std::sync::atomic::AtomicBool,
    /// Polls answered `Pending` before each job completes
    pub pending_polls: u32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl FakeProvider {
    pub fn with_pending_polls(pending_polls: u32) -> Self {
        Self {
            pending_polls,
            ..Self::default()
        }
    }

    pub fn turns(&self) -> Vec<String> {
        self.turns.lock().unwrap().clone()
    }

    /// Highest number of provider calls ever running at once
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn busy(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AiProvider for FakeProvider {
    async fn transcribe(&self, audio: &Path) -> voxrelay::Result<String> {
        self.transcribes.fetch_add(1, Ordering::SeqCst);
        self.busy().await;

        let content = tokio::fs::read_to_string(audio).await?;
        let file_id = content.trim_start_matches("audio:").to_string();
        if self.failing_transcripts.lock().unwrap().contains(&file_id) {
            return Err(Error::Remote("whisper: 500 Internal Server Error".to_string()));
        }
        Ok(format!("spoken {file_id}"))
    }

    async fn create_session(&self) -> voxrelay::Result<SessionHandle> {
        Ok(session())
    }

    async fn submit_turn(&self, session: &SessionHandle, text: &str) -> voxrelay::Result<JobHandle> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.busy().await;
        self.turns.lock().unwrap().push(text.to_string());
        Ok(JobHandle {
            thread_id: session.thread_id.clone(),
            job_id: text.to_string(),
        })
    }

    async fn poll_job(&self, job: &JobHandle) -> voxrelay::Result<JobStatus> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        self.busy().await;

        if self.fail_jobs.load(Ordering::SeqCst) {
            return Ok(JobStatus::Failed("server_error".to_string()));
        }
        if self.pending_polls > 0 && n % (self.pending_polls + 1) < self.pending_polls {
            return Ok(JobStatus::Pending);
        }
        Ok(JobStatus::Completed(format!("reply to {}", job.job_id)))
    }

    async fn cancel_job(&self, job: &JobHandle) -> voxrelay::Result<()> {
        self.cancelled.lock().unwrap().push(job.job_id.clone());
        Ok(())
    }

    async fn synthesize(&self, text: &str) -> voxrelay::Result<Vec<u8>> {
        self.synths.fetch_add(1, Ordering::SeqCst);
        self.busy().await;
        Ok(format!("speech:{text}").into_bytes())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

pub fn session() -> SessionHandle {
    SessionHandle {
        assistant_id: "asst_test".to_string(),
        thread_id: "thread_test".to_string(),
    }
}

/// Policy used by pipeline tests: 3 attempts, 100ms then 200ms
pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
    }
}

/// Fakes plus a scratch directory for the file store
pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub provider: Arc<FakeProvider>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_provider(FakeProvider::default())
    }

    pub fn with_provider(provider: FakeProvider) -> Self {
        Self {
            gateway: Arc::new(FakeGateway::default()),
            provider: Arc::new(provider),
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn calls(&self) -> RemoteCalls {
        RemoteCalls::new(self.provider.clone(), test_policy(), CallTimings::default())
    }

    pub fn context(&self) -> PipelineContext {
        let files = TransientFiles::new(self.dir.path().join("audio")).expect("failed to create store");
        PipelineContext::new(
            self.gateway.clone(),
            self.calls(),
            Conversation::from_handle(session(), SessionMode::Shared),
            files,
        )
    }

    /// Files left in the store directory
    pub fn leftover_files(&self) -> Vec<String> {
        std::fs::read_dir(self.dir.path().join("audio"))
            .map(|entries| {
                entries
                    .filter_map(std::result::Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn text_message(message_id: i64, text: &str) -> InboundMessage {
    InboundMessage {
        message_id,
        chat_id: 42,
        sender_id: 7,
        sender_name: "Ada".to_string(),
        payload: Payload::Text(text.to_string()),
    }
}

pub fn voice_message(message_id: i64, file_id: &str) -> InboundMessage {
    InboundMessage {
        message_id,
        chat_id: 42,
        sender_id: 7,
        sender_name: "Ada".to_string(),
        payload: Payload::Voice(VoiceRef {
            file_id: file_id.to_string(),
            mime_type: "audio/ogg".to_string(),
            duration: Some(2),
        }),
    }
}
