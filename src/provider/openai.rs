//! `OpenAI` provider: Whisper transcription, Assistants threads/runs, speech

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::{AiProvider, JobHandle, JobStatus, SessionHandle};
use crate::config::{AssistantConfig, VoiceConfig};
use crate::{Error, Result};

/// Default `OpenAI` API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Settings for [`OpenAiProvider`]
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key
    pub api_key: SecretString,
    /// API base URL, without trailing slash
    pub base_url: String,
    /// Assistant definition used for every session
    pub assistant: AssistantConfig,
    /// Speech models and voice
    pub voice: VoiceConfig,
}

/// `OpenAI` implementation of [`AiProvider`]
///
/// The assistant is created lazily on the first session and reused for
/// every later one; each session gets its own thread.
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
    assistant_id: OnceCell<String>,
}

impl OpenAiProvider {
    /// Create a new `OpenAI` provider
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required".to_string()));
        }

        Ok(Self {
            client: Client::new(),
            config,
            assistant_id: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .bearer_auth(self.config.api_key.expose_secret())
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .bearer_auth(self.config.api_key.expose_secret())
    }

    /// Verify the API key by listing models
    ///
    /// # Errors
    ///
    /// Returns error if the key is rejected
    pub async fn check(&self) -> Result<()> {
        let response = self.get("models").send().await?;
        ensure_success(response, "models").await?;
        Ok(())
    }

    async fn assistant_id(&self) -> Result<&str> {
        let id = self
            .assistant_id
            .get_or_try_init(|| async {
                let assistant = &self.config.assistant;
                let request = CreateAssistantRequest {
                    name: &assistant.name,
                    model: &assistant.model,
                    instructions: assistant.instructions.as_deref(),
                };

                let response = self
                    .post("assistants")
                    .header("OpenAI-Beta", "assistants=v2")
                    .json(&request)
                    .send()
                    .await?;
                let created: IdObject = ensure_success(response, "create assistant")
                    .await?
                    .json()
                    .await?;

                tracing::info!(
                    assistant_id = %created.id,
                    model = %assistant.model,
                    "assistant created"
                );
                Ok::<_, Error>(created.id)
            })
            .await?;

        Ok(id.as_str())
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    async fn transcribe(&self, audio: &Path) -> Result<String> {
        let data = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map_or_else(|| "audio.ogg".to_string(), |n| n.to_string_lossy().into_owned());
        tracing::debug!(audio_bytes = data.len(), file = %file_name, "starting Whisper transcription");

        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str("audio/ogg")
            .map_err(|e| Error::Remote(format!("invalid MIME type: {e}")))?;

        let form = Form::new()
            .text("model", self.config.voice.stt_model.clone())
            .part("file", part);

        let response = self.post("audio/transcriptions").multipart(form).send().await?;
        let result: TranscriptionResponse = ensure_success(response, "transcription")
            .await?
            .json()
            .await?;

        tracing::info!(chars = result.text.len(), "transcription complete");
        Ok(result.text)
    }

    async fn create_session(&self) -> Result<SessionHandle> {
        let assistant_id = self.assistant_id().await?.to_string();

        let response = self
            .post("threads")
            .header("OpenAI-Beta", "assistants=v2")
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let thread: IdObject = ensure_success(response, "create thread").await?.json().await?;

        tracing::debug!(thread_id = %thread.id, "thread created");
        Ok(SessionHandle {
            assistant_id,
            thread_id: thread.id,
        })
    }

    async fn submit_turn(&self, session: &SessionHandle, text: &str) -> Result<JobHandle> {
        let thread_id = &session.thread_id;

        let message = CreateMessageRequest {
            role: "user",
            content: text,
        };
        let response = self
            .post(&format!("threads/{thread_id}/messages"))
            .header("OpenAI-Beta", "assistants=v2")
            .json(&message)
            .send()
            .await?;
        ensure_success(response, "create message").await?;

        let run = CreateRunRequest {
            assistant_id: &session.assistant_id,
        };
        let response = self
            .post(&format!("threads/{thread_id}/runs"))
            .header("OpenAI-Beta", "assistants=v2")
            .json(&run)
            .send()
            .await?;
        let run: IdObject = ensure_success(response, "create run").await?.json().await?;

        tracing::debug!(thread_id = %thread_id, run_id = %run.id, "run submitted");
        Ok(JobHandle {
            thread_id: thread_id.clone(),
            job_id: run.id,
        })
    }

    async fn poll_job(&self, job: &JobHandle) -> Result<JobStatus> {
        let response = self
            .get(&format!("threads/{}/runs/{}", job.thread_id, job.job_id))
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await?;
        let run: RunObject = ensure_success(response, "retrieve run").await?.json().await?;

        match run_state(&run.status) {
            RunState::Pending => Ok(JobStatus::Pending),
            RunState::Failed => {
                let reason = run
                    .last_error
                    .map_or_else(|| run.status.clone(), |e| format!("{}: {}", e.code, e.message));
                tracing::error!(run_id = %job.job_id, %reason, "run failed");
                Ok(JobStatus::Failed(reason))
            }
            RunState::Completed => {
                let response = self
                    .get(&format!("threads/{}/messages", job.thread_id))
                    .query(&[("order", "desc"), ("limit", "1")])
                    .header("OpenAI-Beta", "assistants=v2")
                    .send()
                    .await?;
                let messages: MessageList =
                    ensure_success(response, "list messages").await?.json().await?;

                let reply = latest_reply_text(&messages)
                    .ok_or_else(|| Error::Remote("completed run produced no text reply".to_string()))?;
                Ok(JobStatus::Completed(reply))
            }
        }
    }

    async fn cancel_job(&self, job: &JobHandle) -> Result<()> {
        let response = self
            .post(&format!("threads/{}/runs/{}/cancel", job.thread_id, job.job_id))
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await?;
        ensure_success(response, "cancel run").await?;
        tracing::debug!(run_id = %job.job_id, "run cancel requested");
        Ok(())
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let voice = &self.config.voice;
        let request = SpeechRequest {
            model: &voice.tts_model,
            input: text,
            voice: &voice.tts_voice,
            speed: voice.tts_speed,
            response_format: "opus",
        };

        let response = self.post("audio/speech").json(&request).send().await?;
        let audio = ensure_success(response, "speech").await?.bytes().await?;

        tracing::debug!(audio_bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Turn a non-2xx response into `Error::Remote` with the body attached
async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Remote(format!("OpenAI {what} error {status}: {body}")))
}

/// Coarse run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Pending,
    Completed,
    Failed,
}

/// Map an Assistants run status onto the pipeline's view of a job
fn run_state(status: &str) -> RunState {
    match status {
        "completed" => RunState::Completed,
        "failed" | "cancelled" | "expired" | "incomplete" => RunState::Failed,
        // queued, in_progress, requires_action, cancelling
        _ => RunState::Pending,
    }
}

fn latest_reply_text(messages: &MessageList) -> Option<String> {
    messages.data.first()?.content.iter().find_map(|part| match part {
        MessageContent::Text { text } => Some(text.value.clone()),
        MessageContent::Other => None,
    })
}

#[derive(Serialize)]
struct CreateAssistantRequest<'a> {
    name: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Deserialize)]
struct RunObject {
    status: String,
    last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct RunError {
    code: String,
    message: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextValue {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: &str) -> OpenAiConfig {
        OpenAiConfig {
            api_key: SecretString::from(key.to_string()),
            base_url: format!("{DEFAULT_BASE_URL}/"),
            assistant: AssistantConfig::default(),
            voice: VoiceConfig::default(),
        }
    }

    #[test]
    fn rejects_empty_key() {
        assert!(matches!(OpenAiProvider::new(config("")), Err(Error::Config(_))));
    }

    #[test]
    fn joins_urls_without_double_slash() {
        let provider = OpenAiProvider::new(config("sk-test")).unwrap();
        assert_eq!(provider.url("audio/speech"), "https://api.openai.com/v1/audio/speech");
    }

    #[test]
    fn maps_run_statuses() {
        assert_eq!(run_state("queued"), RunState::Pending);
        assert_eq!(run_state("in_progress"), RunState::Pending);
        assert_eq!(run_state("requires_action"), RunState::Pending);
        assert_eq!(run_state("completed"), RunState::Completed);
        assert_eq!(run_state("failed"), RunState::Failed);
        assert_eq!(run_state("expired"), RunState::Failed);
        assert_eq!(run_state("cancelled"), RunState::Failed);
    }

    #[test]
    fn extracts_latest_text_reply() {
        let body = r#"{
            "object": "list",
            "data": [{
                "id": "msg_2",
                "role": "assistant",
                "content": [
                    {"type": "image_file", "image_file": {"file_id": "file_1"}},
                    {"type": "text", "text": {"value": "Hi there!", "annotations": []}}
                ]
            }, {
                "id": "msg_1",
                "role": "user",
                "content": [{"type": "text", "text": {"value": "Hello", "annotations": []}}]
            }]
        }"#;
        let list: MessageList = serde_json::from_str(body).unwrap();
        assert_eq!(latest_reply_text(&list).as_deref(), Some("Hi there!"));
    }

    #[test]
    fn empty_message_list_has_no_reply() {
        let list: MessageList = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert_eq!(latest_reply_text(&list), None);
    }

    #[test]
    fn parses_failed_run() {
        let body = r#"{"id":"run_1","status":"failed","last_error":{"code":"server_error","message":"boom"}}"#;
        let run: RunObject = serde_json::from_str(body).unwrap();
        assert_eq!(run_state(&run.status), RunState::Failed);
        assert_eq!(run.last_error.unwrap().code, "server_error");
    }
}
