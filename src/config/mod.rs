//! Configuration management for voxrelay
//!
//! Values resolve in order: environment variable, TOML file, default.

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::adapter::CallTimings;
use crate::gateway::telegram::DEFAULT_POLL_TIMEOUT;
use crate::provider::{DEFAULT_BASE_URL, OpenAiConfig};
use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// voxrelay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot settings
    pub telegram: TelegramConfig,

    /// `OpenAI` API key
    pub openai_api_key: SecretString,

    /// `OpenAI` API base URL
    pub openai_base_url: String,

    /// Assistant definition
    pub assistant: AssistantConfig,

    /// Speech models and voice
    pub voice: VoiceConfig,

    /// Whether all messages share one conversation thread
    pub session_mode: SessionMode,

    /// Retry policy for remote calls and file downloads
    pub retry: RetryPolicy,

    /// Per-attempt timeouts and poll interval
    pub timings: CallTimings,

    /// Per-attempt timeout for downloading voice files
    pub download_timeout: Duration,

    /// Directory for transient audio files
    pub work_dir: PathBuf,

    /// Process queued tasks before exiting
    pub drain_on_shutdown: bool,
}

/// Telegram bot configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token
    pub token: SecretString,

    /// Long-poll timeout for `getUpdates`
    pub poll_timeout: Duration,
}

/// Assistant definition (model + behavior)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantConfig {
    /// Display name
    pub name: String,

    /// Chat model
    pub model: String,

    /// System instructions
    pub instructions: Option<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Assistant".to_string(),
            model: "gpt-4o".to_string(),
            instructions: None,
        }
    }
}

/// Speech processing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
        }
    }
}

/// How conversation context is kept between messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionMode {
    /// One thread for the whole process; every message sees earlier turns
    #[default]
    Shared,
    /// A fresh thread for every message
    PerMessage,
}

impl FromStr for SessionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "shared" => Ok(Self::Shared),
            "per_message" => Ok(Self::PerMessage),
            other => Err(Error::Config(format!(
                "unknown session mode {other:?} (expected \"shared\" or \"per_message\")"
            ))),
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::PerMessage => write!(f, "per_message"),
        }
    }
}

/// Default directory for transient audio: `~/.cache/voxrelay/audio` on Linux
fn default_work_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || std::env::temp_dir().join("voxrelay"),
        |d| d.cache_dir().join("voxrelay").join("audio"),
    )
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a required key is missing or a value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a required key is missing or a value is invalid
    pub fn from_sources(
        fc: file::ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let parsed = |key: &str| -> Result<Option<u64>> {
            env(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|e| Error::Config(format!("{key}={v:?}: {e}")))
                })
                .transpose()
        };

        let telegram_token = env("TELEGRAM_BOT_TOKEN")
            .or(fc.telegram.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config("TELEGRAM_BOT_TOKEN is required".to_string()))?;

        let openai_api_key = env("OPENAI_API_KEY")
            .or(fc.openai.api_key)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is required".to_string()))?;

        let openai_base_url = env("OPENAI_BASE_URL")
            .or(fc.openai.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let defaults = AssistantConfig::default();
        let assistant = AssistantConfig {
            name: env("VOXRELAY_ASSISTANT_NAME")
                .or(fc.assistant.name)
                .unwrap_or(defaults.name),
            model: env("VOXRELAY_MODEL")
                .or(fc.assistant.model)
                .unwrap_or(defaults.model),
            instructions: env("VOXRELAY_INSTRUCTIONS").or(fc.assistant.instructions),
        };

        let session_mode = env("VOXRELAY_SESSION_MODE")
            .or(fc.assistant.session_mode)
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or_default();

        let tts_speed = match env("VOXRELAY_TTS_SPEED") {
            Some(v) => v
                .trim()
                .parse::<f32>()
                .map_err(|e| Error::Config(format!("VOXRELAY_TTS_SPEED={v:?}: {e}")))?,
            None => fc.voice.tts_speed.unwrap_or(1.0),
        };
        if !(0.25..=4.0).contains(&tts_speed) {
            return Err(Error::Config(format!(
                "TTS speed {tts_speed} outside 0.25..=4.0"
            )));
        }

        let defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            stt_model: env("VOXRELAY_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or(defaults.stt_model),
            tts_model: env("VOXRELAY_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or(defaults.tts_model),
            tts_voice: env("VOXRELAY_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or(defaults.tts_voice),
            tts_speed,
        };

        let max_attempts = parsed("VOXRELAY_RETRY_ATTEMPTS")?
            .map(u32::try_from)
            .transpose()
            .map_err(|e| Error::Config(format!("VOXRELAY_RETRY_ATTEMPTS: {e}")))?
            .or(fc.calls.retry_attempts)
            .unwrap_or(3);
        if max_attempts == 0 {
            return Err(Error::Config("retry attempts must be at least 1".to_string()));
        }

        let calls = &fc.calls;
        let retry = RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(
                parsed("VOXRELAY_RETRY_INITIAL_MS")?
                    .or(calls.retry_initial_ms)
                    .unwrap_or(500),
            ),
            max_delay: Duration::from_millis(
                parsed("VOXRELAY_RETRY_MAX_MS")?
                    .or(calls.retry_max_ms)
                    .unwrap_or(30_000),
            ),
        };

        let timings = CallTimings {
            request_timeout: Duration::from_secs(
                parsed("VOXRELAY_REQUEST_TIMEOUT")?
                    .or(calls.request_timeout)
                    .unwrap_or(60),
            ),
            turn_timeout: Duration::from_secs(
                parsed("VOXRELAY_TURN_TIMEOUT")?
                    .or(calls.turn_timeout)
                    .unwrap_or(120),
            ),
            poll_interval: Duration::from_millis(
                parsed("VOXRELAY_POLL_INTERVAL_MS")?
                    .or(calls.poll_interval_ms)
                    .unwrap_or(500),
            ),
        };

        let download_timeout = Duration::from_secs(
            parsed("VOXRELAY_DOWNLOAD_TIMEOUT")?
                .or(calls.download_timeout)
                .unwrap_or(120),
        );

        for (name, value) in [
            ("request timeout", timings.request_timeout),
            ("turn timeout", timings.turn_timeout),
            ("poll interval", timings.poll_interval),
            ("download timeout", download_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }

        let telegram = TelegramConfig {
            token: SecretString::from(telegram_token),
            poll_timeout: parsed("VOXRELAY_TELEGRAM_POLL_TIMEOUT")?
                .or(fc.telegram.poll_timeout)
                .map_or(DEFAULT_POLL_TIMEOUT, Duration::from_secs),
        };

        let work_dir = env("VOXRELAY_WORK_DIR")
            .or(fc.pipeline.work_dir)
            .map_or_else(default_work_dir, PathBuf::from);

        let drain_on_shutdown = env("VOXRELAY_DRAIN_ON_SHUTDOWN")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .or(fc.pipeline.drain_on_shutdown)
            .unwrap_or(true);

        Ok(Self {
            telegram,
            openai_api_key: SecretString::from(openai_api_key),
            openai_base_url,
            assistant,
            voice,
            session_mode,
            retry,
            timings,
            download_timeout,
            work_dir,
            drain_on_shutdown,
        })
    }

    /// Settings for the `OpenAI` provider
    #[must_use]
    pub fn openai(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            assistant: self.assistant.clone(),
            voice: self.voice.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![("TELEGRAM_BOT_TOKEN", "123:abc"), ("OPENAI_API_KEY", "sk-test")]
    }

    #[test]
    fn defaults_match_reference_behavior() {
        let config = Config::from_sources(file::ConfigFile::default(), env_of(&required())).unwrap();

        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.timings.poll_interval, Duration::from_millis(500));
        assert_eq!(config.download_timeout, Duration::from_secs(120));
        assert_eq!(config.session_mode, SessionMode::Shared);
        assert_eq!(config.assistant.model, "gpt-4o");
        assert_eq!(config.voice.tts_voice, "alloy");
        assert_eq!(config.openai_base_url, DEFAULT_BASE_URL);
        assert!(config.drain_on_shutdown);
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = Config::from_sources(
            file::ConfigFile::default(),
            env_of(&[("OPENAI_API_KEY", "sk-test")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn env_overrides_file() {
        let fc: file::ConfigFile = toml::from_str(
            r#"
            [voice]
            tts_voice = "nova"
            [assistant]
            model = "gpt-4o-mini"
            session_mode = "per_message"
            "#,
        )
        .unwrap();

        let mut pairs = required();
        pairs.push(("VOXRELAY_TTS_VOICE", "echo"));
        let config = Config::from_sources(fc, env_of(&pairs)).unwrap();

        assert_eq!(config.voice.tts_voice, "echo");
        assert_eq!(config.assistant.model, "gpt-4o-mini");
        assert_eq!(config.session_mode, SessionMode::PerMessage);
    }

    #[test]
    fn rejects_bad_numbers() {
        let mut pairs = required();
        pairs.push(("VOXRELAY_RETRY_ATTEMPTS", "lots"));
        assert!(Config::from_sources(file::ConfigFile::default(), env_of(&pairs)).is_err());

        let mut pairs = required();
        pairs.push(("VOXRELAY_RETRY_ATTEMPTS", "0"));
        assert!(Config::from_sources(file::ConfigFile::default(), env_of(&pairs)).is_err());

        let mut pairs = required();
        pairs.push(("VOXRELAY_TTS_SPEED", "9"));
        assert!(Config::from_sources(file::ConfigFile::default(), env_of(&pairs)).is_err());
    }

    #[test]
    fn rejects_zero_timeouts() {
        for key in [
            "VOXRELAY_REQUEST_TIMEOUT",
            "VOXRELAY_TURN_TIMEOUT",
            "VOXRELAY_DOWNLOAD_TIMEOUT",
            "VOXRELAY_POLL_INTERVAL_MS",
        ] {
            let mut pairs = required();
            pairs.push((key, "0"));
            let err = Config::from_sources(file::ConfigFile::default(), env_of(&pairs)).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{key} = 0 was accepted");
        }

        let fc: file::ConfigFile = toml::from_str("[calls]\npoll_interval_ms = 0\n").unwrap();
        let err = Config::from_sources(fc, env_of(&required())).unwrap_err();
        assert!(err.to_string().contains("poll interval"));
    }

    #[test]
    fn draining_can_be_turned_off() {
        let mut pairs = required();
        pairs.push(("VOXRELAY_DRAIN_ON_SHUTDOWN", "false"));
        let config = Config::from_sources(file::ConfigFile::default(), env_of(&pairs)).unwrap();
        assert!(!config.drain_on_shutdown);
    }

    #[test]
    fn parses_session_modes() {
        assert_eq!("shared".parse::<SessionMode>().unwrap(), SessionMode::Shared);
        assert_eq!("Per-Message".parse::<SessionMode>().unwrap(), SessionMode::PerMessage);
        assert!("sticky".parse::<SessionMode>().is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = Config::from_sources(file::ConfigFile::default(), env_of(&required())).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-test"));
        assert!(!debug.contains("123:abc"));
    }
}
