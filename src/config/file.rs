//! TOML configuration file loading
//!
//! Supports `~/.config/voxrelay/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Telegram settings
    #[serde(default)]
    pub telegram: TelegramFileConfig,

    /// `OpenAI` settings
    #[serde(default)]
    pub openai: OpenAiFileConfig,

    /// Assistant definition
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Speech models
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Retry and timeout settings
    #[serde(default)]
    pub calls: CallsFileConfig,

    /// Pipeline settings
    #[serde(default)]
    pub pipeline: PipelineFileConfig,
}

/// Telegram configuration
#[derive(Debug, Default, Deserialize)]
pub struct TelegramFileConfig {
    /// Bot token
    pub token: Option<String>,
    /// Long-poll timeout in seconds for `getUpdates`
    pub poll_timeout: Option<u64>,
}

/// `OpenAI` configuration
#[derive(Debug, Default, Deserialize)]
pub struct OpenAiFileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Assistant definition
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    pub name: Option<String>,
    pub model: Option<String>,
    pub instructions: Option<String>,
    /// `shared` or `per_message`
    pub session_mode: Option<String>,
}

/// Speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,
    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,
    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,
    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

/// Retry and timeout configuration
#[derive(Debug, Default, Deserialize)]
pub struct CallsFileConfig {
    pub retry_attempts: Option<u32>,
    pub retry_initial_ms: Option<u64>,
    pub retry_max_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub request_timeout: Option<u64>,
    pub turn_timeout: Option<u64>,
    pub download_timeout: Option<u64>,
}

/// Pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Directory for transient audio files
    pub work_dir: Option<String>,
    /// Process queued tasks before exiting
    pub drain_on_shutdown: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voxrelay/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voxrelay").join("config.toml"))
}
