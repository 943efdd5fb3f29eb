//! Voxrelay - voice relay between Telegram and an AI assistant
//!
//! Every text or voice message sent to the bot is answered with a
//! synthesized voice note:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  Telegram (polling)                   │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ InboundMessage
//! ┌──────────────────────────▼───────────────────────────┐
//! │   Bindings ─▶ FIFO queue ─▶ Worker (one at a time)    │
//! │        download · transcribe · ask · synthesize       │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ RemoteCalls (retry + timeout)
//! ┌──────────────────────────▼───────────────────────────┐
//! │       OpenAI: Whisper · Assistants v2 · Speech        │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod adapter;
pub mod bindings;
pub mod config;
pub mod error;
pub mod files;
pub mod gateway;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod session;

pub use adapter::{CallTimings, RemoteCalls};
pub use bindings::Bindings;
pub use config::{Config, SessionMode};
pub use error::{Error, Result};
pub use files::TransientFiles;
pub use gateway::{ChatGateway, InboundMessage, TelegramGateway};
pub use pipeline::{Pipeline, PipelineContext, PipelineHandle, PipelineReport, Task, Worker};
pub use provider::{AiProvider, OpenAiProvider};
pub use retry::RetryPolicy;
pub use session::Conversation;
