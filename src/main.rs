use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use voxrelay::gateway::ChatGateway;
use voxrelay::{
    Bindings, Config, Conversation, OpenAiProvider, Pipeline, PipelineContext, RemoteCalls,
    TelegramGateway, TransientFiles,
};

/// Capacity of the gateway to bindings channel
const INBOUND_BUFFER: usize = 100;

/// Voxrelay - answers Telegram messages with AI-generated voice notes
#[derive(Parser)]
#[command(name = "voxrelay", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot (default)
    Run,
    /// Validate the Telegram token and the OpenAI key
    Check,
    /// Transcribe an audio file and print the text
    Transcribe {
        /// Audio file (OGG/Opus, MP3, WAV, ...)
        file: PathBuf,
    },
    /// Synthesize speech for a text into an OGG/Opus file
    Speak {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
        /// Output file
        #[arg(short, long, default_value = "speech.ogg")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voxrelay=info",
        1 => "info,voxrelay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => serve(config).await,
        Command::Check => check(&config).await,
        Command::Transcribe { file } => transcribe(&config, &file).await,
        Command::Speak { text, out } => speak(&config, &text, &out).await,
    }
}

fn remote_calls(config: &Config) -> anyhow::Result<(Arc<OpenAiProvider>, RemoteCalls)> {
    let provider = Arc::new(OpenAiProvider::new(config.openai())?);
    let calls = RemoteCalls::new(provider.clone(), config.retry.clone(), config.timings.clone());
    Ok((provider, calls))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        session_mode = %config.session_mode,
        work_dir = %config.work_dir.display(),
        "starting voxrelay"
    );

    let (_, calls) = remote_calls(&config)?;

    let gateway = Arc::new(TelegramGateway::new(
        config.telegram.token.clone(),
        config.telegram.poll_timeout,
    ));
    let bot = gateway.get_me().await?;
    tracing::info!(bot_id = bot.id, username = ?bot.username, "Telegram bot connected");

    // Without a session nothing can be answered
    let conversation = Conversation::start(&calls, config.session_mode).await?;
    let files = TransientFiles::new(&config.work_dir)?;

    let chat: Arc<dyn ChatGateway> = gateway.clone();
    let ctx = PipelineContext::new(chat, calls, conversation, files)
        .with_download_timeout(config.download_timeout)
        .with_drain_on_shutdown(config.drain_on_shutdown);
    let (handle, worker) = Pipeline::new(ctx);

    let shutdown = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

    let poller = gateway.start_polling(inbound_tx, shutdown.clone());
    let bindings = tokio::spawn(Bindings::new(handle).run(inbound_rx, shutdown.clone()));
    let worker = tokio::spawn(worker.run(shutdown.clone()));

    tracing::info!("voxrelay running, press Ctrl+C to stop");
    let signal = shutdown_signal()?.await?;
    tracing::info!(signal, "shutdown requested");
    shutdown.cancel();

    // The worker finishes its current message before returning
    let report = worker.await?;
    if let Err(e) = poller.await {
        tracing::warn!(error = %e, "polling task ended abnormally");
    }
    if let Err(e) = bindings.await {
        tracing::warn!(error = %e, "bindings task ended abnormally");
    }

    tracing::info!(
        completed = report.completed,
        failed = report.failed,
        discarded = report.discarded,
        "voxrelay stopped"
    );
    Ok(())
}

/// Listen for Ctrl+C, or SIGTERM on unix
///
/// Handlers are installed before this returns; the future resolves to the
/// name of the signal received.
fn shutdown_signal() -> std::io::Result<impl Future<Output = std::io::Result<&'static str>>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        Ok(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
                _ = terminate.recv() => Ok("SIGTERM"),
            }
        })
    }

    #[cfg(not(unix))]
    {
        Ok(async { tokio::signal::ctrl_c().await.map(|()| "ctrl_c") })
    }
}

async fn check(config: &Config) -> anyhow::Result<()> {
    let gateway = TelegramGateway::new(config.telegram.token.clone(), config.telegram.poll_timeout);
    let bot = gateway.get_me().await?;
    println!(
        "Telegram: ok (@{})",
        bot.username.as_deref().unwrap_or("unknown")
    );

    let (provider, _) = remote_calls(config)?;
    provider.check().await?;
    println!("OpenAI: ok ({})", config.openai_base_url);

    Ok(())
}

async fn transcribe(config: &Config, file: &std::path::Path) -> anyhow::Result<()> {
    let (_, calls) = remote_calls(config)?;
    let text = calls.transcribe(file).await?;
    println!("{text}");
    Ok(())
}

async fn speak(config: &Config, text: &str, out: &std::path::Path) -> anyhow::Result<()> {
    let (_, calls) = remote_calls(config)?;

    println!("Synthesizing with voice '{}'...", config.voice.tts_voice);
    let audio = calls.synthesize(text).await?;
    tokio::fs::write(out, &audio).await?;
    println!("Wrote {} bytes to {}", audio.len(), out.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_requests_shutdown() {
        let waiting = shutdown_signal().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let signal = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("SIGTERM was not observed")
            .unwrap();
        assert_eq!(signal, "SIGTERM");
    }
}
