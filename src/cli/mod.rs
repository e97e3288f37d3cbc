//! Command-line interface for whisper-relay.
//!
//! Provides commands for running the bot, inspecting the resolved
//! configuration, and calling a backend once from the shell.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::adapters::{Messenger, PredictRequest, TelegramClient};
use crate::bot::{Bot, BotSettings};
use crate::config::{BackendEndpoint, ResolvedConfig};
use crate::core::{Dispatcher, JobIntake, QueueSet};
use crate::domain::Capability;
use crate::ingest::MediaFetcher;

/// whisper-relay - Telegram front end for hosted speech recognition
#[derive(Parser, Debug)]
#[command(name = "whisper-relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to .whisper-relay/config.yaml discovery)
    #[arg(long, global = true, env = "WHISPER_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bot until Ctrl+C
    Serve,

    /// Show the resolved configuration (secrets masked)
    Config,

    /// Send one local file to a backend and print the text
    Predict {
        /// Audio or video file
        file: PathBuf,

        /// Use the diarize backend instead of transcribe
        #[arg(long)]
        diarize: bool,
    },
}

impl Cli {
    pub async fn execute(self, config: ResolvedConfig) -> Result<()> {
        match self.command {
            Commands::Serve => serve(config).await,
            Commands::Config => {
                show_config(&config);
                Ok(())
            }
            Commands::Predict { file, diarize } => {
                let capability = if diarize {
                    Capability::Diarize
                } else {
                    Capability::Transcribe
                };
                predict(&config, &file, capability).await
            }
        }
    }
}

async fn serve(config: ResolvedConfig) -> Result<()> {
    let telegram = config
        .telegram_config()
        .context("TELEGRAM_BOT_TOKEN not set (env or telegram.bot_token in config)")?;
    let client = Arc::new(TelegramClient::from_config(telegram));
    let messenger: Arc<dyn Messenger> = client.clone();

    let backends = config.backends();
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&messenger),
        backends.clone(),
        config.dispatch_settings(),
    ));
    let (queues, workers) = QueueSet::start(dispatcher);

    let fetcher = MediaFetcher::new(
        Arc::clone(&messenger),
        config.media.clone(),
        config.command_transcribe.clone(),
        config.command_diarize.clone(),
    );
    let intake = Arc::new(JobIntake::new(
        Arc::clone(&messenger),
        fetcher,
        queues,
        backends,
        config.intake_limits(),
    ));
    let bot = Arc::new(Bot::new(messenger, intake, BotSettings::from_config(&config)));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        let _ = stop_tx.send(());
    });

    info!("App started");
    bot.run_polling(client, stop_rx).await;

    for worker in workers {
        worker.abort();
    }
    info!("App stopped");
    Ok(())
}

async fn predict(config: &ResolvedConfig, file: &Path, capability: Capability) -> Result<()> {
    let backend = config
        .backends()
        .get(capability)
        .with_context(|| format!("No {} backend configured", capability))?;

    let payload = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let payload_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    eprintln!("Sending {} ({} bytes) to {}", payload_name, payload.len(), backend.name());

    let text = backend
        .predict(PredictRequest {
            capability,
            payload_name,
            payload_base64: STANDARD.encode(&payload),
            diarize: capability == Capability::Diarize,
        })
        .await?;

    if text.trim().is_empty() {
        warn!("Backend returned no text");
    }
    println!("{}", text);
    Ok(())
}

/// Hide all but the last four characters of a secret
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

fn describe_backend(endpoint: &Option<BackendEndpoint>) -> String {
    match endpoint {
        None => "not set".to_string(),
        Some(e) => format!(
            "{} (token: {})",
            e.api_url,
            e.hf_token.as_deref().map(mask).unwrap_or_else(|| "none".to_string())
        ),
    }
}

fn show_config(config: &ResolvedConfig) {
    fn limit(value: u64) -> String {
        if value == 0 {
            "unlimited".to_string()
        } else {
            value.to_string()
        }
    }

    println!();
    println!("whisper-relay configuration");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!(
        "Config file:        {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none (env and defaults)".to_string())
    );
    println!(
        "Bot token:          {}",
        config.bot_token.as_deref().map(mask).unwrap_or_else(|| "not set".to_string())
    );
    println!();
    println!("Backends:");
    println!("  Transcribe:       {}", describe_backend(&config.transcribe_backend));
    println!("  Diarize:          {}", describe_backend(&config.diarize_backend));
    println!(
        "  Timeout:          {}",
        config
            .backend_timeout
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| "none".to_string())
    );
    println!();
    println!("Limits:");
    println!("  Simultaneous:     {}", limit(config.max_simultaneous_requests as u64));
    println!(
        "  Per user:         {} per {}s",
        limit(config.user_rate_limit as u64),
        config.user_request_time.as_secs()
    );
    println!("  Message length:   {}", config.max_message_length);
    println!("  Ordering unit:    {}ms", config.ordering_unit_delay.as_millis());
    println!("  File size:        {} bytes", limit(config.media.max_file_size));
    println!("  Duration:         {}s", limit(config.media.max_duration_seconds.into()));
    println!("  Extensions:       {}", config.media.supported_extensions.join(", "));
    println!();
    println!("Bot:");
    println!(
        "  Commands:         /{} /{}",
        config.command_transcribe, config.command_diarize
    );
    println!("  Group replies:    {}", config.instant_reply_in_groups);
    println!("  Admins:           {}", config.admin_ids.len());
    println!(
        "  Log file:         {}",
        config
            .log_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask("123456:ABCDEF"), "****CDEF");
        assert_eq!(mask("abc"), "****");
    }

    #[test]
    fn test_parse_predict() {
        let cli = Cli::parse_from(["whisper-relay", "predict", "memo.ogg", "--diarize"]);
        match cli.command {
            Commands::Predict { file, diarize } => {
                assert_eq!(file, PathBuf::from("memo.ogg"));
                assert!(diarize);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
