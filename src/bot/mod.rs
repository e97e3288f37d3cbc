//! Chat-facing bot: update polling and command routing.
//!
//! ```text
//! getUpdates ─▶ Bot::handle ─▶ route ─┬─▶ help / usage hint
//!                                     ├─▶ JobIntake::submit
//!                                     └─▶ admin commands
//! ```
//!
//! Each update is handled on its own task so a slow download never holds up
//! polling.

pub mod admin;
pub mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::adapters::{Messenger, TelegramClient};
use crate::config::ResolvedConfig;
use crate::core::JobIntake;

pub use admin::AdminCommand;
pub use handlers::{route, Route};

/// Long-poll timeout passed to `getUpdates`
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed poll before trying again
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Bot-level settings, resolved once at startup
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub command_transcribe: String,
    pub command_diarize: String,
    pub instant_reply_in_groups: bool,
    pub admin_ids: Vec<i64>,
    pub log_file: Option<PathBuf>,
    pub max_message_length: usize,
    /// Text sent for /start and /help
    pub summary: String,
}

impl BotSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            command_transcribe: config.command_transcribe.clone(),
            command_diarize: config.command_diarize.clone(),
            instant_reply_in_groups: config.instant_reply_in_groups,
            admin_ids: config.admin_ids.clone(),
            log_file: config.log_file.clone(),
            max_message_length: config.max_message_length,
            summary: settings_summary(config),
        }
    }

    pub fn is_admin(&self, chat_id: i64, user_id: i64) -> bool {
        self.admin_ids.contains(&chat_id) || self.admin_ids.contains(&user_id)
    }
}

/// Human-readable summary of the limits a user runs into
pub fn settings_summary(config: &ResolvedConfig) -> String {
    fn or_unlimited(value: u64, unit: &str) -> String {
        if value == 0 {
            "unlimited".to_string()
        } else {
            format!("{}{}", value, unit)
        }
    }

    let max_file_size = if config.media.max_file_size == 0 {
        "unlimited".to_string()
    } else {
        format!(
            "{:.1} MB",
            config.media.max_file_size as f64 / (1024.0 * 1024.0)
        )
    };

    format!(
        "Transcribe command: /{}\n\
         Diarize command: /{}\n\
         \n\
         Max file size: {}\n\
         Max duration: {}\n\
         \n\
         Instant reply in groups: {}\n\
         Max simultaneous requests: {}\n\
         User requests rate limit: {}\n\
         User requests rate time: {}\n\
         {}\n\
         Send a voice, audio, video message or reply to it using commands!",
        config.command_transcribe,
        config.command_diarize,
        max_file_size,
        or_unlimited(config.media.max_duration_seconds.into(), " seconds"),
        if config.instant_reply_in_groups {
            "enabled"
        } else {
            "disabled"
        },
        or_unlimited(config.max_simultaneous_requests as u64, ""),
        or_unlimited(config.user_rate_limit as u64, ""),
        or_unlimited(config.user_request_time.as_secs(), " seconds"),
        "-".repeat(30),
    )
}

pub struct Bot {
    messenger: Arc<dyn Messenger>,
    intake: Arc<JobIntake>,
    settings: BotSettings,
}

impl Bot {
    pub fn new(messenger: Arc<dyn Messenger>, intake: Arc<JobIntake>, settings: BotSettings) -> Self {
        Self {
            messenger,
            intake,
            settings,
        }
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// Poll for updates until `shutdown` fires
    pub async fn run_polling(
        self: Arc<Self>,
        client: Arc<TelegramClient>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut offset = 0;
        info!("Polling for updates");

        loop {
            let updates = tokio::select! {
                updates = client.get_updates(offset, POLL_TIMEOUT) => updates,
                _ = &mut shutdown => {
                    info!("Stopping update polling");
                    break;
                }
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(e) => {
                    error!(error = %format!("{:#}", e), "Polling failed");
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    debug!(update_id = update.update_id, "Skipping update without message");
                    continue;
                };

                let bot = Arc::clone(&self);
                tokio::spawn(async move {
                    bot.handle(message.into()).await;
                });
            }
        }
    }
}
