//! Message routing.

use tracing::{debug, error, info};

use crate::domain::{Capability, IncomingMessage, MessageHandle};
use crate::notices;

use super::admin::AdminCommand;
use super::{Bot, BotSettings};

/// What to do with an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// /start or /help
    Help,
    /// Hand the message to intake
    Submit {
        capability: Capability,
        /// Take the media from the replied-to message
        is_reply: bool,
    },
    Admin(AdminCommand),
    /// Private message the bot can't act on
    InvalidDirect,
    Ignore,
}

/// Decide how to handle a message.
///
/// Commands are matched first, in a fixed order, so a configured command
/// name shadows a built-in one it collides with. Anything else falls through
/// to the media check.
pub fn route(settings: &BotSettings, message: &IncomingMessage) -> Route {
    if let Some(command) = message.command() {
        if command == "start" || command == "help" {
            return Route::Help;
        }
        if command == settings.command_transcribe {
            return Route::Submit {
                capability: Capability::Transcribe,
                is_reply: true,
            };
        }
        if command == settings.command_diarize {
            return Route::Submit {
                capability: Capability::Diarize,
                is_reply: true,
            };
        }
        if let Some(admin) = AdminCommand::from_command(command) {
            return Route::Admin(admin);
        }
    }

    if message.media.is_some() {
        if message.is_private() || settings.instant_reply_in_groups {
            return Route::Submit {
                capability: Capability::Transcribe,
                is_reply: false,
            };
        }
        return Route::Ignore;
    }

    if message.is_private() {
        Route::InvalidDirect
    } else {
        Route::Ignore
    }
}

impl Bot {
    /// Handle one incoming message
    pub async fn handle(&self, message: IncomingMessage) {
        let user_id = message.from.id;
        let chat_id = message.chat_id();
        let username = message.from.name().to_string();

        match route(&self.settings, &message) {
            Route::Help => {
                info!(user_id, chat_id, %username, "Used help command");
                self.reply(&message.handle, &self.settings.summary).await;
            }
            Route::Submit {
                capability,
                is_reply,
            } => {
                let outcome = self.intake.submit(&message, is_reply, capability).await;
                debug!(user_id, chat_id, ?outcome, "Submission handled");
            }
            Route::Admin(command) => self.handle_admin(command, &message).await,
            Route::InvalidDirect => {
                info!(
                    user_id,
                    chat_id,
                    %username,
                    message_id = message.handle.message_id,
                    "Sent invalid message"
                );
                self.reply(&message.handle, notices::INVALID_DIRECT).await;
            }
            Route::Ignore => {}
        }
    }

    pub(super) async fn reply(&self, to: &MessageHandle, text: &str) {
        if let Err(e) = self.messenger.reply(to, text).await {
            error!(
                chat_id = to.chat_id,
                message_id = to.message_id,
                error = %e,
                "Could not send reply"
            );
        }
    }
}
