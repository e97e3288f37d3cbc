//! Admin-only commands.
//!
//! Every command is gated by `admin_ids`, matched against either the chat
//! or the sender. Non-admins are logged and get no reply.

use std::path::Path;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::adapters::DocumentSource;
use crate::core::split_message;
use crate::domain::{IncomingMessage, MessageHandle};
use crate::notices;

use super::Bot;

/// Largest N accepted by `/logs N`
pub const MAX_LOG_LINES: usize = 100;

/// Pause between messages of an admin broadcast
const BROADCAST_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// `/logs N`: last N lines of the log file
    Logs,
    /// `/logsfile`: the whole log file as a document
    LogsFile,
    /// `/file <file_id>`: re-send a stored file
    File,
    /// `/broadcast id1,id2 message`
    Broadcast,
    /// `/adminbroadcast message`: message every other admin
    AdminBroadcast,
}

impl AdminCommand {
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            "logs" => Some(Self::Logs),
            "logsfile" => Some(Self::LogsFile),
            "file" => Some(Self::File),
            "broadcast" => Some(Self::Broadcast),
            "adminbroadcast" => Some(Self::AdminBroadcast),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logs => "logs",
            Self::LogsFile => "logsfile",
            Self::File => "file",
            Self::Broadcast => "broadcast",
            Self::AdminBroadcast => "adminbroadcast",
        }
    }
}

/// Parse the N of `/logs N`
pub fn parse_log_count(args: Option<&str>) -> Result<usize, &'static str> {
    let arg = args.ok_or(notices::LOGS_INVALID_FORMAT)?;
    let n: i64 = arg.trim().parse().map_err(|_| notices::LOGS_INVALID_N)?;
    if n < 1 || n > MAX_LOG_LINES as i64 {
        return Err(notices::LOGS_INVALID_N_VALUE);
    }
    Ok(n as usize)
}

/// Parse `id1,id2 message` into target ids and the text
pub fn parse_broadcast(args: Option<&str>) -> Result<(Vec<i64>, &str), &'static str> {
    let (ids, text) = args
        .and_then(|a| a.split_once(' '))
        .ok_or(notices::BROADCAST_INVALID_FORMAT)?;
    let text = text.trim();
    if ids.is_empty() || text.is_empty() {
        return Err(notices::BROADCAST_INVALID_FORMAT);
    }

    let ids = ids
        .split(',')
        .map(|id| id.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| notices::BROADCAST_INVALID_IDS)?;
    Ok((ids, text))
}

/// Admins other than the ones taking part in this chat
pub fn other_admins(admin_ids: &[i64], chat_id: i64, user_id: i64) -> Vec<i64> {
    admin_ids
        .iter()
        .copied()
        .filter(|id| *id != chat_id && *id != user_id)
        .collect()
}

/// The last `n` lines of a text file
pub async fn last_lines(path: &Path, n: usize) -> std::io::Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].iter().map(|l| l.to_string()).collect())
}

impl Bot {
    pub(super) async fn handle_admin(&self, command: AdminCommand, message: &IncomingMessage) {
        let user_id = message.from.id;
        let chat_id = message.chat_id();
        let username = message.from.name();

        if !self.settings.is_admin(chat_id, user_id) {
            info!(
                user_id,
                chat_id,
                username,
                command = command.as_str(),
                "Non-admin tried an admin command"
            );
            return;
        }

        let result = match command {
            AdminCommand::Logs => self.send_logs(message).await,
            AdminCommand::LogsFile => self.send_logs_file(message).await,
            AdminCommand::File => self.send_file(message).await,
            AdminCommand::Broadcast => self.broadcast(message).await,
            AdminCommand::AdminBroadcast => self.admin_broadcast(message).await,
        };

        match result {
            Ok(()) => info!(
                user_id,
                chat_id,
                username,
                command = command.as_str(),
                "Admin command done"
            ),
            Err(notice) => {
                info!(
                    user_id,
                    chat_id,
                    username,
                    command = command.as_str(),
                    reason = notice,
                    "Admin command rejected"
                );
                self.reply(&message.handle, notice).await;
            }
        }
    }

    async fn send_logs(&self, message: &IncomingMessage) -> Result<(), &'static str> {
        let path = self
            .settings
            .log_file
            .as_deref()
            .ok_or(notices::LOGS_NOT_SAVING)?;
        let n = parse_log_count(message.command_args())?;

        let lines = match last_lines(path, n).await {
            Ok(lines) if !lines.is_empty() => lines,
            Ok(_) => return Err(notices::LOGS_GET_ERROR),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Could not read log file");
                return Err(notices::LOGS_GET_ERROR);
            }
        };

        self.reply_chunked(&message.handle, &lines.join("\n")).await;
        Ok(())
    }

    async fn send_logs_file(&self, message: &IncomingMessage) -> Result<(), &'static str> {
        let path = self
            .settings
            .log_file
            .clone()
            .ok_or(notices::LOGS_NOT_SAVING)?;

        self.messenger
            .send_document(&message.handle, DocumentSource::Path(path))
            .await
            .map(|_| ())
            .map_err(|e| {
                error!(error = %format!("{:#}", e), "Could not send log file");
                notices::LOGS_SEND_ERROR
            })
    }

    async fn send_file(&self, message: &IncomingMessage) -> Result<(), &'static str> {
        let file_id = message.command_args().ok_or(notices::FILE_INVALID_FORMAT)?;

        self.messenger
            .send_document(&message.handle, DocumentSource::FileId(file_id.to_string()))
            .await
            .map(|_| ())
            .map_err(|e| {
                error!(file = file_id, error = %format!("{:#}", e), "Could not send file");
                notices::FILE_SEND_ERROR
            })
    }

    async fn broadcast(&self, message: &IncomingMessage) -> Result<(), &'static str> {
        let (ids, text) = parse_broadcast(message.command_args())?;
        info!(targets = ids.len(), text, "Broadcasting");

        let mut failed = Vec::new();
        for id in &ids {
            if let Err(e) = self.messenger.send(*id, text).await {
                warn!(target_chat = id, error = %e, "Broadcast message not delivered");
                failed.push(*id);
            }
        }

        let summary = notices::broadcast_result(&failed, ids.len(), "users and chats");
        self.reply(&message.handle, &summary).await;
        Ok(())
    }

    /// Message every other admin. As a bare reply, forwards the replied-to
    /// message instead.
    async fn admin_broadcast(&self, message: &IncomingMessage) -> Result<(), &'static str> {
        if self.settings.admin_ids.len() < 2 {
            return Err(notices::ADMIN_BROADCAST_ONE_ADMIN);
        }

        let text = message.command_args();
        let forwarded = message.reply_to.as_deref().map(|m| m.handle);
        if text.is_none() && forwarded.is_none() {
            return Err(notices::ADMIN_BROADCAST_INVALID_FORMAT);
        }

        let targets = other_admins(&self.settings.admin_ids, message.chat_id(), message.from.id);
        if targets.is_empty() {
            return Err(notices::ADMIN_BROADCAST_UNIMPORTANT);
        }
        info!(targets = targets.len(), text = text.unwrap_or(""), "Admin broadcasting");

        let mut failed = Vec::new();
        for (i, admin) in targets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(BROADCAST_PAUSE).await;
            }
            let sent = match (text, forwarded) {
                (Some(text), _) => self.messenger.send(*admin, text).await,
                (None, Some(original)) => self.messenger.forward(&original, *admin).await,
                (None, None) => continue,
            };
            if let Err(e) = sent {
                warn!(admin, error = %e, "Admin broadcast not delivered");
                failed.push(*admin);
            }
        }

        let summary = notices::broadcast_result(&failed, targets.len(), "admins and chat admins");
        self.reply(&message.handle, &summary).await;
        Ok(())
    }

    /// Reply with `text`, split into a chain of replies if it's too long
    async fn reply_chunked(&self, to: &MessageHandle, text: &str) {
        let mut previous = *to;
        for chunk in split_message(text, self.settings.max_message_length) {
            match self.messenger.reply(&previous, chunk).await {
                Ok(sent) => previous = sent,
                Err(e) => {
                    error!(error = %e, "Could not send long message");
                    self.reply(&previous, notices::LONG_MESSAGE_SEND_ERROR).await;
                    return;
                }
            }
        }
    }
}
