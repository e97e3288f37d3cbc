//! Platform-neutral view of chat messages.
//!
//! The messaging adapter converts its wire types into these so the core
//! never depends on a particular transport.

use serde::{Deserialize, Serialize};

/// Opaque reference to a message that can be replied to or edited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

impl MessageHandle {
    pub fn new(chat_id: i64, message_id: i64) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// The user who sent a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    pub id: i64,
    pub username: Option<String>,
}

impl Submitter {
    /// Username for log lines (empty when the user has none)
    pub fn name(&self) -> &str {
        self.username.as_deref().unwrap_or("")
    }
}

/// Kind of chat a message arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

/// What sort of media a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Voice,
    Audio,
    VideoNote,
    Video,
}

/// A media attachment as announced by the platform (not yet downloaded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub file_id: String,
    /// Size reported with the message, if any
    pub file_size: Option<u64>,
    /// Duration in seconds, if the platform reports one
    pub duration: Option<u32>,
}

/// An incoming chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub handle: MessageHandle,
    pub chat_kind: ChatKind,
    pub from: Submitter,
    pub text: Option<String>,
    pub media: Option<MediaAttachment>,
    pub reply_to: Option<Box<IncomingMessage>>,
}

impl IncomingMessage {
    pub fn chat_id(&self) -> i64 {
        self.handle.chat_id
    }

    pub fn is_private(&self) -> bool {
        self.chat_kind == ChatKind::Private
    }

    /// Parse a leading `/command` (with an optional `@botname` suffix) from the text
    pub fn command(&self) -> Option<&str> {
        let text = self.text.as_deref()?;
        let word = text.strip_prefix('/')?.split_whitespace().next()?;
        Some(word.split('@').next().unwrap_or(word))
    }

    /// Text after `/command `, or `None` if there are no arguments
    pub fn command_args(&self) -> Option<&str> {
        let text = self.text.as_deref()?;
        let (_, rest) = text.split_once(' ')?;
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}
