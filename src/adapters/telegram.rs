//! Telegram Bot API adapter.
//!
//! Implements [`Messenger`] over the HTTP Bot API and exposes long polling
//! for incoming updates.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::{
    ChatKind, IncomingMessage, MediaAttachment, MediaKind, MessageHandle, Submitter,
};

use super::{DocumentSource, Messenger, RemoteFile};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API client
pub struct TelegramClient {
    /// Bot token
    bot_token: String,
    /// API root (overridable for local Bot API servers)
    api_base: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Configuration for Telegram client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Response envelope from Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileResult {
    file_path: Option<String>,
    file_size: Option<u64>,
}

/// An update from `getUpdates`
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMedia {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub duration: Option<u32>,
}

/// Message object as sent by the Bot API (only the fields the relay reads)
#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: TgChat,
    #[serde(default)]
    pub from: Option<TgUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<TgMedia>,
    #[serde(default)]
    pub audio: Option<TgMedia>,
    #[serde(default)]
    pub video_note: Option<TgMedia>,
    #[serde(default)]
    pub video: Option<TgMedia>,
    #[serde(default)]
    pub reply_to_message: Option<Box<TgMessage>>,
}

impl TgMessage {
    fn handle(&self) -> MessageHandle {
        MessageHandle::new(self.chat.id, self.message_id)
    }

    fn media(&self) -> Option<MediaAttachment> {
        let candidates = [
            (MediaKind::Voice, &self.voice),
            (MediaKind::Audio, &self.audio),
            (MediaKind::VideoNote, &self.video_note),
            (MediaKind::Video, &self.video),
        ];

        candidates.into_iter().find_map(|(kind, media)| {
            media.as_ref().map(|m| MediaAttachment {
                kind,
                file_id: m.file_id.clone(),
                file_size: m.file_size,
                duration: m.duration,
            })
        })
    }
}

impl From<TgMessage> for IncomingMessage {
    fn from(message: TgMessage) -> Self {
        let chat_kind = match message.chat.kind.as_str() {
            "private" => ChatKind::Private,
            "supergroup" => ChatKind::Supergroup,
            "channel" => ChatKind::Channel,
            _ => ChatKind::Group,
        };
        let handle = message.handle();
        let media = message.media();

        Self {
            handle,
            chat_kind,
            from: message
                .from
                .map(|u| Submitter {
                    id: u.id,
                    username: u.username,
                })
                .unwrap_or_default(),
            text: message.text,
            media,
            reply_to: message
                .reply_to_message
                .map(|reply| Box::new(IncomingMessage::from(*reply))),
        }
    }
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from config
    pub fn from_config(config: TelegramConfig) -> Self {
        let mut client = Self::new(config.bot_token);
        if let Some(base) = config.api_base {
            client.api_base = base.trim_end_matches('/').to_string();
        }
        client
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Build file download URL
    fn file_url(&self, path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, path)
    }

    /// Unwrap a Bot API envelope
    async fn parse<T: DeserializeOwned>(response: reqwest::Response, method: &str) -> Result<T> {
        let result: TelegramResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram {} response", method))?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error in {}: {}",
                method,
                result.description.unwrap_or_default()
            );
        }

        result
            .result
            .with_context(|| format!("Telegram {} returned no result", method))
    }

    /// POST a JSON body to a Bot API method
    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to call Telegram {}", method))?;

        Self::parse(response, method).await
    }

    async fn call_for_handle(&self, method: &str, body: serde_json::Value) -> Result<MessageHandle> {
        let message: TgMessage = self.call(method, body).await?;
        Ok(message.handle())
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64, poll_timeout: Duration) -> Result<Vec<Update>> {
        let response = self
            .client
            .post(self.api_url("getUpdates"))
            .timeout(poll_timeout + Duration::from_secs(10))
            .json(&serde_json::json!({
                "offset": offset,
                "timeout": poll_timeout.as_secs(),
                "allowed_updates": ["message"],
            }))
            .send()
            .await
            .context("Failed to poll Telegram updates")?;

        Self::parse(response, "getUpdates").await
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn get_file(&self, file_id: &str) -> Result<RemoteFile> {
        let file: FileResult = self
            .call("getFile", serde_json::json!({ "file_id": file_id }))
            .await?;

        Ok(RemoteFile {
            path: file
                .file_path
                .with_context(|| format!("Telegram returned no path for file {}", file_id))?,
            size: file.file_size,
        })
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.file_url(path))
            .send()
            .await
            .context("Failed to download Telegram file")?
            .error_for_status()
            .context("Telegram file download rejected")?;

        let bytes = response
            .bytes()
            .await
            .context("Failed to read Telegram file body")?;

        Ok(bytes.to_vec())
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<MessageHandle> {
        self.call_for_handle(
            "sendMessage",
            serde_json::json!({
                "chat_id": chat_id,
                "text": text,
            }),
        )
        .await
    }

    async fn reply(&self, to: &MessageHandle, text: &str) -> Result<MessageHandle> {
        self.call_for_handle(
            "sendMessage",
            serde_json::json!({
                "chat_id": to.chat_id,
                "text": text,
                "reply_to_message_id": to.message_id,
            }),
        )
        .await
    }

    async fn edit(&self, message: &MessageHandle, text: &str) -> Result<MessageHandle> {
        self.call_for_handle(
            "editMessageText",
            serde_json::json!({
                "chat_id": message.chat_id,
                "message_id": message.message_id,
                "text": text,
            }),
        )
        .await
    }

    async fn forward(&self, message: &MessageHandle, to_chat: i64) -> Result<MessageHandle> {
        self.call_for_handle(
            "forwardMessage",
            serde_json::json!({
                "chat_id": to_chat,
                "from_chat_id": message.chat_id,
                "message_id": message.message_id,
            }),
        )
        .await
    }

    async fn send_document(
        &self,
        to: &MessageHandle,
        document: DocumentSource,
    ) -> Result<MessageHandle> {
        match document {
            DocumentSource::FileId(file_id) => {
                self.call_for_handle(
                    "sendDocument",
                    serde_json::json!({
                        "chat_id": to.chat_id,
                        "document": file_id,
                        "reply_to_message_id": to.message_id,
                    }),
                )
                .await
            }
            DocumentSource::Path(path) => {
                let file_name = path
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .to_string();

                let file_bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;

                let form = Form::new()
                    .text("chat_id", to.chat_id.to_string())
                    .text("reply_to_message_id", to.message_id.to_string())
                    .part("document", Part::bytes(file_bytes).file_name(file_name));

                let response = self
                    .client
                    .post(self.api_url("sendDocument"))
                    .multipart(form)
                    .send()
                    .await
                    .context("Failed to send Telegram document")?;

                let message: TgMessage = Self::parse(response, "sendDocument").await?;
                Ok(message.handle())
            }
        }
    }
}
