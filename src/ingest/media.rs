//! Media acquisition and validation.
//!
//! Picks the media attachment a request refers to, checks it against the
//! configured limits, resolves it on the platform and downloads it. Every
//! failure is reported to the user here, so callers only need to stop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::adapters::Messenger;
use crate::domain::{IncomingMessage, MessageHandle};
use crate::notices;

/// Limits applied to incoming media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaLimits {
    /// Maximum size in bytes (0 = unlimited)
    pub max_file_size: u64,
    /// Maximum duration in seconds (0 = unlimited)
    pub max_duration_seconds: u32,
    /// Lowercase extensions accepted from the platform path
    pub supported_extensions: Vec<String>,
}

impl Default for MediaLimits {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            max_duration_seconds: 120,
            supported_extensions: default_extensions(),
        }
    }
}

pub fn default_extensions() -> Vec<String> {
    [
        "oga", "ogg", "opus", "mp3", "m4a", "wav", "flac", "aac", "mp4", "mov", "webm", "mkv",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// A downloaded, validated media file
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub data: Vec<u8>,
    /// "Downloading file..." message, reused for progress and results
    pub status: MessageHandle,
    pub file_id: String,
}

/// Reasons media could not be fetched
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid message: {0}")]
    NoMedia(i64),

    #[error("File: {file_id}, File exceeds the size limit ({size} > {limit})")]
    TooLarge { file_id: String, size: u64, limit: u64 },

    #[error("File: {file_id}, Duration exceeds the limit ({duration}s > {limit}s)")]
    TooLong {
        file_id: String,
        duration: u32,
        limit: u32,
    },

    #[error("Can't request file: {file_id}, {reason}")]
    Request { file_id: String, reason: String },

    #[error("File: {0}, Unknown file extension")]
    UnknownExtension(String),

    #[error("File: {file_id}, Unsupported file format: {extension}")]
    UnsupportedFormat { file_id: String, extension: String },

    #[error("Error downloading: {file_id}, {reason}")]
    Download {
        file_id: String,
        status: MessageHandle,
        reason: String,
    },

    #[error("Error: {0}")]
    Status(String),
}

impl FetchError {
    /// Rejections caused by the user's input rather than a failing service
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NoMedia(_)
                | Self::TooLarge { .. }
                | Self::TooLong { .. }
                | Self::UnknownExtension(_)
                | Self::UnsupportedFormat { .. }
        )
    }
}

/// Fetches media for a request through the messaging platform
pub struct MediaFetcher {
    messenger: Arc<dyn Messenger>,
    limits: MediaLimits,
    command_transcribe: String,
    command_diarize: String,
}

impl MediaFetcher {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        limits: MediaLimits,
        command_transcribe: impl Into<String>,
        command_diarize: impl Into<String>,
    ) -> Self {
        Self {
            messenger,
            limits,
            command_transcribe: command_transcribe.into(),
            command_diarize: command_diarize.into(),
        }
    }

    pub fn limits(&self) -> &MediaLimits {
        &self.limits
    }

    /// Fetch the media a request refers to.
    ///
    /// With `is_reply`, the media is taken from the message being replied
    /// to. Returns `None` after notifying the user if anything goes wrong.
    pub async fn fetch(&self, request: &IncomingMessage, is_reply: bool) -> Option<FetchedMedia> {
        let source = if is_reply {
            request.reply_to.as_deref()
        } else {
            Some(request)
        };

        match self.try_fetch(request, source).await {
            Ok(media) => Some(media),
            Err(e) => {
                self.report(request, source, &e).await;
                None
            }
        }
    }

    async fn try_fetch(
        &self,
        request: &IncomingMessage,
        source: Option<&IncomingMessage>,
    ) -> Result<FetchedMedia, FetchError> {
        let (source, media) = source
            .and_then(|m| m.media.as_ref().map(|media| (m, media)))
            .ok_or(FetchError::NoMedia(request.handle.message_id))?;

        let file_id = media.file_id.clone();
        info!(
            user_id = request.from.id,
            chat_id = request.chat_id(),
            username = request.from.name(),
            file = %file_id,
            "Requested"
        );

        if let Some(size) = media.file_size {
            self.check_size(&file_id, size)?;
        }

        if let Some(duration) = media.duration {
            let limit = self.limits.max_duration_seconds;
            if limit > 0 && duration > limit {
                return Err(FetchError::TooLong {
                    file_id,
                    duration,
                    limit,
                });
            }
        }

        let remote = self
            .messenger
            .get_file(&file_id)
            .await
            .map_err(|e| FetchError::Request {
                file_id: file_id.clone(),
                reason: format!("{:#}", e),
            })?;

        // The platform's own size may differ from what the message announced
        if let Some(size) = remote.size {
            self.check_size(&file_id, size)?;
        }

        let extension = file_extension(&remote.path)
            .ok_or_else(|| FetchError::UnknownExtension(file_id.clone()))?;
        if !self
            .limits
            .supported_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&extension))
        {
            return Err(FetchError::UnsupportedFormat { file_id, extension });
        }

        let status = self
            .messenger
            .reply(&source.handle, notices::FILE_WAIT_DOWNLOAD)
            .await
            .map_err(|e| FetchError::Status(format!("{:#}", e)))?;

        let data = self
            .messenger
            .download(&remote.path)
            .await
            .map_err(|e| FetchError::Download {
                file_id: file_id.clone(),
                status,
                reason: format!("{:#}", e),
            })?;

        Ok(FetchedMedia {
            data,
            status,
            file_id,
        })
    }

    fn check_size(&self, file_id: &str, size: u64) -> Result<(), FetchError> {
        let limit = self.limits.max_file_size;
        if limit > 0 && size > limit {
            return Err(FetchError::TooLarge {
                file_id: file_id.to_string(),
                size,
                limit,
            });
        }
        Ok(())
    }

    /// Log a failure and tell the user about it
    async fn report(
        &self,
        request: &IncomingMessage,
        source: Option<&IncomingMessage>,
        error: &FetchError,
    ) {
        let user_id = request.from.id;
        let chat_id = request.chat_id();
        let username = request.from.name();
        if error.is_validation() {
            info!(user_id, chat_id, username, reason = %error, "Media rejected");
        } else {
            error!(user_id, chat_id, username, error = %error, "Media fetch failed");
        }

        let source_handle = source.map(|m| m.handle).unwrap_or(request.handle);
        let (target, text, edit) = match error {
            FetchError::NoMedia(_) => (
                request.handle,
                notices::invalid_reply(&self.command_transcribe, &self.command_diarize),
                false,
            ),
            FetchError::TooLarge { limit, .. } => {
                (source_handle, notices::file_size_limit(*limit), false)
            }
            FetchError::TooLong { limit, .. } => {
                (source_handle, notices::file_duration_limit(*limit), false)
            }
            FetchError::Request { .. } => {
                (source_handle, notices::FILE_REQUEST_ERROR.to_string(), false)
            }
            FetchError::UnknownExtension(_) => {
                (source_handle, notices::FILE_EXTENSION_UNKNOWN.to_string(), false)
            }
            FetchError::UnsupportedFormat { extension, .. } => {
                (source_handle, notices::file_unsupported_format(extension), false)
            }
            FetchError::Download { status, .. } => {
                (*status, notices::FILE_DOWNLOAD_ERROR.to_string(), true)
            }
            FetchError::Status(_) => (request.handle, notices::PROCESSING_ERROR.to_string(), false),
        };

        let sent = if edit {
            match self.messenger.edit(&target, &text).await {
                Ok(_) => Ok(()),
                Err(_) => self.messenger.reply(&target, &text).await.map(|_| ()),
            }
        } else {
            self.messenger.reply(&target, &text).await.map(|_| ())
        };

        if let Err(e) = sent {
            error!(user_id, chat_id, error = %e, "Could not deliver media notice");
        }
    }
}

/// Lowercased extension of the last path segment, if it has one
pub fn file_extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (_, extension) = name.rsplit_once('.')?;
    if extension.is_empty() {
        None
    } else {
        Some(extension.to_ascii_lowercase())
    }
}
