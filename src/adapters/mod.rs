//! Adapter interfaces for external systems.
//!
//! Two collaborators sit outside the relay core:
//! - a messaging platform ([`Messenger`]) that delivers requests and
//!   receives replies
//! - an inference backend ([`InferenceBackend`]) that turns audio into text
//!
//! The core only talks to these traits. Every call may fail and callers
//! treat failures as non-fatal.

pub mod gradio;
pub mod telegram;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{Capability, MessageHandle};

pub use gradio::GradioBackend;
pub use telegram::{TelegramClient, TelegramConfig};

/// Metadata for a file stored on the messaging platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Platform-side download path
    pub path: String,
    /// Size in bytes, when the platform reports it
    pub size: Option<u64>,
}

/// Something that can be sent as a document
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// A file already stored on the platform
    FileId(String),
    /// A local file to upload
    Path(PathBuf),
}

/// Messaging platform operations used by the relay
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Resolve a file id to its download path and size
    async fn get_file(&self, file_id: &str) -> Result<RemoteFile>;

    /// Download a file by platform path
    async fn download(&self, path: &str) -> Result<Vec<u8>>;

    /// Send a fresh message to a chat
    async fn send(&self, chat_id: i64, text: &str) -> Result<MessageHandle>;

    /// Reply to a message
    async fn reply(&self, to: &MessageHandle, text: &str) -> Result<MessageHandle>;

    /// Replace the text of a message the bot sent
    async fn edit(&self, message: &MessageHandle, text: &str) -> Result<MessageHandle>;

    /// Forward a message to another chat
    async fn forward(&self, message: &MessageHandle, to_chat: i64) -> Result<MessageHandle>;

    /// Reply to a message with a document
    async fn send_document(
        &self,
        to: &MessageHandle,
        document: DocumentSource,
    ) -> Result<MessageHandle>;
}

/// A single request to the inference backend
#[derive(Debug, Clone)]
pub struct PredictRequest {
    pub capability: Capability,
    /// Name the backend sees for the payload
    pub payload_name: String,
    /// Base64-encoded media
    pub payload_base64: String,
    /// Ask the backend for speaker labels
    pub diarize: bool,
}

/// Remote inference service
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Run a prediction and return the recognized text
    async fn predict(&self, request: PredictRequest) -> Result<String>;
}
