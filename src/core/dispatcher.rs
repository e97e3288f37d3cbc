//! Backend dispatch and result delivery.
//!
//! The dispatcher turns one [`Job`] into one backend call and one
//! user-visible outcome. It never retries: a failed job is reported to the
//! user and dropped.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::adapters::{InferenceBackend, Messenger, PredictRequest};
use crate::domain::{Capability, Job, MessageHandle};
use crate::notices;

/// What came out of a backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    /// The backend answered but recognized nothing
    EmptyResult,
    BackendError(String),
    BackendNotConfigured,
}

/// Reasons a backend call produced no text
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0} backend is not configured")]
    NotConfigured(Capability),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend task panicked: {0}")]
    Panicked(String),
}

/// A result that could not be delivered in full
#[derive(Debug, Error)]
#[error("delivered {delivered} of {total} chunks: {reason}")]
pub struct SendError {
    /// Chunks that reached the chat before the failure
    pub delivered: usize,
    pub total: usize,
    pub reason: String,
}

impl SendError {
    fn new(delivered: usize, total: usize, cause: &anyhow::Error) -> Self {
        Self {
            delivered,
            total,
            reason: format!("{:#}", cause),
        }
    }
}

/// Backends per capability. A missing backend means the capability is off.
#[derive(Clone, Default)]
pub struct Backends {
    pub transcribe: Option<Arc<dyn InferenceBackend>>,
    pub diarize: Option<Arc<dyn InferenceBackend>>,
}

impl Backends {
    pub fn get(&self, capability: Capability) -> Option<Arc<dyn InferenceBackend>> {
        match capability {
            Capability::Transcribe => self.transcribe.clone(),
            Capability::Diarize => self.diarize.clone(),
        }
    }

    pub fn is_configured(&self, capability: Capability) -> bool {
        match capability {
            Capability::Transcribe => self.transcribe.is_some(),
            Capability::Diarize => self.diarize.is_some(),
        }
    }
}

/// Delivery settings
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Longest text sent in one message (in characters)
    pub max_message_length: usize,
    /// Upper bound on one backend call; `None` waits forever
    pub backend_timeout: Option<Duration>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_message_length: 4096,
            backend_timeout: Some(Duration::from_secs(600)),
        }
    }
}

pub struct Dispatcher {
    messenger: Arc<dyn Messenger>,
    backends: Backends,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(messenger: Arc<dyn Messenger>, backends: Backends, settings: DispatchSettings) -> Self {
        Self {
            messenger,
            backends,
            settings,
        }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Run one job end to end: progress notice, backend call, delivery.
    ///
    /// Consumes the job, which releases its admission slot on return.
    #[instrument(skip_all, fields(job_id = %job.id, capability = %job.capability))]
    pub async fn handle(&self, job: Job) {
        let waiting = match job.capability {
            Capability::Transcribe => notices::WAIT_TRANSCRIBE,
            Capability::Diarize => notices::WAIT_DIARIZE,
        };
        if let Err(e) = self.messenger.edit(&job.destination, waiting).await {
            warn!(error = %e, "Could not post progress notice");
        }

        let outcome = self.dispatch(&job).await;
        self.deliver(&job, outcome).await;
    }

    /// Call the backend for a job and classify the result
    pub async fn dispatch(&self, job: &Job) -> Outcome {
        match self.call_backend(job).await {
            Ok(text) if text.trim().is_empty() => Outcome::EmptyResult,
            Ok(text) => {
                info!(
                    user_id = job.submitter.id,
                    chat_id = job.chat_id,
                    username = job.submitter.name(),
                    file = %job.payload_name,
                    result = %text,
                    "Backend result"
                );
                Outcome::Success(text)
            }
            Err(DispatchError::NotConfigured(_)) => Outcome::BackendNotConfigured,
            Err(e) => Outcome::BackendError(e.to_string()),
        }
    }

    async fn call_backend(&self, job: &Job) -> Result<String, DispatchError> {
        let backend = self
            .backends
            .get(job.capability)
            .ok_or(DispatchError::NotConfigured(job.capability))?;

        let request = PredictRequest {
            capability: job.capability,
            payload_name: job.payload_name.clone(),
            payload_base64: STANDARD.encode(&job.payload),
            diarize: job.capability == Capability::Diarize,
        };

        // Off the worker's task so a slow call never stalls the scheduler.
        // The worker still awaits the result, keeping one call per capability.
        let mut task = tokio::spawn(async move { backend.predict(request).await });

        let joined = match self.settings.backend_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    return Err(DispatchError::Timeout(limit));
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(DispatchError::Backend(format!("{:#}", e))),
            Err(e) => Err(DispatchError::Panicked(e.to_string())),
        }
    }

    /// Present an outcome to the submitter
    pub async fn deliver(&self, job: &Job, outcome: Outcome) {
        match outcome {
            Outcome::Success(text) => {
                if let Err(e) = self.send_text(&job.destination, &text).await {
                    error!(
                        job_id = %job.id,
                        user_id = job.submitter.id,
                        chat_id = job.chat_id,
                        username = job.submitter.name(),
                        file = %job.payload_name,
                        error = %e,
                        "Error sending result"
                    );
                    // Once a chunk is out, the chain already reported the failure
                    if e.delivered == 0 {
                        self.notify(&job.destination, notices::SEND_ERROR).await;
                    }
                }
            }
            Outcome::EmptyResult => {
                info!(job_id = %job.id, file = %job.payload_name, "Backend recognized no text");
                self.notify(&job.destination, notices::NO_TEXT).await;
            }
            Outcome::BackendError(detail) => {
                error!(
                    job_id = %job.id,
                    user_id = job.submitter.id,
                    chat_id = job.chat_id,
                    username = job.submitter.name(),
                    capability = %job.capability,
                    file = %job.payload_name,
                    error = %detail,
                    "Backend call failed"
                );
                let notice = match job.capability {
                    Capability::Transcribe => notices::TRANSCRIBE_ERROR,
                    Capability::Diarize => notices::DIARIZE_ERROR,
                };
                self.notify(&job.destination, notice).await;
            }
            Outcome::BackendNotConfigured => {
                error!(
                    job_id = %job.id,
                    user_id = job.submitter.id,
                    chat_id = job.chat_id,
                    username = job.submitter.name(),
                    capability = %job.capability,
                    "Backend is not connected"
                );
                self.notify(&job.destination, not_connected(job.capability))
                    .await;
            }
        }
    }

    /// Put `text` on a status message, splitting it into a reply chain if
    /// it is too long for one message. Returns the number of messages used.
    ///
    /// If the chain breaks after the first chunk, the failure is reported
    /// as a reply to the last chunk that went out.
    pub async fn send_text(&self, status: &MessageHandle, text: &str) -> Result<usize, SendError> {
        let chunks = split_message(text, self.settings.max_message_length);
        let total = chunks.len();

        let mut previous = match self.messenger.edit(status, chunks[0]).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Edit failed, sending result as a new reply");
                self.messenger
                    .reply(status, chunks[0])
                    .await
                    .map_err(|e| SendError::new(0, total, &e))?
            }
        };

        for (delivered, chunk) in chunks.iter().enumerate().skip(1) {
            match self.messenger.reply(&previous, chunk).await {
                Ok(handle) => previous = handle,
                Err(e) => {
                    error!(error = %e, "Sending long message error");
                    if let Err(e) = self
                        .messenger
                        .reply(&previous, notices::LONG_MESSAGE_SEND_ERROR)
                        .await
                    {
                        warn!(error = %e, "Could not report long message failure");
                    }
                    return Err(SendError::new(delivered, total, &e));
                }
            }
        }

        Ok(chunks.len())
    }

    /// Best-effort notice: edit the status message, fall back to a reply
    pub async fn notify(&self, status: &MessageHandle, text: &str) {
        if self.messenger.edit(status, text).await.is_ok() {
            return;
        }
        if let Err(e) = self.messenger.reply(status, text).await {
            error!(
                chat_id = status.chat_id,
                message_id = status.message_id,
                error = %e,
                "Could not deliver notice"
            );
        }
    }
}

pub fn not_connected(capability: Capability) -> &'static str {
    match capability {
        Capability::Transcribe => notices::TRANSCRIBE_NOT_CONNECTED,
        Capability::Diarize => notices::DIARIZE_NOT_CONNECTED,
    }
}

/// Split `text` into chunks of at most `max_len` characters.
///
/// Always returns at least one chunk. A `max_len` of zero disables splitting.
pub fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if max_len == 0 {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max_len {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&text[start..]);

    chunks
}
