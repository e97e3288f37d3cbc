//! Job intake: the relay's public entry point.
//!
//! A submission passes these gates in order:
//!
//! 1. per-user rate limit
//! 2. ordering stagger
//! 3. global admission (yields a slot)
//! 4. backend availability
//! 5. media fetch and validation
//! 6. enqueue on the capability's queue
//!
//! The admission slot is moved into the [`Job`], so it stays taken until the
//! worker has delivered the result. Any earlier exit drops the slot, which
//! releases it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::adapters::Messenger;
use crate::domain::{Capability, IncomingMessage, Job, MessageHandle};
use crate::ingest::MediaFetcher;
use crate::notices;

use super::admission::AdmissionController;
use super::dispatcher::{not_connected, Backends};
use super::ordering::OrderingSequencer;
use super::queue::QueueSet;
use super::rate_limit::RateLimiter;

/// Admission-related limits
#[derive(Debug, Clone)]
pub struct IntakeLimits {
    /// Global in-flight ceiling (0 = unlimited)
    pub max_simultaneous_requests: usize,
    /// Submissions per user per window (0 = unlimited)
    pub user_rate_limit: usize,
    /// Rate window (zero = unlimited)
    pub user_request_time: Duration,
    /// Stagger unit for concurrent submissions
    pub ordering_unit_delay: Duration,
}

impl Default for IntakeLimits {
    fn default() -> Self {
        Self {
            max_simultaneous_requests: 0,
            user_rate_limit: 0,
            user_request_time: Duration::ZERO,
            ordering_unit_delay: Duration::from_millis(150),
        }
    }
}

/// How a submission ended (at intake; the job itself runs later)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Enqueued behind `ahead` waiting jobs
    Queued { ahead: usize },
    RateLimited,
    AdmissionRejected,
    BackendNotConfigured,
    /// Media was missing, invalid, or could not be downloaded
    FetchFailed,
    QueueClosed,
}

pub struct JobIntake {
    messenger: Arc<dyn Messenger>,
    fetcher: MediaFetcher,
    queues: QueueSet,
    backends: Backends,
    rate_limiter: RateLimiter,
    admission: AdmissionController,
    sequencer: OrderingSequencer,
}

impl JobIntake {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        fetcher: MediaFetcher,
        queues: QueueSet,
        backends: Backends,
        limits: IntakeLimits,
    ) -> Self {
        Self {
            messenger,
            fetcher,
            queues,
            backends,
            rate_limiter: RateLimiter::new(limits.user_rate_limit, limits.user_request_time),
            admission: AdmissionController::new(limits.max_simultaneous_requests),
            sequencer: OrderingSequencer::new(limits.ordering_unit_delay),
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    /// Submit a request for processing.
    ///
    /// Never fails outward: every rejection or error is logged and the user
    /// is told about it.
    #[instrument(
        skip_all,
        fields(user_id = request.from.id, chat_id = request.chat_id(), capability = %capability)
    )]
    pub async fn submit(
        &self,
        request: &IncomingMessage,
        is_reply: bool,
        capability: Capability,
    ) -> SubmitOutcome {
        let gated = self
            .rate_limiter
            .guard(request.from.id, || {
                self.admit_and_enqueue(request, is_reply, capability)
            })
            .await;

        match gated {
            Some(outcome) => outcome,
            None => {
                info!(username = request.from.name(), "Max request limit exceeded");
                self.reply(&request.handle, notices::RATE_LIMIT_EXCEEDED).await;
                SubmitOutcome::RateLimited
            }
        }
    }

    async fn admit_and_enqueue(
        &self,
        request: &IncomingMessage,
        is_reply: bool,
        capability: Capability,
    ) -> SubmitOutcome {
        self.sequencer.stagger().await;

        let Some(slot) = self.admission.try_admit() else {
            let ceiling = self.admission.ceiling().unwrap_or_default();
            info!(
                username = request.from.name(),
                ceiling,
                "Reached max request limit"
            );
            self.reply(&request.handle, &notices::request_limit_reached(ceiling))
                .await;
            return SubmitOutcome::AdmissionRejected;
        };

        if !self.backends.is_configured(capability) {
            error!(username = request.from.name(), "Backend is not connected");
            self.reply(&request.handle, not_connected(capability)).await;
            return SubmitOutcome::BackendNotConfigured;
        }

        let Some(media) = self.fetcher.fetch(request, is_reply).await else {
            return SubmitOutcome::FetchFailed;
        };

        let status = media.status;
        let job = Job::new(
            media.data,
            media.file_id,
            status,
            request.from.clone(),
            request.chat_id(),
            capability,
            slot,
        );

        let queue = self.queues.get(capability);
        if queue.pending() > 0 {
            if let Err(e) = self.messenger.edit(&status, notices::QUEUED).await {
                warn!(error = %e, "Could not post queued notice");
            }
        }

        match queue.enqueue(job) {
            Ok(ahead) => {
                info!(ahead, "Job queued");
                SubmitOutcome::Queued { ahead }
            }
            Err(e) => {
                error!(error = %e, "Could not enqueue job");
                self.reply(&status, notices::PROCESSING_ERROR).await;
                SubmitOutcome::QueueClosed
            }
        }
    }

    async fn reply(&self, to: &MessageHandle, text: &str) {
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
