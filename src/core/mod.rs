//! Core relay logic.
//!
//! This module contains:
//! - RateLimiter: per-user sliding-window limits
//! - AdmissionController: global in-flight ceiling
//! - OrderingSequencer: staggering of concurrent submissions
//! - CapabilityQueue: FIFO plus one worker per capability
//! - Dispatcher: backend call and result delivery
//! - JobIntake: the entry point that ties them together

pub mod admission;
pub mod dispatcher;
pub mod intake;
pub mod ordering;
pub mod queue;
pub mod rate_limit;

// Re-export commonly used types
pub use admission::{AdmissionController, AdmissionSlot};
pub use dispatcher::{
    split_message, Backends, DispatchError, DispatchSettings, Dispatcher, Outcome, SendError,
};
pub use intake::{IntakeLimits, JobIntake, SubmitOutcome};
pub use ordering::OrderingSequencer;
pub use queue::{CapabilityQueue, QueueError, QueueSet, QueueWorker};
pub use rate_limit::RateLimiter;
