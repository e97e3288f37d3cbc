//! Domain types for the relay.
//!
//! - Message: platform-neutral chat messages and handles
//! - Job: a validated media job and its capability

pub mod job;
pub mod message;

// Re-export commonly used types
pub use job::{Capability, Job};
pub use message::{ChatKind, IncomingMessage, MediaAttachment, MediaKind, MessageHandle, Submitter};
