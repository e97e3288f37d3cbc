//! Jobs handed from intake to a capability queue.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::admission::AdmissionSlot;

use super::message::{MessageHandle, Submitter};

/// The two kinds of work the backend can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Transcribe,
    Diarize,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::Transcribe, Capability::Diarize];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Diarize => "diarize",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated media job waiting for (or undergoing) dispatch.
///
/// Owns the global admission slot of its submission: the slot is released
/// when the worker is done with the job and drops it.
#[derive(Debug)]
pub struct Job {
    /// Identifier used in log lines
    pub id: Uuid,

    /// Raw media bytes
    pub payload: Vec<u8>,

    /// Name the backend sees for the payload (the platform file id)
    pub payload_name: String,

    /// Status message that receives progress edits and the result
    pub destination: MessageHandle,

    pub submitter: Submitter,

    pub chat_id: i64,

    pub capability: Capability,

    pub enqueued_at: DateTime<Utc>,

    slot: AdmissionSlot,
}

impl Job {
    pub fn new(
        payload: Vec<u8>,
        payload_name: String,
        destination: MessageHandle,
        submitter: Submitter,
        chat_id: i64,
        capability: Capability,
        slot: AdmissionSlot,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            payload_name,
            destination,
            submitter,
            chat_id,
            capability,
            enqueued_at: Utc::now(),
            slot,
        }
    }

    /// Global in-flight count observed through this job's slot
    pub fn in_flight(&self) -> usize {
        self.slot.in_flight()
    }
}
