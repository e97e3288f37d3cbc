//! Global admission control.
//!
//! Tracks how many submissions are in flight across all users and
//! capabilities. A granted admission is represented by an [`AdmissionSlot`];
//! dropping the slot releases it, so every exit path gives the slot back
//! exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Caps the number of simultaneously in-flight jobs
#[derive(Debug, Clone)]
pub struct AdmissionController {
    /// Zero means unlimited
    ceiling: usize,
    in_flight: Arc<AtomicUsize>,
}

impl AdmissionController {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn ceiling(&self) -> Option<usize> {
        (self.ceiling > 0).then_some(self.ceiling)
    }

    /// Current number of admitted, unreleased submissions
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Try to take a slot. Returns `None` when the ceiling is reached.
    ///
    /// The check and the increment are one atomic step, so two racing
    /// callers can never both take the last slot.
    pub fn try_admit(&self) -> Option<AdmissionSlot> {
        let ceiling = self.ceiling;
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if ceiling > 0 && current >= ceiling {
                    None
                } else {
                    Some(current + 1)
                }
            })
            .ok()
            .map(|_| AdmissionSlot {
                in_flight: Arc::clone(&self.in_flight),
            })
    }
}

/// A granted admission. Released on drop.
#[derive(Debug)]
pub struct AdmissionSlot {
    in_flight: Arc<AtomicUsize>,
}

impl AdmissionSlot {
    /// Release the slot now rather than at end of scope
    pub fn release(self) {
        drop(self);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        // Saturating: a slot always corresponds to a prior increment
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}
