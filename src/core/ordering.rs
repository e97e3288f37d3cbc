//! Staggering of concurrent submissions.
//!
//! When several messages arrive at once, their fetch/validate phases run
//! concurrently and the first reply of each could land in any order. Each
//! submission entering the ordering phase takes an ordinal from a shared
//! counter and sleeps `ordinal * unit` before continuing, which keeps the
//! first replies roughly in arrival order.
//!
//! This is a heuristic. A large burst produces proportionally long sleeps,
//! and later edits can still reorder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OrderingSequencer {
    unit: Duration,
    active: Arc<AtomicUsize>,
}

impl OrderingSequencer {
    pub fn new(unit: Duration) -> Self {
        Self {
            unit,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Join the ordering phase and return this submission's ordinal (1-based)
    pub fn enter(&self) -> usize {
        self.active.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Leave the ordering phase
    pub fn exit(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Submissions currently in the ordering phase
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Delay for a given ordinal
    pub fn delay_for(&self, ordinal: usize) -> Duration {
        self.unit.saturating_mul(u32::try_from(ordinal).unwrap_or(u32::MAX))
    }

    /// Enter, sleep for this submission's delay, then exit.
    ///
    /// Exit also happens if the returned future is dropped mid-sleep.
    /// Returns the delay that was applied.
    pub async fn stagger(&self) -> Duration {
        let ordinal = self.enter();
        let _phase = PhaseGuard(self);

        let delay = self.delay_for(ordinal);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

struct PhaseGuard<'a>(&'a OrderingSequencer);

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.exit();
    }
}
