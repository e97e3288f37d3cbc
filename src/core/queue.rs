//! Per-capability work queues.
//!
//! Each capability owns an unbounded FIFO and exactly one worker loop.
//! The worker takes jobs in enqueue order and holds a single-permit
//! semaphore while a job is being dispatched, so at most one job per
//! capability is ever talking to the backend.
//!
//! ```text
//! intake ──enqueue──▶ [ job | job | job ] ──recv──▶ worker ──▶ Dispatcher
//!                         pending()                 (1 permit)
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{Capability, Job};

use super::dispatcher::Dispatcher;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{0} queue is closed")]
    Closed(Capability),
}

/// Producer side of a capability queue
#[derive(Debug, Clone)]
pub struct CapabilityQueue {
    capability: Capability,
    sender: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
    busy: Arc<Semaphore>,
}

/// Consumer side; run exactly one per queue
#[derive(Debug)]
pub struct QueueWorker {
    capability: Capability,
    receiver: mpsc::UnboundedReceiver<Job>,
    pending: Arc<AtomicUsize>,
    busy: Arc<Semaphore>,
}

impl CapabilityQueue {
    /// Create a queue and its (not yet running) worker
    pub fn new(capability: Capability) -> (Self, QueueWorker) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let busy = Arc::new(Semaphore::new(1));

        let queue = Self {
            capability,
            sender,
            pending: Arc::clone(&pending),
            busy: Arc::clone(&busy),
        };
        let worker = QueueWorker {
            capability,
            receiver,
            pending,
            busy,
        };

        (queue, worker)
    }

    /// Create a queue and spawn its worker
    pub fn start(capability: Capability, dispatcher: Arc<Dispatcher>) -> (Self, JoinHandle<()>) {
        let (queue, worker) = Self::new(capability);
        let handle = tokio::spawn(worker.run(dispatcher));
        (queue, handle)
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Jobs waiting to be picked up (the one being dispatched is not counted)
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether a job is mid-dispatch right now
    pub fn is_processing(&self) -> bool {
        self.busy.available_permits() == 0
    }

    /// Append a job. Never blocks.
    ///
    /// Returns the number of jobs that were already waiting ahead of it.
    pub fn enqueue(&self, job: Job) -> Result<usize, QueueError> {
        let ahead = self.pending.fetch_add(1, Ordering::SeqCst);
        debug!(job_id = %job.id, capability = %self.capability, ahead, "Enqueue");

        if self.sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed(self.capability));
        }

        Ok(ahead)
    }
}

impl QueueWorker {
    /// Process jobs forever (until every producer handle is dropped).
    ///
    /// Each job runs on its own task. A panic there is reported through the
    /// join handle, logged, and the loop moves on to the next job.
    pub async fn run(mut self, dispatcher: Arc<Dispatcher>) {
        info!(capability = %self.capability, "Queue worker started");

        while let Some(job) = self.receiver.recv().await {
            self.pending.fetch_sub(1, Ordering::SeqCst);

            let Ok(permit) = Arc::clone(&self.busy).acquire_owned().await else {
                warn!(capability = %self.capability, "Queue semaphore closed");
                break;
            };

            let job_id = job.id;
            let dispatcher = Arc::clone(&dispatcher);
            let iteration = tokio::spawn(async move { dispatcher.handle(job).await });

            if let Err(e) = iteration.await {
                error!(
                    capability = %self.capability,
                    %job_id,
                    error = %e,
                    "Queue iteration failed"
                );
            }

            drop(permit);
        }

        warn!(capability = %self.capability, "Queue closed, worker exiting");
    }
}

/// The relay's two queues
#[derive(Debug, Clone)]
pub struct QueueSet {
    pub transcribe: CapabilityQueue,
    pub diarize: CapabilityQueue,
}

impl QueueSet {
    /// Create both queues and spawn one worker each
    pub fn start(dispatcher: Arc<Dispatcher>) -> (Self, Vec<JoinHandle<()>>) {
        let (transcribe, t) = CapabilityQueue::start(Capability::Transcribe, Arc::clone(&dispatcher));
        let (diarize, d) = CapabilityQueue::start(Capability::Diarize, dispatcher);
        (Self { transcribe, diarize }, vec![t, d])
    }

    pub fn get(&self, capability: Capability) -> &CapabilityQueue {
        match capability {
            Capability::Transcribe => &self.transcribe,
            Capability::Diarize => &self.diarize,
        }
    }
}
