//! In-process job queue backed by a tokio mpsc channel.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

use steroids_domain::error::{QueueError, ServiceError};
use steroids_domain::job::ServiceJob;

use crate::ports::JobQueue;

/// Receiving end of an [`InProcessJobQueue`].
pub type JobReceiver = mpsc::UnboundedReceiver<ServiceJob>;

/// Job queue living in the same process as its workers.
///
/// Liveness is tracked by [`WorkerLease`]s: a worker holds one while it
/// consumes the receiver and the queue counts as having live workers until
/// the last lease is dropped.
#[derive(Clone)]
pub struct InProcessJobQueue {
    sender: mpsc::UnboundedSender<ServiceJob>,
    live_workers: Arc<AtomicUsize>,
}

impl InProcessJobQueue {
    /// Create a queue and the receiver its worker consumes.
    #[must_use]
    pub fn new() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            sender,
            live_workers: Arc::new(AtomicUsize::new(0)),
        };
        (queue, receiver)
    }

    /// Announce a worker. It counts as live until the lease is dropped.
    #[must_use]
    pub fn register_worker(&self) -> WorkerLease {
        self.live_workers.fetch_add(1, Ordering::SeqCst);
        WorkerLease {
            live_workers: Arc::clone(&self.live_workers),
        }
    }

    #[must_use]
    pub fn live_worker_count(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }
}

impl JobQueue for InProcessJobQueue {
    fn enqueue(&self, job: ServiceJob) -> impl Future<Output = Result<(), ServiceError>> + Send {
        // send only fails once the receiver is gone.
        let result = self
            .sender
            .send(job)
            .map_err(|_| ServiceError::from(QueueError::Closed));
        async { result }
    }

    fn has_live_workers(&self) -> impl Future<Output = Result<bool, ServiceError>> + Send {
        let live = self.live_worker_count() > 0 && !self.sender.is_closed();
        async move { Ok(live) }
    }
}

/// Proof of a running worker; see [`InProcessJobQueue::register_worker`].
#[derive(Debug)]
pub struct WorkerLease {
    live_workers: Arc<AtomicUsize>,
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        self.live_workers.fetch_sub(1, Ordering::SeqCst);
    }
}
