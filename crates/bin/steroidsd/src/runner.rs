//! Poll loop of the background worker.
//!
//! Claims pending jobs from the `SQLite` queue one at a time, performs them
//! and records the result. While running it keeps a heartbeat fresh so
//! interactive processes can see a live worker.

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use steroids_adapter_storage_sqlite_sqlx::{SqliteJobQueue, StorageError};
use steroids_app::ports::TransactionManager;
use steroids_app::worker::Worker;
use steroids_domain::id::WorkerId;

pub struct Runner<T> {
    worker: Worker<T, SqliteJobQueue>,
    queue: SqliteJobQueue,
    worker_id: WorkerId,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl<T> Runner<T>
where
    T: TransactionManager + 'static,
{
    pub fn new(
        worker: Worker<T, SqliteJobQueue>,
        queue: SqliteJobQueue,
        worker_id: WorkerId,
        poll_interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            worker,
            queue,
            worker_id,
            poll_interval,
            heartbeat_interval,
        }
    }

    /// Perform pending jobs until the queue is empty. Returns how many ran.
    ///
    /// A job that fails is marked failed and does not stop the drain.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the queue itself cannot be read or updated.
    pub async fn drain(&self) -> Result<usize, StorageError> {
        let mut performed = 0;
        while let Some(job) = self.queue.claim_next(self.worker_id).await? {
            let (job_id, service) = (job.id, job.service.clone());
            match self.worker.perform(job).await {
                Ok(report) => {
                    info!(%job_id, service, notice = report.notice, "job done");
                    self.queue.complete(job_id).await?;
                }
                Err(err) => {
                    let message = error_chain(&err);
                    error!(%job_id, service, error = message, "job failed");
                    self.queue.fail(job_id, &message).await?;
                }
            }
            performed += 1;
        }
        Ok(performed)
    }

    /// Poll and beat until `shutdown` resolves, then retire the heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the first heartbeat or the final
    /// retirement fails. Errors in between are logged and retried on the
    /// next tick.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), StorageError>
    where
        F: Future<Output = ()>,
    {
        self.queue.heartbeat(self.worker_id).await?;
        info!(worker_id = %self.worker_id, "worker started");

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = heartbeat.tick() => {
                    if let Err(err) = self.queue.heartbeat(self.worker_id).await {
                        warn!(error = error_chain(&err), "heartbeat failed");
                    }
                }
                _ = poll.tick() => {
                    if let Err(err) = self.drain().await {
                        error!(error = error_chain(&err), "polling the job queue failed");
                    }
                }
            }
        }

        self.queue.retire(self.worker_id).await?;
        info!(worker_id = %self.worker_id, "worker stopped");
        Ok(())
    }
}

/// `err` and all its sources, joined with `": "`.
pub fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
