//! Job queue port: background hand-off for deferred services.

use std::future::Future;

use steroids_domain::error::ServiceError;
use steroids_domain::job::ServiceJob;

/// Accepts deferred work and reports whether anyone is around to run it.
pub trait JobQueue: Send + Sync {
    /// Hand a job to the queue. Returns once the queue has accepted it.
    fn enqueue(&self, job: ServiceJob) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Worker-pool liveness probe: is at least one worker consuming jobs?
    fn has_live_workers(&self) -> impl Future<Output = Result<bool, ServiceError>> + Send;
}

impl<T: JobQueue> JobQueue for std::sync::Arc<T> {
    fn enqueue(&self, job: ServiceJob) -> impl Future<Output = Result<(), ServiceError>> + Send {
        (**self).enqueue(job)
    }

    fn has_live_workers(&self) -> impl Future<Output = Result<bool, ServiceError>> + Send {
        (**self).has_live_workers()
    }
}
