//! Background worker: rebuilds service units from jobs and runs them.
//!
//! A [`ServiceRegistry`] maps [`Service::NAME`] to a builder that rebuilds
//! the unit from the job's parameters; the worker then runs its deferred
//! entry point through [`ServiceInvoker::call_deferred`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info};

use steroids_domain::error::{DefinitionError, ServiceError};
use steroids_domain::id::JobId;
use steroids_domain::job::ServiceJob;

use crate::invoker::ServiceInvoker;
use crate::job_queue::{InProcessJobQueue, JobReceiver};
use crate::ports::{JobQueue, TransactionManager};
use crate::service::{Service, ServiceUnit};

type PerformFuture<'a> = Pin<Box<dyn Future<Output = Result<JobReport, ServiceError>> + Send + 'a>>;

/// Summary of one performed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: JobId,
    pub service: String,
    /// Whether the deferred run ended without errors.
    pub success: bool,
    pub notice: String,
}

/// Rebuilds one service type from a job and runs it.
trait Performer<T, Q>: Send + Sync {
    fn perform<'a>(
        &'a self,
        invoker: &'a ServiceInvoker<T, Q>,
        job: ServiceJob,
    ) -> PerformFuture<'a>;
}

struct Deferred<S, P, F> {
    build: F,
    _marker: PhantomData<fn(P) -> S>,
}

impl<S, P, F, T, Q> Performer<T, Q> for Deferred<S, P, F>
where
    S: Service,
    P: DeserializeOwned + Send,
    F: Fn(P) -> S + Send + Sync,
    T: TransactionManager,
    Q: JobQueue,
{
    fn perform<'a>(
        &'a self,
        invoker: &'a ServiceInvoker<T, Q>,
        job: ServiceJob,
    ) -> PerformFuture<'a> {
        Box::pin(async move {
            let params: P = serde_json::from_value(Value::Object(job.parameters.clone()))?;
            let mut unit = ServiceUnit::with_parameters((self.build)(params), job.parameters);
            let outcome = invoker.call_deferred(&mut unit).await?;
            Ok(JobReport {
                job_id: job.id,
                service: job.service,
                success: outcome.success(),
                notice: outcome.notice(),
            })
        })
    }
}

/// Known service types, by name.
pub struct ServiceRegistry<T, Q> {
    performers: HashMap<&'static str, Box<dyn Performer<T, Q>>>,
}

impl<T, Q> Default for ServiceRegistry<T, Q> {
    fn default() -> Self {
        Self {
            performers: HashMap::new(),
        }
    }
}

impl<T, Q> fmt::Debug for ServiceRegistry<T, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.performers.keys().collect();
        names.sort();
        f.debug_struct("ServiceRegistry")
            .field("services", &names)
            .finish()
    }
}

impl<T, Q> ServiceRegistry<T, Q>
where
    T: TransactionManager + 'static,
    Q: JobQueue + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `S` runnable from jobs whose parameters deserialize into `P`.
    #[must_use]
    pub fn register<S, P>(self) -> Self
    where
        S: Service,
        P: DeserializeOwned + Into<S> + Send + 'static,
    {
        self.register_with::<S, P, _>(|params: P| params.into())
    }

    /// Like [`register`](Self::register), with an explicit builder for
    /// services that need more than their parameters (pools, clients).
    #[must_use]
    pub fn register_with<S, P, F>(mut self, build: F) -> Self
    where
        S: Service,
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> S + Send + Sync + 'static,
    {
        let performer = Deferred {
            build,
            _marker: PhantomData,
        };
        self.performers.insert(S::NAME, Box::new(performer));
        self
    }

    #[must_use]
    pub fn contains(&self, service: &str) -> bool {
        self.performers.contains_key(service)
    }
}

/// Consumes jobs and performs them against one invoker.
pub struct Worker<T, Q> {
    invoker: Arc<ServiceInvoker<T, Q>>,
    registry: ServiceRegistry<T, Q>,
}

impl<T, Q> fmt::Debug for Worker<T, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<T, Q> Worker<T, Q>
where
    T: TransactionManager + 'static,
    Q: JobQueue + 'static,
{
    pub fn new(invoker: Arc<ServiceInvoker<T, Q>>, registry: ServiceRegistry<T, Q>) -> Self {
        Self { invoker, registry }
    }

    #[must_use]
    pub fn invoker(&self) -> &Arc<ServiceInvoker<T, Q>> {
        &self.invoker
    }

    /// Rebuild the unit named by `job` and run its deferred entry point.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::UnknownService`] if the service is not registered.
    /// - [`ServiceError::Serialization`] if the parameters do not fit.
    /// - Whatever the deferred run returns.
    pub async fn perform(&self, job: ServiceJob) -> Result<JobReport, ServiceError> {
        let performer = self
            .registry
            .performers
            .get(job.service.as_str())
            .ok_or_else(|| DefinitionError::UnknownService(job.service.clone()))?;
        info!(job_id = %job.id, service = %job.service, "performing job");
        performer.perform(&self.invoker, job).await
    }
}

impl<T> Worker<T, InProcessJobQueue>
where
    T: TransactionManager + 'static,
{
    /// Perform jobs from `receiver` until the sending side is gone.
    ///
    /// The worker holds a [`WorkerLease`](crate::job_queue::WorkerLease) on
    /// the invoker's queue for as long as it runs. Failed jobs are logged and
    /// do not stop the loop. Returns the number of jobs received.
    pub async fn run_in_process(&self, receiver: &mut JobReceiver) -> usize {
        let _lease = self.invoker.queue().register_worker();
        let mut received = 0;
        while let Some(job) = receiver.recv().await {
            received += 1;
            let (job_id, service) = (job.id, job.service.clone());
            match self.perform(job).await {
                Ok(report) => info!(%job_id, service, success = report.success, "job done"),
                Err(err) => error!(%job_id, service, error = %err, "job failed"),
            }
        }
        received
    }
}
