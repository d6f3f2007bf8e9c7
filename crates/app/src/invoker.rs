//! Service invoker: runs one service unit through its lifecycle.
//!
//! ```text
//! resolve ──► (deferred?) dispatch ──► enqueue ─────────────────────────► Enqueued
//!                              │
//!                              └─► inline
//!                                    │
//! before hooks ──► [ transaction: entry point + error check ] ──► after hooks
//!                                    │
//!                                 ensure (always)
//!                                    │
//!                 ok ──► handler? ──► Outcome
//!                 err ─► rescue ─► handler ─► Outcome (logged) or Err
//! ```
//!
//! A [`DefinitionError`] found while resolving is returned before any hook,
//! transaction or `ensure` runs, and is never offered to `rescue`.

use tracing::{debug, info, warn};

use steroids_domain::error::{DefinitionError, ExecutionError, ServiceError};
use steroids_domain::id::JobId;
use steroids_domain::job::ServiceJob;
use steroids_domain::notice::{Channel, NoticeCollector};

use crate::dispatch::{self, Dispatch, DispatchSignals};
use crate::ports::{JobQueue, TransactionManager};
use crate::resolver::{self, ResolvedEntry};
use crate::service::{Context, Service, ServiceUnit};
use crate::settings::{CallOptions, Settings};
use crate::transaction_scope::TransactionScope;

/// Recorded for an unexpected fault whose message is blank.
const UNEXPECTED_ERROR: &str = "unexpected error";

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The entry point ran to completion (possibly forced through errors).
    Completed,
    /// The entry point aborted while `force` was set.
    Aborted,
    /// A failure was turned into a value by `rescue` or the caller's handler.
    Rescued,
    /// Deferred work was handed to the background queue.
    Enqueued(JobId),
    /// The service declares no entry point; nothing ran.
    Skipped,
}

/// Result of an invocation: the entry point's value and the final notices.
#[derive(Debug)]
pub struct Outcome<O> {
    value: Option<O>,
    notices: NoticeCollector,
    disposition: Disposition,
}

impl<O> Outcome<O> {
    fn new(value: Option<O>, notices: NoticeCollector, disposition: Disposition) -> Self {
        Self {
            value,
            notices,
            disposition,
        }
    }

    /// True iff no error was recorded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.notices.success()
    }

    /// Errors, else notices, else the success notice.
    #[must_use]
    pub fn notice(&self) -> String {
        self.notices.notice()
    }

    #[must_use]
    pub fn value(&self) -> Option<&O> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn into_value(self) -> Option<O> {
        self.value
    }

    #[must_use]
    pub fn notices(&self) -> &NoticeCollector {
        &self.notices
    }

    #[must_use]
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    #[must_use]
    pub fn into_parts(self) -> (Option<O>, NoticeCollector) {
        (self.value, self.notices)
    }
}

/// What a finished entry point produced.
enum Completion<O> {
    Value(O),
    Aborted,
}

type NoHandler<O> = fn(Option<O>, &NoticeCollector) -> Option<O>;

/// Orchestrates service invocations against one set of collaborators.
pub struct ServiceInvoker<T, Q> {
    transactions: T,
    queue: Q,
    settings: Settings,
}

impl<T, Q> ServiceInvoker<T, Q>
where
    T: TransactionManager,
    Q: JobQueue,
{
    /// Create an invoker backed by the given transaction manager and queue.
    pub fn new(transactions: T, queue: Q, settings: Settings) -> Self {
        Self {
            transactions,
            queue,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn transactions(&self) -> &T {
        &self.transactions
    }

    #[must_use]
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Invoke `unit` and return its [`Outcome`].
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Definition`] if the service is declared incorrectly.
    /// - [`ServiceError::Execution`] if errors were recorded and `force` is
    ///   unset, unless `rescue` produced a value.
    /// - Any other error raised by a hook, the entry point or a collaborator,
    ///   unless `rescue` produced a value.
    pub async fn call<S: Service>(
        &self,
        unit: &mut ServiceUnit<S>,
        options: CallOptions,
    ) -> Result<Outcome<S::Output>, ServiceError> {
        self.invoke(unit, options, None::<NoHandler<S::Output>>)
            .await
    }

    /// Invoke `unit` and hand its value and notices to `handler`.
    ///
    /// The handler runs whether the invocation succeeded or failed; on
    /// failure it receives `None` and may return a fallback value, which
    /// swallows the error.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call), except that failures the handler turns
    /// into a value are not returned.
    pub async fn call_with<S, H>(
        &self,
        unit: &mut ServiceUnit<S>,
        options: CallOptions,
        handler: H,
    ) -> Result<Option<S::Output>, ServiceError>
    where
        S: Service,
        H: FnOnce(Option<S::Output>, &NoticeCollector) -> Option<S::Output> + Send,
    {
        self.invoke(unit, options, Some(handler))
            .await
            .map(Outcome::into_value)
    }

    /// Build a unit from `params` and invoke it with default options.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call), plus serialization errors for `params`.
    pub async fn run<S, P>(&self, params: P) -> Result<Outcome<S::Output>, ServiceError>
    where
        S: Service,
        P: serde::Serialize + Into<S>,
    {
        let mut unit = ServiceUnit::from_params(params)?;
        self.call(&mut unit, CallOptions::default()).await
    }

    /// Run the deferred entry point right now, skipping hooks and the
    /// dispatch decision. This is what a background worker calls.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::MissingEntryPoint`] if `S` is not deferred.
    /// - Otherwise the same as [`call`](Self::call).
    pub async fn call_deferred<S: Service>(
        &self,
        unit: &mut ServiceUnit<S>,
    ) -> Result<Outcome<S::Output>, ServiceError> {
        if resolver::resolve::<S>()? != Some(ResolvedEntry::Deferred) {
            return Err(DefinitionError::MissingEntryPoint {
                service: S::NAME,
                entry: "deferred_process",
            }
            .into());
        }
        let options = self.settings.resolve(CallOptions::default());
        let mut ctx = Context::new(Self::collector::<S>(), options);
        let service = unit.service_mut();

        debug!(service = S::NAME, "running deferred entry point");
        let result = self
            .execute_in_transaction(service, ResolvedEntry::Deferred, &mut ctx)
            .await;
        service.ensure(&mut ctx);
        match result {
            Ok(completion) => Ok(Self::completed(completion, ctx)),
            Err(err) => Self::recover(service, ctx, err, None::<NoHandler<S::Output>>),
        }
    }

    async fn invoke<S, H>(
        &self,
        unit: &mut ServiceUnit<S>,
        options: CallOptions,
        handler: Option<H>,
    ) -> Result<Outcome<S::Output>, ServiceError>
    where
        S: Service,
        H: FnOnce(Option<S::Output>, &NoticeCollector) -> Option<S::Output> + Send,
    {
        let Some(entry) = resolver::resolve::<S>()? else {
            debug!(service = S::NAME, "no entry point declared, nothing to do");
            return Ok(Self::finish(
                None,
                Self::collector::<S>(),
                Disposition::Skipped,
                handler,
            ));
        };
        let options = self.settings.resolve(options);

        if entry.is_deferred() && self.dispatch(options.run_async).await == Dispatch::Enqueue {
            let job_id = self.enqueue(unit).await?;
            return Ok(Self::finish(
                None,
                Self::collector::<S>(),
                Disposition::Enqueued(job_id),
                handler,
            ));
        }

        let mut ctx = Context::new(Self::collector::<S>(), options);
        let service = unit.service_mut();
        let result = self.run_lifecycle(service, entry, &mut ctx).await;
        service.ensure(&mut ctx);

        match result {
            Ok(Completion::Value(value)) => Ok(Self::finish(
                Some(value),
                ctx.into_notices(),
                Disposition::Completed,
                handler,
            )),
            Ok(Completion::Aborted) => Ok(Self::finish(
                None,
                ctx.into_notices(),
                Disposition::Aborted,
                handler,
            )),
            Err(err) => Self::recover(service, ctx, err, handler),
        }
    }

    /// Before hooks, transactional execution, after hooks.
    async fn run_lifecycle<S: Service>(
        &self,
        service: &mut S,
        entry: ResolvedEntry,
        ctx: &mut Context,
    ) -> Result<Completion<S::Output>, ServiceError> {
        let callbacks = if ctx.options().skip_callbacks {
            None
        } else {
            S::callbacks()
        };

        if let Some(registry) = callbacks {
            registry.run_before(service, ctx)?;
        }

        let completion = self.execute_in_transaction(service, entry, ctx).await?;

        if let (Some(registry), Completion::Value(value)) = (callbacks, &completion) {
            registry.run_after(service, ctx, value)?;
        }
        Ok(completion)
    }

    async fn execute_in_transaction<S: Service>(
        &self,
        service: &mut S,
        entry: ResolvedEntry,
        ctx: &mut Context,
    ) -> Result<Completion<S::Output>, ServiceError> {
        self.transactions
            .scope(async {
                let unit =
                    TransactionScope::open(&self.transactions, self.settings.wrap_in_transaction)
                        .await?;
                let result = Self::execute(service, entry, ctx).await;
                unit.close(result).await
            })
            .await
    }

    /// Run the entry point and turn recorded errors into an [`ExecutionError`].
    async fn execute<S: Service>(
        service: &mut S,
        entry: ResolvedEntry,
        ctx: &mut Context,
    ) -> Result<Completion<S::Output>, ServiceError> {
        debug!(service = S::NAME, ?entry, "executing entry point");
        let result = match entry {
            ResolvedEntry::Process => service.process(ctx).await,
            ResolvedEntry::Deferred => service.deferred_process(ctx).await,
        };
        let forced = ctx.is_forced();
        match result {
            Ok(value) if forced || ctx.notices().success() => Ok(Completion::Value(value)),
            Err(ServiceError::Aborted(_)) if forced => {
                debug!(service = S::NAME, "aborted under force");
                Ok(Completion::Aborted)
            }
            Ok(_) | Err(ServiceError::Aborted(_)) => {
                Err(ExecutionError::new(S::NAME, ctx.notices().errors().clone()).into())
            }
            Err(err) => Err(err),
        }
    }

    /// Which way deferred work goes for this call.
    async fn dispatch(&self, requested_async: bool) -> Dispatch {
        // Only probe the queue when the answer can matter.
        let live_workers = if requested_async {
            match self.queue.has_live_workers().await {
                Ok(live) => live,
                Err(err) => {
                    warn!(error = %err, "worker liveness probe failed, assuming none");
                    false
                }
            }
        } else {
            false
        };
        dispatch::decide(DispatchSignals {
            requested_async,
            live_workers,
            environment: self.settings.environment,
        })
    }

    async fn enqueue<S: Service>(&self, unit: &ServiceUnit<S>) -> Result<JobId, ServiceError> {
        let parameters = unit
            .parameters()
            .cloned()
            .ok_or(DefinitionError::MissingParameters { service: S::NAME })?;
        let job = ServiceJob::new(S::NAME, parameters);
        let job_id = job.id;
        self.queue.enqueue(job).await?;
        info!(service = S::NAME, %job_id, "deferred service enqueued");
        Ok(job_id)
    }

    /// Offer a failure to `rescue`, then to the handler; re-raise otherwise.
    fn recover<S, H>(
        service: &mut S,
        mut ctx: Context,
        err: ServiceError,
        handler: Option<H>,
    ) -> Result<Outcome<S::Output>, ServiceError>
    where
        S: Service,
        H: FnOnce(Option<S::Output>, &NoticeCollector) -> Option<S::Output>,
    {
        if err.is_definition() {
            return Err(err);
        }
        // Unexpected faults still have to show up as a failure.
        if err.as_execution().is_none()
            && ctx
                .notices_mut()
                .add(Channel::Errors, err.to_string())
                .is_err()
        {
            ctx.notices_mut().add(Channel::Errors, UNEXPECTED_ERROR)?;
        }

        if let Some(value) = service.rescue(&err, &mut ctx) {
            warn!(service = S::NAME, error = %err, "service failure rescued");
            return Ok(Self::finish(
                Some(value),
                ctx.into_notices(),
                Disposition::Rescued,
                handler,
            ));
        }

        let Some(handler) = handler else {
            return Err(err);
        };
        let notices = ctx.into_notices();
        match handler(None, &notices) {
            Some(value) => {
                warn!(service = S::NAME, error = %err, "service failure handled by caller");
                Ok(Outcome::new(Some(value), notices, Disposition::Rescued))
            }
            None => Err(err),
        }
    }

    fn completed<O>(completion: Completion<O>, ctx: Context) -> Outcome<O> {
        match completion {
            Completion::Value(value) => {
                Outcome::new(Some(value), ctx.into_notices(), Disposition::Completed)
            }
            Completion::Aborted => Outcome::new(None, ctx.into_notices(), Disposition::Aborted),
        }
    }

    fn finish<O, H>(
        value: Option<O>,
        notices: NoticeCollector,
        disposition: Disposition,
        handler: Option<H>,
    ) -> Outcome<O>
    where
        H: FnOnce(Option<O>, &NoticeCollector) -> Option<O>,
    {
        let value = match handler {
            Some(handler) => handler(value, &notices),
            None => value,
        };
        Outcome::new(value, notices, disposition)
    }

    fn collector<S: Service>() -> NoticeCollector {
        NoticeCollector::for_service(S::NAME, S::SUCCESS_NOTICE)
    }
}

impl<T, Q> std::fmt::Debug for ServiceInvoker<T, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceInvoker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
