//! The [`Service`] trait: one unit of business logic.
//!
//! A service type declares which entry point it exposes through
//! [`Service::ENTRY_POINTS`] and implements exactly that method:
//!
//! - [`process`](Service::process) runs synchronously, on the caller's task.
//! - [`deferred_process`](Service::deferred_process) may run inline or be
//!   handed to a background queue, see [`dispatch`](crate::dispatch).
//!
//! Everything a running entry point needs to report back (errors, notices,
//! aborts) goes through the [`Context`] it receives.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;

use steroids_domain::error::{Abort, DefinitionError, ServiceError};
use steroids_domain::job::{Parameters, to_parameters};
use steroids_domain::notice::{Channel, InvalidMessage, NoticeCollector, NoticeMessage};

use crate::callbacks::CallbackRegistry;
use crate::invoker::Outcome;
use crate::settings::ResolvedOptions;

/// Entry points a service type declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryPoints {
    process: bool,
    deferred: bool,
}

impl EntryPoints {
    /// No entry point: calling the service does nothing.
    pub const NONE: Self = Self {
        process: false,
        deferred: false,
    };
    /// Synchronous `process`.
    pub const PROCESS: Self = Self {
        process: true,
        deferred: false,
    };
    /// Asynchronous `deferred_process`.
    pub const DEFERRED: Self = Self {
        process: false,
        deferred: true,
    };

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            process: self.process || other.process,
            deferred: self.deferred || other.deferred,
        }
    }

    #[must_use]
    pub const fn has_process(self) -> bool {
        self.process
    }

    #[must_use]
    pub const fn has_deferred(self) -> bool {
        self.deferred
    }
}

/// A unit of business logic run through a
/// [`ServiceInvoker`](crate::invoker::ServiceInvoker).
pub trait Service: Send + Sized + 'static {
    /// Value returned by the entry point.
    type Output: Send;

    /// Stable identifier of the service type, used in job payloads.
    const NAME: &'static str;

    /// Which entry point this type implements.
    const ENTRY_POINTS: EntryPoints;

    /// Message reported by [`NoticeCollector::notice`] on a clean success.
    ///
    /// Defaults to the humanized [`NAME`](Self::NAME) followed by `succeeded`.
    const SUCCESS_NOTICE: Option<&'static str> = None;

    /// Hooks of this type, built once and shared by every instance.
    #[must_use]
    fn callbacks() -> Option<&'static CallbackRegistry<Self>> {
        None
    }

    /// Synchronous entry point.
    fn process(
        &mut self,
        ctx: &mut Context,
    ) -> impl Future<Output = Result<Self::Output, ServiceError>> + Send {
        let _ = ctx;
        async {
            Err(DefinitionError::MissingEntryPoint {
                service: Self::NAME,
                entry: "process",
            }
            .into())
        }
    }

    /// Deferred entry point.
    fn deferred_process(
        &mut self,
        ctx: &mut Context,
    ) -> impl Future<Output = Result<Self::Output, ServiceError>> + Send {
        let _ = ctx;
        async {
            Err(DefinitionError::MissingEntryPoint {
                service: Self::NAME,
                entry: "deferred_process",
            }
            .into())
        }
    }

    /// Runs after every invocation that got past resolution, whatever happened.
    fn ensure(&mut self, ctx: &mut Context) {
        let _ = ctx;
    }

    /// Offered every execution or unexpected failure. Returning a value turns
    /// the failure into a (logged) outcome.
    fn rescue(&mut self, error: &ServiceError, ctx: &mut Context) -> Option<Self::Output> {
        let _ = (error, ctx);
        None
    }
}

/// One instantiation of a service plus its serialized constructor parameters.
///
/// Parameters are only present when the unit was built from a serializable
/// parameter value; they are what a background worker receives.
#[derive(Debug)]
pub struct ServiceUnit<S> {
    service: S,
    parameters: Option<Parameters>,
}

impl<S: Service> ServiceUnit<S> {
    /// Wrap an already-built service. It cannot be enqueued.
    pub fn new(service: S) -> Self {
        Self {
            service,
            parameters: None,
        }
    }

    /// Build the service from `params`, keeping their serialized form.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Serialization`] if `params` does not serialize
    /// to a JSON object.
    pub fn from_params<P>(params: P) -> Result<Self, ServiceError>
    where
        P: Serialize + Into<S>,
    {
        let parameters = to_parameters(&params)?;
        Ok(Self {
            service: params.into(),
            parameters: Some(parameters),
        })
    }

    /// Rebuild a unit from serialized parameters, as a worker does.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Serialization`] if the parameters do not match `P`.
    pub fn from_parameters<P>(parameters: Parameters) -> Result<Self, ServiceError>
    where
        P: DeserializeOwned + Into<S>,
    {
        let params: P = serde_json::from_value(serde_json::Value::Object(parameters.clone()))?;
        Ok(Self::with_parameters(params.into(), parameters))
    }

    /// Pair a service with parameters that rebuild it.
    pub fn with_parameters(service: S, parameters: Parameters) -> Self {
        Self {
            service,
            parameters: Some(parameters),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub fn into_inner(self) -> S {
        self.service
    }

    pub fn parameters(&self) -> Option<&Parameters> {
        self.parameters.as_ref()
    }
}

/// Per-invocation state handed to hooks and entry points.
#[derive(Debug)]
pub struct Context {
    notices: NoticeCollector,
    options: ResolvedOptions,
}

impl Context {
    #[must_use]
    pub fn new(notices: NoticeCollector, options: ResolvedOptions) -> Self {
        Self { notices, options }
    }

    /// The options this call runs with, defaults applied.
    #[must_use]
    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.options.force
    }

    /// Record an error. The invocation will fail unless forced.
    ///
    /// # Errors
    ///
    /// Returns a definition error if `message` is empty or not text.
    pub fn add_error<M>(&mut self, message: M) -> Result<(), ServiceError>
    where
        M: TryInto<NoticeMessage, Error = InvalidMessage>,
    {
        Ok(self.notices.add(Channel::Errors, message)?)
    }

    /// Record an error along with the fault behind it.
    ///
    /// # Errors
    ///
    /// Returns a definition error if `message` is empty or not text.
    pub fn add_error_with_cause<M, E>(&mut self, message: M, cause: E) -> Result<(), ServiceError>
    where
        M: TryInto<NoticeMessage, Error = InvalidMessage>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Ok(self
            .notices
            .add_with_cause(Channel::Errors, message, cause)?)
    }

    /// Record an informational notice.
    ///
    /// # Errors
    ///
    /// Returns a definition error if `message` is empty or not text.
    pub fn add_notice<M>(&mut self, message: M) -> Result<(), ServiceError>
    where
        M: TryInto<NoticeMessage, Error = InvalidMessage>,
    {
        Ok(self.notices.add(Channel::Notices, message)?)
    }

    /// Stop the entry point: record `message` as an error and return the
    /// signal to propagate with `?` or `return Err(..)`.
    ///
    /// ```ignore
    /// if email.is_empty() {
    ///     return Err(ctx.abort("Email cannot be blank"));
    /// }
    /// ```
    pub fn abort<M>(&mut self, message: M) -> ServiceError
    where
        M: TryInto<NoticeMessage, Error = InvalidMessage>,
    {
        match self.notices.add(Channel::Errors, message) {
            Ok(()) => Abort.into(),
            Err(err) => err.into(),
        }
    }

    /// Stop the entry point without recording anything new.
    pub fn halt(&mut self) -> ServiceError {
        Abort.into()
    }

    /// Fold a nested service's errors and notices into this invocation.
    pub fn merge_outcome<O>(&mut self, outcome: &Outcome<O>) {
        self.notices.merge(outcome.notices());
    }

    #[must_use]
    pub fn notices(&self) -> &NoticeCollector {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut NoticeCollector {
        &mut self.notices
    }

    #[must_use]
    pub fn into_notices(self) -> NoticeCollector {
        self.notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, serde::Deserialize)]
    struct MultiplyParams {
        value: i64,
        multiplier: i64,
    }

    struct Multiply {
        value: i64,
        multiplier: i64,
    }

    impl From<MultiplyParams> for Multiply {
        fn from(params: MultiplyParams) -> Self {
            Self {
                value: params.value,
                multiplier: params.multiplier,
            }
        }
    }

    impl Service for Multiply {
        type Output = i64;
        const NAME: &'static str = "Multiply";
        const ENTRY_POINTS: EntryPoints = EntryPoints::DEFERRED;

        async fn deferred_process(&mut self, _ctx: &mut Context) -> Result<i64, ServiceError> {
            Ok(self.value * self.multiplier)
        }
    }

    fn context() -> Context {
        Context::new(NoticeCollector::new("ok"), ResolvedOptions::default())
    }

    #[test]
    fn should_combine_entry_points() {
        let both = EntryPoints::PROCESS.union(EntryPoints::DEFERRED);
        assert!(both.has_process());
        assert!(both.has_deferred());
        assert!(!EntryPoints::NONE.has_process());
        assert!(!EntryPoints::NONE.has_deferred());
    }

    #[test]
    fn should_keep_serialized_parameters_when_built_from_params() {
        let unit = ServiceUnit::<Multiply>::from_params(MultiplyParams {
            value: 5,
            multiplier: 3,
        })
        .unwrap();

        let params = unit.parameters().unwrap();
        assert_eq!(params.get("value"), Some(&serde_json::Value::from(5)));
        assert_eq!(params.get("multiplier"), Some(&serde_json::Value::from(3)));
        assert_eq!(unit.service().value, 5);
    }

    #[test]
    fn should_not_carry_parameters_when_wrapping_a_service() {
        let unit = ServiceUnit::new(Multiply {
            value: 1,
            multiplier: 1,
        });
        assert!(unit.parameters().is_none());
    }

    #[test]
    fn should_rebuild_unit_from_parameters() {
        let mut parameters = Parameters::new();
        parameters.insert("value".into(), 7.into());
        parameters.insert("multiplier".into(), 2.into());

        let unit = ServiceUnit::<Multiply>::from_parameters::<MultiplyParams>(parameters).unwrap();
        assert_eq!(unit.service().value * unit.service().multiplier, 14);
    }

    #[test]
    fn should_fail_rebuild_when_parameters_do_not_match() {
        let mut parameters = Parameters::new();
        parameters.insert("value".into(), "seven".into());

        let result = ServiceUnit::<Multiply>::from_parameters::<MultiplyParams>(parameters);
        assert!(matches!(result, Err(ServiceError::Serialization(_))));
    }

    #[test]
    fn should_record_abort_message_as_error() {
        let mut ctx = context();
        let signal = ctx.abort("Critical error");

        assert!(matches!(signal, ServiceError::Aborted(_)));
        assert_eq!(ctx.notices().errors().messages(), vec!["Critical error"]);
    }

    #[test]
    fn should_report_definition_error_when_aborting_with_blank_message() {
        let mut ctx = context();
        let signal = ctx.abort("");
        assert!(signal.is_definition());
    }

    #[test]
    fn should_halt_without_recording() {
        let mut ctx = context();
        assert!(matches!(ctx.halt(), ServiceError::Aborted(_)));
        assert!(ctx.notices().success());
    }

    #[test]
    fn should_reject_non_text_error_message() {
        let mut ctx = context();
        let result = ctx.add_error(serde_json::json!(["not", "text"]));
        assert!(matches!(result, Err(err) if err.is_definition()));
    }

    #[tokio::test]
    async fn should_report_missing_entry_point_from_default_impl() {
        let mut service = Multiply {
            value: 1,
            multiplier: 1,
        };
        let result = service.process(&mut context()).await;
        assert!(matches!(
            result,
            Err(ServiceError::Definition(
                DefinitionError::MissingEntryPoint {
                    entry: "process",
                    ..
                }
            ))
        ));
    }
}
