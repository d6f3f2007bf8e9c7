//! Common error types used across the workspace.
//!
//! Three families matter to callers:
//! - [`DefinitionError`]: a programming mistake in how a service is declared.
//!   Never offered to `rescue`, never retried.
//! - [`ExecutionError`]: the service finished (or aborted) with a non-empty
//!   errors channel and `force` was not set.
//! - Everything else (storage, queue, unexpected faults): surfaced as-is.

use std::fmt;

use crate::notice::{InvalidMessage, NoticeCollection};

/// Boxed error from an adapter, kept opaque to the domain.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error returned by service invocations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The service is declared incorrectly.
    #[error("service definition error")]
    Definition(#[from] DefinitionError),

    /// The service recorded errors and was not forced through.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The entry point stopped itself through `Context::abort`.
    ///
    /// Only observed inside an entry point; the invoker always turns it into
    /// an [`ExecutionError`] or a forced outcome.
    #[error("service aborted")]
    Aborted(#[from] Abort),

    /// The background queue rejected or lost a job.
    #[error("job queue error")]
    Queue(#[from] QueueError),

    /// The persistence collaborator failed (transaction or queue storage).
    #[error("storage error")]
    Storage(#[source] BoxError),

    /// Parameters could not be (de)serialized.
    #[error("serialization error")]
    Serialization(#[from] serde_json::Error),

    /// Any other fault raised by a hook or an entry point.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ServiceError {
    /// Whether this error is a [`DefinitionError`].
    #[must_use]
    pub fn is_definition(&self) -> bool {
        matches!(self, Self::Definition(_))
    }

    /// Borrow the inner [`ExecutionError`], if that is what this is.
    #[must_use]
    pub fn as_execution(&self) -> Option<&ExecutionError> {
        match self {
            Self::Execution(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InvalidMessage> for ServiceError {
    fn from(err: InvalidMessage) -> Self {
        Self::Definition(DefinitionError::InvalidMessage(err))
    }
}

/// A service type is declared in a way that can never run correctly.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// Both `process` and `deferred_process` are declared.
    #[error("service `{service}` declares both `process` and `deferred_process`")]
    AmbiguousEntryPoint {
        /// Offending service type.
        service: &'static str,
    },

    /// The declared entry point has no implementation.
    #[error("service `{service}` declares `{entry}` but does not implement it")]
    MissingEntryPoint {
        /// Offending service type.
        service: &'static str,
        /// Name of the missing entry point.
        entry: &'static str,
    },

    /// Deferred work must be enqueued but the unit carries no parameters.
    #[error("service `{service}` has no serialized parameters and cannot be enqueued")]
    MissingParameters {
        /// Offending service type.
        service: &'static str,
    },

    /// A job names a service type that no worker knows about.
    #[error("unknown service type `{0}`")]
    UnknownService(String),

    /// A notice message was empty or not text.
    #[error("invalid notice message")]
    InvalidMessage(#[source] InvalidMessage),
}

/// Raised when a service ends with errors and `force` is unset.
#[derive(Debug)]
pub struct ExecutionError {
    service: &'static str,
    errors: NoticeCollection,
}

impl ExecutionError {
    /// Build an execution error carrying the accumulated errors.
    #[must_use]
    pub fn new(service: &'static str, errors: NoticeCollection) -> Self {
        Self { service, errors }
    }

    /// Name of the service that failed.
    #[must_use]
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// The errors that caused the failure, in insertion order.
    #[must_use]
    pub fn errors(&self) -> &NoticeCollection {
        &self.errors
    }

    /// Just the messages, in insertion order.
    #[must_use]
    pub fn messages(&self) -> Vec<&str> {
        self.errors.messages()
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service `{}` failed", self.service)?;
        if let Some(messages) = self.errors.full_messages() {
            write!(f, ": {}", messages.replace('\n', "; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutionError {}

/// Control-flow signal produced by `Context::abort`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, thiserror::Error)]
#[error("service aborted")]
pub struct Abort;

/// Errors from the in-process job queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Every receiver has been dropped.
    #[error("job queue is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_joined_messages_for_execution_error() {
        let mut errors = NoticeCollection::default();
        errors.add("first").unwrap();
        errors.add("second").unwrap();

        let err = ExecutionError::new("CreateUser", errors);
        assert_eq!(
            err.to_string(),
            "service `CreateUser` failed: first; second"
        );
        assert_eq!(err.messages(), vec!["first", "second"]);
    }

    #[test]
    fn should_display_service_only_when_no_errors() {
        let err = ExecutionError::new("Noop", NoticeCollection::default());
        assert_eq!(err.to_string(), "service `Noop` failed");
    }

    #[test]
    fn should_convert_invalid_message_into_definition_error() {
        let err: ServiceError = InvalidMessage::Empty.into();
        assert!(err.is_definition());
        assert!(matches!(
            err,
            ServiceError::Definition(DefinitionError::InvalidMessage(InvalidMessage::Empty))
        ));
    }

    #[test]
    fn should_expose_execution_error() {
        let err: ServiceError = ExecutionError::new("X", NoticeCollection::default()).into();
        assert!(err.as_execution().is_some());
        assert!(!err.is_definition());
    }
}
