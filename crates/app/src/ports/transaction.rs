//! Transaction port: the atomic boundary around an entry point.
//!
//! Implementations must support nesting by *joining*: a `begin` issued while
//! a unit of the same call chain is open does not open a second one, and only
//! the outermost `commit` makes the work durable. A `rollback` at any depth
//! dooms the whole unit.
//!
//! A call chain is one top-level invocation plus every call made from within
//! its entry point. The invoker runs each chain under
//! [`TransactionManager::scope`]; units of different chains never join, even
//! when they interleave on one task.

use std::future::Future;

use steroids_domain::error::ServiceError;

/// Persistence collaborator providing atomic units of work.
pub trait TransactionManager: Send + Sync {
    /// Open an atomic unit, or join the one already open.
    fn begin(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Leave the current unit successfully.
    fn commit(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Leave the current unit, discarding its side effects.
    fn rollback(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Run `work` as part of the current call chain, or as a new chain when
    /// none is running.
    fn scope<F>(&self, work: F) -> impl Future<Output = F::Output> + Send
    where
        F: Future + Send,
        F::Output: Send,
    {
        work
    }
}

impl<T: TransactionManager> TransactionManager for std::sync::Arc<T> {
    fn begin(&self) -> impl Future<Output = Result<(), ServiceError>> + Send {
        (**self).begin()
    }

    fn commit(&self) -> impl Future<Output = Result<(), ServiceError>> + Send {
        (**self).commit()
    }

    fn rollback(&self) -> impl Future<Output = Result<(), ServiceError>> + Send {
        (**self).rollback()
    }

    fn scope<F>(&self, work: F) -> impl Future<Output = F::Output> + Send
    where
        F: Future + Send,
        F::Output: Send,
    {
        (**self).scope(work)
    }
}

/// Manager for applications without a persistence layer. Every call succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransaction;

impl TransactionManager for NoTransaction {
    async fn begin(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn commit(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn rollback(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
