//! Transaction scope: explicit begin/commit/rollback around execution.
//!
//! The scope never unwinds on its own: the caller hands the execution result
//! to [`TransactionScope::close`], which commits on `Ok` and rolls back on
//! `Err`, then gives the result back unchanged.

use tracing::{debug, warn};

use steroids_domain::error::ServiceError;

use crate::ports::TransactionManager;

/// An open atomic unit, or a pass-through when wrapping is disabled.
#[must_use = "a transaction scope must be closed"]
pub struct TransactionScope<'a, T> {
    manager: Option<&'a T>,
}

impl<'a, T: TransactionManager> TransactionScope<'a, T> {
    /// Open a unit on `manager` if `enabled`, otherwise a pass-through.
    ///
    /// # Errors
    ///
    /// Returns the manager's error if the unit cannot be opened.
    pub async fn open(manager: &'a T, enabled: bool) -> Result<Self, ServiceError> {
        if !enabled {
            return Ok(Self { manager: None });
        }
        manager.begin().await?;
        debug!("transaction opened");
        Ok(Self {
            manager: Some(manager),
        })
    }

    /// Whether this scope actually wraps a unit.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.manager.is_some()
    }

    /// Commit on success, roll back on failure, and pass `result` through.
    ///
    /// A failed rollback is logged; the original error wins.
    ///
    /// # Errors
    ///
    /// Returns the error in `result`, or the commit error if committing fails.
    pub async fn close<O>(self, result: Result<O, ServiceError>) -> Result<O, ServiceError> {
        let Some(manager) = self.manager else {
            return result;
        };
        match result {
            Ok(value) => {
                manager.commit().await?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = manager.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                } else {
                    debug!("transaction rolled back");
                }
                Err(err)
            }
        }
    }
}
