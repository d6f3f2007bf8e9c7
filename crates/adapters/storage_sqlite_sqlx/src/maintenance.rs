//! Built-in maintenance services.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use steroids_app::service::{Context, EntryPoints, Service, ServiceUnit};
use steroids_domain::error::ServiceError;
use steroids_domain::job::to_parameters;
use steroids_domain::time::seconds_ago;

use crate::job_queue::{DEFAULT_HEARTBEAT_TTL_SECS, prune_heartbeats};
use crate::transaction::SqliteTransactionManager;

/// Job parameters of [`PruneHeartbeats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneHeartbeatsParams {
    pub older_than_secs: u64,
}

impl Default for PruneHeartbeatsParams {
    fn default() -> Self {
        Self {
            older_than_secs: DEFAULT_HEARTBEAT_TTL_SECS,
        }
    }
}

/// Deletes worker heartbeats that stopped refreshing.
///
/// Runs inside the invocation's transaction, so the invoker must be built
/// on the same [`SqliteTransactionManager`] with transactions enabled.
pub struct PruneHeartbeats {
    transactions: Arc<SqliteTransactionManager>,
    older_than_secs: u64,
}

impl PruneHeartbeats {
    #[must_use]
    pub fn new(transactions: Arc<SqliteTransactionManager>, params: PruneHeartbeatsParams) -> Self {
        Self {
            transactions,
            older_than_secs: params.older_than_secs,
        }
    }

    /// Builder for a worker's service registry.
    pub fn builder(
        transactions: Arc<SqliteTransactionManager>,
    ) -> impl Fn(PruneHeartbeatsParams) -> Self + Send + Sync + 'static {
        move |params| Self::new(Arc::clone(&transactions), params)
    }

    /// A unit that can be called or enqueued.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Serialization`] if the parameters cannot be
    /// serialized.
    pub fn unit(
        transactions: Arc<SqliteTransactionManager>,
        params: PruneHeartbeatsParams,
    ) -> Result<ServiceUnit<Self>, ServiceError> {
        let parameters = to_parameters(&params)?;
        Ok(ServiceUnit::with_parameters(
            Self::new(transactions, params),
            parameters,
        ))
    }
}

impl Service for PruneHeartbeats {
    type Output = u64;
    const NAME: &'static str = "PruneHeartbeats";
    const ENTRY_POINTS: EntryPoints = EntryPoints::DEFERRED;
    const SUCCESS_NOTICE: Option<&'static str> = Some("Worker heartbeats are up to date");

    async fn deferred_process(&mut self, ctx: &mut Context) -> Result<u64, ServiceError> {
        let cutoff = seconds_ago(self.older_than_secs);
        let pruned = {
            let mut conn = self.transactions.connection().await?;
            prune_heartbeats(&mut *conn, cutoff).await?
        };
        if pruned > 0 {
            ctx.add_notice(format!("Pruned {pruned} stale worker heartbeats"))?;
        }
        Ok(pruned)
    }
}
