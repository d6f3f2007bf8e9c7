//! `SQLite` implementation of [`TransactionManager`].
//!
//! Transaction state belongs to a call chain, not to the manager. The chain
//! is carried in a task-local set by [`TransactionManager::scope`]: within
//! one chain, nested `begin` calls join the open transaction and only bump a
//! depth counter, and the outermost `commit` makes the work durable. A
//! `rollback` below the outermost level marks the unit rollback-only, and the
//! outermost `commit` then rolls back and reports
//! [`StorageError::RollbackOnly`]. Concurrent chains each get their own
//! database transaction.
//!
//! Services reach the open transaction through
//! [`SqliteTransactionManager::connection`]. The returned guard holds the
//! chain's lock, so drop it before calling a nested service.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};
use tracing::{debug, trace};

use steroids_app::ports::TransactionManager;
use steroids_domain::error::ServiceError;

use crate::error::StorageError;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(0);

tokio::task_local! {
    static CHAIN: Chain;
}

#[derive(Default)]
struct State {
    tx: Option<Transaction<'static, Sqlite>>,
    depth: usize,
    rollback_only: bool,
}

/// Transaction state of one call chain on one manager.
#[derive(Clone)]
struct Chain {
    manager: u64,
    state: Arc<Mutex<State>>,
}

/// Exclusive access to the connection of the chain's open transaction.
pub struct ConnectionGuard(OwnedMappedMutexGuard<State, SqliteConnection>);

impl Deref for ConnectionGuard {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.0
    }
}

impl DerefMut for ConnectionGuard {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        &mut self.0
    }
}

/// Transaction manager backed by a `SQLite` pool.
pub struct SqliteTransactionManager {
    id: u64,
    pool: SqlitePool,
}

impl SqliteTransactionManager {
    /// Create a manager drawing connections from `pool`.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            pool,
        }
    }

    /// How many participants of the current chain share its open transaction.
    pub async fn depth(&self) -> usize {
        match self.chain() {
            Some(state) => state.lock().await.depth,
            None => 0,
        }
    }

    /// Borrow the connection of the current chain's open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoTransaction`] when the chain has no open
    /// transaction.
    pub async fn connection(&self) -> Result<ConnectionGuard, StorageError> {
        let state = self
            .chain()
            .ok_or(StorageError::NoTransaction)?
            .lock_owned()
            .await;
        OwnedMutexGuard::try_map(state, |state| state.tx.as_deref_mut())
            .map(ConnectionGuard)
            .map_err(|_| StorageError::NoTransaction)
    }

    fn chain(&self) -> Option<Arc<Mutex<State>>> {
        CHAIN
            .try_with(|chain| (chain.manager == self.id).then(|| Arc::clone(&chain.state)))
            .ok()
            .flatten()
    }

    async fn begin_unit(&self) -> Result<(), StorageError> {
        let chain = self.chain().ok_or(StorageError::OutsideScope)?;
        let mut state = chain.lock().await;
        if state.depth == 0 {
            state.tx = Some(self.pool.begin().await?);
            state.rollback_only = false;
            debug!("sqlite transaction opened");
        } else {
            trace!(depth = state.depth, "joining open sqlite transaction");
        }
        state.depth += 1;
        Ok(())
    }

    async fn commit_unit(&self) -> Result<(), StorageError> {
        let chain = self.chain().ok_or(StorageError::NoTransaction)?;
        let mut state = chain.lock().await;
        state.depth = state
            .depth
            .checked_sub(1)
            .ok_or(StorageError::NoTransaction)?;
        if state.depth > 0 {
            return Ok(());
        }
        let tx = state.tx.take().ok_or(StorageError::NoTransaction)?;
        if std::mem::take(&mut state.rollback_only) {
            tx.rollback().await?;
            debug!("sqlite transaction rolled back, marked rollback-only");
            return Err(StorageError::RollbackOnly);
        }
        tx.commit().await?;
        debug!("sqlite transaction committed");
        Ok(())
    }

    async fn rollback_unit(&self) -> Result<(), StorageError> {
        let chain = self.chain().ok_or(StorageError::NoTransaction)?;
        let mut state = chain.lock().await;
        state.depth = state
            .depth
            .checked_sub(1)
            .ok_or(StorageError::NoTransaction)?;
        if state.depth > 0 {
            state.rollback_only = true;
            trace!(
                depth = state.depth,
                "nested rollback, unit marked rollback-only"
            );
            return Ok(());
        }
        state.rollback_only = false;
        let tx = state.tx.take().ok_or(StorageError::NoTransaction)?;
        tx.rollback().await?;
        debug!("sqlite transaction rolled back");
        Ok(())
    }
}

impl TransactionManager for SqliteTransactionManager {
    async fn begin(&self) -> Result<(), ServiceError> {
        Ok(self.begin_unit().await?)
    }

    async fn commit(&self) -> Result<(), ServiceError> {
        Ok(self.commit_unit().await?)
    }

    async fn rollback(&self) -> Result<(), ServiceError> {
        Ok(self.rollback_unit().await?)
    }

    async fn scope<F>(&self, work: F) -> F::Output
    where
        F: Future + Send,
        F::Output: Send,
    {
        if self.chain().is_some() {
            return work.await;
        }
        let chain = Chain {
            manager: self.id,
            state: Arc::default(),
        };
        CHAIN.scope(chain, work).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_queue::SqliteJobQueue;
    use crate::pool::Config;
    use steroids_app::invoker::ServiceInvoker;
    use steroids_app::service::{Context, EntryPoints, Service, ServiceUnit};
    use steroids_app::settings::{CallOptions, Settings};
    use steroids_domain::environment::Environment;
    use steroids_domain::id::WorkerId;
    use tokio::sync::Notify;

    async fn setup() -> SqliteTransactionManager {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        SqliteTransactionManager::new(db.pool().clone())
    }

    async fn insert_heartbeat(manager: &SqliteTransactionManager) -> Result<(), StorageError> {
        let mut conn = manager.connection().await?;
        sqlx::query("INSERT INTO worker_heartbeats (worker_id, beat_at) VALUES (?, ?)")
            .bind(WorkerId::new().as_uuid())
            .bind("2025-01-01T00:00:00.000000Z")
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn count_heartbeats(manager: &SqliteTransactionManager) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM worker_heartbeats")
            .fetch_one(&manager.pool)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn should_persist_work_on_commit() {
        let manager = setup().await;

        manager
            .scope(async {
                manager.begin().await.unwrap();
                insert_heartbeat(&manager).await.unwrap();
                manager.commit().await.unwrap();
                assert_eq!(manager.depth().await, 0);
            })
            .await;

        assert_eq!(count_heartbeats(&manager).await, 1);
    }

    #[tokio::test]
    async fn should_discard_work_on_rollback() {
        let manager = setup().await;

        manager
            .scope(async {
                manager.begin().await.unwrap();
                insert_heartbeat(&manager).await.unwrap();
                manager.rollback().await.unwrap();
            })
            .await;

        assert_eq!(count_heartbeats(&manager).await, 0);
    }

    #[tokio::test]
    async fn should_join_open_transaction_when_nested() {
        let manager = setup().await;

        manager
            .scope(async {
                manager.begin().await.unwrap();
                manager
                    .scope(async {
                        manager.begin().await.unwrap();
                        assert_eq!(manager.depth().await, 2);
                        insert_heartbeat(&manager).await.unwrap();
                        manager.commit().await.unwrap();
                    })
                    .await;
                assert_eq!(manager.depth().await, 1);
                insert_heartbeat(&manager).await.unwrap();
                manager.commit().await.unwrap();
            })
            .await;

        assert_eq!(count_heartbeats(&manager).await, 2);
    }

    #[tokio::test]
    async fn should_roll_back_everything_when_nested_participant_rolls_back() {
        let manager = setup().await;

        manager
            .scope(async {
                manager.begin().await.unwrap();
                insert_heartbeat(&manager).await.unwrap();
                manager.begin().await.unwrap();
                manager.rollback().await.unwrap();

                let err = manager.commit_unit().await.unwrap_err();
                assert!(matches!(err, StorageError::RollbackOnly));
            })
            .await;
        assert_eq!(count_heartbeats(&manager).await, 0);

        // the next chain starts clean
        manager
            .scope(async {
                manager.begin().await.unwrap();
                insert_heartbeat(&manager).await.unwrap();
                manager.commit().await.unwrap();
            })
            .await;
        assert_eq!(count_heartbeats(&manager).await, 1);
    }

    #[tokio::test]
    async fn should_keep_interleaved_chains_apart() {
        let manager = setup().await;
        let written = Notify::new();
        let failed = Notify::new();

        let writer = manager.scope(async {
            manager.begin().await.unwrap();
            insert_heartbeat(&manager).await.unwrap();
            written.notify_one();
            failed.notified().await;
            assert_eq!(manager.depth().await, 1);
            manager.commit().await
        });
        let failer = manager.scope(async {
            written.notified().await;
            manager.begin().await.unwrap();
            assert_eq!(manager.depth().await, 1);
            let rolled_back = manager.rollback().await;
            failed.notify_one();
            rolled_back
        });
        let (committed, rolled_back) = tokio::join!(writer, failer);

        committed.unwrap();
        rolled_back.unwrap();
        assert_eq!(count_heartbeats(&manager).await, 1);
    }

    #[tokio::test]
    async fn should_refuse_begin_outside_a_scope() {
        let manager = setup().await;
        assert!(matches!(
            manager.begin_unit().await,
            Err(StorageError::OutsideScope)
        ));
        assert_eq!(manager.depth().await, 0);
    }

    #[tokio::test]
    async fn should_refuse_commit_without_transaction() {
        let manager = setup().await;
        manager
            .scope(async {
                assert!(matches!(
                    manager.commit_unit().await,
                    Err(StorageError::NoTransaction)
                ));
                assert!(matches!(
                    manager.rollback().await,
                    Err(ServiceError::Storage(_))
                ));
            })
            .await;
    }

    #[tokio::test]
    async fn should_refuse_connection_without_transaction() {
        let manager = setup().await;
        assert!(matches!(
            manager.connection().await,
            Err(StorageError::NoTransaction)
        ));
        manager
            .scope(async {
                assert!(matches!(
                    manager.connection().await,
                    Err(StorageError::NoTransaction)
                ));
            })
            .await;
    }

    struct Writer {
        transactions: Arc<SqliteTransactionManager>,
        resume: Arc<Notify>,
    }

    impl Service for Writer {
        type Output = ();
        const NAME: &'static str = "Writer";
        const ENTRY_POINTS: EntryPoints = EntryPoints::PROCESS;

        async fn process(&mut self, _ctx: &mut Context) -> Result<(), ServiceError> {
            insert_heartbeat(&self.transactions).await?;
            self.resume.notified().await;
            Ok(())
        }
    }

    struct Failer {
        resume: Arc<Notify>,
    }

    impl Service for Failer {
        type Output = ();
        const NAME: &'static str = "Failer";
        const ENTRY_POINTS: EntryPoints = EntryPoints::PROCESS;

        async fn process(&mut self, ctx: &mut Context) -> Result<(), ServiceError> {
            ctx.add_error("unrelated failure")?;
            self.resume.notify_one();
            Ok(())
        }
    }

    #[tokio::test]
    async fn should_not_let_a_failing_call_undo_an_unrelated_one() {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        let transactions = Arc::new(SqliteTransactionManager::new(db.pool().clone()));
        let settings = Settings {
            environment: Environment::Production,
            ..Settings::default()
        };
        let invoker = ServiceInvoker::new(
            Arc::clone(&transactions),
            SqliteJobQueue::new(db.pool().clone()),
            settings,
        );
        let resume = Arc::new(Notify::new());
        let mut writer = ServiceUnit::new(Writer {
            transactions: Arc::clone(&transactions),
            resume: Arc::clone(&resume),
        });
        let mut failer = ServiceUnit::new(Failer { resume });

        let (written, failed) = tokio::join!(
            invoker.call(&mut writer, CallOptions::default()),
            invoker.call(&mut failer, CallOptions::default()),
        );

        assert!(written.unwrap().success());
        let err = failed.unwrap_err();
        assert_eq!(
            err.as_execution().unwrap().messages(),
            vec!["unrelated failure"]
        );
        assert_eq!(count_heartbeats(&transactions).await, 1);
    }
}
