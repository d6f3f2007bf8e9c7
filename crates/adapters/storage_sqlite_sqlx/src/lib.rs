//! # steroids-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `TransactionManager` port with join-on-nesting semantics
//! - Implement the `JobQueue` port on a `service_jobs` table, with worker
//!   heartbeats as the liveness probe
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Ship the built-in maintenance services a worker registers
//!
//! ## Dependency rule
//! Depends on `steroids-app` (for port traits) and `steroids-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod error;
mod job_queue;
mod maintenance;
mod pool;
mod transaction;

pub use error::StorageError;
pub use job_queue::{DEFAULT_HEARTBEAT_TTL_SECS, JobStatus, SqliteJobQueue};
pub use maintenance::{PruneHeartbeats, PruneHeartbeatsParams};
pub use pool::{Config, Database};
pub use transaction::{ConnectionGuard, SqliteTransactionManager};
