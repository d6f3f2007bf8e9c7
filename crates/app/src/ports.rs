//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the invocation lifecycle and the outside
//! world. They are defined here (in `app`) so that both the lifecycle and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod job_queue;
pub mod transaction;

pub use job_queue::JobQueue;
pub use transaction::{NoTransaction, TransactionManager};
