//! # steroids-app
//!
//! Application layer: the **service invocation lifecycle** and the
//! **port definitions** (traits) it is built on.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `TransactionManager`: atomic boundary around an entry point
//!   - `JobQueue`: background hand-off and worker liveness probe
//! - Define the [`Service`](service::Service) trait and its building blocks:
//!   - `CallbackRegistry`: ordered before/after hooks per service type
//!   - `resolver`: picks the single entry point a service exposes
//!   - `dispatch`: inline vs. enqueued execution of deferred work
//!   - `TransactionScope`: begin/commit/rollback around execution
//!   - `ServiceInvoker`: the orchestrator tying everything together
//! - Provide **in-process infrastructure** (job queue, worker) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `steroids-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod callbacks;
pub mod dispatch;
pub mod invoker;
pub mod job_queue;
pub mod ports;
pub mod resolver;
pub mod service;
pub mod settings;
pub mod transaction_scope;
pub mod worker;
