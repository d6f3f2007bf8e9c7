//! # steroidsd: background worker daemon
//!
//! Composition root that wires the `SQLite` adapter into a service invoker
//! and runs the job worker.
//!
//! ## Responsibilities
//! - Load configuration (`steroids.toml`, env vars)
//! - Initialize logging
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct the transaction manager, job queue and invoker
//! - Register every service type the worker can rebuild from a job
//! - Poll the queue until SIGINT, then retire the worker's heartbeat
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no service logic belongs here.

mod config;
mod runner;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use steroids_adapter_storage_sqlite_sqlx::{
    Config as DatabaseConfig, PruneHeartbeats, PruneHeartbeatsParams, SqliteJobQueue,
    SqliteTransactionManager,
};
use steroids_app::invoker::ServiceInvoker;
use steroids_app::worker::{ServiceRegistry, Worker};

use crate::config::Config;
use crate::runner::{Runner, error_chain};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    // Database
    let db = DatabaseConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;

    // Ports
    let transactions = Arc::new(SqliteTransactionManager::new(db.pool().clone()));
    let queue =
        SqliteJobQueue::new(db.pool().clone()).with_heartbeat_ttl(config.worker.heartbeat_ttl_secs);
    let invoker = Arc::new(ServiceInvoker::new(
        Arc::clone(&transactions),
        queue.clone(),
        config.services.clone(),
    ));

    // Leftovers from workers that died without retiring.
    let params = PruneHeartbeatsParams {
        older_than_secs: config.worker.heartbeat_ttl_secs,
    };
    let mut prune = PruneHeartbeats::unit(Arc::clone(&transactions), params)?;
    match invoker.call_deferred(&mut prune).await {
        Ok(outcome) => tracing::info!(notice = outcome.notice(), "startup maintenance done"),
        Err(err) => tracing::warn!(error = error_chain(&err), "startup maintenance failed"),
    }

    // Worker
    let registry = ServiceRegistry::new()
        .register_with::<PruneHeartbeats, PruneHeartbeatsParams, _>(PruneHeartbeats::builder(
            transactions,
        ));
    let worker_id = config.worker.id.unwrap_or_default();
    tracing::info!(
        %worker_id,
        environment = %config.services.environment,
        ?registry,
        "steroidsd starting"
    );
    let runner = Runner::new(
        Worker::new(invoker, registry),
        queue,
        worker_id,
        config.worker.poll_interval(),
        config.worker.heartbeat_interval(),
    );

    runner
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
        })
        .await?;

    db.close().await;
    Ok(())
}
