//! `SQLite` implementation of [`JobQueue`].
//!
//! Jobs live in `service_jobs` and move `pending → running → done | failed`.
//! Workers refresh a row in `worker_heartbeats` while they run; a worker
//! counts as live while its heartbeat is younger than the configured TTL.

use std::fmt;
use std::str::FromStr;

use chrono::SecondsFormat;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection, SqlitePool};

use steroids_app::ports::JobQueue;
use steroids_domain::error::ServiceError;
use steroids_domain::id::{JobId, WorkerId};
use steroids_domain::job::{Parameters, ServiceJob};
use steroids_domain::time::{Timestamp, now, seconds_ago};

use crate::error::StorageError;

/// Heartbeats older than this many seconds no longer count as live.
pub const DEFAULT_HEARTBEAT_TTL_SECS: u64 = 60;

/// Lifecycle state of a stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Fixed-width UTC text, so stored timestamps compare lexicographically.
pub(crate) fn encode_time(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(value: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.to_utc())
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

struct Wrapper(ServiceJob);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: uuid::Uuid = row.try_get("id")?;
        let service: String = row.try_get("service")?;
        let parameters_json: String = row.try_get("parameters")?;
        let enqueued_at: String = row.try_get("enqueued_at")?;

        let parameters: Parameters = serde_json::from_str(&parameters_json)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self(ServiceJob {
            id: JobId::from(id),
            service,
            parameters,
            enqueued_at: decode_time(&enqueued_at)?,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO service_jobs (id, service, parameters, status, enqueued_at)
    VALUES (?, ?, ?, 'pending', ?)
";

const CLAIM_NEXT: &str = r"
    UPDATE service_jobs
    SET status = 'running', claimed_by = ?, claimed_at = ?
    WHERE id = (
        SELECT id FROM service_jobs
        WHERE status = 'pending'
        ORDER BY enqueued_at, rowid
        LIMIT 1
    )
    RETURNING *
";

const FINISH: &str = r"
    UPDATE service_jobs
    SET status = ?, finished_at = ?, last_error = ?
    WHERE id = ? AND status = 'running'
";

const SELECT_STATUS: &str = "SELECT status FROM service_jobs WHERE id = ?";
const SELECT_LAST_ERROR: &str = "SELECT last_error FROM service_jobs WHERE id = ?";
const COUNT_BY_STATUS: &str = "SELECT COUNT(*) FROM service_jobs WHERE status = ?";

const UPSERT_HEARTBEAT: &str = r"
    INSERT INTO worker_heartbeats (worker_id, beat_at) VALUES (?, ?)
    ON CONFLICT (worker_id) DO UPDATE SET beat_at = excluded.beat_at
";

const COUNT_LIVE: &str = "SELECT COUNT(*) FROM worker_heartbeats WHERE beat_at >= ?";
const DELETE_HEARTBEAT: &str = "DELETE FROM worker_heartbeats WHERE worker_id = ?";
const PRUNE_HEARTBEATS: &str = "DELETE FROM worker_heartbeats WHERE beat_at < ?";

/// `SQLite`-backed job queue.
#[derive(Clone)]
pub struct SqliteJobQueue {
    pool: SqlitePool,
    heartbeat_ttl_secs: u64,
}

impl SqliteJobQueue {
    /// Create a queue using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            heartbeat_ttl_secs: DEFAULT_HEARTBEAT_TTL_SECS,
        }
    }

    /// Override how long a heartbeat keeps a worker live.
    #[must_use]
    pub fn with_heartbeat_ttl(mut self, secs: u64) -> Self {
        self.heartbeat_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn heartbeat_ttl_secs(&self) -> u64 {
        self.heartbeat_ttl_secs
    }

    /// Store a job as pending.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the parameters cannot be encoded or the
    /// insert fails.
    pub async fn push(&self, job: &ServiceJob) -> Result<(), StorageError> {
        let parameters = serde_json::to_string(&job.parameters)?;
        sqlx::query(INSERT)
            .bind(job.id.as_uuid())
            .bind(&job.service)
            .bind(&parameters)
            .bind(encode_time(job.enqueued_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically claim the oldest pending job for `worker`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the update fails or the row cannot be decoded.
    pub async fn claim_next(&self, worker: WorkerId) -> Result<Option<ServiceJob>, StorageError> {
        let row: Option<Wrapper> = sqlx::query_as(CLAIM_NEXT)
            .bind(worker.as_uuid())
            .bind(encode_time(now()))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|w| w.0))
    }

    /// Mark a running job as done.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the update fails.
    pub async fn complete(&self, job_id: JobId) -> Result<(), StorageError> {
        self.finish(job_id, JobStatus::Done, None).await
    }

    /// Mark a running job as failed, keeping the error message.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the update fails.
    pub async fn fail(&self, job_id: JobId, error: &str) -> Result<(), StorageError> {
        self.finish(job_id, JobStatus::Failed, Some(error)).await
    }

    async fn finish(
        &self,
        job_id: JobId,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        sqlx::query(FINISH)
            .bind(status.as_str())
            .bind(encode_time(now()))
            .bind(error)
            .bind(job_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Current status of a job, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails or the status is unknown.
    pub async fn status(&self, job_id: JobId) -> Result<Option<JobStatus>, StorageError> {
        let row: Option<(String,)> = sqlx::query_as(SELECT_STATUS)
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(status,)| {
            status
                .parse()
                .map_err(|err: String| StorageError::Database(sqlx::Error::Decode(err.into())))
        })
        .transpose()
    }

    /// Error message recorded when the job failed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails.
    pub async fn last_error(&self, job_id: JobId) -> Result<Option<String>, StorageError> {
        let row: Option<(Option<String>,)> = sqlx::query_as(SELECT_LAST_ERROR)
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(last_error,)| last_error))
    }

    /// Number of jobs in `status`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails.
    pub async fn count(&self, status: JobStatus) -> Result<u64, StorageError> {
        let (count,): (i64,) = sqlx::query_as(COUNT_BY_STATUS)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Record that `worker` is alive right now.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the upsert fails.
    pub async fn heartbeat(&self, worker: WorkerId) -> Result<(), StorageError> {
        sqlx::query(UPSERT_HEARTBEAT)
            .bind(worker.as_uuid())
            .bind(encode_time(now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove `worker`'s heartbeat, e.g. on clean shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the delete fails.
    pub async fn retire(&self, worker: WorkerId) -> Result<(), StorageError> {
        sqlx::query(DELETE_HEARTBEAT)
            .bind(worker.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count workers whose heartbeat is younger than the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails.
    pub async fn live_worker_count(&self) -> Result<u64, StorageError> {
        let (count,): (i64,) = sqlx::query_as(COUNT_LIVE)
            .bind(encode_time(seconds_ago(self.heartbeat_ttl_secs)))
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Delete heartbeats older than `cutoff` on `conn`. Returns how many went.
pub(crate) async fn prune_heartbeats(
    conn: &mut SqliteConnection,
    cutoff: Timestamp,
) -> Result<u64, StorageError> {
    let result = sqlx::query(PRUNE_HEARTBEATS)
        .bind(encode_time(cutoff))
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, job: ServiceJob) -> Result<(), ServiceError> {
        self.push(&job).await?;
        Ok(())
    }

    async fn has_live_workers(&self) -> Result<bool, ServiceError> {
        Ok(self.live_worker_count().await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;

    async fn setup() -> SqliteJobQueue {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        SqliteJobQueue::new(db.pool().clone())
    }

    fn job(service: &str, value: i64) -> ServiceJob {
        let mut parameters = Parameters::new();
        parameters.insert("value".into(), value.into());
        parameters.insert("multiplier".into(), 2.into());
        ServiceJob::new(service, parameters)
    }

    #[tokio::test]
    async fn should_store_enqueued_job_as_pending() {
        let queue = setup().await;
        let job = job("Multiply", 7);
        let job_id = job.id;

        queue.enqueue(job).await.unwrap();

        assert_eq!(
            queue.status(job_id).await.unwrap(),
            Some(JobStatus::Pending)
        );
        assert_eq!(queue.count(JobStatus::Pending).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn should_claim_oldest_pending_job_with_its_parameters() {
        let queue = setup().await;
        let first = job("Multiply", 1);
        let second = job("Multiply", 2);
        queue.enqueue(first.clone()).await.unwrap();
        queue.enqueue(second.clone()).await.unwrap();
        let worker = WorkerId::new();

        let claimed = queue.claim_next(worker).await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.parameters, first.parameters);
        assert_eq!(claimed.service, "Multiply");
        assert_eq!(
            queue.status(first.id).await.unwrap(),
            Some(JobStatus::Running)
        );

        let next = queue.claim_next(worker).await.unwrap().unwrap();
        assert_eq!(next.id, second.id);
        assert!(queue.claim_next(worker).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_record_completion_and_failure() {
        let queue = setup().await;
        let ok = job("Multiply", 1);
        let ko = job("Multiply", 2);
        queue.enqueue(ok.clone()).await.unwrap();
        queue.enqueue(ko.clone()).await.unwrap();
        let worker = WorkerId::new();
        queue.claim_next(worker).await.unwrap();
        queue.claim_next(worker).await.unwrap();

        queue.complete(ok.id).await.unwrap();
        queue
            .fail(ko.id, "Multiplier cannot be zero")
            .await
            .unwrap();

        assert_eq!(queue.status(ok.id).await.unwrap(), Some(JobStatus::Done));
        assert_eq!(queue.status(ko.id).await.unwrap(), Some(JobStatus::Failed));
        assert_eq!(queue.count(JobStatus::Running).await.unwrap(), 0);
        assert_eq!(queue.last_error(ok.id).await.unwrap(), None);
        assert_eq!(
            queue.last_error(ko.id).await.unwrap().as_deref(),
            Some("Multiplier cannot be zero")
        );
    }

    #[tokio::test]
    async fn should_not_finish_job_that_was_never_claimed() {
        let queue = setup().await;
        let pending = job("Multiply", 1);
        queue.enqueue(pending.clone()).await.unwrap();

        queue.complete(pending.id).await.unwrap();

        assert_eq!(
            queue.status(pending.id).await.unwrap(),
            Some(JobStatus::Pending)
        );
    }

    #[tokio::test]
    async fn should_return_none_status_for_unknown_job() {
        let queue = setup().await;
        assert!(queue.status(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_report_live_workers_from_recent_heartbeats() {
        let queue = setup().await;
        assert!(!queue.has_live_workers().await.unwrap());

        let worker = WorkerId::new();
        queue.heartbeat(worker).await.unwrap();
        queue.heartbeat(worker).await.unwrap();
        assert!(queue.has_live_workers().await.unwrap());
        assert_eq!(queue.live_worker_count().await.unwrap(), 1);

        queue.retire(worker).await.unwrap();
        assert!(!queue.has_live_workers().await.unwrap());
    }

    #[tokio::test]
    async fn should_ignore_stale_heartbeats() {
        let queue = setup().await;
        sqlx::query("INSERT INTO worker_heartbeats (worker_id, beat_at) VALUES (?, ?)")
            .bind(WorkerId::new().as_uuid())
            .bind(encode_time(seconds_ago(3600)))
            .execute(&queue.pool)
            .await
            .unwrap();

        assert!(!queue.has_live_workers().await.unwrap());
        assert!(
            queue
                .clone()
                .with_heartbeat_ttl(7200)
                .has_live_workers()
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn should_prune_only_stale_heartbeats() {
        let queue = setup().await;
        queue.heartbeat(WorkerId::new()).await.unwrap();
        sqlx::query("INSERT INTO worker_heartbeats (worker_id, beat_at) VALUES (?, ?)")
            .bind(WorkerId::new().as_uuid())
            .bind(encode_time(seconds_ago(3600)))
            .execute(&queue.pool)
            .await
            .unwrap();

        let mut conn = queue.pool.acquire().await.unwrap();
        let pruned = prune_heartbeats(&mut *conn, seconds_ago(60)).await.unwrap();
        drop(conn);

        assert_eq!(pruned, 1);
        assert_eq!(queue.live_worker_count().await.unwrap(), 1);
    }

    #[test]
    fn should_encode_timestamps_with_fixed_width() {
        let a = encode_time(seconds_ago(1));
        let b = encode_time(now());
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert!(b.ends_with('Z'));
    }

    #[test]
    fn should_parse_job_status() {
        assert_eq!("running".parse::<JobStatus>(), Ok(JobStatus::Running));
        assert!("weird".parse::<JobStatus>().is_err());
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }
}
