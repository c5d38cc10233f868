//! Database operations for the crawl work queue.
//!
//! Items move along pending → submitted → completed | failed, with
//! schedule_retry closing the loop back to pending. All transitions are
//! status-guarded single statements so concurrent callers (webhook tasks,
//! scheduler wake-ups, the sweeper) can never observe or produce an
//! inconsistent intermediate state.

use crate::data::models::{QueueCounts, QueueItem, QueueItemStatus, UrlKind};
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

/// Insert a new work item, silently dropping duplicates of (job_id, url).
///
/// Returns the new item's id, or `None` when the URL was already enqueued
/// for this job.
pub async fn enqueue(
    job_id: i64,
    url: &str,
    kind: UrlKind,
    keyword: &str,
    priority: i16,
    db_pool: &PgPool,
) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO crawl_queue (job_id, url, url_type, keyword, priority)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (job_id, url) DO NOTHING
         RETURNING id",
    )
    .bind(job_id)
    .bind(url)
    .bind(kind)
    .bind(keyword)
    .bind(priority)
    .fetch_optional(db_pool)
    .await?;

    Ok(id)
}

/// Atomically claim the next ready item of a job and mark it submitted.
///
/// Ready means pending with an elapsed (or absent) `next_attempt_at`.
/// Selection is lowest priority tier first, then uniform random within the
/// tier, so the submitted URL stream is not ordered by insertion time.
/// `FOR UPDATE SKIP LOCKED` keeps concurrent claimers from racing on the
/// same row; the row lock is released before any network I/O happens.
///
/// With `discovery_only`, product-detail items are left untouched; the
/// scheduler uses this while the warm-up gate is closed.
pub async fn claim_next_ready(
    job_id: i64,
    discovery_only: bool,
    db_pool: &PgPool,
) -> Result<Option<QueueItem>> {
    let mut tx = db_pool.begin().await?;

    let max_priority: i16 = if discovery_only { 1 } else { i16::MAX };
    let picked = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM crawl_queue
         WHERE job_id = $1 AND status = 'pending'
           AND (next_attempt_at IS NULL OR next_attempt_at <= NOW())
           AND priority <= $2
         ORDER BY priority ASC, random()
         LIMIT 1
         FOR UPDATE SKIP LOCKED",
    )
    .bind(job_id)
    .bind(max_priority)
    .fetch_optional(&mut *tx)
    .await?;

    let item = match picked {
        Some(id) => {
            sqlx::query_as::<_, QueueItem>(
                "UPDATE crawl_queue
                 SET status = 'submitted', submitted_at = NOW(), next_attempt_at = NULL
                 WHERE id = $1
                 RETURNING *",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        }
        None => None,
    };

    tx.commit().await?;

    Ok(item)
}

/// Fetch one item by id.
pub async fn get(item_id: i64, db_pool: &PgPool) -> Result<Option<QueueItem>> {
    let item = sqlx::query_as::<_, QueueItem>("SELECT * FROM crawl_queue WHERE id = $1")
        .bind(item_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(item)
}

/// Transition submitted → completed.
///
/// Returns false when the item was not in `submitted` (a duplicate callback
/// raced us); callers skip their side effects in that case.
pub async fn mark_completed(item_id: i64, db_pool: &PgPool) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE crawl_queue SET status = 'completed', completed_at = NOW()
         WHERE id = $1 AND status = 'submitted'",
    )
    .bind(item_id)
    .execute(db_pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Transition submitted → pending with an incremented retry count and a
/// future `next_attempt_at`.
///
/// `shape_failure` marks attempts that died on a missing or unparseable
/// embedded data object, so exhaustion can tell a flaky network from a
/// catalog redesign.
pub async fn schedule_retry(
    item_id: i64,
    next_attempt_at: DateTime<Utc>,
    error: &str,
    shape_failure: bool,
    db_pool: &PgPool,
) -> Result<()> {
    sqlx::query(
        "UPDATE crawl_queue
         SET status = 'pending',
             retry_count = retry_count + 1,
             shape_failures = shape_failures + $4,
             next_attempt_at = $2,
             error_message = $3
         WHERE id = $1 AND status = 'submitted'",
    )
    .bind(item_id)
    .bind(next_attempt_at)
    .bind(error)
    .bind(if shape_failure { 1i32 } else { 0 })
    .execute(db_pool)
    .await?;

    Ok(())
}

/// Transition submitted → failed (terminal). Returns the final row so the
/// caller can inspect the attempt history.
pub async fn mark_failed(
    item_id: i64,
    error: &str,
    shape_failure: bool,
    db_pool: &PgPool,
) -> Result<Option<QueueItem>> {
    let item = sqlx::query_as::<_, QueueItem>(
        "UPDATE crawl_queue
         SET status = 'failed',
             shape_failures = shape_failures + $3,
             completed_at = NOW(),
             error_message = $2
         WHERE id = $1 AND status = 'submitted'
         RETURNING *",
    )
    .bind(item_id)
    .bind(error)
    .bind(if shape_failure { 1i32 } else { 0 })
    .fetch_optional(db_pool)
    .await?;

    Ok(item)
}

/// Per-state item counts for a job.
pub async fn count_by_state(job_id: i64, db_pool: &PgPool) -> Result<QueueCounts> {
    let rows: Vec<(QueueItemStatus, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM crawl_queue WHERE job_id = $1 GROUP BY status",
    )
    .bind(job_id)
    .fetch_all(db_pool)
    .await?;

    let mut counts = QueueCounts::default();
    for (status, count) in rows {
        match status {
            QueueItemStatus::Pending => counts.pending = count,
            QueueItemStatus::Submitted => counts.submitted = count,
            QueueItemStatus::Completed => counts.completed = count,
            QueueItemStatus::Failed => counts.failed = count,
        }
    }
    Ok(counts)
}

/// Snapshot of the queue shape the warm-up gate decides on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadyShape {
    /// Ready search/pagination items.
    pub discovery_ready: i64,
    /// Ready product-detail items.
    pub product_ready: i64,
    /// Search/pagination items currently in flight at the fetcher.
    pub discovery_in_flight: i64,
}

/// Count ready and in-flight items by tier for the warm-up gate.
pub async fn ready_shape(job_id: i64, db_pool: &PgPool) -> Result<ReadyShape> {
    let (discovery_ready, product_ready, discovery_in_flight): (i64, i64, i64) = sqlx::query_as(
        "SELECT
             COUNT(*) FILTER (WHERE status = 'pending' AND priority = 1
                              AND (next_attempt_at IS NULL OR next_attempt_at <= NOW())),
             COUNT(*) FILTER (WHERE status = 'pending' AND priority > 1
                              AND (next_attempt_at IS NULL OR next_attempt_at <= NOW())),
             COUNT(*) FILTER (WHERE status = 'submitted' AND priority = 1)
         FROM crawl_queue WHERE job_id = $1",
    )
    .bind(job_id)
    .fetch_one(db_pool)
    .await?;

    Ok(ReadyShape {
        discovery_ready,
        product_ready,
        discovery_in_flight,
    })
}

/// Jobs in `running` state that have at least one ready item.
///
/// The sweeper kicks these so that delayed retries whose wake-up was lost
/// (crash, restart) are re-picked from queue state alone.
pub async fn jobs_with_ready_items(db_pool: &PgPool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT q.job_id
         FROM crawl_queue q
         JOIN crawl_jobs j ON j.id = q.job_id
         WHERE j.status = 'running' AND q.status = 'pending'
           AND (q.next_attempt_at IS NULL OR q.next_attempt_at <= NOW())",
    )
    .fetch_all(db_pool)
    .await?;
    Ok(ids)
}

/// Recover submitted items whose callback never arrived.
///
/// Items older than `staleness` are swept back to pending with an
/// incremented retry count; items that already spent their retries are
/// marked failed. Returns (revived, failed) row counts.
pub async fn revive_stale_submitted(
    staleness: Duration,
    max_retries: i32,
    db_pool: &PgPool,
) -> Result<(u64, u64)> {
    let stale_secs = staleness.as_secs() as f64;

    let revived = sqlx::query(
        "UPDATE crawl_queue
         SET status = 'pending',
             retry_count = retry_count + 1,
             next_attempt_at = NOW(),
             error_message = 'callback never arrived; revived by sweeper'
         WHERE status = 'submitted'
           AND submitted_at < NOW() - make_interval(secs => $1)
           AND retry_count < $2",
    )
    .bind(stale_secs)
    .bind(max_retries)
    .execute(db_pool)
    .await?;

    let failed = sqlx::query(
        "UPDATE crawl_queue
         SET status = 'failed',
             completed_at = NOW(),
             error_message = 'callback never arrived; retries exhausted'
         WHERE status = 'submitted'
           AND submitted_at < NOW() - make_interval(secs => $1)
           AND retry_count >= $2",
    )
    .bind(stale_secs)
    .bind(max_retries)
    .execute(db_pool)
    .await?;

    Ok((revived.rows_affected(), failed.rows_affected()))
}
