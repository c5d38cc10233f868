//! Database operations for crawl job lifecycle and progress accounting.

use crate::data::models::{CrawlJob, CrawlJobStatus, JobConfig, Progress};
use crate::error::Result;
use sqlx::PgPool;

/// Counter fields of the progress bundle.
///
/// Kept as an enum so progress updates can never invent a key; the wire
/// names match the admin API verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressField {
    SearchUrlsSubmitted,
    SearchUrlsCompleted,
    ProductUrlsFound,
    ProductUrlsSkippedExisting,
    ProductUrlsSubmitted,
    ProductUrlsCompleted,
    ProductsParsed,
    ProductsSkippedFiltered,
    ProductsScored,
    ProductsPassedScoring,
    Errors,
}

impl ProgressField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchUrlsSubmitted => "search_urls_submitted",
            Self::SearchUrlsCompleted => "search_urls_completed",
            Self::ProductUrlsFound => "product_urls_found",
            Self::ProductUrlsSkippedExisting => "product_urls_skipped_existing",
            Self::ProductUrlsSubmitted => "product_urls_submitted",
            Self::ProductUrlsCompleted => "product_urls_completed",
            Self::ProductsParsed => "products_parsed",
            Self::ProductsSkippedFiltered => "products_skipped_filtered",
            Self::ProductsScored => "products_scored",
            Self::ProductsPassedScoring => "products_passed_scoring",
            Self::Errors => "errors",
        }
    }
}

/// Insert a new job in `running` state with a zeroed progress bundle.
pub async fn create(config: &JobConfig, db_pool: &PgPool) -> Result<CrawlJob> {
    let config_json = serde_json::to_value(config)?;
    let progress_json = serde_json::to_value(Progress::default())?;

    let job = sqlx::query_as::<_, CrawlJob>(
        "INSERT INTO crawl_jobs (status, config, progress, started_at)
         VALUES ('running', $1, $2, NOW())
         RETURNING *",
    )
    .bind(config_json)
    .bind(progress_json)
    .fetch_one(db_pool)
    .await?;

    Ok(job)
}

/// Fetch one job by id.
pub async fn get(job_id: i64, db_pool: &PgPool) -> Result<Option<CrawlJob>> {
    let job = sqlx::query_as::<_, CrawlJob>("SELECT * FROM crawl_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(job)
}

/// List all jobs, newest first.
pub async fn list(db_pool: &PgPool) -> Result<Vec<CrawlJob>> {
    let jobs = sqlx::query_as::<_, CrawlJob>("SELECT * FROM crawl_jobs ORDER BY id DESC")
        .fetch_all(db_pool)
        .await?;
    Ok(jobs)
}

/// Atomically add `delta` to one counter of a job's progress bundle.
///
/// The increment happens inside Postgres so concurrent webhook tasks and
/// scheduler wake-ups never lose updates; counters are monotonically
/// non-decreasing because all callers pass positive deltas.
pub async fn bump_progress(
    job_id: i64,
    field: ProgressField,
    delta: i64,
    db_pool: &PgPool,
) -> Result<()> {
    sqlx::query(
        "UPDATE crawl_jobs
         SET progress = jsonb_set(
             progress,
             ARRAY[$2],
             to_jsonb(COALESCE((progress->>$2)::bigint, 0) + $3)
         )
         WHERE id = $1",
    )
    .bind(job_id)
    .bind(field.as_str())
    .bind(delta)
    .execute(db_pool)
    .await?;

    Ok(())
}

/// Mark the job completed if it is still running and its queue has drained.
///
/// The drain check and the transition are one statement, so a webhook task
/// enqueuing children concurrently cannot be overtaken by a premature
/// completion. Returns true when this call performed the transition.
pub async fn try_complete(job_id: i64, db_pool: &PgPool) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE crawl_jobs SET status = 'completed', completed_at = NOW()
         WHERE id = $1 AND status = 'running'
           AND NOT EXISTS (
               SELECT 1 FROM crawl_queue
               WHERE job_id = $1 AND status IN ('pending', 'submitted')
           )",
    )
    .bind(job_id)
    .execute(db_pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Complete every running job whose queue has drained; returns their ids.
///
/// Sweeper safety net for completions whose triggering transition was lost.
pub async fn complete_drained(db_pool: &PgPool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "UPDATE crawl_jobs SET status = 'completed', completed_at = NOW()
         WHERE status = 'running'
           AND NOT EXISTS (
               SELECT 1 FROM crawl_queue
               WHERE crawl_queue.job_id = crawl_jobs.id
                 AND crawl_queue.status IN ('pending', 'submitted')
           )
         RETURNING id",
    )
    .fetch_all(db_pool)
    .await?;
    Ok(ids)
}

/// Cancel a job. Idempotent: cancelling an already-terminal job is a no-op.
///
/// Returns true when this call performed the transition.
pub async fn cancel(job_id: i64, db_pool: &PgPool) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE crawl_jobs SET status = 'cancelled', completed_at = NOW()
         WHERE id = $1 AND status IN ('pending', 'running')",
    )
    .bind(job_id)
    .execute(db_pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a job failed with an orchestration-level error message.
///
/// Reserved for catastrophic errors (corrupt config, impossible state);
/// individual item failures never fail the job.
pub async fn mark_failed(job_id: i64, error: &str, db_pool: &PgPool) -> Result<()> {
    sqlx::query(
        "UPDATE crawl_jobs SET status = 'failed', error = $2, completed_at = NOW()
         WHERE id = $1 AND status IN ('pending', 'running')",
    )
    .bind(job_id)
    .bind(error)
    .execute(db_pool)
    .await?;

    Ok(())
}

/// Current status of a job, if it exists.
pub async fn status(job_id: i64, db_pool: &PgPool) -> Result<Option<CrawlJobStatus>> {
    let status = sqlx::query_scalar::<_, CrawlJobStatus>(
        "SELECT status FROM crawl_jobs WHERE id = $1",
    )
    .bind(job_id)
    .fetch_optional(db_pool)
    .await?;
    Ok(status)
}
