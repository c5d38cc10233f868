//! Per-job operator log stream, served by the admin logs endpoint.

use crate::data::models::JobLogLine;
use crate::error::Result;
use sqlx::PgPool;
use tracing::warn;

/// Append one line to a job's log stream.
pub async fn append(job_id: i64, level: &str, msg: &str, db_pool: &PgPool) -> Result<()> {
    sqlx::query("INSERT INTO crawl_job_logs (job_id, level, msg) VALUES ($1, $2, $3)")
        .bind(job_id)
        .bind(level)
        .bind(msg)
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Append a line, swallowing (but tracing) failures.
///
/// Crawl control flow must not die because the log insert did.
pub async fn append_best_effort(job_id: i64, level: &str, msg: &str, db_pool: &PgPool) {
    if let Err(e) = append(job_id, level, msg, db_pool).await {
        warn!(job_id, error = %e, "failed to append job log line");
    }
}

/// Tail a job's log lines with id > `since`, oldest first.
pub async fn tail(job_id: i64, since: i64, limit: i64, db_pool: &PgPool) -> Result<Vec<JobLogLine>> {
    let lines = sqlx::query_as::<_, JobLogLine>(
        "SELECT * FROM crawl_job_logs
         WHERE job_id = $1 AND id > $2
         ORDER BY id ASC
         LIMIT $3",
    )
    .bind(job_id)
    .bind(since)
    .bind(limit)
    .fetch_all(db_pool)
    .await?;
    Ok(lines)
}
