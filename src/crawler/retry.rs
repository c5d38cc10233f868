//! The retry path for failed queue items.
//!
//! Every item-level failure lands here, whether it came from the fetcher's
//! synchronous response, a failed callback, or the parser. Delays follow an
//! exponential ladder with uniform jitter; the base delay is long enough to
//! double as the anti-bot cooldown, since a block page surfaces as a
//! shape-class parse failure.

use crate::config::PacingConfig;
use crate::data::crawl_jobs::ProgressField;
use crate::data::models::QueueItem;
use crate::data::{crawl_jobs, crawl_queue, job_logs};
use crate::error::Result;
use chrono::Utc;
use rand::Rng;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, info};

/// Delay before retry number `retry_number` (1-based): `base * 2^(n-1)`
/// plus uniform jitter in `[0, jitter]`.
pub fn retry_delay(retry_number: i32, pacing: &PacingConfig) -> Duration {
    let exponent = retry_number.saturating_sub(1).clamp(0, 16) as u32;
    let base = pacing.retry_base_seconds.saturating_mul(1u64 << exponent);
    let jitter = if pacing.retry_jitter_seconds == 0 {
        0
    } else {
        rand::rng().random_range(0..=pacing.retry_jitter_seconds)
    };
    Duration::from_secs(base + jitter)
}

/// Absorb one failed attempt of a submitted item.
///
/// Increments the job's error counter, then either schedules the next
/// retry (submitted → pending with a future `next_attempt_at`) or, once
/// the retry allowance is spent, marks the item failed and re-evaluates
/// job completion. Retries re-enter their original priority tier; they are
/// never boosted.
pub async fn handle_item_failure(
    item: &QueueItem,
    error_text: &str,
    shape_failure: bool,
    pacing: &PacingConfig,
    db_pool: &PgPool,
) -> Result<()> {
    crawl_jobs::bump_progress(item.job_id, ProgressField::Errors, 1, db_pool).await?;

    let retry_number = item.retry_count + 1;
    if retry_number > pacing.max_retries {
        let failed = crawl_queue::mark_failed(item.id, error_text, shape_failure, db_pool).await?;
        info!(
            job_id = item.job_id,
            item_id = item.id,
            url = %item.url,
            "queue item failed permanently: {error_text}"
        );
        job_logs::append_best_effort(
            item.job_id,
            "error",
            &format!(
                "{} {} failed permanently after {} attempts: {}",
                item.url_type.as_str(),
                item.url,
                retry_number,
                error_text
            ),
            db_pool,
        )
        .await;

        // Every attempt dying on a missing/garbled data object is not bad
        // luck; the catalog markup likely changed shape underneath us.
        if let Some(failed) = failed
            && failed.shape_failures >= failed.retry_count + 1
        {
            error!(
                job_id = item.job_id,
                item_id = item.id,
                url = %item.url,
                attempts = failed.retry_count + 1,
                "all attempts failed extracting the embedded data object; catalog markup may have changed"
            );
            job_logs::append_best_effort(
                item.job_id,
                "error",
                &format!(
                    "extraction failed on every attempt for {}; catalog markup may have changed",
                    item.url
                ),
                db_pool,
            )
            .await;
        }

        if crawl_jobs::try_complete(item.job_id, db_pool).await? {
            info!(job_id = item.job_id, "crawl job completed");
            job_logs::append_best_effort(item.job_id, "info", "job completed", db_pool).await;
        }
    } else {
        let delay = retry_delay(retry_number, pacing);
        let next_attempt_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(900));
        crawl_queue::schedule_retry(item.id, next_attempt_at, error_text, shape_failure, db_pool)
            .await?;
        info!(
            job_id = item.job_id,
            item_id = item.id,
            retry_number,
            delay_secs = delay.as_secs(),
            "scheduled retry: {error_text}"
        );
        job_logs::append_best_effort(
            item.job_id,
            "warn",
            &format!(
                "{} {} failed ({}); retry {} of {} in {}s",
                item.url_type.as_str(),
                item.url,
                error_text,
                retry_number,
                pacing.max_retries,
                delay.as_secs()
            ),
            db_pool,
        )
        .await;
    }

    Ok(())
}
