//! Job lifecycle: creation with seed search items, cancellation, and the
//! completion accounting shared with the scheduler and webhook paths.

use crate::crawler::scheduler::Scheduler;
use crate::data::models::{CrawlJob, JobConfig, UrlKind};
use crate::data::{crawl_jobs, crawl_queue, job_logs};
use crate::error::Result;
use anyhow::bail;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Validate a job configuration before anything is persisted.
///
/// A config that fails here is an orchestration error surfaced to the admin
/// API; it never creates a job.
pub fn validate_config(config: &JobConfig) -> Result<()> {
    if config.keywords.iter().all(|k| k.trim().is_empty()) {
        bail!("at least one non-empty keyword is required");
    }
    if config.price_min < 0.0 {
        bail!("price_min must be non-negative");
    }
    if config.price_max > 0.0 && config.price_max < config.price_min {
        bail!("price_max must be at least price_min");
    }
    Ok(())
}

/// Build the seed search URL for one keyword.
pub fn seed_search_url(catalog_base_url: &str, keyword: &str) -> String {
    format!(
        "{}/search?keyword={}&page=1",
        catalog_base_url.trim_end_matches('/'),
        urlencoding::encode(keyword.trim())
    )
}

/// Create a job, enqueue one seed search per keyword, and kick the
/// scheduler with zero delay so the first submission is immediate.
///
/// Returns the created job and the number of seed items enqueued.
pub async fn start_job(
    config: JobConfig,
    catalog_base_url: &str,
    scheduler: &Scheduler,
    db_pool: &PgPool,
) -> Result<(CrawlJob, usize)> {
    validate_config(&config)?;

    let job = crawl_jobs::create(&config, db_pool).await?;

    let mut seeds = 0usize;
    for keyword in &config.keywords {
        if keyword.trim().is_empty() {
            continue;
        }
        let url = seed_search_url(catalog_base_url, keyword);
        if crawl_queue::enqueue(
            job.id,
            &url,
            UrlKind::Search,
            keyword.trim(),
            UrlKind::Search.priority(),
            db_pool,
        )
        .await?
        .is_some()
        {
            seeds += 1;
        }
    }

    info!(job_id = job.id, seeds, "crawl job started");
    job_logs::append_best_effort(
        job.id,
        "info",
        &format!("job started with {seeds} seed search(es)"),
        db_pool,
    )
    .await;

    scheduler.kick(job.id, Duration::ZERO, false);

    Ok((job, seeds))
}

/// Cancel a job. Idempotent and non-blocking: in-flight fetches drain as
/// ghost callbacks, and the scheduler refuses further submissions once the
/// status is no longer `running`.
///
/// Returns `None` when no such job exists.
pub async fn cancel_job(job_id: i64, db_pool: &PgPool) -> Result<Option<bool>> {
    if crawl_jobs::get(job_id, db_pool).await?.is_none() {
        return Ok(None);
    }

    let changed = crawl_jobs::cancel(job_id, db_pool).await?;
    if changed {
        info!(job_id, "crawl job cancelled");
        job_logs::append_best_effort(job_id, "info", "job cancelled", db_pool).await;
    }
    Ok(Some(changed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_url_encodes_the_keyword() {
        assert_eq!(
            seed_search_url("https://catalog.example/", "garden tools"),
            "https://catalog.example/search?keyword=garden%20tools&page=1"
        );
    }

    #[test]
    fn empty_keyword_list_is_rejected() {
        let config = JobConfig {
            keywords: vec!["  ".into()],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn inverted_price_band_is_rejected() {
        let config = JobConfig {
            keywords: vec!["tools".into()],
            price_min: 50.0,
            price_max: 5.0,
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn unbounded_price_max_is_accepted() {
        let config = JobConfig {
            keywords: vec!["tools".into()],
            price_min: 5.0,
            price_max: 0.0,
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }
}
