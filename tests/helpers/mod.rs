use chrono::{DateTime, Duration, Utc};
use prospector::config::Config;
use prospector::crawler::scheduler::Scheduler;
use prospector::data::models::{CrawlJobStatus, JobConfig, Progress, QueueItemStatus, UrlKind};
use prospector::fetcher::FetcherClient;
use prospector::scoring::StoreScoreSink;
use prospector::state::AppState;
use sqlx::PgPool;
use std::sync::Arc;

/// A configuration with defaults and an unroutable fetcher endpoint.
pub fn test_config() -> Config {
    serde_json::from_value(serde_json::json!({
        "database_url": "postgres://unused",
        "fetcher_api_key": "test-key",
        "fetcher_base_url": "http://127.0.0.1:9",
        "webhook_base_url": "http://127.0.0.1:9",
    }))
    .expect("test config should deserialize")
}

/// Assemble an [`AppState`] around the test database.
///
/// The fetcher endpoint points at a closed port, so any accidental network
/// call fails fast instead of leaving the test hanging.
pub fn test_state(pool: &PgPool) -> AppState {
    let config = Arc::new(test_config());
    let fetcher = Arc::new(
        FetcherClient::new(
            &config.fetcher_base_url,
            &config.fetcher_api_key,
            &config.webhook_base_url,
        )
        .expect("fetcher client should build"),
    );
    let scheduler = Scheduler::new(pool.clone(), fetcher.clone(), config.pacing.clone());
    AppState::new(
        pool.clone(),
        config,
        fetcher,
        scheduler,
        Arc::new(StoreScoreSink::new(pool.clone())),
    )
}

/// Build a minimal job configuration with sensible defaults.
pub fn make_config(keywords: &[&str]) -> JobConfig {
    JobConfig {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        price_min: 5.0,
        price_max: 50.0,
        include_warehouses: vec!["US".to_owned()],
        ..Default::default()
    }
}

/// Insert a crawl job row directly via SQL, returning the generated ID.
pub async fn insert_job(pool: &PgPool, status: CrawlJobStatus) -> i64 {
    let config = serde_json::to_value(make_config(&["garden tools"])).unwrap();
    let progress = serde_json::to_value(Progress::default()).unwrap();

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO crawl_jobs (status, config, progress, started_at)
         VALUES ($1, $2, $3, NOW())
         RETURNING id",
    )
    .bind(status)
    .bind(config)
    .bind(progress)
    .fetch_one(pool)
    .await
    .expect("insert_job failed");

    id
}

/// Insert a queue item row directly via SQL, returning the generated ID.
pub async fn insert_queue_item(
    pool: &PgPool,
    job_id: i64,
    url: &str,
    kind: UrlKind,
    status: QueueItemStatus,
    retry_count: i32,
) -> i64 {
    let submitted_at: Option<DateTime<Utc>> = match status {
        QueueItemStatus::Pending => None,
        _ => Some(Utc::now()),
    };

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO crawl_queue
             (job_id, url, url_type, keyword, priority, status, retry_count, submitted_at)
         VALUES ($1, $2, $3, 'garden tools', $4, $5, $6, $7)
         RETURNING id",
    )
    .bind(job_id)
    .bind(url)
    .bind(kind)
    .bind(kind.priority())
    .bind(status)
    .bind(retry_count)
    .bind(submitted_at)
    .fetch_one(pool)
    .await
    .expect("insert_queue_item failed");

    id
}

/// Push an item's `next_attempt_at` into the future or past.
pub async fn set_next_attempt(pool: &PgPool, item_id: i64, offset_secs: i64) {
    sqlx::query("UPDATE crawl_queue SET next_attempt_at = $2 WHERE id = $1")
        .bind(item_id)
        .bind(Utc::now() + Duration::seconds(offset_secs))
        .execute(pool)
        .await
        .expect("set_next_attempt failed");
}

/// Backdate an item's `submitted_at` so staleness windows elapse.
pub async fn backdate_submitted(pool: &PgPool, item_id: i64, age_secs: i64) {
    sqlx::query("UPDATE crawl_queue SET submitted_at = $2 WHERE id = $1")
        .bind(item_id)
        .bind(Utc::now() - Duration::seconds(age_secs))
        .execute(pool)
        .await
        .expect("backdate_submitted failed");
}

/// Read back a job's progress bundle.
pub async fn get_progress(pool: &PgPool, job_id: i64) -> Progress {
    let (progress,): (serde_json::Value,) =
        sqlx::query_as("SELECT progress FROM crawl_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_one(pool)
            .await
            .expect("get_progress failed");

    serde_json::from_value(progress).expect("progress bundle should deserialize")
}

/// Read back one queue item's (status, retry_count, next_attempt_at).
pub async fn item_state(
    pool: &PgPool,
    item_id: i64,
) -> (QueueItemStatus, i32, Option<DateTime<Utc>>) {
    sqlx::query_as("SELECT status, retry_count, next_attempt_at FROM crawl_queue WHERE id = $1")
        .bind(item_id)
        .fetch_one(pool)
        .await
        .expect("item_state failed")
}

/// Persist a product id in the scored-products store (dedup fixture).
pub async fn persist_scored_product(pool: &PgPool, source_product_id: &str) {
    sqlx::query(
        "INSERT INTO scored_products (source_product_id, name, data, passed)
         VALUES ($1, 'fixture', '{}'::jsonb, TRUE)
         ON CONFLICT (source_product_id) DO NOTHING",
    )
    .bind(source_product_id)
    .execute(pool)
    .await
    .expect("persist_scored_product failed");
}
