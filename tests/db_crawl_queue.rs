#[allow(dead_code)]
mod helpers;

use prospector::data::crawl_queue;
use prospector::data::models::{CrawlJobStatus, QueueItemStatus, UrlKind};
use sqlx::PgPool;
use std::time::Duration;

// ── enqueue ─────────────────────────────────────────────────────────

#[sqlx::test]
async fn enqueue_inserts_and_dedupes_within_a_job(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;

    let first = crawl_queue::enqueue(
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        "garden tools",
        UrlKind::Product.priority(),
        &pool,
    )
    .await
    .unwrap();
    assert!(first.is_some(), "first enqueue should insert");

    let second = crawl_queue::enqueue(
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        "garden tools",
        UrlKind::Product.priority(),
        &pool,
    )
    .await
    .unwrap();
    assert!(second.is_none(), "duplicate URL within the job is dropped");

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crawl_queue WHERE job_id = $1")
        .bind(job_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test]
async fn same_url_in_different_jobs_is_not_a_duplicate(pool: PgPool) {
    let job_a = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let job_b = helpers::insert_job(&pool, CrawlJobStatus::Running).await;

    let url = "https://catalog.example/product/P1.html";
    for job_id in [job_a, job_b] {
        let inserted = crawl_queue::enqueue(
            job_id,
            url,
            UrlKind::Product,
            "garden tools",
            UrlKind::Product.priority(),
            &pool,
        )
        .await
        .unwrap();
        assert!(inserted.is_some());
    }
}

// ── claim_next_ready ────────────────────────────────────────────────

#[sqlx::test]
async fn claim_empty_queue_returns_none(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let result = crawl_queue::claim_next_ready(job_id, false, &pool).await.unwrap();
    assert!(result.is_none());
}

#[sqlx::test]
async fn claim_marks_the_item_submitted(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let item_id = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/search?keyword=x&page=1",
        UrlKind::Search,
        QueueItemStatus::Pending,
        0,
    )
    .await;

    let item = crawl_queue::claim_next_ready(job_id, false, &pool)
        .await
        .unwrap()
        .expect("should claim the only pending item");

    assert_eq!(item.id, item_id);
    assert_eq!(item.status, QueueItemStatus::Submitted);
    assert!(item.submitted_at.is_some(), "submitted_at should be stamped");

    let (status, _, _) = helpers::item_state(&pool, item_id).await;
    assert_eq!(status, QueueItemStatus::Submitted);
}

#[sqlx::test]
async fn claim_prefers_the_discovery_tier(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    for i in 0..10 {
        helpers::insert_queue_item(
            &pool,
            job_id,
            &format!("https://catalog.example/product/P{i}.html"),
            UrlKind::Product,
            QueueItemStatus::Pending,
            0,
        )
        .await;
    }
    helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/search?keyword=x&page=2",
        UrlKind::Pagination,
        QueueItemStatus::Pending,
        0,
    )
    .await;

    let item = crawl_queue::claim_next_ready(job_id, false, &pool)
        .await
        .unwrap()
        .expect("should claim an item");
    assert_eq!(
        item.url_type,
        UrlKind::Pagination,
        "priority 1 must be claimed before priority 2"
    );
}

#[sqlx::test]
async fn claim_skips_items_with_future_next_attempt(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let item_id = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        QueueItemStatus::Pending,
        1,
    )
    .await;
    helpers::set_next_attempt(&pool, item_id, 3600).await;

    let result = crawl_queue::claim_next_ready(job_id, false, &pool).await.unwrap();
    assert!(result.is_none(), "future next_attempt_at items are not ready");

    helpers::set_next_attempt(&pool, item_id, -5).await;
    let result = crawl_queue::claim_next_ready(job_id, false, &pool).await.unwrap();
    assert!(result.is_some(), "elapsed next_attempt_at items are ready");
}

#[sqlx::test]
async fn claim_discovery_only_ignores_product_items(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        QueueItemStatus::Pending,
        0,
    )
    .await;

    let result = crawl_queue::claim_next_ready(job_id, true, &pool).await.unwrap();
    assert!(result.is_none(), "discovery-only claim must not take products");
}

#[sqlx::test]
async fn claim_does_not_cross_job_boundaries(pool: PgPool) {
    let job_a = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let job_b = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    helpers::insert_queue_item(
        &pool,
        job_a,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        QueueItemStatus::Pending,
        0,
    )
    .await;

    let result = crawl_queue::claim_next_ready(job_b, false, &pool).await.unwrap();
    assert!(result.is_none(), "claims are scoped to the requested job");
}

// ── transitions ─────────────────────────────────────────────────────

#[sqlx::test]
async fn mark_completed_requires_submitted(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let item_id = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        QueueItemStatus::Submitted,
        0,
    )
    .await;

    assert!(crawl_queue::mark_completed(item_id, &pool).await.unwrap());
    // A duplicate callback cannot complete the item twice
    assert!(!crawl_queue::mark_completed(item_id, &pool).await.unwrap());

    let (status, _, _) = helpers::item_state(&pool, item_id).await;
    assert_eq!(status, QueueItemStatus::Completed);
}

#[sqlx::test]
async fn schedule_retry_returns_item_to_pending(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let item_id = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        QueueItemStatus::Submitted,
        0,
    )
    .await;

    let next = chrono::Utc::now() + chrono::Duration::seconds(900);
    crawl_queue::schedule_retry(item_id, next, "HTTP 503", false, &pool)
        .await
        .unwrap();

    let (status, retry_count, next_attempt_at) = helpers::item_state(&pool, item_id).await;
    assert_eq!(status, QueueItemStatus::Pending);
    assert_eq!(retry_count, 1);
    let next_attempt_at = next_attempt_at.expect("next_attempt_at should be set");
    assert!((next_attempt_at - next).num_seconds().abs() < 2);
}

#[sqlx::test]
async fn mark_failed_is_terminal_and_keeps_retry_count(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let item_id = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        QueueItemStatus::Submitted,
        3,
    )
    .await;

    let failed = crawl_queue::mark_failed(item_id, "gave up", false, &pool)
        .await
        .unwrap()
        .expect("should transition");
    assert_eq!(failed.status, QueueItemStatus::Failed);
    assert_eq!(failed.retry_count, 3);
    assert_eq!(failed.error_message.as_deref(), Some("gave up"));

    // Terminal: neither completion nor another failure applies
    assert!(!crawl_queue::mark_completed(item_id, &pool).await.unwrap());
    assert!(
        crawl_queue::mark_failed(item_id, "again", false, &pool)
            .await
            .unwrap()
            .is_none()
    );
}

// ── counts and shapes ───────────────────────────────────────────────

#[sqlx::test]
async fn count_by_state_reports_all_states(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    for (i, status) in [
        QueueItemStatus::Pending,
        QueueItemStatus::Pending,
        QueueItemStatus::Submitted,
        QueueItemStatus::Completed,
        QueueItemStatus::Failed,
    ]
    .into_iter()
    .enumerate()
    {
        helpers::insert_queue_item(
            &pool,
            job_id,
            &format!("https://catalog.example/product/P{i}.html"),
            UrlKind::Product,
            status,
            0,
        )
        .await;
    }

    let counts = crawl_queue::count_by_state(job_id, &pool).await.unwrap();
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.submitted, 1);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 1);
    assert!(!counts.is_drained());
}

#[sqlx::test]
async fn ready_shape_separates_tiers(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/search?keyword=x&page=1",
        UrlKind::Search,
        QueueItemStatus::Submitted,
        0,
    )
    .await;
    for i in 0..3 {
        helpers::insert_queue_item(
            &pool,
            job_id,
            &format!("https://catalog.example/product/P{i}.html"),
            UrlKind::Product,
            QueueItemStatus::Pending,
            0,
        )
        .await;
    }
    let delayed = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/PX.html",
        UrlKind::Product,
        QueueItemStatus::Pending,
        1,
    )
    .await;
    helpers::set_next_attempt(&pool, delayed, 3600).await;

    let shape = crawl_queue::ready_shape(job_id, &pool).await.unwrap();
    assert_eq!(shape.discovery_ready, 0);
    assert_eq!(shape.product_ready, 3, "delayed item is not ready");
    assert_eq!(shape.discovery_in_flight, 1);
}

// ── sweeper recovery ────────────────────────────────────────────────

#[sqlx::test]
async fn revive_stale_submitted_returns_item_to_pending(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let stale = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        QueueItemStatus::Submitted,
        0,
    )
    .await;
    helpers::backdate_submitted(&pool, stale, 3600).await;

    let fresh = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/P2.html",
        UrlKind::Product,
        QueueItemStatus::Submitted,
        0,
    )
    .await;

    let (revived, failed) =
        crawl_queue::revive_stale_submitted(Duration::from_secs(1800), 3, &pool)
            .await
            .unwrap();
    assert_eq!((revived, failed), (1, 0));

    let (status, retry_count, _) = helpers::item_state(&pool, stale).await;
    assert_eq!(status, QueueItemStatus::Pending);
    assert_eq!(retry_count, 1);

    let (status, _, _) = helpers::item_state(&pool, fresh).await;
    assert_eq!(status, QueueItemStatus::Submitted, "fresh items untouched");
}

#[sqlx::test]
async fn revive_stale_submitted_fails_exhausted_items(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let stale = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        QueueItemStatus::Submitted,
        3,
    )
    .await;
    helpers::backdate_submitted(&pool, stale, 3600).await;

    let (revived, failed) =
        crawl_queue::revive_stale_submitted(Duration::from_secs(1800), 3, &pool)
            .await
            .unwrap();
    assert_eq!((revived, failed), (0, 1));

    let (status, retry_count, _) = helpers::item_state(&pool, stale).await;
    assert_eq!(status, QueueItemStatus::Failed);
    assert_eq!(retry_count, 3, "retry_count never exceeds the allowance");
}

#[sqlx::test]
async fn jobs_with_ready_items_skips_non_running_jobs(pool: PgPool) {
    let running = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let cancelled = helpers::insert_job(&pool, CrawlJobStatus::Cancelled).await;
    for job_id in [running, cancelled] {
        helpers::insert_queue_item(
            &pool,
            job_id,
            "https://catalog.example/product/P1.html",
            UrlKind::Product,
            QueueItemStatus::Pending,
            0,
        )
        .await;
    }

    let jobs = crawl_queue::jobs_with_ready_items(&pool).await.unwrap();
    assert_eq!(jobs, vec![running]);
}
