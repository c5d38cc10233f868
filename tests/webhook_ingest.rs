#[allow(dead_code)]
mod helpers;

use prospector::crawler::ingest::{self, CallbackResult};
use prospector::data::models::{CrawlJobStatus, QueueItemStatus, UrlKind};
use prospector::status::ServiceStatus;
use sqlx::PgPool;

fn callback(post_id: &str, success: bool) -> CallbackResult {
    CallbackResult {
        success,
        url: Some("https://catalog.example/product/P1.html".to_owned()),
        html: None,
        post_id: post_id.to_owned(),
        error: if success {
            None
        } else {
            Some("HTTP 503 from upstream".to_owned())
        },
    }
}

#[sqlx::test]
async fn selftest_callback_marks_the_webhook_reachable(pool: PgPool) {
    let state = helpers::test_state(&pool);
    state
        .service_statuses
        .set("webhook", ServiceStatus::Starting);

    ingest::process_result(&state, callback("selftest", true)).await;

    assert_eq!(
        state.service_statuses.get("webhook"),
        Some(ServiceStatus::Connected)
    );
}

#[sqlx::test]
async fn malformed_correlation_id_is_ignored(pool: PgPool) {
    let state = helpers::test_state(&pool);
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

    ingest::process_result(&state, callback("not-a-correlation-id", false)).await;

    let (status, retry_count, _) = helpers::item_state(&pool, item_id).await;
    assert_eq!(status, QueueItemStatus::Submitted, "nothing may change");
    assert_eq!(retry_count, 0);
}

#[sqlx::test]
async fn ghost_callback_for_unknown_item_is_absorbed(pool: PgPool) {
    let state = helpers::test_state(&pool);
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;

    ingest::process_result(
        &state,
        callback(&format!("crawl-{job_id}-product-999999"), false),
    )
    .await;

    let progress = helpers::get_progress(&pool, job_id).await;
    assert_eq!(progress.errors, 0, "ghosts cause no error accounting");
}

#[sqlx::test]
async fn callback_for_cancelled_job_causes_no_mutation(pool: PgPool) {
    let state = helpers::test_state(&pool);
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Cancelled).await;
    let item_id = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        QueueItemStatus::Submitted,
        0,
    )
    .await;

    ingest::process_result(
        &state,
        callback(&format!("crawl-{job_id}-product-{item_id}"), false),
    )
    .await;

    let (status, retry_count, _) = helpers::item_state(&pool, item_id).await;
    assert_eq!(status, QueueItemStatus::Submitted, "in-flight items drain naturally");
    assert_eq!(retry_count, 0);
}

#[sqlx::test]
async fn duplicate_callback_for_settled_item_is_a_no_op(pool: PgPool) {
    let state = helpers::test_state(&pool);
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;
    let item_id = helpers::insert_queue_item(
        &pool,
        job_id,
        "https://catalog.example/product/P1.html",
        UrlKind::Product,
        QueueItemStatus::Completed,
        0,
    )
    .await;

    ingest::process_result(
        &state,
        callback(&format!("crawl-{job_id}-product-{item_id}"), false),
    )
    .await;

    let (status, _, _) = helpers::item_state(&pool, item_id).await;
    assert_eq!(status, QueueItemStatus::Completed);
    let progress = helpers::get_progress(&pool, job_id).await;
    assert_eq!(progress.errors, 0);
}

#[sqlx::test]
async fn failed_callback_routes_into_the_retry_path(pool: PgPool) {
    let state = helpers::test_state(&pool);
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

    ingest::process_result(
        &state,
        callback(&format!("crawl-{job_id}-product-{item_id}"), false),
    )
    .await;

    let (status, retry_count, next_attempt_at) = helpers::item_state(&pool, item_id).await;
    assert_eq!(status, QueueItemStatus::Pending);
    assert_eq!(retry_count, 1);
    assert!(next_attempt_at.is_some());

    let progress = helpers::get_progress(&pool, job_id).await;
    assert_eq!(progress.errors, 1);
}

#[sqlx::test]
async fn successful_callback_without_payload_url_is_a_failure(pool: PgPool) {
    let state = helpers::test_state(&pool);
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

    ingest::process_result(
        &state,
        callback(&format!("crawl-{job_id}-product-{item_id}"), true),
    )
    .await;

    let (status, retry_count, _) = helpers::item_state(&pool, item_id).await;
    assert_eq!(status, QueueItemStatus::Pending);
    assert_eq!(retry_count, 1);
}

#[sqlx::test]
async fn repeated_failure_delivery_is_idempotent(pool: PgPool) {
    let state = helpers::test_state(&pool);
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
    let post_id = format!("crawl-{job_id}-product-{item_id}");

    ingest::process_result(&state, callback(&post_id, false)).await;
    // Adversarial redelivery of the very same callback
    ingest::process_result(&state, callback(&post_id, false)).await;

    let (status, retry_count, _) = helpers::item_state(&pool, item_id).await;
    assert_eq!(status, QueueItemStatus::Pending);
    assert_eq!(retry_count, 1, "the duplicate must not advance the ladder");
}
