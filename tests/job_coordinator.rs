#[allow(dead_code)]
mod helpers;

use prospector::crawler::coordinator;
use prospector::data::models::{CrawlJobStatus, UrlKind};
use sqlx::PgPool;

#[sqlx::test]
async fn start_job_enqueues_one_seed_per_keyword(pool: PgPool) {
    let state = helpers::test_state(&pool);
    let config = helpers::make_config(&["garden tools", "patio lights"]);

    let (job, seeds) = coordinator::start_job(
        config,
        "https://catalog.example",
        &state.scheduler,
        &pool,
    )
    .await
    .unwrap();

    assert_eq!(job.status, CrawlJobStatus::Running);
    assert_eq!(seeds, 2);

    let rows: Vec<(String, UrlKind, i16)> =
        sqlx::query_as("SELECT url, url_type, priority FROM crawl_queue WHERE job_id = $1 ORDER BY id")
            .bind(job.id)
            .fetch_all(&pool)
            .await
            .unwrap();

    assert_eq!(rows.len(), 2);
    assert!(rows[0].0.contains("keyword=garden%20tools"));
    assert!(rows[1].0.contains("keyword=patio%20lights"));
    for (_, kind, priority) in &rows {
        assert_eq!(*kind, UrlKind::Search);
        assert_eq!(*priority, 1, "seeds sit in the discovery tier");
    }
}

#[sqlx::test]
async fn start_job_skips_blank_keywords(pool: PgPool) {
    let state = helpers::test_state(&pool);
    let config = helpers::make_config(&["garden tools", "   "]);

    let (job, seeds) = coordinator::start_job(
        config,
        "https://catalog.example",
        &state.scheduler,
        &pool,
    )
    .await
    .unwrap();

    assert_eq!(seeds, 1);
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crawl_queue WHERE job_id = $1")
        .bind(job.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test]
async fn start_job_rejects_invalid_configs_without_creating_rows(pool: PgPool) {
    let state = helpers::test_state(&pool);
    let mut config = helpers::make_config(&["garden tools"]);
    config.price_min = 50.0;
    config.price_max = 5.0;

    let result = coordinator::start_job(
        config,
        "https://catalog.example",
        &state.scheduler,
        &pool,
    )
    .await;
    assert!(result.is_err());

    let (jobs,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crawl_jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(jobs, 0, "validation happens before persistence");
}

#[sqlx::test]
async fn cancel_job_is_idempotent_through_the_coordinator(pool: PgPool) {
    let job_id = helpers::insert_job(&pool, CrawlJobStatus::Running).await;

    assert_eq!(coordinator::cancel_job(job_id, &pool).await.unwrap(), Some(true));
    assert_eq!(coordinator::cancel_job(job_id, &pool).await.unwrap(), Some(false));
    assert_eq!(coordinator::cancel_job(999_999, &pool).await.unwrap(), None);
}
