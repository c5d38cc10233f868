//! Processing of fetcher callbacks.
//!
//! The webhook handler acknowledges fast and spawns this path in the
//! background; everything heavy (payload download, parsing, queue
//! expansion) happens here with the item still in `submitted` until the
//! final transition. Ghost callbacks (unknown, duplicate, or cancelled
//! correlations) are absorbed without side effects.

use crate::crawler::retry;
use crate::data::crawl_jobs::ProgressField;
use crate::data::models::{CrawlJob, CrawlJobStatus, QueueItem, QueueItemStatus, UrlKind};
use crate::data::{crawl_jobs, crawl_queue, job_logs, scored_products};
use crate::fetcher::{CorrelationId, SELFTEST_ID};
use crate::filter;
use crate::parser;
use crate::state::AppState;
use crate::status::ServiceStatus;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// One result entry of a fetcher callback.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackResult {
    pub success: bool,
    #[allow(dead_code)]
    pub url: Option<String>,
    /// URL from which the rendered payload can be downloaded.
    pub html: Option<String>,
    /// The correlation id we submitted with.
    pub post_id: String,
    pub error: Option<String>,
}

/// Process one callback result end to end.
///
/// Never returns an error: every failure is either absorbed into the
/// item's retry path or logged and dropped (the fetcher always gets its
/// 200 regardless).
pub async fn process_result(state: &AppState, result: CallbackResult) {
    if result.post_id == SELFTEST_ID {
        info!("webhook self-test callback received; public webhook URL is reachable");
        state
            .service_statuses
            .set("webhook", ServiceStatus::Connected);
        return;
    }

    let Some(correlation) = CorrelationId::parse(&result.post_id) else {
        warn!(post_id = %result.post_id, "ignoring callback with malformed correlation id");
        return;
    };

    let db_pool = &state.db_pool;

    let item = match crawl_queue::get(correlation.item_id, db_pool).await {
        Ok(Some(item)) if item.job_id == correlation.job_id => item,
        Ok(_) => {
            debug!(
                post_id = %result.post_id,
                "ghost callback: no matching queue item"
            );
            return;
        }
        Err(e) => {
            warn!(post_id = %result.post_id, error = %e, "failed to resolve queue item");
            return;
        }
    };

    let job = match crawl_jobs::get(item.job_id, db_pool).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            debug!(job_id = item.job_id, "ghost callback: job no longer exists");
            return;
        }
        Err(e) => {
            warn!(job_id = item.job_id, error = %e, "failed to load job for callback");
            return;
        }
    };

    if job.status != CrawlJobStatus::Running {
        debug!(
            job_id = job.id,
            item_id = item.id,
            status = ?job.status,
            "ghost callback for non-running job"
        );
        job_logs::append_best_effort(
            job.id,
            "debug",
            &format!("discarded callback for item {} (job is {:?})", item.id, job.status),
            db_pool,
        )
        .await;
        return;
    }

    if item.status != QueueItemStatus::Submitted {
        debug!(
            job_id = job.id,
            item_id = item.id,
            status = ?item.status,
            "duplicate callback; item already settled"
        );
        return;
    }

    if !result.success {
        let error_text = result
            .error
            .as_deref()
            .unwrap_or("fetcher reported failure without detail");
        fail_item(state, &item, error_text, false).await;
        state
            .scheduler
            .kick(job.id, state.scheduler.pace_delay(), item.url_type.is_discovery());
        return;
    }

    let Some(payload_url) = result.html.as_deref() else {
        fail_item(state, &item, "successful callback carried no payload URL", false).await;
        state
            .scheduler
            .kick(job.id, state.scheduler.pace_delay(), item.url_type.is_discovery());
        return;
    };

    let payload = match state.fetcher.fetch_payload(payload_url).await {
        Ok(payload) => payload,
        Err(e) => {
            fail_item(state, &item, &format!("payload download failed: {e}"), false).await;
            state
                .scheduler
                .kick(job.id, state.scheduler.pace_delay(), item.url_type.is_discovery());
            return;
        }
    };

    match item.url_type {
        UrlKind::Search | UrlKind::Pagination => {
            handle_discovery_result(state, &job, &item, &payload).await;
        }
        UrlKind::Product => {
            handle_product_result(state, &job, &item, &payload).await;
        }
    }
}

/// A search or pagination page: expand discovered URLs into the queue.
async fn handle_discovery_result(state: &AppState, job: &CrawlJob, item: &QueueItem, payload: &[u8]) {
    let db_pool = &state.db_pool;

    let page = match parser::parse_search_page(payload, &item.url) {
        Ok(page) => page,
        Err(e) => {
            let shape = e.is_shape_class();
            fail_item(state, item, &e.to_string(), shape).await;
            state
                .scheduler
                .kick(job.id, state.scheduler.pace_delay(), true);
            return;
        }
    };

    bump(state, job.id, ProgressField::ProductUrlsFound, page.products.len() as i64).await;

    // Dedup against the scored-products store; a stale read only costs a
    // wasted fetch later.
    let candidate_ids: Vec<String> = page
        .products
        .iter()
        .map(|p| p.source_product_id.clone())
        .collect();
    let existing = match scored_products::existing_ids(&candidate_ids, db_pool).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!(job_id = job.id, error = %e, "dedup lookup failed; enqueueing everything");
            Default::default()
        }
    };

    let mut skipped_existing = 0i64;
    let mut enqueued = 0i64;
    for product in &page.products {
        if existing.contains(&product.source_product_id) {
            skipped_existing += 1;
            continue;
        }
        match crawl_queue::enqueue(
            job.id,
            &product.url,
            UrlKind::Product,
            &item.keyword,
            UrlKind::Product.priority(),
            db_pool,
        )
        .await
        {
            Ok(Some(_)) => enqueued += 1,
            Ok(None) => {} // already queued within this job
            Err(e) => warn!(job_id = job.id, error = %e, "failed to enqueue product URL"),
        }
    }
    if skipped_existing > 0 {
        bump(
            state,
            job.id,
            ProgressField::ProductUrlsSkippedExisting,
            skipped_existing,
        )
        .await;
    }

    let mut next_page_note = String::new();
    if let Some(next_url) = &page.next_page_url {
        match crawl_queue::enqueue(
            job.id,
            next_url,
            UrlKind::Pagination,
            &item.keyword,
            UrlKind::Pagination.priority(),
            db_pool,
        )
        .await
        {
            Ok(Some(_)) => next_page_note = format!("; next page queued: {next_url}"),
            Ok(None) => {}
            Err(e) => warn!(job_id = job.id, error = %e, "failed to enqueue pagination URL"),
        }
    }

    job_logs::append_best_effort(
        job.id,
        "info",
        &format!(
            "{} {} yielded {} product(s) ({} new, {} already persisted){}",
            item.url_type.as_str(),
            item.url,
            page.products.len(),
            enqueued,
            skipped_existing,
            next_page_note
        ),
        db_pool,
    )
    .await;

    if complete_item(state, item).await {
        bump(state, job.id, ProgressField::SearchUrlsCompleted, 1).await;
    }

    // Discovery results bypass the warm-up gate so the funnel keeps moving.
    state
        .scheduler
        .kick(job.id, state.scheduler.pace_delay(), true);
}

/// A product page: parse, filter, and hand off to the scoring collaborator.
async fn handle_product_result(state: &AppState, job: &CrawlJob, item: &QueueItem, payload: &[u8]) {
    let db_pool = &state.db_pool;

    let product = match parser::parse_product_page(payload) {
        Ok(product) => product,
        Err(e) => {
            let shape = e.is_shape_class();
            fail_item(state, item, &e.to_string(), shape).await;
            state
                .scheduler
                .kick(job.id, state.scheduler.pace_delay(), false);
            return;
        }
    };

    bump(state, job.id, ProgressField::ProductsParsed, 1).await;

    let rules = match state.exclusions.rules(db_pool).await {
        Ok(rules) => rules,
        Err(e) => {
            warn!(job_id = job.id, error = %e, "failed to load exclusion rules; using empty set");
            Default::default()
        }
    };

    match filter::admit(&product, &job.config, &rules) {
        Ok(()) => match state.score_sink.score(job.id, &product).await {
            Ok(outcome) => {
                if outcome.scored {
                    bump(state, job.id, ProgressField::ProductsScored, 1).await;
                }
                if outcome.passed {
                    bump(state, job.id, ProgressField::ProductsPassedScoring, 1).await;
                }
                job_logs::append_best_effort(
                    job.id,
                    "info",
                    &format!(
                        "product {} ({}) handed to scoring (scored: {}, passed: {})",
                        product.source_product_id, product.name, outcome.scored, outcome.passed
                    ),
                    db_pool,
                )
                .await;
            }
            Err(e) => {
                // Scoring hand-off failures are transient; route the item
                // through the retry path so the record is not lost.
                fail_item(state, item, &format!("scoring hand-off failed: {e}"), false).await;
                state
                    .scheduler
                    .kick(job.id, state.scheduler.pace_delay(), false);
                return;
            }
        },
        Err(reason) => {
            bump(state, job.id, ProgressField::ProductsSkippedFiltered, 1).await;
            job_logs::append_best_effort(
                job.id,
                "info",
                &format!(
                    "product {} ({}) filtered out: {}",
                    product.source_product_id, product.name, reason
                ),
                db_pool,
            )
            .await;
        }
    }

    if complete_item(state, item).await {
        bump(state, job.id, ProgressField::ProductUrlsCompleted, 1).await;
    }

    state
        .scheduler
        .kick(job.id, state.scheduler.pace_delay(), false);
}

async fn fail_item(state: &AppState, item: &QueueItem, error_text: &str, shape_failure: bool) {
    if let Err(e) = retry::handle_item_failure(
        item,
        error_text,
        shape_failure,
        &state.config.pacing,
        &state.db_pool,
    )
    .await
    {
        warn!(item_id = item.id, error = %e, "failed to run item retry handling");
    }
}

async fn complete_item(state: &AppState, item: &QueueItem) -> bool {
    match crawl_queue::mark_completed(item.id, &state.db_pool).await {
        Ok(true) => true,
        Ok(false) => {
            debug!(item_id = item.id, "completion raced; item already settled");
            false
        }
        Err(e) => {
            warn!(item_id = item.id, error = %e, "failed to mark item completed");
            false
        }
    }
}

async fn bump(state: &AppState, job_id: i64, field: ProgressField, delta: i64) {
    if delta == 0 {
        return;
    }
    if let Err(e) = crawl_jobs::bump_progress(job_id, field, delta, &state.db_pool).await {
        warn!(job_id, field = field.as_str(), error = %e, "failed to bump progress counter");
    }
}
