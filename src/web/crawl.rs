//! Admin API handlers for crawl jobs.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::crawler::coordinator;
use crate::data::models::{CrawlJob, JobConfig};
use crate::data::{crawl_jobs, crawl_queue, job_logs};
use crate::state::AppState;
use crate::web::error::{ApiError, db_error};

/// Body of `POST /crawl/start`.
#[derive(Debug, Deserialize)]
pub struct StartJobRequest {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub price_min: f64,
    #[serde(default)]
    pub price_max: f64,
    #[serde(default)]
    pub include_warehouses: Vec<String>,
    #[serde(default)]
    pub exclude_warehouses: Vec<String>,
    #[serde(default)]
    pub include_categories: Vec<String>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
}

impl From<StartJobRequest> for JobConfig {
    fn from(request: StartJobRequest) -> Self {
        JobConfig {
            keywords: request.keywords,
            price_min: request.price_min,
            price_max: request.price_max,
            include_warehouses: request.include_warehouses,
            exclude_warehouses: request.exclude_warehouses,
            include_categories: request.include_categories,
            exclude_categories: request.exclude_categories,
        }
    }
}

/// `POST /crawl/start` — create a job and enqueue its seed searches.
pub async fn start_job(
    State(state): State<AppState>,
    Json(request): Json<StartJobRequest>,
) -> Result<Json<Value>, ApiError> {
    let config: JobConfig = request.into();
    coordinator::validate_config(&config).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let (job, seeds) = coordinator::start_job(
        config,
        &state.config.catalog_base_url,
        &state.scheduler,
        &state.db_pool,
    )
    .await
    .map_err(|e| db_error("starting crawl job", e))?;

    Ok(Json(json!({
        "job_id": job.id,
        "status": job.status,
        "search_urls_submitted": seeds,
    })))
}

/// `GET /crawl/jobs` — list all jobs.
pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let jobs: Vec<CrawlJob> = crawl_jobs::list(&state.db_pool)
        .await
        .map_err(|e| db_error("listing crawl jobs", e))?;

    Ok(Json(json!({ "items": jobs })))
}

/// `GET /crawl/{job_id}` — full job record with progress and queue counts.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let job = crawl_jobs::get(job_id, &state.db_pool)
        .await
        .map_err(|e| db_error("loading crawl job", e))?
        .ok_or_else(|| ApiError::not_found(format!("no crawl job {job_id}")))?;

    let queue = crawl_queue::count_by_state(job_id, &state.db_pool)
        .await
        .map_err(|e| db_error("counting queue items", e))?;

    Ok(Json(json!({
        "job": job,
        "queue": queue,
    })))
}

/// `DELETE /crawl/{job_id}` — cancel a job. Idempotent.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let changed = coordinator::cancel_job(job_id, &state.db_pool)
        .await
        .map_err(|e| db_error("cancelling crawl job", e))?
        .ok_or_else(|| ApiError::not_found(format!("no crawl job {job_id}")))?;

    let status = crawl_jobs::status(job_id, &state.db_pool)
        .await
        .map_err(|e| db_error("loading job status", e))?;

    Ok(Json(json!({
        "job_id": job_id,
        "status": status,
        "cancelled_now": changed,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Return lines with id strictly greater than this cursor.
    #[serde(default)]
    pub since: i64,
}

/// Page size cap for the log tail endpoint.
const LOG_TAIL_LIMIT: i64 = 500;

/// `GET /crawl/{job_id}/logs?since=N` — tail a job's operator log stream.
pub async fn tail_logs(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Value>, ApiError> {
    if crawl_jobs::get(job_id, &state.db_pool)
        .await
        .map_err(|e| db_error("loading crawl job", e))?
        .is_none()
    {
        return Err(ApiError::not_found(format!("no crawl job {job_id}")));
    }

    let lines = job_logs::tail(job_id, query.since, LOG_TAIL_LIMIT, &state.db_pool)
        .await
        .map_err(|e| db_error("tailing job logs", e))?;

    Ok(Json(json!({ "logs": lines })))
}
