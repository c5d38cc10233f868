//! Web API endpoints: fetcher webhook ingress plus the crawl admin surface.

use axum::{
    Router,
    extract::State,
    response::Json,
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::web::{crawl, exclusions, webhook};

/// Hard ceiling on request handling; the webhook contract requires the
/// acknowledgment well inside this window, with heavy work spawned off.
const INGRESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/crawl/start", post(crawl::start_job))
        .route("/crawl/jobs", get(crawl::list_jobs))
        .route("/crawl/webhook", post(webhook::receive))
        .route("/crawl/{job_id}", get(crawl::get_job).delete(crawl::cancel_job))
        .route("/crawl/{job_id}/logs", get(crawl::tail_logs))
        .route(
            "/exclusions",
            get(exclusions::list_rules).post(exclusions::add_rule),
        )
        .route("/exclusions/{rule_id}", delete(exclusions::remove_rule))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(INGRESS_TIMEOUT))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .with_state(app_state)
}

/// `GET /health` — liveness probe; also the target of the webhook self-test.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /status` — per-service health snapshot.
async fn status(State(state): State<AppState>) -> Json<Value> {
    let services: Vec<Value> = state
        .service_statuses
        .all()
        .into_iter()
        .map(|(name, status, age)| {
            json!({
                "name": name,
                "status": status,
                "updated_secs_ago": age.as_secs(),
            })
        })
        .collect();

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "services": services,
    }))
}
