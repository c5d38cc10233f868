//! Fetcher webhook ingress.
//!
//! The contract with the fetcher is strict in one direction only: we always
//! answer 200 OK quickly, whatever the payload says, so the fetcher never
//! retries a delivery because of us. All real work is spawned onto
//! background tasks; a result's queue item stays `submitted` until its
//! task performs the transition.

use crate::crawler::ingest::{self, CallbackResult};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

/// Callback body shape delivered by the fetcher.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[allow(dead_code)]
    pub status: Option<String>,
    #[serde(default)]
    pub results: Vec<CallbackResult>,
}

/// `POST /crawl/webhook` — receive a batch of fetcher results.
pub async fn receive(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let mut deserializer = serde_json::Deserializer::from_slice(&body);
    let payload: WebhookPayload = match serde_path_to_error::deserialize(&mut deserializer) {
        Ok(payload) => payload,
        Err(e) => {
            // Malformed bodies are acknowledged too; a 4xx would only make
            // the fetcher redeliver the same garbage.
            warn!(error = %e, "discarding malformed webhook body");
            return StatusCode::OK;
        }
    };

    debug!(result_count = payload.results.len(), "webhook batch received");

    for result in payload.results {
        let state = state.clone();
        tokio::spawn(async move {
            ingest::process_result(&state, result).await;
        });
    }

    StatusCode::OK
}
