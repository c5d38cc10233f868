//! Admin API handlers for persistent exclusion rules.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::data::exclusions;
use crate::data::models::ExclusionRuleType;
use crate::state::AppState;
use crate::web::error::{ApiError, db_error};

/// `GET /exclusions` — list all rules.
pub async fn list_rules(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let rules = exclusions::list(&state.db_pool)
        .await
        .map_err(|e| db_error("listing exclusion rules", e))?;

    Ok(Json(json!({ "items": rules })))
}

/// Body of `POST /exclusions`.
#[derive(Debug, Deserialize)]
pub struct AddRuleRequest {
    pub rule_type: ExclusionRuleType,
    pub value: String,
    pub reason: Option<String>,
}

/// `POST /exclusions` — add a rule. Re-adding an existing (type, value)
/// pair returns the existing rule.
pub async fn add_rule(
    State(state): State<AppState>,
    Json(request): Json<AddRuleRequest>,
) -> Result<Json<Value>, ApiError> {
    let value = request.value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request("rule value must not be empty"));
    }

    let rule = exclusions::add(
        request.rule_type,
        value,
        request.reason.as_deref(),
        &state.db_pool,
    )
    .await
    .map_err(|e| db_error("adding exclusion rule", e))?;

    // Make the new rule apply immediately instead of after one cache TTL.
    state.exclusions.invalidate().await;

    Ok(Json(json!({ "rule": rule })))
}

/// `DELETE /exclusions/{rule_id}` — remove a rule.
pub async fn remove_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let removed = exclusions::remove(rule_id, &state.db_pool)
        .await
        .map_err(|e| db_error("removing exclusion rule", e))?;

    if !removed {
        return Err(ApiError::not_found(format!("no exclusion rule {rule_id}")));
    }

    state.exclusions.invalidate().await;

    Ok(Json(json!({ "removed": rule_id })))
}
