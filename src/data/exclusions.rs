//! Database operations for persistent exclusion rules.

use crate::data::models::{ExclusionRule, ExclusionRuleType};
use crate::error::Result;
use sqlx::PgPool;

/// List all rules, oldest first.
pub async fn list(db_pool: &PgPool) -> Result<Vec<ExclusionRule>> {
    let rules = sqlx::query_as::<_, ExclusionRule>("SELECT * FROM exclusion_rules ORDER BY id")
        .fetch_all(db_pool)
        .await?;
    Ok(rules)
}

/// Insert a rule, returning the stored row.
///
/// (rule_type, value) is unique; re-adding an existing rule returns the
/// existing row untouched rather than erroring.
pub async fn add(
    rule_type: ExclusionRuleType,
    value: &str,
    reason: Option<&str>,
    db_pool: &PgPool,
) -> Result<ExclusionRule> {
    let rule = sqlx::query_as::<_, ExclusionRule>(
        "INSERT INTO exclusion_rules (rule_type, value, reason)
         VALUES ($1, $2, $3)
         ON CONFLICT (rule_type, value) DO UPDATE SET value = EXCLUDED.value
         RETURNING *",
    )
    .bind(rule_type)
    .bind(value)
    .bind(reason)
    .fetch_one(db_pool)
    .await?;

    Ok(rule)
}

/// Delete a rule by id. Returns false when no such rule existed.
pub async fn remove(rule_id: i64, db_pool: &PgPool) -> Result<bool> {
    let result = sqlx::query("DELETE FROM exclusion_rules WHERE id = $1")
        .bind(rule_id)
        .execute(db_pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
