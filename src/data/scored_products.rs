//! Read-side dedup index over the downstream scored-products store.
//!
//! The crawler only ever reads this table; writes go through the scoring
//! sink. Stale reads are harmless: the worst case is a wasted fetch, since
//! the UNIQUE constraint on `source_product_id` still prevents a double
//! insert.

use crate::error::Result;
use sqlx::PgPool;
use std::collections::HashSet;

/// Which of the candidate catalog product ids are already persisted.
pub async fn existing_ids(
    candidate_ids: &[String],
    db_pool: &PgPool,
) -> Result<HashSet<String>> {
    if candidate_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let existing: Vec<String> = sqlx::query_scalar(
        "SELECT source_product_id FROM scored_products WHERE source_product_id = ANY($1)",
    )
    .bind(candidate_ids)
    .fetch_all(db_pool)
    .await?;

    Ok(existing.into_iter().collect())
}
