//! Seam to the downstream scoring stage.
//!
//! The crawler's responsibility ends at handing over a normalized product
//! record; scoring itself (the formula, semantic analysis, etc.) lives in
//! the downstream collaborator. The trait pins the contract: the sink
//! reports whether the record was scored and whether it passed, and it owns
//! all writes to the scored-products store. The crawler's at-most-one
//! guarantee per catalog product id rests on that store's uniqueness
//! constraint on `source_product_id`.

use crate::error::Result;
use crate::parser::CatalogProduct;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

/// Outcome reported by the scoring collaborator for one product.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreOutcome {
    /// The record was accepted and a score computed.
    pub scored: bool,
    /// The score cleared the pipeline's threshold.
    pub passed: bool,
}

#[async_trait]
pub trait ScoreSink: Send + Sync {
    /// Hand one admitted product to the scoring stage.
    async fn score(&self, job_id: i64, product: &CatalogProduct) -> Result<ScoreOutcome>;
}

/// Store-backed sink: persists the record for the scoring stage to pick up.
///
/// The insert is `ON CONFLICT DO NOTHING`, so a product rediscovered past a
/// stale dedup read is silently dropped rather than duplicated.
pub struct StoreScoreSink {
    db_pool: PgPool,
}

impl StoreScoreSink {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ScoreSink for StoreScoreSink {
    async fn score(&self, job_id: i64, product: &CatalogProduct) -> Result<ScoreOutcome> {
        let data = serde_json::to_value(product)?;

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO scored_products (source_product_id, name, data, passed, job_id)
             VALUES ($1, $2, $3, TRUE, $4)
             ON CONFLICT (source_product_id) DO NOTHING
             RETURNING id",
        )
        .bind(&product.source_product_id)
        .bind(&product.name)
        .bind(data)
        .bind(job_id)
        .fetch_optional(&self.db_pool)
        .await?;

        match inserted {
            Some(_) => Ok(ScoreOutcome {
                scored: true,
                passed: true,
            }),
            None => {
                debug!(
                    source_product_id = %product.source_product_id,
                    "product already persisted; dropped by uniqueness constraint"
                );
                Ok(ScoreOutcome::default())
            }
        }
    }
}
