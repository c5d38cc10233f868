//! Exclusion filtering of parsed products.
//!
//! Two rule sources combine here: the job's configuration snapshot
//! (warehouse/category include/exclude lists and the price band) and the
//! persistent process-wide exclusion rules. Persistent rules are cached in
//! memory and refreshed on a timer; a short TTL bounds how long a stale
//! rule set can be applied.

use crate::data::exclusions;
use crate::data::models::{ExclusionRule, ExclusionRuleType, JobConfig};
use crate::error::Result;
use crate::parser::CatalogProduct;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Why a product was rejected; recorded against the job's filtered counter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("no warehouse in the job's include list")]
    WarehouseNotIncluded,
    #[error("all warehouses excluded (e.g. {0})")]
    WarehouseExcluded(String),
    #[error("no category in the job's include list")]
    CategoryNotIncluded,
    #[error("category excluded: {0}")]
    CategoryExcluded(String),
    #[error("supplier excluded: {0}")]
    SupplierExcluded(String),
    #[error("name matches excluded keyword: {0}")]
    KeywordExcluded(String),
    #[error("sell price {0} outside [{1}, {2}]")]
    PriceOutOfRange(f64, f64, f64),
}

/// Persistent rules split into lookup sets.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    countries: HashSet<String>,
    categories: HashSet<String>,
    suppliers: HashSet<String>,
    keywords: Vec<String>,
}

impl RuleSet {
    pub fn from_rules(rules: &[ExclusionRule]) -> Self {
        let mut set = Self::default();
        for rule in rules {
            match rule.rule_type {
                ExclusionRuleType::Country => {
                    set.countries.insert(rule.value.trim().to_uppercase());
                }
                ExclusionRuleType::Category => {
                    set.categories.insert(rule.value.trim().to_lowercase());
                }
                ExclusionRuleType::Supplier => {
                    set.suppliers.insert(rule.value.trim().to_string());
                }
                ExclusionRuleType::Keyword => {
                    set.keywords.push(rule.value.trim().to_lowercase());
                }
            }
        }
        set
    }
}

/// Decide whether a parsed product is admitted for scoring.
///
/// A product passes only when every clause holds; the first violated clause
/// becomes the recorded reason.
pub fn admit(
    product: &CatalogProduct,
    config: &JobConfig,
    rules: &RuleSet,
) -> Result<(), RejectReason> {
    // Warehouses: at least one warehouse must survive the include list (when
    // non-empty) and the union of job excludes and persistent country rules.
    if !product.warehouses.is_empty() || !config.include_warehouses.is_empty() {
        let include: HashSet<String> = config
            .include_warehouses
            .iter()
            .map(|w| w.trim().to_uppercase())
            .collect();
        let exclude: HashSet<String> = config
            .exclude_warehouses
            .iter()
            .map(|w| w.trim().to_uppercase())
            .collect();

        let mut any_included = false;
        let mut any_admitted = false;
        let mut excluded_example = None;
        for country in &product.warehouses {
            let country = country.trim().to_uppercase();
            if !include.is_empty() && !include.contains(&country) {
                continue;
            }
            any_included = true;
            if exclude.contains(&country) || rules.countries.contains(&country) {
                excluded_example.get_or_insert(country);
                continue;
            }
            any_admitted = true;
        }

        if !any_admitted {
            return Err(match excluded_example {
                Some(country) if any_included => RejectReason::WarehouseExcluded(country),
                _ => RejectReason::WarehouseNotIncluded,
            });
        }
    }

    // Categories: intersection with the include list (when non-empty), no
    // intersection with job excludes or persistent category rules.
    let product_categories: Vec<String> = product
        .category_path
        .iter()
        .map(|c| c.trim().to_lowercase())
        .collect();
    if !config.include_categories.is_empty() {
        let include: HashSet<String> = config
            .include_categories
            .iter()
            .map(|c| c.trim().to_lowercase())
            .collect();
        if !product_categories.iter().any(|c| include.contains(c)) {
            return Err(RejectReason::CategoryNotIncluded);
        }
    }
    let exclude_categories: HashSet<String> = config
        .exclude_categories
        .iter()
        .map(|c| c.trim().to_lowercase())
        .collect();
    for category in &product_categories {
        if exclude_categories.contains(category) || rules.categories.contains(category) {
            return Err(RejectReason::CategoryExcluded(category.clone()));
        }
    }

    // Supplier.
    if let Some(supplier) = &product.supplier_id
        && rules.suppliers.contains(supplier)
    {
        return Err(RejectReason::SupplierExcluded(supplier.clone()));
    }

    // Keywords: substring match against the product name, case-insensitive.
    let name = product.name.to_lowercase();
    for keyword in &rules.keywords {
        if name.contains(keyword.as_str()) {
            return Err(RejectReason::KeywordExcluded(keyword.clone()));
        }
    }

    // Price band: the product's minimum sell price must lie inside it.
    // A non-positive upper bound means "no upper bound".
    let price = product.price_min;
    let max = if config.price_max > 0.0 {
        config.price_max
    } else {
        f64::INFINITY
    };
    if price < config.price_min || price > max {
        return Err(RejectReason::PriceOutOfRange(
            price,
            config.price_min,
            config.price_max,
        ));
    }

    Ok(())
}

struct CacheState {
    rules: Arc<RuleSet>,
    loaded_at: Option<Instant>,
}

/// In-memory cache of the persistent exclusion rules.
///
/// The only process-wide mutable state in the crawler. Loaded at startup,
/// refreshed by the crawler's timer, and invalidated by the admin handlers
/// on writes so their changes apply immediately.
#[derive(Clone)]
pub struct ExclusionCache {
    state: Arc<RwLock<CacheState>>,
    ttl: Duration,
}

impl ExclusionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState {
                rules: Arc::new(RuleSet::default()),
                loaded_at: None,
            })),
            ttl,
        }
    }

    /// Current rule set, re-reading the store when the cache has expired.
    pub async fn rules(&self, db_pool: &PgPool) -> Result<Arc<RuleSet>> {
        {
            let state = self.state.read().await;
            if let Some(loaded_at) = state.loaded_at
                && loaded_at.elapsed() < self.ttl
            {
                return Ok(state.rules.clone());
            }
        }
        self.refresh(db_pool).await
    }

    /// Unconditionally reload from the store.
    pub async fn refresh(&self, db_pool: &PgPool) -> Result<Arc<RuleSet>> {
        let rows = exclusions::list(db_pool).await?;
        let rules = Arc::new(RuleSet::from_rules(&rows));
        debug!(rule_count = rows.len(), "exclusion rules refreshed");

        let mut state = self.state.write().await;
        state.rules = rules.clone();
        state.loaded_at = Some(Instant::now());
        Ok(rules)
    }

    /// Drop the cached copy so the next read reloads.
    pub async fn invalidate(&self) {
        self.state.write().await.loaded_at = None;
    }
}
