//! Row models and enum types for the crawl schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Lifecycle state of a crawl job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "crawl_job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CrawlJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl CrawlJobStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Lifecycle state of a single queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "queue_item_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    Pending,
    Submitted,
    Completed,
    Failed,
}

/// What a queue item's URL points at, determining how its payload is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "url_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    Search,
    Pagination,
    Product,
}

impl UrlKind {
    /// Search and pagination pages feed the discovery funnel; they submit at
    /// the discovery priority tier and bypass the warm-up gate.
    pub fn is_discovery(&self) -> bool {
        matches!(self, Self::Search | Self::Pagination)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Pagination => "pagination",
            Self::Product => "product",
        }
    }

    /// Priority tier items of this kind are enqueued at.
    pub fn priority(&self) -> i16 {
        if self.is_discovery() {
            PRIORITY_DISCOVERY
        } else {
            PRIORITY_PRODUCT
        }
    }
}

impl std::str::FromStr for UrlKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Self::Search),
            "pagination" => Ok(Self::Pagination),
            "product" => Ok(Self::Product),
            _ => Err(()),
        }
    }
}

/// Kind of a persistent exclusion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "exclusion_rule_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExclusionRuleType {
    Country,
    Category,
    Supplier,
    Keyword,
}

/// Priority tier for discovery work (seed searches and pagination).
pub const PRIORITY_DISCOVERY: i16 = 1;
/// Priority tier for product-detail work.
pub const PRIORITY_PRODUCT: i16 = 2;

/// Configuration snapshot captured when a job is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    pub keywords: Vec<String>,
    pub price_min: f64,
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

/// Progress counter bundle exposed verbatim on the admin API.
///
/// Counters only ever increase within a job's lifetime; they are bumped
/// atomically in the store and may transiently lag the per-item transitions
/// they summarize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub search_urls_submitted: i64,
    pub search_urls_completed: i64,
    pub product_urls_found: i64,
    pub product_urls_skipped_existing: i64,
    pub product_urls_submitted: i64,
    pub product_urls_completed: i64,
    pub products_parsed: i64,
    pub products_skipped_filtered: i64,
    pub products_scored: i64,
    pub products_passed_scoring: i64,
    pub errors: i64,
}

/// A crawl run over the catalog for one keyword set.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CrawlJob {
    pub id: i64,
    pub status: CrawlJobStatus,
    pub config: Json<JobConfig>,
    pub progress: Json<Progress>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One unit of crawl work owned by a job.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct QueueItem {
    pub id: i64,
    pub job_id: i64,
    pub url: String,
    pub url_type: UrlKind,
    pub keyword: String,
    pub priority: i16,
    pub status: QueueItemStatus,
    pub retry_count: i32,
    pub shape_failures: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// A persistent inclusion/exclusion rule applied to candidate products.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExclusionRule {
    pub id: i64,
    pub rule_type: ExclusionRuleType,
    pub value: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-state item counts for one job.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub submitted: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueCounts {
    /// The completion condition: nothing left to submit and nothing in flight.
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.submitted == 0
    }
}

/// One line of a job's operator-visible log stream.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobLogLine {
    pub id: i64,
    pub job_id: i64,
    pub ts: DateTime<Utc>,
    pub level: String,
    pub msg: String,
}
