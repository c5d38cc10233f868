//! Application state shared across components (web, crawler, webhook path).

use crate::config::Config;
use crate::crawler::scheduler::Scheduler;
use crate::fetcher::FetcherClient;
use crate::filter::ExclusionCache;
use crate::scoring::ScoreSink;
use crate::status::ServiceStatusRegistry;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    pub fetcher: Arc<FetcherClient>,
    pub scheduler: Scheduler,
    pub exclusions: ExclusionCache,
    pub score_sink: Arc<dyn ScoreSink>,
    pub service_statuses: ServiceStatusRegistry,
}

impl AppState {
    pub fn new(
        db_pool: PgPool,
        config: Arc<Config>,
        fetcher: Arc<FetcherClient>,
        scheduler: Scheduler,
        score_sink: Arc<dyn ScoreSink>,
    ) -> Self {
        let exclusions = ExclusionCache::new(config.exclusion_cache_ttl);
        Self {
            db_pool,
            config,
            fetcher,
            scheduler,
            exclusions,
            score_sink,
            service_statuses: ServiceStatusRegistry::new(),
        }
    }
}
