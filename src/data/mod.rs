//! Database models and per-table operation modules.

pub mod crawl_jobs;
pub mod crawl_queue;
pub mod exclusions;
pub mod job_logs;
pub mod models;
pub mod scored_products;
