//! HTTP surface: webhook ingress and the crawl admin API.

pub mod crawl;
pub mod error;
pub mod exclusions;
pub mod routes;
pub mod webhook;

pub use routes::create_router;
