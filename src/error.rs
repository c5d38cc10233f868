//! Crate-wide error alias.
//!
//! Library seams define their own thiserror enums (fetcher, parser, filter);
//! orchestration code propagates them through `anyhow` for context chaining.

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
