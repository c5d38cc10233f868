//! The correlation token round-tripped with the fetcher.
//!
//! Shape: `crawl-{job_id}-{kind}-{item_id}`. The fetcher echoes it back as
//! `post_id` in webhook callbacks; it is the only link between a callback
//! and the queue item that caused it.

use crate::data::models::UrlKind;
use std::fmt;
use std::str::FromStr;

/// Correlation id of the startup webhook self-test; never refers to a
/// queue item.
pub const SELFTEST_ID: &str = "selftest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId {
    pub job_id: i64,
    pub kind: UrlKind,
    pub item_id: i64,
}

impl CorrelationId {
    pub fn new(job_id: i64, kind: UrlKind, item_id: i64) -> Self {
        Self {
            job_id,
            kind,
            item_id,
        }
    }

    /// Parse a callback's `post_id`. Returns `None` for anything malformed;
    /// the webhook handler acknowledges those without side effects.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("crawl-")?;
        let (job_part, rest) = rest.split_once('-')?;
        let (kind_part, item_part) = rest.split_once('-')?;

        let job_id = job_part.parse::<i64>().ok()?;
        let kind = UrlKind::from_str(kind_part).ok()?;
        let item_id = item_part.parse::<i64>().ok()?;

        Some(Self {
            job_id,
            kind,
            item_id,
        })
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "crawl-{}-{}-{}",
            self.job_id,
            self.kind.as_str(),
            self.item_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display() {
        let id = CorrelationId::new(42, UrlKind::Product, 1337);
        assert_eq!(id.to_string(), "crawl-42-product-1337");
        assert_eq!(CorrelationId::parse("crawl-42-product-1337"), Some(id));
    }

    #[test]
    fn parses_all_kinds() {
        for (kind, name) in [
            (UrlKind::Search, "search"),
            (UrlKind::Pagination, "pagination"),
            (UrlKind::Product, "product"),
        ] {
            let parsed = CorrelationId::parse(&format!("crawl-1-{name}-2")).unwrap();
            assert_eq!(parsed.kind, kind);
        }
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in [
            "",
            "selftest",
            "crawl-",
            "crawl-1-product",
            "crawl-x-product-2",
            "crawl-1-detail-2",
            "crawl-1-product-xyz",
            "scrape-1-product-2",
        ] {
            assert!(CorrelationId::parse(bad).is_none(), "should reject {bad:?}");
        }
    }
}
