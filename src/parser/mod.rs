//! Extraction of structured catalog data from fetcher payloads.
//!
//! The fetcher hands us a rendered HTML document (possibly gzipped). The
//! catalog embeds its page state as a JavaScript object assigned to a known
//! token; we slice that object out by brace matching, coerce it to strict
//! JSON, and normalize it into the canonical internal records.

pub mod extract;
pub mod payload;
pub mod product;
pub mod search;

pub use product::{CatalogProduct, ProductVariant};
pub use search::{DiscoveredProduct, SearchPage};

/// Anchor preceding the embedded product-detail object.
const PRODUCT_DATA_ANCHOR: &str = "productDetailData=";

/// Anchor preceding the embedded search-results object (search and
/// pagination pages share it).
const SEARCH_DATA_ANCHOR: &str = "searchResultData=";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The anchor token was absent. Also what an anti-bot block page looks
    /// like, which is why this class is retried on the long cooldown.
    #[error("embedded data object not found in payload")]
    Shape,
    /// The extracted object was not valid JSON after normalization.
    #[error("embedded data object is not valid JSON: {0}")]
    Syntax(String),
    /// Required fields were missing from an otherwise well-formed object.
    #[error("record missing required field: {0}")]
    Incomplete(&'static str),
}

impl ParseError {
    /// Shape and syntax failures both point at the catalog (or a block
    /// page) rather than at one product's data; their recurrence across all
    /// retries of an item escalates to an operator diagnostic.
    pub fn is_shape_class(&self) -> bool {
        matches!(self, Self::Shape | Self::Syntax(_))
    }
}

/// Parse a product-detail payload into the canonical product record.
pub fn parse_product_page(payload: &[u8]) -> Result<CatalogProduct, ParseError> {
    let html = payload::decode(payload)?;
    let value = extract::embedded_object(&html, PRODUCT_DATA_ANCHOR)?;
    product::normalize(&value)
}

/// Parse a search or pagination payload into discovered URLs.
///
/// `page_url` is the URL the page was fetched from; it anchors derived
/// product URLs and the next-page URL.
pub fn parse_search_page(payload: &[u8], page_url: &str) -> Result<SearchPage, ParseError> {
    let html = payload::decode(payload)?;
    let value = extract::embedded_object(&html, SEARCH_DATA_ANCHOR)?;
    search::normalize(&value, page_url)
}
