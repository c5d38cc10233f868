//! Normalization of search and pagination pages into discovered URLs.

use super::ParseError;
use serde_json::Value;
use url::Url;

/// A product reference discovered on a search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredProduct {
    /// Catalog-native product id, used for dedup before enqueueing.
    pub source_product_id: String,
    pub url: String,
}

/// Extracted content of one search or pagination page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPage {
    pub products: Vec<DiscoveredProduct>,
    pub next_page_url: Option<String>,
}

/// Normalize the embedded search-results object.
///
/// Product URLs missing from the object are derived from the page origin
/// and the product id. The next-page URL is taken verbatim when present,
/// otherwise derived by rewriting the `page` query parameter while
/// `pageNum < totalPages`.
pub fn normalize(value: &Value, page_url: &str) -> Result<SearchPage, ParseError> {
    let entries = value
        .get("products")
        .and_then(Value::as_array)
        .ok_or(ParseError::Incomplete("products"))?;

    let origin = page_origin(page_url);

    let mut products = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(id) = entry
            .get("productId")
            .and_then(id_string)
        else {
            // Entries without an id cannot be deduplicated; skip them
            continue;
        };
        let url = match entry.get("productUrl").and_then(Value::as_str) {
            Some(u) if !u.trim().is_empty() => absolutize(u.trim(), origin.as_ref()),
            _ => match origin.as_ref() {
                Some(origin) => format!("{origin}/product/{id}.html"),
                None => continue,
            },
        };
        products.push(DiscoveredProduct {
            source_product_id: id,
            url,
        });
    }

    let next_page_url = match value.get("nextPageUrl").and_then(Value::as_str) {
        Some(u) if !u.trim().is_empty() => Some(absolutize(u.trim(), origin.as_ref())),
        _ => derived_next_page(value, page_url),
    };

    Ok(SearchPage {
        products,
        next_page_url,
    })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Scheme + host of the page URL, e.g. "https://catalog.example".
fn page_origin(page_url: &str) -> Option<String> {
    let url = Url::parse(page_url).ok()?;
    let host = url.host_str()?;
    Some(format!("{}://{}", url.scheme(), host))
}

/// Resolve a possibly relative URL against the page origin.
fn absolutize(candidate: &str, origin: Option<&String>) -> String {
    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return candidate.to_string();
    }
    match origin {
        Some(origin) => format!("{}/{}", origin, candidate.trim_start_matches('/')),
        None => candidate.to_string(),
    }
}

/// Next-page URL derived from pageNum/totalPages by rewriting the `page`
/// query parameter of the current URL.
fn derived_next_page(value: &Value, page_url: &str) -> Option<String> {
    let page_num = value.get("pageNum").and_then(Value::as_i64)?;
    let total_pages = value.get("totalPages").and_then(Value::as_i64)?;
    if page_num >= total_pages {
        return None;
    }

    let mut url = Url::parse(page_url).ok()?;
    let next = (page_num + 1).to_string();
    let others: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &others {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("page", &next);
    }
    Some(url.to_string())
}
