//! Normalization of the embedded product-detail object into the canonical
//! internal record.
//!
//! The catalog's object is loosely typed: prices and weights arrive as
//! numbers or as "low - high" range strings, warehouses as country-code
//! strings or as objects, the category path as a delimited string or an
//! array. Normalization is tolerant of all observed spellings and strict
//! only about the fields the pipeline cannot work without.

use super::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical product record handed to the exclusion filter and the scoring
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    /// Catalog-native product id; the dedup key downstream.
    pub source_product_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub price_min: f64,
    pub price_max: f64,
    pub weight_min: Option<f64>,
    pub weight_max: Option<f64>,
    pub category_path: Vec<String>,
    pub supplier_id: Option<String>,
    /// Country codes of warehouses stocking the product.
    pub warehouses: Vec<String>,
    pub variants: Vec<ProductVariant>,
    pub images: Vec<String>,
    pub inventory: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub sku: String,
    pub sell_price: Option<f64>,
    pub suggest_price: Option<f64>,
    pub weight: Option<f64>,
    pub pack_weight: Option<f64>,
}

/// Normalize the extracted data object into a [`CatalogProduct`].
pub fn normalize(value: &Value) -> Result<CatalogProduct, ParseError> {
    let source_product_id =
        id_string(value.get("productId")).ok_or(ParseError::Incomplete("productId"))?;
    let name = str_field(value.get("productName")).ok_or(ParseError::Incomplete("productName"))?;

    let variants = variant_list(value.get("variants"));

    // Price range: variants are authoritative when present, the top-level
    // sellPrice (number or "low - high") otherwise.
    let variant_prices: Vec<f64> = variants.iter().filter_map(|v| v.sell_price).collect();
    let (price_min, price_max) = if variant_prices.is_empty() {
        range(value.get("sellPrice")).ok_or(ParseError::Incomplete("sellPrice"))?
    } else {
        let min = variant_prices.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = variant_prices
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    };

    let (weight_min, weight_max) = match range(value.get("weight")) {
        Some((lo, hi)) => (Some(lo), Some(hi)),
        None => {
            let weights: Vec<f64> = variants.iter().filter_map(|v| v.weight).collect();
            if weights.is_empty() {
                (None, None)
            } else {
                (
                    Some(weights.iter().cloned().fold(f64::INFINITY, f64::min)),
                    Some(weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
                )
            }
        }
    };

    Ok(CatalogProduct {
        source_product_id,
        name,
        sku: str_field(value.get("productSku")),
        price_min,
        price_max,
        weight_min,
        weight_max,
        category_path: category_path(value.get("categoryPath")),
        supplier_id: id_string(value.get("supplierId")),
        warehouses: warehouse_countries(value.get("warehouses")),
        variants,
        images: string_list(value.get("images")),
        inventory: value.get("inventory").and_then(Value::as_i64),
    })
}

/// A non-empty string, from a string or numeric value.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// A number, possibly spelled as a string.
fn num(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// A (min, max) range from a number, a numeric string, or a "low - high"
/// range string (the separator may be "-" or "--", padded or not).
fn range(value: Option<&Value>) -> Option<(f64, f64)> {
    let value = value?;
    if let Some(n) = num(value) {
        return Some((n, n));
    }
    let s = value.as_str()?;
    let (lo, hi) = s.split_once('-')?;
    let lo = lo.trim().parse::<f64>().ok()?;
    let hi = hi.trim_matches(|c: char| c == '-' || c.is_whitespace()).parse::<f64>().ok()?;
    Some((lo.min(hi), lo.max(hi)))
}

/// Category path from "A > B > C" or ["A", "B", "C"].
fn category_path(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split('>')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| str_field(Some(v)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Warehouse country codes from ["US", ...] or [{"countryCode": "US"}, ...].
fn warehouse_countries(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    let mut countries: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_uppercase()),
            Value::Object(_) => {
                str_field(item.get("countryCode")).map(|code| code.to_uppercase())
            }
            _ => None,
        })
        .collect();
    countries.dedup();
    countries
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| str_field(Some(v))).collect(),
        _ => Vec::new(),
    }
}

fn variant_list(value: Option<&Value>) -> Vec<ProductVariant> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let sku = str_field(item.get("sku"))?;
            Some(ProductVariant {
                sku,
                sell_price: item.get("sellPrice").and_then(num),
                suggest_price: item.get("suggestSellPrice").and_then(num),
                weight: item.get("weight").and_then(num),
                pack_weight: item.get("packWeight").and_then(num),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_product() -> Value {
        json!({
            "productId": "P100234",
            "productName": "Garden Pruning Shears",
            "productSku": "CJ-GD-001",
            "sellPrice": "4.99 - 12.99",
            "weight": "120 - 340",
            "categoryPath": "Home & Garden > Garden Tools",
            "supplierId": "S-8891",
            "warehouses": [{"countryCode": "US"}, {"countryCode": "CN"}],
            "inventory": 1200,
            "images": ["https://img.example/1.jpg"],
            "variants": [
                {"sku": "CJ-GD-001-A", "sellPrice": 4.99, "suggestSellPrice": 9.99, "weight": 120, "packWeight": 150},
                {"sku": "CJ-GD-001-B", "sellPrice": 12.99, "suggestSellPrice": 19.99, "weight": 340, "packWeight": 380}
            ]
        })
    }

    #[test]
    fn normalizes_a_complete_record() {
        let product = normalize(&full_product()).unwrap();
        assert_eq!(product.source_product_id, "P100234");
        assert_eq!(product.name, "Garden Pruning Shears");
        assert_eq!(product.sku.as_deref(), Some("CJ-GD-001"));
        assert_eq!(product.price_min, 4.99);
        assert_eq!(product.price_max, 12.99);
        assert_eq!(product.category_path, vec!["Home & Garden", "Garden Tools"]);
        assert_eq!(product.warehouses, vec!["US", "CN"]);
        assert_eq!(product.variants.len(), 2);
        assert_eq!(product.inventory, Some(1200));
    }

    #[test]
    fn variant_prices_take_precedence_over_top_level_range() {
        let mut value = full_product();
        value["sellPrice"] = json!("1.00 - 99.00");
        let product = normalize(&value).unwrap();
        assert_eq!((product.price_min, product.price_max), (4.99, 12.99));
    }

    #[test]
    fn single_price_collapses_to_degenerate_range() {
        let mut value = full_product();
        value["variants"] = json!([]);
        value["sellPrice"] = json!(7.5);
        let product = normalize(&value).unwrap();
        assert_eq!((product.price_min, product.price_max), (7.5, 7.5));
    }

    #[test]
    fn missing_id_is_incomplete() {
        let mut value = full_product();
        value.as_object_mut().unwrap().remove("productId");
        assert!(matches!(
            normalize(&value),
            Err(ParseError::Incomplete("productId"))
        ));
    }

    #[test]
    fn missing_name_is_incomplete() {
        let mut value = full_product();
        value["productName"] = json!("");
        assert!(matches!(
            normalize(&value),
            Err(ParseError::Incomplete("productName"))
        ));
    }

    #[test]
    fn missing_all_prices_is_incomplete() {
        let mut value = full_product();
        value["variants"] = json!([]);
        value.as_object_mut().unwrap().remove("sellPrice");
        assert!(matches!(
            normalize(&value),
            Err(ParseError::Incomplete("sellPrice"))
        ));
    }

    #[test]
    fn numeric_product_id_is_stringified() {
        let mut value = full_product();
        value["productId"] = json!(100234);
        let product = normalize(&value).unwrap();
        assert_eq!(product.source_product_id, "100234");
    }

    #[test]
    fn plain_country_strings_are_accepted() {
        let mut value = full_product();
        value["warehouses"] = json!(["us", "DE"]);
        let product = normalize(&value).unwrap();
        assert_eq!(product.warehouses, vec!["US", "DE"]);
    }

    #[test]
    fn normalization_is_deterministic() {
        let value = full_product();
        assert_eq!(normalize(&value).unwrap(), normalize(&value).unwrap());
    }
}
