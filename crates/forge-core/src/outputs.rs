//! Tagged stage outputs
//!
//! Every JSON stage result is decoded exactly once, at the stage boundary,
//! into a [`StageOutput`]. Downstream code matches on the tag and never
//! walks raw JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Decoded result of one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput<T> {
    /// Output matched the expected shape
    Known(T),
    /// Output present but of unknown shape
    Opaque(Value),
    /// Stage degraded, skipped, or returned nothing
    Empty,
}

impl<T: DeserializeOwned> StageOutput<T> {
    /// Decode a raw tool response
    ///
    /// `null`, `{}`, `[]` and blank strings are `Empty`. Strings holding JSON
    /// are parsed first.
    #[must_use]
    pub fn decode(value: &Value) -> Self {
        let parsed;
        let value = match value {
            Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
                Ok(inner) if inner.is_object() || inner.is_array() => {
                    parsed = inner;
                    &parsed
                }
                _ if text.trim().is_empty() => return Self::Empty,
                _ => return Self::Opaque(value.clone()),
            },
            other => other,
        };

        if is_blank(value) {
            return Self::Empty;
        }
        match serde_json::from_value::<T>(value.clone()) {
            Ok(known) => Self::Known(known),
            Err(e) => {
                tracing::debug!(error = %e, "stage output kept as opaque JSON");
                Self::Opaque(value.clone())
            }
        }
    }
}

impl<T> StageOutput<T> {
    /// Known value, if decoded
    #[inline]
    #[must_use]
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(value) => Some(value),
            _ => None,
        }
    }

    /// Check if the stage contributed nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Short tag for logs and reports
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Known(_) => "known",
            Self::Opaque(_) => "opaque",
            Self::Empty => "empty",
        }
    }
}

impl<T> Default for StageOutput<T> {
    fn default() -> Self {
        Self::Empty
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Render a loosely typed attribute value as text
#[must_use]
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.trim().to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        other => Some(other.to_string()),
    }
}

/// Price that tolerates tool sloppiness
///
/// Accepts numbers and numeric strings (`"$49.99"`, `"12,50"`). Anything
/// else reads as no price instead of failing the enclosing struct.
fn lenient_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => {
            let cleaned: String = text
                .trim()
                .trim_start_matches(|c: char| !c.is_ascii_digit())
                .replace(',', ".");
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
    .filter(|price| price.is_finite()))
}

/// Vision analysis findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisionFindings {
    /// Recognised product name
    #[serde(alias = "name", alias = "title")]
    pub product_name: Option<String>,
    /// Visual description
    pub description: Option<String>,
    /// Product category
    pub category: Option<String>,
    /// Brand, if visible
    pub brand: Option<String>,
    /// Dominant colours
    pub colors: Vec<String>,
    /// Materials
    pub materials: Vec<String>,
    /// Free-form attributes
    pub attributes: BTreeMap<String, Value>,
}

/// Reverse-image search findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchFindings {
    /// Pages showing the same or a similar product
    #[serde(alias = "results", alias = "matches")]
    pub pages: Vec<SearchPage>,
}

/// One search hit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchPage {
    /// Page URL
    #[serde(alias = "link")]
    pub url: String,
    /// Page title
    pub title: Option<String>,
}

impl SearchFindings {
    /// Distinct non-empty page URLs, in result order, at most `max`
    #[must_use]
    pub fn candidate_urls(&self, max: usize) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for page in &self.pages {
            let url = page.url.trim();
            if url.is_empty() || urls.iter().any(|u| u == url) {
                continue;
            }
            if urls.len() == max {
                break;
            }
            urls.push(url.to_string());
        }
        urls
    }
}

/// Scrape findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScrapeFindings {
    /// Scraped pages
    pub pages: Vec<ScrapedPage>,
}

/// One scraped page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScrapedPage {
    /// Page URL
    pub url: String,
    /// Product title found on the page
    pub title: Option<String>,
    /// Listed price
    #[serde(deserialize_with = "lenient_price")]
    pub price: Option<f64>,
}

/// Market analysis findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarketFindings {
    /// Average competitor price
    #[serde(alias = "avgPrice", deserialize_with = "lenient_price")]
    pub average_price: Option<f64>,
    /// Lowest observed price
    #[serde(deserialize_with = "lenient_price")]
    pub min_price: Option<f64>,
    /// Highest observed price
    #[serde(deserialize_with = "lenient_price")]
    pub max_price: Option<f64>,
    /// Currency of the prices
    pub currency: Option<String>,
    /// Positioning summary
    pub positioning: Option<String>,
}

/// Audience definition findings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudienceProfile {
    /// Primary audience description
    pub primary_audience: Option<String>,
    /// Audience segments
    pub segments: Vec<String>,
    /// Keywords the audience searches for
    pub keywords: Vec<String>,
}

/// Refined marketplace content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefinedContent {
    /// Listing title
    pub title: Option<String>,
    /// Listing description
    pub description: Option<String>,
    /// Recommended price
    #[serde(alias = "price", deserialize_with = "lenient_price")]
    pub recommended_price: Option<f64>,
    /// Currency of the recommended price
    pub currency: Option<String>,
    /// Listing tags
    pub tags: Vec<String>,
    /// SEO title
    pub seo_title: Option<String>,
    /// SEO description
    pub seo_description: Option<String>,
    /// Per-language title and description
    pub translations: BTreeMap<String, LocalizedText>,
}

/// Title and description in one language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalizedText {
    /// Title
    pub title: String,
    /// Description
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_shape() {
        let out = StageOutput::<VisionFindings>::decode(&json!({"productName": "Lamp"}));
        assert_eq!(out.known().unwrap().product_name.as_deref(), Some("Lamp"));
        assert_eq!(out.tag(), "known");
    }

    #[test]
    fn blank_values_are_empty() {
        for blank in [json!(null), json!({}), json!([]), json!("  ")] {
            assert!(StageOutput::<VisionFindings>::decode(&blank).is_empty());
        }
    }

    #[test]
    fn mistyped_price_keeps_other_fields() {
        let out = StageOutput::<MarketFindings>::decode(&json!({
            "averagePrice": "cheap",
            "minPrice": "$39.50",
            "maxPrice": "64,00",
            "currency": "EUR"
        }));
        let market = out.known().unwrap();
        assert_eq!(market.average_price, None);
        assert_eq!(market.min_price, Some(39.5));
        assert_eq!(market.max_price, Some(64.0));
        assert_eq!(market.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn mismatched_shape_is_opaque() {
        let out = StageOutput::<MarketFindings>::decode(&json!({"averagePrice": 3, "currency": 7}));
        assert!(matches!(out, StageOutput::Opaque(_)));

        let out = StageOutput::<MarketFindings>::decode(&json!("no structure here"));
        assert!(matches!(out, StageOutput::Opaque(_)));
    }

    #[test]
    fn json_text_is_parsed_once() {
        let out = StageOutput::<MarketFindings>::decode(&json!(r#"{"avgPrice": 19.5}"#));
        assert_eq!(out.known().unwrap().average_price, Some(19.5));
    }

    #[test]
    fn candidate_urls_are_bounded_and_distinct() {
        let findings: SearchFindings = serde_json::from_value(json!({
            "results": [
                {"link": "https://a"}, {"url": "https://a"}, {"url": ""},
                {"url": "https://b"}, {"url": "https://c"}
            ]
        }))
        .unwrap();
        assert_eq!(findings.candidate_urls(2), vec!["https://a", "https://b"]);
        assert_eq!(findings.candidate_urls(10).len(), 3);
        assert!(SearchFindings::default().candidate_urls(5).is_empty());
    }

    #[test]
    fn value_text_flattens() {
        assert_eq!(value_text(&json!(["oak", "steel"])), Some("oak, steel".into()));
        assert_eq!(value_text(&json!(3)), Some("3".into()));
        assert_eq!(value_text(&json!(null)), None);
    }
}
