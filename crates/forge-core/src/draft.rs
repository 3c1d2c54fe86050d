//! Product draft assembly
//!
//! [`assemble`] is a pure function over the decoded stage outputs. It never
//! fails: every field resolves through a fixed precedence list and ends in
//! a documented default.
//!
//! | field       | precedence                                                   |
//! |-------------|--------------------------------------------------------------|
//! | title       | refined → vision → hint → scraped page → `"Untitled product"` |
//! | description | refined → vision → hint → `""`                               |
//! | price       | refined → market average → scraped average → hint → `0.0`    |
//! | currency    | refined → market → hint → configured default                 |
//! | tags        | refined ∪ hint ∪ audience keywords ∪ vision category         |
//! | seo         | refined → derived from title / description / tags            |

use crate::context::ProductHints;
use crate::outputs::{
    value_text, AudienceProfile, LocalizedText, MarketFindings, RefinedContent, ScrapeFindings,
    StageOutput, VisionFindings,
};
use forge_artifact::ArtifactTier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Title used when no stage or hint supplies one
pub const DEFAULT_TITLE: &str = "Untitled product";

const SEO_TITLE_LIMIT: usize = 60;
const SEO_DESCRIPTION_LIMIT: usize = 160;
const SEO_KEYWORD_LIMIT: usize = 10;

/// Marketplace-ready product draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    /// Listing title
    pub title: String,
    /// Listing description
    pub description: String,
    /// Price
    pub price: f64,
    /// ISO currency code
    pub currency: String,
    /// Tags, de-duplicated case-insensitively
    pub tags: Vec<String>,
    /// Product attributes
    pub attributes: BTreeMap<String, String>,
    /// Title and description per language; always holds the default language
    pub localized: BTreeMap<String, LocalizedText>,
    /// SEO fields
    pub seo: SeoFields,
    /// Target audience segments
    pub audience: Vec<String>,
    /// Processed images
    pub images: Vec<ImageRef>,
}

/// SEO fields of a draft
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoFields {
    /// Page title
    pub title: String,
    /// Meta description
    pub description: String,
    /// Keywords
    pub keywords: Vec<String>,
    /// URL slug
    pub slug: String,
}

/// Image attached to a draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    /// Durable key or fallback-cache key of the raw artifact
    pub id: String,
    /// Tier the raw artifact lives in
    pub tier: ArtifactTier,
    /// Processed image location
    pub source: String,
}

/// Everything the assembler reads
#[derive(Debug, Clone, Default)]
pub struct AssemblyInput {
    /// Caller hints
    pub hints: ProductHints,
    /// Vision analysis
    pub vision: StageOutput<VisionFindings>,
    /// Scrape
    pub scrape: StageOutput<ScrapeFindings>,
    /// Market analysis
    pub market: StageOutput<MarketFindings>,
    /// Audience definition
    pub audience: StageOutput<AudienceProfile>,
    /// Content refinement
    pub content: StageOutput<RefinedContent>,
    /// Processed images
    pub images: Vec<ImageRef>,
}

/// Defaults the assembler falls back to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyDefaults {
    /// Currency when nothing supplies one
    pub currency: String,
    /// Language of the primary title and description
    pub language: String,
}

impl Default for AssemblyDefaults {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            language: "en".to_string(),
        }
    }
}

/// Combine stage outputs into a draft
#[must_use]
pub fn assemble(input: &AssemblyInput, defaults: &AssemblyDefaults) -> ProductDraft {
    let vision = input.vision.known();
    let scrape = input.scrape.known();
    let market = input.market.known();
    let audience = input.audience.known();
    let content = input.content.known();

    let title = first_text([
        content.and_then(|c| c.title.as_deref()),
        vision.and_then(|v| v.product_name.as_deref()),
        input.hints.title.as_deref(),
        scrape.and_then(|s| s.pages.iter().find_map(|p| p.title.as_deref())),
    ])
    .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let description = first_text([
        content.and_then(|c| c.description.as_deref()),
        vision.and_then(|v| v.description.as_deref()),
        input.hints.description.as_deref(),
    ])
    .unwrap_or_default();

    let price = [
        content.and_then(|c| c.recommended_price),
        market.and_then(|m| m.average_price),
        scrape.and_then(scraped_average_price),
        input.hints.price,
    ]
    .into_iter()
    .flatten()
    .find(|p| p.is_finite() && *p >= 0.0)
    .unwrap_or(0.0);

    let currency = first_text([
        content.and_then(|c| c.currency.as_deref()),
        market.and_then(|m| m.currency.as_deref()),
        input.hints.currency.as_deref(),
    ])
    .map_or_else(|| defaults.currency.clone(), |c| c.to_uppercase());

    let mut tags = Vec::new();
    let tag_sources = content
        .map(|c| c.tags.as_slice())
        .unwrap_or_default()
        .iter()
        .chain(&input.hints.tags)
        .chain(audience.map(|a| a.keywords.as_slice()).unwrap_or_default())
        .map(String::as_str)
        .chain(vision.and_then(|v| v.category.as_deref()))
        .chain(input.hints.category.as_deref());
    for tag in tag_sources {
        push_unique(&mut tags, tag);
    }

    let attributes = vision.map(vision_attributes).unwrap_or_default();

    let mut localized = content
        .map(|c| c.translations.clone())
        .unwrap_or_default();
    localized.retain(|lang, text| !lang.trim().is_empty() && !text.title.trim().is_empty());
    localized.insert(
        defaults.language.clone(),
        LocalizedText {
            title: title.clone(),
            description: description.clone(),
        },
    );

    let seo = SeoFields {
        title: first_text([content.and_then(|c| c.seo_title.as_deref())])
            .unwrap_or_else(|| truncate_chars(&title, SEO_TITLE_LIMIT)),
        description: first_text([content.and_then(|c| c.seo_description.as_deref())])
            .unwrap_or_else(|| truncate_chars(&description, SEO_DESCRIPTION_LIMIT)),
        keywords: tags.iter().take(SEO_KEYWORD_LIMIT).cloned().collect(),
        slug: slugify(&title),
    };

    let audience = audience
        .map(|a| {
            let mut segments = Vec::new();
            for segment in a.primary_audience.iter().chain(&a.segments) {
                push_unique(&mut segments, segment);
            }
            segments
        })
        .unwrap_or_default();

    ProductDraft {
        title,
        description,
        price,
        currency,
        tags,
        attributes,
        localized,
        seo,
        audience,
        images: input.images.clone(),
    }
}

fn first_text<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    let item = item.trim();
    if item.is_empty() || list.iter().any(|t| t.eq_ignore_ascii_case(item)) {
        return;
    }
    list.push(item.to_string());
}

fn scraped_average_price(scrape: &ScrapeFindings) -> Option<f64> {
    let prices: Vec<f64> = scrape
        .pages
        .iter()
        .filter_map(|p| p.price)
        .filter(|p| p.is_finite() && *p > 0.0)
        .collect();
    if prices.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = prices.len() as f64;
    Some(prices.iter().sum::<f64>() / count)
}

fn vision_attributes(vision: &VisionFindings) -> BTreeMap<String, String> {
    let mut attributes: BTreeMap<String, String> = vision
        .attributes
        .iter()
        .filter_map(|(k, v)| value_text(v).map(|text| (k.clone(), text)))
        .collect();
    if let Some(brand) = vision.brand.as_deref().filter(|b| !b.trim().is_empty()) {
        attributes.insert("brand".to_string(), brand.trim().to_string());
    }
    if !vision.colors.is_empty() {
        attributes.insert("color".to_string(), vision.colors.join(", "));
    }
    if !vision.materials.is_empty() {
        attributes.insert("material".to_string(), vision.materials.join(", "));
    }
    attributes
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect::<String>().trim_end().to_string()
}

/// URL slug: lowercase ASCII alphanumerics joined by single dashes
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("product");
    }
    slug
}
