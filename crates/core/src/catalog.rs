//! Catalog products and relevance-scored search.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ProductId;

/// Weight of a product name match.
pub const NAME_SCORE: u32 = 10;
/// Weight of a tag match (counted once, however many tags match).
pub const TAG_SCORE: u32 = 5;
/// Weight of a category match.
pub const CATEGORY_SCORE: u32 = 3;

/// Shortest accepted search query, in characters, after trimming.
pub const MIN_QUERY_CHARS: usize = 2;
/// Default number of search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
/// Largest number of search results a client may request.
pub const MAX_SEARCH_LIMIT: usize = 50;

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Whether this product is a bereavement arrangement.
    #[must_use]
    pub fn is_bereavement(&self) -> bool {
        crate::cart::is_bereavement(&self.category, &self.tags)
    }
}

/// Search failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("search query must be at least {MIN_QUERY_CHARS} characters")]
    QueryTooShort,
}

/// A search hit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit<'a> {
    #[serde(flatten)]
    pub product: &'a Product,
    pub score: u32,
}

/// Relevance of `product` for an already-lowercased query.
#[must_use]
pub fn relevance(product: &Product, needle: &str) -> u32 {
    let mut score = 0;
    if product.name.to_lowercase().contains(needle) {
        score += NAME_SCORE;
    }
    if product
        .tags
        .iter()
        .any(|tag| tag.to_lowercase().contains(needle))
    {
        score += TAG_SCORE;
    }
    if product.category.to_lowercase().contains(needle) {
        score += CATEGORY_SCORE;
    }
    score
}

/// Search `products` for `query`.
///
/// Matching is case-insensitive substring matching. Inactive and zero-score
/// products are dropped; hits are sorted by score descending, then by name.
/// `limit` defaults to [`DEFAULT_SEARCH_LIMIT`] and is clamped to
/// `1..=MAX_SEARCH_LIMIT`.
///
/// # Errors
///
/// Returns [`SearchError::QueryTooShort`] when the trimmed query has fewer
/// than [`MIN_QUERY_CHARS`] characters.
pub fn search<'a>(
    products: &'a [Product],
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<SearchHit<'a>>, SearchError> {
    let needle = query.trim().to_lowercase();
    if needle.chars().count() < MIN_QUERY_CHARS {
        return Err(SearchError::QueryTooShort);
    }
    let limit = limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    let mut hits: Vec<SearchHit<'a>> = products
        .iter()
        .filter(|p| p.is_active)
        .filter_map(|product| {
            let score = relevance(product, &needle);
            (score > 0).then_some(SearchHit { product, score })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.product.name.cmp(&b.product.name))
    });
    hits.truncate(limit);
    Ok(hits)
}
