//! Catalog products.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use print_shop_core::{Money, ProductId};

/// A product in the catalog.
///
/// `stock` is the authoritative available quantity. It only changes through
/// the stock ledger (payment, cancel, refund) or an explicit admin edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// URL slug (unique).
    pub slug: String,
    /// Long description.
    pub description: String,
    /// Current unit price. Orders snapshot it at checkout.
    pub price: Money,
    /// Available quantity.
    pub stock: u32,
    /// Category name, empty when uncategorized.
    pub category: String,
    /// Whether the product can be browsed and purchased.
    pub visible: bool,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Admin input for creating or editing a product.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    /// Display name.
    pub name: String,
    /// Explicit slug; derived from the name when absent.
    #[serde(default)]
    pub slug: Option<String>,
    /// Long description.
    #[serde(default)]
    pub description: String,
    /// Unit price in minor units.
    pub price: Money,
    /// Absolute stock level.
    #[serde(default)]
    pub stock: u32,
    /// Category name.
    #[serde(default)]
    pub category: String,
    /// Visibility; defaults to visible.
    #[serde(default = "default_visible")]
    pub visible: bool,
}

/// Largest stock a product row can hold (`INTEGER` column).
pub const MAX_STOCK: u32 = i32::MAX.unsigned_abs();

const fn default_visible() -> bool {
    true
}

impl ProductInput {
    /// The slug to store: the explicit one if given, otherwise derived from the name.
    #[must_use]
    pub fn resolved_slug(&self) -> String {
        self.slug
            .as_deref()
            .map(slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&self.name))
    }
}

/// Filter for catalog listings.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Only products with `visible = true`.
    pub visible_only: bool,
    /// Only products in this category.
    pub category: Option<String>,
}

impl ProductFilter {
    /// The storefront listing: visible products, optionally in one category.
    #[must_use]
    pub fn storefront(category: Option<String>) -> Self {
        Self {
            visible_only: true,
            category: category.filter(|c| !c.is_empty()),
        }
    }

    /// Whether a product passes the filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        (!self.visible_only || product.visible)
            && self
                .category
                .as_ref()
                .is_none_or(|category| &product.category == category)
    }
}

/// Convert a display name into a URL slug.
///
/// Lowercases, drops anything that is not a word character, whitespace or
/// dash, collapses whitespace and underscores into single dashes, and trims
/// dashes from both ends.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.trim().to_lowercase().chars() {
        if c.is_whitespace() || c == '_' {
            pending_dash = true;
        } else if c.is_alphanumeric() || c == '-' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        }
    }

    slug.trim_matches('-').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Dragon Figurine"), "dragon-figurine");
        assert_eq!(slugify("  Cable  Organizer_Set! "), "cable-organizer-set");
        assert_eq!(slugify("--Phone Stand--"), "phone-stand");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_resolved_slug_prefers_explicit() {
        let mut input = ProductInput {
            name: "Medieval Castle".to_owned(),
            slug: Some("Castle XL".to_owned()),
            description: String::new(),
            price: Money::from_minor(4999),
            stock: 8,
            category: "Figurines".to_owned(),
            visible: true,
        };
        assert_eq!(input.resolved_slug(), "castle-xl");

        input.slug = Some("   ".to_owned());
        assert_eq!(input.resolved_slug(), "medieval-castle");
    }
}
