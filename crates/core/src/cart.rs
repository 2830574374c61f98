//! Session-scoped shopping cart.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Product;
use crate::types::{ProductId, round_money};

/// Largest quantity allowed on a single cart line.
pub const MAX_QUANTITY: u32 = 99;

/// Category or tag values that mark an item as a bereavement arrangement.
const BEREAVEMENT_KEYWORDS: &[&str] = &[
    "deuil",
    "funeraire",
    "funéraire",
    "obseques",
    "obsèques",
    "bereavement",
    "funeral",
];

/// Cart operation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("quantity must be between 1 and {MAX_QUANTITY}, got {0}")]
    InvalidQuantity(u32),
    #[error("product {0} is not in the cart")]
    NotInCart(ProductId),
    #[error("product {0} is not available")]
    ProductUnavailable(ProductId),
}

/// A cart line: a snapshot of the product at the time it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub image_url: Option<String>,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CartItem {
    /// `price * quantity`, rounded to cents.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        round_money(self.price * Decimal::from(self.quantity))
    }

    /// Whether this item is a bereavement arrangement.
    #[must_use]
    pub fn is_bereavement(&self) -> bool {
        is_bereavement(&self.category, &self.tags)
    }
}

/// Whether a category or any tag marks a bereavement arrangement.
#[must_use]
pub fn is_bereavement(category: &str, tags: &[String]) -> bool {
    is_bereavement_label(category) || tags.iter().any(|t| is_bereavement_label(t))
}

fn is_bereavement_label(label: &str) -> bool {
    let label = label.trim().to_lowercase();
    BEREAVEMENT_KEYWORDS.contains(&label.as_str())
}

fn check_quantity(quantity: u32) -> Result<u32, CartError> {
    if (1..=MAX_QUANTITY).contains(&quantity) {
        Ok(quantity)
    } else {
        Err(CartError::InvalidQuantity(quantity))
    }
}

/// The cart aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Add `quantity` of `product`, merging with an existing line.
    ///
    /// # Errors
    ///
    /// [`CartError::ProductUnavailable`] for an inactive product,
    /// [`CartError::InvalidQuantity`] if the resulting line quantity is out
    /// of range.
    pub fn add(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        if !product.is_active {
            return Err(CartError::ProductUnavailable(product.id));
        }
        check_quantity(quantity)?;

        if let Some(line) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            line.quantity = check_quantity(line.quantity.saturating_add(quantity))?;
            line.name.clone_from(&product.name);
            line.price = product.price;
            return Ok(());
        }

        self.items.push(CartItem {
            product_id: product.id,
            name: product.name.clone(),
            price: product.price,
            quantity,
            image_url: product.image_url.clone(),
            category: product.category.clone(),
            tags: product.tags.clone(),
        });
        Ok(())
    }

    /// Set the quantity of a line; `0` removes it.
    ///
    /// # Errors
    ///
    /// [`CartError::NotInCart`] if the product has no line,
    /// [`CartError::InvalidQuantity`] above [`MAX_QUANTITY`].
    pub fn update_quantity(&mut self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove(product_id);
        }
        let quantity = check_quantity(quantity)?;
        let line = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or(CartError::NotInCart(product_id))?;
        line.quantity = quantity;
        Ok(())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// [`CartError::NotInCart`] if the product has no line.
    pub fn remove(&mut self, product_id: ProductId) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before {
            return Err(CartError::NotInCart(product_id));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether checkout must collect bereavement details.
    #[must_use]
    pub fn requires_bereavement_details(&self) -> bool {
        self.items.iter().any(CartItem::is_bereavement)
    }
}

/// Wire summary of a cart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub items: Vec<CartItem>,
    pub total: Decimal,
    pub item_count: u32,
    pub requires_bereavement_details: bool,
}

impl From<&Cart> for CartSummary {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart.items.clone(),
            total: cart.total(),
            item_count: cart.item_count(),
            requires_bereavement_details: cart.requires_bereavement_details(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;

    use super::*;

    fn product(id: i32, price: i64, category: &str, tags: &[&str]) -> Product {
        Product {
            id: ProductId::new(id),
            slug: format!("p-{id}"),
            name: format!("Produit {id}"),
            description: String::new(),
            price: Decimal::new(price, 2),
            category: category.to_owned(),
            tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            image_url: None,
            is_active: true,
            created_at: DateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_add_merges_lines() {
        let mut cart = Cart::new();
        let roses = product(1, 3990, "Bouquets", &[]);
        cart.add(&roses, 1).unwrap();
        cart.add(&roses, 2).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total(), Decimal::new(11970, 2));
    }

    #[test]
    fn test_quantity_bounds() {
        let mut cart = Cart::new();
        let p = product(1, 1000, "Plantes", &[]);
        assert_eq!(cart.add(&p, 0), Err(CartError::InvalidQuantity(0)));
        cart.add(&p, 98).unwrap();
        assert_eq!(cart.add(&p, 2), Err(CartError::InvalidQuantity(100)));
        assert_eq!(cart.item_count(), 98);
    }

    #[test]
    fn test_update_and_remove() {
        let mut cart = Cart::new();
        let a = product(1, 1000, "Plantes", &[]);
        let b = product(2, 2500, "Plantes", &[]);
        cart.add(&a, 1).unwrap();
        cart.add(&b, 1).unwrap();

        cart.update_quantity(a.id, 4).unwrap();
        assert_eq!(cart.total(), Decimal::new(6500, 2));

        cart.update_quantity(b.id, 0).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.remove(b.id), Err(CartError::NotInCart(b.id)));

        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_inactive_product_rejected() {
        let mut p = product(1, 1000, "Plantes", &[]);
        p.is_active = false;
        assert_eq!(
            Cart::new().add(&p, 1),
            Err(CartError::ProductUnavailable(p.id))
        );
    }

    #[test]
    fn test_bereavement_detection() {
        let mut cart = Cart::new();
        cart.add(&product(1, 1000, "Bouquets", &["anniversaire"]), 1)
            .unwrap();
        assert!(!cart.requires_bereavement_details());

        cart.add(&product(2, 9000, "Couronnes", &["Obsèques"]), 1)
            .unwrap();
        assert!(cart.requires_bereavement_details());

        let mut other = Cart::new();
        other.add(&product(3, 9000, "Deuil", &[]), 1).unwrap();
        assert!(other.requires_bereavement_details());
    }
}
