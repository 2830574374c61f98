//! Order aggregate and its fulfillment lifecycle.
//!
//! An order is created from a cart snapshot at checkout, then moved through
//! [`OrderStatus`] by admin updates and payment events. Orders are never
//! deleted; every status change is appended to the timeline.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::OrderOwnership;
use crate::cart::Cart;
use crate::catalog::Product;
use crate::delivery::{self, PostalCodeError};
use crate::types::{
    Email, InvoiceId, OrderId, OrderStatus, PaymentMethod, PaymentStatus, ProductId, UserId,
    round_money,
};

/// Order lifecycle failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("product {0} does not exist")]
    UnknownProduct(ProductId),
    #[error("product {0} is no longer available")]
    InactiveProduct(ProductId),
    #[error(transparent)]
    InvalidPostalCode(#[from] PostalCodeError),
    #[error("no delivery to postal code {0}")]
    Undeliverable(String),
    #[error("bereavement details are required for this order")]
    BereavementDetailsRequired,
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("order can no longer be cancelled (status {0})")]
    NotCancellable(OrderStatus),
}

/// A purchased product, snapshotted at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub image_url: Option<String>,
}

impl LineItem {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        round_money(self.unit_price * Decimal::from(self.quantity))
    }
}

/// Sum of `unit_price * quantity` over all lines.
#[must_use]
pub fn compute_total(items: &[LineItem]) -> Decimal {
    items.iter().map(LineItem::line_total).sum()
}

/// Purchaser contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: String,
    pub email: Email,
    pub phone: Option<String>,
}

/// Funeral details collected for bereavement arrangements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BereavementDetails {
    pub deceased_name: String,
    pub ceremony_location: Option<String>,
    pub ceremony_at: Option<DateTime<Utc>>,
}

/// Where and when to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInfo {
    pub recipient_name: String,
    pub recipient_phone: Option<String>,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub delivery_date: Option<NaiveDate>,
    pub time_slot: Option<String>,
    pub instructions: Option<String>,
    pub card_message: Option<String>,
    pub bereavement: Option<BereavementDetails>,
    /// Filled in from the delivery zone at checkout.
    #[serde(default)]
    pub delivery_fee: Decimal,
    #[serde(default)]
    pub zone: Option<String>,
}

/// One entry of the order timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

impl TimelineEvent {
    fn new(status: OrderStatus, at: DateTime<Utc>, note: impl Into<Option<String>>) -> Self {
        Self {
            status,
            at,
            note: note.into(),
        }
    }
}

/// Extra data carried by orders placed from a corporate account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorporateMetadata {
    pub company_name: String,
    pub purchase_order: Option<String>,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: Option<UserId>,
    pub customer: CustomerInfo,
    pub items: Vec<LineItem>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_intent_id: Option<String>,
    pub delivery: DeliveryInfo,
    pub timeline: Vec<TimelineEvent>,
    pub corporate: Option<CorporateMetadata>,
    pub invoice_id: Option<InvoiceId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Ownership facts for the access gate.
    #[must_use]
    pub const fn ownership(&self) -> OrderOwnership<'_> {
        OrderOwnership {
            owner: self.user_id,
            contact_email: &self.customer.email,
        }
    }

    /// Apply an admin status change.
    ///
    /// Returns `Ok(false)` when `next` equals the current status; nothing is
    /// recorded in that case.
    ///
    /// # Errors
    ///
    /// [`OrderError::InvalidTransition`] when the move goes backwards or
    /// leaves a terminal state.
    pub fn update_status(
        &mut self,
        next: OrderStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, OrderError> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.timeline.push(TimelineEvent::new(next, now, note));
        self.updated_at = now;
        Ok(true)
    }

    /// Cancel on the customer's behalf. Only pending orders qualify.
    ///
    /// # Errors
    ///
    /// [`OrderError::NotCancellable`] once the shop has started on the order.
    pub fn cancel_by_customer(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::NotCancellable(self.status));
        }
        self.update_status(
            OrderStatus::Cancelled,
            Some("Annulée par le client".to_owned()),
            now,
        )
        .map(|_| ())
    }

    /// Record a successful card payment.
    ///
    /// A pending order is confirmed. Returns `false` if the payment was
    /// already recorded.
    pub fn record_payment_success(&mut self, intent_id: &str, now: DateTime<Utc>) -> bool {
        if self.payment_status == PaymentStatus::Paid {
            return false;
        }
        self.payment_status = PaymentStatus::Paid;
        if self.payment_intent_id.is_none() {
            self.payment_intent_id = Some(intent_id.to_owned());
        }
        if self.status == OrderStatus::Pending {
            self.status = OrderStatus::Confirmed;
            self.timeline.push(TimelineEvent::new(
                OrderStatus::Confirmed,
                now,
                Some("Paiement reçu".to_owned()),
            ));
        }
        self.updated_at = now;
        true
    }

    /// Record a failed card payment. A paid order is left untouched.
    pub fn record_payment_failure(&mut self, now: DateTime<Utc>) -> bool {
        if matches!(
            self.payment_status,
            PaymentStatus::Paid | PaymentStatus::Failed
        ) {
            return false;
        }
        self.payment_status = PaymentStatus::Failed;
        self.updated_at = now;
        true
    }

    /// Key used so that retrying intent creation for this order never
    /// charges twice.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        format!("order-{}", self.id)
    }
}

/// Human-readable order number: `CMD-2026-000042`.
#[must_use]
pub fn format_order_number(year: i32, sequence: i64) -> String {
    format!("CMD-{year}-{sequence:06}")
}

/// An order ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: Option<UserId>,
    pub customer: CustomerInfo,
    pub items: Vec<LineItem>,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub delivery: DeliveryInfo,
    pub timeline: Vec<TimelineEvent>,
    pub corporate: Option<CorporateMetadata>,
}

/// Who is checking out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purchaser {
    Guest,
    Individual(UserId),
    Corporate(UserId, CorporateMetadata),
}

impl NewOrder {
    /// Build an order from a cart.
    ///
    /// Names, prices and the bereavement classification are re-read from the
    /// catalog through `lookup`, so a stale cart never decides them. The delivery zone fee is recorded on
    /// the delivery info; the order total remains the sum of its lines.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderError`] for an empty cart, a missing or inactive
    /// product, an invalid or uncovered postal code, or missing bereavement
    /// details.
    pub fn from_cart<'p>(
        cart: &Cart,
        lookup: impl Fn(ProductId) -> Option<&'p Product>,
        purchaser: Purchaser,
        customer: CustomerInfo,
        mut delivery: DeliveryInfo,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let mut bereavement = false;
        let items = cart
            .items()
            .iter()
            .map(|line| {
                let product = lookup(line.product_id)
                    .ok_or(OrderError::UnknownProduct(line.product_id))?;
                if !product.is_active {
                    return Err(OrderError::InactiveProduct(product.id));
                }
                bereavement |= product.is_bereavement();
                Ok(LineItem {
                    product_id: product.id,
                    name: product.name.clone(),
                    unit_price: product.price,
                    quantity: line.quantity,
                    image_url: product.image_url.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let zone = delivery::find_zone(&delivery.postal_code)?
            .ok_or_else(|| OrderError::Undeliverable(delivery.postal_code.clone()))?;
        delivery.postal_code = zone.postal_code.to_owned();
        delivery.delivery_fee = zone.delivery_fee();
        delivery.zone = Some(zone.zone.to_owned());

        if bereavement && delivery.bereavement.is_none() {
            return Err(OrderError::BereavementDetailsRequired);
        }

        let (user_id, payment_method, payment_status, corporate) = match purchaser {
            Purchaser::Guest => (None, PaymentMethod::Card, PaymentStatus::Pending, None),
            Purchaser::Individual(id) => {
                (Some(id), PaymentMethod::Card, PaymentStatus::Pending, None)
            }
            Purchaser::Corporate(id, meta) => (
                Some(id),
                PaymentMethod::Invoice,
                PaymentStatus::Invoiced,
                Some(meta),
            ),
        };

        Ok(Self {
            user_id,
            customer,
            total_amount: compute_total(&items),
            items,
            payment_method,
            payment_status,
            delivery,
            timeline: vec![TimelineEvent::new(
                OrderStatus::Pending,
                now,
                Some("Commande créée".to_owned()),
            )],
            corporate,
        })
    }
}

/// Admin listing filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilters {
    pub status: Option<OrderStatus>,
    /// Case-insensitive substring over order number, customer name and email.
    pub search: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use chrono::TimeZone;

    use super::*;

    pub(crate) fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
    }

    fn product(id: i32, price: i64, category: &str) -> Product {
        Product {
            id: ProductId::new(id),
            slug: format!("p-{id}"),
            name: format!("Produit {id}"),
            description: String::new(),
            price: Decimal::new(price, 2),
            category: category.to_owned(),
            tags: Vec::new(),
            image_url: None,
            is_active: true,
            created_at: DateTime::UNIX_EPOCH,
        }
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            name: "Marie Dupont".to_owned(),
            email: Email::parse("marie@example.fr").unwrap(),
            phone: Some("0601020304".to_owned()),
        }
    }

    pub(crate) fn delivery(postal_code: &str) -> DeliveryInfo {
        DeliveryInfo {
            recipient_name: "Jeanne Martin".to_owned(),
            recipient_phone: None,
            address: "12 rue des Lilas".to_owned(),
            city: "Brétigny-sur-Orge".to_owned(),
            postal_code: postal_code.to_owned(),
            delivery_date: None,
            time_slot: None,
            instructions: None,
            card_message: None,
            bereavement: None,
            delivery_fee: Decimal::ZERO,
            zone: None,
        }
    }

    pub(crate) fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderId::new(1),
            order_number: format_order_number(2026, 1),
            user_id: None,
            customer: customer(),
            items: Vec::new(),
            total_amount: Decimal::ZERO,
            status,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Card,
            payment_intent_id: None,
            delivery: delivery("91220"),
            timeline: Vec::new(),
            corporate: None,
            invoice_id: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_from_cart_snapshots_catalog_and_totals() {
        let catalog = [product(1, 3990, "Bouquets"), product(2, 1250, "Plantes")];
        let mut cart = Cart::new();
        cart.add(&catalog[0], 2).unwrap();
        cart.add(&catalog[1], 1).unwrap();

        // Price changed after the item went into the cart.
        let mut repriced = catalog.clone();
        repriced[0].price = Decimal::new(4290, 2);

        let new = NewOrder::from_cart(
            &cart,
            |id| repriced.iter().find(|p| p.id == id),
            Purchaser::Guest,
            customer(),
            delivery("91 240"),
            now(),
        )
        .unwrap();

        assert_eq!(new.total_amount, Decimal::new(9830, 2));
        assert_eq!(new.total_amount, compute_total(&new.items));
        assert_eq!(new.delivery.postal_code, "91240");
        assert_eq!(new.delivery.delivery_fee, Decimal::new(500, 2));
        assert_eq!(new.timeline.len(), 1);
        assert_eq!(new.timeline[0].status, OrderStatus::Pending);
        assert_eq!(new.payment_method, PaymentMethod::Card);
    }

    #[test]
    fn test_from_cart_rejections() {
        let catalog = [product(1, 1000, "Bouquets")];
        let lookup = |id| catalog.iter().find(|p: &&Product| p.id == id);

        let empty = NewOrder::from_cart(
            &Cart::new(),
            lookup,
            Purchaser::Guest,
            customer(),
            delivery("91220"),
            now(),
        );
        assert_eq!(empty.unwrap_err(), OrderError::EmptyCart);

        let mut cart = Cart::new();
        cart.add(&catalog[0], 1).unwrap();

        let missing = NewOrder::from_cart(
            &cart,
            |_| None,
            Purchaser::Guest,
            customer(),
            delivery("91220"),
            now(),
        );
        assert_eq!(
            missing.unwrap_err(),
            OrderError::UnknownProduct(ProductId::new(1))
        );

        let mut retired = catalog.clone();
        retired[0].is_active = false;
        let inactive = NewOrder::from_cart(
            &cart,
            |id| retired.iter().find(|p| p.id == id),
            Purchaser::Guest,
            customer(),
            delivery("91220"),
            now(),
        );
        assert!(matches!(inactive, Err(OrderError::InactiveProduct(_))));

        let malformed = NewOrder::from_cart(
            &cart,
            lookup,
            Purchaser::Guest,
            customer(),
            delivery("9122"),
            now(),
        );
        assert!(matches!(malformed, Err(OrderError::InvalidPostalCode(_))));

        let uncovered = NewOrder::from_cart(
            &cart,
            lookup,
            Purchaser::Guest,
            customer(),
            delivery("75000"),
            now(),
        );
        assert!(matches!(uncovered, Err(OrderError::Undeliverable(_))));
    }

    #[test]
    fn test_bereavement_follows_current_catalog() {
        let mut cart = Cart::new();
        cart.add(&product(1, 9000, "Bouquets"), 1).unwrap();
        assert!(!cart.requires_bereavement_details());

        // Recategorised after the product went into the cart.
        let mut now_funeral = product(1, 9000, "Bouquets");
        now_funeral.tags = vec!["Obsèques".to_owned()];
        let result = NewOrder::from_cart(
            &cart,
            |id| (id == now_funeral.id).then_some(&now_funeral),
            Purchaser::Guest,
            customer(),
            delivery("91220"),
            now(),
        );
        assert_eq!(result.unwrap_err(), OrderError::BereavementDetailsRequired);

        let mut cart = Cart::new();
        cart.add(&product(2, 9000, "Deuil"), 1).unwrap();
        let no_longer = product(2, 9000, "Bouquets");
        assert!(
            NewOrder::from_cart(
                &cart,
                |id| (id == no_longer.id).then_some(&no_longer),
                Purchaser::Guest,
                customer(),
                delivery("91220"),
                now(),
            )
            .is_ok()
        );
    }

    #[test]
    fn test_bereavement_cart_needs_details() {
        let catalog = [product(1, 9000, "Deuil")];
        let mut cart = Cart::new();
        cart.add(&catalog[0], 1).unwrap();
        let lookup = |id| catalog.iter().find(|p: &&Product| p.id == id);

        let result = NewOrder::from_cart(
            &cart,
            lookup,
            Purchaser::Guest,
            customer(),
            delivery("91220"),
            now(),
        );
        assert_eq!(result.unwrap_err(), OrderError::BereavementDetailsRequired);

        let mut with_details = delivery("91220");
        with_details.bereavement = Some(BereavementDetails {
            deceased_name: "Paul Durand".to_owned(),
            ceremony_location: Some("Église Saint-Pierre".to_owned()),
            ceremony_at: None,
        });
        assert!(
            NewOrder::from_cart(
                &cart,
                lookup,
                Purchaser::Guest,
                customer(),
                with_details,
                now()
            )
            .is_ok()
        );
    }

    #[test]
    fn test_corporate_checkout_is_invoiced() {
        let catalog = [product(1, 5000, "Bouquets")];
        let mut cart = Cart::new();
        cart.add(&catalog[0], 1).unwrap();
        let meta = CorporateMetadata {
            company_name: "Entreprise SA".to_owned(),
            purchase_order: None,
        };

        let new = NewOrder::from_cart(
            &cart,
            |id| catalog.iter().find(|p| p.id == id),
            Purchaser::Corporate(UserId::new(7), meta),
            customer(),
            delivery("91220"),
            now(),
        )
        .unwrap();

        assert_eq!(new.payment_method, PaymentMethod::Invoice);
        assert_eq!(new.payment_status, PaymentStatus::Invoiced);
        assert_eq!(new.user_id, Some(UserId::new(7)));
    }

    #[test]
    fn test_update_status_appends_timeline() {
        let mut o = order(OrderStatus::Pending);
        assert_eq!(
            o.update_status(OrderStatus::Preparing, None, now()),
            Ok(true)
        );
        assert_eq!(o.timeline.len(), 1);

        assert_eq!(
            o.update_status(OrderStatus::Preparing, None, now()),
            Ok(false)
        );
        assert_eq!(o.timeline.len(), 1);

        assert_eq!(
            o.update_status(OrderStatus::Confirmed, None, now()),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Preparing,
                to: OrderStatus::Confirmed,
            })
        );
    }

    #[test]
    fn test_terminal_order_rejects_changes() {
        let mut o = order(OrderStatus::Delivered);
        assert!(o.update_status(OrderStatus::Cancelled, None, now()).is_err());
        assert_eq!(o.status, OrderStatus::Delivered);
        assert!(o.timeline.is_empty());
    }

    #[test]
    fn test_customer_cancel_only_while_pending() {
        let mut pending = order(OrderStatus::Pending);
        pending.cancel_by_customer(now()).unwrap();
        assert_eq!(pending.status, OrderStatus::Cancelled);

        let mut confirmed = order(OrderStatus::Confirmed);
        assert_eq!(
            confirmed.cancel_by_customer(now()),
            Err(OrderError::NotCancellable(OrderStatus::Confirmed))
        );
    }

    #[test]
    fn test_payment_events() {
        let mut o = order(OrderStatus::Pending);
        assert!(o.record_payment_success("pi_123", now()));
        assert_eq!(o.status, OrderStatus::Confirmed);
        assert_eq!(o.payment_status, PaymentStatus::Paid);
        assert!(!o.record_payment_success("pi_123", now()));
        assert_eq!(o.timeline.len(), 1);
        assert!(!o.record_payment_failure(now()));

        let mut failing = order(OrderStatus::Pending);
        assert!(failing.record_payment_failure(now()));
        assert_eq!(failing.payment_status, PaymentStatus::Failed);
        assert_eq!(failing.status, OrderStatus::Pending);
    }

    #[test]
    fn test_order_number_format() {
        assert_eq!(format_order_number(2026, 42), "CMD-2026-000042");
    }
}
