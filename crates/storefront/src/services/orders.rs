//! Order service: checkout, lookups, cancellation, admin status changes and
//! card payment events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use florist_core::access::{self, Identity};
use florist_core::cart::Cart;
use florist_core::closure::ShopStatus;
use florist_core::order::{
    CorporateMetadata, CustomerInfo, DeliveryInfo, NewOrder, Order, OrderError, OrderFilters,
    Purchaser,
};
use florist_core::{OrderId, OrderStatus, Page, Pagination, PaymentMethod, to_minor_units};

use crate::config::Currency;
use crate::db::{OrderRepository, ProductRepository, SettingsRepository};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::services::email::EmailService;
use crate::services::payments::{CreateIntent, IntentTarget, PaymentError, PaymentProvider};

/// Checkout details supplied by the customer.
#[derive(Debug, Clone)]
pub struct CheckoutInput {
    pub customer: CustomerInfo,
    pub delivery: DeliveryInfo,
    /// Corporate accounts may quote their purchase order number.
    pub purchase_order: Option<String>,
}

/// A placed order, with the client secret when the customer pays by card.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Order operations.
pub struct OrderService<'a> {
    pool: &'a PgPool,
    orders: OrderRepository<'a>,
    email: Option<&'a EmailService>,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            orders: OrderRepository::new(pool),
            email: None,
        }
    }

    /// Send order confirmations through `email`.
    #[must_use]
    pub const fn with_email(mut self, email: Option<&'a EmailService>) -> Self {
        self.email = email;
        self
    }

    async fn load(&self, id: OrderId) -> Result<Order> {
        self.orders.get(id).await?.ok_or_else(AppError::order_not_found)
    }

    /// Read an order on behalf of `identity`.
    ///
    /// # Errors
    ///
    /// `ORDER_NOT_FOUND`, then `AUTH_REQUIRED` or `UNAUTHORIZED_ACCESS` from
    /// the access rules.
    #[instrument(skip(self, identity, guest_email), fields(order_id = %id))]
    pub async fn get_for(
        &self,
        identity: &Identity,
        id: OrderId,
        guest_email: Option<&str>,
    ) -> Result<Order> {
        let order = self.load(id).await?;
        access::authorize_order_read(identity, order.ownership(), guest_email)?;
        Ok(order)
    }

    /// Read any order (admin).
    ///
    /// # Errors
    ///
    /// `ORDER_NOT_FOUND` if the order does not exist.
    pub async fn get(&self, id: OrderId) -> Result<Order> {
        self.load(id).await
    }

    /// Orders of the signed-in user, newest first.
    ///
    /// # Errors
    ///
    /// `AUTH_REQUIRED` for anonymous callers.
    pub async fn list_mine(&self, identity: &Identity, pagination: Pagination) -> Result<Page<Order>> {
        let user_id = identity.require_authenticated()?;
        let email = identity.email().ok_or(AppError::AuthRequired)?;
        let (orders, total) = self.orders.list_for_user(user_id, email, pagination).await?;
        Ok(Page::new(orders, pagination, total))
    }

    /// Filtered listing for the back office.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn list_all(&self, filters: &OrderFilters, pagination: Pagination) -> Result<Page<Order>> {
        let (orders, total) = self.orders.list_all(filters, pagination).await?;
        Ok(Page::new(orders, pagination, total))
    }

    /// Place an order from the session cart.
    ///
    /// Card purchasers (guests and individual accounts) need `payments`; the
    /// intent is keyed by the order so a retried request never charges twice.
    /// Corporate orders are billed on the monthly invoice instead.
    ///
    /// # Errors
    ///
    /// `SHOP_CLOSED` during a closure window, the validation errors of
    /// [`NewOrder::from_cart`], `PAYMENT_PROVIDER_ERROR` when the processor is
    /// missing or fails.
    #[instrument(skip_all, fields(items = cart.items().len()))]
    pub async fn checkout<P: PaymentProvider>(
        &self,
        identity: &Identity,
        cart: &Cart,
        input: CheckoutInput,
        payments: Option<&P>,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Result<CheckoutOutcome> {
        let status = SettingsRepository::new(self.pool)
            .get_closure()
            .await?
            .status_at(now);
        if let ShopStatus::Closed(window) = status {
            let message = window
                .message
                .unwrap_or_else(|| "La boutique est temporairement fermée".to_owned());
            return Err(AppError::ShopClosed(message));
        }
        if cart.is_empty() {
            return Err(OrderError::EmptyCart.into());
        }

        let purchaser = purchaser_for(identity, input.purchase_order);
        let card = !matches!(purchaser, Purchaser::Corporate(..));
        let provider = match (card, payments) {
            (true, None) => return Err(PaymentError::NotConfigured.into()),
            (true, Some(p)) => Some(p),
            (false, _) => None,
        };

        let ids: Vec<_> = cart.items().iter().map(|i| i.product_id).collect();
        let products = ProductRepository::new(self.pool).get_many(&ids).await?;
        let new = NewOrder::from_cart(
            cart,
            |id| products.iter().find(|p| p.id == id),
            purchaser,
            input.customer,
            input.delivery,
            now,
        )?;

        let mut order = self.orders.create(&new, now).await?;
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "Order created"
        );
        let order_ref = order.id.to_string();
        add_breadcrumb("checkout", "Order created", Some(&[("order_id", order_ref.as_str())]));

        let mut client_secret = None;
        if let Some(provider) = provider {
            let amount_cents = to_minor_units(order.total_amount)
                .filter(|cents| *cents > 0)
                .ok_or_else(|| AppError::Internal(format!("order {} has no chargeable total", order.id)))?;
            let key = order.idempotency_key();
            let intent = provider
                .create_intent(&CreateIntent {
                    amount_cents,
                    currency: currency.code(),
                    idempotency_key: &key,
                    target: IntentTarget::Order(order.id),
                })
                .await
                .inspect_err(|e| {
                    tracing::error!(order_id = %order.id, error = %e, "Payment intent creation failed");
                })?;
            if self.orders.set_payment_intent(order.id, &intent.id).await? {
                order.payment_intent_id = Some(intent.id.clone());
            }
            client_secret = intent.client_secret;
        }

        self.send_confirmation(&order).await;

        Ok(CheckoutOutcome {
            order,
            client_secret,
        })
    }

    /// The order exists whatever happens here, so failures are only logged.
    async fn send_confirmation(&self, order: &Order) {
        let Some(email) = self.email else {
            tracing::debug!(order_id = %order.id, "Email not configured, skipping confirmation");
            return;
        };
        if let Err(e) = email.send_order_confirmation(order).await {
            tracing::warn!(order_id = %order.id, error = %e, "Order confirmation email failed");
        }
    }

    /// Cancel a pending order on behalf of its owner.
    ///
    /// # Errors
    ///
    /// `ORDER_NOT_FOUND`, access errors, or `INVALID_TRANSITION` once the
    /// order is past `pending`.
    #[instrument(skip(self, identity), fields(order_id = %id))]
    pub async fn cancel(&self, identity: &Identity, id: OrderId, now: DateTime<Utc>) -> Result<Order> {
        let mut order = self.load(id).await?;
        access::authorize_order_cancel(identity, order.ownership())?;

        let previous = order.status;
        order.cancel_by_customer(now)?;
        self.orders.save_lifecycle(&order, previous).await?;

        tracing::info!(order_id = %order.id, "Order cancelled by customer");
        Ok(order)
    }

    /// Admin status change. Setting the current status again is a no-op.
    ///
    /// # Errors
    ///
    /// `ORDER_NOT_FOUND`, or `INVALID_TRANSITION` for a backward move or a
    /// move out of a terminal state.
    #[instrument(skip(self, note), fields(order_id = %id, status = %next))]
    pub async fn update_status(
        &self,
        id: OrderId,
        next: OrderStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let mut order = self.load(id).await?;
        let previous = order.status;
        if order.update_status(next, note, now)? {
            self.orders.save_lifecycle(&order, previous).await?;
            tracing::info!(order_id = %order.id, from = %previous, to = %next, "Order status updated");
        }
        Ok(order)
    }

    /// Apply a card payment outcome reported by the processor.
    ///
    /// Returns `false` when there was nothing to record (unknown order or a
    /// repeated event).
    ///
    /// # Errors
    ///
    /// Returns a database error, or `CONFLICT` if the order changed
    /// concurrently.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn record_payment(
        &self,
        id: OrderId,
        outcome: PaymentOutcome<'_>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut order) = self.orders.get(id).await? else {
            tracing::warn!(order_id = %id, "Payment event for unknown order");
            return Ok(false);
        };
        if order.payment_method != PaymentMethod::Card {
            tracing::warn!(order_id = %id, "Payment event for an invoiced order ignored");
            return Ok(false);
        }

        let previous = order.status;
        let changed = match outcome {
            PaymentOutcome::Succeeded { intent_id } => order.record_payment_success(intent_id, at),
            PaymentOutcome::Failed => order.record_payment_failure(at),
        };
        if changed {
            self.orders.save_lifecycle(&order, previous).await?;
            tracing::info!(order_id = %id, payment_status = ?order.payment_status, "Order payment recorded");
        }
        Ok(changed)
    }
}

/// Card payment result carried by a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome<'a> {
    Succeeded { intent_id: &'a str },
    Failed,
}

/// Map the caller's identity to the kind of purchase it makes.
///
/// Admins shop like individual customers.
fn purchaser_for(identity: &Identity, purchase_order: Option<String>) -> Purchaser {
    match identity {
        Identity::Anonymous => Purchaser::Guest,
        Identity::Individual { user_id, .. } | Identity::Admin { user_id, .. } => {
            Purchaser::Individual(*user_id)
        }
        Identity::Corporate {
            user_id, company, ..
        } => Purchaser::Corporate(
            *user_id,
            CorporateMetadata {
                company_name: company.clone(),
                purchase_order: purchase_order
                    .map(|po| po.trim().to_owned())
                    .filter(|po| !po.is_empty()),
            },
        ),
    }
}
