//! Order repository.
//!
//! An order is one row; its line items, delivery info, timeline and corporate
//! metadata are JSONB columns. Status changes are conditional updates on the
//! previously read status so two concurrent writers cannot both apply a
//! transition computed from the same starting state.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use florist_core::order::{
    CorporateMetadata, CustomerInfo, DeliveryInfo, LineItem, NewOrder, Order, OrderFilters,
    TimelineEvent, format_order_number,
};
use florist_core::{
    Email, InvoiceId, OrderId, OrderStatus, Pagination, PaymentMethod, PaymentStatus, UserId,
};

use super::{RepositoryError, count_to_total, like_pattern};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: String,
    user_id: Option<UserId>,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    items: Json<Vec<LineItem>>,
    total_amount: Decimal,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: PaymentMethod,
    payment_intent_id: Option<String>,
    delivery: Json<DeliveryInfo>,
    timeline: Json<Vec<TimelineEvent>>,
    corporate: Option<Json<CorporateMetadata>>,
    invoice_id: Option<InvoiceId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.customer_email).map_err(|e| {
            RepositoryError::DataCorruption(format!(
                "invalid customer email on order {}: {e}",
                row.id
            ))
        })?;
        Ok(Self {
            id: row.id,
            order_number: row.order_number,
            user_id: row.user_id,
            customer: CustomerInfo {
                name: row.customer_name,
                email,
                phone: row.customer_phone,
            },
            items: row.items.0,
            total_amount: row.total_amount,
            status: row.status,
            payment_status: row.payment_status,
            payment_method: row.payment_method,
            payment_intent_id: row.payment_intent_id,
            delivery: row.delivery.0,
            timeline: row.timeline.0,
            corporate: row.corporate.map(|c| c.0),
            invoice_id: row.invoice_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
    rows.into_iter().map(Order::try_from).collect()
}

const ORDER_COLUMNS: &str = r"
    id, order_number, user_id, customer_name, customer_email, customer_phone,
    items, total_amount, status, payment_status, payment_method, payment_intent_id,
    delivery, timeline, corporate, invoice_id, created_at, updated_at";

/// Filter shared by the admin list and its count query.
const ADMIN_FILTER: &str = r"
    ($1::order_status IS NULL OR status = $1)
    AND ($2::text IS NULL
         OR order_number ILIKE $2
         OR customer_name ILIKE $2
         OR customer_email ILIKE $2)
    AND ($3::timestamptz IS NULL OR created_at >= $3)
    AND ($4::timestamptz IS NULL OR created_at <= $4)";

/// `ILIKE` pattern for the admin search box; blank input disables the filter.
fn admin_search_pattern(filters: &OrderFilters) -> Option<String> {
    filters
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern)
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
        row.map(Order::try_from).transpose()
    }

    /// Insert a new order, assigning the next order number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        new: &NewOrder,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let sequence: i64 = sqlx::query_scalar("SELECT nextval('order_number_seq')")
            .fetch_one(self.pool)
            .await?;
        let order_number = format_order_number(now.year(), sequence);

        let row: OrderRow = sqlx::query_as(&format!(
            r"
            INSERT INTO orders (
                order_number, user_id, customer_name, customer_email, customer_phone,
                items, total_amount, status, payment_status, payment_method,
                delivery, timeline, corporate, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, $10, $11, $12, $13, $13)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order_number)
        .bind(new.user_id)
        .bind(&new.customer.name)
        .bind(&new.customer.email)
        .bind(new.customer.phone.as_deref())
        .bind(Json(&new.items))
        .bind(new.total_amount)
        .bind(new.payment_status)
        .bind(new.payment_method)
        .bind(Json(&new.delivery))
        .bind(Json(&new.timeline))
        .bind(new.corporate.as_ref().map(Json))
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "order number"))?;

        Order::try_from(row)
    }

    /// Persist the lifecycle fields of `order` (status, payment, timeline).
    ///
    /// The update only applies if the stored status is still `previous`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order changed in the meantime.
    pub async fn save_lifecycle(
        &self,
        order: &Order,
        previous: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $2, payment_status = $3, payment_intent_id = $4,
                timeline = $5, updated_at = $6
            WHERE id = $1 AND status = $7
            ",
        )
        .bind(order.id)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.payment_intent_id.as_deref())
        .bind(Json(&order.timeline))
        .bind(order.updated_at)
        .bind(previous)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "order {} was modified concurrently",
                order.id
            )));
        }
        Ok(())
    }

    /// Attach a payment intent to an order that has none yet.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_payment_intent(
        &self,
        id: OrderId,
        intent_id: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders SET payment_intent_id = $2, updated_at = now()
            WHERE id = $1 AND payment_intent_id IS NULL
            ",
        )
        .bind(id)
        .bind(intent_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Orders owned by the user, or guest orders placed with their email,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        email: &Email,
        pagination: Pagination,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE user_id = $1 OR (user_id IS NULL AND customer_email = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(user_id)
        .bind(email)
        .bind(pagination.sql_limit())
        .bind(pagination.sql_offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM orders
            WHERE user_id = $1 OR (user_id IS NULL AND customer_email = $2)
            ",
        )
        .bind(user_id)
        .bind(email)
        .fetch_one(self.pool)
        .await?;

        Ok((into_orders(rows)?, count_to_total(total)))
    }

    /// Admin listing, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(
        &self,
        filters: &OrderFilters,
        pagination: Pagination,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        let search = admin_search_pattern(filters);

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE {ADMIN_FILTER}
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "
        ))
        .bind(filters.status)
        .bind(search.as_deref())
        .bind(filters.date_from)
        .bind(filters.date_to)
        .bind(pagination.sql_limit())
        .bind(pagination.sql_offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {ADMIN_FILTER}"))
                .bind(filters.status)
                .bind(search.as_deref())
                .bind(filters.date_from)
                .bind(filters.date_to)
                .fetch_one(self.pool)
                .await?;

        Ok((into_orders(rows)?, count_to_total(total)))
    }

    /// Orders of `user_id` created in `[start, end)` not yet on an invoice.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn uninvoiced_in_range(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE user_id = $1 AND invoice_id IS NULL
              AND status <> 'cancelled'
              AND created_at >= $2 AND created_at < $3
            ORDER BY created_at, id
            "
        ))
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool)
        .await?;

        into_orders(rows)
    }

    /// Link orders to the invoice that bills them, inside the invoice's
    /// creation transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if any order was invoiced
    /// concurrently.
    pub async fn attach_to_invoice(
        tx: &mut Transaction<'_, Postgres>,
        order_ids: &[OrderId],
        invoice_id: InvoiceId,
    ) -> Result<(), RepositoryError> {
        let ids: Vec<i32> = order_ids.iter().map(OrderId::as_i32).collect();
        let result = sqlx::query(
            r"
            UPDATE orders SET invoice_id = $1, updated_at = now()
            WHERE id = ANY($2) AND invoice_id IS NULL
            ",
        )
        .bind(invoice_id)
        .bind(&ids)
        .execute(&mut **tx)
        .await?;

        if usize::try_from(result.rows_affected()).ok() != Some(ids.len()) {
            return Err(RepositoryError::Conflict(
                "orders were invoiced concurrently".to_owned(),
            ));
        }
        Ok(())
    }

    /// Mark every order billed by `invoice_id` as paid.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_invoice_orders_paid(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders SET payment_status = 'paid', updated_at = now()
            WHERE invoice_id = $1 AND payment_status = 'invoiced'
            ",
        )
        .bind(invoice_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(text: Option<&str>) -> Option<String> {
        admin_search_pattern(&OrderFilters {
            search: text.map(str::to_owned),
            ..OrderFilters::default()
        })
    }

    #[test]
    fn test_admin_search_pattern() {
        assert_eq!(search(None), None);
        assert_eq!(search(Some("   ")), None);
        assert_eq!(search(Some("  Dupont ")).as_deref(), Some("%Dupont%"));
        assert_eq!(search(Some("CMD-2026_1")).as_deref(), Some("%CMD-2026\\_1%"));
    }

    #[test]
    fn test_admin_filter_binds_every_parameter() {
        for placeholder in ["$1", "$2", "$3", "$4"] {
            assert!(ADMIN_FILTER.contains(placeholder), "{placeholder}");
        }
        assert!(ADMIN_FILTER.contains("created_at >= $3"));
        assert!(ADMIN_FILTER.contains("created_at <= $4"));
        assert!(ADMIN_FILTER.contains("customer_email ILIKE $2"));
    }
}
