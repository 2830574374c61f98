//! Corporate invoice repository.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;

use florist_core::invoice::{
    BillingPeriod, CorporateInvoice, InvoiceFilters, InvoiceLine, InvoiceTotals, NewInvoice,
    invoice_number,
};
use florist_core::{InvoiceId, InvoiceStatus, Pagination, UserId, VatRate};

use super::{OrderRepository, RepositoryError, count_to_total};

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: InvoiceId,
    invoice_number: String,
    user_id: UserId,
    period_month: i32,
    period_year: i32,
    lines: Json<Vec<InvoiceLine>>,
    vat_rate: Decimal,
    subtotal: Decimal,
    vat_amount: Decimal,
    total_amount: Decimal,
    status: InvoiceStatus,
    due_date: NaiveDate,
    paid_date: Option<DateTime<Utc>>,
    payment_intent_id: Option<String>,
    notes: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for CorporateInvoice {
    type Error = RepositoryError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let corrupt =
            |what: String| RepositoryError::DataCorruption(format!("invoice {}: {what}", row.id));
        let vat_rate = VatRate::from_percent(row.vat_rate).map_err(|e| corrupt(e.to_string()))?;
        let month = u32::try_from(row.period_month)
            .map_err(|_| corrupt(format!("month {}", row.period_month)))?;
        let period =
            BillingPeriod::new(month, row.period_year).map_err(|e| corrupt(e.to_string()))?;

        Ok(Self {
            id: row.id,
            invoice_number: row.invoice_number,
            user_id: row.user_id,
            period,
            lines: row.lines.0,
            vat_rate,
            totals: InvoiceTotals {
                subtotal: row.subtotal,
                vat_amount: row.vat_amount,
                total_amount: row.total_amount,
            },
            status: row.status,
            due_date: row.due_date,
            paid_date: row.paid_date,
            payment_intent_id: row.payment_intent_id,
            notes: row.notes,
            sent_at: row.sent_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_invoices(rows: Vec<InvoiceRow>) -> Result<Vec<CorporateInvoice>, RepositoryError> {
    rows.into_iter().map(CorporateInvoice::try_from).collect()
}

/// Advisory lock key serialising invoice numbering within a billing period.
///
/// The high half tags the lock as invoice numbering so it cannot collide with
/// another advisory lock user.
fn numbering_lock_key(period: BillingPeriod) -> i64 {
    const NAMESPACE: i64 = 0x464143 << 32;
    NAMESPACE | (i64::from(period.year()) * 100 + i64::from(period.month()))
}

const INVOICE_COLUMNS: &str = r"
    id, invoice_number, user_id, period_month, period_year, lines, vat_rate,
    subtotal, vat_amount, total_amount, status, due_date, paid_date,
    payment_intent_id, notes, sent_at, created_at, updated_at";

/// Repository for invoice database operations.
pub struct InvoiceRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> InvoiceRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an invoice by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: InvoiceId) -> Result<Option<CorporateInvoice>, RepositoryError> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM corporate_invoices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        row.map(CorporateInvoice::try_from).transpose()
    }

    /// Admin listing, newest period first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filters: InvoiceFilters,
        pagination: Pagination,
    ) -> Result<(Vec<CorporateInvoice>, u64), RepositoryError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            r"
            SELECT {INVOICE_COLUMNS} FROM corporate_invoices
            WHERE ($1::invoice_status IS NULL OR status = $1)
              AND ($2::integer IS NULL OR user_id = $2)
            ORDER BY period_year DESC, period_month DESC, id DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(filters.status)
        .bind(filters.user_id)
        .bind(pagination.sql_limit())
        .bind(pagination.sql_offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM corporate_invoices
            WHERE ($1::invoice_status IS NULL OR status = $1)
              AND ($2::integer IS NULL OR user_id = $2)
            ",
        )
        .bind(filters.status)
        .bind(filters.user_id)
        .fetch_one(self.pool)
        .await?;

        Ok((into_invoices(rows)?, count_to_total(total)))
    }

    /// Issued (non-draft) invoices of one corporate account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_issued_for_owner(
        &self,
        user_id: UserId,
        pagination: Pagination,
    ) -> Result<(Vec<CorporateInvoice>, u64), RepositoryError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            r"
            SELECT {INVOICE_COLUMNS} FROM corporate_invoices
            WHERE user_id = $1 AND status <> 'draft'
            ORDER BY period_year DESC, period_month DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(user_id)
        .bind(pagination.sql_limit())
        .bind(pagination.sql_offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM corporate_invoices WHERE user_id = $1 AND status <> 'draft'",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok((into_invoices(rows)?, count_to_total(total)))
    }

    /// Insert a draft invoice and link its orders, in one transaction.
    ///
    /// The invoice number is the next in the period. Numbering is serialised
    /// per period with a transaction-scoped advisory lock, so concurrent runs
    /// never compute the same number; the unique index on `(user, period)`
    /// still rejects a second invoice for the same account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the account already has an
    /// invoice for the period, or if its orders were invoiced concurrently.
    pub async fn create_draft(
        &self,
        new: &NewInvoice,
        now: DateTime<Utc>,
    ) -> Result<CorporateInvoice, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(numbering_lock_key(new.period))
            .execute(&mut *tx)
            .await?;

        let month = i32::try_from(new.period.month()).unwrap_or_default();
        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM corporate_invoices WHERE period_year = $1 AND period_month = $2",
        )
        .bind(new.period.year())
        .bind(month)
        .fetch_one(&mut *tx)
        .await?;
        let sequence = u32::try_from(existing).unwrap_or(u32::MAX).saturating_add(1);

        let row: InvoiceRow = sqlx::query_as(&format!(
            r"
            INSERT INTO corporate_invoices (
                invoice_number, user_id, period_month, period_year, lines, vat_rate,
                subtotal, vat_amount, total_amount, status, due_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'draft', $10, $11, $11)
            RETURNING {INVOICE_COLUMNS}
            "
        ))
        .bind(invoice_number(new.period, sequence))
        .bind(new.user_id)
        .bind(month)
        .bind(new.period.year())
        .bind(Json(&new.lines))
        .bind(new.vat_rate.percent())
        .bind(new.totals.subtotal)
        .bind(new.totals.vat_amount)
        .bind(new.totals.total_amount)
        .bind(new.due_date)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "invoice for this period"))?;

        OrderRepository::attach_to_invoice(&mut tx, &new.order_ids(), row.id).await?;
        tx.commit().await?;

        CorporateInvoice::try_from(row)
    }

    /// Persist a status change computed from a previously read invoice.
    ///
    /// Totals are written from the lines on every save, so a stored invoice
    /// never disagrees with them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the stored status is no longer
    /// `previous`.
    pub async fn save_status(
        &self,
        invoice: &CorporateInvoice,
        previous: InvoiceStatus,
    ) -> Result<(), RepositoryError> {
        let totals = invoice.compute_totals();
        let result = sqlx::query(
            r"
            UPDATE corporate_invoices
            SET status = $2, paid_date = $3, sent_at = $4, notes = $5,
                subtotal = $6, vat_amount = $7, total_amount = $8, updated_at = $9
            WHERE id = $1 AND status = $10
            ",
        )
        .bind(invoice.id)
        .bind(invoice.status)
        .bind(invoice.paid_date)
        .bind(invoice.sent_at)
        .bind(invoice.notes.as_deref())
        .bind(totals.subtotal)
        .bind(totals.vat_amount)
        .bind(totals.total_amount)
        .bind(invoice.updated_at)
        .bind(previous)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "invoice {} was modified concurrently",
                invoice.id
            )));
        }
        Ok(())
    }

    /// Replace the notes of an invoice.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the invoice does not exist.
    pub async fn update_notes(
        &self,
        id: InvoiceId,
        notes: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE corporate_invoices SET notes = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(notes)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Record a payment intent on an invoice that has none.
    ///
    /// Returns `false` when another request stored one first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_payment_intent(
        &self,
        id: InvoiceId,
        intent_id: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE corporate_invoices SET payment_intent_id = $2, updated_at = now()
            WHERE id = $1 AND payment_intent_id IS NULL
            ",
        )
        .bind(id)
        .bind(intent_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sent invoices whose due date is before `today`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sent_past_due(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<CorporateInvoice>, RepositoryError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            r"
            SELECT {INVOICE_COLUMNS} FROM corporate_invoices
            WHERE status = 'sent' AND due_date < $1
            ORDER BY due_date, id
            "
        ))
        .bind(today)
        .fetch_all(self.pool)
        .await?;
        into_invoices(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering_lock_is_per_period() {
        let march = BillingPeriod::new(3, 2026).unwrap();
        assert_eq!(numbering_lock_key(march), numbering_lock_key(march));
        assert_ne!(
            numbering_lock_key(march),
            numbering_lock_key(BillingPeriod::new(4, 2026).unwrap())
        );
        assert_ne!(
            numbering_lock_key(BillingPeriod::new(12, 2025).unwrap()),
            numbering_lock_key(BillingPeriod::new(1, 2026).unwrap())
        );
        assert!(numbering_lock_key(march) > 0);
    }
}
