//! Corporate invoice aggregate and billing lifecycle.
//!
//! Corporate accounts are billed monthly. At the end of a period every
//! uninvoiced, non-cancelled order of the account is gathered into one
//! `draft` invoice with one line per order. The invoice is then sent, and
//! eventually paid (by an admin or by a card payment) or flagged overdue.
//!
//! Totals are never stored independently of the lines: [`compute_totals`] is a
//! pure function of the lines and the VAT rate fixed on the invoice, and is
//! re-run every time totals are shown.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::Order;
use crate::types::{
    InvoiceId, InvoiceStatus, OrderId, OrderStatus, UserId, VatRate, round_money, to_minor_units,
};

/// Invoice lifecycle failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvoiceError {
    #[error("invoice is already paid")]
    AlreadyPaid,
    #[error("cannot move invoice from {from} to {to}")]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },
    #[error("invoice is not due until {0}")]
    NotYetDue(NaiveDate),
    #[error("invoice amount cannot be charged: {0}")]
    AmountOutOfRange(Decimal),
    #[error("invalid billing period {month}/{year}")]
    InvalidPeriod { month: u32, year: i32 },
}

/// A calendar month being billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBillingPeriod")]
pub struct BillingPeriod {
    month: u32,
    year: i32,
}

#[derive(Deserialize)]
struct RawBillingPeriod {
    month: u32,
    year: i32,
}

impl TryFrom<RawBillingPeriod> for BillingPeriod {
    type Error = InvoiceError;

    fn try_from(raw: RawBillingPeriod) -> Result<Self, Self::Error> {
        Self::new(raw.month, raw.year)
    }
}

impl BillingPeriod {
    /// # Errors
    ///
    /// [`InvoiceError::InvalidPeriod`] unless `month` is `1..=12` and the
    /// year is representable.
    pub fn new(month: u32, year: i32) -> Result<Self, InvoiceError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| d.checked_add_months(chrono::Months::new(1)))
            .map(|_| Self { month, year })
            .ok_or(InvoiceError::InvalidPeriod { month, year })
    }

    /// The period containing `at`.
    #[must_use]
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            month: at.month(),
            year: at.year(),
        }
    }

    /// The month before this one.
    #[must_use]
    pub const fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                month: 12,
                year: self.year - 1,
            }
        } else {
            Self {
                month: self.month - 1,
                year: self.year,
            }
        }
    }

    #[must_use]
    pub const fn month(self) -> u32 {
        self.month
    }

    #[must_use]
    pub const fn year(self) -> i32 {
        self.year
    }

    /// First day of the period.
    #[must_use]
    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// First day of the following period.
    #[must_use]
    pub fn next_first_day(self) -> NaiveDate {
        self.first_day()
            .checked_add_months(chrono::Months::new(1))
            .unwrap_or(NaiveDate::MAX)
    }

    /// `[start, end)` bounds in UTC.
    #[must_use]
    pub fn bounds(self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.from_utc_datetime(&self.first_day().and_time(chrono::NaiveTime::MIN));
        let end = Utc.from_utc_datetime(&self.next_first_day().and_time(chrono::NaiveTime::MIN));
        (start, end)
    }

    /// Whether `at` falls within the period.
    #[must_use]
    pub fn contains(self, at: DateTime<Utc>) -> bool {
        let (start, end) = self.bounds();
        start <= at && at < end
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

/// Invoice number: `FAC-YYYYMM-NNNN`, sequential within a period.
#[must_use]
pub fn invoice_number(period: BillingPeriod, sequence: u32) -> String {
    format!("FAC-{}{:02}-{sequence:04}", period.year, period.month)
}

/// Payment due date: first day after the period plus `terms_days`.
#[must_use]
pub fn due_date(period: BillingPeriod, terms_days: u32) -> NaiveDate {
    let start = period.next_first_day();
    start
        .checked_add_days(Days::new(u64::from(terms_days)))
        .unwrap_or(start)
}

/// One billed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub order_id: OrderId,
    pub order_number: String,
    pub order_date: DateTime<Utc>,
    pub description: String,
    pub amount: Decimal,
}

impl InvoiceLine {
    #[must_use]
    pub fn for_order(order: &Order) -> Self {
        let units: u32 = order.items.iter().map(|i| i.quantity).sum();
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            order_date: order.created_at,
            description: format!(
                "Commande {} ({units} article{})",
                order.order_number,
                if units > 1 { "s" } else { "" }
            ),
            amount: order.total_amount,
        }
    }
}

/// Invoice amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
}

/// Compute invoice totals from its lines.
///
/// `subtotal` is the sum of the lines rounded to cents, `vat_amount` is
/// `round(subtotal * rate, 2)` and `total_amount = subtotal + vat_amount`.
/// The result depends only on the inputs, so repeated calls never drift.
#[must_use]
pub fn compute_totals(lines: &[InvoiceLine], vat_rate: VatRate) -> InvoiceTotals {
    let subtotal = round_money(lines.iter().map(|l| l.amount).sum());
    let vat_amount = vat_rate.vat_on(subtotal);
    InvoiceTotals {
        subtotal,
        vat_amount,
        total_amount: subtotal + vat_amount,
    }
}

/// What to ask the payment processor for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentPlan {
    /// The invoice already has an intent; fetch it.
    Retrieve(String),
    /// Create a new intent, keyed so a retry returns the same one.
    Create {
        amount_cents: i64,
        idempotency_key: String,
    },
}

/// A persisted corporate invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorporateInvoice {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub user_id: UserId,
    pub period: BillingPeriod,
    pub lines: Vec<InvoiceLine>,
    pub vat_rate: VatRate,
    #[serde(flatten)]
    pub totals: InvoiceTotals,
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    pub paid_date: Option<DateTime<Utc>>,
    pub payment_intent_id: Option<String>,
    pub notes: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CorporateInvoice {
    /// Totals recomputed from the lines.
    #[must_use]
    pub fn compute_totals(&self) -> InvoiceTotals {
        compute_totals(&self.lines, self.vat_rate)
    }

    /// Replace the stored totals with freshly computed ones.
    #[must_use]
    pub fn with_computed_totals(mut self) -> Self {
        self.totals = self.compute_totals();
        self
    }

    /// `draft -> sent`.
    ///
    /// # Errors
    ///
    /// [`InvoiceError::InvalidTransition`] from any other state.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> Result<(), InvoiceError> {
        self.transition(InvoiceStatus::Sent)?;
        self.sent_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record payment.
    ///
    /// # Errors
    ///
    /// [`InvoiceError::AlreadyPaid`] if already paid (nothing is changed),
    /// [`InvoiceError::InvalidTransition`] for a draft.
    pub fn mark_paid(&mut self, paid_date: DateTime<Utc>) -> Result<(), InvoiceError> {
        if self.status == InvoiceStatus::Paid {
            return Err(InvoiceError::AlreadyPaid);
        }
        self.transition(InvoiceStatus::Paid)?;
        self.paid_date = Some(paid_date);
        self.updated_at = paid_date.max(self.updated_at);
        Ok(())
    }

    /// `sent -> overdue`, once `today` is past the due date.
    ///
    /// # Errors
    ///
    /// [`InvoiceError::InvalidTransition`] unless sent,
    /// [`InvoiceError::NotYetDue`] before the due date has passed.
    pub fn mark_overdue(&mut self, today: NaiveDate, now: DateTime<Utc>) -> Result<(), InvoiceError> {
        if !self.status.can_transition_to(InvoiceStatus::Overdue) {
            return Err(InvoiceError::InvalidTransition {
                from: self.status,
                to: InvoiceStatus::Overdue,
            });
        }
        if today <= self.due_date {
            return Err(InvoiceError::NotYetDue(self.due_date));
        }
        self.status = InvoiceStatus::Overdue;
        self.updated_at = now;
        Ok(())
    }

    fn transition(&mut self, next: InvoiceStatus) -> Result<(), InvoiceError> {
        if !self.status.can_transition_to(next) {
            return Err(InvoiceError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Key used so that retrying intent creation for this invoice never
    /// charges twice.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        format!("invoice-{}", self.id)
    }

    /// Decide how to obtain a payment intent for this invoice.
    ///
    /// # Errors
    ///
    /// [`InvoiceError::AlreadyPaid`] when paid, [`InvoiceError::InvalidTransition`]
    /// for a draft (it has not been issued), [`InvoiceError::AmountOutOfRange`]
    /// when the total cannot be expressed in cents.
    pub fn payment_intent_plan(&self) -> Result<IntentPlan, InvoiceError> {
        match self.status {
            InvoiceStatus::Paid => return Err(InvoiceError::AlreadyPaid),
            InvoiceStatus::Draft => {
                return Err(InvoiceError::InvalidTransition {
                    from: InvoiceStatus::Draft,
                    to: InvoiceStatus::Paid,
                });
            }
            InvoiceStatus::Sent | InvoiceStatus::Overdue => {}
        }
        if let Some(existing) = &self.payment_intent_id {
            return Ok(IntentPlan::Retrieve(existing.clone()));
        }
        let total = self.compute_totals().total_amount;
        let amount_cents = to_minor_units(total)
            .filter(|cents| *cents > 0)
            .ok_or(InvoiceError::AmountOutOfRange(total))?;
        Ok(IntentPlan::Create {
            amount_cents,
            idempotency_key: self.idempotency_key(),
        })
    }
}

/// A draft invoice ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub user_id: UserId,
    pub period: BillingPeriod,
    pub lines: Vec<InvoiceLine>,
    pub vat_rate: VatRate,
    pub totals: InvoiceTotals,
    pub due_date: NaiveDate,
}

impl NewInvoice {
    /// Gather `orders` of `user_id` for `period` into a draft.
    ///
    /// Cancelled orders, orders outside the period, orders of other users and
    /// orders already on an invoice are skipped. Returns `None` when nothing
    /// is left to bill.
    #[must_use]
    pub fn for_period(
        user_id: UserId,
        period: BillingPeriod,
        orders: &[Order],
        vat_rate: VatRate,
        terms_days: u32,
    ) -> Option<Self> {
        let mut billable: Vec<&Order> = orders
            .iter()
            .filter(|o| o.user_id == Some(user_id))
            .filter(|o| o.status != OrderStatus::Cancelled)
            .filter(|o| o.invoice_id.is_none())
            .filter(|o| period.contains(o.created_at))
            .collect();
        if billable.is_empty() {
            return None;
        }
        billable.sort_by_key(|o| (o.created_at, o.id));

        let lines: Vec<InvoiceLine> = billable.into_iter().map(InvoiceLine::for_order).collect();
        Some(Self {
            user_id,
            period,
            totals: compute_totals(&lines, vat_rate),
            lines,
            vat_rate,
            due_date: due_date(period, terms_days),
        })
    }

    /// Ids of the orders this invoice bills.
    #[must_use]
    pub fn order_ids(&self) -> Vec<OrderId> {
        self.lines.iter().map(|l| l.order_id).collect()
    }
}

/// Admin listing filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvoiceFilters {
    pub status: Option<InvoiceStatus>,
    pub user_id: Option<UserId>,
}
