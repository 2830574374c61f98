//! Corporate invoice service: monthly generation, sending, status changes,
//! card payment and the overdue sweep.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use florist_core::access::{self, Identity};
use florist_core::invoice::{BillingPeriod, CorporateInvoice, IntentPlan, InvoiceFilters, NewInvoice};
use florist_core::{AccountType, InvoiceId, InvoiceStatus, Page, Pagination, UserId};

use crate::config::BillingConfig;
use crate::db::{InvoiceRepository, OrderRepository, RepositoryError, UserRepository};
use crate::error::{AppError, Result};
use crate::models::User;
use crate::services::email::{EmailService, InvoiceRecipient, MailerError};
use crate::services::payments::{IntentTarget, PaymentProvider, execute_plan};

/// Outcome of a generation run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub period: String,
    pub created: Vec<CorporateInvoice>,
    /// Accounts that already had an invoice for the period.
    pub skipped: Vec<UserId>,
    /// Accounts with nothing to bill.
    pub empty: Vec<UserId>,
}

/// Fields an admin may change on an invoice.
#[derive(Debug, Clone, Default)]
pub struct InvoiceUpdate {
    pub status: Option<InvoiceStatus>,
    pub paid_date: Option<DateTime<Utc>>,
    /// `Some("")` clears the notes.
    pub notes: Option<String>,
}

/// What the corporate client needs to pay an invoice by card.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayment {
    pub client_secret: Option<String>,
    pub payment_intent_id: String,
    pub amount: i64,
    pub currency: String,
}

/// Invoice operations.
pub struct InvoiceService<'a> {
    invoices: InvoiceRepository<'a>,
    orders: OrderRepository<'a>,
    users: UserRepository<'a>,
    billing: BillingConfig,
    email: Option<&'a EmailService>,
}

impl<'a> InvoiceService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, billing: BillingConfig) -> Self {
        Self {
            invoices: InvoiceRepository::new(pool),
            orders: OrderRepository::new(pool),
            users: UserRepository::new(pool),
            billing,
            email: None,
        }
    }

    /// Send invoices through `email`.
    #[must_use]
    pub const fn with_email(mut self, email: Option<&'a EmailService>) -> Self {
        self.email = email;
        self
    }

    async fn load(&self, id: InvoiceId) -> Result<CorporateInvoice> {
        self.invoices
            .get(id)
            .await?
            .map(CorporateInvoice::with_computed_totals)
            .ok_or_else(AppError::invoice_not_found)
    }

    /// Any invoice, totals recomputed from its lines (admin).
    ///
    /// # Errors
    ///
    /// `INVOICE_NOT_FOUND` if the invoice does not exist.
    pub async fn get(&self, id: InvoiceId) -> Result<CorporateInvoice> {
        self.load(id).await
    }

    /// An invoice read on behalf of `identity`.
    ///
    /// Drafts are only visible to admins; the owner gets `INVOICE_NOT_FOUND`.
    ///
    /// # Errors
    ///
    /// `INVOICE_NOT_FOUND`, `AUTH_REQUIRED` or `UNAUTHORIZED_ACCESS`.
    #[instrument(skip(self, identity), fields(invoice_id = %id))]
    pub async fn get_for(&self, identity: &Identity, id: InvoiceId) -> Result<CorporateInvoice> {
        let invoice = self.load(id).await?;
        access::authorize_invoice_read(identity, invoice.user_id)?;
        if !identity.is_admin() && !invoice.status.is_issued() {
            return Err(AppError::invoice_not_found());
        }
        Ok(invoice)
    }

    /// Back-office listing.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn list(&self, filters: InvoiceFilters, pagination: Pagination) -> Result<Page<CorporateInvoice>> {
        let (invoices, total) = self.invoices.list(filters, pagination).await?;
        Ok(Page::new(invoices, pagination, total).map(CorporateInvoice::with_computed_totals))
    }

    /// Issued invoices of the signed-in corporate account.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn list_for_owner(&self, owner: UserId, pagination: Pagination) -> Result<Page<CorporateInvoice>> {
        let (invoices, total) = self.invoices.list_issued_for_owner(owner, pagination).await?;
        Ok(Page::new(invoices, pagination, total).map(CorporateInvoice::with_computed_totals))
    }

    /// Create draft invoices for `period`, for every corporate account or
    /// only `only_user`.
    ///
    /// An account that already has an invoice for the period is skipped, as
    /// is one without billable orders.
    ///
    /// # Errors
    ///
    /// `USER_NOT_FOUND` when `only_user` is not a corporate account, or a
    /// database error.
    #[instrument(skip(self), fields(period = %period))]
    pub async fn generate(
        &self,
        period: BillingPeriod,
        only_user: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<GenerationReport> {
        let accounts: Vec<User> = match only_user {
            Some(id) => {
                let user = self
                    .users
                    .get_by_id(id)
                    .await?
                    .filter(|u| u.account_type == AccountType::Corporate)
                    .ok_or_else(AppError::user_not_found)?;
                vec![user]
            }
            None => self.users.list_corporate().await?,
        };

        let (start, end) = period.bounds();
        let mut report = GenerationReport {
            period: period.to_string(),
            ..GenerationReport::default()
        };

        for account in accounts {
            let orders = self.orders.uninvoiced_in_range(account.id, start, end).await?;
            let Some(draft) = NewInvoice::for_period(
                account.id,
                period,
                &orders,
                self.billing.vat_rate,
                self.billing.payment_terms_days,
            ) else {
                report.empty.push(account.id);
                continue;
            };

            match self.invoices.create_draft(&draft, now).await {
                Ok(invoice) => {
                    tracing::info!(
                        invoice_id = %invoice.id,
                        invoice_number = %invoice.invoice_number,
                        user_id = %account.id,
                        lines = invoice.lines.len(),
                        "Draft invoice created"
                    );
                    report.created.push(invoice.with_computed_totals());
                }
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::info!(user_id = %account.id, %reason, "Invoice already exists, skipped");
                    report.skipped.push(account.id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(report)
    }

    async fn recipient(&self, invoice: &CorporateInvoice) -> Result<User> {
        self.users
            .get_by_id(invoice.user_id)
            .await?
            .ok_or_else(AppError::user_not_found)
    }

    async fn deliver(&self, invoice: &CorporateInvoice, user: &User) -> Result<()> {
        let email = self.email.ok_or(MailerError::NotConfigured)?;
        let company = user.company_name.as_deref().unwrap_or(&user.name);
        email
            .send_invoice(
                invoice,
                InvoiceRecipient {
                    email: user.email.as_str(),
                    name: &user.name,
                    company,
                },
            )
            .await?;
        Ok(())
    }

    /// Email a draft invoice and move it to `sent`.
    ///
    /// # Errors
    ///
    /// `INVALID_TRANSITION` unless the invoice is a draft, `EMAIL_ERROR` if it
    /// cannot be delivered (the invoice then stays a draft).
    #[instrument(skip(self), fields(invoice_id = %id))]
    pub async fn send(&self, id: InvoiceId, now: DateTime<Utc>) -> Result<CorporateInvoice> {
        let mut invoice = self.load(id).await?;
        let previous = invoice.status;
        invoice.mark_sent(now)?;

        let user = self.recipient(&invoice).await?;
        self.deliver(&invoice, &user).await?;
        self.invoices.save_status(&invoice, previous).await?;

        tracing::info!(invoice_id = %id, to = %user.email, "Invoice sent");
        Ok(invoice)
    }

    /// Email an issued invoice again. Its status is unchanged.
    ///
    /// # Errors
    ///
    /// `INVALID_TRANSITION` for a draft, `EMAIL_ERROR` on delivery failure.
    #[instrument(skip(self), fields(invoice_id = %id))]
    pub async fn resend(&self, id: InvoiceId) -> Result<CorporateInvoice> {
        let invoice = self.load(id).await?;
        if !invoice.status.is_issued() {
            return Err(AppError::InvalidTransition(
                "a draft invoice must be sent before it can be resent".to_owned(),
            ));
        }

        let user = self.recipient(&invoice).await?;
        self.deliver(&invoice, &user).await?;

        tracing::info!(invoice_id = %id, to = %user.email, "Invoice resent");
        Ok(invoice)
    }

    /// Admin update: status transition and/or notes.
    ///
    /// `sent` performs the transition without email; `paid` uses `paid_date`
    /// or `now`, and marks the invoiced orders paid.
    ///
    /// # Errors
    ///
    /// `ALREADY_PAID`, `INVALID_TRANSITION` for an illegal move, `CONFLICT`
    /// if the invoice changed concurrently.
    #[instrument(skip(self, update), fields(invoice_id = %id, status = ?update.status))]
    pub async fn update(
        &self,
        id: InvoiceId,
        update: InvoiceUpdate,
        now: DateTime<Utc>,
    ) -> Result<CorporateInvoice> {
        let mut invoice = self.load(id).await?;
        let previous = invoice.status;

        match update.status {
            None => {}
            Some(InvoiceStatus::Sent) => invoice.mark_sent(now)?,
            Some(InvoiceStatus::Paid) => invoice.mark_paid(update.paid_date.unwrap_or(now))?,
            Some(InvoiceStatus::Overdue) => invoice.mark_overdue(now.date_naive(), now)?,
            Some(InvoiceStatus::Draft) if previous == InvoiceStatus::Draft => {}
            Some(InvoiceStatus::Draft) => {
                return Err(AppError::InvalidTransition(format!(
                    "cannot move invoice from {previous} back to draft"
                )));
            }
        }

        let notes_changed = update.notes.is_some();
        if let Some(notes) = update.notes {
            let notes = notes.trim();
            invoice.notes = (!notes.is_empty()).then(|| notes.to_owned());
            invoice.updated_at = now;
        }

        if invoice.status != previous {
            self.invoices.save_status(&invoice, previous).await?;
            tracing::info!(invoice_id = %id, from = %previous, to = %invoice.status, "Invoice status updated");
            if invoice.status == InvoiceStatus::Paid {
                self.settle_orders(id).await?;
            }
        } else if notes_changed {
            self.invoices.update_notes(id, invoice.notes.as_deref()).await?;
        }

        Ok(invoice)
    }

    async fn settle_orders(&self, id: InvoiceId) -> Result<()> {
        let settled = self.orders.mark_invoice_orders_paid(id).await?;
        tracing::info!(invoice_id = %id, orders = settled, "Invoiced orders marked paid");
        Ok(())
    }

    /// Create or fetch the card payment intent for an issued invoice.
    ///
    /// The intent is keyed by the invoice, and only the first intent stored
    /// on the invoice is ever used: if another request stored one first,
    /// that one is returned.
    ///
    /// # Errors
    ///
    /// Access errors, `ALREADY_PAID`, `INVALID_TRANSITION` for a draft,
    /// `PAYMENT_PROVIDER_ERROR` if the processor fails.
    #[instrument(skip(self, identity, provider), fields(invoice_id = %id))]
    pub async fn payment_intent<P: PaymentProvider>(
        &self,
        identity: &Identity,
        id: InvoiceId,
        provider: &P,
    ) -> Result<InvoicePayment> {
        let invoice = self.load(id).await?;
        access::authorize_invoice_read(identity, invoice.user_id)?;

        let plan = invoice.payment_intent_plan()?;
        let currency = self.billing.currency.code();
        let target = IntentTarget::Invoice(id);
        let mut intent = execute_plan(provider, &plan, currency, target).await?;

        if matches!(plan, IntentPlan::Create { .. })
            && !self.invoices.set_payment_intent(id, &intent.id).await?
        {
            let stored = self
                .invoices
                .get(id)
                .await?
                .and_then(|inv| inv.payment_intent_id)
                .ok_or_else(AppError::invoice_not_found)?;
            if stored != intent.id {
                tracing::info!(invoice_id = %id, intent_id = %stored, "Using intent stored by a concurrent request");
                intent = provider.retrieve_intent(&stored).await?;
            }
        }

        Ok(InvoicePayment {
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
            amount: intent.amount,
            currency: intent.currency,
        })
    }

    /// Record a card payment reported by the processor.
    ///
    /// Returns `false` when there was nothing to record: an unknown invoice,
    /// one already paid, or a draft.
    ///
    /// # Errors
    ///
    /// Returns a database error, or `CONFLICT` if the invoice changed
    /// concurrently.
    #[instrument(skip(self), fields(invoice_id = %id))]
    pub async fn record_payment(&self, id: InvoiceId, intent_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let Some(mut invoice) = self.invoices.get(id).await? else {
            tracing::warn!(invoice_id = %id, "Payment event for unknown invoice");
            return Ok(false);
        };

        let previous = invoice.status;
        match invoice.mark_paid(at) {
            Ok(()) => {}
            Err(florist_core::invoice::InvoiceError::AlreadyPaid) => {
                tracing::info!(invoice_id = %id, "Invoice already paid, event acknowledged");
                return Ok(false);
            }
            Err(e) => {
                tracing::warn!(invoice_id = %id, error = %e, "Payment event could not be applied");
                return Ok(false);
            }
        }
        if invoice.payment_intent_id.is_none() {
            self.invoices.set_payment_intent(id, intent_id).await?;
        }
        self.invoices.save_status(&invoice, previous).await?;
        self.settle_orders(id).await?;

        tracing::info!(invoice_id = %id, intent_id, "Invoice paid");
        Ok(true)
    }

    /// Move every sent invoice whose due date is before `today` to `overdue`.
    ///
    /// Returns the number of invoices marked. Invoices changed concurrently
    /// are left for the next run.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    #[instrument(skip(self))]
    pub async fn mark_overdue(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<usize> {
        let mut marked = 0;
        for mut invoice in self.invoices.sent_past_due(today).await? {
            let previous = invoice.status;
            if let Err(e) = invoice.mark_overdue(today, now) {
                tracing::warn!(invoice_id = %invoice.id, error = %e, "Invoice not marked overdue");
                continue;
            }
            match self.invoices.save_status(&invoice, previous).await {
                Ok(()) => {
                    tracing::info!(
                        invoice_id = %invoice.id,
                        due_date = %invoice.due_date,
                        "Invoice marked overdue"
                    );
                    marked += 1;
                }
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::warn!(invoice_id = %invoice.id, %reason, "Invoice changed during sweep");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(marked)
    }
}
