//! Corporate billing runs.
//!
//! # Usage
//!
//! ```bash
//! # Draft invoices for March 2026
//! florist invoices generate --month 3 --year 2026
//!
//! # Last month, for every corporate account
//! florist invoices generate
//!
//! # Move sent invoices past their due date to overdue
//! florist invoices mark-overdue
//! ```
//!
//! # Environment Variables
//!
//! - `FLORIST_DATABASE_URL` (or `DATABASE_URL`)
//! - `FLORIST_DEFAULT_VAT_RATE`, `FLORIST_INVOICE_PAYMENT_TERMS_DAYS`,
//!   `FLORIST_CURRENCY`

use chrono::Utc;
use thiserror::Error;

use florist_core::UserId;
use florist_core::invoice::{BillingPeriod, InvoiceError};
use florist_storefront::config::{BillingConfig, ConfigError};
use florist_storefront::error::AppError;
use florist_storefront::services::invoices::InvoiceService;

use super::{ConnectError, connect};

/// Errors that can occur during a billing run.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid period: {0}")]
    Period(#[from] InvoiceError),

    #[error(transparent)]
    Service(#[from] AppError),
}

/// Resolve the period to bill; defaults to the previous calendar month.
///
/// A month alone means this year's; a year alone is rejected.
fn period_for(month: Option<u32>, year: Option<i32>) -> Result<BillingPeriod, InvoiceError> {
    let current = BillingPeriod::containing(Utc::now());
    match (month, year) {
        (Some(month), Some(year)) => BillingPeriod::new(month, year),
        (Some(month), None) => BillingPeriod::new(month, current.year()),
        (None, Some(year)) => Err(InvoiceError::InvalidPeriod { month: 0, year }),
        (None, None) => Ok(current.previous()),
    }
}

/// Create draft invoices for a period.
pub async fn generate(
    month: Option<u32>,
    year: Option<i32>,
    user: Option<i32>,
) -> Result<(), BillingError> {
    let period = period_for(month, year)?;
    let billing = BillingConfig::from_env()?;
    let pool = connect().await?;

    tracing::info!(period = %period, "Generating invoices");
    let report = InvoiceService::new(&pool, billing)
        .generate(period, user.map(UserId::new), Utc::now())
        .await?;

    #[allow(clippy::print_stdout)]
    {
        println!("Period {}", report.period);
        for invoice in &report.created {
            println!(
                "  created {} for user {} ({} {})",
                invoice.invoice_number,
                invoice.user_id,
                invoice.totals.total_amount,
                billing.currency.code()
            );
        }
        println!(
            "{} created, {} already invoiced, {} without orders",
            report.created.len(),
            report.skipped.len(),
            report.empty.len()
        );
    }
    Ok(())
}

/// Move every sent invoice past its due date to overdue.
pub async fn mark_overdue() -> Result<(), BillingError> {
    let billing = BillingConfig::from_env()?;
    let pool = connect().await?;

    let now = Utc::now();
    let count = InvoiceService::new(&pool, billing)
        .mark_overdue(now.date_naive(), now)
        .await?;

    tracing::info!(count, "Overdue sweep complete");
    #[allow(clippy::print_stdout)]
    {
        println!("{count} invoice(s) marked overdue");
    }
    Ok(())
}
