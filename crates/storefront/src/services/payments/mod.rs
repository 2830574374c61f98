//! Payment processor integration.
//!
//! The storefront needs two calls from the processor (create and retrieve a
//! payment intent) plus signed webhooks. [`PaymentProvider`] is the seam;
//! [`StripeClient`] is the production implementation.

mod stripe;
pub mod webhook;

#[cfg(test)]
pub mod fake;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use florist_core::invoice::IntentPlan;
use florist_core::{InvoiceId, OrderId};

pub use stripe::StripeClient;

/// Errors from the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Processor returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// No processor is configured on this deployment.
    #[error("payment processor is not configured")]
    NotConfigured,

    /// Webhook signature header missing, stale or wrong.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Response or webhook body could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

/// What a payment intent pays for. Stored in the intent's metadata so the
/// webhook can find the order or invoice again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentTarget {
    Order(OrderId),
    Invoice(InvoiceId),
}

impl IntentTarget {
    /// Metadata key and value sent to the processor.
    #[must_use]
    pub fn metadata(self) -> (&'static str, String) {
        match self {
            Self::Order(id) => ("order_id", id.to_string()),
            Self::Invoice(id) => ("invoice_id", id.to_string()),
        }
    }
}

/// Parameters for creating a payment intent.
#[derive(Debug, Clone)]
pub struct CreateIntent<'a> {
    /// Amount in minor units (cents).
    pub amount_cents: i64,
    /// Lowercase ISO currency code.
    pub currency: &'a str,
    /// Sent as `Idempotency-Key`; retries with the same key return the
    /// intent created by the first call.
    pub idempotency_key: &'a str,
    pub target: IntentTarget,
}

/// A payment intent as the storefront sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

/// Operations the storefront needs from a payment processor.
pub trait PaymentProvider: Send + Sync {
    /// Create an intent, honouring the idempotency key.
    fn create_intent(
        &self,
        request: &CreateIntent<'_>,
    ) -> impl Future<Output = Result<PaymentIntent, PaymentError>> + Send;

    /// Fetch an existing intent by id.
    fn retrieve_intent(
        &self,
        intent_id: &str,
    ) -> impl Future<Output = Result<PaymentIntent, PaymentError>> + Send;
}

/// Carry out an [`IntentPlan`]: fetch the stored intent, or create one.
///
/// # Errors
///
/// Propagates the provider's error; nothing is retried.
pub async fn execute_plan<P: PaymentProvider>(
    provider: &P,
    plan: &IntentPlan,
    currency: &str,
    target: IntentTarget,
) -> Result<PaymentIntent, PaymentError> {
    match plan {
        IntentPlan::Retrieve(intent_id) => provider.retrieve_intent(intent_id).await,
        IntentPlan::Create {
            amount_cents,
            idempotency_key,
        } => {
            provider
                .create_intent(&CreateIntent {
                    amount_cents: *amount_cents,
                    currency,
                    idempotency_key,
                    target,
                })
                .await
        }
    }
}
