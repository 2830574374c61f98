//! Payment processor webhook.
//!
//! Events are verified against the raw body, then applied idempotently:
//! repeated deliveries and events for unknown records are acknowledged so the
//! processor stops retrying.

use axum::{Router, extract::State, http::HeaderMap, routing::post};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::instrument;

use crate::error::{AppError, add_breadcrumb};
use crate::routes::{ApiResponse, ApiResult};
use crate::services::invoices::InvoiceService;
use crate::services::orders::{OrderService, PaymentOutcome};
use crate::services::payments::PaymentError;
use crate::services::payments::webhook::{self, SIGNATURE_HEADER, WebhookAction};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(receive))
}

#[derive(Debug, Serialize)]
pub struct Received {
    pub received: bool,
}

/// POST /api/webhooks/payments
#[instrument(skip_all)]
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Received> {
    let stripe = state
        .config()
        .stripe
        .as_ref()
        .ok_or(PaymentError::NotConfigured)?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PaymentError::InvalidSignature("missing signature header".to_owned()))?;

    webhook::verify_signature(
        stripe.webhook_secret.expose_secret(),
        signature,
        &body,
        Utc::now(),
    )
    .inspect_err(|e| tracing::warn!(error = %e, "Rejected webhook"))?;

    let action = webhook::parse_event(&body)?;
    apply(&state, action).await?;

    Ok(ApiResponse::ok(Received { received: true }))
}

async fn apply(state: &AppState, action: WebhookAction) -> Result<(), AppError> {
    match action {
        WebhookAction::InvoicePaid {
            invoice_id,
            intent_id,
            at,
        } => {
            let changed = InvoiceService::new(state.pool(), state.config().billing)
                .record_payment(invoice_id, &intent_id, at)
                .await?;
            let id = invoice_id.to_string();
            add_breadcrumb("webhook", "Invoice payment", Some(&[("invoice_id", id.as_str())]));
            tracing::info!(invoice_id = %invoice_id, changed, "Invoice payment event processed");
        }
        WebhookAction::OrderPaid {
            order_id,
            intent_id,
            at,
        } => {
            let changed = OrderService::new(state.pool())
                .record_payment(order_id, PaymentOutcome::Succeeded { intent_id: &intent_id }, at)
                .await?;
            tracing::info!(order_id = %order_id, changed, "Order payment event processed");
        }
        WebhookAction::OrderPaymentFailed { order_id, at } => {
            let changed = OrderService::new(state.pool())
                .record_payment(order_id, PaymentOutcome::Failed, at)
                .await?;
            tracing::info!(order_id = %order_id, changed, "Order payment failure processed");
        }
        WebhookAction::Ignored(kind) => {
            tracing::debug!(event = %kind, "Webhook event ignored");
        }
    }
    Ok(())
}
