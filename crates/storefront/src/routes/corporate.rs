//! Corporate account route handlers: monthly invoices and card payment.

use axum::{Router, extract::State, routing::get};
use tracing::instrument;

use florist_core::invoice::CorporateInvoice;
use florist_core::{InvoiceId, Page, PageRequest, Pagination};

use crate::middleware::{CurrentIdentity, RequireCorporate};
use crate::routes::{ApiPath, ApiQuery, ApiResponse, ApiResult};
use crate::services::invoices::{InvoicePayment, InvoiceService};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/corporate/invoices", get(list))
        .route("/corporate/invoices/{id}", get(show))
        .route("/corporate/invoices/{id}/payment-intent", get(payment_intent))
}

fn invoices(state: &AppState) -> InvoiceService<'_> {
    InvoiceService::new(state.pool(), state.config().billing)
}

/// GET /api/corporate/invoices
///
/// Drafts are never listed.
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    RequireCorporate(user_id): RequireCorporate,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Page<CorporateInvoice>> {
    let page = invoices(&state)
        .list_for_owner(user_id, Pagination::from(page))
        .await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/corporate/invoices/{id}
#[instrument(skip(state, identity))]
pub async fn show(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    ApiPath(id): ApiPath<InvoiceId>,
) -> ApiResult<CorporateInvoice> {
    let invoice = invoices(&state).get_for(&identity, id).await?;
    Ok(ApiResponse::ok(invoice))
}

/// GET /api/corporate/invoices/{id}/payment-intent
#[instrument(skip(state, identity))]
pub async fn payment_intent(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    ApiPath(id): ApiPath<InvoiceId>,
) -> ApiResult<InvoicePayment> {
    identity.require_authenticated()?;
    let provider = state.payments()?;
    let payment = invoices(&state)
        .payment_intent(&identity, id, provider)
        .await?;
    Ok(ApiResponse::ok(payment))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};

    use crate::routes::test_support::{json_body, send};

    #[tokio::test]
    async fn test_invoice_list_requires_login() {
        let response = send(
            Request::get("/api/corporate/invoices")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn test_payment_intent_requires_login() {
        let response = send(
            Request::get("/api/corporate/invoices/3/payment-intent")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
