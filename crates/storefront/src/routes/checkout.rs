//! Checkout route handler.

use axum::{Router, extract::State, routing::post};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use florist_core::order::{CustomerInfo, DeliveryInfo};

use crate::middleware::CurrentIdentity;
use crate::routes::cart::{load_cart, save_cart};
use crate::routes::{ApiJson, ApiResponse, ApiResult};
use crate::services::orders::{CheckoutInput, CheckoutOutcome, OrderService};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/checkout", post(checkout))
}

/// Checkout request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer: CustomerInfo,
    pub delivery: DeliveryInfo,
    pub purchase_order: Option<String>,
}

/// POST /api/checkout
///
/// Places the session cart as an order. The cart is emptied only once the
/// order exists and, for card purchases, the payment intent was created.
#[instrument(skip_all)]
pub async fn checkout(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    session: Session,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> ApiResult<CheckoutOutcome> {
    let mut cart = load_cart(&session).await?;
    let input = CheckoutInput {
        customer: body.customer,
        delivery: body.delivery,
        purchase_order: body.purchase_order,
    };

    let outcome = OrderService::new(state.pool())
        .with_email(state.email())
        .checkout(
            &identity,
            &cart,
            input,
            state.payments().ok(),
            state.config().billing.currency,
            Utc::now(),
        )
        .await?;

    cart.clear();
    save_cart(&session, &cart).await?;

    Ok(ApiResponse::ok(outcome))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode, http::header};

    use crate::routes::test_support::{json_body, send};

    #[tokio::test]
    async fn test_checkout_requires_customer_and_delivery() {
        let response = send(
            Request::post("/api/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"customer":{"name":"Ana"}}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
