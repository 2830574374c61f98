//! Customer-facing order route handlers.

use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use florist_core::order::Order;
use florist_core::{OrderId, Page, PageRequest, Pagination};

use crate::middleware::CurrentIdentity;
use crate::routes::{ApiPath, ApiQuery, ApiResponse, ApiResult};
use crate::services::orders::OrderService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}", get(show))
        .route("/orders/{id}/cancel", post(cancel))
        .route("/user/orders", get(mine))
}

/// Guests prove ownership with the email used at checkout.
#[derive(Debug, Default, Deserialize)]
pub struct GuestLookup {
    pub email: Option<String>,
}

/// GET /api/orders/{id}
#[instrument(skip(state, identity, lookup))]
pub async fn show(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    ApiPath(id): ApiPath<OrderId>,
    ApiQuery(lookup): ApiQuery<GuestLookup>,
) -> ApiResult<Order> {
    let order = OrderService::new(state.pool())
        .get_for(&identity, id, lookup.email.as_deref())
        .await?;
    Ok(ApiResponse::ok(order))
}

/// POST /api/orders/{id}/cancel
#[instrument(skip(state, identity))]
pub async fn cancel(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    ApiPath(id): ApiPath<OrderId>,
) -> ApiResult<Order> {
    let order = OrderService::new(state.pool())
        .cancel(&identity, id, Utc::now())
        .await?;
    Ok(ApiResponse::ok(order))
}

/// GET /api/user/orders
#[instrument(skip(state, identity))]
pub async fn mine(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Page<Order>> {
    let orders = OrderService::new(state.pool())
        .list_mine(&identity, Pagination::from(page))
        .await?;
    Ok(ApiResponse::ok(orders))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};

    use crate::routes::test_support::{json_body, send};

    #[tokio::test]
    async fn test_own_orders_require_login() {
        let response = send(Request::get("/api/user/orders").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn test_invalid_order_id_is_rejected() {
        let response = send(Request::get("/api/orders/abc").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
