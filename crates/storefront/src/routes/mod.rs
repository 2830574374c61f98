//! HTTP route handlers for the storefront JSON API.
//!
//! # Route Structure
//!
//! ```text
//! # Auth
//! POST   /api/auth/login                       - Password login (rate limited)
//! POST   /api/auth/logout                      - Clear the session
//! GET    /api/auth/me                          - Current identity
//!
//! # Catalog
//! GET    /api/products                         - Active products, paginated
//! GET    /api/products/search                  - Scored text search
//! GET    /api/products/{slug}                  - Product detail
//!
//! # Cart (session)
//! GET    /api/cart                             - Cart summary
//! DELETE /api/cart                             - Empty the cart
//! POST   /api/cart/items                       - Add a product
//! PATCH  /api/cart/items/{product_id}          - Change a quantity
//! DELETE /api/cart/items/{product_id}          - Remove a line
//!
//! # Orders
//! POST   /api/checkout                         - Place an order
//! GET    /api/orders/{id}                      - Order detail (`?email=` for guests)
//! POST   /api/orders/{id}/cancel               - Customer cancellation
//! GET    /api/user/orders                      - Own orders
//!
//! # Corporate
//! GET    /api/corporate/invoices               - Own issued invoices
//! GET    /api/corporate/invoices/{id}          - Invoice detail
//! GET    /api/corporate/invoices/{id}/payment-intent - Card payment secret
//!
//! # Shop
//! GET    /api/shop/status                      - Open/closed (fails open)
//! GET    /api/delivery/check                   - Postal code coverage
//! POST   /api/webhooks/payments                - Signed processor events
//!
//! # Admin
//! GET    /api/admin/orders                     - Filtered listing
//! GET    /api/admin/orders/{id}                - Detail
//! PATCH  /api/admin/orders/{id}                - Status change
//! GET    /api/admin/invoices                   - Filtered listing
//! POST   /api/admin/invoices/generate          - Monthly drafts
//! GET    /api/admin/invoices/{id}              - Detail
//! PATCH  /api/admin/invoices/{id}              - Status/notes
//! POST   /api/admin/invoices/{id}/send         - Email and mark sent
//! POST   /api/admin/invoices/{id}/resend       - Email again
//! GET    /api/admin/settings                   - Shop closure
//! PUT    /api/admin/settings                   - Update shop closure
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod corporate;
pub mod orders;
pub mod products;
pub mod shop;
pub mod webhooks;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// Success envelope: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Handler result carrying the success envelope.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// JSON body extractor whose rejections use the error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor whose rejections use the error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Path extractor whose rejections use the error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Create all `/api` routes.
///
/// Rate limiting and sessions are layered on by the caller.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .merge(products::router())
        .merge(cart::router())
        .merge(checkout::router())
        .merge(orders::router())
        .merge(corporate::router())
        .merge(shop::router())
        .merge(webhooks::router())
        .nest("/admin", admin::router());

    Router::new()
        .nest("/api/auth", auth::router())
        .nest("/api", api)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    //! Helpers for router tests.

    use axum::{Router, body::Body, http::Request, response::Response};
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    use crate::state::testing::offline_state;

    /// The full API router over an offline state with in-memory sessions.
    pub fn app() -> Router {
        super::routes()
            .layer(SessionManagerLayer::new(MemoryStore::default()))
            .with_state(offline_state())
    }

    pub async fn send(request: Request<Body>) -> Response {
        app().oneshot(request).await.unwrap()
    }

    pub async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
