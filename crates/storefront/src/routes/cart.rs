//! Session cart route handlers.
//!
//! The cart lives in the session under [`keys::CART`]; lines are snapshots
//! of the product taken when it was added.

use axum::{
    Router,
    extract::State,
    routing::{get, patch, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use florist_core::ProductId;
use florist_core::cart::{Cart, CartSummary};

use crate::db::ProductRepository;
use crate::error::{AppError, Result};
use crate::models::keys;
use crate::routes::{ApiJson, ApiPath, ApiResponse, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cart", get(show).delete(clear))
        .route("/cart/items", post(add_item))
        .route("/cart/items/{product_id}", patch(update_item).delete(remove_item))
}

/// Read the session cart; a missing cart is empty.
pub(crate) async fn load_cart(session: &Session) -> Result<Cart> {
    Ok(session.get::<Cart>(keys::CART).await?.unwrap_or_default())
}

pub(crate) async fn save_cart(session: &Session, cart: &Cart) -> Result<()> {
    session.insert(keys::CART, cart).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItem {
    pub quantity: u32,
}

/// GET /api/cart
pub async fn show(session: Session) -> ApiResult<CartSummary> {
    let cart = load_cart(&session).await?;
    Ok(ApiResponse::ok(CartSummary::from(&cart)))
}

/// DELETE /api/cart
pub async fn clear(session: Session) -> ApiResult<CartSummary> {
    let mut cart = load_cart(&session).await?;
    cart.clear();
    save_cart(&session, &cart).await?;
    Ok(ApiResponse::ok(CartSummary::from(&cart)))
}

/// POST /api/cart/items
#[instrument(skip(state, session))]
pub async fn add_item(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<AddItem>,
) -> ApiResult<CartSummary> {
    let product = ProductRepository::new(state.pool())
        .get(body.product_id)
        .await?
        .ok_or_else(AppError::product_not_found)?;

    let mut cart = load_cart(&session).await?;
    cart.add(&product, body.quantity)?;
    save_cart(&session, &cart).await?;

    tracing::debug!(product_id = %product.id, items = cart.item_count(), "Added to cart");
    Ok(ApiResponse::ok(CartSummary::from(&cart)))
}

/// PATCH /api/cart/items/{product_id}
///
/// A quantity of zero removes the line.
#[instrument(skip(session))]
pub async fn update_item(
    session: Session,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<UpdateItem>,
) -> ApiResult<CartSummary> {
    let mut cart = load_cart(&session).await?;
    cart.update_quantity(product_id, body.quantity)?;
    save_cart(&session, &cart).await?;
    Ok(ApiResponse::ok(CartSummary::from(&cart)))
}

/// DELETE /api/cart/items/{product_id}
#[instrument(skip(session))]
pub async fn remove_item(
    session: Session,
    ApiPath(product_id): ApiPath<ProductId>,
) -> ApiResult<CartSummary> {
    let mut cart = load_cart(&session).await?;
    cart.remove(product_id)?;
    save_cart(&session, &cart).await?;
    Ok(ApiResponse::ok(CartSummary::from(&cart)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode, http::header};

    use crate::routes::test_support::{json_body, send};

    #[tokio::test]
    async fn test_new_session_has_empty_cart() {
        let response = send(Request::get("/api/cart").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["data"]["itemCount"], 0);
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 0);
        assert_eq!(body["data"]["requiresBereavementDetails"], false);
    }

    #[tokio::test]
    async fn test_updating_missing_line_is_not_found() {
        let response = send(
            Request::patch("/api/cart/items/7")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"quantity":2}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "CART_ITEM_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_quantity_above_limit_is_rejected() {
        let response = send(
            Request::patch("/api/cart/items/7")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"quantity":500}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "INVALID_QUANTITY");
    }

    #[tokio::test]
    async fn test_non_numeric_product_id_is_rejected() {
        let response = send(
            Request::delete("/api/cart/items/rose")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
