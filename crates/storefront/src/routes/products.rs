//! Catalog route handlers.

use axum::{
    Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use florist_core::catalog::{self, MIN_QUERY_CHARS, Product, SearchError, SearchHit};
use florist_core::{Page, PageRequest, Pagination};

use crate::db::ProductRepository;
use crate::error::AppError;
use crate::routes::{ApiPath, ApiQuery, ApiResponse, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list))
        .route("/products/search", get(search))
        .route("/products/{slug}", get(show))
}

/// Query parameters for the product listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Query parameters for search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResults<'a> {
    pub query: &'a str,
    pub results: Vec<SearchHit<'a>>,
}

/// GET /api/products
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<Product>> {
    let pagination = Pagination::from(PageRequest {
        page: query.page,
        limit: query.limit,
    });
    let category = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty());

    let (products, total) = ProductRepository::new(state.pool())
        .list_page(category, pagination)
        .await?;
    Ok(ApiResponse::ok(Page::new(products, pagination, total)))
}

/// GET /api/products/search
#[instrument(skip(state), fields(q = %query.q))]
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Response, AppError> {
    // Reject short queries before touching the catalog cache.
    if query.q.trim().chars().count() < MIN_QUERY_CHARS {
        return Err(SearchError::QueryTooShort.into());
    }

    let products = state
        .active_products()
        .await
        .map_err(|e| AppError::Internal(format!("catalog unavailable: {e}")))?;
    let results = catalog::search(&products, &query.q, query.limit)?;
    tracing::debug!(hits = results.len(), "Catalog search");

    // Hits borrow the cached catalog, so the response is rendered here.
    Ok(ApiResponse::ok(SearchResults {
        query: query.q.trim(),
        results,
    })
    .into_response())
}

/// GET /api/products/{slug}
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<Product> {
    ProductRepository::new(state.pool())
        .get_active_by_slug(&slug)
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(AppError::product_not_found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};

    use crate::routes::test_support::{json_body, send};

    #[tokio::test]
    async fn test_search_rejects_short_query() {
        let response = send(
            Request::get("/api/products/search?q=a")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "QUERY_TOO_SHORT");
    }

    #[tokio::test]
    async fn test_search_without_query_is_rejected() {
        let response = send(
            Request::get("/api/products/search")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_page_parameter_uses_error_envelope() {
        let response = send(
            Request::get("/api/products?page=first")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }
}
