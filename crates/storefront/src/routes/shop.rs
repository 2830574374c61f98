//! Public shop status and delivery coverage.

use axum::{Router, extract::State, routing::get};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use florist_core::closure::ShopStatus;
use florist_core::delivery::{self, ZoneInfo};

use crate::db::SettingsRepository;
use crate::routes::{ApiQuery, ApiResponse, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shop/status", get(status))
        .route("/delivery/check", get(check_delivery))
}

/// GET /api/shop/status
///
/// Never fails: if the settings cannot be read the shop reports open.
#[instrument(skip(state))]
pub async fn status(State(state): State<AppState>) -> ApiResult<ShopStatus> {
    let status = match SettingsRepository::new(state.pool()).get_closure().await {
        Ok(closure) => closure.status_at(Utc::now()),
        Err(e) => {
            tracing::warn!(error = %e, "Shop settings unavailable, reporting open");
            ShopStatus::Open
        }
    };
    Ok(ApiResponse::ok(status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryQuery {
    #[serde(default)]
    pub postal_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCheck {
    pub postal_code: String,
    pub deliverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<&'static ZoneInfo>,
}

/// GET /api/delivery/check?postalCode=91220
pub async fn check_delivery(ApiQuery(query): ApiQuery<DeliveryQuery>) -> ApiResult<DeliveryCheck> {
    let postal_code = query.postal_code.trim().to_owned();
    let zone = delivery::find_zone(&postal_code)?;
    Ok(ApiResponse::ok(DeliveryCheck {
        postal_code,
        deliverable: zone.is_some(),
        zone,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};

    use crate::routes::test_support::{json_body, send};

    async fn get(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = send(Request::get(uri).body(Body::empty()).unwrap()).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    #[tokio::test]
    async fn test_status_fails_open_without_database() {
        let (status, body) = get("/api/shop/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isOpen"], true);
    }

    #[tokio::test]
    async fn test_covered_postal_code() {
        let (status, body) = get("/api/delivery/check?postalCode=91220").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deliverable"], true);
        assert_eq!(body["data"]["zone"]["postalCode"], "91220");
        assert_eq!(body["data"]["zone"]["deliveryFee"], "0.00");
    }

    #[tokio::test]
    async fn test_uncovered_postal_code() {
        let (status, body) = get("/api/delivery/check?postalCode=75001").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deliverable"], false);
        assert!(body["data"].get("zone").is_none());
    }

    #[tokio::test]
    async fn test_malformed_postal_code() {
        let (status, body) = get("/api/delivery/check?postalCode=91A20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_POSTAL_CODE");
    }
}
