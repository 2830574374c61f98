//! Admin and corporate API tests.
//!
//! These tests require:
//! - The storefront running against a migrated database
//! - An admin and a corporate account created with `florist user create`,
//!   their credentials in `FLORIST_TEST_ADMIN_*` / `FLORIST_TEST_CORPORATE_*`

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use florist_integration_tests::TestClient;
use reqwest::{Method, StatusCode};
use serde_json::json;

async fn admin() -> TestClient {
    let client = TestClient::new();
    client
        .login_from_env("FLORIST_TEST_ADMIN_EMAIL", "FLORIST_TEST_ADMIN_PASSWORD")
        .await;
    client
}

async fn corporate() -> TestClient {
    let client = TestClient::new();
    client
        .login_from_env(
            "FLORIST_TEST_CORPORATE_EMAIL",
            "FLORIST_TEST_CORPORATE_PASSWORD",
        )
        .await;
    client
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_wrong_password_is_rejected() {
    let (status, body) = TestClient::new()
        .send_json(
            Method::POST,
            "/api/auth/login",
            &json!({ "email": "nobody@example.fr", "password": "not-the-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
#[ignore = "Requires running storefront server and test accounts"]
async fn test_login_me_logout() {
    let client = admin().await;
    let (_, me) = client.get("/api/auth/me").await;
    assert_eq!(me["data"]["identity"]["role"], "admin");

    let (status, _) = client
        .send_json(Method::POST, "/api/auth/logout", &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, me) = client.get("/api/auth/me").await;
    assert_eq!(me["data"]["authenticated"], false);
}

// ============================================================================
// Access control
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server and test accounts"]
async fn test_corporate_account_cannot_reach_admin() {
    let (status, body) = corporate().await.get("/api/admin/orders").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED_ACCESS");
}

#[tokio::test]
#[ignore = "Requires running storefront server and test accounts"]
async fn test_corporate_listing_hides_drafts() {
    let (status, body) = corporate().await.get("/api/corporate/invoices").await;
    assert_eq!(status, StatusCode::OK);
    for invoice in body["data"]["items"].as_array().unwrap() {
        assert_ne!(invoice["status"], "draft");
    }
}

// ============================================================================
// Invoices
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server and test accounts"]
async fn test_generation_is_idempotent_per_period() {
    let client = admin().await;
    let body = json!({ "month": 1, "year": 2026 });

    let (status, first) = client
        .send_json(Method::POST, "/api/admin/invoices/generate", &body)
        .await;
    assert_eq!(status, StatusCode::OK, "{first}");

    let (status, second) = client
        .send_json(Method::POST, "/api/admin/invoices/generate", &body)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(second["data"]["created"].as_array().unwrap().is_empty());
}

#[tokio::test]
#[ignore = "Requires running storefront server and test accounts"]
async fn test_invalid_period_is_rejected() {
    let (status, body) = admin()
        .await
        .send_json(
            Method::POST,
            "/api/admin/invoices/generate",
            &json!({ "month": 13, "year": 2026 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
#[ignore = "Requires running storefront server and test accounts"]
async fn test_draft_cannot_go_overdue() {
    let client = admin().await;
    let (_, drafts) = client.get("/api/admin/invoices?status=draft&limit=1").await;
    let Some(draft) = drafts["data"]["items"].as_array().unwrap().first() else {
        return;
    };

    let (status, body) = client
        .send_json(
            Method::PATCH,
            &format!("/api/admin/invoices/{}", draft["id"]),
            &json!({ "status": "overdue" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
}

// ============================================================================
// Settings
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server and test accounts"]
async fn test_closure_window_drives_shop_status() {
    let client = admin().await;
    let (status, _) = client
        .send_json(
            Method::PUT,
            "/api/admin/settings",
            &json!({
                "isEnabled": true,
                "startDate": "2020-01-01T00:00:00Z",
                "endDate": "2099-12-31T23:59:59Z",
                "message": "Fermé pour inventaire"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, shop) = TestClient::new().get("/api/shop/status").await;
    assert_eq!(shop["data"]["isOpen"], false);
    assert_eq!(shop["data"]["message"], "Fermé pour inventaire");

    let (status, _) = client
        .send_json(Method::PUT, "/api/admin/settings", &json!({ "isEnabled": false }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, shop) = TestClient::new().get("/api/shop/status").await;
    assert_eq!(shop["data"]["isOpen"], true);
}

#[tokio::test]
#[ignore = "Requires running storefront server and test accounts"]
async fn test_closure_needs_both_dates() {
    let (status, _) = admin()
        .await
        .send_json(
            Method::PUT,
            "/api/admin/settings",
            &json!({ "isEnabled": true, "startDate": "2026-08-01T00:00:00Z" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
