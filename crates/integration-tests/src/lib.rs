//! Integration tests for the Atelier Floral storefront.
//!
//! Every test here talks HTTP to a running server and is `#[ignore]`d by
//! default.
//!
//! # Running Tests
//!
//! ```bash
//! florist migrate
//! cargo run -p florist-storefront &
//! cargo test -p florist-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `FLORIST_TEST_BASE_URL` - server under test (default `http://localhost:3000`)
//! - `FLORIST_TEST_ADMIN_EMAIL` / `FLORIST_TEST_ADMIN_PASSWORD`
//! - `FLORIST_TEST_CORPORATE_EMAIL` / `FLORIST_TEST_CORPORATE_PASSWORD`
//!
//! Accounts are created beforehand with `florist user create`.

use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};

/// Rate-limit key for test traffic; the server only trusts proxy headers.
const TEST_CLIENT_IP: &str = "203.0.113.10";

/// Base URL of the server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("FLORIST_TEST_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned())
}

/// A cookie-keeping client bound to the server under test.
pub struct TestClient {
    pub client: Client,
    pub base_url: String,
}

impl TestClient {
    /// A fresh anonymous session.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            reqwest::header::HeaderValue::from_static(TEST_CLIENT_IP),
        );
        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url(),
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET and decode the JSON envelope.
    ///
    /// # Panics
    ///
    /// Panics if the request fails or the body is not JSON.
    #[allow(clippy::expect_used)]
    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("request failed");
        decode(response).await
    }

    /// Send a JSON body with `method` and decode the envelope.
    ///
    /// # Panics
    ///
    /// Panics if the request fails or the body is not JSON.
    #[allow(clippy::expect_used)]
    pub async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &Value,
    ) -> (StatusCode, Value) {
        let response = self
            .client
            .request(method, self.url(path))
            .json(body)
            .send()
            .await
            .expect("request failed");
        decode(response).await
    }

    /// Log in with the credentials held in two environment variables.
    ///
    /// # Panics
    ///
    /// Panics if the variables are missing or the login is rejected.
    #[allow(clippy::expect_used)]
    pub async fn login_from_env(&self, email_var: &str, password_var: &str) -> Value {
        let email = std::env::var(email_var).expect("login email variable not set");
        let password = std::env::var(password_var).expect("login password variable not set");
        let (status, body) = self
            .send_json(
                reqwest::Method::POST,
                "/api/auth/login",
                &json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a response into status and JSON body.
///
/// # Panics
///
/// Panics if the body is not JSON.
#[allow(clippy::expect_used)]
pub async fn decode(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = response.json().await.expect("response is not JSON");
    (status, body)
}
