//! Stripe REST client for payment intents.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::instrument;

use super::{CreateIntent, PaymentError, PaymentIntent, PaymentProvider};
use crate::config::StripeConfig;

/// Stripe API base URL.
const BASE_URL: &str = "https://api.stripe.com/v1";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        Self::with_base_url(config, BASE_URL)
    }

    /// Create a client against another base URL (e.g. a local mock server).
    ///
    /// # Errors
    ///
    /// Same as [`StripeClient::new`].
    pub fn with_base_url(config: &StripeConfig, base_url: &str) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth = HeaderValue::from_str(&auth_value)
            .map_err(|e| PaymentError::Parse(format!("Invalid API key format: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn parse_response(response: reqwest::Response) -> Result<PaymentIntent, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or(body);
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))
    }
}

impl PaymentProvider for StripeClient {
    #[instrument(skip(self, request), fields(amount = request.amount_cents, key = %request.idempotency_key))]
    async fn create_intent(&self, request: &CreateIntent<'_>) -> Result<PaymentIntent, PaymentError> {
        let (meta_key, meta_value) = request.target.metadata();
        let meta_field = format!("metadata[{meta_key}]");
        let form = [
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.to_owned()),
            ("automatic_payment_methods[enabled]", "true".to_owned()),
            (meta_field.as_str(), meta_value),
        ];

        let response = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .header("Idempotency-Key", request.idempotency_key)
            .form(&form)
            .send()
            .await?;

        let intent = Self::parse_response(response).await?;
        tracing::info!(intent_id = %intent.id, "Payment intent created");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .client
            .get(format!("{}/payment_intents/{intent_id}", self.base_url))
            .send()
            .await?;
        Self::parse_response(response).await
    }
}
