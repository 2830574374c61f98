//! In-memory payment processor used by tests.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{CreateIntent, PaymentError, PaymentIntent, PaymentProvider};

/// Behaves like the processor's idempotency handling: a second create with
/// the same key returns the first intent.
#[derive(Debug, Default)]
pub struct FakeProvider {
    by_key: Mutex<HashMap<String, PaymentIntent>>,
    fail: bool,
}

impl FakeProvider {
    /// A provider whose every call fails with an API error.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of distinct intents created.
    #[allow(clippy::unwrap_used)]
    pub fn created_count(&self) -> usize {
        self.by_key.lock().unwrap().len()
    }

    fn unavailable() -> PaymentError {
        PaymentError::Api {
            status: 503,
            message: "processor unavailable".to_owned(),
        }
    }
}

impl PaymentProvider for FakeProvider {
    #[allow(clippy::unwrap_used)]
    async fn create_intent(&self, request: &CreateIntent<'_>) -> Result<PaymentIntent, PaymentError> {
        if self.fail {
            return Err(Self::unavailable());
        }
        let mut by_key = self.by_key.lock().unwrap();
        let next = by_key.len() + 1;
        let intent = by_key
            .entry(request.idempotency_key.to_owned())
            .or_insert_with(|| PaymentIntent {
                id: format!("pi_fake_{next}"),
                client_secret: Some(format!("pi_fake_{next}_secret")),
                amount: request.amount_cents,
                currency: request.currency.to_owned(),
                status: "requires_payment_method".to_owned(),
            });
        Ok(intent.clone())
    }

    #[allow(clippy::unwrap_used)]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        if self.fail {
            return Err(Self::unavailable());
        }
        self.by_key
            .lock()
            .unwrap()
            .values()
            .find(|intent| intent.id == intent_id)
            .cloned()
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: format!("No such payment_intent: '{intent_id}'"),
            })
    }
}
