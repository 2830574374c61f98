//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side failures to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`; every error leaves the server in the JSON envelope
//! `{"success": false, "error": {"message", "code", "details"?}}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use florist_core::access::AccessError;
use florist_core::cart::CartError;
use florist_core::catalog::SearchError;
use florist_core::closure::ClosureError;
use florist_core::delivery::PostalCodeError;
use florist_core::invoice::InvoiceError;
use florist_core::order::OrderError;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::email::MailerError;
use crate::services::payments::PaymentError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input. `code` is a stable machine-readable reason.
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    /// No identity on a request that needs one.
    #[error("Authentication required")]
    AuthRequired,

    /// Wrong email or password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Identity present but not allowed.
    #[error("Access denied")]
    Forbidden,

    /// Missing entity.
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// Illegal status change.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Invoice already paid.
    #[error("Invoice is already paid")]
    AlreadyPaid,

    /// Checkout attempted during a closure window.
    #[error("{0}")]
    ShopClosed(String),

    /// Uniqueness or concurrent-update conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Payment processor failed.
    #[error("Payment provider error: {0}")]
    PaymentProvider(PaymentError),

    /// Email could not be sent.
    #[error("Email error: {0}")]
    Email(#[from] MailerError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// A 400 with the generic validation code.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            code: "VALIDATION_ERROR",
            message: message.into(),
        }
    }

    #[must_use]
    pub fn order_not_found() -> Self {
        Self::NotFound {
            code: "ORDER_NOT_FOUND",
            message: "Order not found".to_owned(),
        }
    }

    #[must_use]
    pub fn invoice_not_found() -> Self {
        Self::NotFound {
            code: "INVOICE_NOT_FOUND",
            message: "Invoice not found".to_owned(),
        }
    }

    #[must_use]
    pub fn user_not_found() -> Self {
        Self::NotFound {
            code: "USER_NOT_FOUND",
            message: "User not found".to_owned(),
        }
    }

    #[must_use]
    pub fn product_not_found() -> Self {
        Self::NotFound {
            code: "PRODUCT_NOT_FOUND",
            message: "Product not found".to_owned(),
        }
    }

    /// HTTP status and stable error code.
    #[must_use]
    pub const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation { code, .. } => (StatusCode::BAD_REQUEST, *code),
            Self::AuthRequired => (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED"),
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            Self::Forbidden => (StatusCode::FORBIDDEN, "UNAUTHORIZED_ACCESS"),
            Self::NotFound { code, .. } => (StatusCode::NOT_FOUND, *code),
            Self::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            Self::AlreadyPaid => (StatusCode::CONFLICT, "ALREADY_PAID"),
            Self::ShopClosed(_) => (StatusCode::CONFLICT, "SHOP_CLOSED"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::PaymentProvider(_) => (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER_ERROR"),
            Self::Email(_) => (StatusCode::BAD_GATEWAY, "EMAIL_ERROR"),
            Self::Database(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }

    /// Failures on our side or a dependency's, as opposed to the caller's.
    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Internal(_) | Self::PaymentProvider(_) | Self::Email(_)
        )
    }

    /// Message safe to show the client.
    fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_owned(),
            Self::PaymentProvider(_) => "Payment service error".to_owned(),
            Self::Email(_) => "Email could not be sent".to_owned(),
            _ => self.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let (status, code) = self.status_and_code();
        let details = (cfg!(debug_assertions) && self.is_server_error()).then(|| self.to_string());
        let body = ErrorEnvelope {
            success: false,
            error: ErrorDetail {
                message: self.public_message(),
                code,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::NotFound => Self::NotFound {
                code: "NOT_FOUND",
                message: "Not found".to_owned(),
            },
            other => Self::Database(other),
        }
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::AuthRequired => Self::AuthRequired,
            AccessError::Forbidden => Self::Forbidden,
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        let code = match err {
            OrderError::InvalidTransition { .. } | OrderError::NotCancellable(_) => {
                return Self::InvalidTransition(message);
            }
            OrderError::EmptyCart => "EMPTY_CART",
            OrderError::InvalidPostalCode(_) => "INVALID_POSTAL_CODE",
            OrderError::Undeliverable(_) => "UNDELIVERABLE_POSTAL_CODE",
            OrderError::BereavementDetailsRequired => "BEREAVEMENT_DETAILS_REQUIRED",
            OrderError::UnknownProduct(_) | OrderError::InactiveProduct(_) => "VALIDATION_ERROR",
        };
        Self::Validation { code, message }
    }
}

impl From<InvoiceError> for AppError {
    fn from(err: InvoiceError) -> Self {
        match err {
            InvoiceError::AlreadyPaid => Self::AlreadyPaid,
            InvoiceError::InvalidTransition { .. } | InvoiceError::NotYetDue(_) => {
                Self::InvalidTransition(err.to_string())
            }
            InvoiceError::AmountOutOfRange(_) | InvoiceError::InvalidPeriod { .. } => {
                Self::validation(err.to_string())
            }
        }
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        let message = err.to_string();
        match err {
            CartError::InvalidQuantity(_) => Self::Validation {
                code: "INVALID_QUANTITY",
                message,
            },
            CartError::ProductUnavailable(_) => Self::Validation {
                code: "PRODUCT_UNAVAILABLE",
                message,
            },
            CartError::NotInCart(_) => Self::NotFound {
                code: "CART_ITEM_NOT_FOUND",
                message,
            },
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        Self::Validation {
            code: "QUERY_TOO_SHORT",
            message: err.to_string(),
        }
    }
}

impl From<PostalCodeError> for AppError {
    fn from(err: PostalCodeError) -> Self {
        Self::Validation {
            code: "INVALID_POSTAL_CODE",
            message: err.to_string(),
        }
    }
}

impl From<ClosureError> for AppError {
    fn from(err: ClosureError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::InvalidEmail(_) | AuthError::WeakPassword(_) | AuthError::MissingCompany => {
                Self::validation(err.to_string())
            }
            AuthError::UserAlreadyExists => {
                Self::Conflict("An account with this email already exists".to_owned())
            }
            AuthError::Repository(e) => Self::from(e),
            AuthError::PasswordHash => Self::Internal(err.to_string()),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidSignature(_) => Self::Validation {
                code: "INVALID_SIGNATURE",
                message: err.to_string(),
            },
            other => Self::PaymentProvider(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session error: {err}"))
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Order created", Some(&[("order_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use florist_core::{InvoiceStatus, OrderStatus};

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_status_codes() {
        fn status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(status(AppError::AuthRequired), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AppError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status(AppError::order_not_found()), StatusCode::NOT_FOUND);
        assert_eq!(status(AppError::AlreadyPaid), StatusCode::CONFLICT);
        assert_eq!(
            status(AppError::validation("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(AppError::Internal("boom".to_owned())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(AppError::PaymentProvider(PaymentError::NotConfigured)),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let (status, body) = body_json(AppError::Forbidden).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED_ACCESS");
        assert!(body["error"]["message"].is_string());
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let (_, body) = body_json(AppError::Internal("connection refused".to_owned())).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "Internal server error");
        if cfg!(debug_assertions) {
            assert!(
                body["error"]["details"]
                    .as_str()
                    .unwrap()
                    .contains("connection refused")
            );
        } else {
            assert!(body["error"].get("details").is_none());
        }
    }

    #[tokio::test]
    async fn test_client_errors_have_no_details() {
        let (_, body) = body_json(AppError::validation("postal code missing")).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "postal code missing");
        assert!(body["error"].get("details").is_none());
    }

    #[test]
    fn test_access_error_mapping() {
        assert!(matches!(
            AppError::from(AccessError::AuthRequired),
            AppError::AuthRequired
        ));
        assert!(matches!(
            AppError::from(AccessError::Forbidden),
            AppError::Forbidden
        ));
    }

    #[test]
    fn test_order_error_codes() {
        let code = |e: OrderError| AppError::from(e).status_and_code().1;
        assert_eq!(code(OrderError::EmptyCart), "EMPTY_CART");
        assert_eq!(
            code(OrderError::InvalidPostalCode(PostalCodeError::InvalidFormat(
                "9122".to_owned()
            ))),
            "INVALID_POSTAL_CODE"
        );
        assert_eq!(
            code(OrderError::Undeliverable("75000".to_owned())),
            "UNDELIVERABLE_POSTAL_CODE"
        );
        assert_eq!(
            code(OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Pending,
            }),
            "INVALID_TRANSITION"
        );
    }

    #[test]
    fn test_invoice_error_codes() {
        let code = |e: InvoiceError| AppError::from(e).status_and_code().1;
        assert_eq!(code(InvoiceError::AlreadyPaid), "ALREADY_PAID");
        assert_eq!(
            code(InvoiceError::InvalidTransition {
                from: InvoiceStatus::Draft,
                to: InvoiceStatus::Overdue,
            }),
            "INVALID_TRANSITION"
        );
    }

    #[test]
    fn test_repository_conflict_is_409() {
        let err = AppError::from(RepositoryError::Conflict("dup".to_owned()));
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);
    }

    #[test]
    fn test_invalid_signature_is_400() {
        let err = AppError::from(PaymentError::InvalidSignature("mismatch".to_owned()));
        assert_eq!(
            err.status_and_code(),
            (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE")
        );
    }
}
