//! HTTP middleware stack for the storefront API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transaction)
//! 2. `TraceLayer` (`http_request` span)
//! 3. Request ID (records `request_id` on the span, echoes the header)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)
//! 5. Rate limiting (governor), per route group

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use auth::{
    CurrentIdentity, RequireAdmin, RequireCorporate, clear_current_user, set_current_user,
};
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::request_id_middleware;
pub use session::create_session_layer;
