//! Business logic services for the storefront.
//!
//! Services sit between route handlers and repositories: they load
//! aggregates, apply the rules from `florist_core`, and persist the result.
//!
//! - `auth` - Password accounts (argon2id)
//! - `email` - Order confirmations and invoices over SMTP
//! - `payments` - Payment processor client and webhook verification
//! - `orders` - Checkout, cancellation, admin status changes, payment events
//! - `invoices` - Monthly generation, sending, payment and overdue sweep

pub mod auth;
pub mod email;
pub mod invoices;
pub mod orders;
pub mod payments;
