//! Domain models for storefront.
//!
//! Orders, invoices, products and the cart live in `florist_core`; this module
//! holds the types that only make sense next to the session and the database.

pub mod session;
pub mod user;

pub use session::{CurrentUser, keys};
pub use user::User;
