//! Core types for Atelier Floral.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod pagination;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{VatRate, VatRateError, round_money, to_minor_units};
pub use pagination::{Page, PageInfo, PageRequest, Pagination};
pub use status::*;
