//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use florist_core::access::Identity;
use florist_core::{AccountType, Email, UserId};

/// A storefront account (domain type).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Individual, corporate or admin.
    pub account_type: AccountType,
    /// Company name, set for corporate accounts.
    pub company_name: Option<String>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The request identity this account grants.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::from_account(
            self.id,
            self.email.clone(),
            self.account_type,
            self.company_name.clone(),
        )
    }
}
