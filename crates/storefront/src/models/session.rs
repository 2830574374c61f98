//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use florist_core::access::Identity;
use florist_core::{AccountType, Email, UserId};

use super::User;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Account kind, decides which routes the user may reach.
    pub account: AccountType,
    /// Company name for corporate accounts.
    pub company: Option<String>,
}

impl CurrentUser {
    /// Convert to the access-control identity.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::from_account(self.id, self.email.clone(), self.account, self.company.clone())
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            account: user.account_type,
            company: user.company_name.clone(),
        }
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for storing the shopping cart.
    pub const CART: &str = "cart";
}
