//! Request identity and the access-control rule table.
//!
//! Per-resource reads go through the `authorize_*` functions below; admin-only
//! writes go through [`Identity::require_admin`].
//! Identity is a closed union and every rule matches it exhaustively, so a new
//! role cannot silently fall through to an implicit allow.
//!
//! | Resource      | anonymous           | individual          | corporate       | admin          |
//! |---------------|---------------------|---------------------|-----------------|----------------|
//! | own order     | read by email match | read/cancel own     | read own        | read/write all |
//! | any order     | deny                | deny unless owner   | deny            | allow          |
//! | own invoice   | deny                | deny                | read own only   | read/write all |
//! | shop settings | derived status only | read-only           | read-only       | read/write     |
//!
//! Failures are always [`AccessError::AuthRequired`] (no identity, "log in") or
//! [`AccessError::Forbidden`] (identity present, "not permitted").

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountType, Email, UserId};

/// Why a request was refused by the access gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
    /// No identity on the request.
    #[error("authentication required")]
    AuthRequired,
    /// Identity present but not allowed to perform the operation.
    #[error("access forbidden")]
    Forbidden,
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Identity {
    Anonymous,
    Individual {
        user_id: UserId,
        email: Email,
    },
    Corporate {
        user_id: UserId,
        email: Email,
        company: String,
    },
    Admin {
        user_id: UserId,
        email: Email,
    },
}

impl Identity {
    /// Build an identity from a stored account.
    ///
    /// Corporate accounts without a company name fall back to the email
    /// domain so the union stays total.
    #[must_use]
    pub fn from_account(
        user_id: UserId,
        email: Email,
        account: AccountType,
        company: Option<String>,
    ) -> Self {
        match account {
            AccountType::Individual => Self::Individual { user_id, email },
            AccountType::Corporate => {
                let company = company.unwrap_or_else(|| email.domain().to_owned());
                Self::Corporate {
                    user_id,
                    email,
                    company,
                }
            }
            AccountType::Admin => Self::Admin { user_id, email },
        }
    }

    /// The authenticated user's id, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::Individual { user_id, .. }
            | Self::Corporate { user_id, .. }
            | Self::Admin { user_id, .. } => Some(*user_id),
        }
    }

    /// The authenticated user's email, if any.
    #[must_use]
    pub const fn email(&self) -> Option<&Email> {
        match self {
            Self::Anonymous => None,
            Self::Individual { email, .. }
            | Self::Corporate { email, .. }
            | Self::Admin { email, .. } => Some(email),
        }
    }

    /// Whether this identity is an administrator.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin { .. })
    }

    /// Require any authenticated identity.
    ///
    /// # Errors
    ///
    /// [`AccessError::AuthRequired`] for anonymous requests.
    pub const fn require_authenticated(&self) -> Result<UserId, AccessError> {
        match self.user_id() {
            Some(id) => Ok(id),
            None => Err(AccessError::AuthRequired),
        }
    }

    /// Require an administrator.
    ///
    /// # Errors
    ///
    /// [`AccessError::AuthRequired`] for anonymous requests,
    /// [`AccessError::Forbidden`] for any other role.
    pub const fn require_admin(&self) -> Result<UserId, AccessError> {
        match self {
            Self::Admin { user_id, .. } => Ok(*user_id),
            Self::Anonymous => Err(AccessError::AuthRequired),
            Self::Individual { .. } | Self::Corporate { .. } => Err(AccessError::Forbidden),
        }
    }

    /// Require a corporate account.
    ///
    /// # Errors
    ///
    /// [`AccessError::AuthRequired`] for anonymous requests,
    /// [`AccessError::Forbidden`] for any other role.
    pub const fn require_corporate(&self) -> Result<UserId, AccessError> {
        match self {
            Self::Corporate { user_id, .. } => Ok(*user_id),
            Self::Anonymous => Err(AccessError::AuthRequired),
            Self::Individual { .. } | Self::Admin { .. } => Err(AccessError::Forbidden),
        }
    }
}

/// Ownership facts of an order needed to decide access.
#[derive(Debug, Clone, Copy)]
pub struct OrderOwnership<'a> {
    /// Owning account, `None` for guest checkouts.
    pub owner: Option<UserId>,
    /// Contact email captured at checkout.
    pub contact_email: &'a Email,
}

/// Decide whether `identity` may read an order.
///
/// `guest_email` is the address an anonymous visitor typed to look up a guest
/// order; it is ignored for authenticated identities.
///
/// # Errors
///
/// [`AccessError::AuthRequired`] when anonymous and the supplied email does not
/// open the order, [`AccessError::Forbidden`] for an authenticated non-owner.
pub fn authorize_order_read(
    identity: &Identity,
    order: OrderOwnership<'_>,
    guest_email: Option<&str>,
) -> Result<(), AccessError> {
    match identity {
        Identity::Admin { .. } => Ok(()),
        Identity::Individual { user_id, email } | Identity::Corporate { user_id, email, .. } => {
            if order.owner == Some(*user_id) || email == order.contact_email {
                Ok(())
            } else {
                Err(AccessError::Forbidden)
            }
        }
        Identity::Anonymous => {
            let opens = order.owner.is_none()
                && guest_email.is_some_and(|raw| order.contact_email.matches(raw));
            if opens {
                Ok(())
            } else {
                Err(AccessError::AuthRequired)
            }
        }
    }
}

/// Decide whether `identity` may cancel an order as its customer.
///
/// Only the owning individual account may do this; admins use the status
/// update path instead.
///
/// # Errors
///
/// [`AccessError::AuthRequired`] for anonymous requests,
/// [`AccessError::Forbidden`] otherwise.
pub fn authorize_order_cancel(
    identity: &Identity,
    order: OrderOwnership<'_>,
) -> Result<(), AccessError> {
    match identity {
        Identity::Individual { user_id, .. } if order.owner == Some(*user_id) => Ok(()),
        Identity::Anonymous => Err(AccessError::AuthRequired),
        Identity::Individual { .. } | Identity::Corporate { .. } | Identity::Admin { .. } => {
            Err(AccessError::Forbidden)
        }
    }
}

/// Decide whether `identity` may read an invoice owned by `owner`.
///
/// # Errors
///
/// [`AccessError::AuthRequired`] for anonymous requests,
/// [`AccessError::Forbidden`] for individuals and other corporate accounts.
pub fn authorize_invoice_read(identity: &Identity, owner: UserId) -> Result<(), AccessError> {
    match identity {
        Identity::Admin { .. } => Ok(()),
        Identity::Corporate { user_id, .. } if *user_id == owner => Ok(()),
        Identity::Anonymous => Err(AccessError::AuthRequired),
        Identity::Individual { .. } | Identity::Corporate { .. } => Err(AccessError::Forbidden),
    }
}
