//! Account management commands.
//!
//! # Usage
//!
//! ```bash
//! # Back-office user
//! florist user create -e admin@atelier-floral.fr -n "Claire" -p '...' --account admin
//!
//! # Corporate customer, billed monthly
//! florist user create -e achats@example.fr -n "Service achats" -p '...' \
//!     --account corporate --company "Exemple SAS"
//! ```

use clap::ValueEnum;
use thiserror::Error;

use florist_core::AccountType;
use florist_storefront::services::auth::{AuthError, AuthService, Registration};

use super::{ConnectError, connect};

/// Account kind accepted on the command line.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum AccountKind {
    #[default]
    Individual,
    Corporate,
    Admin,
}

impl From<AccountKind> for AccountType {
    fn from(kind: AccountKind) -> Self {
        match kind {
            AccountKind::Individual => Self::Individual,
            AccountKind::Corporate => Self::Corporate,
            AccountKind::Admin => Self::Admin,
        }
    }
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Could not create user: {0}")]
    Auth(#[from] AuthError),
}

/// Create an account and return its id.
pub async fn create(
    email: &str,
    name: &str,
    password: &str,
    account: AccountKind,
    company: Option<&str>,
) -> Result<i32, UserError> {
    let pool = connect().await?;

    tracing::info!(email, account = ?account, "Creating user");
    let user = AuthService::new(&pool)
        .register(Registration {
            email,
            name,
            password,
            account_type: account.into(),
            company_name: company,
        })
        .await?;

    tracing::info!(user_id = %user.id, "User created");
    Ok(user.id.as_i32())
}
