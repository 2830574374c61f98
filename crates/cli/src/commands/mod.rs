//! Subcommand implementations.

pub mod invoices;
pub mod migrate;
pub mod user;

use sqlx::PgPool;

use florist_storefront::config::{ConfigError, get_database_url};
use florist_storefront::db;

/// Environment variable holding the connection string.
pub const DATABASE_URL_VAR: &str = "FLORIST_DATABASE_URL";

/// Errors shared by every command that needs the database.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Load `.env` and open a pool on the storefront database.
pub async fn connect() -> Result<PgPool, ConnectError> {
    dotenvy::dotenv().ok();
    let database_url = get_database_url(DATABASE_URL_VAR)?;

    tracing::info!("Connecting to storefront database...");
    Ok(db::create_pool(&database_url).await?)
}
