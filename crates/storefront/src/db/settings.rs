//! Shop settings repository.
//!
//! `shop_settings` holds exactly one row (its primary key is constrained to
//! `TRUE`). Reads fall back to [`ShopClosure::Disabled`] if the row is missing.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use florist_core::closure::ShopClosure;

use super::RepositoryError;

#[derive(sqlx::FromRow)]
struct SettingsRow {
    is_enabled: bool,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    reason: Option<String>,
    message: Option<String>,
}

/// Repository for the shop settings singleton.
pub struct SettingsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SettingsRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load the closure setting.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, or
    /// `RepositoryError::DataCorruption` if the stored window is invalid.
    pub async fn get_closure(&self) -> Result<ShopClosure, RepositoryError> {
        let row: Option<SettingsRow> = sqlx::query_as(
            "SELECT is_enabled, start_date, end_date, reason, message FROM shop_settings",
        )
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(ShopClosure::Disabled);
        };
        ShopClosure::from_parts(
            row.is_enabled,
            row.start_date,
            row.end_date,
            row.reason,
            row.message,
        )
        .map_err(|e| RepositoryError::DataCorruption(format!("shop settings: {e}")))
    }

    /// Store the closure setting, creating the row if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    pub async fn put_closure(&self, closure: &ShopClosure) -> Result<(), RepositoryError> {
        let window = closure.window();
        sqlx::query(
            r"
            INSERT INTO shop_settings (singleton, is_enabled, start_date, end_date, reason, message, updated_at)
            VALUES (TRUE, $1, $2, $3, $4, $5, now())
            ON CONFLICT (singleton) DO UPDATE
            SET is_enabled = EXCLUDED.is_enabled,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                reason = EXCLUDED.reason,
                message = EXCLUDED.message,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(closure.is_enabled())
        .bind(window.map(|w| w.start_date()))
        .bind(window.map(|w| w.end_date()))
        .bind(window.and_then(|w| w.reason.as_deref()))
        .bind(window.and_then(|w| w.message.as_deref()))
        .execute(self.pool)
        .await?;
        Ok(())
    }
}
