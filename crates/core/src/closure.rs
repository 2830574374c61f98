//! Shop closure settings and the derived open/closed status.
//!
//! Closure is a tagged value: either [`ShopClosure::Disabled`] or
//! [`ShopClosure::Enabled`] carrying the full window. A window cannot exist
//! without its dates, so "dates required when enabled" never needs a runtime
//! check after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error building a [`ClosureWindow`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClosureError {
    #[error("closure start date and end date are required when enabled")]
    MissingDates,
    #[error("closure start date must not be after end date")]
    StartAfterEnd,
}

/// An inclusive closure period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawClosureWindow")]
pub struct ClosureWindow {
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClosureWindow {
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    reason: Option<String>,
    message: Option<String>,
}

impl TryFrom<RawClosureWindow> for ClosureWindow {
    type Error = ClosureError;

    fn try_from(raw: RawClosureWindow) -> Result<Self, Self::Error> {
        Self::new(raw.start_date, raw.end_date, raw.reason, raw.message)
    }
}

impl ClosureWindow {
    /// Create a window.
    ///
    /// # Errors
    ///
    /// Returns [`ClosureError::StartAfterEnd`] if `start_date > end_date`.
    pub fn new(
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        reason: Option<String>,
        message: Option<String>,
    ) -> Result<Self, ClosureError> {
        if start_date > end_date {
            return Err(ClosureError::StartAfterEnd);
        }
        Ok(Self {
            start_date,
            end_date,
            reason,
            message,
        })
    }

    #[must_use]
    pub const fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    #[must_use]
    pub const fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }

    /// Whether `now` falls within `[start_date, end_date]`.
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }
}

/// The shop closure setting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ShopClosure {
    #[default]
    Disabled,
    Enabled(ClosureWindow),
}

impl ShopClosure {
    /// Build a closure setting from the loosely-typed admin form.
    ///
    /// When `enabled` is false the dates are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ClosureError`] when enabled without both dates, or with a
    /// start after the end.
    pub fn from_parts(
        enabled: bool,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        reason: Option<String>,
        message: Option<String>,
    ) -> Result<Self, ClosureError> {
        if !enabled {
            return Ok(Self::Disabled);
        }
        match (start_date, end_date) {
            (Some(start), Some(end)) => {
                ClosureWindow::new(start, end, reason, message).map(Self::Enabled)
            }
            _ => Err(ClosureError::MissingDates),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// The window, when enabled.
    #[must_use]
    pub const fn window(&self) -> Option<&ClosureWindow> {
        match self {
            Self::Disabled => None,
            Self::Enabled(window) => Some(window),
        }
    }

    /// Derive the public shop status at `now`.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> ShopStatus {
        match self {
            Self::Enabled(window) if window.contains(now) => ShopStatus::Closed(window.clone()),
            Self::Enabled(_) | Self::Disabled => ShopStatus::Open,
        }
    }
}

/// Derived availability of the shop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShopStatus {
    Open,
    Closed(ClosureWindow),
}

impl ShopStatus {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Wire form of [`ShopStatus`]: `{isOpen: true}` when open, the full window
/// otherwise.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShopStatusBody<'a> {
    is_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_closed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<DateTime<Utc>>,
}

impl Serialize for ShopStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let body = match self {
            Self::Open => ShopStatusBody {
                is_open: true,
                is_closed: None,
                reason: None,
                message: None,
                start_date: None,
                end_date: None,
            },
            Self::Closed(window) => ShopStatusBody {
                is_open: false,
                is_closed: Some(true),
                reason: window.reason.as_deref(),
                message: window.message.as_deref(),
                start_date: Some(window.start_date),
                end_date: Some(window.end_date),
            },
        };
        body.serialize(serializer)
    }
}
