//! Status enums for orders, payments, invoices and accounts.
//!
//! Each enum maps to a `PostgreSQL` enum type (with the `postgres` feature) and
//! serializes as `snake_case` in JSON.

use serde::{Deserialize, Serialize};

/// Parse error shared by the status enums' `FromStr` impls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Fulfillment status of an order.
///
/// The non-cancelled states form an ordered progression; an order may move
/// forward (skipping stages is allowed) but never back. `Delivered` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Position in the fulfillment progression (`None` for `Cancelled`).
    #[must_use]
    pub const fn stage(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Preparing => Some(2),
            Self::Ready => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal status change.
    ///
    /// Staying in the same state is always accepted (it is a no-op).
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.stage(), next.stage()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }

    /// Stable string form (matches the JSON and database representation).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseStatusError::new("order status", s)),
        }
    }
}

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    /// Billed on the corporate account's monthly invoice.
    Invoiced,
}

/// How an order is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card payment through the payment processor at checkout.
    #[default]
    Card,
    /// Deferred to the monthly corporate invoice.
    Invoice,
}

/// Status of a corporate invoice.
///
/// ```text
/// draft -> sent -> paid
///            \        ^
///             -> overdue
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "invoice_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    /// Whether moving from `self` to `next` is a legal status change.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Sent)
                | (Self::Sent, Self::Paid | Self::Overdue)
                | (Self::Overdue, Self::Paid)
        )
    }

    /// Whether the invoice is a financial record (has left the draft stage).
    #[must_use]
    pub const fn is_issued(self) -> bool {
        !matches!(self, Self::Draft)
    }

    /// Stable string form (matches the JSON and database representation).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            _ => Err(ParseStatusError::new("invoice status", s)),
        }
    }
}

/// Kind of customer account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "account_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Individual,
    Corporate,
    Admin,
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Individual => write!(f, "individual"),
            Self::Corporate => write!(f, "corporate"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "individual" => Ok(Self::Individual),
            "corporate" => Ok(Self::Corporate),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseStatusError::new("account type", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use OrderStatus::{Cancelled, Confirmed, Delivered, Pending, Preparing, Ready};

    #[test]
    fn test_order_moves_forward_only() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Ready));
        assert!(Preparing.can_transition_to(Delivered));
        assert!(!Ready.can_transition_to(Preparing));
        assert!(!Confirmed.can_transition_to(Pending));
    }

    #[test]
    fn test_cancellation_from_any_non_terminal_state() {
        for from in [Pending, Confirmed, Preparing, Ready] {
            assert!(from.can_transition_to(Cancelled), "{from} -> cancelled");
        }
        assert!(!Delivered.can_transition_to(Cancelled));
    }

    #[test]
    fn test_terminal_states_only_accept_themselves() {
        for next in [Pending, Confirmed, Preparing, Ready, Delivered] {
            assert!(!Cancelled.can_transition_to(next));
        }
        assert!(Cancelled.can_transition_to(Cancelled));
        assert!(Delivered.can_transition_to(Delivered));
    }

    #[test]
    fn test_invoice_transitions() {
        use InvoiceStatus::{Draft, Overdue, Paid, Sent};

        assert!(Draft.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Paid));
        assert!(Sent.can_transition_to(Overdue));
        assert!(Overdue.can_transition_to(Paid));

        assert!(!Draft.can_transition_to(Paid));
        assert!(!Draft.can_transition_to(Overdue));
        assert!(!Paid.can_transition_to(Sent));
        assert!(!Overdue.can_transition_to(Sent));
        assert!(!Paid.can_transition_to(Paid));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [Pending, Confirmed, Preparing, Ready, Delivered, Cancelled] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
        assert_eq!("overdue".parse::<InvoiceStatus>(), Ok(InvoiceStatus::Overdue));
        assert_eq!("corporate".parse::<AccountType>(), Ok(AccountType::Corporate));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::Invoice).ok();
        assert_eq!(json.as_deref(), Some("\"invoice\""));
    }
}
