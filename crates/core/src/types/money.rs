//! Money arithmetic and VAT.
//!
//! All amounts are `Decimal` euros. Rounding is always to two decimal places,
//! half away from zero, which is what French invoices show.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Round an amount to cents, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert an amount to minor units (cents) for the payment processor.
///
/// Returns `None` if the amount does not fit in an `i64`.
#[must_use]
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (round_money(amount) * Decimal::ONE_HUNDRED).to_i64()
}

/// Error building a [`VatRate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VatRateError {
    #[error("VAT rate must be between 0 and 100 percent, got {0}")]
    OutOfRange(Decimal),
}

/// A VAT rate expressed as a percentage (`20` means 20 %).
///
/// The rate is fixed per invoice at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VatRate(Decimal);

impl VatRate {
    /// Standard French VAT rate (20 %).
    pub const STANDARD: Self = Self(Decimal::from_parts(20, 0, 0, false, 0));

    /// Create a VAT rate from a percentage.
    ///
    /// # Errors
    ///
    /// Returns [`VatRateError::OutOfRange`] outside `0..=100`.
    pub fn from_percent(percent: Decimal) -> Result<Self, VatRateError> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(VatRateError::OutOfRange(percent));
        }
        Ok(Self(percent.normalize()))
    }

    /// The rate as a percentage.
    #[must_use]
    pub const fn percent(&self) -> Decimal {
        self.0
    }

    /// VAT owed on `subtotal`, rounded to cents.
    #[must_use]
    pub fn vat_on(&self, subtotal: Decimal) -> Decimal {
        round_money(subtotal * self.0 / Decimal::ONE_HUNDRED)
    }
}

impl Default for VatRate {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl<'de> Deserialize<'de> for VatRate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let percent = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::from_percent(percent).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(dec("10.005")), dec("10.01"));
        assert_eq!(round_money(dec("10.004")), dec("10.00"));
        assert_eq!(round_money(dec("-1.005")), dec("-1.01"));
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units(dec("59.90")), Some(5990));
        assert_eq!(to_minor_units(dec("0.015")), Some(2));
    }

    #[test]
    fn test_standard_rate_is_twenty_percent() {
        assert_eq!(VatRate::STANDARD.percent(), dec("20"));
        assert_eq!(VatRate::default(), VatRate::STANDARD);
    }

    #[test]
    fn test_vat_on() {
        let rate = VatRate::from_percent(dec("20")).unwrap();
        assert_eq!(rate.vat_on(dec("123.45")), dec("24.69"));

        let reduced = VatRate::from_percent(dec("5.5")).unwrap();
        assert_eq!(reduced.vat_on(dec("10.10")), dec("0.56"));
    }

    #[test]
    fn test_rate_bounds() {
        assert!(VatRate::from_percent(dec("-1")).is_err());
        assert!(VatRate::from_percent(dec("100.01")).is_err());
        assert!(VatRate::from_percent(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_rate_deserialize_validates() {
        let rate: VatRate = serde_json::from_str("\"20\"").unwrap();
        assert_eq!(rate, VatRate::STANDARD);
        assert!(serde_json::from_str::<VatRate>("\"250\"").is_err());
    }
}
