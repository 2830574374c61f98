//! Delivery zone lookup by postal code.
//!
//! A malformed postal code is an error ([`PostalCodeError`]); a well-formed
//! code outside every zone is `Ok(None)`. Callers must keep the two apart:
//! the first is a validation failure, the second a "we don't deliver there".

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Error parsing a [`PostalCode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostalCodeError {
    #[error("postal code must be exactly 5 digits, got {0:?}")]
    InvalidFormat(String),
}

/// A French postal code: exactly five ASCII digits, whitespace stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct PostalCode([u8; 5]);

impl PostalCode {
    /// Normalize and validate a postal code.
    ///
    /// # Errors
    ///
    /// Returns [`PostalCodeError::InvalidFormat`] unless the input is exactly
    /// five digits once all whitespace is removed.
    pub fn parse(raw: &str) -> Result<Self, PostalCodeError> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes: [u8; 5] = compact
            .as_bytes()
            .try_into()
            .map_err(|_| PostalCodeError::InvalidFormat(raw.to_owned()))?;
        if bytes.iter().all(u8::is_ascii_digit) {
            Ok(Self(bytes))
        } else {
            Err(PostalCodeError::InvalidFormat(raw.to_owned()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only ASCII digits are ever stored.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl std::fmt::Display for PostalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PostalCode> for String {
    fn from(code: PostalCode) -> Self {
        code.as_str().to_owned()
    }
}

impl std::str::FromStr for PostalCode {
    type Err = PostalCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A delivery zone entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInfo {
    pub postal_code: &'static str,
    pub cities: &'static [&'static str],
    pub zone: &'static str,
    #[serde(rename = "deliveryFee")]
    fee: Decimal,
}

impl ZoneInfo {
    const fn new(
        postal_code: &'static str,
        cities: &'static [&'static str],
        zone: &'static str,
        fee_cents: u32,
    ) -> Self {
        Self {
            postal_code,
            cities,
            zone,
            fee: Decimal::from_parts(fee_cents, 0, 0, false, 2),
        }
    }

    /// Delivery fee in euros.
    #[must_use]
    pub const fn delivery_fee(&self) -> Decimal {
        self.fee
    }
}

const LOCAL: &str = "Brétigny et alentours";
const NEAR: &str = "Essonne proche";
const FAR: &str = "Essonne étendue";

/// Every postal code the shop delivers to.
static ZONES: &[ZoneInfo] = &[
    ZoneInfo::new("91220", &["Brétigny-sur-Orge", "Le Plessis-Pâté"], LOCAL, 0),
    ZoneInfo::new("91240", &["Saint-Michel-sur-Orge"], LOCAL, 500),
    ZoneInfo::new("91700", &["Sainte-Geneviève-des-Bois", "Fleury-Mérogis", "Villiers-sur-Orge"], LOCAL, 500),
    ZoneInfo::new("91310", &["Leuville-sur-Orge", "Linas", "Montlhéry"], LOCAL, 500),
    ZoneInfo::new("91630", &["Marolles-en-Hurepoix", "Avrainville", "Cheptainville", "Guibeville"], NEAR, 800),
    ZoneInfo::new("91290", &["Arpajon", "La Norville", "Ollainville"], NEAR, 800),
    ZoneInfo::new("91180", &["Saint-Germain-lès-Arpajon"], NEAR, 800),
    ZoneInfo::new("91390", &["Morsang-sur-Orge"], NEAR, 800),
    ZoneInfo::new("91360", &["Villemoisson-sur-Orge", "Épinay-sur-Orge"], NEAR, 800),
    ZoneInfo::new("91760", &["Itteville"], FAR, 1200),
    ZoneInfo::new("91610", &["Ballancourt-sur-Essonne"], FAR, 1200),
    ZoneInfo::new("91100", &["Corbeil-Essonnes", "Villabé"], FAR, 1200),
    ZoneInfo::new("91000", &["Évry-Courcouronnes"], FAR, 1200),
];

/// Look up the zone for a postal code.
///
/// # Errors
///
/// Returns [`PostalCodeError`] if the input is not a valid postal code. A
/// valid code outside every zone yields `Ok(None)`.
pub fn find_zone(raw: &str) -> Result<Option<&'static ZoneInfo>, PostalCodeError> {
    let code = PostalCode::parse(raw)?;
    Ok(zone_for(code))
}

/// Zone lookup on an already-validated code.
#[must_use]
pub fn zone_for(code: PostalCode) -> Option<&'static ZoneInfo> {
    ZONES.iter().find(|z| z.postal_code == code.as_str())
}

/// Whether the shop delivers to this postal code.
///
/// # Errors
///
/// Returns [`PostalCodeError`] if the input is not a valid postal code.
pub fn is_deliverable(raw: &str) -> Result<bool, PostalCodeError> {
    find_zone(raw).map(|zone| zone.is_some())
}

/// All configured zones.
#[must_use]
pub fn zones() -> &'static [ZoneInfo] {
    ZONES
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_covered_code() {
        assert_eq!(is_deliverable("91220"), Ok(true));
        let zone = find_zone(" 91 220 ").unwrap().unwrap();
        assert!(zone.cities.contains(&"Brétigny-sur-Orge"));
    }

    #[test]
    fn test_malformed_is_distinct_from_uncovered() {
        assert!(matches!(
            is_deliverable("9122"),
            Err(PostalCodeError::InvalidFormat(_))
        ));
        assert!(is_deliverable("91a20").is_err());
        assert!(is_deliverable("912200").is_err());
        assert!(is_deliverable("").is_err());
        assert_eq!(is_deliverable("75000"), Ok(false));
        assert_eq!(find_zone("75000"), Ok(None));
    }

    #[test]
    fn test_fee_conversion() {
        let zone = find_zone("91760").unwrap().unwrap();
        assert_eq!(zone.delivery_fee(), Decimal::new(1200, 2));
    }

    #[test]
    fn test_zone_table_codes_are_valid() {
        for zone in zones() {
            assert!(PostalCode::parse(zone.postal_code).is_ok(), "{}", zone.postal_code);
        }
    }

    #[test]
    fn test_postal_code_serializes_as_string() {
        let code = PostalCode::parse("91 700").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"91700\"");
    }
}
