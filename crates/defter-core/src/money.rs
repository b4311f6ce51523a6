//! # Money Rounding
//!
//! Fixed decimal precision per value category with half-away-from-zero
//! rounding.
//!
//! ## Precision Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Category     Places   Example        Stored as (SQLite INTEGER)        │
//! │  ──────────   ──────   ────────────   ─────────────────────────────     │
//! │  Amount          2     118.00         11800      (cents)                │
//! │  Quantity        3     2.500          2500       (thousandths)          │
//! │  UnitPrice       4     99.9900        999900     (ten-thousandths)      │
//! │  Currency        4     32.1250        321250     (ten-thousandths)      │
//! │  Percent         2     12.50          1250       (basis points)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why Away From Zero?
//! Invoices printed by the back office must match the amounts other
//! accounting tools compute for the same document:
//!
//! ```text
//! value      AwayFromZero   Banker's (half-even)
//! 100.005    100.01         100.00
//! -100.005   -100.01        -100.00
//! 0.125      0.13           0.12
//! ```
//!
//! Banker's rounding is never used anywhere in this crate.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::MoneyError;

/// Tag returned to callers confirming the server-side rounding contract.
pub const ROUNDING_POLICY: &str = "AwayFromZero";

// =============================================================================
// Precision
// =============================================================================

/// Value category with a fixed number of decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Monetary amounts: 2 places.
    Amount,
    /// Quantities: 3 places.
    Quantity,
    /// Unit prices: 4 places.
    UnitPrice,
    /// Currency rates: 4 places.
    Currency,
    /// Percentages: 2 places.
    Percent,
}

impl Precision {
    /// Number of decimal places for this category.
    #[inline]
    pub const fn places(self) -> u32 {
        match self {
            Precision::Amount | Precision::Percent => 2,
            Precision::Quantity => 3,
            Precision::UnitPrice | Precision::Currency => 4,
        }
    }

    /// Rounds half-away-from-zero to this category's places.
    ///
    /// The result always carries exactly `places()` decimal digits, so
    /// `Precision::Amount.round(dec!(118))` displays as `118.00`.
    pub fn round(self, value: Decimal) -> Decimal {
        let mut rounded =
            value.round_dp_with_strategy(self.places(), RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(self.places());
        if rounded.is_zero() {
            rounded.set_sign_positive(true);
        }
        rounded
    }

    /// Formats with exactly `places()` decimals (`"118.00"`, never `"118"`).
    pub fn format(self, value: Decimal) -> String {
        self.round(value).to_string()
    }

    /// Parses a decimal string and rounds it to this category.
    ///
    /// Empty or non-numeric input fails; it never defaults to zero.
    pub fn parse(self, input: &str) -> Result<Decimal, MoneyError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MoneyError::InvalidAmount {
                input: input.to_string(),
            });
        }

        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map(|value| self.round(value))
            .map_err(|_| MoneyError::InvalidAmount {
                input: input.to_string(),
            })
    }

    /// Converts to integer minor units (e.g. cents for Amount).
    pub fn to_minor(self, value: Decimal) -> Result<i64, MoneyError> {
        let scaled = self.round(value);
        i64::try_from(scaled.mantissa()).map_err(|_| MoneyError::Overflow {
            value: scaled.to_string(),
        })
    }

    /// Builds a value from integer minor units.
    #[inline]
    pub fn from_minor(self, minor: i64) -> Decimal {
        Decimal::new(minor, self.places())
    }
}

/// Rounds an amount to 2 places.
#[inline]
pub fn round_amount(value: Decimal) -> Decimal {
    Precision::Amount.round(value)
}

/// Rounds a quantity to 3 places.
#[inline]
pub fn round_quantity(value: Decimal) -> Decimal {
    Precision::Quantity.round(value)
}

// =============================================================================
// Wire Format
// =============================================================================

/// Serde helpers for decimal strings at the wire boundary.
///
/// Values serialize as category-formatted strings and deserialize from
/// either a string or a JSON number.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct LineDto {
///     #[serde(with = "defter_core::money::wire::quantity")]
///     quantity: Decimal,
///     #[serde(default, with = "defter_core::money::wire::percent::option")]
///     discount_rate: Option<Decimal>,
/// }
/// ```
pub mod wire {
    use rust_decimal::Decimal;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Precision;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDecimal {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    fn decode(raw: RawDecimal, precision: Precision) -> Result<Decimal, String> {
        let text = match raw {
            RawDecimal::Text(text) => text,
            RawDecimal::Integer(value) => value.to_string(),
            RawDecimal::Float(value) => value.to_string(),
        };
        precision.parse(&text).map_err(|e| e.to_string())
    }

    pub(crate) fn serialize<S: Serializer>(
        value: &Decimal,
        precision: Precision,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&precision.format(*value))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        precision: Precision,
        deserializer: D,
    ) -> Result<Decimal, D::Error> {
        let raw = RawDecimal::deserialize(deserializer)?;
        decode(raw, precision).map_err(D::Error::custom)
    }

    pub(crate) fn serialize_option<S: Serializer>(
        value: &Option<Decimal>,
        precision: Precision,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&precision.format(*value)),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize_option<'de, D: Deserializer<'de>>(
        precision: Precision,
        deserializer: D,
    ) -> Result<Option<Decimal>, D::Error> {
        match Option::<RawDecimal>::deserialize(deserializer)? {
            Some(raw) => decode(raw, precision).map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }

    macro_rules! precision_module {
        ($name:ident, $precision:expr) => {
            #[doc = concat!("Serde `with` module for `", stringify!($name), "` values.")]
            pub mod $name {
                use rust_decimal::Decimal;
                use serde::{Deserializer, Serializer};

                pub fn serialize<S: Serializer>(
                    value: &Decimal,
                    serializer: S,
                ) -> Result<S::Ok, S::Error> {
                    super::serialize(value, $precision, serializer)
                }

                pub fn deserialize<'de, D: Deserializer<'de>>(
                    deserializer: D,
                ) -> Result<Decimal, D::Error> {
                    super::deserialize($precision, deserializer)
                }

                /// Optional variant; pair with `#[serde(default)]`.
                pub mod option {
                    use rust_decimal::Decimal;
                    use serde::{Deserializer, Serializer};

                    pub fn serialize<S: Serializer>(
                        value: &Option<Decimal>,
                        serializer: S,
                    ) -> Result<S::Ok, S::Error> {
                        super::super::serialize_option(value, $precision, serializer)
                    }

                    pub fn deserialize<'de, D: Deserializer<'de>>(
                        deserializer: D,
                    ) -> Result<Option<Decimal>, D::Error> {
                        super::super::deserialize_option($precision, deserializer)
                    }
                }
            }
        };
    }

    precision_module!(amount, crate::money::Precision::Amount);
    precision_module!(quantity, crate::money::Precision::Quantity);
    precision_module!(unit_price, crate::money::Precision::UnitPrice);
    precision_module!(currency_rate, crate::money::Precision::Currency);
    precision_module!(percent, crate::money::Precision::Percent);
}

// =============================================================================
// Unit Tests
// =============================================================================
