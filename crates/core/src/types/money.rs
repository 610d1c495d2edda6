//! Amounts in the smallest currency unit.
//!
//! All prices and totals are integers of minor units (cents for USD). There is
//! no floating point anywhere on the money path; display formatting is the
//! only place a decimal point appears.

use core::fmt;

use serde::{Deserialize, Serialize};

/// An amount of money in minor currency units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Add two amounts, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Multiply a unit price by a quantity, returning `None` on overflow.
    #[must_use]
    pub const fn checked_mul(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as i64) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Whether the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Format for display in the given currency, e.g. `$24.99` or `1,250.00 SEK`.
    #[must_use]
    pub fn display(self, currency: &Currency) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = group_thousands(abs / 100);
        let cents = abs % 100;

        match currency.symbol() {
            Some(symbol) => format!("{sign}{symbol}{units}.{cents:02}"),
            None => format!("{sign}{units}.{cents:02} {}", currency.code_upper()),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn group_thousands(mut n: u64) -> String {
    let mut groups = Vec::new();
    loop {
        if n < 1000 {
            groups.push(n.to_string());
            break;
        }
        groups.push(format!("{:03}", n % 1000));
        n /= 1000;
    }
    groups.reverse();
    groups.join(",")
}

/// Errors that can occur when parsing a [`Currency`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid currency code: {0:?} (expected three ASCII letters)")]
pub struct CurrencyError(pub String);

/// A lowercase ISO 4217 currency code, as the payment gateway expects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse a three-letter currency code (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`CurrencyError`] unless the input is exactly three ASCII letters.
    pub fn parse(code: &str) -> Result<Self, CurrencyError> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_lowercase()))
        } else {
            Err(CurrencyError(code.to_owned()))
        }
    }

    /// US dollars.
    #[must_use]
    pub fn usd() -> Self {
        Self("usd".to_owned())
    }

    /// The lowercase code, e.g. `usd`.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0
    }

    fn code_upper(&self) -> String {
        self.0.to_ascii_uppercase()
    }

    fn symbol(&self) -> Option<&'static str> {
        match self.0.as_str() {
            "usd" => Some("$"),
            "eur" => Some("\u{20ac}"),
            "gbp" => Some("\u{a3}"),
            _ => None,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Currency {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Currency {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Currency {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_line_arithmetic() {
        let unit = Money::from_minor(1000);
        let line = unit.checked_mul(2).unwrap();
        let total = line.checked_add(Money::from_minor(500)).unwrap();
        assert_eq!(total.minor(), 2500);
    }

    #[test]
    fn test_overflow_is_detected() {
        assert!(Money::from_minor(i64::MAX).checked_mul(2).is_none());
        assert!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)).is_none());
    }

    #[test]
    fn test_display_with_symbol() {
        assert_eq!(Money::from_minor(2499).display(&Currency::usd()), "$24.99");
        assert_eq!(
            Money::from_minor(123_456_789).display(&Currency::parse("EUR").unwrap()),
            "\u{20ac}1,234,567.89"
        );
    }

    #[test]
    fn test_display_without_symbol() {
        let sek = Currency::parse("sek").unwrap();
        assert_eq!(Money::from_minor(125_000).display(&sek), "1,250.00 SEK");
        assert_eq!(Money::from_minor(-5).display(&sek), "-0.05 SEK");
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse(" USD ").unwrap().code(), "usd");
        assert!(Currency::parse("dollars").is_err());
        assert!(Currency::parse("u5d").is_err());
    }
}
