//! Customer-facing order numbers.
//!
//! Format: `ORD-{base36 unix millis}-{4 random [A-Z0-9]}`, e.g. `ORD-LX3K9Q2A-7F2C`.
//! The time prefix keeps numbers roughly sortable by creation time; the suffix
//! separates orders created in the same millisecond. Uniqueness is enforced by
//! the order store, and checkout regenerates on collision.

use core::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

const PREFIX: &str = "ORD";
const SUFFIX_LEN: usize = 4;
const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Errors that can occur when parsing an [`OrderNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid order number: {0:?}")]
pub struct OrderNumberError(pub String);

/// A unique, human-readable order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generate a new order number from the current time and thread RNG.
    #[must_use]
    pub fn generate() -> Self {
        let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        Self::generate_at(millis, &mut rand::rng())
    }

    /// Generate an order number for a given timestamp and RNG.
    #[must_use]
    pub fn generate_at<R: Rng + ?Sized>(unix_millis: u64, rng: &mut R) -> Self {
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| {
                let idx = rng.random_range(0..ALPHABET.len());
                char::from(ALPHABET.get(idx).copied().unwrap_or(b'0'))
            })
            .collect();

        Self(format!("{PREFIX}-{}-{suffix}", to_base36(unix_millis)))
    }

    /// Parse a customer-supplied order number (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError`] if the input does not match the
    /// `ORD-<base36>-<4 chars>` format.
    pub fn parse(input: &str) -> Result<Self, OrderNumberError> {
        let upper = input.trim().to_ascii_uppercase();
        let mut parts = upper.split('-');

        let valid = matches!(
            (parts.next(), parts.next(), parts.next(), parts.next()),
            (Some(PREFIX), Some(stamp), Some(suffix), None)
                if !stamp.is_empty()
                    && stamp.bytes().all(|b| ALPHABET.contains(&b))
                    && suffix.len() == SUFFIX_LEN
                    && suffix.bytes().all(|b| ALPHABET.contains(&b))
        );

        if valid {
            Ok(Self(upper))
        } else {
            Err(OrderNumberError(input.to_owned()))
        }
    }

    /// The order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::new();
    while n > 0 {
        let idx = usize::try_from(n % 36).unwrap_or_default();
        digits.push(ALPHABET.get(idx).copied().unwrap_or(b'0'));
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderNumber {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderNumber {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderNumber {
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
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "LOYW3V28");
    }

    #[test]
    fn test_generated_numbers_parse() {
        let mut rng = StdRng::seed_from_u64(7);
        let number = OrderNumber::generate_at(1_700_000_000_000, &mut rng);
        assert!(number.as_str().starts_with("ORD-LOYW3V28-"));
        assert_eq!(OrderNumber::parse(number.as_str()).unwrap(), number);
    }

    #[test]
    fn test_same_millisecond_differs_by_suffix() {
        let mut rng = StdRng::seed_from_u64(42);
        let a = OrderNumber::generate_at(1, &mut rng);
        let b = OrderNumber::generate_at(1, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let number = OrderNumber::parse(" ord-loyw3v28-ab12 ").unwrap();
        assert_eq!(number.as_str(), "ORD-LOYW3V28-AB12");
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for bad in ["", "ORD", "ORD--ABCD", "INV-ABC-ABCD", "ORD-ABC-ABC", "ORD-AB_C-ABCD", "ORD-A-ABCD-X"] {
            assert!(OrderNumber::parse(bad).is_err(), "{bad} should be rejected");
        }
    }
}
