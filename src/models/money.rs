use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ParseBigDecimalError, ToPrimitive};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const SCALE: i64 = 10_000;

/// A monetary value held as a fixed-point integer with four decimal places.
///
/// Balances are stored as decimal strings (`"60.0000"`) so they survive any
/// backend without going through a float. Reading accepts either a string or a
/// JSON number, since older records and API clients send plain numbers.
///
/// ```
/// use pocketbank::models::Money;
///
/// let amount: Money = "12.5".parse().unwrap();
/// assert_eq!(amount.to_string(), "12.5000");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Money(i64);

impl Money {
    pub const fn from_units(units: i64) -> Self {
        Money(units)
    }

    pub fn zero() -> Self {
        Money(0)
    }

    /// Whole currency units, e.g. `Money::whole(40)` is `40.0000`.
    pub fn whole(value: i64) -> Self {
        Money(value.saturating_mul(SCALE))
    }

    pub fn units(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Multiplies by a decimal rate, rounding to the fourth decimal place.
    pub fn apply_rate(&self, rate: &BigDecimal) -> Money {
        let product = self.to_decimal() * rate * BigDecimal::from(SCALE);
        Money(product.round(0).to_i64().unwrap_or(i64::MAX))
    }

    pub fn to_decimal(&self) -> BigDecimal {
        BigDecimal::from(self.0) / BigDecimal::from(SCALE)
    }

    pub fn to_string_4dp(&self) -> String {
        format!("{:.4}", self.to_decimal())
    }
}

impl FromStr for Money {
    type Err = ParseBigDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.is_empty() {
            return Err(ParseBigDecimalError::Other("empty amount".into()));
        }

        let bd: BigDecimal = t.parse()?;

        let scaled = (bd * BigDecimal::from(SCALE)).round(0);
        let value = scaled
            .to_i64()
            .ok_or_else(|| ParseBigDecimalError::Other("amount overflow".into()))?;

        Ok(Money(value))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_4dp())
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_4dp())
    }
}

struct MoneyVisitor;

impl MoneyVisitor {
    fn parse<E: de::Error>(raw: &str) -> Result<Money, E> {
        raw.parse::<Money>()
            .map_err(|e| E::custom(format!("invalid amount `{raw}`: {e}")))
    }
}

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal amount as a string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        Self::parse(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        v.checked_mul(SCALE)
            .map(Money)
            .ok_or_else(|| E::custom("amount overflow"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        let v = i64::try_from(v).map_err(|_| E::custom("amount overflow"))?;
        self.visit_i64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        if !v.is_finite() {
            return Err(E::custom("amount must be finite"));
        }
        // f64 Display gives the shortest round-tripping form, so 0.1 stays 0.1
        Self::parse(&v.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_str_valid() {
        assert_eq!(Money::from_str("1").unwrap(), Money(10000));
        assert_eq!(Money::from_str("1.5").unwrap(), Money(15000));
        assert_eq!(Money::from_str("0.0001").unwrap(), Money(1));
        assert_eq!(Money::from_str("  2.0000 ").unwrap(), Money(20000));
        assert_eq!(Money::from_str("-3").unwrap(), Money(-30000));
    }

    #[test]
    fn test_from_str_rounding() {
        assert_eq!(Money::from_str("1.99999").unwrap(), Money(20000));
        assert_eq!(Money::from_str("0.00001").unwrap(), Money(0));
    }

    #[test]
    fn test_from_str_invalid() {
        assert!(Money::from_str("").is_err());
        assert!(Money::from_str("   ").is_err());
        assert!(Money::from_str("abc").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money(10000).to_string(), "1.0000");
        assert_eq!(Money(5000).to_string(), "0.5000");
        assert_eq!(Money::whole(100).to_string(), "100.0000");
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(Money::whole(100).checked_sub(Money::whole(40)), Some(Money::whole(60)));
        assert_eq!(Money::whole(60).checked_add(Money::whole(30)), Some(Money::whole(90)));
        assert_eq!(Money(i64::MAX).checked_add(Money(1)), None);
    }

    #[test]
    fn test_apply_rate() {
        let rate: BigDecimal = "0.02".parse().unwrap();
        assert_eq!(Money::whole(100).apply_rate(&rate), Money::whole(2));
        assert_eq!(Money::zero().apply_rate(&rate), Money::zero());
        assert_eq!(Money::from_str("0.0100").unwrap().apply_rate(&rate), Money(2));
    }

    #[test]
    fn serializes_as_decimal_string() {
        assert_eq!(serde_json::to_value(Money::whole(60)).unwrap(), json!("60.0000"));
    }

    #[test]
    fn deserializes_strings_and_numbers() {
        let from_str: Money = serde_json::from_value(json!("40.5")).unwrap();
        let from_float: Money = serde_json::from_value(json!(40.5)).unwrap();
        let from_int: Money = serde_json::from_value(json!(40)).unwrap();
        assert_eq!(from_str, Money(405000));
        assert_eq!(from_float, Money(405000));
        assert_eq!(from_int, Money::whole(40));
        assert!(serde_json::from_value::<Money>(json!(true)).is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(Money(10000) < Money(15000));
        assert!(Money(10000) >= Money(10000));
    }
}
