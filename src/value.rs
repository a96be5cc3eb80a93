//! Sortable numeric value.

use std::cmp::Ordering;
use std::fmt;
use std::num::ParseFloatError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A finite-precision floating point number with a total order.
///
/// NaN is never representable: construction and parsing reject it, so the ordering below agrees with the usual
/// numeric order except that `-0.0` sorts before `+0.0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(f64);

impl Value {
    /// Wraps a number. Returns [`None`] for NaN.
    pub fn new(number: f64) -> Option<Self> {
        if number.is_nan() {
            None
        } else {
            Some(Value(number))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Value parsing error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseValueError {
    /// The token is not a number.
    #[error("not a number: {0}")]
    Malformed(#[from] ParseFloatError),
    /// The token parsed as NaN which has no place in the sort order.
    #[error("NaN is not orderable")]
    NotANumber,
}

impl FromStr for Value {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number: f64 = s.parse()?;
        Value::new(number).ok_or(ParseValueError::NotANumber)
    }
}

impl TryFrom<f64> for Value {
    type Error = ParseValueError;

    fn try_from(number: f64) -> Result<Self, Self::Error> {
        Value::new(number).ok_or(ParseValueError::NotANumber)
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{ParseValueError, Value};

    #[rstest]
    #[case("5", 5.0)]
    #[case("-2.5", -2.5)]
    #[case("1e3", 1000.0)]
    #[case("+0.125", 0.125)]
    #[case("inf", f64::INFINITY)]
    #[case("-inf", f64::NEG_INFINITY)]
    fn test_parse(#[case] token: &str, #[case] expected: f64) {
        let value: Value = token.parse().unwrap();
        assert_eq!(value.get(), expected);
    }

    #[rstest]
    #[case("abc")]
    #[case("1,5")]
    #[case("")]
    fn test_parse_malformed(#[case] token: &str) {
        let result = token.parse::<Value>();
        assert!(matches!(result, Err(ParseValueError::Malformed(_))), "{:?}", result);
    }

    #[test]
    fn test_nan_rejected() {
        assert_eq!("NaN".parse::<Value>(), Err(ParseValueError::NotANumber));
        assert_eq!(Value::new(f64::NAN), None);
        assert!(Value::try_from(f64::NAN).is_err());
    }

    #[test]
    fn test_total_order() {
        let mut values: Vec<Value> = [3.0, f64::INFINITY, -1.5, 0.0, -0.0, f64::NEG_INFINITY]
            .into_iter()
            .map(|n| Value::new(n).unwrap())
            .collect();
        values.sort();

        let sorted: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        assert_eq!(sorted, vec!["-inf", "-1.5", "-0", "0", "3", "inf"]);
    }

    #[test]
    fn test_display_round_trip() {
        let value = Value::new(0.1 + 0.2).unwrap();
        let restored: Value = value.to_string().parse().unwrap();
        assert_eq!(restored, value);
    }
}
