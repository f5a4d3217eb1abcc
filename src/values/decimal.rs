//! Decimal values with an exactly reversible fractional part.

use std::fmt::{self, Write};

use crate::values::{trim_whitespace, IntegerValue};
use crate::{Error, Result};

/// A decimal split into sign, integral part and *reversed* fractional
/// part.
///
/// The fractional digits are stored right to left: the fraction of
/// `0.001` is kept as the integer `100`. Leading fractional zeros would
/// vanish in a plain integer, reversed they become trailing digits and
/// survive the round trip. Trailing fractional zeros are dropped, which
/// matches the canonical lexical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalValue {
    /// Sign. Negative zero is normalized to positive on construction.
    pub negative: bool,
    /// Digits before the decimal point, never negative.
    pub integral: IntegerValue,
    /// Digits after the decimal point in reverse order, never negative.
    pub rev_fractional: IntegerValue,
}

impl DecimalValue {
    /// Builds a decimal from its three components, normalizing `-0.0` to
    /// `+0.0`.
    pub fn new(negative: bool, integral: IntegerValue, rev_fractional: IntegerValue) -> Self {
        let negative = negative && !(integral.is_zero() && rev_fractional.is_zero());
        DecimalValue {
            negative,
            integral,
            rev_fractional,
        }
    }

    /// Parses the XML Schema `decimal` lexical form: an optional sign, at
    /// most one decimal point and at least one digit on either side of it.
    pub fn parse(lexical: &str) -> Result<Self> {
        let trimmed = trim_whitespace(lexical);
        let invalid = || Error::Format {
            datatype: "decimal",
            value: lexical.to_string(),
        };

        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let dot = memchr::memchr(b'.', unsigned.as_bytes());
        let (integral_digits, fractional_digits) = match dot {
            Some(dot) => (&unsigned[..dot], &unsigned[dot + 1..]),
            None => (unsigned, ""),
        };
        if integral_digits.is_empty() || (dot.is_some() && fractional_digits.is_empty()) {
            return Err(invalid());
        }
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(integral_digits) || !all_digits(fractional_digits) {
            return Err(invalid());
        }

        let integral = IntegerValue::parse(integral_digits)?;
        let rev_fractional = if fractional_digits.is_empty() {
            IntegerValue::Int(0)
        } else {
            let reversed: String = fractional_digits.chars().rev().collect();
            IntegerValue::parse(&reversed)?
        };
        Ok(DecimalValue::new(negative, integral, rev_fractional))
    }

    /// Number of code points of the canonical lexical form.
    pub fn characters_length(&self) -> usize {
        self.negative as usize + self.integral.characters_length() + 1
            + self.rev_fractional.characters_length()
    }

    /// Writes the canonical lexical form into `target` at `offset`.
    pub fn fill_characters(&self, target: &mut [char], offset: usize) -> usize {
        let mut pos = offset;
        if self.negative {
            target[pos] = '-';
            pos += 1;
        }
        pos = self.integral.fill_characters(target, pos);
        target[pos] = '.';
        pos += 1;
        let end = self.rev_fractional.fill_characters(target, pos);
        target[pos..end].reverse();
        end
    }
}

impl fmt::Display for DecimalValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut buf = vec!['\0'; self.characters_length()];
        self.fill_characters(&mut buf, 0);
        buf.into_iter().try_for_each(|c| f.write_char(c))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_splits_and_reverses() {
        let v = DecimalValue::parse("-12.340").unwrap();
        assert!(v.negative);
        assert_eq!(v.integral, IntegerValue::Int(12));
        // "340" reversed is "043", read as the integer 43.
        assert_eq!(v.rev_fractional, IntegerValue::Int(43));
    }

    #[test]
    fn leading_fractional_zeros_survive() {
        let v = DecimalValue::parse("0.001").unwrap();
        assert_eq!(v.rev_fractional, IntegerValue::Int(100));
        assert_eq!(v.to_string(), "0.001");
    }

    #[test]
    fn negative_zero_is_normalized() {
        let v = DecimalValue::parse("-0.0").unwrap();
        assert!(!v.negative);
        assert_eq!(v.to_string(), "0.0");
    }

    #[test]
    fn missing_digits_are_rejected() {
        assert!(DecimalValue::parse(".5").is_err());
        assert!(DecimalValue::parse("5.").is_err());
        assert!(DecimalValue::parse("1.2.3").is_err());
        assert!(DecimalValue::parse("abc").is_err());
    }

    #[test]
    fn integer_form_has_zero_fraction() {
        let v = DecimalValue::parse("42").unwrap();
        assert_eq!(v.rev_fractional, IntegerValue::Int(0));
        assert_eq!(v.to_string(), "42.0");
    }
}
