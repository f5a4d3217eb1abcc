//! Integers of minimal width: 32 bit, 64 bit or arbitrary precision.

use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::ops::{Add, Sub};

use num_bigint::BigInt;

use crate::values::trim_whitespace;
use crate::{Error, Result};

/// An integer value sized to the smallest sufficient representation.
///
/// Construction always promotes downwards: a `BigInt` that fits an `i64`
/// becomes [`IntegerValue::Long`], an `i64` that fits an `i32` becomes
/// [`IntegerValue::Int`]. Arithmetic through [`Add`] and [`Sub`] keeps
/// that invariant.
///
/// Equality is structural: `Int(5)` and `Long(5)` are different values.
/// Ordering ranks by width first (`Int < Long < Big`); callers that need
/// numeric ordering across widths must normalize through
/// [`IntegerValue::to_big`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegerValue {
    /// Fits 32 bits.
    Int(i32),
    /// Fits 64 bits but not 32.
    Long(i64),
    /// Needs arbitrary precision.
    Big(BigInt),
}

impl IntegerValue {
    /// Wraps an `i32`.
    pub fn from_int(v: i32) -> Self {
        IntegerValue::Int(v)
    }

    /// Wraps an `i64`, demoting to 32 bits when possible.
    pub fn from_long(v: i64) -> Self {
        if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
            IntegerValue::Int(v as i32)
        } else {
            IntegerValue::Long(v)
        }
    }

    /// Wraps an unsigned 64 bit quantity.
    pub fn from_unsigned_long(v: u64) -> Self {
        if v <= i64::MAX as u64 {
            Self::from_long(v as i64)
        } else {
            IntegerValue::Big(BigInt::from(v))
        }
    }

    /// Wraps a big integer, demoting when it fits a native width.
    pub fn from_big(v: BigInt) -> Self {
        match i64::try_from(&v) {
            Ok(long) => Self::from_long(long),
            Err(_) => IntegerValue::Big(v),
        }
    }

    /// Parses the XML Schema `integer` lexical form, surrounding
    /// whitespace removed per the `collapse` facet.
    pub fn parse(lexical: &str) -> Result<Self> {
        let trimmed = trim_whitespace(lexical);
        let invalid = || Error::Format {
            datatype: "integer",
            value: lexical.to_string(),
        };
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let unsigned = digits.strip_prefix('-').unwrap_or(digits);
        if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        match digits.parse::<i64>() {
            Ok(v) => Ok(Self::from_long(v)),
            // Too many digits for 64 bits, keep arbitrary precision.
            Err(_) => digits
                .parse::<BigInt>()
                .map(IntegerValue::Big)
                .map_err(|_| invalid()),
        }
    }

    /// Is the value strictly below zero?
    pub fn is_negative(&self) -> bool {
        match self {
            IntegerValue::Int(v) => *v < 0,
            IntegerValue::Long(v) => *v < 0,
            IntegerValue::Big(v) => v.sign() == num_bigint::Sign::Minus,
        }
    }

    /// Is the value exactly zero?
    pub fn is_zero(&self) -> bool {
        match self {
            IntegerValue::Int(v) => *v == 0,
            IntegerValue::Long(v) => *v == 0,
            IntegerValue::Big(v) => v.sign() == num_bigint::Sign::NoSign,
        }
    }

    /// The value as an `i64`, when it fits.
    pub fn to_long(&self) -> Option<i64> {
        match self {
            IntegerValue::Int(v) => Some(*v as i64),
            IntegerValue::Long(v) => Some(*v),
            IntegerValue::Big(v) => i64::try_from(v).ok(),
        }
    }

    /// The value widened to arbitrary precision. This is the
    /// normalization point for numeric comparison across widths.
    pub fn to_big(&self) -> BigInt {
        match self {
            IntegerValue::Int(v) => BigInt::from(*v),
            IntegerValue::Long(v) => BigInt::from(*v),
            IntegerValue::Big(v) => v.clone(),
        }
    }

    /// Number of code points of the canonical lexical form.
    pub fn characters_length(&self) -> usize {
        match self {
            IntegerValue::Int(v) => decimal_digits(i64::from(*v).unsigned_abs()) + (*v < 0) as usize,
            IntegerValue::Long(v) => decimal_digits(v.unsigned_abs()) + (*v < 0) as usize,
            IntegerValue::Big(v) => v.to_str_radix(10).chars().count(),
        }
    }

    /// Writes the canonical lexical form into `target` starting at
    /// `offset` and returns the offset one past the last written
    /// character.
    pub fn fill_characters(&self, target: &mut [char], offset: usize) -> usize {
        let end = offset + self.characters_length();
        match self {
            IntegerValue::Int(v) => fill_decimal(i64::from(*v), &mut target[offset..end]),
            IntegerValue::Long(v) => fill_decimal(*v, &mut target[offset..end]),
            IntegerValue::Big(v) => {
                for (slot, ch) in target[offset..end].iter_mut().zip(v.to_str_radix(10).chars()) {
                    *slot = ch;
                }
            }
        }
        end
    }
}

impl Add for IntegerValue {
    type Output = IntegerValue;

    fn add(self, rhs: IntegerValue) -> IntegerValue {
        match (self.to_long(), rhs.to_long()) {
            (Some(a), Some(b)) => match a.checked_add(b) {
                Some(sum) => IntegerValue::from_long(sum),
                None => IntegerValue::from_big(BigInt::from(a) + BigInt::from(b)),
            },
            _ => IntegerValue::from_big(self.to_big() + rhs.to_big()),
        }
    }
}

impl Sub for IntegerValue {
    type Output = IntegerValue;

    fn sub(self, rhs: IntegerValue) -> IntegerValue {
        match (self.to_long(), rhs.to_long()) {
            (Some(a), Some(b)) => match a.checked_sub(b) {
                Some(diff) => IntegerValue::from_long(diff),
                None => IntegerValue::from_big(BigInt::from(a) - BigInt::from(b)),
            },
            _ => IntegerValue::from_big(self.to_big() - rhs.to_big()),
        }
    }
}

impl PartialOrd for IntegerValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IntegerValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.width_rank(), other.width_rank()) {
            (a, b) if a != b => a.cmp(&b),
            _ => match (self, other) {
                (IntegerValue::Int(a), IntegerValue::Int(b)) => a.cmp(b),
                (IntegerValue::Long(a), IntegerValue::Long(b)) => a.cmp(b),
                (IntegerValue::Big(a), IntegerValue::Big(b)) => a.cmp(b),
                _ => unreachable!("equal width ranks imply equal variants"),
            },
        }
    }
}

impl IntegerValue {
    fn width_rank(&self) -> u8 {
        match self {
            IntegerValue::Int(_) => 0,
            IntegerValue::Long(_) => 1,
            IntegerValue::Big(_) => 2,
        }
    }
}

impl fmt::Display for IntegerValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IntegerValue::Int(v) => v.fmt(f),
            IntegerValue::Long(v) => v.fmt(f),
            IntegerValue::Big(v) => v.fmt(f),
        }
    }
}

/// Number of decimal digits in `v`, at least one.
fn decimal_digits(mut v: u64) -> usize {
    let mut digits = 1;
    while v >= 10 {
        v /= 10;
        digits += 1;
    }
    digits
}

/// Renders `v` right-aligned into `slice`, which must be exactly the
/// lexical length of `v`.
fn fill_decimal(v: i64, slice: &mut [char]) {
    let mut rest = v.unsigned_abs();
    let mut pos = slice.len();
    loop {
        pos -= 1;
        slice[pos] = (b'0' + (rest % 10) as u8) as char;
        rest /= 10;
        if rest == 0 {
            break;
        }
    }
    if v < 0 {
        slice[0] = '-';
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn construction_promotes_to_minimal_width() {
        assert_eq!(IntegerValue::from_long(12), IntegerValue::Int(12));
        assert_eq!(
            IntegerValue::from_long(1 << 40),
            IntegerValue::Long(1 << 40)
        );
        assert_eq!(
            IntegerValue::from_big(BigInt::from(-7)),
            IntegerValue::Int(-7)
        );
    }

    #[test]
    fn parse_promotes_beyond_sixty_four_bits() {
        let v = IntegerValue::parse("1180591620717411303424").unwrap(); // 2^70
        assert!(matches!(v, IntegerValue::Big(_)));
        assert_eq!(v.to_string(), "1180591620717411303424");
    }

    #[test]
    fn parse_accepts_signs_and_whitespace() {
        assert_eq!(IntegerValue::parse(" +42 ").unwrap(), IntegerValue::Int(42));
        assert_eq!(IntegerValue::parse("-42").unwrap(), IntegerValue::Int(-42));
        assert!(IntegerValue::parse("4 2").is_err());
        assert!(IntegerValue::parse("").is_err());
    }

    #[test]
    fn arithmetic_keeps_minimal_width() {
        let a = IntegerValue::from_long(i32::MAX as i64);
        let b = IntegerValue::Int(1);
        assert_eq!(a + b, IntegerValue::Long(i32::MAX as i64 + 1));

        let c = IntegerValue::Long(i32::MAX as i64 + 1) - IntegerValue::Int(1);
        assert_eq!(c, IntegerValue::Int(i32::MAX));
    }

    #[test]
    fn ordering_ranks_widths_before_values() {
        let small = IntegerValue::Int(i32::MAX);
        let long = IntegerValue::Long(i64::from(i32::MAX) + 1);
        let big = IntegerValue::Big(BigInt::from(1) << 70);
        assert!(small < long);
        assert!(long < big);
    }

    #[test]
    fn fill_matches_display() {
        for v in [
            IntegerValue::Int(0),
            IntegerValue::Int(-120),
            IntegerValue::Long(1 << 40),
            IntegerValue::Big(BigInt::from(1) << 70),
        ] {
            let mut buf = vec![' '; v.characters_length()];
            let end = v.fill_characters(&mut buf, 0);
            assert_eq!(end, buf.len());
            assert_eq!(buf.iter().collect::<String>(), v.to_string());
        }
    }
}
