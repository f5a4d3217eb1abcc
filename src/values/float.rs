//! Floats as mantissa/exponent pairs with a canonical representation.

use std::fmt::{self, Write};

use crate::values::{trim_whitespace, IntegerValue};
use crate::{Error, Result};

/// Exponent value reserved for the special values INF, -INF and NaN.
pub const SPECIAL_EXPONENT: i32 = -(1 << 14);

/// Largest magnitude of a regular exponent.
pub const MAX_EXPONENT: i32 = (1 << 14) - 1;

/// A float held as `mantissa * 10^exponent`.
///
/// Canonical invariants, established on construction:
/// * a zero mantissa forces a zero exponent, unless the exponent is the
///   [`SPECIAL_EXPONENT`] sentinel;
/// * a non-zero mantissa carries no trailing decimal zeros;
/// * with the sentinel exponent, mantissa `1` is +INF, `-1` is -INF and
///   `0` is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatValue {
    mantissa: i64,
    exponent: i32,
}

impl FloatValue {
    /// Positive infinity.
    pub const INFINITY: FloatValue = FloatValue {
        mantissa: 1,
        exponent: SPECIAL_EXPONENT,
    };
    /// Negative infinity.
    pub const NEG_INFINITY: FloatValue = FloatValue {
        mantissa: -1,
        exponent: SPECIAL_EXPONENT,
    };
    /// Not a number.
    pub const NAN: FloatValue = FloatValue {
        mantissa: 0,
        exponent: SPECIAL_EXPONENT,
    };

    /// Builds a float from mantissa and exponent, normalizing to the
    /// canonical representation. Exponents outside
    /// `[-MAX_EXPONENT, MAX_EXPONENT]` other than the special sentinel are
    /// rejected.
    pub fn new(mut mantissa: i64, mut exponent: i32) -> Result<Self> {
        if exponent == SPECIAL_EXPONENT {
            // Any mantissa other than +-1 means NaN; keep one bit pattern.
            if mantissa != 1 && mantissa != -1 {
                mantissa = 0;
            }
            return Ok(FloatValue { mantissa, exponent });
        }
        if mantissa == 0 {
            return Ok(FloatValue {
                mantissa: 0,
                exponent: 0,
            });
        }
        while mantissa % 10 == 0 {
            mantissa /= 10;
            exponent += 1;
        }
        if exponent < -MAX_EXPONENT || exponent > MAX_EXPONENT {
            return Err(Error::Format {
                datatype: "float",
                value: format!("{}E{}", mantissa, exponent),
            });
        }
        Ok(FloatValue { mantissa, exponent })
    }

    /// The mantissa.
    pub fn mantissa(&self) -> i64 {
        self.mantissa
    }

    /// The exponent, [`SPECIAL_EXPONENT`] for INF, -INF and NaN.
    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    /// Is this one of INF, -INF or NaN?
    pub fn is_special(&self) -> bool {
        self.exponent == SPECIAL_EXPONENT
    }

    /// Parses the XML Schema `float`/`double` lexical form.
    pub fn parse(lexical: &str) -> Result<Self> {
        let trimmed = trim_whitespace(lexical);
        match trimmed {
            "INF" => return Ok(Self::INFINITY),
            "-INF" => return Ok(Self::NEG_INFINITY),
            "NaN" => return Ok(Self::NAN),
            _ => {}
        }
        let invalid = || Error::Format {
            datatype: "float",
            value: lexical.to_string(),
        };

        let bytes = trimmed.as_bytes();
        let (number, exponent_part) = match memchr::memchr2(b'e', b'E', bytes) {
            Some(e) => (&trimmed[..e], Some(&trimmed[e + 1..])),
            None => (trimmed, None),
        };
        let (negative, unsigned) = match number.as_bytes().first() {
            Some(b'-') => (true, &number[1..]),
            Some(b'+') => (false, &number[1..]),
            _ => (false, number),
        };
        let (integral, fraction) = match memchr::memchr(b'.', unsigned.as_bytes()) {
            Some(dot) => (&unsigned[..dot], &unsigned[dot + 1..]),
            None => (unsigned, ""),
        };
        if integral.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(integral) || !all_digits(fraction) {
            return Err(invalid());
        }

        let mut mantissa: i64 = 0;
        for b in integral.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i64::from(b - b'0')))
                .ok_or_else(invalid)?;
        }
        if negative {
            mantissa = -mantissa;
        }

        let mut exponent: i32 = match exponent_part {
            Some(part) => {
                let digits = part.strip_prefix('+').unwrap_or(part);
                let magnitude = digits.strip_prefix('-').unwrap_or(digits);
                if magnitude.is_empty() || !all_digits(magnitude) {
                    return Err(invalid());
                }
                digits.parse::<i32>().map_err(|_| invalid())?
            }
            None => 0,
        };
        exponent = exponent
            .checked_sub(fraction.chars().count() as i32)
            .ok_or_else(invalid)?;

        Self::new(mantissa, exponent).map_err(|_| invalid())
    }

    /// Number of code points of the canonical lexical form.
    pub fn characters_length(&self) -> usize {
        if self.is_special() {
            return match self.mantissa {
                1 => 3,
                -1 => 4,
                _ => 3,
            };
        }
        IntegerValue::from_long(self.mantissa).characters_length()
            + 1
            + IntegerValue::from_long(i64::from(self.exponent)).characters_length()
    }

    /// Writes the canonical lexical form into `target` at `offset`.
    pub fn fill_characters(&self, target: &mut [char], offset: usize) -> usize {
        if self.is_special() {
            let text = match self.mantissa {
                1 => "INF",
                -1 => "-INF",
                _ => "NaN",
            };
            let mut pos = offset;
            for ch in text.chars() {
                target[pos] = ch;
                pos += 1;
            }
            return pos;
        }
        let mut pos = IntegerValue::from_long(self.mantissa).fill_characters(target, offset);
        target[pos] = 'E';
        pos += 1;
        IntegerValue::from_long(i64::from(self.exponent)).fill_characters(target, pos)
    }
}

impl fmt::Display for FloatValue {
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
    fn trailing_mantissa_zeros_move_to_the_exponent() {
        let v = FloatValue::new(1200, -2).unwrap();
        assert_eq!(v.mantissa(), 12);
        assert_eq!(v.exponent(), 0);
    }

    #[test]
    fn zero_mantissa_forces_zero_exponent() {
        let v = FloatValue::new(0, 5).unwrap();
        assert_eq!((v.mantissa(), v.exponent()), (0, 0));
    }

    #[test]
    fn specials_parse_and_render() {
        assert_eq!(FloatValue::parse("INF").unwrap(), FloatValue::INFINITY);
        assert_eq!(FloatValue::parse("-INF").unwrap(), FloatValue::NEG_INFINITY);
        assert_eq!(FloatValue::parse("NaN").unwrap(), FloatValue::NAN);
        assert_eq!(FloatValue::NEG_INFINITY.to_string(), "-INF");
    }

    #[test]
    fn parse_combines_fraction_and_exponent() {
        let v = FloatValue::parse("-1.25E2").unwrap();
        assert_eq!(v.mantissa(), -125);
        assert_eq!(v.exponent(), 0);

        let v = FloatValue::parse("12.30").unwrap();
        assert_eq!(v.mantissa(), 123);
        assert_eq!(v.exponent(), -1);
    }

    #[test]
    fn mantissa_overflow_is_a_format_error() {
        assert!(FloatValue::parse("123456789012345678901234567890").is_err());
    }

    #[test]
    fn exponent_out_of_range_is_rejected() {
        assert!(FloatValue::new(1, 16384).is_err());
        assert!(FloatValue::new(1, -16384 - 1).is_err());
        assert!(FloatValue::new(1, 16383).is_ok());
    }

    #[test]
    fn canonical_render_uses_e_notation() {
        assert_eq!(FloatValue::parse("0.001").unwrap().to_string(), "1E-3");
        assert_eq!(FloatValue::parse("100").unwrap().to_string(), "1E2");
    }
}
