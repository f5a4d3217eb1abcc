//! Typed values and their canonical lexical forms.
//!
//! Every value kind supports the same four operations: length of its
//! canonical lexical form in code points, filling that form into a
//! caller-supplied character buffer, structural equality and conversion
//! to a plain string. Parsers accept the W3C Schema lexical space of the
//! datatype and trim surrounding whitespace per its `whiteSpace` facet.

mod binary;
mod boolean;
mod datetime;
mod decimal;
mod float;
mod integer;
mod list;
mod qname;

use std::fmt;

pub use self::binary::{BinaryEncoding, BinaryValue};
pub use self::boolean::BooleanValue;
pub use self::datetime::{DateTimeKind, DateTimeValue};
pub use self::decimal::DecimalValue;
pub use self::float::{FloatValue, MAX_EXPONENT, SPECIAL_EXPONENT};
pub use self::integer::IntegerValue;
pub use self::list::ListValue;
pub use self::qname::QNameValue;

/// Removes leading and trailing XML whitespace, the visible effect of the
/// `collapse` facet on an already-atomic value.
pub(crate) fn trim_whitespace(s: &str) -> &str {
    s.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
}

/// A typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Octets with a Base64 lexical form.
    BinaryBase64(BinaryValue),
    /// Octets with a hex lexical form.
    BinaryHex(BinaryValue),
    /// One of the four boolean lexical forms.
    Boolean(BooleanValue),
    /// A decimal number.
    Decimal(DecimalValue),
    /// A mantissa/exponent float.
    Float(FloatValue),
    /// An integer of minimal width.
    Integer(IntegerValue),
    /// A date, a time or one of the partial calendar types.
    DateTime(DateTimeValue),
    /// An uninterpreted character string.
    String(String),
    /// A whitespace separated list of items.
    List(ListValue),
    /// A qualified name.
    QName(QNameValue),
}

impl Value {
    /// Number of code points of the canonical lexical form.
    pub fn characters_length(&self) -> usize {
        match self {
            Value::BinaryBase64(v) | Value::BinaryHex(v) => v.characters_length(),
            Value::Boolean(v) => v.characters_length(),
            Value::Decimal(v) => v.characters_length(),
            Value::Float(v) => v.characters_length(),
            Value::Integer(v) => v.characters_length(),
            Value::DateTime(v) => v.characters_length(),
            Value::String(v) => v.chars().count(),
            Value::List(v) => v.characters_length(),
            Value::QName(v) => v.characters_length(),
        }
    }

    /// Writes the canonical lexical form into `target` starting at
    /// `offset`, returning the offset one past the last character.
    ///
    /// The slice must have room for [`characters_length`] characters at
    /// `offset`.
    ///
    /// [`characters_length`]: Value::characters_length
    pub fn fill_characters(&self, target: &mut [char], offset: usize) -> usize {
        match self {
            Value::BinaryBase64(v) | Value::BinaryHex(v) => v.fill_characters(target, offset),
            Value::Boolean(v) => v.fill_characters(target, offset),
            Value::Decimal(v) => v.fill_characters(target, offset),
            Value::Float(v) => v.fill_characters(target, offset),
            Value::Integer(v) => v.fill_characters(target, offset),
            Value::DateTime(v) => v.fill_characters(target, offset),
            Value::String(v) => {
                let mut pos = offset;
                for ch in v.chars() {
                    target[pos] = ch;
                    pos += 1;
                }
                pos
            }
            Value::List(v) => v.fill_characters(target, offset),
            Value::QName(v) => v.fill_characters(target, offset),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::BinaryBase64(v) | Value::BinaryHex(v) => v.fmt(f),
            Value::Boolean(v) => v.fmt(f),
            Value::Decimal(v) => v.fmt(f),
            Value::Float(v) => v.fmt(f),
            Value::Integer(v) => v.fmt(f),
            Value::DateTime(v) => v.fmt(f),
            Value::String(v) => f.write_str(v),
            Value::List(v) => v.fmt(f),
            Value::QName(v) => v.fmt(f),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Checks that the buffer filling and the `Display` rendering agree
    /// for a representative value of every kind.
    #[test]
    fn fill_matches_display_for_all_kinds() {
        let values = [
            Value::BinaryBase64(BinaryValue::parse_base64("aGk=").unwrap()),
            Value::BinaryHex(BinaryValue::parse_hex("BEEF").unwrap()),
            Value::Boolean(BooleanValue::Zero),
            Value::Decimal(DecimalValue::parse("-1.050").unwrap()),
            Value::Float(FloatValue::parse("-1.25E2").unwrap()),
            Value::Integer(IntegerValue::parse("1180591620717411303424").unwrap()),
            Value::DateTime(
                DateTimeValue::parse(DateTimeKind::DateTime, "2023-06-01T08:30:15.5Z").unwrap(),
            ),
            Value::String("héllo".to_string()),
            Value::List(ListValue::new(vec![Value::from("a"), Value::from("b")])),
            Value::QName(QNameValue::new(
                "urn:x".to_string(),
                "t".to_string(),
                Some("p".to_string()),
            )),
        ];
        for value in values {
            let mut buf = vec!['\0'; value.characters_length()];
            let end = value.fill_characters(&mut buf, 0);
            assert_eq!(end, buf.len(), "{:?}", value);
            assert_eq!(buf.iter().collect::<String>(), value.to_string());
        }
    }

    /// Checks that parsing the canonical rendering reproduces the value.
    #[test]
    fn canonical_forms_round_trip() {
        let decimal = DecimalValue::parse("0.001").unwrap();
        assert_eq!(DecimalValue::parse(&decimal.to_string()).unwrap(), decimal);

        let float = FloatValue::parse("12.30").unwrap();
        assert_eq!(FloatValue::parse(&float.to_string()).unwrap(), float);

        let dt = DateTimeValue::parse(DateTimeKind::Date, "2024-02-29").unwrap();
        assert_eq!(
            DateTimeValue::parse(DateTimeKind::Date, &dt.to_string()).unwrap(),
            dt
        );
    }
}
