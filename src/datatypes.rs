//! Datatypes attached to grammar productions and their value codecs.
//!
//! A schema-informed grammar annotates attribute and character events
//! with the datatype of the declared content; schema-less streams use
//! [`Datatype::String`] throughout. Everything except string-table coded
//! strings and qualified names is encoded here, straight against the
//! channel.

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::grammar::code_width;
use crate::values::{
    BinaryEncoding, BinaryValue, BooleanValue, DateTimeKind, DateTimeValue, DecimalValue,
    FloatValue, IntegerValue, ListValue, Value,
};
use crate::{Error, Result};

/// Namespace of the alternate representations named by a datatype
/// representation map.
pub const EXI_DATATYPE_URI: &str = "http://www.w3.org/2009/exi";

/// A closed enumeration facet. Values are coded as an n-bit index into
/// the declared set.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationDatatype {
    values: Vec<Value>,
}

impl EnumerationDatatype {
    /// Creates an enumeration over the declared values, in schema order.
    pub fn new(values: Vec<Value>) -> Self {
        EnumerationDatatype { values }
    }

    /// Number of declared values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Is the declared set empty?
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The declared value at `index`. The whole range of the set is
    /// addressable, including its last entry.
    pub fn value(&self, index: usize) -> Option<&Value> {
        if index < self.values.len() {
            self.values.get(index)
        } else {
            None
        }
    }

    /// Index of the declared value whose lexical form matches.
    pub fn index_of(&self, lexical: &str) -> Option<usize> {
        let needle = crate::values::trim_whitespace(lexical);
        self.values.iter().position(|v| v.to_string() == needle)
    }
}

/// The datatype of a typed attribute or character value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    /// String-table coded character data. The default for schema-less
    /// streams and the fallback for every preserved lexical form.
    String,
    /// A single bit.
    Boolean,
    /// Two bits distinguishing the four boolean lexical forms, used when
    /// a pattern facet makes the exact form significant.
    BooleanFacet,
    /// Length-prefixed octets with the given lexical alphabet.
    Binary(BinaryEncoding),
    /// Sign plus two unsigned varints.
    Decimal,
    /// Mantissa/exponent varints.
    Float,
    /// Signed varint of unbounded range.
    Integer,
    /// Unsigned varint of unbounded range.
    UnsignedInteger,
    /// Bounded integer coded as an n-bit offset from its lower bound.
    NBitInteger {
        /// Smallest declared value.
        lower_bound: i64,
        /// Largest declared value.
        upper_bound: i64,
    },
    /// Date or time components of the named kind.
    DateTime(DateTimeKind),
    /// An n-bit index into a closed value set.
    Enumeration(EnumerationDatatype),
    /// Length-prefixed sequence of one item type.
    List(Box<Datatype>),
    /// A qualified name, coded as its lexical form.
    QName,
}

impl Datatype {
    /// Resolves an alternate-representation name from a datatype
    /// representation map entry. Unknown names are a configuration
    /// error.
    pub fn from_representation(uri: &str, local_name: &str) -> Result<Datatype> {
        if uri != EXI_DATATYPE_URI {
            return Err(Error::Configuration(format!(
                "unknown datatype representation {{{}}}{}",
                uri, local_name
            )));
        }
        match local_name {
            "string" => Ok(Datatype::String),
            "boolean" => Ok(Datatype::Boolean),
            "base64Binary" => Ok(Datatype::Binary(BinaryEncoding::Base64)),
            "hexBinary" => Ok(Datatype::Binary(BinaryEncoding::Hex)),
            "decimal" => Ok(Datatype::Decimal),
            "double" => Ok(Datatype::Float),
            "integer" => Ok(Datatype::Integer),
            "dateTime" => Ok(Datatype::DateTime(DateTimeKind::DateTime)),
            other => Err(Error::Configuration(format!(
                "unknown datatype representation {{{}}}{}",
                EXI_DATATYPE_URI, other
            ))),
        }
    }

    /// Parses a lexical form into a value of this datatype.
    pub fn parse(&self, lexical: &str) -> Result<Value> {
        match self {
            Datatype::String | Datatype::QName => Ok(Value::String(lexical.to_string())),
            Datatype::Boolean => Ok(Value::Boolean(BooleanValue::parse(lexical)?)),
            Datatype::BooleanFacet => Ok(Value::Boolean(BooleanValue::parse(lexical)?)),
            Datatype::Binary(BinaryEncoding::Base64) => {
                Ok(Value::BinaryBase64(BinaryValue::parse_base64(lexical)?))
            }
            Datatype::Binary(BinaryEncoding::Hex) => {
                Ok(Value::BinaryHex(BinaryValue::parse_hex(lexical)?))
            }
            Datatype::Decimal => Ok(Value::Decimal(DecimalValue::parse(lexical)?)),
            Datatype::Float => Ok(Value::Float(FloatValue::parse(lexical)?)),
            Datatype::Integer => Ok(Value::Integer(IntegerValue::parse(lexical)?)),
            Datatype::UnsignedInteger => {
                let value = IntegerValue::parse(lexical)?;
                if value.is_negative() {
                    return Err(Error::Format {
                        datatype: "nonNegativeInteger",
                        value: lexical.to_string(),
                    });
                }
                Ok(Value::Integer(value))
            }
            Datatype::NBitInteger {
                lower_bound,
                upper_bound,
            } => {
                let value = IntegerValue::parse(lexical)?;
                match value.to_long() {
                    Some(v) if v >= *lower_bound && v <= *upper_bound => {
                        Ok(Value::Integer(value))
                    }
                    _ => Err(Error::Format {
                        datatype: "bounded integer",
                        value: lexical.to_string(),
                    }),
                }
            }
            Datatype::DateTime(kind) => {
                Ok(Value::DateTime(DateTimeValue::parse(*kind, lexical)?))
            }
            Datatype::Enumeration(e) => e
                .index_of(lexical)
                .and_then(|index| e.value(index).cloned())
                .ok_or_else(|| Error::Format {
                    datatype: "enumeration",
                    value: lexical.to_string(),
                }),
            Datatype::List(item) => {
                let mut values = Vec::new();
                for token in lexical.split_ascii_whitespace() {
                    values.push(item.parse(token)?);
                }
                Ok(Value::List(ListValue::new(values)))
            }
        }
    }

    /// Encodes an already parsed value of this datatype.
    pub fn encode<C: EncoderChannel>(&self, channel: &mut C, value: &Value) -> Result<()> {
        match (self, value) {
            (Datatype::String, Value::String(s)) | (Datatype::QName, Value::String(s)) => {
                channel.encode_string(s)
            }
            (Datatype::Boolean, Value::Boolean(b)) => channel.encode_boolean(b.value()),
            (Datatype::BooleanFacet, Value::Boolean(b)) => {
                channel.encode_n_bit_unsigned_integer(b.code(), 2)
            }
            (Datatype::Binary(_), Value::BinaryBase64(b))
            | (Datatype::Binary(_), Value::BinaryHex(b)) => channel.encode_binary(&b.data),
            (Datatype::Decimal, Value::Decimal(d)) => channel.encode_decimal(d),
            (Datatype::Float, Value::Float(f)) => channel.encode_float(f),
            (Datatype::Integer, Value::Integer(i)) => channel.encode_integer_value(i),
            (Datatype::UnsignedInteger, Value::Integer(i)) => {
                channel.encode_unsigned_integer_value(i)
            }
            (
                Datatype::NBitInteger {
                    lower_bound,
                    upper_bound,
                },
                Value::Integer(i),
            ) => {
                let v = i.to_long().ok_or_else(|| {
                    Error::Argument("bounded integer outside 64 bits".to_string())
                })?;
                let n = code_width((*upper_bound - *lower_bound + 1) as usize);
                channel.encode_n_bit_unsigned_integer((v - *lower_bound) as u32, n)
            }
            (Datatype::DateTime(_), Value::DateTime(dt)) => channel.encode_date_time(dt),
            (Datatype::Enumeration(e), v) => {
                let index = e.index_of(&v.to_string()).ok_or_else(|| Error::Format {
                    datatype: "enumeration",
                    value: v.to_string(),
                })?;
                channel.encode_n_bit_unsigned_integer(index as u32, code_width(e.len()))
            }
            (Datatype::List(item), Value::List(list)) => {
                channel.encode_unsigned_integer(list.len() as u64)?;
                for v in &list.values {
                    item.encode(channel, v)?;
                }
                Ok(())
            }
            (datatype, value) => Err(Error::Argument(format!(
                "value {} does not belong to datatype {:?}",
                value, datatype
            ))),
        }
    }

    /// Decodes a value of this datatype.
    pub fn decode<C: DecoderChannel>(&self, channel: &mut C) -> Result<Value> {
        match self {
            Datatype::String | Datatype::QName => Ok(Value::String(channel.decode_string()?)),
            Datatype::Boolean => Ok(Value::Boolean(BooleanValue::from_bool(
                channel.decode_boolean()?,
            ))),
            Datatype::BooleanFacet => {
                let code = channel.decode_n_bit_unsigned_integer(2)?;
                BooleanValue::from_code(code)
                    .map(Value::Boolean)
                    .ok_or_else(|| Error::Protocol(format!("boolean code {} out of range", code)))
            }
            Datatype::Binary(encoding) => {
                let data = channel.decode_binary()?;
                let value = BinaryValue::new(data, *encoding);
                Ok(match encoding {
                    BinaryEncoding::Base64 => Value::BinaryBase64(value),
                    BinaryEncoding::Hex => Value::BinaryHex(value),
                })
            }
            Datatype::Decimal => Ok(Value::Decimal(channel.decode_decimal()?)),
            Datatype::Float => Ok(Value::Float(channel.decode_float()?)),
            Datatype::Integer => Ok(Value::Integer(channel.decode_integer_value()?)),
            Datatype::UnsignedInteger => Ok(Value::Integer(channel.decode_unsigned_integer_value()?)),
            Datatype::NBitInteger {
                lower_bound,
                upper_bound,
            } => {
                let n = code_width((*upper_bound - *lower_bound + 1) as usize);
                let offset = channel.decode_n_bit_unsigned_integer(n)?;
                Ok(Value::Integer(IntegerValue::from_long(
                    *lower_bound + i64::from(offset),
                )))
            }
            Datatype::DateTime(kind) => Ok(Value::DateTime(channel.decode_date_time(*kind)?)),
            Datatype::Enumeration(e) => {
                let index = channel.decode_n_bit_unsigned_integer(code_width(e.len()))? as usize;
                e.value(index).cloned().ok_or_else(|| {
                    Error::Protocol(format!("enumeration index {} out of range", index))
                })
            }
            Datatype::List(item) => {
                let length = channel.decode_unsigned_integer()? as usize;
                let mut values = Vec::with_capacity(length.min(1 << 16));
                for _ in 0..length {
                    values.push(item.decode(channel)?);
                }
                Ok(Value::List(ListValue::new(values)))
            }
        }
    }

    /// Is this datatype coded through the string table rather than a
    /// direct codec?
    pub fn is_string_coded(&self) -> bool {
        matches!(self, Datatype::String)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::{BitDecoderChannel, BitEncoderChannel, EncoderChannel};
    use pretty_assertions::assert_eq;

    fn round_trip(datatype: &Datatype, lexical: &str) -> Value {
        let value = datatype.parse(lexical).unwrap();
        let mut buf = Vec::new();
        let mut enc = BitEncoderChannel::new(&mut buf);
        datatype.encode(&mut enc, &value).unwrap();
        enc.flush().unwrap();
        let mut dec = BitDecoderChannel::new(buf.as_slice());
        let got = datatype.decode(&mut dec).unwrap();
        assert_eq!(got, value, "{}", lexical);
        got
    }

    #[test]
    fn typed_values_round_trip() {
        round_trip(&Datatype::Boolean, "true");
        round_trip(&Datatype::Decimal, "-1.050");
        round_trip(&Datatype::Float, "1.5E3");
        round_trip(&Datatype::Integer, "-1180591620717411303424");
        round_trip(&Datatype::DateTime(DateTimeKind::Date), "2024-02-29Z");
        round_trip(&Datatype::Binary(BinaryEncoding::Hex), "C0FFEE");
        round_trip(
            &Datatype::List(Box::new(Datatype::Integer)),
            "1 2 3 -4 5000000000",
        );
    }

    #[test]
    fn n_bit_integers_use_the_offset() {
        let datatype = Datatype::NBitInteger {
            lower_bound: 5,
            upper_bound: 8,
        };
        let mut buf = Vec::new();
        let mut enc = BitEncoderChannel::new(&mut buf);
        let value = datatype.parse("7").unwrap();
        datatype.encode(&mut enc, &value).unwrap();
        enc.flush().unwrap();
        // Offset 2 in two bits, padded.
        assert_eq!(buf, vec![0b1000_0000]);
        assert!(datatype.parse("9").is_err());
    }

    #[test]
    fn enumeration_addresses_its_last_value() {
        let e = EnumerationDatatype::new(vec![
            Value::from("red"),
            Value::from("green"),
            Value::from("blue"),
        ]);
        assert_eq!(e.value(2), Some(&Value::from("blue")));
        assert_eq!(e.value(3), None);
        assert_eq!(e.index_of("blue"), Some(2));

        let datatype = Datatype::Enumeration(e);
        round_trip(&datatype, "blue");
    }

    #[test]
    fn boolean_facet_keeps_the_lexical_form() {
        let got = round_trip(&Datatype::BooleanFacet, "1");
        assert_eq!(got, Value::Boolean(BooleanValue::One));
    }

    #[test]
    fn unknown_representations_are_configuration_errors() {
        let err = Datatype::from_representation(EXI_DATATYPE_URI, "duration").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert!(Datatype::from_representation(EXI_DATATYPE_URI, "decimal").is_ok());
    }
}
