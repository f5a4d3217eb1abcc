//! Binary values with Base64 and hex lexical forms.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::{Error, Result};

/// Which lexical alphabet a binary value uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryEncoding {
    /// `xsd:base64Binary`
    Base64,
    /// `xsd:hexBinary`
    Hex,
}

/// An octet string together with its lexical alphabet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryValue {
    /// The raw octets.
    pub data: Vec<u8>,
    /// Alphabet used by the lexical form.
    pub encoding: BinaryEncoding,
}

impl BinaryValue {
    /// Wraps raw octets.
    pub fn new(data: Vec<u8>, encoding: BinaryEncoding) -> Self {
        BinaryValue { data, encoding }
    }

    /// Parses `xsd:base64Binary`; embedded whitespace is allowed by the
    /// schema datatype and removed first.
    pub fn parse_base64(lexical: &str) -> Result<Self> {
        let compact: String = lexical
            .chars()
            .filter(|c| !matches!(c, ' ' | '\t' | '\n' | '\r'))
            .collect();
        STANDARD
            .decode(compact.as_bytes())
            .map(|data| BinaryValue::new(data, BinaryEncoding::Base64))
            .map_err(|_| Error::Format {
                datatype: "base64Binary",
                value: lexical.to_string(),
            })
    }

    /// Parses `xsd:hexBinary`, both digit cases accepted.
    pub fn parse_hex(lexical: &str) -> Result<Self> {
        let trimmed = crate::values::trim_whitespace(lexical);
        hex::decode(trimmed)
            .map(|data| BinaryValue::new(data, BinaryEncoding::Hex))
            .map_err(|_| Error::Format {
                datatype: "hexBinary",
                value: lexical.to_string(),
            })
    }

    fn lexical(&self) -> String {
        match self.encoding {
            BinaryEncoding::Base64 => STANDARD.encode(&self.data),
            // The canonical hex form uses upper-case digits.
            BinaryEncoding::Hex => hex::encode_upper(&self.data),
        }
    }

    /// Number of code points of the canonical lexical form.
    pub fn characters_length(&self) -> usize {
        match self.encoding {
            BinaryEncoding::Base64 => (self.data.len() + 2) / 3 * 4,
            BinaryEncoding::Hex => self.data.len() * 2,
        }
    }

    /// Writes the canonical lexical form into `target` at `offset`.
    pub fn fill_characters(&self, target: &mut [char], offset: usize) -> usize {
        let mut pos = offset;
        for ch in self.lexical().chars() {
            target[pos] = ch;
            pos += 1;
        }
        pos
    }
}

impl fmt::Display for BinaryValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.lexical())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn base64_round_trips_with_whitespace() {
        let v = BinaryValue::parse_base64("aGVs\n bG8=").unwrap();
        assert_eq!(v.data, b"hello");
        assert_eq!(v.to_string(), "aGVsbG8=");
    }

    #[test]
    fn hex_is_canonically_upper_case() {
        let v = BinaryValue::parse_hex("0fb7").unwrap();
        assert_eq!(v.data, vec![0x0f, 0xb7]);
        assert_eq!(v.to_string(), "0FB7");
    }

    #[test]
    fn odd_hex_length_is_rejected() {
        assert!(BinaryValue::parse_hex("abc").is_err());
        assert!(BinaryValue::parse_base64("!!!").is_err());
    }

    #[test]
    fn lengths_match_lexical_forms() {
        let v = BinaryValue::new(vec![1, 2, 3, 4], BinaryEncoding::Base64);
        assert_eq!(v.characters_length(), v.to_string().chars().count());
        let v = BinaryValue::new(vec![1, 2, 3, 4], BinaryEncoding::Hex);
        assert_eq!(v.characters_length(), v.to_string().chars().count());
    }
}
