//! Qualified-name values, the value space of `xsi:type`.

use std::fmt;

use crate::values::trim_whitespace;
use crate::{Error, Result};

/// A qualified name value: namespace URI, local name and the prefix it
/// was written with.
///
/// Equality deliberately ignores the prefix; two QNames naming the same
/// expanded name are the same value.
#[derive(Debug, Clone, Eq)]
pub struct QNameValue {
    /// Namespace URI, empty for no namespace.
    pub uri: String,
    /// Local part.
    pub local_name: String,
    /// Prefix as written, if any.
    pub prefix: Option<String>,
}

impl QNameValue {
    /// Builds a QName value from its parts.
    pub fn new(uri: String, local_name: String, prefix: Option<String>) -> Self {
        QNameValue {
            uri,
            local_name,
            prefix,
        }
    }

    /// Splits a lexical QName into prefix and local part. Resolution of
    /// the prefix against in-scope namespaces is the caller's job.
    pub fn split(lexical: &str) -> Result<(Option<&str>, &str)> {
        let trimmed = trim_whitespace(lexical);
        let invalid = || Error::Format {
            datatype: "QName",
            value: lexical.to_string(),
        };
        match memchr::memchr(b':', trimmed.as_bytes()) {
            Some(colon) => {
                let (prefix, rest) = trimmed.split_at(colon);
                let local = &rest[1..];
                if prefix.is_empty() || local.is_empty() || local.contains(':') {
                    return Err(invalid());
                }
                Ok((Some(prefix), local))
            }
            None if trimmed.is_empty() => Err(invalid()),
            None => Ok((None, trimmed)),
        }
    }

    fn lexical(&self) -> String {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, self.local_name),
            _ => self.local_name.clone(),
        }
    }

    /// Number of code points of the lexical form.
    pub fn characters_length(&self) -> usize {
        self.lexical().chars().count()
    }

    /// Writes the lexical form into `target` at `offset`.
    pub fn fill_characters(&self, target: &mut [char], offset: usize) -> usize {
        let mut pos = offset;
        for ch in self.lexical().chars() {
            target[pos] = ch;
            pos += 1;
        }
        pos
    }
}

impl PartialEq for QNameValue {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri && self.local_name == other.local_name
    }
}

impl fmt::Display for QNameValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.lexical())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn split_detects_prefixes() {
        assert_eq!(QNameValue::split("xsd:int").unwrap(), (Some("xsd"), "int"));
        assert_eq!(QNameValue::split("int").unwrap(), (None, "int"));
        assert!(QNameValue::split(":int").is_err());
        assert!(QNameValue::split("a:b:c").is_err());
    }

    #[test]
    fn equality_ignores_the_prefix() {
        let a = QNameValue::new("urn:x".into(), "t".into(), Some("p".into()));
        let b = QNameValue::new("urn:x".into(), "t".into(), None);
        assert_eq!(a, b);
    }
}
