//! Stream options: coding mode, fidelity toggles and encoding options.
//!
//! An [`Options`] value is assembled by the reader/writer builders, checked
//! once with [`Options::validate`] and then consumed by the body encoder
//! and decoder. It never changes while a stream is running.

use crate::{Error, Result};

/// Default block size for the (unsupported) compression coding modes.
pub const DEFAULT_BLOCK_SIZE: usize = 1_000_000;

/// How event codes and values are laid out in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingMode {
    /// Values are packed back to back with single-bit granularity. This is
    /// the default and the most compact mode.
    BitPacked,
    /// Every value starts on an octet boundary. Slightly larger streams,
    /// cheaper to produce and to inspect.
    BytePacked,
    /// Byte-aligned layout with reordered value channels, preparing the
    /// stream for an external compressor. Declared but not implemented.
    PreCompression,
    /// Like `PreCompression` with a DEFLATE stage. Declared but not
    /// implemented.
    Compression,
}

impl CodingMode {
    /// Returns `true` for the two compression modes.
    pub fn is_compressing(self) -> bool {
        matches!(self, CodingMode::PreCompression | CodingMode::Compression)
    }

    /// Returns `true` when values start on octet boundaries.
    pub fn is_byte_aligned(self) -> bool {
        !matches!(self, CodingMode::BitPacked)
    }
}

impl Default for CodingMode {
    fn default() -> Self {
        CodingMode::BitPacked
    }
}

/// The set of XML constructs a stream preserves.
///
/// Every toggle defaults to `false`; what is not preserved is dropped by
/// the encoder and never appears on the decoder side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FidelityOptions {
    /// Preserve comments.
    pub comments: bool,
    /// Preserve DOCTYPE and entity references.
    pub dtd: bool,
    /// Preserve the original lexical form of typed values.
    pub lexical_values: bool,
    /// Preserve processing instructions.
    pub pis: bool,
    /// Preserve namespace prefixes and namespace declaration events.
    pub prefixes: bool,
    /// Enable self-contained elements.
    pub self_contained: bool,
    /// Strict schema conformance. Undeclared events in schema-informed
    /// grammars become errors instead of second-level escapes.
    pub strict: bool,
}

impl FidelityOptions {
    /// Creates the strict profile: no preservation except lexical values
    /// may still be toggled on by the caller afterwards.
    pub fn strict() -> Self {
        FidelityOptions {
            strict: true,
            ..FidelityOptions::default()
        }
    }

    /// Creates the "preserve everything" profile used for round-tripping
    /// arbitrary documents.
    pub fn all() -> Self {
        FidelityOptions {
            comments: true,
            dtd: true,
            lexical_values: true,
            pis: true,
            prefixes: true,
            self_contained: false,
            strict: false,
        }
    }

    fn check(&self) -> Result<()> {
        if self.strict
            && (self.comments || self.dtd || self.pis || self.prefixes || self.self_contained)
        {
            return Err(Error::Configuration(
                "strict mode cannot preserve comments, DTDs, PIs, prefixes \
                 or self-contained elements"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Options that shape the stream header rather than the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodingOptions {
    /// Produce Canonical EXI output.
    pub canonical: bool,
    /// Start the stream with the `$EXI` cookie.
    pub include_cookie: bool,
    /// Keep `xsi:schemaLocation` and `xsi:noNamespaceSchemaLocation`
    /// attributes instead of discarding them.
    pub include_schema_location: bool,
    /// Embed an options document in the header.
    pub include_options: bool,
    /// Record the schema identifier in the options document. `None` leaves
    /// the identifier out, `Some(None)` records a nil identifier (no schema
    /// was used), `Some(Some(id))` records `id`.
    pub schema_id: Option<Option<String>>,
    /// Normalize date-time values to UTC before they are encoded.
    pub utc_time: bool,
}

/// One entry of the datatype representation map: the named schema type is
/// encoded with the named alternate representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtrMapEntry {
    /// Qualified name `(uri, local name)` of the schema type.
    pub type_name: (String, String),
    /// Qualified name `(uri, local name)` of the representation.
    pub representation: (String, String),
}

/// The complete, validated configuration of one stream.
#[derive(Debug, Clone)]
pub struct Options {
    /// Event code and value layout.
    pub coding_mode: CodingMode,
    /// Encode an XML fragment instead of a document.
    pub fragment: bool,
    /// Preservation toggles.
    pub fidelity: FidelityOptions,
    /// Header-shaping options.
    pub encoding: EncodingOptions,
    /// Block length for the compression coding modes.
    pub block_size: usize,
    /// Strings longer than this never enter a value partition. `None`
    /// means unbounded.
    pub value_max_length: Option<usize>,
    /// Upper bound on live entries across all value partitions, evicting
    /// oldest first. `None` means unbounded.
    pub value_partition_capacity: Option<usize>,
    /// When `false`, per-element value partitions are suppressed.
    pub local_value_partitions: bool,
    /// Cap on dynamically created element grammars. `None` means
    /// unbounded.
    pub max_built_in_element_grammars: Option<usize>,
    /// Cap on learned productions. `None` means unbounded.
    pub max_built_in_productions: Option<usize>,
    /// Values pre-agreed between the two sides, injected into the global
    /// value partition before the first event.
    pub shared_strings: Vec<String>,
    /// Datatype representation map entries.
    pub dtr_map: Vec<DtrMapEntry>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            coding_mode: CodingMode::default(),
            fragment: false,
            fidelity: FidelityOptions::default(),
            encoding: EncodingOptions::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            value_max_length: None,
            value_partition_capacity: None,
            local_value_partitions: true,
            max_built_in_element_grammars: None,
            max_built_in_productions: None,
            shared_strings: Vec::new(),
            dtr_map: Vec::new(),
        }
    }
}

impl Options {
    /// Checks cross-option consistency and applies the Canonical EXI
    /// normalization rules. Must be called once before a body encoder or
    /// decoder is created from these options.
    pub fn validate(&mut self) -> Result<()> {
        self.fidelity.check()?;

        if self.fidelity.self_contained && self.coding_mode.is_compressing() {
            return Err(Error::Configuration(
                "self-contained elements cannot be combined with a \
                 compression coding mode"
                    .to_string(),
            ));
        }
        if self.fidelity.self_contained && self.fidelity.strict {
            return Err(Error::Configuration(
                "self-contained elements cannot be combined with strict mode".to_string(),
            ));
        }

        if self.encoding.canonical {
            self.encoding.include_cookie = false;
            if self.coding_mode == CodingMode::Compression {
                self.coding_mode = CodingMode::PreCompression;
            }
            // Canonical output requires a reproducible map order.
            self.dtr_map.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        }

        Ok(())
    }
}

macro_rules! impl_options_methods {
    ($builder:ident) => {
        impl $builder {
            /// Changes how event codes and values are laid out.
            ///
            /// ([`CodingMode::BitPacked`] by default)
            pub fn coding_mode(mut self, mode: crate::options::CodingMode) -> Self {
                self.options.coding_mode = mode;
                self
            }

            /// Changes whether an XML fragment is processed instead of a
            /// document.
            ///
            /// (`false` by default)
            pub fn fragment(mut self, val: bool) -> Self {
                self.options.fragment = val;
                self
            }

            /// Replaces the whole fidelity set at once.
            pub fn fidelity(mut self, fidelity: crate::options::FidelityOptions) -> Self {
                self.options.fidelity = fidelity;
                self
            }

            /// Changes whether comments survive.
            ///
            /// (`false` by default)
            pub fn preserve_comments(mut self, val: bool) -> Self {
                self.options.fidelity.comments = val;
                self
            }

            /// Changes whether processing instructions survive.
            ///
            /// (`false` by default)
            pub fn preserve_pis(mut self, val: bool) -> Self {
                self.options.fidelity.pis = val;
                self
            }

            /// Changes whether DOCTYPE declarations and entity references
            /// survive.
            ///
            /// (`false` by default)
            pub fn preserve_dtd(mut self, val: bool) -> Self {
                self.options.fidelity.dtd = val;
                self
            }

            /// Changes whether namespace prefixes survive.
            ///
            /// (`false` by default)
            pub fn preserve_prefixes(mut self, val: bool) -> Self {
                self.options.fidelity.prefixes = val;
                self
            }

            /// Changes whether typed values keep their original lexical
            /// form.
            ///
            /// (`false` by default)
            pub fn preserve_lexical_values(mut self, val: bool) -> Self {
                self.options.fidelity.lexical_values = val;
                self
            }

            /// Changes strict schema conformance.
            ///
            /// (`false` by default)
            pub fn strict(mut self, val: bool) -> Self {
                self.options.fidelity.strict = val;
                self
            }

            /// Changes whether the stream starts with the `$EXI` cookie.
            ///
            /// (`false` by default)
            pub fn include_cookie(mut self, val: bool) -> Self {
                self.options.encoding.include_cookie = val;
                self
            }

            /// Changes whether an options document is embedded in the
            /// header.
            ///
            /// (`false` by default)
            pub fn include_options(mut self, val: bool) -> Self {
                self.options.encoding.include_options = val;
                self
            }

            /// Changes whether `xsi:schemaLocation` hints are kept.
            ///
            /// (`false` by default)
            pub fn include_schema_location(mut self, val: bool) -> Self {
                self.options.encoding.include_schema_location = val;
                self
            }

            /// Changes Canonical EXI output.
            ///
            /// (`false` by default)
            pub fn canonical(mut self, val: bool) -> Self {
                self.options.encoding.canonical = val;
                self
            }

            /// Changes whether date-time values are normalized to UTC.
            ///
            /// (`false` by default)
            pub fn utc_time(mut self, val: bool) -> Self {
                self.options.encoding.utc_time = val;
                self
            }

            /// Records a schema identifier for the options document.
            /// `None` records a nil identifier, stating that no schema was
            /// used.
            pub fn schema_id(mut self, id: Option<String>) -> Self {
                self.options.encoding.schema_id = Some(id);
                self
            }

            /// Changes the block length of the compression coding modes.
            ///
            /// (`1_000_000` by default)
            pub fn block_size(mut self, size: usize) -> Self {
                self.options.block_size = size;
                self
            }

            /// Bounds the length of strings entering the value partitions.
            ///
            /// (unbounded by default)
            pub fn value_max_length(mut self, max: Option<usize>) -> Self {
                self.options.value_max_length = max;
                self
            }

            /// Bounds the number of live string table entries.
            ///
            /// (unbounded by default)
            pub fn value_partition_capacity(mut self, capacity: Option<usize>) -> Self {
                self.options.value_partition_capacity = capacity;
                self
            }

            /// Changes whether per-element value partitions are kept.
            ///
            /// (`true` by default)
            pub fn local_value_partitions(mut self, val: bool) -> Self {
                self.options.local_value_partitions = val;
                self
            }

            /// Caps the number of dynamically created element grammars.
            ///
            /// (unbounded by default)
            pub fn max_built_in_element_grammars(mut self, max: Option<usize>) -> Self {
                self.options.max_built_in_element_grammars = max;
                self
            }

            /// Caps the number of learned productions.
            ///
            /// (unbounded by default)
            pub fn max_built_in_productions(mut self, max: Option<usize>) -> Self {
                self.options.max_built_in_productions = max;
                self
            }

            /// Preloads pre-agreed values into the global value partition.
            pub fn shared_strings(mut self, strings: Vec<String>) -> Self {
                self.options.shared_strings = strings;
                self
            }

            /// Replaces the datatype representation map.
            pub fn dtr_map(mut self, entries: Vec<crate::options::DtrMapEntry>) -> Self {
                self.options.dtr_map = entries;
                self
            }

            /// Uses a schema-informed grammar set instead of the built-in
            /// schema-less one.
            pub fn with_grammars(
                mut self,
                grammars: std::sync::Arc<crate::grammar::Grammars>,
            ) -> Self {
                self.grammars = Some(grammars);
                self
            }
        }
    };
}

pub(crate) use impl_options_methods;

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_bit_packed_and_unbounded() {
        let options = Options::default();
        assert_eq!(options.coding_mode, CodingMode::BitPacked);
        assert_eq!(options.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(options.value_max_length, None);
        assert_eq!(options.value_partition_capacity, None);
        assert!(options.local_value_partitions);
    }

    #[test]
    fn self_contained_with_compression_is_rejected() {
        let mut options = Options::default();
        options.fidelity.self_contained = true;
        options.coding_mode = CodingMode::Compression;
        assert!(options.validate().is_err());
    }

    #[test]
    fn strict_with_preserved_comments_is_rejected() {
        let mut options = Options::default();
        options.fidelity.strict = true;
        options.fidelity.comments = true;
        assert!(options.validate().is_err());
    }

    #[test]
    fn canonical_unsets_cookie_and_downgrades_compression() {
        let mut options = Options::default();
        options.encoding.canonical = true;
        options.encoding.include_cookie = true;
        options.coding_mode = CodingMode::Compression;
        options.validate().unwrap();
        assert!(!options.encoding.include_cookie);
        assert_eq!(options.coding_mode, CodingMode::PreCompression);
    }

    #[test]
    fn canonical_sorts_the_dtr_map() {
        let entry = |uri: &str, local: &str| DtrMapEntry {
            type_name: (uri.to_string(), local.to_string()),
            representation: (
                "http://www.w3.org/2009/exi".to_string(),
                "string".to_string(),
            ),
        };
        let mut options = Options::default();
        options.encoding.canonical = true;
        options.dtr_map = vec![entry("urn:b", "t"), entry("urn:a", "t")];
        options.validate().unwrap();
        assert_eq!(options.dtr_map[0].type_name.0, "urn:a");
    }
}
