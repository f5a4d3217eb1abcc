//! Attribute buffering between a start tag and its content.
//!
//! Attributes arrive in document order, but the stream wants `xsi:type`
//! and `xsi:nil` first and, under Canonical EXI or a schema-informed
//! grammar, the rest in lexicographic order. Buffering them in an
//! [`AttributeList`] is the one place where that reordering and the
//! `xsi:*` promotion can happen before the grammar sees the batch.

use crate::context::XSI_NAMESPACE_URI;

/// One buffered attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Namespace URI, empty for none.
    pub uri: String,
    /// Local name.
    pub local_name: String,
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// The attribute value.
    pub value: String,
}

/// One buffered namespace declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDeclaration {
    /// The declared namespace URI.
    pub uri: String,
    /// The declared prefix, empty for the default namespace.
    pub prefix: String,
}

/// Collects the attributes and namespace declarations of one element
/// before they are emitted.
#[derive(Debug, Default)]
pub struct AttributeList {
    xsi_type: Option<Attribute>,
    xsi_nil: Option<Attribute>,
    schema_locations: Vec<Attribute>,
    attributes: Vec<Attribute>,
    namespace_declarations: Vec<NamespaceDeclaration>,
}

impl AttributeList {
    /// Creates an empty list.
    pub fn new() -> Self {
        AttributeList::default()
    }

    /// Drops everything, keeping the allocations.
    pub fn clear(&mut self) {
        self.xsi_type = None;
        self.xsi_nil = None;
        self.schema_locations.clear();
        self.attributes.clear();
        self.namespace_declarations.clear();
    }

    /// Buffers one attribute. `xsi:type` and `xsi:nil` are set aside for
    /// promotion, the `xsi` schema location hints are set aside so the
    /// encoder can drop them unless told to keep them.
    pub fn push_attribute(
        &mut self,
        uri: &str,
        local_name: &str,
        prefix: Option<&str>,
        value: &str,
    ) {
        let attribute = Attribute {
            uri: uri.to_string(),
            local_name: local_name.to_string(),
            prefix: prefix.map(str::to_string),
            value: value.to_string(),
        };
        if uri == XSI_NAMESPACE_URI {
            match local_name {
                "type" => {
                    self.xsi_type = Some(attribute);
                    return;
                }
                "nil" => {
                    self.xsi_nil = Some(attribute);
                    return;
                }
                "schemaLocation" | "noNamespaceSchemaLocation" => {
                    self.schema_locations.push(attribute);
                    return;
                }
                _ => {}
            }
        }
        self.attributes.push(attribute);
    }

    /// Buffers one namespace declaration.
    pub fn push_namespace_declaration(&mut self, uri: &str, prefix: &str) {
        self.namespace_declarations.push(NamespaceDeclaration {
            uri: uri.to_string(),
            prefix: prefix.to_string(),
        });
    }

    /// The buffered `xsi:type` attribute, if any.
    pub fn xsi_type(&self) -> Option<&Attribute> {
        self.xsi_type.as_ref()
    }

    /// The buffered `xsi:nil` attribute, if any.
    pub fn xsi_nil(&self) -> Option<&Attribute> {
        self.xsi_nil.as_ref()
    }

    /// The buffered schema location hints in document order.
    pub fn schema_locations(&self) -> &[Attribute] {
        &self.schema_locations
    }

    /// Number of plain attributes, `xsi:*` excluded.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Are there no plain attributes?
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Namespace URI of the attribute at `index`.
    pub fn uri(&self, index: usize) -> Option<&str> {
        self.attributes.get(index).map(|a| a.uri.as_str())
    }

    /// Local name of the attribute at `index`.
    pub fn local_name(&self, index: usize) -> Option<&str> {
        self.attributes.get(index).map(|a| a.local_name.as_str())
    }

    /// Prefix of the attribute at `index`. Distinct from [`value`]; an
    /// attribute with no written prefix reports `None` here while its
    /// value stays reachable.
    ///
    /// [`value`]: AttributeList::value
    pub fn prefix(&self, index: usize) -> Option<&str> {
        self.attributes.get(index).and_then(|a| a.prefix.as_deref())
    }

    /// Value of the attribute at `index`.
    pub fn value(&self, index: usize) -> Option<&str> {
        self.attributes.get(index).map(|a| a.value.as_str())
    }

    /// The plain attributes in their current order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// The buffered namespace declarations in their current order.
    pub fn namespace_declarations(&self) -> &[NamespaceDeclaration] {
        &self.namespace_declarations
    }

    /// Orders attributes by local name, then namespace URI, and
    /// namespace declarations by prefix. Both sorts are stable.
    pub fn sort_canonical(&mut self) {
        self.attributes
            .sort_by(|a, b| (&a.local_name, &a.uri).cmp(&(&b.local_name, &b.uri)));
        self.namespace_declarations
            .sort_by(|a, b| a.prefix.cmp(&b.prefix));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn xsi_attributes_are_promoted_out_of_the_plain_list() {
        let mut list = AttributeList::new();
        list.push_attribute("", "a", None, "1");
        list.push_attribute(XSI_NAMESPACE_URI, "nil", Some("xsi"), "true");
        list.push_attribute(XSI_NAMESPACE_URI, "type", Some("xsi"), "xsd:int");
        assert_eq!(list.len(), 1);
        assert_eq!(list.xsi_nil().unwrap().value, "true");
        assert_eq!(list.xsi_type().unwrap().value, "xsd:int");
    }

    #[test]
    fn schema_locations_are_set_aside() {
        let mut list = AttributeList::new();
        list.push_attribute(XSI_NAMESPACE_URI, "schemaLocation", Some("xsi"), "urn:x x.xsd");
        assert!(list.is_empty());
        assert_eq!(list.schema_locations().len(), 1);
    }

    #[test]
    fn canonical_order_is_local_name_then_uri() {
        let mut list = AttributeList::new();
        list.push_attribute("urn:b", "b", None, "1");
        list.push_attribute("urn:a", "a", None, "2");
        list.push_attribute("urn:a", "b", None, "3");
        list.sort_canonical();
        assert_eq!(list.local_name(0), Some("a"));
        assert_eq!(list.uri(1), Some("urn:a"));
        assert_eq!(list.local_name(1), Some("b"));
        assert_eq!(list.uri(2), Some("urn:b"));
    }

    #[test]
    fn prefix_and_value_accessors_are_distinct() {
        let mut list = AttributeList::new();
        list.push_attribute("urn:a", "a", Some("p"), "v");
        assert_eq!(list.prefix(0), Some("p"));
        assert_eq!(list.value(0), Some("v"));
        list.clear();
        list.push_attribute("urn:a", "a", None, "v");
        assert_eq!(list.prefix(0), None);
        assert_eq!(list.value(0), Some("v"));
    }

    #[test]
    fn namespace_declarations_sort_by_prefix() {
        let mut list = AttributeList::new();
        list.push_namespace_declaration("urn:b", "b");
        list.push_namespace_declaration("urn:a", "a");
        list.sort_canonical();
        assert_eq!(list.namespace_declarations()[0].prefix, "a");
    }
}
