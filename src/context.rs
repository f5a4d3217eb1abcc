//! Identifier partitions: namespace URIs, local names and prefixes.
//!
//! Every qualified name a stream can mention is interned once into a
//! dense id space. The three initial partitions are fixed by the format;
//! schema-informed streams add the XML Schema namespace and its built-in
//! type names. During a run both sides append newly seen identifiers in
//! the same order, so the id spaces stay in lock step.

use crate::datatypes::Datatype;
use crate::grammar::GrammarId;

/// The XML namespace, always URI id 1.
pub const XML_NAMESPACE_URI: &str = "http://www.w3.org/XML/1998/namespace";
/// The XML Schema instance namespace, always URI id 2.
pub const XSI_NAMESPACE_URI: &str = "http://www.w3.org/2001/XMLSchema-instance";
/// The XML Schema namespace, URI id 3 on schema-informed streams.
pub const XSD_NAMESPACE_URI: &str = "http://www.w3.org/2001/XMLSchema";

/// Local names preloaded for the XML namespace.
const XML_LOCAL_NAMES: [&str; 4] = ["base", "id", "lang", "space"];
/// Local names preloaded for the XML Schema instance namespace.
const XSI_LOCAL_NAMES: [&str; 2] = ["nil", "type"];
/// Built-in type names preloaded for the XML Schema namespace, in
/// lexicographic order.
const XSD_LOCAL_NAMES: [&str; 46] = [
    "ENTITIES",
    "ENTITY",
    "ID",
    "IDREF",
    "IDREFS",
    "NCName",
    "NMTOKEN",
    "NMTOKENS",
    "NOTATION",
    "Name",
    "QName",
    "anySimpleType",
    "anyType",
    "anyURI",
    "base64Binary",
    "boolean",
    "byte",
    "date",
    "dateTime",
    "decimal",
    "double",
    "duration",
    "float",
    "gDay",
    "gMonth",
    "gMonthDay",
    "gYear",
    "gYearMonth",
    "hexBinary",
    "int",
    "integer",
    "language",
    "long",
    "negativeInteger",
    "nonNegativeInteger",
    "nonPositiveInteger",
    "normalizedString",
    "positiveInteger",
    "short",
    "string",
    "time",
    "token",
    "unsignedByte",
    "unsignedInt",
    "unsignedLong",
    "unsignedShort",
];

/// Dense identifier of one interned qualified name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QNameId {
    /// Id of the namespace URI partition entry.
    pub uri_id: usize,
    /// Id of the local name within that partition.
    pub local_name_id: usize,
}

/// One interned qualified name with its optional schema links.
#[derive(Debug, Clone)]
pub struct QNameContext {
    id: QNameId,
    local_name: String,
    global_start_element: Option<GrammarId>,
    global_attribute: Option<Datatype>,
    type_grammar: Option<GrammarId>,
}

impl QNameContext {
    fn new(id: QNameId, local_name: String) -> Self {
        QNameContext {
            id,
            local_name,
            global_start_element: None,
            global_attribute: None,
            type_grammar: None,
        }
    }

    /// The dense identifier of this name.
    pub fn id(&self) -> QNameId {
        self.id
    }

    /// The local part.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The prefix used when none was preserved in the stream: `""` for
    /// the empty namespace, `xml` and `xsi` for their fixed partitions
    /// and a generated `ns{id}` otherwise.
    pub fn default_prefix(&self) -> String {
        match self.id.uri_id {
            0 => String::new(),
            1 => "xml".to_string(),
            2 => "xsi".to_string(),
            id => format!("ns{}", id),
        }
    }

    /// Grammar of the global element declaration with this name, if any.
    pub fn global_start_element(&self) -> Option<GrammarId> {
        self.global_start_element
    }

    /// Datatype of the global attribute declaration with this name, if
    /// any.
    pub fn global_attribute(&self) -> Option<&Datatype> {
        self.global_attribute.as_ref()
    }

    /// Grammar of the global type definition with this name, if any.
    pub fn type_grammar(&self) -> Option<GrammarId> {
        self.type_grammar
    }

    /// Links this name to the grammar of its global element declaration.
    pub fn set_global_start_element(&mut self, grammar: GrammarId) {
        self.global_start_element = Some(grammar);
    }

    /// Links this name to the datatype of its global attribute
    /// declaration.
    pub fn set_global_attribute(&mut self, datatype: Datatype) {
        self.global_attribute = Some(datatype);
    }

    /// Links this name to the grammar of its global type definition.
    pub fn set_type_grammar(&mut self, grammar: GrammarId) {
        self.type_grammar = Some(grammar);
    }
}

/// One namespace URI with its prefix and local-name partitions.
#[derive(Debug, Clone)]
pub struct UriContext {
    id: usize,
    uri: String,
    prefixes: Vec<String>,
    qnames: Vec<QNameContext>,
}

impl UriContext {
    fn new(id: usize, uri: String) -> Self {
        UriContext {
            id,
            uri,
            prefixes: Vec::new(),
            qnames: Vec::new(),
        }
    }

    /// The URI partition id.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The namespace URI string.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Number of interned local names.
    pub fn number_of_qnames(&self) -> usize {
        self.qnames.len()
    }

    /// Number of known prefixes.
    pub fn number_of_prefixes(&self) -> usize {
        self.prefixes.len()
    }

    /// Prefix lookup by id.
    pub fn prefix(&self, prefix_id: usize) -> Option<&str> {
        self.prefixes.get(prefix_id).map(String::as_str)
    }

    /// Prefix id lookup by string, `None` when unknown.
    pub fn prefix_id(&self, prefix: &str) -> Option<usize> {
        self.prefixes.iter().position(|p| p == prefix)
    }

    /// Local-name lookup by id.
    pub fn qname(&self, local_name_id: usize) -> Option<&QNameContext> {
        self.qnames.get(local_name_id)
    }

    /// Local-name lookup by string.
    pub fn qname_by_name(&self, local_name: &str) -> Option<&QNameContext> {
        self.qnames.iter().find(|q| q.local_name == local_name)
    }

    /// Interns `local_name`, returning the id of the new entry. The name
    /// must not be present yet.
    pub fn add_qname(&mut self, local_name: &str) -> QNameId {
        let id = QNameId {
            uri_id: self.id,
            local_name_id: self.qnames.len(),
        };
        self.qnames.push(QNameContext::new(id, local_name.to_string()));
        id
    }

    /// Interns `prefix`, returning its id.
    pub fn add_prefix(&mut self, prefix: &str) -> usize {
        self.prefixes.push(prefix.to_string());
        self.prefixes.len() - 1
    }

    fn qname_mut(&mut self, local_name_id: usize) -> Option<&mut QNameContext> {
        self.qnames.get_mut(local_name_id)
    }
}

/// The full set of identifier partitions of one stream.
#[derive(Debug, Clone)]
pub struct GrammarContext {
    uris: Vec<UriContext>,
}

impl GrammarContext {
    /// The partitions every stream starts with: the empty namespace, the
    /// XML namespace and the XML Schema instance namespace.
    pub fn core_entries() -> Self {
        let mut context = GrammarContext { uris: Vec::new() };
        let empty = context.add_uri("");
        context.uris[empty].add_prefix("");
        let xml = context.add_uri(XML_NAMESPACE_URI);
        context.uris[xml].add_prefix("xml");
        for name in XML_LOCAL_NAMES {
            context.uris[xml].add_qname(name);
        }
        let xsi = context.add_uri(XSI_NAMESPACE_URI);
        context.uris[xsi].add_prefix("xsi");
        for name in XSI_LOCAL_NAMES {
            context.uris[xsi].add_qname(name);
        }
        context
    }

    /// The schema-informed partitions: the core entries plus the XML
    /// Schema namespace with its built-in type names.
    pub fn schema_entries() -> Self {
        let mut context = Self::core_entries();
        let xsd = context.add_uri(XSD_NAMESPACE_URI);
        for name in XSD_LOCAL_NAMES {
            context.uris[xsd].add_qname(name);
        }
        context
    }

    /// Number of interned URIs.
    pub fn number_of_uris(&self) -> usize {
        self.uris.len()
    }

    /// URI partition lookup by id.
    pub fn uri(&self, uri_id: usize) -> Option<&UriContext> {
        self.uris.get(uri_id)
    }

    /// Mutable URI partition lookup by id.
    pub fn uri_mut(&mut self, uri_id: usize) -> Option<&mut UriContext> {
        self.uris.get_mut(uri_id)
    }

    /// URI id lookup by string.
    pub fn uri_id(&self, uri: &str) -> Option<usize> {
        self.uris.iter().position(|u| u.uri == uri)
    }

    /// Interns a namespace URI, returning its id. The prefix and
    /// local-name partitions of a runtime URI start out empty.
    pub fn add_uri(&mut self, uri: &str) -> usize {
        let id = self.uris.len();
        self.uris.push(UriContext::new(id, uri.to_string()));
        id
    }

    /// Qualified-name lookup by id pair.
    pub fn qname(&self, id: QNameId) -> Option<&QNameContext> {
        self.uris.get(id.uri_id).and_then(|u| u.qname(id.local_name_id))
    }

    /// Mutable qualified-name lookup by id pair.
    pub fn qname_mut(&mut self, id: QNameId) -> Option<&mut QNameContext> {
        self.uris
            .get_mut(id.uri_id)
            .and_then(|u| u.qname_mut(id.local_name_id))
    }

    /// Looks up `(uri, local_name)`, interning both when missing, and
    /// returns the dense id.
    pub fn intern(&mut self, uri: &str, local_name: &str) -> QNameId {
        let uri_id = match self.uri_id(uri) {
            Some(id) => id,
            None => self.add_uri(uri),
        };
        match self.uris[uri_id].qname_by_name(local_name) {
            Some(q) => q.id(),
            None => self.uris[uri_id].add_qname(local_name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn core_entries_match_the_initial_partitions() {
        let context = GrammarContext::core_entries();
        assert_eq!(context.number_of_uris(), 3);
        assert_eq!(context.uri_id(""), Some(0));
        assert_eq!(context.uri_id(XML_NAMESPACE_URI), Some(1));
        assert_eq!(context.uri_id(XSI_NAMESPACE_URI), Some(2));
        assert_eq!(context.uri(1).unwrap().qname_by_name("space").is_some(), true);
        assert_eq!(context.uri(2).unwrap().number_of_qnames(), 2);
        assert_eq!(context.uri(2).unwrap().prefix(0), Some("xsi"));
    }

    #[test]
    fn schema_entries_add_the_xsd_partition() {
        let context = GrammarContext::schema_entries();
        assert_eq!(context.number_of_uris(), 4);
        let xsd = context.uri(3).unwrap();
        assert_eq!(xsd.number_of_qnames(), 46);
        // The partition is sorted, ids are positions.
        assert_eq!(xsd.qname_by_name("boolean").unwrap().id().local_name_id, 15);
    }

    #[test]
    fn intern_is_idempotent_and_dense() {
        let mut context = GrammarContext::core_entries();
        let a = context.intern("urn:example", "doc");
        let b = context.intern("urn:example", "item");
        let again = context.intern("urn:example", "doc");
        assert_eq!(a, again);
        assert_eq!(a.uri_id, 3);
        assert_eq!(a.local_name_id, 0);
        assert_eq!(b.local_name_id, 1);
    }

    #[test]
    fn default_prefixes_follow_the_uri_id() {
        let mut context = GrammarContext::core_entries();
        let id = context.intern("urn:example", "doc");
        assert_eq!(context.qname(id).unwrap().default_prefix(), "ns3");
        let nil = context.intern(XSI_NAMESPACE_URI, "nil");
        assert_eq!(context.qname(nil).unwrap().default_prefix(), "xsi");
    }

    #[test]
    fn prefix_lookup_misses_return_none() {
        let context = GrammarContext::core_entries();
        assert_eq!(context.uri(0).unwrap().prefix_id("xs"), None);
        assert_eq!(context.uri(1).unwrap().prefix_id("xml"), Some(0));
    }
}
