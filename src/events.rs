//! The closed event vocabulary of a stream.

use crate::context::QNameId;
use crate::datatypes::Datatype;
use crate::grammar::GrammarId;

/// Discriminator of the next thing in a stream, as surfaced to the
/// application. Declared and undeclared (second-level) occurrences of
/// the same construct are distinguished because their payload coding
/// differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Document start.
    StartDocument,
    /// Document end.
    EndDocument,
    /// Start of an element declared by the grammar.
    StartElement,
    /// Start of an element matched by namespace wildcard.
    StartElementNs,
    /// Start of an element matched by the generic wildcard.
    StartElementGeneric,
    /// Start of an element through the undeclared second level.
    StartElementGenericUndeclared,
    /// End of the current element.
    EndElement,
    /// End of the current element through the undeclared second level.
    EndElementUndeclared,
    /// A declared attribute.
    Attribute,
    /// The `xsi:type` attribute.
    AttributeXsiType,
    /// The `xsi:nil` attribute.
    AttributeXsiNil,
    /// An attribute matched by namespace wildcard.
    AttributeNs,
    /// An attribute matched by the generic wildcard.
    AttributeGeneric,
    /// A declared attribute whose value failed its datatype and was
    /// written as text.
    AttributeInvalidValue,
    /// A wildcard attribute whose value failed its datatype.
    AttributeAnyInvalidValue,
    /// An attribute through the undeclared second level.
    AttributeGenericUndeclared,
    /// Declared character content.
    Characters,
    /// Character content matched by the generic production.
    CharactersGeneric,
    /// Character content through the undeclared second level.
    CharactersGenericUndeclared,
    /// A namespace declaration.
    NamespaceDeclaration,
    /// A comment.
    Comment,
    /// A DOCTYPE declaration.
    DocType,
    /// An entity reference.
    EntityReference,
    /// A processing instruction.
    ProcessingInstruction,
    /// A self-contained subtree marker.
    SelfContained,
}

/// A grammar-level event, the first component of a production.
///
/// Start-element events carry the grammar of the element they open;
/// productions store arena indices rather than references, the stream
/// owns the arena.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// SD
    StartDocument,
    /// ED
    EndDocument,
    /// SE(qname)
    StartElement {
        /// The element name.
        qname: QNameId,
        /// Grammar describing the element content.
        grammar: GrammarId,
    },
    /// SE(uri:*)
    StartElementNs {
        /// The namespace the wildcard covers.
        uri_id: usize,
    },
    /// SE(*)
    StartElementGeneric,
    /// EE
    EndElement,
    /// AT(qname)
    Attribute {
        /// The attribute name.
        qname: QNameId,
        /// Datatype of the attribute value.
        datatype: Datatype,
    },
    /// AT(uri:*)
    AttributeNs {
        /// The namespace the wildcard covers.
        uri_id: usize,
    },
    /// AT(*)
    AttributeGeneric,
    /// AT(xsi:type)
    AttributeXsiType,
    /// AT(xsi:nil)
    AttributeXsiNil,
    /// CH
    Characters {
        /// Datatype of the character content.
        datatype: Datatype,
    },
    /// CH with untyped content
    CharactersGeneric,
    /// NS
    NamespaceDeclaration,
    /// SC
    SelfContained,
    /// ER
    EntityReference,
    /// CM
    Comment,
    /// PI
    ProcessingInstruction,
    /// DT
    DocType,
}

impl Event {
    /// The discriminator this grammar event surfaces when matched at the
    /// first level.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::StartDocument => EventKind::StartDocument,
            Event::EndDocument => EventKind::EndDocument,
            Event::StartElement { .. } => EventKind::StartElement,
            Event::StartElementNs { .. } => EventKind::StartElementNs,
            Event::StartElementGeneric => EventKind::StartElementGeneric,
            Event::EndElement => EventKind::EndElement,
            Event::Attribute { .. } => EventKind::Attribute,
            Event::AttributeNs { .. } => EventKind::AttributeNs,
            Event::AttributeGeneric => EventKind::AttributeGeneric,
            Event::AttributeXsiType => EventKind::AttributeXsiType,
            Event::AttributeXsiNil => EventKind::AttributeXsiNil,
            Event::Characters { .. } => EventKind::Characters,
            Event::CharactersGeneric => EventKind::CharactersGeneric,
            Event::NamespaceDeclaration => EventKind::NamespaceDeclaration,
            Event::SelfContained => EventKind::SelfContained,
            Event::EntityReference => EventKind::EntityReference,
            Event::Comment => EventKind::Comment,
            Event::ProcessingInstruction => EventKind::ProcessingInstruction,
            Event::DocType => EventKind::DocType,
        }
    }
}
