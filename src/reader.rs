//! Contains the high level stream decoder, the [`Reader`].

use std::io::Read;
use std::sync::Arc;

use delegate::delegate;

use crate::channel::{
    AnyDecoderChannel, BitDecoderChannel, ByteDecoderChannel, DecoderChannel,
};
use crate::context::{GrammarContext, QNameId, XSI_NAMESPACE_URI};
use crate::datatypes::Datatype;
use crate::errors::ErrorKind;
use crate::events::{Event, EventKind};
use crate::grammar::builtin::GrammarPool;
use crate::grammar::{
    code_width, second_level_events, third_level_events, GrammarId, GrammarLabel, Grammars,
    ThirdLevelEvent, UndeclaredEvent,
};
use crate::header;
use crate::options::{CodingMode, Options};
use crate::reader::builder::ReaderBuilder;
use crate::table::StringTable;
use crate::values::{BooleanValue, QNameValue, Value};
use crate::{Error, Result};

pub mod builder;

/// A fully decoded event with owned payload, as returned by
/// [`Reader::read_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Document start.
    StartDocument,
    /// Document end. The stream is exhausted after this.
    EndDocument,
    /// An element start.
    StartElement {
        /// Namespace URI.
        uri: String,
        /// Local name.
        local_name: String,
        /// Prefix, present when prefixes are preserved.
        prefix: Option<String>,
    },
    /// The end of the innermost open element.
    EndElement {
        /// Namespace URI.
        uri: String,
        /// Local name.
        local_name: String,
    },
    /// One attribute of the current element.
    Attribute {
        /// Namespace URI.
        uri: String,
        /// Local name.
        local_name: String,
        /// Prefix, present when prefixes are preserved.
        prefix: Option<String>,
        /// The decoded value.
        value: Value,
    },
    /// Character content.
    Characters(Value),
    /// A namespace declaration.
    NamespaceDeclaration {
        /// Declared URI.
        uri: String,
        /// Declared prefix.
        prefix: String,
        /// Whether the declaration covers the element name itself.
        element_scope: bool,
    },
    /// A comment.
    Comment(String),
    /// A processing instruction.
    ProcessingInstruction {
        /// The PI target.
        target: String,
        /// The PI data.
        data: String,
    },
    /// A DOCTYPE declaration.
    DocType {
        /// Root element name.
        name: String,
        /// Public identifier.
        public_id: String,
        /// System identifier.
        system_id: String,
        /// Internal subset text.
        text: String,
    },
    /// An entity reference.
    EntityReference(String),
}

/// The event code already read by [`Reader::next`], waiting for its
/// payload decoder.
enum Pending {
    Declared { code: usize },
    Undeclared(UndeclaredEvent),
    Third(ThirdLevelEvent),
}

/// A grammar-driven stream decoder.
///
/// [`Reader::next`] reads the next event code and reports its kind; the
/// matching `decode_*` method then consumes the payload and applies the
/// same table and grammar mutations the encoder applied. The convenience
/// [`Reader::read_event`] does both in one call.
///
/// # Examples
///
/// ```
/// use quick_exi::{Reader, StreamEvent, Value, Writer};
///
/// let mut out = Vec::new();
/// let mut writer = Writer::from_writer(&mut out).unwrap();
/// writer.encode_start_document().unwrap();
/// writer.encode_start_element("", "greeting", None).unwrap();
/// writer.encode_characters(&Value::from("hi")).unwrap();
/// writer.encode_end_element().unwrap();
/// writer.encode_end_document().unwrap();
///
/// let mut reader = Reader::from_reader(out.as_slice()).unwrap();
/// loop {
///     let (event, has_more) = reader.read_event().unwrap();
///     if let StreamEvent::Characters(value) = &event {
///         assert_eq!(value.to_string(), "hi");
///     }
///     if !has_more {
///         break;
///     }
/// }
/// ```
pub struct Reader<R> {
    channel: AnyDecoderChannel<R>,
    options: Options,
    pool: GrammarPool,
    context: GrammarContext,
    table: StringTable,
    current: GrammarId,
    stack: Vec<(GrammarId, QNameId)>,
    pending: Option<Pending>,
    finished: bool,
    poisoned: Option<ErrorKind>,
}

impl Reader<()> {
    /// Create a new builder for configuring a reader.
    pub fn builder() -> ReaderBuilder {
        ReaderBuilder::new()
    }
}

/// Builder methods
impl<R: Read> Reader<R> {
    /// Creates a reader with default options over `source`. The header
    /// is consumed here; an options document in it reconfigures the
    /// reader before the first event.
    pub fn from_reader(source: R) -> Result<Self> {
        ReaderBuilder::new().into_reader(source)
    }

    pub(crate) fn with_options(
        source: R,
        mut options: Options,
        grammars: Option<Arc<Grammars>>,
    ) -> Result<Self> {
        options.validate()?;
        let mut bits = BitDecoderChannel::new(source);
        header::read_header(&mut bits, &mut options)?;
        options.validate()?;

        let channel = match options.coding_mode {
            CodingMode::BitPacked => AnyDecoderChannel::Bit(bits),
            CodingMode::BytePacked => {
                // The encoder padded the header to an octet boundary.
                bits.align()?;
                AnyDecoderChannel::Byte(ByteDecoderChannel::new(bits.into_inner()))
            }
            CodingMode::PreCompression | CodingMode::Compression => {
                return Err(Error::Unsupported(
                    "pre-compression and compression stream decoding",
                ))
            }
        };

        let grammars = grammars.unwrap_or_else(Grammars::schema_less);
        let context = grammars.context().clone();
        let table = StringTable::new(
            options.value_max_length,
            options.value_partition_capacity,
            options.local_value_partitions,
            &options.shared_strings,
        );
        let current = if options.fragment {
            grammars.fragment()
        } else {
            grammars.document()
        };
        let pool = GrammarPool::new(
            grammars,
            options.max_built_in_element_grammars,
            options.max_built_in_productions,
        );
        Ok(Reader {
            channel,
            options,
            pool,
            context,
            table,
            current,
            stack: Vec::new(),
            pending: None,
            finished: false,
            poisoned: None,
        })
    }
}

/// Getters
impl<R> Reader<R> {
    delegate! {
        to self.table {
            /// Number of entries currently in the global value partition.
            #[call(global_size)]
            pub fn global_value_count(&self) -> usize;
        }
    }

    /// Depth of the open element stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Has the end of the document been decoded?
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Read methods
impl<R: Read> Reader<R> {
    /// Reads the next event code and reports what follows. The returned
    /// flag is `false` exactly when the event is the document end.
    ///
    /// The payload of the reported event must be consumed with the
    /// matching `decode_*` call before `next` may be called again.
    pub fn next(&mut self) -> Result<(EventKind, bool)> {
        self.guard(|r| {
            if r.finished {
                return Err(Error::Protocol("document already finished".to_string()));
            }
            if r.pending.is_some() {
                return Err(Error::Protocol(
                    "previous event has not been decoded yet".to_string(),
                ));
            }
            let second = r.second_level();
            let grammar = r.pool.grammar(r.current);
            let width1 = grammar.first_level_width(!second.is_empty());
            let declared_count = grammar.productions().len();

            let code = r.channel.decode_n_bit_unsigned_integer(width1)? as usize;
            if code < declared_count {
                let kind = r.declared_kind(code)?;
                r.pending = Some(Pending::Declared { code });
                return Ok((kind, kind != EventKind::EndDocument));
            }
            if code != declared_count || second.is_empty() {
                return Err(Error::Protocol("event code out of range".to_string()));
            }
            let code2 = r
                .channel
                .decode_n_bit_unsigned_integer(code_width(second.len()))?
                as usize;
            let undeclared = *second
                .get(code2)
                .ok_or_else(|| Error::Protocol("event code out of range".to_string()))?;
            if undeclared == UndeclaredEvent::ThirdLevel {
                let third = third_level_events(&r.options.fidelity);
                let code3 = r
                    .channel
                    .decode_n_bit_unsigned_integer(code_width(third.len()))?
                    as usize;
                let event = *third
                    .get(code3)
                    .ok_or_else(|| Error::Protocol("event code out of range".to_string()))?;
                let kind = match event {
                    ThirdLevelEvent::Comment => EventKind::Comment,
                    ThirdLevelEvent::ProcessingInstruction => EventKind::ProcessingInstruction,
                };
                r.pending = Some(Pending::Third(event));
                return Ok((kind, true));
            }
            let kind = match undeclared {
                UndeclaredEvent::EndElement => EventKind::EndElementUndeclared,
                UndeclaredEvent::AttributeXsiType => EventKind::AttributeXsiType,
                UndeclaredEvent::AttributeXsiNil => EventKind::AttributeXsiNil,
                UndeclaredEvent::AttributeGeneric => EventKind::AttributeGenericUndeclared,
                UndeclaredEvent::NamespaceDeclaration => EventKind::NamespaceDeclaration,
                UndeclaredEvent::SelfContained => EventKind::SelfContained,
                UndeclaredEvent::StartElementGeneric => {
                    EventKind::StartElementGenericUndeclared
                }
                UndeclaredEvent::Characters => EventKind::CharactersGenericUndeclared,
                UndeclaredEvent::EntityReference => EventKind::EntityReference,
                UndeclaredEvent::DocType => EventKind::DocType,
                UndeclaredEvent::ThirdLevel => {
                    return Err(Error::Protocol("event code out of range".to_string()))
                }
            };
            r.pending = Some(Pending::Undeclared(undeclared));
            Ok((kind, true))
        })
    }

    /// Reads and fully decodes the next event.
    pub fn read_event(&mut self) -> Result<(StreamEvent, bool)> {
        let (kind, has_more) = self.next()?;
        let event = match kind {
            EventKind::StartDocument => {
                self.decode_start_document()?;
                StreamEvent::StartDocument
            }
            EventKind::EndDocument => {
                self.decode_end_document()?;
                StreamEvent::EndDocument
            }
            EventKind::StartElement
            | EventKind::StartElementNs
            | EventKind::StartElementGeneric
            | EventKind::StartElementGenericUndeclared => {
                let (uri, local_name, prefix) = self.decode_start_element()?;
                StreamEvent::StartElement {
                    uri,
                    local_name,
                    prefix,
                }
            }
            EventKind::EndElement | EventKind::EndElementUndeclared => {
                let (uri, local_name) = self.decode_end_element()?;
                StreamEvent::EndElement { uri, local_name }
            }
            EventKind::Attribute
            | EventKind::AttributeXsiType
            | EventKind::AttributeXsiNil
            | EventKind::AttributeNs
            | EventKind::AttributeGeneric
            | EventKind::AttributeInvalidValue
            | EventKind::AttributeAnyInvalidValue
            | EventKind::AttributeGenericUndeclared => {
                let (uri, local_name, prefix, value) = self.decode_attribute()?;
                StreamEvent::Attribute {
                    uri,
                    local_name,
                    prefix,
                    value,
                }
            }
            EventKind::Characters
            | EventKind::CharactersGeneric
            | EventKind::CharactersGenericUndeclared => {
                StreamEvent::Characters(self.decode_characters()?)
            }
            EventKind::NamespaceDeclaration => {
                let (uri, prefix, element_scope) = self.decode_namespace_declaration()?;
                StreamEvent::NamespaceDeclaration {
                    uri,
                    prefix,
                    element_scope,
                }
            }
            EventKind::Comment => StreamEvent::Comment(self.decode_comment()?),
            EventKind::ProcessingInstruction => {
                let (target, data) = self.decode_processing_instruction()?;
                StreamEvent::ProcessingInstruction { target, data }
            }
            EventKind::DocType => {
                let (name, public_id, system_id, text) = self.decode_doc_type()?;
                StreamEvent::DocType {
                    name,
                    public_id,
                    system_id,
                    text,
                }
            }
            EventKind::EntityReference => {
                StreamEvent::EntityReference(self.decode_entity_reference()?)
            }
            EventKind::SelfContained => {
                return Err(Error::Unsupported("self-contained elements"))
            }
        };
        Ok((event, has_more))
    }

    /// Consumes the document start.
    pub fn decode_start_document(&mut self) -> Result<()> {
        self.guard(|r| {
            let (event, next) = r.declared_event()?;
            match event {
                Event::StartDocument => {
                    r.current = next;
                    Ok(())
                }
                _ => Err(Error::Protocol("pending event is not SD".to_string())),
            }
        })
    }

    /// Consumes the document end.
    pub fn decode_end_document(&mut self) -> Result<()> {
        self.guard(|r| {
            let (event, _) = r.declared_event()?;
            match event {
                Event::EndDocument => {
                    r.finished = true;
                    Ok(())
                }
                _ => Err(Error::Protocol("pending event is not ED".to_string())),
            }
        })
    }

    /// Consumes an element start, returning URI, local name and prefix.
    pub fn decode_start_element(&mut self) -> Result<(String, String, Option<String>)> {
        self.guard(|r| match r.take_pending()? {
            Pending::Declared { code } => {
                let production = r
                    .pool
                    .grammar(r.current)
                    .production(code)
                    .cloned()
                    .ok_or_else(|| Error::Protocol("event code out of range".to_string()))?;
                match production.event {
                    Event::StartElement { qname, grammar } => {
                        let prefix = r.decode_qname_prefix(qname.uri_id)?;
                        let (uri, local_name) = r.qname_strings(qname)?;
                        r.stack.push((production.next, qname));
                        r.current = grammar;
                        Ok((uri, local_name, prefix))
                    }
                    Event::StartElementNs { uri_id } => {
                        let qname = r.decode_local_name(uri_id)?;
                        let prefix = r.decode_qname_prefix(uri_id)?;
                        let (uri, local_name) = r.qname_strings(qname)?;
                        let child = r.pool.element_grammar(qname);
                        r.stack.push((production.next, qname));
                        r.current = child;
                        Ok((uri, local_name, prefix))
                    }
                    Event::StartElementGeneric => {
                        let qname = r.decode_qname()?;
                        let prefix = r.decode_qname_prefix(qname.uri_id)?;
                        let (uri, local_name) = r.qname_strings(qname)?;
                        let child = r.pool.element_grammar(qname);
                        r.stack.push((production.next, qname));
                        r.current = child;
                        Ok((uri, local_name, prefix))
                    }
                    _ => Err(Error::Protocol("pending event is not SE".to_string())),
                }
            }
            Pending::Undeclared(UndeclaredEvent::StartElementGeneric) => {
                let qname = r.decode_qname()?;
                let prefix = r.decode_qname_prefix(qname.uri_id)?;
                let (uri, local_name) = r.qname_strings(qname)?;
                let child = r.pool.element_grammar(qname);
                let continuation = r.content_continuation(r.current);
                r.pool.learn(
                    r.current,
                    Event::StartElement {
                        qname,
                        grammar: child,
                    },
                    continuation,
                );
                r.stack.push((continuation, qname));
                r.current = child;
                Ok((uri, local_name, prefix))
            }
            _ => Err(Error::Protocol("pending event is not SE".to_string())),
        })
    }

    /// Consumes an attribute, returning URI, local name, prefix and the
    /// decoded value.
    pub fn decode_attribute(&mut self) -> Result<(String, String, Option<String>, Value)> {
        self.guard(|r| match r.take_pending()? {
            Pending::Declared { code } => {
                let production = r
                    .pool
                    .grammar(r.current)
                    .production(code)
                    .cloned()
                    .ok_or_else(|| Error::Protocol("event code out of range".to_string()))?;
                match production.event {
                    Event::Attribute { qname, datatype } => {
                        let prefix = r.decode_qname_prefix(qname.uri_id)?;
                        let value = r.decode_typed_value(qname, &datatype)?;
                        let (uri, local_name) = r.qname_strings(qname)?;
                        r.current = production.next;
                        Ok((uri, local_name, prefix, value))
                    }
                    Event::AttributeNs { uri_id } => {
                        let qname = r.decode_local_name(uri_id)?;
                        let prefix = r.decode_qname_prefix(uri_id)?;
                        let value = r.decode_value(qname)?;
                        let (uri, local_name) = r.qname_strings(qname)?;
                        r.current = production.next;
                        Ok((uri, local_name, prefix, value))
                    }
                    Event::AttributeGeneric => {
                        let qname = r.decode_qname()?;
                        let prefix = r.decode_qname_prefix(qname.uri_id)?;
                        let value = r.decode_value(qname)?;
                        let (uri, local_name) = r.qname_strings(qname)?;
                        r.current = production.next;
                        Ok((uri, local_name, prefix, value))
                    }
                    _ => Err(Error::Protocol("pending event is not AT".to_string())),
                }
            }
            Pending::Undeclared(UndeclaredEvent::AttributeGeneric) => {
                let qname = r.decode_qname()?;
                let prefix = r.decode_qname_prefix(qname.uri_id)?;
                let value = r.decode_value(qname)?;
                let (uri, local_name) = r.qname_strings(qname)?;
                r.pool.learn(
                    r.current,
                    Event::Attribute {
                        qname,
                        datatype: Datatype::String,
                    },
                    r.current,
                );
                Ok((uri, local_name, prefix, value))
            }
            Pending::Undeclared(UndeclaredEvent::AttributeXsiType) => {
                let qname = r.decode_qname()?;
                let (type_uri, type_local) = r.qname_strings(qname)?;
                if let Some(type_grammar) =
                    r.context.qname(qname).and_then(|q| q.type_grammar())
                {
                    r.current = type_grammar;
                }
                let value = Value::QName(QNameValue::new(type_uri, type_local, None));
                Ok((
                    XSI_NAMESPACE_URI.to_string(),
                    "type".to_string(),
                    None,
                    value,
                ))
            }
            Pending::Undeclared(UndeclaredEvent::AttributeXsiNil) => {
                let nil = r.channel.decode_boolean()?;
                Ok((
                    XSI_NAMESPACE_URI.to_string(),
                    "nil".to_string(),
                    None,
                    Value::Boolean(BooleanValue::from_bool(nil)),
                ))
            }
            _ => Err(Error::Protocol("pending event is not AT".to_string())),
        })
    }

    /// Consumes character content.
    pub fn decode_characters(&mut self) -> Result<Value> {
        self.guard(|r| match r.take_pending()? {
            Pending::Declared { code } => {
                let production = r
                    .pool
                    .grammar(r.current)
                    .production(code)
                    .cloned()
                    .ok_or_else(|| Error::Protocol("event code out of range".to_string()))?;
                let qname = r.element_qname()?;
                let value = match production.event {
                    Event::Characters { datatype } => r.decode_typed_value(qname, &datatype)?,
                    Event::CharactersGeneric => r.decode_value(qname)?,
                    _ => return Err(Error::Protocol("pending event is not CH".to_string())),
                };
                r.current = production.next;
                Ok(value)
            }
            Pending::Undeclared(UndeclaredEvent::Characters) => {
                let qname = r.element_qname()?;
                let value = r.decode_value(qname)?;
                let continuation = r.content_continuation(r.current);
                r.pool
                    .learn(r.current, Event::CharactersGeneric, continuation);
                r.current = continuation;
                Ok(value)
            }
            _ => Err(Error::Protocol("pending event is not CH".to_string())),
        })
    }

    /// Consumes an element end, returning the name of the closed
    /// element.
    pub fn decode_end_element(&mut self) -> Result<(String, String)> {
        self.guard(|r| {
            match r.take_pending()? {
                Pending::Declared { code } => {
                    let production = r
                        .pool
                        .grammar(r.current)
                        .production(code)
                        .cloned()
                        .ok_or_else(|| Error::Protocol("event code out of range".to_string()))?;
                    if !matches!(production.event, Event::EndElement) {
                        return Err(Error::Protocol("pending event is not EE".to_string()));
                    }
                }
                Pending::Undeclared(UndeclaredEvent::EndElement) => {
                    let continuation = r.content_continuation(r.current);
                    r.pool.learn(r.current, Event::EndElement, continuation);
                }
                _ => return Err(Error::Protocol("pending event is not EE".to_string())),
            }
            let (continuation, qname) = r.stack.pop().ok_or_else(|| {
                Error::Protocol("end of element without open element".to_string())
            })?;
            r.current = continuation;
            r.qname_strings(qname)
        })
    }

    /// Consumes a namespace declaration.
    pub fn decode_namespace_declaration(&mut self) -> Result<(String, String, bool)> {
        self.guard(|r| match r.take_pending()? {
            Pending::Undeclared(UndeclaredEvent::NamespaceDeclaration) => {
                let uri_id = r.decode_uri()?;
                let uri_context = r
                    .context
                    .uri(uri_id)
                    .ok_or_else(|| Error::Protocol("uri id out of range".to_string()))?;
                let width = code_width(uri_context.number_of_prefixes() + 1);
                let code = r.channel.decode_n_bit_unsigned_integer(width)? as usize;
                let prefix = if code == 0 {
                    let prefix = r.channel.decode_string()?;
                    let uri_context = r
                        .context
                        .uri_mut(uri_id)
                        .ok_or_else(|| Error::Protocol("uri id out of range".to_string()))?;
                    uri_context.add_prefix(&prefix);
                    prefix
                } else {
                    r.context
                        .uri(uri_id)
                        .and_then(|u| u.prefix(code - 1))
                        .ok_or_else(|| Error::Protocol("prefix id out of range".to_string()))?
                        .to_string()
                };
                let element_scope = r.channel.decode_boolean()?;
                let uri = r
                    .context
                    .uri(uri_id)
                    .map(|u| u.uri().to_string())
                    .unwrap_or_default();
                Ok((uri, prefix, element_scope))
            }
            _ => Err(Error::Protocol("pending event is not NS".to_string())),
        })
    }

    /// Consumes a comment.
    pub fn decode_comment(&mut self) -> Result<String> {
        self.guard(|r| match r.take_pending()? {
            Pending::Third(ThirdLevelEvent::Comment) => {
                let text = r.channel.decode_string()?;
                r.current = r.content_continuation(r.current);
                Ok(text)
            }
            _ => Err(Error::Protocol("pending event is not CM".to_string())),
        })
    }

    /// Consumes a processing instruction, returning target and data.
    pub fn decode_processing_instruction(&mut self) -> Result<(String, String)> {
        self.guard(|r| match r.take_pending()? {
            Pending::Third(ThirdLevelEvent::ProcessingInstruction) => {
                let target = r.channel.decode_string()?;
                let data = r.channel.decode_string()?;
                r.current = r.content_continuation(r.current);
                Ok((target, data))
            }
            _ => Err(Error::Protocol("pending event is not PI".to_string())),
        })
    }

    /// Consumes a DOCTYPE declaration, returning name, public id,
    /// system id and internal subset.
    pub fn decode_doc_type(&mut self) -> Result<(String, String, String, String)> {
        self.guard(|r| match r.take_pending()? {
            Pending::Undeclared(UndeclaredEvent::DocType) => Ok((
                r.channel.decode_string()?,
                r.channel.decode_string()?,
                r.channel.decode_string()?,
                r.channel.decode_string()?,
            )),
            _ => Err(Error::Protocol("pending event is not DT".to_string())),
        })
    }

    /// Consumes an entity reference, returning its name.
    pub fn decode_entity_reference(&mut self) -> Result<String> {
        self.guard(|r| match r.take_pending()? {
            Pending::Undeclared(UndeclaredEvent::EntityReference) => {
                let name = r.channel.decode_string()?;
                r.current = r.content_continuation(r.current);
                Ok(name)
            }
            _ => Err(Error::Protocol("pending event is not ER".to_string())),
        })
    }
}

/// Private methods
impl<R: Read> Reader<R> {
    fn guard<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if let Some(kind) = self.poisoned {
            return Err(Error::Poisoned(kind));
        }
        let result = f(self);
        if let Err(err) = &result {
            self.poisoned = Some(err.kind());
        }
        result
    }

    fn take_pending(&mut self) -> Result<Pending> {
        self.pending
            .take()
            .ok_or_else(|| Error::Protocol("no event pending, call next() first".to_string()))
    }

    fn second_level(&self) -> Vec<UndeclaredEvent> {
        second_level_events(
            self.pool.grammar(self.current),
            self.pool.is_schema_informed(),
            &self.options.fidelity,
        )
    }

    /// Pops the pending first-level production, returning its event and
    /// successor.
    fn declared_event(&mut self) -> Result<(Event, GrammarId)> {
        match self.take_pending()? {
            Pending::Declared { code } => {
                let production = self
                    .pool
                    .grammar(self.current)
                    .production(code)
                    .cloned()
                    .ok_or_else(|| Error::Protocol("event code out of range".to_string()))?;
                Ok((production.event, production.next))
            }
            _ => Err(Error::Protocol(
                "pending event is not a declared production".to_string(),
            )),
        }
    }

    /// API kind of the first-level production at `code`, the `xsi`
    /// attribute names surfaced under their own discriminators.
    fn declared_kind(&self, code: usize) -> Result<EventKind> {
        let production = self
            .pool
            .grammar(self.current)
            .production(code)
            .ok_or_else(|| Error::Protocol("event code out of range".to_string()))?;
        if let Event::Attribute { qname, .. } = &production.event {
            if let Some(context) = self.context.qname(*qname) {
                if self.context.uri(qname.uri_id).map(|u| u.uri()) == Some(XSI_NAMESPACE_URI) {
                    match context.local_name() {
                        "nil" => return Ok(EventKind::AttributeXsiNil),
                        "type" => return Ok(EventKind::AttributeXsiType),
                        _ => {}
                    }
                }
            }
        }
        Ok(production.event.kind())
    }

    /// State an undeclared content event leaves the element in: a
    /// built-in tag moves to its content grammar, everything else stays.
    fn content_continuation(&self, current: GrammarId) -> GrammarId {
        let grammar = self.pool.grammar(current);
        match grammar.label() {
            GrammarLabel::StartTag | GrammarLabel::FirstStartTag
                if self.pool.is_overlay(current) =>
            {
                self.pool.content_grammar_of(current)
            }
            _ => current,
        }
    }

    fn element_qname(&self) -> Result<QNameId> {
        self.stack
            .last()
            .map(|(_, qname)| *qname)
            .ok_or_else(|| Error::Protocol("character content outside an element".to_string()))
    }

    fn qname_strings(&self, qname: QNameId) -> Result<(String, String)> {
        let uri = self
            .context
            .uri(qname.uri_id)
            .ok_or_else(|| Error::Protocol("uri id out of range".to_string()))?;
        let local = uri
            .qname(qname.local_name_id)
            .ok_or_else(|| Error::Protocol("local name id out of range".to_string()))?;
        Ok((uri.uri().to_string(), local.local_name().to_string()))
    }

    fn decode_uri(&mut self) -> Result<usize> {
        let width = code_width(self.context.number_of_uris() + 1);
        let code = self.channel.decode_n_bit_unsigned_integer(width)? as usize;
        if code == 0 {
            let uri = self.channel.decode_string()?;
            Ok(self.context.add_uri(&uri))
        } else {
            Ok(code - 1)
        }
    }

    fn decode_local_name(&mut self, uri_id: usize) -> Result<QNameId> {
        let length = self.channel.decode_unsigned_integer()?;
        let Self {
            channel, context, ..
        } = self;
        let uri_context = context
            .uri_mut(uri_id)
            .ok_or_else(|| Error::Protocol("uri id out of range".to_string()))?;
        if length == 0 {
            let width = code_width(uri_context.number_of_qnames());
            let id = channel.decode_n_bit_unsigned_integer(width)? as usize;
            uri_context
                .qname(id)
                .map(|q| q.id())
                .ok_or_else(|| Error::Protocol("local name id out of range".to_string()))
        } else {
            let name = channel.decode_characters(length as usize - 1)?;
            Ok(uri_context.add_qname(&name))
        }
    }

    fn decode_qname(&mut self) -> Result<QNameId> {
        let uri_id = self.decode_uri()?;
        self.decode_local_name(uri_id)
    }

    /// Compact prefix id, read only when prefixes are preserved and the
    /// URI has more than one known prefix.
    fn decode_qname_prefix(&mut self, uri_id: usize) -> Result<Option<String>> {
        if !self.options.fidelity.prefixes {
            return Ok(None);
        }
        let uri_context = self
            .context
            .uri(uri_id)
            .ok_or_else(|| Error::Protocol("uri id out of range".to_string()))?;
        let count = uri_context.number_of_prefixes();
        if count == 0 {
            return Ok(None);
        }
        let width = code_width(count);
        let id = if width == 0 {
            0
        } else {
            self.channel.decode_n_bit_unsigned_integer(width)? as usize
        };
        Ok(self
            .context
            .uri(uri_id)
            .and_then(|u| u.prefix(id))
            .map(str::to_string))
    }

    /// String-table coded value content.
    fn decode_value(&mut self, qname: QNameId) -> Result<Value> {
        let Self { channel, table, .. } = self;
        let code = channel.decode_unsigned_integer()?;
        match code {
            0 => {
                let width = code_width(table.local_size(qname));
                let id = channel.decode_n_bit_unsigned_integer(width)? as usize;
                table
                    .local_value(qname, id)
                    .map(|s| Value::String(s.to_string()))
                    .ok_or_else(|| Error::Protocol("local value id out of range".to_string()))
            }
            1 => {
                let width = code_width(table.global_size());
                let id = channel.decode_n_bit_unsigned_integer(width)? as usize;
                table
                    .global_value(id)
                    .map(|s| Value::String(s.to_string()))
                    .ok_or_else(|| Error::Protocol("global value id out of range".to_string()))
            }
            length => {
                let text = channel.decode_characters(length as usize - 2)?;
                table.add(qname, &text);
                Ok(Value::String(text))
            }
        }
    }

    fn decode_typed_value(&mut self, qname: QNameId, datatype: &Datatype) -> Result<Value> {
        if self.options.fidelity.lexical_values || datatype.is_string_coded() {
            self.decode_value(qname)
        } else {
            datatype.decode(&mut self.channel)
        }
    }
}
