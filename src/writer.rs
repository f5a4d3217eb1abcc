//! Contains the high level stream encoder, the [`Writer`].

use std::io::Write;
use std::sync::Arc;

use tracing::trace;

use crate::attributes::{Attribute, AttributeList};
use crate::channel::{
    AnyEncoderChannel, BitEncoderChannel, ByteEncoderChannel, EncoderChannel,
};
use crate::context::{GrammarContext, QNameId};
use crate::datatypes::Datatype;
use crate::errors::ErrorKind;
use crate::events::Event;
use crate::grammar::builtin::GrammarPool;
use crate::grammar::{
    code_width, second_level_events, third_level_events, GrammarId, GrammarLabel, Grammars,
    ThirdLevelEvent, UndeclaredEvent,
};
use crate::header;
use crate::options::{CodingMode, Options};
use crate::table::{StringTable, ValueHit};
use crate::values::{BooleanValue, Value};
use crate::writer::builder::WriterBuilder;
use crate::{Error, Result};

pub mod builder;

/// A grammar-driven stream encoder.
///
/// Events are pushed in document order; the writer validates each one by
/// transitioning its grammar, emits the event code and payload through
/// the alignment channel and mutates the symbol tables afterwards. The
/// first event writes the stream header. Any error poisons the writer:
/// every later call reports the kind of the first failure.
///
/// # Examples
///
/// ```
/// use quick_exi::{AttributeList, Value, Writer};
///
/// let mut out = Vec::new();
/// let mut writer = Writer::from_writer(&mut out).unwrap();
/// writer.encode_start_document().unwrap();
/// writer.encode_start_element("", "greeting", None).unwrap();
/// writer.encode_attribute_list(&AttributeList::new()).unwrap();
/// writer.encode_characters(&Value::from("hi")).unwrap();
/// writer.encode_end_element().unwrap();
/// writer.encode_end_document().unwrap();
/// assert!(!out.is_empty());
/// ```
pub struct Writer<W> {
    sink: Option<W>,
    channel: Option<AnyEncoderChannel<W>>,
    options: Options,
    pool: GrammarPool,
    context: GrammarContext,
    table: StringTable,
    current: GrammarId,
    /// Open elements: the state to resume after EE and the element name.
    stack: Vec<(GrammarId, QNameId)>,
    finished: bool,
    poisoned: Option<ErrorKind>,
}

impl<W> std::fmt::Debug for Writer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("current", &self.current)
            .field("finished", &self.finished)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

/// How an outgoing event left the grammar.
enum Outcome {
    /// Matched a first-level production.
    Declared { code: usize, width: usize },
    /// Went through the second-level escape.
    Undeclared { index: usize },
    /// Went through the third level.
    Third { index: usize },
}

impl Writer<()> {
    /// Create a new builder for configuring a writer.
    pub fn builder() -> WriterBuilder {
        WriterBuilder::new()
    }
}

/// Builder methods
impl<W: Write> Writer<W> {
    /// Creates a writer with default options feeding `sink`.
    pub fn from_writer(sink: W) -> Result<Self> {
        WriterBuilder::new().into_writer(sink)
    }

    pub(crate) fn with_options(
        sink: W,
        mut options: Options,
        grammars: Option<Arc<Grammars>>,
    ) -> Result<Self> {
        options.validate()?;
        if options.coding_mode.is_compressing() {
            return Err(Error::Unsupported(
                "pre-compression and compression coding modes",
            ));
        }
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
        Ok(Writer {
            sink: Some(sink),
            channel: None,
            options,
            pool,
            context,
            table,
            current,
            stack: Vec::new(),
            finished: false,
            poisoned: None,
        })
    }
}

/// Event methods
impl<W: Write> Writer<W> {
    /// Writes the stream header. Called implicitly by the first event;
    /// calling it earlier only pins down the moment the first octets hit
    /// the sink.
    pub fn encode_header(&mut self) -> Result<()> {
        self.guard(Self::ensure_header)
    }

    /// Starts the document (or fragment). Must be the first event.
    pub fn encode_start_document(&mut self) -> Result<()> {
        self.guard(|w| {
            w.ensure_header()?;
            let outcome = w.declared_only(|e| matches!(e, Event::StartDocument), "SD")?;
            w.emit_outcome(&outcome)?;
            w.advance_declared(&outcome)?;
            Ok(())
        })
    }

    /// Ends the document and flushes the sink.
    pub fn encode_end_document(&mut self) -> Result<()> {
        self.guard(|w| {
            let outcome = w.declared_only(|e| matches!(e, Event::EndDocument), "ED")?;
            w.emit_outcome(&outcome)?;
            w.finished = true;
            w.channel_mut()?.flush()
        })
    }

    /// Starts an element. Attributes belonging to the tag follow through
    /// [`encode_attribute_list`](Writer::encode_attribute_list).
    pub fn encode_start_element(
        &mut self,
        uri: &str,
        local_name: &str,
        prefix: Option<&str>,
    ) -> Result<()> {
        self.guard(|w| w.start_element_impl(uri, local_name, prefix))
    }

    /// Emits a buffered attribute batch: namespace declarations first,
    /// then `xsi:type` and `xsi:nil`, then the remaining attributes.
    /// Under Canonical EXI or a schema-informed grammar the remainder is
    /// sorted by local name, then namespace URI; namespace declarations
    /// by prefix.
    pub fn encode_attribute_list(&mut self, attributes: &AttributeList) -> Result<()> {
        self.guard(|w| w.attribute_list_impl(attributes))
    }

    /// Emits character content. Typed grammars parse the value in their
    /// declared datatype; everything else goes through the string table.
    pub fn encode_characters(&mut self, value: &Value) -> Result<()> {
        self.guard(|w| w.characters_impl(value))
    }

    /// Ends the current element.
    pub fn encode_end_element(&mut self) -> Result<()> {
        self.guard(|w| w.end_element_impl())
    }

    /// Emits a namespace declaration. Dropped silently unless prefixes
    /// are preserved.
    pub fn encode_namespace_declaration(
        &mut self,
        uri: &str,
        prefix: &str,
        element_scope: bool,
    ) -> Result<()> {
        self.guard(|w| w.namespace_declaration_impl(uri, prefix, element_scope))
    }

    /// Emits a comment. Dropped silently unless comments are preserved.
    pub fn encode_comment(&mut self, text: &str) -> Result<()> {
        self.guard(|w| {
            if !w.options.fidelity.comments {
                return Ok(());
            }
            let outcome = w.third_level_outcome(ThirdLevelEvent::Comment)?;
            w.emit_outcome(&outcome)?;
            w.channel_field()?.encode_string(text)?;
            w.current = w.content_continuation(w.current);
            Ok(())
        })
    }

    /// Emits a processing instruction. Dropped silently unless PIs are
    /// preserved.
    pub fn encode_processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.guard(|w| {
            if !w.options.fidelity.pis {
                return Ok(());
            }
            let outcome = w.third_level_outcome(ThirdLevelEvent::ProcessingInstruction)?;
            w.emit_outcome(&outcome)?;
            let channel = w.channel_field()?;
            channel.encode_string(target)?;
            channel.encode_string(data)?;
            w.current = w.content_continuation(w.current);
            Ok(())
        })
    }

    /// Emits a DOCTYPE declaration. Dropped silently unless DTDs are
    /// preserved.
    pub fn encode_doc_type(
        &mut self,
        name: &str,
        public_id: &str,
        system_id: &str,
        text: &str,
    ) -> Result<()> {
        self.guard(|w| {
            if !w.options.fidelity.dtd {
                return Ok(());
            }
            let outcome = w.undeclared_outcome(UndeclaredEvent::DocType, "DT")?;
            w.emit_outcome(&outcome)?;
            let channel = w.channel_field()?;
            channel.encode_string(name)?;
            channel.encode_string(public_id)?;
            channel.encode_string(system_id)?;
            channel.encode_string(text)?;
            Ok(())
        })
    }

    /// Emits an entity reference. Dropped silently unless DTDs are
    /// preserved.
    pub fn encode_entity_reference(&mut self, name: &str) -> Result<()> {
        self.guard(|w| {
            if !w.options.fidelity.dtd {
                return Ok(());
            }
            let outcome = w.undeclared_outcome(UndeclaredEvent::EntityReference, "ER")?;
            w.emit_outcome(&outcome)?;
            w.channel_field()?.encode_string(name)?;
            w.current = w.content_continuation(w.current);
            Ok(())
        })
    }

    /// Self-contained subtrees are declared by the format but not
    /// produced by this implementation.
    pub fn encode_self_contained(&mut self) -> Result<()> {
        self.guard(|_| Err(Error::Unsupported("self-contained elements")))
    }

    /// Flushes the channel and the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        self.guard(|w| match w.channel.as_mut() {
            Some(channel) => channel.flush(),
            None => Ok(()),
        })
    }

    /// Flushes and returns the sink.
    pub fn into_inner(mut self) -> Result<W> {
        match (self.channel.take(), self.sink.take()) {
            (Some(channel), _) => channel.into_inner(),
            (None, Some(sink)) => Ok(sink),
            (None, None) => Err(Error::Argument("writer already dismantled".to_string())),
        }
    }
}

/// Getters
impl<W: Write> Writer<W> {
    /// Number of entries currently in the global value partition.
    pub fn global_value_count(&self) -> usize {
        self.table.global_size()
    }

    /// Depth of the open element stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Has the document been finished?
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Private methods
impl<W: Write> Writer<W> {
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

    fn ensure_header(&mut self) -> Result<()> {
        if self.channel.is_some() {
            return Ok(());
        }
        let sink = self
            .sink
            .take()
            .ok_or_else(|| Error::Argument("writer already dismantled".to_string()))?;
        let mut bits = BitEncoderChannel::new(sink);
        header::write_header(&mut bits, &self.options)?;
        let channel = match self.options.coding_mode {
            CodingMode::BitPacked => AnyEncoderChannel::Bit(bits),
            CodingMode::BytePacked => {
                AnyEncoderChannel::Byte(ByteEncoderChannel::new(bits.into_inner()?))
            }
            _ => {
                return Err(Error::Unsupported(
                    "pre-compression and compression coding modes",
                ))
            }
        };
        self.channel = Some(channel);
        Ok(())
    }

    fn channel_mut(&mut self) -> Result<&mut AnyEncoderChannel<W>> {
        self.ensure_header()?;
        self.channel_field()
    }

    fn channel_field(&mut self) -> Result<&mut AnyEncoderChannel<W>> {
        self.channel
            .as_mut()
            .ok_or_else(|| Error::Argument("stream header not written yet".to_string()))
    }

    fn state_name(&self) -> &'static str {
        match self.pool.grammar(self.current).label() {
            GrammarLabel::Document => "Document",
            GrammarLabel::DocContent => "DocContent",
            GrammarLabel::DocEnd => "DocEnd",
            GrammarLabel::Fragment => "Fragment",
            GrammarLabel::FragmentContent => "FragmentContent",
            GrammarLabel::FirstStartTag => "FirstStartTag",
            GrammarLabel::StartTag => "StartTag",
            GrammarLabel::ElementContent => "ElementContent",
        }
    }

    fn second_level(&self) -> Vec<UndeclaredEvent> {
        second_level_events(
            self.pool.grammar(self.current),
            self.pool.is_schema_informed(),
            &self.options.fidelity,
        )
    }

    fn first_level_width(&self) -> usize {
        let has_second = !self.second_level().is_empty();
        self.pool.grammar(self.current).first_level_width(has_second)
    }

    /// Looks `predicate` up at the first level only.
    fn declared_only(
        &mut self,
        predicate: impl Fn(&Event) -> bool,
        event: &str,
    ) -> Result<Outcome> {
        let width = self.first_level_width();
        match self.pool.grammar(self.current).find(predicate) {
            Some((code, _)) => Ok(Outcome::Declared { code, width }),
            None => Err(Error::UnexpectedEvent {
                state: self.state_name(),
                event: event.to_string(),
            }),
        }
    }

    /// Locates `undeclared` on the second level.
    fn undeclared_outcome(&mut self, undeclared: UndeclaredEvent, event: &str) -> Result<Outcome> {
        let levels = self.second_level();
        match levels.iter().position(|u| *u == undeclared) {
            Some(index) => Ok(Outcome::Undeclared { index }),
            None => Err(Error::UnexpectedEvent {
                state: self.state_name(),
                event: event.to_string(),
            }),
        }
    }

    /// Locates a comment or processing instruction on the third level.
    fn third_level_outcome(&mut self, event: ThirdLevelEvent) -> Result<Outcome> {
        let levels = third_level_events(&self.options.fidelity);
        let in_second = self
            .second_level()
            .iter()
            .any(|u| *u == UndeclaredEvent::ThirdLevel);
        match (in_second, levels.iter().position(|t| *t == event)) {
            (true, Some(index)) => Ok(Outcome::Third { index }),
            _ => Err(Error::UnexpectedEvent {
                state: self.state_name(),
                event: "CM/PI".to_string(),
            }),
        }
    }

    /// Writes the event code of `outcome` on all its levels.
    fn emit_outcome(&mut self, outcome: &Outcome) -> Result<()> {
        let width1 = self.first_level_width();
        let escape = self.pool.grammar(self.current).productions().len() as u32;
        let second = self.second_level();
        let width2 = code_width(second.len());
        let third = third_level_events(&self.options.fidelity);
        let channel = self.channel_mut()?;
        match outcome {
            Outcome::Declared { code, width } => {
                channel.encode_n_bit_unsigned_integer(*code as u32, *width)
            }
            Outcome::Undeclared { index } => {
                channel.encode_n_bit_unsigned_integer(escape, width1)?;
                channel.encode_n_bit_unsigned_integer(*index as u32, width2)
            }
            Outcome::Third { index } => {
                channel.encode_n_bit_unsigned_integer(escape, width1)?;
                let escape2 = second
                    .iter()
                    .position(|u| *u == UndeclaredEvent::ThirdLevel)
                    .ok_or_else(|| {
                        Error::Protocol("no comment/PI escape in this state".to_string())
                    })?;
                channel.encode_n_bit_unsigned_integer(escape2 as u32, width2)?;
                channel.encode_n_bit_unsigned_integer(*index as u32, code_width(third.len()))
            }
        }
    }

    /// Applies the state change of a first-level production that is not
    /// a start element.
    fn advance_declared(&mut self, outcome: &Outcome) -> Result<()> {
        if let Outcome::Declared { code, .. } = outcome {
            let next = self
                .pool
                .grammar(self.current)
                .production(*code)
                .map(|p| p.next)
                .ok_or_else(|| Error::Protocol("event code out of range".to_string()))?;
            self.current = next;
        }
        Ok(())
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

    fn known_qname(&self, uri: &str, local_name: &str) -> Option<QNameId> {
        let uri_id = self.context.uri_id(uri)?;
        self.context
            .uri(uri_id)?
            .qname_by_name(local_name)
            .map(|q| q.id())
    }

    fn start_element_impl(
        &mut self,
        uri: &str,
        local_name: &str,
        prefix: Option<&str>,
    ) -> Result<()> {
        self.ensure_header()?;
        let known = self.known_qname(uri, local_name);

        // First level: SE(qname), then SE(uri:*), then SE(*).
        let declared = known.and_then(|qid| {
            self.pool
                .grammar(self.current)
                .find(|e| matches!(e, Event::StartElement { qname, .. } if *qname == qid))
                .map(|(code, production)| {
                    let child = match &production.event {
                        Event::StartElement { grammar, .. } => *grammar,
                        _ => unreachable!(),
                    };
                    (qid, code, production.next, child)
                })
        });
        if let Some((qid, code, next, child)) = declared {
            let outcome = Outcome::Declared {
                code,
                width: self.first_level_width(),
            };
            self.emit_outcome(&outcome)?;
            self.encode_qname_prefix(qid.uri_id, prefix)?;
            self.stack.push((next, qid));
            self.current = child;
            return Ok(());
        }

        let ns_match = known.and_then(|qid| {
            self.pool
                .grammar(self.current)
                .find(|e| matches!(e, Event::StartElementNs { uri_id } if *uri_id == qid.uri_id))
                .map(|(code, production)| (qid, code, production.next))
        });
        if let Some((qid, code, next)) = ns_match {
            let outcome = Outcome::Declared {
                code,
                width: self.first_level_width(),
            };
            self.emit_outcome(&outcome)?;
            self.encode_local_name(qid.uri_id, local_name)?;
            self.encode_qname_prefix(qid.uri_id, prefix)?;
            let child = self.pool.element_grammar(qid);
            self.stack.push((next, qid));
            self.current = child;
            return Ok(());
        }

        let generic = self
            .pool
            .grammar(self.current)
            .find(|e| matches!(e, Event::StartElementGeneric))
            .map(|(code, production)| (code, production.next));
        if let Some((code, next)) = generic {
            let outcome = Outcome::Declared {
                code,
                width: self.first_level_width(),
            };
            self.emit_outcome(&outcome)?;
            let qid = self.encode_qname(uri, local_name)?;
            self.encode_qname_prefix(qid.uri_id, prefix)?;
            let child = self.pool.element_grammar(qid);
            self.stack.push((next, qid));
            self.current = child;
            return Ok(());
        }

        // Second level: SE(*) learns a concrete production.
        let outcome = self.undeclared_outcome(UndeclaredEvent::StartElementGeneric, "SE")?;
        self.emit_outcome(&outcome)?;
        let qid = self.encode_qname(uri, local_name)?;
        self.encode_qname_prefix(qid.uri_id, prefix)?;
        let child = self.pool.element_grammar(qid);
        let continuation = self.content_continuation(self.current);
        self.pool.learn(
            self.current,
            Event::StartElement {
                qname: qid,
                grammar: child,
            },
            continuation,
        );
        self.stack.push((continuation, qid));
        self.current = child;
        Ok(())
    }

    fn attribute_list_impl(&mut self, attributes: &AttributeList) -> Result<()> {
        if self.options.fidelity.prefixes {
            let mut declarations: Vec<_> = attributes.namespace_declarations().iter().collect();
            if self.sorted_attributes() {
                declarations.sort_by(|a, b| a.prefix.cmp(&b.prefix));
            }
            for declaration in declarations {
                self.namespace_declaration_impl(&declaration.uri, &declaration.prefix, false)?;
            }
        }
        if let Some(attribute) = attributes.xsi_type() {
            self.attribute_xsi_type_impl(attribute)?;
        }
        if let Some(attribute) = attributes.xsi_nil() {
            self.attribute_xsi_nil_impl(attribute)?;
        }
        let mut plain: Vec<&Attribute> = attributes.attributes().iter().collect();
        if self.options.encoding.include_schema_location {
            plain.extend(attributes.schema_locations());
        }
        if self.sorted_attributes() {
            plain.sort_by(|a, b| (&a.local_name, &a.uri).cmp(&(&b.local_name, &b.uri)));
        }
        for attribute in plain {
            self.attribute_impl(attribute)?;
        }
        Ok(())
    }

    fn sorted_attributes(&self) -> bool {
        self.options.encoding.canonical || self.pool.is_schema_informed()
    }

    fn attribute_impl(&mut self, attribute: &Attribute) -> Result<()> {
        let known = self.known_qname(&attribute.uri, &attribute.local_name);
        let grammar = self.pool.grammar(self.current);

        if let Some(qid) = known {
            let declared = grammar
                .find(|e| matches!(e, Event::Attribute { qname, .. } if *qname == qid))
                .map(|(code, production)| {
                    let datatype = match &production.event {
                        Event::Attribute { datatype, .. } => datatype.clone(),
                        _ => unreachable!(),
                    };
                    (code, production.next, datatype)
                });
            if let Some((code, next, datatype)) = declared {
                // A value that fails its declared datatype falls back to
                // the generic second level outside strict mode.
                let use_typed = self.typed_value(&datatype, &attribute.value);
                match use_typed {
                    Ok(typed) => {
                        let outcome = Outcome::Declared {
                            code,
                            width: self.first_level_width(),
                        };
                        self.emit_outcome(&outcome)?;
                        self.encode_qname_prefix(qid.uri_id, attribute.prefix.as_deref())?;
                        self.encode_attribute_value(qid, &datatype, typed, &attribute.value)?;
                        self.current = next;
                        return Ok(());
                    }
                    Err(err) if self.options.fidelity.strict => return Err(err),
                    Err(_) => {
                        trace!(local_name = %attribute.local_name, "schema-invalid attribute value");
                    }
                }
            }
        }

        let ns_match = known.and_then(|qid| {
            self.pool
                .grammar(self.current)
                .find(|e| matches!(e, Event::AttributeNs { uri_id } if *uri_id == qid.uri_id))
                .map(|(code, production)| (qid, code, production.next))
        });
        if let Some((qid, code, next)) = ns_match {
            let outcome = Outcome::Declared {
                code,
                width: self.first_level_width(),
            };
            self.emit_outcome(&outcome)?;
            self.encode_local_name(qid.uri_id, &attribute.local_name)?;
            self.encode_qname_prefix(qid.uri_id, attribute.prefix.as_deref())?;
            self.encode_value(qid, &attribute.value)?;
            self.current = next;
            return Ok(());
        }

        let generic = self
            .pool
            .grammar(self.current)
            .find(|e| matches!(e, Event::AttributeGeneric))
            .map(|(code, production)| (code, production.next));
        if let Some((code, next)) = generic {
            let outcome = Outcome::Declared {
                code,
                width: self.first_level_width(),
            };
            self.emit_outcome(&outcome)?;
            let qid = self.encode_qname(&attribute.uri, &attribute.local_name)?;
            self.encode_qname_prefix(qid.uri_id, attribute.prefix.as_deref())?;
            self.encode_value(qid, &attribute.value)?;
            self.current = next;
            return Ok(());
        }

        // Second level: AT(*) learns AT(qname) and stays in the tag.
        let outcome = self.undeclared_outcome(UndeclaredEvent::AttributeGeneric, "AT")?;
        self.emit_outcome(&outcome)?;
        let qid = self.encode_qname(&attribute.uri, &attribute.local_name)?;
        self.encode_qname_prefix(qid.uri_id, attribute.prefix.as_deref())?;
        self.encode_value(qid, &attribute.value)?;
        self.pool.learn(
            self.current,
            Event::Attribute {
                qname: qid,
                datatype: Datatype::String,
            },
            self.current,
        );
        Ok(())
    }

    fn attribute_xsi_type_impl(&mut self, attribute: &Attribute) -> Result<()> {
        // The dedicated xsi:type slot only exists on schema-informed tag
        // states; everywhere else the name travels as a plain attribute.
        match self.undeclared_outcome(UndeclaredEvent::AttributeXsiType, "AT(xsi:type)") {
            Ok(outcome) => {
                self.emit_outcome(&outcome)?;
                let (type_uri, type_local) = self.resolve_qname_value(&attribute.value);
                let qid = self.encode_qname(&type_uri, &type_local)?;
                if let Some(type_grammar) =
                    self.context.qname(qid).and_then(|q| q.type_grammar())
                {
                    self.current = type_grammar;
                }
                Ok(())
            }
            Err(_) => self.attribute_impl(attribute),
        }
    }

    fn attribute_xsi_nil_impl(&mut self, attribute: &Attribute) -> Result<()> {
        let parsed = BooleanValue::parse(&attribute.value);
        let slot = self.second_level().contains(&UndeclaredEvent::AttributeXsiNil);
        match (parsed, slot) {
            (Ok(value), true) => {
                let outcome =
                    self.undeclared_outcome(UndeclaredEvent::AttributeXsiNil, "AT(xsi:nil)")?;
                self.emit_outcome(&outcome)?;
                self.channel_mut()?.encode_boolean(value.value())
            }
            (Err(err), true) if self.options.fidelity.strict => Err(err),
            _ => self.attribute_impl(attribute),
        }
    }

    fn characters_impl(&mut self, value: &Value) -> Result<()> {
        let lexical = value.to_string();

        let typed = self
            .pool
            .grammar(self.current)
            .find(|e| matches!(e, Event::Characters { .. }))
            .map(|(code, production)| {
                let datatype = match &production.event {
                    Event::Characters { datatype } => datatype.clone(),
                    _ => unreachable!(),
                };
                (code, production.next, datatype)
            });
        if let Some((code, next, datatype)) = typed {
            match self.typed_value(&datatype, &lexical) {
                Ok(parsed) => {
                    let outcome = Outcome::Declared {
                        code,
                        width: self.first_level_width(),
                    };
                    self.emit_outcome(&outcome)?;
                    let qid = self.element_qname()?;
                    self.encode_attribute_value(qid, &datatype, parsed, &lexical)?;
                    self.current = next;
                    return Ok(());
                }
                Err(err) if self.options.fidelity.strict => return Err(err),
                Err(_) => {
                    trace!("schema-invalid character content");
                }
            }
        }

        let generic = self
            .pool
            .grammar(self.current)
            .find(|e| matches!(e, Event::CharactersGeneric))
            .map(|(code, production)| (code, production.next));
        let qid = self.element_qname()?;
        if let Some((code, next)) = generic {
            let outcome = Outcome::Declared {
                code,
                width: self.first_level_width(),
            };
            self.emit_outcome(&outcome)?;
            self.encode_value(qid, &lexical)?;
            self.current = next;
            return Ok(());
        }

        // Second level: CH learns and moves to the content grammar.
        let outcome = self.undeclared_outcome(UndeclaredEvent::Characters, "CH")?;
        self.emit_outcome(&outcome)?;
        self.encode_value(qid, &lexical)?;
        let continuation = self.content_continuation(self.current);
        self.pool
            .learn(self.current, Event::CharactersGeneric, continuation);
        self.current = continuation;
        Ok(())
    }

    fn end_element_impl(&mut self) -> Result<()> {
        let declared = self
            .pool
            .grammar(self.current)
            .find(|e| matches!(e, Event::EndElement))
            .map(|(code, _)| code);
        match declared {
            Some(code) => {
                let outcome = Outcome::Declared {
                    code,
                    width: self.first_level_width(),
                };
                self.emit_outcome(&outcome)?;
            }
            None => {
                let outcome = self.undeclared_outcome(UndeclaredEvent::EndElement, "EE")?;
                self.emit_outcome(&outcome)?;
                let continuation = self.content_continuation(self.current);
                self.pool.learn(self.current, Event::EndElement, continuation);
            }
        }
        let (continuation, _) = self
            .stack
            .pop()
            .ok_or_else(|| Error::Protocol("end of element without open element".to_string()))?;
        self.current = continuation;
        Ok(())
    }

    fn namespace_declaration_impl(
        &mut self,
        uri: &str,
        prefix: &str,
        element_scope: bool,
    ) -> Result<()> {
        if !self.options.fidelity.prefixes {
            return Ok(());
        }
        let outcome = self.undeclared_outcome(UndeclaredEvent::NamespaceDeclaration, "NS")?;
        self.emit_outcome(&outcome)?;

        let Self {
            channel, context, ..
        } = self;
        let channel = channel
            .as_mut()
            .ok_or_else(|| Error::Argument("stream header not written yet".to_string()))?;
        let uri_id = encode_uri(channel, context, uri)?;
        let uri_context = context
            .uri_mut(uri_id)
            .ok_or_else(|| Error::Protocol("uri id out of range".to_string()))?;
        let width = code_width(uri_context.number_of_prefixes() + 1);
        match uri_context.prefix_id(prefix) {
            Some(id) => channel.encode_n_bit_unsigned_integer((id + 1) as u32, width)?,
            None => {
                channel.encode_n_bit_unsigned_integer(0, width)?;
                channel.encode_string(prefix)?;
                uri_context.add_prefix(prefix);
            }
        }
        channel.encode_boolean(element_scope)
    }

    /// Parses `lexical` in `datatype` when typed coding applies. `None`
    /// means the value must go through the string table.
    fn typed_value(&self, datatype: &Datatype, lexical: &str) -> Result<Option<Value>> {
        if self.options.fidelity.lexical_values || datatype.is_string_coded() {
            return Ok(None);
        }
        let mut value = datatype.parse(lexical)?;
        if self.options.encoding.utc_time {
            if let Value::DateTime(dt) = &value {
                if dt.kind.has_time() && dt.timezone_minutes.unwrap_or(0) != 0 {
                    value = Value::DateTime(dt.normalize());
                }
            }
        }
        Ok(Some(value))
    }

    fn encode_attribute_value(
        &mut self,
        qid: QNameId,
        datatype: &Datatype,
        typed: Option<Value>,
        lexical: &str,
    ) -> Result<()> {
        match typed {
            Some(value) => {
                let channel = self.channel_field()?;
                datatype.encode(channel, &value)
            }
            None => self.encode_value(qid, lexical),
        }
    }

    /// String-table coded value content.
    fn encode_value(&mut self, qid: QNameId, value: &str) -> Result<()> {
        let Self { channel, table, .. } = self;
        let channel = channel
            .as_mut()
            .ok_or_else(|| Error::Argument("stream header not written yet".to_string()))?;
        match table.lookup(qid, value) {
            ValueHit::Local(id) => {
                channel.encode_unsigned_integer(0)?;
                channel
                    .encode_n_bit_unsigned_integer(id as u32, code_width(table.local_size(qid)))?;
            }
            ValueHit::Global(id) => {
                channel.encode_unsigned_integer(1)?;
                channel
                    .encode_n_bit_unsigned_integer(id as u32, code_width(table.global_size()))?;
            }
            ValueHit::Miss => {
                channel.encode_unsigned_integer(value.chars().count() as u64 + 2)?;
                channel.encode_characters(value)?;
                table.add(qid, value);
            }
        }
        Ok(())
    }

    /// Full qualified-name coding: URI, then local name, interning both.
    fn encode_qname(&mut self, uri: &str, local_name: &str) -> Result<QNameId> {
        let Self {
            channel, context, ..
        } = self;
        let channel = channel
            .as_mut()
            .ok_or_else(|| Error::Argument("stream header not written yet".to_string()))?;
        let uri_id = encode_uri(channel, context, uri)?;
        encode_local_name(channel, context, uri_id, local_name)
    }

    fn encode_local_name(&mut self, uri_id: usize, local_name: &str) -> Result<QNameId> {
        let Self {
            channel, context, ..
        } = self;
        let channel = channel
            .as_mut()
            .ok_or_else(|| Error::Argument("stream header not written yet".to_string()))?;
        encode_local_name(channel, context, uri_id, local_name)
    }

    /// Compact prefix id, written only when prefixes are preserved and
    /// the URI has more than one known prefix.
    fn encode_qname_prefix(&mut self, uri_id: usize, prefix: Option<&str>) -> Result<()> {
        if !self.options.fidelity.prefixes {
            return Ok(());
        }
        let Self {
            channel, context, ..
        } = self;
        let channel = channel
            .as_mut()
            .ok_or_else(|| Error::Argument("stream header not written yet".to_string()))?;
        let uri_context = context
            .uri(uri_id)
            .ok_or_else(|| Error::Protocol("uri id out of range".to_string()))?;
        let width = code_width(uri_context.number_of_prefixes());
        if width == 0 {
            return Ok(());
        }
        let prefix = prefix.unwrap_or("");
        match uri_context.prefix_id(prefix) {
            Some(id) => channel.encode_n_bit_unsigned_integer(id as u32, width),
            None => Err(Error::Protocol(format!(
                "prefix {:?} not declared for {:?}",
                prefix,
                uri_context.uri()
            ))),
        }
    }

    fn element_qname(&self) -> Result<QNameId> {
        self.stack
            .last()
            .map(|(_, qid)| *qid)
            .ok_or_else(|| Error::Protocol("character content outside an element".to_string()))
    }

    /// Splits a lexical QName value and resolves its prefix against the
    /// known prefix partitions.
    fn resolve_qname_value(&self, lexical: &str) -> (String, String) {
        match crate::values::QNameValue::split(lexical) {
            Ok((Some(prefix), local)) => {
                for uri_id in 0..self.context.number_of_uris() {
                    if let Some(uri_context) = self.context.uri(uri_id) {
                        if uri_context.prefix_id(prefix).is_some() {
                            return (uri_context.uri().to_string(), local.to_string());
                        }
                    }
                }
                (String::new(), local.to_string())
            }
            Ok((None, local)) => (String::new(), local.to_string()),
            Err(_) => (String::new(), lexical.trim().to_string()),
        }
    }
}

fn encode_uri<W: Write>(
    channel: &mut AnyEncoderChannel<W>,
    context: &mut GrammarContext,
    uri: &str,
) -> Result<usize> {
    let width = code_width(context.number_of_uris() + 1);
    match context.uri_id(uri) {
        Some(id) => {
            channel.encode_n_bit_unsigned_integer((id + 1) as u32, width)?;
            Ok(id)
        }
        None => {
            channel.encode_n_bit_unsigned_integer(0, width)?;
            channel.encode_string(uri)?;
            Ok(context.add_uri(uri))
        }
    }
}

fn encode_local_name<W: Write>(
    channel: &mut AnyEncoderChannel<W>,
    context: &mut GrammarContext,
    uri_id: usize,
    local_name: &str,
) -> Result<QNameId> {
    let uri_context = context
        .uri_mut(uri_id)
        .ok_or_else(|| Error::Protocol("uri id out of range".to_string()))?;
    match uri_context.qname_by_name(local_name).map(|q| q.id()) {
        Some(qid) => {
            channel.encode_unsigned_integer(0)?;
            channel.encode_n_bit_unsigned_integer(
                qid.local_name_id as u32,
                code_width(uri_context.number_of_qnames()),
            )?;
            Ok(qid)
        }
        None => {
            channel.encode_unsigned_integer(local_name.chars().count() as u64 + 1)?;
            channel.encode_characters(local_name)?;
            Ok(uri_context.add_qname(local_name))
        }
    }
}
