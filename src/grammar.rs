//! Grammars: ordered production lists driving event (de)coding.
//!
//! A grammar is a finite list of productions; the event code of a
//! production is its position, written as an n-bit integer just wide
//! enough for the number of codes in the state. States that admit
//! undeclared events reserve one extra code, the all-ones escape, behind
//! which a second (and for comments and processing instructions a third)
//! fixed-width level lives.
//!
//! Grammars live in an arena and refer to each other through
//! [`GrammarId`] indices: productions may point at start-element events
//! whose grammars point back at other productions, and indices keep that
//! cycle out of the ownership graph.

pub(crate) mod builtin;
pub mod schema;

use std::sync::{Arc, OnceLock};

use crate::context::GrammarContext;
use crate::events::Event;
use crate::options::FidelityOptions;

/// Arena index of a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrammarId(pub(crate) usize);

/// Number of bits needed to address `n` distinct codes. Zero when one
/// code or none is possible.
pub(crate) fn code_width(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// The role a grammar state plays. The role decides which undeclared
/// events its escape code can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarLabel {
    /// Before the document start.
    Document,
    /// Between SD and the root element.
    DocContent,
    /// After the root element.
    DocEnd,
    /// Before a fragment start.
    Fragment,
    /// Between the events of a fragment.
    FragmentContent,
    /// First visit of an element tag; schema-informed streams handle
    /// `xsi:type` and `xsi:nil` here.
    FirstStartTag,
    /// An element tag while attributes are possible.
    StartTag,
    /// An element after its attributes.
    ElementContent,
}

/// One production: a matchable event and the state that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Production {
    /// The event this production matches.
    pub event: Event,
    /// State after the event.
    pub next: GrammarId,
}

/// A grammar state.
#[derive(Debug, Clone)]
pub struct Grammar {
    label: GrammarLabel,
    productions: Vec<Production>,
    /// Built-in element grammars accept learned productions; schema
    /// grammars and the shared fallback do not.
    learnable: bool,
}

impl Grammar {
    /// Creates a state with a fixed production list.
    pub fn new(label: GrammarLabel, productions: Vec<Production>) -> Self {
        Grammar {
            label,
            productions,
            learnable: false,
        }
    }

    pub(crate) fn new_learnable(label: GrammarLabel, productions: Vec<Production>) -> Self {
        Grammar {
            label,
            productions,
            learnable: true,
        }
    }

    /// The role of this state.
    pub fn label(&self) -> GrammarLabel {
        self.label
    }

    /// The ordered production list; positions are event codes.
    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    /// Production lookup by event code.
    pub fn production(&self, code: usize) -> Option<&Production> {
        self.productions.get(code)
    }

    /// First production matching `predicate`, with its event code.
    pub fn find(&self, predicate: impl Fn(&Event) -> bool) -> Option<(usize, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .find(|(_, p)| predicate(&p.event))
    }

    /// Does any production match EE at the first level?
    pub fn has_end_element(&self) -> bool {
        self.productions
            .iter()
            .any(|p| matches!(p.event, Event::EndElement))
    }

    pub(crate) fn is_learnable(&self) -> bool {
        self.learnable
    }

    /// Prepends a learned production; the newest event gets code zero
    /// and every earlier one shifts up.
    pub(crate) fn add_production(&mut self, event: Event, next: GrammarId) {
        debug_assert!(self.learnable);
        self.productions.insert(0, Production { event, next });
    }

    /// Width of the first-level event code, including the escape slot
    /// when a second level exists.
    pub(crate) fn first_level_width(&self, has_second_level: bool) -> usize {
        code_width(self.productions.len() + has_second_level as usize)
    }
}

/// Events reachable through the second-level escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UndeclaredEvent {
    EndElement,
    AttributeXsiType,
    AttributeXsiNil,
    AttributeGeneric,
    NamespaceDeclaration,
    SelfContained,
    StartElementGeneric,
    Characters,
    EntityReference,
    DocType,
    /// Escape into the comment/processing-instruction level.
    ThirdLevel,
}

/// Events on the third level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThirdLevelEvent {
    Comment,
    ProcessingInstruction,
}

/// The second-level slots of `grammar` under the given options, in code
/// order. Empty when the state admits no undeclared events.
pub(crate) fn second_level_events(
    grammar: &Grammar,
    schema_informed: bool,
    fidelity: &FidelityOptions,
) -> Vec<UndeclaredEvent> {
    use UndeclaredEvent::*;

    let escape = fidelity.comments || fidelity.pis;
    let mut events = Vec::new();
    match grammar.label() {
        GrammarLabel::Document | GrammarLabel::Fragment => {}
        GrammarLabel::DocContent => {
            if fidelity.dtd {
                events.push(DocType);
            }
            if escape {
                events.push(ThirdLevel);
            }
        }
        GrammarLabel::DocEnd => {
            if escape {
                events.push(ThirdLevel);
            }
        }
        GrammarLabel::FragmentContent => {
            events.push(Characters);
            if escape {
                events.push(ThirdLevel);
            }
        }
        GrammarLabel::FirstStartTag => {
            if fidelity.strict {
                events.push(AttributeXsiType);
                events.push(AttributeXsiNil);
            } else {
                if !grammar.has_end_element() {
                    events.push(EndElement);
                }
                events.push(AttributeXsiType);
                events.push(AttributeXsiNil);
                events.push(AttributeGeneric);
                if fidelity.prefixes {
                    events.push(NamespaceDeclaration);
                }
                if fidelity.self_contained {
                    events.push(SelfContained);
                }
                events.push(StartElementGeneric);
                events.push(Characters);
                if fidelity.dtd {
                    events.push(EntityReference);
                }
                if escape {
                    events.push(ThirdLevel);
                }
            }
        }
        GrammarLabel::StartTag => {
            if schema_informed {
                if !fidelity.strict {
                    if !grammar.has_end_element() {
                        events.push(EndElement);
                    }
                    events.push(AttributeGeneric);
                    if fidelity.prefixes {
                        events.push(NamespaceDeclaration);
                    }
                    events.push(StartElementGeneric);
                    events.push(Characters);
                    if fidelity.dtd {
                        events.push(EntityReference);
                    }
                    if escape {
                        events.push(ThirdLevel);
                    }
                }
            } else {
                // Built-in element tag: the undeclared slots are fixed,
                // learning only grows the first level.
                events.push(EndElement);
                events.push(AttributeGeneric);
                if fidelity.prefixes {
                    events.push(NamespaceDeclaration);
                }
                if fidelity.self_contained {
                    events.push(SelfContained);
                }
                events.push(StartElementGeneric);
                events.push(Characters);
                if fidelity.dtd {
                    events.push(EntityReference);
                }
                if escape {
                    events.push(ThirdLevel);
                }
            }
        }
        GrammarLabel::ElementContent => {
            if schema_informed && fidelity.strict {
                return events;
            }
            if schema_informed && !grammar.has_end_element() {
                events.push(EndElement);
            }
            events.push(StartElementGeneric);
            events.push(Characters);
            if fidelity.dtd {
                events.push(EntityReference);
            }
            if escape {
                events.push(ThirdLevel);
            }
        }
    }
    events
}

/// The third-level slots under the given options, in code order.
pub(crate) fn third_level_events(fidelity: &FidelityOptions) -> Vec<ThirdLevelEvent> {
    let mut events = Vec::new();
    if fidelity.comments {
        events.push(ThirdLevelEvent::Comment);
    }
    if fidelity.pis {
        events.push(ThirdLevelEvent::ProcessingInstruction);
    }
    events
}

/// An immutable grammar set shared by every stream that uses it:
/// the document and fragment states, the identifier partitions they are
/// built against and, for schema-informed sets, the element and type
/// grammars loaded from a schema.
#[derive(Debug, Clone)]
pub struct Grammars {
    pub(crate) context: GrammarContext,
    grammars: Vec<Grammar>,
    document: GrammarId,
    doc_end: GrammarId,
    fragment: GrammarId,
    fragment_content: GrammarId,
    schema_informed: bool,
}

impl Grammars {
    /// The process-wide schema-less grammar set. Built once, immutable
    /// afterwards.
    pub fn schema_less() -> Arc<Grammars> {
        static INSTANCE: OnceLock<Arc<Grammars>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| Arc::new(Self::build(GrammarContext::core_entries(), false)))
            .clone()
    }

    pub(crate) fn build(context: GrammarContext, schema_informed: bool) -> Grammars {
        // Arena layout fixed by construction order.
        let doc_end = GrammarId(0);
        let doc_content = GrammarId(1);
        let document = GrammarId(2);
        let fragment_content = GrammarId(3);
        let fragment = GrammarId(4);

        let grammars = vec![
            Grammar::new(
                GrammarLabel::DocEnd,
                vec![Production {
                    event: Event::EndDocument,
                    next: doc_end,
                }],
            ),
            Grammar::new(
                GrammarLabel::DocContent,
                vec![Production {
                    event: Event::StartElementGeneric,
                    next: doc_end,
                }],
            ),
            Grammar::new(
                GrammarLabel::Document,
                vec![Production {
                    event: Event::StartDocument,
                    next: doc_content,
                }],
            ),
            Grammar::new(
                GrammarLabel::FragmentContent,
                vec![
                    Production {
                        event: Event::StartElementGeneric,
                        next: fragment_content,
                    },
                    Production {
                        event: Event::EndDocument,
                        next: fragment_content,
                    },
                ],
            ),
            Grammar::new(
                GrammarLabel::Fragment,
                vec![Production {
                    event: Event::StartDocument,
                    next: fragment_content,
                }],
            ),
        ];

        Grammars {
            context,
            grammars,
            document,
            doc_end,
            fragment,
            fragment_content,
            schema_informed,
        }
    }

    /// The identifier partitions this set was built against.
    pub fn context(&self) -> &GrammarContext {
        &self.context
    }

    /// Was this set derived from a schema?
    pub fn is_schema_informed(&self) -> bool {
        self.schema_informed
    }

    /// The document start state.
    pub fn document(&self) -> GrammarId {
        self.document
    }

    /// The state after the root element.
    pub fn doc_end(&self) -> GrammarId {
        self.doc_end
    }

    /// The fragment start state.
    pub fn fragment(&self) -> GrammarId {
        self.fragment
    }

    /// The state between fragment events.
    pub fn fragment_content(&self) -> GrammarId {
        self.fragment_content
    }

    /// Number of grammars in the arena.
    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    /// Is the arena empty? It never is; present for completeness.
    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// Grammar lookup. Ids handed out by this set are always valid.
    pub fn grammar(&self, id: GrammarId) -> &Grammar {
        &self.grammars[id.0]
    }

    pub(crate) fn push(&mut self, grammar: Grammar) -> GrammarId {
        self.grammars.push(grammar);
        GrammarId(self.grammars.len() - 1)
    }

    pub(crate) fn grammar_mut(&mut self, id: GrammarId) -> &mut Grammar {
        &mut self.grammars[id.0]
    }

    pub(crate) fn doc_content(&self) -> GrammarId {
        GrammarId(1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn code_width_is_ceil_log2() {
        assert_eq!(code_width(0), 0);
        assert_eq!(code_width(1), 0);
        assert_eq!(code_width(2), 1);
        assert_eq!(code_width(3), 2);
        assert_eq!(code_width(4), 2);
        assert_eq!(code_width(5), 3);
        assert_eq!(code_width(256), 8);
        assert_eq!(code_width(257), 9);
    }

    #[test]
    fn schema_less_set_is_a_singleton() {
        let a = Grammars::schema_less();
        let b = Grammars::schema_less();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!a.is_schema_informed());
    }

    #[test]
    fn document_states_are_wired() {
        let grammars = Grammars::schema_less();
        let document = grammars.grammar(grammars.document());
        assert_eq!(document.productions().len(), 1);
        let doc_content = document.production(0).unwrap().next;
        let se = grammars.grammar(doc_content).production(0).unwrap();
        assert_eq!(se.event, Event::StartElementGeneric);
        assert_eq!(se.next, grammars.doc_end());
    }

    #[test]
    fn learned_productions_take_code_zero() {
        let mut grammar = Grammar::new_learnable(GrammarLabel::StartTag, Vec::new());
        grammar.add_production(Event::EndElement, GrammarId(0));
        grammar.add_production(Event::CharactersGeneric, GrammarId(1));
        assert_eq!(grammar.production(0).unwrap().event, Event::CharactersGeneric);
        assert_eq!(grammar.production(1).unwrap().event, Event::EndElement);
    }

    #[test]
    fn second_level_of_a_built_in_tag_follows_the_options() {
        let grammar = Grammar::new_learnable(GrammarLabel::StartTag, Vec::new());
        let default = second_level_events(&grammar, false, &FidelityOptions::default());
        assert_eq!(
            default,
            vec![
                UndeclaredEvent::EndElement,
                UndeclaredEvent::AttributeGeneric,
                UndeclaredEvent::StartElementGeneric,
                UndeclaredEvent::Characters,
            ]
        );

        let all = second_level_events(&grammar, false, &FidelityOptions::all());
        assert!(all.contains(&UndeclaredEvent::NamespaceDeclaration));
        assert!(all.contains(&UndeclaredEvent::EntityReference));
        assert_eq!(all.last(), Some(&UndeclaredEvent::ThirdLevel));
    }

    #[test]
    fn first_level_width_counts_the_escape_slot() {
        let mut grammar = Grammar::new_learnable(GrammarLabel::StartTag, Vec::new());
        assert_eq!(grammar.first_level_width(true), 0);
        grammar.add_production(Event::EndElement, GrammarId(0));
        assert_eq!(grammar.first_level_width(true), 1);
        grammar.add_production(Event::CharactersGeneric, GrammarId(0));
        assert_eq!(grammar.first_level_width(true), 2);
        assert_eq!(grammar.first_level_width(false), 1);
    }
}
