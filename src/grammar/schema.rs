//! Schema-informed grammar sets.
//!
//! Schemas are not parsed here. An external loader walks its schema
//! representation and hands the finished model over through
//! [`SchemaGrammarsBuilder`]; once built, the set is immutable and can
//! be shared by any number of streams.

use std::sync::Arc;

use crate::context::QNameId;
use crate::datatypes::Datatype;
use crate::events::Event;
use crate::grammar::{Grammar, GrammarId, GrammarLabel, Grammars, Production};
use crate::{Error, Result};

/// Builder for a schema-informed [`Grammars`] set.
pub struct SchemaGrammarsBuilder {
    grammars: Grammars,
    global_elements: Vec<(QNameId, GrammarId)>,
}

impl SchemaGrammarsBuilder {
    /// Starts an empty schema-informed set over the schema identifier
    /// partitions.
    pub fn new() -> Self {
        SchemaGrammarsBuilder {
            grammars: Grammars::build(crate::context::GrammarContext::schema_entries(), true),
            global_elements: Vec::new(),
        }
    }

    /// Interns a qualified name into the identifier partitions.
    pub fn intern(&mut self, uri: &str, local_name: &str) -> QNameId {
        self.grammars.context.intern(uri, local_name)
    }

    /// Reserves a grammar state; productions are attached afterwards so
    /// states may refer to each other.
    pub fn reserve_grammar(&mut self, label: GrammarLabel) -> GrammarId {
        self.grammars.push(Grammar::new(label, Vec::new()))
    }

    /// Attaches the production list of a reserved state, in event code
    /// order.
    pub fn set_productions(&mut self, id: GrammarId, productions: Vec<Production>) {
        *self.grammars.grammar_mut(id) = Grammar::new(self.grammars.grammar(id).label(), productions);
    }

    /// Declares a global element: its start is reachable from the
    /// document and fragment states and from generic starts of that
    /// name.
    pub fn set_global_element(&mut self, qname: QNameId, grammar: GrammarId) -> Result<()> {
        let context = self
            .grammars
            .context
            .qname_mut(qname)
            .ok_or_else(|| Error::Argument("unknown qualified name id".to_string()))?;
        context.set_global_start_element(grammar);
        self.global_elements.push((qname, grammar));
        Ok(())
    }

    /// Declares a global attribute with its datatype.
    pub fn set_global_attribute(&mut self, qname: QNameId, datatype: Datatype) -> Result<()> {
        self.grammars
            .context
            .qname_mut(qname)
            .ok_or_else(|| Error::Argument("unknown qualified name id".to_string()))?
            .set_global_attribute(datatype);
        Ok(())
    }

    /// Declares a named type grammar, the target of `xsi:type` casts.
    pub fn set_type_grammar(&mut self, qname: QNameId, grammar: GrammarId) -> Result<()> {
        self.grammars
            .context
            .qname_mut(qname)
            .ok_or_else(|| Error::Argument("unknown qualified name id".to_string()))?
            .set_type_grammar(grammar);
        Ok(())
    }

    /// Finishes the set: the declared global elements are spliced into
    /// the document and fragment content states ahead of the generic
    /// wildcard, ordered by local name then namespace.
    pub fn build(mut self) -> Arc<Grammars> {
        let mut globals = self.global_elements.clone();
        let context = &self.grammars.context;
        globals.sort_by(|(a, _), (b, _)| {
            let name = |id: &QNameId| {
                let local = context
                    .qname(*id)
                    .map(|q| q.local_name().to_string())
                    .unwrap_or_default();
                let uri = context
                    .uri(id.uri_id)
                    .map(|u| u.uri().to_string())
                    .unwrap_or_default();
                (local, uri)
            };
            name(a).cmp(&name(b))
        });

        let doc_end = self.grammars.doc_end();
        let doc_content = self.grammars.doc_content();
        let mut productions: Vec<Production> = globals
            .iter()
            .map(|(qname, grammar)| Production {
                event: Event::StartElement {
                    qname: *qname,
                    grammar: *grammar,
                },
                next: doc_end,
            })
            .collect();
        productions.push(Production {
            event: Event::StartElementGeneric,
            next: doc_end,
        });
        *self.grammars.grammar_mut(doc_content) =
            Grammar::new(GrammarLabel::DocContent, productions);

        let fragment_content = self.grammars.fragment_content();
        let mut fragment_productions: Vec<Production> = globals
            .iter()
            .map(|(qname, grammar)| Production {
                event: Event::StartElement {
                    qname: *qname,
                    grammar: *grammar,
                },
                next: fragment_content,
            })
            .collect();
        fragment_productions.push(Production {
            event: Event::StartElementGeneric,
            next: fragment_content,
        });
        fragment_productions.push(Production {
            event: Event::EndDocument,
            next: fragment_content,
        });
        *self.grammars.grammar_mut(fragment_content) =
            Grammar::new(GrammarLabel::FragmentContent, fragment_productions);

        Arc::new(self.grammars)
    }
}

impl Default for SchemaGrammarsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::datatypes::Datatype;
    use pretty_assertions::assert_eq;

    /// Builds the grammar of `<root a="..."><!-- integer text --></root>`
    /// by hand, the way a schema loader would.
    fn tiny_schema() -> Arc<Grammars> {
        let mut builder = SchemaGrammarsBuilder::new();
        let root = builder.intern("urn:test", "root");
        let attr = builder.intern("urn:test", "a");

        let first = builder.reserve_grammar(GrammarLabel::FirstStartTag);
        let content = builder.reserve_grammar(GrammarLabel::ElementContent);
        let end = builder.reserve_grammar(GrammarLabel::ElementContent);

        builder.set_productions(
            first,
            vec![Production {
                event: Event::Attribute {
                    qname: attr,
                    datatype: Datatype::Integer,
                },
                next: content,
            }],
        );
        builder.set_productions(
            content,
            vec![
                Production {
                    event: Event::Characters {
                        datatype: Datatype::Integer,
                    },
                    next: end,
                },
                Production {
                    event: Event::EndElement,
                    next: end,
                },
            ],
        );
        builder.set_productions(
            end,
            vec![Production {
                event: Event::EndElement,
                next: end,
            }],
        );
        builder.set_global_element(root, first).unwrap();
        builder.build()
    }

    #[test]
    fn global_elements_precede_the_wildcard() {
        let grammars = tiny_schema();
        assert!(grammars.is_schema_informed());
        let doc_content = grammars.grammar(grammars.doc_content());
        assert_eq!(doc_content.productions().len(), 2);
        assert!(matches!(
            doc_content.production(0).unwrap().event,
            Event::StartElement { .. }
        ));
        assert_eq!(
            doc_content.production(1).unwrap().event,
            Event::StartElementGeneric
        );
    }

    #[test]
    fn the_context_links_back_to_the_element_grammar() {
        let grammars = tiny_schema();
        let root = grammars.context().uri_id("urn:test").and_then(|uri| {
            grammars
                .context()
                .uri(uri)
                .unwrap()
                .qname_by_name("root")
                .map(|q| q.id())
        });
        let root = root.unwrap();
        let grammar_id = grammars
            .context()
            .qname(root)
            .unwrap()
            .global_start_element()
            .unwrap();
        assert_eq!(grammars.grammar(grammar_id).label(), GrammarLabel::FirstStartTag);
    }
}
