//! Built-in element grammars learned while a stream runs.
//!
//! The shared grammar set is immutable; everything a stream learns goes
//! into an overlay arena owned by the stream and dropped with it. Both
//! sides of a stream perform identical learning steps after each event,
//! so their overlays stay in lock step.

use std::collections::HashMap;
use std::sync::Arc;

use delegate::delegate;
use tracing::{debug, trace};

use crate::context::{GrammarContext, QNameId};
use crate::events::Event;
use crate::grammar::{Grammar, GrammarId, GrammarLabel, Grammars, Production};

/// The per-stream grammar arena: the shared immutable set plus learned
/// element grammars.
pub(crate) struct GrammarPool {
    base: Arc<Grammars>,
    learned: Vec<Grammar>,
    element_grammars: HashMap<QNameId, GrammarId>,
    /// Shared non-learning grammar handed out once the element grammar
    /// cap is reached.
    fallback: Option<GrammarId>,
    created_grammars: usize,
    learned_productions: usize,
    max_built_in_element_grammars: Option<usize>,
    max_built_in_productions: Option<usize>,
}

impl GrammarPool {
    /// Creates the overlay. The profile caps are forced off when the
    /// base set is schema informed.
    pub fn new(
        base: Arc<Grammars>,
        max_built_in_element_grammars: Option<usize>,
        max_built_in_productions: Option<usize>,
    ) -> Self {
        let (max_grammars, max_productions) = if base.is_schema_informed() {
            (None, None)
        } else {
            (max_built_in_element_grammars, max_built_in_productions)
        };
        GrammarPool {
            base,
            learned: Vec::new(),
            element_grammars: HashMap::new(),
            fallback: None,
            created_grammars: 0,
            learned_productions: 0,
            max_built_in_element_grammars: max_grammars,
            max_built_in_productions: max_productions,
        }
    }

    delegate! {
        to self.base {
            /// Was the shared base set derived from a schema?
            pub fn is_schema_informed(&self) -> bool;
            /// Identifier partitions the base set was built against.
            pub fn context(&self) -> &GrammarContext;
        }
    }

    /// The shared base set.
    pub fn base(&self) -> &Arc<Grammars> {
        &self.base
    }

    /// Does `id` point into the overlay of learned grammars?
    pub fn is_overlay(&self, id: GrammarId) -> bool {
        id.0 >= self.base.len()
    }

    /// Grammar lookup across the base set and the overlay.
    pub fn grammar(&self, id: GrammarId) -> &Grammar {
        if id.0 < self.base.len() {
            self.base.grammar(id)
        } else {
            &self.learned[id.0 - self.base.len()]
        }
    }

    fn push(&mut self, grammar: Grammar) -> GrammarId {
        self.learned.push(grammar);
        GrammarId(self.base.len() + self.learned.len() - 1)
    }

    fn next_id(&self) -> GrammarId {
        GrammarId(self.base.len() + self.learned.len())
    }

    /// The tag grammar a start of element `qname` enters: the schema
    /// grammar of a matching global element declaration when one exists,
    /// otherwise the built-in element grammar for that name, created on
    /// first use.
    pub fn element_grammar(&mut self, qname: QNameId) -> GrammarId {
        if let Some(declared) = self
            .base
            .context()
            .qname(qname)
            .and_then(|q| q.global_start_element())
        {
            return declared;
        }
        if let Some(id) = self.element_grammars.get(&qname) {
            return *id;
        }
        let at_cap = self
            .max_built_in_element_grammars
            .map_or(false, |max| self.created_grammars >= max);
        let id = if at_cap {
            let fallback = self.fallback_grammar();
            debug!(
                uri_id = qname.uri_id,
                local_name_id = qname.local_name_id,
                "element grammar cap reached, sharing the fallback grammar"
            );
            fallback
        } else {
            self.created_grammars += 1;
            self.new_element_grammar(true)
        };
        self.element_grammars.insert(qname, id);
        id
    }

    fn fallback_grammar(&mut self) -> GrammarId {
        match self.fallback {
            Some(id) => id,
            None => {
                let id = self.new_element_grammar(false);
                self.fallback = Some(id);
                id
            }
        }
    }

    /// Builds a fresh tag/content grammar pair and returns the tag
    /// grammar id.
    fn new_element_grammar(&mut self, learnable: bool) -> GrammarId {
        let content_id = self.next_id();
        let content = Production {
            event: Event::EndElement,
            next: content_id,
        };
        let make = if learnable {
            Grammar::new_learnable
        } else {
            Grammar::new
        };
        let content_grammar = make(GrammarLabel::ElementContent, vec![content]);
        let pushed = self.push(content_grammar);
        debug_assert_eq!(pushed, content_id);
        self.push(make(GrammarLabel::StartTag, Vec::new()))
    }

    /// Content grammar belonging to a built-in tag grammar. Tag and
    /// content are created as one pair, the content sits right before
    /// the tag in the overlay.
    pub fn content_grammar_of(&self, start_tag: GrammarId) -> GrammarId {
        debug_assert!(start_tag.0 > self.base.len());
        GrammarId(start_tag.0 - 1)
    }

    /// Records a learned production, newest first, unless the grammar
    /// refuses learning or the production cap is reached.
    pub fn learn(&mut self, id: GrammarId, event: Event, next: GrammarId) {
        if id.0 < self.base.len() {
            return;
        }
        if let Some(max) = self.max_built_in_productions {
            if self.learned_productions >= max {
                return;
            }
        }
        let base_len = self.base.len();
        let grammar = &mut self.learned[id.0 - base_len];
        if !grammar.is_learnable() {
            return;
        }
        trace!(?event, "learning production");
        grammar.add_production(event, next);
        self.learned_productions += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn qname(local_name_id: usize) -> QNameId {
        QNameId {
            uri_id: 0,
            local_name_id,
        }
    }

    #[test]
    fn element_grammars_are_created_once() {
        let mut pool = GrammarPool::new(Grammars::schema_less(), None, None);
        let a = pool.element_grammar(qname(0));
        let b = pool.element_grammar(qname(1));
        let again = pool.element_grammar(qname(0));
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(pool.grammar(a).label(), GrammarLabel::StartTag);
        let content = pool.content_grammar_of(a);
        assert_eq!(pool.grammar(content).label(), GrammarLabel::ElementContent);
        assert!(pool.grammar(content).has_end_element());
    }

    #[test]
    fn grammar_cap_shares_one_fallback() {
        let mut pool = GrammarPool::new(Grammars::schema_less(), Some(1), None);
        let first = pool.element_grammar(qname(0));
        let second = pool.element_grammar(qname(1));
        let third = pool.element_grammar(qname(2));
        assert_ne!(first, second);
        assert_eq!(second, third);
        // The fallback never learns.
        pool.learn(second, Event::EndElement, second);
        assert_eq!(pool.grammar(second).productions().len(), 0);
    }

    #[test]
    fn production_cap_stops_learning() {
        let mut pool = GrammarPool::new(Grammars::schema_less(), None, Some(1));
        let tag = pool.element_grammar(qname(0));
        pool.learn(tag, Event::EndElement, tag);
        pool.learn(tag, Event::CharactersGeneric, tag);
        assert_eq!(pool.grammar(tag).productions().len(), 1);
    }

    #[test]
    fn learning_grows_the_first_level() {
        let mut pool = GrammarPool::new(Grammars::schema_less(), None, None);
        let tag = pool.element_grammar(qname(0));
        let content = pool.content_grammar_of(tag);
        pool.learn(tag, Event::EndElement, content);
        pool.learn(tag, Event::CharactersGeneric, content);
        let grammar = pool.grammar(tag);
        assert_eq!(grammar.production(0).unwrap().event, Event::CharactersGeneric);
        assert_eq!(grammar.production(1).unwrap().event, Event::EndElement);
    }
}
