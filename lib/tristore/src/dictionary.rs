//! The term dictionary: a balanced ordered map from structural term
//! identity to dense ids.
//!
//! The map is keyed by the total term order defined on
//! [`Term`](crate::model::Term), so snapshot load can reinsert terms in a
//! stable order. Reverse lookup (`id -> term`) is served in constant time by
//! the vertex arena, not by this map.

use crate::model::{Term, TermId};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct TermDictionary {
    map: BTreeMap<Arc<Term>, TermId>,
}

impl TermDictionary {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-creating lookup.
    #[inline]
    pub fn get(&self, term: &Term) -> Option<TermId> {
        self.map.get(term).copied()
    }

    /// Records `term -> id`. The caller (the store builder) owns id
    /// assignment and must not map two terms to one id.
    #[inline]
    pub fn insert(&mut self, term: Arc<Term>, id: TermId) {
        self.map.insert(term, id);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_structural() {
        let mut dictionary = TermDictionary::new();
        let id = TermId::new(1).unwrap();
        dictionary.insert(Arc::new(Term::iri("http://example.com/a")), id);
        assert_eq!(
            Some(id),
            dictionary.get(&Term::iri("http://example.com/a"))
        );
        assert_eq!(None, dictionary.get(&Term::simple_literal("http://example.com/a")));
    }

    #[test]
    fn distinct_terms_keep_distinct_entries() {
        let mut dictionary = TermDictionary::new();
        dictionary.insert(
            Arc::new(Term::simple_literal("a")),
            TermId::new(1).unwrap(),
        );
        dictionary.insert(
            Arc::new(Term::lang_literal("a", "en").unwrap()),
            TermId::new(2).unwrap(),
        );
        assert_eq!(2, dictionary.len());
    }
}
