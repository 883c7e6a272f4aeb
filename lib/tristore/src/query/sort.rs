//! The materializing sort/unique operator and its result table.

use crate::model::TermId;
use crate::query::{Bindings, VariableId};
use crate::store::Store;
use std::cmp::Ordering;

/// Sort keys plus the optional adjacent-duplicate collapse.
#[derive(Debug, Clone)]
pub struct Sort {
    keys: Vec<VariableId>,
    unique: bool,
}

impl Sort {
    pub fn new(keys: Vec<VariableId>, unique: bool) -> Self {
        Self { keys, unique }
    }

    /// A `unique` operator sorting on every variable of the query.
    pub fn unique_over(width: usize) -> Self {
        let keys = (1..=width as u32)
            .map(|id| VariableId::new(id).expect("1-based"))
            .collect();
        Self::new(keys, true)
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

/// The buffered rows of one materializing operator.
#[derive(Debug, Default)]
pub struct Table {
    rows: Vec<Box<[Option<TermId>]>>,
}

impl Table {
    #[inline]
    pub(crate) fn push(&mut self, bindings: &Bindings) {
        self.rows.push(bindings.to_row());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorts by the configured key vector, then collapses adjacent
    /// duplicate rows when the operator is `unique`. Stability is not
    /// required.
    pub(crate) fn sort(&mut self, store: &Store, sort: &Sort) {
        self.rows
            .sort_unstable_by(|a, b| compare_rows(store, a, b, &sort.keys));
        if sort.unique {
            self.rows.dedup();
        }
    }

    pub(crate) fn into_rows(self) -> impl Iterator<Item = Box<[Option<TermId>]>> {
        self.rows.into_iter()
    }
}

fn compare_rows(
    store: &Store,
    a: &[Option<TermId>],
    b: &[Option<TermId>],
    keys: &[VariableId],
) -> Ordering {
    for key in keys {
        let i = key.get() as usize - 1;
        let ordering = compare_slots(store, a.get(i).copied().flatten(), b.get(i).copied().flatten());
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// The term comparison behind `sort`:
/// unbound last, numerics by value, then a numeric ranks after any
/// non-numeric, then serialized forms bytewise.
fn compare_slots(store: &Store, a: Option<TermId>, b: Option<TermId>) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => (a, b),
    };
    let (ta, tb) = match (store.term(a), store.term(b)) {
        (Some(ta), Some(tb)) => (ta, tb),
        _ => return Ordering::Equal,
    };
    match (ta.numeric_value(), tb.numeric_value()) {
        (Some(na), Some(nb)) => na.partial_cmp(&nb).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => {
            let mut sa = String::new();
            let mut sb = String::new();
            let _ = store.format_term(a, &mut sa);
            let _ = store.format_term(b, &mut sb);
            sa.as_bytes().cmp(sb.as_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;
    use crate::store::StoreBuilder;

    fn row(ids: &[Option<TermId>]) -> Box<[Option<TermId>]> {
        ids.to_vec().into_boxed_slice()
    }

    fn push_row(table: &mut Table, ids: &[Option<TermId>]) {
        table.rows.push(row(ids));
    }

    #[test]
    fn unbound_sorts_last() {
        let mut builder = StoreBuilder::new();
        let a = builder.intern(Term::iri("http://example.com/a")).unwrap();
        let store = builder.freeze();
        let var = VariableId::new(1).unwrap();
        let mut table = Table::default();
        push_row(&mut table, &[None]);
        push_row(&mut table, &[Some(a)]);
        table.sort(&store, &Sort::new(vec![var], false));
        assert_eq!(vec![row(&[Some(a)]), row(&[None])], table.rows);
    }

    #[test]
    fn numerics_compare_by_value_and_rank_after_strings() {
        let mut builder = StoreBuilder::new();
        let dt = builder
            .intern(Term::iri(crate::model::vocab::xsd::INTEGER))
            .unwrap();
        let two = builder.intern(Term::typed_literal("2", dt)).unwrap();
        let ten = builder.intern(Term::typed_literal("10", dt)).unwrap();
        let word = builder.intern(Term::simple_literal("zebra")).unwrap();
        let store = builder.freeze();
        let var = VariableId::new(1).unwrap();
        let mut table = Table::default();
        push_row(&mut table, &[Some(ten)]);
        push_row(&mut table, &[Some(word)]);
        push_row(&mut table, &[Some(two)]);
        table.sort(&store, &Sort::new(vec![var], false));
        // non-numeric first, then numerics by value
        assert_eq!(
            vec![row(&[Some(word)]), row(&[Some(two)]), row(&[Some(ten)])],
            table.rows
        );
    }

    #[test]
    fn lexical_fallback_compares_serialized_forms() {
        let mut builder = StoreBuilder::new();
        let a = builder.intern(Term::iri("http://example.com/a")).unwrap();
        let b = builder.intern(Term::iri("http://example.com/b")).unwrap();
        let store = builder.freeze();
        let var = VariableId::new(1).unwrap();
        let mut table = Table::default();
        push_row(&mut table, &[Some(b)]);
        push_row(&mut table, &[Some(a)]);
        table.sort(&store, &Sort::new(vec![var], false));
        assert_eq!(vec![row(&[Some(a)]), row(&[Some(b)])], table.rows);
    }

    #[test]
    fn unique_collapses_adjacent_duplicates() {
        let mut builder = StoreBuilder::new();
        let a = builder.intern(Term::iri("http://example.com/a")).unwrap();
        let b = builder.intern(Term::iri("http://example.com/b")).unwrap();
        let store = builder.freeze();
        let mut table = Table::default();
        push_row(&mut table, &[Some(b)]);
        push_row(&mut table, &[Some(a)]);
        push_row(&mut table, &[Some(b)]);
        push_row(&mut table, &[Some(a)]);
        table.sort(&store, &Sort::unique_over(1));
        assert_eq!(vec![row(&[Some(a)]), row(&[Some(b)])], table.rows);
        // no two adjacent rows are equal
        for pair in table.rows.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn secondary_keys_break_ties() {
        let mut builder = StoreBuilder::new();
        let a = builder.intern(Term::iri("http://example.com/a")).unwrap();
        let x = builder.intern(Term::iri("http://example.com/x")).unwrap();
        let y = builder.intern(Term::iri("http://example.com/y")).unwrap();
        let store = builder.freeze();
        let k1 = VariableId::new(1).unwrap();
        let k2 = VariableId::new(2).unwrap();
        let mut table = Table::default();
        push_row(&mut table, &[Some(a), Some(y)]);
        push_row(&mut table, &[Some(a), Some(x)]);
        table.sort(&store, &Sort::new(vec![k1, k2], false));
        assert_eq!(
            vec![row(&[Some(a), Some(x)]), row(&[Some(a), Some(y)])],
            table.rows
        );
    }
}
