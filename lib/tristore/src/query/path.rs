//! Property path operators: one-or-more (`+`) and zero-or-more (`*`) hops
//! over a single concrete predicate.

use crate::model::TermId;
use crate::query::{Bindings, EvalResult, TermOrVar, VariableId};
use crate::store::{PatternTerm, Store, TriplePattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// One or more hops.
    Plus,
    /// Zero or more hops. The zero-length case is not emitted; see the
    /// reachability note on [`Path::eval`].
    Star,
}

/// A reachability operator between two endpoints over one predicate.
#[derive(Debug, Clone)]
pub struct Path {
    kind: PathKind,
    start: TermOrVar,
    predicate: TermId,
    end: TermOrVar,
}

impl Path {
    #[inline]
    pub fn new(kind: PathKind, start: TermOrVar, predicate: TermId, end: TermOrVar) -> Self {
        Self {
            kind,
            start,
            predicate,
            end,
        }
    }

    #[inline]
    pub fn kind(&self) -> PathKind {
        self.kind
    }

    /// Depth-first reachability from each source.
    ///
    /// An unbound start variable ranges over the deduplicated subjects of
    /// the path predicate. Each source gets a fresh seen-bitmap over all
    /// vertices, so cyclic graphs terminate; a vertex is emitted the first
    /// time it is reached, which means only vertices at least one hop away
    /// appear (the `*` zero-length case is deliberately absent).
    pub(crate) fn eval(
        &self,
        store: &Store,
        bindings: &mut Bindings,
        next: &mut dyn FnMut(&mut Bindings) -> EvalResult,
    ) -> EvalResult {
        let start_var = match self.start {
            TermOrVar::Var(v) if bindings.get(v).is_none() => Some(v),
            _ => None,
        };
        let sources = match start_var {
            Some(_) => self.subjects_of_predicate(store),
            None => {
                let source = match self.start {
                    TermOrVar::Term(id) => id,
                    TermOrVar::Var(v) => bindings.get(v).expect("bound start"),
                };
                vec![source]
            }
        };
        let mut result = Ok(());
        for source in sources {
            if let Some(v) = start_var {
                bindings.set(v, source);
            }
            // resolved after the start binding so `path ?x <p> ?x` asks for
            // cycles instead of rebinding ?x
            let end_var = match self.end {
                TermOrVar::Var(v) if bindings.get(v).is_none() => Some(v),
                _ => None,
            };
            let mut seen = vec![false; store.node_count() + 1];
            result = self.walk(store, source, &mut seen, bindings, end_var, next);
            if let Some(v) = end_var {
                bindings.clear(v);
            }
            if result.is_err() {
                break;
            }
        }
        if let Some(v) = start_var {
            bindings.clear(v);
        }
        result
    }

    fn walk(
        &self,
        store: &Store,
        from: TermId,
        seen: &mut [bool],
        bindings: &mut Bindings,
        end_var: Option<VariableId>,
        next: &mut dyn FnMut(&mut Bindings) -> EvalResult,
    ) -> EvalResult {
        store.match_triple(
            TriplePattern::new(
                PatternTerm::Bound(from),
                PatternTerm::Bound(self.predicate),
                PatternTerm::Any,
            ),
            &mut |_, _, target| {
                if seen[target.get() as usize] {
                    return Ok(());
                }
                seen[target.get() as usize] = true;
                match (end_var, self.end) {
                    (Some(v), _) => {
                        bindings.set(v, target);
                        next(bindings)?;
                    }
                    (None, TermOrVar::Term(end)) => {
                        if target == end {
                            next(bindings)?;
                        }
                    }
                    (None, TermOrVar::Var(v)) => {
                        if bindings.get(v) == Some(target) {
                            next(bindings)?;
                        }
                    }
                }
                self.walk(store, target, seen, bindings, end_var, next)
            },
        )
    }

    /// The deduplicated subjects of the predicate, in ascending id order.
    fn subjects_of_predicate(&self, store: &Store) -> Vec<TermId> {
        let mut present = vec![false; store.node_count() + 1];
        let mut subjects = Vec::new();
        store
            .match_triple::<std::convert::Infallible, _>(
                TriplePattern::new(
                    PatternTerm::Any,
                    PatternTerm::Bound(self.predicate),
                    PatternTerm::Any,
                ),
                &mut |s, _, _| {
                    if !present[s.get() as usize] {
                        present[s.get() as usize] = true;
                        subjects.push(s);
                    }
                    Ok(())
                },
            )
            .unwrap_or_else(|e| match e {});
        subjects
    }
}
