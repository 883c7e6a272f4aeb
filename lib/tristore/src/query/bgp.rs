//! Basic graph patterns: ordered triple patterns joined by shared
//! variables, evaluated as nested loops in declaration order.

use crate::error::ConstructionError;
use crate::query::{Bindings, EvalResult, TermOrVar, VariableId};
use crate::store::{PatternTerm, Store, TriplePattern};

/// A connected sequence of triple patterns.
#[derive(Debug, Clone)]
pub struct Bgp {
    patterns: Vec<[TermOrVar; 3]>,
}

impl Bgp {
    /// Builds a BGP, rejecting cartesian products: every pattern after the
    /// first must share at least one variable with an earlier pattern.
    pub fn new(patterns: Vec<[TermOrVar; 3]>) -> Result<Self, ConstructionError> {
        if patterns.is_empty() {
            return Err(ConstructionError::BadBgpShape(0));
        }
        let mut seen: Vec<VariableId> = Vec::new();
        for (i, pattern) in patterns.iter().enumerate() {
            if i > 0 {
                let joinable = pattern.iter().any(|t| match t {
                    TermOrVar::Var(v) => seen.contains(v),
                    TermOrVar::Term(_) => false,
                });
                if !joinable {
                    return Err(ConstructionError::CartesianBgp);
                }
            }
            for t in pattern {
                if let TermOrVar::Var(v) = t {
                    if !seen.contains(v) {
                        seen.push(*v);
                    }
                }
            }
        }
        Ok(Self { patterns })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    #[inline]
    pub fn patterns(&self) -> &[[TermOrVar; 3]] {
        &self.patterns
    }

    /// Nested-loop evaluation of pattern `current` onward.
    ///
    /// Variables already bound are substituted by their concrete ids;
    /// variables bound here are rewound once the pattern's iteration is
    /// exhausted, so earlier bindings survive backtracking.
    pub(crate) fn eval(
        &self,
        store: &Store,
        current: usize,
        bindings: &mut Bindings,
        next: &mut dyn FnMut(&mut Bindings) -> EvalResult,
    ) -> EvalResult {
        let Some(pattern) = self.patterns.get(current) else {
            return next(bindings);
        };
        let mut fresh = [None; 3];
        let mut resolved = [PatternTerm::Any; 3];
        for (i, term) in pattern.iter().enumerate() {
            resolved[i] = match term {
                TermOrVar::Term(id) => PatternTerm::Bound(*id),
                TermOrVar::Var(v) => match bindings.get(*v) {
                    Some(id) => PatternTerm::Bound(id),
                    None => {
                        fresh[i] = Some(*v);
                        PatternTerm::Var(v.get())
                    }
                },
            };
        }
        let triple = TriplePattern::new(resolved[0], resolved[1], resolved[2]);
        let result = store.match_triple(triple, &mut |s, p, o| {
            for (i, id) in [s, p, o].into_iter().enumerate() {
                if let Some(v) = fresh[i] {
                    bindings.set(v, id);
                }
            }
            self.eval(store, current + 1, bindings, next)
        });
        for v in fresh.into_iter().flatten() {
            bindings.clear(v);
        }
        result
    }
}
