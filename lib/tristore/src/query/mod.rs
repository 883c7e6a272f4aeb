//! The query engine: variable tables, binding arrays, the operator chain
//! and the recursive evaluation driver.
//!
//! Operators form an ordered chain. Evaluation streams bindings through the
//! chain by recursive continuation; materializing operators (sort/unique)
//! absorb the stream into a table which the driver drains through the rest
//! of the chain once the streaming pass is exhausted.

pub mod bgp;
pub mod filter;
pub mod path;
pub mod project;
pub mod sort;

pub use self::bgp::Bgp;
pub use self::filter::{Filter, StringArg};
pub use self::path::{Path, PathKind};
pub use self::project::Project;
pub use self::sort::{Sort, Table};

use crate::model::TermId;
use crate::store::Store;
use std::io;
use std::num::NonZeroU32;

/// A 1-based query variable id.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
pub struct VariableId(NonZeroU32);

impl VariableId {
    #[inline]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    #[inline]
    fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

/// Either a concrete interned term or a variable slot.
///
/// This is the typed form of the reference convention of overloading the
/// sign of an id.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum TermOrVar {
    Term(TermId),
    Var(VariableId),
}

/// The per-query variable name table, 1-based.
#[derive(Debug, Default, Clone)]
pub struct VariableTable {
    names: Vec<String>,
}

impl VariableTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of declared variables.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Looks a name up, ignoring a leading `?`.
    pub fn get(&self, name: &str) -> Option<VariableId> {
        let name = name.strip_prefix('?').unwrap_or(name);
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| VariableId::new(i as u32 + 1).expect("1-based"))
    }

    /// Introduces a variable, reusing the id of an existing name.
    pub fn get_or_add(&mut self, name: &str) -> VariableId {
        let name = name.strip_prefix('?').unwrap_or(name);
        if let Some(id) = self.get(name) {
            return id;
        }
        self.names.push(name.to_owned());
        VariableId::new(self.names.len() as u32).expect("1-based")
    }

    #[inline]
    pub fn name(&self, id: VariableId) -> &str {
        &self.names[id.index()]
    }

    /// `(id, name)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (VariableId, &str)> {
        self.names.iter().enumerate().map(|(i, name)| {
            (
                VariableId::new(i as u32 + 1).expect("1-based"),
                name.as_str(),
            )
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = VariableId> + 'static {
        let len = self.names.len() as u32;
        (1..=len).map(|id| VariableId::new(id).expect("1-based"))
    }
}

/// A partial assignment of variables to term ids for one candidate
/// solution. Allocated once per top-level match invocation and mutated in
/// place during recursion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bindings {
    slots: Box<[Option<TermId>]>,
}

impl Bindings {
    pub fn new(width: usize) -> Self {
        Self {
            slots: vec![None; width].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn get(&self, var: VariableId) -> Option<TermId> {
        self.slots.get(var.index()).copied().flatten()
    }

    #[inline]
    pub fn set(&mut self, var: VariableId, id: TermId) {
        self.slots[var.index()] = Some(id);
    }

    #[inline]
    pub fn clear(&mut self, var: VariableId) {
        self.slots[var.index()] = None;
    }

    /// A detachable copy of the slot array, for materialization.
    #[inline]
    pub fn to_row(&self) -> Box<[Option<TermId>]> {
        self.slots.clone()
    }

    pub(crate) fn from_row(row: Box<[Option<TermId>]>) -> Self {
        Self { slots: row }
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<TermId>> + '_ {
        self.slots.iter().copied()
    }
}

/// Why evaluation stopped before the stream was exhausted.
#[derive(Debug)]
pub enum Interrupt {
    /// A handler asked to stop (row limit, client gone).
    Stop,
    /// Writing a result failed; the query's output is aborted.
    Io(io::Error),
}

impl From<io::Error> for Interrupt {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

pub(crate) type EvalResult = Result<(), Interrupt>;

/// Receives the preamble and each result row of a query run.
pub trait SolutionHandler {
    /// Called once before the first solution.
    fn preamble(&mut self, query: &Query) -> io::Result<()> {
        let _ = query;
        Ok(())
    }

    /// Called once per solution. Return [`Interrupt::Stop`] to terminate
    /// the run early without an error.
    fn solution(&mut self, query: &Query, bindings: &Bindings) -> EvalResult;
}

/// One node of the operator chain.
#[derive(Debug)]
pub enum QueryOp {
    Bgp(Bgp),
    Filter(Filter),
    Path(Path),
    Project(Project),
    Sort(Sort),
}

/// A query: a variable table plus an ordered operator chain.
#[derive(Debug, Default)]
pub struct Query {
    variables: VariableTable,
    ops: Vec<QueryOp>,
}

impl Query {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    #[inline]
    pub fn variables_mut(&mut self) -> &mut VariableTable {
        &mut self.variables
    }

    #[inline]
    pub fn ops(&self) -> &[QueryOp] {
        &self.ops
    }

    /// Appends an operator to the tail of the chain.
    #[inline]
    pub fn add_op(&mut self, op: QueryOp) {
        self.ops.push(op);
    }

    /// Runs the query to completion, feeding `handler`.
    ///
    /// The streaming pass walks the chain head to tail; materializing
    /// operators collect rows instead of forwarding them. The draining pass
    /// then sorts each collected table in chain order and feeds its rows to
    /// the operators after it.
    pub fn execute(
        &self,
        store: &Store,
        handler: &mut impl SolutionHandler,
    ) -> io::Result<()> {
        handler.preamble(self)?;
        let mut tables: Vec<Option<Table>> = self
            .ops
            .iter()
            .map(|op| match op {
                QueryOp::Sort(_) => Some(Table::default()),
                _ => None,
            })
            .collect();
        let mut bindings = Bindings::new(self.variables.len());
        match self.eval_from(store, 0, &mut bindings, &mut tables, handler) {
            Ok(()) => {}
            Err(Interrupt::Stop) => return Ok(()),
            Err(Interrupt::Io(e)) => return Err(e),
        }
        for idx in 0..self.ops.len() {
            let Some(mut table) = tables[idx].take() else {
                continue;
            };
            let QueryOp::Sort(sort) = &self.ops[idx] else {
                continue;
            };
            table.sort(store, sort);
            for row in table.into_rows() {
                let mut bindings = Bindings::from_row(row);
                match self.eval_from(store, idx + 1, &mut bindings, &mut tables, handler)
                {
                    Ok(()) => {}
                    Err(Interrupt::Stop) => return Ok(()),
                    Err(Interrupt::Io(e)) => return Err(e),
                }
            }
        }
        Ok(())
    }

    fn eval_from(
        &self,
        store: &Store,
        idx: usize,
        bindings: &mut Bindings,
        tables: &mut Vec<Option<Table>>,
        handler: &mut impl SolutionHandler,
    ) -> EvalResult {
        let Some(op) = self.ops.get(idx) else {
            return handler.solution(self, bindings);
        };
        match op {
            QueryOp::Bgp(bgp) => bgp.eval(store, 0, bindings, &mut |b| {
                self.eval_from(store, idx + 1, b, tables, handler)
            }),
            QueryOp::Filter(f) => {
                if f.matches(store, bindings) {
                    self.eval_from(store, idx + 1, bindings, tables, handler)
                } else {
                    Ok(())
                }
            }
            QueryOp::Path(path) => path.eval(store, bindings, &mut |b| {
                self.eval_from(store, idx + 1, b, tables, handler)
            }),
            QueryOp::Project(project) => {
                project.apply(bindings);
                self.eval_from(store, idx + 1, bindings, tables, handler)
            }
            QueryOp::Sort(_) => {
                let table = tables[idx]
                    .as_mut()
                    .expect("sort ops always carry a table");
                table.push(bindings);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;
    use crate::store::StoreBuilder;

    pub(crate) struct Collect {
        pub rows: Vec<Vec<Option<TermId>>>,
    }

    impl SolutionHandler for Collect {
        fn solution(&mut self, _query: &Query, bindings: &Bindings) -> EvalResult {
            self.rows.push(bindings.iter().collect());
            Ok(())
        }
    }

    pub(crate) fn run(store: &Store, query: &Query) -> Vec<Vec<Option<TermId>>> {
        let mut collect = Collect { rows: Vec::new() };
        query.execute(store, &mut collect).unwrap();
        collect.rows
    }

    #[test]
    fn variable_table_reuses_names() {
        let mut table = VariableTable::new();
        let a = table.get_or_add("?s");
        let b = table.get_or_add("s");
        assert_eq!(a, b);
        assert_eq!(1, table.len());
        assert_eq!(Some(a), table.get("?s"));
        assert_eq!("s", table.name(a));
    }

    #[test]
    fn empty_chain_emits_the_empty_binding_once() {
        let mut builder = StoreBuilder::new();
        let a = builder.intern(Term::iri("http://example.com/a")).unwrap();
        builder.add_triple(a, a, a, 0).unwrap();
        let store = builder.freeze();
        let query = Query::new();
        assert_eq!(vec![Vec::<Option<TermId>>::new()], run(&store, &query));
    }

    #[test]
    fn handler_stop_is_not_an_error() {
        struct StopAtOnce;
        impl SolutionHandler for StopAtOnce {
            fn solution(&mut self, _: &Query, _: &Bindings) -> EvalResult {
                Err(Interrupt::Stop)
            }
        }
        let store = StoreBuilder::new().freeze();
        let query = Query::new();
        assert!(query.execute(&store, &mut StopAtOnce).is_ok());
    }
}
