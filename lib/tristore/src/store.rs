//! The graph store: paired vertex and edge arenas forming doubly-threaded
//! adjacency lists, plus the primitive triple matcher.
//!
//! [`StoreBuilder`] is the single-threaded mutable form used during ingest;
//! [`StoreBuilder::freeze`] turns it into an immutable [`Store`] that can be
//! shared by reference across server workers without locking.

use crate::dictionary::TermDictionary;
use crate::error::{ResourceError, StoreError};
use crate::model::{self, Term, TermId};
use std::fmt;
use std::fmt::Write;
use std::sync::Arc;

/// One vertex per interned term id. Vertex 0 is reserved.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub(crate) term: Arc<Term>,
    pub(crate) mtime: u64,
    pub(crate) out_degree: u32,
    pub(crate) in_degree: u32,
    pub(crate) out_head: u32,
    pub(crate) in_head: u32,
}

impl Vertex {
    #[inline]
    pub fn term(&self) -> &Term {
        &self.term
    }

    /// Timestamp of the last triple insertion touching this vertex.
    #[inline]
    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    #[inline]
    pub fn out_degree(&self) -> u32 {
        self.out_degree
    }

    #[inline]
    pub fn in_degree(&self) -> u32 {
        self.in_degree
    }

    #[inline]
    pub fn out_head(&self) -> u32 {
        self.out_head
    }

    #[inline]
    pub fn in_head(&self) -> u32 {
        self.in_head
    }
}

/// One edge per inserted triple. Edge 0 is the end-of-list sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Edge {
    pub(crate) s: u32,
    pub(crate) p: u32,
    pub(crate) o: u32,
    pub(crate) next_in: u32,
    pub(crate) next_out: u32,
}

/// A single position of a triple pattern handed to the primitive matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTerm {
    /// Must equal this concrete term.
    Bound(TermId),
    /// Matches anything.
    Any,
    /// Matches anything, but positions carrying an equal tag must resolve
    /// to the same term in each produced triple.
    Var(u32),
}

impl PatternTerm {
    #[inline]
    fn bound(self) -> Option<TermId> {
        match self {
            Self::Bound(id) => Some(id),
            Self::Any | Self::Var(_) => None,
        }
    }

    #[inline]
    fn accepts(self, id: TermId) -> bool {
        match self {
            Self::Bound(want) => want == id,
            Self::Any | Self::Var(_) => true,
        }
    }
}

/// An (s, p, o) pattern for [`Store::match_triple`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriplePattern {
    pub s: PatternTerm,
    pub p: PatternTerm,
    pub o: PatternTerm,
}

impl TriplePattern {
    #[inline]
    pub fn new(s: PatternTerm, p: PatternTerm, o: PatternTerm) -> Self {
        Self { s, p, o }
    }

    /// Equality constraints implied by repeated variable tags, resolved
    /// before iteration so the per-result path stays allocation-free.
    fn repeated(&self) -> Repeated {
        let tag = |t: PatternTerm| match t {
            PatternTerm::Var(v) => Some(v),
            PatternTerm::Bound(_) | PatternTerm::Any => None,
        };
        let (s, p, o) = (tag(self.s), tag(self.p), tag(self.o));
        Repeated {
            sp: s.is_some() && s == p,
            so: s.is_some() && s == o,
            po: p.is_some() && p == o,
        }
    }
}

#[derive(Clone, Copy)]
struct Repeated {
    sp: bool,
    so: bool,
    po: bool,
}

impl Repeated {
    #[inline]
    fn check(self, s: TermId, p: TermId, o: TermId) -> bool {
        (!self.sp || s == p) && (!self.so || s == o) && (!self.po || p == o)
    }
}

/// The immutable, concurrently shareable triple store.
#[derive(Debug, Clone)]
pub struct Store {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    dictionary: TermDictionary,
    bnode_prefix: u32,
}

impl Default for Store {
    fn default() -> Self {
        Self::with_reserved_slots(0, 0)
    }
}

impl Store {
    fn with_reserved_slots(nodes: usize, edges: usize) -> Self {
        let reserved = Arc::new(Term::Iri(String::new()));
        let mut vertices = Vec::with_capacity(nodes.saturating_add(1));
        vertices.push(Vertex {
            term: reserved,
            mtime: 0,
            out_degree: 0,
            in_degree: 0,
            out_head: 0,
            in_head: 0,
        });
        let mut edge_arena = Vec::with_capacity(edges.saturating_add(1));
        edge_arena.push(Edge::default());
        Self {
            vertices,
            edges: edge_arena,
            dictionary: TermDictionary::new(),
            bnode_prefix: 0,
        }
    }

    /// The number of stored triples.
    #[inline]
    pub fn len(&self) -> usize {
        self.edges.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of interned terms.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.vertices.len() - 1
    }

    /// Constant-time reverse lookup through the vertex arena.
    #[inline]
    pub fn term(&self, id: TermId) -> Option<&Term> {
        self.vertex(id).map(Vertex::term)
    }

    #[inline]
    pub fn vertex(&self, id: TermId) -> Option<&Vertex> {
        self.vertices.get(id.get() as usize)
    }

    /// Non-creating dictionary lookup.
    #[inline]
    pub fn lookup(&self, term: &Term) -> Option<TermId> {
        self.dictionary.get(term)
    }

    /// All term ids, ascending.
    pub fn term_ids(&self) -> impl Iterator<Item = TermId> + '_ {
        (1..self.vertices.len() as u32).map(|id| TermId::new(id).expect("non-zero"))
    }

    pub(crate) fn from_loaded(
        vertices: Vec<Vertex>,
        edges: Vec<Edge>,
        dictionary: TermDictionary,
        bnode_prefix: u32,
    ) -> Self {
        Self {
            vertices,
            edges,
            dictionary,
            bnode_prefix,
        }
    }

    pub(crate) fn edge(&self, idx: u32) -> &Edge {
        &self.edges[idx as usize]
    }

    pub(crate) fn edge_count_raw(&self) -> u32 {
        (self.edges.len() - 1) as u32
    }

    pub(crate) fn vertex_raw(&self, id: u32) -> &Vertex {
        &self.vertices[id as usize]
    }

    /// The primitive pattern iterator.
    ///
    /// Dispatch: a bound subject walks its out-list, else a bound object
    /// walks its in-list, else every vertex's out-list is scanned in
    /// ascending id order. The predicate is always post-filtered. `visit`
    /// terminates iteration early by returning `Err`.
    pub fn match_triple<E, F>(&self, pattern: TriplePattern, visit: &mut F) -> Result<(), E>
    where
        F: FnMut(TermId, TermId, TermId) -> Result<(), E>,
    {
        let repeated = pattern.repeated();
        let mut emit = |s: TermId, p: TermId, o: TermId| {
            if repeated.check(s, p, o) {
                visit(s, p, o)
            } else {
                Ok(())
            }
        };
        if let Some(s) = pattern.s.bound() {
            if self.vertex(s).is_none() {
                return Ok(());
            }
            self.walk_out(s, pattern.p, pattern.o, &mut emit)
        } else if let Some(o) = pattern.o.bound() {
            if self.vertex(o).is_none() {
                return Ok(());
            }
            let mut idx = self.vertex_raw(o.get()).in_head;
            while idx != 0 {
                let edge = *self.edge(idx);
                let s = TermId::new(edge.s).expect("stored edge");
                let p = TermId::new(edge.p).expect("stored edge");
                if pattern.p.accepts(p) && pattern.s.accepts(s) {
                    emit(s, p, o)?;
                }
                idx = edge.next_in;
            }
            Ok(())
        } else {
            for s in self.term_ids() {
                self.walk_out(s, pattern.p, pattern.o, &mut emit)?;
            }
            Ok(())
        }
    }

    fn walk_out<E, F>(
        &self,
        s: TermId,
        p: PatternTerm,
        o: PatternTerm,
        emit: &mut F,
    ) -> Result<(), E>
    where
        F: FnMut(TermId, TermId, TermId) -> Result<(), E>,
    {
        let mut idx = self.vertex_raw(s.get()).out_head;
        while idx != 0 {
            let edge = *self.edge(idx);
            let ep = TermId::new(edge.p).expect("stored edge");
            let eo = TermId::new(edge.o).expect("stored edge");
            if p.accepts(ep) && o.accepts(eo) {
                emit(s, ep, eo)?;
            }
            idx = edge.next_out;
        }
        Ok(())
    }

    /// All stored triples in global scan order (ascending subject id, then
    /// LIFO within each out-list).
    pub fn triples(&self) -> impl Iterator<Item = (TermId, TermId, TermId)> + '_ {
        self.term_ids().flat_map(move |s| OutEdges {
            store: self,
            idx: self.vertex_raw(s.get()).out_head,
        })
    }

    /// Formats a term in its N-Triples style surface form.
    pub fn term_display(&self, id: TermId) -> TermDisplay<'_> {
        TermDisplay { store: self, id }
    }

    pub(crate) fn format_term(&self, id: TermId, out: &mut String) -> fmt::Result {
        let Some(term) = self.term(id) else {
            return Err(fmt::Error);
        };
        match term {
            Term::Iri(value) => write!(out, "<{value}>"),
            Term::Blank { value, .. } => write!(out, "_:{value}"),
            Term::StringLiteral(value) => write_quoted(out, value),
            Term::LangLiteral { value, language } => {
                write_quoted(out, value)?;
                write!(out, "@{language}")
            }
            Term::TypedLiteral {
                value, datatype, ..
            } => {
                let datatype_iri = self.term(*datatype).ok_or(fmt::Error)?.value();
                if model::is_numeric_datatype(datatype_iri) {
                    out.push_str(value);
                    Ok(())
                } else {
                    write_quoted(out, value)?;
                    write!(out, "^^<{datatype_iri}>")
                }
            }
        }
    }
}

fn write_quoted(out: &mut String, value: &str) -> fmt::Result {
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    Ok(())
}

/// Borrowed display of one interned term.
pub struct TermDisplay<'a> {
    store: &'a Store,
    id: TermId,
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = String::new();
        self.store.format_term(self.id, &mut buffer)?;
        f.write_str(&buffer)
    }
}

struct OutEdges<'a> {
    store: &'a Store,
    idx: u32,
}

impl Iterator for OutEdges<'_> {
    type Item = (TermId, TermId, TermId);

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx == 0 {
            return None;
        }
        let edge = *self.store.edge(self.idx);
        self.idx = edge.next_out;
        Some((
            TermId::new(edge.s).expect("stored edge"),
            TermId::new(edge.p).expect("stored edge"),
            TermId::new(edge.o).expect("stored edge"),
        ))
    }
}

/// The mutable, single-threaded ingest form of the store.
///
/// Dereferences to [`Store`] for every read operation.
#[derive(Debug, Default)]
pub struct StoreBuilder {
    inner: Store,
}

impl StoreBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes the arenas; they still grow by doubling on exhaustion.
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            inner: Store::with_reserved_slots(nodes, edges),
        }
    }

    /// Interns a term, returning the existing id when the term is already
    /// structurally present.
    ///
    /// Typed literals are validated against their (already interned)
    /// datatype; XSD numeric literals get their numeric cache populated
    /// here.
    pub fn intern(&mut self, term: Term) -> Result<TermId, StoreError> {
        let term = match term {
            Term::TypedLiteral {
                value, datatype, ..
            } => {
                let datatype_iri = self
                    .inner
                    .term(datatype)
                    .ok_or(StoreError::UndefinedTerm)?
                    .value()
                    .to_owned();
                let numeric = model::validate_typed_value(&value, &datatype_iri)?;
                Term::TypedLiteral {
                    value,
                    datatype,
                    numeric,
                }
            }
            other => other,
        };
        if let Some(id) = self.inner.dictionary.get(&term) {
            return Ok(id);
        }
        let raw = u32::try_from(self.inner.vertices.len())
            .map_err(|_| ResourceError::IdSpaceExhausted("vertices"))?;
        let id = TermId::new(raw).ok_or(ResourceError::IdSpaceExhausted("vertices"))?;
        let term = Arc::new(term);
        self.inner.vertices.push(Vertex {
            term: Arc::clone(&term),
            mtime: 0,
            out_degree: 0,
            in_degree: 0,
            out_head: 0,
            in_head: 0,
        });
        self.inner.dictionary.insert(term, id);
        Ok(id)
    }

    /// Appends an edge and prepends it to the subject's out-list and the
    /// object's in-list. Duplicate triples are kept; the store is a
    /// multigraph.
    pub fn add_triple(
        &mut self,
        s: TermId,
        p: TermId,
        o: TermId,
        mtime: u64,
    ) -> Result<(), StoreError> {
        let nodes = self.inner.vertices.len();
        if [s, p, o]
            .iter()
            .any(|id| id.get() as usize >= nodes)
        {
            return Err(StoreError::UndefinedTerm);
        }
        let edge_idx = u32::try_from(self.inner.edges.len())
            .map_err(|_| ResourceError::IdSpaceExhausted("edges"))?;
        let subject = &mut self.inner.vertices[s.get() as usize];
        let next_out = subject.out_head;
        subject.out_head = edge_idx;
        subject.out_degree += 1;
        subject.mtime = mtime;
        let object = &mut self.inner.vertices[o.get() as usize];
        let next_in = object.in_head;
        object.in_head = edge_idx;
        object.in_degree += 1;
        object.mtime = mtime;
        self.inner.edges.push(Edge {
            s: s.get(),
            p: p.get(),
            o: o.get(),
            next_in,
            next_out,
        });
        Ok(())
    }

    /// A fresh blank-node prefix for one ingest session.
    pub fn next_bnode_prefix(&mut self) -> u32 {
        self.inner.bnode_prefix += 1;
        self.inner.bnode_prefix
    }

    /// Atomically replaces the dictionary and arenas with a snapshot's
    /// content. Loading is not incremental.
    pub fn load_snapshot(
        &mut self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), crate::error::SnapshotError> {
        self.inner = crate::snapshot::load_from_path(path)?;
        Ok(())
    }

    /// Flips the store read-only. The returned [`Store`] is safe to share
    /// by reference across threads; no further mutation is possible.
    #[inline]
    pub fn freeze(self) -> Store {
        self.inner
    }
}

impl std::ops::Deref for StoreBuilder {
    type Target = Store;

    #[inline]
    fn deref(&self) -> &Store {
        &self.inner
    }
}
