//! Tristore is an in-memory [RDF](https://www.w3.org/TR/rdf11-concepts/)
//! triple store with a small composable query engine and a concurrent
//! read-only HTTP query server.
//!
//! The store interns RDF terms into a dense id space, keeps the graph as
//! paired vertex and edge arenas threaded into per-vertex adjacency lists,
//! and answers pattern-matching queries with a recursive backtracking
//! matcher. A store is built single-threaded through [`StoreBuilder`],
//! frozen into an immutable [`Store`] and then shared without locking by the
//! server worker pool.
//!
//! Usage example:
//! ```
//! use tristore::model::Term;
//! use tristore::store::StoreBuilder;
//!
//! let mut builder = StoreBuilder::new();
//! let s = builder.intern(Term::iri("http://example.com/s"))?;
//! let p = builder.intern(Term::iri("http://example.com/p"))?;
//! let o = builder.intern(Term::simple_literal("hello"))?;
//! builder.add_triple(s, p, o, 0)?;
//!
//! let store = builder.freeze();
//! assert_eq!(store.len(), 1);
//! # Result::<_, tristore::error::StoreError>::Ok(())
//! ```

pub mod command;
pub mod dictionary;
pub mod error;
pub mod ingest;
pub mod model;
pub mod query;
pub mod results;
pub mod server;
pub mod snapshot;
pub mod store;

pub use crate::model::{Term, TermId};
pub use crate::query::Query;
pub use crate::store::{Store, StoreBuilder};
