//! The parser adapter: bridges the external RDF parsers (`oxttl`) into
//! dictionary and graph insertions.
//!
//! The parsers own all lexical handling of the input document; this module
//! only converts each produced `oxrdf` triple into interned local terms.
//! Term-level lexical failures (an overlong language tag, a numeric literal
//! with a bad lexical form) are logged and the triple is skipped; document
//! syntax errors abort the import.

use crate::error::{ImportError, StoreError};
use crate::model::Term;
use crate::store::StoreBuilder;
use oxttl::{NTriplesParser, TurtleParser};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// The RDF serializations the adapter can route to a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    NTriples,
    Turtle,
}

impl ImportFormat {
    /// Guesses the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("nt") | Some("ntriples") => Ok(Self::NTriples),
            Some("ttl") | Some("turtle") => Ok(Self::Turtle),
            _ => Err(ImportError::UnknownFormat(path.display().to_string())),
        }
    }
}

/// Counters reported after one import session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImportStats {
    /// Triples inserted into the graph.
    pub imported: u64,
    /// Triples dropped because a term failed lexical validation.
    pub skipped: u64,
}

/// Imports an RDF document from a file, guessing the format from its
/// extension.
pub fn import_file(
    builder: &mut StoreBuilder,
    path: impl AsRef<Path>,
) -> Result<ImportStats, ImportError> {
    let path = path.as_ref();
    let format = ImportFormat::from_path(path)?;
    let reader = BufReader::new(File::open(path)?);
    let stats = import_reader(builder, reader, format)?;
    info!(
        path = %path.display(),
        imported = stats.imported,
        skipped = stats.skipped,
        "finished import"
    );
    Ok(stats)
}

/// Imports an RDF document from an arbitrary reader.
///
/// Each call is one ingest session: blank nodes get a fresh session prefix
/// so they never collide with blanks from other documents.
pub fn import_reader(
    builder: &mut StoreBuilder,
    reader: impl Read,
    format: ImportFormat,
) -> Result<ImportStats, ImportError> {
    let start = Instant::now();
    let bnode_prefix = builder.next_bnode_prefix();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut stats = ImportStats::default();

    let mut insert = |builder: &mut StoreBuilder,
                      triple: oxrdf::Triple|
     -> Result<(), ImportError> {
        match insert_triple(builder, triple, bnode_prefix, timestamp) {
            Ok(()) => {
                stats.imported += 1;
                if stats.imported % 250 == 0 {
                    debug!(
                        imported = stats.imported,
                        elapsed = ?start.elapsed(),
                        "import in progress"
                    );
                }
                Ok(())
            }
            Err(StoreError::Lexical(e)) => {
                warn!(error = %e, "skipping triple with invalid term");
                stats.skipped += 1;
                Ok(())
            }
            Err(StoreError::Resource(e)) => Err(e.into()),
            Err(e) => {
                // undefined ids cannot happen for freshly interned terms
                warn!(error = %e, "skipping triple");
                stats.skipped += 1;
                Ok(())
            }
        }
    };

    match format {
        ImportFormat::NTriples => {
            for triple in NTriplesParser::new().for_reader(reader) {
                insert(builder, triple?)?;
            }
        }
        ImportFormat::Turtle => {
            for triple in TurtleParser::new().for_reader(reader) {
                insert(builder, triple?)?;
            }
        }
    }
    Ok(stats)
}

fn insert_triple(
    builder: &mut StoreBuilder,
    triple: oxrdf::Triple,
    bnode_prefix: u32,
    timestamp: u64,
) -> Result<(), StoreError> {
    let s = match triple.subject {
        oxrdf::Subject::NamedNode(n) => builder.intern(Term::iri(n.into_string()))?,
        oxrdf::Subject::BlankNode(n) => {
            builder.intern(Term::blank(n.into_string(), bnode_prefix))?
        }
    };
    let p = builder.intern(Term::iri(triple.predicate.into_string()))?;
    let o = match triple.object {
        oxrdf::Term::NamedNode(n) => builder.intern(Term::iri(n.into_string()))?,
        oxrdf::Term::BlankNode(n) => {
            builder.intern(Term::blank(n.into_string(), bnode_prefix))?
        }
        oxrdf::Term::Literal(literal) => {
            let (value, datatype, language) = literal.destruct();
            if let Some(language) = language {
                builder.intern(Term::lang_literal(value, &language)?)?
            } else if let Some(datatype) = datatype {
                let datatype = builder.intern(Term::iri(datatype.into_string()))?;
                builder.intern(Term::typed_literal(value, datatype))?
            } else {
                builder.intern(Term::simple_literal(value))?
            }
        }
    };
    builder.add_triple(s, p, o, timestamp)
}
