//! Error taxonomy shared by the store, the query engine and the server.

use std::io;

/// An error raised while turning text into a [`Term`](crate::model::Term).
///
/// Lexical errors during ingest are logged and the offending triple is
/// skipped; lexical errors in the command language abort the request.
#[derive(Debug, thiserror::Error)]
pub enum LexicalError {
    /// The language tag does not fit the 7-bytes-plus-NUL packed slot.
    #[error("language tags can use at most 7 bytes, '{0}' is longer")]
    LanguageTagTooLong(String),
    /// The language tag is not well-formed according to BCP47.
    #[error(transparent)]
    InvalidLanguageTag(#[from] oxilangtag::LanguageTagParseError),
    /// The IRI is not valid.
    #[error(transparent)]
    InvalidIri(#[from] oxiri::IriParseError),
    /// The lexical form does not match the value space of its datatype.
    #[error("'{value}' is not a valid lexical form for <{datatype}>")]
    InvalidLexicalForm { value: String, datatype: String },
    /// A term token in the command language could not be parsed.
    #[error("cannot parse term token {0:?}")]
    InvalidTermToken(String),
}

/// An error raised while assembling a query object.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    /// Every pattern after the first must share a variable with an earlier one.
    #[error("BGP with cartesian products are not allowed")]
    CartesianBgp,
    /// A BGP needs `3k` term positions, `k > 0`.
    #[error("BGP requires a non-empty multiple of 3 term positions, found {0}")]
    BadBgpShape(usize),
    /// The verb is only meaningful between `begin` and `end`.
    #[error("{0} can only be used during query construction")]
    OutsideConstruction(&'static str),
    /// The verb needs a query under construction and none exists.
    #[error("no query object present in {0}")]
    NoQuery(&'static str),
    /// A variable name was referenced before being introduced.
    #[error("no such variable ?{0}")]
    UnknownVariable(String),
    /// A term token named a term that is not in the dictionary.
    #[error("no node ID found for term {0:?}")]
    UnknownTerm(String),
    /// A query under construction already carries a BGP.
    #[error("cannot add a BGP to an existing query")]
    BgpAlreadyPresent,
    /// The named filter operation is not part of the vocabulary.
    #[error("unrecognized filter operation {0:?}")]
    UnknownFilterOp(String),
    /// A string filter argument must be a literal.
    #[error("non-literal value passed to filter")]
    NonLiteralFilterArg,
    /// The regex pattern failed to compile.
    #[error(transparent)]
    InvalidRegex(#[from] regex::Error),
    /// Path operators take one concrete predicate.
    #[error("path predicates must be concrete terms")]
    VariablePathPredicate,
    /// Mutation was attempted against a frozen store.
    #[error("the store is read-only")]
    ReadOnly,
}

/// Exhaustion of a fixed resource (id spaces, buffers).
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("exhausted the 32-bit id space for {0}")]
    IdSpaceExhausted(&'static str),
}

/// An error raised while reading or writing a binary snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The file is not a snapshot or its invariants do not hold.
    #[error("corrupted snapshot: {0}")]
    Corruption(String),
    #[error(transparent)]
    Lexical(#[from] LexicalError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl SnapshotError {
    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }
}

/// An error raised while ingesting an RDF document.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The underlying parser found unrecoverable syntax errors.
    #[error(transparent)]
    Syntax(#[from] oxttl::TurtleParseError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("cannot guess an RDF format for {0:?}")]
    UnknownFormat(String),
}

/// Any error the store can produce on its own.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Lexical(#[from] LexicalError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// `add_triple` rejects undefined (zero) term positions.
    #[error("triples require defined subject, predicate and object terms")]
    UndefinedTerm,
    /// Mutation was attempted against a frozen store.
    #[error("the store is read-only")]
    ReadOnly,
}

/// Any error a command can produce: the message of the first one reaches
/// the client as the `400 Bad Request` body.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Lexical(#[from] LexicalError),
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("insufficient arguments passed to {0}")]
    MissingArguments(&'static str),
    #[error("invalid argument {0:?} passed to {1}")]
    InvalidArgument(String, &'static str),
    #[error("unrecognized operation {0:?}")]
    UnknownCommand(String),
}

/// An HTTP framing error on a server connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("missing or malformed Content-Length header")]
    BadContentLength,
    #[error("request body of {got} bytes exceeds the {max} byte buffer")]
    BodyTooLarge { got: usize, max: usize },
    #[error("unexpected NUL byte in request body")]
    NulInBody,
    #[error("request body is not UTF-8")]
    BadEncoding,
}
