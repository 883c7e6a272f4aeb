//! The command dispatcher: a closed verb vocabulary driving store
//! inspection, query construction and query execution.
//!
//! Verbs split into two groups. In-construction verbs (`begin`, `bgp`,
//! `filter`, `sort`, `project`, `unique`, `path`, `agg`, `end`, `count`)
//! assemble and finally run a query object; immediate verbs act on the
//! store right away. The [`Interpreter`] carries the runtime flags and the
//! query under construction between lines of one request.

pub mod tokens;

pub use self::tokens::{parse_term_token, tokenize, TermToken};

use crate::error::{CommandError, ConstructionError, StoreError};
use crate::ingest;
use crate::model::{Term, TermId};
use crate::query::{
    Bgp, Bindings, Filter, Interrupt, Path, PathKind, Project, Query, QueryOp, Sort,
    SolutionHandler, StringArg, TermOrVar, VariableId,
};
use crate::results::{write_tsv_header, write_tsv_solution, write_tsv_term};
use crate::snapshot;
use crate::store::{PatternTerm, Store, StoreBuilder, TriplePattern};
use std::io::Write;
use std::time::Instant;
use tracing::{info, warn};

/// How the interpreter may touch the store.
///
/// Servers hand out [`StoreAccess::ReadOnly`]; mutating verbs then fail
/// without ever reaching a mutable API.
pub enum StoreAccess<'a> {
    ReadWrite(&'a mut StoreBuilder),
    ReadOnly(&'a Store),
}

impl StoreAccess<'_> {
    #[inline]
    pub fn store(&self) -> &Store {
        match self {
            Self::ReadWrite(builder) => builder,
            Self::ReadOnly(store) => store,
        }
    }

    fn builder(&mut self) -> Result<&mut StoreBuilder, CommandError> {
        match self {
            Self::ReadWrite(builder) => Ok(builder),
            Self::ReadOnly(_) => Err(StoreError::ReadOnly.into()),
        }
    }
}

/// How result rows are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStyle {
    /// TSV result sets with a `?name` header row (the HTTP server).
    Tsv,
    /// `name=term` pairs, one solution per line (the command line).
    Assignments,
}

/// What kind of output a command line produces, for response framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A query result set (a header row plus solution rows).
    Results,
    /// A plain-text listing or report.
    Listing,
}

/// One command session: runtime flags plus the query under construction.
pub struct Interpreter<'a> {
    access: StoreAccess<'a>,
    style: ResultStyle,
    print: bool,
    verbose: bool,
    limit: Option<u64>,
    language: Option<String>,
    constructing: bool,
    query: Option<Query>,
}

impl<'a> Interpreter<'a> {
    pub fn new(access: StoreAccess<'a>, style: ResultStyle) -> Self {
        Self {
            access,
            style,
            print: true,
            verbose: false,
            limit: None,
            language: None,
            constructing: false,
            query: None,
        }
    }

    /// True while a `begin`ed query is still accepting operators.
    #[inline]
    pub fn constructing(&self) -> bool {
        self.constructing
    }

    /// The session language tag, as set by `set language`.
    #[inline]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Whether running this command line starts the response output.
    ///
    /// During construction only `end`, `count` and `agg` produce output;
    /// outside construction everything but `begin` does.
    pub fn starts_output(&self, tokens: &[String]) -> bool {
        let Some(op) = tokens.first() else {
            return false;
        };
        if self.constructing {
            matches!(op.as_str(), "end" | "count" | "agg")
        } else {
            op != "begin"
        }
    }

    /// Classifies the output of a command line: the query-returning verbs
    /// produce result sets, everything else is a plain-text listing.
    pub fn output_kind(tokens: &[String]) -> OutputKind {
        match tokens.first().map(String::as_str) {
            Some("bgp" | "path" | "end" | "count" | "agg") => OutputKind::Results,
            _ => OutputKind::Listing,
        }
    }

    /// Runs one tokenized command line.
    ///
    /// A failing in-construction verb frees the query under construction
    /// and resets the construction state.
    pub fn run(
        &mut self,
        tokens: &[String],
        out: &mut dyn Write,
    ) -> Result<(), CommandError> {
        let result = self.dispatch(tokens, out);
        if result.is_err() && self.constructing {
            self.constructing = false;
            self.query = None;
        }
        result
    }

    fn dispatch(
        &mut self,
        tokens: &[String],
        out: &mut dyn Write,
    ) -> Result<(), CommandError> {
        let Some(op) = tokens.first() else {
            return Ok(());
        };
        let args = &tokens[1..];
        match op.as_str() {
            "" => Ok(()),
            comment if comment.starts_with('#') => Ok(()),
            "help" => self.help(out),
            "set" => self.set_flag(args, true),
            "unset" => self.set_flag(args, false),
            "size" => {
                if self.print {
                    writeln!(out, "{} triples", self.access.store().len())?;
                }
                Ok(())
            }
            "begin" => {
                self.constructing = true;
                self.query = if args.is_empty() {
                    None
                } else {
                    Some(self.construct_bgp_query(args)?)
                };
                Ok(())
            }
            "end" => {
                let query = self.take_query("END")?;
                self.run_query(&query, out)
            }
            "count" => {
                let query = self.take_query("COUNT")?;
                self.run_count(&query, out)
            }
            "bgp" => {
                if args.len() < 3 {
                    return Err(CommandError::MissingArguments("BGP"));
                }
                if self.constructing && self.query.is_some() {
                    return Err(ConstructionError::BgpAlreadyPresent.into());
                }
                let query = self.construct_bgp_query(args)?;
                if self.constructing {
                    self.query = Some(query);
                    return Ok(());
                }
                self.run_query(&query, out)
            }
            "filter" => self.add_filter(args),
            "path" => self.add_path(args, out),
            "project" => {
                if args.is_empty() {
                    return Err(CommandError::MissingArguments("PROJECT"));
                }
                let query = self.query_under_construction("PROJECT")?;
                let mut project = Project::new(query.variables().len());
                for name in args {
                    let var = query
                        .variables()
                        .get(name)
                        .ok_or_else(|| ConstructionError::UnknownVariable(name.clone()))?;
                    project.keep(var);
                }
                query.add_op(QueryOp::Project(project));
                Ok(())
            }
            "sort" => {
                if args.is_empty() {
                    return Err(CommandError::MissingArguments("SORT"));
                }
                let query = self.query_under_construction("SORT")?;
                let mut keys = Vec::with_capacity(args.len());
                for name in args {
                    keys.push(
                        query
                            .variables()
                            .get(name)
                            .ok_or_else(|| ConstructionError::UnknownVariable(name.clone()))?,
                    );
                }
                query.add_op(QueryOp::Sort(Sort::new(keys, false)));
                Ok(())
            }
            "unique" => {
                let query = self.query_under_construction("UNIQUE")?;
                let width = query.variables().len();
                query.add_op(QueryOp::Sort(Sort::unique_over(width)));
                Ok(())
            }
            "agg" => self.run_agg(args, out),
            "triple" => self.run_triple(args, out),
            "match" => self.run_match(args, out),
            "ntriples" => self.list_ntriples(out),
            "nodes" => self.list_nodes(out),
            "edges" => self.list_edges(out),
            "data" => self.list_nodes(out).and_then(|()| self.list_edges(out)),
            "debug" => self.dump_debug(out),
            "load" => {
                let [path] = args else {
                    return Err(CommandError::MissingArguments("LOAD"));
                };
                let start = Instant::now();
                let builder = self.access.builder()?;
                builder.load_snapshot(path)?;
                if self.verbose {
                    info!(
                        triples = self.access.store().len(),
                        elapsed = ?start.elapsed(),
                        "loaded snapshot"
                    );
                }
                Ok(())
            }
            "dump" => {
                let [path] = args else {
                    return Err(CommandError::MissingArguments("DUMP"));
                };
                let start = Instant::now();
                snapshot::dump_to_path(self.access.store(), path)?;
                if self.verbose {
                    info!(
                        triples = self.access.store().len(),
                        elapsed = ?start.elapsed(),
                        "dumped snapshot"
                    );
                }
                Ok(())
            }
            "import" => {
                let [path] = args else {
                    return Err(CommandError::MissingArguments("IMPORT"));
                };
                let stats = ingest::import_file(self.access.builder()?, path)?;
                if self.verbose {
                    info!(imported = stats.imported, skipped = stats.skipped, "imported");
                }
                Ok(())
            }
            other => Err(CommandError::UnknownCommand(other.to_owned())),
        }
    }

    fn help(&self, out: &mut dyn Write) -> Result<(), CommandError> {
        if !self.print {
            return Ok(());
        }
        out.write_all(
            b"Commands:\n\
              \x20 help\n\
              \x20 (un)set print\n\
              \x20 (un)set verbose\n\
              \x20 (un)set limit LIMIT\n\
              \x20 (un)set language TAG\n\
              \x20 size\n\
              \x20 match PATTERN\n\
              \x20 ntriples\n\
              \x20 data\n\
              \x20 nodes\n\
              \x20 edges\n\
              \x20 triple S P O\n\
              \x20 bgp S1 P1 O1 S2 P2 O2 ...\n\
              \x20 begin [S1 P1 O1 ...]\n\
              \x20 filter isiri|isliteral|isblank|isnumeric VAR\n\
              \x20 filter sameterm VAR TERM\n\
              \x20 filter starts|ends|contains VAR STRING\n\
              \x20 filter regex VAR PATTERN [FLAGS]\n\
              \x20 path S PRED O\n\
              \x20 project VAR ...\n\
              \x20 sort VAR ...\n\
              \x20 unique\n\
              \x20 agg GROUPVAR count *\n\
              \x20 end\n\
              \x20 count\n\
              \x20 load FILE\n\
              \x20 dump FILE\n\
              \x20 import FILE\n",
        )?;
        Ok(())
    }

    fn set_flag(&mut self, args: &[String], value: bool) -> Result<(), CommandError> {
        let verb = if value { "SET" } else { "UNSET" };
        let Some(field) = args.first() else {
            return Err(CommandError::MissingArguments(if value {
                "SET"
            } else {
                "UNSET"
            }));
        };
        match field.as_str() {
            "print" => self.print = value,
            "verbose" => self.verbose = value,
            "limit" => {
                if value {
                    let Some(limit) = args.get(1) else {
                        return Err(CommandError::MissingArguments("SET"));
                    };
                    self.limit = Some(limit.parse().map_err(|_| {
                        CommandError::InvalidArgument(limit.clone(), "SET LIMIT")
                    })?);
                } else {
                    self.limit = None;
                }
            }
            "language" => {
                if value {
                    let Some(tag) = args.get(1) else {
                        return Err(CommandError::MissingArguments("SET"));
                    };
                    self.language = Some(tag.clone());
                } else {
                    self.language = None;
                }
            }
            other => {
                return Err(CommandError::InvalidArgument(other.to_owned(), verb));
            }
        }
        Ok(())
    }

    fn take_query(&mut self, verb: &'static str) -> Result<Query, CommandError> {
        if !self.constructing {
            return Err(ConstructionError::OutsideConstruction(verb).into());
        }
        self.constructing = false;
        self.query
            .take()
            .ok_or_else(|| ConstructionError::NoQuery(verb).into())
    }

    fn query_under_construction(
        &mut self,
        verb: &'static str,
    ) -> Result<&mut Query, CommandError> {
        if !self.constructing {
            return Err(ConstructionError::OutsideConstruction(verb).into());
        }
        self.query
            .as_mut()
            .ok_or_else(|| ConstructionError::NoQuery(verb).into())
    }

    /// Parses `3k` term tokens into a one-BGP query.
    fn construct_bgp_query(&self, tokens: &[String]) -> Result<Query, CommandError> {
        if tokens.is_empty() || tokens.len() % 3 != 0 {
            return Err(ConstructionError::BadBgpShape(tokens.len()).into());
        }
        let store = self.access.store();
        let mut query = Query::new();
        let mut patterns = Vec::with_capacity(tokens.len() / 3);
        for triple in tokens.chunks_exact(3) {
            let s = term_or_var(store, &mut query, &triple[0])?;
            let p = term_or_var(store, &mut query, &triple[1])?;
            let o = term_or_var(store, &mut query, &triple[2])?;
            patterns.push([s, p, o]);
        }
        query.add_op(QueryOp::Bgp(Bgp::new(patterns)?));
        Ok(query)
    }

    fn add_filter(&mut self, args: &[String]) -> Result<(), CommandError> {
        if !self.constructing {
            return Err(ConstructionError::OutsideConstruction("FILTER").into());
        }
        if args.len() < 2 {
            return Err(CommandError::MissingArguments("FILTER"));
        }
        let store_filter = {
            let query = self
                .query
                .as_ref()
                .ok_or(ConstructionError::NoQuery("FILTER"))?;
            let op = args[0].as_str();
            let var = query
                .variables()
                .get(&args[1])
                .ok_or_else(|| ConstructionError::UnknownVariable(args[1].clone()))?;
            match op {
                "isiri" => Filter::IsIri(var),
                "isliteral" => Filter::IsLiteral(var),
                "isblank" => Filter::IsBlank(var),
                "isnumeric" => Filter::IsNumeric(var),
                "sameterm" => {
                    let Some(other) = args.get(2) else {
                        return Err(CommandError::MissingArguments("FILTER"));
                    };
                    let other = sameterm_argument(self.access.store(), query, other)?;
                    Filter::SameTerm(TermOrVar::Var(var), other)
                }
                "starts" | "ends" | "contains" => {
                    let Some(token) = args.get(2) else {
                        return Err(CommandError::MissingArguments("FILTER"));
                    };
                    let arg = string_argument(token)?;
                    match op {
                        "starts" => Filter::StrStarts(var, arg),
                        "ends" => Filter::StrEnds(var, arg),
                        _ => Filter::Contains(var, arg),
                    }
                }
                "regex" | "re" => {
                    let Some(token) = args.get(2) else {
                        return Err(CommandError::MissingArguments("FILTER"));
                    };
                    let pattern = match parse_term_token(token, false)? {
                        TermToken::Literal { value, .. } => value,
                        _ => token.clone(),
                    };
                    let flags = args.get(3).map(String::as_str).unwrap_or("");
                    Filter::regex(var, &pattern, flags)?
                }
                other => {
                    return Err(ConstructionError::UnknownFilterOp(other.to_owned()).into());
                }
            }
        };
        self.query
            .as_mut()
            .expect("checked above")
            .add_op(QueryOp::Filter(store_filter));
        Ok(())
    }

    fn add_path(
        &mut self,
        args: &[String],
        out: &mut dyn Write,
    ) -> Result<(), CommandError> {
        let [s, p, o] = args else {
            return Err(CommandError::MissingArguments("PATH"));
        };
        let mut query = if self.constructing {
            self.query.take().unwrap_or_default()
        } else {
            Query::new()
        };
        let store = self.access.store();
        let start = term_or_var(store, &mut query, s)?;
        let predicate = match term_or_var(store, &mut query, p)? {
            TermOrVar::Term(id) => id,
            TermOrVar::Var(_) => {
                return Err(ConstructionError::VariablePathPredicate.into());
            }
        };
        let end = term_or_var(store, &mut query, o)?;
        query.add_op(QueryOp::Path(Path::new(PathKind::Plus, start, predicate, end)));
        if self.constructing {
            self.query = Some(query);
            return Ok(());
        }
        self.run_query(&query, out)
    }

    fn run_query(&self, query: &Query, out: &mut dyn Write) -> Result<(), CommandError> {
        let start = Instant::now();
        let store = self.access.store();
        let mut sink = RowSink {
            store,
            style: self.style,
            out,
            limit: self.limit,
            rows: 0,
            buffer: String::new(),
        };
        query.execute(store, &mut sink)?;
        if self.verbose {
            info!(rows = sink.rows, elapsed = ?start.elapsed(), "query matched");
        }
        Ok(())
    }

    fn run_count(&self, query: &Query, out: &mut dyn Write) -> Result<(), CommandError> {
        struct CountSink {
            rows: u64,
        }
        impl SolutionHandler for CountSink {
            fn solution(&mut self, _: &Query, _: &Bindings) -> Result<(), Interrupt> {
                self.rows += 1;
                Ok(())
            }
        }
        let mut sink = CountSink { rows: 0 };
        query.execute(self.access.store(), &mut sink)?;
        match self.style {
            ResultStyle::Tsv => {
                writeln!(out, "?count")?;
                writeln!(out, "{}", sink.rows)?;
            }
            ResultStyle::Assignments => {
                writeln!(out, "{}", sink.rows)?;
            }
        }
        Ok(())
    }

    fn run_agg(&mut self, args: &[String], out: &mut dyn Write) -> Result<(), CommandError> {
        if args.len() < 3 {
            return Err(CommandError::MissingArguments("AGG"));
        }
        let group_name = &args[0];
        if args[1] != "count" {
            warn!(op = %args[1], "unrecognized aggregate operation, assuming count");
        }
        let query = if self.constructing {
            self.take_query("AGG")?
        } else {
            self.construct_bgp_query(&args[3..])?
        };
        let group = query
            .variables()
            .get(group_name)
            .ok_or_else(|| ConstructionError::UnknownVariable(group_name.clone()))?;
        let store = self.access.store();

        struct AggSink {
            group: VariableId,
            counts: Vec<u64>,
        }
        impl SolutionHandler for AggSink {
            fn solution(&mut self, _: &Query, bindings: &Bindings) -> Result<(), Interrupt> {
                let slot = bindings.get(self.group).map_or(0, |id| id.get() as usize);
                self.counts[slot] += 1;
                Ok(())
            }
        }
        let mut sink = AggSink {
            group,
            counts: vec![0; store.node_count() + 1],
        };
        query.execute(store, &mut sink)?;

        if self.style == ResultStyle::Tsv {
            writeln!(out, "?count\t?{}", query.variables().name(group))?;
        }
        let mut emitted = 0u64;
        let mut buffer = String::new();
        for (raw, count) in sink.counts.iter().enumerate() {
            if *count == 0 {
                continue;
            }
            buffer.clear();
            match self.style {
                ResultStyle::Tsv => {
                    if let Some(id) = TermId::new(raw as u32) {
                        write_tsv_term(&mut buffer, store, id);
                    }
                    writeln!(out, "{count}\t{buffer}")?;
                }
                ResultStyle::Assignments => {
                    if let Some(id) = TermId::new(raw as u32) {
                        store
                            .format_term(id, &mut buffer)
                            .map_err(|_| {
                                CommandError::InvalidArgument(raw.to_string(), "AGG")
                            })?;
                        writeln!(out, "{count} => {buffer}")?;
                    } else {
                        writeln!(out, "{count}")?;
                    }
                }
            }
            emitted += 1;
            if self.limit.is_some_and(|limit| emitted >= limit) {
                break;
            }
        }
        Ok(())
    }

    fn run_triple(&self, args: &[String], out: &mut dyn Write) -> Result<(), CommandError> {
        let [s, p, o] = args else {
            return Err(CommandError::MissingArguments("TRIPLE"));
        };
        let parse = |token: &String| -> Result<PatternTerm, CommandError> {
            let raw: i64 = token.parse().map_err(|_| {
                CommandError::InvalidArgument(token.clone(), "TRIPLE")
            })?;
            Ok(if raw > 0 {
                match u32::try_from(raw).ok().and_then(TermId::new) {
                    Some(id) => PatternTerm::Bound(id),
                    None => {
                        return Err(CommandError::InvalidArgument(token.clone(), "TRIPLE"))
                    }
                }
            } else if raw == 0 {
                PatternTerm::Any
            } else {
                PatternTerm::Var(raw.unsigned_abs() as u32)
            })
        };
        let pattern = TriplePattern::new(parse(s)?, parse(p)?, parse(o)?);
        let store = self.access.store();
        let mut count = 0u64;
        let mut buffer = String::new();
        store.match_triple::<std::io::Error, _>(pattern, &mut |s, p, o| {
            count += 1;
            if self.print {
                buffer.clear();
                if write_triple_line(store, s, p, o, &mut buffer).is_ok() {
                    out.write_all(buffer.as_bytes())?;
                }
            }
            Ok(())
        })?;
        if self.verbose {
            info!(matches = count, "triple pattern matched");
        }
        Ok(())
    }

    fn run_match(&self, args: &[String], out: &mut dyn Write) -> Result<(), CommandError> {
        let [pattern] = args else {
            return Err(CommandError::MissingArguments("MATCH"));
        };
        let pattern = match parse_term_token(pattern, false) {
            Ok(TermToken::Literal { value, .. }) => value,
            _ => pattern.clone(),
        };
        let re = regex::Regex::new(&pattern)
            .map_err(ConstructionError::InvalidRegex)?;
        let store = self.access.store();
        let mut buffer = String::new();
        let mut emitted = 0u64;
        for id in store.term_ids() {
            buffer.clear();
            if store.format_term(id, &mut buffer).is_err() {
                continue;
            }
            if !re.is_match(&buffer) {
                continue;
            }
            if self.print {
                writeln!(out, "{:<7} {}", id.get(), buffer)?;
            }
            emitted += 1;
            if self.limit.is_some_and(|limit| emitted >= limit) {
                break;
            }
        }
        Ok(())
    }

    fn list_ntriples(&self, out: &mut dyn Write) -> Result<(), CommandError> {
        if !self.print {
            return Ok(());
        }
        let store = self.access.store();
        let mut buffer = String::new();
        let mut emitted = 0u64;
        for (s, p, o) in store.triples() {
            buffer.clear();
            if write_triple_line(store, s, p, o, &mut buffer).is_ok() {
                out.write_all(buffer.as_bytes())?;
            }
            emitted += 1;
            if self.limit.is_some_and(|limit| emitted >= limit) {
                break;
            }
        }
        Ok(())
    }

    fn list_nodes(&self, out: &mut dyn Write) -> Result<(), CommandError> {
        if !self.print {
            return Ok(());
        }
        let store = self.access.store();
        writeln!(out, "# {} nodes", store.node_count())?;
        let mut buffer = String::new();
        let mut emitted = 0u64;
        for id in store.term_ids() {
            let vertex = store.vertex(id).expect("arena id");
            buffer.clear();
            let _ = store.format_term(id, &mut buffer);
            writeln!(
                out,
                "N {:07} {} ({}, {})",
                id.get(),
                buffer,
                vertex.in_degree(),
                vertex.out_degree()
            )?;
            emitted += 1;
            if self.limit.is_some_and(|limit| emitted >= limit) {
                break;
            }
        }
        Ok(())
    }

    fn list_edges(&self, out: &mut dyn Write) -> Result<(), CommandError> {
        if !self.print {
            return Ok(());
        }
        let store = self.access.store();
        writeln!(out, "# {} edges", store.len())?;
        let mut emitted = 0u64;
        for (s, p, o) in store.triples() {
            writeln!(out, "E {:07} {:07} {:07}", s.get(), p.get(), o.get())?;
            emitted += 1;
            if self.limit.is_some_and(|limit| emitted >= limit) {
                break;
            }
        }
        Ok(())
    }

    fn dump_debug(&self, out: &mut dyn Write) -> Result<(), CommandError> {
        if !self.print {
            return Ok(());
        }
        let store = self.access.store();
        writeln!(out, "Triplestore:")?;
        writeln!(out, "- Nodes: {}", store.node_count())?;
        let mut buffer = String::new();
        for id in store.term_ids() {
            let vertex = store.vertex(id).expect("arena id");
            buffer.clear();
            let _ = store.format_term(id, &mut buffer);
            writeln!(
                out,
                "       {:4}: {} (out head: {}; in head: {})",
                id.get(),
                buffer,
                vertex.out_head(),
                vertex.in_head()
            )?;
            let mut idx = vertex.out_head();
            while idx != 0 {
                let edge = store.edge(idx);
                writeln!(out, "       -> {} {} {}", edge.s, edge.p, edge.o)?;
                idx = edge.next_out;
            }
        }
        writeln!(out, "- Edges: {}", store.len())?;
        Ok(())
    }
}

/// Streams solutions to an output writer in the configured style.
struct RowSink<'a> {
    store: &'a Store,
    style: ResultStyle,
    out: &'a mut dyn Write,
    limit: Option<u64>,
    rows: u64,
    buffer: String,
}

impl SolutionHandler for RowSink<'_> {
    fn preamble(&mut self, query: &Query) -> std::io::Result<()> {
        if self.style == ResultStyle::Tsv {
            write_tsv_header(
                &mut *self.out,
                query.variables().iter().map(|(_, name)| name),
            )?;
        }
        Ok(())
    }

    fn solution(&mut self, query: &Query, bindings: &Bindings) -> Result<(), Interrupt> {
        if self.limit.is_some_and(|limit| self.rows >= limit) {
            return Err(Interrupt::Stop);
        }
        self.rows += 1;
        match self.style {
            ResultStyle::Tsv => {
                write_tsv_solution(&mut *self.out, &mut self.buffer, self.store, bindings)?;
            }
            ResultStyle::Assignments => {
                self.buffer.clear();
                for (var, name) in query.variables().iter() {
                    if let Some(id) = bindings.get(var) {
                        self.buffer.push_str(name);
                        self.buffer.push('=');
                        let _ = self.store.format_term(id, &mut self.buffer);
                        self.buffer.push(' ');
                    }
                }
                self.buffer.push('\n');
                self.out.write_all(self.buffer.as_bytes())?;
            }
        }
        Ok(())
    }
}

fn write_triple_line(
    store: &Store,
    s: TermId,
    p: TermId,
    o: TermId,
    buffer: &mut String,
) -> std::fmt::Result {
    store.format_term(s, buffer)?;
    buffer.push(' ');
    store.format_term(p, buffer)?;
    buffer.push(' ');
    store.format_term(o, buffer)?;
    buffer.push_str(" .\n");
    Ok(())
}

/// Resolves a term token to a constant or (possibly new) variable.
fn term_or_var(
    store: &Store,
    query: &mut Query,
    token: &str,
) -> Result<TermOrVar, CommandError> {
    match parse_term_token(token, true)? {
        TermToken::Variable(name) => {
            Ok(TermOrVar::Var(query.variables_mut().get_or_add(&name)))
        }
        TermToken::NodeId(raw) => {
            let id = TermId::new(raw)
                .filter(|id| store.term(*id).is_some())
                .ok_or_else(|| ConstructionError::UnknownTerm(token.to_owned()))?;
            Ok(TermOrVar::Term(id))
        }
        parsed => Ok(TermOrVar::Term(lookup_parsed_term(store, parsed, token)?)),
    }
}

/// Resolves an IRI or literal token against the dictionary without
/// creating anything.
fn lookup_parsed_term(
    store: &Store,
    parsed: TermToken,
    token: &str,
) -> Result<TermId, CommandError> {
    let unknown = || ConstructionError::UnknownTerm(token.to_owned());
    let term = match parsed {
        TermToken::Iri(iri) => Term::iri(iri),
        TermToken::Literal {
            value,
            language: Some(language),
            ..
        } => Term::lang_literal(value, &language)?,
        TermToken::Literal {
            value,
            datatype: Some(datatype),
            ..
        } => {
            let datatype = store.lookup(&Term::iri(datatype)).ok_or_else(unknown)?;
            Term::typed_literal(value, datatype)
        }
        TermToken::Literal { value, .. } => Term::simple_literal(value),
        TermToken::Variable(_) | TermToken::NodeId(_) => unreachable!("handled by caller"),
    };
    store.lookup(&term).ok_or_else(|| unknown().into())
}

/// The second argument of `filter sameterm`: a variable or a constant.
fn sameterm_argument(
    store: &Store,
    query: &Query,
    token: &str,
) -> Result<TermOrVar, CommandError> {
    match parse_term_token(token, true)? {
        TermToken::Variable(name) => query
            .variables()
            .get(&name)
            .map(TermOrVar::Var)
            .ok_or_else(|| ConstructionError::UnknownVariable(name).into()),
        TermToken::NodeId(raw) => TermId::new(raw)
            .filter(|id| store.term(*id).is_some())
            .map(TermOrVar::Term)
            .ok_or_else(|| ConstructionError::UnknownTerm(token.to_owned()).into()),
        parsed => Ok(TermOrVar::Term(lookup_parsed_term(store, parsed, token)?)),
    }
}

/// The literal argument of a string filter, typed for the compatibility
/// predicate.
fn string_argument(token: &str) -> Result<StringArg, CommandError> {
    match parse_term_token(token, true)? {
        TermToken::Literal {
            value,
            language: Some(language),
            ..
        } => Ok(StringArg::Lang {
            value,
            language: crate::model::LanguageTag::parse(&language)?,
        }),
        TermToken::Literal {
            value,
            datatype: Some(_),
            ..
        } => Ok(StringArg::Typed(value)),
        TermToken::Literal { value, .. } => Ok(StringArg::Plain(value)),
        _ => Err(ConstructionError::NonLiteralFilterArg.into()),
    }
}
