//! TSV serialization of query solutions.
//!
//! The first row names the variables (`?name`, tab separated); every
//! following row serializes one binding array. Terms follow their
//! N-Triples-like surface forms except that XSD numeric literals print
//! their bare lexical value, and embedded TAB/CR/LF are escaped.

use crate::model::{self, Term, TermId};
use crate::query::Bindings;
use crate::store::Store;
use memchr::memchr3;
use std::io::{self, Write};

/// Writes the `?name` header row.
pub fn write_tsv_header<'a>(
    write: &mut dyn Write,
    variables: impl IntoIterator<Item = &'a str>,
) -> io::Result<()> {
    let mut buffer = String::new();
    let mut first = true;
    for variable in variables {
        if first {
            first = false;
        } else {
            buffer.push('\t');
        }
        buffer.push('?');
        buffer.push_str(variable);
    }
    buffer.push('\n');
    write.write_all(buffer.as_bytes())
}

/// Serializes one solution row into `buffer` and writes it. Unbound slots
/// serialize as empty fields.
pub fn write_tsv_solution(
    write: &mut dyn Write,
    buffer: &mut String,
    store: &Store,
    bindings: &Bindings,
) -> io::Result<()> {
    buffer.clear();
    let mut first = true;
    for id in bindings.iter() {
        if first {
            first = false;
        } else {
            buffer.push('\t');
        }
        if let Some(id) = id {
            write_tsv_term(buffer, store, id);
        }
    }
    buffer.push('\n');
    write.write_all(buffer.as_bytes())
}

/// A buffered writer for one whole TSV result set.
pub struct TsvSolutionsWriter<W: Write> {
    write: W,
    buffer: String,
}

impl<W: Write> TsvSolutionsWriter<W> {
    /// Writes the header row and returns the writer.
    pub fn start<'a>(
        mut write: W,
        variables: impl IntoIterator<Item = &'a str>,
    ) -> io::Result<Self> {
        write_tsv_header(&mut write, variables)?;
        Ok(Self {
            write,
            buffer: String::new(),
        })
    }

    /// Writes one solution row.
    pub fn write_solution(&mut self, store: &Store, bindings: &Bindings) -> io::Result<()> {
        write_tsv_solution(&mut self.write, &mut self.buffer, store, bindings)
    }

    pub fn finish(self) -> W {
        self.write
    }
}

/// Serializes one term in TSV surface form into `output`.
pub fn write_tsv_term(output: &mut String, store: &Store, id: TermId) {
    let Some(term) = store.term(id) else {
        return;
    };
    match term {
        Term::Iri(value) => {
            output.push('<');
            push_escaped(output, value);
            output.push('>');
        }
        Term::Blank { value, prefix } => {
            output.push_str("_:b");
            output.push_str(&prefix.to_string());
            output.push('b');
            push_escaped(output, value);
        }
        Term::StringLiteral(value) => {
            output.push('"');
            push_escaped(output, value);
            output.push('"');
        }
        Term::LangLiteral { value, language } => {
            output.push('"');
            push_escaped(output, value);
            output.push_str("\"@");
            output.push_str(language.as_str());
        }
        Term::TypedLiteral {
            value, datatype, ..
        } => {
            let datatype_iri = store
                .term(*datatype)
                .map(Term::value)
                .unwrap_or_default();
            if model::is_numeric_datatype(datatype_iri) {
                push_escaped(output, value);
            } else {
                output.push('"');
                push_escaped(output, value);
                output.push_str("\"^^<");
                push_escaped(output, datatype_iri);
                output.push('>');
            }
        }
    }
}

fn push_escaped(output: &mut String, value: &str) {
    if memchr3(b'\t', b'\r', b'\n', value.as_bytes()).is_none() {
        output.push_str(value);
        return;
    }
    for c in value.chars() {
        match c {
            '\t' => output.push_str("\\t"),
            '\r' => output.push_str("\\r"),
            '\n' => output.push_str("\\n"),
            _ => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::VariableId;
    use crate::store::StoreBuilder;

    #[test]
    fn header_and_rows() {
        let mut builder = StoreBuilder::new();
        let a = builder.intern(Term::iri("http://example.com/a")).unwrap();
        let hello = builder.intern(Term::simple_literal("hello")).unwrap();
        let store = builder.freeze();

        let mut bindings = Bindings::new(2);
        bindings.set(VariableId::new(1).unwrap(), a);
        bindings.set(VariableId::new(2).unwrap(), hello);

        let mut writer = TsvSolutionsWriter::start(Vec::new(), ["s", "o"]).unwrap();
        writer.write_solution(&store, &bindings).unwrap();
        let out = String::from_utf8(writer.finish()).unwrap();
        assert_eq!("?s\t?o\n<http://example.com/a>\t\"hello\"\n", out);
    }

    #[test]
    fn unbound_slots_are_empty_fields() {
        let mut builder = StoreBuilder::new();
        let a = builder.intern(Term::iri("http://example.com/a")).unwrap();
        let store = builder.freeze();
        let mut bindings = Bindings::new(3);
        bindings.set(VariableId::new(1).unwrap(), a);
        bindings.set(VariableId::new(3).unwrap(), a);
        let mut writer = TsvSolutionsWriter::start(Vec::new(), ["a", "b", "c"]).unwrap();
        writer.write_solution(&store, &bindings).unwrap();
        let out = String::from_utf8(writer.finish()).unwrap();
        assert_eq!(
            "?a\t?b\t?c\n<http://example.com/a>\t\t<http://example.com/a>\n",
            out
        );
    }

    #[test]
    fn control_characters_are_escaped() {
        let mut builder = StoreBuilder::new();
        let lit = builder
            .intern(Term::simple_literal("col1\tcol2\r\n"))
            .unwrap();
        let store = builder.freeze();
        let mut out = String::new();
        write_tsv_term(&mut out, &store, lit);
        assert_eq!("\"col1\\tcol2\\r\\n\"", out);
    }

    #[test]
    fn blank_nodes_carry_their_session_prefix() {
        let mut builder = StoreBuilder::new();
        let blank = builder.intern(Term::blank("x7", 3)).unwrap();
        let store = builder.freeze();
        let mut out = String::new();
        write_tsv_term(&mut out, &store, blank);
        assert_eq!("_:b3bx7", out);
    }

    #[test]
    fn numeric_typed_literals_print_bare() {
        let mut builder = StoreBuilder::new();
        let int = builder
            .intern(Term::iri(crate::model::vocab::xsd::INTEGER))
            .unwrap();
        let n = builder.intern(Term::typed_literal("42", int)).unwrap();
        let other = builder
            .intern(Term::iri("http://example.com/custom"))
            .unwrap();
        let t = builder.intern(Term::typed_literal("x", other)).unwrap();
        let store = builder.freeze();
        let mut out = String::new();
        write_tsv_term(&mut out, &store, n);
        assert_eq!("42", out);
        let mut out = String::new();
        write_tsv_term(&mut out, &store, t);
        assert_eq!("\"x\"^^<http://example.com/custom>", out);
    }

    #[test]
    fn lang_literals_print_their_normalized_tag() {
        let mut builder = StoreBuilder::new();
        let l = builder
            .intern(Term::lang_literal("chat", "FR-fr").unwrap())
            .unwrap();
        let store = builder.freeze();
        let mut out = String::new();
        write_tsv_term(&mut out, &store, l);
        assert_eq!("\"chat\"@fr-FR", out);
    }
}
