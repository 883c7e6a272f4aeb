//! The binary snapshot codec.
//!
//! On-disk layout (all integers big-endian):
//!
//! ```text
//! magic "3STR"
//! edges_alloc : u32
//! edges_used  : u32
//! nodes_alloc : u32
//! nodes_used  : u32
//! node[1..=nodes_used]:
//!   mtime u64, out_degree u32, in_degree u32, out_head u32, in_head u32
//!   term: type u32, extra u32, value_len u32, value bytes + NUL,
//!         then for language literals the tag bytes + NUL
//! edge[1..=edges_used]:
//!   s u32, p u32, o u32, next_in u32, next_out u32
//! ```
//!
//! `extra` carries the language tag length, the datatype id or the
//! blank-node prefix depending on the term type, zero otherwise. Nodes are
//! ordered so that a typed literal's datatype IRI always precedes it; the
//! numeric caches are recomputed while loading. Loading replaces the whole
//! store, it is not incremental.

use crate::dictionary::TermDictionary;
use crate::error::SnapshotError;
use crate::model::{LanguageTag, Term, TermId, TermType};
use crate::store::{Edge, Store, Vertex};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

const MAGIC: &[u8; 4] = b"3STR";

/// Serializes the whole store.
pub fn dump(store: &Store, writer: &mut impl Write) -> Result<(), SnapshotError> {
    let nodes_used = store.node_count() as u32;
    let edges_used = store.edge_count_raw();
    writer.write_all(MAGIC)?;
    write_u32(writer, edges_used)?;
    write_u32(writer, edges_used)?;
    write_u32(writer, nodes_used)?;
    write_u32(writer, nodes_used)?;
    for id in store.term_ids() {
        let vertex = store.vertex(id).expect("arena id");
        write_u64(writer, vertex.mtime())?;
        write_u32(writer, vertex.out_degree())?;
        write_u32(writer, vertex.in_degree())?;
        write_u32(writer, vertex.out_head())?;
        write_u32(writer, vertex.in_head())?;
        write_term(writer, vertex.term())?;
    }
    for idx in 1..=edges_used {
        let edge = store.edge(idx);
        write_u32(writer, edge.s)?;
        write_u32(writer, edge.p)?;
        write_u32(writer, edge.o)?;
        write_u32(writer, edge.next_in)?;
        write_u32(writer, edge.next_out)?;
    }
    Ok(())
}

/// Serializes the store to a file.
pub fn dump_to_path(store: &Store, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
    let mut writer = BufWriter::new(File::create(path)?);
    dump(store, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn write_term(writer: &mut impl Write, term: &Term) -> Result<(), SnapshotError> {
    let (code, extra) = match term {
        Term::Iri(_) | Term::StringLiteral(_) => (term.term_type() as u32, 0),
        Term::Blank { prefix, .. } => (TermType::Blank as u32, *prefix),
        Term::LangLiteral { language, .. } => {
            (TermType::LangLiteral as u32, language.len() as u32)
        }
        Term::TypedLiteral { datatype, .. } => {
            (TermType::TypedLiteral as u32, datatype.get())
        }
    };
    let value = term.value().as_bytes();
    write_u32(writer, code)?;
    write_u32(writer, extra)?;
    write_u32(writer, value.len() as u32)?;
    writer.write_all(value)?;
    writer.write_all(&[0])?;
    if let Some(language) = term.language() {
        writer.write_all(language.as_str().as_bytes())?;
        writer.write_all(&[0])?;
    }
    Ok(())
}

/// Deserializes a complete store.
pub fn load(reader: &mut impl Read) -> Result<Store, SnapshotError> {
    let mut magic = [0; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(SnapshotError::corruption("bad magic number"));
    }
    let edges_alloc = read_u32(reader)?;
    let edges_used = read_u32(reader)?;
    let nodes_alloc = read_u32(reader)?;
    let nodes_used = read_u32(reader)?;
    if edges_used > edges_alloc || nodes_used > nodes_alloc {
        return Err(SnapshotError::corruption("used counts exceed allocations"));
    }

    let mut dictionary = TermDictionary::new();
    let mut vertices = Vec::with_capacity(nodes_used as usize + 1);
    vertices.push(Vertex {
        term: Arc::new(Term::Iri(String::new())),
        mtime: 0,
        out_degree: 0,
        in_degree: 0,
        out_head: 0,
        in_head: 0,
    });
    let mut bnode_prefix = 0;
    for id in 1..=nodes_used {
        let mtime = read_u64(reader)?;
        let out_degree = read_u32(reader)?;
        let in_degree = read_u32(reader)?;
        let out_head = read_u32(reader)?;
        let in_head = read_u32(reader)?;
        if out_head > edges_used || in_head > edges_used {
            return Err(SnapshotError::corruption("adjacency head out of range"));
        }
        let term = read_term(reader, id, &vertices)?;
        if let Term::Blank { prefix, .. } = &term {
            bnode_prefix = bnode_prefix.max(*prefix);
        }
        let term = Arc::new(term);
        dictionary.insert(
            Arc::clone(&term),
            TermId::new(id).expect("ids start at 1"),
        );
        vertices.push(Vertex {
            term,
            mtime,
            out_degree,
            in_degree,
            out_head,
            in_head,
        });
    }

    let mut edges = Vec::with_capacity(edges_used as usize + 1);
    edges.push(Edge::default());
    for _ in 1..=edges_used {
        let edge = Edge {
            s: read_u32(reader)?,
            p: read_u32(reader)?,
            o: read_u32(reader)?,
            next_in: read_u32(reader)?,
            next_out: read_u32(reader)?,
        };
        if edge.s == 0 || edge.p == 0 || edge.o == 0 {
            return Err(SnapshotError::corruption("edge references the zero term"));
        }
        if edge.s > nodes_used || edge.p > nodes_used || edge.o > nodes_used {
            return Err(SnapshotError::corruption("edge references unknown vertex"));
        }
        if edge.next_in > edges_used || edge.next_out > edges_used {
            return Err(SnapshotError::corruption("edge chain out of range"));
        }
        edges.push(edge);
    }

    Ok(Store::from_loaded(vertices, edges, dictionary, bnode_prefix))
}

/// Deserializes a store from a file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Store, SnapshotError> {
    load(&mut BufReader::new(File::open(path)?))
}

fn read_term(
    reader: &mut impl Read,
    id: u32,
    vertices: &[Vertex],
) -> Result<Term, SnapshotError> {
    let code = read_u32(reader)?;
    let extra = read_u32(reader)?;
    let value_len = read_u32(reader)?;
    let value = read_nul_terminated(reader, value_len as usize)?;
    let term_type = TermType::from_code(code)
        .ok_or_else(|| SnapshotError::corruption(format!("unknown term type {code}")))?;
    Ok(match term_type {
        TermType::Iri => Term::Iri(value),
        TermType::Blank => Term::Blank {
            value,
            prefix: extra,
        },
        TermType::StringLiteral => Term::StringLiteral(value),
        TermType::LangLiteral => {
            if extra as usize > LanguageTag::MAX_LEN {
                return Err(SnapshotError::corruption("language tag too long"));
            }
            let tag = read_nul_terminated(reader, extra as usize)?;
            let mut packed = [0; 8];
            packed[..tag.len()].copy_from_slice(tag.as_bytes());
            Term::LangLiteral {
                value,
                language: LanguageTag::from_packed(packed)?,
            }
        }
        TermType::TypedLiteral => {
            // datatype IRIs precede their dependents, so the referenced
            // vertex must already be loaded
            if extra == 0 || extra >= id {
                return Err(SnapshotError::corruption(
                    "typed literal precedes its datatype",
                ));
            }
            let datatype = TermId::new(extra).expect("checked non-zero");
            let datatype_iri = vertices[extra as usize].term().value().to_owned();
            let numeric = crate::model::validate_typed_value(&value, &datatype_iri)?;
            Term::TypedLiteral {
                value,
                datatype,
                numeric,
            }
        }
    })
}

fn read_nul_terminated(
    reader: &mut impl Read,
    len: usize,
) -> Result<String, SnapshotError> {
    let mut bytes = vec![0; len + 1];
    reader.read_exact(&mut bytes)?;
    if bytes.pop() != Some(0) {
        return Err(SnapshotError::corruption("missing NUL terminator"));
    }
    String::from_utf8(bytes)
        .map_err(|_| SnapshotError::corruption("value is not UTF-8"))
}

fn write_u32(writer: &mut impl Write, value: u32) -> std::io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

fn write_u64(writer: &mut impl Write, value: u64) -> std::io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

fn read_u32(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut buffer = [0; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_be_bytes(buffer))
}

fn read_u64(reader: &mut impl Read) -> std::io::Result<u64> {
    let mut buffer = [0; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_be_bytes(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreBuilder;

    fn sample_store() -> Store {
        let mut builder = StoreBuilder::new();
        let s = builder.intern(Term::iri("http://example.com/s")).unwrap();
        let p = builder.intern(Term::iri("http://example.com/p")).unwrap();
        let lit = builder.intern(Term::simple_literal("hello")).unwrap();
        let lang = builder
            .intern(Term::lang_literal("bonjour", "fr").unwrap())
            .unwrap();
        let dt = builder
            .intern(Term::iri(crate::model::vocab::xsd::INTEGER))
            .unwrap();
        let num = builder.intern(Term::typed_literal("42", dt)).unwrap();
        let blank = builder.intern(Term::blank("b0", 1)).unwrap();
        builder.add_triple(s, p, lit, 7).unwrap();
        builder.add_triple(s, p, lang, 7).unwrap();
        builder.add_triple(s, p, num, 8).unwrap();
        builder.add_triple(blank, p, s, 8).unwrap();
        builder.freeze()
    }

    fn assert_same_store(a: &Store, b: &Store) {
        assert_eq!(a.node_count(), b.node_count());
        assert_eq!(a.len(), b.len());
        for id in a.term_ids() {
            assert_eq!(a.term(id), b.term(id));
            let (va, vb) = (a.vertex(id).unwrap(), b.vertex(id).unwrap());
            assert_eq!(va.mtime(), vb.mtime());
            assert_eq!(va.out_degree(), vb.out_degree());
            assert_eq!(va.in_degree(), vb.in_degree());
            assert_eq!(va.out_head(), vb.out_head());
            assert_eq!(va.in_head(), vb.in_head());
        }
        assert_eq!(
            a.triples().collect::<Vec<_>>(),
            b.triples().collect::<Vec<_>>()
        );
    }

    #[test]
    fn round_trip_preserves_structure() {
        let store = sample_store();
        let mut buffer = Vec::new();
        dump(&store, &mut buffer).unwrap();
        let reloaded = load(&mut buffer.as_slice()).unwrap();
        assert_same_store(&store, &reloaded);
    }

    #[test]
    fn round_trip_recomputes_numeric_cache() {
        let store = sample_store();
        let mut buffer = Vec::new();
        dump(&store, &mut buffer).unwrap();
        let reloaded = load(&mut buffer.as_slice()).unwrap();
        let dt = reloaded
            .lookup(&Term::iri(crate::model::vocab::xsd::INTEGER))
            .unwrap();
        let num = reloaded
            .lookup(&Term::typed_literal("42", dt))
            .unwrap();
        assert_eq!(Some(42.0), reloaded.term(num).unwrap().numeric_value());
    }

    #[test]
    fn round_trip_through_file() {
        let store = sample_store();
        let file = tempfile::NamedTempFile::new().unwrap();
        dump_to_path(&store, file.path()).unwrap();
        let reloaded = load_from_path(file.path()).unwrap();
        assert_same_store(&store, &reloaded);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = load(&mut &b"NOPE\x00\x00\x00\x00"[..]).unwrap_err();
        assert!(matches!(err, SnapshotError::Corruption(_)));
    }

    #[test]
    fn truncated_snapshot_is_an_io_error() {
        let store = sample_store();
        let mut buffer = Vec::new();
        dump(&store, &mut buffer).unwrap();
        buffer.truncate(buffer.len() - 3);
        assert!(matches!(
            load(&mut buffer.as_slice()),
            Err(SnapshotError::Io(_))
        ));
    }

    #[test]
    fn snapshot_is_endian_stable() {
        // mtime is written big-endian like every other field
        let mut builder = StoreBuilder::new();
        let s = builder.intern(Term::iri("http://example.com/s")).unwrap();
        builder.add_triple(s, s, s, 0x0102_0304_0506_0708).unwrap();
        let store = builder.freeze();
        let mut buffer = Vec::new();
        dump(&store, &mut buffer).unwrap();
        // header is 4 magic + 4 u32 fields; the node record starts with mtime
        let mtime_offset = 4 + 16;
        assert_eq!(
            [1, 2, 3, 4, 5, 6, 7, 8],
            buffer[mtime_offset..mtime_offset + 8]
        );
    }
}
