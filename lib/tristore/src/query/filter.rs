//! Filter operators: type tests, term equality and string matching over
//! bound variables.

use crate::error::ConstructionError;
use crate::model::{LanguageTag, Term, TermType};
use crate::query::{Bindings, TermOrVar, VariableId};
use crate::store::Store;
use regex::RegexBuilder;

/// The literal argument of a string filter.
///
/// String filters only ever fire when the argument and the tested term are
/// compatible: a plain string argument requires a plain string term, a
/// language-tagged argument requires the same (normalized) tag. Any other
/// combination is false.
#[derive(Debug, Clone)]
pub enum StringArg {
    Plain(String),
    Lang {
        value: String,
        language: LanguageTag,
    },
    /// A typed literal argument; compatible with nothing.
    Typed(String),
}

impl StringArg {
    #[inline]
    fn value(&self) -> &str {
        match self {
            Self::Plain(value) | Self::Typed(value) => value,
            Self::Lang { value, .. } => value,
        }
    }

    /// The term's lexical value when the compatibility predicate holds.
    fn compatible<'a>(&self, term: &'a Term) -> Option<&'a str> {
        match (self, term) {
            (Self::Plain(_), Term::StringLiteral(value)) => Some(value),
            (
                Self::Lang { language, .. },
                Term::LangLiteral {
                    value,
                    language: term_language,
                },
            ) if language == term_language => Some(value),
            _ => None,
        }
    }
}

/// A filter node in the operator chain.
#[derive(Debug)]
pub enum Filter {
    IsIri(VariableId),
    IsLiteral(VariableId),
    IsBlank(VariableId),
    IsNumeric(VariableId),
    SameTerm(TermOrVar, TermOrVar),
    StrStarts(VariableId, StringArg),
    StrEnds(VariableId, StringArg),
    Contains(VariableId, StringArg),
    Regex(VariableId, regex::Regex),
}

impl Filter {
    /// Compiles a regex filter. The only recognized flags are `i`, `m`,
    /// `s` and `x`; anything else is a construction error.
    pub fn regex(
        var: VariableId,
        pattern: &str,
        flags: &str,
    ) -> Result<Self, ConstructionError> {
        let mut builder = RegexBuilder::new(pattern);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => {
                    return Err(ConstructionError::UnknownFilterOp(format!(
                        "regex flag '{other}'"
                    )))
                }
            };
        }
        Ok(Self::Regex(var, builder.build()?))
    }

    /// True iff the current bindings pass the filter.
    pub(crate) fn matches(&self, store: &Store, bindings: &Bindings) -> bool {
        let term_of = |var: VariableId| bindings.get(var).and_then(|id| store.term(id));
        match self {
            Self::IsIri(var) => {
                term_of(*var).is_some_and(|t| t.term_type() == TermType::Iri)
            }
            Self::IsLiteral(var) => term_of(*var).is_some_and(Term::is_literal),
            Self::IsBlank(var) => {
                term_of(*var).is_some_and(|t| t.term_type() == TermType::Blank)
            }
            Self::IsNumeric(var) => term_of(*var).is_some_and(Term::is_numeric),
            Self::SameTerm(a, b) => {
                let resolve = |t: &TermOrVar| match t {
                    TermOrVar::Term(id) => Some(*id),
                    TermOrVar::Var(v) => bindings.get(*v),
                };
                resolve(a) == resolve(b)
            }
            Self::StrStarts(var, arg) => term_of(*var)
                .and_then(|t| arg.compatible(t))
                .is_some_and(|value| value.starts_with(arg.value())),
            Self::StrEnds(var, arg) => term_of(*var)
                .and_then(|t| arg.compatible(t))
                .is_some_and(|value| value.ends_with(arg.value())),
            Self::Contains(var, arg) => term_of(*var)
                .and_then(|t| arg.compatible(t))
                .is_some_and(|value| value.contains(arg.value())),
            Self::Regex(var, re) => {
                term_of(*var).is_some_and(|t| re.is_match(t.value()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TermId;
    use crate::store::StoreBuilder;

    fn fixture() -> (Store, TermId, TermId, TermId, VariableId) {
        let mut builder = StoreBuilder::new();
        let iri = builder.intern(Term::iri("http://example.com/a")).unwrap();
        let plain = builder.intern(Term::simple_literal("hello")).unwrap();
        let lang = builder
            .intern(Term::lang_literal("hello", "en-US").unwrap())
            .unwrap();
        (
            builder.freeze(),
            iri,
            plain,
            lang,
            VariableId::new(1).unwrap(),
        )
    }

    fn bound(var: VariableId, id: TermId) -> Bindings {
        let mut bindings = Bindings::new(1);
        bindings.set(var, id);
        bindings
    }

    #[test]
    fn type_tests() {
        let (store, iri, plain, _, var) = fixture();
        assert!(Filter::IsIri(var).matches(&store, &bound(var, iri)));
        assert!(!Filter::IsIri(var).matches(&store, &bound(var, plain)));
        assert!(Filter::IsLiteral(var).matches(&store, &bound(var, plain)));
        assert!(!Filter::IsBlank(var).matches(&store, &bound(var, iri)));
    }

    #[test]
    fn unbound_variables_never_pass_type_tests() {
        let (store, _, _, _, var) = fixture();
        assert!(!Filter::IsIri(var).matches(&store, &Bindings::new(1)));
    }

    #[test]
    fn is_numeric_checks_the_cache() {
        let mut builder = StoreBuilder::new();
        let dt = builder
            .intern(Term::iri(crate::model::vocab::xsd::INTEGER))
            .unwrap();
        let num = builder.intern(Term::typed_literal("42", dt)).unwrap();
        let plain = builder.intern(Term::simple_literal("42")).unwrap();
        let store = builder.freeze();
        let var = VariableId::new(1).unwrap();
        assert!(Filter::IsNumeric(var).matches(&store, &bound(var, num)));
        assert!(!Filter::IsNumeric(var).matches(&store, &bound(var, plain)));
    }

    #[test]
    fn same_term_on_vars_and_constants() {
        let (store, iri, plain, _, var) = fixture();
        let filter = Filter::SameTerm(TermOrVar::Var(var), TermOrVar::Term(iri));
        assert!(filter.matches(&store, &bound(var, iri)));
        assert!(!filter.matches(&store, &bound(var, plain)));
    }

    #[test]
    fn string_filters_require_compatible_terms() {
        let (store, _, plain, lang, var) = fixture();
        let plain_arg = StringArg::Plain("ell".into());
        assert!(Filter::Contains(var, plain_arg).matches(&store, &bound(var, plain)));
        // a plain argument never matches a language-tagged term
        let plain_arg = StringArg::Plain("ell".into());
        assert!(!Filter::Contains(var, plain_arg).matches(&store, &bound(var, lang)));
        // tags compare after normalization
        let lang_arg = StringArg::Lang {
            value: "hel".into(),
            language: LanguageTag::parse("EN-us").unwrap(),
        };
        assert!(Filter::StrStarts(var, lang_arg).matches(&store, &bound(var, lang)));
        let other_lang = StringArg::Lang {
            value: "hel".into(),
            language: LanguageTag::parse("fr").unwrap(),
        };
        assert!(!Filter::StrStarts(var, other_lang).matches(&store, &bound(var, lang)));
    }

    #[test]
    fn typed_arguments_match_nothing() {
        let (store, _, plain, _, var) = fixture();
        let arg = StringArg::Typed("hello".into());
        assert!(!Filter::Contains(var, arg).matches(&store, &bound(var, plain)));
    }

    #[test]
    fn str_ends() {
        let (store, _, plain, _, var) = fixture();
        let arg = StringArg::Plain("llo".into());
        assert!(Filter::StrEnds(var, arg).matches(&store, &bound(var, plain)));
        let arg = StringArg::Plain("hell".into());
        assert!(!Filter::StrEnds(var, arg).matches(&store, &bound(var, plain)));
    }

    #[test]
    fn regex_flags() {
        let (store, iri, plain, _, var) = fixture();
        let filter = Filter::regex(var, "^HEL", "i").unwrap();
        assert!(filter.matches(&store, &bound(var, plain)));
        // the regex applies to the lexical value of any term kind
        let filter = Filter::regex(var, "example", "").unwrap();
        assert!(filter.matches(&store, &bound(var, iri)));
        assert!(Filter::regex(var, "(", "").is_err());
        assert!(Filter::regex(var, "a", "z").is_err());
    }
}
