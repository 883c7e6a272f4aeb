//! The RDF term model: interned term ids, the [`Term`] tagged union and the
//! packed [`LanguageTag`] representation.

pub mod vocab;

use crate::error::LexicalError;
use crate::model::vocab::xsd;
use regex::Regex;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroU32;
use std::ops::Deref;
use std::str::{self, FromStr};
use std::sync::LazyLock;

/// A dense, positive 32-bit id naming an interned term.
///
/// Zero is reserved for "undefined/absent" and is representable only as
/// `Option::<TermId>::None`.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
pub struct TermId(NonZeroU32);

impl TermId {
    /// Wraps a raw id, returning `None` for the zero sentinel.
    #[inline]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// The raw positive id.
    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TermId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The variant tag of a [`Term`].
///
/// The discriminant values are part of the snapshot format.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
#[repr(u32)]
pub enum TermType {
    Iri = 1,
    Blank = 2,
    StringLiteral = 3,
    LangLiteral = 4,
    TypedLiteral = 5,
}

impl TermType {
    /// Decodes a snapshot type code.
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::Iri,
            2 => Self::Blank,
            3 => Self::StringLiteral,
            4 => Self::LangLiteral,
            5 => Self::TypedLiteral,
            _ => return None,
        })
    }
}

/// A BCP47 language tag packed into an 8-byte inline slot.
///
/// At most 7 bytes of tag plus a trailing NUL fit; longer tags are rejected
/// at intern time. Tags are stored normalized: language subtag lowercased,
/// script subtag title-cased, region subtag uppercased.
///
/// ```
/// use tristore::model::LanguageTag;
///
/// assert_eq!("en-US", LanguageTag::parse("en-us")?.as_str());
/// assert_eq!("sr-Latn", LanguageTag::parse("SR-LATN")?.as_str());
/// assert!(LanguageTag::parse("sr-Latn-RS").is_err()); // 10 bytes
/// # Result::<_, tristore::error::LexicalError>::Ok(())
/// ```
#[derive(Clone, Copy, Default)]
pub struct LanguageTag {
    inner: [u8; 8],
}

impl LanguageTag {
    pub const MAX_LEN: usize = 7;

    /// Validates, normalizes and packs a tag.
    pub fn parse(tag: &str) -> Result<Self, LexicalError> {
        oxilangtag::LanguageTag::parse(tag)?;
        let normalized = normalize_language_tag(tag);
        if normalized.len() > Self::MAX_LEN {
            return Err(LexicalError::LanguageTagTooLong(normalized));
        }
        let mut inner = [0; 8];
        inner[..normalized.len()].copy_from_slice(normalized.as_bytes());
        Ok(Self { inner })
    }

    /// Unpacks a tag from its snapshot slot, checking UTF-8 and
    /// NUL-termination only.
    pub fn from_packed(inner: [u8; 8]) -> Result<Self, LexicalError> {
        let len = memchr::memchr(0, &inner).unwrap_or(Self::MAX_LEN);
        str::from_utf8(&inner[..len])
            .map_err(|_| LexicalError::InvalidTermToken(format!("{inner:?}")))?;
        if inner[len..].iter().any(|&b| b != 0) {
            return Err(LexicalError::InvalidTermToken(format!("{inner:?}")));
        }
        Ok(Self { inner })
    }

    #[inline]
    pub fn len(&self) -> usize {
        memchr::memchr(0, &self.inner).unwrap_or(Self::MAX_LEN)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner[0] == 0
    }

    #[inline]
    #[allow(unsafe_code)]
    pub fn as_str(&self) -> &str {
        // SAFETY: constructors only accept valid UTF-8
        unsafe { str::from_utf8_unchecked(&self.inner[..self.len()]) }
    }

    /// The raw 8-byte slot, NUL-padded, as stored in snapshots.
    #[inline]
    pub fn to_packed(self) -> [u8; 8] {
        self.inner
    }
}

impl Deref for LanguageTag {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for LanguageTag {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for LanguageTag {
    #[inline]
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Debug for LanguageTag {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl fmt::Display for LanguageTag {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl PartialEq for LanguageTag {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for LanguageTag {}

impl PartialOrd for LanguageTag {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LanguageTag {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Hash for LanguageTag {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl FromStr for LanguageTag {
    type Err = LexicalError;

    #[inline]
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Self::parse(tag)
    }
}

/// BCP47 case conventions: first subtag lowercase, 4-letter subtags
/// title-case, 2-letter subtags past the first uppercase.
fn normalize_language_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    for (i, subtag) in tag.split('-').enumerate() {
        if i > 0 {
            out.push('-');
        }
        if i == 0 || !subtag.bytes().all(|b| b.is_ascii_alphabetic()) {
            out.extend(subtag.chars().map(|c| c.to_ascii_lowercase()));
        } else if subtag.len() == 2 {
            out.extend(subtag.chars().map(|c| c.to_ascii_uppercase()));
        } else if subtag.len() == 4 {
            for (j, c) in subtag.chars().enumerate() {
                out.push(if j == 0 {
                    c.to_ascii_uppercase()
                } else {
                    c.to_ascii_lowercase()
                });
            }
        } else {
            out.extend(subtag.chars().map(|c| c.to_ascii_lowercase()));
        }
    }
    out
}

/// An RDF term as stored by the dictionary.
///
/// Equality, ordering and hashing are structural over
/// `(variant, value, variant-specific field)`; the cached numeric value of
/// typed literals is derived data and takes no part in identity.
#[derive(Debug, Clone)]
pub enum Term {
    /// An IRI reference.
    Iri(String),
    /// A blank node, disambiguated across ingest sessions by `prefix`.
    Blank { value: String, prefix: u32 },
    /// A simple literal (implicit datatype `xsd:string`).
    StringLiteral(String),
    /// A language-tagged string.
    LangLiteral { value: String, language: LanguageTag },
    /// A literal with an explicit datatype, referenced by interned id.
    TypedLiteral {
        value: String,
        datatype: TermId,
        /// Cached parse of the value when the datatype is an XSD numeric.
        numeric: Option<f64>,
    },
}

impl Term {
    #[inline]
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri(value.into())
    }

    #[inline]
    pub fn blank(value: impl Into<String>, prefix: u32) -> Self {
        Self::Blank {
            value: value.into(),
            prefix,
        }
    }

    #[inline]
    pub fn simple_literal(value: impl Into<String>) -> Self {
        Self::StringLiteral(value.into())
    }

    /// Builds a language-tagged literal, validating and packing the tag.
    pub fn lang_literal(
        value: impl Into<String>,
        language: &str,
    ) -> Result<Self, LexicalError> {
        Ok(Self::LangLiteral {
            value: value.into(),
            language: LanguageTag::parse(language)?,
        })
    }

    /// Builds a typed literal without a numeric cache. The dictionary is
    /// responsible for lexical validation against the resolved datatype IRI.
    #[inline]
    pub fn typed_literal(value: impl Into<String>, datatype: TermId) -> Self {
        Self::TypedLiteral {
            value: value.into(),
            datatype,
            numeric: None,
        }
    }

    #[inline]
    pub fn term_type(&self) -> TermType {
        match self {
            Self::Iri(_) => TermType::Iri,
            Self::Blank { .. } => TermType::Blank,
            Self::StringLiteral(_) => TermType::StringLiteral,
            Self::LangLiteral { .. } => TermType::LangLiteral,
            Self::TypedLiteral { .. } => TermType::TypedLiteral,
        }
    }

    /// The UTF-8 lexical value common to every variant.
    #[inline]
    pub fn value(&self) -> &str {
        match self {
            Self::Iri(value) | Self::StringLiteral(value) => value,
            Self::Blank { value, .. }
            | Self::LangLiteral { value, .. }
            | Self::TypedLiteral { value, .. } => value,
        }
    }

    #[inline]
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::StringLiteral(_) | Self::LangLiteral { .. } | Self::TypedLiteral { .. }
        )
    }

    /// True iff the term is a typed literal of a recognized XSD numeric
    /// datatype with a cached numeric value.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.numeric_value().is_some()
    }

    #[inline]
    pub fn numeric_value(&self) -> Option<f64> {
        match self {
            Self::TypedLiteral { numeric, .. } => *numeric,
            _ => None,
        }
    }

    #[inline]
    pub fn language(&self) -> Option<&LanguageTag> {
        match self {
            Self::LangLiteral { language, .. } => Some(language),
            _ => None,
        }
    }

    #[inline]
    pub fn datatype(&self) -> Option<TermId> {
        match self {
            Self::TypedLiteral { datatype, .. } => Some(*datatype),
            _ => None,
        }
    }

    fn identity(&self) -> (TermType, &str, u64) {
        match self {
            Self::Iri(value) => (TermType::Iri, value, 0),
            Self::StringLiteral(value) => (TermType::StringLiteral, value, 0),
            Self::Blank { value, prefix } => (TermType::Blank, value, u64::from(*prefix)),
            Self::LangLiteral { value, language } => (
                TermType::LangLiteral,
                value,
                u64::from_be_bytes(language.to_packed()),
            ),
            Self::TypedLiteral {
                value, datatype, ..
            } => (
                TermType::TypedLiteral,
                value,
                u64::from(datatype.get()),
            ),
        }
    }
}

impl PartialEq for Term {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Term {}

impl Hash for Term {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for Term {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Term {
    /// The total term order keying the dictionary: variant tag first, then
    /// the variant-specific field, then the lexical value bytewise.
    fn cmp(&self, other: &Self) -> Ordering {
        let (lt, lv, lx) = self.identity();
        let (rt, rv, rx) = other.identity();
        lt.cmp(&rt).then_with(|| lx.cmp(&rx)).then_with(|| lv.cmp(rv))
    }
}

static INTEGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9]+$").unwrap());
static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$").unwrap());
static FLOAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?|[+-]?INF|NaN)$")
        .unwrap()
});
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?[0-9]{4,}-[0-9]{2}-[0-9]{2}(Z|[+-][0-9]{2}:[0-9]{2})?$").unwrap()
});
static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^-?[0-9]{4,}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]+)?(Z|[+-][0-9]{2}:[0-9]{2})?$",
    )
    .unwrap()
});

/// Checks a typed literal's lexical form against its datatype and computes
/// the numeric cache where the datatype is an XSD numeric.
///
/// Dates and date-times are lexically validated but not made numeric.
/// Unrecognized datatypes pass through unvalidated.
pub fn validate_typed_value(
    value: &str,
    datatype_iri: &str,
) -> Result<Option<f64>, LexicalError> {
    let invalid = || LexicalError::InvalidLexicalForm {
        value: value.to_owned(),
        datatype: datatype_iri.to_owned(),
    };
    match datatype_iri {
        xsd::INTEGER => {
            if !INTEGER_RE.is_match(value) {
                return Err(invalid());
            }
        }
        xsd::DECIMAL => {
            if !DECIMAL_RE.is_match(value) {
                return Err(invalid());
            }
        }
        xsd::FLOAT | xsd::DOUBLE => {
            if !FLOAT_RE.is_match(value) {
                return Err(invalid());
            }
        }
        xsd::DATE => {
            return if DATE_RE.is_match(value) {
                Ok(None)
            } else {
                Err(invalid())
            };
        }
        xsd::DATE_TIME => {
            return if DATE_TIME_RE.is_match(value) {
                Ok(None)
            } else {
                Err(invalid())
            };
        }
        _ => return Ok(None),
    }
    let parsed = match value {
        "INF" | "+INF" => f64::INFINITY,
        "-INF" => f64::NEG_INFINITY,
        _ => value.parse().map_err(|_| invalid())?,
    };
    Ok(Some(parsed))
}

/// True for the XSD numeric datatypes whose literals serialize bare in TSV
/// results and N-Triples style listings.
pub fn is_numeric_datatype(datatype_iri: &str) -> bool {
    matches!(
        datatype_iri,
        xsd::INTEGER | xsd::DECIMAL | xsd::FLOAT | xsd::DOUBLE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tag_normalization() {
        assert_eq!("en", LanguageTag::parse("EN").unwrap().as_str());
        assert_eq!("en-US", LanguageTag::parse("en-us").unwrap().as_str());
        assert_eq!("sr-Latn", LanguageTag::parse("SR-LATN").unwrap().as_str());
        assert_eq!("de-DE", LanguageTag::parse("de-de").unwrap().as_str());
    }

    #[test]
    fn language_tag_length_limit() {
        // 7 bytes fit, 8 do not
        assert!(LanguageTag::parse("abcdefg").is_ok());
        assert!(matches!(
            LanguageTag::parse("sr-Latn-RS"),
            Err(LexicalError::LanguageTagTooLong(_))
        ));
    }

    #[test]
    fn language_tag_round_trips_packed_slot() {
        let tag = LanguageTag::parse("en-US").unwrap();
        let unpacked = LanguageTag::from_packed(tag.to_packed()).unwrap();
        assert_eq!(tag, unpacked);
        assert_eq!(5, unpacked.len());
    }

    #[test]
    fn term_identity_ignores_numeric_cache() {
        let datatype = TermId::new(1).unwrap();
        let a = Term::TypedLiteral {
            value: "42".into(),
            datatype,
            numeric: Some(42.0),
        };
        let b = Term::typed_literal("42", datatype);
        assert_eq!(a, b);
        assert_eq!(Ordering::Equal, a.cmp(&b));
    }

    #[test]
    fn term_order_groups_by_variant() {
        let iri = Term::iri("z");
        let blank = Term::blank("a", 0);
        let lit = Term::simple_literal("a");
        assert!(iri < blank);
        assert!(blank < lit);
    }

    #[test]
    fn blank_nodes_differ_by_prefix() {
        assert_ne!(Term::blank("b0", 1), Term::blank("b0", 2));
    }

    #[test]
    fn numeric_validation() {
        assert_eq!(
            Some(42.0),
            validate_typed_value("42", xsd::INTEGER).unwrap()
        );
        assert_eq!(
            Some(3.14),
            validate_typed_value("3.14", xsd::DECIMAL).unwrap()
        );
        assert_eq!(
            Some(f64::NEG_INFINITY),
            validate_typed_value("-INF", xsd::DOUBLE).unwrap()
        );
        assert!(validate_typed_value("abc", xsd::INTEGER).is_err());
        assert!(validate_typed_value("1.5", xsd::INTEGER).is_err());
    }

    #[test]
    fn date_validation_is_not_numeric() {
        assert_eq!(
            None,
            validate_typed_value("1999-01-01", xsd::DATE).unwrap()
        );
        assert_eq!(
            None,
            validate_typed_value("1999-01-01T12:00:00Z", xsd::DATE_TIME).unwrap()
        );
        assert!(validate_typed_value("1999-1-1", xsd::DATE).is_err());
    }

    #[test]
    fn unknown_datatypes_pass_through() {
        assert_eq!(
            None,
            validate_typed_value("anything", "http://example.com/dt").unwrap()
        );
    }
}
