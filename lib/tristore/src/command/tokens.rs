//! The command-line tokenizer and term-token parser.
//!
//! Commands are single lines; whitespace separates tokens, double-quoted
//! spans preserve spaces and honor `\"` and `\\` escapes. The tokenizer
//! keeps quotes and escape sequences in place; quoted-literal decoding
//! happens in [`parse_term_token`] so that forms like `"a b"@en` stay one
//! token.

use crate::error::LexicalError;
use oxiri::IriRef;

/// Splits a command line into tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut in_quotes = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                started = true;
                current.push(c);
            }
            '\\' if in_quotes => {
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                started = true;
                current.push(c);
            }
        }
    }
    if started {
        tokens.push(current);
    }
    tokens
}

/// A term token of the command language, before dictionary resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermToken {
    /// `<iri>`
    Iri(String),
    /// `"value"`, `"value"@lang` or `"value"^^<datatype>`
    Literal {
        value: String,
        language: Option<String>,
        datatype: Option<String>,
    },
    /// `?name` or a bare name
    Variable(String),
    /// A bare decimal integer: a raw term id (debug use)
    NodeId(u32),
}

/// Parses one term token.
///
/// With `unescape` set, `\n`, `\"` and `\\` inside quoted values decode to
/// their characters; regex arguments pass `false` to keep the pattern
/// bytes intact.
pub fn parse_term_token(token: &str, unescape: bool) -> Result<TermToken, LexicalError> {
    if let Some(rest) = token.strip_prefix('<') {
        let iri = rest
            .strip_suffix('>')
            .ok_or_else(|| LexicalError::InvalidTermToken(token.to_owned()))?;
        IriRef::parse(iri)?;
        return Ok(TermToken::Iri(iri.to_owned()));
    }
    if let Some(rest) = token.strip_prefix('"') {
        let (value, suffix) = split_quoted(rest, token)?;
        let value = if unescape {
            unescape_value(&value, token)?
        } else {
            value
        };
        return if suffix.is_empty() {
            Ok(TermToken::Literal {
                value,
                language: None,
                datatype: None,
            })
        } else if let Some(language) = suffix.strip_prefix('@') {
            Ok(TermToken::Literal {
                value,
                language: Some(language.to_owned()),
                datatype: None,
            })
        } else if let Some(datatype) = suffix.strip_prefix("^^<") {
            let datatype = datatype
                .strip_suffix('>')
                .ok_or_else(|| LexicalError::InvalidTermToken(token.to_owned()))?;
            IriRef::parse(datatype)?;
            Ok(TermToken::Literal {
                value,
                language: None,
                datatype: Some(datatype.to_owned()),
            })
        } else {
            Err(LexicalError::InvalidTermToken(token.to_owned()))
        };
    }
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        let id = token
            .parse()
            .map_err(|_| LexicalError::InvalidTermToken(token.to_owned()))?;
        return Ok(TermToken::NodeId(id));
    }
    let name = token.strip_prefix('?').unwrap_or(token);
    if name.is_empty() {
        return Err(LexicalError::InvalidTermToken(token.to_owned()));
    }
    Ok(TermToken::Variable(name.to_owned()))
}

/// Splits `rest` (the bytes after the opening quote) into the raw quoted
/// value and whatever follows the closing quote.
fn split_quoted<'a>(rest: &'a str, token: &str) -> Result<(String, &'a str), LexicalError> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => {
                return Ok((rest[..i].to_owned(), &rest[i + 1..]));
            }
            _ => i += 1,
        }
    }
    Err(LexicalError::InvalidTermToken(token.to_owned()))
}

fn unescape_value(value: &str, token: &str) -> Result<String, LexicalError> {
    if !value.contains('\\') {
        return Ok(value.to_owned());
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            _ => return Err(LexicalError::InvalidTermToken(token.to_owned())),
        }
    }
    Ok(out)
}
