//! Integer and string literal parsing (spec.md §4.3).
//!
//! Grounded on the teacher's `parser/literals.rs`: the teacher unescapes
//! backslash sequences grapheme-by-grapheme (its template/interpolation
//! machinery needs grapheme boundaries); Force has no string templating
//! at the lexer level, so the only escape its subset needs is `\"`.
use unicode_segmentation::UnicodeSegmentation;

use crate::lexer::{Token, TokenValue};

use super::{error_at, TokenStream};
use crate::errors::CodeError;

pub(super) fn parse_integer_literal(token: &Token, file: &str, source: &str) -> Result<i64, CodeError> {
    let TokenValue::IntegerLiteral(raw) = token.value else {
        unreachable!("parse_integer_literal called on a non-integer token");
    };
    raw.parse::<i64>()
        .map_err(|_| error_at(token.start, file, source, format!("{raw} is not a valid integer")))
}

/// Parses the body of a string literal: the opening [`TokenValue::DoubleQuote`]
/// must already have been consumed by the caller. Unescapes `\"` back into `"`;
/// any other backslash is passed through unchanged.
pub(super) fn parse_string_literal(
    tokens: &mut TokenStream<'_>,
    file: &str,
    source: &str,
) -> Result<String, CodeError> {
    let mut result = String::new();
    loop {
        let position = super::peek_position(tokens, source);
        match tokens.next() {
            Some(Token { value: TokenValue::DoubleQuote(), .. }) => break,
            Some(Token { value: TokenValue::StringLiteral(raw), .. }) => {
                result.push_str(&unescape(raw));
            }
            Some(token) => {
                return Err(error_at(
                    token.start,
                    file,
                    source,
                    format!("unexpected {:?} inside string literal", token.value),
                ))
            }
            None => return Err(error_at(position, file, source, "unterminated string literal")),
        }
    }
    Ok(result)
}

fn unescape(value: &str) -> String {
    let mut result = String::new();
    let mut escape = false;
    for grapheme in value.graphemes(true) {
        if grapheme == "\\" && !escape {
            escape = true;
        } else {
            result.push_str(grapheme);
            escape = false;
        }
    }
    result
}
