//! Tokenizer for the Go-syntax subset (spec.md §4.3, §6).
//!
//! Extends the teacher's grapheme-based longest-match lexer with `:=`
//! and `&`; drops the teacher's backtick command literal and `${}`
//! string templating, since Force has no command literals at the
//! lexer level (commands are ordinary function calls) and no string
//! interpolation in the DSL subset spec.md describes.
use std::iter::Peekable;

use serde::Serialize;
use unicode_segmentation::{GraphemeIndices, UnicodeSegmentation};

use crate::errors::LexerError;

mod token_kinds;

pub use token_kinds::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token<'a> {
    pub value: TokenValue<'a>,
    pub start: usize,
    pub end: usize,
}

impl<'a> Token<'a> {
    pub fn new(value: TokenValue<'a>, start: usize, end: usize) -> Self {
        Self { value, start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenValue<'a> {
    StringLiteral(&'a str),
    IntegerLiteral(&'a str),
    Identifier(&'a str),
    Keyword(&'a str),
    Equals(),
    Walrus(),
    Ampersand(),
    LeftBracket(),
    RightBracket(),
    LeftCurly(),
    RightCurly(),
    LeftSquare(),
    RightSquare(),
    Dot(),
    Colon(),
    Semicolon(),
    Comma(),
    DoubleQuote(),
}

#[derive(Debug, PartialEq, Eq)]
enum LexerContext {
    Root,
    Comment,
    String,
}

pub fn lex<'a>(file: &'a str) -> Tokens<'a> {
    Tokens::new(file)
}

pub struct Tokens<'a> {
    buffer: &'a str,
    next: (usize, &'a str),
    iterator: Peekable<GraphemeIndices<'a>>,
    context_stack: Vec<LexerContext>,
}

impl<'a> Tokens<'a> {
    pub fn new(file: &'a str) -> Self {
        Self {
            buffer: file,
            next: (0, ""),
            iterator: file.grapheme_indices(true).peekable(),
            context_stack: vec![LexerContext::Root],
        }
    }
}

impl<'a> Tokens<'a> {
    fn next(&mut self) -> Option<Result<Token<'a>, LexerError>> {
        loop {
            // If we are at the end of the file then the iterator is finished.
            let Some(next) = self.iterator.peek() else {
                return None;
            };

            self.next = *next;

            // If the advance method returns None it means that we need to call it again
            // as it found a token that should be ignored (e.g. whitespace)
            let next = self.advance();
            if let Ok(Some(token)) = next {
                return Some(Ok(token));
            }

            if let Err(mut err) = next {
                if err.position.is_none() {
                    err.position = Some(self.next.0);
                }
                return Some(Err(err));
            }
        }
    }

    fn advance(&mut self) -> Result<Option<Token<'a>>, LexerError> {
        let start = self.next.0;
        let mut end = start + self.next.1.len();
        let mut result = None;

        loop {
            let value = &self.buffer[start..end];

            // Try to parse the next token, returning the previously parsed token if we can't parse
            // it this time.
            let Some(new_result) = token_kinds::try_get_token_kind(&mut self.context_stack, value)
            else {
                return match result {
                    Some(result) => Ok(result),
                    None => Err(format!("Could not parse token: {value:?}").into()),
                };
            };

            result = Some(
                new_result
                    .into_token(&value)
                    .map(|value| Token::new(value, start, end)),
            );

            // Advance though the file if we did successfully parse the previous token to see if
            // the next character also makes a valid token.
            self.iterator.next();
            let Some(next) = self.iterator.peek() else {
                return match result {
                    Some(result) => Ok(result),
                    None => Err("Unexpected end of file.".into()),
                };
            };
            self.next = *next;
            end += self.next.1.len();
        }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<Token<'a>, LexerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(source: &str) -> Vec<TokenValue<'_>> {
        lex(source)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
            .into_iter()
            .map(|token| token.value)
            .collect()
    }

    #[test]
    fn should_tokenize_valid_script() {
        let test_file = r#"
# Comments are fun!
func() {
  x := "hello";
  if true {
    Log(x);
  };
}();
"#;
        assert_eq!(
            values(test_file),
            vec![
                TokenValue::Keyword("func"),
                TokenValue::LeftBracket(),
                TokenValue::RightBracket(),
                TokenValue::LeftCurly(),
                TokenValue::Identifier("x"),
                TokenValue::Walrus(),
                TokenValue::DoubleQuote(),
                TokenValue::StringLiteral("hello"),
                TokenValue::DoubleQuote(),
                TokenValue::Semicolon(),
                TokenValue::Keyword("if"),
                TokenValue::Keyword("true"),
                TokenValue::LeftCurly(),
                TokenValue::Identifier("Log"),
                TokenValue::LeftBracket(),
                TokenValue::Identifier("x"),
                TokenValue::RightBracket(),
                TokenValue::Semicolon(),
                TokenValue::RightCurly(),
                TokenValue::Semicolon(),
                TokenValue::RightCurly(),
                TokenValue::LeftBracket(),
                TokenValue::RightBracket(),
                TokenValue::Semicolon(),
            ]
        );
    }

    #[test]
    fn should_parse_empty_string() {
        let test_file = r#"x := "";"#;
        assert_eq!(
            values(test_file),
            vec![
                TokenValue::Identifier("x"),
                TokenValue::Walrus(),
                TokenValue::DoubleQuote(),
                TokenValue::DoubleQuote(),
                TokenValue::Semicolon(),
            ]
        );
    }

    #[test]
    fn should_parse_struct_literal() {
        let test_file = r#"p := Process{Name: "build", Watch: &w};"#;
        assert_eq!(
            values(test_file),
            vec![
                TokenValue::Identifier("p"),
                TokenValue::Walrus(),
                TokenValue::Identifier("Process"),
                TokenValue::LeftCurly(),
                TokenValue::Identifier("Name"),
                TokenValue::Colon(),
                TokenValue::DoubleQuote(),
                TokenValue::StringLiteral("build"),
                TokenValue::DoubleQuote(),
                TokenValue::Comma(),
                TokenValue::Identifier("Watch"),
                TokenValue::Colon(),
                TokenValue::Ampersand(),
                TokenValue::Identifier("w"),
                TokenValue::RightCurly(),
                TokenValue::Semicolon(),
            ]
        );
    }

    #[test]
    fn should_distinguish_colon_from_walrus() {
        let test_file = r#"a := 1; b : 2"#;
        assert_eq!(
            values(test_file),
            vec![
                TokenValue::Identifier("a"),
                TokenValue::Walrus(),
                TokenValue::IntegerLiteral("1"),
                TokenValue::Semicolon(),
                TokenValue::Identifier("b"),
                TokenValue::Colon(),
                TokenValue::IntegerLiteral("2"),
            ]
        );
    }
}
