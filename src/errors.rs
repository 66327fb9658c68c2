//! Error taxonomy and source-position wrapping (spec.md §4.10, §7).
use std::{error::Error, fmt::Display};

use crate::lexer::Token;

macro_rules! impl_error {
    ($error:ident) => {
        impl Error for $error {
            fn source(&self) -> Option<&(dyn Error + 'static)> {
                None
            }
        }

        impl From<&str> for $error {
            fn from(value: &str) -> Self {
                value.to_owned().into()
            }
        }
    };
}

/// Tokenizer-level failure, grounded on the teacher's `LexerError`
/// (mirrors `components/errors.rs::LexerError`); carries only a
/// message and byte offset since the lexer has no token to attach yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexerError {
    pub message: String,
    pub position: Option<usize>,
}

impl LexerError {
    pub fn new(message: String) -> Self {
        Self {
            message,
            position: None,
        }
    }
}

impl Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.message.fmt(f)
    }
}

impl From<String> for LexerError {
    fn from(value: String) -> Self {
        LexerError::new(value)
    }
}

impl_error!(LexerError);

impl From<LexerError> for ForceError {
    fn from(value: LexerError) -> Self {
        ForceError::BadParameter(value.message)
    }
}

/// The abstract error kinds spec.md §4.10 / §7 classify runtime and
/// setup failures into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceError {
    /// A user script or input was malformed: bad arity, bad type, missing
    /// field, bad conversion.
    BadParameter(String),
    /// A lookup failed: missing identifier, missing plugin, missing
    /// struct/type prototype.
    NotFound(String),
    /// A definition collided with one that already exists in the same
    /// scope (redefinition).
    AlreadyExists(String),
    /// A context was cancelled while the action was waiting on it.
    ConnectionProblem(String),
    /// Multiple failures joined from a `Parallel` action or a `Close`.
    Aggregate(Vec<ForceError>),
    /// Propagated verbatim; does not fit one of the above kinds.
    Other(String),
    /// Raised by the `Exit(code)` builtin (spec.md §6, §8 S2): not a
    /// failure, but a short-circuit carrying the user-chosen process
    /// exit code through `Sequence`'s `?`-propagation up to the
    /// top-level runner, which maps it straight through rather than via
    /// [`CodeError::exit_code`]'s fixed classification.
    Exit(i64),
}

impl ForceError {
    pub fn bad_parameter(msg: impl Into<String>) -> Self {
        Self::BadParameter(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn aggregate(errors: Vec<ForceError>) -> Self {
        if errors.len() == 1 {
            errors.into_iter().next().unwrap()
        } else {
            Self::Aggregate(errors)
        }
    }
}

impl From<String> for ForceError {
    fn from(value: String) -> Self {
        Self::Other(value)
    }
}

impl Display for ForceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForceError::BadParameter(m) => write!(f, "bad parameter: {m}"),
            ForceError::NotFound(m) => write!(f, "not found: {m}"),
            ForceError::AlreadyExists(m) => write!(f, "already exists: {m}"),
            ForceError::ConnectionProblem(m) => write!(f, "connection problem: {m}"),
            ForceError::Aggregate(errs) => {
                f.write_str("multiple errors occurred:")?;
                for e in errs {
                    write!(f, "\n  - {e}")?;
                }
                Ok(())
            }
            ForceError::Other(m) => m.fmt(f),
            ForceError::Exit(code) => write!(f, "exit({code})"),
        }
    }
}

/// Wraps a [`ForceError`] with the source snippet surrounding the parse
/// site that produced the failing construct (spec.md §4.10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeError {
    pub error: ForceError,
    pub file: Option<String>,
    pub position: Option<usize>,
    pub snippet: Option<String>,
}

impl CodeError {
    pub fn new(error: ForceError) -> Self {
        Self { error, file: None, position: None, snippet: None }
    }

    pub fn at(mut self, file: &str, position: usize, source: &str) -> Self {
        self.file = Some(file.to_owned());
        self.position = Some(position);
        self.snippet = Some(line_snippet(source, position));
        self
    }

    /// Attach position information from a lexer [`Token`].
    pub fn at_token(self, file: &str, token: &Token, source: &str) -> Self {
        self.at(file, token.start, source)
    }

    pub fn exit_code(&self) -> u8 {
        match &self.error {
            ForceError::BadParameter(_) => 101,
            ForceError::NotFound(_) => 102,
            ForceError::AlreadyExists(_) => 103,
            ForceError::ConnectionProblem(_) => 104,
            ForceError::Aggregate(_) => 105,
            ForceError::Other(_) => 100,
            ForceError::Exit(code) => *code as u8,
        }
    }
}

impl From<ForceError> for CodeError {
    fn from(error: ForceError) -> Self {
        CodeError::new(error)
    }
}

impl From<&str> for CodeError {
    fn from(value: &str) -> Self {
        CodeError::new(value.into())
    }
}

impl From<String> for CodeError {
    fn from(value: String) -> Self {
        CodeError::new(value.into())
    }
}

impl Display for CodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)?;
        if let (Some(file), Some(pos)) = (&self.file, self.position) {
            write!(f, "\n  at {file}:{pos}")?;
        }
        if let Some(snippet) = &self.snippet {
            write!(f, "\n{snippet}")?;
        }
        Ok(())
    }
}

impl Error for CodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

impl_error!(ForceError);

/// Captures the line containing `position` in `source`, for diagnostics.
pub fn line_snippet(source: &str, position: usize) -> String {
    let mut line_start = 0;
    let mut line_end = source.len();
    for (i, c) in source.char_indices() {
        if c == '\n' {
            if i < position {
                line_start = i + 1;
            } else {
                line_end = i;
                break;
            }
        }
    }
    let line = &source[line_start..line_end.max(line_start)];
    let underline_pos = position.saturating_sub(line_start).min(line.len());
    format!("{line}\n{}^", " ".repeat(underline_pos))
}

pub type ForceResult<T> = Result<T, ForceError>;
pub type CodeResult<T> = Result<T, CodeError>;
