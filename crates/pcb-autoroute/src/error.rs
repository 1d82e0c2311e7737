use std::path::PathBuf;
use thiserror::Error;

/// Why the document parser rejected its input.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unmatched '(' opened at byte {open}")]
    UnclosedList { open: usize },

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("expected an atom but found none")]
    EmptyAtom,
}

/// Fatal parser error carrying the byte offset where parsing stopped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("syntax error at byte {offset}: {kind}")]
pub struct SyntaxError {
    pub offset: usize,
    pub kind: SyntaxErrorKind,
}

impl SyntaxError {
    pub fn new(offset: usize, kind: SyntaxErrorKind) -> Self {
        Self { offset, kind }
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("could not parse {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: SyntaxError,
    },

    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}
