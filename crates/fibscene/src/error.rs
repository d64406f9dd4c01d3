use thiserror::Error;

use crate::primitive::PrimitiveKind;

/// Failures while reading a scene description. All of them are fatal to the
/// file being read.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ran out while another line was expected.
    #[error("unexpected end of input after line {line}")]
    EndOfInput { line: usize },

    #[error("line {line}: expected a non-negative count, got {content:?}")]
    MalformedCount { line: usize, content: String },

    #[error("line {line}: {kind} record needs {expected} fields, got {actual}: {content:?}")]
    ArityMismatch {
        line: usize,
        kind: PrimitiveKind,
        expected: usize,
        actual: usize,
        content: String,
    },

    #[error("line {line}: cannot parse {token:?} as {expected}")]
    NumericParse {
        line: usize,
        token: String,
        expected: &'static str,
    },
}

/// Violations of the extractor contract or of expected tensor shapes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("refusing to add an empty {0} batch")]
    EmptyBatch(PrimitiveKind),

    #[error("{kind} rows must have {expected} columns, got {actual}")]
    RowWidth {
        kind: PrimitiveKind,
        expected: usize,
        actual: usize,
    },

    #[error("{what}: expected shape {expected:?}, got {actual:?}")]
    Shape {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}
