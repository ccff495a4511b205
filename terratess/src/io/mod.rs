//! Stream adapters for model and grid persistence.
//!
//! Two families of adapters share the same logical operations:
//!
//! - [`BinaryWriter`] / [`BinaryReader`] move primitive values and arrays
//!   through a byte-oriented sink/source with an explicit byte order.
//! - [`AsciiWriter`] / [`AsciiReader`] move the same values through
//!   whitespace/newline-delimited text tokens.
//!
//! Adapters are single-owner and strictly sequential. Any fault is fatal to
//! the load or save in progress; callers must not use partially read state.

mod ascii;
mod binary;

pub use ascii::{AsciiReader, AsciiWriter};
pub use binary::{BinaryReader, BinaryWriter, ByteOrder};

use thiserror::Error;

/// On-disk representation of a model or grid file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// Compact byte-oriented format with an explicit byte order.
    #[default]
    Binary,
    /// Whitespace/newline-delimited text, human-diffable.
    Ascii,
}

/// Errors raised by the stream adapters.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Underlying I/O failure (unreadable file, permission denied).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source ended before a complete value could be read.
    #[error("stream truncated at byte offset {offset}")]
    Truncated { offset: u64 },

    /// A length prefix or count read from a binary stream is not usable.
    #[error("invalid length {length} at byte offset {offset}")]
    InvalidLength { length: i64, offset: u64 },

    /// A string read from a binary stream is not valid UTF-8.
    #[error("invalid UTF-8 in string at byte offset {offset}")]
    InvalidUtf8 { offset: u64 },

    /// A text token could not be parsed as the requested type.
    #[error("malformed token '{token}' at line {line}: expected {expected}")]
    MalformedToken {
        token: String,
        line: usize,
        expected: &'static str,
    },

    /// The text source ended while more tokens were expected.
    #[error("unexpected end of input at line {line}")]
    Eof { line: usize },
}
