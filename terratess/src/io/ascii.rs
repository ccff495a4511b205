//! Ascii stream adapter.
//!
//! The ascii format carries the same logical sections as the binary format
//! as whitespace/newline-delimited tokens, so files stay human-diffable.
//! The reader tracks line numbers for error reporting and exposes explicit
//! end-of-stream detection.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use super::StreamError;

/// Writes whitespace/newline-delimited tokens to a text sink.
pub struct AsciiWriter<W: Write> {
    sink: W,
    line_has_tokens: bool,
}

impl<W: Write> AsciiWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            line_has_tokens: false,
        }
    }

    /// Write one token, space-separated from any previous token on the line.
    pub fn write_token(&mut self, token: &str) -> Result<(), StreamError> {
        if self.line_has_tokens {
            write!(self.sink, " ")?;
        }
        write!(self.sink, "{token}")?;
        self.line_has_tokens = true;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), StreamError> {
        self.write_token(&value.to_string())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), StreamError> {
        self.write_token(&value.to_string())
    }

    /// Write a float with the shortest representation that parses back to
    /// the identical value.
    pub fn write_f64(&mut self, value: f64) -> Result<(), StreamError> {
        self.write_token(&format!("{value}"))
    }

    pub fn write_f64_array(&mut self, values: &[f64]) -> Result<(), StreamError> {
        for &v in values {
            self.write_f64(v)?;
        }
        Ok(())
    }

    /// Terminate the current line.
    pub fn end_line(&mut self) -> Result<(), StreamError> {
        writeln!(self.sink)?;
        self.line_has_tokens = false;
        Ok(())
    }

    /// Write a full line verbatim. Must be called at a line boundary.
    pub fn write_line(&mut self, line: &str) -> Result<(), StreamError> {
        debug_assert!(!self.line_has_tokens, "write_line inside an open line");
        writeln!(self.sink, "{line}")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W, StreamError> {
        if self.line_has_tokens {
            writeln!(self.sink)?;
        }
        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Reads whitespace/newline-delimited tokens from a text source.
pub struct AsciiReader<R: BufRead> {
    source: R,
    tokens: VecDeque<String>,
    line_number: usize,
    eof: bool,
}

impl<R: BufRead> AsciiReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            tokens: VecDeque::new(),
            line_number: 0,
            eof: false,
        }
    }

    /// Line number of the most recently read line (1-based).
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    fn fill(&mut self) -> Result<(), StreamError> {
        while self.tokens.is_empty() && !self.eof {
            let mut line = String::new();
            if self.source.read_line(&mut line)? == 0 {
                self.eof = true;
                return Ok(());
            }
            self.line_number += 1;
            self.tokens
                .extend(line.split_whitespace().map(str::to_owned));
        }
        Ok(())
    }

    /// True once every token has been consumed.
    pub fn is_eof(&mut self) -> Result<bool, StreamError> {
        self.fill()?;
        Ok(self.tokens.is_empty())
    }

    /// Read the next token, failing on end of input.
    pub fn read_token(&mut self) -> Result<String, StreamError> {
        self.fill()?;
        self.tokens.pop_front().ok_or(StreamError::Eof {
            line: self.line_number,
        })
    }

    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        let token = self.read_token()?;
        token.parse().map_err(|_| StreamError::MalformedToken {
            token,
            line: self.line_number,
            expected: "integer",
        })
    }

    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        let token = self.read_token()?;
        token.parse().map_err(|_| StreamError::MalformedToken {
            token,
            line: self.line_number,
            expected: "byte",
        })
    }

    /// Read a non-negative count.
    pub fn read_count(&mut self) -> Result<usize, StreamError> {
        let token = self.read_token()?;
        token.parse().map_err(|_| StreamError::MalformedToken {
            token,
            line: self.line_number,
            expected: "non-negative integer",
        })
    }

    pub fn read_f64(&mut self) -> Result<f64, StreamError> {
        let token = self.read_token()?;
        token.parse().map_err(|_| StreamError::MalformedToken {
            token,
            line: self.line_number,
            expected: "floating-point number",
        })
    }

    pub fn read_f64_array(&mut self, count: usize) -> Result<Vec<f64>, StreamError> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_f64()?);
        }
        Ok(values)
    }

    /// Read one full line verbatim, discarding any tokens still pending on
    /// the current line. Used for free-text sections.
    pub fn read_line(&mut self) -> Result<String, StreamError> {
        self.tokens.clear();
        let mut line = String::new();
        if self.source.read_line(&mut line)? == 0 {
            return Err(StreamError::Eof {
                line: self.line_number,
            });
        }
        self.line_number += 1;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }
}
