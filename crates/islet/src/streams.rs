//! Stream objects: the reader's character source and the printer's
//! character sink.
//!
//! `spec.md` §6 treats stream I/O as "an external collaborator with a
//! specified interface" and scopes actual file I/O out. This module
//! supplies the two concrete backings needed to exercise the reader and
//! `eval`/`read`/`print` contract end-to-end — in-memory string streams —
//! behind the same `CharSource`/`CharSink` traits a host would implement for
//! file streams. Grounded on the teacher's pattern of trait-bounded I/O
//! seams (e.g. `io.rs`'s abstraction over stdio vs. captured buffers) rather
//! than hardcoding `std::io::Stdin`/`Stdout` throughout the reader.

use std::fmt;

use crate::error::{EvalError, EvalResult};

/// Direction a stream was opened for (`spec.md`'s Stream variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Input,
    Output,
    InputOutput,
}

/// A source of characters the reader can consume and look ahead into.
pub trait CharSource: fmt::Debug {
    /// Consumes and returns the next character, or `None` at end of stream.
    fn read_char(&mut self) -> Option<char>;
    /// Returns the next character without consuming it.
    fn preview_char(&mut self) -> Option<char>;
    /// `true` if a character is immediately available (`stream-ready-p`).
    fn ready(&self) -> bool;
}

/// A sink the printer can write characters and bytes to.
pub trait CharSink: fmt::Debug {
    fn write_char(&mut self, c: char);
    fn write_str(&mut self, s: &str) {
        for c in s.chars() {
            self.write_char(c);
        }
    }
}

/// An in-memory input stream over a fixed string, the backing for
/// `string-in` (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct StringInputStream {
    chars: Vec<char>,
    position: usize,
}

impl StringInputStream {
    #[must_use]
    pub fn new(content: &str) -> Self {
        Self {
            chars: content.chars().collect(),
            position: 0,
        }
    }
}

impl CharSource for StringInputStream {
    fn read_char(&mut self) -> Option<char> {
        let c = self.chars.get(self.position).copied();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn preview_char(&mut self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn ready(&self) -> bool {
        self.position < self.chars.len()
    }
}

/// An in-memory output stream accumulating into a `String`, the backing for
/// `string-out`.
#[derive(Debug, Clone, Default)]
pub struct StringOutputStream {
    buffer: String,
}

impl StringOutputStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.buffer
    }
}

impl CharSink for StringOutputStream {
    fn write_char(&mut self, c: char) {
        self.buffer.push(c);
    }
}

/// The heap-resident stream object. Either backing can be absent (a closed
/// stream still occupies a slot so existing `Value::Ref`s stay valid, per
/// the specification's general object lifecycle — nothing about closing a
/// stream rewinds the heap).
#[derive(Debug, Clone)]
pub struct StreamHandle {
    pub direction: StreamDirection,
    pub input: Option<StringInputStream>,
    pub output: Option<StringOutputStream>,
    pub open: bool,
}

impl StreamHandle {
    #[must_use]
    pub fn string_input(content: &str) -> Self {
        Self {
            direction: StreamDirection::Input,
            input: Some(StringInputStream::new(content)),
            output: None,
            open: true,
        }
    }

    #[must_use]
    pub fn string_output() -> Self {
        Self {
            direction: StreamDirection::Output,
            input: None,
            output: Some(StringOutputStream::new()),
            open: true,
        }
    }

    #[must_use]
    pub fn is_input(&self) -> bool {
        matches!(self.direction, StreamDirection::Input | StreamDirection::InputOutput) && self.input.is_some()
    }

    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(self.direction, StreamDirection::Output | StreamDirection::InputOutput) && self.output.is_some()
    }

    #[must_use]
    pub fn ready(&self) -> bool {
        self.open && self.input.as_ref().is_some_and(CharSource::ready)
    }

    pub fn read_char(&mut self) -> EvalResult<Option<char>> {
        if !self.open {
            return Err(EvalError::control_error("read-char: stream is closed"));
        }
        let source = self
            .input
            .as_mut()
            .ok_or_else(|| EvalError::domain_error("input-stream", "output-stream"))?;
        Ok(source.read_char())
    }

    pub fn preview_char(&mut self) -> EvalResult<Option<char>> {
        if !self.open {
            return Err(EvalError::control_error("preview-char: stream is closed"));
        }
        let source = self
            .input
            .as_mut()
            .ok_or_else(|| EvalError::domain_error("input-stream", "output-stream"))?;
        Ok(source.preview_char())
    }

    pub fn write_char(&mut self, c: char) -> EvalResult<()> {
        if !self.open {
            return Err(EvalError::control_error("write-char: stream is closed"));
        }
        let sink = self
            .output
            .as_mut()
            .ok_or_else(|| EvalError::domain_error("output-stream", "input-stream"))?;
        sink.write_char(c);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_stream_reads_and_previews_in_lockstep() {
        let mut s = StringInputStream::new("ab");
        assert_eq!(s.preview_char(), Some('a'));
        assert_eq!(s.read_char(), Some('a'));
        assert_eq!(s.read_char(), Some('b'));
        assert_eq!(s.read_char(), None);
    }

    #[test]
    fn output_stream_accumulates_written_chars() {
        let mut s = StringOutputStream::new();
        s.write_str("hi");
        assert_eq!(s.as_str(), "hi");
    }

    #[test]
    fn closed_stream_signals_control_error() {
        let mut h = StreamHandle::string_input("x");
        h.open = false;
        assert!(h.read_char().is_err());
    }
}
