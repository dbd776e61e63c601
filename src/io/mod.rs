//! Provide methods and data structures for the writer's output sinks.
//!
//! This module is based on `libxml/xmlIO.h`, `xmlIO.c` and so on in `libxml2-v2.11.8`.
//! Please refer to original libxml2 documents also.

// Copyright of the original code is the following.
// --------
// Summary: interface for the I/O interfaces used by the parser
// Description: interface for the I/O interfaces used by the parser
//
// Copy: See Copyright for the status of this software.
//
// Author: Daniel Veillard
// --------
// xmlIO.c : implementation of the I/O interfaces used by the parser
//
// See Copyright for the status of this software.
//
// daniel@veillard.com

mod output;

use std::{
    cell::{Cell, RefCell},
    fs::File,
    io::{self, ErrorKind, Write, stdout},
    rc::Rc,
};

pub use output::XmlOutputBuffer;

use crate::error::{__xml_raise_error, XmlErrorDomain, XmlErrorLevel, XmlParserErrors};

pub(crate) const MINLEN: usize = 4000;

/// Map an I/O error to the libxml2 error code.
fn io_error_code(err: &io::Error) -> XmlParserErrors {
    match err.kind() {
        ErrorKind::PermissionDenied => XmlParserErrors::XmlIOEACCES,
        ErrorKind::WouldBlock => XmlParserErrors::XmlIOEAGAIN,
        ErrorKind::AlreadyExists => XmlParserErrors::XmlIOEEXIST,
        ErrorKind::Interrupted => XmlParserErrors::XmlIOEINTR,
        ErrorKind::InvalidInput => XmlParserErrors::XmlIOEINVAL,
        ErrorKind::IsADirectory => XmlParserErrors::XmlIOEISDIR,
        ErrorKind::NotFound => XmlParserErrors::XmlIOENOENT,
        ErrorKind::StorageFull => XmlParserErrors::XmlIOENOSPC,
        ErrorKind::NotADirectory => XmlParserErrors::XmlIOENOTDIR,
        ErrorKind::Unsupported => XmlParserErrors::XmlIOENOTSUP,
        ErrorKind::BrokenPipe => XmlParserErrors::XmlIOEPIPE,
        ErrorKind::TimedOut => XmlParserErrors::XmlIOETIMEDOUT,
        ErrorKind::WriteZero => XmlParserErrors::XmlIOWrite,
        _ => XmlParserErrors::XmlIOEIO,
    }
}

/// Handle an I/O error.
///
/// If `code` is `XmlErrOK`, the code is derived from `err`.
#[doc(alias = "__xmlIOErr")]
pub(crate) fn xml_ioerr(mut code: XmlParserErrors, err: Option<&io::Error>, extra: Option<&str>) {
    if code.is_ok() {
        code = err.map_or(XmlParserErrors::XmlIOUnknown, io_error_code);
    }
    let msg = match (err, extra) {
        (Some(err), Some(extra)) => format!("{err} {extra}\n"),
        (Some(err), None) => format!("{err}\n"),
        (None, Some(extra)) => format!("I/O error {extra}\n"),
        (None, None) => "Unknown IO error\n".to_owned(),
    };
    __xml_raise_error(
        XmlErrorDomain::XmlFromIO,
        code,
        XmlErrorLevel::XmlErrError,
        extra,
        &msg,
    );
}

/// Escape the text content of an element.
///
/// `<`, `>`, `&` and `"` are replaced by the predefined entities, and `\r` by a character reference.
#[doc(alias = "xmlEncodeSpecialChars")]
pub fn xml_escape_text(input: &str, output: &mut String) {
    for c in input.chars() {
        match c {
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '\r' => output.push_str("&#13;"),
            c => output.push(c),
        }
    }
}

/// Escape an attribute value delimited by `quote`.
///
/// Whitespace other than a plain space is written as character references
/// so that attribute value normalization leaves it intact.
#[doc(alias = "xmlBufAttrSerializeTxtContent")]
pub fn xml_escape_attr(input: &str, quote: u8, output: &mut String) {
    for c in input.chars() {
        match c {
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '\'' if quote == b'\'' => output.push_str("&apos;"),
            '\n' => output.push_str("&#10;"),
            '\r' => output.push_str("&#13;"),
            '\t' => output.push_str("&#9;"),
            c => output.push(c),
        }
    }
}

/// An in-memory sink shared between the writer and its owner.
///
/// The owner keeps a clone of the inner buffer to read the output back.
#[derive(Debug, Clone, Default)]
pub struct MemorySink(Rc<RefCell<Vec<u8>>>);

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink whose buffer has room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self, std::collections::TryReserveError> {
        let mut buf = Vec::new();
        buf.try_reserve(capacity)?;
        Ok(Self(Rc::new(RefCell::new(buf))))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Copy the current content.
    pub fn content(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    /// Take the current content, leaving the buffer empty.
    #[doc(alias = "xmlBufferEmpty")]
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A sink forwarding to a caller-supplied stream.
///
/// Once `closed` is set, every write becomes a no-op reporting zero bytes,
/// and the stream itself is never touched again.
pub struct StreamSink<'a> {
    inner: &'a mut (dyn Write + 'a),
    closed: Rc<Cell<bool>>,
}

impl<'a> StreamSink<'a> {
    pub fn new(inner: &'a mut (dyn Write + 'a), closed: Rc<Cell<bool>>) -> Self {
        Self { inner, closed }
    }
}

impl Write for StreamSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.get() {
            return Ok(0);
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed.get() {
            return Ok(());
        }
        self.inner.flush()
    }
}

/// Open `filename` for writing.
///
/// If `filename` is `"-"`, the standard output is used.
#[doc(alias = "xmlFileOpenW")]
pub fn open_output_file(filename: &str) -> io::Result<Box<dyn Write>> {
    if filename == "-" {
        return Ok(Box::new(stdout()));
    }
    match File::options()
        .write(true)
        .truncate(true)
        .create(true)
        .open(filename)
    {
        Ok(file) => Ok(Box::new(file)),
        Err(e) => {
            xml_ioerr(XmlParserErrors::XmlErrOK, Some(&e), Some(filename));
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        let mut out = String::new();
        xml_escape_text("a & b <c> \"d\"\r", &mut out);
        assert_eq!(out, "a &amp; b &lt;c&gt; &quot;d&quot;&#13;");
    }

    #[test]
    fn test_escape_attr() {
        let mut out = String::new();
        xml_escape_attr("it's\t\"x\"\n", b'"', &mut out);
        assert_eq!(out, "it's&#9;&quot;x&quot;&#10;");

        let mut out = String::new();
        xml_escape_attr("it's", b'\'', &mut out);
        assert_eq!(out, "it&apos;s");
    }

    #[test]
    fn test_memory_sink_take() {
        let mut sink = MemorySink::new();
        let reader = sink.clone();
        sink.write_all(b"<a/>").unwrap();
        assert_eq!(reader.len(), 4);
        assert_eq!(reader.take(), b"<a/>");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_stream_sink_after_close() {
        let mut out = Vec::new();
        let closed = Rc::new(Cell::new(false));
        {
            let mut sink = StreamSink::new(&mut out, closed.clone());
            assert_eq!(sink.write(b"abc").unwrap(), 3);
            closed.set(true);
            assert_eq!(sink.write(b"def").unwrap(), 0);
        }
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_open_output_file_failure() {
        let res = open_output_file("/nonexistent-directory/for/sure/out.xml");
        assert!(res.is_err());
    }
}
