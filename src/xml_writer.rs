//! The high level writer: one object owning a sink and a text writer.
//!
//! Every operation returns `true` on success and `false` on failure;
//! the reason of a failure is reported through the error handlers in [`crate::globals`]
//! and can be read back with [`get_last_error`](crate::globals::get_last_error).
//! Use [`XmlWriter::strict`] to get `Result`s instead.
//!
//! ```
//! use exml_writer::xml_writer::{Flushed, XmlWriter};
//!
//! let mut writer = XmlWriter::string().unwrap();
//! writer.start_element("greeting");
//! writer.write_attribute("lang", "en");
//! writer.write_string("Hello & welcome");
//! writer.end_element();
//! let Flushed::Content(xml) = writer.flush(true).unwrap() else {
//!     unreachable!()
//! };
//! assert_eq!(xml, r#"<greeting lang="en">Hello &amp; welcome</greeting>"#);
//! ```

use std::{cell::Cell, io::Write, rc::Rc};

use crate::{
    encoding::{XmlCharEncoding, decode_to_string},
    error::XmlWriterError,
    io::{MINLEN, MemorySink, StreamSink, XmlOutputBuffer},
    writer::{WriterResult, XmlTextWriter},
};
#[cfg(feature = "libxml_tree")]
use crate::{error::XmlParserErrors, tree::Document, writer::state_error};

/// Options of [`XmlWriter::start_document`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StartDocumentOptions {
    /// The output encoding. `None` means UTF-8 without an encoding declaration.
    pub encoding: Option<XmlCharEncoding>,
    /// `Some(true)` writes `standalone="yes"`, `Some(false)` writes `standalone="no"`.
    pub standalone: Option<bool>,
}

/// The value returned by [`XmlWriter::flush`].
#[derive(Debug, Clone, PartialEq)]
pub enum Flushed {
    /// The content of the in-memory buffer.
    Content(String),
    /// The number of bytes handed to a file, a stream or a tree.
    Written(usize),
}

/// The value returned by [`XmlWriter::result`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriterOutput {
    String(String),
    #[cfg(feature = "libxml_tree")]
    Document(Document),
}

enum Output {
    Memory(MemorySink),
    #[cfg(feature = "libxml_tree")]
    Tree(MemorySink),
    File,
    Stream,
}

pub struct XmlWriter<'a> {
    writer: Option<XmlTextWriter<'a>>,
    output: Output,
    encoding: Option<String>,
    closed: Rc<Cell<bool>>,
}

impl<'a> XmlWriter<'a> {
    fn with_output(writer: XmlTextWriter<'a>, output: Output, closed: Rc<Cell<bool>>) -> Self {
        Self {
            writer: Some(writer),
            output,
            encoding: None,
            closed,
        }
    }

    /// Create a writer which writes XML directly into `stream`.
    ///
    /// The stream is borrowed; closing the writer flushes into it but never drops it.
    pub fn io<W: Write + 'a>(stream: &'a mut W) -> Self {
        let closed = Rc::new(Cell::new(false));
        let sink = StreamSink::new(stream, closed.clone());
        let writer = XmlTextWriter::new(XmlOutputBuffer::from_writer(sink));
        Self::with_output(writer, Output::Stream, closed)
    }

    /// Create a writer which writes XML into the file `path`.
    ///
    /// The file is created or truncated. `"-"` means the standard output.
    pub fn file(path: &str) -> Result<Self, XmlWriterError> {
        let writer = XmlTextWriter::from_filename(path)?;
        Ok(Self::with_output(
            writer,
            Output::File,
            Rc::new(Cell::new(false)),
        ))
    }

    /// Create a writer which writes XML into memory, as string.
    pub fn string() -> Result<Self, XmlWriterError> {
        let sink = MemorySink::with_capacity(MINLEN)?;
        let writer = XmlTextWriter::from_writer(sink.clone());
        Ok(Self::with_output(
            writer,
            Output::Memory(sink),
            Rc::new(Cell::new(false)),
        ))
    }

    /// Create a writer which builds an in-memory [`Document`].
    ///
    /// The document is available from [`XmlWriter::result`].
    #[cfg(feature = "libxml_tree")]
    pub fn document() -> Result<Self, XmlWriterError> {
        let sink = MemorySink::with_capacity(MINLEN)?;
        let mut writer = XmlTextWriter::from_writer(sink.clone());
        writer.disable_transcoding();
        Ok(Self::with_output(
            writer,
            Output::Tree(sink),
            Rc::new(Cell::new(false)),
        ))
    }

    /// The underlying writer, which reports failures as `Err`.
    ///
    /// Returns `None` once the writer is closed.
    pub fn strict(&mut self) -> Option<&mut XmlTextWriter<'a>> {
        if self.closed.get() {
            return None;
        }
        self.writer.as_mut()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// The declared output encoding, if `start_document` declared one.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    fn invoke(&mut self, f: impl FnOnce(&mut XmlTextWriter<'a>) -> WriterResult) -> bool {
        match self.strict() {
            Some(writer) => f(writer).is_ok(),
            None => false,
        }
    }

    /// Flushes the output buffer.
    ///
    /// For a writer created by [`XmlWriter::string`], the current content of the buffer is
    /// returned, and the buffer is emptied if `empty` is `true`.
    /// Otherwise, the number of written bytes is returned.
    pub fn flush(&mut self, empty: bool) -> Result<Flushed, XmlWriterError> {
        let writer = self.strict().ok_or(XmlWriterError::Closed)?;
        let written = writer.flush()?;

        match &self.output {
            Output::Memory(sink) => {
                let bytes = if empty { sink.take() } else { sink.content() };
                let content = decode_to_string(&bytes, self.encoding.as_deref())?;
                Ok(Flushed::Content(content))
            }
            #[cfg(feature = "libxml_tree")]
            Output::Tree(_) => Ok(Flushed::Written(written)),
            Output::File | Output::Stream => Ok(Flushed::Written(written)),
        }
    }

    /// Returns the result of the writer.
    ///
    /// A string for [`XmlWriter::string`], a document for [`XmlWriter::document`],
    /// and `None` for files and streams.
    /// The string is not removed from the buffer; use `flush(true)` for that.
    ///
    /// A document can only be built once every element is closed, so the document
    /// writer fails with [`XmlWriterError::State`] while nodes are still open.
    pub fn result(&mut self) -> Result<Option<WriterOutput>, XmlWriterError> {
        if let Some(writer) = self.strict() {
            writer.flush()?;
        }

        match &self.output {
            Output::Memory(sink) => {
                let content = decode_to_string(&sink.content(), self.encoding.as_deref())?;
                Ok(Some(WriterOutput::String(content)))
            }
            #[cfg(feature = "libxml_tree")]
            Output::Tree(sink) => {
                if self.writer.as_ref().is_some_and(|writer| writer.depth() > 0) {
                    return Err(state_error(
                        XmlParserErrors::XmlErrInternalError,
                        "XmlWriter::result : the document still has open nodes!\n",
                    ));
                }
                let text = String::from_utf8(sink.content())
                    .map_err(|e| XmlWriterError::Tree(e.to_string().into()))?;
                let mut doc = Document::parse_str(&text)
                    .map_err(|e| XmlWriterError::Tree(e.to_string().into()))?;
                if let Some(encoding) = self.encoding.as_deref() {
                    doc.encoding = Some(encoding.to_owned());
                }
                Ok(Some(WriterOutput::Document(doc)))
            }
            Output::File | Output::Stream => Ok(None),
        }
    }

    /// Flush and close the writer.
    ///
    /// A closed writer refuses every operation and never touches its sink again.
    /// Returns `false` if the writer was already closed or the final flush failed.
    pub fn close(&mut self) -> bool {
        if self.closed.get() {
            return false;
        }
        let flushed = self
            .writer
            .as_mut()
            .is_some_and(|writer| writer.flush().is_ok());
        self.closed.set(true);
        self.writer = None;
        flushed
    }

    /// Toggles indentation on or off.
    pub fn set_indent(&mut self, indent: bool) -> bool {
        self.invoke(|writer| {
            writer.set_indent(indent);
            Ok(0)
        })
    }

    /// Sets the string used for one level of indentation. The default is one space.
    pub fn set_indent_string(&mut self, indent: &str) -> bool {
        self.invoke(|writer| {
            writer.set_indent_string(indent);
            Ok(0)
        })
    }

    /// Sets the character used to quote attributes, either `'"'` or `'\''`.
    pub fn set_quote_char(&mut self, quote: char) -> bool {
        let Ok(quote) = u8::try_from(quote) else {
            return false;
        };
        self.invoke(|writer| writer.set_quote_char(quote).map(|_| 0))
    }

    /// Starts a new document.
    pub fn start_document(&mut self, options: StartDocumentOptions) -> bool {
        let encoding = match options.encoding {
            Some(encoding) => match encoding.get_name() {
                Some(name) => Some(name),
                None => return false,
            },
            None => None,
        };
        let Some(writer) = self.strict() else {
            return false;
        };
        if writer
            .start_document(None, encoding, options.standalone)
            .is_err()
        {
            return false;
        }
        self.encoding = writer.encoding().map(|name| name.to_owned());
        true
    }

    /// Ends the current document, closing every open construct.
    pub fn end_document(&mut self) -> bool {
        self.invoke(|writer| writer.end_document())
    }

    pub fn start_element(&mut self, name: &str) -> bool {
        self.invoke(|writer| writer.start_element(name))
    }

    /// Starts an element with a namespace. A declaration is written if `namespace_uri` is given.
    pub fn start_element_ns(
        &mut self,
        prefix: Option<&str>,
        name: &str,
        namespace_uri: Option<&str>,
    ) -> bool {
        self.invoke(|writer| writer.start_element_ns(prefix, name, namespace_uri))
    }

    /// Ends the current element, using `<x/>` if it has no content.
    pub fn end_element(&mut self) -> bool {
        self.invoke(|writer| writer.end_element())
    }

    /// Ends the current element with an end tag, even if it is empty.
    pub fn full_end_element(&mut self) -> bool {
        self.invoke(|writer| writer.full_end_element())
    }

    /// Writes a full element. Without `content` an empty element is written.
    pub fn write_element(&mut self, name: &str, content: Option<&str>) -> bool {
        self.invoke(|writer| writer.write_element(name, content))
    }

    pub fn write_element_ns(
        &mut self,
        prefix: Option<&str>,
        name: &str,
        content: Option<&str>,
        namespace_uri: Option<&str>,
    ) -> bool {
        self.invoke(|writer| writer.write_element_ns(prefix, name, namespace_uri, content))
    }

    pub fn start_attribute(&mut self, name: &str) -> bool {
        self.invoke(|writer| writer.start_attribute(name))
    }

    pub fn start_attribute_ns(
        &mut self,
        prefix: Option<&str>,
        name: &str,
        namespace_uri: Option<&str>,
    ) -> bool {
        self.invoke(|writer| writer.start_attribute_ns(prefix, name, namespace_uri))
    }

    pub fn end_attribute(&mut self) -> bool {
        self.invoke(|writer| writer.end_attribute())
    }

    pub fn write_attribute(&mut self, name: &str, content: &str) -> bool {
        self.invoke(|writer| writer.write_attribute(name, Some(content)))
    }

    pub fn write_attribute_ns(
        &mut self,
        prefix: Option<&str>,
        name: &str,
        content: &str,
        namespace_uri: Option<&str>,
    ) -> bool {
        self.invoke(|writer| writer.write_attribute_ns(prefix, name, namespace_uri, Some(content)))
    }

    /// Writes text, escaping the reserved characters.
    pub fn write_string(&mut self, content: &str) -> bool {
        self.invoke(|writer| writer.write_string(content))
    }

    /// Writes text as is, without escaping.
    pub fn write_raw(&mut self, content: &str) -> bool {
        self.invoke(|writer| writer.write_raw(content))
    }

    pub fn write_base64(&mut self, data: &[u8]) -> bool {
        self.invoke(|writer| writer.write_base64(data))
    }

    pub fn write_bin_hex(&mut self, data: &[u8]) -> bool {
        self.invoke(|writer| writer.write_bin_hex(data))
    }

    pub fn start_comment(&mut self) -> bool {
        self.invoke(|writer| writer.start_comment())
    }

    pub fn end_comment(&mut self) -> bool {
        self.invoke(|writer| writer.end_comment())
    }

    pub fn write_comment(&mut self, content: &str) -> bool {
        self.invoke(|writer| writer.write_comment(Some(content)))
    }

    pub fn start_cdata(&mut self) -> bool {
        self.invoke(|writer| writer.start_cdata())
    }

    pub fn end_cdata(&mut self) -> bool {
        self.invoke(|writer| writer.end_cdata())
    }

    pub fn write_cdata(&mut self, content: &str) -> bool {
        self.invoke(|writer| writer.write_cdata(Some(content)))
    }

    /// Starts a processing instruction. The target `xml` is reserved.
    pub fn start_pi(&mut self, target: &str) -> bool {
        self.invoke(|writer| writer.start_pi(target))
    }

    pub fn end_pi(&mut self) -> bool {
        self.invoke(|writer| writer.end_pi())
    }

    pub fn write_pi(&mut self, target: &str, content: &str) -> bool {
        self.invoke(|writer| writer.write_pi(target, Some(content)))
    }

    /// Starts a DOCTYPE. Only legal in the prolog.
    pub fn start_dtd(&mut self, name: &str, pubid: Option<&str>, sysid: Option<&str>) -> bool {
        self.invoke(|writer| writer.start_dtd(name, pubid, sysid))
    }

    pub fn end_dtd(&mut self) -> bool {
        self.invoke(|writer| writer.end_dtd())
    }

    pub fn write_dtd(
        &mut self,
        name: &str,
        pubid: Option<&str>,
        sysid: Option<&str>,
        subset: Option<&str>,
    ) -> bool {
        self.invoke(|writer| writer.write_dtd(name, pubid, sysid, subset))
    }

    pub fn start_dtd_element(&mut self, name: &str) -> bool {
        self.invoke(|writer| writer.start_dtd_element(name))
    }

    pub fn end_dtd_element(&mut self) -> bool {
        self.invoke(|writer| writer.end_dtd_element())
    }

    pub fn write_dtd_element(&mut self, name: &str, content: &str) -> bool {
        self.invoke(|writer| writer.write_dtd_element(name, content))
    }

    pub fn start_dtd_attlist(&mut self, name: &str) -> bool {
        self.invoke(|writer| writer.start_dtd_attlist(name))
    }

    pub fn end_dtd_attlist(&mut self) -> bool {
        self.invoke(|writer| writer.end_dtd_attlist())
    }

    pub fn write_dtd_attlist(&mut self, name: &str, content: &str) -> bool {
        self.invoke(|writer| writer.write_dtd_attlist(name, content))
    }

    /// Starts an entity declaration, a parameter entity if `pe` is `true`.
    pub fn start_dtd_entity(&mut self, name: &str, pe: bool) -> bool {
        self.invoke(|writer| writer.start_dtd_entity(pe, name))
    }

    pub fn end_dtd_entity(&mut self) -> bool {
        self.invoke(|writer| writer.end_dtd_entity())
    }

    pub fn write_dtd_entity(
        &mut self,
        name: &str,
        pubid: Option<&str>,
        sysid: Option<&str>,
        ndataid: Option<&str>,
        content: Option<&str>,
        pe: bool,
    ) -> bool {
        self.invoke(|writer| writer.write_dtd_entity(pe, name, pubid, sysid, ndataid, content))
    }

    pub fn write_dtd_internal_entity(&mut self, name: &str, content: &str, pe: bool) -> bool {
        self.invoke(|writer| writer.write_dtd_internal_entity(pe, name, content))
    }

    pub fn write_dtd_external_entity(
        &mut self,
        name: &str,
        pubid: Option<&str>,
        sysid: Option<&str>,
        ndataid: Option<&str>,
        pe: bool,
    ) -> bool {
        self.invoke(|writer| writer.write_dtd_external_entity(pe, name, pubid, sysid, ndataid))
    }

    pub fn write_dtd_external_entity_contents(
        &mut self,
        pubid: Option<&str>,
        sysid: Option<&str>,
        ndataid: Option<&str>,
    ) -> bool {
        self.invoke(|writer| writer.write_dtd_external_entity_contents(pubid, sysid, ndataid))
    }

    pub fn write_dtd_notation(
        &mut self,
        name: &str,
        pubid: Option<&str>,
        sysid: Option<&str>,
    ) -> bool {
        self.invoke(|writer| writer.write_dtd_notation(name, pubid, sysid))
    }
}

impl Drop for XmlWriter<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::XmlError, globals::set_structured_error};

    fn quiet() {
        fn ignore(_: &XmlError) {}
        set_structured_error(Some(ignore));
    }

    fn content(writer: &mut XmlWriter, empty: bool) -> String {
        match writer.flush(empty).unwrap() {
            Flushed::Content(content) => content,
            Flushed::Written(_) => panic!("a string writer returns its content"),
        }
    }

    #[test]
    fn test_flush_empties_buffer() {
        let mut writer = XmlWriter::string().unwrap();
        assert!(writer.start_element("a"));
        assert!(writer.end_element());
        assert_eq!(content(&mut writer, false), "<a/>");
        assert_eq!(content(&mut writer, true), "<a/>");
        assert_eq!(content(&mut writer, true), "");
    }

    #[test]
    fn test_result_keeps_buffer() {
        let mut writer = XmlWriter::string().unwrap();
        assert!(writer.write_element("a", Some("x")));
        let Some(WriterOutput::String(first)) = writer.result().unwrap() else {
            panic!("a string writer returns a string");
        };
        assert_eq!(first, "<a>x</a>");
        assert_eq!(
            writer.result().unwrap(),
            Some(WriterOutput::String(first))
        );
    }

    #[test]
    fn test_stream_output() {
        let mut out = vec![];
        {
            let mut writer = XmlWriter::io(&mut out);
            assert!(writer.start_document(StartDocumentOptions::default()));
            assert!(writer.write_element("a", None));
            assert!(writer.end_document());
            assert!(matches!(writer.flush(true), Ok(Flushed::Written(_))));
            assert_eq!(writer.result().unwrap(), None);
        }
        assert_eq!(out, b"<?xml version=\"1.0\"?>\n<a/>\n");
    }

    #[test]
    fn test_close_twice_and_write_after_close() {
        quiet();
        let mut out = vec![];
        {
            let mut writer = XmlWriter::io(&mut out);
            assert!(writer.start_element("a"));
            assert!(writer.close());
            assert!(!writer.close());
            assert!(!writer.end_element());
            assert!(!writer.write_string("late"));
            assert!(matches!(writer.flush(true), Err(XmlWriterError::Closed)));
            assert!(writer.strict().is_none());
        }
        assert_eq!(out, b"<a");
    }

    #[test]
    fn test_failed_operations_return_false() {
        quiet();
        let mut writer = XmlWriter::string().unwrap();
        assert!(!writer.end_element());
        assert!(!writer.set_quote_char('x'));
        assert!(!writer.set_quote_char('\u{3042}'));
        assert!(writer.set_quote_char('\''));
        assert!(!writer.start_pi("xml"));
        assert!(writer.start_element("a"));
        assert!(writer.write_string("text"));
        assert!(!writer.write_attribute("late", "v"));
        assert!(writer.end_element());
        assert_eq!(content(&mut writer, true), "<a>text</a>");
    }

    #[test]
    fn test_encoded_string_output() {
        let mut writer = XmlWriter::string().unwrap();
        assert!(writer.start_document(StartDocumentOptions {
            encoding: Some(XmlCharEncoding::ISO8859_1),
            standalone: Some(false),
        }));
        assert_eq!(writer.encoding(), Some("ISO-8859-1"));
        assert!(writer.write_element("p", Some("caf\u{e9}")));
        assert!(writer.end_document());
        assert_eq!(
            content(&mut writer, true),
            "<?xml version=\"1.0\" encoding=\"ISO-8859-1\" standalone=\"no\"?>\n<p>caf\u{e9}</p>\n"
        );
    }

    #[test]
    fn test_start_document_rejects_unnamed_encoding() {
        quiet();
        let mut writer = XmlWriter::string().unwrap();
        assert!(!writer.start_document(StartDocumentOptions {
            encoding: Some(XmlCharEncoding::None),
            standalone: None,
        }));
        assert!(writer.start_document(StartDocumentOptions::default()));
    }

    #[cfg(feature = "libxml_tree")]
    #[test]
    fn test_document_output() {
        use crate::tree::Node;

        let mut writer = XmlWriter::document().unwrap();
        assert!(writer.start_document(StartDocumentOptions {
            encoding: Some(XmlCharEncoding::ISO8859_1),
            standalone: Some(true),
        }));
        assert!(writer.start_element("root"));
        assert!(writer.write_attribute("id", "1"));
        assert!(writer.write_element("child", Some("caf\u{e9}")));
        assert!(writer.end_document());
        let Some(WriterOutput::Document(doc)) = writer.result().unwrap() else {
            panic!("a document writer returns a document");
        };
        assert_eq!(doc.encoding.as_deref(), Some("ISO-8859-1"));
        assert_eq!(doc.standalone, Some(true));
        let root = doc.root_element().unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.attribute("id"), Some("1"));
        assert_eq!(
            root.children,
            vec![Node::Element(crate::tree::Element {
                name: "child".to_owned(),
                namespace_uri: None,
                attributes: vec![],
                children: vec![Node::Text("caf\u{e9}".to_owned())],
            })]
        );
    }

    #[cfg(feature = "libxml_tree")]
    #[test]
    fn test_document_output_needs_closed_elements() {
        quiet();
        let mut writer = XmlWriter::document().unwrap();
        assert!(writer.start_element("a"));
        assert!(writer.start_element("b"));
        assert!(matches!(writer.result(), Err(XmlWriterError::State(_))));
        assert!(writer.end_element());
        assert!(matches!(writer.result(), Err(XmlWriterError::State(_))));
        assert!(writer.end_element());
        let Some(WriterOutput::Document(doc)) = writer.result().unwrap() else {
            panic!("a document writer returns a document");
        };
        assert_eq!(doc.root_element().unwrap().name, "a");
    }
}
