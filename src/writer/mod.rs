//! Provide methods and data structures for text writing APIs.
//!
//! This module is based on `libxml/xmlwriter.h`, `xmlwriter.c` and so on in `libxml2-v2.11.8`.
//! Please refer to original libxml2 documents also.
//!
//! The original API has functions that support the format, but not here.
//!
//! Although Rust has no variable-length arguments,
//! it is simpler and more natural to limit the API to writing a single string,
//! since it is easy to write the format to a single String using `format!`.

// Copyright of the original code is the following.
// --------
// Summary: text writing API for XML
// Description: text writing API for XML
//
// Copy: See Copyright for the status of this software.
//
// Author: Alfred Mickautsch <alfred@mickautsch.de>
// --------
// xmlwriter.c: XML text writer implementation
//
// For license and disclaimer see the license and disclaimer of libxml2.
//
// alfred@mickautsch.de

mod binary;
mod dtd;

use std::{borrow::Cow, cell::Cell, collections::VecDeque, io::Write, rc::Rc};

use crate::{
    encoding::find_encoding_handler,
    error::{__xml_raise_error, XmlErrorDomain, XmlErrorLevel, XmlParserErrors, XmlWriterError},
    io::{XmlOutputBuffer, xml_escape_attr, xml_escape_text},
};

/// The result type of every writer operation.
///
/// On success, the number of bytes accepted by the output buffer is returned.
pub type WriterResult = Result<usize, XmlWriterError>;

// Types are kept private
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XmlTextWriterState {
    XmlTextwriterName,
    XmlTextwriterAttribute,
    XmlTextwriterText,
    XmlTextwriterPI,
    XmlTextwriterPIText,
    XmlTextwriterCDATA,
    XmlTextwriterDTD,
    XmlTextwriterDTDText,
    XmlTextwriterDTDElem,
    XmlTextwriterDTDElemText,
    XmlTextwriterDTDAttl,
    XmlTextwriterDTDAttlText,
    XmlTextwriterDTDEnty, /* entity */
    XmlTextwriterDTDEntyText,
    XmlTextwriterDTDPEnt, /* parameter entity */
    XmlTextwriterComment,
}

struct XmlTextWriterStackEntry {
    name: Option<String>,
    state: Cell<XmlTextWriterState>,
}

impl XmlTextWriterStackEntry {
    fn new(name: Option<&str>, state: XmlTextWriterState) -> Rc<Self> {
        Rc::new(Self {
            name: name.map(|name| name.to_owned()),
            state: Cell::new(state),
        })
    }
}

struct XmlTextWriterNsStackEntry {
    prefix: String,
    uri: String,
    elem: Option<Rc<XmlTextWriterStackEntry>>,
}

/// Where the writer is in the document lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlDocumentState {
    /// Nothing has been written yet.
    NoDocument,
    /// Some content (possibly the XML declaration) has been written.
    InDocument,
    /// `end_document` has been called; no more content is accepted.
    Ended,
}

/// A forward-only XML writer.
///
/// Every `start_*` operation pushes one frame, and the matching `end_*` pops it.
/// Operations that are illegal in the current state fail with `XmlWriterError::State`
/// and leave the output untouched.
pub struct XmlTextWriter<'a> {
    // output buffer
    out: XmlOutputBuffer<'a>,
    // element name stack
    nodes: VecDeque<Rc<XmlTextWriterStackEntry>>,
    // name spaces stack
    nsstack: VecDeque<XmlTextWriterNsStackEntry>,
    document: XmlDocumentState,
    // enable indent
    indent: bool,
    // internal indent flag
    doindent: bool,
    // indent character
    ichar: Cow<'static, str>,
    // character used for quoting attribute values
    qchar: u8,
    // the declared output encoding
    encoding: Option<String>,
    standalone: Option<bool>,
    // convert the output into `encoding` or keep it in UTF-8
    transcode: bool,
}

impl<'a> XmlTextWriter<'a> {
    /// Create a new xmlNewTextWriter structure using an xmlOutputBufferPtr
    #[doc(alias = "xmlNewTextWriter")]
    pub fn new(out: XmlOutputBuffer<'a>) -> Self {
        Self {
            out,
            nodes: VecDeque::new(),
            nsstack: VecDeque::new(),
            document: XmlDocumentState::NoDocument,
            indent: false,
            doindent: false,
            ichar: Cow::Borrowed(" "),
            qchar: b'"',
            encoding: None,
            standalone: None,
            transcode: true,
        }
    }

    /// Create a new xmlNewTextWriter structure with `uri` as output
    #[doc(alias = "xmlNewTextWriterFilename")]
    pub fn from_filename(uri: &str) -> Result<Self, XmlWriterError> {
        let out = XmlOutputBuffer::from_uri(uri).inspect_err(|_| {
            xml_writer_err_msg(
                XmlParserErrors::XmlIOEIO,
                "XmlTextWriter::from_filename : cannot open uri\n",
            );
        })?;
        Ok(Self::new(out))
    }

    /// Create a new xmlNewTextWriter structure writing into `writer`.
    #[doc(alias = "xmlNewTextWriterMemory")]
    pub fn from_writer(writer: impl Write + 'a) -> Self {
        Self::new(XmlOutputBuffer::from_writer(writer))
    }

    /// Keep the output in UTF-8 even if `start_document` declares another encoding.
    ///
    /// Used when the output is parsed back into a tree rather than stored.
    pub(crate) fn disable_transcoding(&mut self) {
        self.transcode = false;
    }

    /// The encoding declared by `start_document`, if any.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// The standalone flag declared by `start_document`, if any.
    pub fn standalone(&self) -> Option<bool> {
        self.standalone
    }

    pub fn document_state(&self) -> XmlDocumentState {
        self.document
    }

    /// The number of open constructs.
    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    fn enter_document(&mut self, caller: &'static str) -> Result<(), XmlWriterError> {
        match self.document {
            XmlDocumentState::Ended => {
                xml_writer_err_msg(XmlParserErrors::XmlErrDocumentEnd, caller);
                Err(XmlWriterError::State(trim_msg(caller)))
            }
            _ => {
                self.document = XmlDocumentState::InDocument;
                Ok(())
            }
        }
    }

    /// Write state dependent strings.
    ///
    /// Returns the number of characters written.
    #[doc(alias = "xmlTextWriterHandleStateDependencies")]
    fn handle_state_dependencies(&mut self, p: &XmlTextWriterStackEntry) -> WriterResult {
        let mut sum = 0;
        match p.state.get() {
            XmlTextWriterState::XmlTextwriterName => {
                // Output namespace declarations
                sum += self.output_nsdecl()?;
                sum += self.out.write_str(">")?;
                p.state.set(XmlTextWriterState::XmlTextwriterText);
            }
            XmlTextWriterState::XmlTextwriterPI => {
                sum += self.out.write_str(" ")?;
                p.state.set(XmlTextWriterState::XmlTextwriterPIText);
            }
            XmlTextWriterState::XmlTextwriterDTD => {
                sum += self.out.write_str(" [")?;
                p.state.set(XmlTextWriterState::XmlTextwriterDTDText);
            }
            XmlTextWriterState::XmlTextwriterDTDElem => {
                sum += self.out.write_str(" ")?;
                p.state.set(XmlTextWriterState::XmlTextwriterDTDElemText);
            }
            XmlTextWriterState::XmlTextwriterDTDAttl => {
                sum += self.out.write_str(" ")?;
                p.state.set(XmlTextWriterState::XmlTextwriterDTDAttlText);
            }
            XmlTextWriterState::XmlTextwriterDTDEnty
            | XmlTextWriterState::XmlTextwriterDTDPEnt => {
                sum += self.out.write_str(" ")?;
                sum += self.write_quote()?;
                p.state.set(XmlTextWriterState::XmlTextwriterDTDEntyText);
            }
            _ => {}
        }

        Ok(sum)
    }

    /// Close the start tag of the element `lk`, ending a pending attribute first.
    fn close_start_tag(&mut self, lk: &XmlTextWriterStackEntry, newline: bool) -> WriterResult {
        let mut sum = 0;
        if lk.state.get() == XmlTextWriterState::XmlTextwriterAttribute {
            sum += self.end_attribute()?;
        }
        // Output namespace declarations
        sum += self.output_nsdecl()?;
        sum += self.out.write_str(">")?;
        if newline && self.indent {
            sum += self.out.write_str("\n")?;
        }
        lk.state.set(XmlTextWriterState::XmlTextwriterText);
        Ok(sum)
    }

    fn write_quote(&mut self) -> WriterResult {
        let quote = if self.qchar == b'\'' { "'" } else { "\"" };
        Ok(self.out.write_str(quote)?)
    }

    fn write_quoted(&mut self, value: &str) -> WriterResult {
        let mut sum = self.write_quote()?;
        sum += self.out.write_str(value)?;
        sum += self.write_quote()?;
        Ok(sum)
    }

    /// Set indentation output.
    #[doc(alias = "xmlTextWriterSetIndent")]
    pub fn set_indent(&mut self, indent: bool) {
        self.indent = indent;
        self.doindent = true;
    }

    /// Set string indentation.
    #[doc(alias = "xmlTextWriterSetIndentString")]
    pub fn set_indent_string(&mut self, indent: &str) {
        self.ichar = Cow::Owned(indent.to_owned());
    }

    /// Set the character used for quoting attributes.
    ///
    /// Only `'` and `"` are accepted.
    #[doc(alias = "xmlTextWriterSetQuoteChar")]
    pub fn set_quote_char(&mut self, quotechar: u8) -> Result<(), XmlWriterError> {
        if quotechar != b'\'' && quotechar != b'"' {
            return Err(XmlWriterError::InvalidArgument(
                format!("'{}' cannot quote attribute values", quotechar.escape_ascii()).into(),
            ));
        }
        self.qchar = quotechar;
        Ok(())
    }

    /// Flush the output buffer.
    ///
    /// Returns the bytes handed to the underlying sink.
    #[doc(alias = "xmlTextWriterFlush")]
    pub fn flush(&mut self) -> WriterResult {
        Ok(self.out.flush()?)
    }

    /// Write a raw xml text.
    ///
    /// No escaping is done.
    #[doc(alias = "xmlTextWriterWriteRawLen")]
    #[doc(alias = "xmlTextWriterWriteRaw")]
    pub fn write_raw(&mut self, content: &str) -> WriterResult {
        self.enter_document("XmlTextWriter::write_raw : the document is already ended\n")?;
        let mut sum = 0;
        if let Some(lk) = self.nodes.front().cloned() {
            sum += self.handle_state_dependencies(&lk)?;
        }

        if self.indent {
            self.doindent = false;
        }

        sum += self.out.write_str(content)?;
        Ok(sum)
    }

    /// Write an xml text.
    ///
    /// Reserved characters are escaped according to the current construct:
    /// text escaping in element content, attribute escaping in attribute values,
    /// and nothing elsewhere.
    #[doc(alias = "xmlTextWriterWriteString")]
    pub fn write_string(&mut self, content: &str) -> WriterResult {
        let Some(lk) = self.nodes.front().cloned() else {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::write_string : no construct is open!\n",
            ));
        };
        match lk.state.get() {
            XmlTextWriterState::XmlTextwriterName | XmlTextWriterState::XmlTextwriterText => {
                let mut buf = String::with_capacity(content.len());
                xml_escape_text(content, &mut buf);
                self.write_raw(&buf)
            }
            XmlTextWriterState::XmlTextwriterAttribute => {
                let mut buf = String::with_capacity(content.len());
                xml_escape_attr(content, self.qchar, &mut buf);
                Ok(self.out.write_str(&buf)?)
            }
            // The replacement text is delimited by the quote character.
            XmlTextWriterState::XmlTextwriterDTDEnty
            | XmlTextWriterState::XmlTextwriterDTDPEnt
            | XmlTextWriterState::XmlTextwriterDTDEntyText => {
                let (quote, charref) = if self.qchar == b'\'' {
                    ('\'', "&#39;")
                } else {
                    ('"', "&#34;")
                };
                self.write_raw(&content.replace(quote, charref))
            }
            _ => self.write_raw(content),
        }
    }

    /// Write indent string.
    ///
    /// Returns the number of strings written.
    #[doc(alias = "xmlTextWriterWriteIndent")]
    fn write_indent(&mut self) -> WriterResult {
        let lksize = self.nodes.len();
        if lksize < 1 {
            return Err(XmlWriterError::State("nothing to indent".into()));
        }
        let mut sum = 0;
        for _ in 0..lksize - 1 {
            sum += self.out.write_str(&self.ichar)?;
        }
        Ok(sum)
    }

    /// Start a new xml document
    ///
    /// `version` defaults to "1.0". If `encoding` is given, the following output is
    /// converted into it (an unknown encoding is an error).
    #[doc(alias = "xmlTextWriterStartDocument")]
    pub fn start_document(
        &mut self,
        version: Option<&str>,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> WriterResult {
        if !self.nodes.is_empty() || self.document != XmlDocumentState::NoDocument {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::start_document : not allowed in this context!\n",
            ));
        }

        if let Some(encoding) = encoding {
            let Some(encoder) = find_encoding_handler(encoding) else {
                xml_writer_err_msg(
                    XmlParserErrors::XmlErrUnsupportedEncoding,
                    "XmlTextWriter::start_document : unsupported encoding\n",
                );
                return Err(XmlWriterError::InvalidArgument(
                    format!("unsupported encoding '{encoding}'").into(),
                ));
            };
            self.encoding = Some(encoder.name().to_owned());
            if self.transcode {
                self.out.set_encoder(encoder)?;
            }
        }
        self.standalone = standalone;
        self.document = XmlDocumentState::InDocument;

        let mut sum = self.out.write_str("<?xml version=")?;
        sum += self.write_quoted(version.unwrap_or("1.0"))?;
        if let Some(name) = self.encoding.clone() {
            sum += self.out.write_str(" encoding=")?;
            sum += self.write_quoted(&name)?;
        }

        if let Some(standalone) = standalone {
            sum += self.out.write_str(" standalone=")?;
            sum += self.write_quoted(if standalone { "yes" } else { "no" })?;
        }

        sum += self.out.write_str("?>\n")?;
        Ok(sum)
    }

    /// End an xml document. All open elements are closed, and
    /// the content is flushed to the output.
    #[doc(alias = "xmlTextWriterEndDocument")]
    pub fn end_document(&mut self) -> WriterResult {
        if self.document == XmlDocumentState::Ended {
            return Err(state_error(
                XmlParserErrors::XmlErrDocumentEnd,
                "XmlTextWriter::end_document : the document is already ended!\n",
            ));
        }

        let mut sum = 0;
        while let Some(lk) = self.nodes.front() {
            sum += match lk.state.get() {
                XmlTextWriterState::XmlTextwriterName
                | XmlTextWriterState::XmlTextwriterAttribute
                | XmlTextWriterState::XmlTextwriterText => self.end_element()?,
                XmlTextWriterState::XmlTextwriterPI | XmlTextWriterState::XmlTextwriterPIText => {
                    self.end_pi()?
                }
                XmlTextWriterState::XmlTextwriterCDATA => self.end_cdata()?,
                XmlTextWriterState::XmlTextwriterDTD
                | XmlTextWriterState::XmlTextwriterDTDText
                | XmlTextWriterState::XmlTextwriterDTDElem
                | XmlTextWriterState::XmlTextwriterDTDElemText
                | XmlTextWriterState::XmlTextwriterDTDAttl
                | XmlTextWriterState::XmlTextwriterDTDAttlText
                | XmlTextWriterState::XmlTextwriterDTDEnty
                | XmlTextWriterState::XmlTextwriterDTDEntyText
                | XmlTextWriterState::XmlTextwriterDTDPEnt => self.end_dtd()?,
                XmlTextWriterState::XmlTextwriterComment => self.end_comment()?,
            };
        }

        if !self.indent {
            sum += self.out.write_str("\n")?;
        }

        self.document = XmlDocumentState::Ended;
        self.out.flush()?;
        Ok(sum)
    }

    /// Start an xml element.
    #[doc(alias = "xmlTextWriterStartElement")]
    pub fn start_element(&mut self, name: &str) -> WriterResult {
        if name.is_empty() {
            return Err(argument_error(
                XmlParserErrors::XmlErrNameRequired,
                "XmlTextWriter::start_element : empty element name!\n",
            ));
        }

        let mut sum = 0;
        if let Some(lk) = self.nodes.front().cloned() {
            match lk.state.get() {
                XmlTextWriterState::XmlTextwriterPI | XmlTextWriterState::XmlTextwriterPIText => {
                    return Err(state_error(
                        XmlParserErrors::XmlErrInternalError,
                        "XmlTextWriter::start_element : not allowed in a PI!\n",
                    ));
                }
                XmlTextWriterState::XmlTextwriterAttribute
                | XmlTextWriterState::XmlTextwriterName => {
                    sum += self.close_start_tag(&lk, true)?;
                }
                XmlTextWriterState::XmlTextwriterText => {}
                _ => {
                    return Err(state_error(
                        XmlParserErrors::XmlErrInternalError,
                        "XmlTextWriter::start_element : not allowed in this context!\n",
                    ));
                }
            }
        } else {
            self.enter_document(
                "XmlTextWriter::start_element : the document is already ended!\n",
            )?;
        }

        self.nodes.push_front(XmlTextWriterStackEntry::new(
            Some(name),
            XmlTextWriterState::XmlTextwriterName,
        ));

        if self.indent {
            sum += self.write_indent()?;
        }

        sum += self.out.write_str("<")?;
        sum += self.out.write_str(name)?;
        Ok(sum)
    }

    /// Write an xml element.
    ///
    /// If `content` is `None`, an empty element is written.
    #[doc(alias = "xmlTextWriterWriteElement")]
    pub fn write_element(&mut self, name: &str, content: Option<&str>) -> WriterResult {
        let mut sum = self.start_element(name)?;
        if let Some(content) = content {
            sum += self.write_string(content)?;
        }
        sum += self.end_element()?;
        Ok(sum)
    }

    /// End the current xml element.
    ///
    /// An element without content is closed with the empty-element tag `<x/>`.
    #[doc(alias = "xmlTextWriterEndElement")]
    pub fn end_element(&mut self) -> WriterResult {
        let Some(lk) = self.nodes.front().cloned() else {
            self.nsstack.clear();
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::end_element : no element is open!\n",
            ));
        };

        let mut sum = 0;
        match lk.state.get() {
            ty @ XmlTextWriterState::XmlTextwriterAttribute
            | ty @ XmlTextWriterState::XmlTextwriterName => {
                if matches!(ty, XmlTextWriterState::XmlTextwriterAttribute) {
                    sum += self.end_attribute().inspect_err(|_| self.nsstack.clear())?;
                }

                // Output namespace declarations
                sum += self.output_nsdecl()?;

                // next element needs indent
                if self.indent {
                    self.doindent = true;
                }
                sum += self.out.write_str("/>")?;
            }
            XmlTextWriterState::XmlTextwriterText => {
                if self.indent && self.doindent {
                    sum += self.write_indent()?;
                }
                self.doindent = true;
                sum += self.write_end_tag(&lk)?;
            }
            _ => {
                return Err(state_error(
                    XmlParserErrors::XmlErrInternalError,
                    "XmlTextWriter::end_element : the current construct is not an element!\n",
                ));
            }
        }

        if self.indent {
            sum += self.out.write_str("\n")?;
        }

        self.nodes.pop_front();
        Ok(sum)
    }

    fn write_end_tag(&mut self, lk: &XmlTextWriterStackEntry) -> WriterResult {
        let mut sum = self.out.write_str("</")?;
        sum += self.out.write_str(lk.name.as_deref().unwrap_or_default())?;
        sum += self.out.write_str(">")?;
        Ok(sum)
    }

    /// End the current xml element. Writes an end tag even if the element is empty
    #[doc(alias = "xmlTextWriterFullEndElement")]
    pub fn full_end_element(&mut self) -> WriterResult {
        let Some(lk) = self.nodes.front().cloned() else {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::full_end_element : no element is open!\n",
            ));
        };

        let mut sum = 0;
        match lk.state.get() {
            ty @ XmlTextWriterState::XmlTextwriterAttribute
            | ty @ XmlTextWriterState::XmlTextwriterName
            | ty @ XmlTextWriterState::XmlTextwriterText => {
                if !matches!(ty, XmlTextWriterState::XmlTextwriterText) {
                    sum += self.close_start_tag(&lk, false)?;
                    if self.indent {
                        self.doindent = false;
                    }
                }

                if self.indent && self.doindent {
                    sum += self.write_indent()?;
                }
                self.doindent = true;
                sum += self.write_end_tag(&lk)?;
            }
            _ => {
                return Err(state_error(
                    XmlParserErrors::XmlErrInternalError,
                    "XmlTextWriter::full_end_element : the current construct is not an element!\n",
                ));
            }
        }

        if self.indent {
            sum += self.out.write_str("\n")?;
        }

        self.nodes.pop_front();
        Ok(sum)
    }

    /// Start an xml element with namespace support.
    ///
    /// If `namespace_uri` is given, a namespace declaration for `prefix` is written
    /// into the start tag.
    #[doc(alias = "xmlTextWriterStartElementNS")]
    pub fn start_element_ns(
        &mut self,
        prefix: Option<&str>,
        name: &str,
        namespace_uri: Option<&str>,
    ) -> WriterResult {
        if name.is_empty() {
            return Err(argument_error(
                XmlParserErrors::XmlErrNameRequired,
                "XmlTextWriter::start_element_ns : empty element name!\n",
            ));
        }

        let sum = self.start_element(&qualified_name(prefix, name))?;

        if let Some(namespace_uri) = namespace_uri {
            self.nsstack.push_front(XmlTextWriterNsStackEntry {
                prefix: xmlns_attribute_name(prefix),
                uri: namespace_uri.to_owned(),
                elem: self.nodes.front().cloned(),
            });
        }

        Ok(sum)
    }

    /// Write an xml element with namespace support.
    #[doc(alias = "xmlTextWriterWriteElementNS")]
    pub fn write_element_ns(
        &mut self,
        prefix: Option<&str>,
        name: &str,
        namespace_uri: Option<&str>,
        content: Option<&str>,
    ) -> WriterResult {
        let mut sum = self.start_element_ns(prefix, name, namespace_uri)?;
        if let Some(content) = content {
            sum += self.write_string(content)?;
        }
        sum += self.end_element()?;
        Ok(sum)
    }

    /// Start an xml attribute.
    ///
    /// Only legal in a start tag, before any content of the element has been written.
    #[doc(alias = "xmlTextWriterStartAttribute")]
    pub fn start_attribute(&mut self, name: &str) -> WriterResult {
        if name.is_empty() {
            return Err(argument_error(
                XmlParserErrors::XmlErrNameRequired,
                "XmlTextWriter::start_attribute : empty attribute name!\n",
            ));
        }

        let Some(lk) = self.nodes.front().cloned() else {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::start_attribute : no element is open!\n",
            ));
        };

        let mut sum = 0;
        match lk.state.get() {
            ty @ XmlTextWriterState::XmlTextwriterAttribute
            | ty @ XmlTextWriterState::XmlTextwriterName => {
                if matches!(ty, XmlTextWriterState::XmlTextwriterAttribute) {
                    sum += self.end_attribute()?;
                }

                sum += self.out.write_str(" ")?;
                sum += self.out.write_str(name)?;
                sum += self.out.write_str("=")?;
                sum += self.write_quote()?;
                lk.state.set(XmlTextWriterState::XmlTextwriterAttribute);
            }
            _ => {
                return Err(state_error(
                    XmlParserErrors::XmlErrInternalError,
                    "XmlTextWriter::start_attribute : attributes are only allowed in a start tag!\n",
                ));
            }
        }

        Ok(sum)
    }

    /// Write an xml attribute.
    ///
    /// If `content` is `None`, an attribute with an empty value is written.
    #[doc(alias = "xmlTextWriterWriteAttribute")]
    pub fn write_attribute(&mut self, name: &str, content: Option<&str>) -> WriterResult {
        let mut sum = self.start_attribute(name)?;
        if let Some(content) = content {
            sum += self.write_string(content)?;
        }
        sum += self.end_attribute()?;
        Ok(sum)
    }

    /// End the current xml attribute.
    #[doc(alias = "xmlTextWriterEndAttribute")]
    pub fn end_attribute(&mut self) -> WriterResult {
        let Some(lk) = self.nodes.front().cloned() else {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::end_attribute : no attribute is open!\n",
            ));
        };

        match lk.state.get() {
            XmlTextWriterState::XmlTextwriterAttribute => {
                lk.state.set(XmlTextWriterState::XmlTextwriterName);
                self.write_quote()
            }
            _ => Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::end_attribute : no attribute is open!\n",
            )),
        }
    }

    /// Start an xml attribute with namespace support.
    ///
    /// Declaring a prefix already declared on the same element is skipped if the URI matches,
    /// and rejected otherwise.
    #[doc(alias = "xmlTextWriterStartAttributeNS")]
    pub fn start_attribute_ns(
        &mut self,
        prefix: Option<&str>,
        name: &str,
        namespace_uri: Option<&str>,
    ) -> WriterResult {
        if name.is_empty() {
            return Err(argument_error(
                XmlParserErrors::XmlErrNameRequired,
                "XmlTextWriter::start_attribute_ns : empty attribute name!\n",
            ));
        }

        // Nothing may reach the namespace stack unless an attribute can be opened here.
        if !self.nodes.front().is_some_and(|lk| {
            matches!(
                lk.state.get(),
                XmlTextWriterState::XmlTextwriterName | XmlTextWriterState::XmlTextwriterAttribute
            )
        }) {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::start_attribute_ns : attributes are only allowed in a start tag!\n",
            ));
        }

        // Handle namespace first in case of error
        if let Some(namespace_uri) = namespace_uri {
            let decl = xmlns_attribute_name(prefix);
            let elem = self.nodes.front().cloned();
            let current = self.nsstack.iter().find(|ns| {
                ns.prefix == decl
                    && match (ns.elem.as_ref(), elem.as_ref()) {
                        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                        (None, None) => true,
                        _ => false,
                    }
            });

            match current {
                // Namespace already defined on element skip
                Some(ns) if ns.uri == namespace_uri => {}
                Some(_) => {
                    return Err(argument_error(
                        XmlParserErrors::XmlNsErrUndefinedNamespace,
                        "XmlTextWriter::start_attribute_ns : prefix mismatch!\n",
                    ));
                }
                None => {
                    self.nsstack.push_front(XmlTextWriterNsStackEntry {
                        prefix: decl,
                        uri: namespace_uri.to_owned(),
                        elem,
                    });
                }
            }
        }

        self.start_attribute(&qualified_name(prefix, name))
    }

    /// Write an xml attribute with namespace support.
    #[doc(alias = "xmlTextWriterWriteAttributeNS")]
    pub fn write_attribute_ns(
        &mut self,
        prefix: Option<&str>,
        name: &str,
        namespace_uri: Option<&str>,
        content: Option<&str>,
    ) -> WriterResult {
        let mut sum = self.start_attribute_ns(prefix, name, namespace_uri)?;
        if let Some(content) = content {
            sum += self.write_string(content)?;
        }
        sum += self.end_attribute()?;
        Ok(sum)
    }

    /// Output the current namespace declarations.
    #[doc(alias = "xmlTextWriterOutputNSDecl")]
    fn output_nsdecl(&mut self) -> WriterResult {
        let mut sum = 0;
        while let Some(lk) = self.nsstack.pop_front() {
            match self.write_attribute(&lk.prefix, Some(&lk.uri)) {
                Ok(count) => sum += count,
                Err(e) => {
                    self.nsstack.clear();
                    return Err(e);
                }
            }
        }
        Ok(sum)
    }

    /// Start an xml PI.
    ///
    /// The target `xml` (in any case) is reserved and rejected.
    #[doc(alias = "xmlTextWriterStartPI")]
    pub fn start_pi(&mut self, target: &str) -> WriterResult {
        if target.is_empty() {
            return Err(argument_error(
                XmlParserErrors::XmlErrNameRequired,
                "XmlTextWriter::start_pi : empty PI target!\n",
            ));
        }

        if target.eq_ignore_ascii_case("xml") {
            return Err(argument_error(
                XmlParserErrors::XmlErrReservedXmlName,
                "XmlTextWriter::start_pi : target name [Xx][Mm][Ll] is reserved for xml standardization!\n",
            ));
        }

        let mut sum = 0;
        if let Some(lk) = self.nodes.front().cloned() {
            match lk.state.get() {
                XmlTextWriterState::XmlTextwriterAttribute
                | XmlTextWriterState::XmlTextwriterName => {
                    sum += self.close_start_tag(&lk, false)?;
                }
                XmlTextWriterState::XmlTextwriterText | XmlTextWriterState::XmlTextwriterDTD => {}
                XmlTextWriterState::XmlTextwriterPI | XmlTextWriterState::XmlTextwriterPIText => {
                    return Err(state_error(
                        XmlParserErrors::XmlErrInternalError,
                        "XmlTextWriter::start_pi : nested PI!\n",
                    ));
                }
                _ => {
                    return Err(state_error(
                        XmlParserErrors::XmlErrInternalError,
                        "XmlTextWriter::start_pi : not allowed in this context!\n",
                    ));
                }
            }
        } else {
            self.enter_document("XmlTextWriter::start_pi : the document is already ended!\n")?;
        }

        self.nodes.push_front(XmlTextWriterStackEntry::new(
            Some(target),
            XmlTextWriterState::XmlTextwriterPI,
        ));

        sum += self.out.write_str("<?")?;
        sum += self.out.write_str(target)?;
        Ok(sum)
    }

    /// Write an xml PI.
    #[doc(alias = "xmlTextWriterWritePI")]
    pub fn write_pi(&mut self, target: &str, content: Option<&str>) -> WriterResult {
        let mut sum = self.start_pi(target)?;
        if let Some(content) = content {
            sum += self.write_string(content)?;
        }
        sum += self.end_pi()?;
        Ok(sum)
    }

    /// End the current xml PI.
    #[doc(alias = "xmlTextWriterEndPI")]
    pub fn end_pi(&mut self) -> WriterResult {
        let Some(lk) = self.nodes.front().cloned() else {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::end_pi : no PI is open!\n",
            ));
        };

        let mut sum = 0;
        match lk.state.get() {
            XmlTextWriterState::XmlTextwriterPI | XmlTextWriterState::XmlTextwriterPIText => {
                sum += self.out.write_str("?>")?;
            }
            _ => {
                return Err(state_error(
                    XmlParserErrors::XmlErrInternalError,
                    "XmlTextWriter::end_pi : the current construct is not a PI!\n",
                ));
            }
        }

        if self.indent {
            sum += self.out.write_str("\n")?;
        }

        self.nodes.pop_front();
        Ok(sum)
    }

    /// Start an xml CDATA section.
    #[doc(alias = "xmlTextWriterStartCDATA")]
    pub fn start_cdata(&mut self) -> WriterResult {
        let mut sum = 0;
        if let Some(lk) = self.nodes.front().cloned() {
            match lk.state.get() {
                XmlTextWriterState::XmlTextwriterText
                | XmlTextWriterState::XmlTextwriterPI
                | XmlTextWriterState::XmlTextwriterPIText => {}
                XmlTextWriterState::XmlTextwriterAttribute
                | XmlTextWriterState::XmlTextwriterName => {
                    sum += self.close_start_tag(&lk, false)?;
                }
                XmlTextWriterState::XmlTextwriterCDATA => {
                    return Err(state_error(
                        XmlParserErrors::XmlErrInternalError,
                        "XmlTextWriter::start_cdata : CDATA not allowed in this context!\n",
                    ));
                }
                _ => {
                    return Err(state_error(
                        XmlParserErrors::XmlErrInternalError,
                        "XmlTextWriter::start_cdata : not allowed in this context!\n",
                    ));
                }
            }
        } else {
            self.enter_document("XmlTextWriter::start_cdata : the document is already ended!\n")?;
        }

        self.nodes.push_front(XmlTextWriterStackEntry::new(
            None,
            XmlTextWriterState::XmlTextwriterCDATA,
        ));

        sum += self.out.write_str("<![CDATA[")?;
        Ok(sum)
    }

    /// Write an xml CDATA section.
    #[doc(alias = "xmlTextWriterWriteCDATA")]
    pub fn write_cdata(&mut self, content: Option<&str>) -> WriterResult {
        let mut sum = self.start_cdata()?;
        if let Some(content) = content {
            sum += self.write_string(content)?;
        }
        sum += self.end_cdata()?;
        Ok(sum)
    }

    /// End an xml CDATA section.
    #[doc(alias = "xmlTextWriterEndCDATA")]
    pub fn end_cdata(&mut self) -> WriterResult {
        let Some(lk) = self.nodes.front().cloned() else {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::end_cdata : no CDATA section is open!\n",
            ));
        };

        if lk.state.get() != XmlTextWriterState::XmlTextwriterCDATA {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::end_cdata : the current construct is not a CDATA section!\n",
            ));
        }
        let sum = self.out.write_str("]]>")?;

        self.nodes.pop_front();
        Ok(sum)
    }

    /// Start an xml comment.
    #[doc(alias = "xmlTextWriterStartComment")]
    pub fn start_comment(&mut self) -> WriterResult {
        let mut sum = 0;
        if let Some(lk) = self.nodes.front().cloned() {
            match lk.state.get() {
                XmlTextWriterState::XmlTextwriterText | XmlTextWriterState::XmlTextwriterDTDText => {}
                XmlTextWriterState::XmlTextwriterAttribute
                | XmlTextWriterState::XmlTextwriterName => {
                    sum += self.close_start_tag(&lk, true)?;
                }
                XmlTextWriterState::XmlTextwriterDTD => {
                    sum += self.out.write_str(" [")?;
                    if self.indent {
                        sum += self.out.write_str("\n")?;
                    }
                    lk.state.set(XmlTextWriterState::XmlTextwriterDTDText);
                }
                _ => {
                    return Err(state_error(
                        XmlParserErrors::XmlErrInternalError,
                        "XmlTextWriter::start_comment : not allowed in this context!\n",
                    ));
                }
            }
        } else {
            self.enter_document(
                "XmlTextWriter::start_comment : the document is already ended!\n",
            )?;
        }

        self.nodes.push_front(XmlTextWriterStackEntry::new(
            None,
            XmlTextWriterState::XmlTextwriterComment,
        ));

        if self.indent {
            sum += self.write_indent()?;
        }

        sum += self.out.write_str("<!--")?;
        Ok(sum)
    }

    /// Write an xml comment.
    #[doc(alias = "xmlTextWriterWriteComment")]
    pub fn write_comment(&mut self, content: Option<&str>) -> WriterResult {
        let mut sum = self.start_comment()?;
        if let Some(content) = content {
            sum += self.write_string(content)?;
        }
        sum += self.end_comment()?;
        Ok(sum)
    }

    /// End the current xml comment.
    #[doc(alias = "xmlTextWriterEndComment")]
    pub fn end_comment(&mut self) -> WriterResult {
        let Some(lk) = self.nodes.front().cloned() else {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::end_comment : not allowed in this context!\n",
            ));
        };

        if lk.state.get() != XmlTextWriterState::XmlTextwriterComment {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::end_comment : the current construct is not a comment!\n",
            ));
        }

        let mut sum = self.out.write_str("-->")?;
        if self.indent {
            sum += self.out.write_str("\n")?;
        }

        self.nodes.pop_front();
        Ok(sum)
    }
}

fn qualified_name(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{name}"),
        None => name.to_owned(),
    }
}

fn xmlns_attribute_name(prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("xmlns:{prefix}"),
        None => "xmlns".to_owned(),
    }
}

fn trim_msg(msg: &'static str) -> Cow<'static, str> {
    Cow::Borrowed(msg.trim_end())
}

/// Handle a writer error
#[doc(alias = "xmlWriterErrMsg")]
fn xml_writer_err_msg(error: XmlParserErrors, msg: &str) {
    __xml_raise_error(
        XmlErrorDomain::XmlFromWriter,
        error,
        XmlErrorLevel::XmlErrFatal,
        None,
        msg,
    );
}

/// Report `msg` and build the matching state error.
pub(crate) fn state_error(error: XmlParserErrors, msg: &'static str) -> XmlWriterError {
    xml_writer_err_msg(error, msg);
    XmlWriterError::State(trim_msg(msg))
}

/// Report `msg` and build the matching argument error.
fn argument_error(error: XmlParserErrors, msg: &'static str) -> XmlWriterError {
    xml_writer_err_msg(error, msg);
    XmlWriterError::InvalidArgument(trim_msg(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::XmlError, globals::set_structured_error, io::MemorySink};

    fn quiet() {
        fn ignore(_: &XmlError) {}
        set_structured_error(Some(ignore));
    }

    fn with_writer(f: impl FnOnce(&mut XmlTextWriter)) -> String {
        quiet();
        let sink = MemorySink::new();
        {
            let mut writer = XmlTextWriter::from_writer(sink.clone());
            f(&mut writer);
            writer.flush().unwrap();
        }
        String::from_utf8(sink.content()).unwrap()
    }

    #[test]
    fn test_empty_and_full_end() {
        let out = with_writer(|w| {
            w.start_element("a").unwrap();
            w.end_element().unwrap();
            w.start_element("b").unwrap();
            w.full_end_element().unwrap();
        });
        assert_eq!(out, "<a/><b></b>");
    }

    #[test]
    fn test_escaping() {
        let out = with_writer(|w| {
            w.start_element("a").unwrap();
            w.write_attribute("x", Some("1 < 2 & \"q\"\n")).unwrap();
            w.write_string("a & b").unwrap();
            w.write_raw(" <raw/> & ").unwrap();
            w.end_element().unwrap();
        });
        assert_eq!(
            out,
            "<a x=\"1 &lt; 2 &amp; &quot;q&quot;&#10;\">a &amp; b <raw/> & </a>"
        );
    }

    #[test]
    fn test_attribute_after_content_is_rejected() {
        let out = with_writer(|w| {
            w.start_element("a").unwrap();
            w.write_string("text").unwrap();
            assert!(matches!(
                w.start_attribute("late"),
                Err(XmlWriterError::State(_))
            ));
            w.end_element().unwrap();
        });
        assert_eq!(out, "<a>text</a>");
    }

    #[test]
    fn test_namespaced_attribute_after_content_is_rejected() {
        let out = with_writer(|w| {
            assert!(matches!(
                w.start_attribute_ns(Some("p"), "x", Some("urn:p")),
                Err(XmlWriterError::State(_))
            ));
            w.start_element("a").unwrap();
            w.write_string("text").unwrap();
            assert!(matches!(
                w.start_attribute_ns(Some("p"), "x", Some("urn:p")),
                Err(XmlWriterError::State(_))
            ));
            w.write_element("b", Some("c")).unwrap();
            w.end_element().unwrap();
        });
        assert_eq!(out, "<a>text<b>c</b></a>");
    }

    #[test]
    fn test_end_mismatch() {
        with_writer(|w| {
            assert!(w.end_element().is_err());
            assert!(w.end_attribute().is_err());
            w.start_element("a").unwrap();
            w.start_comment().unwrap();
            assert!(matches!(w.end_element(), Err(XmlWriterError::State(_))));
            assert!(matches!(w.end_pi(), Err(XmlWriterError::State(_))));
            assert!(matches!(w.end_cdata(), Err(XmlWriterError::State(_))));
            w.end_comment().unwrap();
            w.end_element().unwrap();
        });
    }

    #[test]
    fn test_namespaces() {
        let out = with_writer(|w| {
            w.start_element_ns(Some("x"), "root", Some("urn:x")).unwrap();
            w.write_attribute_ns(Some("y"), "attr", Some("urn:y"), Some("v"))
                .unwrap();
            // Same prefix and URI on the same element is not redeclared.
            w.write_attribute_ns(Some("y"), "other", Some("urn:y"), None)
                .unwrap();
            assert!(
                w.start_attribute_ns(Some("y"), "bad", Some("urn:z"))
                    .is_err()
            );
            w.write_element_ns(Some("x"), "child", None, Some("c"))
                .unwrap();
            w.end_element().unwrap();
        });
        assert_eq!(
            out,
            "<x:root y:attr=\"v\" y:other=\"\" xmlns:y=\"urn:y\" xmlns:x=\"urn:x\"><x:child>c</x:child></x:root>"
        );
    }

    #[test]
    fn test_pi_cdata_comment() {
        let out = with_writer(|w| {
            assert!(w.start_pi("XmL").is_err());
            w.write_pi("php", Some("echo 1;")).unwrap();
            w.start_element("a").unwrap();
            w.write_cdata(Some("<&>")).unwrap();
            w.write_comment(Some(" note ")).unwrap();
            w.start_pi("target").unwrap();
            assert!(w.start_pi("nested").is_err());
            w.end_pi().unwrap();
            w.end_element().unwrap();
        });
        assert_eq!(
            out,
            "<?php echo 1;?><a><![CDATA[<&>]]><!-- note --><?target?></a>"
        );
    }

    #[test]
    fn test_start_document() {
        let out = with_writer(|w| {
            w.start_document(None, Some("utf-8"), Some(true)).unwrap();
            assert!(w.start_document(None, None, None).is_err());
            w.write_element("a", None).unwrap();
            w.end_document().unwrap();
            assert!(w.start_element("b").is_err());
            assert!(w.end_document().is_err());
        });
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<a/>\n"
        );
    }

    #[test]
    fn test_start_document_unknown_encoding() {
        with_writer(|w| {
            assert!(matches!(
                w.start_document(None, Some("no-such-encoding"), None),
                Err(XmlWriterError::InvalidArgument(_))
            ));
            // The failed call did not start the document.
            w.start_document(None, None, Some(false)).unwrap();
        });
    }

    #[test]
    fn test_start_document_after_content() {
        with_writer(|w| {
            w.write_comment(Some("x")).unwrap();
            assert!(w.start_document(None, None, None).is_err());
        });
    }

    #[test]
    fn test_transcoding() {
        quiet();
        let sink = MemorySink::new();
        {
            let mut w = XmlTextWriter::from_writer(sink.clone());
            w.start_document(None, Some("ISO-8859-1"), None).unwrap();
            w.write_element("p", Some("caf\u{e9} \u{3042}")).unwrap();
            w.end_document().unwrap();
        }
        assert_eq!(
            sink.content(),
            b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<p>caf\xE9 &#12354;</p>\n"
        );
    }

    #[test]
    fn test_indent() {
        let out = with_writer(|w| {
            w.set_indent(true);
            w.set_indent_string("  ");
            w.start_element("a").unwrap();
            w.start_element("b").unwrap();
            w.start_element("c").unwrap();
            w.end_element().unwrap();
            w.end_element().unwrap();
            w.write_element("d", Some("x")).unwrap();
            w.end_element().unwrap();
        });
        assert_eq!(out, "<a>\n  <b>\n    <c/>\n  </b>\n  <d>x</d>\n</a>\n");
    }

    #[test]
    fn test_quote_char() {
        let out = with_writer(|w| {
            assert!(w.set_quote_char(b'`').is_err());
            w.set_quote_char(b'\'').unwrap();
            w.start_element("a").unwrap();
            w.write_attribute("q", Some("it's \"x\"")).unwrap();
            w.end_element().unwrap();
        });
        assert_eq!(out, "<a q='it&apos;s &quot;x&quot;'/>");
    }

    #[test]
    fn test_end_document_closes_everything() {
        let out = with_writer(|w| {
            w.start_element("a").unwrap();
            w.start_attribute("x").unwrap();
            w.write_string("1").unwrap();
            w.end_document().unwrap();
        });
        assert_eq!(out, "<a x=\"1\"/>\n");
    }

    #[test]
    fn test_write_string_without_frame() {
        with_writer(|w| {
            assert!(matches!(
                w.write_string("loose"),
                Err(XmlWriterError::State(_))
            ));
            assert_eq!(w.depth(), 0);
        });
    }
}
