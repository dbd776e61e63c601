//! Provide a small, owned document tree.
//!
//! The tree is what the document sink of [`XmlWriter`](crate::xml_writer::XmlWriter) hands back,
//! and what [`Document::write_to`] replays through an [`XmlTextWriter`].
//! It is read-only in spirit: there is no mutation API beyond the public fields.

mod dtd;
mod parse;

use std::fmt::{self, Display};

pub use dtd::{Dtd, DtdDeclaration};

use crate::{
    encoding::EncodingError,
    error::{__xml_raise_error, XmlErrorDomain, XmlErrorLevel, XmlParserErrors, XmlWriterError},
    writer::XmlTextWriter,
};

/// The namespace bound to the `xml` prefix.
pub const XML_XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
/// The namespace of namespace declarations.
pub const XML_XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// The type of a node, numbered as in the DOM.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum XmlElementType {
    XmlElementNode = 1,
    XmlAttributeNode = 2,
    XmlTextNode = 3,
    XmlCDATASectionNode = 4,
    XmlEntityRefNode = 5,
    XmlPINode = 7,
    XmlCommentNode = 8,
    XmlDocumentNode = 9,
    XmlDocumentTypeNode = 10,
    XmlNotationNode = 12,
    XmlDTDNode = 14,
    XmlElementDecl = 15,
    XmlAttributeDecl = 16,
    XmlEntityDecl = 17,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// `None` if the document has no XML declaration.
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub standalone: Option<bool>,
    pub doctype: Option<Dtd>,
    /// The root element together with the comments and PIs around it.
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// The qualified name, e.g. `x:item`.
    pub name: String,
    pub namespace_uri: Option<String>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub namespace_uri: Option<String>,
    pub value: String,
}

impl Document {
    pub fn new() -> Self {
        Self {
            version: Some("1.0".to_owned()),
            encoding: None,
            standalone: None,
            doctype: None,
            children: vec![],
        }
    }

    pub fn node_type(&self) -> XmlElementType {
        XmlElementType::XmlDocumentNode
    }

    /// Get the root element of the document.
    #[doc(alias = "xmlDocGetRootElement")]
    pub fn root_element(&self) -> Option<&Element> {
        self.children.iter().find_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Replay the document through `writer`.
    ///
    /// The XML declaration is written only if the document has one.
    pub fn write_to(&self, writer: &mut XmlTextWriter) -> Result<usize, XmlWriterError> {
        let mut sum = 0;
        if let Some(version) = self.version.as_deref() {
            sum += writer.start_document(Some(version), self.encoding.as_deref(), self.standalone)?;
        }
        if let Some(doctype) = self.doctype.as_ref() {
            sum += doctype.write_to(writer)?;
        }
        for node in &self.children {
            sum += node.write_to(writer)?;
        }
        sum += writer.end_document()?;
        Ok(sum)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    pub fn node_type(&self) -> XmlElementType {
        match self {
            Self::Element(_) => XmlElementType::XmlElementNode,
            Self::Text(_) => XmlElementType::XmlTextNode,
            Self::CData(_) => XmlElementType::XmlCDATASectionNode,
            Self::Comment(_) => XmlElementType::XmlCommentNode,
            Self::ProcessingInstruction { .. } => XmlElementType::XmlPINode,
        }
    }

    /// Returns the text content of the node, like DOM `textContent`.
    #[doc(alias = "xmlNodeGetContent")]
    pub fn text_content(&self) -> String {
        match self {
            Self::Element(element) => element.text_content(),
            Self::Text(text) | Self::CData(text) | Self::Comment(text) => text.clone(),
            Self::ProcessingInstruction { data, .. } => data.clone(),
        }
    }

    pub fn write_to(&self, writer: &mut XmlTextWriter) -> Result<usize, XmlWriterError> {
        match self {
            Self::Element(element) => element.write_to(writer),
            Self::Text(text) => writer.write_string(text),
            Self::CData(text) => writer.write_cdata(Some(text)),
            Self::Comment(text) => writer.write_comment(Some(text)),
            Self::ProcessingInstruction { target, data } => {
                writer.write_pi(target, Some(data.as_str()).filter(|data| !data.is_empty()))
            }
        }
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace_uri: None,
            attributes: vec![],
            children: vec![],
        }
    }

    /// The prefix of the qualified name, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    /// Get the value of the attribute whose qualified name is `name`.
    #[doc(alias = "xmlGetProp")]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Iterate over the child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn text_content(&self) -> String {
        let mut buf = String::new();
        for child in &self.children {
            match child {
                Node::Element(element) => buf.push_str(&element.text_content()),
                Node::Text(text) | Node::CData(text) => buf.push_str(text),
                _ => {}
            }
        }
        buf
    }

    pub fn write_to(&self, writer: &mut XmlTextWriter) -> Result<usize, XmlWriterError> {
        let mut sum = writer.start_element(&self.name)?;
        for attr in &self.attributes {
            sum += writer.write_attribute(&attr.name, Some(&attr.value))?;
        }
        for child in &self.children {
            sum += child.write_to(writer)?;
        }
        sum += writer.end_element()?;
        Ok(sum)
    }
}

impl Attribute {
    pub fn node_type(&self) -> XmlElementType {
        XmlElementType::XmlAttributeNode
    }
}

/// Errors raised while building a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlTreeError {
    /// The input could not be decoded.
    Encoding(EncodingError),
    /// The input is not well-formed.
    Syntax { position: usize, message: String },
    /// A DOCTYPE or a DTD could not be read.
    Dtd(String),
}

impl Display for XmlTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e) => write!(f, "{e}"),
            Self::Syntax { position, message } => {
                write!(f, "error at position {position}: {message}")
            }
            Self::Dtd(message) => write!(f, "malformed DTD: {message}"),
        }
    }
}

impl std::error::Error for XmlTreeError {}

impl From<EncodingError> for XmlTreeError {
    fn from(value: EncodingError) -> Self {
        Self::Encoding(value)
    }
}

impl From<XmlTreeError> for XmlWriterError {
    fn from(value: XmlTreeError) -> Self {
        Self::Tree(value.to_string().into())
    }
}

/// Handle a tree error
#[doc(alias = "xmlTreeErr")]
pub(crate) fn xml_tree_err(domain: XmlErrorDomain, code: XmlParserErrors, msg: &str) {
    __xml_raise_error(domain, code, XmlErrorLevel::XmlErrError, None, msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySink;

    fn sample() -> Document {
        let mut root = Element::new("list");
        root.attributes.push(Attribute {
            name: "kind".to_owned(),
            namespace_uri: None,
            value: "a \"b\"".to_owned(),
        });
        let mut item = Element::new("item");
        item.children.push(Node::Text("1 < 2".to_owned()));
        root.children.push(Node::Element(item));
        root.children.push(Node::CData("<raw>".to_owned()));
        root.children.push(Node::ProcessingInstruction {
            target: "pi".to_owned(),
            data: String::new(),
        });
        let mut doc = Document::new();
        doc.children.push(Node::Comment(" head ".to_owned()));
        doc.children.push(Node::Element(root));
        doc
    }

    #[test]
    fn test_write_to() {
        let sink = MemorySink::new();
        {
            let mut writer = XmlTextWriter::from_writer(sink.clone());
            sample().write_to(&mut writer).unwrap();
        }
        assert_eq!(
            String::from_utf8(sink.content()).unwrap(),
            concat!(
                "<?xml version=\"1.0\"?>\n",
                "<!-- head --><list kind=\"a &quot;b&quot;\">",
                "<item>1 &lt; 2</item><![CDATA[<raw>]]><?pi?></list>\n"
            )
        );
    }

    #[test]
    fn test_accessors() {
        let doc = sample();
        assert_eq!(doc.node_type(), XmlElementType::XmlDocumentNode);
        let root = doc.root_element().unwrap();
        assert_eq!(root.attribute("kind"), Some("a \"b\""));
        assert_eq!(root.attribute("none"), None);
        assert_eq!(root.child_elements().count(), 1);
        assert_eq!(root.text_content(), "1 < 2<raw>");
        assert_eq!(doc.children[0].node_type(), XmlElementType::XmlCommentNode);

        let element = Element::new("x:item");
        assert_eq!(element.prefix(), Some("x"));
        assert_eq!(element.local_name(), "item");
        assert_eq!(Element::new("item").prefix(), None);
    }
}
