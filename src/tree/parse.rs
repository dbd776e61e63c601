//! Build a [`Document`] from serialized XML with `quick-xml`.
//!
//! This is a non-validating reader: the internal subset is recorded and its general
//! entities are expanded, but nothing is checked against the declarations.

use std::{borrow::Cow, collections::HashMap};

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

use crate::{
    encoding::decode_to_string,
    error::{XmlErrorDomain, XmlParserErrors},
};

use super::{
    Attribute, Document, Dtd, Element, Node, XML_XML_NAMESPACE, XML_XMLNS_NAMESPACE, XmlTreeError,
    xml_tree_err,
};

impl Document {
    /// Parse a serialized document.
    ///
    /// The bytes are decoded according to the byte order mark, the encoding declaration
    /// or the first bytes, in that order.
    #[doc(alias = "xmlReadMemory")]
    pub fn parse(input: &[u8]) -> Result<Self, XmlTreeError> {
        Self::parse_with(input, true)
    }

    /// Parse a serialized document.
    ///
    /// If `keep_blanks` is `false`, text nodes made only of whitespace are dropped.
    pub fn parse_with(input: &[u8], keep_blanks: bool) -> Result<Self, XmlTreeError> {
        let declared = sniff_declared_encoding(input);
        let text = decode_to_string(input, declared.as_deref()).inspect_err(|e| {
            xml_tree_err(
                XmlErrorDomain::XmlFromI18N,
                XmlParserErrors::XmlI18NConvFailed,
                &format!("input conversion failed: {e}\n"),
            );
        })?;
        Self::parse_str_with(&text, keep_blanks)
    }

    /// Parse a document that is already decoded.
    ///
    /// The encoding declaration is recorded but not used.
    pub fn parse_str(text: &str) -> Result<Self, XmlTreeError> {
        Self::parse_str_with(text, true)
    }

    pub fn parse_str_with(text: &str, keep_blanks: bool) -> Result<Self, XmlTreeError> {
        TreeBuilder::new(keep_blanks).build(text)
    }
}

/// Look for `encoding="..."` in an XML declaration written in an ASCII compatible encoding.
fn sniff_declared_encoding(input: &[u8]) -> Option<String> {
    let decl = input.strip_prefix(b"<?xml")?;
    let end = decl.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&decl[..end]).ok()?;
    let (_, rest) = decl.split_once("encoding")?;
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|&c| c == '"' || c == '\'')?;
    let rest = &rest[1..];
    rest.find(quote).map(|end| rest[..end].to_owned())
}

struct TreeBuilder {
    keep_blanks: bool,
    doc: Document,
    stack: Vec<Element>,
    // in-scope namespace declarations, one frame per open element
    scopes: Vec<Vec<(Option<String>, String)>>,
    entities: HashMap<String, String>,
}

impl TreeBuilder {
    fn new(keep_blanks: bool) -> Self {
        let mut doc = Document::new();
        doc.version = None;
        Self {
            keep_blanks,
            doc,
            stack: vec![],
            scopes: vec![],
            entities: HashMap::new(),
        }
    }

    fn build(mut self, text: &str) -> Result<Document, XmlTreeError> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(false);

        let mut buf = Vec::new();
        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                syntax_error(reader.buffer_position(), e.to_string())
            })?;
            let position = reader.buffer_position();
            match event {
                Event::Decl(e) => {
                    let version = e.version().map_err(|e| syntax_error(position, e.to_string()))?;
                    self.doc.version = Some(utf8(&version, position)?.to_owned());
                    if let Some(encoding) = e.encoding() {
                        let encoding = encoding.map_err(|e| syntax_error(position, e.to_string()))?;
                        self.doc.encoding = Some(utf8(&encoding, position)?.to_owned());
                    }
                    if let Some(standalone) = e.standalone() {
                        let standalone =
                            standalone.map_err(|e| syntax_error(position, e.to_string()))?;
                        self.doc.standalone = match utf8(&standalone, position)? {
                            "yes" => Some(true),
                            "no" => Some(false),
                            other => {
                                xml_tree_err(
                                    XmlErrorDomain::XmlFromTree,
                                    XmlParserErrors::XmlErrStandaloneValue,
                                    "standalone accepts only 'yes' or 'no'\n",
                                );
                                return Err(syntax_error(
                                    position,
                                    format!("invalid standalone value '{other}'"),
                                ));
                            }
                        };
                    }
                }
                Event::DocType(e) => {
                    let dtd = Dtd::from_doctype(utf8(&e, position)?)?;
                    self.entities = dtd.internal_entities();
                    self.doc.doctype = Some(dtd);
                }
                Event::Start(e) => {
                    let element = self.open_element(&e, position)?;
                    self.stack.push(element);
                }
                Event::Empty(e) => {
                    let element = self.open_element(&e, position)?;
                    self.scopes.pop();
                    self.append(Node::Element(element));
                }
                Event::End(_) => self.close_element(),
                Event::Text(e) => {
                    let entities = &self.entities;
                    let text = e
                        .unescape_with(|name| resolve_entity(entities, name))
                        .map_err(|e| syntax_error(position, e.to_string()))?;
                    self.append_text(text);
                }
                Event::CData(e) => {
                    let text = utf8(&e, position)?.to_owned();
                    self.append(Node::CData(text));
                }
                Event::Comment(e) => {
                    let text = utf8(&e, position)?.to_owned();
                    self.append(Node::Comment(text));
                }
                Event::PI(e) => {
                    let content = utf8(&e, position)?;
                    let (target, data) = content
                        .split_once(|c: char| c.is_ascii_whitespace())
                        .map_or((content, ""), |(target, data)| {
                            (target, data.trim_start())
                        });
                    self.append(Node::ProcessingInstruction {
                        target: target.to_owned(),
                        data: data.to_owned(),
                    });
                }
                Event::Eof => break,
            }
            buf.clear();
        }

        if !self.stack.is_empty() {
            xml_tree_err(
                XmlErrorDomain::XmlFromTree,
                XmlParserErrors::XmlErrTagNotFinished,
                "Premature end of data, closing the open elements\n",
            );
            while !self.stack.is_empty() {
                self.close_element();
            }
        }

        if self.doc.root_element().is_none() {
            xml_tree_err(
                XmlErrorDomain::XmlFromTree,
                XmlParserErrors::XmlErrDocumentEmpty,
                "Document is empty\n",
            );
            return Err(syntax_error(text.len(), "document is empty".to_owned()));
        }
        Ok(self.doc)
    }

    fn open_element(&mut self, e: &BytesStart, position: usize) -> Result<Element, XmlTreeError> {
        let name = utf8(e.name().as_ref(), position)?.to_owned();

        let mut attributes = vec![];
        let mut scope = vec![];
        for attr in e.attributes() {
            let attr = attr.map_err(|e| syntax_error(position, e.to_string()))?;
            let key = utf8(attr.key.as_ref(), position)?.to_owned();
            let entities = &self.entities;
            let value = attr
                .unescape_value_with(|name| resolve_entity(entities, name))
                .map_err(|e| syntax_error(position, e.to_string()))?
                .into_owned();
            if key == "xmlns" {
                scope.push((None, value.clone()));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.push((Some(prefix.to_owned()), value.clone()));
            }
            if attributes.iter().any(|a: &Attribute| a.name == key) {
                xml_tree_err(
                    XmlErrorDomain::XmlFromTree,
                    XmlParserErrors::XmlErrAttributeRedefined,
                    &format!("Attribute {key} redefined\n"),
                );
                return Err(syntax_error(position, format!("attribute {key} redefined")));
            }
            attributes.push(Attribute {
                name: key,
                namespace_uri: None,
                value,
            });
        }
        self.scopes.push(scope);

        for attr in &mut attributes {
            attr.namespace_uri = if attr.name == "xmlns" || attr.name.starts_with("xmlns:") {
                Some(XML_XMLNS_NAMESPACE.to_owned())
            } else {
                match attr.name.split_once(':') {
                    Some((prefix, _)) => self.lookup_namespace(Some(prefix)),
                    None => None,
                }
            };
        }

        let prefix = name.split_once(':').map(|(prefix, _)| prefix);
        let namespace_uri = self.lookup_namespace(prefix);
        Ok(Element {
            name,
            namespace_uri,
            attributes,
            children: vec![],
        })
    }

    /// Search the namespace bound to `prefix` in the open elements.
    #[doc(alias = "xmlSearchNs")]
    fn lookup_namespace(&self, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_XML_NAMESPACE.to_owned());
        }
        let found = self
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.clone())
            // `xmlns=""` undeclares the default namespace
            .filter(|uri| !uri.is_empty());
        if found.is_none() {
            if let Some(prefix) = prefix {
                xml_tree_err(
                    XmlErrorDomain::XmlFromTree,
                    XmlParserErrors::XmlNsErrUndefinedNamespace,
                    &format!("Namespace prefix {prefix} is not defined\n"),
                );
            }
        }
        found
    }

    fn close_element(&mut self) {
        self.scopes.pop();
        if let Some(element) = self.stack.pop() {
            self.append(Node::Element(element));
        }
    }

    fn append(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.doc.children.push(node),
        }
    }

    fn append_text(&mut self, text: Cow<str>) {
        if text.is_empty() || (!self.keep_blanks && text.chars().all(|c| c.is_ascii_whitespace())) {
            return;
        }
        // Outside of the root element only markup is significant.
        let Some(parent) = self.stack.last_mut() else {
            return;
        };
        if let Some(Node::Text(last)) = parent.children.last_mut() {
            last.push_str(&text);
        } else {
            parent.children.push(Node::Text(text.into_owned()));
        }
    }
}

/// Resolve the five entities every XML processor knows.
fn resolve_predefined_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

/// Predefined entities first, then the general entities of the internal subset.
fn resolve_entity<'e>(entities: &'e HashMap<String, String>, name: &str) -> Option<&'e str> {
    resolve_predefined_entity(name).or_else(|| entities.get(name).map(|value| value.as_str()))
}

fn utf8(bytes: &[u8], position: usize) -> Result<&str, XmlTreeError> {
    std::str::from_utf8(bytes).map_err(|e| syntax_error(position, e.to_string()))
}

fn syntax_error(position: usize, message: String) -> XmlTreeError {
    xml_tree_err(
        XmlErrorDomain::XmlFromTree,
        XmlParserErrors::XmlErrInternalError,
        &format!("{message}\n"),
    );
    XmlTreeError::Syntax { position, message }
}
