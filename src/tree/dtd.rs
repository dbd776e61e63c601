//! The document type declaration and its internal subset.

use std::{collections::HashMap, iter::Peekable};

use quick_xml::escape::unescape;

use crate::{
    error::{XmlErrorDomain, XmlParserErrors, XmlWriterError},
    writer::XmlTextWriter,
};

use super::{XmlElementType, XmlTreeError, xml_tree_err};

/// A DTD: the name of the root element, its external identifiers,
/// and the declarations of the internal subset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dtd {
    name: Option<String>,
    external_id: Option<String>,
    system_id: Option<String>,
    internal_subset: Option<Vec<DtdDeclaration>>,
}

/// A markup declaration of a DTD.
#[derive(Debug, Clone, PartialEq)]
pub enum DtdDeclaration {
    /// `<!ELEMENT name content>`
    Element { name: String, content: String },
    /// `<!ATTLIST name content>`
    Attlist { name: String, content: String },
    /// `<!ENTITY [%] name ...>`
    Entity {
        parameter: bool,
        name: String,
        value: Option<String>,
        public_id: Option<String>,
        system_id: Option<String>,
        ndata: Option<String>,
    },
    /// `<!NOTATION name ...>`
    Notation {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    Comment(String),
    /// `%name;`
    PEReference(String),
}

impl Dtd {
    /// Create a DTD without internal subset.
    #[doc(alias = "xmlNewDtd")]
    pub fn new(name: &str, external_id: Option<&str>, system_id: Option<&str>) -> Self {
        Self {
            name: Some(name.to_owned()),
            external_id: external_id.map(|s| s.to_owned()),
            system_id: system_id.map(|s| s.to_owned()),
            internal_subset: None,
        }
    }

    /// Parse a sequence of markup declarations, e.g. the content of an external subset.
    ///
    /// The returned DTD has no name.
    #[doc(alias = "xmlIOParseDTD")]
    pub fn parse(text: &str) -> Result<Self, XmlTreeError> {
        Ok(Self {
            name: None,
            external_id: None,
            system_id: None,
            internal_subset: Some(parse_declarations(text)?),
        })
    }

    /// Parse the content of a `<!DOCTYPE ...>` declaration, without the keyword.
    pub fn from_doctype(text: &str) -> Result<Self, XmlTreeError> {
        let text = text.trim();
        let text = text
            .strip_prefix("DOCTYPE")
            .filter(|rest| rest.starts_with(|c: char| c.is_ascii_whitespace()))
            .unwrap_or(text);
        let (head, subset) = match find_unquoted(text, b'[') {
            Some(open) => {
                let close = text.rfind(']').filter(|&close| close > open).ok_or_else(|| {
                    dtd_error(XmlParserErrors::XmlErrTagNotFinished, "internal subset is not closed")
                })?;
                (&text[..open], Some(&text[open + 1..close]))
            }
            None => (text, None),
        };

        let mut tokens = tokenize(head)?.into_iter().peekable();
        let Some(Token::Word(name)) = tokens.next() else {
            return Err(dtd_error(
                XmlParserErrors::XmlErrNameRequired,
                "DOCTYPE without a name",
            ));
        };
        let (external_id, system_id) = parse_external_id(&mut tokens, true)?;
        if tokens.next().is_some() {
            return Err(dtd_error(
                XmlParserErrors::XmlErrInternalError,
                "unexpected content in DOCTYPE",
            ));
        }

        Ok(Self {
            name: Some(name.to_owned()),
            external_id,
            system_id,
            internal_subset: subset.map(parse_declarations).transpose()?,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The public identifier.
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    /// The system identifier.
    pub fn uri(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    #[doc(alias = "uri")]
    pub fn system_id(&self) -> Option<&str> {
        self.uri()
    }

    pub fn internal_subset(&self) -> Option<&[DtdDeclaration]> {
        self.internal_subset.as_deref()
    }

    pub fn node_type(&self) -> XmlElementType {
        XmlElementType::XmlDTDNode
    }

    /// Append a declaration to the internal subset.
    pub fn add_declaration(&mut self, decl: DtdDeclaration) {
        self.internal_subset.get_or_insert_with(Vec::new).push(decl);
    }

    /// The replacement texts of the internal general entities.
    ///
    /// Character and predefined entity references in the literal are expanded.
    /// A literal referring to other entities is kept as is.
    pub(crate) fn internal_entities(&self) -> HashMap<String, String> {
        self.internal_subset
            .iter()
            .flatten()
            .filter_map(|decl| match decl {
                DtdDeclaration::Entity {
                    parameter: false,
                    name,
                    value: Some(value),
                    ..
                } => {
                    let text = unescape(value).map_or_else(|_| value.clone(), |v| v.into_owned());
                    Some((name.clone(), text))
                }
                _ => None,
            })
            .collect()
    }

    /// Write the DOCTYPE through `writer`.
    ///
    /// A DTD without name (an external subset) writes only its declarations.
    pub fn write_to(&self, writer: &mut XmlTextWriter) -> Result<usize, XmlWriterError> {
        let mut sum = 0;
        if let Some(name) = self.name.as_deref() {
            sum += writer.start_dtd(name, self.external_id.as_deref(), self.system_id.as_deref())?;
            if self.internal_subset.as_ref().is_some_and(|subset| subset.is_empty()) {
                // opens `[]`
                sum += writer.write_raw("")?;
            }
        }
        for decl in self.internal_subset.iter().flatten() {
            sum += decl.write_to(writer)?;
        }
        if self.name.is_some() {
            sum += writer.end_dtd()?;
        }
        Ok(sum)
    }
}

impl DtdDeclaration {
    pub fn node_type(&self) -> XmlElementType {
        match self {
            Self::Element { .. } => XmlElementType::XmlElementDecl,
            Self::Attlist { .. } => XmlElementType::XmlAttributeDecl,
            Self::Entity { .. } => XmlElementType::XmlEntityDecl,
            Self::Notation { .. } => XmlElementType::XmlNotationNode,
            Self::Comment(_) => XmlElementType::XmlCommentNode,
            Self::PEReference(_) => XmlElementType::XmlEntityRefNode,
        }
    }

    pub fn write_to(&self, writer: &mut XmlTextWriter) -> Result<usize, XmlWriterError> {
        match self {
            Self::Element { name, content } => writer.write_dtd_element(name, content),
            Self::Attlist { name, content } => writer.write_dtd_attlist(name, content),
            Self::Entity {
                parameter,
                name,
                value,
                public_id,
                system_id,
                ndata,
            } => writer.write_dtd_entity(
                *parameter,
                name,
                public_id.as_deref(),
                system_id.as_deref(),
                ndata.as_deref(),
                value.as_deref(),
            ),
            Self::Notation {
                name,
                public_id,
                system_id,
            } => writer.write_dtd_notation(name, public_id.as_deref(), system_id.as_deref()),
            Self::Comment(text) => writer.write_comment(Some(text)),
            Self::PEReference(name) => writer.write_raw(&format!("%{name};")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Word(&'a str),
    Quoted(&'a str),
}

/// Split a declaration body into bare words and quoted literals.
fn tokenize(text: &str) -> Result<Vec<Token<'_>>, XmlTreeError> {
    let mut tokens = vec![];
    let mut rest = text.trim_start();
    while let Some(c) = rest.chars().next() {
        if c == '"' || c == '\'' {
            let end = rest[1..].find(c).ok_or_else(|| {
                dtd_error(XmlParserErrors::XmlErrTagNotFinished, "literal is not closed")
            })?;
            tokens.push(Token::Quoted(&rest[1..end + 1]));
            rest = &rest[end + 2..];
        } else {
            let end = rest
                .find(|c: char| c.is_ascii_whitespace() || c == '"' || c == '\'')
                .unwrap_or(rest.len());
            tokens.push(Token::Word(&rest[..end]));
            rest = &rest[end..];
        }
        rest = rest.trim_start();
    }
    Ok(tokens)
}

/// Read `SYSTEM "s"` or `PUBLIC "p" "s"`.
///
/// If `system_optional` is `true`, `PUBLIC "p"` alone is accepted, as in a notation.
fn parse_external_id<'a>(
    tokens: &mut Peekable<impl Iterator<Item = Token<'a>>>,
    system_optional: bool,
) -> Result<(Option<String>, Option<String>), XmlTreeError> {
    match tokens.peek() {
        Some(Token::Word("SYSTEM")) => {
            tokens.next();
            let Some(Token::Quoted(system)) = tokens.next() else {
                return Err(dtd_error(
                    XmlParserErrors::XmlErrURIRequired,
                    "SYSTEM without a system literal",
                ));
            };
            Ok((None, Some(system.to_owned())))
        }
        Some(Token::Word("PUBLIC")) => {
            tokens.next();
            let Some(Token::Quoted(public)) = tokens.next() else {
                return Err(dtd_error(
                    XmlParserErrors::XmlErrURIRequired,
                    "PUBLIC without a public literal",
                ));
            };
            match tokens.peek() {
                Some(Token::Quoted(system)) => {
                    let system = (*system).to_owned();
                    tokens.next();
                    Ok((Some(public.to_owned()), Some(system)))
                }
                _ if system_optional => Ok((Some(public.to_owned()), None)),
                _ => Err(dtd_error(
                    XmlParserErrors::XmlErrURIRequired,
                    "PUBLIC without a system literal",
                )),
            }
        }
        _ => Ok((None, None)),
    }
}

/// Find `target` outside of quoted literals.
fn find_unquoted(text: &str, target: u8) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in text.as_bytes().iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == target => return Some(i),
            None => {}
        }
    }
    None
}

fn parse_declarations(text: &str) -> Result<Vec<DtdDeclaration>, XmlTreeError> {
    let mut decls = vec![];
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if let Some(body) = rest.strip_prefix("<!--") {
            let end = body.find("-->").ok_or_else(|| {
                dtd_error(XmlParserErrors::XmlErrTagNotFinished, "comment is not closed")
            })?;
            decls.push(DtdDeclaration::Comment(body[..end].to_owned()));
            rest = &body[end + 3..];
        } else if let Some(body) = rest.strip_prefix("<?") {
            // Processing instructions carry no declaration.
            let end = body.find("?>").ok_or_else(|| {
                dtd_error(XmlParserErrors::XmlErrTagNotFinished, "PI is not closed")
            })?;
            rest = &body[end + 2..];
        } else if let Some(body) = rest.strip_prefix('%') {
            let end = body.find(';').ok_or_else(|| {
                dtd_error(XmlParserErrors::XmlErrTagNotFinished, "PE reference is not closed")
            })?;
            decls.push(DtdDeclaration::PEReference(body[..end].to_owned()));
            rest = &body[end + 1..];
        } else if let Some(body) = rest.strip_prefix("<!") {
            let end = find_unquoted(body, b'>').ok_or_else(|| {
                dtd_error(XmlParserErrors::XmlErrTagNotFinished, "declaration is not closed")
            })?;
            decls.push(parse_declaration(&body[..end])?);
            rest = &body[end + 1..];
        } else {
            return Err(dtd_error(
                XmlParserErrors::XmlErrInternalError,
                "content error in the internal subset",
            ));
        }
        rest = rest.trim_start();
    }
    Ok(decls)
}

/// Parse one declaration, without the surrounding `<!` and `>`.
fn parse_declaration(body: &str) -> Result<DtdDeclaration, XmlTreeError> {
    let (keyword, rest) = body
        .split_once(|c: char| c.is_ascii_whitespace())
        .ok_or_else(|| dtd_error(XmlParserErrors::XmlErrNameRequired, "declaration without a name"))?;
    let rest = rest.trim_start();
    match keyword {
        "ELEMENT" | "ATTLIST" => {
            let (name, content) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));
            let (name, content) = (name.to_owned(), content.trim().to_owned());
            if keyword == "ELEMENT" {
                Ok(DtdDeclaration::Element { name, content })
            } else {
                Ok(DtdDeclaration::Attlist { name, content })
            }
        }
        "ENTITY" => {
            let mut tokens = tokenize(rest)?.into_iter().peekable();
            let parameter = tokens.next_if_eq(&Token::Word("%")).is_some();
            let Some(Token::Word(name)) = tokens.next() else {
                return Err(dtd_error(
                    XmlParserErrors::XmlErrNameRequired,
                    "entity declaration without a name",
                ));
            };
            if let Some(Token::Quoted(value)) = tokens.peek().copied() {
                tokens.next();
                return Ok(DtdDeclaration::Entity {
                    parameter,
                    name: name.to_owned(),
                    value: Some(expand_quote_references(value)),
                    public_id: None,
                    system_id: None,
                    ndata: None,
                });
            }
            let (public_id, system_id) = parse_external_id(&mut tokens, false)?;
            if system_id.is_none() {
                return Err(dtd_error(
                    XmlParserErrors::XmlErrURIRequired,
                    "entity declaration without a value",
                ));
            }
            let ndata = match (tokens.next(), tokens.next()) {
                (Some(Token::Word("NDATA")), Some(Token::Word(ndata))) => Some(ndata.to_owned()),
                (None, _) => None,
                _ => {
                    return Err(dtd_error(
                        XmlParserErrors::XmlErrInternalError,
                        "unexpected content in entity declaration",
                    ));
                }
            };
            Ok(DtdDeclaration::Entity {
                parameter,
                name: name.to_owned(),
                value: None,
                public_id,
                system_id,
                ndata,
            })
        }
        "NOTATION" => {
            let mut tokens = tokenize(rest)?.into_iter().peekable();
            let Some(Token::Word(name)) = tokens.next() else {
                return Err(dtd_error(
                    XmlParserErrors::XmlErrNameRequired,
                    "notation declaration without a name",
                ));
            };
            let (public_id, system_id) = parse_external_id(&mut tokens, true)?;
            Ok(DtdDeclaration::Notation {
                name: name.to_owned(),
                public_id,
                system_id,
            })
        }
        _ => Err(dtd_error(
            XmlParserErrors::XmlDTDUnknownElem,
            &format!("unknown declaration <!{keyword}"),
        )),
    }
}

/// Replace the character references to `"` and `'` by the characters themselves.
///
/// Both forms have the same replacement text, and the writer picks the reference
/// again when the character collides with its quote.
fn expand_quote_references(value: &str) -> String {
    value
        .replace("&#34;", "\"")
        .replace("&#x22;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
}

fn dtd_error(code: XmlParserErrors, message: &str) -> XmlTreeError {
    xml_tree_err(XmlErrorDomain::XmlFromDTD, code, &format!("{message}\n"));
    XmlTreeError::Dtd(message.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySink;

    #[test]
    fn test_doctype_forms() {
        let dtd = Dtd::from_doctype("html").unwrap();
        assert_eq!(dtd.name(), Some("html"));
        assert_eq!(dtd.external_id(), None);
        assert_eq!(dtd.uri(), None);
        assert_eq!(dtd.internal_subset(), None);

        let dtd = Dtd::from_doctype("html SYSTEM 'about:legacy-compat'").unwrap();
        assert_eq!(dtd.system_id(), Some("about:legacy-compat"));

        let dtd = Dtd::from_doctype(
            r#"html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd""#,
        )
        .unwrap();
        assert_eq!(dtd.external_id(), Some("-//W3C//DTD XHTML 1.0 Strict//EN"));
        assert_eq!(
            dtd.uri(),
            Some("http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd")
        );
        assert_eq!(dtd.node_type(), XmlElementType::XmlDTDNode);
    }

    #[test]
    fn test_internal_subset() {
        let dtd = Dtd::from_doctype(
            r#"doc [
  <!ELEMENT doc (#PCDATA | em)*>
  <!ATTLIST doc id ID #IMPLIED title CDATA "a > b">
  <!-- entities -->
  <!ENTITY % common SYSTEM "common.ent">
  %common;
  <!ENTITY logo PUBLIC "-//logo" "logo.gif" NDATA gif>
  <!ENTITY who 'world'>
  <!NOTATION gif PUBLIC "-//gif">
]"#,
        )
        .unwrap();
        assert_eq!(
            dtd.internal_subset().unwrap(),
            &[
                DtdDeclaration::Element {
                    name: "doc".to_owned(),
                    content: "(#PCDATA | em)*".to_owned()
                },
                DtdDeclaration::Attlist {
                    name: "doc".to_owned(),
                    content: "id ID #IMPLIED title CDATA \"a > b\"".to_owned()
                },
                DtdDeclaration::Comment(" entities ".to_owned()),
                DtdDeclaration::Entity {
                    parameter: true,
                    name: "common".to_owned(),
                    value: None,
                    public_id: None,
                    system_id: Some("common.ent".to_owned()),
                    ndata: None
                },
                DtdDeclaration::PEReference("common".to_owned()),
                DtdDeclaration::Entity {
                    parameter: false,
                    name: "logo".to_owned(),
                    value: None,
                    public_id: Some("-//logo".to_owned()),
                    system_id: Some("logo.gif".to_owned()),
                    ndata: Some("gif".to_owned())
                },
                DtdDeclaration::Entity {
                    parameter: false,
                    name: "who".to_owned(),
                    value: Some("world".to_owned()),
                    public_id: None,
                    system_id: None,
                    ndata: None
                },
                DtdDeclaration::Notation {
                    name: "gif".to_owned(),
                    public_id: Some("-//gif".to_owned()),
                    system_id: None
                },
            ]
        );
        assert_eq!(
            dtd.internal_entities().get("who").map(|s| s.as_str()),
            Some("world")
        );
    }

    #[test]
    fn test_parse_external_subset() {
        let dtd = Dtd::parse("<!ELEMENT a EMPTY>\n<!ENTITY e \"v\">").unwrap();
        assert_eq!(dtd.name(), None);
        assert_eq!(dtd.internal_subset().unwrap().len(), 2);
        assert!(Dtd::parse("<!BOGUS x>").is_err());
        assert!(Dtd::parse("<!ELEMENT a EMPTY").is_err());
        assert!(Dtd::parse("<!ENTITY e>").is_err());
    }

    #[test]
    fn test_write_to() {
        let mut dtd = Dtd::new("doc", None, Some("doc.dtd"));
        dtd.add_declaration(DtdDeclaration::Element {
            name: "doc".to_owned(),
            content: "EMPTY".to_owned(),
        });
        dtd.add_declaration(DtdDeclaration::PEReference("extra".to_owned()));
        let sink = MemorySink::new();
        {
            let mut writer = XmlTextWriter::from_writer(sink.clone());
            dtd.write_to(&mut writer).unwrap();
        }
        assert_eq!(
            String::from_utf8(sink.content()).unwrap(),
            "<!DOCTYPE doc SYSTEM \"doc.dtd\" [<!ELEMENT doc EMPTY>%extra;]>"
        );
    }

    #[test]
    fn test_quoted_entity_value() {
        let dtd = Dtd::from_doctype(r#"doc [<!ENTITY q 'say "hi"'><!ENTITY r "it&#39;s &#x22;ok&#34;">]"#)
            .unwrap();
        let values = dtd
            .internal_subset()
            .unwrap()
            .iter()
            .filter_map(|decl| match decl {
                DtdDeclaration::Entity { value, .. } => value.clone(),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(values, ["say \"hi\"", "it's \"ok\""]);

        let sink = MemorySink::new();
        {
            let mut writer = XmlTextWriter::from_writer(sink.clone());
            dtd.write_to(&mut writer).unwrap();
        }
        let written = String::from_utf8(sink.content()).unwrap();
        assert_eq!(
            written,
            "<!DOCTYPE doc [<!ENTITY q \"say &#34;hi&#34;\"><!ENTITY r \"it's &#34;ok&#34;\">]>"
        );
        let inner = written
            .strip_prefix("<!DOCTYPE")
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap();
        assert_eq!(Dtd::from_doctype(inner).unwrap(), dtd);
    }
}
