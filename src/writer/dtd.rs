//! The DTD part of the text writer.
//!
//! A DOCTYPE is opened with `start_dtd`; element, attribute list, entity and notation
//! declarations written while it is open form the internal subset.

use crate::error::XmlParserErrors;

use super::{
    WriterResult, XmlTextWriter, XmlTextWriterStackEntry, XmlTextWriterState, argument_error,
    state_error,
};

impl XmlTextWriter<'_> {
    /// Start an xml DTD.
    ///
    /// A public identifier requires a system identifier.
    #[doc(alias = "xmlTextWriterStartDTD")]
    pub fn start_dtd(
        &mut self,
        name: &str,
        pubid: Option<&str>,
        sysid: Option<&str>,
    ) -> WriterResult {
        if name.is_empty() {
            return Err(argument_error(
                XmlParserErrors::XmlErrNameRequired,
                "XmlTextWriter::start_dtd : empty DTD name!\n",
            ));
        }

        if !self.nodes.is_empty() {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::start_dtd : DTD allowed only in prolog!\n",
            ));
        }

        if pubid.is_some() && sysid.is_none() {
            return Err(argument_error(
                XmlParserErrors::XmlErrURIRequired,
                "XmlTextWriter::start_dtd : system identifier needed!\n",
            ));
        }

        self.enter_document("XmlTextWriter::start_dtd : the document is already ended!\n")?;
        self.nodes.push_front(XmlTextWriterStackEntry::new(
            Some(name),
            XmlTextWriterState::XmlTextwriterDTD,
        ));

        let mut sum = self.out.write_str("<!DOCTYPE ")?;
        sum += self.out.write_str(name)?;

        if let Some(pubid) = pubid {
            sum += self.out.write_str(if self.indent { "\n" } else { " " })?;
            sum += self.out.write_str("PUBLIC ")?;
            sum += self.write_quoted(pubid)?;
        }

        if let Some(sysid) = sysid {
            if pubid.is_some() {
                sum += self
                    .out
                    .write_str(if self.indent { "\n       " } else { " " })?;
            } else {
                sum += self.out.write_str(if self.indent { "\n" } else { " " })?;
                sum += self.out.write_str("SYSTEM ")?;
            }
            sum += self.write_quoted(sysid)?;
        }

        Ok(sum)
    }

    /// Write a DTD.
    ///
    /// `subset` is written as the internal subset without escaping.
    #[doc(alias = "xmlTextWriterWriteDTD")]
    pub fn write_dtd(
        &mut self,
        name: &str,
        pubid: Option<&str>,
        sysid: Option<&str>,
        subset: Option<&str>,
    ) -> WriterResult {
        let mut sum = self.start_dtd(name, pubid, sysid)?;
        if let Some(subset) = subset {
            sum += self.write_string(subset)?;
        }
        sum += self.end_dtd()?;
        Ok(sum)
    }

    /// End an xml DTD.
    ///
    /// Pending declarations are closed first.
    #[doc(alias = "xmlTextWriterEndDTD")]
    pub fn end_dtd(&mut self) -> WriterResult {
        let mut sum = 0;
        while let Some(lk) = self.nodes.front().cloned() {
            match lk.state.get() {
                ty @ XmlTextWriterState::XmlTextwriterDTDText
                | ty @ XmlTextWriterState::XmlTextwriterDTD => {
                    if matches!(ty, XmlTextWriterState::XmlTextwriterDTDText) {
                        sum += self.out.write_str("]")?;
                    }
                    sum += self.out.write_str(">")?;

                    if self.indent {
                        sum += self.out.write_str("\n")?;
                    }

                    self.nodes.pop_front();
                    return Ok(sum);
                }
                XmlTextWriterState::XmlTextwriterDTDElem
                | XmlTextWriterState::XmlTextwriterDTDElemText => {
                    sum += self.end_dtd_element()?;
                }
                XmlTextWriterState::XmlTextwriterDTDAttl
                | XmlTextWriterState::XmlTextwriterDTDAttlText => {
                    sum += self.end_dtd_attlist()?;
                }
                XmlTextWriterState::XmlTextwriterDTDEnty
                | XmlTextWriterState::XmlTextwriterDTDPEnt
                | XmlTextWriterState::XmlTextwriterDTDEntyText => {
                    sum += self.end_dtd_entity()?;
                }
                XmlTextWriterState::XmlTextwriterComment => {
                    sum += self.end_comment()?;
                }
                _ => break,
            }
        }

        Err(state_error(
            XmlParserErrors::XmlErrInternalError,
            "XmlTextWriter::end_dtd : no DTD is open!\n",
        ))
    }

    /// Open the internal subset of the current DOCTYPE if needed.
    ///
    /// Declarations are only allowed directly in a DOCTYPE, or with no open frame at all
    /// for an external subset.
    fn enter_internal_subset(&mut self, caller: &'static str, toplevel: bool) -> WriterResult {
        let mut sum = 0;
        match self.nodes.front().cloned() {
            Some(lk) => match lk.state.get() {
                XmlTextWriterState::XmlTextwriterDTD => {
                    sum += self.out.write_str(" [")?;
                    if self.indent {
                        sum += self.out.write_str("\n")?;
                    }
                    lk.state.set(XmlTextWriterState::XmlTextwriterDTDText);
                }
                XmlTextWriterState::XmlTextwriterDTDText => {}
                _ => return Err(state_error(XmlParserErrors::XmlErrInternalError, caller)),
            },
            None if toplevel => self.enter_document(caller)?,
            None => return Err(state_error(XmlParserErrors::XmlErrInternalError, caller)),
        }
        Ok(sum)
    }

    fn start_dtd_declaration(
        &mut self,
        keyword: &str,
        name: &str,
        state: XmlTextWriterState,
        caller: &'static str,
    ) -> WriterResult {
        if name.is_empty() {
            return Err(argument_error(XmlParserErrors::XmlErrNameRequired, caller));
        }

        let mut sum = self.enter_internal_subset(caller, true)?;
        self.nodes
            .push_front(XmlTextWriterStackEntry::new(Some(name), state));

        if self.indent {
            sum += self.write_indent()?;
        }

        sum += self.out.write_str(keyword)?;
        sum += self.out.write_str(name)?;
        Ok(sum)
    }

    /// Start an xml DTD element.
    #[doc(alias = "xmlTextWriterStartDTDElement")]
    pub fn start_dtd_element(&mut self, name: &str) -> WriterResult {
        self.start_dtd_declaration(
            "<!ELEMENT ",
            name,
            XmlTextWriterState::XmlTextwriterDTDElem,
            "XmlTextWriter::start_dtd_element : not allowed in this context!\n",
        )
    }

    /// Write a DTD element.
    ///
    /// `content` is the content model, e.g. `(#PCDATA)`.
    #[doc(alias = "xmlTextWriterWriteDTDElement")]
    pub fn write_dtd_element(&mut self, name: &str, content: &str) -> WriterResult {
        let mut sum = self.start_dtd_element(name)?;
        sum += self.write_string(content)?;
        sum += self.end_dtd_element()?;
        Ok(sum)
    }

    /// End an xml DTD element.
    #[doc(alias = "xmlTextWriterEndDTDElement")]
    pub fn end_dtd_element(&mut self) -> WriterResult {
        self.end_dtd_declaration(
            |state| {
                matches!(
                    state,
                    XmlTextWriterState::XmlTextwriterDTDElem
                        | XmlTextWriterState::XmlTextwriterDTDElemText
                )
            },
            "XmlTextWriter::end_dtd_element : no DTD element declaration is open!\n",
        )
    }

    /// Start an xml DTD ATTLIST.
    #[doc(alias = "xmlTextWriterStartDTDAttlist")]
    pub fn start_dtd_attlist(&mut self, name: &str) -> WriterResult {
        self.start_dtd_declaration(
            "<!ATTLIST ",
            name,
            XmlTextWriterState::XmlTextwriterDTDAttl,
            "XmlTextWriter::start_dtd_attlist : not allowed in this context!\n",
        )
    }

    /// Write a DTD ATTLIST.
    #[doc(alias = "xmlTextWriterWriteDTDAttlist")]
    pub fn write_dtd_attlist(&mut self, name: &str, content: &str) -> WriterResult {
        let mut sum = self.start_dtd_attlist(name)?;
        sum += self.write_string(content)?;
        sum += self.end_dtd_attlist()?;
        Ok(sum)
    }

    /// End an xml DTD attribute list.
    #[doc(alias = "xmlTextWriterEndDTDAttlist")]
    pub fn end_dtd_attlist(&mut self) -> WriterResult {
        self.end_dtd_declaration(
            |state| {
                matches!(
                    state,
                    XmlTextWriterState::XmlTextwriterDTDAttl
                        | XmlTextWriterState::XmlTextwriterDTDAttlText
                )
            },
            "XmlTextWriter::end_dtd_attlist : no DTD attribute list is open!\n",
        )
    }

    fn end_dtd_declaration(
        &mut self,
        accept: impl Fn(XmlTextWriterState) -> bool,
        caller: &'static str,
    ) -> WriterResult {
        match self.nodes.front() {
            Some(lk) if accept(lk.state.get()) => {}
            _ => return Err(state_error(XmlParserErrors::XmlErrInternalError, caller)),
        }

        let mut sum = self.out.write_str(">")?;
        if self.indent {
            sum += self.out.write_str("\n")?;
        }

        self.nodes.pop_front();
        Ok(sum)
    }

    /// Start an xml DTD entity.
    ///
    /// If `pe` is `true`, a parameter entity (`<!ENTITY % name ...>`) is started.
    #[doc(alias = "xmlTextWriterStartDTDEntity")]
    pub fn start_dtd_entity(&mut self, pe: bool, name: &str) -> WriterResult {
        let (keyword, state) = if pe {
            ("<!ENTITY % ", XmlTextWriterState::XmlTextwriterDTDPEnt)
        } else {
            ("<!ENTITY ", XmlTextWriterState::XmlTextwriterDTDEnty)
        };
        self.start_dtd_declaration(
            keyword,
            name,
            state,
            "XmlTextWriter::start_dtd_entity : not allowed in this context!\n",
        )
    }

    /// Write a DTD entity.
    ///
    /// Without identifiers, an internal entity whose replacement text is `content` is written.
    /// Otherwise an external entity is written and `content` is ignored.
    #[doc(alias = "xmlTextWriterWriteDTDEntity")]
    pub fn write_dtd_entity(
        &mut self,
        pe: bool,
        name: &str,
        pubid: Option<&str>,
        sysid: Option<&str>,
        ndataid: Option<&str>,
        content: Option<&str>,
    ) -> WriterResult {
        if pe && ndataid.is_some() {
            return Err(argument_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::write_dtd_entity : notation not allowed with parameter entities!\n",
            ));
        }

        if pubid.is_none() && sysid.is_none() {
            let Some(content) = content else {
                return Err(argument_error(
                    XmlParserErrors::XmlErrInternalError,
                    "XmlTextWriter::write_dtd_entity : content or identifiers needed!\n",
                ));
            };
            return self.write_dtd_internal_entity(pe, name, content);
        }

        self.write_dtd_external_entity(pe, name, pubid, sysid, ndataid)
    }

    /// Write a DTD internal entity.
    #[doc(alias = "xmlTextWriterWriteDTDInternalEntity")]
    pub fn write_dtd_internal_entity(&mut self, pe: bool, name: &str, content: &str) -> WriterResult {
        let mut sum = self.start_dtd_entity(pe, name)?;
        sum += self.write_string(content)?;
        sum += self.end_dtd_entity()?;
        Ok(sum)
    }

    /// Write a DTD external entity.
    #[doc(alias = "xmlTextWriterWriteDTDExternalEntity")]
    pub fn write_dtd_external_entity(
        &mut self,
        pe: bool,
        name: &str,
        pubid: Option<&str>,
        sysid: Option<&str>,
        ndataid: Option<&str>,
    ) -> WriterResult {
        if pubid.is_none() && sysid.is_none() {
            return Err(argument_error(
                XmlParserErrors::XmlErrURIRequired,
                "XmlTextWriter::write_dtd_external_entity : an identifier is needed!\n",
            ));
        }
        if pe && ndataid.is_some() {
            return Err(argument_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::write_dtd_external_entity : notation not allowed with parameter entities!\n",
            ));
        }
        if pubid.is_some() && sysid.is_none() {
            return Err(argument_error(
                XmlParserErrors::XmlErrURIRequired,
                "XmlTextWriter::write_dtd_external_entity : system identifier needed!\n",
            ));
        }

        let mut sum = self.start_dtd_entity(pe, name)?;
        sum += self.write_dtd_external_entity_contents(pubid, sysid, ndataid)?;
        sum += self.end_dtd_entity()?;
        Ok(sum)
    }

    /// Write the contents of a DTD external entity.
    ///
    /// The entity must have been started with `start_dtd_entity`.
    #[doc(alias = "xmlTextWriterWriteDTDExternalEntityContents")]
    pub fn write_dtd_external_entity_contents(
        &mut self,
        pubid: Option<&str>,
        sysid: Option<&str>,
        ndataid: Option<&str>,
    ) -> WriterResult {
        match self.nodes.front().map(|lk| lk.state.get()) {
            Some(XmlTextWriterState::XmlTextwriterDTDEnty) => {}
            Some(XmlTextWriterState::XmlTextwriterDTDPEnt) => {
                if ndataid.is_some() {
                    return Err(state_error(
                        XmlParserErrors::XmlErrInternalError,
                        "XmlTextWriter::write_dtd_external_entity_contents : notation not allowed with parameter entities!\n",
                    ));
                }
            }
            _ => {
                return Err(state_error(
                    XmlParserErrors::XmlErrInternalError,
                    "XmlTextWriter::write_dtd_external_entity_contents : you must call start_dtd_entity before the call to this function!\n",
                ));
            }
        }

        if pubid.is_some() && sysid.is_none() {
            return Err(argument_error(
                XmlParserErrors::XmlErrURIRequired,
                "XmlTextWriter::write_dtd_external_entity_contents : system identifier needed!\n",
            ));
        }

        let mut sum = self.write_external_id(pubid, sysid)?;
        if let Some(ndataid) = ndataid {
            sum += self.out.write_str(" NDATA ")?;
            sum += self.out.write_str(ndataid)?;
        }
        Ok(sum)
    }

    /// `PUBLIC "p" "s"`, `PUBLIC "p"` or `SYSTEM "s"`, each preceded by a space.
    fn write_external_id(&mut self, pubid: Option<&str>, sysid: Option<&str>) -> WriterResult {
        let mut sum = 0;
        if let Some(pubid) = pubid {
            sum += self.out.write_str(" PUBLIC ")?;
            sum += self.write_quoted(pubid)?;
        }

        if let Some(sysid) = sysid {
            if pubid.is_none() {
                sum += self.out.write_str(" SYSTEM")?;
            }
            sum += self.out.write_str(" ")?;
            sum += self.write_quoted(sysid)?;
        }
        Ok(sum)
    }

    /// End an xml DTD entity.
    #[doc(alias = "xmlTextWriterEndDTDEntity")]
    pub fn end_dtd_entity(&mut self) -> WriterResult {
        let Some(lk) = self.nodes.front().cloned() else {
            return Err(state_error(
                XmlParserErrors::XmlErrInternalError,
                "XmlTextWriter::end_dtd_entity : no DTD entity declaration is open!\n",
            ));
        };

        let mut sum = 0;
        match lk.state.get() {
            ty @ XmlTextWriterState::XmlTextwriterDTDEntyText
            | ty @ XmlTextWriterState::XmlTextwriterDTDEnty
            | ty @ XmlTextWriterState::XmlTextwriterDTDPEnt => {
                if matches!(ty, XmlTextWriterState::XmlTextwriterDTDEntyText) {
                    sum += self.write_quote()?;
                }
                sum += self.out.write_str(">")?;
            }
            _ => {
                return Err(state_error(
                    XmlParserErrors::XmlErrInternalError,
                    "XmlTextWriter::end_dtd_entity : no DTD entity declaration is open!\n",
                ));
            }
        }

        if self.indent {
            sum += self.out.write_str("\n")?;
        }
        self.nodes.pop_front();
        Ok(sum)
    }

    /// Write a DTD notation.
    ///
    /// Notations are only allowed inside a DOCTYPE.
    #[doc(alias = "xmlTextWriterWriteDTDNotation")]
    pub fn write_dtd_notation(
        &mut self,
        name: &str,
        pubid: Option<&str>,
        sysid: Option<&str>,
    ) -> WriterResult {
        if name.is_empty() {
            return Err(argument_error(
                XmlParserErrors::XmlErrNameRequired,
                "XmlTextWriter::write_dtd_notation : empty notation name!\n",
            ));
        }

        let mut sum = self.enter_internal_subset(
            "XmlTextWriter::write_dtd_notation : not allowed in this context!\n",
            false,
        )?;

        if self.indent {
            // The notation is not pushed, so indent one level deeper than the DOCTYPE.
            sum += self.write_indent()?;
            sum += self.out.write_str(&self.ichar)?;
        }

        sum += self.out.write_str("<!NOTATION ")?;
        sum += self.out.write_str(name)?;
        sum += self.write_external_id(pubid, sysid)?;
        sum += self.out.write_str(">")?;
        if self.indent {
            sum += self.out.write_str("\n")?;
        }
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use crate::{error::XmlWriterError, io::MemorySink, writer::XmlTextWriter};

    fn dtd(f: impl FnOnce(&mut XmlTextWriter)) -> String {
        let sink = MemorySink::new();
        {
            let mut writer = XmlTextWriter::from_writer(sink.clone());
            f(&mut writer);
        }
        String::from_utf8(sink.content()).unwrap()
    }

    #[test]
    fn test_internal_subset() {
        let out = dtd(|w| {
            w.write_dtd("person", None, None, Some("<!ELEMENT person (#PCDATA)>"))
                .unwrap();
        });
        assert_eq!(out, "<!DOCTYPE person [<!ELEMENT person (#PCDATA)>]>");
    }

    #[test]
    fn test_external_ids() {
        let out = dtd(|w| {
            w.write_dtd("html", None, Some("http://example.com/html.dtd"), None)
                .unwrap();
        });
        assert_eq!(out, "<!DOCTYPE html SYSTEM \"http://example.com/html.dtd\">");

        let out = dtd(|w| {
            w.write_dtd(
                "html",
                Some("-//W3C//DTD XHTML 1.0 Strict//EN"),
                Some("xhtml1-strict.dtd"),
                None,
            )
            .unwrap();
        });
        assert_eq!(
            out,
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \"xhtml1-strict.dtd\">"
        );

        dtd(|w| {
            assert!(matches!(
                w.start_dtd("html", Some("-//public"), None),
                Err(XmlWriterError::InvalidArgument(_))
            ));
        });
    }

    #[test]
    fn test_declarations() {
        let out = dtd(|w| {
            w.start_dtd("doc", None, None).unwrap();
            w.write_dtd_element("doc", "(item*)").unwrap();
            w.write_dtd_attlist("item", "id ID #REQUIRED").unwrap();
            w.write_dtd_entity(false, "copy", None, None, None, Some("(c)"))
                .unwrap();
            w.write_dtd_entity(true, "ext", None, Some("ext.ent"), None, None)
                .unwrap();
            w.write_dtd_entity(false, "pic", Some("-//pic"), Some("pic.gif"), Some("gif"), None)
                .unwrap();
            w.write_dtd_notation("gif", None, Some("image/gif")).unwrap();
            w.end_dtd().unwrap();
        });
        assert_eq!(
            out,
            concat!(
                "<!DOCTYPE doc [",
                "<!ELEMENT doc (item*)>",
                "<!ATTLIST item id ID #REQUIRED>",
                "<!ENTITY copy \"(c)\">",
                "<!ENTITY % ext SYSTEM \"ext.ent\">",
                "<!ENTITY pic PUBLIC \"-//pic\" \"pic.gif\" NDATA gif>",
                "<!NOTATION gif SYSTEM \"image/gif\">",
                "]>"
            )
        );
    }

    #[test]
    fn test_external_subset() {
        let out = dtd(|w| {
            w.write_dtd_element("doc", "(#PCDATA)").unwrap();
            w.write_dtd_internal_entity(false, "e", "v").unwrap();
            assert!(matches!(
                w.write_dtd_notation("gif", None, Some("image/gif")),
                Err(XmlWriterError::State(_))
            ));
            w.start_element("doc").unwrap();
            assert!(matches!(
                w.write_dtd_element("doc", "ANY"),
                Err(XmlWriterError::State(_))
            ));
            w.end_element().unwrap();
        });
        assert_eq!(out, "<!ELEMENT doc (#PCDATA)><!ENTITY e \"v\"><doc/>");
    }

    #[test]
    fn test_entity_argument_errors() {
        dtd(|w| {
            w.start_dtd("doc", None, None).unwrap();
            assert!(
                w.write_dtd_entity(false, "e", None, None, None, None)
                    .is_err()
            );
            assert!(
                w.write_dtd_entity(true, "e", None, Some("e.ent"), Some("n"), None)
                    .is_err()
            );
            assert!(w.write_dtd_external_entity_contents(None, Some("x"), None).is_err());
            w.start_dtd_entity(true, "pe").unwrap();
            assert!(
                w.write_dtd_external_entity_contents(None, Some("x"), Some("n"))
                    .is_err()
            );
            w.write_dtd_external_entity_contents(None, Some("pe.ent"), None)
                .unwrap();
            w.end_dtd().unwrap();
        });
    }

    #[test]
    fn test_end_dtd_closes_pending_declarations() {
        let out = dtd(|w| {
            w.start_dtd("doc", None, None).unwrap();
            w.start_dtd_element("doc").unwrap();
            w.write_string("EMPTY").unwrap();
            w.end_dtd().unwrap();
        });
        assert_eq!(out, "<!DOCTYPE doc [<!ELEMENT doc EMPTY>]>");
    }

    #[test]
    fn test_dtd_only_in_prolog() {
        dtd(|w| {
            w.start_element("root").unwrap();
            assert!(w.start_dtd("root", None, None).is_err());
            assert!(w.start_dtd_element("x").is_err());
            assert!(w.write_dtd_notation("n", None, Some("n")).is_err());
            assert!(w.end_dtd().is_err());
            w.end_element().unwrap();
        });
    }

    #[test]
    fn test_indented_dtd() {
        let out = dtd(|w| {
            w.set_indent(true);
            w.start_dtd("doc", Some("-//doc"), Some("doc.dtd")).unwrap();
            w.write_dtd_element("doc", "EMPTY").unwrap();
            w.end_dtd().unwrap();
        });
        assert_eq!(
            out,
            "<!DOCTYPE doc\nPUBLIC \"-//doc\"\n       \"doc.dtd\" [\n <!ELEMENT doc EMPTY>\n]>\n"
        );
    }
}
