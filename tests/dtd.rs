//! DOCTYPE and internal subset construction.

use exml_writer::{
    Flushed, XmlTextWriter, XmlWriter, XmlWriterError, error::XmlError,
    globals::set_structured_error, io::MemorySink,
};

fn quiet() {
    fn ignore(_: &XmlError) {}
    set_structured_error(Some(ignore));
}

fn content(writer: &mut XmlWriter) -> String {
    match writer.flush(true) {
        Ok(Flushed::Content(content)) => content,
        other => panic!("unexpected flush result: {other:?}"),
    }
}

#[test]
fn doctype_forms() {
    let mut writer = XmlWriter::string().unwrap();
    assert!(writer.write_dtd("person", None, None, Some("<!ELEMENT person (#PCDATA)>")));
    assert_eq!(
        content(&mut writer),
        "<!DOCTYPE person [<!ELEMENT person (#PCDATA)>]>"
    );

    let mut writer = XmlWriter::string().unwrap();
    assert!(writer.write_dtd(
        "docbook",
        None,
        Some("http://www.oasis-open.org/docbook/xml/4.5/docbookx.dtd"),
        None
    ));
    assert_eq!(
        content(&mut writer),
        "<!DOCTYPE docbook SYSTEM \"http://www.oasis-open.org/docbook/xml/4.5/docbookx.dtd\">"
    );

    let mut writer = XmlWriter::string().unwrap();
    assert!(writer.write_dtd(
        "html",
        Some("-//W3C//DTD XHTML 1.0 Strict//EN"),
        Some("http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd"),
        None
    ));
    assert_eq!(
        content(&mut writer),
        concat!(
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" ",
            "\"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">"
        )
    );
}

#[test]
fn incremental_declarations() {
    let mut writer = XmlWriter::string().unwrap();
    assert!(writer.start_dtd("catalog", None, None));
    assert!(writer.start_dtd_element("catalog"));
    assert!(writer.write_string("(book+)"));
    assert!(writer.end_dtd_element());
    assert!(writer.start_dtd_attlist("book"));
    assert!(writer.write_raw("id ID #REQUIRED"));
    assert!(writer.end_dtd_attlist());
    assert!(writer.start_dtd_entity("publisher", false));
    assert!(writer.write_string("ACME & Sons"));
    assert!(writer.end_dtd_entity());
    assert!(writer.start_dtd_entity("chapters", true));
    assert!(writer.write_dtd_external_entity_contents(None, Some("chapters.ent"), None));
    assert!(writer.end_dtd_entity());
    assert!(writer.end_dtd());
    assert!(writer.write_element("catalog", None));
    assert_eq!(
        content(&mut writer),
        concat!(
            "<!DOCTYPE catalog [<!ELEMENT catalog (book+)>",
            "<!ATTLIST book id ID #REQUIRED>",
            "<!ENTITY publisher \"ACME & Sons\">",
            "<!ENTITY % chapters SYSTEM \"chapters.ent\">]>",
            "<catalog/>"
        )
    );
}

#[test]
fn atomic_declarations() {
    let mut writer = XmlWriter::string().unwrap();
    assert!(writer.start_dtd("doc", None, None));
    assert!(writer.write_dtd_element("doc", "(p*)"));
    assert!(writer.write_dtd_attlist("p", "align (left|right) \"left\""));
    assert!(writer.write_dtd_internal_entity("me", "Jane", false));
    assert!(writer.write_dtd_external_entity(
        "logo",
        Some("-//logo"),
        Some("logo.png"),
        Some("png"),
        false
    ));
    assert!(writer.write_dtd_entity("ext", None, Some("ext.ent"), None, None, true));
    assert!(writer.write_dtd_notation("png", None, Some("image/png")));
    assert!(writer.end_dtd());
    assert_eq!(
        content(&mut writer),
        concat!(
            "<!DOCTYPE doc [<!ELEMENT doc (p*)>",
            "<!ATTLIST p align (left|right) \"left\">",
            "<!ENTITY me \"Jane\">",
            "<!ENTITY logo PUBLIC \"-//logo\" \"logo.png\" NDATA png>",
            "<!ENTITY % ext SYSTEM \"ext.ent\">",
            "<!NOTATION png SYSTEM \"image/png\">]>"
        )
    );
}

#[test]
fn declarations_need_an_open_doctype() {
    quiet();
    let mut writer = XmlWriter::string().unwrap();
    assert!(!writer.write_dtd_notation("png", None, Some("image/png")));
    assert!(!writer.end_dtd());
    assert!(writer.start_element("root"));
    assert!(!writer.start_dtd("root", None, None));
    assert!(!writer.write_dtd_element("root", "ANY"));
    assert!(!writer.end_dtd_element());
    assert!(writer.end_element());
    assert_eq!(content(&mut writer), "<root/>");
}

#[test]
fn end_dtd_closes_pending_declarations() {
    let sink = MemorySink::new();
    {
        let mut writer = XmlTextWriter::from_writer(sink.clone());
        writer.start_dtd("a", None, None).unwrap();
        writer.start_dtd_attlist("a").unwrap();
        writer.write_string("x CDATA #IMPLIED").unwrap();
        writer.end_dtd().unwrap();
        assert_eq!(writer.depth(), 0);
        assert!(matches!(writer.end_dtd(), Err(XmlWriterError::State(_))));
        writer.flush().unwrap();
    }
    assert_eq!(
        String::from_utf8(sink.content()).unwrap(),
        "<!DOCTYPE a [<!ATTLIST a x CDATA #IMPLIED>]>"
    );
}

#[test]
fn entity_arguments_are_checked() {
    quiet();
    let mut writer = XmlWriter::string().unwrap();
    assert!(writer.start_dtd("a", None, None));
    assert!(!writer.write_dtd_entity("e", None, None, None, None, false));
    assert!(!writer.write_dtd_external_entity("e", None, Some("e.ent"), Some("gif"), true));
    assert!(!writer.write_dtd_external_entity("e", Some("-//e"), None, None, false));
    assert!(writer.end_dtd());
    assert_eq!(content(&mut writer), "<!DOCTYPE a>");
}

#[test]
fn entity_values_escape_the_quote_character() {
    let mut writer = XmlWriter::string().unwrap();
    assert!(writer.start_dtd("a", None, None));
    assert!(writer.write_dtd_internal_entity("q", r#"say "hi""#, false));
    assert!(writer.start_dtd_entity("r", true));
    assert!(writer.write_string("it's \"x\""));
    assert!(writer.end_dtd_entity());
    assert!(writer.end_dtd());
    assert_eq!(
        content(&mut writer),
        r#"<!DOCTYPE a [<!ENTITY q "say &#34;hi&#34;"><!ENTITY % r "it's &#34;x&#34;">]>"#
    );

    let mut writer = XmlWriter::string().unwrap();
    assert!(writer.set_quote_char('\''));
    assert!(writer.start_dtd("a", None, None));
    assert!(writer.write_dtd_internal_entity("q", r#"it's "x""#, false));
    assert!(writer.end_dtd());
    assert_eq!(
        content(&mut writer),
        r#"<!DOCTYPE a [<!ENTITY q 'it&#39;s "x"'>]>"#
    );
}

#[cfg(feature = "libxml_tree")]
#[test]
fn dtd_object_round_trip() {
    use exml_writer::tree::{Dtd, DtdDeclaration};

    let dtd = Dtd::from_doctype(
        r#"note SYSTEM "note.dtd" [
<!ELEMENT note (to, body)>
<!ENTITY sig "-- J.">
<!NOTATION txt PUBLIC "-//txt">
]"#,
    )
    .unwrap();
    assert_eq!(dtd.name(), Some("note"));
    assert_eq!(dtd.system_id(), Some("note.dtd"));
    assert_eq!(dtd.internal_subset().map(|subset| subset.len()), Some(3));

    let sink = MemorySink::new();
    {
        let mut writer = XmlTextWriter::from_writer(sink.clone());
        dtd.write_to(&mut writer).unwrap();
        writer.flush().unwrap();
    }
    let written = String::from_utf8(sink.content()).unwrap();
    assert_eq!(
        written,
        concat!(
            "<!DOCTYPE note SYSTEM \"note.dtd\" [<!ELEMENT note (to, body)>",
            "<!ENTITY sig \"-- J.\">",
            "<!NOTATION txt PUBLIC \"-//txt\">]>"
        )
    );

    let inner = written
        .strip_prefix("<!DOCTYPE")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap();
    let reparsed = Dtd::from_doctype(inner).unwrap();
    assert_eq!(reparsed, dtd);
    assert!(matches!(
        reparsed.internal_subset().unwrap()[2],
        DtdDeclaration::Notation { .. }
    ));
}
