//! A streaming XML writer based on the `xmlwriter` module of libxml2.
//!
//! [`XmlTextWriter`] is the strict writer: every call returns a [`Result`]
//! and the state machine rejects calls that would produce malformed output.
//! [`XmlWriter`] wraps it behind a memory, file, stream or document sink
//! and reports success as a plain `bool`.
//!
//! ```
//! use exml_writer::XmlTextWriter;
//! use exml_writer::io::MemorySink;
//!
//! let sink = MemorySink::new();
//! let mut writer = XmlTextWriter::from_writer(sink.clone());
//! writer.start_element("greeting").unwrap();
//! writer.write_attribute("lang", Some("en")).unwrap();
//! writer.write_string("hello & bye").unwrap();
//! writer.end_element().unwrap();
//! writer.flush().unwrap();
//! assert_eq!(
//!     String::from_utf8(sink.content()).unwrap(),
//!     r#"<greeting lang="en">hello &amp; bye</greeting>"#
//! );
//! ```

#![allow(clippy::too_many_arguments)]
#![warn(unused_mut)]
#![warn(unused_imports)]
#![warn(unused_variables)]

pub mod encoding;
pub mod error;
pub mod globals;
pub mod io;
#[cfg(feature = "libxml_tree")]
pub mod tree;
pub mod writer;
pub mod xml_writer;

pub use encoding::XmlCharEncoding;
pub use error::XmlWriterError;
pub use writer::{WriterResult, XmlDocumentState, XmlTextWriter};
pub use xml_writer::{Flushed, StartDocumentOptions, WriterOutput, XmlWriter};
