//! Provide methods and data structures for error handling.
//! This module is based on `libxml/xmlerror.h`, `error.c`, and so on in `libxml2-v2.11.8`.
//!
//! Please refer to original libxml2 documents also.

use std::{
    borrow::Cow,
    collections::TryReserveError,
    fmt::{self, Display},
    io::{self, Write},
};

use crate::{encoding::EncodingError, globals::GLOBAL_STATE};

/// The part of the library that raised the error.
#[doc(alias = "xmlErrorDomain")]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlErrorDomain {
    #[default]
    XmlFromNone = 0,
    XmlFromTree = 2,
    XmlFromIO = 8,
    XmlFromDTD = 4,
    XmlFromI18N = 27,
    XmlFromWriter = 25,
}

impl Display for XmlErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::XmlFromNone => "",
            Self::XmlFromTree => "tree ",
            Self::XmlFromIO => "I/O ",
            Self::XmlFromDTD => "validity ",
            Self::XmlFromI18N => "encoding ",
            Self::XmlFromWriter => "writer ",
        };
        write!(f, "{name}")
    }
}

/// Indicates the level of an error.
#[doc(alias = "xmlErrorLevel")]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum XmlErrorLevel {
    #[default]
    XmlErrNone = 0,
    /// A simple warning
    XmlErrWarning = 1,
    /// A recoverable error
    XmlErrError = 2,
    /// A fatal error
    XmlErrFatal = 3,
}

/**
 * xmlParserError:
 *
 * This is an error that the writer, the I/O layer or the transcoder can generate.
 */
macro_rules! impl_xml_parser_errors {
    ( $( $variant:ident $( = $default:literal )? ),* ) => {
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum XmlParserErrors {
            $(
                $variant $( = $default )?
            ),*
        }

        impl TryFrom<i32> for XmlParserErrors {
            type Error = anyhow::Error;
            fn try_from(value: i32) -> Result<Self, Self::Error> {
                $(
                    if value == Self:: $variant as i32 {
                        return Ok(Self:: $variant);
                    }
                )*
                Err(anyhow::anyhow!("Invalid convert from value '{value}' to {}", std::any::type_name::<Self>()))
            }
        }

        impl Default for XmlParserErrors {
            fn default() -> Self {
                Self::XmlErrOK
            }
        }
    };
}
impl_xml_parser_errors!(
    XmlErrOK = 0,
    XmlErrInternalError,       /* 1 */
    XmlErrNoMemory,            /* 2 */
    XmlErrDocumentStart,       /* 3 */
    XmlErrDocumentEmpty,       /* 4 */
    XmlErrDocumentEnd,         /* 5 */
    XmlErrUnsupportedEncoding = 32,
    XmlErrAttributeRedefined = 42,
    XmlErrReservedXmlName = 64,
    XmlErrNameRequired = 68,
    XmlErrURIRequired = 70,
    XmlErrTagNameMismatch = 76,
    XmlErrTagNotFinished,      /* 77 */
    XmlErrStandaloneValue,     /* 78 */
    XmlNsErrUndefinedNamespace = 201,
    XmlDTDUnknownElem = 530,
    XmlIOUnknown = 1500,
    XmlIOEACCES,               /* 1501 */
    XmlIOEAGAIN,               /* 1502 */
    XmlIOEBADF,                /* 1503 */
    XmlIOEEXIST = 1510,
    XmlIOEINTR = 1514,
    XmlIOEINVAL,               /* 1515 */
    XmlIOEIO,                  /* 1516 */
    XmlIOEISDIR,               /* 1517 */
    XmlIOENOENT = 1524,
    XmlIOENOSPC = 1528,
    XmlIOENOTDIR = 1530,
    XmlIOENOTSUP = 1532,
    XmlIOEPIPE = 1536,
    XmlIOETIMEDOUT = 1541,
    XmlIOEncoder = 1544,
    XmlIOFlush,                /* 1545 */
    XmlIOWrite,                /* 1546 */
    XmlIONoInput,              /* 1547 */
    XmlIOBufferFull,           /* 1548 */
    XmlI18NNoName = 6000,
    XmlI18NNoHandler,          /* 6001 */
    XmlI18NExcessHandler,      /* 6002 */
    XmlI18NConvFailed,         /* 6003 */
    XmlI18NNoOutput            /* 6004 */
);

impl XmlParserErrors {
    pub fn is_ok(&self) -> bool {
        *self == Self::XmlErrOK
    }

    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

/// An error record, as stored in the thread's last error slot
/// and passed to structured error handlers.
#[doc(alias = "xmlError")]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlError {
    pub domain: XmlErrorDomain,
    pub code: XmlParserErrors,
    pub message: Option<Cow<'static, str>>,
    pub level: XmlErrorLevel,
    pub file: Option<Cow<'static, str>>,
    pub str1: Option<Cow<'static, str>>,
}

impl XmlError {
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    pub fn is_err(&self) -> bool {
        self.code.is_err()
    }

    /// Cleanup the error.
    #[doc(alias = "xmlResetError")]
    pub fn reset(&mut self) {
        if self.code.is_ok() {
            return;
        }
        *self = Self::default();
    }
}

impl Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = self.file.as_deref() {
            write!(f, "{file}: ")?;
        }
        let level = match self.level {
            XmlErrorLevel::XmlErrNone => "",
            XmlErrorLevel::XmlErrWarning => "warning : ",
            XmlErrorLevel::XmlErrError => "error : ",
            XmlErrorLevel::XmlErrFatal => "error : ",
        };
        write!(f, "{}{level}", self.domain)?;
        match self.message.as_deref() {
            Some(msg) if msg.ends_with('\n') => write!(f, "{msg}"),
            Some(msg) => writeln!(f, "{msg}"),
            None => writeln!(f, "No error message provided"),
        }
    }
}

/// Default handler for out of context error messages.
#[doc(alias = "xmlGenericErrorDefaultFunc")]
pub fn generic_error_default(out: Option<&mut (dyn Write + 'static)>, msg: &str) {
    if let Some(out) = out {
        write!(out, "{msg}").ok();
    } else {
        eprint!("{msg}");
    }
}

/// Update the thread's last error and forward it to the structured handler,
/// or to the generic handler if no structured handler is registered.
#[doc(alias = "__xmlRaiseError")]
pub(crate) fn __xml_raise_error(
    domain: XmlErrorDomain,
    code: XmlParserErrors,
    level: XmlErrorLevel,
    str1: Option<&str>,
    msg: &str,
) {
    if code.is_ok() {
        return;
    }
    let error = XmlError {
        domain,
        code,
        message: Some(Cow::Owned(msg.to_owned())),
        level,
        file: None,
        str1: str1.map(|s| Cow::Owned(s.to_owned())),
    };
    let (structured, generic, mut context) = GLOBAL_STATE.with_borrow_mut(|state| {
        state.last_error = error.clone();
        (
            state.structured_error,
            state.generic_error,
            state.generic_error_context.take(),
        )
    });
    // The handlers run outside of the borrow so that they may query the global state.
    if let Some(handler) = structured {
        handler(&error);
    } else {
        generic(context.as_deref_mut(), &error.to_string());
    }
    if let Some(context) = context {
        GLOBAL_STATE.with_borrow_mut(|state| {
            state.generic_error_context.get_or_insert(context);
        });
    }
}

/// Errors returned by the strict writer API.
///
/// The boolean facade (`XmlWriter`) collapses all of these into `false`,
/// except when constructing a sink.
#[derive(Debug)]
pub enum XmlWriterError {
    /// The call is illegal in the current writer state,
    /// e.g. ending an attribute when none is open.
    State(Cow<'static, str>),
    /// An argument is malformed (empty name, bad quote character, ...).
    InvalidArgument(Cow<'static, str>),
    /// Transcoding into the output encoding failed.
    Encoding(EncodingError),
    /// The underlying sink failed.
    Io(io::Error),
    /// The output buffer could not be allocated.
    Allocation(TryReserveError),
    /// The tree sink could not rebuild a document from the output.
    Tree(Cow<'static, str>),
    /// The writer was already closed.
    Closed,
}

impl Display for XmlWriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(msg) => write!(f, "illegal writer state: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Encoding(e) => write!(f, "encoding error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Allocation(e) => write!(f, "allocation error: {e}"),
            Self::Tree(msg) => write!(f, "tree error: {msg}"),
            Self::Closed => write!(f, "the writer is already closed"),
        }
    }
}

impl std::error::Error for XmlWriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encoding(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Allocation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for XmlWriterError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodingError> for XmlWriterError {
    fn from(value: EncodingError) -> Self {
        Self::Encoding(value)
    }
}

impl From<TryReserveError> for XmlWriterError {
    fn from(value: TryReserveError) -> Self {
        Self::Allocation(value)
    }
}
