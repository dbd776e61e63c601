//! Provide thread-local state shared by the writer, the I/O layer and the transcoder.
//!
//! This module is based on `libxml/globals.h`, `globals.c` and so on in `libxml2-v2.11.8`.
//! Only the error reporting part survives here.

use std::{borrow::Cow, cell::RefCell, io::Write};

use const_format::concatcp;

use crate::error::{XmlError, generic_error_default};

pub type GenericError = for<'a> fn(Option<&mut (dyn Write + 'static)>, &str);
pub type StructuredError = fn(&XmlError);

/// The library version, formatted as `major.minor.patch`.
pub const VERSION_STRING: &str = concatcp!(
    env!("CARGO_PKG_VERSION_MAJOR"),
    ".",
    env!("CARGO_PKG_VERSION_MINOR"),
    ".",
    env!("CARGO_PKG_VERSION_PATCH")
);

pub struct XmlGlobalState {
    pub(crate) writer_version: Cow<'static, str>,
    pub(crate) generic_error: GenericError,
    pub(crate) generic_error_context: Option<Box<dyn Write>>,
    pub(crate) structured_error: Option<StructuredError>,
    pub(crate) last_error: XmlError,
}

impl XmlGlobalState {
    fn new() -> Self {
        Self {
            writer_version: Cow::Borrowed(VERSION_STRING),
            generic_error: generic_error_default,
            generic_error_context: None,
            structured_error: None,
            last_error: XmlError::default(),
        }
    }
}

thread_local! {
    pub static GLOBAL_STATE: RefCell<XmlGlobalState> = RefCell::new(XmlGlobalState::new());
}

/// Set new generic error function and generic error context.
///
/// If `func` is `None`, set `generic_error_default`.
/// If `context` is `None`, current context is clear and no context is set.
pub fn set_generic_error(func: Option<GenericError>, context: Option<impl Write + 'static>) {
    GLOBAL_STATE.with_borrow_mut(|state| {
        state.generic_error = func.unwrap_or(generic_error_default);
        state.generic_error_context = context.map(|context| {
            let boxed: Box<dyn Write + 'static> = Box::new(context);
            boxed
        });
    });
}

/// Set new structured error function.
///
/// While a structured handler is set, the generic handler is not called.
#[doc(alias = "xmlSetStructuredErrorFunc")]
pub fn set_structured_error(func: Option<StructuredError>) {
    GLOBAL_STATE.with_borrow_mut(|state| state.structured_error = func);
}

/// Get the last error raised on this thread.
///
/// If no error has been raised, the returned error has `XmlErrOK` as its code.
#[doc(alias = "xmlGetLastError")]
pub fn get_last_error() -> XmlError {
    GLOBAL_STATE.with_borrow(|state| state.last_error.clone())
}

/// Cleanup the last global error registered.
#[doc(alias = "xmlResetLastError")]
pub fn reset_last_error() {
    GLOBAL_STATE.with_borrow_mut(|state| state.last_error.reset());
}

/// Get the version string of this library.
pub fn writer_version() -> Cow<'static, str> {
    GLOBAL_STATE.with_borrow(|state| state.writer_version.clone())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::error::{__xml_raise_error, XmlErrorDomain, XmlErrorLevel, XmlParserErrors};

    #[derive(Clone, Default)]
    struct Collector(Rc<RefCell<Vec<u8>>>);

    impl Write for Collector {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_version_string() {
        assert_eq!(VERSION_STRING, env!("CARGO_PKG_VERSION"));
        assert_eq!(writer_version(), VERSION_STRING);
    }

    #[test]
    fn test_generic_error_context() {
        let collector = Collector::default();
        set_generic_error(None, Some(collector.clone()));
        __xml_raise_error(
            XmlErrorDomain::XmlFromIO,
            XmlParserErrors::XmlIOWrite,
            XmlErrorLevel::XmlErrError,
            None,
            "write error\n",
        );
        let msg = String::from_utf8(collector.0.borrow().clone()).unwrap();
        assert_eq!(msg, "I/O error : write error\n");
        set_generic_error(None, None::<Collector>);
        reset_last_error();
        assert!(get_last_error().is_ok());
    }
}
