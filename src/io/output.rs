use std::io::{self, Write};

use crate::{
    encoding::{EncodingError, XmlCharEncodingHandler, xml_encoding_err},
    error::XmlParserErrors,
};

use super::{MINLEN, open_output_file, xml_ioerr};

/// A buffered output channel with optional transcoding.
///
/// Text is accumulated as UTF-8 in `buffer`. If an encoder is set, it is converted
/// into `conv` before being handed to `context`.
pub struct XmlOutputBuffer<'a> {
    context: Box<dyn Write + 'a>,
    encoder: Option<XmlCharEncodingHandler>,
    buffer: String,
    conv: Vec<u8>,
    written: usize,
    error: XmlParserErrors,
}

impl<'a> XmlOutputBuffer<'a> {
    /// Create a buffered output writing into `writer`.
    #[doc(alias = "xmlOutputBufferCreateIO")]
    pub fn from_writer(writer: impl Write + 'a) -> Self {
        Self {
            context: Box::new(writer),
            encoder: None,
            buffer: String::with_capacity(MINLEN),
            conv: vec![],
            written: 0,
            error: XmlParserErrors::XmlErrOK,
        }
    }

    /// Create a buffered output for the progressive saving of a file.
    ///
    /// If `uri` is `"-"` then we use stdout as the output.
    #[doc(alias = "xmlOutputBufferCreateFilename")]
    pub fn from_uri(uri: &str) -> io::Result<Self> {
        let file = open_output_file(uri)?;
        Ok(Self::from_writer(file))
    }

    /// Set the encoder used for the following output.
    ///
    /// A UTF-8 handler is dropped because no conversion is needed.
    /// Encoders that need initialization (e.g. a byte order mark) emit it now.
    pub fn set_encoder(&mut self, encoder: XmlCharEncodingHandler) -> Result<(), EncodingError> {
        if encoder.is_utf8() {
            self.encoder = None;
            return Ok(());
        }
        self.encoder = Some(encoder);
        self.encode_init()
    }

    pub fn encoder(&self) -> Option<&XmlCharEncodingHandler> {
        self.encoder.as_ref()
    }

    /// Total number of bytes handed to the underlying writer.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn error(&self) -> XmlParserErrors {
        self.error
    }

    fn encode_init(&mut self) -> Result<(), EncodingError> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };
        let mut dst = [0u8; 8];
        match encoder.encode("", &mut dst) {
            Ok((_, write)) => {
                self.conv.extend_from_slice(&dst[..write]);
                Ok(())
            }
            // Stateless encoders have nothing to initialize.
            Err(EncodingError::BufferTooShort) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Convert the whole pending buffer into the output encoding.
    ///
    /// Characters the encoding cannot represent are written as character references.
    /// Returns the number of bytes appended to the conversion buffer.
    #[doc(alias = "xmlCharEncOutput")]
    fn encode(&mut self) -> Result<usize, EncodingError> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(0);
        };
        let mut writtentot = 0;
        let mut read_total = 0;
        let mut dst = vec![0u8; self.buffer.len().clamp(16, 64 * 1024) * 4];
        while read_total < self.buffer.len() {
            let src = &self.buffer[read_total..];
            match encoder.encode(src, &mut dst) {
                Ok((read, write)) => {
                    self.conv.extend_from_slice(&dst[..write]);
                    writtentot += write;
                    read_total += read;
                    if read == 0 {
                        dst.resize(dst.len() * 2, 0);
                    }
                }
                Err(EncodingError::BufferTooShort) => {
                    dst.resize(dst.len() * 2, 0);
                }
                Err(EncodingError::Unmappable { read, write, c }) => {
                    self.conv.extend_from_slice(&dst[..write]);
                    writtentot += write;
                    read_total += read;

                    let charref = format!("&#{};", c as u32);
                    let mut refbuf = [0u8; 64];
                    match encoder.encode(&charref, &mut refbuf) {
                        Ok((read, write)) if read == charref.len() => {
                            self.conv.extend_from_slice(&refbuf[..write]);
                            writtentot += write;
                        }
                        _ => {
                            let msg = format!("U+{:04X}", c as u32);
                            xml_encoding_err(
                                XmlParserErrors::XmlI18NConvFailed,
                                &format!(
                                    "output conversion failed due to conv error, bytes {msg}\n"
                                ),
                                &msg,
                            );
                            self.buffer.drain(..read_total);
                            return Err(EncodingError::Unmappable { read, write, c });
                        }
                    }
                }
                Err(e) => {
                    self.buffer.drain(..read_total);
                    return Err(e);
                }
            }
        }
        self.buffer.clear();
        Ok(writtentot)
    }

    /// Hand the converted bytes to the underlying writer.
    ///
    /// A writer accepting zero bytes is treated as closed and the pending bytes are dropped.
    fn push_to_context(&mut self) -> io::Result<usize> {
        let pending = if self.encoder.is_some() {
            std::mem::take(&mut self.conv)
        } else {
            std::mem::take(&mut self.buffer).into_bytes()
        };
        let mut sent = 0;
        while sent < pending.len() {
            match self.context.write(&pending[sent..]) {
                Ok(0) => break,
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    xml_ioerr(XmlParserErrors::XmlIOWrite, Some(&e), None);
                    self.error = XmlParserErrors::XmlIOWrite;
                    return Err(e);
                }
            }
        }
        if self.encoder.is_none() && self.buffer.capacity() < MINLEN {
            self.buffer.reserve(MINLEN);
        }
        self.written = self.written.saturating_add(sent);
        Ok(sent)
    }

    fn check_error(&self) -> io::Result<()> {
        if self.error.is_ok() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "output buffer is in error state: {:?}",
                self.error
            )))
        }
    }

    /// Write the content of the string in the output I/O buffer.
    /// This routine handle the I18N transcoding from internal UTF-8.
    /// The buffer is lossless, i.e. will store in case of partial or delayed writes.
    ///
    /// Returns the number of bytes accepted, that is, `s.len()`.
    #[doc(alias = "xmlOutputBufferWriteString")]
    pub fn write_str(&mut self, s: &str) -> io::Result<usize> {
        self.check_error()?;
        self.buffer.push_str(s);
        if self.buffer.len() >= MINLEN {
            if self.encoder.is_some() {
                if let Err(e) = self.encode() {
                    xml_ioerr(XmlParserErrors::XmlIOEncoder, None, Some(&e.to_string()));
                    self.error = XmlParserErrors::XmlIOEncoder;
                    return Err(io::Error::new(io::ErrorKind::InvalidData, e));
                }
            }
            self.push_to_context()?;
        }
        Ok(s.len())
    }

    /// flushes the output I/O channel
    ///
    /// Returns the number of byte written to the underlying writer.
    #[doc(alias = "xmlOutputBufferFlush")]
    pub fn flush(&mut self) -> io::Result<usize> {
        self.check_error()?;
        if let Err(e) = self.encode() {
            xml_ioerr(XmlParserErrors::XmlIOEncoder, None, Some(&e.to_string()));
            self.error = XmlParserErrors::XmlIOEncoder;
            return Err(io::Error::new(io::ErrorKind::InvalidData, e));
        }
        let sent = self.push_to_context()?;
        if let Err(e) = self.context.flush() {
            xml_ioerr(XmlParserErrors::XmlIOFlush, Some(&e), None);
            self.error = XmlParserErrors::XmlIOFlush;
            return Err(e);
        }
        Ok(sent)
    }
}

impl Drop for XmlOutputBuffer<'_> {
    /// flush and close the output I/O channel
    #[doc(alias = "xmlOutputBufferClose")]
    fn drop(&mut self) {
        if self.error.is_ok() {
            self.flush().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encoding::{XmlCharEncoding, get_encoding_handler},
        io::MemorySink,
    };

    #[test]
    fn test_buffering_and_flush() {
        let sink = MemorySink::new();
        let mut out = XmlOutputBuffer::from_writer(sink.clone());
        assert_eq!(out.write_str("<a/>").unwrap(), 4);
        assert!(sink.is_empty());
        assert_eq!(out.flush().unwrap(), 4);
        assert_eq!(sink.content(), b"<a/>");
        assert_eq!(out.written(), 4);
    }

    #[test]
    fn test_large_write_is_pushed() {
        let sink = MemorySink::new();
        let mut out = XmlOutputBuffer::from_writer(sink.clone());
        let text = "x".repeat(MINLEN + 1);
        out.write_str(&text).unwrap();
        assert_eq!(sink.len(), MINLEN + 1);
    }

    #[test]
    fn test_unmappable_becomes_charref() {
        let sink = MemorySink::new();
        {
            let mut out = XmlOutputBuffer::from_writer(sink.clone());
            out.set_encoder(get_encoding_handler(XmlCharEncoding::ASCII).unwrap())
                .unwrap();
            out.write_str("caf\u{e9}").unwrap();
        }
        assert_eq!(sink.content(), b"caf&#233;");
    }

    #[test]
    fn test_utf16_bom() {
        let sink = MemorySink::new();
        {
            let mut out = XmlOutputBuffer::from_writer(sink.clone());
            out.set_encoder(get_encoding_handler(XmlCharEncoding::UTF16LE).unwrap())
                .unwrap();
            out.write_str("<").unwrap();
        }
        assert_eq!(sink.content(), &[0xFF, 0xFE, b'<', 0x00]);
    }
}
