//! Provide methods and data structures for transcoding the writer output.
//!
//! This module is based on `libxml/encoding.h`, `encoding.c`, and so on in `libxml2-v2.11.8`.
//! Please refer to original libxml2 documents also.

// Copyright of the original code is the following.
// --------
// Summary: interface for the encoding conversion functions
// Description: interface for the encoding conversion functions needed for
//              XML basic encoding and iconv() support.
//
// Related specs are
// rfc2044        (UTF-8 and UTF-16) F. Yergeau Alis Technologies
// [ISO-10646]    UTF-8 and UTF-16 in Annexes
// [ISO-8859-1]   ISO Latin-1 characters codes.
// [UNICODE]      The Unicode Consortium, "The Unicode Standard --
//                Worldwide Character Encoding -- Version 1.0", Addison-
//                Wesley, Volume 1, 1991, Volume 2, 1992.  UTF-8 is
//                described in Unicode Technical Report #4.
// [US-ASCII]     Coded Character Set--7-bit American Standard Code for
//                Information Interchange, ANSI X3.4-1986.
//
// Copy: See Copyright for the status of this software.
//
// Author: Daniel Veillard
// -------
// encoding.c : implements the encoding conversion functions needed for XML
//
// See Copyright for the status of this software.
//
// daniel@veillard.com
//
// Original code for IsoLatin1 and UTF-16 by "Martin J. Duerst" <duerst@w3.org>

use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt::Display,
    str::FromStr,
    sync::{Mutex, RwLock},
};

#[cfg(feature = "libxml_iso8859x")]
use encoding_rs::{
    ISO_8859_2, ISO_8859_3, ISO_8859_4, ISO_8859_5, ISO_8859_6, ISO_8859_7, ISO_8859_8,
    ISO_8859_10, ISO_8859_13, ISO_8859_14, ISO_8859_15, ISO_8859_16, WINDOWS_1254,
};
use encoding_rs::{
    Decoder, DecoderResult, EUC_JP, Encoder, EncoderResult, Encoding, ISO_2022_JP, SHIFT_JIS,
    mem::{convert_utf8_to_latin1_lossy, decode_latin1 as decode_latin1_to_str, str_latin1_up_to},
};

use crate::error::{__xml_raise_error, XmlErrorDomain, XmlErrorLevel, XmlParserErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlCharEncoding {
    Error = -1,
    None = 0,
    UTF8,
    UTF16LE,
    UTF16BE,
    UCS4LE,
    UCS4BE,
    ISO8859_1,
    ISO8859_2,
    ISO8859_3,
    ISO8859_4,
    ISO8859_5,
    ISO8859_6,
    ISO8859_7,
    ISO8859_8,
    ISO8859_9,
    ISO8859_10,
    ISO8859_13,
    ISO8859_14,
    ISO8859_15,
    ISO8859_16,
    ISO2022JP,
    ShiftJIS,
    EUCJP,
    ASCII,
}

impl XmlCharEncoding {
    /// The canonical name of this encoding, as written in an XML declaration.
    pub fn get_name(&self) -> Option<&'static str> {
        match *self {
            Self::UTF8 => Some("UTF-8"),
            Self::UTF16LE => Some("UTF-16"),
            Self::UTF16BE => Some("UTF-16"),
            Self::UCS4LE => Some("ISO-10646-UCS-4"),
            Self::UCS4BE => Some("ISO-10646-UCS-4"),
            Self::ISO8859_1 => Some("ISO-8859-1"),
            Self::ISO8859_2 => Some("ISO-8859-2"),
            Self::ISO8859_3 => Some("ISO-8859-3"),
            Self::ISO8859_4 => Some("ISO-8859-4"),
            Self::ISO8859_5 => Some("ISO-8859-5"),
            Self::ISO8859_6 => Some("ISO-8859-6"),
            Self::ISO8859_7 => Some("ISO-8859-7"),
            Self::ISO8859_8 => Some("ISO-8859-8"),
            Self::ISO8859_9 => Some("ISO-8859-9"),
            Self::ISO8859_10 => Some("ISO-8859-10"),
            Self::ISO8859_13 => Some("ISO-8859-13"),
            Self::ISO8859_14 => Some("ISO-8859-14"),
            Self::ISO8859_15 => Some("ISO-8859-15"),
            Self::ISO8859_16 => Some("ISO-8859-16"),
            Self::ISO2022JP => Some("ISO-2022-JP"),
            Self::ShiftJIS => Some("Shift-JIS"),
            Self::EUCJP => Some("EUC-JP"),
            Self::ASCII => Some("ASCII"),
            Self::Error | Self::None => None,
        }
    }
}

impl FromStr for XmlCharEncoding {
    type Err = EncodingError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let name = get_encoding_alias(name).unwrap_or_else(|| name.to_uppercase());
        match name.as_str() {
            "" => Ok(Self::None),
            "UTF-8" | "UTF8" => Ok(Self::UTF8),
            "UTF-16" | "UTF16" | "UTF-16LE" => Ok(Self::UTF16LE),
            "UTF-16BE" => Ok(Self::UTF16BE),
            "ISO-10646-UCS-4" | "UCS-4" | "UCS4" | "UCS-4BE" => Ok(Self::UCS4BE),
            "UCS-4LE" => Ok(Self::UCS4LE),
            "ISO-8859-1" | "ISO-LATIN-1" | "ISO LATIN 1" | "LATIN1" => Ok(Self::ISO8859_1),
            "ISO-8859-2" | "ISO-LATIN-2" | "ISO LATIN 2" => Ok(Self::ISO8859_2),
            "ISO-8859-3" => Ok(Self::ISO8859_3),
            "ISO-8859-4" => Ok(Self::ISO8859_4),
            "ISO-8859-5" => Ok(Self::ISO8859_5),
            "ISO-8859-6" => Ok(Self::ISO8859_6),
            "ISO-8859-7" => Ok(Self::ISO8859_7),
            "ISO-8859-8" => Ok(Self::ISO8859_8),
            "ISO-8859-9" => Ok(Self::ISO8859_9),
            "ISO-8859-10" => Ok(Self::ISO8859_10),
            "ISO-8859-13" => Ok(Self::ISO8859_13),
            "ISO-8859-14" => Ok(Self::ISO8859_14),
            "ISO-8859-15" => Ok(Self::ISO8859_15),
            "ISO-8859-16" => Ok(Self::ISO8859_16),
            "ISO-2022-JP" => Ok(Self::ISO2022JP),
            "SHIFT_JIS" | "SHIFT-JIS" => Ok(Self::ShiftJIS),
            "EUC-JP" => Ok(Self::EUCJP),
            "ASCII" | "US-ASCII" => Ok(Self::ASCII),
            _ => Err(EncodingError::Other {
                msg: "No encoding matches.".into(),
            }),
        }
    }
}

pub enum XmlCharEncodingHandler {
    Predefined(PredefinedEncodingHandler),
    Custom(CustomEncodingHandler),
}

impl XmlCharEncodingHandler {
    /// Encode as much of `src` as fits into `dst`.
    ///
    /// On success, return `(read_bytes, write_bytes)`.
    pub fn encode(&mut self, src: &str, dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
        match self {
            Self::Predefined(handler) => handler.encode(src, dst),
            Self::Custom(handler) => (handler.encode)(src, dst),
        }
    }

    /// Decode as much of `src` as possible, appending the result to `dst`.
    ///
    /// On success, return the number of consumed bytes.
    pub fn decode(&mut self, src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
        match self {
            Self::Predefined(handler) => handler.decode(src, dst),
            Self::Custom(handler) => (handler.decode)(src, dst),
        }
    }

    /// Decode the whole of `src`.
    ///
    /// A trailing incomplete sequence is reported as `EncodingError::Malformed`.
    pub fn decode_all(&mut self, src: &[u8]) -> Result<String, EncodingError> {
        let mut out = String::with_capacity(src.len());
        let mut read = 0;
        while read < src.len() {
            let len = self.decode(&src[read..], &mut out)?;
            if len == 0 {
                let rest = src.len() - read;
                return Err(EncodingError::Malformed {
                    read: src.len(),
                    write: out.len(),
                    length: rest,
                    offset: 0,
                });
            }
            read += len;
        }
        Ok(out)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Predefined(handler) => handler.name(),
            Self::Custom(handler) => handler.name(),
        }
    }

    /// Check if this handler produces UTF-8, that is, no conversion is needed.
    pub fn is_utf8(&self) -> bool {
        self.name().eq_ignore_ascii_case("UTF-8")
    }
}

impl std::fmt::Debug for XmlCharEncodingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("XmlCharEncodingHandler")
            .field(&self.name())
            .finish()
    }
}

pub struct PredefinedEncodingHandler {
    name: &'static str,
    encoder: Encoder,
    decoder: Decoder,
}

impl PredefinedEncodingHandler {
    pub fn encode(&mut self, src: &str, dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
        let (res, read, write) = self
            .encoder
            .encode_from_utf8_without_replacement(src, dst, false);
        match res {
            EncoderResult::OutputFull if read == 0 && !src.is_empty() => {
                Err(EncodingError::BufferTooShort)
            }
            EncoderResult::OutputFull | EncoderResult::InputEmpty => Ok((read, write)),
            EncoderResult::Unmappable(c) => Err(EncodingError::Unmappable { read, write, c }),
        }
    }

    /// The whole of `src` is treated as the last chunk of the input.
    pub fn decode(&mut self, src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
        let before = dst.len();
        let needed = self
            .decoder
            .max_utf8_buffer_length_without_replacement(src.len())
            .unwrap_or(src.len() * 3 + 16);
        dst.reserve(needed);
        let (res, read) = self
            .decoder
            .decode_to_string_without_replacement(src, dst, true);
        match res {
            DecoderResult::InputEmpty | DecoderResult::OutputFull => Ok(read),
            DecoderResult::Malformed(length, offset) => Err(EncodingError::Malformed {
                read,
                write: dst.len() - before,
                length: length as usize,
                offset: offset as usize,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl From<&'static Encoding> for PredefinedEncodingHandler {
    fn from(value: &'static Encoding) -> Self {
        Self {
            name: value.name(),
            encoder: value.new_encoder(),
            decoder: value.new_decoder_without_bom_handling(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EncodingError {
    /// The length of the output buffer is too short to make any progress.
    BufferTooShort,
    /// Malformed byte sequence is found.
    ///
    /// The input has consumed `read` bytes and the output has grown by `write` bytes.
    /// Malformed sequence occurs `input[read-length-offset..read-offset]`.
    ///
    /// Only the decoder returns this error.
    Malformed {
        read: usize,
        write: usize,
        length: usize,
        offset: usize,
    },
    /// A UTF-8 character `c` cannot map any codepoints of the target encoding.
    ///
    /// `read` includes the length of `c`; `write` does not include anything for `c`.
    ///
    /// Only the encoder returns this error.
    Unmappable { read: usize, write: usize, c: char },
    /// Other errors.
    Other { msg: Cow<'static, str> },
}

impl EncodingError {
    pub fn buffer_too_short(&self) -> bool {
        matches!(self, EncodingError::BufferTooShort)
    }

    pub fn malformed(&self) -> bool {
        matches!(self, EncodingError::Malformed { .. })
    }

    pub fn unmappable(&self) -> bool {
        matches!(self, EncodingError::Unmappable { .. })
    }
}

impl Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BufferTooShort => write!(f, "Buffer too short"),
            Self::Malformed {
                read,
                length,
                offset,
                ..
            } => {
                let end = read.saturating_sub(*offset);
                write!(
                    f,
                    "Malformed byte sequence occurs at {}..{}",
                    end.saturating_sub(*length),
                    end
                )
            }
            Self::Unmappable { c, .. } => write!(f, "Unmappable character '{c}'"),
            Self::Other { msg } => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EncodingError {}

pub type EncoderFunc = fn(src: &str, dst: &mut [u8]) -> Result<(usize, usize), EncodingError>;
pub type DecoderFunc = fn(src: &[u8], dst: &mut String) -> Result<usize, EncodingError>;

#[derive(Debug, Clone)]
pub struct CustomEncodingHandler {
    /// the name of this encoding
    name: Cow<'static, str>,
    /// encode source UTF-8 string `src` to the byte sequence `dst` of this encoding.
    encode: EncoderFunc,
    /// decode the byte sequece `src` of this encoding and append it to `dst`.
    decode: DecoderFunc,
}

impl CustomEncodingHandler {
    /// Create and register new CustomEncodingHandler.
    ///
    /// If too many handlers are registered (more than 50 handlers specifically), return `Err`.
    pub fn new(
        name: &str,
        encode: EncoderFunc,
        decode: DecoderFunc,
    ) -> Result<Self, EncodingError> {
        let name = get_encoding_alias(name).unwrap_or_else(|| name.to_uppercase());
        let new = CustomEncodingHandler {
            name: name.into(),
            encode,
            decode,
        };
        register_encoding_handler(new.clone())?;
        Ok(new)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

const MAX_ENCODING_HANDLERS: usize = 50;
static HANDLERS: Mutex<Vec<CustomEncodingHandler>> = Mutex::new(vec![]);

pub(crate) fn xml_encoding_err(code: XmlParserErrors, msg: &str, val: &str) {
    __xml_raise_error(
        XmlErrorDomain::XmlFromI18N,
        code,
        XmlErrorLevel::XmlErrFatal,
        Some(val),
        msg,
    );
}

pub fn register_encoding_handler(handler: CustomEncodingHandler) -> Result<(), EncodingError> {
    let mut handlers = HANDLERS.lock().map_err(|_| EncodingError::Other {
        msg: "The handler registry is poisoned.".into(),
    })?;
    if handlers.len() >= MAX_ENCODING_HANDLERS {
        xml_encoding_err(
            XmlParserErrors::XmlI18NExcessHandler,
            "xmlRegisterCharEncodingHandler: Too many handler registered, see MAX_ENCODING_HANDLERS\n",
            "MAX_ENCODING_HANDLERS",
        );
        return Err(EncodingError::Other {
            msg: "Too many CustomEncodingHandlers are registerd.".into(),
        });
    }
    handlers.push(handler);
    Ok(())
}

fn encode_utf16_units(
    src: &str,
    dst: &mut [u8],
    to_bytes: fn(u16) -> [u8; 2],
) -> Result<(usize, usize), EncodingError> {
    let mut buf = [0u16; 2];
    let (mut read, mut write) = (0, 0);
    for c in src.chars() {
        let units = c.encode_utf16(&mut buf);
        if write + units.len() * 2 > dst.len() {
            break;
        }
        read += c.len_utf8();
        for &mut unit in units {
            dst[write..write + 2].copy_from_slice(&to_bytes(unit));
            write += 2;
        }
    }
    if read == 0 && !src.is_empty() {
        return Err(EncodingError::BufferTooShort);
    }
    Ok((read, write))
}

fn decode_utf16_units(
    src: &[u8],
    dst: &mut String,
    from_bytes: fn([u8; 2]) -> u16,
) -> Result<usize, EncodingError> {
    let before = dst.len();
    let mut read = 0;
    let units = src.chunks_exact(2).map(|c| from_bytes([c[0], c[1]]));
    for c in char::decode_utf16(units) {
        match c {
            Ok(c) => {
                dst.push(c);
                read += c.len_utf16() * 2;
            }
            // `src` may be split at the middle of a surrogate pair.
            Err(_) if read + 2 >= src.len() => break,
            Err(_) => {
                return Err(EncodingError::Malformed {
                    read: read + 2,
                    write: dst.len() - before,
                    length: 2,
                    offset: 0,
                });
            }
        }
    }
    Ok(read)
}

fn encode_utf16le(src: &str, dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    encode_utf16_units(src, dst, u16::to_le_bytes)
}

fn decode_utf16le(src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
    decode_utf16_units(src, dst, u16::from_le_bytes)
}

fn encode_utf16be(src: &str, dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    encode_utf16_units(src, dst, u16::to_be_bytes)
}

fn decode_utf16be(src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
    decode_utf16_units(src, dst, u16::from_be_bytes)
}

fn encode_utf16(src: &str, dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    // Initialize.
    // UTF-16 (not UTF-16BE/LE) needs BOM at the beginning of the document.
    if src.is_empty() {
        if dst.len() < 2 {
            return Err(EncodingError::BufferTooShort);
        }
        dst[..2].copy_from_slice(&[0xFF, 0xFE]);
        return Ok((0, 2));
    }
    encode_utf16le(src, dst)
}

fn encode_latin1(src: &str, dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    if src.is_empty() {
        return Ok((0, 0));
    }
    if dst.is_empty() {
        return Err(EncodingError::BufferTooShort);
    }
    // The output is never longer than the input, so clamping the input is enough.
    let mut len = src.len().min(dst.len());
    while !src.is_char_boundary(len) {
        len -= 1;
    }
    let up_to = str_latin1_up_to(&src[..len]);
    let write = convert_utf8_to_latin1_lossy(&src.as_bytes()[..up_to], dst);
    if up_to == len {
        return Ok((len, write));
    }
    match src[up_to..].chars().next() {
        Some(c) => Err(EncodingError::Unmappable {
            read: up_to + c.len_utf8(),
            write,
            c,
        }),
        None => Ok((up_to, write)),
    }
}

fn decode_latin1(src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
    dst.push_str(&decode_latin1_to_str(src));
    Ok(src.len())
}

fn encode_ascii(src: &str, dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    let mut write = 0;
    for (read, c) in src.char_indices() {
        if !c.is_ascii() {
            return Err(EncodingError::Unmappable {
                read: read + c.len_utf8(),
                write,
                c,
            });
        }
        if write == dst.len() {
            return if write == 0 {
                Err(EncodingError::BufferTooShort)
            } else {
                Ok((read, write))
            };
        }
        dst[write] = c as u8;
        write += 1;
    }
    Ok((src.len(), write))
}

fn decode_ascii(src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
    let before = dst.len();
    for (i, &b) in src.iter().enumerate() {
        if !b.is_ascii() {
            return Err(EncodingError::Malformed {
                read: i + 1,
                write: dst.len() - before,
                length: 1,
                offset: 0,
            });
        }
        dst.push(b as char);
    }
    Ok(src.len())
}

fn encode_ucs4(
    src: &str,
    dst: &mut [u8],
    to_bytes: fn(u32) -> [u8; 4],
) -> Result<(usize, usize), EncodingError> {
    if !src.is_empty() && dst.len() < 4 {
        return Err(EncodingError::BufferTooShort);
    }
    let (mut read, mut write) = (0, 0);
    for (c, chunk) in src.chars().zip(dst.chunks_exact_mut(4)) {
        chunk.copy_from_slice(&to_bytes(c as u32));
        read += c.len_utf8();
        write += 4;
    }
    Ok((read, write))
}

fn decode_ucs4(
    src: &[u8],
    dst: &mut String,
    from_bytes: fn([u8; 4]) -> u32,
) -> Result<usize, EncodingError> {
    let before = dst.len();
    let mut read = 0;
    for chunk in src.chunks_exact(4) {
        let code = from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let c = char::from_u32(code).ok_or_else(|| EncodingError::Malformed {
            read: read + 4,
            write: dst.len() - before,
            length: 4,
            offset: 0,
        })?;
        dst.push(c);
        read += 4;
    }
    Ok(read)
}

fn encode_ucs4be(src: &str, dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    encode_ucs4(src, dst, u32::to_be_bytes)
}

fn decode_ucs4be(src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
    decode_ucs4(src, dst, u32::from_be_bytes)
}

fn encode_ucs4le(src: &str, dst: &mut [u8]) -> Result<(usize, usize), EncodingError> {
    encode_ucs4(src, dst, u32::to_le_bytes)
}

fn decode_ucs4le(src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
    decode_ucs4(src, dst, u32::from_le_bytes)
}

const UTF16_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("UTF-16"),
    encode: encode_utf16,
    decode: decode_utf16le,
};

const UTF16LE_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("UTF-16LE"),
    encode: encode_utf16le,
    decode: decode_utf16le,
};

const UTF16BE_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("UTF-16BE"),
    encode: encode_utf16be,
    decode: decode_utf16be,
};

const UCS4BE_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("UCS-4BE"),
    encode: encode_ucs4be,
    decode: decode_ucs4be,
};

const UCS4LE_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("UCS-4LE"),
    encode: encode_ucs4le,
    decode: decode_ucs4le,
};

const ISO8859_1_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("ISO-8859-1"),
    encode: encode_latin1,
    decode: decode_latin1,
};

const ASCII_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("ASCII"),
    encode: encode_ascii,
    decode: decode_ascii,
};

/// Get the handler for the encoding `enc`.
///
/// UTF-8 needs no conversion, so `None` is returned for it.
pub fn get_encoding_handler(enc: XmlCharEncoding) -> Option<XmlCharEncodingHandler> {
    match enc {
        XmlCharEncoding::Error | XmlCharEncoding::None | XmlCharEncoding::UTF8 => None,
        // For UTF-16, encoding-rs does not provide encoders.
        //
        // ref: https://docs.rs/encoding_rs/latest/encoding_rs/index.html#utf-16le-utf-16be-and-unicode-encoding-schemes
        XmlCharEncoding::UTF16LE => Some(XmlCharEncodingHandler::Custom(UTF16_HANDLER)),
        XmlCharEncoding::UTF16BE => Some(XmlCharEncodingHandler::Custom(UTF16BE_HANDLER)),
        XmlCharEncoding::UCS4BE => Some(XmlCharEncodingHandler::Custom(UCS4BE_HANDLER)),
        XmlCharEncoding::UCS4LE => Some(XmlCharEncodingHandler::Custom(UCS4LE_HANDLER)),
        // encoding_rs maps the label "iso-8859-1" to windows-1252.
        //
        // ref: https://docs.rs/encoding_rs/latest/encoding_rs/index.html#iso-8859-1
        XmlCharEncoding::ISO8859_1 => Some(XmlCharEncodingHandler::Custom(ISO8859_1_HANDLER)),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_2 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_2.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_3 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_3.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_4 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_4.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_5 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_5.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_6 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_6.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_7 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_7.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_8 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_8.into())),
        // Windows 1254 is a superset of ISO-8859-9.
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_9 => Some(XmlCharEncodingHandler::Predefined(WINDOWS_1254.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_10 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_10.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_13 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_13.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_14 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_14.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_15 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_15.into())),
        #[cfg(feature = "libxml_iso8859x")]
        XmlCharEncoding::ISO8859_16 => Some(XmlCharEncodingHandler::Predefined(ISO_8859_16.into())),
        XmlCharEncoding::ISO2022JP => Some(XmlCharEncodingHandler::Predefined(ISO_2022_JP.into())),
        XmlCharEncoding::ShiftJIS => Some(XmlCharEncodingHandler::Predefined(SHIFT_JIS.into())),
        XmlCharEncoding::EUCJP => Some(XmlCharEncodingHandler::Predefined(EUC_JP.into())),
        XmlCharEncoding::ASCII => Some(XmlCharEncodingHandler::Custom(ASCII_HANDLER)),
        #[cfg(not(feature = "libxml_iso8859x"))]
        _ => None,
    }
}

/// Search a handler for the encoding named `name`.
///
/// User-defined aliases take precedence, then the builtin handlers,
/// then registered custom handlers, then every label `encoding_rs` knows.
pub fn find_encoding_handler(name: &str) -> Option<XmlCharEncodingHandler> {
    let name = get_encoding_alias(name).unwrap_or_else(|| name.to_uppercase());
    if name.is_empty() {
        return None;
    }

    if name == "UTF-8" || name == "UTF8" {
        return Some(XmlCharEncodingHandler::Predefined(encoding_rs::UTF_8.into()));
    }
    if name == "UTF-16LE" {
        return Some(XmlCharEncodingHandler::Custom(UTF16LE_HANDLER));
    }
    if let Some(handler) = name
        .parse::<XmlCharEncoding>()
        .ok()
        .and_then(get_encoding_handler)
    {
        return Some(handler);
    }

    if let Ok(handlers) = HANDLERS.lock() {
        if let Some(handler) = handlers.iter().find(|handler| handler.name == name) {
            return Some(XmlCharEncodingHandler::Custom(handler.clone()));
        }
    }

    Encoding::for_label(name.as_bytes()).map(|enc| XmlCharEncodingHandler::Predefined(enc.into()))
}

static ENCODING_ALIASES: RwLock<BTreeMap<String, String>> = RwLock::new(BTreeMap::new());

/// Lookup an encoding name for the given alias.
pub fn get_encoding_alias(alias: &str) -> Option<String> {
    let aliases = ENCODING_ALIASES.read().ok()?;
    aliases.get(&alias.to_uppercase()).cloned()
}

/// Register an alias `alias` for the encoding `name`.
///
/// If `alias` already exists as an alias, it is overwritten.
///
/// # Note
/// `alias` and `name` are stored after converted to uppercase.
pub fn add_encoding_alias(name: &str, alias: &str) {
    if let Ok(mut aliases) = ENCODING_ALIASES.write() {
        aliases.insert(alias.to_uppercase(), name.to_uppercase());
    }
}

pub fn remove_encoding_alias(alias: &str) -> Option<String> {
    let mut aliases = ENCODING_ALIASES.write().ok()?;
    aliases.remove(&alias.to_uppercase())
}

pub fn cleanup_encoding_aliases() {
    if let Ok(mut aliases) = ENCODING_ALIASES.write() {
        aliases.clear();
    }
}

/// Guess the encoding of a document from its first bytes.
///
/// Returns the detected encoding and the length of the byte order mark, if any.
pub fn detect_encoding(input: &[u8]) -> (XmlCharEncoding, usize) {
    match input {
        [0x00, 0x00, 0x00, 0x3C, ..] => (XmlCharEncoding::UCS4BE, 0),
        [0x3C, 0x00, 0x00, 0x00, ..] => (XmlCharEncoding::UCS4LE, 0),
        [0x3C, 0x3F, 0x78, 0x6D, ..] => (XmlCharEncoding::UTF8, 0),
        [0x3C, 0x00, 0x3F, 0x00, ..] => (XmlCharEncoding::UTF16LE, 0),
        [0x00, 0x3C, 0x00, 0x3F, ..] => (XmlCharEncoding::UTF16BE, 0),
        // UTF-8 BOM
        [0xEF, 0xBB, 0xBF, ..] => (XmlCharEncoding::UTF8, 3),
        // UTF-16 BOM (BE)
        [0xFE, 0xFF, ..] => (XmlCharEncoding::UTF16BE, 2),
        // UTF-16 BOM (LE)
        [0xFF, 0xFE, ..] => (XmlCharEncoding::UTF16LE, 2),
        _ => (XmlCharEncoding::None, 0),
    }
}

/// Decode a whole document into UTF-8.
///
/// A byte order mark wins over `declared`, which wins over the detection
/// from the first bytes. Without any of them, UTF-8 is assumed.
pub fn decode_to_string(input: &[u8], declared: Option<&str>) -> Result<String, EncodingError> {
    let (detected, bom) = detect_encoding(input);
    let body = &input[bom..];
    let mut handler = if bom > 0 {
        get_encoding_handler(detected)
    } else if let Some(declared) = declared {
        let Some(handler) = find_encoding_handler(declared) else {
            xml_encoding_err(
                XmlParserErrors::XmlI18NNoHandler,
                &format!("Unsupported encoding: {declared}\n"),
                declared,
            );
            return Err(EncodingError::Other {
                msg: format!("Unsupported encoding: {declared}").into(),
            });
        };
        Some(handler).filter(|handler| !handler.is_utf8())
    } else {
        get_encoding_handler(detected)
    };

    match handler.as_mut() {
        Some(handler) => handler.decode_all(body),
        None => String::from_utf8(body.to_vec()).map_err(|e| {
            let read = e.utf8_error().valid_up_to();
            EncodingError::Malformed {
                read: read + 1,
                write: read,
                length: 1,
                offset: 0,
            }
        }),
    }
}
