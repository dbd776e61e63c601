use crate::io::XmlOutputBuffer;

use super::{WriterResult, XmlTextWriter};

const B64LINELEN: usize = 72;
const B64CRLF: &str = "\r\n";

impl XmlTextWriter<'_> {
    /// Write an base64 encoded xml text.
    ///
    /// Lines are wrapped every 72 characters with CRLF.
    #[doc(alias = "xmlTextWriterWriteBase64")]
    pub fn write_base64(&mut self, data: &[u8]) -> WriterResult {
        let mut sum = self.prepare_binary()?;
        sum += write_base64(&mut self.out, data)?;
        Ok(sum)
    }

    /// Write a BinHex encoded xml text.
    #[doc(alias = "xmlTextWriterWriteBinHex")]
    pub fn write_bin_hex(&mut self, data: &[u8]) -> WriterResult {
        let mut sum = self.prepare_binary()?;
        sum += write_bin_hex(&mut self.out, data)?;
        Ok(sum)
    }

    fn prepare_binary(&mut self) -> WriterResult {
        self.enter_document("XmlTextWriter::write_base64 : the document is already ended\n")?;
        let mut sum = 0;
        if let Some(lk) = self.nodes.front().cloned() {
            sum += self.handle_state_dependencies(&lk)?;
        }

        if self.indent {
            self.doindent = false;
        }
        Ok(sum)
    }
}

/// Write base64 encoded data to an xmlOutputBuffer.
/// Adapted from John Walker's base64.c (http://www.fourmilab.ch/).
#[doc(alias = "xmlOutputBufferWriteBase64")]
fn write_base64(out: &mut XmlOutputBuffer, data: &[u8]) -> std::io::Result<usize> {
    const DTABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut linelen = 0;
    let mut sum = 0;
    let mut line = String::with_capacity(B64LINELEN + B64CRLF.len());
    for igroup in data.chunks(3) {
        let ogroup = match *igroup {
            [i0, i1, i2] => [
                DTABLE[i0 as usize >> 2],
                DTABLE[((i0 as usize & 3) << 4) | (i1 as usize >> 4)],
                DTABLE[((i1 as usize & 0xF) << 2) | (i2 as usize >> 6)],
                DTABLE[i2 as usize & 0x3F],
            ],
            [i0, i1] => [
                DTABLE[i0 as usize >> 2],
                DTABLE[((i0 as usize & 3) << 4) | (i1 as usize >> 4)],
                DTABLE[(i1 as usize & 0xF) << 2],
                b'=',
            ],
            [i0] => [
                DTABLE[i0 as usize >> 2],
                DTABLE[(i0 as usize & 3) << 4],
                b'=',
                b'=',
            ],
            _ => continue,
        };
        if linelen >= B64LINELEN {
            line.push_str(B64CRLF);
            sum += out.write_str(&line)?;
            line.clear();
            linelen = 0;
        }
        line.extend(ogroup.iter().map(|&b| b as char));
        linelen += 4;
    }
    if !line.is_empty() {
        sum += out.write_str(&line)?;
    }

    Ok(sum)
}

/// Write hex encoded data to an xmlOutputBuffer.
#[doc(alias = "xmlOutputBufferWriteBinHex")]
fn write_bin_hex(out: &mut XmlOutputBuffer, data: &[u8]) -> std::io::Result<usize> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut buf = String::with_capacity(data.len() * 2);
    for &byte in data {
        buf.push(HEX[byte as usize >> 4] as char);
        buf.push(HEX[byte as usize & 0x0F] as char);
    }
    out.write_str(&buf)
}

#[cfg(test)]
mod tests {
    use crate::{io::MemorySink, writer::XmlTextWriter};

    fn encode(f: impl FnOnce(&mut XmlTextWriter)) -> String {
        let sink = MemorySink::new();
        {
            let mut writer = XmlTextWriter::from_writer(sink.clone());
            f(&mut writer);
        }
        String::from_utf8(sink.content()).unwrap()
    }

    #[test]
    fn test_base64_padding() {
        let out = encode(|w| {
            w.start_element("b").unwrap();
            w.write_base64(b"Man").unwrap();
            w.write_base64(b"Ma").unwrap();
            w.write_base64(b"M").unwrap();
            w.end_element().unwrap();
        });
        assert_eq!(out, "<b>TWFuTWE=TQ==</b>");
    }

    #[test]
    fn test_base64_line_wrapping() {
        let data = [0u8; 57];
        let out = encode(|w| {
            w.write_comment(None).unwrap();
            w.start_element("b").unwrap();
            w.write_base64(&data).unwrap();
            w.end_element().unwrap();
        });
        let body = out
            .trim_start_matches("<!----><b>")
            .trim_end_matches("</b>");
        let lines = body.split("\r\n").collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 72);
        assert_eq!(lines[1], "AAAA");
    }

    #[test]
    fn test_bin_hex() {
        let out = encode(|w| {
            w.start_element("h").unwrap();
            w.write_bin_hex(&[0x00, 0x7F, 0xAB, 0xFF]).unwrap();
            w.end_element().unwrap();
        });
        assert_eq!(out, "<h>007FABFF</h>");
    }
}
