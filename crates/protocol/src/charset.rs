use encoding_rs::Encoding;

use crate::message::ParseError;

/// Decodes inbound line bytes with a fixed charset, replacing malformed
/// sequences instead of failing.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    encoding: &'static Encoding,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
        }
    }
}

impl Decoder {
    /// Look up a charset by its WHATWG label (`utf-8`, `latin1`, ...).
    pub fn for_label(label: &str) -> Result<Self, ParseError> {
        Encoding::for_label(label.trim().as_bytes())
            .map(|encoding| Self { encoding })
            .ok_or_else(|| ParseError::UnknownCharset(label.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Undo low-level quoting, then decode.
    pub fn decode(&self, raw: &[u8]) -> String {
        let unquoted = low_dequote(raw);
        let (text, _) = self.encoding.decode_without_bom_handling(&unquoted);
        text.into_owned()
    }
}

const M_QUOTE: u8 = 0x10;

/// Reverse the CTCP low-level quoting (`\x10` escapes for NUL, CR, LF).
pub fn low_dequote(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter().copied();
    while let Some(b) = bytes.next() {
        if b != M_QUOTE {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'0') => out.push(0),
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(M_QUOTE) => out.push(M_QUOTE),
            Some(other) => out.push(other),
            None => {},
        }
    }
    out
}
