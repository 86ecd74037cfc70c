//! IRC wire codec.
//!
//! Splits raw lines into prefix, command and parameters, handles CTCP framing
//! inside PRIVMSG payloads, and decodes inbound bytes with a configured
//! charset. Nothing here knows about plugs or the kernel.

pub mod charset;
pub mod ctcp;
pub mod message;
pub mod numeric;

pub use {
    charset::Decoder,
    message::{Message, ParseError, Prefix},
};

/// Maximum length of a line on the wire, including the trailing CRLF.
pub const MAX_LINE_LEN: usize = 512;

/// Returns true if `target` names a channel rather than a nickname.
pub fn is_channel(target: &str) -> bool {
    matches!(target.chars().next(), Some('#' | '&' | '+' | '!'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_prefixes() {
        assert!(is_channel("#rust"));
        assert!(is_channel("&local"));
        assert!(!is_channel("alice"));
        assert!(!is_channel(""));
    }
}
