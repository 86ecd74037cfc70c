//! CTCP framing inside PRIVMSG/NOTICE payloads (`\x01TAG data\x01`).

const DELIM: char = '\u{1}';

/// A decoded CTCP payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ctcp<'a> {
    /// `/me` style action text.
    Action(&'a str),
    /// Any other tagged query, e.g. `VERSION`.
    Query { tag: &'a str, data: &'a str },
}

/// Decode `text` as CTCP, or `None` if it is an ordinary message.
pub fn parse(text: &str) -> Option<Ctcp<'_>> {
    let inner = text.strip_prefix(DELIM)?;
    let inner = inner.strip_suffix(DELIM).unwrap_or(inner);
    let (tag, data) = inner.split_once(' ').unwrap_or((inner, ""));
    if tag.eq_ignore_ascii_case("ACTION") {
        Some(Ctcp::Action(data))
    } else {
        Some(Ctcp::Query { tag, data })
    }
}

/// Frame a CTCP payload.
pub fn encode(tag: &str, data: &str) -> String {
    if data.is_empty() {
        format!("{DELIM}{tag}{DELIM}")
    } else {
        format!("{DELIM}{tag} {data}{DELIM}")
    }
}
