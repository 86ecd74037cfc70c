use std::fmt;

use thiserror::Error;

/// Errors produced while decoding a line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("line has a prefix but no command: {0:?}")]
    MissingCommand(String),
    #[error("unknown charset: {0}")]
    UnknownCharset(String),
}

/// One decoded protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Origin of the message without the leading `:`, if present.
    pub prefix: Option<String>,
    /// Command verb or three-digit numeric, exactly as sent.
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Parse a single line. A trailing CR/LF is ignored.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (prefix, rest) = match line.strip_prefix(':') {
            Some(stripped) => match stripped.split_once(' ') {
                Some((prefix, rest)) => (Some(prefix.to_string()), rest),
                None => return Err(ParseError::MissingCommand(line.to_string())),
            },
            None => (None, line),
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut words = head.split_whitespace();
        let command = words
            .next()
            .ok_or_else(|| ParseError::MissingCommand(line.to_string()))?
            .to_string();
        let mut params: Vec<String> = words.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Ok(Self {
            prefix,
            command,
            params,
        })
    }

    /// Nickname part of the prefix, if the message came from a user.
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_deref().map(Prefix::nick_of)
    }

    /// Serialize to a line without the CRLF terminator.
    pub fn to_line(&self) -> String {
        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(&self.command);
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            out.push(' ');
            if i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                out.push(':');
            }
            out.push_str(param);
        }
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// A `nick!user@host` message origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Prefix {
    pub fn parse(raw: &str) -> Self {
        let (nick, rest) = match raw.split_once('!') {
            Some((nick, rest)) => (nick, Some(rest)),
            None => (raw, None),
        };
        let (user, host) = match rest {
            Some(rest) => match rest.split_once('@') {
                Some((user, host)) => (Some(user.to_string()), Some(host.to_string())),
                None => (Some(rest.to_string()), None),
            },
            None => match nick.split_once('@') {
                Some((_, host)) => (None, Some(host.to_string())),
                None => (None, None),
            },
        };
        let nick = nick.split('@').next().unwrap_or(nick);
        Self {
            nick: nick.to_string(),
            user,
            host,
        }
    }

    /// Nickname portion of a raw prefix without allocating.
    pub fn nick_of(raw: &str) -> &str {
        raw.split(['!', '@']).next().unwrap_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn parses_prefix_command_and_trailing() {
        let msg = Message::parse(
            ":pratchett.freenode.net 330 shirks barometz nazgjunk :is logged in as\r\n",
        )
        .unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("pratchett.freenode.net"));
        assert_eq!(msg.command, "330");
        assert_eq!(msg.params, vec![
            "shirks",
            "barometz",
            "nazgjunk",
            "is logged in as"
        ]);
    }

    #[test]
    fn parses_without_prefix() {
        let msg = Message::parse("PING :irc.example.net").unwrap();
        assert!(msg.prefix.is_none());
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["irc.example.net"]);
    }

    #[test]
    fn keeps_empty_trailing_param() {
        let msg = Message::parse(":a!b@c PRIVMSG #chan :").unwrap();
        assert_eq!(msg.params, vec!["#chan", ""]);
    }

    #[rstest]
    #[case("")]
    #[case("\r\n")]
    fn rejects_empty(#[case] line: &str) {
        assert_eq!(Message::parse(line), Err(ParseError::Empty));
    }

    #[test]
    fn rejects_prefix_only() {
        assert!(matches!(
            Message::parse(":server.only"),
            Err(ParseError::MissingCommand(_))
        ));
    }

    #[test]
    fn serializes_trailing_when_needed() {
        let msg = Message::new("PRIVMSG", vec!["#room".into(), "hello there".into()]);
        assert_eq!(msg.to_line(), "PRIVMSG #room :hello there");
        let msg = Message::new("NICK", vec!["wicket".into()]);
        assert_eq!(msg.to_line(), "NICK wicket");
    }

    #[rstest]
    #[case("alice!~al@example.org", "alice", Some("~al"), Some("example.org"))]
    #[case("alice", "alice", None, None)]
    #[case("alice@example.org", "alice", None, Some("example.org"))]
    fn splits_prefix(
        #[case] raw: &str,
        #[case] nick: &str,
        #[case] user: Option<&str>,
        #[case] host: Option<&str>,
    ) {
        let prefix = Prefix::parse(raw);
        assert_eq!(prefix.nick, nick);
        assert_eq!(prefix.user.as_deref(), user);
        assert_eq!(prefix.host.as_deref(), host);
        assert_eq!(Prefix::nick_of(raw), nick);
    }

    #[test]
    fn source_nick_from_message() {
        let msg = Message::parse(":bob!b@h JOIN #room").unwrap();
        assert_eq!(msg.source_nick(), Some("bob"));
    }
}
