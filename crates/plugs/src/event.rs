use std::{fmt, str::FromStr};

use {
    serde::{Deserialize, Serialize},
    thiserror::Error,
    wicket_users::User,
};

/// Event identity used as a hook key.
///
/// `Command` and `Raw` are keyed events: subscribing to them requires a
/// command name or raw code, so they are rejected by the plain category
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Addressed,
    ChannelMessage,
    Private,
    UserJoined,
    UserCreated,
    UserRemoved,
    Command,
    Raw,
}

impl EventKind {
    /// Categories that need no key beyond the kind itself.
    pub const SIMPLE: [Self; 6] = [
        Self::Addressed,
        Self::ChannelMessage,
        Self::Private,
        Self::UserJoined,
        Self::UserCreated,
        Self::UserRemoved,
    ];

    pub fn is_simple(self) -> bool {
        !matches!(self, Self::Command | Self::Raw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Addressed => "addressed",
            Self::ChannelMessage => "channel_message",
            Self::Private => "private",
            Self::UserJoined => "user_joined",
            Self::UserCreated => "user_created",
            Self::UserRemoved => "user_removed",
            Self::Command => "command",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown event category: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "addressed" => Self::Addressed,
            "channel_message" | "chanmsg" => Self::ChannelMessage,
            "private" => Self::Private,
            "user_joined" => Self::UserJoined,
            "user_created" => Self::UserCreated,
            "user_removed" => Self::UserRemoved,
            "command" => Self::Command,
            "raw" => Self::Raw,
            other => return Err(UnknownEvent(other.to_string())),
        })
    }
}

/// Payload of a simple category event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Someone spoke to the bot by name in a channel (`wicket: hi`).
    Addressed {
        source: String,
        target: String,
        message: String,
    },
    ChannelMessage {
        source: String,
        channel: String,
        text: String,
        is_action: bool,
    },
    Private {
        source: String,
        text: String,
        is_action: bool,
    },
    /// A user joined a channel, or was listed by WHO after the bot joined.
    UserJoined { nickname: String, channel: String },
    /// The user directory started tracking someone.
    UserCreated(User),
    /// The user directory stopped tracking someone.
    UserRemoved(User),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Addressed { .. } => EventKind::Addressed,
            Self::ChannelMessage { .. } => EventKind::ChannelMessage,
            Self::Private { .. } => EventKind::Private,
            Self::UserJoined { .. } => EventKind::UserJoined,
            Self::UserCreated(_) => EventKind::UserCreated,
            Self::UserRemoved(_) => EventKind::UserRemoved,
        }
    }
}
