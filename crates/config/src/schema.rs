//! Config schema types (connection identity, reconnect policy, plugs).
use std::{collections::HashMap, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, Serializer},
};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WicketConfig {
    pub nickname: String,

    /// Server password sent as `PASS` before registration.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_secret"
    )]
    pub password: Option<Secret<String>>,

    pub realname: String,
    pub username: String,
    pub server: String,
    pub port: u16,

    /// Channels joined after sign-on.
    pub channels: Vec<String>,

    /// Prefix marking a channel message as a command.
    pub cmd_prefix: String,

    /// Encoding label for inbound bytes, e.g. `utf-8` or `iso-8859-1`.
    pub charset: String,

    /// Minimum spacing between outbound lines once signed on.
    pub send_interval_ms: u64,

    pub reconnect: ReconnectConfig,
    pub plugs: PlugsConfig,
}

impl Default for WicketConfig {
    fn default() -> Self {
        Self {
            nickname: "wicket".into(),
            password: None,
            realname: "wicket IRC bot".into(),
            username: "wicket".into(),
            server: "irc.libera.chat".into(),
            port: 6667,
            channels: Vec::new(),
            cmd_prefix: "!".into(),
            charset: "utf-8".into(),
            send_interval_ms: 300,
            reconnect: ReconnectConfig::default(),
            plugs: PlugsConfig::default(),
        }
    }
}

impl WicketConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    /// `host:port` suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

/// Reconnect policy for the connection supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    /// Consecutive failed attempts tolerated before giving up.
    /// Absent from a `[reconnect]` table means retry forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 1,
            max_delay_secs: 300,
            max_retries: Some(8),
        }
    }
}

impl ReconnectConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

/// Which plugs load at sign-on, and their per-plug settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlugsConfig {
    pub autoload: Vec<String>,
    /// Settings keyed by plug name, handed to the plug's factory.
    pub settings: HashMap<String, serde_json::Value>,
}

impl Default for PlugsConfig {
    fn default() -> Self {
        Self {
            autoload: vec!["Core".into(), "Auth".into()],
            settings: HashMap::new(),
        }
    }
}

fn serialize_option_secret<S: Serializer>(
    value: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}
