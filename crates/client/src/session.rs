//! Per-connection IRC protocol handling.
//!
//! Turns decoded server lines into directory updates and kernel dispatches,
//! and owns the sign-on conversation. Transport lives in [`crate::connection`];
//! everything here is driven line by line so it can run against a plain
//! channel in tests.

use {
    secrecy::{ExposeSecret, Secret},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
    wicket_config::WicketConfig,
    wicket_plugs::{Event, Kernel},
    wicket_protocol::{
        Message, Prefix,
        ctcp::{self, Ctcp},
        numeric,
    },
    wicket_users::User,
};

/// Reply to CTCP VERSION queries.
pub const VERSION: &str = concat!("wicket ", env!("CARGO_PKG_VERSION"));

/// Identity and sign-on settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub nickname: String,
    pub password: Option<Secret<String>>,
    pub username: String,
    pub realname: String,
    pub channels: Vec<String>,
    pub autoload: Vec<String>,
}

impl From<&WicketConfig> for SessionConfig {
    fn from(config: &WicketConfig) -> Self {
        Self {
            nickname: config.nickname.clone(),
            password: config.password.clone(),
            username: config.username.clone(),
            realname: config.realname.clone(),
            channels: config.channels.clone(),
            autoload: config.plugs.autoload.clone(),
        }
    }
}

pub struct Session {
    kernel: Kernel,
    config: SessionConfig,
    signed_on: bool,
}

impl Session {
    pub fn new(kernel: Kernel, config: SessionConfig) -> Self {
        Self {
            kernel,
            config,
            signed_on: false,
        }
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }

    pub fn signed_on(&self) -> bool {
        self.signed_on
    }

    pub fn shutdown_requested(&self) -> Option<&str> {
        self.kernel.shutdown_requested()
    }

    /// A connection is up: attach the outbound queue and register.
    pub fn connected(&mut self, outbound: mpsc::UnboundedSender<String>) {
        self.signed_on = false;
        self.kernel.outbound_mut().attach(outbound);
        self.kernel.set_nickname(self.config.nickname.clone());
        self.kernel.set_starting_up(true);

        if let Some(password) = &self.config.password {
            self.send(Message::new("PASS", vec![password.expose_secret().clone()]));
        }
        self.send(Message::new("NICK", vec![self.config.nickname.clone()]));
        self.send(Message::new("USER", vec![
            self.config.username.clone(),
            "0".into(),
            "*".into(),
            self.config.realname.clone(),
        ]));
    }

    /// The connection is gone: give every plug its cleanup and forget
    /// everyone we knew.
    pub fn disconnected(&mut self) {
        self.kernel.unload_all();
        self.kernel.users_mut().clear();
        self.kernel.outbound_mut().detach();
        self.signed_on = false;
    }

    /// Shut down on request: unload every plug, then say goodbye.
    /// The caller flushes and closes the connection afterwards.
    pub fn quit(&mut self, reason: &str) {
        info!(reason, "quitting");
        self.kernel.unload_all();
        // Always trailing, so a one-word reason keeps its colon on the wire.
        self.kernel.send_line(&format!("QUIT :{reason}"));
    }

    /// Handle one decoded line from the server.
    pub fn handle_line(&mut self, line: &str) {
        let msg = match Message::parse(line) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(line, error = %e, "ignoring unparseable line");
                return;
            },
        };
        debug!(
            command = %msg.command,
            symbolic = numeric::symbolic(&msg.command).unwrap_or(""),
            "recv"
        );
        self.handle_message(&msg);
        if self.signed_on {
            self.kernel
                .dispatch_raw(&msg.command, msg.prefix.as_deref(), &msg.params);
        }
    }

    fn handle_message(&mut self, msg: &Message) {
        let params = msg.params.as_slice();
        match (msg.command.as_str(), params) {
            ("PING", _) => self.send(Message::new("PONG", msg.params.clone())),
            (numeric::RPL_WELCOME, [me, ..]) => self.welcome(me),
            (numeric::ERR_NICKNAMEINUSE, _) if !self.signed_on => self.nick_in_use(),
            ("JOIN", [.., channel]) => self.join(msg.prefix.as_deref(), channel),
            (numeric::RPL_WHOREPLY, [_, channel, user, host, _, nick, ..]) => {
                self.user_joined(nick, user, host, channel);
            },
            ("PART", [channel, ..]) => {
                if let Some(nick) = msg.source_nick() {
                    self.user_left(nick, channel);
                }
            },
            ("KICK", [channel, kickee, ..]) => self.user_left(kickee, channel),
            ("QUIT", _) => {
                if let Some(nick) = msg.source_nick() {
                    let removed = self.kernel.users_mut().user_quit(nick);
                    self.removed(removed);
                }
            },
            ("NICK", [new, ..]) => {
                if let Some(old) = msg.source_nick() {
                    self.renamed(old, new);
                }
            },
            ("PRIVMSG", [target, text, ..]) => {
                if let Some(source) = msg.source_nick() {
                    self.privmsg(source, target, text);
                }
            },
            _ => {},
        }
    }

    fn send(&self, msg: Message) {
        self.kernel.send_line(&msg.to_line());
    }

    fn is_me(&self, nick: &str) -> bool {
        nick.eq_ignore_ascii_case(self.kernel.nickname())
    }

    fn welcome(&mut self, me: &str) {
        info!(nickname = me, "signed on");
        self.signed_on = true;
        self.kernel.set_nickname(me);
        let autoload = self.config.autoload.clone();
        let loaded = self.kernel.load_all(autoload.as_slice());
        info!(loaded, requested = autoload.len(), "autoloaded plugs");
        for channel in &self.config.channels {
            self.kernel.join(channel);
        }
        self.kernel.set_starting_up(false);
    }

    fn nick_in_use(&mut self) {
        let nick = format!("{}_", self.kernel.nickname());
        warn!(nickname = %nick, "nickname in use, retrying");
        self.kernel.set_nickname(nick.clone());
        self.send(Message::new("NICK", vec![nick]));
    }

    fn join(&mut self, prefix: Option<&str>, channel: &str) {
        let Some(prefix) = prefix.map(Prefix::parse) else {
            return;
        };
        if self.is_me(&prefix.nick) {
            info!(channel, "joined");
            self.send(Message::new("WHO", vec![channel.to_string()]));
        } else {
            self.user_joined(
                &prefix.nick,
                prefix.user.as_deref().unwrap_or(""),
                prefix.host.as_deref().unwrap_or(""),
                channel,
            );
        }
    }

    fn user_joined(&mut self, nick: &str, user: &str, host: &str, channel: &str) {
        let created = self
            .kernel
            .users_mut()
            .user_joined(nick, user, host, channel);
        if let Some(user) = created {
            self.kernel.dispatch_event(&Event::UserCreated(user));
        }
        self.kernel.dispatch_event(&Event::UserJoined {
            nickname: nick.to_string(),
            channel: channel.to_string(),
        });
    }

    fn user_left(&mut self, nick: &str, channel: &str) {
        if self.is_me(nick) {
            info!(channel, "left channel");
            let dropped = self.kernel.users_mut().channel_left(channel);
            for user in dropped {
                self.kernel.dispatch_event(&Event::UserRemoved(user));
            }
        } else {
            let removed = self.kernel.users_mut().user_left(nick, channel);
            self.removed(removed);
        }
    }

    fn removed(&mut self, user: Option<User>) {
        if let Some(user) = user {
            self.kernel.dispatch_event(&Event::UserRemoved(user));
        }
    }

    fn renamed(&mut self, old: &str, new: &str) {
        if self.is_me(old) {
            info!(nickname = new, "own nickname changed");
            self.kernel.set_nickname(new);
        }
        self.kernel.users_mut().user_renamed(old, new);
    }

    fn privmsg(&mut self, source: &str, target: &str, text: &str) {
        let (text, is_action) = match ctcp::parse(text) {
            None => (text.trim(), false),
            Some(Ctcp::Action(action)) => (action.trim(), true),
            Some(Ctcp::Query { tag, .. }) => {
                if tag.eq_ignore_ascii_case("VERSION") {
                    let reply = ctcp::encode("VERSION", VERSION);
                    self.kernel.notice(source, &reply);
                } else {
                    debug!(source, tag, "ignoring CTCP query");
                }
                return;
            },
        };
        debug!(target, source, text, is_action, "message");

        let event = if self.is_me(target) {
            Event::Private {
                source: source.to_string(),
                text: text.to_string(),
                is_action,
            }
        } else {
            Event::ChannelMessage {
                source: source.to_string(),
                channel: target.to_string(),
                text: text.to_string(),
                is_action,
            }
        };
        self.kernel.dispatch_event(&event);
        if is_action {
            return;
        }

        let prefix = self.kernel.command_prefix();
        if let Some(rest) = text.strip_prefix(prefix)
            && !rest.is_empty()
        {
            let argv: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            self.kernel.dispatch_command(source, target, &argv);
        } else if let Some(message) = addressed_text(text, self.kernel.nickname()) {
            self.kernel.dispatch_event(&Event::Addressed {
                source: source.to_string(),
                target: target.to_string(),
                message,
            });
        }
    }
}

/// `"wicket: hi there"` → `"hi there"`: skip the nickname and one separator
/// character.
fn addressed_text(text: &str, nickname: &str) -> Option<String> {
    let rest = text.strip_prefix(nickname)?;
    let mut chars = rest.chars();
    chars.next();
    Some(chars.as_str().trim().to_string())
}
