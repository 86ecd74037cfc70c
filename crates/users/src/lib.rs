//! Connected-user directory.
//!
//! Tracks every user that shares at least one channel with the bot, keyed by
//! case-insensitive nickname, with a stable numeric uid that survives nick
//! changes. Users are dropped once they leave the last shared channel.

use std::collections::{BTreeSet, HashMap};

use {serde::Serialize, tracing::debug};

/// Power level that unlocks administrative commands.
pub const ADMIN_POWER: i32 = 10;

/// A user known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub uid: u64,
    pub nickname: String,
    pub username: String,
    pub hostmask: String,
    pub channels: BTreeSet<String>,
    /// Privilege level, assigned by authentication plugs.
    pub power: i32,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.power >= ADMIN_POWER
    }
}

/// Nickname → user table with uid reverse lookup.
#[derive(Debug, Default)]
pub struct Users {
    /// uid → User
    users: HashMap<u64, User>,
    /// folded nickname → uid
    by_nick: HashMap<String, u64>,
    next_uid: u64,
}

fn fold(nick: &str) -> String {
    nick.to_ascii_lowercase()
}

impl Users {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `nickname` is in `channel`. Returns a snapshot of the user
    /// if this call created it.
    pub fn user_joined(
        &mut self,
        nickname: &str,
        username: &str,
        hostmask: &str,
        channel: &str,
    ) -> Option<User> {
        if let Some(user) = self.by_nick_mut(nickname) {
            user.username = username.to_string();
            user.hostmask = hostmask.to_string();
            user.channels.insert(channel.to_string());
            return None;
        }

        self.next_uid += 1;
        let user = User {
            uid: self.next_uid,
            nickname: nickname.to_string(),
            username: username.to_string(),
            hostmask: hostmask.to_string(),
            channels: BTreeSet::from([channel.to_string()]),
            power: 0,
        };
        debug!(nick = %nickname, uid = user.uid, "user created");
        self.by_nick.insert(fold(nickname), user.uid);
        self.users.insert(user.uid, user.clone());
        Some(user)
    }

    /// Remove `nickname` from `channel`. Returns the dropped user if that was
    /// the last shared channel.
    pub fn user_left(&mut self, nickname: &str, channel: &str) -> Option<User> {
        let user = self.by_nick_mut(nickname)?;
        user.channels.remove(channel);
        if user.channels.is_empty() {
            self.remove(nickname)
        } else {
            None
        }
    }

    /// The user disconnected from the network.
    pub fn user_quit(&mut self, nickname: &str) -> Option<User> {
        self.remove(nickname)
    }

    /// Forget `channel` for everyone, e.g. when the bot itself parts it.
    /// Returns users that no longer share any channel.
    pub fn channel_left(&mut self, channel: &str) -> Vec<User> {
        let mut gone = Vec::new();
        for user in self.users.values_mut() {
            user.channels.remove(channel);
            if user.channels.is_empty() {
                gone.push(user.nickname.clone());
            }
        }
        gone.iter().filter_map(|nick| self.remove(nick)).collect()
    }

    /// Returns false if `old` is unknown.
    pub fn user_renamed(&mut self, old: &str, new: &str) -> bool {
        let Some(uid) = self.by_nick.remove(&fold(old)) else {
            return false;
        };
        self.by_nick.insert(fold(new), uid);
        if let Some(user) = self.users.get_mut(&uid) {
            user.nickname = new.to_string();
        }
        debug!(old = %old, new = %new, uid, "user renamed");
        true
    }

    fn remove(&mut self, nickname: &str) -> Option<User> {
        let uid = self.by_nick.remove(&fold(nickname))?;
        let user = self.users.remove(&uid)?;
        debug!(nick = %user.nickname, uid, "user removed");
        Some(user)
    }

    pub fn by_nick(&self, nickname: &str) -> Option<&User> {
        let uid = self.by_nick.get(&fold(nickname))?;
        self.users.get(uid)
    }

    pub fn by_nick_mut(&mut self, nickname: &str) -> Option<&mut User> {
        let uid = self.by_nick.get(&fold(nickname))?;
        self.users.get_mut(uid)
    }

    pub fn by_uid(&self, uid: u64) -> Option<&User> {
        self.users.get(&uid)
    }

    /// Power of `nickname`, 0 for unknown users.
    pub fn power_of(&self, nickname: &str) -> i32 {
        self.by_nick(nickname).map_or(0, |u| u.power)
    }

    /// Returns false if the user is unknown.
    pub fn set_power(&mut self, nickname: &str, power: i32) -> bool {
        match self.by_nick_mut(nickname) {
            Some(user) => {
                user.power = power;
                true
            },
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Drop everything, e.g. after the connection was lost.
    pub fn clear(&mut self) {
        self.users.clear();
        self.by_nick.clear();
    }
}
