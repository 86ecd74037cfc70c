//! Assigns user power from hostmasks and services accounts.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use {
    anyhow::Result,
    serde::Deserialize,
    tracing::{debug, info},
    wicket_plugs::{Capabilities, Event, EventKind, Interests, Kernel, Plug, PlugInit},
    wicket_protocol::numeric::RPL_WHOISACCOUNT,
};

pub const NAME: &str = "Auth";

/// `[plugs.settings.Auth]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Hostmask → power, applied on join.
    pub hosts: HashMap<String, i32>,
    /// Nicknames worth a WHOIS on join to learn their account.
    pub known: HashSet<String>,
    /// Services account → power, applied on WHOIS reply.
    pub users: HashMap<String, i32>,
}

#[derive(Debug, Default)]
pub struct AuthPlug {
    settings: AuthSettings,
}

impl AuthPlug {
    pub fn new(settings: AuthSettings) -> Self {
        Self { settings }
    }

    pub fn factory(init: &PlugInit) -> Result<Arc<dyn Plug>> {
        Ok(Arc::new(Self::new(init.settings()?)))
    }

    fn user_joined(&self, kernel: &mut Kernel, nickname: &str) {
        let Some(hostmask) = kernel.users().by_nick(nickname).map(|u| u.hostmask.clone()) else {
            debug!(nickname, "joined user missing from directory");
            return;
        };
        let power = self.settings.hosts.get(&hostmask).copied().unwrap_or(0);
        kernel.users_mut().set_power(nickname, power);
        if power != 0 {
            info!(nickname, power, hostmask = %hostmask, "power set from hostmask");
        }
        if self.settings.known.contains(nickname) {
            kernel.send_line(&format!("WHOIS {nickname}"));
        }
    }
}

impl Plug for AuthPlug {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::CATEGORY | Capabilities::RAW
    }

    fn interests(&self) -> Interests {
        Interests::new()
            .event(EventKind::UserJoined)
            .raw(RPL_WHOISACCOUNT)
    }

    fn handle_event(&self, kernel: &mut Kernel, event: &Event) -> Result<()> {
        if let Event::UserJoined { nickname, .. } = event {
            self.user_joined(kernel, nickname);
        }
        Ok(())
    }

    fn handle_raw(
        &self,
        kernel: &mut Kernel,
        code: &str,
        _prefix: Option<&str>,
        params: &[String],
    ) -> Result<()> {
        if code != RPL_WHOISACCOUNT {
            return Ok(());
        }
        let [_, nickname, account, ..] = params else {
            anyhow::bail!("malformed {code} reply: {params:?}");
        };
        if let Some(&power) = self.settings.users.get(account)
            && kernel.users_mut().set_power(nickname, power)
        {
            info!(nickname = %nickname, power, account = %account, "power set from account");
        }
        Ok(())
    }
}
