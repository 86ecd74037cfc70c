use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use {
    tracing::{debug, info, warn},
    wicket_protocol::{Message, is_channel},
    wicket_users::Users,
};

use crate::{
    catalog::PlugCatalog,
    dispatch::guarded,
    error::KernelError,
    hooks::HookRegistry,
    outbound::Outbound,
    plug::{Capabilities, Plug, PlugId, PlugInit},
};

/// Kernel construction parameters.
#[derive(Debug, Clone)]
pub struct KernelSettings {
    pub nickname: String,
    /// Prefix that marks a channel message as a command, e.g. `!`.
    pub command_prefix: String,
    /// Per-plug settings, handed to factories as [`PlugInit::settings`].
    pub plug_settings: HashMap<String, serde_json::Value>,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            nickname: "wicket".into(),
            command_prefix: "!".into(),
            plug_settings: HashMap::new(),
        }
    }
}

pub(crate) struct LoadedPlug {
    pub(crate) id: PlugId,
    pub(crate) plug: Arc<dyn Plug>,
    pub(crate) caps: Capabilities,
}

/// Owner of the hook registry, the active plug set and the services lent to
/// plugs while they run.
pub struct Kernel {
    catalog: PlugCatalog,
    pub(crate) hooks: HookRegistry,
    /// name → live instance
    pub(crate) active: HashMap<String, LoadedPlug>,
    /// id → name (reverse lookup for dispatch)
    pub(crate) names: HashMap<PlugId, String>,
    /// Instances whose `on_unload` is currently running.
    unloading: HashSet<PlugId>,
    /// Set while `unload_all` runs; loads are refused until it finishes.
    unloading_all: bool,
    next_id: u64,
    users: Users,
    outbound: Outbound,
    nickname: String,
    command_prefix: String,
    plug_settings: HashMap<String, serde_json::Value>,
    starting_up: bool,
    shutdown: Option<String>,
}

impl Kernel {
    pub fn new(catalog: PlugCatalog, settings: KernelSettings) -> Self {
        Self {
            catalog,
            hooks: HookRegistry::new(),
            active: HashMap::new(),
            names: HashMap::new(),
            unloading: HashSet::new(),
            unloading_all: false,
            next_id: 0,
            users: Users::new(),
            outbound: Outbound::new(),
            nickname: settings.nickname,
            command_prefix: settings.command_prefix,
            plug_settings: settings.plug_settings,
            starting_up: true,
            shutdown: None,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Instantiate the plug registered as `name`, register its hooks and run
    /// its `on_load`.
    pub fn load(&mut self, name: &str) -> Result<PlugId, KernelError> {
        if self.unloading_all {
            return Err(KernelError::import(name, "plugs are being unloaded"));
        }
        if self.active.contains_key(name) {
            return Err(KernelError::AlreadyLoaded {
                name: name.to_string(),
            });
        }
        let factory = self
            .catalog
            .get(name)
            .ok_or_else(|| KernelError::import(name, "no implementation registered"))?;

        let init = PlugInit {
            name: name.to_string(),
            settings: self
                .plug_settings
                .get(name)
                .cloned()
                .unwrap_or(serde_json::Value::Null),
            starting_up: self.starting_up,
        };
        let mut built = None;
        guarded(|| {
            built = Some(factory(&init)?);
            Ok(())
        })
        .map_err(|reason| KernelError::import(name, reason))?;
        let plug = built.ok_or_else(|| KernelError::import(name, "factory produced nothing"))?;

        if plug.name() != name {
            return Err(KernelError::import(
                name,
                format!("implementation reports name '{}'", plug.name()),
            ));
        }

        let caps = plug.capabilities();
        let interests = plug.interests();
        let missing = interests.required_capabilities().difference(caps);
        if !missing.is_empty() {
            return Err(KernelError::import(
                name,
                format!("declares hooks without handlers: {missing:?}"),
            ));
        }

        self.next_id += 1;
        let id = PlugId(self.next_id);
        for kind in &interests.events {
            if !self.hooks.register(*kind, id) {
                self.hooks.unregister_all(id);
                return Err(KernelError::import(
                    name,
                    format!("'{kind}' is not a simple event category"),
                ));
            }
        }
        for command in &interests.commands {
            self.hooks.register_command(command, id);
        }
        for code in &interests.raw {
            self.hooks.register_raw(code, id);
        }

        self.names.insert(id, name.to_string());
        self.active.insert(name.to_string(), LoadedPlug {
            id,
            plug: Arc::clone(&plug),
            caps,
        });
        info!(plug = %name, id = %id, "plug loaded");

        if caps.contains(Capabilities::ON_LOAD)
            && let Err(reason) = guarded(|| plug.on_load(self))
        {
            if self.names.contains_key(&id) {
                self.hooks.unregister_all(id);
                self.names.remove(&id);
                self.active.remove(name);
            }
            warn!(plug = %name, error = %reason, "on_load failed, plug rolled back");
            return Err(KernelError::import(name, format!("on_load failed: {reason}")));
        }

        Ok(id)
    }

    /// Run the plug's `on_unload`, drop its hooks, then forget it.
    ///
    /// Unload failures are logged and never block removal.
    pub fn remove(&mut self, name: &str) -> Result<(), KernelError> {
        let (id, plug, caps) = match self.active.get(name) {
            Some(loaded) if !self.unloading.contains(&loaded.id) => {
                (loaded.id, Arc::clone(&loaded.plug), loaded.caps)
            },
            _ => return Err(KernelError::not_found(name)),
        };

        if caps.contains(Capabilities::ON_UNLOAD) {
            self.unloading.insert(id);
            if let Err(reason) = guarded(|| plug.on_unload(self)) {
                warn!(plug = %name, error = %reason, "on_unload failed");
            }
            self.unloading.remove(&id);
        }

        self.hooks.unregister_all(id);
        self.names.remove(&id);
        self.active.remove(name);
        info!(plug = %name, id = %id, "plug removed");
        Ok(())
    }

    /// Remove then load `name`. A plug that was not active is simply loaded.
    /// If the load fails the plug stays unloaded.
    pub fn reload(&mut self, name: &str) -> Result<PlugId, KernelError> {
        if let Err(e) = self.remove(name) {
            debug!(plug = %name, error = %e, "reload: nothing to remove");
        }
        self.load(name)
    }

    /// Load every name in order, logging failures. Returns how many loaded.
    pub fn load_all<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let mut loaded = 0;
        for name in names.iter().map(AsRef::as_ref) {
            match self.load(name) {
                Ok(_) => loaded += 1,
                Err(e) => warn!(plug = %name, error = %e, "failed to load plug"),
            }
        }
        loaded
    }

    /// Remove every active plug, running each `on_unload` exactly once.
    /// Nothing is active afterwards: loads attempted from an `on_unload`
    /// are refused.
    pub fn unload_all(&mut self) {
        self.unloading_all = true;
        while !self.active.is_empty() {
            let mut names: Vec<String> = self.active.keys().cloned().collect();
            names.sort_unstable();
            for name in names {
                // An earlier on_unload may already have removed this one.
                let _ = self.remove(&name);
            }
        }
        self.unloading_all = false;
    }

    /// Active plug names, sorted.
    pub fn loaded(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.active.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    pub fn plug_id(&self, name: &str) -> Option<PlugId> {
        self.active.get(name).map(|l| l.id)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<&str> {
        self.hooks.commands()
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn catalog(&self) -> &PlugCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut PlugCatalog {
        &mut self.catalog
    }

    // ── Services ─────────────────────────────────────────────────────────────

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub fn outbound_mut(&mut self) -> &mut Outbound {
        &mut self.outbound
    }

    /// Queue a raw protocol line. Returns false if not connected.
    pub fn send_line(&self, line: &str) -> bool {
        self.outbound.send(line)
    }

    /// PRIVMSG `target`, one line per line of `text`.
    pub fn msg(&self, target: &str, text: &str) -> bool {
        self.send_text("PRIVMSG", target, text)
    }

    pub fn notice(&self, target: &str, text: &str) -> bool {
        self.send_text("NOTICE", target, text)
    }

    fn send_text(&self, verb: &str, target: &str, text: &str) -> bool {
        text.lines().filter(|l| !l.is_empty()).fold(true, |ok, line| {
            let line = Message::new(verb, vec![target.to_string(), line.to_string()]).to_line();
            self.outbound.send(&line) && ok
        })
    }

    /// Reply where a message came from: in the channel addressed to
    /// `source`, or privately when `target` was the bot itself.
    pub fn respond(&self, source: &str, target: &str, text: &str) -> bool {
        if is_channel(target) {
            self.msg(target, &format!("{source}: {text}"))
        } else {
            self.msg(source, text)
        }
    }

    pub fn join(&self, channel: &str) -> bool {
        self.send_line(&Message::new("JOIN", vec![channel.to_string()]).to_line())
    }

    pub fn users(&self) -> &Users {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut Users {
        &mut self.users
    }

    /// Ask the session to shut down once the current dispatch completes.
    /// The first reason wins.
    pub fn request_shutdown(&mut self, reason: impl Into<String>) {
        if self.shutdown.is_none() {
            let reason = reason.into();
            info!(reason = %reason, "shutdown requested");
            self.shutdown = Some(reason);
        }
    }

    pub fn shutdown_requested(&self) -> Option<&str> {
        self.shutdown.as_deref()
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn set_nickname(&mut self, nickname: impl Into<String>) {
        self.nickname = nickname.into();
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    /// True until the session finishes signing on.
    pub fn starting_up(&self) -> bool {
        self.starting_up
    }

    pub fn set_starting_up(&mut self, starting_up: bool) {
        self.starting_up = starting_up;
    }

    /// Live instance for `id`, unless it was removed or is unloading.
    pub(crate) fn instance(&self, id: PlugId) -> Option<(String, Arc<dyn Plug>)> {
        if self.unloading.contains(&id) {
            return None;
        }
        let name = self.names.get(&id)?;
        let loaded = self.active.get(name)?;
        (loaded.id == id).then(|| (name.clone(), Arc::clone(&loaded.plug)))
    }
}
