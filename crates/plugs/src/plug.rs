use std::{fmt, ops::BitOr};

use {anyhow::Result, serde::de::DeserializeOwned};

use crate::{
    event::{Event, EventKind},
    kernel::Kernel,
};

/// Identity of one loaded plug instance. A reload yields a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlugId(pub(crate) u64);

impl fmt::Display for PlugId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which optional parts of the [`Plug`] contract an implementation provides.
///
/// Read once at load time; the kernel never calls a hook the plug did not
/// declare.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const CATEGORY: Self = Self(1);
    pub const COMMAND: Self = Self(1 << 1);
    pub const RAW: Self = Self(1 << 2);
    pub const ON_LOAD: Self = Self(1 << 3);
    pub const ON_UNLOAD: Self = Self(1 << 4);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::CATEGORY, "category"),
        (Self::COMMAND, "command"),
        (Self::RAW, "raw"),
        (Self::ON_LOAD, "on_load"),
        (Self::ON_UNLOAD, "on_unload"),
    ];

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Capabilities in `self` that are absent from `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Capabilities({})", names.join(" | "))
    }
}

/// Hooks a plug wants, declared once per instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interests {
    pub events: Vec<EventKind>,
    pub commands: Vec<String>,
    pub raw: Vec<String>,
}

impl Interests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(mut self, kind: EventKind) -> Self {
        self.events.push(kind);
        self
    }

    pub fn command(mut self, name: impl Into<String>) -> Self {
        self.commands.push(name.into());
        self
    }

    pub fn commands<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn raw(mut self, code: impl Into<String>) -> Self {
        self.raw.push(code.into());
        self
    }

    /// Handler capabilities needed to serve these interests.
    pub fn required_capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::NONE;
        if !self.events.is_empty() {
            caps = caps | Capabilities::CATEGORY;
        }
        if !self.commands.is_empty() {
            caps = caps | Capabilities::COMMAND;
        }
        if !self.raw.is_empty() {
            caps = caps | Capabilities::RAW;
        }
        caps
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.commands.is_empty() && self.raw.is_empty()
    }
}

/// Everything a factory gets when the kernel instantiates a plug.
#[derive(Debug, Clone)]
pub struct PlugInit {
    pub name: String,
    /// The plug's section of `[plugs.settings]`, or `Null`.
    pub settings: serde_json::Value,
    /// True while the bot is still signing on.
    pub starting_up: bool,
}

impl PlugInit {
    /// Deserialize the plug's settings, falling back to `T::default()` when
    /// none are configured.
    pub fn settings<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if self.settings.is_null() {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(self.settings.clone())?)
    }
}

/// A loadable behavior unit.
///
/// Handlers run synchronously on the session task and receive the kernel
/// for the duration of the call. They must return quickly: a blocking
/// handler stalls every other event, keep-alives included. Long work belongs
/// on a spawned task that reports back through a clone of
/// [`Kernel::outbound`]. That clone stops sending when the connection drops;
/// the task should exit once [`Outbound::send`](crate::Outbound::send)
/// returns false.
///
/// Plugs are shared (`Arc`) and called through `&self`; keep mutable state
/// behind a lock and never hold that lock while calling back into the
/// kernel, since the kernel may call `on_unload` on the same instance from
/// inside one of its handlers.
pub trait Plug: Send + Sync {
    /// Must equal the name the plug is registered under in the catalog.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn interests(&self) -> Interests;

    fn handle_event(&self, _kernel: &mut Kernel, _event: &Event) -> Result<()> {
        Ok(())
    }

    /// `argv[0]` is the command name without the prefix.
    fn handle_command(
        &self,
        _kernel: &mut Kernel,
        _source: &str,
        _target: &str,
        _argv: &[String],
    ) -> Result<()> {
        Ok(())
    }

    fn handle_raw(
        &self,
        _kernel: &mut Kernel,
        _code: &str,
        _prefix: Option<&str>,
        _params: &[String],
    ) -> Result<()> {
        Ok(())
    }

    /// Runs once, after the plug's hooks are registered.
    fn on_load(&self, _kernel: &mut Kernel) -> Result<()> {
        Ok(())
    }

    /// Runs once, before the plug's hooks are removed.
    fn on_unload(&self, _kernel: &mut Kernel) -> Result<()> {
        Ok(())
    }
}
