//! Configurable test plug that records every call it receives.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use crate::{
    catalog::PlugCatalog,
    event::{Event, EventKind},
    kernel::{Kernel, KernelSettings},
    plug::{Capabilities, Interests, Plug},
};

/// Shared call log: entries look like `A@2:command:ping`.
#[derive(Clone, Default)]
pub(crate) struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, suffix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.ends_with(suffix))
            .count()
    }
}

type Hook = Arc<dyn Fn(&mut Kernel, &str) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Scripted {
    name: String,
    interests: Interests,
    caps: Capabilities,
    on_event: Option<Hook>,
    on_command: Option<Hook>,
    on_load: Option<Hook>,
    on_unload: Option<Hook>,
    log: Log,
    tag: String,
}

impl Scripted {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            interests: Interests::new(),
            caps: Capabilities::CATEGORY
                | Capabilities::COMMAND
                | Capabilities::RAW
                | Capabilities::ON_LOAD
                | Capabilities::ON_UNLOAD,
            on_event: None,
            on_command: None,
            on_load: None,
            on_unload: None,
            log: Log::default(),
            tag: format!("{name}@0"),
        }
    }

    pub(crate) fn event(mut self, kind: EventKind) -> Self {
        self.interests = self.interests.event(kind);
        self
    }

    pub(crate) fn command(mut self, name: &str) -> Self {
        self.interests = self.interests.command(name);
        self
    }

    pub(crate) fn raw(mut self, code: &str) -> Self {
        self.interests = self.interests.raw(code);
        self
    }

    pub(crate) fn capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    pub(crate) fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Kernel, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_event = Some(Arc::new(f));
        self
    }

    pub(crate) fn on_command<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Kernel, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_command = Some(Arc::new(f));
        self
    }

    pub(crate) fn on_load<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Kernel, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_load = Some(Arc::new(f));
        self
    }

    pub(crate) fn on_unload<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Kernel, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_unload = Some(Arc::new(f));
        self
    }

    pub(crate) fn build_plug(self) -> Arc<dyn Plug> {
        Arc::new(self)
    }

    fn record(&self, kernel: &mut Kernel, what: String, hook: Option<&Hook>) -> anyhow::Result<()> {
        self.log.push(format!("{}:{what}", self.tag));
        match hook {
            Some(hook) => hook(kernel, &self.tag),
            None => Ok(()),
        }
    }
}

impl Plug for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn interests(&self) -> Interests {
        self.interests.clone()
    }

    fn handle_event(&self, kernel: &mut Kernel, event: &Event) -> anyhow::Result<()> {
        self.record(kernel, format!("event:{}", event.kind()), self.on_event.as_ref())
    }

    fn handle_command(
        &self,
        kernel: &mut Kernel,
        _source: &str,
        _target: &str,
        argv: &[String],
    ) -> anyhow::Result<()> {
        self.record(
            kernel,
            format!("command:{}", argv.join(" ")),
            self.on_command.as_ref(),
        )
    }

    fn handle_raw(
        &self,
        kernel: &mut Kernel,
        code: &str,
        _prefix: Option<&str>,
        _params: &[String],
    ) -> anyhow::Result<()> {
        self.record(kernel, format!("raw:{code}"), None)
    }

    fn on_load(&self, kernel: &mut Kernel) -> anyhow::Result<()> {
        self.record(kernel, "load".into(), self.on_load.as_ref())
    }

    fn on_unload(&self, kernel: &mut Kernel) -> anyhow::Result<()> {
        self.record(kernel, "unload".into(), self.on_unload.as_ref())
    }
}

/// Catalog serving each scripted plug under its name. Every load yields a new
/// generation (`A@1`, `A@2`, ...) sharing one log.
pub(crate) fn catalog_with(plugs: Vec<Scripted>) -> (PlugCatalog, Log) {
    let log = Log::default();
    let mut catalog = PlugCatalog::new();
    for scripted in plugs {
        let generation = Arc::new(AtomicU64::new(0));
        let log = log.clone();
        let name = scripted.name.clone();
        catalog.register(name.clone(), move |_| {
            let n = generation.fetch_add(1, Ordering::SeqCst) + 1;
            let mut instance = scripted.clone();
            instance.log = log.clone();
            instance.tag = format!("{name}@{n}");
            Ok(Arc::new(instance) as Arc<dyn Plug>)
        });
    }
    (catalog, log)
}

pub(crate) fn kernel_with(plugs: Vec<Scripted>) -> (Kernel, Log) {
    let (catalog, log) = catalog_with(plugs);
    (Kernel::new(catalog, KernelSettings::default()), log)
}
