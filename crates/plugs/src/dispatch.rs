use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};

#[cfg(feature = "metrics")]
use metrics::counter;
use tracing::{error, trace};

use crate::{
    error::KernelError,
    event::Event,
    kernel::Kernel,
    plug::{Plug, PlugId},
};

/// Outcome of one dispatch call.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Handlers invoked, faulted ones included.
    pub delivered: usize,
    pub faults: Vec<KernelError>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Run a plug callback, turning both `Err` and panics into a message.
pub(crate) fn guarded<F>(f: F) -> Result<(), String>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

impl Kernel {
    /// Deliver a simple category event to every subscriber.
    pub fn dispatch_event(&mut self, event: &Event) -> DispatchReport {
        let kind = event.kind();
        let snapshot = self.hooks.lookup(kind);
        self.fan_out(snapshot, kind.as_str(), |plug, kernel| {
            plug.handle_event(kernel, event)
        })
    }

    /// Deliver `argv` to the plugs serving `argv[0]`. Empty argv is a no-op.
    pub fn dispatch_command(
        &mut self,
        source: &str,
        target: &str,
        argv: &[String],
    ) -> DispatchReport {
        let Some(command) = argv.first() else {
            return DispatchReport::default();
        };
        let snapshot = self.hooks.lookup_command(command);
        self.fan_out(snapshot, "command", |plug, kernel| {
            plug.handle_command(kernel, source, target, argv)
        })
    }

    /// Deliver a raw server line to the plugs watching `code`.
    pub fn dispatch_raw(
        &mut self,
        code: &str,
        prefix: Option<&str>,
        params: &[String],
    ) -> DispatchReport {
        let snapshot = self.hooks.lookup_raw(code);
        self.fan_out(snapshot, "raw", |plug, kernel| {
            plug.handle_raw(kernel, code, prefix, params)
        })
    }

    /// Call `handler` for every id in the snapshot whose instance is still
    /// live when its turn comes.
    fn fan_out<F>(
        &mut self,
        snapshot: Vec<PlugId>,
        event: &str,
        mut handler: F,
    ) -> DispatchReport
    where
        F: FnMut(&dyn Plug, &mut Kernel) -> anyhow::Result<()>,
    {
        let mut report = DispatchReport::default();
        for id in snapshot {
            let Some((name, plug)) = self.instance(id) else {
                trace!(id = %id, event, "skipping plug removed during dispatch");
                continue;
            };
            report.delivered += 1;
            if let Err(reason) = guarded(|| handler(plug.as_ref(), self)) {
                error!(plug = %name, event, error = %reason, "plug handler failed");
                #[cfg(feature = "metrics")]
                counter!("wicket_plug_handler_faults_total", "plug" => name.clone()).increment(1);
                report.faults.push(KernelError::HandlerFault {
                    plug: name,
                    event: event.to_string(),
                    reason,
                });
            }
        }
        #[cfg(feature = "metrics")]
        counter!("wicket_dispatch_total", "event" => event.to_string()).increment(1);
        report
    }
}
