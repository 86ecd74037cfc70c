use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use {
    tokio::sync::mpsc,
    tracing::{trace, warn},
};

type Slot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// Serialized send path to the connection's writer task.
///
/// Clones share one per-connection slot. `detach` empties it, so every clone
/// handed out during that connection stops sending, and `attach` opens a new
/// slot that old clones never see. Sends while detached are rejected rather
/// than queued, so nothing stale goes out after a reconnect.
#[derive(Debug, Default, Clone)]
pub struct Outbound {
    slot: Slot,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new connection's send path. Clones taken before this call
    /// stay dead.
    pub fn attach(&mut self, sender: mpsc::UnboundedSender<String>) {
        self.detach();
        self.slot = Arc::new(Mutex::new(Some(sender)));
    }

    /// Drop the sender. Once this returns, no clone can queue another line,
    /// and the writer sees the channel close after draining.
    pub fn detach(&mut self) {
        self.sender().take();
    }

    pub fn is_attached(&self) -> bool {
        self.sender().as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Queue one line. Anything after an embedded CR or LF is dropped so a
    /// plug cannot smuggle extra commands. Returns false if rejected.
    pub fn send(&self, line: &str) -> bool {
        let line = match line.find(['\r', '\n']) {
            Some(cut) => {
                warn!(line = %line, "truncating outbound line at embedded newline");
                &line[..cut]
            },
            None => line,
        };
        let guard = self.sender();
        let Some(sender) = guard.as_ref() else {
            warn!(line = %line, "not connected, dropping outbound line");
            return false;
        };
        trace!(line = %line, "queue outbound");
        sender.send(line.to_string()).is_ok()
    }
}
