//! Plugs shipped with wicket.

pub mod admin;
pub mod auth;

use wicket_plugs::PlugCatalog;

pub use {
    admin::CorePlug,
    auth::{AuthPlug, AuthSettings},
};

/// Add every bundled plug to `catalog`.
pub fn register(catalog: &mut PlugCatalog) {
    catalog.register(admin::NAME, CorePlug::factory);
    catalog.register(auth::NAME, AuthPlug::factory);
}

/// A catalog holding only the bundled plugs.
pub fn catalog() -> PlugCatalog {
    let mut catalog = PlugCatalog::new();
    register(&mut catalog);
    catalog
}

#[cfg(test)]
pub(crate) mod testing {
    use {
        tokio::sync::mpsc,
        wicket_plugs::{Kernel, KernelSettings},
    };

    /// Kernel over the bundled catalog with a captured outbound queue.
    pub(crate) fn kernel(settings: KernelSettings) -> (Kernel, mpsc::UnboundedReceiver<String>) {
        let mut kernel = Kernel::new(super::catalog(), settings);
        let (tx, rx) = mpsc::unbounded_channel();
        kernel.outbound_mut().attach(tx);
        (kernel, rx)
    }

    pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }
}
