//! The Core plug: administrative commands for listing plugs and commands,
//! sending raw lines, quitting and hot reload.

use std::sync::Arc;

use {
    anyhow::Result,
    tracing::{info, warn},
    wicket_plugs::{Capabilities, Interests, Kernel, Plug, PlugInit},
    wicket_users::ADMIN_POWER,
};

pub const NAME: &str = "Core";

const COMMANDS: [&str; 5] = ["plugs", "commands", "raw", "quit", "reload"];

#[derive(Debug, Default)]
pub struct CorePlug;

impl CorePlug {
    pub fn factory(_init: &PlugInit) -> Result<Arc<dyn Plug>> {
        Ok(Arc::new(Self))
    }

    fn reload(&self, kernel: &mut Kernel, source: &str, target: &str, names: &[String]) {
        for name in names {
            if let Err(e) = kernel.remove(name) {
                warn!(plug = %name, error = %e, "tried to remove unknown plug");
            }
            match kernel.load(name) {
                Ok(id) => info!(plug = %name, %id, requested_by = source, "plug reloaded"),
                Err(e) => {
                    warn!(plug = %name, error = %e, "reload failed");
                    kernel.respond(source, target, &format!("Failed to import {name}."));
                },
            }
        }
    }
}

impl Plug for CorePlug {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COMMAND
    }

    fn interests(&self) -> Interests {
        Interests::new().commands(COMMANDS)
    }

    fn handle_command(
        &self,
        kernel: &mut Kernel,
        source: &str,
        target: &str,
        argv: &[String],
    ) -> Result<()> {
        let Some((command, args)) = argv.split_first() else {
            return Ok(());
        };
        let admin = kernel.users().power_of(source) >= ADMIN_POWER;
        match command.as_str() {
            "plugs" => {
                let listing = kernel.loaded().join(", ");
                kernel.respond(source, target, &listing);
            },
            "commands" => {
                let listing = kernel.commands().join(", ");
                kernel.respond(source, target, &listing);
            },
            "raw" if admin => {
                kernel.send_line(&args.join(" "));
            },
            "quit" if admin => {
                kernel.request_shutdown(format!("Requested by {source}"));
            },
            "reload" if admin => self.reload(kernel, source, target, args),
            "raw" | "quit" | "reload" => {
                warn!(user = source, command = %command, "insufficient power");
            },
            _ => {},
        }
        Ok(())
    }
}
