//! Plug kernel.
//!
//! A plug is an in-process behavior unit that subscribes to simple event
//! categories, `!commands`, or raw server codes. The [`Kernel`] owns:
//!
//! - the [`HookRegistry`], mapping each event identity to interested plug ids,
//! - the active plug set, at most one live instance per name,
//! - the [`PlugCatalog`] of factories used to instantiate plugs by name,
//! - the user directory and the outbound send path lent to plugs.
//!
//! Dispatch always iterates a snapshot of the subscriber set, so handlers may
//! load, remove or reload plugs (themselves included) while an event is
//! being fanned out. Instances removed mid-dispatch are skipped, instances
//! loaded mid-dispatch only see later events.

pub mod catalog;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod hooks;
pub mod kernel;
pub mod outbound;
pub mod plug;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    catalog::{PlugCatalog, PlugFactory},
    dispatch::DispatchReport,
    error::KernelError,
    event::{Event, EventKind, UnknownEvent},
    hooks::HookRegistry,
    kernel::{Kernel, KernelSettings},
    outbound::Outbound,
    plug::{Capabilities, Interests, Plug, PlugId, PlugInit},
};
