use std::collections::{HashMap, HashSet};

use crate::{event::EventKind, plug::PlugId};

/// Interests one plug currently holds, for O(interests) removal.
#[derive(Debug, Default)]
struct Held {
    events: HashSet<EventKind>,
    commands: HashSet<String>,
    raw: HashSet<String>,
}

/// Hook tables: simple category, command name and raw code → plug ids.
///
/// Sets are unordered; callers must not rely on delivery order among peers.
/// Empty entries are pruned, so [`commands`](Self::commands) lists exactly
/// the commands someone currently serves.
#[derive(Debug, Default)]
pub struct HookRegistry {
    by_category: HashMap<EventKind, HashSet<PlugId>>,
    by_command: HashMap<String, HashSet<PlugId>>,
    by_raw: HashMap<String, HashSet<PlugId>>,
    /// plug id → interests held (reverse index)
    held: HashMap<PlugId, Held>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `id` to a simple category. Returns false, registering
    /// nothing, when `kind` needs a key (`Command`, `Raw`).
    pub fn register(&mut self, kind: EventKind, id: PlugId) -> bool {
        if !kind.is_simple() {
            return false;
        }
        self.by_category.entry(kind).or_default().insert(id);
        self.held.entry(id).or_default().events.insert(kind);
        true
    }

    pub fn register_command(&mut self, name: &str, id: PlugId) {
        self.by_command
            .entry(name.to_string())
            .or_default()
            .insert(id);
        self.held
            .entry(id)
            .or_default()
            .commands
            .insert(name.to_string());
    }

    pub fn register_raw(&mut self, code: &str, id: PlugId) {
        self.by_raw.entry(code.to_string()).or_default().insert(id);
        self.held.entry(id).or_default().raw.insert(code.to_string());
    }

    /// Remove `id` from every table. Returns false if it held nothing.
    pub fn unregister_all(&mut self, id: PlugId) -> bool {
        let Some(held) = self.held.remove(&id) else {
            return false;
        };
        for kind in held.events {
            discard(&mut self.by_category, &kind, id);
        }
        for name in held.commands {
            discard(&mut self.by_command, &name, id);
        }
        for code in held.raw {
            discard(&mut self.by_raw, &code, id);
        }
        true
    }

    pub fn lookup(&self, kind: EventKind) -> Vec<PlugId> {
        snapshot(self.by_category.get(&kind))
    }

    pub fn lookup_command(&self, name: &str) -> Vec<PlugId> {
        snapshot(self.by_command.get(name))
    }

    pub fn lookup_raw(&self, code: &str) -> Vec<PlugId> {
        snapshot(self.by_raw.get(code))
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_command.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered raw codes, sorted.
    pub fn raw_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.by_raw.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    /// Every plug id referenced by any table.
    pub fn plug_ids(&self) -> HashSet<PlugId> {
        let mut ids: HashSet<PlugId> = HashSet::new();
        ids.extend(self.by_category.values().flatten());
        ids.extend(self.by_command.values().flatten());
        ids.extend(self.by_raw.values().flatten());
        ids
    }

    pub fn holds(&self, id: PlugId) -> bool {
        self.held.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

fn discard<K>(table: &mut HashMap<K, HashSet<PlugId>>, key: &K, id: PlugId)
where
    K: std::hash::Hash + Eq,
{
    if let Some(set) = table.get_mut(key) {
        set.remove(&id);
        if set.is_empty() {
            table.remove(key);
        }
    }
}

fn snapshot(set: Option<&HashSet<PlugId>>) -> Vec<PlugId> {
    set.map(|s| s.iter().copied().collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PlugId = PlugId(1);
    const B: PlugId = PlugId(2);

    #[test]
    fn register_is_idempotent() {
        let mut hooks = HookRegistry::new();
        assert!(hooks.register(EventKind::Private, A));
        assert!(hooks.register(EventKind::Private, A));
        hooks.register_command("ping", A);
        hooks.register_command("ping", A);
        assert_eq!(hooks.lookup(EventKind::Private), vec![A]);
        assert_eq!(hooks.lookup_command("ping"), vec![A]);
    }

    #[test]
    fn keyed_kinds_rejected() {
        let mut hooks = HookRegistry::new();
        assert!(!hooks.register(EventKind::Command, A));
        assert!(!hooks.register(EventKind::Raw, A));
        assert!(hooks.is_empty());
    }

    #[test]
    fn unknown_keys_are_empty() {
        let hooks = HookRegistry::new();
        assert!(hooks.lookup(EventKind::UserJoined).is_empty());
        assert!(hooks.lookup_command("nope").is_empty());
        assert!(hooks.lookup_raw("999").is_empty());
    }

    #[test]
    fn unregister_all_clears_every_table() {
        let mut hooks = HookRegistry::new();
        hooks.register(EventKind::UserJoined, A);
        hooks.register(EventKind::UserJoined, B);
        hooks.register_command("ping", A);
        hooks.register_command("pong", B);
        hooks.register_raw("330", A);

        assert!(hooks.unregister_all(A));
        assert_eq!(hooks.lookup(EventKind::UserJoined), vec![B]);
        assert!(hooks.lookup_command("ping").is_empty());
        assert!(hooks.lookup_raw("330").is_empty());
        assert_eq!(hooks.commands(), vec!["pong"]);
        assert!(hooks.raw_codes().is_empty());
        assert_eq!(hooks.plug_ids(), HashSet::from([B]));
        assert!(!hooks.holds(A));

        assert!(!hooks.unregister_all(A));
    }

    #[test]
    fn lookup_is_a_snapshot() {
        let mut hooks = HookRegistry::new();
        hooks.register_raw("PONG", A);
        let snap = hooks.lookup_raw("PONG");
        hooks.unregister_all(A);
        assert_eq!(snap, vec![A]);
        assert!(hooks.lookup_raw("PONG").is_empty());
    }
}
