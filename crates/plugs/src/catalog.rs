use std::{collections::HashMap, fmt, sync::Arc};

use crate::plug::{Plug, PlugInit};

/// Builds a fresh plug instance.
pub type PlugFactory = Arc<dyn Fn(&PlugInit) -> anyhow::Result<Arc<dyn Plug>> + Send + Sync>;

/// Plug implementations available for loading, by name.
///
/// The kernel calls the factory on every load and never caches instances,
/// so replacing a factory and reloading the plug swaps in the new code.
#[derive(Clone, Default)]
pub struct PlugCatalog {
    factories: HashMap<String, PlugFactory>,
}

impl fmt::Debug for PlugCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlugCatalog")
            .field("names", &self.names())
            .finish()
    }
}

impl PlugCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a factory. Returns the previous one, if any.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Option<PlugFactory>
    where
        F: Fn(&PlugInit) -> anyhow::Result<Arc<dyn Plug>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory))
    }

    pub fn unregister(&mut self, name: &str) -> Option<PlugFactory> {
        self.factories.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<PlugFactory> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plug::{Capabilities, Interests};

    struct Named(&'static str);

    impl Plug for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
        }

        fn interests(&self) -> Interests {
            Interests::new()
        }
    }

    fn init(name: &str) -> PlugInit {
        PlugInit {
            name: name.into(),
            settings: serde_json::Value::Null,
            starting_up: false,
        }
    }

    #[test]
    fn register_replace_and_list() {
        let mut catalog = PlugCatalog::new();
        assert!(
            catalog
                .register("B", |_| Ok(Arc::new(Named("B")) as Arc<dyn Plug>))
                .is_none()
        );
        catalog.register("A", |_| Ok(Arc::new(Named("A")) as Arc<dyn Plug>));
        assert_eq!(catalog.names(), vec!["A", "B"]);

        let previous = catalog.register("A", |_| anyhow::bail!("broken"));
        assert!(previous.is_some());
        let factory = catalog.get("A").unwrap();
        assert!(factory(&init("A")).is_err());

        assert!(catalog.unregister("A").is_some());
        assert!(!catalog.contains("A"));
        assert!(catalog.get("Ghost").is_none());
    }
}
