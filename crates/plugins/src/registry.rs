use std::{
    collections::HashMap,
    sync::{Arc, LazyLock, RwLock},
};

use tracing::debug;

use crate::{
    descriptor::PluginDescriptor,
    error::{Error, Result},
    plugin::{Capability, Plugin},
};

/// Builds a fresh, uninitialised plugin instance.
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

struct Entry {
    factory: PluginFactory,
    descriptor: Arc<PluginDescriptor>,
}

/// Name → factory map plus the descriptor of each plugin kind.
///
/// Registration is one-shot per name. Assembly code takes a registry
/// explicitly; [`PluginRegistry::global`] is only a convenience default.
pub struct PluginRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

static GLOBAL: LazyLock<PluginRegistry> = LazyLock::new(PluginRegistry::new);

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide default registry.
    pub fn global() -> &'static PluginRegistry {
        &GLOBAL
    }

    /// Register a factory under the descriptor's name.
    pub fn register<F>(&self, descriptor: PluginDescriptor, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(&descriptor.name) {
            return Err(Error::AlreadyRegistered {
                name: descriptor.name,
            });
        }
        debug!(plugin = %descriptor.name, capability = %descriptor.capability, "registered plugin");
        entries.insert(descriptor.name.clone(), Entry {
            factory: Arc::new(factory),
            descriptor: Arc::new(descriptor),
        });
        Ok(())
    }

    /// Create a fresh instance of the named plugin.
    pub fn create(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        let factory = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.get(name).map(|e| Arc::clone(&e.factory))
        };
        match factory {
            Some(factory) => Ok(factory()),
            None => Err(Error::NotFound {
                name: name.to_string(),
                available: self.names(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn descriptor(&self, name: &str) -> Option<Arc<PluginDescriptor>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|e| Arc::clone(&e.descriptor))
    }

    /// All descriptors, sorted by name.
    pub fn descriptors(&self) -> Vec<Arc<PluginDescriptor>> {
        let mut all: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|e| Arc::clone(&e.descriptor))
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn descriptors_of(&self, capability: Capability) -> Vec<Arc<PluginDescriptor>> {
        self.descriptors()
            .into_iter()
            .filter(|d| d.capability == capability)
            .collect()
    }
}
