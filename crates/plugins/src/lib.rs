//! Plugin system: lifecycle and capability traits, typed configuration
//! descriptors, the name→factory registry, and the bounded-queue worker used
//! by slow consumers.

pub mod descriptor;
pub mod error;
pub mod plugin;
pub mod queue;
pub mod registry;

pub use {
    descriptor::{ConfigField, ConfigValue, FieldType, PluginConfig, PluginDescriptor},
    error::{Error, Result},
    plugin::{Capability, Consumer, Filter, Plugin, Transform},
    queue::{BoundedQueue, Push},
    registry::{PluginFactory, PluginRegistry},
};
