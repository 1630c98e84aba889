use thiserror::Error;

use crate::plugin::Capability;

#[derive(Debug, Error)]
pub enum Error {
    #[error("plugin {name} already registered")]
    AlreadyRegistered { name: String },

    #[error("plugin {name} not found (available: {})", available.join(", "))]
    NotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("plugin {name} does not provide the {capability} capability")]
    MissingCapability {
        name: String,
        capability: Capability,
    },

    #[error("invalid config for plugin {plugin}, field {field}: {reason}")]
    InvalidConfig {
        plugin: String,
        field: String,
        reason: String,
    },

    #[error("plugin {plugin} failed to {stage}: {source}")]
    Lifecycle {
        plugin: String,
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_config(
        plugin: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            plugin: plugin.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn lifecycle(plugin: impl Into<String>, stage: &'static str, source: anyhow::Error) -> Self {
        Self::Lifecycle {
            plugin: plugin.into(),
            stage,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
