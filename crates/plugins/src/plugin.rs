use std::{fmt, sync::Arc};

use {
    anyhow::Result,
    async_trait::async_trait,
    danmu_common::Envelope,
    serde::{Deserialize, Serialize},
};

use crate::descriptor::PluginConfig;

/// The role a plugin plays inside a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Filter,
    Transform,
    Consumer,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Filter => "filter",
            Self::Transform => "transform",
            Self::Consumer => "consumer",
        })
    }
}

/// Base lifecycle every plugin instance implements.
///
/// An instance lives for exactly one `init` → `start` → `stop` cycle and is
/// owned by a single pipeline. Methods take `&self`; implementations guard
/// their own runtime state.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Registered plugin name.
    fn name(&self) -> &str;

    /// Primary capability, as declared by the descriptor.
    fn capability(&self) -> Capability;

    /// Apply a validated config. Called at most once, before `start`.
    async fn init(&self, _config: PluginConfig) -> Result<()> {
        Ok(())
    }

    /// Begin background work, if any.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Release all resources. After this returns the plugin produces no
    /// further output, even for work that was in flight.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn Filter>> {
        None
    }

    fn as_transform(self: Arc<Self>) -> Option<Arc<dyn Transform>> {
        None
    }

    fn as_consumer(self: Arc<Self>) -> Option<Arc<dyn Consumer>> {
        None
    }
}

/// Decides whether an envelope continues down the pipeline (`true` = pass).
pub trait Filter: Plugin {
    fn filter(&self, envelope: &Envelope) -> bool;
}

/// Rewrites an envelope. An error aborts the current event for this pipeline.
#[async_trait]
pub trait Transform: Plugin {
    async fn transform(&self, envelope: Envelope) -> Result<Envelope>;
}

/// Final delivery stage. Failures stay inside the invocation.
#[async_trait]
pub trait Consumer: Plugin {
    async fn consume(&self, envelope: Arc<Envelope>) -> Result<()>;
}
