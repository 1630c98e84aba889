//! Assemble pipelines from configured plugin entries.

use std::sync::Arc;

use {
    danmu_common::EventKind,
    danmu_config::PluginEntry,
    danmu_plugins::{Capability, Plugin, PluginRegistry},
    serde_json::{Map, Value},
    tracing::{info, warn},
};

use crate::{
    error::{Error, Result},
    manager::PipelineManager,
    pipeline::Pipeline,
};

/// Filter inserted when an entry restricts its event kinds.
pub const EVENT_KIND_FILTER: &str = "event_kind_filter";
/// Transform every pipeline runs before its consumer.
pub const FORMAT_TRANSFORM: &str = "format_transform";

#[derive(Debug)]
pub struct BuildFailure {
    pub entry: String,
    pub error: Error,
}

pub struct BuildReport {
    pub manager: PipelineManager,
    pub failures: Vec<BuildFailure>,
}

/// Build one pipeline per enabled consumer entry.
///
/// Each pipeline is `[event_kind_filter] → format_transform → consumer`. A
/// failure in any stage skips that pipeline only; stages it had already
/// started are stopped.
pub async fn build_pipelines(registry: &PluginRegistry, entries: &[PluginEntry]) -> BuildReport {
    let manager = PipelineManager::new();
    let mut failures = Vec::new();

    for entry in entries.iter().filter(|e| e.enabled) {
        match build_pipeline(registry, entry).await {
            Ok(pipeline) => {
                info!(pipeline = pipeline.name(), "pipeline ready");
                manager.add(Arc::new(pipeline));
            },
            Err(error) => {
                warn!(entry = %entry.name, error = %error, "skipping pipeline");
                failures.push(BuildFailure {
                    entry: entry.name.clone(),
                    error,
                });
            },
        }
    }

    BuildReport { manager, failures }
}

/// One enabled entry per registered consumer, allowing every event kind and
/// carrying the descriptor defaults.
pub fn default_plugin_entries(registry: &PluginRegistry) -> Vec<PluginEntry> {
    registry
        .descriptors_of(Capability::Consumer)
        .into_iter()
        .map(|descriptor| PluginEntry {
            name: descriptor.name.clone(),
            enabled: true,
            event_kinds: EventKind::ALL.to_vec(),
            config: descriptor.defaults(),
        })
        .collect()
}

async fn build_pipeline(registry: &PluginRegistry, entry: &PluginEntry) -> Result<Pipeline> {
    let pipeline = Pipeline::new(format!("{}_pipeline", entry.name), true);
    if let Err(e) = assemble(registry, entry, &pipeline).await {
        pipeline.shutdown().await;
        return Err(e);
    }
    Ok(pipeline)
}

async fn assemble(registry: &PluginRegistry, entry: &PluginEntry, pipeline: &Pipeline) -> Result<()> {
    if !entry.event_kinds.is_empty() {
        let kinds = entry
            .event_kinds
            .iter()
            .map(|k| Value::String(k.as_str().to_string()))
            .collect();
        let mut raw = Map::new();
        raw.insert("types".into(), Value::Array(kinds));
        let filter = start_stage(registry, EVENT_KIND_FILTER, Capability::Filter, &raw, |p| {
            p.as_filter()
        })
        .await?;
        pipeline.add_filter(filter);
    }

    let transform = start_stage(
        registry,
        FORMAT_TRANSFORM,
        Capability::Transform,
        &Map::new(),
        |p| p.as_transform(),
    )
    .await?;
    pipeline.add_transform(transform);

    let consumer = start_stage(registry, &entry.name, Capability::Consumer, &entry.config, |p| {
        p.as_consumer()
    })
    .await?;
    pipeline.add_consumer(consumer);
    Ok(())
}

/// Create → capability check → init → start.
async fn start_stage<T>(
    registry: &PluginRegistry,
    name: &str,
    capability: Capability,
    raw: &Map<String, Value>,
    cast: fn(Arc<dyn Plugin>) -> Option<Arc<T>>,
) -> Result<Arc<T>>
where
    T: ?Sized + Send + Sync,
{
    let plugin = registry.create(name)?;
    let stage = cast(Arc::clone(&plugin)).ok_or_else(|| danmu_plugins::Error::MissingCapability {
        name: name.to_string(),
        capability,
    })?;
    let descriptor = registry
        .descriptor(name)
        .ok_or_else(|| danmu_plugins::Error::NotFound {
            name: name.to_string(),
            available: registry.names(),
        })?;
    let config = descriptor.resolve(raw)?;

    if let Err(e) = plugin.init(config).await {
        stop_after_failure(plugin.as_ref(), name, "init").await;
        return Err(danmu_plugins::Error::lifecycle(name, "init", e).into());
    }
    if let Err(e) = plugin.start().await {
        stop_after_failure(plugin.as_ref(), name, "start").await;
        return Err(danmu_plugins::Error::lifecycle(name, "start", e).into());
    }
    Ok(stage)
}

/// Release whatever a half-started plugin acquired.
async fn stop_after_failure(plugin: &dyn Plugin, name: &str, stage: &'static str) {
    if let Err(e) = plugin.stop().await {
        warn!(plugin = name, stage, error = %e, "failed to stop plugin after lifecycle error");
    }
}
