use std::sync::{Arc, RwLock};

use {
    danmu_common::Envelope,
    serde::Serialize,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    pipeline::{Pipeline, PipelineStats},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub total: usize,
    pub enabled: usize,
    pub pipelines: Vec<PipelineStats>,
}

/// Owns every pipeline of one connection session and fans inbound envelopes
/// out to them.
pub struct PipelineManager {
    pipelines: RwLock<Vec<Arc<Pipeline>>>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Default for PipelineManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineManager {
    pub fn new() -> Self {
        Self {
            pipelines: RwLock::new(Vec::new()),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn add(&self, pipeline: Arc<Pipeline>) {
        debug!(pipeline = pipeline.name(), "pipeline added");
        self.pipelines
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(pipeline);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.snapshot().into_iter().find(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach a pipeline and shut it down.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let removed = {
            let mut pipelines = self.pipelines.write().unwrap_or_else(|e| e.into_inner());
            let index = pipelines.iter().position(|p| p.name() == name);
            index.map(|i| pipelines.remove(i))
        };
        let pipeline = removed.ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })?;
        pipeline.shutdown().await;
        debug!(pipeline = name, "pipeline removed");
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let pipeline = self.get(name).ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })?;
        pipeline.set_enabled(enabled);
        Ok(())
    }

    pub fn stats(&self) -> ManagerStats {
        let pipelines: Vec<PipelineStats> = self.snapshot().iter().map(|p| p.stats()).collect();
        ManagerStats {
            total: pipelines.len(),
            enabled: pipelines.iter().filter(|p| p.enabled).count(),
            pipelines,
        }
    }

    /// Launch one concurrent `process` per enabled pipeline and return
    /// without waiting. Returns how many pipelines were launched.
    pub fn dispatch(&self, envelope: Envelope) -> usize {
        if self.cancel.is_cancelled() {
            return 0;
        }
        let targets: Vec<Arc<Pipeline>> = self
            .snapshot()
            .into_iter()
            .filter(|p| p.is_enabled())
            .collect();

        for pipeline in &targets {
            let pipeline = Arc::clone(pipeline);
            let envelope = envelope.clone();
            let cancel = self.cancel.clone();
            self.tasks.spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {},
                    result = pipeline.process(envelope) => {
                        if let Err(e) = result {
                            warn!(pipeline = pipeline.name(), error = %e, "pipeline failed to process event");
                        }
                    },
                }
            });
        }
        targets.len()
    }

    /// Cancel pending dispatches, then shut every pipeline down in turn,
    /// each draining its own consumers.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        let pipelines = self.snapshot();
        for pipeline in &pipelines {
            pipeline.shutdown().await;
        }
        info!(pipelines = pipelines.len(), "pipeline manager shut down");
    }

    fn snapshot(&self) -> Vec<Arc<Pipeline>> {
        self.pipelines
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
