use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use {
    danmu_common::Envelope,
    danmu_plugins::{Consumer, Filter, Transform},
    serde::Serialize,
    tokio_util::task::TaskTracker,
    tracing::{debug, trace, warn},
};

use crate::error::{Error, Result};

#[derive(Clone, Default)]
struct Stages {
    filters: Vec<Arc<dyn Filter>>,
    transforms: Vec<Arc<dyn Transform>>,
    consumers: Vec<Arc<dyn Consumer>>,
}

/// What [`Pipeline::process`] did with one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Disabled,
    /// Rejected by the named filter.
    Filtered { by: String },
    NoConsumers,
    /// Handed to this many consumers without waiting for them.
    Dispatched { consumers: usize },
    ShutDown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub name: String,
    pub enabled: bool,
    pub filters: usize,
    pub transforms: usize,
    pub consumers: usize,
}

/// Ordered filter → transform chain feeding a set of consumers.
pub struct Pipeline {
    name: String,
    enabled: AtomicBool,
    stages: RwLock<Stages>,
    /// `true` once shut down. Held for reading while consumer tasks are
    /// spawned so shutdown cannot miss one.
    closed: RwLock<bool>,
    tasks: TaskTracker,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled: AtomicBool::new(enabled),
            stages: RwLock::new(Stages::default()),
            closed: RwLock::new(false),
            tasks: TaskTracker::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        debug!(pipeline = %self.name, enabled, "pipeline toggled");
    }

    pub fn add_filter(&self, filter: Arc<dyn Filter>) {
        self.stages_mut().filters.push(filter);
    }

    pub fn add_transform(&self, transform: Arc<dyn Transform>) {
        self.stages_mut().transforms.push(transform);
    }

    pub fn add_consumer(&self, consumer: Arc<dyn Consumer>) {
        self.stages_mut().consumers.push(consumer);
    }

    pub fn stats(&self) -> PipelineStats {
        let stages = self.snapshot();
        PipelineStats {
            name: self.name.clone(),
            enabled: self.is_enabled(),
            filters: stages.filters.len(),
            transforms: stages.transforms.len(),
            consumers: stages.consumers.len(),
        }
    }

    /// Run one envelope through the chain.
    ///
    /// Filters and transforms run in order on the caller's task. Consumers
    /// each get their own task; this returns without waiting for them. A
    /// transform error aborts this envelope only.
    pub async fn process(&self, envelope: Envelope) -> Result<Outcome> {
        if !self.is_enabled() {
            return Ok(Outcome::Disabled);
        }
        let stages = self.snapshot();

        for filter in &stages.filters {
            if !filter.filter(&envelope) {
                trace!(pipeline = %self.name, filter = filter.name(), kind = %envelope.kind, "filtered");
                return Ok(Outcome::Filtered {
                    by: filter.name().to_string(),
                });
            }
        }

        let mut envelope = envelope;
        for transform in &stages.transforms {
            envelope = transform
                .transform(envelope)
                .await
                .map_err(|e| Error::transform(&self.name, transform.name(), e))?;
        }

        if stages.consumers.is_empty() {
            return Ok(Outcome::NoConsumers);
        }

        let envelope = Arc::new(envelope);
        let closed = self.closed.read().unwrap_or_else(|e| e.into_inner());
        if *closed {
            return Ok(Outcome::ShutDown);
        }
        for consumer in &stages.consumers {
            let consumer = Arc::clone(consumer);
            let envelope = Arc::clone(&envelope);
            let pipeline = self.name.clone();
            self.tasks.spawn(async move {
                if let Err(e) = consumer.consume(envelope).await {
                    warn!(pipeline = %pipeline, consumer = consumer.name(), error = %e, "consume failed");
                }
            });
        }
        drop(closed);

        Ok(Outcome::Dispatched {
            consumers: stages.consumers.len(),
        })
    }

    /// Wait for outstanding consumer invocations, then stop consumers,
    /// transforms and filters in that order. Idempotent.
    pub async fn shutdown(&self) {
        {
            let mut closed = self.closed.write().unwrap_or_else(|e| e.into_inner());
            if *closed {
                return;
            }
            *closed = true;
        }
        self.tasks.close();
        self.tasks.wait().await;

        let stages = self.snapshot();
        for consumer in &stages.consumers {
            if let Err(e) = consumer.stop().await {
                warn!(pipeline = %self.name, plugin = consumer.name(), error = %e, "failed to stop consumer");
            }
        }
        for transform in &stages.transforms {
            if let Err(e) = transform.stop().await {
                warn!(pipeline = %self.name, plugin = transform.name(), error = %e, "failed to stop transform");
            }
        }
        for filter in &stages.filters {
            if let Err(e) = filter.stop().await {
                warn!(pipeline = %self.name, plugin = filter.name(), error = %e, "failed to stop filter");
            }
        }
        debug!(pipeline = %self.name, "pipeline shut down");
    }

    fn snapshot(&self) -> Stages {
        self.stages.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn stages_mut(&self) -> std::sync::RwLockWriteGuard<'_, Stages> {
        self.stages.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{KindFilter, Recorder, Tag, chat, like},
        danmu_common::EventKind,
        std::time::Duration,
    };

    fn pipeline_with(recorder: &Arc<Recorder>) -> Pipeline {
        let pipeline = Pipeline::new("test", true);
        pipeline.add_consumer(Arc::clone(recorder) as Arc<dyn Consumer>);
        pipeline
    }

    #[tokio::test]
    async fn disabled_pipeline_is_noop() {
        let recorder = Recorder::new("rec");
        let pipeline = pipeline_with(&recorder);
        pipeline.set_enabled(false);
        assert_eq!(pipeline.process(chat("hi")).await.unwrap(), Outcome::Disabled);
        pipeline.set_enabled(true);
        assert_eq!(
            pipeline.process(chat("hi")).await.unwrap(),
            Outcome::Dispatched { consumers: 1 }
        );
        pipeline.shutdown().await;
        assert_eq!(recorder.received().len(), 1);
    }

    #[tokio::test]
    async fn filters_are_and_ed() {
        let recorder = Recorder::new("rec");
        let tag = Tag::new("tag", "");
        let pipeline = pipeline_with(&recorder);
        pipeline.add_filter(KindFilter::new("chats", &[EventKind::Chat, EventKind::Like]));
        pipeline.add_filter(KindFilter::new("likes", &[EventKind::Like]));
        pipeline.add_transform(Arc::clone(&tag) as Arc<dyn Transform>);

        assert_eq!(
            pipeline.process(chat("hi")).await.unwrap(),
            Outcome::Filtered { by: "likes".into() }
        );
        assert!(matches!(
            pipeline.process(like()).await.unwrap(),
            Outcome::Dispatched { .. }
        ));
        pipeline.shutdown().await;
        assert_eq!(tag.calls(), 1);
        assert_eq!(recorder.received().len(), 1);
    }

    #[tokio::test]
    async fn transforms_chain_in_order() {
        let recorder = Recorder::new("rec");
        let pipeline = pipeline_with(&recorder);
        pipeline.add_transform(Tag::new("a", "-a"));
        pipeline.add_transform(Tag::new("b", "-b"));
        pipeline.process(chat("x")).await.unwrap();
        pipeline.shutdown().await;
        assert_eq!(recorder.contents(), ["x-a-b"]);
    }

    #[tokio::test]
    async fn transform_error_is_reported_and_pipeline_stays_usable() {
        let recorder = Recorder::new("rec");
        let pipeline = pipeline_with(&recorder);
        pipeline.add_transform(Tag::failing_on("boom"));

        let err = pipeline.process(chat("boom")).await.unwrap_err();
        assert!(matches!(err, Error::Transform { ref plugin, .. } if plugin == "fail"));
        assert!(pipeline.is_enabled());
        assert!(matches!(
            pipeline.process(chat("fine")).await.unwrap(),
            Outcome::Dispatched { .. }
        ));
        pipeline.shutdown().await;
        assert_eq!(recorder.contents(), ["fine"]);
    }

    #[tokio::test]
    async fn no_consumers_succeeds() {
        let pipeline = Pipeline::new("empty", true);
        assert_eq!(pipeline.process(chat("x")).await.unwrap(), Outcome::NoConsumers);
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_consume_then_stops() {
        let slow = Recorder::with_delay("slow", Duration::from_millis(100));
        let pipeline = pipeline_with(&slow);
        pipeline.process(chat("late")).await.unwrap();
        pipeline.shutdown().await;

        assert_eq!(slow.contents(), ["late"]);
        assert!(slow.stopped());
        let after = slow.received().len();
        assert_eq!(pipeline.process(chat("x")).await.unwrap(), Outcome::ShutDown);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(slow.received().len(), after);
    }

    #[tokio::test]
    async fn failing_consumer_does_not_affect_siblings() {
        let ok = Recorder::new("ok");
        let bad = Recorder::failing("bad");
        let pipeline = pipeline_with(&ok);
        pipeline.add_consumer(Arc::clone(&bad) as Arc<dyn Consumer>);
        pipeline.process(chat("a")).await.unwrap();
        pipeline.process(chat("b")).await.unwrap();
        pipeline.shutdown().await;
        assert_eq!(ok.received().len(), 2);
    }

    #[tokio::test]
    async fn stop_order_is_consumers_transforms_filters() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = Recorder::logging("consumer", &log);
        let pipeline = Pipeline::new("order", true);
        pipeline.add_filter(KindFilter::logging("filter", &log));
        pipeline.add_transform(Tag::logging("transform", &log));
        pipeline.add_consumer(recorder);
        pipeline.shutdown().await;
        pipeline.shutdown().await;
        assert_eq!(*log.lock().unwrap(), ["consumer", "transform", "filter"]);
    }

    #[tokio::test]
    async fn stats_count_stages() {
        let pipeline = Pipeline::new("stats", false);
        pipeline.add_filter(KindFilter::new("f", &[]));
        pipeline.add_consumer(Recorder::new("c"));
        assert_eq!(pipeline.stats(), PipelineStats {
            name: "stats".into(),
            enabled: false,
            filters: 1,
            transforms: 0,
            consumers: 1,
        });
    }
}
