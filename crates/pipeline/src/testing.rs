//! Stage doubles shared by the unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    anyhow::Result,
    async_trait::async_trait,
    danmu_common::{ChatData, Envelope, EventKind, LikeData, Payload},
    danmu_plugins::{Capability, Consumer, Filter, Plugin, Transform},
    tokio::sync::Notify,
};

type Log = Arc<Mutex<Vec<String>>>;

pub fn chat(content: &str) -> Envelope {
    Envelope::new(
        "1",
        "bilibili",
        Payload::Chat(ChatData {
            name: "alice".into(),
            content: content.into(),
            ..Default::default()
        }),
    )
}

pub fn like() -> Envelope {
    Envelope::new(
        "1",
        "bilibili",
        Payload::Like(LikeData {
            name: "bob".into(),
            count: 3,
            ..Default::default()
        }),
    )
}

fn chat_content(envelope: &Envelope) -> String {
    match &envelope.payload {
        Payload::Chat(chat) => chat.content.clone(),
        other => other.kind().to_string(),
    }
}

// ── KindFilter ──────────────────────────────────────────────────────────────

pub struct KindFilter {
    name: String,
    kinds: Vec<EventKind>,
    log: Option<Log>,
}

impl KindFilter {
    pub fn new(name: &str, kinds: &[EventKind]) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kinds: kinds.to_vec(),
            log: None,
        })
    }

    pub fn logging(name: &str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kinds: Vec::new(),
            log: Some(Arc::clone(log)),
        })
    }
}

#[async_trait]
impl Plugin for KindFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> Capability {
        Capability::Filter
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn Filter>> {
        Some(self)
    }

    async fn stop(&self) -> Result<()> {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.name.clone());
        }
        Ok(())
    }
}

impl Filter for KindFilter {
    fn filter(&self, envelope: &Envelope) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&envelope.kind)
    }
}

// ── Tag ─────────────────────────────────────────────────────────────────────

/// Appends a suffix to chat content.
pub struct Tag {
    name: String,
    suffix: String,
    fail_on: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    log: Option<Log>,
}

impl Tag {
    fn build(name: &str, suffix: &str) -> Self {
        Self {
            name: name.into(),
            suffix: suffix.into(),
            fail_on: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            log: None,
        }
    }

    pub fn new(name: &str, suffix: &str) -> Arc<Self> {
        Arc::new(Self::build(name, suffix))
    }

    pub fn failing_on(content: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some(content.into()),
            ..Self::build("fail", "")
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::build("slow", "")
        })
    }

    pub fn logging(name: &str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            log: Some(Arc::clone(log)),
            ..Self::build(name, "")
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for Tag {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> Capability {
        Capability::Transform
    }

    fn as_transform(self: Arc<Self>) -> Option<Arc<dyn Transform>> {
        Some(self)
    }

    async fn stop(&self) -> Result<()> {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.name.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl Transform for Tag {
    async fn transform(&self, mut envelope: Envelope) -> Result<Envelope> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Payload::Chat(chat) = &mut envelope.payload {
            if self.fail_on.as_deref() == Some(chat.content.as_str()) {
                anyhow::bail!("cannot tag {}", chat.content);
            }
            chat.content.push_str(&self.suffix);
        }
        Ok(envelope)
    }
}

// ── Recorder ────────────────────────────────────────────────────────────────

pub struct Recorder {
    name: String,
    delay: Duration,
    fail: bool,
    received: Mutex<Vec<Arc<Envelope>>>,
    stopped: AtomicBool,
    arrived: Notify,
    log: Option<Log>,
}

impl Recorder {
    fn build(name: &str) -> Self {
        Self {
            name: name.into(),
            delay: Duration::ZERO,
            fail: false,
            received: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            arrived: Notify::new(),
            log: None,
        }
    }

    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name))
    }

    pub fn with_delay(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::build(name)
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::build(name)
        })
    }

    pub fn logging(name: &str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            log: Some(Arc::clone(log)),
            ..Self::build(name)
        })
    }

    pub fn received(&self) -> Vec<Arc<Envelope>> {
        self.received.lock().unwrap().clone()
    }

    pub fn contents(&self) -> Vec<String> {
        self.received().iter().map(|e| chat_content(e)).collect()
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` envelopes have arrived.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.arrived.notified();
            if self.received.lock().unwrap().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Plugin for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> Capability {
        Capability::Consumer
    }

    fn as_consumer(self: Arc<Self>) -> Option<Arc<dyn Consumer>> {
        Some(self)
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.name.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl Consumer for Recorder {
    async fn consume(&self, envelope: Arc<Envelope>) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            anyhow::bail!("{} refuses", self.name);
        }
        if self.stopped() {
            return Ok(());
        }
        self.received.lock().unwrap().push(envelope);
        self.arrived.notify_waiters();
        Ok(())
    }
}
