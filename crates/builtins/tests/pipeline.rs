#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    danmu_builtins::register_builtins,
    danmu_common::{ChatData, Envelope, EventKind, LikeData, Payload},
    danmu_config::PluginEntry,
    danmu_pipeline::{Outcome, build_pipelines, default_plugin_entries},
    danmu_plugins::{Capability, Consumer, Plugin, PluginDescriptor, PluginRegistry},
    tokio::sync::mpsc,
};

/// Forwards every consumed envelope to a channel.
struct Capture {
    tx: mpsc::UnboundedSender<Arc<Envelope>>,
}

#[async_trait]
impl Plugin for Capture {
    fn name(&self) -> &str {
        "capture"
    }

    fn capability(&self) -> Capability {
        Capability::Consumer
    }

    fn as_consumer(self: Arc<Self>) -> Option<Arc<dyn Consumer>> {
        Some(self)
    }
}

#[async_trait]
impl Consumer for Capture {
    async fn consume(&self, envelope: Arc<Envelope>) -> anyhow::Result<()> {
        let _ = self.tx.send(envelope);
        Ok(())
    }
}

fn registry() -> (PluginRegistry, mpsc::UnboundedReceiver<Arc<Envelope>>) {
    let registry = PluginRegistry::new();
    register_builtins(&registry, None).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    registry
        .register(PluginDescriptor::new("capture", Capability::Consumer), move || {
            Arc::new(Capture { tx: tx.clone() })
        })
        .unwrap();
    (registry, rx)
}

fn chat(content: &str) -> Envelope {
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

fn like() -> Envelope {
    Envelope::new(
        "1",
        "bilibili",
        Payload::Like(LikeData {
            name: "bob".into(),
            count: 1,
            ..Default::default()
        }),
    )
}

#[tokio::test]
async fn chat_only_pipeline_formats_chat_and_drops_like() {
    let (registry, mut rx) = registry();
    let entry = PluginEntry {
        event_kinds: vec![EventKind::Chat],
        ..PluginEntry::new("capture")
    };
    let report = build_pipelines(&registry, &[entry]).await;
    assert!(report.failures.is_empty());
    let pipeline = report.manager.get("capture_pipeline").unwrap();

    assert!(matches!(
        pipeline.process(like()).await.unwrap(),
        Outcome::Filtered { .. }
    ));
    assert!(matches!(
        pipeline.process(chat("hello")).await.unwrap(),
        Outcome::Dispatched { consumers: 1 }
    ));

    let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let formatted = delivered.formatted.as_ref().unwrap();
    assert_eq!(formatted.content, "hello");
    assert_eq!(formatted.label, "chat");
    assert_eq!(formatted.user_name, "alice");

    report.manager.shutdown().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn manager_fans_out_through_every_default_pipeline() {
    let (registry, mut rx) = registry();
    let entries: Vec<PluginEntry> = default_plugin_entries(&registry)
        .into_iter()
        .filter(|e| e.name == "capture" || e.name == "terminal")
        .collect();
    let report = build_pipelines(&registry, &entries).await;
    assert_eq!(report.manager.names(), ["capture_pipeline", "terminal_pipeline"]);

    assert_eq!(report.manager.dispatch(like()), 2);
    let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered.formatted.as_ref().unwrap().content, "点赞了 1 次");
    report.manager.shutdown().await;
}
