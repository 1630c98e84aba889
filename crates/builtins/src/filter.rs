use std::sync::{Arc, RwLock};

use {
    anyhow::Result,
    async_trait::async_trait,
    danmu_common::{Envelope, EventKind},
    danmu_plugins::{Capability, ConfigField, Filter, Plugin, PluginConfig, PluginDescriptor, PluginRegistry},
    tracing::debug,
};

pub const NAME: &str = "event_kind_filter";

/// Passes envelopes whose kind is on the allow-list. An empty list allows
/// every kind.
#[derive(Default)]
pub struct EventKindFilter {
    allowed: RwLock<Vec<EventKind>>,
}

impl EventKindFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allowing(kinds: &[EventKind]) -> Self {
        Self {
            allowed: RwLock::new(kinds.to_vec()),
        }
    }
}

#[async_trait]
impl Plugin for EventKindFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn capability(&self) -> Capability {
        Capability::Filter
    }

    async fn init(&self, config: PluginConfig) -> Result<()> {
        let kinds = config
            .choices("types")?
            .iter()
            .map(|name| name.parse::<EventKind>())
            .collect::<Result<Vec<_>, _>>()?;
        debug!(kinds = ?kinds, "event kind filter configured");
        *self.allowed.write().unwrap_or_else(|e| e.into_inner()) = kinds;
        Ok(())
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn Filter>> {
        Some(self)
    }
}

impl Filter for EventKindFilter {
    fn filter(&self, envelope: &Envelope) -> bool {
        let allowed = self.allowed.read().unwrap_or_else(|e| e.into_inner());
        allowed.is_empty() || allowed.contains(&envelope.kind)
    }
}

pub fn descriptor() -> PluginDescriptor {
    let kinds: Vec<&str> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
    PluginDescriptor::new(NAME, Capability::Filter)
        .with_description("Drop events whose kind is not selected")
        .field(ConfigField::choices(
            "types",
            &kinds,
            &kinds,
            "Event kinds to let through",
        ))
}

pub(crate) fn register(registry: &PluginRegistry) -> danmu_plugins::Result<()> {
    registry.register(descriptor(), || Arc::new(EventKindFilter::new()))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        danmu_common::{ChatData, LikeData, Payload},
        serde_json::{Map, json},
    };

    fn envelope(payload: Payload) -> Envelope {
        Envelope::new("1", "bilibili", payload)
    }

    #[tokio::test]
    async fn allows_only_configured_kinds() {
        let filter = EventKindFilter::new();
        let mut raw = Map::new();
        raw.insert("types".into(), json!(["Chat", "Gift"]));
        filter.init(descriptor().resolve(&raw).unwrap()).await.unwrap();

        assert!(filter.filter(&envelope(Payload::Chat(ChatData::default()))));
        assert!(!filter.filter(&envelope(Payload::Like(LikeData::default()))));
    }

    #[tokio::test]
    async fn empty_allow_list_passes_everything() {
        let filter = EventKindFilter::new();
        let mut raw = Map::new();
        raw.insert("types".into(), json!([]));
        filter.init(descriptor().resolve(&raw).unwrap()).await.unwrap();
        assert!(filter.filter(&envelope(Payload::Like(LikeData::default()))));
    }

    #[test]
    fn defaults_select_all_kinds() {
        let defaults = descriptor().defaults();
        assert_eq!(defaults["types"].as_array().unwrap().len(), EventKind::ALL.len());
    }

    #[test]
    fn unknown_kind_is_rejected_at_resolve() {
        let mut raw = Map::new();
        raw.insert("types".into(), json!(["Dance"]));
        assert!(descriptor().resolve(&raw).is_err());
    }
}
