//! Projects typed payloads into display-ready [`FormattedEnvelope`]s.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    danmu_common::{Envelope, FormattedEnvelope, Payload},
    danmu_plugins::{Capability, Plugin, PluginDescriptor, PluginRegistry, Transform},
};

pub const NAME: &str = "format_transform";

/// Shown when neither the sender nor the platform has an icon.
pub const DEFAULT_USER_AVATAR: &str =
    "https://cdn.jsdelivr.net/npm/remixicon@3.5.0/icons/User/user-fill.svg";

const PLATFORM_ICONS: &[(&str, &str)] = &[
    ("bilibili", "https://cdn.simpleicons.org/bilibili/00a1d6"),
    ("douyu", "https://cdn.simpleicons.org/douyu/ff7500"),
    ("huya", "https://cdn.simpleicons.org/huya/ff6600"),
    ("youtube", "https://cdn.simpleicons.org/youtube/ff0000"),
    ("twitch", "https://cdn.simpleicons.org/twitch/9146ff"),
];

pub fn platform_icon(platform: &str) -> Option<&'static str> {
    PLATFORM_ICONS
        .iter()
        .find(|(name, _)| *name == platform)
        .map(|(_, icon)| *icon)
}

/// Sender avatar, else the platform icon, else the generic user icon.
pub fn avatar_or_fallback(avatar: &str, platform: &str) -> String {
    if !avatar.is_empty() {
        return avatar.to_string();
    }
    platform_icon(platform)
        .unwrap_or(DEFAULT_USER_AVATAR)
        .to_string()
}

/// Build the display projection of an envelope, stamped with the current
/// local time.
pub fn format_envelope(envelope: &Envelope) -> FormattedEnvelope {
    let platform = envelope.platform.as_str();
    let (user, avatar, content) = match &envelope.payload {
        Payload::Chat(d) => (d.name.as_str(), d.avatar.as_str(), d.content.clone()),
        Payload::SuperChat(d) => (
            d.name.as_str(),
            d.avatar.as_str(),
            format!("{:.2} 元: {}", d.price, d.content),
        ),
        Payload::Gift(d) => (
            d.name.as_str(),
            d.avatar.as_str(),
            format!(
                "送出了 {} 个 {} ({:.2} 元)",
                d.num,
                d.item,
                d.num as f64 * d.price
            ),
        ),
        Payload::Subscribe(d) => (d.name.as_str(), d.avatar.as_str(), format!("订阅了 {}", d.item)),
        Payload::Like(d) => (d.name.as_str(), d.avatar.as_str(), format!("点赞了 {} 次", d.count)),
        Payload::EnterRoom(d) => (d.name.as_str(), d.avatar.as_str(), "进入了直播间".to_string()),
        Payload::EndLive(_) => ("", "", "直播结束".to_string()),
    };
    FormattedEnvelope::new(
        envelope.kind,
        user,
        platform,
        avatar_or_fallback(avatar, platform),
        content,
    )
}

/// Attaches a [`FormattedEnvelope`] to every envelope.
#[derive(Default)]
pub struct FormatTransform;

#[async_trait]
impl Plugin for FormatTransform {
    fn name(&self) -> &str {
        NAME
    }

    fn capability(&self) -> Capability {
        Capability::Transform
    }

    fn as_transform(self: Arc<Self>) -> Option<Arc<dyn Transform>> {
        Some(self)
    }
}

#[async_trait]
impl Transform for FormatTransform {
    async fn transform(&self, envelope: Envelope) -> Result<Envelope> {
        let formatted = format_envelope(&envelope);
        Ok(envelope.with_formatted(formatted))
    }
}

pub(crate) fn register(registry: &PluginRegistry) -> danmu_plugins::Result<()> {
    registry.register(
        PluginDescriptor::new(NAME, Capability::Transform)
            .with_description("Render events into display text"),
        || Arc::new(FormatTransform),
    )
}
