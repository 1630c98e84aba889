//! Plugins every installation ships with: the event-kind filter, the format
//! transform, desktop notifications and the terminal view.

pub mod filter;
pub mod format;
pub mod notify;
pub mod terminal;

use danmu_plugins::PluginRegistry;

pub use {
    filter::EventKindFilter,
    format::{FormatTransform, format_envelope},
    notify::{AvatarCache, DesktopNotifier, Notification, Notifier, NotifyConsumer},
    terminal::{TerminalConsumer, TerminalSink},
};

/// Register all built-ins. Rendered terminal lines go to `terminal`; without
/// a sink the terminal consumer accepts and discards events.
pub fn register_builtins(
    registry: &PluginRegistry,
    terminal: Option<TerminalSink>,
) -> danmu_plugins::Result<()> {
    filter::register(registry)?;
    format::register(registry)?;
    notify::register(registry)?;
    terminal::register(registry, terminal)?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, danmu_plugins::Capability};

    #[test]
    fn registers_every_builtin_once() {
        let registry = PluginRegistry::new();
        register_builtins(&registry, None).unwrap();
        assert_eq!(registry.names(), [
            "event_kind_filter",
            "format_transform",
            "notify",
            "terminal"
        ]);
        let consumers: Vec<_> = registry
            .descriptors_of(Capability::Consumer)
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(consumers, ["notify", "terminal"]);

        assert!(matches!(
            register_builtins(&registry, None),
            Err(danmu_plugins::Error::AlreadyRegistered { .. })
        ));
    }
}
