use {
    danmu_builtins::{TerminalSink, register_builtins},
    danmu_plugins::PluginRegistry,
};

/// Registry holding every plugin this build ships with.
pub fn build_registry(terminal: Option<TerminalSink>) -> anyhow::Result<PluginRegistry> {
    let registry = PluginRegistry::new();
    register_builtins(&registry, terminal)?;
    #[cfg(feature = "voice")]
    danmu_voice::register(&registry)?;
    #[cfg(feature = "web-ui")]
    danmu_web::register(&registry)?;
    Ok(registry)
}
