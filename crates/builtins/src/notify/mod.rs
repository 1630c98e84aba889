//! Desktop notification consumer.

mod cache;

use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    danmu_common::Envelope,
    danmu_plugins::{Capability, ConfigField, Consumer, Plugin, PluginConfig, PluginDescriptor, PluginRegistry},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

pub use cache::AvatarCache;

pub const NAME: &str = "notify";

const DEFAULT_TIMEOUT_MS: f64 = 5000.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: Option<PathBuf>,
    pub timeout: Duration,
}

/// Something that can show a notification to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Shells out to `notify-send` on Linux and `osascript` on macOS.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                applescript_escape(&n.body),
                applescript_escape(&n.title)
            );
            let mut c = tokio::process::Command::new("osascript");
            c.arg("-e").arg(script);
            c
        } else {
            let program = which::which("notify-send").context("notify-send is not installed")?;
            let mut c = tokio::process::Command::new(program);
            c.arg("-t").arg(n.timeout.as_millis().to_string());
            if let Some(icon) = &n.icon {
                c.arg("-i").arg(icon);
            }
            c.arg(&n.title).arg(&n.body);
            c
        };

        let output = command
            .output()
            .await
            .context("failed to run notification command")?;
        if !output.status.success() {
            bail!(
                "notification command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Shows one notification per formatted envelope. Envelopes without a
/// display projection are skipped.
pub struct NotifyConsumer {
    notifier: Arc<dyn Notifier>,
    cache_dir: PathBuf,
    cache: RwLock<Option<Arc<AvatarCache>>>,
    timeout: RwLock<Duration>,
    cancel: CancellationToken,
}

impl NotifyConsumer {
    pub fn new(notifier: Arc<dyn Notifier>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            notifier,
            cache_dir: cache_dir.into(),
            cache: RwLock::new(None),
            timeout: RwLock::new(Duration::from_millis(DEFAULT_TIMEOUT_MS as u64)),
            cancel: CancellationToken::new(),
        }
    }

    /// Cache directory under the system temp dir.
    pub fn default_cache_dir() -> PathBuf {
        std::env::temp_dir().join("danmu").join("avatars")
    }

    fn cache(&self) -> Option<Arc<AvatarCache>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Plugin for NotifyConsumer {
    fn name(&self) -> &str {
        NAME
    }

    fn capability(&self) -> Capability {
        Capability::Consumer
    }

    async fn init(&self, config: PluginConfig) -> Result<()> {
        let timeout = Duration::from_millis(config.usize("timeout_ms")? as u64);
        *self.timeout.write().unwrap_or_else(|e| e.into_inner()) = timeout;

        // Notifications still work without avatars.
        match AvatarCache::create(&self.cache_dir).await {
            Ok(cache) => {
                *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(cache));
            },
            Err(e) => warn!(error = %e, "avatar cache unavailable"),
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        Ok(())
    }

    fn as_consumer(self: Arc<Self>) -> Option<Arc<dyn Consumer>> {
        Some(self)
    }
}

#[async_trait]
impl Consumer for NotifyConsumer {
    async fn consume(&self, envelope: Arc<Envelope>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let Some(formatted) = &envelope.formatted else {
            debug!(kind = %envelope.kind, "skipping unformatted envelope");
            return Ok(());
        };

        let icon = match self.cache() {
            Some(cache) => cache.get(&formatted.avatar).await,
            None => None,
        };
        let notification = Notification {
            title: format!("{} | {}", formatted.platform, formatted.user_name),
            body: formatted.content.clone(),
            icon,
            timeout: *self.timeout.read().unwrap_or_else(|e| e.into_inner()),
        };

        // Stopped while the avatar was downloading.
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.notifier.notify(&notification).await
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(NAME, Capability::Consumer)
        .with_description("Desktop notification per event")
        .field(ConfigField::number(
            "timeout_ms",
            DEFAULT_TIMEOUT_MS,
            "How long a notification stays visible, in milliseconds",
        ))
}

pub(crate) fn register(registry: &PluginRegistry) -> danmu_plugins::Result<()> {
    registry.register(descriptor(), || {
        Arc::new(NotifyConsumer::new(
            Arc::new(DesktopNotifier),
            NotifyConsumer::default_cache_dir(),
        ))
    })
}
