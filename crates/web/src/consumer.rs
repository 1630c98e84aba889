//! The `webview` consumer: serves the dashboard and broadcasts every
//! formatted envelope to connected viewers.

use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    danmu_common::Envelope,
    danmu_plugins::{
        BoundedQueue, Capability, ConfigField, Consumer, Plugin, PluginConfig, PluginDescriptor,
        PluginRegistry, queue::DEFAULT_CAPACITY,
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    hub::Hub,
    server::{AppState, bind_with_fallback, router},
};

pub const NAME: &str = "webview";

const DEFAULT_PORT: u16 = 8080;
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Settings {
    host: String,
    port: u16,
    auto_port: bool,
    queue_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            auto_port: true,
            queue_size: DEFAULT_CAPACITY,
        }
    }
}

struct Running {
    addr: SocketAddr,
    queue: Arc<BoundedQueue<String>>,
    server: JoinHandle<()>,
}

pub struct DashboardConsumer {
    settings: RwLock<Settings>,
    hub: Arc<Hub>,
    shutdown: CancellationToken,
    running: tokio::sync::Mutex<Option<Running>>,
    queue: RwLock<Option<Arc<BoundedQueue<String>>>>,
}

impl Default for DashboardConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardConsumer {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(Settings::default()),
            hub: Arc::new(Hub::new()),
            shutdown: CancellationToken::new(),
            running: tokio::sync::Mutex::new(None),
            queue: RwLock::new(None),
        }
    }

    /// Address the dashboard is listening on, once started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.addr)
    }

    pub fn viewers(&self) -> usize {
        self.hub.len()
    }

    fn queue(&self) -> Option<Arc<BoundedQueue<String>>> {
        self.queue.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Plugin for DashboardConsumer {
    fn name(&self) -> &str {
        NAME
    }

    fn capability(&self) -> Capability {
        Capability::Consumer
    }

    async fn init(&self, config: PluginConfig) -> Result<()> {
        let port = u16::try_from(config.usize("port")?).context("port must be at most 65535")?;
        let settings = Settings {
            host: config.str("host")?.to_string(),
            port,
            auto_port: config.bool("auto_port")?,
            queue_size: config.usize("queue_size")?,
        };
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }
        let settings = self.settings.read().unwrap_or_else(|e| e.into_inner()).clone();

        let listener = bind_with_fallback(&settings.host, settings.port, settings.auto_port).await?;
        let addr = listener.local_addr()?;
        let app = router(AppState::new(Arc::clone(&self.hub), self.shutdown.clone())?);
        let shutdown = self.shutdown.clone();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                warn!(error = %e, "dashboard server failed");
            }
        });

        let queue = Arc::new(BoundedQueue::new("webview_broadcast", settings.queue_size));
        let hub = Arc::clone(&self.hub);
        queue.start(move |frame: String| {
            let sent = hub.broadcast(&frame);
            debug!(viewers = sent, "broadcast event");
            std::future::ready(())
        });
        *self.queue.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&queue));

        info!(url = %format!("http://{addr}"), "dashboard listening");
        *running = Some(Running {
            addr,
            queue,
            server,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.shutdown.cancel();
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        running.queue.shutdown().await;
        self.hub.close_all();
        if tokio::time::timeout(SERVER_STOP_TIMEOUT, running.server)
            .await
            .is_err()
        {
            warn!("dashboard server did not stop in time");
        }
        info!(addr = %running.addr, "dashboard stopped");
        Ok(())
    }

    fn as_consumer(self: Arc<Self>) -> Option<Arc<dyn Consumer>> {
        Some(self)
    }
}

#[async_trait]
impl Consumer for DashboardConsumer {
    async fn consume(&self, envelope: Arc<Envelope>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        let Some(formatted) = &envelope.formatted else {
            return Ok(());
        };
        let Some(queue) = self.queue() else {
            return Ok(());
        };
        queue.push(serde_json::to_string(formatted)?);
        Ok(())
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(NAME, Capability::Consumer)
        .with_description("Browser dashboard with a live event feed")
        .field(ConfigField::number(
            "port",
            f64::from(DEFAULT_PORT),
            "Dashboard port",
        ))
        .field(ConfigField::bool(
            "auto_port",
            true,
            "Try the following ports when this one is taken",
        ))
        .field(ConfigField::string(
            "host",
            "127.0.0.1",
            "Interface to listen on",
        ))
        .field(ConfigField::number(
            "queue_size",
            DEFAULT_CAPACITY as f64,
            "Events waiting for broadcast before new ones are dropped",
        ))
}

pub fn register(registry: &PluginRegistry) -> danmu_plugins::Result<()> {
    registry.register(descriptor(), || Arc::new(DashboardConsumer::new()))
}
