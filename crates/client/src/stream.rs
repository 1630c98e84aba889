//! Event-stream websocket client with background reconnection.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    danmu_common::Envelope,
    futures::{SinkExt, StreamExt},
    tokio::{
        net::TcpStream,
        sync::{Notify, watch},
    },
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, info, warn},
};

use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
/// Upper bound on how long the reconnect task takes to notice a lost
/// connection.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives every successfully decoded envelope, on the read task.
///
/// Must not block: hand the envelope off and return.
pub trait EnvelopeHandler: Send + Sync + 'static {
    fn handle(&self, envelope: Envelope);
}

impl<F> EnvelopeHandler for F
where
    F: Fn(Envelope) + Send + Sync + 'static,
{
    fn handle(&self, envelope: Envelope) {
        self(envelope)
    }
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub reconnect: bool,
    pub reconnect_delay: Duration,
    /// Reconnect attempts before giving up; `0` retries forever.
    pub max_retries: u32,
    /// Idle-read deadline; a silent connection is dropped after this long.
    pub read_timeout: Duration,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_retries: 0,
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Disconnected,
    Connected,
    Closed,
}

#[derive(Default)]
struct ConnState {
    generation: u64,
    connected: bool,
    reader_cancel: Option<CancellationToken>,
}

struct Inner {
    config: StreamConfig,
    handler: Arc<dyn EnvelopeHandler>,
    state: Mutex<ConnState>,
    status: watch::Sender<Status>,
    disconnected: Notify,
    cancel: CancellationToken,
    tasks: TaskTracker,
    attempts: AtomicU64,
    reconnecting: AtomicBool,
}

/// Live connection to one remote event stream.
///
/// The read task and the reconnect task share one cancellation token; only
/// the read task ever touches the socket.
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<Inner>,
}

impl StreamClient {
    pub fn new(config: StreamConfig, handler: impl EnvelopeHandler) -> Self {
        let (status, _) = watch::channel(Status::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                handler: Arc::new(handler),
                state: Mutex::new(ConnState::default()),
                status,
                disconnected: Notify::new(),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
                attempts: AtomicU64::new(0),
                reconnecting: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Open one connection and spawn its read task.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.connect().await
    }

    /// Connect, then keep the connection alive in the background.
    ///
    /// With reconnection enabled this succeeds even if the first attempt
    /// fails; otherwise that failure is returned.
    pub async fn start(&self) -> Result<(), ClientError> {
        if let Err(e) = self.inner.connect().await {
            if !self.inner.config.reconnect || matches!(e, ClientError::Closed) {
                return Err(e);
            }
            warn!(url = %self.inner.config.url, error = %e, "initial connect failed, retrying in background");
        }
        if self.inner.config.reconnect && !self.inner.reconnecting.swap(true, Ordering::AcqRel) {
            let inner = Arc::clone(&self.inner);
            self.inner.tasks.spawn(async move { inner.reconnect_loop().await });
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).connected
    }

    pub fn status(&self) -> Status {
        *self.inner.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.inner.status.subscribe()
    }

    /// Connection attempts made so far, initial one included.
    pub fn connect_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Relaxed)
    }

    /// Stop both tasks and close the socket. Idempotent; waits for the tasks
    /// to exit.
    pub async fn close(&self) {
        let inner = &self.inner;
        if !inner.cancel.is_cancelled() {
            info!(url = %inner.config.url, "closing stream client");
        }
        inner.cancel.cancel();
        inner.tasks.close();
        {
            let mut state = inner.state.lock().unwrap_or_else(|e| e.into_inner());
            state.connected = false;
            if let Some(reader) = state.reader_cancel.take() {
                reader.cancel();
            }
        }
        inner.status.send_replace(Status::Closed);
        inner.tasks.wait().await;
    }
}

impl Inner {
    fn is_connected(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).connected
    }

    async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        if self.is_connected() {
            debug!(url = %self.config.url, "already connected");
            return Ok(());
        }
        let url = &self.config.url;
        url::Url::parse(url).map_err(|source| ClientError::InvalidUrl {
            url: url.clone(),
            source,
        })?;

        self.attempts.fetch_add(1, Ordering::Relaxed);
        let handshake = tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()));
        let ws = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ClientError::Closed),
            result = handshake => match result {
                Err(_) => return Err(ClientError::ConnectTimeout { url: url.clone() }),
                Ok(Err(e)) => return Err(ClientError::connection(url, e)),
                Ok(Ok((ws, _response))) => ws,
            },
        };

        let reader_cancel = self.cancel.child_token();
        let generation = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if self.cancel.is_cancelled() {
                return Err(ClientError::Closed);
            }
            state.generation += 1;
            state.connected = true;
            state.reader_cancel = Some(reader_cancel.clone());
            state.generation
        };
        self.status.send_replace(Status::Connected);
        info!(url = %url, "stream connected");

        let inner = Arc::clone(self);
        self.tasks
            .spawn(async move { inner.read_loop(ws, reader_cancel, generation).await });
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, ws: WsStream, cancel: CancellationToken, generation: u64) {
        let (mut sink, mut stream) = ws.split();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                },
                next = tokio::time::timeout(self.config.read_timeout, stream.next()) => next,
            };
            match next {
                Err(_) => {
                    warn!(
                        timeout_secs = self.config.read_timeout.as_secs(),
                        "no message within read deadline, dropping connection"
                    );
                    break;
                },
                Ok(None) => {
                    debug!("stream ended");
                    break;
                },
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "stream read failed");
                    break;
                },
                Ok(Some(Ok(Message::Text(text)))) => self.deliver(text.as_str()),
                Ok(Some(Ok(Message::Binary(bytes)))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.deliver(text),
                    Err(e) => debug!(error = %e, "dropping non-utf8 binary frame"),
                },
                Ok(Some(Ok(Message::Ping(data)))) => {
                    if let Err(e) = sink.send(Message::Pong(data)).await {
                        warn!(error = %e, "failed to answer ping");
                        break;
                    }
                },
                Ok(Some(Ok(Message::Close(frame)))) => {
                    debug!(?frame, "server closed stream");
                    break;
                },
                Ok(Some(Ok(_))) => {},
            }
        }
        self.set_disconnected(generation);
    }

    /// Decode one message and hand it to the handler. Undecodable messages
    /// are dropped; the connection stays up.
    fn deliver(&self, text: &str) {
        match Envelope::decode(text) {
            Ok(envelope) => self.handler.handle(envelope),
            Err(e) => warn!(kind = e.kind().unwrap_or("?"), error = %e, "dropping undecodable message"),
        }
    }

    fn set_disconnected(&self, generation: u64) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.generation != generation || !state.connected {
                return;
            }
            state.connected = false;
            if let Some(reader) = state.reader_cancel.take() {
                reader.cancel();
            }
        }
        if !self.cancel.is_cancelled() {
            self.status.send_replace(Status::Disconnected);
            info!(url = %self.config.url, "stream disconnected");
        }
        self.disconnected.notify_one();
    }

    async fn reconnect_loop(self: Arc<Self>) {
        let max = self.config.max_retries;
        let mut retries: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            if self.is_connected() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = self.disconnected.notified() => {},
                    _ = tokio::time::sleep(self.config.poll_interval) => {},
                }
                continue;
            }
            if max > 0 && retries >= max {
                warn!(url = %self.config.url, retries, "reconnect attempts exhausted, giving up");
                return;
            }
            retries += 1;
            warn!(url = %self.config.url, attempt = retries, "reconnecting");
            match self.connect().await {
                Ok(()) => retries = 0,
                Err(ClientError::Closed) => return,
                Err(e) => {
                    warn!(error = %e, delay_ms = self.config.reconnect_delay.as_millis() as u64, "reconnect failed");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {},
                    }
                },
            }
        }
    }
}
