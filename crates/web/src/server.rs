use std::{sync::Arc, time::Duration};

use {
    axum::{
        Json, Router,
        extract::{
            State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        response::IntoResponse,
        routing::get,
    },
    futures::{SinkExt, StreamExt},
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
    tower_http::trace::TraceLayer,
    tracing::{debug, info},
};

use crate::{
    assets, avatar,
    error::{Error, Result},
    hub::Hub,
    proxy,
};

/// Successive ports tried when the configured one is taken.
pub const PORT_ATTEMPTS: u16 = 100;
const PROXY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub http: reqwest::Client,
    /// Cancelled when the dashboard stops; ends every viewer connection.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, shutdown: CancellationToken) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(PROXY_TIMEOUT)
            .build()
            .map_err(|e| Error::message(format!("failed to build http client: {e}")))?;
        Ok(Self {
            hub,
            http,
            shutdown,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(assets::index_handler))
        .route("/ws", get(ws_upgrade_handler))
        .route("/assets/{*path}", get(assets::asset_handler))
        .route("/proxy/image", get(proxy::image_proxy_handler))
        .route(
            "/avatar/default/{platform}",
            get(avatar::default_avatar_handler),
        )
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `host:port`. With `auto_port`, a port that is taken moves on to the
/// next one, up to [`PORT_ATTEMPTS`] ports in total.
pub async fn bind_with_fallback(host: &str, port: u16, auto_port: bool) -> Result<TcpListener> {
    let attempts = if auto_port { PORT_ATTEMPTS } else { 1 };
    let mut last_error = None;
    for offset in 0..attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                if offset > 0 {
                    info!(requested = port, bound = candidate, "dashboard port was taken, using next free port");
                }
                return Ok(listener);
            },
            Err(e) => {
                debug!(port = candidate, error = %e, "dashboard port unavailable");
                last_error = Some(e);
            },
        }
    }
    match (auto_port, last_error) {
        (false, Some(source)) => Err(Error::Bind {
            host: host.to_string(),
            port,
            source,
        }),
        _ => Err(Error::NoFreePort {
            host: host.to_string(),
            first: port,
            last: port.saturating_add(attempts - 1),
        }),
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "clients": state.hub.len(),
    }))
}

async fn ws_upgrade_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_viewer(socket, state))
}

/// Forward broadcast frames to one viewer until it leaves or the dashboard
/// stops. Anything the viewer sends is ignored.
async fn handle_viewer(socket: WebSocket, state: AppState) {
    let (id, mut frames) = state.hub.register();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            },
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {},
            },
        }
    }
    state.hub.unregister(id);
}
