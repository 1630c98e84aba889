use thiserror::Error;

/// Stream connection failures. Always retryable.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket handshake with {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    #[error("connecting to {url} timed out")]
    ConnectTimeout { url: String },

    #[error("invalid stream url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("client is closed")]
    Closed,
}

impl ClientError {
    #[must_use]
    pub fn connection(url: &str, source: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connection {
            url: url.to_string(),
            source: Box::new(source),
        }
    }
}

/// Control-plane request failures.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control plane request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("control plane returned code {code}: {message}")]
    Api { code: i64, message: String },

    #[error("unexpected control plane payload: {0}")]
    Payload(#[from] serde_json::Error),
}
