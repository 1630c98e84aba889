use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to listen on {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("no free port in {first}..={last} on {host}")]
    NoFreePort { host: String, first: u16, last: u16 },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
