//! Local dashboard for live events: an HTML page plus a websocket feed of
//! formatted envelopes, served by the `webview` consumer.

pub mod assets;
pub mod avatar;
pub mod consumer;
pub mod error;
pub mod hub;
pub mod proxy;
pub mod server;

pub use {
    consumer::{DashboardConsumer, register},
    error::{Error, Result},
    hub::Hub,
    server::{AppState, bind_with_fallback, router},
};
