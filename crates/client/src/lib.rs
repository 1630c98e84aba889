//! Clients for the remote capture service.
//!
//! [`StreamClient`] holds the live event stream for one room and reconnects
//! in the background; [`ControlClient`] lists, starts and stops capture jobs
//! over HTTP.

pub mod control;
pub mod error;
pub mod stream;

pub use {
    control::{ControlClient, Service},
    error::{ClientError, ControlError},
    stream::{EnvelopeHandler, Status, StreamClient, StreamConfig},
};
