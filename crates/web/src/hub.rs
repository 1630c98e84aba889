use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    tokio::sync::mpsc::{self, error::TrySendError},
    tracing::debug,
};

/// Frames buffered per viewer before new ones are dropped for it.
pub const VIEWER_BUFFER: usize = 256;

/// Connected dashboard viewers. Each viewer owns a write loop fed by a
/// bounded channel; dropping its sender ends the loop.
pub struct Hub {
    clients: RwLock<HashMap<u64, mpsc::Sender<String>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::with_buffer(VIEWER_BUFFER)
    }
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            buffer: buffer.max(1),
        }
    }

    pub fn register(&self) -> (u64, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        debug!(client = id, "dashboard viewer connected");
        (id, rx)
    }

    pub fn unregister(&self, id: u64) {
        if self
            .clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
        {
            debug!(client = id, "dashboard viewer disconnected");
        }
    }

    /// Send a frame to every viewer. Returns how many accepted it. A viewer
    /// with a full buffer misses this frame; viewers whose loop has ended
    /// are pruned.
    pub fn broadcast(&self, frame: &str) -> usize {
        let mut gone = Vec::new();
        let mut sent = 0;
        {
            let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
            for (id, tx) in clients.iter() {
                match tx.try_send(frame.to_string()) {
                    Ok(()) => sent += 1,
                    Err(TrySendError::Full(_)) => {
                        debug!(client = id, "dashboard viewer lagging, frame dropped");
                    },
                    Err(TrySendError::Closed(_)) => gone.push(*id),
                }
            }
        }
        for id in gone {
            self.unregister(id);
        }
        sent
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnect every viewer.
    pub fn close_all(&self) {
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
