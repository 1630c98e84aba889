//! Bounded queue drained by a single background worker.
//!
//! Used by consumers that are slower than the arrival rate. Producers never
//! wait: when the queue is full the new item is dropped.

use std::{
    future::Future,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

pub const DEFAULT_CAPACITY: usize = 100;

/// Outcome of [`BoundedQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Queued,
    /// Queue was full; the item was discarded.
    Dropped,
    /// Queue has been shut down.
    Closed,
}

pub struct BoundedQueue<T> {
    name: String,
    capacity: usize,
    tx: Mutex<Option<mpsc::Sender<T>>>,
    rx: Mutex<Option<mpsc::Receiver<T>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    dropped: AtomicU64,
}

impl<T: Send + 'static> BoundedQueue<T> {
    /// Create the queue. Items pushed before [`start`](Self::start) are held
    /// up to `capacity`.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            name: name.into(),
            capacity,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            cancel: CancellationToken::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Spawn the worker. Items are handed to `handler` one at a time, in
    /// queue order. Returns `false` if the worker was already started.
    pub fn start<F, Fut>(&self, mut handler: F) -> bool
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Some(mut rx) = self.rx.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            return false;
        };
        let cancel = self.cancel.clone();
        let name = self.name.clone();
        let handle = tokio::spawn(async move {
            debug!(queue = %name, "queue worker started");
            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    item = rx.recv() => item,
                };
                // A closed queue is a normal way to stop.
                let Some(item) = item else { break };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = handler(item) => {},
                }
            }
            debug!(queue = %name, "queue worker stopped");
        });
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        true
    }

    /// Enqueue without waiting.
    pub fn push(&self, item: T) -> Push {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Push::Closed;
        };
        match tx.try_send(item) {
            Ok(()) => Push::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(queue = %self.name, capacity = self.capacity, dropped, "queue full, dropping item");
                Push::Dropped
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Push::Closed,
        }
    }

    /// Items currently waiting.
    pub fn len(&self) -> usize {
        self.tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, |tx| self.capacity - tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Token cancelled on shutdown, for per-item side tasks.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the worker, close the queue and wait for the worker to exit.
    /// Pending items are discarded. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.rx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!(queue = %self.name, error = %e, "queue worker panicked");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{sync::Arc, time::Duration},
        tokio::sync::Notify,
    };

    #[tokio::test]
    async fn burst_beyond_capacity_keeps_exactly_capacity() {
        let queue = BoundedQueue::new("burst", 100);
        let outcomes: Vec<Push> = (0..150).map(|i| queue.push(i)).collect();
        assert_eq!(outcomes.iter().filter(|o| **o == Push::Queued).count(), 100);
        assert_eq!(outcomes.iter().filter(|o| **o == Push::Dropped).count(), 50);
        assert_eq!(queue.dropped(), 50);
        assert_eq!(queue.len(), 100);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(Notify::new());
        let (seen_w, done_w) = (Arc::clone(&seen), Arc::clone(&done));
        queue.start(move |item: i32| {
            let seen = Arc::clone(&seen_w);
            let done = Arc::clone(&done_w);
            async move {
                let mut seen = seen.lock().unwrap();
                seen.push(item);
                if seen.len() == 100 {
                    done.notify_one();
                }
            }
        });
        tokio::time::timeout(Duration::from_secs(5), done.notified())
            .await
            .unwrap();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn worker_serialises_items() {
        let queue = BoundedQueue::new("serial", 10);
        let active = Arc::new(AtomicU64::new(0));
        let overlap = Arc::new(AtomicU64::new(0));
        let processed = Arc::new(AtomicU64::new(0));
        let (a, o, p) = (Arc::clone(&active), Arc::clone(&overlap), Arc::clone(&processed));
        queue.start(move |_: u8| {
            let (a, o, p) = (Arc::clone(&a), Arc::clone(&o), Arc::clone(&p));
            async move {
                if a.fetch_add(1, Ordering::SeqCst) > 0 {
                    o.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                a.fetch_sub(1, Ordering::SeqCst);
                p.fetch_add(1, Ordering::SeqCst);
            }
        });
        for i in 0..5 {
            assert_eq!(queue.push(i), Push::Queued);
        }
        for _ in 0..200 {
            if processed.load(Ordering::SeqCst) == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(processed.load(Ordering::SeqCst), 5);
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn push_after_shutdown_is_closed() {
        let queue = BoundedQueue::new("closed", 4);
        queue.start(|_: u8| async {});
        queue.shutdown().await;
        queue.shutdown().await;
        assert_eq!(queue.push(1), Push::Closed);
        assert!(queue.is_closed());
        assert!(!queue.start(|_: u8| async {}));
    }

    #[tokio::test]
    async fn shutdown_abandons_in_flight_item() {
        let queue = BoundedQueue::new("abandon", 4);
        let finished = Arc::new(AtomicU64::new(0));
        let started = Arc::new(Notify::new());
        let (f, s) = (Arc::clone(&finished), Arc::clone(&started));
        queue.start(move |_: u8| {
            let (f, s) = (Arc::clone(&f), Arc::clone(&s));
            async move {
                s.notify_one();
                tokio::time::sleep(Duration::from_secs(60)).await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });
        queue.push(1);
        started.notified().await;
        tokio::time::timeout(Duration::from_secs(5), queue.shutdown())
            .await
            .unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
