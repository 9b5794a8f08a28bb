//! Per-run message queues with durable backing and event subscribers

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::backend::ListBackend;
use super::QueueError;

/// Opaque handle of one subscriber registration
pub type SubscriptionId = u64;

/// A frame appended to the queue, with its position in the backing list.
///
/// The index lets a subscriber that replayed `get_all()` drop live frames it
/// has already seen, closing the race between snapshot and subscription.
#[derive(Debug, Clone)]
pub struct PutEvent {
    pub item: String,
    pub index: usize,
}

type PutCallback = Arc<dyn Fn(PutEvent) -> BoxFuture<'static, ()> + Send + Sync>;
type CloseCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    put: HashMap<SubscriptionId, PutCallback>,
    close: HashMap<SubscriptionId, CloseCallback>,
    next_id: SubscriptionId,
}

impl Subscribers {
    fn next(&mut self) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// A named FIFO queue over a durable append-only list.
///
/// Frames are appended in order and never dropped; subscribers observe them
/// in append order. After `close` no further `put` is accepted, but the
/// backing list stays readable for replay.
pub struct Queue {
    name: String,
    backend: Arc<dyn ListBackend>,
    closed: AtomicBool,
    subscribers: Mutex<Subscribers>,
}

impl Queue {
    pub(crate) fn new(name: String, backend: Arc<dyn ListBackend>, closed: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            backend,
            closed: AtomicBool::new(closed),
            subscribers: Mutex::new(Subscribers::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Append a JSON-encoded frame and fire `put` subscribers.
    ///
    /// A closed queue silently ignores the frame.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        item: &T,
        non_event: bool,
    ) -> Result<(), QueueError> {
        let encoded = serde_json::to_string(item)
            .map_err(|e| QueueError::Encode(e.to_string()))?;
        self.put_raw(encoded, non_event).await
    }

    /// Append an already-encoded frame and fire `put` subscribers
    pub async fn put_raw(&self, item: String, non_event: bool) -> Result<(), QueueError> {
        if self.is_closed() {
            return Ok(());
        }

        let len = self.backend.append(&self.name, item.clone()).await?;
        if !non_event {
            self.emit_put(PutEvent {
                item,
                index: len - 1,
            })
            .await;
        }
        Ok(())
    }

    /// Read the full backing list, decoding each frame.
    ///
    /// Frames that fail to decode are surfaced as raw strings.
    pub async fn get_all(&self) -> Result<Vec<Value>, QueueError> {
        let items = self.backend.read_all(&self.name).await?;
        Ok(items
            .into_iter()
            .map(|item| serde_json::from_str(&item).unwrap_or(Value::String(item)))
            .collect())
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        self.backend.len(&self.name).await
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Fire `close` subscribers, mark the queue closed and drop all
    /// subscriber registrations. Idempotent; reads stay legal afterwards.
    pub async fn close(&self, non_event: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let callbacks: Vec<CloseCallback> = {
            let mut subs = self.subscribers.lock().unwrap();
            let callbacks = subs.close.values().cloned().collect();
            subs.put.clear();
            subs.close.clear();
            callbacks
        };

        if !non_event {
            for callback in callbacks {
                callback().await;
            }
        }
    }

    /// Register a `put` subscriber. Registration on a closed queue is a
    /// no-op; the returned id never fires. Sync callbacks are just async
    /// callbacks that return immediately.
    pub fn on_put<F, Fut>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(PutEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let wrapped: PutCallback =
            Arc::new(move |event| -> BoxFuture<'static, ()> { Box::pin(callback(event)) });
        let mut subs = self.subscribers.lock().unwrap();
        let id = subs.next();
        if !self.is_closed() {
            subs.put.insert(id, wrapped);
        }
        id
    }

    /// Register a `close` subscriber
    pub fn on_close<F, Fut>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let wrapped: CloseCallback =
            Arc::new(move || -> BoxFuture<'static, ()> { Box::pin(callback()) });
        let mut subs = self.subscribers.lock().unwrap();
        let id = subs.next();
        if !self.is_closed() {
            subs.close.insert(id, wrapped);
        }
        id
    }

    /// Drop one subscriber registration
    pub fn off(&self, id: SubscriptionId) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.put.remove(&id);
        subs.close.remove(&id);
    }

    /// Subscribe to put events through a channel
    pub fn put_events(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<PutEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.on_put(move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
            }
        });
        (id, rx)
    }

    /// Subscribe to the close event through a channel
    pub fn close_events(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.on_close(move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send(());
            }
        });
        (id, rx)
    }

    async fn emit_put(&self, event: PutEvent) {
        let callbacks: Vec<PutCallback> = {
            let subs = self.subscribers.lock().unwrap();
            subs.put.values().cloned().collect()
        };
        for callback in callbacks {
            callback(event.clone()).await;
        }
    }
}
