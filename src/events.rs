//!
//! csvdeck file lifecycle notifications
//! ------------------------------------
//! In-process publish/subscribe for "file uploaded" and "file deleted" events.
//! One [`FileLifecycleNotifier`] is created per server and shared through the
//! handler state. Each subscriber owns a bounded queue; publishing fans the
//! event out synchronously to every registered subscriber in registration
//! order. A subscriber whose queue is full misses that event rather than
//! holding memory for a reader that is not keeping up. Nothing is buffered for
//! subscribers that register later.
//!
//! Dropping a [`Subscription`] unregisters it, which is how an SSE connection
//! releases its listener when the client goes away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Events queued per subscriber before further events are dropped for it.
pub const SUBSCRIBER_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileEventKind {
    Uploaded,
    Deleted,
}

impl FileEventKind {
    /// SSE `event:` label.
    pub fn event_name(&self) -> &'static str {
        match self {
            FileEventKind::Uploaded => "fileUploaded",
            FileEventKind::Deleted => "fileDeleted",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "fileUploaded" => Some(FileEventKind::Uploaded),
            "fileDeleted" => Some(FileEventKind::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLifecycleEvent {
    pub kind: FileEventKind,
    pub identity: String,
}

impl FileLifecycleEvent {
    pub fn new(kind: FileEventKind, identity: impl Into<String>) -> Self {
        Self { kind, identity: identity.into() }
    }

    /// JSON-encoded identity carried in the SSE `data:` line.
    pub fn data_json(&self) -> String {
        serde_json::Value::String(self.identity.clone()).to_string()
    }

    /// Full text/event-stream frame for this event.
    pub fn to_sse_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind.event_name(), self.data_json())
    }
}

struct Listener {
    id: u64,
    tx: mpsc::Sender<FileLifecycleEvent>,
}

struct Registry {
    next_id: AtomicU64,
    capacity: usize,
    listeners: Mutex<Vec<Listener>>,
}

/// Shared publish/subscribe hub. Cloning shares the same listener registry.
#[derive(Clone)]
pub struct FileLifecycleNotifier {
    inner: Arc<Registry>,
}

impl Default for FileLifecycleNotifier {
    fn default() -> Self { Self::with_capacity(SUBSCRIBER_QUEUE) }
}

impl FileLifecycleNotifier {
    pub fn new() -> Self { Self::default() }

    /// Notifier whose subscribers each queue at most `capacity` events (min 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                capacity: capacity.max(1),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Deliver an event to every current subscriber, in registration order.
    ///
    /// Never fails or waits. A subscriber whose receiving side is already
    /// gone is pruned; one whose queue is full stays registered but misses
    /// this event. The others still get it.
    pub fn publish(&self, kind: FileEventKind, identity: &str) {
        let event = FileLifecycleEvent::new(kind, identity);
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        let mut lagging = 0usize;
        listeners.retain(|l| match l.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                lagging += 1;
                warn!(target: "csvdeck::events", subscription = l.id, event = kind.event_name(), "subscriber queue full, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        debug!(
            target: "csvdeck::events",
            event = kind.event_name(),
            identity = identity,
            delivered = listeners.len() - lagging,
            lagging = lagging,
            pruned = before - listeners.len(),
            "published lifecycle event"
        );
    }

    /// Register a new listener. Events published from now on until the
    /// returned handle is dropped are queued for it.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner.listeners.lock().push(Listener { id, tx });
        Subscription { id, rx, registry: Arc::downgrade(&self.inner) }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

/// Handle to one registered listener.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<FileLifecycleEvent>,
    registry: std::sync::Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 { self.id }

    /// Next event; `None` once the notifier itself is gone.
    pub async fn recv(&mut self) -> Option<FileLifecycleEvent> {
        self.rx.recv().await
    }

    /// Next already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<FileLifecycleEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(reg) = self.registry.upgrade() {
            let mut listeners = reg.listeners.lock();
            listeners.retain(|l| l.id != self.id);
            info!(target: "csvdeck::events", subscription = self.id, subscribers = listeners.len(), "unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let n = FileLifecycleNotifier::new();
        n.publish(FileEventKind::Uploaded, "1-a.csv");
        assert_eq!(n.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_events_in_order() {
        let n = FileLifecycleNotifier::new();
        let mut a = n.subscribe();
        let mut b = n.subscribe();
        n.publish(FileEventKind::Uploaded, "1-a.csv");
        n.publish(FileEventKind::Deleted, "1-a.csv");

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await, Some(FileLifecycleEvent::new(FileEventKind::Uploaded, "1-a.csv")));
            assert_eq!(sub.recv().await, Some(FileLifecycleEvent::new(FileEventKind::Deleted, "1-a.csv")));
        }
    }

    #[test]
    fn late_subscribers_get_no_replay() {
        let n = FileLifecycleNotifier::new();
        n.publish(FileEventKind::Uploaded, "1-a.csv");
        let mut late = n.subscribe();
        assert_eq!(late.try_recv(), None);
    }

    #[test]
    fn dropping_the_handle_unregisters() {
        let n = FileLifecycleNotifier::new();
        let a = n.subscribe();
        let b = n.subscribe();
        assert_eq!(n.subscriber_count(), 2);
        drop(a);
        assert_eq!(n.subscriber_count(), 1);
        drop(b);
        assert_eq!(n.subscriber_count(), 0);
    }

    #[test]
    fn closed_receiver_does_not_affect_others() {
        let n = FileLifecycleNotifier::new();
        let mut gone = n.subscribe();
        let mut alive = n.subscribe();
        gone.rx.close();
        n.publish(FileEventKind::Deleted, "2-b.csv");
        assert_eq!(gone.try_recv(), None);
        assert_eq!(alive.try_recv(), Some(FileLifecycleEvent::new(FileEventKind::Deleted, "2-b.csv")));
        // the closed listener was pruned during publish
        assert_eq!(n.subscriber_count(), 1);
    }

    #[test]
    fn full_queue_drops_events_but_keeps_the_subscriber() {
        let n = FileLifecycleNotifier::with_capacity(2);
        let mut slow = n.subscribe();
        let mut fast = n.subscribe();
        for id in ["1-a.csv", "2-b.csv", "3-c.csv"] {
            n.publish(FileEventKind::Uploaded, id);
            assert!(fast.try_recv().is_some());
        }
        assert_eq!(n.subscriber_count(), 2);

        assert_eq!(slow.try_recv().map(|e| e.identity), Some("1-a.csv".to_string()));
        assert_eq!(slow.try_recv().map(|e| e.identity), Some("2-b.csv".to_string()));
        assert_eq!(slow.try_recv(), None);

        // drained, so delivery resumes
        n.publish(FileEventKind::Deleted, "1-a.csv");
        assert_eq!(slow.try_recv(), Some(FileLifecycleEvent::new(FileEventKind::Deleted, "1-a.csv")));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let n = FileLifecycleNotifier::with_capacity(0);
        let mut sub = n.subscribe();
        n.publish(FileEventKind::Uploaded, "1-a.csv");
        n.publish(FileEventKind::Uploaded, "2-b.csv");
        assert_eq!(sub.try_recv().map(|e| e.identity), Some("1-a.csv".to_string()));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn sse_frame_layout() {
        let ev = FileLifecycleEvent::new(FileEventKind::Uploaded, "1730219014839-report \"q\".csv");
        assert_eq!(
            ev.to_sse_frame(),
            "event: fileUploaded\ndata: \"1730219014839-report \\\"q\\\".csv\"\n\n"
        );
        assert_eq!(FileEventKind::from_event_name("fileDeleted"), Some(FileEventKind::Deleted));
        assert_eq!(FileEventKind::from_event_name("other"), None);
    }
}
