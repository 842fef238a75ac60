//! The single chokepoint all run events flow through: sequencing,
//! source-tagging, and fan-out to the durable log plus live SSE subscribers
//! (spec §4.1).
//!
//! Live subscribers get a bounded per-subscriber buffer. Unlike the
//! teacher's `tokio::sync::broadcast` (lag-based: a slow reader misses a
//! contiguous run of messages and is told only "you lagged by N"), this
//! fan-out drops the single oldest buffered event per push when a
//! subscriber's buffer is full, and never blocks the producer (spec §4.1
//! step 4, invariant 6).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use hae_domain::model::{Event, EventKind, Source};

use super::event_store::EventStore;

struct Subscriber {
    buffer: Mutex<VecDeque<Event>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
    dropped: AtomicU64,
}

impl Subscriber {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, event: Event) {
        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(event);
        drop(buffer);
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// A live handle onto one subscriber's buffer. Yields events as an async
/// stream; terminates when the bus closes the subscriber (run settled) or
/// the handle is dropped.
pub struct SubscriberHandle {
    id: u64,
    subscriber: Arc<Subscriber>,
    bus: Arc<EventBusInner>,
}

impl SubscriberHandle {
    /// Pull the next event, or `None` once the subscriber has been closed
    /// and drained.
    pub async fn recv(&self) -> Option<Event> {
        loop {
            {
                let mut buffer = self.subscriber.buffer.lock();
                if let Some(event) = buffer.pop_front() {
                    return Some(event);
                }
            }
            if self.subscriber.closed.load(Ordering::Acquire) {
                return None;
            }
            self.subscriber.notify.notified().await;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.subscriber.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

struct EventBusInner {
    run_id: u64,
    store: Arc<dyn EventStore>,
    sequence: AtomicU64,
    subscriber_capacity: usize,
    subscribers: Mutex<HashMap<u64, Arc<Subscriber>>>,
    next_subscriber_id: AtomicU64,
}

impl EventBusInner {
    fn unsubscribe(&self, id: u64) {
        if let Some(sub) = self.subscribers.lock().remove(&id) {
            sub.close();
        }
    }
}

/// Per-run event chokepoint. One instance lives for the duration of a run,
/// owned by its `Runner` and reachable for subscription via
/// `EventBusRegistry`.
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

impl EventBus {
    pub fn new(run_id: u64, store: Arc<dyn EventStore>, subscriber_capacity: usize) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                run_id,
                store,
                sequence: AtomicU64::new(0),
                subscriber_capacity,
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber_id: AtomicU64::new(0),
            }),
        }
    }

    /// Assign the next sequence, tag with a wall-clock timestamp, and fan
    /// out to the durable log and every live subscriber (spec §4.1 steps
    /// 1-4). Returns the assigned sequence for correlation (step 5).
    pub fn publish(&self, source: Source, kind: impl Into<EventKind>, data: serde_json::Value) -> u64 {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = Event {
            run_id: self.inner.run_id,
            sequence,
            timestamp: chrono::Utc::now(),
            source,
            event: kind.into(),
            data,
        };

        if let Err(err) = self.inner.store.append(&event) {
            tracing::warn!(run_id = self.inner.run_id, error = %err, "event store append failed");
        }

        let subscribers = self.inner.subscribers.lock();
        for subscriber in subscribers.values() {
            subscriber.push(event.clone());
        }

        sequence
    }

    /// Register a new live subscriber with a bounded buffer.
    pub fn subscribe(&self) -> SubscriberHandle {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber::new(self.inner.subscriber_capacity));
        self.inner
            .subscribers
            .lock()
            .insert(id, subscriber.clone());
        SubscriberHandle {
            id,
            subscriber,
            bus: self.inner.clone(),
        }
    }

    /// Close every live subscriber (called once the run settles).
    pub fn close_all(&self) {
        let subscribers = self.inner.subscribers.lock();
        for subscriber in subscribers.values() {
            subscriber.close();
        }
    }

    pub fn run_id(&self) -> u64 {
        self.inner.run_id
    }
}

/// Process-wide registry so HTTP handlers can find a run's `EventBus` by id
/// without threading it through every layer (mirrors `CancelRegistry`).
#[derive(Default)]
pub struct EventBusRegistry {
    buses: Mutex<HashMap<u64, Arc<EventBus>>>,
}

impl EventBusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bus: Arc<EventBus>) {
        self.buses.lock().insert(bus.run_id(), bus);
    }

    pub fn get(&self, run_id: u64) -> Option<Arc<EventBus>> {
        self.buses.lock().get(&run_id).cloned()
    }

    pub fn remove(&self, run_id: u64) -> Option<Arc<EventBus>> {
        self.buses.lock().remove(&run_id)
    }
}
