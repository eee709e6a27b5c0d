//! Component E: the fan-out registry.
//!
//! One process-wide lock guards a map of circuit -> subscriber list.
//! The collector releases its session-state lock before calling into this
//! module, so a slow or wedged subscriber send never blocks frame decoding.

use std::sync::Arc;

use async_trait::async_trait;
use fnv::FnvHashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::downstream::{DownstreamMessage, KartingDataPayload};
use crate::error::classify_text;
use crate::ids::CircuitId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{0}")]
    Fatal(String),
    #[error("{0}")]
    Transient(String),
}

impl SinkError {
    fn is_fatal(&self) -> bool {
        matches!(self, SinkError::Fatal(_))
    }
}

/// One subscriber's outbound channel. A sink owns whatever transport it
/// wraps (an mpsc channel, a WebSocket write half, ...) and reports its own
/// typed failures; the registry falls back to [`classify_text`] only for
/// sinks that can't tell fatal from transient themselves.
#[async_trait]
pub trait SubscriberSink: Send + Sync {
    async fn send(&self, message: &DownstreamMessage) -> Result<(), SinkError>;
}

/// A sink over an unbounded mpsc channel, the shape used when the consumer
/// is in-process (tests, or a WebSocket handler task reading the other end).
pub struct ChannelSink {
    sender: tokio::sync::mpsc::UnboundedSender<DownstreamMessage>,
}

impl ChannelSink {
    pub fn new(sender: tokio::sync::mpsc::UnboundedSender<DownstreamMessage>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl SubscriberSink for ChannelSink {
    async fn send(&self, message: &DownstreamMessage) -> Result<(), SinkError> {
        self.sender
            .send(message.clone())
            .map_err(|e| match classify_text(e.to_string()) {
                crate::error::SendFailure::Fatal(m) => SinkError::Fatal(m),
                crate::error::SendFailure::Transient(m) => SinkError::Transient(m),
            })
    }
}

struct Subscriber {
    sink: Arc<dyn SubscriberSink>,
}

#[derive(Default)]
struct CircuitSubscribers {
    subscribers: FnvHashMap<SubscriberId, Subscriber>,
    /// The most recent `karting_data` payload broadcast on this circuit.
    /// Replayed to newly attached subscribers wrapped as `cached_data`
    /// (see `DownstreamMessage::cached`), never verbatim.
    last_snapshot: Option<KartingDataPayload>,
}

/// The fan-out registry: one entry per circuit that has ever had a
/// subscriber or a broadcast, behind a single process-wide lock.
#[derive(Default)]
pub struct FanoutManager {
    circuits: Mutex<FnvHashMap<CircuitId, CircuitSubscribers>>,
}

impl FanoutManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and, if a snapshot has already been broadcast
    /// for this circuit, immediately replays it as `cached_data`.
    pub async fn attach(
        &self,
        circuit_id: CircuitId,
        id: SubscriberId,
        sink: Arc<dyn SubscriberSink>,
    ) {
        let mut circuits = self.circuits.lock().await;
        let entry = circuits.entry(circuit_id).or_default();

        if let Some(payload) = entry.last_snapshot.clone() {
            let cached = DownstreamMessage::cached(payload);
            // A failed replay means the subscriber is already gone; don't
            // bother registering it.
            if sink.send(&cached).await.is_err() {
                return;
            }
        }

        entry.subscribers.insert(id, Subscriber { sink });
    }

    /// Idempotent: detaching an id that isn't registered (or whose circuit
    /// doesn't exist) is a no-op, not an error.
    pub async fn detach(&self, circuit_id: &CircuitId, id: &SubscriberId) -> bool {
        let mut circuits = self.circuits.lock().await;
        match circuits.get_mut(circuit_id) {
            Some(entry) => entry.subscribers.remove(id).is_some(),
            None => false,
        }
    }

    /// Broadcasts a `karting_data` payload to every subscriber on a circuit,
    /// detaching any whose send fails with a fatal classification. Transient
    /// failures are logged and the subscriber is kept. The payload is cached
    /// for late-join replay (see `attach`).
    pub async fn broadcast(&self, circuit_id: &CircuitId, payload: KartingDataPayload) {
        let mut circuits = self.circuits.lock().await;
        let entry = circuits.entry(circuit_id.clone()).or_default();
        entry.last_snapshot = Some(payload.clone());
        let message = DownstreamMessage::KartingData(payload);

        let mut dead = Vec::new();
        for (id, subscriber) in entry.subscribers.iter() {
            if let Err(err) = subscriber.sink.send(&message).await {
                if err.is_fatal() {
                    dead.push(id.clone());
                } else {
                    warn!(circuit = %circuit_id.as_str(), %err, "transient subscriber send failure");
                }
            }
        }
        for id in dead {
            entry.subscribers.remove(&id);
        }
    }

    pub async fn send_status(&self, circuit_id: &CircuitId, message: DownstreamMessage) {
        self.broadcast_without_caching(circuit_id, message).await;
    }

    pub async fn send_error(&self, circuit_id: &CircuitId, message: DownstreamMessage) {
        self.broadcast_without_caching(circuit_id, message).await;
    }

    async fn broadcast_without_caching(&self, circuit_id: &CircuitId, message: DownstreamMessage) {
        let mut circuits = self.circuits.lock().await;
        let Some(entry) = circuits.get_mut(circuit_id) else {
            return;
        };
        let mut dead = Vec::new();
        for (id, subscriber) in entry.subscribers.iter() {
            if let Err(err) = subscriber.sink.send(&message).await {
                if err.is_fatal() {
                    dead.push(id.clone());
                } else {
                    warn!(circuit = %circuit_id.as_str(), %err, "transient subscriber send failure");
                }
            }
        }
        for id in dead {
            entry.subscribers.remove(&id);
        }
    }

    pub async fn count(&self, circuit_id: &CircuitId) -> usize {
        let circuits = self.circuits.lock().await;
        circuits
            .get(circuit_id)
            .map(|e| e.subscribers.len())
            .unwrap_or(0)
    }

    pub async fn has(&self, circuit_id: &CircuitId, id: &SubscriberId) -> bool {
        let circuits = self.circuits.lock().await;
        circuits
            .get(circuit_id)
            .map(|e| e.subscribers.contains_key(id))
            .unwrap_or(false)
    }

    pub async fn active_circuits(&self) -> Vec<CircuitId> {
        let circuits = self.circuits.lock().await;
        circuits
            .iter()
            .filter(|(_, e)| !e.subscribers.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn pong(timestamp: u64) -> DownstreamMessage {
        DownstreamMessage::pong(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        received: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl SubscriberSink for CountingSink {
        async fn send(&self, _message: &DownstreamMessage) -> Result<(), SinkError> {
            if self.fail {
                Err(SinkError::Fatal("connection closed".into()))
            } else {
                self.received.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    struct RecordingSink {
        last: std::sync::Mutex<Option<DownstreamMessage>>,
    }

    #[async_trait]
    impl SubscriberSink for RecordingSink {
        async fn send(&self, message: &DownstreamMessage) -> Result<(), SinkError> {
            *self.last.lock().unwrap() = Some(message.clone());
            Ok(())
        }
    }

    fn sample_payload() -> KartingDataPayload {
        KartingDataPayload {
            circuit_id: "spa".into(),
            drivers: FnvHashMap::default(),
            column_order: vec![],
            message_count: 1,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let manager = FanoutManager::new();
        let circuit = CircuitId::new("spa");
        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            let sink = Arc::new(CountingSink {
                received: counter.clone(),
                fail: false,
            });
            manager.attach(circuit.clone(), SubscriberId(i), sink).await;
        }
        manager.broadcast(&circuit, sample_payload()).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(manager.count(&circuit).await, 3);
    }

    #[tokio::test]
    async fn fatal_send_failure_detaches_subscriber() {
        let manager = FanoutManager::new();
        let circuit = CircuitId::new("spa");
        let counter = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CountingSink {
            received: counter.clone(),
            fail: true,
        });
        manager.attach(circuit.clone(), SubscriberId(0), sink).await;
        manager.broadcast(&circuit, sample_payload()).await;
        assert_eq!(manager.count(&circuit).await, 0);
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let manager = FanoutManager::new();
        let circuit = CircuitId::new("spa");
        assert!(!manager.detach(&circuit, &SubscriberId(42)).await);
    }

    #[tokio::test]
    async fn late_join_replays_cached_snapshot() {
        let manager = FanoutManager::new();
        let circuit = CircuitId::new("spa");
        manager.broadcast(&circuit, sample_payload()).await;

        let counter = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CountingSink {
            received: counter.clone(),
            fail: false,
        });
        manager.attach(circuit.clone(), SubscriberId(1), sink).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn late_join_replay_is_wrapped_as_cached_data_not_raw_karting_data() {
        let manager = FanoutManager::new();
        let circuit = CircuitId::new("spa");
        manager.broadcast(&circuit, sample_payload()).await;

        let sink = Arc::new(RecordingSink {
            last: std::sync::Mutex::new(None),
        });
        manager.attach(circuit.clone(), SubscriberId(7), sink.clone()).await;

        match sink.last.lock().unwrap().as_ref().unwrap() {
            DownstreamMessage::CachedData { .. } => {}
            other => panic!("expected cached_data replay, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replay_failure_skips_registration() {
        let manager = FanoutManager::new();
        let circuit = CircuitId::new("spa");
        manager.broadcast(&circuit, sample_payload()).await;

        let counter = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CountingSink {
            received: counter.clone(),
            fail: true,
        });
        manager.attach(circuit.clone(), SubscriberId(1), sink).await;
        assert_eq!(manager.count(&circuit).await, 0);
    }
}
