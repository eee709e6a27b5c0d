//! The top-level control surface: per-circuit session registry, collector
//! lifecycle, and fan-out wiring, all behind one shared handle cloneable
//! across tasks.

use std::sync::Arc;

use fnv::FnvHashMap;
use tokio::sync::{Mutex, RwLock};

use crate::collector::{Collector, CollectorStatus};
use crate::config::CollectorConfig;
use crate::fanout::{FanoutManager, SubscriberId, SubscriberSink};
use crate::ids::CircuitId;
use crate::metadata::MetadataStore;
use crate::session::{SessionSnapshot, SessionState};
use crate::transport::UpstreamTransport;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("collector already running for circuit {0}")]
    AlreadyRunning(String),
    #[error("no collector running for circuit {0}")]
    NotRunning(String),
}

struct CircuitHandle {
    session: Arc<Mutex<SessionState>>,
    stop: Option<Arc<tokio::sync::Notify>>,
    status: Option<Arc<RwLock<CollectorStatus>>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Default for CircuitHandle {
    fn default() -> Self {
        CircuitHandle {
            session: Arc::new(Mutex::new(SessionState::new())),
            stop: None,
            status: None,
            task: None,
        }
    }
}

/// Owns every circuit's session state and collector task. Cheap to clone:
/// all shared state lives behind `Arc`.
#[derive(Clone)]
pub struct Gateway {
    circuits: Arc<Mutex<FnvHashMap<CircuitId, CircuitHandle>>>,
    fanout: Arc<FanoutManager>,
    metadata: Arc<dyn MetadataStore>,
}

impl Gateway {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Gateway {
            circuits: Arc::new(Mutex::new(FnvHashMap::default())),
            fanout: Arc::new(FanoutManager::new()),
            metadata,
        }
    }

    async fn session_for(&self, circuit_id: &CircuitId) -> Arc<Mutex<SessionState>> {
        let mut circuits = self.circuits.lock().await;
        circuits.entry(circuit_id.clone()).or_default().session.clone()
    }

    /// Spawns a collector task for `circuit_id`. Returns
    /// [`GatewayError::AlreadyRunning`] if one is already active; the
    /// caller must [`Gateway::stop_collector`] first to replace it.
    pub async fn start_collector<T: UpstreamTransport>(
        &self,
        circuit_id: CircuitId,
        config: CollectorConfig,
        transport: T,
    ) -> Result<(), GatewayError> {
        let session = self.session_for(&circuit_id).await;

        let mut circuits = self.circuits.lock().await;
        let handle = circuits.entry(circuit_id.clone()).or_default();
        if handle.task.is_some() {
            return Err(GatewayError::AlreadyRunning(circuit_id.as_str().to_string()));
        }

        let collector = Collector::new(
            circuit_id.clone(),
            config,
            transport,
            session,
            self.fanout.clone(),
            self.metadata.clone(),
        );
        let stop = collector.stop_handle();
        let status = collector.status_handle();
        let task = tokio::spawn(collector.run());

        handle.stop = Some(stop);
        handle.status = Some(status);
        handle.task = Some(task);
        Ok(())
    }

    /// Signals the collector to stop and waits for its task to finish.
    /// A no-op (not an error) if no collector is running.
    pub async fn stop_collector(&self, circuit_id: &CircuitId) -> Result<(), GatewayError> {
        let (stop, task) = {
            let mut circuits = self.circuits.lock().await;
            let Some(handle) = circuits.get_mut(circuit_id) else {
                return Ok(());
            };
            (handle.stop.take(), handle.task.take())
        };
        if let Some(stop) = stop {
            stop.notify_one();
        }
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(())
    }

    pub async fn collector_status(&self, circuit_id: &CircuitId) -> Option<CollectorStatus> {
        let circuits = self.circuits.lock().await;
        let status = circuits.get(circuit_id)?.status.clone()?;
        Some(status.read().await.clone())
    }

    pub async fn attach_subscriber(
        &self,
        circuit_id: CircuitId,
        id: SubscriberId,
        sink: Arc<dyn SubscriberSink>,
    ) {
        self.circuits.lock().await.entry(circuit_id.clone()).or_default();
        self.fanout.attach(circuit_id, id, sink).await;
    }

    pub async fn detach_subscriber(&self, circuit_id: &CircuitId, id: &SubscriberId) -> bool {
        self.fanout.detach(circuit_id, id).await
    }

    pub async fn connection_count(&self, circuit_id: &CircuitId) -> usize {
        self.fanout.count(circuit_id).await
    }

    pub async fn clear_session(&self, circuit_id: &CircuitId) {
        let circuits = self.circuits.lock().await;
        if let Some(handle) = circuits.get(circuit_id) {
            handle.session.lock().await.clear();
        }
    }

    pub async fn export_session(&self, circuit_id: &CircuitId) -> Option<SessionSnapshot> {
        let circuits = self.circuits.lock().await;
        let handle = circuits.get(circuit_id)?;
        Some(handle.session.lock().await.export())
    }

    pub async fn import_session(&self, circuit_id: CircuitId, snapshot: SessionSnapshot) {
        let session = self.session_for(&circuit_id).await;
        session.lock().await.import(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::LoggingMetadataStore;

    #[tokio::test]
    async fn export_import_round_trips_through_gateway() {
        let gateway = Gateway::new(Arc::new(LoggingMetadataStore));
        let circuit = CircuitId::new("spa");

        {
            let session = gateway.session_for(&circuit).await;
            let mut session = session.lock().await;
            session.apply(crate::decoder::decode("r1c1|tn|10"));
        }

        let snapshot = gateway.export_session(&circuit).await.unwrap();
        let other = CircuitId::new("monza");
        gateway.import_session(other.clone(), snapshot).await;

        let session = gateway.session_for(&other).await;
        let session = session.lock().await;
        assert_eq!(session.message_count(), 1);
    }

    #[tokio::test]
    async fn clear_session_on_unknown_circuit_is_a_no_op() {
        let gateway = Gateway::new(Arc::new(LoggingMetadataStore));
        gateway.clear_session(&CircuitId::new("unknown")).await;
    }

    #[tokio::test]
    async fn stop_collector_on_unknown_circuit_is_a_no_op() {
        let gateway = Gateway::new(Arc::new(LoggingMetadataStore));
        assert!(gateway.stop_collector(&CircuitId::new("unknown")).await.is_ok());
    }
}
