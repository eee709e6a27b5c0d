//! Component D: the upstream collector.
//!
//! Owns one reconnecting connection per circuit, decodes every frame it
//! receives, applies it to that circuit's session state, and hands the
//! outcome to the fan-out manager. Generic over [`UpstreamTransport`] so
//! tests can swap in an in-memory transport instead of a real socket.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::decoder::decode;
use crate::downstream::{DownstreamMessage, KartingDataPayload, StatusPayload};
use crate::fanout::FanoutManager;
use crate::ids::CircuitId;
use crate::metadata::MetadataStore;
use crate::session::{PersistenceDirective, SessionState};
use crate::transport::{TransportError, UpstreamTransport};

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("heartbeat deadline elapsed with no upstream activity")]
    HeartbeatTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Connecting,
    Streaming,
    Backoff,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct CollectorStatus {
    pub state: CollectorState,
    pub attempt: u32,
    pub last_error: Option<String>,
}

impl Default for CollectorStatus {
    fn default() -> Self {
        CollectorStatus {
            state: CollectorState::Idle,
            attempt: 0,
            last_error: None,
        }
    }
}

/// Drives one circuit's upstream connection until told to stop or until
/// the attempt budget is exhausted.
pub struct Collector<T: UpstreamTransport> {
    circuit_id: CircuitId,
    config: CollectorConfig,
    transport: T,
    session: Arc<Mutex<SessionState>>,
    fanout: Arc<FanoutManager>,
    metadata: Arc<dyn MetadataStore>,
    status: Arc<RwLock<CollectorStatus>>,
    stop: Arc<tokio::sync::Notify>,
}

impl<T: UpstreamTransport> Collector<T> {
    pub fn new(
        circuit_id: CircuitId,
        config: CollectorConfig,
        transport: T,
        session: Arc<Mutex<SessionState>>,
        fanout: Arc<FanoutManager>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Collector {
            circuit_id,
            config,
            transport,
            session,
            fanout,
            metadata,
            status: Arc::new(RwLock::new(CollectorStatus::default())),
            stop: Arc::new(tokio::sync::Notify::new()),
        }
    }

    pub fn status_handle(&self) -> Arc<RwLock<CollectorStatus>> {
        self.status.clone()
    }

    pub async fn status(&self) -> CollectorStatus {
        self.status.read().await.clone()
    }

    pub fn stop_handle(&self) -> Arc<tokio::sync::Notify> {
        self.stop.clone()
    }

    async fn set_state(&self, state: CollectorState) {
        self.status.write().await.state = state;
    }

    /// Runs the reconnect loop until stopped or the attempt budget is
    /// exhausted. Intended to be spawned as its own task.
    pub async fn run(self) {
        let mut attempt: u32 = 0;
        let mut backoff = self.config.initial_backoff();

        loop {
            if attempt >= self.config.max_attempts {
                warn!(circuit = %self.circuit_id.as_str(), "giving up after max attempts");
                self.set_state(CollectorState::Stopped).await;
                let last_error = self.status.read().await.last_error.clone();
                self.send_status_update(false, last_error).await;
                return;
            }

            attempt += 1;
            {
                let mut status = self.status.write().await;
                status.state = CollectorState::Connecting;
                status.attempt = attempt;
            }

            let connected = tokio::select! {
                result = self.transport.connect(&self.config.url) => result,
                _ = self.stop.notified() => {
                    self.set_state(CollectorState::Stopped).await;
                    return;
                }
            };

            let mut conn = match connected {
                Ok(conn) => conn,
                Err(err) => {
                    self.record_error(CollectorError::from(err)).await;
                    self.backoff_then_retry(&mut backoff).await;
                    continue;
                }
            };

            self.set_state(CollectorState::Streaming).await;
            {
                let mut status = self.status.write().await;
                status.last_error = None;
            }
            self.send_status_update(true, None).await;
            attempt = 0;
            backoff = self.config.initial_backoff();

            if self.stream(&mut conn).await.is_break() {
                self.set_state(CollectorState::Stopped).await;
                return;
            }

            self.backoff_then_retry(&mut backoff).await;
        }
    }

    async fn stream(&self, conn: &mut T::Connection) -> std::ops::ControlFlow<()> {
        let heartbeat = self.config.heartbeat_interval();
        loop {
            let recv = timeout(heartbeat, self.transport.recv_frame(conn));
            tokio::select! {
                result = recv => {
                    match result {
                        Ok(Ok(Some(frame))) => self.handle_frame(&frame).await,
                        Ok(Ok(None)) => {
                            self.record_error(CollectorError::from(TransportError::Closed)).await;
                            return std::ops::ControlFlow::Continue(());
                        }
                        Ok(Err(err)) => {
                            self.record_error(CollectorError::from(err)).await;
                            return std::ops::ControlFlow::Continue(());
                        }
                        Err(_elapsed) => {
                            match timeout(heartbeat, self.transport.send_heartbeat(conn)).await {
                                Ok(Err(err)) => {
                                    self.record_error(CollectorError::from(err)).await;
                                    return std::ops::ControlFlow::Continue(());
                                }
                                Err(_elapsed) => {
                                    self.record_error(CollectorError::HeartbeatTimeout).await;
                                    return std::ops::ControlFlow::Continue(());
                                }
                                Ok(Ok(())) => {
                                    debug!(circuit = %self.circuit_id.as_str(), "heartbeat sent");
                                }
                            }
                        }
                    }
                }
                _ = self.stop.notified() => {
                    return std::ops::ControlFlow::Break(());
                }
            }
        }
    }

    async fn handle_frame(&self, frame: &str) {
        let decoded = decode(frame);
        let outcome = {
            let mut session = self.session.lock().await;
            session.apply(decoded)
        };

        match &outcome.persistence {
            PersistenceDirective::PersistMapping(mapping) => {
                if let Err(err) = self.metadata.write_mapping(&self.circuit_id, mapping).await {
                    warn!(circuit = %self.circuit_id.as_str(), %err, "failed to persist mapping");
                }
            }
            PersistenceDirective::PersistNeedsConfig => {
                if let Err(err) = self.metadata.write_needs_configuration(&self.circuit_id).await {
                    warn!(circuit = %self.circuit_id.as_str(), %err, "failed to persist needs-configuration flag");
                }
            }
            PersistenceDirective::None => {}
        }

        if outcome.affected.is_empty() {
            return;
        }

        let drivers = outcome
            .records
            .into_iter()
            .map(|(id, record)| (id.as_str().to_string(), record.fields))
            .collect();

        let payload = KartingDataPayload {
            circuit_id: self.circuit_id.as_str().to_string(),
            drivers,
            column_order: outcome.column_order,
            message_count: outcome.message_count,
            timestamp: 0,
        };

        self.fanout.broadcast(&self.circuit_id, payload).await;
    }

    async fn record_error(&self, error: CollectorError) {
        let message = error.to_string();
        warn!(circuit = %self.circuit_id.as_str(), error = %message, "collector error");
        self.status.write().await.last_error = Some(message.clone());
        self.send_status_update(false, Some(message)).await;
    }

    /// Surfaces an upstream connectivity change to subscribers: `true` right
    /// after a (re)connect reaches Streaming, `false` on every connect/stream
    /// failure and when the reconnect budget is exhausted.
    async fn send_status_update(&self, timing_connected: bool, last_error: Option<String>) {
        self.fanout
            .send_status(
                &self.circuit_id,
                DownstreamMessage::StatusUpdate {
                    circuit_id: self.circuit_id.as_str().to_string(),
                    status: StatusPayload {
                        timing_connected,
                        attempt: self.status.read().await.attempt,
                        last_error,
                    },
                },
            )
            .await;
    }

    async fn backoff_then_retry(&self, backoff: &mut Duration) {
        self.set_state(CollectorState::Backoff).await;
        info!(circuit = %self.circuit_id.as_str(), backoff_secs = backoff.as_secs(), "backing off");
        tokio::select! {
            _ = tokio::time::sleep(*backoff) => {}
            _ = self.stop.notified() => {}
        }
        *backoff = std::cmp::min(*backoff * 2, self.config.max_backoff());
    }
}
