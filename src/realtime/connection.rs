//! # Connection Manager
//!
//! Owns the single persistent WebSocket connection: connect, reconnect with
//! a capped attempt budget, heartbeat with a dead-connection watchdog, and
//! clean teardown.
//!
//! The lifecycle is an explicit state machine (idle, connecting, open,
//! reconnecting, closed, error) with a single transition point. Every
//! `connect()` call starts a new connection **epoch**; any event from a
//! prior epoch observed after a newer epoch has started is discarded, so a
//! superseded socket's late events can never race the new socket's state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::constants::{self, events};
use crate::error::VigilError;
use crate::events::EventPublisher;
use crate::realtime::channels::ChannelRegistry;
use crate::realtime::protocol::{ClientFrame, ServerFrame, PING, PONG};

/// Lifecycle of the single transport connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Never connected (or connection disabled)
    Idle,
    /// First connection attempt in flight
    Connecting,
    /// Transport established and healthy
    Open,
    /// Transport lost; a reconnect attempt is scheduled or in flight
    Reconnecting,
    /// Explicit `disconnect()` in progress
    Closing,
    /// Closed by explicit `disconnect()`; no reconnect will follow
    Closed,
    /// Reconnect budget exhausted; terminal until `connect()` is called again
    Error(String),
}

/// Delay policy between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectStrategy {
    /// Fixed `reconnect_interval` between attempts
    Fixed,
    /// Exponential growth from `reconnect_interval` with full jitter,
    /// capped at [`constants::MAX_RECONNECT_DELAY_MS`]
    Exponential,
}

/// Tuning for the connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL of the real-time gateway
    pub url: String,
    /// Whether to connect at all
    pub enabled: bool,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_strategy: ReconnectStrategy,
    pub heartbeat_interval: Duration,
    /// Grace window for a pong reply before the connection is declared dead
    pub heartbeat_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4000/ws".to_string(),
            enabled: true,
            reconnect_interval: Duration::from_millis(constants::DEFAULT_RECONNECT_INTERVAL_MS),
            max_reconnect_attempts: constants::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_strategy: ReconnectStrategy::Fixed,
            heartbeat_interval: Duration::from_millis(constants::DEFAULT_HEARTBEAT_INTERVAL_MS),
            heartbeat_timeout: Duration::from_millis(constants::DEFAULT_HEARTBEAT_TIMEOUT_MS),
        }
    }
}

/// Why a session ended
enum SessionEnd {
    /// A newer epoch superseded this session
    Superseded,
    /// Outbound queue closed; the manager is being torn down
    Shutdown,
    /// Transport failed; reconnect policy applies
    TransportLost(String),
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Manager for the single multiplexed transport connection
pub struct ConnectionManager {
    config: ConnectionConfig,
    registry: Arc<ChannelRegistry>,
    outbound: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<ClientFrame>>>,
    outbound_tx: mpsc::UnboundedSender<ClientFrame>,
    status_tx: watch::Sender<ConnectionStatus>,
    epoch: AtomicU64,
    run_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    events: EventPublisher,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Arc<Self> {
        Self::with_events(config, EventPublisher::default())
    }

    pub fn with_events(config: ConnectionConfig, events: EventPublisher) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(ConnectionStatus::Idle);
        Arc::new(Self {
            config,
            registry: ChannelRegistry::new(outbound_tx.clone()),
            outbound: Arc::new(tokio::sync::Mutex::new(outbound_rx)),
            outbound_tx,
            status_tx,
            epoch: AtomicU64::new(0),
            run_handle: parking_lot::Mutex::new(None),
            events,
        })
    }

    /// The channel registry multiplexed over this connection
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    /// Watch connection status changes
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// The terminal transport error, if the reconnect budget has been
    /// exhausted. `None` in every other state; reconnection in progress is
    /// not an error.
    pub fn last_error(&self) -> Option<VigilError> {
        match self.status() {
            ConnectionStatus::Error(message) => Some(VigilError::Transport(message)),
            _ => None,
        }
    }

    /// Current connection epoch
    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Queue a frame for the transport. Frames are serialized through the
    /// single connection in request order.
    pub fn send(&self, frame: ClientFrame) {
        let _ = self.outbound_tx.send(frame);
    }

    /// Open the connection, superseding any previous connect attempt.
    ///
    /// Starts a new epoch; the previous epoch's session (if any) is aborted
    /// and its late events are discarded.
    pub fn connect(self: &Arc<Self>) {
        if !self.config.enabled {
            debug!("Real-time connection disabled by configuration");
            return;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(previous) = self.run_handle.lock().take() {
            previous.abort();
            debug!(epoch = epoch, "Superseded previous connection epoch");
        }

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.run_loop(epoch).await;
        });
        *self.run_handle.lock() = Some(handle);
    }

    /// Close the connection cleanly. Cancels pending reconnect and heartbeat
    /// timers; never triggers an automatic reconnect.
    pub fn disconnect(&self) {
        // Bump the epoch so any in-flight event from the old session is
        // discarded as stale.
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.set_status(ConnectionStatus::Closing);
        if let Some(handle) = self.run_handle.lock().take() {
            handle.abort();
        }
        self.set_status(ConnectionStatus::Closed);
    }

    /// Connect/reconnect loop for one epoch
    async fn run_loop(self: Arc<Self>, epoch: u64) {
        let mut attempts: u32 = 0;

        loop {
            let status = if attempts == 0 {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Reconnecting
            };
            if !self.set_status_for_epoch(epoch, status) {
                return;
            }

            info!(url = %self.config.url, epoch = epoch, attempt = attempts, "Connecting to real-time gateway");
            match connect_async(&self.config.url).await {
                Ok((stream, _)) => {
                    attempts = 0;
                    if !self.set_status_for_epoch(epoch, ConnectionStatus::Open) {
                        return;
                    }

                    match self.run_session(stream, epoch).await {
                        SessionEnd::Superseded => return,
                        SessionEnd::Shutdown => {
                            self.set_status_for_epoch(epoch, ConnectionStatus::Closed);
                            return;
                        }
                        SessionEnd::TransportLost(reason) => {
                            warn!(epoch = epoch, reason = %reason, "Transport lost");
                        }
                    }
                }
                Err(e) => {
                    warn!(epoch = epoch, error = %e, "Connection attempt failed");
                }
            }

            attempts += 1;
            if attempts > self.config.max_reconnect_attempts {
                let message = format!(
                    "connection failed after {} reconnect attempts",
                    self.config.max_reconnect_attempts
                );
                self.set_status_for_epoch(epoch, ConnectionStatus::Error(message));
                return;
            }

            if !self.set_status_for_epoch(epoch, ConnectionStatus::Reconnecting) {
                return;
            }
            sleep(self.reconnect_delay(attempts)).await;
        }
    }

    /// Drive one established socket until it ends
    async fn run_session(&self, stream: WsStream, epoch: u64) -> SessionEnd {
        let (mut write, mut read) = stream.split();
        let mut outbound = self.outbound.lock().await;

        // A fresh socket knows nothing of prior sessions: drop frames queued
        // against the old one, then replay current subscriptions.
        while outbound.try_recv().is_ok() {}
        self.registry.resubscribe_all();

        let mut heartbeat = interval_at(
            (Instant::now() + self.config.heartbeat_interval).into(),
            self.config.heartbeat_interval,
        );
        let mut watchdog = interval_at(
            (Instant::now() + Duration::from_secs(1)).into(),
            Duration::from_secs(1),
        );
        let mut awaiting_pong: Option<Instant> = None;

        loop {
            if self.current_epoch() != epoch {
                return SessionEnd::Superseded;
            }

            tokio::select! {
                frame = outbound.recv() => {
                    match frame {
                        Some(frame) => {
                            if let Err(e) = write.send(Message::Text(frame.to_text().into())).await {
                                return SessionEnd::TransportLost(e.to_string());
                            }
                        }
                        None => return SessionEnd::Shutdown,
                    }
                }
                message = read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if self.current_epoch() != epoch {
                                return SessionEnd::Superseded;
                            }
                            match ServerFrame::parse(text.as_str()) {
                                Some(ServerFrame::Ping) => {
                                    if let Err(e) = write.send(Message::Text(PONG.into())).await {
                                        return SessionEnd::TransportLost(e.to_string());
                                    }
                                }
                                Some(ServerFrame::Pong) => {
                                    awaiting_pong = None;
                                }
                                Some(frame) => self.registry.dispatch(frame),
                                // Frames that do not parse as JSON are ignored.
                                None => {}
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                return SessionEnd::TransportLost(e.to_string());
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            awaiting_pong = None;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return SessionEnd::TransportLost("closed by remote".to_string());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return SessionEnd::TransportLost(e.to_string());
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = write.send(Message::Text(PING.into())).await {
                        return SessionEnd::TransportLost(e.to_string());
                    }
                    if awaiting_pong.is_none() {
                        awaiting_pong = Some(Instant::now());
                    }
                }
                _ = watchdog.tick() => {
                    if let Some(sent_at) = awaiting_pong {
                        if sent_at.elapsed() > self.config.heartbeat_timeout {
                            return SessionEnd::TransportLost("heartbeat timeout".to_string());
                        }
                    }
                }
            }
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based)
    fn reconnect_delay(&self, attempt: u32) -> Duration {
        match self.config.reconnect_strategy {
            ReconnectStrategy::Fixed => self.config.reconnect_interval,
            ReconnectStrategy::Exponential => {
                let base = self.config.reconnect_interval.as_millis() as u64;
                let exp = base.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
                let capped = exp.min(constants::MAX_RECONNECT_DELAY_MS);
                // Full jitter spreads simultaneous reconnecting clients.
                Duration::from_millis(rand::thread_rng().gen_range(0..=capped))
            }
        }
    }

    /// Status transition on behalf of a session epoch. Re-checks the epoch
    /// at the transition itself: `abort()` only lands at an await point, so
    /// a superseded run task may still reach here after `disconnect()` has
    /// already reported `Closed`. Returns whether the epoch is still
    /// current.
    fn set_status_for_epoch(&self, epoch: u64, status: ConnectionStatus) -> bool {
        if self.current_epoch() != epoch {
            debug!(epoch = epoch, status = ?status, "Discarding stale status transition");
            return false;
        }
        self.set_status(status);
        true
    }

    /// Single status transition point
    fn set_status(&self, status: ConnectionStatus) {
        let changed = {
            let current = self.status_tx.borrow();
            *current != status
        };
        if !changed {
            return;
        }

        let event_name = match &status {
            ConnectionStatus::Connecting => events::CONNECTION_CONNECTING,
            ConnectionStatus::Open => events::CONNECTION_OPEN,
            ConnectionStatus::Reconnecting => events::CONNECTION_RECONNECTING,
            ConnectionStatus::Closing | ConnectionStatus::Closed => events::CONNECTION_CLOSED,
            ConnectionStatus::Error(_) => events::CONNECTION_ERROR,
            ConnectionStatus::Idle => events::CONNECTION_CLOSED,
        };
        info!(status = ?status, "Connection status changed");
        self.events.publish(event_name, json!({ "status": format!("{status:?}") }));
        self.status_tx.send_replace(status);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.run_handle.lock().take() {
            handle.abort();
        }
    }
}
