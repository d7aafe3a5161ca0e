//! Integration tests for the real-time channel client against a local
//! WebSocket gateway.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use vigil_core::realtime::{ConnectionConfig, ConnectionManager, ConnectionStatus, ReconnectStrategy};

/// Command injected into the currently accepted gateway connection
enum GatewayCommand {
    Send(String),
    Close,
}

/// Minimal in-process gateway: acks subscribes, answers heartbeat pings,
/// reports observed client frames to the test, and lets the test inject
/// data frames or kill the connection.
struct TestGateway {
    url: String,
    observed: mpsc::UnboundedReceiver<String>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<GatewayCommand>>>>,
}

impl TestGateway {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test gateway");
        let url = format!("ws://{}/ws", listener.local_addr().expect("local addr"));

        let (observed_tx, observed) = mpsc::unbounded_channel();
        let current: Arc<Mutex<Option<mpsc::UnboundedSender<GatewayCommand>>>> =
            Arc::new(Mutex::new(None));

        let conn_slot = Arc::clone(&current);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
                *conn_slot.lock() = Some(cmd_tx);
                let observed_tx = observed_tx.clone();
                tokio::spawn(handle_connection(stream, cmd_rx, observed_tx));
            }
        });

        Self {
            url,
            observed,
            current,
        }
    }

    /// Next client frame seen by the gateway, as a short descriptor
    async fn next_observed(&mut self) -> String {
        timeout(Duration::from_secs(5), self.observed.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("gateway observation channel open")
    }

    fn send(&self, text: String) {
        if let Some(tx) = self.current.lock().as_ref() {
            let _ = tx.send(GatewayCommand::Send(text));
        }
    }

    fn kill_connection(&self) {
        if let Some(tx) = self.current.lock().take() {
            let _ = tx.send(GatewayCommand::Close);
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    mut commands: mpsc::UnboundedReceiver<GatewayCommand>,
    observed: mpsc::UnboundedSender<String>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(GatewayCommand::Send(text)) => {
                        if write.send(Message::Text(text.into())).await.is_err() {
                            return;
                        }
                    }
                    Some(GatewayCommand::Close) | None => return,
                }
            }
            message = read.next() => {
                let Some(Ok(Message::Text(text))) = message else { return };
                let text = text.as_str();

                if text == "ping" {
                    let _ = observed.send("ping".to_string());
                    if write.send(Message::Text("pong".into())).await.is_err() {
                        return;
                    }
                    continue;
                }

                let Ok(frame) = serde_json::from_str::<serde_json::Value>(text) else {
                    continue;
                };
                let kind = frame["type"].as_str().unwrap_or_default().to_string();
                let channel = frame["channel"].as_str().unwrap_or_default().to_string();
                let _ = observed.send(format!("{kind}:{channel}"));

                if kind == "subscribe" {
                    let ack = json!({ "type": "subscribed", "channel": channel }).to_string();
                    if write.send(Message::Text(ack.into())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn test_config(url: &str) -> ConnectionConfig {
    ConnectionConfig {
        url: url.to_string(),
        enabled: true,
        reconnect_interval: Duration::from_millis(20),
        max_reconnect_attempts: 10,
        reconnect_strategy: ReconnectStrategy::Fixed,
        heartbeat_interval: Duration::from_secs(30),
        heartbeat_timeout: Duration::from_secs(10),
    }
}

async fn wait_for_status(
    status: &mut tokio::sync::watch::Receiver<ConnectionStatus>,
    wanted: ConnectionStatus,
) {
    timeout(Duration::from_secs(5), async {
        loop {
            if *status.borrow() == wanted {
                return;
            }
            status.changed().await.expect("status channel open");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for status {wanted:?}"));
}

#[tokio::test]
async fn test_subscribe_receive_and_resubscribe_after_reconnect() {
    let mut gateway = TestGateway::spawn().await;
    let manager = ConnectionManager::new(test_config(&gateway.url));
    let mut status = manager.watch_status();

    // Subscribing before the transport is up only queues the frame.
    let mut kpis = manager.registry().subscribe("kpis");

    manager.connect();
    wait_for_status(&mut status, ConnectionStatus::Open).await;
    assert_eq!(gateway.next_observed().await, "subscribe:kpis");

    // Ack lands and data flows.
    timeout(Duration::from_secs(2), async {
        while !manager.registry().is_subscribed("kpis") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscription acked");

    gateway.send(json!({ "type": "kpis", "data": { "total": 7 } }).to_string());
    let message = timeout(Duration::from_secs(2), kpis.recv())
        .await
        .expect("data frame delivered")
        .expect("subscription alive");
    assert_eq!(message.channel, "kpis");
    assert_eq!(message.data["total"], 7);

    // Kill the transport: the manager reconnects and replays the
    // subscription on the fresh socket without any caller involvement.
    gateway.kill_connection();
    assert_eq!(gateway.next_observed().await, "subscribe:kpis");
    wait_for_status(&mut status, ConnectionStatus::Open).await;

    gateway.send(json!({ "type": "kpis", "data": { "total": 8 } }).to_string());
    let message = timeout(Duration::from_secs(2), kpis.recv())
        .await
        .expect("data frame after reconnect")
        .expect("subscription alive");
    assert_eq!(message.data["total"], 8);

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Closed);
}

#[tokio::test]
async fn test_unsubscribe_sends_wire_frame_on_last_listener() {
    let mut gateway = TestGateway::spawn().await;
    let manager = ConnectionManager::new(test_config(&gateway.url));
    let mut status = manager.watch_status();
    manager.connect();
    wait_for_status(&mut status, ConnectionStatus::Open).await;

    let a = manager.registry().subscribe("rates");
    let b = manager.registry().subscribe("rates");
    assert_eq!(gateway.next_observed().await, "subscribe:rates");

    drop(a);
    b.unsubscribe();
    assert_eq!(gateway.next_observed().await, "unsubscribe:rates");

    manager.disconnect();
}

#[tokio::test]
async fn test_heartbeat_ping_is_sent_and_answered() {
    let mut gateway = TestGateway::spawn().await;
    let mut config = test_config(&gateway.url);
    config.heartbeat_interval = Duration::from_millis(100);
    config.heartbeat_timeout = Duration::from_millis(500);

    let manager = ConnectionManager::new(config);
    let mut status = manager.watch_status();
    manager.connect();
    wait_for_status(&mut status, ConnectionStatus::Open).await;

    assert_eq!(gateway.next_observed().await, "ping");

    // The gateway ponged, so the connection must still be healthy well past
    // the heartbeat timeout.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.status(), ConnectionStatus::Open);

    manager.disconnect();
}

#[tokio::test]
async fn test_channels_stay_isolated_across_one_transport() {
    let mut gateway = TestGateway::spawn().await;
    let manager = ConnectionManager::new(test_config(&gateway.url));
    let mut status = manager.watch_status();
    manager.connect();
    wait_for_status(&mut status, ConnectionStatus::Open).await;

    let mut kpis = manager.registry().subscribe("kpis");
    let mut rates = manager.registry().subscribe("rates");
    assert_eq!(gateway.next_observed().await, "subscribe:kpis");
    assert_eq!(gateway.next_observed().await, "subscribe:rates");

    gateway.send(json!({ "type": "rates", "data": { "eur": 1.1 } }).to_string());

    let message = timeout(Duration::from_secs(2), rates.recv())
        .await
        .expect("rates frame delivered")
        .expect("subscription alive");
    assert_eq!(message.data["eur"], 1.1);
    assert!(kpis.try_recv().is_none(), "kpis must not see rates frames");

    manager.disconnect();
}
