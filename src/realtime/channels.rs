//! # Channel Registry
//!
//! Demultiplexes inbound frames to named channels and manages
//! subscribe/unsubscribe reference counting.
//!
//! The registry is an explicit map from channel name to a listener set plus
//! an ack flag; no lifetime management hides in closures. The first
//! subscriber for a channel sends the wire `subscribe` frame; each
//! additional subscriber only registers a listener; only the last
//! unsubscribe sends the wire `unsubscribe` frame.
//!
//! Fan-out uses one unbounded mpsc sender per listener and `Arc`-wrapped
//! messages, so delivery to one listener is never blocked or delayed by
//! another listener's processing, and frames arrive in transport order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::realtime::protocol::{ClientFrame, ServerFrame};

/// A data frame delivered to channel listeners
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub channel: String,
    pub data: Value,
    pub timestamp: Option<String>,
}

struct Listener {
    id: u64,
    sender: mpsc::UnboundedSender<Arc<ChannelMessage>>,
}

#[derive(Default)]
struct ChannelEntry {
    /// Server has acked the subscription
    acked: bool,
    listeners: Vec<Listener>,
}

/// Registry of channel subscriptions multiplexed over one connection
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, ChannelEntry>>,
    /// Outbound frames, drained by the connection manager in request order
    outbound: mpsc::UnboundedSender<ClientFrame>,
    next_listener_id: AtomicU64,
}

impl ChannelRegistry {
    /// Create a registry writing client frames to the given outbound queue
    pub fn new(outbound: mpsc::UnboundedSender<ClientFrame>) -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(HashMap::new()),
            outbound,
            next_listener_id: AtomicU64::new(1),
        })
    }

    /// Subscribe a new listener to a channel.
    ///
    /// Dropping the returned [`Subscription`] (or calling
    /// [`Subscription::unsubscribe`]) decrements the reference count
    /// synchronously; the wire frame is queued at the 1→0 transition.
    pub fn subscribe(self: &Arc<Self>, channel: &str) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let first = {
            let mut channels = self.channels.lock();
            let entry = channels.entry(channel.to_string()).or_default();
            let first = entry.listeners.is_empty();
            entry.listeners.push(Listener { id, sender: tx });
            first
        };

        if first {
            debug!(channel = %channel, "First listener, sending subscribe frame");
            self.send_frame(ClientFrame::Subscribe {
                channel: channel.to_string(),
            });
        }

        Subscription {
            registry: Arc::clone(self),
            channel: channel.to_string(),
            id,
            receiver: rx,
            active: true,
        }
    }

    /// Dispatch a parsed server frame to the appropriate channel
    pub fn dispatch(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Subscribed { channel } => {
                let mut channels = self.channels.lock();
                if let Some(entry) = channels.get_mut(&channel) {
                    entry.acked = true;
                    debug!(channel = %channel, "Subscription acked by server");
                }
            }
            ServerFrame::Unsubscribed { channel } => {
                debug!(channel = %channel, "Unsubscription acked by server");
            }
            ServerFrame::Data {
                channel,
                data,
                timestamp,
            } => {
                self.fan_out(&channel, data, timestamp);
            }
            // Heartbeats are handled by the connection manager.
            ServerFrame::Ping | ServerFrame::Pong => {}
        }
    }

    /// Re-send subscribe frames for every channel that still has listeners.
    /// Called by the connection manager after a reconnect, since the new
    /// socket knows nothing of the previous session's subscriptions.
    pub fn resubscribe_all(&self) {
        let names: Vec<String> = {
            let mut channels = self.channels.lock();
            channels
                .iter_mut()
                .filter(|(_, entry)| !entry.listeners.is_empty())
                .map(|(name, entry)| {
                    entry.acked = false;
                    name.clone()
                })
                .collect()
        };

        for channel in names {
            self.send_frame(ClientFrame::Subscribe { channel });
        }
    }

    /// Whether the server has acked the channel's subscription
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels
            .lock()
            .get(channel)
            .map(|e| e.acked)
            .unwrap_or(false)
    }

    /// Current listener count for a channel
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map(|e| e.listeners.len())
            .unwrap_or(0)
    }

    fn fan_out(&self, channel: &str, data: Value, timestamp: Option<String>) {
        let message = Arc::new(ChannelMessage {
            channel: channel.to_string(),
            data,
            timestamp,
        });

        let mut channels = self.channels.lock();
        if let Some(entry) = channels.get_mut(channel) {
            // Drop listeners whose receivers are gone.
            entry
                .listeners
                .retain(|listener| listener.sender.send(Arc::clone(&message)).is_ok());
            trace!(
                channel = %channel,
                listeners = entry.listeners.len(),
                "Data frame fanned out"
            );
        } else {
            trace!(channel = %channel, "Data frame for channel without listeners");
        }
    }

    /// Remove one listener; sends the wire unsubscribe at the 1→0 transition
    fn remove_listener(&self, channel: &str, id: u64) {
        let emptied = {
            let mut channels = self.channels.lock();
            match channels.get_mut(channel) {
                Some(entry) => {
                    entry.listeners.retain(|l| l.id != id);
                    if entry.listeners.is_empty() {
                        channels.remove(channel);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if emptied {
            debug!(channel = %channel, "Last listener gone, sending unsubscribe frame");
            self.send_frame(ClientFrame::Unsubscribe {
                channel: channel.to_string(),
            });
        }
    }

    fn send_frame(&self, frame: ClientFrame) {
        // The outbound queue is unbounded and survives reconnects; a send
        // error means the connection manager is gone entirely.
        if self.outbound.send(frame).is_err() {
            warn!("Outbound frame queue closed, frame dropped");
        }
    }
}

/// Handle for one listener on one channel.
///
/// Receives data frames via [`Subscription::recv`]; dropping the handle
/// unsubscribes synchronously.
pub struct Subscription {
    registry: Arc<ChannelRegistry>,
    channel: String,
    id: u64,
    receiver: mpsc::UnboundedReceiver<Arc<ChannelMessage>>,
    active: bool,
}

impl Subscription {
    /// Receive the next data frame for this channel
    pub async fn recv(&mut self) -> Option<Arc<ChannelMessage>> {
        self.receiver.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<Arc<ChannelMessage>> {
        self.receiver.try_recv().ok()
    }

    /// Channel name this subscription listens on
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Explicitly unsubscribe (equivalent to dropping the handle)
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.registry.remove_listener(&self.channel, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> (
        Arc<ChannelRegistry>,
        mpsc::UnboundedReceiver<ClientFrame>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelRegistry::new(tx), rx)
    }

    fn data_frame(channel: &str, data: Value) -> ServerFrame {
        ServerFrame::Data {
            channel: channel.to_string(),
            data,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_single_subscribe_frame_for_many_listeners() {
        let (registry, mut wire) = setup();

        let _a = registry.subscribe("kpis");
        let _b = registry.subscribe("kpis");
        let _c = registry.subscribe("kpis");

        assert_eq!(
            wire.try_recv().unwrap(),
            ClientFrame::Subscribe {
                channel: "kpis".to_string()
            }
        );
        assert!(wire.try_recv().is_err(), "only one subscribe frame expected");
        assert_eq!(registry.listener_count("kpis"), 3);
    }

    #[tokio::test]
    async fn test_unsubscribe_frame_only_on_last_listener() {
        let (registry, mut wire) = setup();

        let a = registry.subscribe("kpis");
        let b = registry.subscribe("kpis");
        let mut c = registry.subscribe("kpis");
        let _ = wire.try_recv(); // subscribe frame

        a.unsubscribe();
        drop(b);
        assert!(wire.try_recv().is_err(), "no unsubscribe while listeners remain");

        // Remaining listener still receives data.
        registry.dispatch(data_frame("kpis", json!({ "total": 1 })));
        assert_eq!(c.try_recv().unwrap().data["total"], 1);

        drop(c);
        assert_eq!(
            wire.try_recv().unwrap(),
            ClientFrame::Unsubscribe {
                channel: "kpis".to_string()
            }
        );
        assert_eq!(registry.listener_count("kpis"), 0);
    }

    #[tokio::test]
    async fn test_fan_out_reaches_all_listeners_in_order() {
        let (registry, _wire) = setup();

        let mut a = registry.subscribe("rates");
        let mut b = registry.subscribe("rates");

        registry.dispatch(data_frame("rates", json!({ "seq": 1 })));
        registry.dispatch(data_frame("rates", json!({ "seq": 2 })));

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.try_recv().unwrap().data["seq"], 1);
            assert_eq!(sub.try_recv().unwrap().data["seq"], 2);
        }
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let (registry, _wire) = setup();

        let mut kpis = registry.subscribe("kpis");
        let mut rates = registry.subscribe("rates");

        registry.dispatch(data_frame("rates", json!({ "rate": 7.5 })));

        assert!(kpis.try_recv().is_none());
        assert_eq!(rates.try_recv().unwrap().data["rate"], 7.5);
    }

    #[tokio::test]
    async fn test_ack_tracking() {
        let (registry, _wire) = setup();
        let _sub = registry.subscribe("kpis");
        assert!(!registry.is_subscribed("kpis"));

        registry.dispatch(ServerFrame::Subscribed {
            channel: "kpis".to_string(),
        });
        assert!(registry.is_subscribed("kpis"));
    }

    #[tokio::test]
    async fn test_resubscribe_all_after_reconnect() {
        let (registry, mut wire) = setup();
        let _kpis = registry.subscribe("kpis");
        let _rates = registry.subscribe("rates");
        let _ = wire.try_recv();
        let _ = wire.try_recv();

        registry.dispatch(ServerFrame::Subscribed {
            channel: "kpis".to_string(),
        });
        registry.resubscribe_all();

        // Acks are stale after reconnect.
        assert!(!registry.is_subscribed("kpis"));

        let mut resent: Vec<String> = Vec::new();
        while let Ok(frame) = wire.try_recv() {
            resent.push(frame.channel().to_string());
        }
        resent.sort();
        assert_eq!(resent, vec!["kpis", "rates"]);
    }

    #[tokio::test]
    async fn test_data_without_listeners_is_dropped() {
        let (registry, _wire) = setup();
        // Must not panic or leak.
        registry.dispatch(data_frame("nobody-home", json!({})));
    }
}
