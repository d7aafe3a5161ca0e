//! # Real-Time Channel Layer
//!
//! Multiplexes many named channels over one persistent WebSocket connection.
//!
//! ## Architecture
//!
//! - **Protocol**: JSON wire frames for subscribe/unsubscribe, server acks,
//!   and channel data, plus bare `"ping"`/`"pong"` heartbeat text
//! - **Channel Registry**: reference-counted subscriptions and fan-out of
//!   inbound frames to listeners
//! - **Connection Manager**: owns the single transport connection,
//!   performing connect/reconnect/heartbeat with epoch-based supersession
//!
//! The single connection is shared read-only by many channel subscribers;
//! writes are owned exclusively by the connection manager and channel
//! registry. No external caller sends raw frames directly.

pub mod channels;
pub mod connection;
pub mod protocol;

pub use channels::{ChannelMessage, ChannelRegistry, Subscription};
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionStatus, ReconnectStrategy};
pub use protocol::{ClientFrame, ServerFrame};
