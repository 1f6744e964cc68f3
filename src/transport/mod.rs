//! Transport abstraction for the wireless link
//!
//! Separates radio concerns from the link protocol:
//! - **Transport**: connection lifecycle, frame size negotiation, writes
//!   and notifications on the controller's characteristic
//! - **Link**: frame layout, cycle timing, status bookkeeping
//!
//! A transport reports what happens on the air as `TransportEvent`s and
//! accepts `WriteRequest`s. Everything else lives in `crate::link`.
//!
//! # Adding a new transport
//!
//! 1. Create `transport/my_transport.rs`
//! 2. Implement the `Transport` trait
//! 3. Add `pub mod my_transport;` here

pub mod loopback;

pub use loopback::{LoopbackConfig, LoopbackTransport};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

/// How writes to the command characteristic complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// The transport confirms each write
    #[default]
    Acknowledged,
    /// Fire and forget
    Unacknowledged,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acknowledged => write!(f, "acknowledged"),
            Self::Unacknowledged => write!(f, "unacknowledged"),
        }
    }
}

/// Something that happened on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Peer connected and the command characteristic is ready
    Connected { write_mode: WriteMode },
    /// Peer gone; writes will fail until the next `Connected`
    Disconnected,
    /// Frame size (MTU) agreed with the peer, overhead included.
    /// May arrive before or after `Connected`; holds until `Disconnected`.
    FrameSizeNegotiated(usize),
    /// Physical layer in use, informational
    LinkRate { tx_phy: u8, rx_phy: u8 },
    /// One status frame from the controller. Ignored outside a connection.
    Notification(Bytes),
}

/// One command frame to write
///
/// For acknowledged writes the transport completes `ack` exactly once
/// with the write status. A dropped `ack` counts as a failed write.
#[derive(Debug)]
pub struct WriteRequest {
    pub payload: Bytes,
    pub ack: Option<oneshot::Sender<Result<()>>>,
}

impl WriteRequest {
    pub fn unacknowledged(payload: Bytes) -> Self {
        Self { payload, ack: None }
    }

    /// Request plus the receiver the caller waits on
    pub fn acknowledged(payload: Bytes) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                payload,
                ack: Some(tx),
            },
            rx,
        )
    }

    /// Complete the write; the waiter may already be gone
    pub fn complete(&mut self, status: Result<()>) {
        if let Some(ack) = self.ack.take() {
            let _ = ack.send(status);
        }
    }
}

/// Channels for communication with a running transport
///
/// The transport closes `events` when it stops for good.
pub struct TransportChannels {
    /// Link events, in the order they happened
    pub events: mpsc::Receiver<TransportEvent>,

    /// Command frames to write to the controller
    pub writes: mpsc::Sender<WriteRequest>,
}

/// Trait for spawnable transports
///
/// A transport handles:
/// - Connecting to the peer and reporting connection changes
/// - Frame size negotiation
/// - Writing command frames, confirming them when acknowledged
/// - Delivering notifications
///
/// A transport does NOT handle:
/// - Frame layout (that's the codec's job)
/// - Cycle timing, statistics or logging (that's the link's job)
///
/// # Lifecycle
///
/// 1. Create transport with configuration
/// 2. Call `spawn()` to start I/O in background
/// 3. Use returned channels for communication
/// 4. Transport runs until `shutdown` is set or the peer is gone for good
/// 5. Transport closes `events` when stopping
pub trait Transport: Send + 'static {
    /// Spawn the transport in background
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be initialized.
    fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels>;
}
