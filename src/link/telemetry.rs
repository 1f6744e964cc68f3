//! Telemetry publisher
//!
//! The engine and the demultiplexer update a pending snapshot under one
//! lock. At most once per publish interval the whole snapshot is copied
//! into a watch channel, so a reader never sees counters from one cycle
//! next to motor status from another.

use crate::constants::DEFAULT_FRAME_SIZE;
use crate::motor::{MotorId, MotorStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cycle engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Idle,
    Connected,
    Sending,
    AwaitingReply,
    Disconnected,
}

/// Link statistics since the current connection was established
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Frames written successfully
    pub sent: u64,
    /// Inbound frames that passed the length check
    pub received: u64,
    /// Inbound frames dropped as too short
    pub rejected: u64,
    /// Writes refused or failed by the transport
    pub failed: u64,
    /// Writes without acknowledgement in time
    pub send_timeouts: u64,
    /// Cycles without a reply in time
    pub reply_timeouts: u64,
}

/// Radio rate reported by the transport (opaque pass-through)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkRate {
    pub tx_phy: u8,
    pub rx_phy: u8,
}

impl Default for LinkRate {
    fn default() -> Self {
        // 1M PHY until the transport says otherwise
        Self { tx_phy: 1, rx_phy: 1 }
    }
}

/// Consistent view of the link for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub state: EngineState,
    pub counters: Counters,
    pub motors: [MotorStatus; 2],
    pub force: i32,
    /// Negotiated transport frame size (ATT MTU)
    pub frame_size: usize,
    pub link_rate: LinkRate,
    pub last_error: Option<String>,
    /// Summary of the last decoded status frame
    pub last_received: Option<String>,
    /// Local time of publication, HH:MM:SS.mmm
    pub published_at: String,
}

impl TelemetrySnapshot {
    pub fn motor(&self, motor: MotorId) -> &MotorStatus {
        &self.motors[motor.index()]
    }
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            state: EngineState::Idle,
            counters: Counters::default(),
            motors: [MotorStatus::default(); 2],
            force: 0,
            frame_size: DEFAULT_FRAME_SIZE,
            link_rate: LinkRate::default(),
            last_error: None,
            last_received: None,
            published_at: String::new(),
        }
    }
}

struct Pending {
    snapshot: TelemetrySnapshot,
    last_publish: Option<Instant>,
}

/// Throttled snapshot publisher
pub struct Telemetry {
    pending: Mutex<Pending>,
    published: watch::Sender<TelemetrySnapshot>,
    interval: Duration,
}

impl Telemetry {
    pub fn new(interval: Duration) -> Self {
        let (published, _) = watch::channel(TelemetrySnapshot::default());
        Self {
            pending: Mutex::new(Pending {
                snapshot: TelemetrySnapshot::default(),
                last_publish: None,
            }),
            published,
            interval,
        }
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.published.subscribe()
    }

    /// Last published snapshot
    pub fn current(&self) -> TelemetrySnapshot {
        self.published.borrow().clone()
    }

    /// Pending (not yet published) state
    pub fn pending(&self) -> TelemetrySnapshot {
        self.pending.lock().snapshot.clone()
    }

    /// Apply `f` to the pending state, then publish if the interval elapsed
    fn update(&self, f: impl FnOnce(&mut TelemetrySnapshot)) {
        let mut pending = self.pending.lock();
        f(&mut pending.snapshot);
        let now = Instant::now();
        let due = pending
            .last_publish
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            self.publish_locked(&mut pending, now);
        }
    }

    fn publish_locked(&self, pending: &mut Pending, now: Instant) {
        pending.last_publish = Some(now);
        pending.snapshot.published_at = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
        self.published.send_replace(pending.snapshot.clone());
    }

    /// Publish regardless of the throttle (lifecycle transitions)
    pub fn publish_now(&self) {
        let mut pending = self.pending.lock();
        self.publish_locked(&mut pending, Instant::now());
    }

    /// Zero counters and status for a new connection
    pub fn reset(&self) {
        let mut pending = self.pending.lock();
        let state = pending.snapshot.state;
        pending.snapshot = TelemetrySnapshot {
            state,
            ..TelemetrySnapshot::default()
        };
        self.publish_locked(&mut pending, Instant::now());
    }

    pub fn set_state(&self, state: EngineState) {
        let lifecycle = matches!(
            state,
            EngineState::Connected | EngineState::Disconnected | EngineState::Idle
        );
        let mut pending = self.pending.lock();
        let changed = pending.snapshot.state != state;
        pending.snapshot.state = state;
        // Cycle-internal transitions ride along with the next publication
        if lifecycle && changed {
            self.publish_locked(&mut pending, Instant::now());
        }
    }

    pub fn set_frame_size(&self, frame_size: usize) {
        self.update(|s| s.frame_size = frame_size);
    }

    pub fn set_link_rate(&self, tx_phy: u8, rx_phy: u8) {
        self.update(|s| s.link_rate = LinkRate { tx_phy, rx_phy });
    }

    pub fn record_sent(&self) {
        self.update(|s| s.counters.sent += 1);
    }

    pub fn record_send_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(|s| {
            s.counters.failed += 1;
            s.last_error = Some(reason);
        });
    }

    pub fn record_send_timeout(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(|s| {
            s.counters.send_timeouts += 1;
            s.last_error = Some(reason);
        });
    }

    pub fn record_reply_timeout(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(|s| {
            s.counters.reply_timeouts += 1;
            s.last_error = Some(reason);
        });
    }

    /// Record a length-checked status frame and the resulting status
    pub fn record_received(&self, motors: [MotorStatus; 2], force: i32, summary: String) {
        self.update(|s| {
            s.counters.received += 1;
            s.motors = motors;
            s.force = force;
            s.last_received = Some(summary);
        });
    }

    pub fn record_rejected(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(|s| {
            s.counters.rejected += 1;
            s.last_error = Some(reason);
        });
    }
}
