//! Motor link
//!
//! Keeps the controller's command frame up to date, exchanges it with the
//! controller at a fixed rate and publishes what comes back.
//!
//! ```text
//!  MotorLink (UI / API) ──► CommandAssembler ──► CycleEngine ──► Transport
//!                                                    ▲              │
//!  Telemetry ◄── StatusDemux ◄── ReplySignal ────────┘◄─────────────┘
//! ```
//!
//! `MotorLink` is a cheap handle; clones share the same state.

pub mod assembler;
pub mod demux;
pub mod engine;
pub mod queue;
mod session;
pub mod signal;
pub mod telemetry;

pub use assembler::CommandAssembler;
pub use demux::StatusDemux;
pub use engine::{payload_limit, CycleEngine, CycleOutcome};
pub use queue::ParameterQueue;
pub use signal::{ReplySignal, ReplyWaiter};
pub use telemetry::{Counters, EngineState, LinkRate, Telemetry, TelemetrySnapshot};

use crate::codec::ParameterRequest;
use crate::config::Config;
use crate::error::Result;
use crate::logging::LogEntry;
use crate::motor::{CommandField, MotorCommand, MotorId, MotorStatus};
use crate::transport::Transport;
use bytes::Bytes;
use session::LinkSession;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// State shared by the handle, the session and the engine
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) assembler: Arc<CommandAssembler>,
    pub(crate) demux: StatusDemux,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) reply: Arc<ReplySignal>,
    /// Negotiated frame size, overhead included
    pub(crate) frame_size: Arc<AtomicUsize>,
    pub(crate) log_tx: Option<mpsc::Sender<LogEntry>>,
}

/// Handle to one motor link
#[derive(Clone)]
pub struct MotorLink {
    shared: Arc<Shared>,
}

impl MotorLink {
    /// Create a link; `log_tx` receives `LogEntry` values for display
    pub fn new(config: Config, log_tx: Option<mpsc::Sender<LogEntry>>) -> Self {
        let telemetry = Arc::new(Telemetry::new(config.link.publish_interval()));
        let reply = Arc::new(ReplySignal::new());
        let assembler = Arc::new(CommandAssembler::new(
            config.motor_defaults(),
            config.link.queue_capacity,
        ));
        let demux = StatusDemux::new(telemetry.clone(), reply.clone(), log_tx.clone());
        telemetry.set_frame_size(config.link.default_frame_size);
        let frame_size = Arc::new(AtomicUsize::new(config.link.default_frame_size));

        Self {
            shared: Arc::new(Shared {
                config,
                assembler,
                demux,
                telemetry,
                reply,
                frame_size,
                log_tx,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    // ---- commands -------------------------------------------------------

    /// Set one command value; it goes out with the next cycle
    pub fn set_command_field(&self, motor: MotorId, field: CommandField, value: i32) -> Result<()> {
        self.shared.assembler.set_command_field(motor, field, value)
    }

    /// Switch `motor` to homing mode and clear its homing targets
    pub fn set_homing_mode(&self, motor: MotorId) -> Result<()> {
        self.shared.assembler.set_homing_mode(motor)
    }

    /// Queue a parameter request; returns the request evicted on overflow
    pub fn enqueue(&self, request: ParameterRequest) -> Option<ParameterRequest> {
        self.shared.assembler.enqueue(request)
    }

    pub fn read_parameter(&self, motor: MotorId, index: impl Into<u8>) -> Option<ParameterRequest> {
        self.enqueue(ParameterRequest::read(motor, index))
    }

    pub fn write_parameter(
        &self,
        motor: MotorId,
        index: impl Into<u8>,
        value: i32,
    ) -> Option<ParameterRequest> {
        self.enqueue(ParameterRequest::write(motor, index, value))
    }

    pub fn operation(
        &self,
        motor: MotorId,
        index: impl Into<u8>,
        value: i32,
    ) -> Option<ParameterRequest> {
        self.enqueue(ParameterRequest::operation(motor, index, value))
    }

    pub fn command(&self, motor: MotorId) -> MotorCommand {
        self.shared.assembler.command(motor)
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.assembler.pending_requests()
    }

    /// Full command frame as it stands
    pub fn frame(&self) -> Bytes {
        self.shared.assembler.snapshot()
    }

    // ---- status ---------------------------------------------------------

    /// Last acknowledged read of a parameter, `None` outside the mirror
    pub fn parameter(&self, motor: MotorId, index: impl Into<u8>) -> Option<i32> {
        self.shared.demux.parameter(motor, index.into())
    }

    pub fn status(&self, motor: MotorId) -> MotorStatus {
        self.shared.demux.status(motor)
    }

    pub fn force(&self) -> i32 {
        self.shared.demux.force()
    }

    /// Negotiated frame size, overhead included
    pub fn frame_size(&self) -> usize {
        self.shared.frame_size.load(Ordering::Relaxed)
    }

    /// Receive throttled telemetry snapshots
    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.shared.telemetry.subscribe()
    }

    /// Last published snapshot
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.shared.telemetry.current()
    }

    /// Publish pending telemetry now and return it
    pub fn flush_telemetry(&self) -> TelemetrySnapshot {
        self.shared.telemetry.publish_now();
        self.shared.telemetry.current()
    }

    /// Number of reply notifications processed
    pub fn replies(&self) -> u64 {
        self.shared.reply.count()
    }

    // ---- lifecycle ------------------------------------------------------

    /// Drive the link from a transport until shutdown or transport close
    pub async fn run<T: Transport>(&self, transport: T, shutdown: Arc<AtomicBool>) -> Result<()> {
        let channels = transport.spawn(shutdown.clone())?;
        LinkSession::new(self.shared.clone(), channels)
            .run(shutdown)
            .await
    }
}

/// Running link task
pub struct Handle {
    link: MotorLink,
    shutdown: Arc<AtomicBool>,
    task: JoinHandle<Result<()>>,
}

impl Handle {
    pub fn link(&self) -> &MotorLink {
        &self.link
    }

    /// Request shutdown
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the session to end
    pub async fn join(self) -> Result<()> {
        self.stop();
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Link task failed: {}", e);
                Ok(())
            }
        }
    }
}

/// Start a link on a background task
///
/// Returns the handle and the receiver for `LogEntry` values.
/// Must be called from within a tokio runtime.
pub fn start<T: Transport>(config: Config, transport: T) -> (Handle, mpsc::Receiver<LogEntry>) {
    let (log_tx, log_rx) = mpsc::channel(config.logs.channel_capacity.max(1));
    let link = MotorLink::new(config, Some(log_tx));
    let shutdown = Arc::new(AtomicBool::new(false));

    let task = tokio::spawn({
        let link = link.clone();
        let shutdown = shutdown.clone();
        async move { link.run(transport, shutdown).await }
    });

    (
        Handle {
            link,
            shutdown,
            task,
        },
        log_rx,
    )
}
