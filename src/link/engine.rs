//! Fixed-rate cycle engine
//!
//! One engine runs per connection. Each cycle:
//! 1. drop stale replies
//! 2. take the next parameter request and the current command frame
//! 3. write the frame (waiting for the acknowledgement when the transport
//!    confirms writes)
//! 4. wait for the controller's reply notification
//! 5. sleep until `cycle start + period`
//!
//! A cycle that overruns its period starts the next one immediately;
//! missed cycles are never made up in a burst. Cancelling the engine's
//! token ends any wait at once.

use super::signal::ReplyWaiter;
use super::telemetry::{EngineState, Telemetry};
use super::CommandAssembler;
use crate::config::LinkConfig;
use crate::constants::{FALLBACK_PAYLOAD, FRAME_LEN};
use crate::error::{LinkError, Result};
use crate::logging::{self, LogEntry};
use crate::transport::{WriteMode, WriteRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Bytes of the command frame that fit in one write
pub fn payload_limit(frame_size: usize, overhead: usize) -> usize {
    if frame_size > overhead {
        (frame_size - overhead).min(FRAME_LEN)
    } else {
        FALLBACK_PAYLOAD
    }
}

/// How one cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Frame written and reply notification seen
    Replied,
    /// Frame written, no reply in time
    ReplyTimeout,
    /// No write acknowledgement in time
    SendTimeout,
    /// Transport refused the write
    SendFailed,
}

/// Per-connection cycle loop
pub struct CycleEngine {
    config: LinkConfig,
    write_mode: WriteMode,
    assembler: Arc<CommandAssembler>,
    telemetry: Arc<Telemetry>,
    reply: ReplyWaiter,
    writes: mpsc::Sender<WriteRequest>,
    frame_size: Arc<AtomicUsize>,
    cancel: CancellationToken,
    log_tx: Option<mpsc::Sender<LogEntry>>,
}

impl CycleEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LinkConfig,
        write_mode: WriteMode,
        assembler: Arc<CommandAssembler>,
        telemetry: Arc<Telemetry>,
        reply: ReplyWaiter,
        writes: mpsc::Sender<WriteRequest>,
        frame_size: Arc<AtomicUsize>,
        cancel: CancellationToken,
        log_tx: Option<mpsc::Sender<LogEntry>>,
    ) -> Self {
        Self {
            config,
            write_mode,
            assembler,
            telemetry,
            reply,
            writes,
            frame_size,
            cancel,
            log_tx,
        }
    }

    /// Run cycles until cancelled or the transport goes away
    ///
    /// Returns the number of cycles started.
    pub async fn run(mut self) -> u64 {
        let period = self.config.cycle_period();
        let mut cycles: u64 = 0;
        let mut last_start: Option<Instant> = None;

        debug!("Cycle engine started ({} mode)", self.write_mode);
        self.telemetry.set_state(EngineState::Connected);

        while !self.cancel.is_cancelled() {
            let start = Instant::now();
            if let Some(prev) = last_start {
                debug!(
                    "Cycle interval: {} ms",
                    start.duration_since(prev).as_millis()
                );
            }
            last_start = Some(start);

            let outcome = self.cycle(cycles).await;
            cycles += 1;
            if let Err(e) = outcome {
                debug!("Cycle engine stopping: {}", e);
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep_until(start + period) => {}
            }
        }

        self.telemetry.set_state(EngineState::Disconnected);
        debug!("Cycle engine stopped after {} cycles", cycles);
        cycles
    }

    /// Run one cycle
    ///
    /// `Err(Disconnected)` when cancelled or the transport is gone; every
    /// other failure is counted and reported as the outcome.
    pub async fn cycle(&mut self, number: u64) -> Result<CycleOutcome> {
        let frame_size = self.frame_size.load(Ordering::Relaxed);
        self.check_frame_size(number, frame_size);

        // A reply raised before this cycle's write belongs to an earlier one
        self.reply.clear();

        let limit = payload_limit(frame_size, self.config.transport_overhead);
        let (request, payload) = self.assembler.next_frame(limit);
        let size = payload.len();

        self.telemetry.set_state(EngineState::Sending);
        match self.send(payload).await {
            Ok(()) => {
                self.telemetry.record_sent();
                logging::try_log(
                    &self.log_tx,
                    LogEntry::protocol_out(request.function.name(), size),
                    "protocol_out",
                );
            }
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e @ LinkError::SendTimeout { .. }) => {
                warn!("{}", e);
                self.report(&e);
                self.telemetry.record_send_timeout(e.to_string());
                self.telemetry.set_state(EngineState::Connected);
                return Ok(CycleOutcome::SendTimeout);
            }
            Err(e) => {
                error!("{}", e);
                self.report(&e);
                self.telemetry.record_send_failed(e.to_string());
                self.telemetry.set_state(EngineState::Connected);
                return Ok(CycleOutcome::SendFailed);
            }
        }

        self.telemetry.set_state(EngineState::AwaitingReply);
        let reply_timeout = self.config.reply_timeout();
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => return Err(LinkError::Disconnected),
            waited = timeout(reply_timeout, self.reply.wait()) => match waited {
                Ok(true) => CycleOutcome::Replied,
                Ok(false) => return Err(LinkError::Disconnected),
                Err(_) => {
                    let e = LinkError::ReplyTimeout { timeout: reply_timeout };
                    debug!("{}", e);
                    self.telemetry.record_reply_timeout(e.to_string());
                    CycleOutcome::ReplyTimeout
                }
            },
        };
        self.telemetry.set_state(EngineState::Connected);
        Ok(outcome)
    }

    async fn send(&self, payload: bytes::Bytes) -> Result<()> {
        match self.write_mode {
            WriteMode::Unacknowledged => self.submit(WriteRequest::unacknowledged(payload)),
            WriteMode::Acknowledged => {
                let (request, ack) = WriteRequest::acknowledged(payload);
                self.submit(request)?;

                let ack_timeout = self.config.write_ack_timeout();
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(LinkError::Disconnected),
                    acked = timeout(ack_timeout, ack) => match acked {
                        Ok(Ok(status)) => status,
                        Ok(Err(_)) => Err(LinkError::SendFailed {
                            reason: "acknowledgement dropped".into(),
                        }),
                        Err(_) => Err(LinkError::SendTimeout { timeout: ack_timeout }),
                    },
                }
            }
        }
    }

    fn submit(&self, request: WriteRequest) -> Result<()> {
        self.writes.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => LinkError::SendFailed {
                reason: "transport busy".into(),
            },
            TrySendError::Closed(_) => LinkError::Disconnected,
        })
    }

    fn check_frame_size(&self, number: u64, frame_size: usize) {
        let every = self.config.frame_size_warn_every.max(1);
        if number % every == 0 && frame_size < self.config.target_frame_size {
            warn!(
                "Frame size {} is below target {}, trailing command slots are not sent",
                frame_size, self.config.target_frame_size
            );
        }
    }

    fn report(&self, e: &LinkError) {
        let entry = match e {
            LinkError::SendFailed { .. } => LogEntry::error(e.to_string()),
            _ => LogEntry::warn(e.to_string()),
        };
        logging::try_log(&self.log_tx, entry, "cycle error");
    }
}
