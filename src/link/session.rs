//! Link session: transport events in, engine lifecycle out
//!
//! Runs on its own task and owns the transport channels:
//! - `Connected` resets per-connection state and starts a cycle engine
//! - `Disconnected` cancels the engine, drops queued requests and forgets
//!   the negotiated frame size
//! - `Notification` goes to the status demultiplexer while a session runs
//!
//! A `FrameSizeNegotiated` that arrives before `Connected` is kept for the
//! session that follows.
//!
//! The engine runs on a separate task so inbound frames keep flowing
//! while a cycle waits.

use super::engine::CycleEngine;
use super::telemetry::EngineState;
use super::Shared;
use crate::error::Result;
use crate::logging::{self, LogEntry};
use crate::transport::{TransportChannels, TransportEvent, WriteMode, WriteRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

struct RunningEngine {
    cancel: CancellationToken,
    task: JoinHandle<u64>,
}

pub(crate) struct LinkSession {
    shared: Arc<Shared>,
    events: mpsc::Receiver<TransportEvent>,
    writes: mpsc::Sender<WriteRequest>,
    engine: Option<RunningEngine>,
}

impl LinkSession {
    pub(crate) fn new(shared: Arc<Shared>, channels: TransportChannels) -> Self {
        Self {
            shared,
            events: channels.events,
            writes: channels.writes,
            engine: None,
        }
    }

    /// Process events until shutdown or the transport closes
    pub(crate) async fn run(mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            let event =
                match tokio::time::timeout(Duration::from_millis(100), self.events.recv()).await {
                    Ok(Some(event)) => event,
                    Ok(None) => {
                        debug!("Transport closed");
                        break;
                    }
                    // Poll shutdown
                    Err(_) => continue,
                };
            self.handle_event(event).await;
        }

        if self.engine.is_some() {
            self.on_disconnected().await;
        }
        self.shared.telemetry.set_state(EngineState::Idle);
        Ok(())
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { write_mode } => self.on_connected(write_mode).await,
            TransportEvent::Disconnected => self.on_disconnected().await,
            TransportEvent::FrameSizeNegotiated(size) => {
                info!("Frame size negotiated: {}", size);
                self.shared.frame_size.store(size, Ordering::Relaxed);
                self.shared.telemetry.set_frame_size(size);
                logging::try_log(
                    &self.shared.log_tx,
                    LogEntry::system(format!("Frame size {}", size)),
                    "frame size",
                );
            }
            TransportEvent::LinkRate { tx_phy, rx_phy } => {
                debug!("Link rate: tx={} rx={}", tx_phy, rx_phy);
                self.shared.telemetry.set_link_rate(tx_phy, rx_phy);
            }
            TransportEvent::Notification(data) => {
                if self.engine.is_none() {
                    trace!("Dropped {}-byte notification outside a session", data.len());
                    return;
                }
                // Rejections are counted by the demultiplexer
                let _ = self.shared.demux.handle_notification(&data);
            }
        }
    }

    async fn on_connected(&mut self, write_mode: WriteMode) {
        if self.engine.is_some() {
            warn!("Connected while a session was running, restarting");
            self.stop_engine().await;
        }

        let shared = &self.shared;
        shared.assembler.reset(shared.config.motor_defaults());
        shared.demux.reset();
        shared.telemetry.reset();
        shared
            .telemetry
            .set_frame_size(shared.frame_size.load(Ordering::Relaxed));

        info!("Connected ({} writes)", write_mode);
        logging::try_log(
            &shared.log_tx,
            LogEntry::system(format!("Connected ({} writes)", write_mode)),
            "connected",
        );

        let cancel = CancellationToken::new();
        let engine = CycleEngine::new(
            shared.config.link.clone(),
            write_mode,
            shared.assembler.clone(),
            shared.telemetry.clone(),
            shared.reply.waiter(),
            self.writes.clone(),
            shared.frame_size.clone(),
            cancel.clone(),
            shared.log_tx.clone(),
        );
        self.engine = Some(RunningEngine {
            cancel,
            task: tokio::spawn(engine.run()),
        });
    }

    async fn on_disconnected(&mut self) {
        self.stop_engine().await;
        self.shared.assembler.clear_queue();
        let frame_size = self.shared.config.link.default_frame_size;
        self.shared.frame_size.store(frame_size, Ordering::Relaxed);
        self.shared.telemetry.reset();
        self.shared.telemetry.set_frame_size(frame_size);
        self.shared.telemetry.set_state(EngineState::Disconnected);

        info!("Disconnected");
        logging::try_log(
            &self.shared.log_tx,
            LogEntry::warn("Disconnected"),
            "disconnected",
        );
    }

    async fn stop_engine(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.cancel.cancel();
            match engine.task.await {
                Ok(cycles) => debug!("Engine ran {} cycles", cycles),
                Err(e) => {
                    error!("Engine task failed: {}", e);
                    logging::try_log(
                        &self.shared.log_tx,
                        LogEntry::error(format!("Engine task failed: {}", e)),
                        "engine failure",
                    );
                }
            }
        }
    }
}
