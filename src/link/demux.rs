//! Status demultiplexer
//!
//! Turns one inbound notification into:
//! - motor status updates (last-known-value: absent slots keep old values)
//! - parameter mirror updates for `ReadAck` replies
//! - exactly one reply signal for the cycle engine
//!
//! Called from the transport's inbound handler, concurrently with the
//! cycle engine and the presentation layer.

use super::signal::ReplySignal;
use super::telemetry::Telemetry;
use crate::codec::{decode_status_frame, DecodedStatus, FunctionCode};
use crate::constants::{HEADER_LEN, MIRROR_LEN, MIRROR_PER_DEVICE};
use crate::error::{LinkError, Result};
use crate::logging::{self, LogEntry};
use crate::motor::{MotorId, MotorStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Mirror slot for a device/parameter pair, `None` when out of range
pub fn mirror_slot(device: u8, index: u8) -> Option<usize> {
    let device = MotorId::from_device_id(device)?;
    let index = index as usize;
    (index < MIRROR_PER_DEVICE).then(|| device.index() * MIRROR_PER_DEVICE + index)
}

struct StatusState {
    motors: [MotorStatus; 2],
    force: i32,
    /// Last acknowledged read value per device/parameter
    mirror: [i32; MIRROR_LEN],
}

impl Default for StatusState {
    fn default() -> Self {
        Self {
            motors: [MotorStatus::default(); 2],
            force: 0,
            mirror: [0; MIRROR_LEN],
        }
    }
}

/// Inbound frame handler
pub struct StatusDemux {
    state: Mutex<StatusState>,
    telemetry: Arc<Telemetry>,
    reply: Arc<ReplySignal>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
}

impl StatusDemux {
    pub fn new(
        telemetry: Arc<Telemetry>,
        reply: Arc<ReplySignal>,
        log_tx: Option<mpsc::Sender<LogEntry>>,
    ) -> Self {
        Self {
            state: Mutex::new(StatusState::default()),
            telemetry,
            reply,
            log_tx,
        }
    }

    /// Process one inbound notification
    ///
    /// Frames shorter than the parameter section are rejected without
    /// touching any state and do not raise the reply signal.
    pub fn handle_notification(&self, data: &[u8]) -> Result<DecodedStatus> {
        if data.len() < HEADER_LEN {
            let err = LinkError::FrameTooShort {
                len: data.len(),
                min: HEADER_LEN,
            };
            debug!("Dropped inbound frame: {}", err);
            self.telemetry.record_rejected(err.to_string());
            return Err(err);
        }

        let decoded = decode_status_frame(data)?;
        let function = decoded.parameter.and_then(|p| p.function_code());

        let (motors, force) = {
            let mut state = self.state.lock();
            if let (Some(FunctionCode::ReadAck), Some(reply)) = (function, decoded.parameter) {
                match mirror_slot(reply.device, reply.index) {
                    Some(slot) => {
                        state.mirror[slot] = reply.value;
                        debug!(
                            "Parameter read ok: device={} index={} value={}",
                            reply.device, reply.index, reply.value
                        );
                    }
                    None => trace!(
                        "Ignoring read ack outside mirror: device={} index={}",
                        reply.device,
                        reply.index
                    ),
                }
            }
            for motor in MotorId::ALL {
                state.motors[motor.index()].apply(&decoded.motor(motor));
            }
            if let Some(force) = decoded.force() {
                state.force = force;
            }
            (state.motors, state.force)
        };

        match function {
            Some(FunctionCode::WriteAck) | Some(FunctionCode::OperationAck) => {
                if let Some(reply) = decoded.parameter {
                    debug!(
                        "Parameter {} ok: device={} index={}",
                        if function == Some(FunctionCode::WriteAck) { "write" } else { "operation" },
                        reply.device,
                        reply.index
                    );
                }
            }
            _ => {}
        }

        let name = function.map_or("Unknown", FunctionCode::name);
        logging::try_log(&self.log_tx, LogEntry::protocol_in(name, data.len()), "protocol_in");
        self.telemetry
            .record_received(motors, force, summarize(&motors, force));

        self.reply.notify();
        Ok(decoded)
    }

    /// Last acknowledged read of `index` on `motor`
    pub fn parameter(&self, motor: MotorId, index: u8) -> Option<i32> {
        let slot = mirror_slot(motor.device_id(), index)?;
        Some(self.state.lock().mirror[slot])
    }

    /// Copy of the whole mirror
    pub fn mirror(&self) -> [i32; MIRROR_LEN] {
        self.state.lock().mirror
    }

    pub fn status(&self, motor: MotorId) -> MotorStatus {
        self.state.lock().motors[motor.index()]
    }

    pub fn force(&self) -> i32 {
        self.state.lock().force
    }

    /// Forget status and mirror (new connection)
    pub fn reset(&self) {
        *self.state.lock() = StatusState::default();
    }
}

fn summarize(motors: &[MotorStatus; 2], force: i32) -> String {
    let [m1, m2] = motors;
    format!(
        "SW1={} AP1={} AV1={} | SW2={} AP2={} AV2={} | F={}",
        m1.status_word,
        m1.actual_position,
        m1.actual_velocity,
        m2.status_word,
        m2.actual_position,
        m2.actual_velocity,
        force
    )
}
