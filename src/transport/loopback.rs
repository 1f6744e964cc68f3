//! In-process transport backed by a simulated controller
//!
//! Stands in for the radio link in the demo binary and in tests:
//! - reports `Connected`, then the negotiated frame size and link rate
//! - confirms each write (or refuses writes larger than the frame size)
//! - answers every write with one status notification, truncated to the
//!   negotiated frame size like a real notification would be
//!
//! Runs as an async tokio task.

use super::{Transport, TransportChannels, TransportEvent, WriteMode, WriteRequest};
use crate::codec::frame::{write_header, write_slot};
use crate::codec::{
    decode_status_frame, FunctionCode, OperationMode, ParameterIndex, ParameterRequest,
};
use crate::constants::{
    CHANNEL_CAPACITY, FORCE_SLOT, FRAME_LEN, MIRROR_PER_DEVICE, TARGET_FRAME_SIZE,
    TRANSPORT_OVERHEAD,
};
use crate::error::{LinkError, Result};
use crate::link::payload_limit;
use crate::motor::{CommandField, MotorId, MotorStatus};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Status word bits reported by the simulated drive
pub const STATUS_ENABLED: i32 = 0x0001;
pub const STATUS_TARGET_REACHED: i32 = 0x0400;
pub const STATUS_HOMING: i32 = 0x1000;

// =============================================================================
// Simulated controller
// =============================================================================

/// Firmware model: parameter table, two drives, force counter
#[derive(Debug, Clone)]
pub struct SimulatedController {
    parameters: [[i32; MIRROR_PER_DEVICE]; 2],
    motors: [MotorStatus; 2],
    force: i32,
}

impl SimulatedController {
    pub fn new() -> Self {
        let mut parameters = [[0; MIRROR_PER_DEVICE]; 2];
        for motor in MotorId::ALL {
            let table = &mut parameters[motor.index()];
            table[ParameterIndex::DeviceId as usize] = motor.device_id() as i32;
            table[ParameterIndex::OperationMode as usize] = OperationMode::ProfilePosition.into();
        }
        Self {
            parameters,
            motors: [MotorStatus::default(); 2],
            force: 0,
        }
    }

    pub fn parameter(&self, motor: MotorId, index: impl Into<u8>) -> Option<i32> {
        self.parameters[motor.index()]
            .get(index.into() as usize)
            .copied()
    }

    pub fn status(&self, motor: MotorId) -> MotorStatus {
        self.motors[motor.index()]
    }

    /// Apply one (possibly truncated) command frame and build the full reply
    pub fn process(&mut self, frame: &[u8]) -> Bytes {
        let decoded = decode_status_frame(frame).unwrap_or_default();
        let reply = decoded
            .parameter
            .map_or(ParameterRequest::FREE, |p| {
                self.answer(p.function_code(), p.device, p.index, p.sub_index, p.value)
            });

        for motor in MotorId::ALL {
            let target = decoded.slot(CommandField::TargetPosition.slot(motor));
            let velocity = decoded.slot(CommandField::TargetVelocity.slot(motor));
            self.step(motor, target, velocity);
        }
        self.force = self.force.wrapping_add(1);
        for table in &mut self.parameters {
            table[ParameterIndex::SystemCounter as usize] = self.force;
        }

        let mut buf = vec![0u8; FRAME_LEN];
        write_header(&mut buf, &reply);
        let mut slots = Vec::with_capacity(7);
        for motor in MotorId::ALL {
            let status = self.motors[motor.index()];
            let base = motor.status_base();
            slots.push((base, status.status_word));
            slots.push((base + 1, status.actual_position));
            slots.push((base + 2, status.actual_velocity));
        }
        slots.push((FORCE_SLOT, self.force));
        for (k, value) in slots {
            // Fixed status slots inside the frame
            let _ = write_slot(&mut buf, k, value);
        }
        Bytes::from(buf)
    }

    fn answer(
        &mut self,
        function: Option<FunctionCode>,
        device: u8,
        index: u8,
        sub_index: u8,
        value: i32,
    ) -> ParameterRequest {
        let Some(motor) = MotorId::from_device_id(device) else {
            return ParameterRequest::FREE;
        };
        let slot = index as usize;
        if slot >= MIRROR_PER_DEVICE {
            return ParameterRequest::FREE;
        }
        let table = &mut self.parameters[motor.index()];
        match function {
            Some(FunctionCode::Read) => {
                ParameterRequest::new(FunctionCode::ReadAck, index, device, sub_index, table[slot])
            }
            Some(FunctionCode::Write) => {
                table[slot] = value;
                debug!("Simulated {} parameter {} = {}", motor, index, value);
                ParameterRequest::new(FunctionCode::WriteAck, index, device, sub_index, value)
            }
            Some(FunctionCode::Operation) => {
                ParameterRequest::new(FunctionCode::OperationAck, index, device, sub_index, value)
            }
            _ => ParameterRequest::FREE,
        }
    }

    /// Move one drive a tenth of its velocity toward the target
    fn step(&mut self, motor: MotorId, target: Option<i32>, velocity: Option<i32>) {
        let table = &mut self.parameters[motor.index()];
        let homing = table[ParameterIndex::OperationMode as usize] == OperationMode::Homing as i32;
        let status = &mut self.motors[motor.index()];

        let target = if homing { Some(0) } else { target };
        if let Some(target) = target {
            let max_step = velocity.map_or(100, |v| (v.unsigned_abs() / 10).max(1)) as i64;
            let delta = (target as i64 - status.actual_position as i64).clamp(-max_step, max_step);
            status.actual_position = (status.actual_position as i64 + delta) as i32;
            status.actual_velocity = delta
                .saturating_mul(10)
                .clamp(i32::MIN as i64, i32::MAX as i64) as i32;
            table[ParameterIndex::TargetPosition as usize] = target;
        }

        let reached = target.map_or(true, |t| t == status.actual_position);
        status.status_word = STATUS_ENABLED
            | if reached { STATUS_TARGET_REACHED } else { 0 }
            | if homing { STATUS_HOMING } else { 0 };
        table[ParameterIndex::StatusWord as usize] = status.status_word;
        table[ParameterIndex::ActualPosition as usize] = status.actual_position;
        table[ParameterIndex::ActualVelocity as usize] = status.actual_velocity;
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Loopback transport configuration
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Frame size reported after connecting, overhead included
    pub frame_size: usize,
    pub write_mode: WriteMode,
    /// Delay between `Connected` and `FrameSizeNegotiated`
    pub negotiate_delay: Duration,
    /// Delay between a write and its notification
    pub reply_delay: Duration,
    /// Swallow every Nth reply
    pub drop_every: Option<u64>,
    /// Report `Disconnected` and stop after this many writes
    pub disconnect_after: Option<u64>,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            frame_size: TARGET_FRAME_SIZE + TRANSPORT_OVERHEAD,
            write_mode: WriteMode::Acknowledged,
            negotiate_delay: Duration::from_millis(50),
            reply_delay: Duration::from_millis(5),
            drop_every: None,
            disconnect_after: None,
        }
    }
}

/// Transport talking to an in-process `SimulatedController`
pub struct LoopbackTransport {
    config: LoopbackConfig,
    controller: Arc<Mutex<SimulatedController>>,
}

impl LoopbackTransport {
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            config,
            controller: Arc::new(Mutex::new(SimulatedController::new())),
        }
    }

    /// Shared access to the simulated controller
    pub fn controller(&self) -> Arc<Mutex<SimulatedController>> {
        self.controller.clone()
    }
}

impl Transport for LoopbackTransport {
    fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels> {
        if self.config.frame_size <= TRANSPORT_OVERHEAD {
            return Err(LinkError::ConfigValidation {
                field: "frame_size",
                reason: format!("must exceed the {}-byte overhead", TRANSPORT_OVERHEAD),
            });
        }

        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(CHANNEL_CAPACITY);
        let (write_tx, mut write_rx) = mpsc::channel::<WriteRequest>(CHANNEL_CAPACITY);
        let LoopbackTransport { config, controller } = self;

        tokio::spawn(async move {
            let connected = TransportEvent::Connected {
                write_mode: config.write_mode,
            };
            if event_tx.send(connected).await.is_err() {
                return;
            }
            tokio::time::sleep(config.negotiate_delay).await;
            let _ = event_tx
                .send(TransportEvent::FrameSizeNegotiated(config.frame_size))
                .await;
            let _ = event_tx
                .send(TransportEvent::LinkRate {
                    tx_phy: 2,
                    rx_phy: 2,
                })
                .await;

            let limit = payload_limit(config.frame_size, TRANSPORT_OVERHEAD);
            let mut writes: u64 = 0;

            while !shutdown.load(Ordering::Relaxed) {
                let mut request =
                    match tokio::time::timeout(Duration::from_millis(100), write_rx.recv()).await {
                        Ok(Some(request)) => request,
                        Ok(None) => break,
                        Err(_) => continue,
                    };
                writes += 1;

                if request.payload.len() > limit {
                    request.complete(Err(LinkError::SendFailed {
                        reason: format!(
                            "payload of {} bytes exceeds frame size {}",
                            request.payload.len(),
                            config.frame_size
                        ),
                    }));
                    continue;
                }
                request.complete(Ok(()));

                let status = controller.lock().process(&request.payload);
                let dropped = config
                    .drop_every
                    .is_some_and(|n| n > 0 && writes % n == 0);

                if dropped {
                    trace!("Loopback dropped reply to write {}", writes);
                } else {
                    if !config.reply_delay.is_zero() {
                        tokio::time::sleep(config.reply_delay).await;
                    }
                    let notification = status.slice(..limit.min(status.len()));
                    if event_tx
                        .send(TransportEvent::Notification(notification))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }

                if config.disconnect_after.is_some_and(|n| writes >= n) {
                    debug!("Loopback disconnecting after {} writes", writes);
                    break;
                }
            }

            let _ = event_tx.send(TransportEvent::Disconnected).await;
        });

        Ok(TransportChannels {
            events: event_rx,
            writes: write_tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_command_frame;
    use crate::codec::frame::ParameterReply;
    use crate::motor::MotorCommand;

    fn command_frame(request: ParameterRequest) -> Bytes {
        let mut m1 = MotorCommand::defaults_for(MotorId::Motor1);
        let m2 = MotorCommand::defaults_for(MotorId::Motor2);
        m1.target_position = 250;
        encode_command_frame(&m1, &m2, &request).unwrap()
    }

    fn reply_header(status: &[u8]) -> ParameterReply {
        decode_status_frame(status).unwrap().parameter.unwrap()
    }

    #[test]
    fn test_step_with_extreme_velocity_stays_in_range() {
        let mut controller = SimulatedController::new();
        controller.step(MotorId::Motor1, Some(i32::MAX), Some(i32::MIN));
        let status = controller.status(MotorId::Motor1);
        assert_eq!(status.actual_position, 214_748_364);
        assert_eq!(status.actual_velocity, 2_147_483_640);

        controller.step(MotorId::Motor1, Some(i32::MIN), Some(i32::MAX));
        let status = controller.status(MotorId::Motor1);
        assert_eq!(status.actual_position, 0);
        assert_eq!(status.actual_velocity, -2_147_483_640);
    }

    #[test]
    fn test_read_answers_read_ack() {
        let mut controller = SimulatedController::new();
        let status = controller.process(&command_frame(ParameterRequest::read(
            MotorId::Motor2,
            ParameterIndex::DeviceId,
        )));
        let reply = reply_header(&status);
        assert_eq!(reply.function_code(), Some(FunctionCode::ReadAck));
        assert_eq!(reply.device, 1);
        assert_eq!(reply.index, 1);
        assert_eq!(reply.value, 1);
    }

    #[test]
    fn test_write_then_read() {
        let mut controller = SimulatedController::new();
        let status = controller.process(&command_frame(ParameterRequest::write(
            MotorId::Motor1,
            ParameterIndex::HomingOffset,
            -77,
        )));
        assert_eq!(
            reply_header(&status).function_code(),
            Some(FunctionCode::WriteAck)
        );
        assert_eq!(
            controller.parameter(MotorId::Motor1, ParameterIndex::HomingOffset),
            Some(-77)
        );
    }

    #[test]
    fn test_free_and_unknown_device() {
        let mut controller = SimulatedController::new();
        let status = controller.process(&command_frame(ParameterRequest::FREE));
        assert_eq!(reply_header(&status).function, 255);

        let request = ParameterRequest::new(FunctionCode::Read, 1, 7, 0, 0);
        let status = controller.process(&command_frame(request));
        assert_eq!(reply_header(&status).function, 255);
    }

    #[test]
    fn test_drive_moves_toward_target() {
        let mut controller = SimulatedController::new();
        // Default velocity 1000 => 100 counts per frame
        controller.process(&command_frame(ParameterRequest::FREE));
        assert_eq!(controller.status(MotorId::Motor1).actual_position, 100);
        assert_eq!(controller.status(MotorId::Motor1).actual_velocity, 1000);
        controller.process(&command_frame(ParameterRequest::FREE));
        let status = controller.process(&command_frame(ParameterRequest::FREE));

        let m1 = controller.status(MotorId::Motor1);
        assert_eq!(m1.actual_position, 250);
        assert_ne!(m1.status_word & STATUS_TARGET_REACHED, 0);

        let decoded = decode_status_frame(&status).unwrap();
        assert_eq!(decoded.slot(1), Some(250));
        assert_eq!(decoded.force(), Some(3));
    }

    #[test]
    fn test_truncated_command_frame() {
        let mut controller = SimulatedController::new();
        let frame = command_frame(ParameterRequest::read(MotorId::Motor1, 3u8));
        // Header plus motor 1's position and velocity only
        let status = controller.process(&frame[..16]);
        assert_eq!(reply_header(&status).value, 31);
        assert_eq!(controller.status(MotorId::Motor1).actual_position, 100);
        // Motor 2 saw no target this frame
        assert_eq!(controller.status(MotorId::Motor2).actual_position, 0);
    }

    #[test]
    fn test_homing_drives_to_zero() {
        let mut controller = SimulatedController::new();
        controller.process(&command_frame(ParameterRequest::FREE));
        controller.process(&command_frame(ParameterRequest::write(
            MotorId::Motor1,
            ParameterIndex::OperationMode,
            OperationMode::Homing.into(),
        )));
        let m1 = controller.status(MotorId::Motor1);
        assert_ne!(m1.status_word & STATUS_HOMING, 0);
        assert_eq!(m1.actual_position, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_lifecycle() {
        let transport = LoopbackTransport::new(LoopbackConfig {
            frame_size: 23,
            disconnect_after: Some(1),
            ..LoopbackConfig::default()
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut channels = transport.spawn(shutdown).unwrap();

        assert_eq!(
            channels.events.recv().await,
            Some(TransportEvent::Connected {
                write_mode: WriteMode::Acknowledged
            })
        );
        assert_eq!(
            channels.events.recv().await,
            Some(TransportEvent::FrameSizeNegotiated(23))
        );
        assert!(matches!(
            channels.events.recv().await,
            Some(TransportEvent::LinkRate { .. })
        ));

        let frame = command_frame(ParameterRequest::FREE);
        let (request, ack) = WriteRequest::acknowledged(frame.slice(..20));
        channels.writes.send(request).await.unwrap();
        assert!(ack.await.unwrap().is_ok());

        match channels.events.recv().await {
            Some(TransportEvent::Notification(data)) => assert_eq!(data.len(), 20),
            other => panic!("Expected notification, got {:?}", other),
        }
        assert_eq!(
            channels.events.recv().await,
            Some(TransportEvent::Disconnected)
        );
        assert_eq!(channels.events.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_write_refused() {
        let transport = LoopbackTransport::new(LoopbackConfig {
            frame_size: 23,
            negotiate_delay: Duration::ZERO,
            ..LoopbackConfig::default()
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let channels = transport.spawn(shutdown.clone()).unwrap();

        let (request, ack) = WriteRequest::acknowledged(command_frame(ParameterRequest::FREE));
        channels.writes.send(request).await.unwrap();
        assert!(matches!(
            ack.await.unwrap(),
            Err(LinkError::SendFailed { .. })
        ));
        shutdown.store(true, Ordering::SeqCst);
    }

    #[test]
    fn test_rejects_frame_size_without_payload() {
        let transport = LoopbackTransport::new(LoopbackConfig {
            frame_size: 3,
            ..LoopbackConfig::default()
        });
        assert!(transport.spawn(Arc::new(AtomicBool::new(false))).is_err());
    }
}
