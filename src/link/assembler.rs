//! Command assembler
//!
//! Owns both motor command blocks, the parameter request queue and the
//! outgoing frame buffer, all behind one lock. Every mutation re-derives
//! the buffer before the lock is released, so the cycle engine never
//! copies a half-updated frame.

use super::queue::ParameterQueue;
use crate::codec::frame::{write_commands, write_header};
use crate::codec::{OperationMode, ParameterIndex, ParameterRequest};
use crate::constants::FRAME_LEN;
use crate::error::Result;
use crate::motor::{CommandField, MotorCommand, MotorId};
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

struct Inner {
    motors: [MotorCommand; 2],
    frame: [u8; FRAME_LEN],
    queue: ParameterQueue,
}

impl Inner {
    /// Rebuild the PDO section from the command blocks
    fn rebuild(&mut self) -> Result<()> {
        let [motor1, motor2] = self.motors;
        write_commands(&mut self.frame, &motor1, &motor2).inspect_err(|e| {
            error!("Command frame assembly failed: {}", e);
        })
    }

    fn enqueue(&mut self, request: ParameterRequest) -> Option<ParameterRequest> {
        let evicted = self.queue.enqueue(request);
        if let Some(old) = evicted {
            warn!(
                "Parameter queue full, dropped {} index={} device={}",
                old.function.name(),
                old.index,
                old.device
            );
        }
        evicted
    }
}

/// Shadow of the outgoing command frame
pub struct CommandAssembler {
    inner: Mutex<Inner>,
}

impl CommandAssembler {
    /// Create an assembler with the given per-motor defaults
    pub fn new(defaults: [MotorCommand; 2], queue_capacity: usize) -> Self {
        let mut inner = Inner {
            motors: defaults,
            frame: [0u8; FRAME_LEN],
            queue: ParameterQueue::new(queue_capacity),
        };
        write_header(&mut inner.frame, &ParameterRequest::FREE);
        // Fixed slot table, cannot fail
        let _ = inner.rebuild();
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Set one command scalar and re-derive the frame
    pub fn set_command_field(&self, motor: MotorId, field: CommandField, value: i32) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.motors[motor.index()].set(field, value);
        inner.rebuild()
    }

    /// Switch `motor` into homing mode
    ///
    /// Queues `Write(OperationMode = Homing)`, zeroes target position and
    /// homing level, and re-derives the frame in one critical section.
    pub fn set_homing_mode(&self, motor: MotorId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.enqueue(ParameterRequest::write(
            motor,
            ParameterIndex::OperationMode,
            OperationMode::Homing.into(),
        ));
        let cmd = &mut inner.motors[motor.index()];
        cmd.target_position = 0;
        cmd.homing_level = 0;
        inner.rebuild()?;
        debug!("Homing mode requested for {}", motor);
        Ok(())
    }

    /// Queue an out-of-band parameter request
    ///
    /// Returns the request evicted to make room, if the queue was full.
    pub fn enqueue(&self, request: ParameterRequest) -> Option<ParameterRequest> {
        self.inner.lock().enqueue(request)
    }

    /// Copy of a motor's command block
    pub fn command(&self, motor: MotorId) -> MotorCommand {
        self.inner.lock().motors[motor.index()]
    }

    /// Requests waiting to be sent
    pub fn pending_requests(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Current frame buffer (header holds the last stamped request)
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.lock().frame)
    }

    /// Take the next request and produce the frame to transmit
    ///
    /// The returned bytes are the first `limit` bytes of the frame; later
    /// slots are dropped, never re-ordered.
    pub fn next_frame(&self, limit: usize) -> (ParameterRequest, Bytes) {
        let mut inner = self.inner.lock();
        let request = inner.queue.dequeue_or_free();
        write_header(&mut inner.frame, &request);
        let len = limit.min(FRAME_LEN);
        (request, Bytes::copy_from_slice(&inner.frame[..len]))
    }

    /// Restore defaults and drop queued requests (new or closed connection)
    pub fn reset(&self, defaults: [MotorCommand; 2]) {
        let mut inner = self.inner.lock();
        inner.motors = defaults;
        inner.queue.clear();
        write_header(&mut inner.frame, &ParameterRequest::FREE);
        let _ = inner.rebuild();
    }

    /// Drop queued requests only
    pub fn clear_queue(&self) {
        self.inner.lock().queue.clear();
    }
}
