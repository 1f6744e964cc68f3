//! Application-wide constants
//!
//! Wire layout of the motor frame and default timings of the link.
//! Timings are only defaults: the engine reads them from `config::LinkConfig`.

// =============================================================================
// Wire layout
// =============================================================================

/// Logical length of a command/status frame (PDU 251 - 4 L2CAP = 247)
pub const FRAME_LEN: usize = 247;

/// Header (function, index, device, sub-index) + parameter value
pub const HEADER_LEN: usize = 8;

/// Offset of the parameter value inside the header
pub const PARAMETER_VALUE_OFFSET: usize = 4;

/// Offset of PDO slot 0
pub const PDO_OFFSET: usize = HEADER_LEN;

/// Size of one PDO slot (i32)
pub const SLOT_SIZE: usize = 4;

/// PDO slots reserved by the protocol
pub const PDO_SLOTS: usize = 30;

/// PDO slots carrying command values (both motors)
pub const COMMAND_SLOTS: usize = 15;

/// First command slot of each motor
pub const MOTOR1_COMMAND_BASE: usize = 0;
pub const MOTOR2_COMMAND_BASE: usize = 6;

/// First status slot of each motor (status word, actual position, actual velocity)
pub const MOTOR1_STATUS_BASE: usize = 0;
pub const MOTOR2_STATUS_BASE: usize = 3;

/// Status slot carrying the force sensor
pub const FORCE_SLOT: usize = 15;

// =============================================================================
// Parameter mirror
// =============================================================================

/// Cached parameters per device
pub const MIRROR_PER_DEVICE: usize = 32;

/// Total mirror slots (two devices)
pub const MIRROR_LEN: usize = 2 * MIRROR_PER_DEVICE;

// =============================================================================
// Transport
// =============================================================================

/// Frame size before any negotiation (BLE default ATT MTU)
pub const DEFAULT_FRAME_SIZE: usize = 23;

/// Frame size requested from the peer
pub const TARGET_FRAME_SIZE: usize = FRAME_LEN;

/// ATT write overhead (1 opcode + 2 handle)
pub const TRANSPORT_OVERHEAD: usize = 3;

/// Payload used when the negotiated size leaves no room after the overhead
pub const FALLBACK_PAYLOAD: usize = DEFAULT_FRAME_SIZE - TRANSPORT_OVERHEAD;

// =============================================================================
// Timing
// =============================================================================

/// Cycle period, start to start (10 Hz)
pub const CYCLE_PERIOD_MS: u64 = 100;

/// Wait for a link-level write acknowledgement
pub const WRITE_ACK_TIMEOUT_MS: u64 = 3000;

/// Wait for the reply notification after a successful write
pub const REPLY_TIMEOUT_MS: u64 = 100;

/// Minimum interval between two telemetry publications (~20 FPS)
pub const PUBLISH_INTERVAL_MS: u64 = 50;

/// Warn about a small frame size once every N cycles
pub const FRAME_SIZE_WARN_EVERY: u64 = 10;

// =============================================================================
// Buffers
// =============================================================================

/// Parameter request queue capacity
pub const QUEUE_CAPACITY: usize = 100;

/// Channel capacity for async message passing
pub const CHANNEL_CAPACITY: usize = 256;
