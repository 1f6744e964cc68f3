//! Motor frame codec
//!
//! Separates the wire format from the link logic:
//! - **Codec**: how command/status frames map to bytes (this module)
//! - **Link**: when frames are built, sent and consumed (`crate::link`)
//!
//! Frame layout (little-endian, 247 bytes logical):
//!
//! ```text
//! ┌──────┬───────┬────────┬────────┬──────────────┬──────────────────────┐
//! │ Func │ Index │ Device │ SubIdx │ Value (i32)  │ PDO slots (i32 × 30) │
//! │ (1B) │ (1B)  │ (1B)   │ (1B)   │ (4B)         │ offset 8 + 4·k       │
//! └──────┴───────┴────────┴────────┴──────────────┴──────────────────────┘
//! ```

pub mod frame;

pub use frame::{decode_status_frame, encode_command_frame, DecodedStatus, ParameterReply};

use crate::motor::MotorId;

/// Function code of the parameter (SDO) section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    Read = 0,
    Write = 1,
    ReadAck = 2,
    WriteAck = 3,
    Operation = 4,
    OperationAck = 5,
    /// No request this cycle
    Free = 255,
}

impl FunctionCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            2 => Some(Self::ReadAck),
            3 => Some(Self::WriteAck),
            4 => Some(Self::Operation),
            5 => Some(Self::OperationAck),
            255 => Some(Self::Free),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::ReadAck => "ReadAck",
            Self::WriteAck => "WriteAck",
            Self::Operation => "Operation",
            Self::OperationAck => "OperationAck",
            Self::Free => "Free",
        }
    }
}

/// Parameter table indices understood by the controller firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParameterIndex {
    DeviceId = 1,
    ControlWord = 2,
    OperationMode = 3,
    StatusWord = 4,
    TargetCurrent = 5,
    ActualCurrent = 6,
    TargetVelocity = 7,
    ActualVelocity = 8,
    TargetPosition = 9,
    ActualPosition = 10,
    ProfileAccTime = 11,
    InterpolationTargetPosition = 12,
    HomingMode = 13,
    HomingDir = 14,
    HomingLevel = 15,
    HomingOffset = 16,
    CurrentBase = 17,
    CurrentP = 18,
    CurrentN = 19,
    IoIn = 22,
    FastStopDec = 28,
    SystemCounter = 30,
}

impl From<ParameterIndex> for u8 {
    fn from(index: ParameterIndex) -> Self {
        index as u8
    }
}

/// Values of `ParameterIndex::OperationMode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OperationMode {
    Pwm = 0,
    Svpwm = 1,
    Torque = 10,
    SyncTorque = 11,
    Velocity = 20,
    ProfileVelocity = 21,
    InterpolationVelocity = 22,
    ProfileVelocitySync = 23,
    InterpolationVelocitySync = 24,
    Position = 30,
    ProfilePosition = 31,
    InterpolationPosition = 32,
    ProfilePositionSync = 33,
    InterpolationPositionSync = 34,
    PositionEncoder = 35,
    SensorFlip = 36,
    Homing = 40,
    Cos = 50,
    EstopProfile = 61,
}

impl From<OperationMode> for i32 {
    fn from(mode: OperationMode) -> Self {
        mode as i32
    }
}

/// One out-of-band parameter request (header + value of an outgoing frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterRequest {
    pub function: FunctionCode,
    pub index: u8,
    pub device: u8,
    pub sub_index: u8,
    /// Write payload, or expected value for reads
    pub value: i32,
}

impl ParameterRequest {
    /// "Nothing to send this cycle"
    pub const FREE: ParameterRequest = ParameterRequest {
        function: FunctionCode::Free,
        index: 0,
        device: 0,
        sub_index: 0,
        value: 0,
    };

    pub fn new(function: FunctionCode, index: u8, device: u8, sub_index: u8, value: i32) -> Self {
        Self {
            function,
            index,
            device,
            sub_index,
            value,
        }
    }

    pub fn read(motor: MotorId, index: impl Into<u8>) -> Self {
        Self::new(FunctionCode::Read, index.into(), motor.device_id(), 0, 0)
    }

    pub fn write(motor: MotorId, index: impl Into<u8>, value: i32) -> Self {
        Self::new(FunctionCode::Write, index.into(), motor.device_id(), 0, value)
    }

    pub fn operation(motor: MotorId, index: impl Into<u8>, value: i32) -> Self {
        Self::new(FunctionCode::Operation, index.into(), motor.device_id(), 0, value)
    }

    pub fn is_free(&self) -> bool {
        self.function == FunctionCode::Free
    }
}

impl Default for ParameterRequest {
    fn default() -> Self {
        Self::FREE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_code_values() {
        assert_eq!(FunctionCode::Read as u8, 0);
        assert_eq!(FunctionCode::OperationAck as u8, 5);
        assert_eq!(FunctionCode::Free as u8, 255);
        assert_eq!(FunctionCode::from_u8(2), Some(FunctionCode::ReadAck));
        assert_eq!(FunctionCode::from_u8(6), None);
    }

    #[test]
    fn test_write_request_helper() {
        let req = ParameterRequest::write(
            MotorId::Motor2,
            ParameterIndex::OperationMode,
            OperationMode::Homing.into(),
        );
        assert_eq!(req.function, FunctionCode::Write);
        assert_eq!(req.index, 3);
        assert_eq!(req.device, 1);
        assert_eq!(req.sub_index, 0);
        assert_eq!(req.value, 40);
    }

    #[test]
    fn test_free_sentinel() {
        let free = ParameterRequest::default();
        assert!(free.is_free());
        assert_eq!(free.index, 0);
        assert_eq!(free.device, 0);
        assert_eq!(free.value, 0);
    }
}
